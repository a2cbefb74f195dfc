//! Pipeline state consumed by the I/O lowering.
//!
//! This is plain data: the driver (or a test) fills it in, usually from JSON, and nothing in the
//! lowering mutates it.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use vesper_ir::ShaderStage;

use crate::error::IoError;

/// Graphics IP version of the target.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GfxIp {
    pub major: u32,
    pub minor: u32,
    #[serde(default)]
    pub stepping: u32,
}

impl GfxIp {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            stepping: 0,
        }
    }

    /// `self >= major.minor`.
    pub const fn at_least(self, major: u32, minor: u32) -> bool {
        self.major > major || (self.major == major && self.minor >= minor)
    }
}

impl Default for GfxIp {
    fn default() -> Self {
        GfxIp::new(9, 0)
    }
}

impl std::fmt::Display for GfxIp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gfx{}.{}.{}", self.major, self.minor, self.stepping)
    }
}

bitflags! {
    /// Shader stages present in the pipeline.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct StageMask: u32 {
        const VERTEX = 1 << 0;
        const TESS_CONTROL = 1 << 1;
        const TESS_EVAL = 1 << 2;
        const GEOMETRY = 1 << 3;
        const FRAGMENT = 1 << 4;
        const COMPUTE = 1 << 5;
        const COPY_SHADER = 1 << 6;
    }
}

impl StageMask {
    pub const fn from_stage(stage: ShaderStage) -> Self {
        Self::from_bits_truncate(1 << stage.index())
    }

    pub const fn has(self, stage: ShaderStage) -> bool {
        self.contains(Self::from_stage(stage))
    }
}

/// Primitive topology of the input assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
    TriangleListAdjacency,
    TriangleStripAdjacency,
    PatchList,
}

/// Tessellation primitive mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveMode {
    #[default]
    Triangles,
    Quads,
    Isolines,
}

impl PrimitiveMode {
    /// Dwords of tessellation factors written per patch.
    pub const fn tess_factor_stride(self) -> u32 {
        match self {
            PrimitiveMode::Triangles => 4,
            PrimitiveMode::Quads => 6,
            PrimitiveMode::Isolines => 2,
        }
    }

    /// `(outer, inner)` tessellation factor counts.
    pub const fn tess_factor_counts(self) -> (u32, u32) {
        match self {
            PrimitiveMode::Triangles => (3, 1),
            PrimitiveMode::Quads => (4, 2),
            PrimitiveMode::Isolines => (2, 0),
        }
    }
}

/// Thread layout of a compute workgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkgroupLayout {
    #[default]
    Unknown,
    Linear,
    /// 2x2 quads.
    Quads,
    /// 8x8 tiles of quads.
    SexagintiQuads,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputAssemblyState {
    pub topology: Topology,
    pub patch_control_points: u32,
    pub multiview: bool,
}

impl Default for InputAssemblyState {
    fn default() -> Self {
        Self {
            topology: Topology::TriangleList,
            patch_control_points: 3,
            multiview: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterizerState {
    pub per_sample_shading: bool,
    pub num_samples: u32,
    pub sample_pattern_idx: u32,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            per_sample_shading: false,
            num_samples: 1,
            sample_pattern_idx: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TessellationState {
    pub primitive_mode: PrimitiveMode,
    /// Output control points per patch.
    pub output_vertices: u32,
}

impl Default for TessellationState {
    fn default() -> Self {
        Self {
            primitive_mode: PrimitiveMode::Triangles,
            output_vertices: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryState {
    /// Maximum vertices emitted per invocation.
    pub output_vertices: u32,
    pub invocations: u32,
    /// Vertex stream sent to the rasterizer.
    pub raster_stream: u32,
}

impl Default for GeometryState {
    fn default() -> Self {
        Self {
            output_vertices: 3,
            invocations: 1,
            raster_stream: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeState {
    pub workgroup_size: [u32; 3],
    pub layout: WorkgroupLayout,
    /// The shader samples or stores images; enables layout reconfiguration.
    pub uses_images: bool,
}

impl Default for ComputeState {
    fn default() -> Self {
        Self {
            workgroup_size: [1, 1, 1],
            layout: WorkgroupLayout::Unknown,
            uses_images: false,
        }
    }
}

/// Subgroup width per stage (32 or 64).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveSizes {
    pub vertex: u32,
    pub tess_control: u32,
    pub tess_eval: u32,
    pub geometry: u32,
    pub fragment: u32,
    pub compute: u32,
}

impl Default for WaveSizes {
    fn default() -> Self {
        Self {
            vertex: 64,
            tess_control: 64,
            tess_eval: 64,
            geometry: 64,
            fragment: 64,
            compute: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Promote center interpolation to sample interpolation for sample-rate pipelines.
    pub enable_interp_mode_patch: bool,
    pub reconfig_workgroup_layout: bool,
    /// Pack FS generic inputs densely.
    pub pack_inputs: bool,
    /// Pack generic outputs of the stage feeding the FS densely.
    pub pack_outputs: bool,
}

/// GS ring layout in dwords. Zero fields are derived from the declared GS I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GsRingLayout {
    pub es_gs_ring_item_size: u32,
    pub gs_vs_ring_item_size: u32,
    pub es_gs_lds_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineState {
    pub gfx_ip: GfxIp,
    pub stages: StageMask,
    pub gs_on_chip: bool,
    pub tess_off_chip: bool,
    pub ngg: bool,
    /// Compiled without knowledge of the neighbouring stages.
    pub unlinked: bool,
    pub input_assembly: InputAssemblyState,
    pub rasterizer: RasterizerState,
    pub tessellation: TessellationState,
    pub geometry: GeometryState,
    pub compute: ComputeState,
    pub wave_sizes: WaveSizes,
    pub device_index: u32,
    pub options: Options,
    pub gs_ring: GsRingLayout,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            gfx_ip: GfxIp::default(),
            stages: StageMask::VERTEX | StageMask::FRAGMENT,
            gs_on_chip: false,
            tess_off_chip: false,
            ngg: false,
            unlinked: false,
            input_assembly: InputAssemblyState::default(),
            rasterizer: RasterizerState::default(),
            tessellation: TessellationState::default(),
            geometry: GeometryState::default(),
            compute: ComputeState::default(),
            wave_sizes: WaveSizes::default(),
            device_index: 0,
            options: Options::default(),
            gs_ring: GsRingLayout::default(),
        }
    }
}

/// Graphics stages in pipeline order (the copy shader is not user-visible).
const GRAPHICS_ORDER: [ShaderStage; 5] = [
    ShaderStage::Vertex,
    ShaderStage::TessControl,
    ShaderStage::TessEval,
    ShaderStage::Geometry,
    ShaderStage::Fragment,
];

impl PipelineState {
    pub fn from_json(text: &str) -> Result<Self, IoError> {
        let state: PipelineState = serde_json::from_str(text)?;
        state.validate()?;
        Ok(state)
    }

    pub fn to_json(&self) -> Result<String, IoError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), IoError> {
        let wave_ok = |w: u32| w == 32 || w == 64;
        let w = &self.wave_sizes;
        if ![w.vertex, w.tess_control, w.tess_eval, w.geometry, w.fragment, w.compute]
            .into_iter()
            .all(wave_ok)
        {
            return Err(IoError::Config("wave sizes must be 32 or 64".into()));
        }
        if self.has_tessellation() && self.input_assembly.patch_control_points == 0 {
            return Err(IoError::Config("patch_control_points must be non-zero".into()));
        }
        if self.stages.has(ShaderStage::TessControl) && self.tessellation.output_vertices == 0 {
            return Err(IoError::Config("tessellation output_vertices must be non-zero".into()));
        }
        if self.compute.workgroup_size.contains(&0) {
            return Err(IoError::Config("workgroup dimensions must be non-zero".into()));
        }
        if self.geometry.raster_stream > 3 {
            return Err(IoError::Config("raster_stream must be 0..=3".into()));
        }
        Ok(())
    }

    pub fn has_stage(&self, stage: ShaderStage) -> bool {
        match stage {
            // The copy shader exists whenever a legacy (non-NGG) GS does.
            ShaderStage::CopyShader => {
                self.stages.has(ShaderStage::CopyShader)
                    || (self.stages.has(ShaderStage::Geometry) && !self.ngg)
            }
            _ => self.stages.has(stage),
        }
    }

    pub fn has_tessellation(&self) -> bool {
        self.stages.has(ShaderStage::TessControl) || self.stages.has(ShaderStage::TessEval)
    }

    pub fn has_geometry(&self) -> bool {
        self.stages.has(ShaderStage::Geometry)
    }

    /// Next present graphics stage after `stage`. The copy shader feeds the FS.
    pub fn next_stage(&self, stage: ShaderStage) -> Option<ShaderStage> {
        let from = match stage {
            ShaderStage::CopyShader => ShaderStage::Geometry,
            ShaderStage::Compute | ShaderStage::Fragment => return None,
            s => s,
        };
        GRAPHICS_ORDER
            .iter()
            .skip_while(|s| **s != from)
            .skip(1)
            .copied()
            .find(|s| self.stages.has(*s))
    }

    /// Previous present graphics stage before `stage`.
    pub fn prev_stage(&self, stage: ShaderStage) -> Option<ShaderStage> {
        if matches!(stage, ShaderStage::Compute | ShaderStage::CopyShader) {
            return None;
        }
        GRAPHICS_ORDER
            .iter()
            .rev()
            .skip_while(|s| **s != stage)
            .skip(1)
            .copied()
            .find(|s| self.stages.has(*s))
    }

    /// Last user stage before rasterization; its transform-feedback writes are the live ones.
    pub fn last_vertex_stage(&self) -> Option<ShaderStage> {
        [
            ShaderStage::Geometry,
            ShaderStage::TessEval,
            ShaderStage::Vertex,
        ]
        .into_iter()
        .find(|s| self.stages.has(*s))
    }

    pub fn wave_size(&self, stage: ShaderStage) -> u32 {
        let w = &self.wave_sizes;
        match stage {
            ShaderStage::Vertex => w.vertex,
            ShaderStage::TessControl => w.tess_control,
            ShaderStage::TessEval => w.tess_eval,
            ShaderStage::Geometry | ShaderStage::CopyShader => w.geometry,
            ShaderStage::Fragment => w.fragment,
            ShaderStage::Compute => w.compute,
        }
    }

    /// The ES→GS ring lives in LDS (always the case from GFX9 on).
    pub fn es_gs_on_chip(&self) -> bool {
        self.gs_on_chip || self.gfx_ip.major >= 9
    }

    /// Generic outputs of `stage` and FS inputs are packed together.
    pub fn packs_boundary(&self, producer: ShaderStage) -> bool {
        self.options.pack_inputs
            && self.options.pack_outputs
            && !self.unlinked
            && matches!(producer, ShaderStage::Vertex | ShaderStage::TessEval)
            && self.next_stage(producer) == Some(ShaderStage::Fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn json_fields_default_when_missing() {
        let state = PipelineState::from_json(
            r#"{
                "gfx_ip": { "major": 10, "minor": 3 },
                "stages": "VERTEX | TESS_CONTROL | TESS_EVAL | FRAGMENT",
                "tess_off_chip": true,
                "tessellation": { "primitive_mode": "quads", "output_vertices": 4 }
            }"#,
        )
        .unwrap();
        assert_eq!(state.gfx_ip, GfxIp::new(10, 3));
        assert!(state.tess_off_chip);
        assert_eq!(state.tessellation.primitive_mode, PrimitiveMode::Quads);
        assert_eq!(state.input_assembly.patch_control_points, 3);
        assert_eq!(state.wave_size(ShaderStage::Fragment), 64);
    }

    #[test]
    fn json_round_trips() {
        let state = PipelineState {
            stages: StageMask::VERTEX | StageMask::GEOMETRY | StageMask::FRAGMENT,
            gs_on_chip: true,
            ..PipelineState::default()
        };
        let text = state.to_json().unwrap();
        assert_eq!(PipelineState::from_json(&text).unwrap(), state);
    }

    #[test]
    fn invalid_wave_size_is_rejected() {
        let err = PipelineState::from_json(r#"{ "wave_sizes": { "vertex": 16 } }"#).unwrap_err();
        assert!(matches!(err, IoError::Config(_)));
    }

    #[test]
    fn stage_order_skips_missing_stages() {
        let state = PipelineState {
            stages: StageMask::VERTEX | StageMask::GEOMETRY | StageMask::FRAGMENT,
            ..PipelineState::default()
        };
        assert_eq!(state.next_stage(ShaderStage::Vertex), Some(ShaderStage::Geometry));
        assert_eq!(state.next_stage(ShaderStage::CopyShader), Some(ShaderStage::Fragment));
        assert_eq!(state.prev_stage(ShaderStage::Fragment), Some(ShaderStage::Geometry));
        assert_eq!(state.prev_stage(ShaderStage::Vertex), None);
        assert_eq!(state.last_vertex_stage(), Some(ShaderStage::Geometry));
        assert!(state.has_stage(ShaderStage::CopyShader));
    }

    #[test]
    fn gfx_ip_ordering() {
        assert!(GfxIp::new(10, 3).at_least(10, 3));
        assert!(GfxIp::new(11, 0).at_least(10, 3));
        assert!(!GfxIp::new(10, 1).at_least(10, 3));
        assert!(GfxIp::new(9, 0) < GfxIp::new(10, 1));
    }
}
