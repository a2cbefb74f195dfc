use vesper_ir::ShaderStage;

use crate::layout::{CalcFactor, GsRingFactor};
use crate::pipeline::PipelineState;
use crate::target::TargetInfo;
use crate::usage::ResourceUsage;

/// Everything the builder records and the patch pass reads for one pipeline compile.
///
/// Passed by reference through every operation; there is no global state.
#[derive(Debug, Clone)]
pub struct CompilationContext {
    pub pipeline: PipelineState,
    pub target: TargetInfo,
    usage: [ResourceUsage; 7],
    calc_factor: Option<CalcFactor>,
    gs_ring: Option<GsRingFactor>,
    locations_assigned: bool,
}

impl CompilationContext {
    pub fn new(pipeline: PipelineState) -> Self {
        let target = TargetInfo::new(pipeline.gfx_ip);
        Self::with_target(pipeline, target)
    }

    pub fn with_target(pipeline: PipelineState, target: TargetInfo) -> Self {
        Self {
            pipeline,
            target,
            usage: std::array::from_fn(|_| ResourceUsage::default()),
            calc_factor: None,
            gs_ring: None,
            locations_assigned: false,
        }
    }

    pub fn usage(&self, stage: ShaderStage) -> &ResourceUsage {
        &self.usage[stage.index()]
    }

    pub fn usage_mut(&mut self, stage: ShaderStage) -> &mut ResourceUsage {
        &mut self.usage[stage.index()]
    }

    /// The tessellation layout, computed on first use and reused afterwards.
    pub fn calc_factor(&mut self) -> CalcFactor {
        if let Some(factor) = self.calc_factor {
            return factor;
        }
        let factor = CalcFactor::compute(self);
        self.calc_factor = Some(factor);
        factor
    }

    /// The GS stream sent to the rasterizer: the one the GS writes built-ins on, or the pipeline's
    /// default when it writes none.
    pub fn raster_stream(&self) -> u32 {
        self.usage(ShaderStage::Geometry)
            .in_out
            .gs_raster_stream
            .unwrap_or(self.pipeline.geometry.raster_stream)
    }

    pub fn gs_ring(&self) -> GsRingFactor {
        self.gs_ring.unwrap_or_default()
    }

    pub(crate) fn set_gs_ring(&mut self, ring: GsRingFactor) {
        self.gs_ring = Some(ring);
    }

    pub fn locations_assigned(&self) -> bool {
        self.locations_assigned
    }

    pub(crate) fn mark_locations_assigned(&mut self) {
        self.locations_assigned = true;
    }
}
