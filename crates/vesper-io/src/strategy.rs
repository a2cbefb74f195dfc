//! Which physical storage a stage's inputs and outputs go through.

use std::fmt;

use vesper_ir::ShaderStage;

use crate::error::IoError;
use crate::pipeline::PipelineState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageStrategy {
    /// Vertex attribute fetch, lowered elsewhere.
    VertexFetch,
    /// Position and parameter exports to the rasterizer.
    Export,
    /// FS color and depth exports.
    ColorExport,
    /// FS inputs: interpolated or loaded from parameter memory.
    Interpolation,
    /// VS (as LS) outputs and TCS inputs in LDS.
    Lds,
    /// TCS outputs and TES inputs, in LDS or the off-chip tessellation buffer.
    TessStorage { off_chip: bool },
    EsGsRing { on_chip: bool },
    GsVsRing { on_chip: bool },
    /// GS outputs handed to the primitive shader generator as markers.
    Ngg,
}

impl fmt::Display for StorageStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chip = |on: bool| if on { "on-chip" } else { "off-chip" };
        match self {
            StorageStrategy::VertexFetch => f.write_str("vertex fetch"),
            StorageStrategy::Export => f.write_str("export"),
            StorageStrategy::ColorExport => f.write_str("color export"),
            StorageStrategy::Interpolation => f.write_str("interpolation"),
            StorageStrategy::Lds => f.write_str("lds"),
            StorageStrategy::TessStorage { off_chip } => {
                write!(f, "tess storage ({})", chip(!off_chip))
            }
            StorageStrategy::EsGsRing { on_chip } => write!(f, "es-gs ring ({})", chip(*on_chip)),
            StorageStrategy::GsVsRing { on_chip } => write!(f, "gs-vs ring ({})", chip(*on_chip)),
            StorageStrategy::Ngg => f.write_str("ngg"),
        }
    }
}

/// Storage the outputs of `stage` are written to.
pub fn select_output(pipeline: &PipelineState, stage: ShaderStage) -> Result<StorageStrategy, IoError> {
    let to_next = |next: Option<ShaderStage>| match next {
        Some(ShaderStage::TessControl) => StorageStrategy::Lds,
        Some(ShaderStage::Geometry) => StorageStrategy::EsGsRing {
            on_chip: pipeline.es_gs_on_chip(),
        },
        _ => StorageStrategy::Export,
    };
    Ok(match stage {
        ShaderStage::Vertex | ShaderStage::TessEval => to_next(pipeline.next_stage(stage)),
        ShaderStage::TessControl => StorageStrategy::TessStorage {
            off_chip: pipeline.tess_off_chip,
        },
        ShaderStage::Geometry if pipeline.ngg => StorageStrategy::Ngg,
        ShaderStage::Geometry => StorageStrategy::GsVsRing {
            on_chip: pipeline.gs_on_chip,
        },
        ShaderStage::CopyShader => StorageStrategy::Export,
        ShaderStage::Fragment => StorageStrategy::ColorExport,
        ShaderStage::Compute => {
            return Err(IoError::NoStrategy {
                stage,
                what: "outputs",
            })
        }
    })
}

/// Storage the inputs of `stage` are read from.
pub fn select_input(pipeline: &PipelineState, stage: ShaderStage) -> Result<StorageStrategy, IoError> {
    Ok(match stage {
        ShaderStage::Vertex => StorageStrategy::VertexFetch,
        ShaderStage::TessControl => StorageStrategy::Lds,
        ShaderStage::TessEval => StorageStrategy::TessStorage {
            off_chip: pipeline.tess_off_chip,
        },
        ShaderStage::Geometry => StorageStrategy::EsGsRing {
            on_chip: pipeline.es_gs_on_chip(),
        },
        ShaderStage::Fragment => StorageStrategy::Interpolation,
        ShaderStage::CopyShader => StorageStrategy::GsVsRing {
            on_chip: pipeline.gs_on_chip,
        },
        ShaderStage::Compute => {
            return Err(IoError::NoStrategy {
                stage,
                what: "inputs",
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{GfxIp, StageMask};

    fn pipeline(stages: StageMask) -> PipelineState {
        PipelineState {
            stages,
            ..PipelineState::default()
        }
    }

    #[test]
    fn vertex_outputs_depend_on_the_next_stage() {
        let vs_fs = pipeline(StageMask::VERTEX | StageMask::FRAGMENT);
        assert_eq!(select_output(&vs_fs, ShaderStage::Vertex), Ok(StorageStrategy::Export));

        let tess = pipeline(StageMask::VERTEX | StageMask::TESS_CONTROL | StageMask::TESS_EVAL);
        assert_eq!(select_output(&tess, ShaderStage::Vertex), Ok(StorageStrategy::Lds));
        assert_eq!(
            select_output(&tess, ShaderStage::TessControl),
            Ok(StorageStrategy::TessStorage { off_chip: false })
        );

        let mut gs = pipeline(StageMask::VERTEX | StageMask::GEOMETRY | StageMask::FRAGMENT);
        gs.gfx_ip = GfxIp::new(8, 0);
        assert_eq!(
            select_output(&gs, ShaderStage::Vertex),
            Ok(StorageStrategy::EsGsRing { on_chip: false })
        );
        gs.gfx_ip = GfxIp::new(9, 0);
        assert_eq!(
            select_output(&gs, ShaderStage::Vertex),
            Ok(StorageStrategy::EsGsRing { on_chip: true })
        );
    }

    #[test]
    fn ngg_gs_outputs_are_markers() {
        let mut gs = pipeline(StageMask::VERTEX | StageMask::GEOMETRY | StageMask::FRAGMENT);
        gs.ngg = true;
        assert_eq!(select_output(&gs, ShaderStage::Geometry), Ok(StorageStrategy::Ngg));
        gs.ngg = false;
        assert_eq!(
            select_output(&gs, ShaderStage::Geometry),
            Ok(StorageStrategy::GsVsRing { on_chip: false })
        );
    }

    #[test]
    fn compute_has_no_stage_io() {
        let cs = pipeline(StageMask::COMPUTE);
        assert!(select_input(&cs, ShaderStage::Compute).is_err());
        assert!(select_output(&cs, ShaderStage::Compute).is_err());
    }
}
