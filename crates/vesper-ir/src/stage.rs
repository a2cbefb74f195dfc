use std::fmt;

use serde::{Deserialize, Serialize};

/// Hardware-independent shader stages, in pipeline order.
///
/// The copy shader is an internal stage: it is generated after the geometry shader and runs as the
/// hardware vertex shader that reads the GS→VS ring back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderStage {
    Vertex,
    TessControl,
    TessEval,
    Geometry,
    Fragment,
    Compute,
    CopyShader,
}

impl ShaderStage {
    /// All stages, in pipeline order.
    pub const ALL: [ShaderStage; 7] = [
        ShaderStage::Vertex,
        ShaderStage::TessControl,
        ShaderStage::TessEval,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
        ShaderStage::Compute,
        ShaderStage::CopyShader,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn short_name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs",
            ShaderStage::TessControl => "tcs",
            ShaderStage::TessEval => "tes",
            ShaderStage::Geometry => "gs",
            ShaderStage::Fragment => "fs",
            ShaderStage::Compute => "cs",
            ShaderStage::CopyShader => "copy",
        }
    }

    /// Stages that process vertices before rasterization.
    pub const fn is_vertex_processing(self) -> bool {
        matches!(
            self,
            ShaderStage::Vertex
                | ShaderStage::TessControl
                | ShaderStage::TessEval
                | ShaderStage::Geometry
                | ShaderStage::CopyShader
        )
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}
