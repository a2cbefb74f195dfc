use thiserror::Error;
use vesper_ir::{BuiltIn, IrError, ShaderStage, Type};

use crate::location::LocationInfo;

/// Whether a built-in is read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Direction::Input => "input",
            Direction::Output => "output",
        })
    }
}

/// Contract violations of the I/O lowering pipeline.
///
/// None of these are recoverable: the caller abandons the compile.
#[derive(Debug, Error, PartialEq)]
pub enum IoError {
    #[error("built-in {builtin} is not a valid {direction} of the {stage} stage")]
    InvalidBuiltInStage {
        builtin: BuiltIn,
        stage: ShaderStage,
        direction: Direction,
    },

    #[error("stage I/O must be a scalar or a vector of at most 4 elements, found {0}")]
    UnsupportedIoType(Type),

    #[error("runtime location offset is not supported in the {0} stage")]
    RuntimeLocationOffset(ShaderStage),

    #[error("generic outputs can only be read back in the tcs stage, not {0}")]
    OutputReadOutsideTcs(ShaderStage),

    #[error("transform feedback buffer {buffer} has a zero stride")]
    ZeroXfbStride { buffer: u32 },

    #[error("transform feedback offset must be a constant")]
    NonConstantXfbOffset,

    #[error("{what} must be a constant")]
    NonConstant { what: &'static str },

    #[error("no location was assigned to {info} in the {stage} stage")]
    MissingLocation {
        stage: ShaderStage,
        info: LocationInfo,
    },

    #[error("no location was assigned to built-in {builtin} in the {stage} stage")]
    MissingBuiltInLocation {
        stage: ShaderStage,
        builtin: BuiltIn,
    },

    #[error("unsupported marker in the {stage} stage: {marker}")]
    UnsupportedMarker { stage: ShaderStage, marker: String },

    #[error("attribute export channel {channel} of location {location} is written twice")]
    OverlappingExport { location: u32, channel: u32 },

    #[error("no storage strategy exists for {what} of the {stage} stage")]
    NoStrategy {
        stage: ShaderStage,
        what: &'static str,
    },

    #[error("the pipeline has no {0} stage")]
    MissingStage(ShaderStage),

    #[error("invalid pipeline state: {0}")]
    Config(String),

    #[error(transparent)]
    Ir(#[from] IrError),
}

impl From<serde_json::Error> for IoError {
    fn from(err: serde_json::Error) -> Self {
        IoError::Config(err.to_string())
    }
}
