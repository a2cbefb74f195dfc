use thiserror::Error;

use crate::types::Type;
use crate::value::{EntryValue, ValueId};

#[derive(Debug, Error, PartialEq)]
pub enum IrError {
    #[error("value {0} used before it was defined")]
    UndefinedValue(ValueId),

    #[error("entry value {0} was not provided")]
    MissingEntryValue(EntryValue),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: Type, found: Type },

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("LDS access at dword {offset} is outside the {size}-dword allocation")]
    LdsOutOfRange { offset: u64, size: usize },

    #[error("no buffer bound for {0}")]
    MissingBuffer(String),

    #[error("abstract I/O marker reached execution: {0}")]
    UnloweredMarker(String),

    #[error("execution did not terminate after {0} steps")]
    StepLimit(usize),
}
