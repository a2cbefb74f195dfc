//! Shader IR used by the I/O lowering passes.
//!
//! A small SSA form shaped after what the lowering needs and nothing more:
//! - [`function`]: blocks, terminators, typed values and function-local slots.
//! - [`instr`]: plain arithmetic plus the hardware operations the lowering emits (LDS, buffer,
//!   `exp`, interpolation, `s_sendmsg`).
//! - [`marker`]: abstract input/output import and export markers produced by front ends and
//!   consumed by the lowering.
//! - [`builder`]: insertion cursor with constant folding.
//! - [`postdom`]: post-dominator tree, used to place the final position export.
//! - [`interp`]: a reference interpreter for checking lowered code end to end.

pub mod builder;
pub mod builtin;
pub mod error;
pub mod function;
pub mod instr;
pub mod interp;
pub mod marker;
pub mod postdom;
mod print;
pub mod stage;
pub mod types;
pub mod value;

pub use builder::Builder;
pub use builtin::BuiltIn;
pub use error::IrError;
pub use function::{Block, BlockId, Function, LocalId, Module, Terminator};
pub use instr::{BufferAccess, BufferFormat, CachePolicy, Instr};
pub use marker::{InputImport, InterpLoc, InterpMode, Interpolation, OutputExport, OutputImport};
pub use stage::ShaderStage;
pub use types::{ScalarType, Type};
pub use value::{Const, Descriptor, EntryValue, IjLocation, Operand, ValueId};
