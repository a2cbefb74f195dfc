//! Stage I/O lowering for a GPU shader compiler.
//!
//! A front end describes what each shader stage reads and writes through [`IoBuilder`]. That
//! records the usage in a [`CompilationContext`] and leaves abstract import/export markers in the
//! IR. [`lower`] then assigns physical locations to every stage interface and rewrites the markers
//! into what the hardware actually does: parameter and position exports, LDS and ring accesses,
//! TF buffer and stream-out stores, and attribute interpolation.
//!
//! ```text
//!   IoBuilder ──markers──▶ Module ──lower()──▶ lowered Module
//!       │                                ▲
//!       └──usage──▶ CompilationContext ──┘  (locations, layouts, strategies)
//! ```

pub mod builder;
pub mod builtin_table;
pub mod context;
pub mod error;
pub mod layout;
pub mod location;
pub mod offsets;
pub mod patch;
pub mod pipeline;
pub mod strategy;
pub mod target;
pub mod usage;

pub use builder::{InOutInfo, IoBuilder};
pub use context::CompilationContext;
pub use error::{Direction, IoError};
pub use layout::{CalcFactor, GsRingFactor};
pub use location::{assign_locations, LocationInfo, LocationMap};
pub use pipeline::{GfxIp, PipelineState, PrimitiveMode, StageMask, Topology, WorkgroupLayout};
pub use strategy::StorageStrategy;
pub use target::TargetInfo;
pub use usage::{BuiltInUsage, InOutUsage, ResourceUsage, UsageFlags};

use vesper_ir::Module;

/// Lowers every I/O marker of `module`. See [`patch::run`].
pub fn lower(module: &mut Module, ctx: &mut CompilationContext) -> Result<(), IoError> {
    patch::run(module, ctx)
}
