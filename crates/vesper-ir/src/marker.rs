//! Abstract stage-boundary markers.
//!
//! The I/O builder emits these; the patch pass replaces every one of them (except vertex fetches,
//! which belong to the vertex-fetch lowering) with concrete memory, ring or export operations.

use std::fmt;

use crate::builtin::BuiltIn;
use crate::value::Operand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InterpMode {
    #[default]
    Smooth,
    Flat,
    NoPersp,
    /// Per-vertex attribute read; the caller picks the vertex.
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InterpLoc {
    Unknown,
    #[default]
    Center,
    Centroid,
    Sample,
    /// Interpolate at an explicit I/J value carried by the marker.
    Explicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interpolation {
    pub mode: InterpMode,
    pub loc: InterpLoc,
}

impl Interpolation {
    pub const FLAT: Interpolation = Interpolation {
        mode: InterpMode::Flat,
        loc: InterpLoc::Center,
    };

    pub const fn new(mode: InterpMode, loc: InterpLoc) -> Self {
        Self { mode, loc }
    }
}

/// Read of a stage input. The result type is the marker's destination type.
#[derive(Debug, Clone, PartialEq)]
pub enum InputImport {
    /// Vertex attribute fetch (vertex stage only).
    Vertex { location: u32, elem_idx: u32 },
    Generic {
        location: u32,
        /// Always `i32 0` outside of TCS/TES.
        loc_offset: Operand,
        elem_idx: Operand,
        vertex_idx: Option<Operand>,
        interp: Interpolation,
    },
    /// FS input interpolated at a computed I/J (or, for custom mode, at a given vertex).
    Interpolant {
        location: u32,
        loc_offset: Operand,
        elem_idx: Operand,
        mode: InterpMode,
        aux: Operand,
    },
    BuiltIn {
        builtin: BuiltIn,
        elem_idx: Option<Operand>,
        vertex_idx: Option<Operand>,
        /// Sample number for [`BuiltIn::SamplePosOffset`].
        sample_id: Option<Operand>,
    },
}

/// TCS read-back of its own outputs.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputImport {
    Generic {
        location: u32,
        loc_offset: Operand,
        elem_idx: Operand,
        vertex_idx: Option<Operand>,
    },
    BuiltIn {
        builtin: BuiltIn,
        elem_idx: Option<Operand>,
        vertex_idx: Option<Operand>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputExport {
    Generic {
        location: u32,
        loc_offset: Operand,
        elem_idx: Operand,
        vertex_idx: Option<Operand>,
        stream: u32,
        value: Operand,
    },
    BuiltIn {
        builtin: BuiltIn,
        elem_idx: Option<Operand>,
        vertex_idx: Option<Operand>,
        stream: u32,
        value: Operand,
    },
    Xfb {
        buffer: u32,
        offset: u32,
        stream: u32,
        value: Operand,
    },
}

impl OutputExport {
    pub fn value(&self) -> &Operand {
        match self {
            OutputExport::Generic { value, .. }
            | OutputExport::BuiltIn { value, .. }
            | OutputExport::Xfb { value, .. } => value,
        }
    }
}

fn opt(f: &mut fmt::Formatter<'_>, name: &str, value: &Option<Operand>) -> fmt::Result {
    match value {
        Some(v) => write!(f, ", {name}={v}"),
        None => Ok(()),
    }
}

impl fmt::Display for InputImport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputImport::Vertex { location, elem_idx } => {
                write!(f, "input.import.vertex loc={location}, elem={elem_idx}")
            }
            InputImport::Generic {
                location,
                loc_offset,
                elem_idx,
                vertex_idx,
                interp,
            } => {
                write!(
                    f,
                    "input.import.generic loc={location}+{loc_offset}, elem={elem_idx}, interp={:?}/{:?}",
                    interp.mode, interp.loc
                )?;
                opt(f, "vertex", vertex_idx)
            }
            InputImport::Interpolant {
                location,
                loc_offset,
                elem_idx,
                mode,
                aux,
            } => write!(
                f,
                "input.import.interpolant loc={location}+{loc_offset}, elem={elem_idx}, mode={mode:?}, aux={aux}"
            ),
            InputImport::BuiltIn {
                builtin,
                elem_idx,
                vertex_idx,
                sample_id,
            } => {
                write!(f, "input.import.builtin {builtin}")?;
                opt(f, "elem", elem_idx)?;
                opt(f, "vertex", vertex_idx)?;
                opt(f, "sample", sample_id)
            }
        }
    }
}

impl fmt::Display for OutputImport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputImport::Generic {
                location,
                loc_offset,
                elem_idx,
                vertex_idx,
            } => {
                write!(f, "output.import.generic loc={location}+{loc_offset}, elem={elem_idx}")?;
                opt(f, "vertex", vertex_idx)
            }
            OutputImport::BuiltIn {
                builtin,
                elem_idx,
                vertex_idx,
            } => {
                write!(f, "output.import.builtin {builtin}")?;
                opt(f, "elem", elem_idx)?;
                opt(f, "vertex", vertex_idx)
            }
        }
    }
}

impl fmt::Display for OutputExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputExport::Generic {
                location,
                loc_offset,
                elem_idx,
                vertex_idx,
                stream,
                value,
            } => {
                write!(
                    f,
                    "output.export.generic loc={location}+{loc_offset}, elem={elem_idx}, stream={stream}"
                )?;
                opt(f, "vertex", vertex_idx)?;
                write!(f, ", {value}")
            }
            OutputExport::BuiltIn {
                builtin,
                elem_idx,
                vertex_idx,
                stream,
                value,
            } => {
                write!(f, "output.export.builtin {builtin}, stream={stream}")?;
                opt(f, "elem", elem_idx)?;
                opt(f, "vertex", vertex_idx)?;
                write!(f, ", {value}")
            }
            OutputExport::Xfb {
                buffer,
                offset,
                stream,
                value,
            } => write!(
                f,
                "output.export.xfb buffer={buffer}, offset={offset}, stream={stream}, {value}"
            ),
        }
    }
}
