//! Per-stage resource usage recorded by the I/O builder and consumed by the patch pass.

use std::collections::{BTreeMap, BTreeSet};

use bitflags::bitflags;
use hashbrown::HashMap;
use vesper_ir::BuiltIn;

use crate::location::{LocationInfo, LocationMap};

bitflags! {
    /// Built-ins a stage reads (`*_IN` and the FS/compute inputs) or writes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UsageFlags: u64 {
        const POSITION = 1 << 0;
        const POINT_SIZE = 1 << 1;
        const LAYER = 1 << 2;
        const VIEWPORT_INDEX = 1 << 3;
        const PRIMITIVE_SHADING_RATE = 1 << 4;
        const PRIMITIVE_ID = 1 << 5;
        const TESS_LEVEL_OUTER = 1 << 6;
        const TESS_LEVEL_INNER = 1 << 7;

        const POSITION_IN = 1 << 8;
        const POINT_SIZE_IN = 1 << 9;
        const PRIMITIVE_ID_IN = 1 << 10;
        const VIEW_INDEX = 1 << 11;
        const INVOCATION_ID = 1 << 12;
        const PATCH_VERTICES = 1 << 13;
        const TESS_COORD = 1 << 14;
        const TESS_LEVEL_OUTER_IN = 1 << 15;
        const TESS_LEVEL_INNER_IN = 1 << 16;
        const LAYER_IN = 1 << 17;
        const VIEWPORT_INDEX_IN = 1 << 18;

        const FRAG_COORD = 1 << 19;
        const FRONT_FACING = 1 << 20;
        const POINT_COORD = 1 << 21;
        const SAMPLE_ID = 1 << 22;
        const SAMPLE_POSITION = 1 << 23;
        const SAMPLE_MASK_IN = 1 << 24;
        const SHADING_RATE = 1 << 25;
        const HELPER_INVOCATION = 1 << 26;
        const FRAG_DEPTH = 1 << 27;
        const SAMPLE_MASK = 1 << 28;
        const FRAG_STENCIL_REF = 1 << 29;

        // Interpolation modes and locations in use.
        const SMOOTH = 1 << 30;
        const FLAT = 1 << 31;
        const NOPERSPECTIVE = 1 << 32;
        const CENTER = 1 << 33;
        const CENTROID = 1 << 34;
        const SAMPLE = 1 << 35;
        const PULL_MODE = 1 << 36;
        const CUSTOM = 1 << 37;
        const RUN_AT_SAMPLE_RATE = 1 << 38;

        const BARY_COORD_NO_PERSP = 1 << 39;
        const BARY_COORD_NO_PERSP_CENTROID = 1 << 40;
        const BARY_COORD_NO_PERSP_SAMPLE = 1 << 41;
        const BARY_COORD_SMOOTH = 1 << 42;
        const BARY_COORD_SMOOTH_CENTROID = 1 << 43;
        const BARY_COORD_SMOOTH_SAMPLE = 1 << 44;
        const BARY_COORD_PULL_MODEL = 1 << 45;
        const BARY_COORD = 1 << 46;
        const BARY_COORD_NO_PERSP_KHR = 1 << 47;
    }
}

/// Built-in usage of one stage. Flags accumulate while the shader is built and are read-only
/// during lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuiltInUsage {
    pub flags: UsageFlags,
    /// Clip/cull distance array sizes written by the stage.
    pub clip_distance: u32,
    pub cull_distance: u32,
    /// Clip/cull distance array sizes read by the stage.
    pub clip_distance_in: u32,
    pub cull_distance_in: u32,
}

impl BuiltInUsage {
    pub fn has(&self, flags: UsageFlags) -> bool {
        self.flags.contains(flags)
    }

    pub fn has_any(&self, flags: UsageFlags) -> bool {
        self.flags.intersects(flags)
    }
}

/// What a used generic slot holds; drives packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotInfo {
    /// Scalar width: 16, 32 or 64 (8-bit values count as 16).
    pub bits: u32,
    /// Flat or custom interpolated; such slots never share a location with interpolated ones.
    pub flat: bool,
}

/// Scalar type of an FS color output, consumed by the color-export lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int,
    Uint,
    Float16,
    Float,
}

/// Hardware interpolation control of one FS input location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FsInterpInfo {
    pub location: u32,
    pub flat: bool,
    pub custom: bool,
    pub is_16bit: bool,
}

/// Stream-out target recorded for a GS output, read back by the copy shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XfbOutInfo {
    pub buffer: u32,
    pub offset: u32,
    pub is_16bit: bool,
    /// Ring dwords of the location (64-bit elements take two).
    pub dwords: u32,
}

/// Generic and built-in location bookkeeping of one stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InOutUsage {
    /// Slots touched by generic input/output markers (pre-packing keys).
    pub input_slots: BTreeMap<LocationInfo, SlotInfo>,
    pub output_slots: BTreeMap<LocationInfo, SlotInfo>,
    pub per_patch_input_slots: BTreeSet<u32>,
    pub per_patch_output_slots: BTreeSet<u32>,

    /// Original slot to packed slot. Filled by location assignment.
    pub input_loc_map: LocationMap,
    pub output_loc_map: LocationMap,
    pub per_patch_input_loc_map: BTreeMap<u32, u32>,
    pub per_patch_output_loc_map: BTreeMap<u32, u32>,
    pub builtin_input_loc_map: HashMap<BuiltIn, u32>,
    pub builtin_output_loc_map: HashMap<BuiltIn, u32>,
    pub per_patch_builtin_input_loc_map: HashMap<BuiltIn, u32>,
    pub per_patch_builtin_output_loc_map: HashMap<BuiltIn, u32>,

    pub input_map_loc_count: u32,
    pub output_map_loc_count: u32,
    pub per_patch_input_map_loc_count: u32,
    pub per_patch_output_map_loc_count: u32,

    pub enable_xfb: bool,
    /// Stride in bytes of each transform feedback buffer.
    pub xfb_strides: [u32; 4],
    /// Per vertex stream, mask of the transform feedback buffers it writes.
    pub stream_xfb_buffers: [u32; 4],

    pub fs_output_types: BTreeMap<u32, BasicType>,
    pub fs_interp_info: BTreeMap<u32, FsInterpInfo>,

    pub gs_out_loc_count: [u32; 4],
    /// Stream the GS writes its built-ins on; that stream is the one rasterized.
    pub gs_raster_stream: Option<u32>,
    pub gs_xfb_out_info: BTreeMap<LocationInfo, XfbOutInfo>,

    /// Number of parameter exports (`PARAM_0 + n`) the stage emits.
    pub exp_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceUsage {
    pub builtin: BuiltInUsage,
    pub in_out: InOutUsage,
}
