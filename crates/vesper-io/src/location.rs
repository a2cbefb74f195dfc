//! Location/component maps and the location assignment pass.
//!
//! Builder calls record which logical slots each stage touches. Before lowering, every stage
//! boundary is linked: the consumer's inputs get dense physical locations, and the producer's
//! outputs follow them. Outputs nobody reads are dropped, except TCS outputs, which stay
//! addressable because the TCS itself may read them back.
//!
//! Across the VS/TES→FS boundary, when both packing options are on, slots are packed at component
//! granularity: 64-bit scalars take two aligned channels, and two 16-bit scalars share one channel
//! (low and high half). Flat slots never share a location with interpolated ones.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use hashbrown::HashMap;
use tracing::debug;
use vesper_ir::{BuiltIn, ShaderStage};

use crate::context::CompilationContext;
use crate::error::IoError;
use crate::layout::GsRingFactor;
use crate::usage::{BuiltInUsage, SlotInfo, UsageFlags};

/// A logical or physical I/O slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LocationInfo {
    pub location: u32,
    /// 32-bit channel, 0..4.
    pub component: u8,
    pub stream_id: u8,
    pub is_builtin: bool,
    /// Upper 16 bits of the channel.
    pub is_high_half: bool,
}

impl LocationInfo {
    pub const fn new(location: u32) -> Self {
        Self {
            location,
            component: 0,
            stream_id: 0,
            is_builtin: false,
            is_high_half: false,
        }
    }

    pub const fn with_component(mut self, component: u8) -> Self {
        self.component = component;
        self
    }

    pub const fn with_stream(mut self, stream: u8) -> Self {
        self.stream_id = stream;
        self
    }

    pub const fn high_half(mut self) -> Self {
        self.is_high_half = true;
        self
    }

    /// Key of 32-bit channel `channel` counted from this slot, spilling into following locations.
    pub const fn channel(self, channel: u32) -> Self {
        let abs = self.component as u32 + channel;
        Self {
            location: self.location + abs / 4,
            component: (abs % 4) as u8,
            ..self
        }
    }
}

impl fmt::Display for LocationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "location {}.{}", self.location, self.component)?;
        if self.is_high_half {
            f.write_str(".hi")?;
        }
        if self.stream_id != 0 {
            write!(f, " (stream {})", self.stream_id)?;
        }
        if self.is_builtin {
            f.write_str(" (built-in)")?;
        }
        Ok(())
    }
}

/// Logical slot to physical slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationMap {
    map: BTreeMap<LocationInfo, LocationInfo>,
}

impl LocationMap {
    pub fn insert(&mut self, from: LocationInfo, to: LocationInfo) {
        self.map.insert(from, to);
    }

    pub fn get(&self, from: &LocationInfo) -> Option<LocationInfo> {
        self.map.get(from).copied()
    }

    /// Physical location of a whole (unpacked) logical location.
    pub fn location(&self, location: u32) -> Option<u32> {
        self.get(&LocationInfo::new(location)).map(|l| l.location)
    }

    pub fn contains(&self, from: &LocationInfo) -> bool {
        self.map.contains_key(from)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LocationInfo, &LocationInfo)> {
        self.map.iter()
    }

    /// One past the highest physical location in use; 0 when empty.
    pub fn loc_count(&self) -> u32 {
        self.map.values().map(|l| l.location + 1).max().unwrap_or(0)
    }
}

/// Packs `slots` densely from location 0. Interpolated slots come first, flat ones after, each
/// group starting on a fresh location.
pub fn pack_slots(slots: &BTreeMap<LocationInfo, SlotInfo>) -> LocationMap {
    let mut map = LocationMap::default();
    let mut next_loc = 0u32;
    fn wrap(comp: &mut u32, next_loc: &mut u32, need: u32) {
        if *comp + need > 4 {
            *next_loc += 1;
            *comp = 0;
        }
    }

    for flat in [false, true] {
        let mut comp = 0u32;
        let mut open_half: Option<LocationInfo> = None;
        for (key, info) in slots.iter().filter(|(_, info)| info.flat == flat) {
            let packed = match info.bits {
                64 => {
                    comp += comp % 2;
                    wrap(&mut comp, &mut next_loc, 2);
                    let slot = LocationInfo::new(next_loc).with_component(comp as u8);
                    comp += 2;
                    slot
                }
                16 => match open_half.take() {
                    Some(low) => low.high_half(),
                    None => {
                        wrap(&mut comp, &mut next_loc, 1);
                        let slot = LocationInfo::new(next_loc).with_component(comp as u8);
                        open_half = Some(slot);
                        comp += 1;
                        slot
                    }
                },
                _ => {
                    wrap(&mut comp, &mut next_loc, 1);
                    let slot = LocationInfo::new(next_loc).with_component(comp as u8);
                    comp += 1;
                    slot
                }
            };
            map.insert(*key, packed);
        }
        if comp > 0 {
            next_loc += 1;
        }
    }
    map
}

/// Numbers the distinct locations of `keys` from 0 in order; components and streams carry over.
pub fn dense_map<'a>(keys: impl IntoIterator<Item = &'a LocationInfo>) -> LocationMap {
    let keys: Vec<LocationInfo> = keys.into_iter().copied().collect();
    let locations: BTreeSet<u32> = keys.iter().map(|k| k.location).collect();
    let index: BTreeMap<u32, u32> = locations
        .into_iter()
        .enumerate()
        .map(|(i, loc)| (loc, i as u32))
        .collect();
    let mut map = LocationMap::default();
    for key in keys {
        let location = index[&key.location];
        map.insert(key, LocationInfo { location, ..key });
    }
    map
}

/// Identity map over `keys`.
fn identity_map<'a>(keys: impl IntoIterator<Item = &'a LocationInfo>) -> LocationMap {
    let mut map = LocationMap::default();
    for key in keys {
        map.insert(*key, *key);
    }
    map
}

/// Producer outputs linked to consumer inputs. Unread outputs are dropped unless `keep_unread`, in
/// which case they are appended after the consumer's locations.
fn follow_consumer<'a>(
    outputs: impl IntoIterator<Item = &'a LocationInfo>,
    consumer: &LocationMap,
    keep_unread: bool,
) -> LocationMap {
    let mut map = LocationMap::default();
    let mut unread = BTreeSet::new();
    for key in outputs {
        match consumer.get(key) {
            Some(to) => map.insert(*key, to),
            None if keep_unread => {
                unread.insert(key.location);
            }
            None => {}
        }
    }
    let mut next = consumer.loc_count();
    let mut appended = BTreeMap::new();
    for loc in unread {
        appended.insert(loc, next);
        next += 1;
    }
    for (loc, to) in appended {
        map.insert(LocationInfo::new(loc), LocationInfo::new(to));
    }
    map
}

/// TCS outputs and TES inputs numbered together in location order, so that a location range the
/// TCS addresses with a runtime offset stays contiguous whichever part of it the TES reads.
/// Returns `(input_map, output_map)`.
fn link_in_order<'a>(
    outputs: impl IntoIterator<Item = &'a LocationInfo>,
    inputs: impl IntoIterator<Item = &'a LocationInfo>,
) -> (LocationMap, LocationMap) {
    let outputs: BTreeSet<LocationInfo> = outputs.into_iter().copied().collect();
    let inputs: BTreeSet<LocationInfo> = inputs.into_iter().copied().collect();
    let all = dense_map(outputs.union(&inputs));
    let restrict = |keys: &BTreeSet<LocationInfo>| {
        let mut map = LocationMap::default();
        for key in keys {
            if let Some(to) = all.get(key) {
                map.insert(*key, to);
            }
        }
        map
    };
    (restrict(&inputs), restrict(&outputs))
}

/// Built-ins that travel between vertex-processing stages through LDS or a ring, in slot order.
const VERTEX_BUILTINS: [BuiltIn; 9] = [
    BuiltIn::Position,
    BuiltIn::PointSize,
    BuiltIn::ClipDistance,
    BuiltIn::CullDistance,
    BuiltIn::PrimitiveId,
    BuiltIn::Layer,
    BuiltIn::ViewportIndex,
    BuiltIn::ViewIndex,
    BuiltIn::PrimitiveShadingRate,
];

/// Built-ins the FS reads from parameter slots, in slot order.
const FS_BUILTINS: [BuiltIn; 7] = [
    BuiltIn::ClipDistance,
    BuiltIn::CullDistance,
    BuiltIn::PrimitiveId,
    BuiltIn::Layer,
    BuiltIn::ViewportIndex,
    BuiltIn::ViewIndex,
    BuiltIn::PointCoord,
];

fn writes_builtin(usage: &BuiltInUsage, builtin: BuiltIn, multiview: bool) -> bool {
    match builtin {
        BuiltIn::Position => usage.has(UsageFlags::POSITION),
        BuiltIn::PointSize => usage.has(UsageFlags::POINT_SIZE),
        BuiltIn::ClipDistance => usage.clip_distance > 0,
        BuiltIn::CullDistance => usage.cull_distance > 0,
        BuiltIn::PrimitiveId => usage.has(UsageFlags::PRIMITIVE_ID),
        BuiltIn::Layer => usage.has(UsageFlags::LAYER),
        BuiltIn::ViewportIndex => usage.has(UsageFlags::VIEWPORT_INDEX),
        BuiltIn::ViewIndex => multiview,
        BuiltIn::PrimitiveShadingRate => usage.has(UsageFlags::PRIMITIVE_SHADING_RATE),
        BuiltIn::TessLevelOuter => usage.has(UsageFlags::TESS_LEVEL_OUTER),
        BuiltIn::TessLevelInner => usage.has(UsageFlags::TESS_LEVEL_INNER),
        _ => false,
    }
}

fn reads_builtin(usage: &BuiltInUsage, builtin: BuiltIn) -> bool {
    match builtin {
        BuiltIn::Position => usage.has(UsageFlags::POSITION_IN),
        BuiltIn::PointSize => usage.has(UsageFlags::POINT_SIZE_IN),
        BuiltIn::ClipDistance => usage.clip_distance_in > 0,
        BuiltIn::CullDistance => usage.cull_distance_in > 0,
        BuiltIn::PrimitiveId => usage.has(UsageFlags::PRIMITIVE_ID_IN),
        BuiltIn::Layer => usage.has(UsageFlags::LAYER_IN),
        BuiltIn::ViewportIndex => usage.has(UsageFlags::VIEWPORT_INDEX_IN),
        BuiltIn::ViewIndex => usage.has(UsageFlags::VIEW_INDEX),
        BuiltIn::PointCoord => usage.has(UsageFlags::POINT_COORD),
        BuiltIn::TessLevelOuter => usage.has(UsageFlags::TESS_LEVEL_OUTER_IN),
        BuiltIn::TessLevelInner => usage.has(UsageFlags::TESS_LEVEL_INNER_IN),
        _ => false,
    }
}

/// Locations a built-in occupies between vertex-processing stages.
fn builtin_slot_count(builtin: BuiltIn, producer: &BuiltInUsage, consumer: &BuiltInUsage) -> u32 {
    let dwords = match builtin {
        BuiltIn::ClipDistance => producer.clip_distance.max(consumer.clip_distance_in),
        BuiltIn::CullDistance => producer.cull_distance.max(consumer.cull_distance_in),
        _ => 1,
    };
    dwords.div_ceil(4).max(1)
}

/// Assigns built-in slots shared by both sides of a boundary, starting at `first`. Returns one
/// past the last slot.
fn assign_builtins(
    list: &[BuiltIn],
    first: u32,
    producer: Option<&BuiltInUsage>,
    consumer: Option<&BuiltInUsage>,
    multiview: bool,
) -> (HashMap<BuiltIn, u32>, u32) {
    let none = BuiltInUsage::default();
    let (p, c) = (producer.unwrap_or(&none), consumer.unwrap_or(&none));
    let mut map = HashMap::new();
    let mut next = first;
    for &builtin in list {
        if writes_builtin(p, builtin, multiview && producer.is_some()) || reads_builtin(c, builtin) {
            map.insert(builtin, next);
            next += builtin_slot_count(builtin, p, c);
        }
    }
    (map, next)
}

/// FS built-in slots. Clip and cull distances share locations: cull starts right after the last
/// clip element.
fn assign_fs_builtins(fs: &BuiltInUsage, first: u32) -> (HashMap<BuiltIn, u32>, u32) {
    let mut map = HashMap::new();
    let mut next = first;
    let (clip, cull) = (fs.clip_distance_in, fs.cull_distance_in);
    if clip > 0 {
        map.insert(BuiltIn::ClipDistance, next);
    }
    if cull > 0 {
        map.insert(BuiltIn::CullDistance, next + clip / 4);
    }
    next += (clip + cull).div_ceil(4);
    for &builtin in &FS_BUILTINS[2..] {
        if reads_builtin(fs, builtin) {
            map.insert(builtin, next);
            next += 1;
        }
    }
    (map, next)
}

fn max_loc(builtins: &HashMap<BuiltIn, u32>, end: u32, generic: u32) -> u32 {
    if builtins.is_empty() {
        generic
    } else {
        end.max(generic)
    }
}

/// Builds every stage's location maps from the recorded usage. Runs once per compile, before
/// the patch pass.
pub fn assign_locations(ctx: &mut CompilationContext) -> Result<(), IoError> {
    let pipeline = ctx.pipeline.clone();
    let multiview = pipeline.input_assembly.multiview;

    for consumer in [
        ShaderStage::TessControl,
        ShaderStage::TessEval,
        ShaderStage::Geometry,
    ] {
        if !pipeline.has_stage(consumer) {
            continue;
        }
        let producer = pipeline.prev_stage(consumer);
        link_vertex_boundary(ctx, producer, consumer, multiview);
    }
    if pipeline.has_stage(ShaderStage::TessControl) && pipeline.has_stage(ShaderStage::TessEval) {
        link_patch_boundary(ctx);
    }
    if pipeline.has_geometry() {
        assign_gs_outputs(ctx)?;
    }
    link_fragment_boundary(ctx)?;

    if pipeline.has_geometry() {
        let ring = GsRingFactor::compute(ctx);
        debug!(?ring, "gs ring layout");
        ctx.set_gs_ring(ring);
    }

    for stage in ShaderStage::ALL {
        if !pipeline.has_stage(stage) {
            continue;
        }
        let io = &ctx.usage(stage).in_out;
        debug!(
            %stage,
            inputs = io.input_map_loc_count,
            outputs = io.output_map_loc_count,
            patch_inputs = io.per_patch_input_map_loc_count,
            patch_outputs = io.per_patch_output_map_loc_count,
            "locations assigned"
        );
    }
    ctx.mark_locations_assigned();
    Ok(())
}

/// Producer → consumer through LDS or the ES→GS ring.
fn link_vertex_boundary(
    ctx: &mut CompilationContext,
    producer: Option<ShaderStage>,
    consumer: ShaderStage,
    multiview: bool,
) {
    let consumer_usage = ctx.usage(consumer).clone();
    let inputs = &consumer_usage.in_out.input_slots;
    let producer_usage = producer.map(|p| ctx.usage(p).clone());
    let (input_map, output_map) = match (&producer_usage, producer) {
        (Some(usage), Some(ShaderStage::TessControl)) => {
            link_in_order(usage.in_out.output_slots.keys(), inputs.keys())
        }
        (Some(usage), Some(_)) => {
            let input_map = dense_map(inputs.keys());
            let output_map = follow_consumer(usage.in_out.output_slots.keys(), &input_map, false);
            (input_map, output_map)
        }
        _ => (dense_map(inputs.keys()), LocationMap::default()),
    };
    let generic_inputs = input_map.loc_count();
    let generic = generic_inputs.max(output_map.loc_count());

    // Only position-like built-ins cross into TCS/TES/GS; the rest is not readable there.
    let list = &VERTEX_BUILTINS[..4];
    let (builtins, end) = assign_builtins(
        list,
        generic,
        producer_usage.as_ref().map(|u| &u.builtin),
        Some(&consumer_usage.builtin),
        multiview,
    );

    {
        let io = &mut ctx.usage_mut(consumer).in_out;
        io.input_loc_map = input_map;
        io.builtin_input_loc_map = builtins.clone();
        io.input_map_loc_count = max_loc(&builtins, end, generic_inputs);
    }
    if let Some(p) = producer {
        let io = &mut ctx.usage_mut(p).in_out;
        let generic_outputs = output_map.loc_count();
        io.output_loc_map = output_map;
        io.output_map_loc_count = max_loc(&builtins, end, generic_outputs);
        io.builtin_output_loc_map = builtins;
    }
}

/// TCS per-patch outputs → TES per-patch inputs, including the tessellation levels.
fn link_patch_boundary(ctx: &mut CompilationContext) {
    let tes = ctx.usage(ShaderStage::TessEval).clone();
    let tcs = ctx.usage(ShaderStage::TessControl).clone();

    // Same ordering rule as the per-vertex TCS outputs.
    let inputs = &tes.in_out.per_patch_input_slots;
    let outputs = &tcs.in_out.per_patch_output_slots;
    let index: BTreeMap<u32, u32> = inputs
        .union(outputs)
        .enumerate()
        .map(|(i, loc)| (*loc, i as u32))
        .collect();
    let input_map: BTreeMap<u32, u32> = inputs.iter().map(|loc| (*loc, index[loc])).collect();
    let output_map: BTreeMap<u32, u32> = outputs.iter().map(|loc| (*loc, index[loc])).collect();
    let generic = index.len() as u32;
    let (builtins, end) = assign_builtins(
        &[BuiltIn::TessLevelOuter, BuiltIn::TessLevelInner],
        generic,
        Some(&tcs.builtin),
        Some(&tes.builtin),
        false,
    );

    let count = end.max(generic);
    {
        let io = &mut ctx.usage_mut(ShaderStage::TessEval).in_out;
        io.per_patch_input_loc_map = input_map;
        io.per_patch_builtin_input_loc_map = builtins.clone();
        io.per_patch_input_map_loc_count = count;
    }
    let io = &mut ctx.usage_mut(ShaderStage::TessControl).in_out;
    io.per_patch_output_loc_map = output_map;
    io.per_patch_builtin_output_loc_map = builtins;
    io.per_patch_output_map_loc_count = count;
}

/// GS outputs into the GS→VS ring, per stream. On the raster stream, locations the FS reads are
/// placed where the FS expects them.
fn assign_gs_outputs(ctx: &mut CompilationContext) -> Result<(), IoError> {
    let raster_stream = ctx.raster_stream();
    let fs_inputs = if ctx.pipeline.has_stage(ShaderStage::Fragment) && !ctx.pipeline.unlinked {
        Some(dense_map(ctx.usage(ShaderStage::Fragment).in_out.input_slots.keys()))
    } else {
        None
    };
    let gs = ctx.usage(ShaderStage::Geometry).clone();
    let multiview = ctx.pipeline.input_assembly.multiview;

    let mut map = LocationMap::default();
    let mut out_loc_count = [0u32; 4];
    for stream in 0..4u32 {
        let keys: Vec<LocationInfo> = gs
            .in_out
            .output_slots
            .keys()
            .filter(|k| k.stream_id as u32 == stream)
            .copied()
            .collect();
        let stream_map = match (&fs_inputs, stream == raster_stream) {
            (Some(fs), true) => {
                let unstreamed: Vec<LocationInfo> =
                    keys.iter().map(|k| LocationInfo { stream_id: 0, ..*k }).collect();
                let linked = follow_consumer(unstreamed.iter(), fs, true);
                let mut restreamed = LocationMap::default();
                for (from, to) in linked.iter() {
                    restreamed.insert(
                        from.with_stream(stream as u8),
                        to.with_stream(stream as u8),
                    );
                }
                restreamed
            }
            _ => dense_map(keys.iter()),
        };
        out_loc_count[stream as usize] = stream_map.loc_count();
        for (from, to) in stream_map.iter() {
            map.insert(*from, *to);
        }
    }

    let raster = raster_stream as usize;
    let (builtins, end) = assign_builtins(
        &VERTEX_BUILTINS,
        out_loc_count[raster],
        Some(&gs.builtin),
        None,
        multiview,
    );
    if !builtins.is_empty() {
        out_loc_count[raster] = end;
    }

    let io = &mut ctx.usage_mut(ShaderStage::Geometry).in_out;
    io.output_map_loc_count = out_loc_count.iter().copied().max().unwrap_or(0);
    io.output_loc_map = map;
    io.builtin_output_loc_map = builtins;
    io.gs_out_loc_count = out_loc_count;
    debug!(?out_loc_count, raster_stream, "gs output locations");
    Ok(())
}

/// Last vertex-processing stage → FS through parameter exports.
fn link_fragment_boundary(ctx: &mut CompilationContext) -> Result<(), IoError> {
    let pipeline = ctx.pipeline.clone();
    // The hardware stage that exports parameters.
    let producer = if pipeline.has_geometry() && !pipeline.ngg {
        Some(ShaderStage::CopyShader)
    } else {
        pipeline.last_vertex_stage()
    };
    let has_fs = pipeline.has_stage(ShaderStage::Fragment);

    if !has_fs {
        // Nothing reads the outputs; keep them all, densely.
        if let Some(p) = producer.filter(|p| *p != ShaderStage::Geometry && *p != ShaderStage::CopyShader) {
            let io = &mut ctx.usage_mut(p).in_out;
            io.output_loc_map = dense_map(io.output_slots.keys());
            io.output_map_loc_count = io.output_loc_map.loc_count();
        }
        return Ok(());
    }

    let fs = ctx.usage(ShaderStage::Fragment).clone();
    let packed = producer.is_some_and(|p| pipeline.packs_boundary(p));
    let input_map = if pipeline.unlinked {
        identity_map(fs.in_out.input_slots.keys())
    } else if packed {
        pack_slots(&fs.in_out.input_slots)
    } else {
        dense_map(fs.in_out.input_slots.keys())
    };
    let generic = input_map.loc_count();
    let (builtins, end) = assign_fs_builtins(&fs.builtin, generic);

    {
        let io = &mut ctx.usage_mut(ShaderStage::Fragment).in_out;
        io.input_map_loc_count = max_loc(&builtins, end, generic);
        io.builtin_input_loc_map = builtins.clone();
        io.input_loc_map = input_map.clone();
    }

    let Some(producer) = producer else {
        return Ok(());
    };
    let mut exported = builtins;
    exported.remove(&BuiltIn::PointCoord);

    match producer {
        ShaderStage::CopyShader => {
            // The copy shader exports GS raster-stream locations as they are; only built-ins
            // need slots of their own.
            let io = &mut ctx.usage_mut(ShaderStage::CopyShader).in_out;
            io.builtin_output_loc_map = exported;
            io.output_map_loc_count = max_loc(&io.builtin_output_loc_map, end, generic);
        }
        ShaderStage::Geometry => {
            // NGG: the primitive shader generator exports from the GS output slots.
        }
        p => {
            let usage = ctx.usage(p).clone();
            let output_map = if pipeline.unlinked {
                identity_map(usage.in_out.output_slots.keys())
            } else {
                follow_consumer(usage.in_out.output_slots.keys(), &input_map, false)
            };
            let io = &mut ctx.usage_mut(p).in_out;
            let generic_outputs = output_map.loc_count();
            io.output_loc_map = output_map;
            io.output_map_loc_count = max_loc(&exported, end, generic_outputs);
            io.builtin_output_loc_map = exported;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineState, StageMask};
    use pretty_assertions::assert_eq;

    fn slot(bits: u32, flat: bool) -> SlotInfo {
        SlotInfo { bits, flat }
    }

    #[test]
    fn packing_aligns_doubles_and_pairs_halves() {
        let mut slots = BTreeMap::new();
        slots.insert(LocationInfo::new(0), slot(32, false));
        slots.insert(LocationInfo::new(1), slot(64, false));
        slots.insert(LocationInfo::new(2), slot(16, false));
        slots.insert(LocationInfo::new(3), slot(16, false));
        slots.insert(LocationInfo::new(4), slot(32, true));

        let map = pack_slots(&slots);
        assert_eq!(map.get(&LocationInfo::new(0)), Some(LocationInfo::new(0)));
        // The double skips the odd channel and still fits in location 0.
        assert_eq!(
            map.get(&LocationInfo::new(1)),
            Some(LocationInfo::new(0).with_component(2))
        );
        assert_eq!(
            map.get(&LocationInfo::new(2)),
            Some(LocationInfo::new(1).with_component(0))
        );
        assert_eq!(
            map.get(&LocationInfo::new(3)),
            Some(LocationInfo::new(1).with_component(0).high_half())
        );
        // Flat values start a new location.
        assert_eq!(map.get(&LocationInfo::new(4)), Some(LocationInfo::new(2)));
        assert_eq!(map.loc_count(), 3);
    }

    #[test]
    fn dense_map_closes_gaps() {
        let keys = [LocationInfo::new(3), LocationInfo::new(7), LocationInfo::new(3).with_component(2)];
        let map = dense_map(keys.iter());
        assert_eq!(map.location(3), Some(0));
        assert_eq!(map.location(7), Some(1));
        assert_eq!(
            map.get(&LocationInfo::new(3).with_component(2)),
            Some(LocationInfo::new(0).with_component(2))
        );
    }

    #[test]
    fn vertex_outputs_follow_tcs_inputs() {
        let pipeline = PipelineState {
            stages: StageMask::VERTEX
                | StageMask::TESS_CONTROL
                | StageMask::TESS_EVAL
                | StageMask::FRAGMENT,
            ..PipelineState::default()
        };
        let mut ctx = CompilationContext::new(pipeline);
        let vs = &mut ctx.usage_mut(ShaderStage::Vertex).in_out;
        vs.output_slots.insert(LocationInfo::new(2), slot(32, false));
        vs.output_slots.insert(LocationInfo::new(5), slot(32, false));
        let tcs = &mut ctx.usage_mut(ShaderStage::TessControl).in_out;
        tcs.input_slots.insert(LocationInfo::new(5), slot(32, false));
        ctx.usage_mut(ShaderStage::TessControl).builtin.flags |= UsageFlags::POSITION_IN;
        ctx.usage_mut(ShaderStage::Vertex).builtin.flags |= UsageFlags::POSITION;

        assign_locations(&mut ctx).unwrap();

        let vs = &ctx.usage(ShaderStage::Vertex).in_out;
        let tcs = &ctx.usage(ShaderStage::TessControl).in_out;
        assert_eq!(vs.output_loc_map.location(5), Some(0));
        assert_eq!(vs.output_loc_map.location(2), None);
        assert_eq!(tcs.input_loc_map.location(5), Some(0));
        assert_eq!(vs.builtin_output_loc_map.get(&BuiltIn::Position), Some(&1));
        assert_eq!(tcs.builtin_input_loc_map.get(&BuiltIn::Position), Some(&1));
        assert_eq!(tcs.input_map_loc_count, 2);
    }

    #[test]
    fn tcs_outputs_keep_their_order_around_tes_inputs() {
        let pipeline = PipelineState {
            stages: StageMask::VERTEX | StageMask::TESS_CONTROL | StageMask::TESS_EVAL,
            ..PipelineState::default()
        };
        let mut ctx = CompilationContext::new(pipeline);
        let tcs = &mut ctx.usage_mut(ShaderStage::TessControl).in_out;
        tcs.output_slots.insert(LocationInfo::new(1), slot(32, false));
        tcs.output_slots.insert(LocationInfo::new(4), slot(32, false));
        tcs.per_patch_output_slots.insert(3);
        ctx.usage_mut(ShaderStage::TessEval)
            .in_out
            .input_slots
            .insert(LocationInfo::new(4), slot(32, false));

        assign_locations(&mut ctx).unwrap();

        let tcs = &ctx.usage(ShaderStage::TessControl).in_out;
        let tes = &ctx.usage(ShaderStage::TessEval).in_out;
        assert_eq!(tcs.output_loc_map.location(1), Some(0));
        assert_eq!(tcs.output_loc_map.location(4), Some(1));
        assert_eq!(tes.input_loc_map.location(4), Some(1));
        assert_eq!(tcs.per_patch_output_loc_map.get(&3), Some(&0));
    }

    #[test]
    fn tcs_output_array_stays_contiguous_when_tes_reads_part_of_it() {
        let pipeline = PipelineState {
            stages: StageMask::VERTEX | StageMask::TESS_CONTROL | StageMask::TESS_EVAL,
            ..PipelineState::default()
        };
        let mut ctx = CompilationContext::new(pipeline);
        let tcs = &mut ctx.usage_mut(ShaderStage::TessControl).in_out;
        for loc in 0..3 {
            tcs.output_slots.insert(LocationInfo::new(loc), slot(32, false));
        }
        tcs.per_patch_output_slots.extend(5..8);
        let tes = &mut ctx.usage_mut(ShaderStage::TessEval).in_out;
        tes.input_slots.insert(LocationInfo::new(0), slot(32, false));
        tes.input_slots.insert(LocationInfo::new(2), slot(32, false));
        tes.per_patch_input_slots.insert(7);

        assign_locations(&mut ctx).unwrap();

        let tcs = &ctx.usage(ShaderStage::TessControl).in_out;
        let tes = &ctx.usage(ShaderStage::TessEval).in_out;
        let tcs_out: Vec<Option<u32>> = (0..3).map(|l| tcs.output_loc_map.location(l)).collect();
        assert_eq!(tcs_out, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(tes.input_loc_map.location(0), Some(0));
        assert_eq!(tes.input_loc_map.location(2), Some(2));
        assert_eq!(tes.input_loc_map.location(1), None);

        let patch_out: Vec<Option<&u32>> = (5..8).map(|l| tcs.per_patch_output_loc_map.get(&l)).collect();
        assert_eq!(patch_out, vec![Some(&0), Some(&1), Some(&2)]);
        assert_eq!(tes.per_patch_input_loc_map.get(&7), Some(&2));
        assert_eq!(tcs.per_patch_output_map_loc_count, 3);
    }

    #[test]
    fn fs_clip_and_cull_share_locations() {
        let fs = BuiltInUsage {
            flags: UsageFlags::PRIMITIVE_ID_IN,
            clip_distance_in: 5,
            cull_distance_in: 2,
            ..BuiltInUsage::default()
        };
        let (map, end) = assign_fs_builtins(&fs, 3);
        assert_eq!(map[&BuiltIn::ClipDistance], 3);
        assert_eq!(map[&BuiltIn::CullDistance], 4);
        assert_eq!(map[&BuiltIn::PrimitiveId], 5);
        assert_eq!(end, 6);
    }
}
