//! The copy shader of a legacy GS pipeline: reads one GS output vertex back from the GS→VS ring
//! and replays it as rasterizer exports and stream-out stores.
//!
//! With a single active stream the function is one block. Otherwise the entry block switches on
//! the stream id the hardware passes in, with one block per stream; only the raster stream's
//! block exports to the rasterizer.

use std::collections::BTreeSet;

use tracing::debug;
use vesper_ir::{
    BlockId, Builder, BuiltIn, EntryValue, Function, Operand, OutputExport, ScalarType,
    ShaderStage, Terminator, Type,
};

use super::storage::Place;
use super::Lowerer;
use crate::context::CompilationContext;
use crate::error::IoError;
use crate::layout::CalcFactor;
use crate::location::LocationInfo;
use crate::usage::{InOutUsage, XfbOutInfo};

/// Built-ins the copy shader forwards from the ring to the exports, when the GS wrote them.
const FORWARDED_BUILTINS: [BuiltIn; 9] = [
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

/// Builds the copy shader. Its output markers are lowered by the patch pass like any other
/// stage's; the ring reads are emitted here directly.
pub fn generate(ctx: &mut CompilationContext) -> Result<Function, IoError> {
    let gs_builtin = ctx.usage(ShaderStage::Geometry).builtin;
    ctx.usage_mut(ShaderStage::CopyShader).builtin = gs_builtin;
    let ctx: &CompilationContext = ctx;

    let gs = &ctx.usage(ShaderStage::Geometry).in_out;
    let raster = ctx.raster_stream();
    let mut streams: BTreeSet<u32> = (0..4u32)
        .filter(|s| gs.stream_xfb_buffers[*s as usize] != 0)
        .collect();
    streams.insert(raster);
    debug!(?streams, raster, "copy shader streams");

    let lowerer = Lowerer::new(ctx, ShaderStage::CopyShader, CalcFactor::default())?;
    let mut func = Function::new("copy_shader", ShaderStage::CopyShader);
    let entry = func.entry;

    let blocks: Vec<(u32, BlockId)> = if streams.len() == 1 {
        streams.iter().map(|s| (*s, entry)).collect()
    } else {
        let exit = func.add_block();
        let blocks: Vec<(u32, BlockId)> = streams.iter().map(|s| (*s, func.add_block())).collect();
        for (_, block) in &blocks {
            func.set_terminator(*block, Terminator::Branch(exit));
        }
        func.set_terminator(
            entry,
            Terminator::Switch {
                value: Operand::Entry(EntryValue::CopyStreamId),
                default: exit,
                cases: blocks.iter().map(|(s, b)| (u64::from(*s), *b)).collect(),
            },
        );
        blocks
    };

    for (stream, block) in blocks {
        let mut b = Builder::at_end(&mut func, block);
        lowerer.replay_xfb(&mut b, gs, stream)?;
        if stream == raster {
            lowerer.replay_raster(&mut b, gs, stream)?;
        }
    }
    Ok(func)
}

/// Blocks where the copy shader's rasterizer exports are flushed: the raster stream's block when
/// the shader switches on the stream, every return otherwise.
pub(super) fn raster_returns(func: &Function, ctx: &CompilationContext) -> Vec<BlockId> {
    let raster = u64::from(ctx.raster_stream());
    match &func.block(func.entry).term {
        Terminator::Switch {
            value: Operand::Entry(EntryValue::CopyStreamId),
            cases,
            ..
        } => cases
            .iter()
            .filter(|(stream, _)| *stream == raster)
            .map(|(_, block)| *block)
            .collect(),
        _ => func.return_blocks(),
    }
}

/// Ring location of a stream-out entry. The second half of a wide built-in follows its first.
fn xfb_ring_location(
    gs: &InOutUsage,
    key: &LocationInfo,
    info: &XfbOutInfo,
) -> Option<u32> {
    if !key.is_builtin {
        let generic = LocationInfo {
            is_builtin: false,
            component: 0,
            ..*key
        };
        return gs.output_loc_map.get(&generic).map(|l| l.location);
    }
    if key.location > 0 {
        let first = LocationInfo {
            location: key.location - 1,
            ..*key
        };
        if let Some(prev) = gs.gs_xfb_out_info.get(&first) {
            if prev.offset + 32 == info.offset && prev.dwords == 4 {
                return xfb_ring_location(gs, &first, prev).map(|l| l + 1);
            }
        }
    }
    let builtin = BuiltIn::from_index(key.location)?;
    gs.builtin_output_loc_map.get(&builtin).copied()
}

impl Lowerer<'_> {
    fn replay_xfb(&self, b: &mut Builder<'_>, gs: &InOutUsage, stream: u32) -> Result<(), IoError> {
        let place = Place::CopyRead { stream };
        for (key, info) in gs.gs_xfb_out_info.iter().filter(|(k, _)| u32::from(k.stream_id) == stream) {
            let location = xfb_ring_location(gs, key, info).ok_or(IoError::MissingLocation {
                stage: ShaderStage::CopyShader,
                info: *key,
            })?;
            let elem = if info.is_16bit { ScalarType::F16 } else { ScalarType::F32 };
            let ty = Type::scalar_or_vec(elem, info.dwords);
            let value = self.read_place(
                b,
                &place,
                ty,
                Operand::i32(location),
                Operand::i32(u32::from(key.component)),
            )?;
            b.export_output(OutputExport::Xfb {
                buffer: info.buffer,
                offset: info.offset,
                stream,
                value,
            });
        }
        Ok(())
    }

    fn replay_raster(&self, b: &mut Builder<'_>, gs: &InOutUsage, stream: u32) -> Result<(), IoError> {
        let place = Place::CopyRead { stream };
        let usage = self.ctx.usage(ShaderStage::Geometry).builtin;

        for builtin in FORWARDED_BUILTINS {
            let Some(location) = gs.builtin_output_loc_map.get(&builtin).copied() else {
                continue;
            };
            let array_size = match builtin {
                BuiltIn::ClipDistance => usage.clip_distance,
                BuiltIn::CullDistance => usage.cull_distance,
                _ => 0,
            };
            let value = self.read_place(b, &place, builtin.ty(array_size), Operand::i32(location), Operand::i32(0))?;
            b.export_output(OutputExport::BuiltIn {
                builtin,
                elem_idx: None,
                vertex_idx: None,
                stream,
                value,
            });
        }

        let locations: BTreeSet<u32> = gs
            .output_loc_map
            .iter()
            .filter(|(from, _)| u32::from(from.stream_id) == stream)
            .map(|(_, to)| to.location)
            .collect();
        for location in locations {
            let value = self.read_place(
                b,
                &place,
                Type::vec(ScalarType::I32, 4),
                Operand::i32(location),
                Operand::i32(0),
            )?;
            b.export_output(OutputExport::Generic {
                location,
                loc_offset: Operand::i32(0),
                elem_idx: Operand::i32(0),
                vertex_idx: None,
                stream,
                value,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineState, StageMask};
    use pretty_assertions::assert_eq;
    use vesper_ir::Instr;

    fn gs_ctx() -> CompilationContext {
        let pipeline = PipelineState {
            stages: StageMask::VERTEX | StageMask::GEOMETRY | StageMask::FRAGMENT | StageMask::COPY_SHADER,
            ..PipelineState::default()
        };
        CompilationContext::new(pipeline)
    }

    fn export_markers(func: &Function) -> Vec<String> {
        func.instrs()
            .filter_map(|(_, _, i)| match i {
                Instr::ExportOutput(e) => Some(e.to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn single_stream_is_one_block() {
        let mut ctx = gs_ctx();
        let gs = &mut ctx.usage_mut(ShaderStage::Geometry).in_out;
        gs.output_loc_map.insert(LocationInfo::new(3), LocationInfo::new(0));
        gs.builtin_output_loc_map.insert(BuiltIn::Position, 1);

        let func = generate(&mut ctx).unwrap();
        assert_eq!(func.blocks.len(), 1);
        assert_eq!(export_markers(&func).len(), 2);
        assert_eq!(raster_returns(&func, &ctx), vec![func.entry]);
    }

    #[test]
    fn streamed_out_streams_get_their_own_block() {
        let mut ctx = gs_ctx();
        let gs = &mut ctx.usage_mut(ShaderStage::Geometry).in_out;
        gs.enable_xfb = true;
        gs.xfb_strides[1] = 16;
        gs.stream_xfb_buffers[2] = 1 << 1;
        let key = LocationInfo::new(0).with_stream(2);
        gs.output_loc_map.insert(key, key);
        gs.gs_xfb_out_info.insert(
            key,
            XfbOutInfo {
                buffer: 1,
                offset: 0,
                is_16bit: false,
                dwords: 4,
            },
        );

        let func = generate(&mut ctx).unwrap();
        // Entry, exit, and one block per stream (0 rasterizes, 2 streams out).
        assert_eq!(func.blocks.len(), 4);
        let returns = raster_returns(&func, &ctx);
        assert_eq!(returns.len(), 1);
        assert_ne!(returns[0], func.entry);
        assert_eq!(
            ctx.usage(ShaderStage::CopyShader).builtin,
            ctx.usage(ShaderStage::Geometry).builtin
        );
    }

    #[test]
    fn wide_builtin_halves_are_adjacent() {
        let mut gs = InOutUsage::default();
        gs.builtin_output_loc_map.insert(BuiltIn::ClipDistance, 5);
        let first = LocationInfo {
            is_builtin: true,
            ..LocationInfo::new(BuiltIn::ClipDistance.index())
        };
        let second = LocationInfo {
            location: first.location + 1,
            ..first
        };
        let info = |offset, dwords| XfbOutInfo {
            buffer: 0,
            offset,
            is_16bit: false,
            dwords,
        };
        gs.gs_xfb_out_info.insert(first, info(0, 4));
        gs.gs_xfb_out_info.insert(second, info(32, 4));
        assert_eq!(xfb_ring_location(&gs, &first, &info(0, 4)), Some(5));
        assert_eq!(xfb_ring_location(&gs, &second, &info(32, 4)), Some(6));
    }
}
