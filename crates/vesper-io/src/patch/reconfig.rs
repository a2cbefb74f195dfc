//! Compute workgroup reconfiguration: remaps the local invocation id so that consecutive threads
//! cover 2x2 quads (or 8x8 tiles of quads) instead of rows, which keeps image accesses of a wave
//! close together.

use tracing::debug;
use vesper_ir::instr::CmpPred;
use vesper_ir::{BlockId, Builder, Function, Instr, Operand, ScalarType, Type};

use crate::context::CompilationContext;
use crate::error::IoError;
use crate::pipeline::{PipelineState, WorkgroupLayout};

/// The layout the compute shader ends up with.
///
/// An explicit layout wins over the heuristic; an unknown one is reconfigured only for shaders
/// that touch images when the option is on. Reconfiguration needs even X and Y sizes and falls
/// back to quads unless the workgroup spans more than one 8x8 tile.
pub fn workgroup_layout(pipeline: &PipelineState) -> WorkgroupLayout {
    let compute = &pipeline.compute;
    let reconfig = match compute.layout {
        WorkgroupLayout::Unknown => compute.uses_images && pipeline.options.reconfig_workgroup_layout,
        WorkgroupLayout::Linear => false,
        WorkgroupLayout::Quads | WorkgroupLayout::SexagintiQuads => true,
    };
    let [x, y, _] = compute.workgroup_size;
    if !reconfig || x % 2 != 0 || y % 2 != 0 {
        return compute.layout;
    }
    if (x > 8 && y >= 8) || (x >= 8 && y > 8) {
        WorkgroupLayout::SexagintiQuads
    } else {
        WorkgroupLayout::Quads
    }
}

/// Replaces every reconfiguration marker of `func` with the remapped id, or with its operand when
/// the layout stays linear.
pub(super) fn lower(ctx: &CompilationContext, func: &mut Function) -> Result<(), IoError> {
    let layout = workgroup_layout(&ctx.pipeline);
    let remap = matches!(layout, WorkgroupLayout::Quads | WorkgroupLayout::SexagintiQuads);
    debug!(?layout, remap, function = %func.name, "workgroup layout");

    for block in 0..func.blocks.len() {
        let id = BlockId(block as u32);
        let mut pos = 0;
        while pos < func.block(id).instrs.len() {
            let Instr::ReconfigureLocalInvocationId { dst, value } = func.block(id).instrs[pos] else {
                pos += 1;
                continue;
            };
            func.block_mut(id).instrs.remove(pos);
            let mut b = Builder::at(func, id, pos);
            let remapped = if remap {
                remap_local_id(&mut b, ctx.pipeline.compute.workgroup_size, layout, value)
            } else {
                value
            };
            pos = b.position();
            func.replace_all_uses(dst, remapped);
        }
    }
    Ok(())
}

/// `x / divisor` in 16 bits, which is enough for any workgroup and much cheaper than a 32-bit
/// division.
fn udiv16(b: &mut Builder<'_>, x: Operand, divisor: Operand) -> Operand {
    let x = b.trunc(x, Type::I16);
    let divisor = b.zext_or_trunc(divisor, Type::I16);
    let quotient = b.udiv(x, divisor);
    b.zext(quotient, Type::I32)
}

/// `x / divisor` for a constant divisor.
fn udiv_const(b: &mut Builder<'_>, x: Operand, divisor: u32) -> Operand {
    if divisor.is_power_of_two() {
        b.lshr(x, Operand::i32(divisor.trailing_zeros()))
    } else {
        udiv16(b, x, Operand::i32(divisor))
    }
}

/// Reshapes the linear thread index in X into quads: the two low bits pick the position inside a
/// 2x2 quad, the rest walks the quads row by row. For 8x8 tiles the index is first split into a
/// tile number and a position inside the tile. The original Y moves to Z.
fn remap_local_id(
    b: &mut Builder<'_>,
    size: [u32; 3],
    layout: WorkgroupLayout,
    id: Operand,
) -> Operand {
    let [size_x, size_y, size_z] = size;
    let id = if size_z > 1 {
        // Lane 1 is overwritten below.
        b.shuffle(id, id, &[0, 0, 1])
    } else {
        b.insert_lane(id, Operand::i32(0), 2)
    };

    let x = b.extract_lane(id, 0);
    let bit0 = b.and(x, Operand::i32(1));
    let bit1 = b.and(x, Operand::i32(2));
    let bit1 = b.lshr(bit1, Operand::i32(1));

    let tile = (layout == WorkgroupLayout::SexagintiQuads).then(|| {
        let tile_threads = size_y * 8;
        let tile = udiv_const(b, x, tile_threads);
        let start = b.mul(tile, Operand::i32(tile_threads));
        (tile, b.sub(x, start))
    });
    let in_tile = tile.map_or(x, |(_, masked)| masked);
    let remaining = b.and(in_tile, Operand::i32(!3));

    let (row, rem) = match tile {
        Some(_) if size_x % 8 == 0 && size_y % 8 == 0 => {
            let row = b.lshr(remaining, Operand::i32(4));
            let start = b.shl(row, Operand::i32(4));
            (row, b.sub(remaining, start))
        }
        Some((tile, _)) => {
            // The last tile of a row can be narrower than 8.
            let tile_x = b.shl(tile, Operand::i32(3));
            let width = b.sub(Operand::i32(size_x), tile_x);
            let narrow = b.icmp(CmpPred::Ult, width, Operand::i32(8));
            let width = b.select(narrow, width, Operand::i32(8));
            let row_threads = b.shl(width, Operand::i32(1));
            let row = udiv16(b, in_tile, row_threads);
            let start = b.mul(row, row_threads);
            (row, b.sub(remaining, start))
        }
        None => {
            let row_threads = size_x * 2;
            let row = udiv_const(b, in_tile, row_threads);
            let start = b.mul(row, Operand::i32(row_threads));
            (row, b.sub(remaining, start))
        }
    };

    let new_x = b.lshr(rem, Operand::i32(1));
    let mut new_x = b.add(new_x, bit0);
    if let Some((tile, _)) = tile {
        let tile_x = b.mul(tile, Operand::i32(size_y.min(8)));
        new_x = b.add(new_x, tile_x);
    }
    let new_y = b.shl(row, Operand::i32(1));
    let new_y = b.add(new_y, bit1);

    let id = b.insert_lane(id, new_x, 0);
    let id = b.insert_lane(id, new_y, 1);
    debug_assert_eq!(b.ty(&id), Type::vec(ScalarType::I32, 3));
    id
}
