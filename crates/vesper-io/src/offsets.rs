//! Offset and address arithmetic for LDS, the GS rings and the TF buffer.
//!
//! Every function emits its arithmetic through a [`Builder`], which folds constants, so the same
//! code yields either instructions or plain numbers. LDS offsets are in dwords; ring and buffer
//! offsets say when they are bytes.
//!
//! `component` is always a 32-bit channel: callers double the element index of 64-bit values.

use vesper_ir::{Builder, Operand};

use crate::layout::{CalcFactor, RegionStarts};

/// `location * 4 + component`.
pub fn attrib_dword(b: &mut Builder<'_>, location: Operand, component: Operand) -> Operand {
    let base = b.mul(location, Operand::i32(4));
    b.add(base, component)
}

/// LDS slot of a VS output consumed by the TCS:
/// `rel_vertex_id * in_vertex_stride + location * 4 + component`.
pub fn vs_output_lds(
    b: &mut Builder<'_>,
    rel_vertex_id: Operand,
    in_vertex_stride: u32,
    location: Operand,
    component: Operand,
) -> Operand {
    let vertex_base = b.mul(rel_vertex_id, Operand::i32(in_vertex_stride));
    let attrib = attrib_dword(b, location, component);
    b.add(vertex_base, attrib)
}

/// LDS slot of a TCS input:
/// `(rel_patch_id * in_vertex_count + vertex) * in_vertex_stride + location * 4 + component`.
pub fn tcs_input_lds(
    b: &mut Builder<'_>,
    calc: &CalcFactor,
    rel_patch_id: Operand,
    vertex: Operand,
    location: Operand,
    component: Operand,
) -> Operand {
    let patch_vertex = b.mul(rel_patch_id, Operand::i32(calc.in_vertex_count));
    let vertex = b.add(patch_vertex, vertex);
    let vertex_base = b.mul(vertex, Operand::i32(calc.in_vertex_stride));
    let attrib = attrib_dword(b, location, component);
    b.add(vertex_base, attrib)
}

/// Slot of a TCS output (also a TES input) in LDS or the off-chip buffer.
///
/// Per-patch (`vertex == None`):
/// `patch_const_start + rel_patch_id * patch_const_size + attrib`.
/// Per-vertex:
/// `out_patch_start + rel_patch_id * out_patch_size + vertex * out_vertex_stride + attrib`.
pub fn tess_output(
    b: &mut Builder<'_>,
    calc: &CalcFactor,
    regions: RegionStarts,
    rel_patch_id: Operand,
    vertex: Option<Operand>,
    location: Operand,
    component: Operand,
) -> Operand {
    let attrib = attrib_dword(b, location, component);
    match vertex {
        None => {
            let patch = b.mul(rel_patch_id, Operand::i32(calc.patch_const_size));
            let base = b.add(patch, Operand::i32(regions.patch_const_start));
            b.add(base, attrib)
        }
        Some(vertex) => {
            let patch = b.mul(rel_patch_id, Operand::i32(calc.out_patch_size));
            let base = b.add(patch, Operand::i32(regions.out_patch_start));
            let vertex_base = b.mul(vertex, Operand::i32(calc.out_vertex_stride));
            let base = b.add(base, vertex_base);
            b.add(base, attrib)
        }
    }
}

/// ES→GS ring slot written by the ES with the ring in LDS:
/// `es_gs_offset / 4 + thread_id * item_size + location * 4 + component`.
pub fn es_gs_output_lds(
    b: &mut Builder<'_>,
    es_gs_offset: Operand,
    thread_id: Operand,
    item_size: u32,
    location: Operand,
    component: Operand,
) -> Operand {
    let base = b.lshr(es_gs_offset, Operand::i32(2));
    let item = b.mul(thread_id, Operand::i32(item_size));
    let base = b.add(base, item);
    let attrib = attrib_dword(b, location, component);
    b.add(base, attrib)
}

/// Byte offset of an ES→GS ring write off chip; the ring's soffset is `es_gs_offset`.
pub fn es_gs_output_ring_bytes(b: &mut Builder<'_>, location: Operand, component: Operand) -> Operand {
    let attrib = attrib_dword(b, location, component);
    b.mul(attrib, Operand::i32(4))
}

/// ES→GS ring slot read by the GS with the ring in LDS: `vertex_offset + location * 4 + component`.
pub fn es_gs_input_lds(
    b: &mut Builder<'_>,
    vertex_offset: Operand,
    location: Operand,
    component: Operand,
) -> Operand {
    let attrib = attrib_dword(b, location, component);
    b.add(vertex_offset, attrib)
}

/// `(voffset, byte offset)` of an off-chip ES→GS ring read:
/// `vertex_offset * 4` and `(location * 4 + component) * 64 * 4`.
pub fn es_gs_input_ring(
    b: &mut Builder<'_>,
    vertex_offset: Operand,
    location: Operand,
    component: Operand,
) -> (Operand, Operand) {
    let voffset = b.mul(vertex_offset, Operand::i32(4));
    let attrib = attrib_dword(b, location, component);
    let offset = b.mul(attrib, Operand::i32(64 * 4));
    (voffset, offset)
}

/// Layout constants of one GS→VS ring stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GsVsStream {
    pub es_gs_lds_size: u32,
    pub item_size: u32,
    pub out_loc_count: u32,
    pub stream_base: u32,
    pub output_vertices: u32,
}

/// GS→VS ring slot with the ring in LDS:
/// `es_gs_lds_size + gs_vs_offset / 4 + thread_id * item_size
///  + emit_counter * (out_loc_count * 4) + location * 4 + component + stream_base`.
pub fn gs_vs_lds(
    b: &mut Builder<'_>,
    stream: &GsVsStream,
    gs_vs_offset: Operand,
    thread_id: Operand,
    emit_counter: Operand,
    location: Operand,
    component: Operand,
) -> Operand {
    let base = b.lshr(gs_vs_offset, Operand::i32(2));
    let base = b.add(base, Operand::i32(stream.es_gs_lds_size));
    let item = b.mul(thread_id, Operand::i32(stream.item_size));
    let base = b.add(base, item);
    let vertex = b.mul(emit_counter, Operand::i32(stream.out_loc_count * 4));
    let base = b.add(base, vertex);
    let attrib = attrib_dword(b, location, component);
    let base = b.add(base, attrib);
    b.add(base, Operand::i32(stream.stream_base))
}

/// Byte offset of an off-chip GS→VS ring write:
/// `((location * 4 + component) * output_vertices + emit_counter) * 4`.
pub fn gs_vs_ring_bytes(
    b: &mut Builder<'_>,
    output_vertices: u32,
    emit_counter: Operand,
    location: Operand,
    component: Operand,
) -> Operand {
    let attrib = attrib_dword(b, location, component);
    let row = b.mul(attrib, Operand::i32(output_vertices));
    let slot = b.add(row, emit_counter);
    b.mul(slot, Operand::i32(4))
}

/// GS→VS ring slot read back by the copy shader with the ring in LDS:
/// `es_gs_lds_size + vertex_offset + stream_base + location * 4 + component`.
pub fn copy_shader_lds(
    b: &mut Builder<'_>,
    stream: &GsVsStream,
    vertex_offset: Operand,
    location: Operand,
    component: Operand,
) -> Operand {
    let base = b.add(vertex_offset, Operand::i32(stream.es_gs_lds_size + stream.stream_base));
    let attrib = attrib_dword(b, location, component);
    b.add(base, attrib)
}

/// `(voffset, byte offset)` of an off-chip copy shader read:
/// `vertex_offset * 4` and `(location * 4 + component) * output_vertices * 4`.
pub fn copy_shader_ring(
    b: &mut Builder<'_>,
    output_vertices: u32,
    vertex_offset: Operand,
    location: Operand,
    component: Operand,
) -> (Operand, Operand) {
    let voffset = b.mul(vertex_offset, Operand::i32(4));
    let attrib = attrib_dword(b, location, component);
    let offset = b.mul(attrib, Operand::i32(output_vertices * 4));
    (voffset, offset)
}

/// TF buffer byte offset: `rel_patch_id * tess_factor_stride * 4 + index * 4`.
pub fn tess_factor_bytes(
    b: &mut Builder<'_>,
    tess_factor_stride: u32,
    rel_patch_id: Operand,
    index: Operand,
) -> Operand {
    let patch = b.mul(rel_patch_id, Operand::i32(tess_factor_stride * 4));
    let elem = b.mul(index, Operand::i32(4));
    b.add(patch, elem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesper_ir::{BlockId, EntryValue, Function, ShaderStage};

    fn calc() -> CalcFactor {
        CalcFactor {
            in_vertex_count: 3,
            out_vertex_count: 4,
            in_vertex_stride: 8,
            out_vertex_stride: 12,
            patch_const_count: 2,
            patch_const_size: 8,
            patch_count_per_thread_group: 16,
            in_patch_size: 24,
            out_patch_size: 48,
            in_patch_total_size: 384,
            out_patch_total_size: 768,
            on_chip: RegionStarts {
                out_patch_start: 384,
                patch_const_start: 1152,
            },
            off_chip: RegionStarts {
                out_patch_start: 0,
                patch_const_start: 768,
            },
            tess_factor_stride: 4,
        }
    }

    #[test]
    fn constant_inputs_fold_to_numbers() {
        let mut func = Function::new("tcs", ShaderStage::TessControl);
        let mut b = Builder::at_end(&mut func, BlockId(0));
        let c = calc();

        let input = tcs_input_lds(&mut b, &c, Operand::i32(2), Operand::i32(1), Operand::i32(1), Operand::i32(3));
        assert_eq!(input, Operand::i32((2 * 3 + 1) * 8 + 4 + 3));

        let per_vertex = tess_output(
            &mut b,
            &c,
            c.on_chip,
            Operand::i32(1),
            Some(Operand::i32(2)),
            Operand::i32(2),
            Operand::i32(1),
        );
        assert_eq!(per_vertex, Operand::i32(384 + 48 + 24 + 9));

        let per_patch = tess_output(&mut b, &c, c.off_chip, Operand::i32(3), None, Operand::i32(1), Operand::i32(0));
        assert_eq!(per_patch, Operand::i32(768 + 24 + 4));

        let tf = tess_factor_bytes(&mut b, 6, Operand::i32(2), Operand::i32(5));
        assert_eq!(tf, Operand::i32(2 * 24 + 20));
        assert!(func.block(BlockId(0)).instrs.is_empty());
    }

    #[test]
    fn gs_vs_offsets_follow_stream_layout() {
        let mut func = Function::new("gs", ShaderStage::Geometry);
        let mut b = Builder::at_end(&mut func, BlockId(0));
        let stream = GsVsStream {
            es_gs_lds_size: 1000,
            item_size: 96,
            out_loc_count: 2,
            stream_base: 24,
            output_vertices: 3,
        };
        let lds = gs_vs_lds(
            &mut b,
            &stream,
            Operand::i32(64),
            Operand::i32(2),
            Operand::i32(1),
            Operand::i32(1),
            Operand::i32(2),
        );
        assert_eq!(lds, Operand::i32(1000 + 16 + 192 + 8 + 6 + 24));

        let ring = gs_vs_ring_bytes(&mut b, 3, Operand::i32(2), Operand::i32(1), Operand::i32(1));
        assert_eq!(ring, Operand::i32((5 * 3 + 2) * 4));

        // The copy shader's vertex offset covers everything up to the attribute.
        let read = copy_shader_lds(&mut b, &stream, Operand::i32(16 + 192 + 8), Operand::i32(1), Operand::i32(2));
        assert_eq!(read, lds);
        let (voffset, offset) = copy_shader_ring(&mut b, 3, Operand::i32(2), Operand::i32(1), Operand::i32(1));
        assert_eq!((voffset, offset), (Operand::i32(8), Operand::i32(5 * 3 * 4)));
    }

    #[test]
    fn runtime_ids_emit_arithmetic() {
        let mut func = Function::new("vs", ShaderStage::Vertex);
        let mut b = Builder::at_end(&mut func, BlockId(0));
        let offset = vs_output_lds(
            &mut b,
            Operand::Entry(EntryValue::RelVertexId),
            8,
            Operand::i32(1),
            Operand::i32(2),
        );
        assert!(matches!(offset, Operand::Value(_)));
        // mul by stride, then add of the folded attribute dword.
        assert_eq!(func.block(BlockId(0)).instrs.len(), 2);
    }
}
