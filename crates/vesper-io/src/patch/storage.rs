//! Dword-granular reads and writes of stage I/O through LDS, the GS rings and the off-chip
//! tessellation buffer.

use vesper_ir::{
    BufferAccess, Builder, CachePolicy, Descriptor, EntryValue, Operand, ScalarType, ShaderStage,
    Type,
};

use super::Lowerer;
use crate::error::IoError;
use crate::offsets::{self, GsVsStream};

/// Dwords a value of `ty` occupies in LDS or a ring. 8- and 16-bit elements take a whole dword.
pub(super) fn dword_count(ty: Type) -> u32 {
    if ty.scalar_bits() == 64 {
        ty.element_count() * 2
    } else {
        ty.element_count()
    }
}

/// First 32-bit channel of element `elem` of a value of `ty`.
pub(super) fn element_channel(b: &mut Builder<'_>, ty: Type, elem: Operand) -> Operand {
    if ty.scalar_bits() == 64 {
        b.mul(elem, Operand::i32(2))
    } else {
        elem
    }
}

/// Splits `value` into `i32` dwords, low dword first.
pub(super) fn to_dwords(b: &mut Builder<'_>, value: Operand) -> Vec<Operand> {
    let ty = b.ty(&value);
    if value.is_undef() {
        return vec![Operand::Undef(Type::I32); dword_count(ty) as usize];
    }
    if ty.is_array() {
        let mut dwords = Vec::new();
        for i in 0..ty.element_count() {
            let elem = b.extract_value(value, i);
            dwords.extend(to_dwords(b, elem));
        }
        return dwords;
    }
    let n = dword_count(ty);
    match ty.scalar_bits() {
        32 | 64 => {
            let as_int = b.bitcast(value, Type::scalar_or_vec(ScalarType::I32, n));
            (0..n).map(|i| b.extract_lane(as_int, i)).collect()
        }
        bits => {
            let int = ScalarType::int_of_bits(bits).unwrap_or(ScalarType::I16);
            let as_int = b.bitcast(value, ty.with_scalar(int));
            (0..n)
                .map(|i| {
                    let lane = b.extract_lane(as_int, i);
                    b.zext(lane, Type::I32)
                })
                .collect()
        }
    }
}

/// Rebuilds a value of `ty` from the dwords [`to_dwords`] produced.
pub(super) fn from_dwords(b: &mut Builder<'_>, ty: Type, dwords: &[Operand]) -> Operand {
    if let Type::Array(elem, len) = ty {
        let per_elem = dword_count(Type::Scalar(elem)) as usize;
        let mut array = Operand::Undef(ty);
        for i in 0..len {
            let start = i as usize * per_elem;
            let elem_value = from_dwords(b, Type::Scalar(elem), &dwords[start..start + per_elem]);
            array = b.insert_value(array, elem_value, i);
        }
        return array;
    }
    match ty.scalar_bits() {
        32 | 64 => {
            let int = b.build_vector(ScalarType::I32, dwords);
            b.bitcast(int, ty)
        }
        bits => {
            let int = ScalarType::int_of_bits(bits).unwrap_or(ScalarType::I16);
            let lanes: Vec<Operand> = dwords.iter().map(|d| b.trunc(*d, Type::Scalar(int))).collect();
            let vector = b.build_vector(int, &lanes);
            b.bitcast(vector, ty)
        }
    }
}

/// Where a piece of stage I/O lives.
#[derive(Debug, Clone, Copy)]
pub(super) enum Place {
    /// VS output read by the TCS.
    VsOutput,
    TcsInput { vertex: Operand },
    /// TCS output or TES input; `None` is per-patch.
    TessOutput { vertex: Option<Operand> },
    EsGsWrite,
    EsGsRead { vertex: Operand },
    GsVsWrite { stream: u32, counter: Operand },
    CopyRead { stream: u32 },
}

/// One resolved dword.
pub(super) enum Slot {
    /// Dword offset into LDS.
    Lds(Operand),
    Buffer(BufferAccess),
}

impl Slot {
    fn load(self, b: &mut Builder<'_>) -> Operand {
        match self {
            Slot::Lds(offset) => b.lds_load(offset),
            Slot::Buffer(access) => b.buffer_load(Type::I32, access),
        }
    }

    fn store(self, b: &mut Builder<'_>, value: Operand) {
        match self {
            Slot::Lds(offset) => b.lds_store(offset, value),
            Slot::Buffer(access) => b.buffer_store(value, access, None),
        }
    }
}

fn descriptor(desc: Descriptor) -> Operand {
    Operand::Entry(EntryValue::Descriptor(desc))
}

impl Lowerer<'_> {
    fn gs_vs_stream(&self, stream: u32) -> GsVsStream {
        let gs = &self.ctx.usage(ShaderStage::Geometry).in_out;
        GsVsStream {
            es_gs_lds_size: self.ring.es_gs_lds_size,
            item_size: self.ring.gs_vs_ring_item_size,
            out_loc_count: gs.gs_out_loc_count[stream as usize],
            stream_base: self.ring.stream_bases[stream as usize],
            output_vertices: self.ctx.pipeline.geometry.output_vertices,
        }
    }

    /// Resolves the dword at `location * 4 + component` of `place`.
    pub(super) fn slot(
        &self,
        b: &mut Builder<'_>,
        place: &Place,
        location: Operand,
        component: Operand,
        load: bool,
    ) -> Result<Slot, IoError> {
        let gfx = self.ctx.pipeline.gfx_ip;
        Ok(match *place {
            Place::VsOutput => Slot::Lds(offsets::vs_output_lds(
                b,
                Operand::Entry(EntryValue::RelVertexId),
                self.calc.in_vertex_stride,
                location,
                component,
            )),
            Place::TcsInput { vertex } => Slot::Lds(offsets::tcs_input_lds(
                b,
                &self.calc,
                Operand::Entry(EntryValue::TcsRelPatchId),
                vertex,
                location,
                component,
            )),
            Place::TessOutput { vertex } => {
                let rel_patch_id = match self.stage {
                    ShaderStage::TessEval => EntryValue::TesRelPatchId,
                    _ => EntryValue::TcsRelPatchId,
                };
                let off_chip = self.ctx.pipeline.tess_off_chip;
                let dword = offsets::tess_output(
                    b,
                    &self.calc,
                    self.calc.regions(off_chip),
                    Operand::Entry(rel_patch_id),
                    vertex,
                    location,
                    component,
                );
                if !off_chip {
                    return Ok(Slot::Lds(dword));
                }
                let mut cache = CachePolicy::GLC;
                if load && gfx.major >= 10 {
                    cache |= CachePolicy::DLC;
                }
                Slot::Buffer(BufferAccess {
                    desc: descriptor(Descriptor::OffChipLds),
                    vindex: None,
                    voffset: b.mul(dword, Operand::i32(4)),
                    soffset: Operand::Entry(EntryValue::OffChipLdsBase),
                    offset: 0,
                    format: None,
                    cache,
                })
            }
            Place::EsGsWrite if self.ctx.pipeline.es_gs_on_chip() => Slot::Lds(offsets::es_gs_output_lds(
                b,
                Operand::Entry(EntryValue::EsGsOffset),
                self.thread_id()?,
                self.ring.es_gs_ring_item_size,
                location,
                component,
            )),
            Place::EsGsWrite => Slot::Buffer(BufferAccess {
                desc: descriptor(Descriptor::EsGsRing),
                vindex: None,
                voffset: offsets::es_gs_output_ring_bytes(b, location, component),
                soffset: Operand::Entry(EntryValue::EsGsOffset),
                offset: 0,
                format: Some(self.ctx.target.ring_store_format()),
                cache: CachePolicy::GLC | CachePolicy::SLC | CachePolicy::SWZ,
            }),
            Place::EsGsRead { vertex } => {
                let vertex = vertex
                    .as_u32()
                    .filter(|v| *v < 6)
                    .ok_or(IoError::NonConstant {
                        what: "geometry shader input vertex index",
                    })?;
                let vertex_offset = Operand::Entry(EntryValue::EsGsVertexOffset(vertex as u8));
                if self.ctx.pipeline.es_gs_on_chip() {
                    Slot::Lds(offsets::es_gs_input_lds(b, vertex_offset, location, component))
                } else {
                    let (voffset, offset) = offsets::es_gs_input_ring(b, vertex_offset, location, component);
                    let (voffset, offset) = match offset.as_u32() {
                        Some(c) => (voffset, c),
                        None => (b.add(voffset, offset), 0),
                    };
                    Slot::Buffer(BufferAccess {
                        desc: descriptor(Descriptor::EsGsRing),
                        vindex: None,
                        voffset,
                        soffset: Operand::i32(0),
                        offset,
                        format: None,
                        cache: CachePolicy::GLC | CachePolicy::SLC,
                    })
                }
            }
            Place::GsVsWrite { stream, counter } => {
                let layout = self.gs_vs_stream(stream);
                if self.ctx.pipeline.gs_on_chip {
                    Slot::Lds(offsets::gs_vs_lds(
                        b,
                        &layout,
                        Operand::Entry(EntryValue::GsVsOffset),
                        self.thread_id()?,
                        counter,
                        location,
                        component,
                    ))
                } else {
                    Slot::Buffer(BufferAccess {
                        desc: descriptor(Descriptor::GsVsRing(stream as u8)),
                        vindex: None,
                        voffset: offsets::gs_vs_ring_bytes(
                            b,
                            layout.output_vertices,
                            counter,
                            location,
                            component,
                        ),
                        soffset: Operand::Entry(EntryValue::GsVsOffset),
                        offset: 0,
                        format: Some(self.ctx.target.ring_store_format()),
                        cache: CachePolicy::GLC | CachePolicy::SLC | CachePolicy::SWZ,
                    })
                }
            }
            Place::CopyRead { stream } => {
                let layout = self.gs_vs_stream(stream);
                let vertex_offset = Operand::Entry(EntryValue::CopyVertexOffset);
                if self.ctx.pipeline.gs_on_chip {
                    Slot::Lds(offsets::copy_shader_lds(b, &layout, vertex_offset, location, component))
                } else {
                    let (voffset, offset) = offsets::copy_shader_ring(
                        b,
                        layout.output_vertices,
                        vertex_offset,
                        location,
                        component,
                    );
                    let (voffset, offset) = match offset.as_u32() {
                        Some(c) => (voffset, c),
                        None => (b.add(voffset, offset), 0),
                    };
                    Slot::Buffer(BufferAccess {
                        desc: descriptor(Descriptor::GsVsRing(stream as u8)),
                        vindex: None,
                        voffset,
                        soffset: Operand::i32(0),
                        offset,
                        format: None,
                        cache: CachePolicy::GLC | CachePolicy::SLC,
                    })
                }
            }
        })
    }

    /// Reads a value of `ty` whose first dword is channel `component` of `location`.
    pub(super) fn read_place(
        &self,
        b: &mut Builder<'_>,
        place: &Place,
        ty: Type,
        location: Operand,
        component: Operand,
    ) -> Result<Operand, IoError> {
        let mut dwords = Vec::with_capacity(dword_count(ty) as usize);
        for k in 0..dword_count(ty) {
            let comp = b.add(component, Operand::i32(k));
            let slot = self.slot(b, place, location, comp, true)?;
            dwords.push(slot.load(b));
        }
        Ok(from_dwords(b, ty, &dwords))
    }

    /// Writes `value` dword by dword starting at channel `component` of `location`. Undefined
    /// dwords are not stored.
    pub(super) fn write_place(
        &self,
        b: &mut Builder<'_>,
        place: &Place,
        location: Operand,
        component: Operand,
        value: Operand,
    ) -> Result<(), IoError> {
        let dwords = to_dwords(b, value);
        for (k, dword) in dwords.into_iter().enumerate() {
            if dword.is_undef() {
                continue;
            }
            let comp = b.add(component, Operand::i32(k as u32));
            let slot = self.slot(b, place, location, comp, false)?;
            slot.store(b, dword);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vesper_ir::{Function, Instr};

    #[test]
    fn wide_values_take_two_dwords_per_element() {
        assert_eq!(dword_count(Type::vec(ScalarType::F64, 3)), 6);
        assert_eq!(dword_count(Type::vec(ScalarType::F16, 3)), 3);
        assert_eq!(dword_count(Type::array(ScalarType::F32, 5)), 5);
    }

    #[test]
    fn constant_element_channels_fold() {
        let mut func = Function::new("f", ShaderStage::Vertex);
        let entry = func.entry;
        let mut b = Builder::at_end(&mut func, entry);
        let ch = element_channel(&mut b, Type::vec(ScalarType::F64, 2), Operand::i32(1));
        assert_eq!(ch, Operand::i32(2));
        assert!(func.block(entry).instrs.is_empty());
    }

    #[test]
    fn undef_splits_into_undef_dwords() {
        let mut func = Function::new("f", ShaderStage::Vertex);
        let entry = func.entry;
        let mut b = Builder::at_end(&mut func, entry);
        let dwords = to_dwords(&mut b, Operand::Undef(Type::vec(ScalarType::F32, 3)));
        assert_eq!(dwords, vec![Operand::Undef(Type::I32); 3]);
    }

    #[test]
    fn half_vectors_are_widened_per_element() {
        let mut func = Function::new("f", ShaderStage::Vertex);
        let entry = func.entry;
        let value = Operand::Undef(Type::vec(ScalarType::I16, 2));
        let mut b = Builder::at_end(&mut func, entry);
        // Force a real value so the split is emitted.
        let value = b.insert_lane(value, Operand::int(ScalarType::I16, 7), 0);
        let dwords = to_dwords(&mut b, value);
        assert_eq!(dwords.len(), 2);
        let zexts = func
            .block(entry)
            .instrs
            .iter()
            .filter(|i| matches!(i, Instr::Cast { op: vesper_ir::instr::CastOp::ZExt, .. }))
            .count();
        assert_eq!(zexts, 2);
    }
}
