//! Writes of generic and built-in outputs, routed by the stage's output strategy.

use vesper_ir::instr::exp_target;
use vesper_ir::{BuiltIn, Builder, Operand, ScalarType, ShaderStage, Type};

use super::export::export_source;
use super::storage::{element_channel, to_dwords, Place};
use super::Lowerer;
use crate::error::{Direction, IoError};
use crate::location::LocationInfo;
use crate::strategy::StorageStrategy;

impl Lowerer<'_> {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn write_generic_output(
        &mut self,
        b: &mut Builder<'_>,
        location: u32,
        loc_offset: Operand,
        elem_idx: Operand,
        vertex_idx: Option<Operand>,
        stream: u32,
        value: Operand,
    ) -> Result<(), IoError> {
        let ctx = self.ctx;
        let stage = self.stage;
        let io = &ctx.usage(stage).in_out;
        let ty = b.ty(&value);

        let (place, phys) = match self.output {
            StorageStrategy::Lds => (Place::VsOutput, io.output_loc_map.location(location)),
            StorageStrategy::EsGsRing { .. } => (Place::EsGsWrite, io.output_loc_map.location(location)),
            StorageStrategy::TessStorage { .. } => {
                let phys = match vertex_idx {
                    Some(_) => io.output_loc_map.location(location),
                    None => io.per_patch_output_loc_map.get(&location).copied(),
                };
                let phys = phys.ok_or(IoError::MissingLocation {
                    stage,
                    info: LocationInfo::new(location),
                })?;
                (Place::TessOutput { vertex: vertex_idx }, Some(phys))
            }
            StorageStrategy::GsVsRing { .. } => {
                let key = LocationInfo::new(location).with_stream(stream as u8);
                let counter = b.load_local(self.emit_counter(stream)?);
                let phys = io.output_loc_map.get(&key).map(|l| l.location);
                (Place::GsVsWrite { stream, counter }, phys)
            }
            StorageStrategy::Ngg => {
                let key = LocationInfo::new(location).with_stream(stream as u8);
                if let Some(phys) = io.output_loc_map.get(&key) {
                    let elem = const_elem(elem_idx)?;
                    ngg_export(b, phys.location, first_channel(ty, elem), stream, value);
                }
                return Ok(());
            }
            StorageStrategy::Export => return self.record_attribute(b, location, elem_idx, value),
            StorageStrategy::ColorExport => {
                let elem = const_elem(elem_idx)?;
                return self.record_color_output(b, location, elem, value);
            }
            StorageStrategy::VertexFetch | StorageStrategy::Interpolation => {
                return Err(IoError::NoStrategy {
                    stage,
                    what: "generic outputs",
                })
            }
        };

        // Outputs the next stage never reads have no slot.
        let Some(phys) = phys else {
            return Ok(());
        };
        let loc = b.add(Operand::i32(phys), loc_offset);
        let comp = element_channel(b, ty, elem_idx);
        self.write_place(b, &place, loc, comp, value)
    }

    /// Records a generic output of the last vertex-processing stage for the parameter exports.
    fn record_attribute(
        &mut self,
        b: &mut Builder<'_>,
        location: u32,
        elem_idx: Operand,
        value: Operand,
    ) -> Result<(), IoError> {
        let ctx = self.ctx;
        let io = &ctx.usage(self.stage).in_out;
        let elem = const_elem(elem_idx)?;
        let ty = b.ty(&value);

        // Copy shader locations are already physical GS ring locations.
        if self.stage == ShaderStage::CopyShader {
            for (k, dword) in to_dwords(b, value).into_iter().enumerate() {
                let ch = elem + k as u32;
                self.pending.set_full(location + ch / 4, ch % 4, dword)?;
            }
            return Ok(());
        }

        if ctx.pipeline.packs_boundary(self.stage) {
            for k in 0..ty.element_count() {
                let key = LocationInfo::new(location).channel(elem + k);
                let Some(to) = io.output_loc_map.get(&key) else {
                    continue;
                };
                let comp = u32::from(to.component);
                let lane = b.extract_lane(value, k);
                match ty.scalar_type() {
                    Some(ScalarType::F64 | ScalarType::I64) => {
                        let pair = b.bitcast(lane, Type::vec(ScalarType::I32, 2));
                        let lo = b.extract_lane(pair, 0);
                        let hi = b.extract_lane(pair, 1);
                        self.pending.set_full(to.location, comp, lo)?;
                        self.pending.set_full(to.location, comp + 1, hi)?;
                    }
                    Some(ScalarType::F16) => {
                        let half = b.bitcast(lane, Type::I16);
                        self.pending.set_half(to.location, comp, to.is_high_half, half)?;
                    }
                    Some(ScalarType::I16) => {
                        self.pending.set_half(to.location, comp, to.is_high_half, lane)?;
                    }
                    Some(ScalarType::I8) => {
                        let half = b.zext(lane, Type::I16);
                        self.pending.set_half(to.location, comp, to.is_high_half, half)?;
                    }
                    _ => self.pending.set_full(to.location, comp, lane)?,
                }
            }
            return Ok(());
        }

        let start = first_channel(ty, elem);
        for (k, dword) in to_dwords(b, value).into_iter().enumerate() {
            let ch = start + k as u32;
            if let Some(phys) = io.output_loc_map.location(location + ch / 4) {
                self.pending.set_full(phys, ch % 4, dword)?;
            }
        }
        Ok(())
    }

    pub(super) fn write_builtin_output(
        &mut self,
        b: &mut Builder<'_>,
        builtin: BuiltIn,
        elem_idx: Option<Operand>,
        vertex_idx: Option<Operand>,
        value: Operand,
    ) -> Result<(), IoError> {
        let ctx = self.ctx;
        let io = &ctx.usage(self.stage).in_out;
        let raster_stream = ctx.raster_stream();

        let place = match self.output {
            StorageStrategy::Export => return self.export_builtin(b, builtin, elem_idx, value),
            StorageStrategy::ColorExport => return self.record_fs_builtin(b, builtin, value),
            StorageStrategy::TessStorage { .. }
                if matches!(builtin, BuiltIn::TessLevelOuter | BuiltIn::TessLevelInner) =>
            {
                return self.write_tess_level(b, builtin, elem_idx, value);
            }
            StorageStrategy::Ngg => {
                if let Some(loc) = io.builtin_output_loc_map.get(&builtin).copied() {
                    let elem = elem_idx.map(const_elem).transpose()?.unwrap_or(0);
                    ngg_export(b, loc, elem, raster_stream, value);
                }
                return Ok(());
            }
            StorageStrategy::Lds => Place::VsOutput,
            StorageStrategy::EsGsRing { .. } => Place::EsGsWrite,
            StorageStrategy::TessStorage { .. } => Place::TessOutput { vertex: vertex_idx },
            StorageStrategy::GsVsRing { .. } => {
                let counter = b.load_local(self.emit_counter(raster_stream)?);
                Place::GsVsWrite {
                    stream: raster_stream,
                    counter,
                }
            }
            StorageStrategy::VertexFetch | StorageStrategy::Interpolation => {
                return Err(IoError::NoStrategy {
                    stage: self.stage,
                    what: "built-in outputs",
                })
            }
        };

        let Some(loc) = io.builtin_output_loc_map.get(&builtin).copied() else {
            return Ok(());
        };
        let comp = elem_idx.unwrap_or(Operand::i32(0));
        self.write_place(b, &place, Operand::i32(loc), comp, value)
    }

    /// Built-in outputs of a VS, TES or copy shader feeding the rasterizer. Only the position is
    /// exported here; the rest waits for the end of the shader, except on GFX8 and older where the
    /// point size, layer and viewport go out immediately.
    fn export_builtin(
        &mut self,
        b: &mut Builder<'_>,
        builtin: BuiltIn,
        elem_idx: Option<Operand>,
        value: Operand,
    ) -> Result<(), IoError> {
        let pipeline = &self.ctx.pipeline;
        let legacy = pipeline.gfx_ip.major <= 8;
        let multiview = pipeline.input_assembly.multiview;
        let undef = Operand::undef_f32();

        match builtin {
            BuiltIn::Position => {
                if elem_idx.is_some() {
                    return Err(IoError::UnsupportedMarker {
                        stage: self.stage,
                        marker: "partial position write".into(),
                    });
                }
                let mut sources = [undef; 4];
                for (i, source) in sources.iter_mut().enumerate() {
                    let lane = b.extract_lane(value, i as u32);
                    *source = export_source(b, lane);
                }
                b.exp(exp_target::POS_0, 0xF, sources, false);
            }
            BuiltIn::PointSize if legacy => {
                let size = export_source(b, value);
                b.exp(exp_target::POS_1, 0x1, [size, undef, undef, undef], false);
            }
            BuiltIn::PointSize => self.pending.point_size = Some(value),
            BuiltIn::Layer | BuiltIn::ViewportIndex => {
                let is_layer = builtin == BuiltIn::Layer;
                // With multiview the view index takes the layer's place.
                if legacy && !(is_layer && multiview) {
                    let mut sources = [undef; 4];
                    let (enable, lane) = if is_layer { (0x4, 2) } else { (0x8, 3) };
                    sources[lane] = export_source(b, value);
                    b.exp(exp_target::POS_1, enable, sources, false);
                }
                if is_layer {
                    self.pending.layer = Some(value);
                } else {
                    self.pending.viewport = Some(value);
                }
            }
            BuiltIn::PrimitiveShadingRate => self.pending.shading_rate = Some(value),
            BuiltIn::ClipDistance | BuiltIn::CullDistance => {
                let elems: Vec<(u32, Operand)> = match elem_idx {
                    Some(idx) => {
                        let i = idx.as_u32().ok_or(IoError::NonConstant {
                            what: "clip or cull distance index",
                        })?;
                        vec![(i, value)]
                    }
                    None => {
                        let count = b.ty(&value).element_count();
                        (0..count).map(|i| (i, b.extract_value(value, i))).collect()
                    }
                };
                let distances = if builtin == BuiltIn::ClipDistance {
                    &mut self.pending.clip
                } else {
                    &mut self.pending.cull
                };
                distances.extend(elems);
            }
            BuiltIn::PrimitiveId if self.stage == ShaderStage::CopyShader => {
                self.pending.primitive_id = Some(value);
            }
            BuiltIn::ViewIndex if self.stage == ShaderStage::CopyShader => {
                self.pending.view_index = Some(value);
            }
            _ => {
                return Err(IoError::InvalidBuiltInStage {
                    builtin,
                    stage: self.stage,
                    direction: Direction::Output,
                })
            }
        }
        Ok(())
    }

    fn record_fs_builtin(&mut self, b: &mut Builder<'_>, builtin: BuiltIn, value: Operand) -> Result<(), IoError> {
        match builtin {
            BuiltIn::FragDepth => self.pending.depth = Some(value),
            BuiltIn::FragStencilRef => self.pending.stencil = Some(value),
            BuiltIn::SampleMask => {
                let mask = if b.ty(&value).is_array() {
                    b.extract_value(value, 0)
                } else {
                    value
                };
                self.pending.sample_mask = Some(mask);
            }
            _ => {
                return Err(IoError::InvalidBuiltInStage {
                    builtin,
                    stage: self.stage,
                    direction: Direction::Output,
                })
            }
        }
        Ok(())
    }
}

fn const_elem(elem_idx: Operand) -> Result<u32, IoError> {
    elem_idx.as_u32().ok_or(IoError::NonConstant {
        what: "element index of an exported output",
    })
}

/// 32-bit channel element `elem` starts at.
fn first_channel(ty: Type, elem: u32) -> u32 {
    if ty.scalar_bits() == 64 {
        elem * 2
    } else {
        elem
    }
}

/// Hands `value` to the primitive shader generator dword by dword, starting at channel
/// `channel` of `location`.
fn ngg_export(b: &mut Builder<'_>, location: u32, channel: u32, stream: u32, value: Operand) {
    for (k, dword) in to_dwords(b, value).into_iter().enumerate() {
        if dword.is_undef() {
            continue;
        }
        let ch = channel + k as u32;
        b.ngg_gs_output_export(location + ch / 4, ch % 4, stream, dword);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn doubles_start_on_even_channels() {
        assert_eq!(first_channel(Type::vec(ScalarType::F64, 2), 1), 2);
        assert_eq!(first_channel(Type::F32, 3), 3);
        assert_eq!(first_channel(Type::F16, 3), 3);
    }

    #[test]
    fn exported_elements_must_be_constant() {
        assert_eq!(const_elem(Operand::i32(2)), Ok(2));
        assert!(matches!(
            const_elem(Operand::Undef(Type::I32)),
            Err(IoError::NonConstant { .. })
        ));
    }
}
