//! Inputs of the tessellation and geometry stages, and TCS reads of its own outputs.

use vesper_ir::{BuiltIn, Builder, EntryValue, Operand, ScalarType, ShaderStage, Type};

use super::storage::{element_channel, Place};
use super::Lowerer;
use crate::error::{Direction, IoError};
use crate::layout::MAX_TESS_PATCH_VERTICES;
use crate::location::LocationInfo;
use crate::pipeline::PrimitiveMode;

fn entry(value: EntryValue) -> Operand {
    Operand::Entry(value)
}

impl Lowerer<'_> {
    fn per_vertex(&self, vertex_idx: Option<Operand>) -> Result<Operand, IoError> {
        vertex_idx.ok_or(IoError::UnsupportedMarker {
            stage: self.stage,
            marker: "per-vertex input without a vertex index".into(),
        })
    }

    fn missing(&self, location: u32) -> IoError {
        IoError::MissingLocation {
            stage: self.stage,
            info: LocationInfo::new(location),
        }
    }

    pub(super) fn read_generic_input(
        &mut self,
        b: &mut Builder<'_>,
        ty: Type,
        location: u32,
        loc_offset: Operand,
        elem_idx: Operand,
        vertex_idx: Option<Operand>,
    ) -> Result<Operand, IoError> {
        let ctx = self.ctx;
        let io = &ctx.usage(self.stage).in_out;
        let (place, phys) = match self.stage {
            ShaderStage::TessControl => (
                Place::TcsInput {
                    vertex: self.per_vertex(vertex_idx)?,
                },
                io.input_loc_map.location(location),
            ),
            ShaderStage::TessEval => match vertex_idx {
                Some(_) => (
                    Place::TessOutput { vertex: vertex_idx },
                    io.input_loc_map.location(location),
                ),
                None => (
                    Place::TessOutput { vertex: None },
                    io.per_patch_input_loc_map.get(&location).copied(),
                ),
            },
            ShaderStage::Geometry => (
                Place::EsGsRead {
                    vertex: self.per_vertex(vertex_idx)?,
                },
                io.input_loc_map.location(location),
            ),
            stage => {
                return Err(IoError::UnsupportedMarker {
                    stage,
                    marker: format!("generic input at location {location}"),
                })
            }
        };
        let phys = phys.ok_or_else(|| self.missing(location))?;
        let loc = b.add(Operand::i32(phys), loc_offset);
        let comp = element_channel(b, ty, elem_idx);
        self.read_place(b, &place, ty, loc, comp)
    }

    pub(super) fn read_tcs_output(
        &mut self,
        b: &mut Builder<'_>,
        ty: Type,
        location: u32,
        loc_offset: Operand,
        elem_idx: Operand,
        vertex_idx: Option<Operand>,
    ) -> Result<Operand, IoError> {
        let io = &self.ctx.usage(ShaderStage::TessControl).in_out;
        let phys = match vertex_idx {
            Some(_) => io.output_loc_map.location(location),
            None => io.per_patch_output_loc_map.get(&location).copied(),
        };
        let phys = phys.ok_or_else(|| self.missing(location))?;
        let loc = b.add(Operand::i32(phys), loc_offset);
        let comp = element_channel(b, ty, elem_idx);
        self.read_place(b, &Place::TessOutput { vertex: vertex_idx }, ty, loc, comp)
    }

    pub(super) fn read_tcs_builtin_output(
        &mut self,
        b: &mut Builder<'_>,
        ty: Type,
        builtin: BuiltIn,
        elem_idx: Option<Operand>,
        vertex_idx: Option<Operand>,
    ) -> Result<Operand, IoError> {
        let io = &self.ctx.usage(ShaderStage::TessControl).in_out;
        let map = match builtin {
            BuiltIn::TessLevelOuter | BuiltIn::TessLevelInner => &io.per_patch_builtin_output_loc_map,
            _ => &io.builtin_output_loc_map,
        };
        let loc = map.get(&builtin).copied().ok_or(IoError::MissingBuiltInLocation {
            stage: ShaderStage::TessControl,
            builtin,
        })?;
        let vertex = match builtin {
            BuiltIn::TessLevelOuter | BuiltIn::TessLevelInner => None,
            _ => vertex_idx,
        };
        let comp = elem_idx.unwrap_or(Operand::i32(0));
        self.read_place(b, &Place::TessOutput { vertex }, ty, Operand::i32(loc), comp)
    }

    /// Built-in inputs of every stage but the fragment shader.
    pub(super) fn read_builtin_input(
        &mut self,
        b: &mut Builder<'_>,
        ty: Type,
        builtin: BuiltIn,
        elem_idx: Option<Operand>,
        vertex_idx: Option<Operand>,
    ) -> Result<Operand, IoError> {
        let ctx = self.ctx;
        let pipeline = &ctx.pipeline;
        let stage = self.stage;
        let io = &ctx.usage(stage).in_out;

        let value = match (stage, builtin) {
            (_, BuiltIn::ViewIndex) => entry(EntryValue::ViewIndex),
            (ShaderStage::TessControl, BuiltIn::PrimitiveId) => entry(EntryValue::TcsPatchId),
            (ShaderStage::TessEval, BuiltIn::PrimitiveId) => entry(EntryValue::TesPatchId),
            (ShaderStage::Geometry, BuiltIn::PrimitiveId) => entry(EntryValue::GsPrimitiveId),
            (ShaderStage::TessControl, BuiltIn::InvocationId) => entry(EntryValue::TcsInvocationId),
            (ShaderStage::Geometry, BuiltIn::InvocationId) => entry(EntryValue::GsInvocationId),
            (ShaderStage::TessControl, BuiltIn::PatchVertices) => {
                Operand::i32(pipeline.input_assembly.patch_control_points)
            }
            (ShaderStage::TessEval, BuiltIn::PatchVertices) => {
                if pipeline.has_stage(ShaderStage::TessControl) {
                    Operand::i32(pipeline.tessellation.output_vertices)
                } else {
                    Operand::i32(MAX_TESS_PATCH_VERTICES)
                }
            }
            (ShaderStage::TessEval, BuiltIn::TessCoord) => {
                let x = entry(EntryValue::TessCoordX);
                let y = entry(EntryValue::TessCoordY);
                // Only triangles carry a third barycentric coordinate.
                let z = match pipeline.tessellation.primitive_mode {
                    PrimitiveMode::Triangles => {
                        let one_minus_x = b.fsub(Operand::f32(1.0), x);
                        b.fsub(one_minus_x, y)
                    }
                    _ => Operand::f32(0.0),
                };
                let coord = b.build_vector(ScalarType::F32, &[x, y, z]);
                match elem_idx {
                    Some(idx) => b.extract_element(coord, idx),
                    None => coord,
                }
            }
            (ShaderStage::TessEval, BuiltIn::TessLevelOuter | BuiltIn::TessLevelInner) => {
                let loc = io
                    .per_patch_builtin_input_loc_map
                    .get(&builtin)
                    .copied()
                    .ok_or(IoError::MissingBuiltInLocation { stage, builtin })?;
                let comp = elem_idx.unwrap_or(Operand::i32(0));
                self.read_place(b, &Place::TessOutput { vertex: None }, ty, Operand::i32(loc), comp)?
            }
            (
                ShaderStage::TessControl | ShaderStage::TessEval | ShaderStage::Geometry,
                BuiltIn::Position | BuiltIn::PointSize | BuiltIn::ClipDistance | BuiltIn::CullDistance,
            ) => {
                let loc = io
                    .builtin_input_loc_map
                    .get(&builtin)
                    .copied()
                    .ok_or(IoError::MissingBuiltInLocation { stage, builtin })?;
                let vertex = self.per_vertex(vertex_idx)?;
                let place = match stage {
                    ShaderStage::TessControl => Place::TcsInput { vertex },
                    ShaderStage::TessEval => Place::TessOutput {
                        vertex: Some(vertex),
                    },
                    _ => Place::EsGsRead { vertex },
                };
                let comp = elem_idx.unwrap_or(Operand::i32(0));
                self.read_place(b, &place, ty, Operand::i32(loc), comp)?
            }
            _ => {
                return Err(IoError::InvalidBuiltInStage {
                    builtin,
                    stage,
                    direction: Direction::Input,
                })
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CompilationContext;
    use crate::layout::CalcFactor;
    use crate::pipeline::{PipelineState, StageMask};
    use pretty_assertions::assert_eq;
    use vesper_ir::{Function, Instr};

    fn tess_ctx(mode: PrimitiveMode) -> CompilationContext {
        let mut pipeline = PipelineState {
            stages: StageMask::VERTEX | StageMask::TESS_CONTROL | StageMask::TESS_EVAL | StageMask::FRAGMENT,
            ..PipelineState::default()
        };
        pipeline.tessellation.primitive_mode = mode;
        CompilationContext::new(pipeline)
    }

    #[test]
    fn quad_tess_coord_has_zero_w() {
        let ctx = tess_ctx(PrimitiveMode::Quads);
        let mut lowerer = Lowerer::new(&ctx, ShaderStage::TessEval, CalcFactor::default()).unwrap();
        let mut func = Function::new("tes", ShaderStage::TessEval);
        let block = func.entry;
        let mut b = Builder::at_end(&mut func, block);
        let ty = Type::vec(ScalarType::F32, 3);
        lowerer
            .read_builtin_input(&mut b, ty, BuiltIn::TessCoord, None, None)
            .unwrap();
        let subtractions = func
            .instrs()
            .filter(|(_, _, i)| matches!(i, Instr::Binary { .. }))
            .count();
        assert_eq!(subtractions, 0);
    }

    #[test]
    fn triangle_tess_coord_derives_w() {
        let ctx = tess_ctx(PrimitiveMode::Triangles);
        let mut lowerer = Lowerer::new(&ctx, ShaderStage::TessEval, CalcFactor::default()).unwrap();
        let mut func = Function::new("tes", ShaderStage::TessEval);
        let block = func.entry;
        let mut b = Builder::at_end(&mut func, block);
        lowerer
            .read_builtin_input(&mut b, Type::F32, BuiltIn::TessCoord, Some(Operand::i32(2)), None)
            .unwrap();
        let subtractions = func
            .instrs()
            .filter(|(_, _, i)| matches!(i, Instr::Binary { .. }))
            .count();
        assert_eq!(subtractions, 2);
    }

    #[test]
    fn patch_vertices_without_tcs_is_the_maximum() {
        let pipeline = PipelineState {
            stages: StageMask::VERTEX | StageMask::TESS_EVAL | StageMask::FRAGMENT,
            ..PipelineState::default()
        };
        let ctx = CompilationContext::new(pipeline);
        let mut lowerer = Lowerer::new(&ctx, ShaderStage::TessEval, CalcFactor::default()).unwrap();
        let mut func = Function::new("tes", ShaderStage::TessEval);
        let block = func.entry;
        let mut b = Builder::at_end(&mut func, block);
        let value = lowerer
            .read_builtin_input(&mut b, Type::I32, BuiltIn::PatchVertices, None, None)
            .unwrap();
        assert_eq!(value, Operand::i32(MAX_TESS_PATCH_VERTICES));
    }

    #[test]
    fn gs_position_needs_a_vertex() {
        let pipeline = PipelineState {
            stages: StageMask::VERTEX | StageMask::GEOMETRY | StageMask::FRAGMENT,
            ..PipelineState::default()
        };
        let mut ctx = CompilationContext::new(pipeline);
        ctx.usage_mut(ShaderStage::Geometry)
            .in_out
            .builtin_input_loc_map
            .insert(BuiltIn::Position, 0);
        let mut lowerer = Lowerer::new(&ctx, ShaderStage::Geometry, CalcFactor::default()).unwrap();
        let mut func = Function::new("gs", ShaderStage::Geometry);
        let block = func.entry;
        let mut b = Builder::at_end(&mut func, block);
        let err = lowerer
            .read_builtin_input(&mut b, Type::vec(ScalarType::F32, 4), BuiltIn::Position, None, None)
            .unwrap_err();
        assert!(matches!(err, IoError::UnsupportedMarker { .. }));
    }
}
