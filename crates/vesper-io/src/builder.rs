//! Front-end facing construction of stage I/O.
//!
//! [`IoBuilder`] is what a shader front end calls to read inputs and write outputs. It records
//! every slot and built-in the shader touches in the stage's [`crate::usage::ResourceUsage`] and
//! emits abstract markers; the patch pass later replaces the markers with memory, ring and export
//! operations. Built-ins that need no stage storage (subgroup masks, compute IDs, vertex IDs) are
//! computed here directly.

use tracing::trace;
use vesper_ir::instr::{CastOp, CmpPred, IntrinsicOp};
use vesper_ir::{
    Builder, BuiltIn, EntryValue, Function, InputImport, InterpLoc, InterpMode, Interpolation, Operand, OutputExport,
    OutputImport, ScalarType, ShaderStage, Type,
};

use crate::builtin_table::check_stage;
use crate::context::CompilationContext;
use crate::error::{Direction, IoError};
use crate::location::LocationInfo;
use crate::pipeline::Topology;
use crate::usage::{BasicType, SlotInfo, UsageFlags, XfbOutInfo};

/// Extra information attached to an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InOutInfo {
    pub interp: Interpolation,
    /// GS vertex stream of an output.
    pub stream: Option<u32>,
    /// Integer FS outputs: signed or unsigned.
    pub is_signed: bool,
    /// Shader-declared array size of clip/cull distances.
    pub array_size: u32,
}

impl InOutInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interp(mut self, mode: InterpMode, loc: InterpLoc) -> Self {
        self.interp = Interpolation::new(mode, loc);
        self
    }

    pub fn with_stream(mut self, stream: u32) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn signed(mut self) -> Self {
        self.is_signed = true;
        self
    }

    pub fn with_array_size(mut self, size: u32) -> Self {
        self.array_size = size;
        self
    }
}

/// Lane number within the wave, from `mbcnt`.
pub fn lane_number(b: &mut Builder<'_>, wave_size: u32) -> Operand {
    let lo = b.intrinsic(
        IntrinsicOp::MbcntLo,
        Type::I32,
        vec![Operand::i32(u32::MAX), Operand::i32(0)],
    );
    if wave_size == 32 {
        return lo;
    }
    b.intrinsic(IntrinsicOp::MbcntHi, Type::I32, vec![Operand::i32(u32::MAX), lo])
}

/// How a custom-interpolated FS input picks its vertex for the current topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexOrder {
    Fixed(u32),
    /// Even and odd primitives of strips order their vertices differently.
    ByParity { even: u32, odd: u32 },
}

/// Hardware vertex feeding API vertex `vertex` of a primitive of `topology`.
pub fn provoking_vertex_order(topology: Topology, vertex: u32) -> Result<VertexOrder, IoError> {
    if vertex > 2 {
        return Err(IoError::Config(format!("per-vertex input index {vertex} is out of range")));
    }
    Ok(match topology {
        Topology::PointList | Topology::LineList | Topology::LineStrip => VertexOrder::Fixed(vertex),
        Topology::TriangleList => VertexOrder::Fixed((vertex + 2) % 3),
        Topology::TriangleStrip | Topology::TriangleFan | Topology::TriangleStripAdjacency => VertexOrder::ByParity {
            even: vertex,
            odd: (vertex + 2) % 3,
        },
        Topology::TriangleListAdjacency => VertexOrder::ByParity {
            even: vertex,
            odd: (vertex + 1) % 3,
        },
        Topology::PatchList => {
            return Err(IoError::Config(
                "per-vertex fragment inputs need a point, line or triangle topology".into(),
            ))
        }
    })
}

fn check_io_type(ty: Type) -> Result<(), IoError> {
    match ty {
        Type::Scalar(s) | Type::Vector(s, 1..=4) if s != ScalarType::I1 => Ok(()),
        _ => Err(IoError::UnsupportedIoType(ty)),
    }
}

/// Element type when `index` selects a single element of a built-in.
fn element_type(ty: Type, index: Option<&Operand>) -> Type {
    match (index, ty.scalar_type()) {
        (Some(_), Some(elem)) if ty.is_aggregate() || ty.is_vector() => Type::Scalar(elem),
        _ => ty,
    }
}

/// Builds the I/O of one shader function.
pub struct IoBuilder<'c, 'f> {
    ctx: &'c mut CompilationContext,
    b: Builder<'f>,
    stage: ShaderStage,
}

impl<'c, 'f> IoBuilder<'c, 'f> {
    /// A builder appending to the entry block of `func`.
    pub fn new(ctx: &'c mut CompilationContext, func: &'f mut Function) -> Result<Self, IoError> {
        let stage = func
            .stage
            .ok_or_else(|| IoError::Config(format!("function {} has no shader stage", func.name)))?;
        let entry = func.entry;
        Ok(Self {
            ctx,
            b: Builder::at_end(func, entry),
            stage,
        })
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// The underlying IR builder, for everything that is not stage I/O.
    pub fn builder(&mut self) -> &mut Builder<'f> {
        &mut self.b
    }

    pub fn context(&self) -> &CompilationContext {
        self.ctx
    }

    /// Reads a generic input. `vertex_idx` selects the vertex in TCS, TES and GS.
    #[allow(clippy::too_many_arguments)]
    pub fn read_generic_input(
        &mut self,
        ty: Type,
        location: u32,
        loc_offset: Operand,
        elem_idx: Operand,
        loc_count: u32,
        info: InOutInfo,
        vertex_idx: Option<Operand>,
    ) -> Result<Operand, IoError> {
        self.read_generic(false, ty, location, loc_offset, elem_idx, loc_count, info, vertex_idx)
    }

    /// TCS read-back of one of its own outputs.
    #[allow(clippy::too_many_arguments)]
    pub fn read_generic_output(
        &mut self,
        ty: Type,
        location: u32,
        loc_offset: Operand,
        elem_idx: Operand,
        loc_count: u32,
        info: InOutInfo,
        vertex_idx: Option<Operand>,
    ) -> Result<Operand, IoError> {
        if self.stage != ShaderStage::TessControl {
            return Err(IoError::OutputReadOutsideTcs(self.stage));
        }
        self.read_generic(true, ty, location, loc_offset, elem_idx, loc_count, info, vertex_idx)
    }

    /// FS input interpolated at a given offset or sample (`info.interp.loc` of `Center`, `Sample`
    /// or `Centroid`) or, with custom interpolation and an `Explicit` location, read from vertex
    /// `aux` of the primitive.
    #[allow(clippy::too_many_arguments)]
    pub fn read_interpolant_input(
        &mut self,
        ty: Type,
        location: u32,
        loc_offset: Operand,
        elem_idx: Operand,
        loc_count: u32,
        mut info: InOutInfo,
        aux: Operand,
    ) -> Result<Operand, IoError> {
        if self.stage != ShaderStage::Fragment {
            return Err(IoError::UnsupportedMarker {
                stage: self.stage,
                marker: "interpolant input".into(),
            });
        }
        check_io_type(ty)?;
        let (location, loc_offset, loc_count) = fold_location(ty, location, loc_offset, loc_count);
        self.mark_generic_usage(false, ty, location, loc_count, &loc_offset, &elem_idx, &mut info, false, true)?;
        let aux = self.modify_aux_interp_value(aux, info)?;
        Ok(self.b.import_input(
            ty,
            InputImport::Interpolant {
                location,
                loc_offset,
                elem_idx,
                mode: info.interp.mode,
                aux,
            },
        ))
    }

    /// Custom-interpolated FS input of one vertex of the primitive. `vertex_idx` is the API vertex
    /// order; it is remapped to the hardware order of the pipeline's topology.
    #[allow(clippy::too_many_arguments)]
    pub fn read_per_vertex_input(
        &mut self,
        ty: Type,
        location: u32,
        loc_offset: Operand,
        elem_idx: Operand,
        loc_count: u32,
        mut info: InOutInfo,
        vertex_idx: Operand,
    ) -> Result<Operand, IoError> {
        if self.stage != ShaderStage::Fragment || info.interp.mode != InterpMode::Custom {
            return Err(IoError::UnsupportedMarker {
                stage: self.stage,
                marker: "per-vertex input".into(),
            });
        }
        check_io_type(ty)?;
        let (location, loc_offset, loc_count) = fold_location(ty, location, loc_offset, loc_count);
        self.mark_generic_usage(false, ty, location, loc_count, &loc_offset, &elem_idx, &mut info, false, true)?;

        let vertex = vertex_idx.as_u32().ok_or(IoError::NonConstant {
            what: "per-vertex input vertex index",
        })?;
        let order = provoking_vertex_order(self.ctx.pipeline.input_assembly.topology, vertex)?;
        let read = |b: &mut Builder<'_>, vertex: u32| {
            b.import_input(
                ty,
                InputImport::Interpolant {
                    location,
                    loc_offset,
                    elem_idx,
                    mode: InterpMode::Custom,
                    aux: Operand::i32(vertex),
                },
            )
        };
        match order {
            VertexOrder::Fixed(v) => Ok(read(&mut self.b, v)),
            VertexOrder::ByParity { even, odd } => {
                let odd = read(&mut self.b, odd);
                let even = read(&mut self.b, even);
                let primitive_id = self.read_builtin_input(BuiltIn::PrimitiveId, InOutInfo::new(), None, None)?;
                let parity = self.b.srem(primitive_id, Operand::i32(2));
                let is_even = self.b.icmp(CmpPred::Eq, parity, Operand::i32(0));
                Ok(self.b.select(is_even, even, odd))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn read_generic(
        &mut self,
        is_output: bool,
        ty: Type,
        location: u32,
        loc_offset: Operand,
        elem_idx: Operand,
        loc_count: u32,
        mut info: InOutInfo,
        vertex_idx: Option<Operand>,
    ) -> Result<Operand, IoError> {
        check_io_type(ty)?;
        let (location, loc_offset, loc_count) = fold_location(ty, location, loc_offset, loc_count);
        let stage = self.stage;
        if !loc_offset.is_const() && !matches!(stage, ShaderStage::TessControl | ShaderStage::TessEval) {
            return Err(IoError::RuntimeLocationOffset(stage));
        }
        let per_vertex = vertex_idx.is_some();
        self.mark_generic_usage(
            is_output, ty, location, loc_count, &loc_offset, &elem_idx, &mut info, per_vertex, false,
        )?;

        let value = match stage {
            ShaderStage::Vertex => {
                let elem_idx = elem_idx.as_u32().ok_or(IoError::NonConstant {
                    what: "vertex input element index",
                })?;
                self.b.import_input(ty, InputImport::Vertex { location, elem_idx })
            }
            ShaderStage::TessControl if is_output => self.b.import_output(
                ty,
                OutputImport::Generic {
                    location,
                    loc_offset,
                    elem_idx,
                    vertex_idx,
                },
            ),
            ShaderStage::TessControl | ShaderStage::TessEval | ShaderStage::Geometry | ShaderStage::Fragment => {
                self.b.import_input(
                    ty,
                    InputImport::Generic {
                        location,
                        loc_offset,
                        elem_idx,
                        vertex_idx,
                        interp: info.interp,
                    },
                )
            }
            ShaderStage::Compute | ShaderStage::CopyShader => {
                return Err(IoError::NoStrategy {
                    stage,
                    what: "generic inputs",
                })
            }
        };
        trace!(%stage, location, is_output, "generic read");
        Ok(value)
    }

    /// Writes (part of) a generic output.
    #[allow(clippy::too_many_arguments)]
    pub fn write_generic_output(
        &mut self,
        value: Operand,
        location: u32,
        loc_offset: Operand,
        elem_idx: Operand,
        loc_count: u32,
        mut info: InOutInfo,
        vertex_idx: Option<Operand>,
    ) -> Result<(), IoError> {
        let ty = self.b.ty(&value);
        check_io_type(ty)?;
        let stage = self.stage;
        let (location, loc_offset, loc_count) = fold_location(ty, location, loc_offset, loc_count);
        if !loc_offset.is_const() && stage != ShaderStage::TessControl {
            return Err(IoError::RuntimeLocationOffset(stage));
        }
        if stage == ShaderStage::Compute {
            return Err(IoError::NoStrategy {
                stage,
                what: "outputs",
            });
        }
        let per_vertex = vertex_idx.is_some();
        self.mark_generic_usage(
            true, ty, location, loc_count, &loc_offset, &elem_idx, &mut info, per_vertex, false,
        )?;
        if stage == ShaderStage::Fragment {
            self.mark_fs_output_type(ty, location, info)?;
        }
        self.b.export_output(OutputExport::Generic {
            location,
            loc_offset,
            elem_idx,
            vertex_idx,
            stream: info.stream.unwrap_or(0),
            value,
        });
        trace!(%stage, location, "generic write");
        Ok(())
    }

    /// Reads a built-in input. `index` selects one element of an array or vector built-in;
    /// `vertex_idx` selects the vertex in TCS, TES and GS.
    pub fn read_builtin_input(
        &mut self,
        builtin: BuiltIn,
        info: InOutInfo,
        vertex_idx: Option<Operand>,
        index: Option<Operand>,
    ) -> Result<Operand, IoError> {
        self.read_builtin(false, builtin, info, vertex_idx, index)
    }

    /// TCS read-back of a built-in output.
    pub fn read_builtin_output(
        &mut self,
        builtin: BuiltIn,
        info: InOutInfo,
        vertex_idx: Option<Operand>,
        index: Option<Operand>,
    ) -> Result<Operand, IoError> {
        if self.stage != ShaderStage::TessControl {
            return Err(IoError::OutputReadOutsideTcs(self.stage));
        }
        self.read_builtin(true, builtin, info, vertex_idx, index)
    }

    fn read_builtin(
        &mut self,
        is_output: bool,
        builtin: BuiltIn,
        info: InOutInfo,
        vertex_idx: Option<Operand>,
        index: Option<Operand>,
    ) -> Result<Operand, IoError> {
        let stage = self.stage;
        let direction = if is_output { Direction::Output } else { Direction::Input };
        check_stage(builtin, stage, direction)?;

        let array_size = index.and_then(|i| i.as_u32()).map_or(info.array_size, |i| i + 1);
        let builtin = if is_output {
            self.mark_builtin_output_usage(builtin, array_size, None);
            builtin
        } else {
            self.mark_builtin_input_usage(builtin, array_size)
        };
        let ty = element_type(builtin.ty(array_size), index.as_ref());

        if let Some(value) = self.read_common_builtin(builtin) {
            return Ok(value);
        }
        if !is_output {
            match stage {
                ShaderStage::Compute => return self.read_cs_builtin(builtin),
                ShaderStage::Vertex => {
                    if let Some(value) = self.read_vs_builtin(builtin) {
                        return Ok(value);
                    }
                }
                _ => {}
            }
        }

        let (elem_idx, vertex_idx, sample_id) = match stage {
            ShaderStage::TessControl | ShaderStage::TessEval => (index, vertex_idx, None),
            ShaderStage::Geometry => (None, vertex_idx, None),
            // The sample number of a sample position offset travels in the vertex index slot.
            ShaderStage::Fragment if builtin == BuiltIn::SamplePosOffset => (None, None, vertex_idx),
            _ => (index, None, None),
        };
        let value = if is_output {
            self.b.import_output(
                ty,
                OutputImport::BuiltIn {
                    builtin,
                    elem_idx,
                    vertex_idx,
                },
            )
        } else {
            self.b.import_input(
                ty,
                InputImport::BuiltIn {
                    builtin,
                    elem_idx,
                    vertex_idx,
                    sample_id,
                },
            )
        };
        trace!(%stage, %builtin, is_output, "built-in read");
        Ok(value)
    }

    fn read_common_builtin(&mut self, builtin: BuiltIn) -> Option<Operand> {
        let wave = self.ctx.pipeline.wave_size(self.stage);
        match builtin {
            BuiltIn::SubgroupEqMask
            | BuiltIn::SubgroupGeMask
            | BuiltIn::SubgroupGtMask
            | BuiltIn::SubgroupLeMask
            | BuiltIn::SubgroupLtMask => {
                let lane = lane_number(&mut self.b, wave);
                let (lane, elem) = if wave == 64 {
                    (self.b.zext(lane, Type::I64), ScalarType::I64)
                } else {
                    (lane, ScalarType::I32)
                };
                let c = |v: i64| Operand::int(elem, v as u64);
                let mask = match builtin {
                    BuiltIn::SubgroupEqMask => self.b.shl(c(1), lane),
                    BuiltIn::SubgroupGeMask => self.b.shl(c(-1), lane),
                    BuiltIn::SubgroupGtMask => self.b.shl(c(-2), lane),
                    BuiltIn::SubgroupLeMask => {
                        let shifted = self.b.shl(c(2), lane);
                        self.b.sub(shifted, c(1))
                    }
                    _ => {
                        let shifted = self.b.shl(c(1), lane);
                        self.b.sub(shifted, c(1))
                    }
                };
                let ty = Type::vec(ScalarType::I32, 4);
                Some(if wave == 64 {
                    let wide = self.b.insert_lane(Operand::Zero(Type::vec(ScalarType::I64, 2)), mask, 0);
                    self.b.bitcast(wide, ty)
                } else {
                    self.b.insert_lane(Operand::Zero(ty), mask, 0)
                })
            }
            BuiltIn::SubgroupSize => Some(Operand::i32(wave)),
            BuiltIn::SubgroupLocalInvocationId => Some(lane_number(&mut self.b, wave)),
            BuiltIn::DeviceIndex => Some(Operand::i32(self.ctx.pipeline.device_index)),
            _ => None,
        }
    }

    fn read_cs_builtin(&mut self, builtin: BuiltIn) -> Result<Operand, IoError> {
        let size = self.ctx.pipeline.compute.workgroup_size;
        let wave = self.ctx.pipeline.wave_size(ShaderStage::Compute);
        Ok(match builtin {
            BuiltIn::WorkgroupSize => {
                let elems = size.map(Operand::i32);
                self.b.build_vector(ScalarType::I32, &elems)
            }
            BuiltIn::NumWorkgroups => Operand::Entry(EntryValue::NumWorkgroups),
            BuiltIn::WorkgroupId => Operand::Entry(EntryValue::WorkgroupId),
            BuiltIn::LocalInvocationId => {
                let mut id = Operand::Entry(EntryValue::LocalInvocationId);
                if size[2] <= 1 {
                    if size[1] <= 1 {
                        id = self.b.insert_lane(id, Operand::i32(0), 1);
                    }
                    id = self.b.insert_lane(id, Operand::i32(0), 2);
                }
                if self.ctx.pipeline.options.reconfig_workgroup_layout {
                    id = self.b.reconfigure_local_invocation_id(id);
                }
                id
            }
            BuiltIn::NumSubgroups => Operand::i32((size[0] * size[1] * size[2]).div_ceil(wave)),
            BuiltIn::GlobalInvocationId => {
                let group = self.read_cs_builtin(BuiltIn::WorkgroupId)?;
                let group_size = self.read_cs_builtin(BuiltIn::WorkgroupSize)?;
                let base = self.b.mul(group, group_size);
                let local = self.read_cs_builtin(BuiltIn::LocalInvocationId)?;
                self.b.add(base, local)
            }
            BuiltIn::LocalInvocationIndex => {
                let local = self.read_cs_builtin(BuiltIn::LocalInvocationId)?;
                let (x, y, z) = (
                    self.b.extract_lane(local, 0),
                    self.b.extract_lane(local, 1),
                    self.b.extract_lane(local, 2),
                );
                let index = self.b.mul(Operand::i32(size[1]), z);
                let index = self.b.add(index, y);
                let index = self.b.mul(Operand::i32(size[0]), index);
                self.b.add(index, x)
            }
            BuiltIn::SubgroupId => {
                let index = self.read_cs_builtin(BuiltIn::LocalInvocationIndex)?;
                self.b.lshr(index, Operand::i32(wave.trailing_zeros()))
            }
            _ => {
                return Err(IoError::InvalidBuiltInStage {
                    builtin,
                    stage: ShaderStage::Compute,
                    direction: Direction::Input,
                })
            }
        })
    }

    fn read_vs_builtin(&mut self, builtin: BuiltIn) -> Option<Operand> {
        let entry = |e: EntryValue| Operand::Entry(e);
        Some(match builtin {
            BuiltIn::BaseVertex => entry(EntryValue::BaseVertex),
            BuiltIn::BaseInstance => entry(EntryValue::BaseInstance),
            BuiltIn::DrawIndex => entry(EntryValue::DrawIndex),
            BuiltIn::VertexIndex => self.b.add(entry(EntryValue::VertexId), entry(EntryValue::BaseVertex)),
            BuiltIn::InstanceIndex => self.b.add(entry(EntryValue::InstanceId), entry(EntryValue::BaseInstance)),
            _ => return None,
        })
    }

    /// Writes (part of) a built-in output.
    pub fn write_builtin_output(
        &mut self,
        value: Operand,
        builtin: BuiltIn,
        info: InOutInfo,
        vertex_idx: Option<Operand>,
        index: Option<Operand>,
    ) -> Result<(), IoError> {
        let stage = self.stage;
        check_stage(builtin, stage, Direction::Output)?;
        let array_size = index.and_then(|i| i.as_u32()).map_or(info.array_size, |i| i + 1);
        self.mark_builtin_output_usage(builtin, array_size, info.stream);

        let expected = element_type(builtin.ty(array_size), index.as_ref());
        let found = self.b.ty(&value);
        let distance_array = matches!(builtin, BuiltIn::ClipDistance | BuiltIn::CullDistance)
            && found.is_array()
            && found.scalar_type() == expected.scalar_type();
        if found != expected && !distance_array {
            return Err(vesper_ir::IrError::TypeMismatch { expected, found }.into());
        }

        let (elem_idx, vertex_idx) = match stage {
            ShaderStage::TessControl => (index, vertex_idx),
            _ => (index, None),
        };
        self.b.export_output(OutputExport::BuiltIn {
            builtin,
            elem_idx,
            vertex_idx,
            stream: info.stream.unwrap_or(0),
            value,
        });
        trace!(%stage, %builtin, "built-in write");
        Ok(())
    }

    /// Writes a transform feedback output. Only the last vertex-processing stage's writes take
    /// effect; elsewhere this records nothing and emits nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn write_xfb_output(
        &mut self,
        value: Operand,
        is_builtin: bool,
        location: u32,
        buffer: u32,
        stride: u32,
        offset: Operand,
        info: InOutInfo,
    ) -> Result<(), IoError> {
        if stride == 0 {
            return Err(IoError::ZeroXfbStride { buffer });
        }
        let offset = offset.as_u32().ok_or(IoError::NonConstantXfbOffset)?;
        let stream = info.stream.unwrap_or(0);
        if buffer >= 4 || stream >= 4 {
            return Err(IoError::Config(format!(
                "transform feedback buffer {buffer} or stream {stream} is out of range"
            )));
        }
        let stage = self.stage;
        if self.ctx.pipeline.last_vertex_stage() != Some(stage) {
            return Ok(());
        }

        let ty = self.b.ty(&value);
        let bits = ty.bit_size();
        let is_16bit = ty.scalar_bits() == 16;
        let dwords = if ty.scalar_bits() == 64 {
            ty.element_count() * 2
        } else {
            ty.element_count()
        };
        let io = &mut self.ctx.usage_mut(stage).in_out;
        io.enable_xfb = true;
        io.xfb_strides[buffer as usize] = stride;
        io.stream_xfb_buffers[stream as usize] |= 1 << buffer;
        if stage == ShaderStage::Geometry {
            let key = LocationInfo {
                is_builtin,
                ..LocationInfo::new(location).with_stream(stream as u8)
            };
            let first = XfbOutInfo {
                buffer,
                offset,
                is_16bit,
                dwords: dwords.min(4),
            };
            io.gs_xfb_out_info.insert(key, first);
            if bits > 128 {
                let key = LocationInfo {
                    location: location + 1,
                    ..key
                };
                let second = XfbOutInfo {
                    buffer,
                    offset: offset + 32,
                    is_16bit,
                    dwords: dwords - 4,
                };
                io.gs_xfb_out_info.insert(key, second);
            }
        }

        self.b.export_output(OutputExport::Xfb {
            buffer,
            offset,
            stream,
            value,
        });
        trace!(%stage, buffer, offset, "xfb write");
        Ok(())
    }

    /// Records the slots a generic read or write touches.
    #[allow(clippy::too_many_arguments)]
    fn mark_generic_usage(
        &mut self,
        is_output: bool,
        ty: Type,
        location: u32,
        loc_count: u32,
        loc_offset: &Operand,
        elem_idx: &Operand,
        info: &mut InOutInfo,
        per_vertex: bool,
        has_aux: bool,
    ) -> Result<(), IoError> {
        let stage = self.stage;
        let pipeline = &self.ctx.pipeline;
        let per_patch = if is_output {
            stage == ShaderStage::TessControl && !per_vertex
        } else {
            stage == ShaderStage::TessEval && !per_vertex
        };
        let keep_all = pipeline.unlinked
            && ((is_output && pipeline.next_stage(stage) == Some(ShaderStage::Fragment))
                || (!is_output && stage == ShaderStage::Fragment));
        let packed = match (stage, is_output) {
            (ShaderStage::Fragment, false) => pipeline
                .prev_stage(ShaderStage::Fragment)
                .is_some_and(|p| pipeline.packs_boundary(p)),
            (ShaderStage::Vertex | ShaderStage::TessEval, true) => pipeline.packs_boundary(stage),
            _ => false,
        };
        let slot = SlotInfo {
            bits: ty.scalar_bits().max(16),
            flat: matches!(info.interp.mode, InterpMode::Flat | InterpMode::Custom),
        };

        let io = &mut self.ctx.usage_mut(stage).in_out;
        let slots = if is_output {
            &mut io.output_slots
        } else {
            &mut io.input_slots
        };
        let mut touch = |key: LocationInfo| {
            slots
                .entry(key)
                .and_modify(|s: &mut SlotInfo| s.flat |= slot.flat)
                .or_insert(slot);
        };

        if packed {
            if !loc_offset.is_const() {
                return Err(IoError::NonConstant {
                    what: "location offset of a packed input or output",
                });
            }
            let elem = elem_idx.as_u32().ok_or(IoError::NonConstant {
                what: "element index of a packed input or output",
            })?;
            for k in 0..ty.element_count() {
                touch(LocationInfo::new(location).channel(elem + k));
            }
        } else {
            let start = if keep_all { 0 } else { location };
            let end = location + loc_count;
            if per_patch {
                let set = if is_output {
                    &mut io.per_patch_output_slots
                } else {
                    &mut io.per_patch_input_slots
                };
                set.extend(start..end);
            } else {
                let stream = match (stage, is_output) {
                    (ShaderStage::Geometry, true) => info.stream.unwrap_or(0) as u8,
                    _ => 0,
                };
                for loc in start..end {
                    touch(LocationInfo::new(loc).with_stream(stream));
                }
            }
        }

        if !is_output && stage == ShaderStage::Fragment {
            self.mark_interpolation_info(&mut info.interp, has_aux);
        }
        Ok(())
    }

    fn mark_interpolation_info(&mut self, interp: &mut Interpolation, has_aux: bool) {
        let interp_mode_patch = self.ctx.pipeline.options.enable_interp_mode_patch;
        let usage = &mut self.ctx.usage_mut(ShaderStage::Fragment).builtin;
        usage.flags |= match interp.mode {
            InterpMode::Custom => return,
            InterpMode::Smooth => UsageFlags::SMOOTH,
            InterpMode::Flat => UsageFlags::FLAT,
            InterpMode::NoPersp => UsageFlags::NOPERSPECTIVE,
        };
        if interp_mode_patch
            && interp.loc == InterpLoc::Center
            && !has_aux
            && usage.has_any(UsageFlags::SMOOTH | UsageFlags::NOPERSPECTIVE)
        {
            interp.loc = InterpLoc::Sample;
        }
        usage.flags |= match interp.loc {
            InterpLoc::Center => UsageFlags::CENTER,
            InterpLoc::Centroid => UsageFlags::CENTER | UsageFlags::CENTROID,
            InterpLoc::Sample => UsageFlags::SAMPLE | UsageFlags::RUN_AT_SAMPLE_RATE,
            InterpLoc::Unknown | InterpLoc::Explicit => UsageFlags::empty(),
        };
    }

    fn mark_fs_output_type(&mut self, ty: Type, location: u32, info: InOutInfo) -> Result<(), IoError> {
        let basic = match (ty.scalar_type(), info.is_signed) {
            (Some(ScalarType::I8), true) => BasicType::Int8,
            (Some(ScalarType::I8), false) => BasicType::Uint8,
            (Some(ScalarType::I16), true) => BasicType::Int16,
            (Some(ScalarType::I16), false) => BasicType::Uint16,
            (Some(ScalarType::I32), true) => BasicType::Int,
            (Some(ScalarType::I32), false) => BasicType::Uint,
            (Some(ScalarType::F16), _) => BasicType::Float16,
            (Some(ScalarType::F32), _) => BasicType::Float,
            _ => return Err(IoError::UnsupportedIoType(ty)),
        };
        self.ctx
            .usage_mut(ShaderStage::Fragment)
            .in_out
            .fs_output_types
            .insert(location, basic);
        Ok(())
    }

    /// Turns the auxiliary value of an interpolant read into the I/J pair to interpolate at.
    fn modify_aux_interp_value(&mut self, aux: Operand, info: InOutInfo) -> Result<Operand, IoError> {
        let Interpolation { mode, loc } = info.interp;
        if loc == InterpLoc::Explicit {
            return Ok(aux);
        }
        let usage = &mut self.ctx.usage_mut(ShaderStage::Fragment).builtin;
        if loc == InterpLoc::Centroid {
            let builtin = if mode == InterpMode::NoPersp {
                usage.flags |= UsageFlags::NOPERSPECTIVE | UsageFlags::CENTROID;
                BuiltIn::InterpLinearCentroid
            } else {
                usage.flags |= UsageFlags::SMOOTH | UsageFlags::CENTROID;
                BuiltIn::InterpPerspCentroid
            };
            return Ok(self.b.import_input(
                builtin.ty(0),
                InputImport::BuiltIn {
                    builtin,
                    elem_idx: None,
                    vertex_idx: None,
                    sample_id: None,
                },
            ));
        }

        let offset = if loc == InterpLoc::Sample {
            self.read_builtin_input(BuiltIn::SamplePosOffset, InOutInfo::new(), Some(aux), None)?
        } else {
            aux
        };
        if mode == InterpMode::NoPersp {
            let center = self.read_builtin_input(BuiltIn::InterpLinearCenter, InOutInfo::new(), None, None)?;
            return Ok(self.adjust_ij(center, offset));
        }
        let pull_model = self.read_builtin_input(BuiltIn::InterpPullMode, InOutInfo::new(), None, None)?;
        let adjusted = self.adjust_ij(pull_model, offset);
        let ij_div_w = self.b.shuffle(adjusted, adjusted, &[0, 1]);
        let rcp_w = self.b.extract_lane(adjusted, 2);
        let w = self.b.fdiv(Operand::f32(1.0), rcp_w);
        let w = self.b.build_vector(ScalarType::F32, &[w, w]);
        Ok(self.b.fmul(ij_div_w, w))
    }

    /// `value + ddx(value) * offset.x + ddy(value) * offset.y`, per lane.
    fn adjust_ij(&mut self, value: Operand, offset: Operand) -> Operand {
        let offset = self.b.cast(CastOp::FpExt, offset, Type::vec(ScalarType::F32, 2));
        let (mut x, mut y) = (self.b.extract_lane(offset, 0), self.b.extract_lane(offset, 1));
        let ty = self.b.ty(&value);
        if ty.is_vector() {
            let n = ty.element_count() as usize;
            x = self.b.build_vector(ScalarType::F32, &vec![x; n]);
            y = self.b.build_vector(ScalarType::F32, &vec![y; n]);
        }
        let ddx = self.b.intrinsic(IntrinsicOp::DerivFineX, ty, vec![value]);
        let ddy = self.b.intrinsic(IntrinsicOp::DerivFineY, ty, vec![value]);
        let dx = self.b.fmul(ddx, x);
        let adjusted = self.b.fadd(value, dx);
        let dy = self.b.fmul(ddy, y);
        self.b.fadd(adjusted, dy)
    }

    /// Returns the built-in actually read: barycentrics may be redirected to their per-sample form.
    fn mark_builtin_input_usage(&mut self, builtin: BuiltIn, array_size: u32) -> BuiltIn {
        let stage = self.stage;
        let pipeline = &self.ctx.pipeline;
        let per_sample = pipeline.rasterizer.per_sample_shading;
        let interp_mode_patch = pipeline.options.enable_interp_mode_patch;
        let usage = &mut self.ctx.usage_mut(stage).builtin;
        let mut read = builtin;
        let flags = match (stage, builtin) {
            (_, BuiltIn::ClipDistance) => {
                usage.clip_distance_in = usage.clip_distance_in.max(array_size);
                UsageFlags::empty()
            }
            (_, BuiltIn::CullDistance) => {
                usage.cull_distance_in = usage.cull_distance_in.max(array_size);
                UsageFlags::empty()
            }
            (_, BuiltIn::PrimitiveId) => UsageFlags::PRIMITIVE_ID_IN,
            (_, BuiltIn::ViewIndex) => UsageFlags::VIEW_INDEX,
            (_, BuiltIn::Position) => UsageFlags::POSITION_IN,
            (_, BuiltIn::PointSize) => UsageFlags::POINT_SIZE_IN,
            (_, BuiltIn::PatchVertices) => UsageFlags::PATCH_VERTICES,
            (_, BuiltIn::InvocationId) => UsageFlags::INVOCATION_ID,
            (_, BuiltIn::TessCoord) => UsageFlags::TESS_COORD,
            (_, BuiltIn::TessLevelOuter) => UsageFlags::TESS_LEVEL_OUTER_IN,
            (_, BuiltIn::TessLevelInner) => UsageFlags::TESS_LEVEL_INNER_IN,
            (ShaderStage::Fragment, fs) => match fs {
                BuiltIn::FragCoord => UsageFlags::FRAG_COORD,
                BuiltIn::FrontFacing => UsageFlags::FRONT_FACING,
                // Point coordinates are a smooth-interpolated generic input.
                BuiltIn::PointCoord => {
                    UsageFlags::POINT_COORD
                        | UsageFlags::SMOOTH
                        | if per_sample {
                            UsageFlags::SAMPLE
                        } else {
                            UsageFlags::CENTER
                        }
                }
                BuiltIn::SampleId => UsageFlags::SAMPLE_ID | UsageFlags::RUN_AT_SAMPLE_RATE,
                BuiltIn::SamplePosition => {
                    UsageFlags::SAMPLE_POSITION | UsageFlags::SAMPLE_ID | UsageFlags::RUN_AT_SAMPLE_RATE
                }
                BuiltIn::SampleMask => UsageFlags::SAMPLE_MASK_IN,
                BuiltIn::Layer => UsageFlags::LAYER_IN,
                BuiltIn::ViewportIndex => UsageFlags::VIEWPORT_INDEX_IN,
                BuiltIn::ShadingRate => UsageFlags::SHADING_RATE,
                BuiltIn::HelperInvocation => UsageFlags::HELPER_INVOCATION,
                BuiltIn::BaryCoordNoPersp if interp_mode_patch => {
                    read = BuiltIn::BaryCoordNoPerspSample;
                    UsageFlags::BARY_COORD_NO_PERSP | UsageFlags::BARY_COORD_NO_PERSP_SAMPLE
                }
                BuiltIn::BaryCoordNoPersp => UsageFlags::BARY_COORD_NO_PERSP,
                BuiltIn::BaryCoordNoPerspCentroid => UsageFlags::BARY_COORD_NO_PERSP_CENTROID,
                BuiltIn::BaryCoordNoPerspSample => UsageFlags::BARY_COORD_NO_PERSP_SAMPLE,
                BuiltIn::BaryCoordSmooth if interp_mode_patch => {
                    read = BuiltIn::BaryCoordSmoothSample;
                    UsageFlags::BARY_COORD_SMOOTH | UsageFlags::BARY_COORD_SMOOTH_SAMPLE
                }
                BuiltIn::BaryCoordSmooth => UsageFlags::BARY_COORD_SMOOTH,
                BuiltIn::BaryCoordSmoothCentroid => UsageFlags::BARY_COORD_SMOOTH_CENTROID,
                BuiltIn::BaryCoordSmoothSample => UsageFlags::BARY_COORD_SMOOTH_SAMPLE,
                BuiltIn::BaryCoordPullModel => UsageFlags::BARY_COORD_PULL_MODEL,
                BuiltIn::BaryCoord => UsageFlags::BARY_COORD | UsageFlags::PRIMITIVE_ID_IN,
                BuiltIn::BaryCoordNoPerspKhr => UsageFlags::BARY_COORD_NO_PERSP_KHR | UsageFlags::PRIMITIVE_ID_IN,
                BuiltIn::InterpLinearCenter => UsageFlags::NOPERSPECTIVE | UsageFlags::CENTER,
                BuiltIn::InterpPullMode => UsageFlags::SMOOTH | UsageFlags::PULL_MODE,
                BuiltIn::SamplePosOffset => UsageFlags::RUN_AT_SAMPLE_RATE,
                _ => UsageFlags::empty(),
            },
            _ => UsageFlags::empty(),
        };
        usage.flags |= flags;
        read
    }

    fn mark_builtin_output_usage(&mut self, builtin: BuiltIn, array_size: u32, stream: Option<u32>) {
        let stage = self.stage;
        let usage = &mut self.ctx.usage_mut(stage).builtin;
        let flags = match builtin {
            BuiltIn::ClipDistance => {
                usage.clip_distance = usage.clip_distance.max(array_size);
                UsageFlags::empty()
            }
            BuiltIn::CullDistance => {
                usage.cull_distance = usage.cull_distance.max(array_size);
                UsageFlags::empty()
            }
            BuiltIn::Position => UsageFlags::POSITION,
            BuiltIn::PointSize => UsageFlags::POINT_SIZE,
            BuiltIn::Layer => UsageFlags::LAYER,
            BuiltIn::ViewportIndex => UsageFlags::VIEWPORT_INDEX,
            BuiltIn::PrimitiveShadingRate => UsageFlags::PRIMITIVE_SHADING_RATE,
            BuiltIn::PrimitiveId => UsageFlags::PRIMITIVE_ID,
            BuiltIn::TessLevelOuter => UsageFlags::TESS_LEVEL_OUTER,
            BuiltIn::TessLevelInner => UsageFlags::TESS_LEVEL_INNER,
            BuiltIn::FragDepth => UsageFlags::FRAG_DEPTH,
            BuiltIn::SampleMask => UsageFlags::SAMPLE_MASK,
            BuiltIn::FragStencilRef => UsageFlags::FRAG_STENCIL_REF,
            _ => UsageFlags::empty(),
        };
        usage.flags |= flags;
        // Built-ins are exported from the stream they are written on.
        if let (ShaderStage::Geometry, Some(stream)) = (stage, stream) {
            self.ctx.usage_mut(stage).in_out.gs_raster_stream = Some(stream);
        }
    }
}

/// Folds a constant location offset into the location. A constant offset leaves an `i32 0` offset
/// and a location count derived from the type.
fn fold_location(ty: Type, location: u32, loc_offset: Operand, loc_count: u32) -> (u32, Operand, u32) {
    match loc_offset.as_u32() {
        Some(offset) => (location + offset, Operand::i32(0), ty.bit_size().div_ceil(128).max(1)),
        None => (location, loc_offset, loc_count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineState, StageMask};
    use pretty_assertions::assert_eq;
    use vesper_ir::{BlockId, Instr};

    fn ctx(stages: StageMask) -> CompilationContext {
        CompilationContext::new(PipelineState {
            stages,
            ..PipelineState::default()
        })
    }

    fn markers(func: &Function) -> Vec<Instr> {
        func.block(BlockId(0))
            .instrs
            .iter()
            .filter(|i| i.is_io_marker())
            .cloned()
            .collect()
    }

    #[test]
    fn vertex_output_records_whole_locations() {
        let mut ctx = ctx(StageMask::VERTEX | StageMask::FRAGMENT);
        let mut func = Function::new("vs", ShaderStage::Vertex);
        let mut io = IoBuilder::new(&mut ctx, &mut func).unwrap();
        let value = Operand::Zero(Type::vec(ScalarType::F64, 4));
        io.write_generic_output(value, 2, Operand::i32(1), Operand::i32(0), 1, InOutInfo::new(), None)
            .unwrap();

        let slots: Vec<_> = ctx.usage(ShaderStage::Vertex).in_out.output_slots.keys().copied().collect();
        assert_eq!(slots, vec![LocationInfo::new(3), LocationInfo::new(4)]);
        assert!(matches!(
            markers(&func)[..],
            [Instr::ExportOutput(OutputExport::Generic { location: 3, .. })]
        ));
    }

    #[test]
    fn runtime_location_offset_is_rejected_outside_tessellation() {
        let mut ctx = ctx(StageMask::VERTEX | StageMask::GEOMETRY);
        let mut func = Function::new("gs", ShaderStage::Geometry);
        let dynamic = Operand::Entry(EntryValue::GsPrimitiveId);
        let mut io = IoBuilder::new(&mut ctx, &mut func).unwrap();
        let err = io
            .read_generic_input(Type::F32, 0, dynamic, Operand::i32(0), 2, InOutInfo::new(), Some(Operand::i32(0)))
            .unwrap_err();
        assert_eq!(err, IoError::RuntimeLocationOffset(ShaderStage::Geometry));
    }

    #[test]
    fn tes_input_without_vertex_is_per_patch() {
        let mut ctx = ctx(StageMask::VERTEX | StageMask::TESS_CONTROL | StageMask::TESS_EVAL);
        let mut func = Function::new("tes", ShaderStage::TessEval);
        let mut io = IoBuilder::new(&mut ctx, &mut func).unwrap();
        io.read_generic_input(Type::F32, 5, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), None)
            .unwrap();
        let usage = &ctx.usage(ShaderStage::TessEval).in_out;
        assert!(usage.input_slots.is_empty());
        assert!(usage.per_patch_input_slots.contains(&5));
    }

    #[test]
    fn aggregate_io_is_rejected() {
        let mut ctx = ctx(StageMask::VERTEX | StageMask::FRAGMENT);
        let mut func = Function::new("vs", ShaderStage::Vertex);
        let mut io = IoBuilder::new(&mut ctx, &mut func).unwrap();
        let ty = Type::array(ScalarType::F32, 2);
        let err = io
            .write_generic_output(Operand::Zero(ty), 0, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), None)
            .unwrap_err();
        assert_eq!(err, IoError::UnsupportedIoType(ty));
    }

    #[test]
    fn interp_mode_patch_moves_center_to_sample() {
        let mut ctx = ctx(StageMask::VERTEX | StageMask::FRAGMENT);
        ctx.pipeline.options.enable_interp_mode_patch = true;
        let mut func = Function::new("fs", ShaderStage::Fragment);
        let mut io = IoBuilder::new(&mut ctx, &mut func).unwrap();
        io.read_generic_input(Type::F32, 0, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), None)
            .unwrap();

        let usage = ctx.usage(ShaderStage::Fragment).builtin;
        assert!(usage.has(UsageFlags::SMOOTH | UsageFlags::SAMPLE | UsageFlags::RUN_AT_SAMPLE_RATE));
        assert!(!usage.has(UsageFlags::CENTER));
        match &markers(&func)[..] {
            [Instr::ImportInput {
                import: InputImport::Generic { interp, .. },
                ..
            }] => assert_eq!(interp.loc, InterpLoc::Sample),
            other => panic!("unexpected markers {other:?}"),
        }
    }

    #[test]
    fn xfb_outside_last_vertex_stage_is_a_no_op() {
        let mut ctx = ctx(StageMask::VERTEX | StageMask::GEOMETRY | StageMask::FRAGMENT);
        let mut func = Function::new("vs", ShaderStage::Vertex);
        let mut io = IoBuilder::new(&mut ctx, &mut func).unwrap();
        io.write_xfb_output(Operand::f32(1.0), false, 0, 0, 16, Operand::i32(0), InOutInfo::new())
            .unwrap();
        assert!(markers(&func).is_empty());
        assert!(!ctx.usage(ShaderStage::Vertex).in_out.enable_xfb);
    }

    #[test]
    fn xfb_checks_stride_and_offset() {
        let mut ctx = ctx(StageMask::VERTEX);
        let mut func = Function::new("vs", ShaderStage::Vertex);
        let mut io = IoBuilder::new(&mut ctx, &mut func).unwrap();
        let value = Operand::f32(1.0);
        assert_eq!(
            io.write_xfb_output(value, false, 0, 1, 0, Operand::i32(0), InOutInfo::new()),
            Err(IoError::ZeroXfbStride { buffer: 1 })
        );
        let dynamic = Operand::Entry(EntryValue::VertexId);
        assert_eq!(
            io.write_xfb_output(value, false, 0, 1, 16, dynamic, InOutInfo::new()),
            Err(IoError::NonConstantXfbOffset)
        );
    }

    #[test]
    fn gs_xfb_of_wide_values_takes_two_entries() {
        let mut ctx = ctx(StageMask::VERTEX | StageMask::GEOMETRY | StageMask::FRAGMENT);
        let mut func = Function::new("gs", ShaderStage::Geometry);
        let mut io = IoBuilder::new(&mut ctx, &mut func).unwrap();
        let value = Operand::Zero(Type::vec(ScalarType::F64, 3));
        io.write_xfb_output(value, false, 4, 2, 64, Operand::i32(8), InOutInfo::new().with_stream(1))
            .unwrap();

        let io = &ctx.usage(ShaderStage::Geometry).in_out;
        assert_eq!(io.xfb_strides[2], 64);
        assert_eq!(io.stream_xfb_buffers[1], 1 << 2);
        let entries: Vec<_> = io
            .gs_xfb_out_info
            .iter()
            .map(|(k, v)| (k.location, v.offset, v.dwords))
            .collect();
        assert_eq!(entries, vec![(4, 8, 4), (5, 40, 2)]);
    }

    #[test]
    fn builtins_are_checked_against_the_stage() {
        let mut ctx = ctx(StageMask::VERTEX | StageMask::FRAGMENT);
        let mut func = Function::new("vs", ShaderStage::Vertex);
        let mut io = IoBuilder::new(&mut ctx, &mut func).unwrap();
        let err = io
            .write_builtin_output(Operand::f32(0.5), BuiltIn::FragDepth, InOutInfo::new(), None, None)
            .unwrap_err();
        assert!(matches!(err, IoError::InvalidBuiltInStage { .. }));
    }

    #[test]
    fn clip_distance_index_sets_the_array_size() {
        let mut ctx = ctx(StageMask::VERTEX | StageMask::FRAGMENT);
        let mut func = Function::new("vs", ShaderStage::Vertex);
        let mut io = IoBuilder::new(&mut ctx, &mut func).unwrap();
        io.write_builtin_output(
            Operand::f32(1.0),
            BuiltIn::ClipDistance,
            InOutInfo::new(),
            None,
            Some(Operand::i32(5)),
        )
        .unwrap();
        assert_eq!(ctx.usage(ShaderStage::Vertex).builtin.clip_distance, 6);
    }

    #[test]
    fn gs_builtin_stream_is_recorded_without_touching_the_pipeline() {
        let mut ctx = ctx(StageMask::VERTEX | StageMask::GEOMETRY | StageMask::FRAGMENT);
        let mut func = Function::new("gs", ShaderStage::Geometry);
        let mut io = IoBuilder::new(&mut ctx, &mut func).unwrap();
        let position = Operand::Zero(Type::vec(ScalarType::F32, 4));
        io.write_builtin_output(position, BuiltIn::Position, InOutInfo::new().with_stream(1), None, None)
            .unwrap();

        assert_eq!(ctx.pipeline.geometry.raster_stream, 0);
        assert_eq!(ctx.usage(ShaderStage::Geometry).in_out.gs_raster_stream, Some(1));
        assert_eq!(ctx.raster_stream(), 1);
    }

    #[test]
    fn compute_ids_are_computed_directly() {
        let mut ctx = ctx(StageMask::COMPUTE);
        ctx.pipeline.compute.workgroup_size = [8, 4, 1];
        let mut func = Function::new("cs", ShaderStage::Compute);
        let mut io = IoBuilder::new(&mut ctx, &mut func).unwrap();
        let count = io
            .read_builtin_input(BuiltIn::NumSubgroups, InOutInfo::new(), None, None)
            .unwrap();
        assert_eq!(count, Operand::i32(1));
        io.read_builtin_input(BuiltIn::LocalInvocationIndex, InOutInfo::new(), None, None)
            .unwrap();
        assert!(markers(&func).is_empty());
    }

    #[test]
    fn topology_remap() {
        assert_eq!(
            provoking_vertex_order(Topology::TriangleList, 0),
            Ok(VertexOrder::Fixed(2))
        );
        assert_eq!(
            provoking_vertex_order(Topology::TriangleList, 2),
            Ok(VertexOrder::Fixed(1))
        );
        assert_eq!(
            provoking_vertex_order(Topology::TriangleStrip, 1),
            Ok(VertexOrder::ByParity { even: 1, odd: 0 })
        );
        assert_eq!(
            provoking_vertex_order(Topology::TriangleListAdjacency, 2),
            Ok(VertexOrder::ByParity { even: 2, odd: 0 })
        );
        assert_eq!(provoking_vertex_order(Topology::LineStrip, 1), Ok(VertexOrder::Fixed(1)));
        assert!(provoking_vertex_order(Topology::PatchList, 0).is_err());
    }

    #[test]
    fn packed_fs_inputs_are_keyed_per_element() {
        let mut ctx = ctx(StageMask::VERTEX | StageMask::FRAGMENT);
        ctx.pipeline.options.pack_inputs = true;
        ctx.pipeline.options.pack_outputs = true;
        let mut func = Function::new("fs", ShaderStage::Fragment);
        let mut io = IoBuilder::new(&mut ctx, &mut func).unwrap();
        let info = InOutInfo::new().with_interp(InterpMode::Flat, InterpLoc::Center);
        io.read_generic_input(Type::vec(ScalarType::I16, 2), 3, Operand::i32(0), Operand::i32(1), 1, info, None)
            .unwrap();

        let slots: Vec<_> = ctx.usage(ShaderStage::Fragment).in_out.input_slots.iter().map(|(k, v)| (*k, *v)).collect();
        let slot = SlotInfo { bits: 16, flat: true };
        assert_eq!(
            slots,
            vec![
                (LocationInfo::new(3).with_component(1), slot),
                (LocationInfo::new(3).with_component(2), slot),
            ]
        );
    }
}
