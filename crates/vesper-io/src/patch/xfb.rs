//! Transform feedback stores of the last vertex-processing stage.

use vesper_ir::instr::CmpPred;
use vesper_ir::{
    BufferAccess, Builder, CachePolicy, Descriptor, EntryValue, Operand, ScalarType, ShaderStage,
    Type,
};

use super::Lowerer;
use crate::error::IoError;
use crate::strategy::StorageStrategy;

/// Splits a value into the pieces one typed store can write: at most four 32-bit or 16-bit
/// elements, and never three 16-bit ones. Each piece comes with its byte offset from `offset`.
fn split_store(b: &mut Builder<'_>, value: Operand, offset: u32) -> Result<Vec<(Operand, u32)>, IoError> {
    let ty = b.ty(&value);
    let count = ty.element_count();
    match (ty.scalar_type(), count) {
        (Some(ScalarType::F32), 5..=8) => {
            let rest: Vec<u32> = (4..count).collect();
            let lo = b.shuffle(value, value, &[0, 1, 2, 3]);
            let hi = b.shuffle(value, value, &rest);
            Ok(vec![(lo, offset), (hi, offset + 16)])
        }
        (Some(ScalarType::F16), 3) => {
            let lo = b.shuffle(value, value, &[0, 1]);
            let hi = b.extract_lane(value, 2);
            Ok(vec![(lo, offset), (hi, offset + 4)])
        }
        (Some(ScalarType::F32 | ScalarType::F16), 1..=4) => Ok(vec![(value, offset)]),
        _ => Err(IoError::UnsupportedIoType(ty)),
    }
}

impl Lowerer<'_> {
    pub(super) fn write_xfb_output(
        &mut self,
        b: &mut Builder<'_>,
        buffer: u32,
        offset: u32,
        value: Operand,
    ) -> Result<(), IoError> {
        // GS stream-out is replayed by the copy shader (or the primitive shader); earlier
        // stages never reach the buffers.
        if self.output != StorageStrategy::Export {
            return Ok(());
        }
        let ctx = self.ctx;
        let usage_stage = match self.stage {
            ShaderStage::CopyShader => ShaderStage::Geometry,
            stage => stage,
        };
        let stride = ctx
            .usage(usage_stage)
            .in_out
            .xfb_strides
            .get(buffer as usize)
            .copied()
            .unwrap_or(0);
        if stride == 0 {
            return Err(IoError::ZeroXfbStride { buffer });
        }

        let ty = b.ty(&value);
        let (value, half) = match ty.scalar_bits() {
            64 => {
                let floats = Type::scalar_or_vec(ScalarType::F32, ty.element_count() * 2);
                (b.bitcast(value, floats), false)
            }
            32 => (b.bitcast(value, ty.with_scalar(ScalarType::F32)), false),
            16 => (b.bitcast(value, ty.with_scalar(ScalarType::F16)), true),
            _ => return Err(IoError::UnsupportedIoType(ty)),
        };
        let pieces = split_store(b, value, offset)?;

        let thread_id = self.thread_id()?;
        let write_index = Operand::Entry(EntryValue::StreamOutWriteIndex);
        let vindex = if ctx.pipeline.gfx_ip.major >= 9 {
            b.add(write_index, thread_id)
        } else {
            write_index
        };
        let stream_offset = Operand::Entry(EntryValue::StreamOutOffset(buffer as u8));
        let soffset = b.mul(stream_offset, Operand::i32(4));
        // Threads past the vertex count of the wave write nothing.
        let vertex_count = b.ubfe(Operand::Entry(EntryValue::StreamOutInfo), 16, 7);
        let in_range = b.icmp(CmpPred::Ult, thread_id, vertex_count);

        for (piece, byte_offset) in pieces {
            let elems = b.ty(&piece).element_count();
            let format = if half {
                ctx.target.half_buffer_format(elems)
            } else {
                ctx.target.float_buffer_format(elems)
            };
            let access = BufferAccess {
                desc: Operand::Entry(EntryValue::Descriptor(Descriptor::StreamOutBuffer(buffer as u8))),
                vindex: Some(vindex),
                voffset: Operand::i32(0),
                soffset,
                offset: byte_offset,
                format: Some(format),
                cache: CachePolicy::GLC | CachePolicy::SLC,
            };
            b.buffer_store(piece, access, Some(in_range));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CompilationContext;
    use crate::layout::CalcFactor;
    use crate::pipeline::PipelineState;
    use pretty_assertions::assert_eq;
    use vesper_ir::{Function, Instr};

    fn vs_with_xfb(stride: u32) -> CompilationContext {
        let mut ctx = CompilationContext::new(PipelineState::default());
        let io = &mut ctx.usage_mut(ShaderStage::Vertex).in_out;
        io.enable_xfb = true;
        io.xfb_strides[0] = stride;
        ctx
    }

    fn lower_one(ctx: &CompilationContext, value_ty: Type, offset: u32) -> Result<Function, IoError> {
        let mut func = Function::new("vs", ShaderStage::Vertex);
        let local = func.new_local(value_ty);
        let mut lowerer = Lowerer::new(ctx, ShaderStage::Vertex, CalcFactor::default())?;
        lowerer.prologue(&mut func);
        let block = func.entry;
        let mut b = Builder::at_end(&mut func, block);
        let value = b.load_local(local);
        lowerer.write_xfb_output(&mut b, 0, offset, value)?;
        Ok(func)
    }

    fn store_offsets(func: &Function) -> Vec<u32> {
        func.instrs()
            .filter_map(|(_, _, i)| match i {
                Instr::BufferStore {
                    access, predicate, ..
                } => {
                    assert!(predicate.is_some());
                    Some(access.offset)
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn dvec4_is_split_in_two_stores() {
        let ctx = vs_with_xfb(32);
        let func = lower_one(&ctx, Type::vec(ScalarType::F64, 4), 8).unwrap();
        assert_eq!(store_offsets(&func), vec![8, 24]);
    }

    #[test]
    fn half_vec3_is_split_two_plus_one() {
        let ctx = vs_with_xfb(16);
        let func = lower_one(&ctx, Type::vec(ScalarType::F16, 3), 0).unwrap();
        assert_eq!(store_offsets(&func), vec![0, 4]);
    }

    #[test]
    fn zero_stride_is_rejected() {
        let ctx = vs_with_xfb(0);
        let err = lower_one(&ctx, Type::F32, 0).unwrap_err();
        assert_eq!(err, IoError::ZeroXfbStride { buffer: 0 });
    }
}
