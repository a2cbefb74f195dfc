//! TCS tessellation level writes: stored to the TF buffer where they happen, and mirrored to the
//! per-patch region when the TES reads them.

use vesper_ir::instr::CmpPred;
use vesper_ir::{
    BufferAccess, Builder, BuiltIn, CachePolicy, Descriptor, EntryValue, Operand, ScalarType,
    ShaderStage,
};

use super::storage::Place;
use super::Lowerer;
use crate::error::IoError;
use crate::offsets::tess_factor_bytes;
use crate::pipeline::PrimitiveMode;

/// Hardware position of API outer level `index`. Isolines swap the first two levels: the hardware
/// wants the line detail level before the line density.
fn hw_outer_index(b: &mut Builder<'_>, index: Operand) -> Operand {
    match index.as_u32() {
        Some(i) if i < 2 => Operand::i32(i ^ 1),
        Some(_) => index,
        None => {
            let swaps = b.icmp(CmpPred::Ult, index, Operand::i32(2));
            let swapped = b.xor(index, Operand::i32(1));
            b.select(swaps, swapped, index)
        }
    }
}

impl Lowerer<'_> {
    pub(super) fn write_tess_level(
        &mut self,
        b: &mut Builder<'_>,
        builtin: BuiltIn,
        elem_idx: Option<Operand>,
        value: Operand,
    ) -> Result<(), IoError> {
        let ctx = self.ctx;
        let mode = ctx.pipeline.tessellation.primitive_mode;
        let (outer_count, inner_count) = mode.tess_factor_counts();
        let outer = builtin == BuiltIn::TessLevelOuter;
        let (start, count) = if outer {
            (0, outer_count)
        } else {
            (outer_count, inner_count)
        };

        let mirror = ctx
            .usage(ShaderStage::TessControl)
            .in_out
            .per_patch_builtin_output_loc_map
            .get(&builtin)
            .copied();
        if let Some(loc) = mirror {
            let comp = elem_idx.unwrap_or(Operand::i32(0));
            self.write_place(b, &Place::TessOutput { vertex: None }, Operand::i32(loc), comp, value)?;
        }
        if count == 0 {
            return Ok(());
        }

        match elem_idx {
            None => {
                let mut levels: Vec<Operand> = (0..count).map(|i| b.extract_value(value, i)).collect();
                if outer && mode == PrimitiveMode::Isolines {
                    levels.swap(0, 1);
                }
                let levels = b.build_vector(ScalarType::F32, &levels);
                self.store_tess_factor(b, levels, Operand::i32(start), count, None);
            }
            Some(index) => {
                let index = if outer && mode == PrimitiveMode::Isolines {
                    hw_outer_index(b, index)
                } else {
                    index
                };
                // Levels past the primitive mode's count are dropped.
                let in_range = b.icmp(CmpPred::Ult, index, Operand::i32(count));
                let predicate = match in_range.as_u32() {
                    Some(0) => return Ok(()),
                    Some(_) => None,
                    None => Some(in_range),
                };
                let index = b.add(Operand::i32(start), index);
                self.store_tess_factor(b, value, index, 1, predicate);
            }
        }
        Ok(())
    }

    fn store_tess_factor(
        &self,
        b: &mut Builder<'_>,
        value: Operand,
        index: Operand,
        dwords: u32,
        predicate: Option<Operand>,
    ) {
        let pipeline = &self.ctx.pipeline;
        let base = Operand::Entry(EntryValue::TfBufferBase);
        // GFX8 off-chip keeps the dynamic HS control word in the first dword.
        let soffset = if pipeline.tess_off_chip && pipeline.gfx_ip.major <= 8 {
            b.add(base, Operand::i32(4))
        } else {
            base
        };
        let voffset = tess_factor_bytes(
            b,
            self.calc.tess_factor_stride,
            Operand::Entry(EntryValue::TcsRelPatchId),
            index,
        );
        let access = BufferAccess {
            desc: Operand::Entry(EntryValue::Descriptor(Descriptor::TessFactorBuffer)),
            vindex: None,
            voffset,
            soffset,
            offset: 0,
            format: Some(self.ctx.target.float_buffer_format(dwords)),
            cache: CachePolicy::GLC,
        };
        b.buffer_store(value, access, predicate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CompilationContext;
    use crate::layout::CalcFactor;
    use crate::pipeline::{PipelineState, StageMask};
    use pretty_assertions::assert_eq;
    use vesper_ir::{Function, Instr, Type};

    fn tcs(mode: PrimitiveMode) -> CompilationContext {
        let mut pipeline = PipelineState {
            stages: StageMask::VERTEX | StageMask::TESS_CONTROL | StageMask::TESS_EVAL | StageMask::FRAGMENT,
            ..PipelineState::default()
        };
        pipeline.tessellation.primitive_mode = mode;
        CompilationContext::new(pipeline)
    }

    fn stores(func: &Function) -> Vec<(Operand, Option<Operand>)> {
        func.instrs()
            .filter_map(|(_, _, i)| match i {
                Instr::BufferStore {
                    access, predicate, ..
                } => Some((access.voffset, *predicate)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn isoline_outer_levels_swap() {
        let mut func = Function::new("tcs", ShaderStage::TessControl);
        let block = func.entry;
        let mut b = Builder::at_end(&mut func, block);
        assert_eq!(hw_outer_index(&mut b, Operand::i32(0)), Operand::i32(1));
        assert_eq!(hw_outer_index(&mut b, Operand::i32(1)), Operand::i32(0));
        assert_eq!(hw_outer_index(&mut b, Operand::i32(3)), Operand::i32(3));
        assert!(func.block(block).instrs.is_empty());
    }

    #[test]
    fn out_of_range_constant_level_is_dropped() {
        let ctx = tcs(PrimitiveMode::Triangles);
        let calc = CalcFactor {
            tess_factor_stride: 4,
            ..CalcFactor::default()
        };
        let mut lowerer = Lowerer::new(&ctx, ShaderStage::TessControl, calc).unwrap();
        let mut func = Function::new("tcs", ShaderStage::TessControl);
        let block = func.entry;
        let mut b = Builder::at_end(&mut func, block);
        // Triangles have a single inner level.
        lowerer
            .write_tess_level(&mut b, BuiltIn::TessLevelInner, Some(Operand::i32(1)), Operand::f32(2.0))
            .unwrap();
        assert!(stores(&func).is_empty());
    }

    #[test]
    fn dynamic_level_index_is_guarded() {
        let ctx = tcs(PrimitiveMode::Quads);
        let mut lowerer = Lowerer::new(&ctx, ShaderStage::TessControl, CalcFactor::default()).unwrap();
        let mut func = Function::new("tcs", ShaderStage::TessControl);
        let index = func.new_local(Type::I32);
        let block = func.entry;
        let mut b = Builder::at_end(&mut func, block);
        let index = b.load_local(index);
        lowerer
            .write_tess_level(&mut b, BuiltIn::TessLevelOuter, Some(index), Operand::f32(1.0))
            .unwrap();
        let stores = stores(&func);
        assert_eq!(stores.len(), 1);
        assert!(stores[0].1.is_some());
    }
}
