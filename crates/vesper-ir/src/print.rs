use std::fmt;

use crate::function::{Block, Function, Module, Terminator};
use crate::instr::{BufferAccess, Instr, InterpOp};

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = self.stage.map(|s| s.short_name()).unwrap_or("-");
        writeln!(f, "define {} @{} [{stage}] {{", if self.is_entry { "entry" } else { "internal" }, self.name)?;
        for block in &self.blocks {
            write_block(f, self, block)?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, func) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{func}")?;
        }
        Ok(())
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, func: &Function, block: &Block) -> fmt::Result {
    writeln!(f, "bb{}:", block.id.0)?;
    for instr in &block.instrs {
        write!(f, "  ")?;
        if let Some(dst) = instr.dst() {
            write!(f, "{dst}: {} = ", func.value_type(dst))?;
        }
        write_instr(f, instr)?;
        writeln!(f)?;
    }
    match &block.term {
        Terminator::Return => writeln!(f, "  ret"),
        Terminator::Branch(target) => writeln!(f, "  br bb{}", target.0),
        Terminator::CondBranch {
            cond,
            if_true,
            if_false,
        } => writeln!(f, "  br {cond}, bb{}, bb{}", if_true.0, if_false.0),
        Terminator::Switch {
            value,
            default,
            cases,
        } => {
            write!(f, "  switch {value}, default bb{}", default.0)?;
            for (case, target) in cases {
                write!(f, ", {case} -> bb{}", target.0)?;
            }
            writeln!(f)
        }
        Terminator::Unreachable => writeln!(f, "  unreachable"),
    }
}

fn write_access(f: &mut fmt::Formatter<'_>, a: &BufferAccess) -> fmt::Result {
    write!(f, "{}", a.desc)?;
    if let Some(vindex) = &a.vindex {
        write!(f, ", vindex={vindex}")?;
    }
    write!(f, ", voffset={}, soffset={}, offset={}", a.voffset, a.soffset, a.offset)?;
    if let Some(format) = a.format {
        write!(f, ", format={}", format.0)?;
    }
    if !a.cache.is_empty() {
        write!(f, ", cache={:?}", a.cache)?;
    }
    Ok(())
}

fn write_instr(f: &mut fmt::Formatter<'_>, instr: &Instr) -> fmt::Result {
    match instr {
        Instr::Binary { op, lhs, rhs, .. } => write!(f, "{} {lhs}, {rhs}", op.mnemonic()),
        Instr::ICmp { pred, lhs, rhs, .. } => write!(f, "icmp {pred:?} {lhs}, {rhs}"),
        Instr::Select {
            cond,
            if_true,
            if_false,
            ..
        } => write!(f, "select {cond}, {if_true}, {if_false}"),
        Instr::Cast { op, value, ty, .. } => write!(f, "{} {value} to {ty}", op.mnemonic()),
        Instr::ExtractElement { vector, index, .. } => {
            write!(f, "extractelement {vector}, {index}")
        }
        Instr::InsertElement {
            vector,
            value,
            index,
            ..
        } => write!(f, "insertelement {vector}, {value}, {index}"),
        Instr::ShuffleVector { lhs, rhs, mask, .. } => {
            write!(f, "shufflevector {lhs}, {rhs}, {mask:?}")
        }
        Instr::ExtractValue {
            aggregate, index, ..
        } => write!(f, "extractvalue {aggregate}, {index}"),
        Instr::InsertValue {
            aggregate,
            value,
            index,
            ..
        } => write!(f, "insertvalue {aggregate}, {value}, {index}"),
        Instr::LoadLocal { local, .. } => write!(f, "load local{}", local.0),
        Instr::StoreLocal { local, value } => write!(f, "store {value}, local{}", local.0),
        Instr::ImportInput { import, .. } => write!(f, "{import}"),
        Instr::ImportOutput { import, .. } => write!(f, "{import}"),
        Instr::ExportOutput(export) => write!(f, "{export}"),
        Instr::LdsLoad { offset, .. } => write!(f, "lds.load [{offset}]"),
        Instr::LdsStore { offset, value } => write!(f, "lds.store [{offset}], {value}"),
        Instr::BufferLoad { access, .. } => {
            write!(f, "buffer.load ")?;
            write_access(f, access)
        }
        Instr::BufferStore {
            value,
            access,
            predicate,
        } => {
            write!(f, "buffer.store {value}, ")?;
            write_access(f, access)?;
            if let Some(p) = predicate {
                write!(f, " if {p}")?;
            }
            Ok(())
        }
        Instr::Exp {
            target,
            enable,
            sources,
            done,
            valid_mask,
        } => write!(
            f,
            "exp target={target}, en={enable:#x}, [{}, {}, {}, {}], done={done}, vm={valid_mask}",
            sources[0], sources[1], sources[2], sources[3]
        ),
        Instr::Interp {
            op,
            channel,
            attr,
            prim_mask,
            ..
        } => {
            match op {
                InterpOp::P1 { i } => write!(f, "interp.p1 {i}")?,
                InterpOp::P2 { p1, j } => write!(f, "interp.p2 {p1}, {j}")?,
                InterpOp::P1F16 { i, high } => write!(f, "interp.p1.f16 {i}, high={high}")?,
                InterpOp::P2F16 { p1, j, high } => {
                    write!(f, "interp.p2.f16 {p1}, {j}, high={high}")?
                }
                InterpOp::Mov { param } => write!(f, "interp.mov {param:?}")?,
            }
            write!(f, ", chan={channel}, attr={attr}, m0={prim_mask}")
        }
        Instr::SendMsg { msg, wave_id } => write!(f, "s_sendmsg {msg:#x}, {wave_id}"),
        Instr::Fence => write!(f, "fence release"),
        Instr::Intrinsic { op, args, .. } => {
            write!(f, "{op:?}(")?;
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{arg}")?;
            }
            write!(f, ")")
        }
        Instr::NggGsOutputExport {
            location,
            component,
            stream,
            value,
        } => write!(
            f,
            "ngg.gs.output.export loc={location}, comp={component}, stream={stream}, {value}"
        ),
        Instr::ReconfigureLocalInvocationId { value, .. } => {
            write!(f, "reconfigure.local.invocation.id {value}")
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::Builder;
    use crate::function::{BlockId, Function};
    use crate::instr::exp_target;
    use crate::stage::ShaderStage;
    use crate::value::{EntryValue, Operand};

    #[test]
    fn prints_blocks_and_exports() {
        let mut func = Function::new("vs_main", ShaderStage::Vertex);
        let mut b = Builder::at_end(&mut func, BlockId(0));
        let x = b.add(Operand::Entry(EntryValue::VertexId), Operand::i32(1));
        b.exp(exp_target::PARAM_0, 0x1, [x, Operand::undef_f32(), Operand::undef_f32(), Operand::undef_f32()], false);

        let text = func.to_string();
        assert!(text.starts_with("define entry @vs_main [vs] {\nbb0:\n"));
        assert!(text.contains("%0: i32 = add @VertexId, i32 1"));
        assert!(text.contains("exp target=32, en=0x1"));
        assert!(text.trim_end().ends_with("ret\n}"));
    }
}
