//! Whole-pipeline scenarios: markers built through [`IoBuilder`], lowered by [`run`], and executed
//! on the reference interpreter.

use pretty_assertions::assert_eq;
use vesper_ir::instr::{exp_target, msg, CmpPred};
use vesper_ir::interp::{Export, Machine, Value};
use vesper_ir::{
    Descriptor, EntryValue, Function, IjLocation, InterpLoc, InterpMode, Module, Operand,
    ScalarType, ShaderStage, Terminator, Type,
};

use super::*;
use crate::builder::{InOutInfo, IoBuilder};
use crate::pipeline::{PipelineState, PrimitiveMode, StageMask};

fn context(stages: StageMask) -> CompilationContext {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
    CompilationContext::new(PipelineState {
        stages,
        ..PipelineState::default()
    })
}

fn vec4(b: &mut Builder<'_>, values: [f32; 4]) -> Operand {
    b.build_vector(ScalarType::F32, &values.map(Operand::f32))
}

fn bits(v: f32) -> Option<u64> {
    Some(u64::from(v.to_bits()))
}

fn export(exports: &[Export], target: u8) -> &Export {
    exports
        .iter()
        .find(|e| e.target == target)
        .unwrap_or_else(|| panic!("no export to target {target} in {exports:?}"))
}

fn entry_of(module: &Module, stage: ShaderStage) -> &Function {
    module.entry_point(stage).unwrap()
}

#[test]
fn vertex_attribute_reaches_the_fragment_shader() {
    let mut ctx = context(StageMask::VERTEX | StageMask::FRAGMENT);

    let mut vs = Function::new("vs", ShaderStage::Vertex);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut vs).unwrap();
        let color = vec4(io.builder(), [0.25, 0.5, 0.75, 1.0]);
        io.write_generic_output(color, 0, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), None)
            .unwrap();
        let position = vec4(io.builder(), [1.0, 2.0, 3.0, 4.0]);
        io.write_builtin_output(position, BuiltIn::Position, InOutInfo::new(), None, None)
            .unwrap();
    }

    let mut fs = Function::new("fs", ShaderStage::Fragment);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut fs).unwrap();
        let ty = Type::vec(ScalarType::F32, 4);
        let color = io
            .read_generic_input(ty, 0, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), None)
            .unwrap();
        io.write_generic_output(color, 0, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), None)
            .unwrap();
    }

    let mut module = Module::new();
    module.push(vs);
    module.push(fs);
    run(&mut module, &mut ctx).unwrap();
    assert!(module.functions.iter().all(|f| !f.has_io_markers()));
    assert_eq!(ctx.usage(ShaderStage::Vertex).in_out.exp_count, 1);

    let mut vs_machine = Machine::new();
    vs_machine.run(entry_of(&module, ShaderStage::Vertex)).unwrap();
    let pos = export(&vs_machine.exports, exp_target::POS_0);
    assert!(pos.done);
    assert_eq!(pos.sources, [bits(1.0), bits(2.0), bits(3.0), bits(4.0)]);
    let param = export(&vs_machine.exports, exp_target::PARAM_0);
    assert_eq!(param.enable, 0xF);
    assert_eq!(param.sources, [bits(0.25), bits(0.5), bits(0.75), bits(1.0)]);

    // With I = J = 0 interpolation yields P0, the value of the provoking vertex.
    let mut fs_machine = Machine::new();
    fs_machine
        .set_entry(EntryValue::PrimMask, Value::i32(0))
        .set_entry(EntryValue::PerspInterp(IjLocation::Center), Value::f32s(&[0.0, 0.0]));
    for (channel, source) in param.sources.iter().enumerate() {
        let p0 = source.unwrap() as u32;
        fs_machine.attributes.insert((0, channel as u32), [p0, 0, 0]);
    }
    fs_machine.run(entry_of(&module, ShaderStage::Fragment)).unwrap();
    let mrt = export(&fs_machine.exports, exp_target::MRT_0);
    assert!(mrt.done);
    assert_eq!(mrt.sources, param.sources);

    let interp = &ctx.usage(ShaderStage::Fragment).in_out.fs_interp_info;
    assert_eq!(interp.len(), 1);
    assert!(!interp[&0].flat);
}

#[test]
fn flat_fragment_input_reads_the_provoking_vertex() {
    let mut ctx = context(StageMask::VERTEX | StageMask::FRAGMENT);
    let mut fs = Function::new("fs", ShaderStage::Fragment);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut fs).unwrap();
        let info = InOutInfo::new().with_interp(InterpMode::Flat, InterpLoc::Center);
        let value = io
            .read_generic_input(Type::I32, 2, Operand::i32(0), Operand::i32(0), 1, info, None)
            .unwrap();
        let wide = io.builder().build_vector(ScalarType::I32, &[value, value, value, value]);
        io.write_generic_output(wide, 0, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), None)
            .unwrap();
    }
    let mut module = Module::new();
    module.push(fs);
    run(&mut module, &mut ctx).unwrap();

    let mut machine = Machine::new();
    machine.set_entry(EntryValue::PrimMask, Value::i32(0));
    // Location 2 is the only input, so it lands in attribute 0.
    machine.attributes.insert((0, 0), [77, 1, 2]);
    machine.run(entry_of(&module, ShaderStage::Fragment)).unwrap();
    assert_eq!(export(&machine.exports, exp_target::MRT_0).sources[0], Some(77));

    let interp = &ctx.usage(ShaderStage::Fragment).in_out.fs_interp_info;
    assert!(interp[&0].flat);
}

#[test]
fn tessellation_control_output_round_trips_through_lds() {
    let mut ctx = context(StageMask::VERTEX | StageMask::TESS_CONTROL | StageMask::TESS_EVAL);
    let ty = Type::vec(ScalarType::F32, 4);

    let mut tcs = Function::new("tcs", ShaderStage::TessControl);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut tcs).unwrap();
        let vertex = Some(Operand::Entry(EntryValue::TcsInvocationId));
        let value = vec4(io.builder(), [5.0, 6.0, 7.0, 8.0]);
        io.write_generic_output(value, 0, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), vertex)
            .unwrap();
    }

    let mut tes = Function::new("tes", ShaderStage::TessEval);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut tes).unwrap();
        let value = io
            .read_generic_input(ty, 0, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), Some(Operand::i32(1)))
            .unwrap();
        io.write_generic_output(value, 0, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), None)
            .unwrap();
    }

    let mut module = Module::new();
    module.push(tcs);
    module.push(tes);
    run(&mut module, &mut ctx).unwrap();

    let mut machine = Machine::with_lds(16 * 1024);
    machine
        .set_entry(EntryValue::TcsRelPatchId, Value::i32(0))
        .set_entry(EntryValue::TcsInvocationId, Value::i32(1))
        .set_entry(EntryValue::TesRelPatchId, Value::i32(0));
    machine.run(entry_of(&module, ShaderStage::TessControl)).unwrap();
    machine.run(entry_of(&module, ShaderStage::TessEval)).unwrap();

    let param = export(&machine.exports, exp_target::PARAM_0);
    assert_eq!(param.sources, [bits(5.0), bits(6.0), bits(7.0), bits(8.0)]);
}

fn tess_level_pipeline(mode: PrimitiveMode) -> (CompilationContext, Module) {
    let mut ctx = context(StageMask::VERTEX | StageMask::TESS_CONTROL | StageMask::TESS_EVAL);
    ctx.pipeline.tessellation.primitive_mode = mode;
    let mut tcs = Function::new("tcs", ShaderStage::TessControl);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut tcs).unwrap();
        let b = io.builder();
        let mut levels = Operand::Undef(Type::array(ScalarType::F32, 4));
        for (i, level) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            levels = b.insert_value(levels, Operand::f32(level), i as u32);
        }
        io.write_builtin_output(levels, BuiltIn::TessLevelOuter, InOutInfo::new(), None, None)
            .unwrap();
    }
    let mut module = Module::new();
    module.push(tcs);
    run(&mut module, &mut ctx).unwrap();
    (ctx, module)
}

fn run_tcs_with_tf_buffer(module: &Module) -> Machine {
    let mut machine = Machine::with_lds(16 * 1024);
    machine
        .set_entry(EntryValue::TcsRelPatchId, Value::i32(0))
        .set_entry(EntryValue::TfBufferBase, Value::i32(0))
        .bind_buffer(Descriptor::TessFactorBuffer, 64, 0);
    machine.run(entry_of(module, ShaderStage::TessControl)).unwrap();
    machine
}

fn tf_dwords(machine: &Machine, count: usize) -> Vec<f32> {
    (0..count)
        .map(|i| f32::from_bits(machine.read_buffer_u32(Descriptor::TessFactorBuffer, i * 4).unwrap()))
        .collect()
}

#[test]
fn quad_outer_levels_are_stored_to_the_tf_buffer() {
    let (_, module) = tess_level_pipeline(PrimitiveMode::Quads);
    let machine = run_tcs_with_tf_buffer(&module);
    assert_eq!(tf_dwords(&machine, 5), vec![1.0, 2.0, 3.0, 4.0, 0.0]);
}

#[test]
fn isoline_outer_levels_are_swapped() {
    let (_, module) = tess_level_pipeline(PrimitiveMode::Isolines);
    let machine = run_tcs_with_tf_buffer(&module);
    assert_eq!(tf_dwords(&machine, 3), vec![2.0, 1.0, 0.0]);
}

fn xfb_vertex_shader() -> (CompilationContext, Module) {
    let mut ctx = context(StageMask::VERTEX);
    let mut vs = Function::new("vs", ShaderStage::Vertex);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut vs).unwrap();
        let value = io
            .builder()
            .build_vector(ScalarType::F32, &[Operand::f32(3.0), Operand::f32(4.0)]);
        io.write_xfb_output(value, false, 0, 0, 8, Operand::i32(0), InOutInfo::new())
            .unwrap();
    }
    let mut module = Module::new();
    module.push(vs);
    run(&mut module, &mut ctx).unwrap();
    (ctx, module)
}

fn run_xfb(module: &Module, vertex_count: u32) -> Machine {
    let mut machine = Machine::new();
    machine
        .set_entry(EntryValue::StreamOutWriteIndex, Value::i32(3))
        .set_entry(EntryValue::StreamOutOffset(0), Value::i32(0))
        .set_entry(EntryValue::StreamOutInfo, Value::i32(vertex_count << 16))
        .bind_buffer(Descriptor::StreamOutBuffer(0), 64, 8);
    machine.run(entry_of(module, ShaderStage::Vertex)).unwrap();
    machine
}

#[test]
fn stream_out_store_lands_at_the_write_index() {
    let (_, module) = xfb_vertex_shader();
    let machine = run_xfb(&module, 1);
    let read = |byte| machine.read_buffer_u32(Descriptor::StreamOutBuffer(0), byte);
    assert_eq!(read(24), Some(3.0f32.to_bits()));
    assert_eq!(read(28), Some(4.0f32.to_bits()));
}

#[test]
fn stream_out_store_is_skipped_past_the_vertex_count() {
    let (_, module) = xfb_vertex_shader();
    let machine = run_xfb(&module, 0);
    let buffer = &machine.buffers[&Descriptor::StreamOutBuffer(0)];
    assert!(buffer.iter().all(|byte| *byte == 0));
}

#[test]
fn geometry_emits_advance_the_ring_slot_and_the_copy_shader_reads_them_back() {
    let mut ctx = context(
        StageMask::VERTEX | StageMask::GEOMETRY | StageMask::FRAGMENT | StageMask::COPY_SHADER,
    );

    let mut gs = Function::new("gs", ShaderStage::Geometry);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut gs).unwrap();
        for value in [7.0, 9.0] {
            io.write_generic_output(
                Operand::f32(value),
                0,
                Operand::i32(0),
                Operand::i32(0),
                1,
                InOutInfo::new().with_stream(0),
                None,
            )
            .unwrap();
            io.builder()
                .send_msg(msg::GS_EMIT_STREAM0, Operand::Entry(EntryValue::GsWaveId));
        }
    }
    let mut fs = Function::new("fs", ShaderStage::Fragment);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut fs).unwrap();
        io.read_generic_input(Type::F32, 0, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), None)
            .unwrap();
    }

    let mut module = Module::new();
    module.push(gs);
    module.push(fs);
    run(&mut module, &mut ctx).unwrap();
    assert!(module.entry_point(ShaderStage::CopyShader).is_some());

    let mut gs_machine = Machine::new();
    gs_machine
        .set_entry(EntryValue::GsVsOffset, Value::i32(0))
        .set_entry(EntryValue::GsWaveId, Value::i32(0))
        .bind_buffer(Descriptor::GsVsRing(0), 256, 0);
    gs_machine.run(entry_of(&module, ShaderStage::Geometry)).unwrap();
    assert_eq!(
        gs_machine.messages,
        vec![msg::GS_EMIT_STREAM0, msg::GS_EMIT_STREAM0, msg::GS_DONE]
    );
    let ring = |byte| gs_machine.read_buffer_u32(Descriptor::GsVsRing(0), byte);
    assert_eq!(ring(0), Some(7.0f32.to_bits()));
    assert_eq!(ring(4), Some(9.0f32.to_bits()));

    // The copy shader replays the second emitted vertex.
    let mut copy_machine = Machine::new();
    copy_machine.set_entry(EntryValue::CopyVertexOffset, Value::i32(1));
    copy_machine
        .buffers
        .insert(Descriptor::GsVsRing(0), gs_machine.buffers[&Descriptor::GsVsRing(0)].clone());
    copy_machine.run(entry_of(&module, ShaderStage::CopyShader)).unwrap();
    let param = export(&copy_machine.exports, exp_target::PARAM_0);
    assert_eq!(param.sources[0], bits(9.0));
    assert!(export(&copy_machine.exports, exp_target::POS_0).done);
}

#[test]
fn position_exports_in_both_arms_of_a_branch_are_done() {
    let mut ctx = context(StageMask::VERTEX | StageMask::FRAGMENT);
    let mut vs = Function::new("vs", ShaderStage::Vertex);
    let left = vs.add_block();
    let right = vs.add_block();
    let join = vs.add_block();
    let entry = vs.entry;
    let cond = {
        let mut io = IoBuilder::new(&mut ctx, &mut vs).unwrap();
        let cond = io
            .builder()
            .icmp(CmpPred::Ne, Operand::Entry(EntryValue::VertexId), Operand::i32(0));
        for (block, x) in [(left, 1.0), (right, -1.0)] {
            io.builder().set_position(block, 0);
            let position = vec4(io.builder(), [x, 0.0, 0.0, 1.0]);
            io.write_builtin_output(position, BuiltIn::Position, InOutInfo::new(), None, None)
                .unwrap();
        }
        cond
    };
    vs.set_terminator(
        entry,
        Terminator::CondBranch {
            cond,
            if_true: left,
            if_false: right,
        },
    );
    vs.set_terminator(left, Terminator::Branch(join));
    vs.set_terminator(right, Terminator::Branch(join));

    let mut module = Module::new();
    module.push(vs);
    run(&mut module, &mut ctx).unwrap();

    let vs = entry_of(&module, ShaderStage::Vertex);
    let done: Vec<(BlockId, bool)> = vs
        .instrs()
        .filter_map(|(block, _, instr)| match instr {
            Instr::Exp { target, done, .. } if exp_target::is_position(*target) => Some((block, *done)),
            _ => None,
        })
        .collect();
    assert_eq!(done, vec![(left, true), (right, true)]);

    let mut machine = Machine::new();
    machine.set_entry(EntryValue::VertexId, Value::i32(0));
    machine.run(vs).unwrap();
    let pos = export(&machine.exports, exp_target::POS_0);
    assert!(pos.done);
    assert_eq!(pos.sources[0], bits(-1.0));
}

#[test]
fn only_the_last_of_two_position_writes_is_done() {
    let mut ctx = context(StageMask::VERTEX | StageMask::FRAGMENT);
    let mut vs = Function::new("vs", ShaderStage::Vertex);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut vs).unwrap();
        for x in [0.0, 1.0] {
            let position = vec4(io.builder(), [x, 0.0, 0.0, 1.0]);
            io.write_builtin_output(position, BuiltIn::Position, InOutInfo::new(), None, None)
                .unwrap();
        }
    }
    let mut module = Module::new();
    module.push(vs);
    run(&mut module, &mut ctx).unwrap();

    let done: Vec<bool> = entry_of(&module, ShaderStage::Vertex)
        .instrs()
        .filter_map(|(_, _, instr)| match instr {
            Instr::Exp { target, done, .. } if *target == exp_target::POS_0 => Some(*done),
            _ => None,
        })
        .collect();
    assert_eq!(done, vec![false, true]);
}

#[test]
fn shader_of_a_missing_stage_is_rejected() {
    let mut ctx = context(StageMask::VERTEX | StageMask::FRAGMENT);
    let mut module = Module::new();
    module.push(Function::new("gs", ShaderStage::Geometry));
    assert_eq!(
        run(&mut module, &mut ctx),
        Err(IoError::MissingStage(ShaderStage::Geometry))
    );
}

#[test]
fn reconfigured_local_id_is_lowered_in_compute() {
    let mut ctx = context(StageMask::COMPUTE);
    ctx.pipeline.compute.workgroup_size = [4, 2, 1];
    ctx.pipeline.compute.layout = crate::pipeline::WorkgroupLayout::Quads;
    ctx.pipeline.options.reconfig_workgroup_layout = true;
    let mut cs = Function::new("cs", ShaderStage::Compute);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut cs).unwrap();
        io.read_builtin_input(BuiltIn::LocalInvocationId, InOutInfo::new(), None, None)
            .unwrap();
    }
    assert!(cs
        .instrs()
        .any(|(_, _, i)| matches!(i, Instr::ReconfigureLocalInvocationId { .. })));
    let mut module = Module::new();
    module.push(cs);
    run(&mut module, &mut ctx).unwrap();
    assert!(!entry_of(&module, ShaderStage::Compute)
        .instrs()
        .any(|(_, _, i)| matches!(i, Instr::ReconfigureLocalInvocationId { .. })));
}

#[test]
fn tcs_output_array_indexed_at_run_time_reaches_the_tes() {
    let mut ctx = context(StageMask::VERTEX | StageMask::TESS_CONTROL | StageMask::TESS_EVAL);
    let invocation = Operand::Entry(EntryValue::TcsInvocationId);

    // arr[gl_InvocationID] = 42.0 for an `float arr[3]` at location 0.
    let mut tcs = Function::new("tcs", ShaderStage::TessControl);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut tcs).unwrap();
        io.write_generic_output(Operand::f32(42.0), 0, invocation, Operand::i32(0), 3, InOutInfo::new(), Some(invocation))
            .unwrap();
    }

    // The TES only reads arr[0] and arr[2], of control point 2.
    let mut tes = Function::new("tes", ShaderStage::TessEval);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut tes).unwrap();
        let vertex = Some(Operand::i32(2));
        let first = io
            .read_generic_input(Type::F32, 0, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), vertex)
            .unwrap();
        let last = io
            .read_generic_input(Type::F32, 2, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), vertex)
            .unwrap();
        let value = io.builder().build_vector(ScalarType::F32, &[last, first]);
        io.write_generic_output(value, 0, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), None)
            .unwrap();
    }

    let mut module = Module::new();
    module.push(tcs);
    module.push(tes);
    run(&mut module, &mut ctx).unwrap();

    let mut machine = Machine::with_lds(16 * 1024);
    machine
        .set_entry(EntryValue::TcsRelPatchId, Value::i32(0))
        .set_entry(EntryValue::TcsInvocationId, Value::i32(2))
        .set_entry(EntryValue::TesRelPatchId, Value::i32(0));
    machine.run(entry_of(&module, ShaderStage::TessControl)).unwrap();
    machine.run(entry_of(&module, ShaderStage::TessEval)).unwrap();

    let param = export(&machine.exports, exp_target::PARAM_0);
    assert_eq!(param.sources[0], bits(42.0));
    assert_eq!(param.sources[1], bits(0.0));
}

#[test]
fn es_outputs_reach_the_geometry_shader_through_lds() {
    let mut ctx = context(
        StageMask::VERTEX | StageMask::GEOMETRY | StageMask::FRAGMENT | StageMask::COPY_SHADER,
    );
    assert!(ctx.pipeline.es_gs_on_chip());

    let mut vs = Function::new("vs", ShaderStage::Vertex);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut vs).unwrap();
        let value = vec4(io.builder(), [0.5, 1.5, 2.5, 3.5]);
        io.write_generic_output(value, 3, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), None)
            .unwrap();
    }

    let mut gs = Function::new("gs", ShaderStage::Geometry);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut gs).unwrap();
        let ty = Type::vec(ScalarType::F32, 4);
        let value = io
            .read_generic_input(ty, 3, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), Some(Operand::i32(0)))
            .unwrap();
        io.write_generic_output(value, 0, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new().with_stream(0), None)
            .unwrap();
        io.builder()
            .send_msg(msg::GS_EMIT_STREAM0, Operand::Entry(EntryValue::GsWaveId));
    }
    let mut fs = Function::new("fs", ShaderStage::Fragment);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut fs).unwrap();
        io.read_generic_input(Type::vec(ScalarType::F32, 4), 0, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), None)
            .unwrap();
    }

    let mut module = Module::new();
    module.push(vs);
    module.push(gs);
    module.push(fs);
    run(&mut module, &mut ctx).unwrap();
    assert!(module.functions.iter().all(|f| !f.has_io_markers()));

    // Lane 0 of the ES wave is vertex 0 of the GS primitive.
    let mut machine = Machine::with_lds(16 * 1024);
    machine
        .set_entry(EntryValue::EsGsOffset, Value::i32(0))
        .set_entry(EntryValue::EsGsVertexOffset(0), Value::i32(0))
        .set_entry(EntryValue::GsVsOffset, Value::i32(0))
        .set_entry(EntryValue::GsWaveId, Value::i32(0))
        .bind_buffer(Descriptor::GsVsRing(0), 1024, 0);
    machine.run(entry_of(&module, ShaderStage::Vertex)).unwrap();
    machine.run(entry_of(&module, ShaderStage::Geometry)).unwrap();

    // Off chip, each channel is a row of `output_vertices` slots.
    let row = ctx.pipeline.geometry.output_vertices as usize;
    let ring: Vec<Option<u64>> = (0..4)
        .map(|c| {
            machine
                .read_buffer_u32(Descriptor::GsVsRing(0), c * row * 4)
                .map(u64::from)
        })
        .collect();
    assert_eq!(ring, vec![bits(0.5), bits(1.5), bits(2.5), bits(3.5)]);
}

#[test]
fn ngg_geometry_outputs_are_exported_per_dword() {
    let mut ctx = context(StageMask::VERTEX | StageMask::GEOMETRY | StageMask::FRAGMENT);
    ctx.pipeline.ngg = true;
    ctx.pipeline.gfx_ip = crate::pipeline::GfxIp::new(10, 3);

    let mut gs = Function::new("gs", ShaderStage::Geometry);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut gs).unwrap();
        let info = InOutInfo::new().with_stream(1);
        io.write_generic_output(Operand::f32(7.0), 0, Operand::i32(0), Operand::i32(0), 1, info, None)
            .unwrap();
        let position = vec4(io.builder(), [1.0, 2.0, 3.0, 4.0]);
        io.write_builtin_output(position, BuiltIn::Position, info, None, None)
            .unwrap();
    }
    let mut fs = Function::new("fs", ShaderStage::Fragment);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut fs).unwrap();
        io.read_generic_input(Type::F32, 0, Operand::i32(0), Operand::i32(0), 1, InOutInfo::new(), None)
            .unwrap();
    }

    let mut module = Module::new();
    module.push(gs);
    module.push(fs);
    run(&mut module, &mut ctx).unwrap();
    assert!(module.entry_point(ShaderStage::CopyShader).is_none());
    assert_eq!(ctx.raster_stream(), 1);
    assert_eq!(ctx.pipeline.geometry.raster_stream, 0);

    let io = &ctx.usage(ShaderStage::Geometry).in_out;
    let generic = io
        .output_loc_map
        .get(&crate::location::LocationInfo::new(0).with_stream(1))
        .map(|l| l.location)
        .unwrap();
    let position = io.builtin_output_loc_map[&BuiltIn::Position];

    let mut machine = Machine::new();
    machine.set_entry(EntryValue::GsWaveId, Value::i32(0));
    machine.run(entry_of(&module, ShaderStage::Geometry)).unwrap();
    let outputs: Vec<(u32, u32, u32, Option<u64>)> = machine
        .ngg_outputs
        .iter()
        .map(|o| (o.location, o.component, o.stream, Some(u64::from(o.value.as_u32()))))
        .collect();
    assert_eq!(
        outputs,
        vec![
            (generic, 0, 1, bits(7.0)),
            (position, 0, 1, bits(1.0)),
            (position, 1, 1, bits(2.0)),
            (position, 2, 1, bits(3.0)),
            (position, 3, 1, bits(4.0)),
        ]
    );
}
