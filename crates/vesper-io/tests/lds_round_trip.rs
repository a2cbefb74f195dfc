//! What a vertex shader writes for the tessellation control shader comes back bit-exact, for
//! every element width.

use pretty_assertions::assert_eq;
use vesper_io::{CompilationContext, InOutInfo, IoBuilder, PipelineState, StageMask};
use vesper_ir::interp::{Machine, Value};
use vesper_ir::{
    BufferAccess, CachePolicy, Descriptor, EntryValue, Function, Module, Operand, ScalarType,
    ShaderStage, Type,
};

const OUT: Descriptor = Descriptor::StreamOutBuffer(0);

/// Bit patterns chosen so that every byte of a dword matters.
fn pattern(elem: ScalarType, lane: u64) -> u64 {
    (0x0123_4567_89AB_CDEFu64.rotate_left(8 * lane as u32) ^ lane) & elem.mask()
}

/// VS writes a constant of `elem x lanes` to `location`; TCS reads it back for `vertex` and
/// stores it raw. Returns the stored bytes and the expected ones.
fn round_trip(elem: ScalarType, lanes: u32, location: u32, vertex: u32) -> (Vec<u8>, Vec<u8>) {
    let pipeline = PipelineState {
        stages: StageMask::VERTEX | StageMask::TESS_CONTROL | StageMask::TESS_EVAL,
        ..PipelineState::default()
    };
    let mut ctx = CompilationContext::new(pipeline);
    let ty = Type::scalar_or_vec(elem, lanes);
    let loc_count = ty.bit_size().div_ceil(128).max(1);
    let bits: Vec<u64> = (0..u64::from(lanes)).map(|l| pattern(elem, l)).collect();

    let mut vs = Function::new("vs", ShaderStage::Vertex);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut vs).unwrap();
        let consts: Vec<Operand> = bits.iter().map(|b| Operand::int(elem, *b)).collect();
        let value = io.builder().build_vector(elem, &consts);
        io.write_generic_output(value, location, Operand::i32(0), Operand::i32(0), loc_count, InOutInfo::new(), None)
            .unwrap();
    }

    let mut tcs = Function::new("tcs", ShaderStage::TessControl);
    {
        let mut io = IoBuilder::new(&mut ctx, &mut tcs).unwrap();
        let value = io
            .read_generic_input(
                ty,
                location,
                Operand::i32(0),
                Operand::i32(0),
                loc_count,
                InOutInfo::new(),
                Some(Operand::i32(vertex)),
            )
            .unwrap();
        let access = BufferAccess {
            desc: Operand::Entry(EntryValue::Descriptor(OUT)),
            vindex: None,
            voffset: Operand::i32(0),
            soffset: Operand::i32(0),
            offset: 0,
            format: None,
            cache: CachePolicy::empty(),
        };
        io.builder().buffer_store(value, access, None);
    }

    let mut module = Module::new();
    module.push(vs);
    module.push(tcs);
    vesper_io::lower(&mut module, &mut ctx).unwrap();
    assert!(module.functions.iter().all(|f| !f.has_io_markers()));

    let mut machine = Machine::with_lds(16 * 1024);
    machine
        .set_entry(EntryValue::RelVertexId, Value::i32(vertex))
        .set_entry(EntryValue::TcsRelPatchId, Value::i32(0))
        .bind_buffer(OUT, 64, 0);
    machine
        .run(module.entry_point(ShaderStage::Vertex).unwrap())
        .unwrap();
    machine
        .run(module.entry_point(ShaderStage::TessControl).unwrap())
        .unwrap();

    let expected = Value::vector(elem, &bits).to_bytes();
    let stored = machine.buffers[&OUT][..expected.len()].to_vec();
    (stored, expected)
}

#[test]
fn scalars_of_every_width() {
    for elem in [
        ScalarType::I8,
        ScalarType::I16,
        ScalarType::F16,
        ScalarType::I32,
        ScalarType::F32,
        ScalarType::I64,
        ScalarType::F64,
    ] {
        let (stored, expected) = round_trip(elem, 1, 0, 0);
        assert_eq!(stored, expected, "{elem:?}");
    }
}

#[test]
fn vectors_up_to_four_elements() {
    for (elem, lanes) in [
        (ScalarType::I8, 2),
        (ScalarType::F16, 3),
        (ScalarType::F16, 4),
        (ScalarType::I32, 3),
        (ScalarType::F32, 4),
        (ScalarType::F64, 2),
        (ScalarType::I64, 3),
        (ScalarType::F64, 4),
    ] {
        let (stored, expected) = round_trip(elem, lanes, 1, 2);
        assert_eq!(stored, expected, "{elem:?} x {lanes}");
    }
}

#[test]
fn write_and_read_resolve_to_the_same_dword() {
    // Relative vertex 1 of the VS is vertex 1 of patch 0 in the TCS.
    let (stored, expected) = round_trip(ScalarType::I32, 1, 3, 1);
    assert_eq!(stored, expected);
}
