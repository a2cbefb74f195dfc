//! The patch pass: replaces every I/O marker with concrete LDS, ring, buffer, interpolation and
//! export operations.
//!
//! Stages are visited consumer first (fragment, copy shader, geometry, tessellation evaluation,
//! tessellation control, vertex, compute). A producer's layout can depend on what its consumer
//! ended up using, and the tessellation layout is shared by three stages.
//!
//! Per function the pass:
//! 1. sets up the thread id and GS emit counters at the top of the entry block,
//! 2. lowers markers in place, in block order,
//! 3. flushes deferred exports at each return of an entry point,
//! 4. marks the position export that post-dominates the others as `done`.

mod copy_shader;
mod export;
mod fs;
mod input;
mod output;
mod reconfig;
mod storage;
mod tess;
mod xfb;

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};
use vesper_ir::instr::{exp_target, msg};
use vesper_ir::postdom::{InstrPos, PostDomTree};
use vesper_ir::{
    BlockId, Builder, BuiltIn, EntryValue, Function, InputImport, Instr, LocalId, Module, Operand,
    OutputExport, OutputImport, ShaderStage, Type,
};

use crate::builder::lane_number;
use crate::context::CompilationContext;
use crate::error::IoError;
use crate::layout::{CalcFactor, GsRingFactor};
use crate::location::assign_locations;
use crate::strategy::{select_input, select_output, StorageStrategy};
use crate::usage::FsInterpInfo;

use export::PendingExports;

pub use copy_shader::generate as generate_copy_shader;
pub use reconfig::workgroup_layout;

const STAGE_ORDER: [ShaderStage; 7] = [
    ShaderStage::Fragment,
    ShaderStage::CopyShader,
    ShaderStage::Geometry,
    ShaderStage::TessEval,
    ShaderStage::TessControl,
    ShaderStage::Vertex,
    ShaderStage::Compute,
];

/// Lowers every shader function of `module`.
///
/// Assigns locations first if that has not happened yet, and adds the copy shader of a legacy GS
/// pipeline when the module does not carry one.
pub fn run(module: &mut Module, ctx: &mut CompilationContext) -> Result<(), IoError> {
    if !ctx.locations_assigned() {
        assign_locations(ctx)?;
    }
    if ctx.pipeline.has_geometry()
        && ctx.pipeline.has_stage(ShaderStage::CopyShader)
        && module.entry_point(ShaderStage::CopyShader).is_none()
    {
        let copy = copy_shader::generate(ctx)?;
        module.push(copy);
    }
    let calc = if ctx.pipeline.has_tessellation() {
        ctx.calc_factor()
    } else {
        CalcFactor::default()
    };

    for stage in STAGE_ORDER {
        for func in module.functions.iter_mut().filter(|f| f.stage == Some(stage)) {
            if !func.is_entry && !func.has_io_markers() {
                continue;
            }
            if !ctx.pipeline.has_stage(stage) {
                return Err(IoError::MissingStage(stage));
            }
            if stage == ShaderStage::Compute {
                reconfig::lower(ctx, func)?;
            } else {
                let lowered = Lowerer::new(ctx, stage, calc)?.lower(func)?;
                let in_out = &mut ctx.usage_mut(stage).in_out;
                if let Some(count) = lowered.exp_count {
                    in_out.exp_count = count;
                }
                in_out.fs_interp_info.extend(lowered.fs_interp);
            }
            trace!(function = %func.name, "lowered:\n{func}");
        }
    }
    Ok(())
}

/// What the visit loop does with one instruction.
enum Action {
    Keep,
    Lower,
    /// GS emit message of a stream.
    Emit(u32),
}

/// What lowering one function reports back to the context.
#[derive(Debug, Default)]
struct Lowered {
    /// Parameter exports of an entry point that exports vertex attributes.
    exp_count: Option<u32>,
    /// Interpolation info of every FS input location read.
    fs_interp: BTreeMap<u32, FsInterpInfo>,
}

/// Per-function lowering state.
pub(crate) struct Lowerer<'c> {
    ctx: &'c CompilationContext,
    stage: ShaderStage,
    input: StorageStrategy,
    output: StorageStrategy,
    calc: CalcFactor,
    ring: GsRingFactor,
    thread_id: Option<Operand>,
    emit_counters: [Option<LocalId>; 4],
    pending: PendingExports,
    fs_interp: BTreeMap<u32, FsInterpInfo>,
}

impl<'c> Lowerer<'c> {
    pub(crate) fn new(
        ctx: &'c CompilationContext,
        stage: ShaderStage,
        calc: CalcFactor,
    ) -> Result<Self, IoError> {
        let lowerer = Self {
            ctx,
            stage,
            input: select_input(&ctx.pipeline, stage)?,
            output: select_output(&ctx.pipeline, stage)?,
            calc,
            ring: ctx.gs_ring(),
            thread_id: None,
            emit_counters: [None; 4],
            pending: PendingExports::default(),
            fs_interp: BTreeMap::new(),
        };
        debug!(%stage, input = %lowerer.input, output = %lowerer.output, "storage strategies");
        Ok(lowerer)
    }

    fn lower(mut self, func: &mut Function) -> Result<Lowered, IoError> {
        self.prologue(func);

        for block in 0..func.blocks.len() {
            let id = BlockId(block as u32);
            let mut pos = 0;
            while pos < func.block(id).instrs.len() {
                pos = match self.classify(&func.block(id).instrs[pos]) {
                    Action::Keep => pos + 1,
                    Action::Emit(stream) => self.lower_emit(func, id, pos, stream)?,
                    Action::Lower => self.lower_marker(func, id, pos)?,
                };
            }
        }

        let exp_count = if func.is_entry {
            let count = self.finalize(func)?;
            mark_export_done(func);
            count
        } else {
            None
        };
        Ok(Lowered {
            exp_count,
            fs_interp: self.fs_interp,
        })
    }

    fn classify(&self, instr: &Instr) -> Action {
        match instr {
            // Vertex fetches belong to the vertex-fetch lowering.
            Instr::ImportInput {
                import: InputImport::Vertex { .. },
                ..
            } => Action::Keep,
            Instr::ImportInput { .. } | Instr::ImportOutput { .. } | Instr::ExportOutput(_) => {
                Action::Lower
            }
            Instr::ReconfigureLocalInvocationId { .. } => Action::Keep,
            Instr::SendMsg { msg, .. }
                if self.stage == ShaderStage::Geometry
                    && matches!(self.output, StorageStrategy::GsVsRing { .. }) =>
            {
                msg::emit_stream(*msg).map_or(Action::Keep, Action::Emit)
            }
            _ => Action::Keep,
        }
    }

    /// Thread id and GS emit counters, computed once at the top of the function.
    fn prologue(&mut self, func: &mut Function) {
        let xfb_usage = match self.stage {
            ShaderStage::CopyShader => ShaderStage::Geometry,
            s => s,
        };
        let needs_thread_id = matches!(
            self.output,
            StorageStrategy::EsGsRing { on_chip: true } | StorageStrategy::GsVsRing { on_chip: true }
        ) || self.ctx.usage(xfb_usage).in_out.enable_xfb;

        let entry = func.entry;
        let mut counters = [None; 4];
        if matches!(self.output, StorageStrategy::GsVsRing { .. }) {
            for counter in &mut counters {
                *counter = Some(func.new_local(Type::I32));
            }
        }
        let mut b = Builder::at_start(func, entry);
        if needs_thread_id {
            let wave = self.ctx.pipeline.wave_size(self.stage);
            self.thread_id = Some(lane_number(&mut b, wave));
        }
        for counter in counters.iter().flatten() {
            b.store_local(*counter, Operand::i32(0));
        }
        self.emit_counters = counters;
    }

    fn thread_id(&self) -> Result<Operand, IoError> {
        self.thread_id.ok_or(IoError::NoStrategy {
            stage: self.stage,
            what: "thread id",
        })
    }

    fn emit_counter(&self, stream: u32) -> Result<LocalId, IoError> {
        self.emit_counters
            .get(stream as usize)
            .copied()
            .flatten()
            .ok_or(IoError::NoStrategy {
                stage: self.stage,
                what: "emit counter",
            })
    }

    /// Replaces the marker at `pos`; returns the position after the replacement.
    fn lower_marker(&mut self, func: &mut Function, block: BlockId, pos: usize) -> Result<usize, IoError> {
        let instr = func.block_mut(block).instrs.remove(pos);
        trace!(stage = %self.stage, marker = %MarkerDisplay(&instr), "lowering");
        let mut b = Builder::at(func, block, pos);
        let replaced = match instr {
            Instr::ImportInput { dst, import } => {
                let ty = b.func().value_type(dst);
                Some((dst, self.lower_input(&mut b, ty, import)?))
            }
            Instr::ImportOutput { dst, import } => {
                let ty = b.func().value_type(dst);
                Some((dst, self.lower_output_import(&mut b, ty, import)?))
            }
            Instr::ExportOutput(export) => {
                self.lower_export(&mut b, export)?;
                None
            }
            other => {
                return Err(IoError::UnsupportedMarker {
                    stage: self.stage,
                    marker: format!("{other:?}"),
                })
            }
        };
        let next = b.position();
        if let Some((dst, value)) = replaced {
            func.replace_all_uses(dst, value);
        }
        Ok(next)
    }

    fn lower_input(&mut self, b: &mut Builder<'_>, ty: Type, import: InputImport) -> Result<Operand, IoError> {
        match (self.stage, import) {
            (ShaderStage::Fragment, import) => self.lower_fs_input(b, ty, import),
            (
                _,
                InputImport::Generic {
                    location,
                    loc_offset,
                    elem_idx,
                    vertex_idx,
                    ..
                },
            ) => self.read_generic_input(b, ty, location, loc_offset, elem_idx, vertex_idx),
            (
                _,
                InputImport::BuiltIn {
                    builtin,
                    elem_idx,
                    vertex_idx,
                    ..
                },
            ) => self.read_builtin_input(b, ty, builtin, elem_idx, vertex_idx),
            (stage, import) => Err(IoError::UnsupportedMarker {
                stage,
                marker: import.to_string(),
            }),
        }
    }

    fn lower_output_import(
        &mut self,
        b: &mut Builder<'_>,
        ty: Type,
        import: OutputImport,
    ) -> Result<Operand, IoError> {
        if self.stage != ShaderStage::TessControl {
            return Err(IoError::OutputReadOutsideTcs(self.stage));
        }
        match import {
            OutputImport::Generic {
                location,
                loc_offset,
                elem_idx,
                vertex_idx,
            } => self.read_tcs_output(b, ty, location, loc_offset, elem_idx, vertex_idx),
            OutputImport::BuiltIn {
                builtin,
                elem_idx,
                vertex_idx,
            } => self.read_tcs_builtin_output(b, ty, builtin, elem_idx, vertex_idx),
        }
    }

    fn lower_export(&mut self, b: &mut Builder<'_>, export: OutputExport) -> Result<(), IoError> {
        match export {
            OutputExport::Generic {
                location,
                loc_offset,
                elem_idx,
                vertex_idx,
                stream,
                value,
            } => self.write_generic_output(b, location, loc_offset, elem_idx, vertex_idx, stream, value),
            OutputExport::BuiltIn {
                builtin,
                elem_idx,
                vertex_idx,
                value,
                ..
            } => self.write_builtin_output(b, builtin, elem_idx, vertex_idx, value),
            OutputExport::Xfb {
                buffer,
                offset,
                value,
                ..
            } => self.write_xfb_output(b, buffer, offset, value),
        }
    }

    /// Bumps the stream's emit counter before the emit message, after storing the multiview view
    /// index of the raster stream.
    fn lower_emit(
        &mut self,
        func: &mut Function,
        block: BlockId,
        pos: usize,
        stream: u32,
    ) -> Result<usize, IoError> {
        let counter = self.emit_counter(stream)?;
        let mut b = Builder::at(func, block, pos);
        let ctx = self.ctx;
        let pipeline = &ctx.pipeline;
        let view_index_loc = ctx
            .usage(ShaderStage::Geometry)
            .in_out
            .builtin_output_loc_map
            .get(&BuiltIn::ViewIndex)
            .copied();
        if let (true, true, Some(loc)) = (
            pipeline.input_assembly.multiview,
            stream == ctx.raster_stream(),
            view_index_loc,
        ) {
            let count = b.load_local(counter);
            let place = storage::Place::GsVsWrite { stream, counter: count };
            let view = Operand::Entry(EntryValue::ViewIndex);
            self.write_place(&mut b, &place, Operand::i32(loc), Operand::i32(0), view)?;
        }
        let count = b.load_local(counter);
        let next = b.add(count, Operand::i32(1));
        b.store_local(counter, next);
        // Step over the message itself.
        Ok(b.position() + 1)
    }

    /// Flushes deferred exports at the returns that need them.
    fn finalize(&mut self, func: &mut Function) -> Result<Option<u32>, IoError> {
        let blocks = match self.stage {
            ShaderStage::CopyShader => copy_shader::raster_returns(func, self.ctx),
            _ => func.return_blocks(),
        };
        let mut exp_count = None;
        for block in blocks {
            let mut b = Builder::at_end(func, block);
            match self.output {
                StorageStrategy::Export => {
                    exp_count = Some(self.finalize_vertex_exports(&mut b)?);
                }
                StorageStrategy::ColorExport => self.finalize_color_exports(&mut b),
                StorageStrategy::GsVsRing { .. } => {
                    if !self.ctx.pipeline.gs_on_chip && self.ctx.pipeline.gfx_ip.major >= 10 {
                        b.fence();
                    }
                    b.send_msg(msg::GS_DONE, Operand::Entry(EntryValue::GsWaveId));
                }
                _ => {}
            }
        }
        Ok(exp_count)
    }
}

/// Sets `done` on the position exports no other position export post-dominates. With a single
/// export chain that is the last one; when the exports sit in disjoint branches, each branch's
/// last export is marked.
fn mark_export_done(func: &mut Function) {
    let exports: Vec<InstrPos> = func
        .instrs()
        .filter(|(_, _, instr)| {
            matches!(instr, Instr::Exp { target, .. } if exp_target::is_position(*target))
        })
        .map(|(block, index, _)| InstrPos { block, index })
        .collect();
    if exports.is_empty() {
        return;
    }
    let tree = PostDomTree::compute(func);
    let last: BTreeSet<(BlockId, usize)> = exports
        .iter()
        .filter(|a| {
            !exports
                .iter()
                .any(|b| b != *a && tree.dominates_instr(*b, **a))
        })
        .map(|p| (p.block, p.index))
        .collect();
    for (block, index) in last {
        if let Some(Instr::Exp { done, .. }) = func.block_mut(block).instrs.get_mut(index) {
            *done = true;
        }
    }
}

/// Terse marker text for trace logs.
struct MarkerDisplay<'a>(&'a Instr);

impl std::fmt::Display for MarkerDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Instr::ImportInput { import, .. } => write!(f, "{import}"),
            Instr::ImportOutput { import, .. } => write!(f, "{import}"),
            Instr::ExportOutput(export) => write!(f, "{export}"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[cfg(test)]
mod tests;
