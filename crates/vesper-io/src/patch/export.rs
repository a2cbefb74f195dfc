//! Hardware exports: parameter and position exports of the last vertex-processing stage, and the
//! color/depth exports of the fragment shader.
//!
//! Values written during the shader are collected in [`PendingExports`] and turned into `exp`
//! instructions at each return of the entry point, when the full set of written channels is
//! known. Only the position built-in is exported where it is written.

use std::collections::BTreeMap;

use tracing::trace;
use vesper_ir::instr::exp_target;
use vesper_ir::{BuiltIn, Builder, EntryValue, Instr, Operand, ScalarType, ShaderStage, Type};

use super::Lowerer;
use crate::error::IoError;
use crate::usage::{BasicType, UsageFlags};

/// One 32-bit channel of a parameter export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum Channel {
    /// Any 32-bit value.
    Full(Operand),
    /// Two packed 16-bit values, each an `i16`.
    Halves {
        lo: Option<Operand>,
        hi: Option<Operand>,
    },
}

/// Output values waiting for the export at the end of the shader.
#[derive(Debug, Clone, Default)]
pub(super) struct PendingExports {
    attribs: BTreeMap<u32, [Option<Channel>; 4]>,
    pub point_size: Option<Operand>,
    pub layer: Option<Operand>,
    pub viewport: Option<Operand>,
    pub shading_rate: Option<Operand>,
    pub clip: BTreeMap<u32, Operand>,
    pub cull: BTreeMap<u32, Operand>,
    /// Copy shader only; other stages read the hardware value at export time.
    pub primitive_id: Option<Operand>,
    pub view_index: Option<Operand>,
    pub mrt: BTreeMap<u32, [Option<Operand>; 4]>,
    pub depth: Option<Operand>,
    pub stencil: Option<Operand>,
    pub sample_mask: Option<Operand>,
}

impl PendingExports {
    fn slot(&mut self, location: u32, channel: u32) -> &mut Option<Channel> {
        let chans = self.attribs.entry(location).or_default();
        &mut chans[(channel % 4) as usize]
    }

    /// Records a full 32-bit channel. Undefined values are ignored; a later write replaces an
    /// earlier one.
    pub fn set_full(&mut self, location: u32, channel: u32, value: Operand) -> Result<(), IoError> {
        if value.is_undef() {
            return Ok(());
        }
        let slot = self.slot(location, channel);
        if let Some(Channel::Halves { .. }) = slot {
            return Err(IoError::OverlappingExport { location, channel });
        }
        *slot = Some(Channel::Full(value));
        Ok(())
    }

    /// Records one 16-bit half of a channel.
    pub fn set_half(
        &mut self,
        location: u32,
        channel: u32,
        high: bool,
        value: Operand,
    ) -> Result<(), IoError> {
        if value.is_undef() {
            return Ok(());
        }
        let slot = self.slot(location, channel);
        match slot {
            Some(Channel::Full(_)) => Err(IoError::OverlappingExport { location, channel }),
            Some(Channel::Halves { lo, hi }) => {
                *(if high { hi } else { lo }) = Some(value);
                Ok(())
            }
            None => {
                let (lo, hi) = if high { (None, Some(value)) } else { (Some(value), None) };
                *slot = Some(Channel::Halves { lo, hi });
                Ok(())
            }
        }
    }

    pub fn attribs(&self) -> &BTreeMap<u32, [Option<Channel>; 4]> {
        &self.attribs
    }
}

/// An `exp` source: any 32-bit value reinterpreted as `f32`.
pub(super) fn export_source(b: &mut Builder<'_>, value: Operand) -> Operand {
    let ty = b.ty(&value);
    match value {
        Operand::Undef(_) => Operand::undef_f32(),
        _ if ty == Type::F32 => value,
        _ if ty.bit_size() == 32 && ty != Type::I32 => {
            let int = b.bitcast(value, Type::I32);
            b.bitcast(int, Type::F32)
        }
        _ => b.bitcast(value, Type::F32),
    }
}

fn channel_source(b: &mut Builder<'_>, channel: Option<Channel>) -> Operand {
    match channel {
        None => Operand::undef_f32(),
        Some(Channel::Full(value)) => export_source(b, value),
        Some(Channel::Halves { lo, hi }) => {
            let lo = lo.map_or(Operand::i32(0), |v| b.zext(v, Type::I32));
            let hi = match hi {
                Some(v) => {
                    let wide = b.zext(v, Type::I32);
                    b.shl(wide, Operand::i32(16))
                }
                None => Operand::i32(0),
            };
            let packed = b.or(lo, hi);
            b.bitcast(packed, Type::F32)
        }
    }
}

fn enable_mask<T>(chans: &[Option<T>; 4]) -> u8 {
    chans
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_some())
        .fold(0, |mask, (i, _)| mask | 1 << i)
}

/// Hardware encoding of a primitive shading rate: bit 2 for a coarse X rate, bit 4 for a coarse Y
/// rate.
fn hw_shading_rate(b: &mut Builder<'_>, rate: Operand) -> Operand {
    const VERTICAL_2_OR_4: u32 = 0x1 | 0x2;
    const HORIZONTAL_2_OR_4: u32 = 0x4 | 0x8;
    let x = b.and(rate, Operand::i32(HORIZONTAL_2_OR_4));
    let x = b.icmp(vesper_ir::instr::CmpPred::Ne, x, Operand::i32(0));
    let x = b.select(x, Operand::i32(1 << 2), Operand::i32(0));
    let y = b.and(rate, Operand::i32(VERTICAL_2_OR_4));
    let y = b.icmp(vesper_ir::instr::CmpPred::Ne, y, Operand::i32(0));
    let y = b.select(y, Operand::i32(1 << 4), Operand::i32(0));
    let rate = b.or(x, y);
    b.bitcast(rate, Type::F32)
}

impl Lowerer<'_> {
    /// Emits the deferred position and parameter exports of a VS, TES or copy shader before the
    /// return at the builder's position. Returns the parameter export count.
    pub(super) fn finalize_vertex_exports(&mut self, b: &mut Builder<'_>) -> Result<u32, IoError> {
        let pipeline = &self.ctx.pipeline;
        let gfx = pipeline.gfx_ip;
        let multiview = pipeline.input_assembly.multiview;
        let usage = self.ctx.usage(self.stage).builtin;
        let builtin_locs = &self.ctx.usage(self.stage).in_out.builtin_output_loc_map;
        let fs = pipeline
            .has_stage(ShaderStage::Fragment)
            .then(|| self.ctx.usage(ShaderStage::Fragment).builtin);
        let mut pending = self.pending.clone();

        if !usage.has(UsageFlags::POSITION) {
            let zero = Operand::f32(0.0);
            b.exp(exp_target::POS_0, 0xF, [zero, zero, zero, Operand::f32(1.0)], false);
        }

        let misc = usage.has_any(
            UsageFlags::POINT_SIZE
                | UsageFlags::LAYER
                | UsageFlags::VIEWPORT_INDEX
                | UsageFlags::PRIMITIVE_SHADING_RATE,
        ) || multiview;

        // Clip and cull distances share position exports: clip first, then cull.
        let (clip_count, cull_count) = (usage.clip_distance, usage.cull_distance);
        if clip_count + cull_count > 0 {
            let mut values: Vec<Operand> = (0..clip_count)
                .map(|i| pending.clip.get(&i).copied().unwrap_or(Operand::undef_f32()))
                .chain((0..cull_count).map(|i| pending.cull.get(&i).copied().unwrap_or(Operand::undef_f32())))
                .collect();
            let padded = (values.len().div_ceil(4) * 4).min(8);
            values.resize(padded, Operand::undef_f32());
            let target = if misc { exp_target::POS_2 } else { exp_target::POS_1 };
            for (i, chunk) in values.chunks(4).enumerate() {
                let sources = [chunk[0], chunk[1], chunk[2], chunk[3]];
                b.exp(target + i as u8, 0xF, sources, false);
            }
        }

        if let Some(fs) = fs {
            let clip_in = fs.clip_distance_in;
            let cull_in = fs.cull_distance_in;
            let base = builtin_locs
                .get(&BuiltIn::ClipDistance)
                .or_else(|| builtin_locs.get(&BuiltIn::CullDistance))
                .copied();
            if let (Some(base), true) = (base, clip_in + cull_in > 0) {
                for c in 0..clip_in + cull_in {
                    let value = if c < clip_in {
                        pending.clip.get(&c)
                    } else {
                        pending.cull.get(&(c - clip_in))
                    };
                    if let Some(value) = value.copied() {
                        pending.set_full(base + c / 4, c % 4, value)?;
                    }
                }
            }

            if let (true, Some(loc)) = (
                fs.has(UsageFlags::PRIMITIVE_ID_IN),
                builtin_locs.get(&BuiltIn::PrimitiveId).copied(),
            ) {
                let primitive_id = match self.stage {
                    ShaderStage::Vertex => Some(Operand::Entry(EntryValue::VsPrimitiveId)),
                    ShaderStage::TessEval => Some(Operand::Entry(EntryValue::TesPatchId)),
                    _ => pending.primitive_id,
                };
                if let Some(value) = primitive_id {
                    pending.set_full(loc, 0, value)?;
                }
            }
        }

        let view = match self.stage {
            ShaderStage::CopyShader => pending.view_index,
            _ => Some(Operand::Entry(EntryValue::ViewIndex)),
        };
        let layer = if multiview { view } else { pending.layer };

        if gfx.major <= 8 {
            if multiview {
                let undef = Operand::undef_f32();
                let layer = export_source(b, layer.unwrap_or(Operand::i32(0)));
                b.exp(exp_target::POS_1, 0x4, [undef, undef, layer, undef], false);
            }
        } else if misc {
            let mut enable = 0u8;
            let mut sources = [Operand::undef_f32(); 4];
            if usage.has(UsageFlags::POINT_SIZE) {
                enable |= 0x1;
                sources[0] = pending.point_size.unwrap_or(Operand::undef_f32());
            }
            if usage.has(UsageFlags::PRIMITIVE_SHADING_RATE) && gfx.at_least(10, 3) {
                enable |= 0x2;
                sources[1] = match pending.shading_rate {
                    Some(rate) => hw_shading_rate(b, rate),
                    None => Operand::f32(0.0),
                };
            }
            if layer.is_some() || pending.viewport.is_some() {
                enable |= 0x4;
                let layer = layer.unwrap_or(Operand::i32(0));
                let combined = match pending.viewport {
                    Some(viewport) => {
                        let high = b.shl(viewport, Operand::i32(16));
                        b.or(high, layer)
                    }
                    None => layer,
                };
                sources[2] = export_source(b, combined);
            }
            if enable != 0 {
                b.exp(exp_target::POS_1, enable, sources, false);
            }
        }

        if let Some(fs) = fs {
            let reads = [
                (UsageFlags::VIEWPORT_INDEX_IN, BuiltIn::ViewportIndex, pending.viewport),
                (UsageFlags::LAYER_IN, BuiltIn::Layer, layer),
                (UsageFlags::VIEW_INDEX, BuiltIn::ViewIndex, view.filter(|_| multiview)),
            ];
            for (flag, builtin, value) in reads {
                if let (true, Some(loc)) = (fs.has(flag), builtin_locs.get(&builtin).copied()) {
                    pending.set_full(loc, 0, value.unwrap_or(Operand::i32(0)))?;
                }
            }
        }

        let mut exp_count = 0;
        if gfx.major <= 9 && pending.attribs().is_empty() {
            // Older hardware expects at least one parameter export.
            b.exp(exp_target::PARAM_0, 0xF, [Operand::undef_f32(); 4], false);
            exp_count = 1;
        }
        for (location, chans) in pending.attribs() {
            let target = u32::from(exp_target::PARAM_0) + location;
            if target > u32::from(exp_target::PARAM_31) {
                return Err(IoError::Config(format!(
                    "parameter export location {location} is out of range"
                )));
            }
            let sources = chans.map(|c| channel_source(b, c));
            b.exp(target as u8, enable_mask(chans), sources, false);
            exp_count = exp_count.max(location + 1);
        }
        if self.ctx.pipeline.unlinked {
            exp_count = exp_count.max(self.ctx.usage(self.stage).in_out.output_map_loc_count);
        }
        trace!(stage = %self.stage, exp_count, "vertex exports");
        Ok(exp_count)
    }

    /// Emits the FS depth and color exports; the last one carries `done` and `valid_mask`.
    pub(super) fn finalize_color_exports(&mut self, b: &mut Builder<'_>) {
        let pending = &self.pending;
        let mut exports: Vec<(u8, u8, [Operand; 4])> = Vec::new();

        let depth_chans = [pending.depth, pending.stencil, pending.sample_mask, None];
        if depth_chans.iter().any(Option::is_some) {
            let sources = depth_chans.map(|v| v.map_or(Operand::undef_f32(), |v| export_source(b, v)));
            exports.push((exp_target::MRTZ, enable_mask(&depth_chans), sources));
        }
        for (location, chans) in &pending.mrt {
            let sources = chans.map(|v| v.map_or(Operand::undef_f32(), |v| export_source(b, v)));
            exports.push((exp_target::MRT_0 + *location as u8, enable_mask(chans), sources));
        }
        if exports.is_empty() {
            exports.push((exp_target::NULL, 0, [Operand::undef_f32(); 4]));
        }

        let last = exports.len() - 1;
        for (i, (target, enable, sources)) in exports.into_iter().enumerate() {
            b.push(Instr::Exp {
                target,
                enable,
                sources,
                done: i == last,
                valid_mask: i == last,
            });
        }
    }

    /// Records channels of an FS color output, converted to 32 bits by the output's type.
    pub(super) fn record_color_output(
        &mut self,
        b: &mut Builder<'_>,
        location: u32,
        elem: u32,
        value: Operand,
    ) -> Result<(), IoError> {
        if location >= 8 {
            return Err(IoError::Config(format!("color output location {location} is out of range")));
        }
        let ty = b.ty(&value);
        let signed = matches!(
            self.ctx.usage(ShaderStage::Fragment).in_out.fs_output_types.get(&location),
            Some(BasicType::Int8 | BasicType::Int16)
        );
        for k in 0..ty.element_count() {
            let channel = elem + k;
            if channel >= 4 {
                return Err(IoError::UnsupportedIoType(ty));
            }
            let lane = b.extract_lane(value, k);
            let wide = match ty.scalar_type() {
                Some(ScalarType::F16) => b.cast(vesper_ir::instr::CastOp::FpExt, lane, Type::F32),
                Some(ScalarType::I8 | ScalarType::I16) if signed => b.sext(lane, Type::I32),
                Some(ScalarType::I8 | ScalarType::I16) => b.zext(lane, Type::I32),
                Some(ScalarType::I32 | ScalarType::F32) => lane,
                _ => return Err(IoError::UnsupportedIoType(ty)),
            };
            if !wide.is_undef() {
                self.pending.mrt.entry(location).or_default()[channel as usize] = Some(wide);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn halves_and_full_channels_do_not_mix() {
        let mut pending = PendingExports::default();
        let half = Operand::int(ScalarType::I16, 1);
        pending.set_half(0, 1, false, half).unwrap();
        pending.set_half(0, 1, true, half).unwrap();
        assert_eq!(
            pending.set_full(0, 1, Operand::f32(1.0)),
            Err(IoError::OverlappingExport {
                location: 0,
                channel: 1
            })
        );

        pending.set_full(1, 0, Operand::f32(1.0)).unwrap();
        pending.set_full(1, 0, Operand::f32(2.0)).unwrap();
        assert_eq!(
            pending.attribs()[&1][0],
            Some(Channel::Full(Operand::f32(2.0)))
        );
        assert!(pending.set_half(1, 0, true, half).is_err());
    }

    #[test]
    fn undef_writes_leave_the_channel_open() {
        let mut pending = PendingExports::default();
        pending.set_full(2, 3, Operand::undef_f32()).unwrap();
        assert!(pending.attribs().is_empty());
    }

    #[test]
    fn enable_mask_follows_written_channels() {
        assert_eq!(enable_mask(&[Some(1), None, Some(3), None]), 0b0101);
        assert_eq!(enable_mask::<u8>(&[None; 4]), 0);
    }
}
