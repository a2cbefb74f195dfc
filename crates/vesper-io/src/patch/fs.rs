//! Fragment shader inputs: attribute interpolation, parameter loads and the FS built-ins.

use vesper_ir::instr::{CmpPred, InterpOp, InterpParam, IntrinsicOp};
use vesper_ir::{
    BufferAccess, Builder, BuiltIn, CachePolicy, Descriptor, EntryValue, IjLocation, InputImport,
    InterpLoc, InterpMode, Operand, ScalarType, ShaderStage, Type,
};

use super::storage::dword_count;
use super::Lowerer;
use crate::error::{Direction, IoError};
use crate::location::LocationInfo;
use crate::pipeline::Topology;
use crate::usage::{FsInterpInfo, UsageFlags};

/// One 32-bit attribute channel read by an FS input.
#[derive(Debug, Clone, Copy)]
struct AttrChannel {
    attr: Operand,
    channel: u32,
    high: bool,
}

impl AttrChannel {
    fn at(location: u32, channel: u32) -> Self {
        Self {
            attr: Operand::i32(location + channel / 4),
            channel: channel % 4,
            high: false,
        }
    }
}

fn entry(value: EntryValue) -> Operand {
    Operand::Entry(value)
}

impl Lowerer<'_> {
    pub(super) fn lower_fs_input(
        &mut self,
        b: &mut Builder<'_>,
        ty: Type,
        import: InputImport,
    ) -> Result<Operand, IoError> {
        match import {
            InputImport::Generic {
                location,
                loc_offset,
                elem_idx,
                interp,
                ..
            } => self.fs_generic_input(b, ty, location, loc_offset, elem_idx, interp.mode, interp.loc, None),
            InputImport::Interpolant {
                location,
                loc_offset,
                elem_idx,
                mode,
                aux,
            } => self.fs_generic_input(b, ty, location, loc_offset, elem_idx, mode, InterpLoc::Unknown, Some(aux)),
            InputImport::BuiltIn {
                builtin,
                elem_idx,
                sample_id,
                ..
            } => self.fs_builtin_input(b, ty, builtin, elem_idx, sample_id),
            import @ InputImport::Vertex { .. } => Err(IoError::UnsupportedMarker {
                stage: ShaderStage::Fragment,
                marker: import.to_string(),
            }),
        }
    }

    fn note_interp(&mut self, location: u32, mode: InterpMode, is_16bit: bool) {
        self.fs_interp.insert(
            location,
            FsInterpInfo {
                location,
                flat: mode == InterpMode::Flat,
                custom: mode == InterpMode::Custom,
                is_16bit,
            },
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn fs_generic_input(
        &mut self,
        b: &mut Builder<'_>,
        ty: Type,
        location: u32,
        loc_offset: Operand,
        elem_idx: Operand,
        mode: InterpMode,
        interp_loc: InterpLoc,
        aux: Option<Operand>,
    ) -> Result<Operand, IoError> {
        let ctx = self.ctx;
        let pipeline = &ctx.pipeline;
        let io = &ctx.usage(ShaderStage::Fragment).in_out;
        let elem = elem_idx.as_u32().ok_or(IoError::NonConstant {
            what: "fragment input element index",
        })?;
        let wide = ty.scalar_bits() == 64;
        let packed = pipeline
            .prev_stage(ShaderStage::Fragment)
            .is_some_and(|p| pipeline.packs_boundary(p));

        let mut chans = Vec::with_capacity(dword_count(ty) as usize);
        if packed {
            if !loc_offset.is_const() {
                return Err(IoError::NonConstant {
                    what: "location offset of a packed input",
                });
            }
            for k in 0..ty.element_count() {
                let key = LocationInfo::new(location).channel(elem + k);
                let to = io.input_loc_map.get(&key).ok_or(IoError::MissingLocation {
                    stage: ShaderStage::Fragment,
                    info: key,
                })?;
                let attr = Operand::i32(to.location);
                chans.push(AttrChannel {
                    attr,
                    channel: u32::from(to.component),
                    high: to.is_high_half,
                });
                if wide {
                    chans.push(AttrChannel {
                        attr,
                        channel: u32::from(to.component) + 1,
                        high: false,
                    });
                }
            }
        } else {
            let phys = io
                .input_loc_map
                .location(location)
                .ok_or(IoError::MissingLocation {
                    stage: ShaderStage::Fragment,
                    info: LocationInfo::new(location),
                })?;
            let start = if wide { elem * 2 } else { elem };
            for i in start..start + dword_count(ty) {
                let mut chan = AttrChannel::at(phys, i);
                chan.attr = b.add(chan.attr, loc_offset);
                chans.push(chan);
            }
        }

        let is_16bit = ty.scalar_bits() == 16;
        let locations: Vec<u32> = chans.iter().filter_map(|c| c.attr.as_u32()).collect();
        for loc in locations {
            self.note_interp(loc, mode, is_16bit);
        }
        self.interpolate(b, ty, &chans, mode, interp_loc, aux)
    }

    /// I/J pair of a smooth or no-perspective input without an explicit one.
    fn fs_ij(&self, b: &mut Builder<'_>, mode: InterpMode, loc: InterpLoc) -> Operand {
        let ij = |at| match mode {
            InterpMode::NoPersp => entry(EntryValue::LinearInterp(at)),
            _ => entry(EntryValue::PerspInterp(at)),
        };
        match loc {
            InterpLoc::Centroid => self.adjust_centroid(b, ij(IjLocation::Centroid), ij(IjLocation::Center)),
            InterpLoc::Sample => ij(IjLocation::Sample),
            _ => ij(IjLocation::Center),
        }
    }

    /// With both center and centroid in use, the hardware centroid I/J is only valid when
    /// `bc_optimize` (the sign bit of the primitive mask) is off.
    fn adjust_centroid(&self, b: &mut Builder<'_>, centroid: Operand, center: Operand) -> Operand {
        let usage = self.ctx.usage(ShaderStage::Fragment).builtin;
        if usage.has(UsageFlags::CENTROID | UsageFlags::CENTER) {
            let bc_optimize = b.icmp(CmpPred::Slt, entry(EntryValue::PrimMask), Operand::i32(0));
            b.select(bc_optimize, center, centroid)
        } else {
            centroid
        }
    }

    /// Interpolates (or, for flat and custom inputs, loads) `chans` and reassembles a value of
    /// `ty`.
    fn interpolate(
        &self,
        b: &mut Builder<'_>,
        ty: Type,
        chans: &[AttrChannel],
        mode: InterpMode,
        interp_loc: InterpLoc,
        aux: Option<Operand>,
    ) -> Result<Operand, IoError> {
        let bits = ty.scalar_bits();
        let prim_mask = entry(EntryValue::PrimMask);
        let lane_type = match bits {
            8 => ScalarType::I8,
            16 => ScalarType::F16,
            32 | 64 => ScalarType::F32,
            _ => return Err(IoError::UnsupportedIoType(ty)),
        };
        let interpolated = !matches!(mode, InterpMode::Flat | InterpMode::Custom);
        let ij = if interpolated {
            let ij = match aux {
                Some(aux) => aux,
                None => self.fs_ij(b, mode, interp_loc),
            };
            Some((b.extract_lane(ij, 0), b.extract_lane(ij, 1)))
        } else {
            None
        };
        let param = match (mode, aux) {
            (InterpMode::Custom, Some(vertex)) => match vertex.as_u32() {
                Some(0) => InterpParam::P0,
                Some(1) => InterpParam::P10,
                Some(2) => InterpParam::P20,
                _ => {
                    return Err(IoError::NonConstant {
                        what: "vertex of a custom-interpolated input",
                    })
                }
            },
            _ => InterpParam::P0,
        };

        let mut lanes = Vec::with_capacity(chans.len());
        for chan in chans {
            let AttrChannel { attr, channel, high } = *chan;
            let lane = match (ij, bits) {
                (Some((i, j)), 16) => {
                    let p1 = b.interp(InterpOp::P1F16 { i, high }, channel, attr, prim_mask);
                    b.interp(InterpOp::P2F16 { p1, j, high }, channel, attr, prim_mask)
                }
                (Some((i, j)), 32) => {
                    let p1 = b.interp(InterpOp::P1 { i }, channel, attr, prim_mask);
                    b.interp(InterpOp::P2 { p1, j }, channel, attr, prim_mask)
                }
                (Some(_), _) => return Err(IoError::UnsupportedIoType(ty)),
                (None, 8 | 16) => {
                    // Two 8- or 16-bit values share a channel; the high one sits in bits 16..32.
                    let raw = b.interp(InterpOp::Mov { param }, channel, attr, prim_mask);
                    let int = b.bitcast(raw, Type::I32);
                    let int = if high { b.lshr(int, Operand::i32(16)) } else { int };
                    if bits == 8 {
                        b.trunc(int, Type::I8)
                    } else {
                        let half = b.trunc(int, Type::I16);
                        b.bitcast(half, Type::F16)
                    }
                }
                (None, _) => b.interp(InterpOp::Mov { param }, channel, attr, prim_mask),
            };
            lanes.push(lane);
        }
        let vector = b.build_vector(lane_type, &lanes);
        Ok(b.bitcast(vector, ty))
    }

    fn builtin_input_loc(&self, builtin: BuiltIn) -> Result<u32, IoError> {
        self.ctx
            .usage(ShaderStage::Fragment)
            .in_out
            .builtin_input_loc_map
            .get(&builtin)
            .copied()
            .ok_or(IoError::MissingBuiltInLocation {
                stage: ShaderStage::Fragment,
                builtin,
            })
    }

    fn fs_builtin_input(
        &mut self,
        b: &mut Builder<'_>,
        ty: Type,
        builtin: BuiltIn,
        elem_idx: Option<Operand>,
        sample_id: Option<Operand>,
    ) -> Result<Operand, IoError> {
        let ctx = self.ctx;
        let pipeline = &ctx.pipeline;
        let ancillary = entry(EntryValue::Ancillary);
        let value = match builtin {
            BuiltIn::SampleMask => {
                let coverage = entry(EntryValue::SampleCoverage);
                let mask = if pipeline.rasterizer.per_sample_shading {
                    let id = b.ubfe(ancillary, 8, 4);
                    let bit = b.shl(Operand::i32(1), id);
                    b.and(coverage, bit)
                } else {
                    coverage
                };
                // Only the first element is meaningful.
                if ty.is_array() {
                    b.insert_value(Operand::Undef(ty), mask, 0)
                } else {
                    mask
                }
            }
            BuiltIn::FragCoord => {
                let mut coord: Vec<Operand> = (0..3).map(|c| entry(EntryValue::FragCoord(c))).collect();
                let w = b.intrinsic(IntrinsicOp::Rcp, Type::F32, vec![entry(EntryValue::FragCoord(3))]);
                coord.push(w);
                let coord = b.build_vector(ScalarType::F32, &coord);
                select_element(b, coord, elem_idx)
            }
            BuiltIn::FrontFacing => b.icmp(CmpPred::Ne, entry(EntryValue::FrontFacing), Operand::i32(0)),
            BuiltIn::PointCoord => {
                let loc = self.builtin_input_loc(builtin)?;
                self.note_interp(loc, InterpMode::Smooth, false);
                let at = if pipeline.rasterizer.per_sample_shading {
                    InterpLoc::Sample
                } else {
                    InterpLoc::Center
                };
                let chans = [AttrChannel::at(loc, 0), AttrChannel::at(loc, 1)];
                let coord = self.interpolate(
                    b,
                    Type::vec(ScalarType::F32, 2),
                    &chans,
                    InterpMode::Smooth,
                    at,
                    None,
                )?;
                select_element(b, coord, elem_idx)
            }
            BuiltIn::HelperInvocation => {
                let live = b.intrinsic(IntrinsicOp::PsLive, Type::BOOL, Vec::new());
                b.xor(live, Operand::bool(true))
            }
            BuiltIn::PrimitiveId | BuiltIn::Layer | BuiltIn::ViewportIndex | BuiltIn::ViewIndex => {
                match (self.builtin_input_loc(builtin), builtin) {
                    (Ok(loc), _) => {
                        self.note_interp(loc, InterpMode::Flat, false);
                        let chans = [AttrChannel::at(loc, 0)];
                        self.interpolate(b, Type::I32, &chans, InterpMode::Flat, InterpLoc::Center, None)?
                    }
                    (Err(_), BuiltIn::ViewIndex) => entry(EntryValue::ViewIndex),
                    (Err(err), _) => return Err(err),
                }
            }
            BuiltIn::ClipDistance | BuiltIn::CullDistance => {
                let loc = self.builtin_input_loc(builtin)?;
                let usage = ctx.usage(ShaderStage::Fragment).builtin;
                let start = match builtin {
                    BuiltIn::CullDistance => usage.clip_distance_in % 4,
                    _ => 0,
                };
                let count = match builtin {
                    BuiltIn::CullDistance => usage.cull_distance_in,
                    _ => usage.clip_distance_in,
                };
                for l in loc..=loc + (start + count.max(1) - 1) / 4 {
                    self.note_interp(l, InterpMode::NoPersp, false);
                }
                let mut read = |b: &mut Builder<'_>, i: u32| {
                    let chans = [AttrChannel::at(loc, start + i)];
                    self.interpolate(b, Type::F32, &chans, InterpMode::NoPersp, InterpLoc::Center, None)
                };
                match elem_idx {
                    Some(idx) => {
                        let i = idx.as_u32().ok_or(IoError::NonConstant {
                            what: "clip or cull distance index",
                        })?;
                        read(b, i)?
                    }
                    None => {
                        let mut array = Operand::Undef(ty);
                        for i in 0..ty.element_count() {
                            let value = read(b, i)?;
                            array = b.insert_value(array, value, i);
                        }
                        array
                    }
                }
            }
            BuiltIn::SampleId => b.ubfe(ancillary, 8, 4),
            BuiltIn::ShadingRate => {
                // X rate in ancillary bits 2..4, Y rate in bits 4..6; only the 2-pixel rates exist.
                const HORIZONTAL_2_PIXELS: u32 = 0x4;
                const VERTICAL_2_PIXELS: u32 = 0x1;
                let x = b.and(ancillary, Operand::i32(0xC));
                let x = b.lshr(x, Operand::i32(2));
                let x = b.icmp(CmpPred::Eq, x, Operand::i32(1));
                let x = b.select(x, Operand::i32(HORIZONTAL_2_PIXELS), Operand::i32(0));
                let y = b.and(ancillary, Operand::i32(0x30));
                let y = b.lshr(y, Operand::i32(4));
                let y = b.icmp(CmpPred::Eq, y, Operand::i32(1));
                let y = b.select(y, Operand::i32(VERTICAL_2_PIXELS), Operand::i32(0));
                b.or(x, y)
            }
            BuiltIn::NumSamples => Operand::i32(pipeline.rasterizer.num_samples),
            BuiltIn::SamplePatternIdx => Operand::i32(pipeline.rasterizer.sample_pattern_idx),
            BuiltIn::BaryCoordSmooth => entry(EntryValue::PerspInterp(IjLocation::Center)),
            BuiltIn::BaryCoordSmoothSample => entry(EntryValue::PerspInterp(IjLocation::Sample)),
            BuiltIn::BaryCoordSmoothCentroid | BuiltIn::InterpPerspCentroid => self.adjust_centroid(
                b,
                entry(EntryValue::PerspInterp(IjLocation::Centroid)),
                entry(EntryValue::PerspInterp(IjLocation::Center)),
            ),
            BuiltIn::BaryCoordPullModel | BuiltIn::InterpPullMode => entry(EntryValue::PerspPullMode),
            BuiltIn::BaryCoordNoPersp | BuiltIn::InterpLinearCenter => {
                entry(EntryValue::LinearInterp(IjLocation::Center))
            }
            BuiltIn::BaryCoordNoPerspSample => entry(EntryValue::LinearInterp(IjLocation::Sample)),
            BuiltIn::BaryCoordNoPerspCentroid | BuiltIn::InterpLinearCentroid => self.adjust_centroid(
                b,
                entry(EntryValue::LinearInterp(IjLocation::Centroid)),
                entry(EntryValue::LinearInterp(IjLocation::Center)),
            ),
            BuiltIn::SamplePosOffset => {
                let sample = sample_id.unwrap_or(Operand::i32(0));
                self.sample_pos_offset(b, sample)
            }
            BuiltIn::SamplePosition => {
                let sample = b.ubfe(ancillary, 8, 4);
                let offset = self.sample_pos_offset(b, sample);
                let half = b.build_vector(ScalarType::F32, &[Operand::f32(0.5), Operand::f32(0.5)]);
                let position = b.fadd(offset, half);
                select_element(b, position, elem_idx)
            }
            BuiltIn::BaryCoord | BuiltIn::BaryCoordNoPerspKhr => {
                let coord = self.bary_coord(b, builtin)?;
                select_element(b, coord, elem_idx)
            }
            _ => {
                return Err(IoError::InvalidBuiltInStage {
                    builtin,
                    stage: ShaderStage::Fragment,
                    direction: Direction::Input,
                })
            }
        };
        Ok(value)
    }

    /// Offset of a sample from the pixel center, loaded from the sample position table. Samples
    /// past the sample count read entry 0.
    fn sample_pos_offset(&self, b: &mut Builder<'_>, sample: Operand) -> Operand {
        let rasterizer = &self.ctx.pipeline.rasterizer;
        let num_samples = Operand::i32(rasterizer.num_samples);
        let pattern = Operand::i32(rasterizer.sample_pattern_idx);
        let valid_offset = b.add(pattern, sample);
        let valid = b.icmp(CmpPred::Ugt, num_samples, sample);
        let index = b.select(valid, valid_offset, Operand::i32(0));
        let offset = b.shl(index, Operand::i32(4));
        b.buffer_load(
            Type::vec(ScalarType::F32, 2),
            BufferAccess {
                desc: entry(EntryValue::Descriptor(Descriptor::SamplePositionTable)),
                vindex: None,
                voffset: offset,
                soffset: Operand::i32(0),
                offset: 0,
                format: None,
                cache: CachePolicy::empty(),
            },
        )
    }

    /// Per-vertex barycentrics in API vertex order, rebuilt from the hardware I/J.
    fn bary_coord(&mut self, b: &mut Builder<'_>, builtin: BuiltIn) -> Result<Operand, IoError> {
        let ij = match builtin {
            BuiltIn::BaryCoord => entry(EntryValue::PerspInterp(IjLocation::Center)),
            _ => entry(EntryValue::LinearInterp(IjLocation::Center)),
        };
        let i = b.extract_lane(ij, 0);
        let j = b.extract_lane(ij, 1);
        let one_minus_i = b.fsub(Operand::f32(1.0), i);
        let mut k = |b: &mut Builder<'_>| b.fsub(one_minus_i, j);
        let vec3 = |b: &mut Builder<'_>, x, y, z| b.build_vector(ScalarType::F32, &[x, y, z]);
        let zero = Operand::f32(0.0);

        Ok(match self.ctx.pipeline.input_assembly.topology {
            Topology::PointList => vec3(b, Operand::f32(1.0), zero, zero),
            Topology::LineList | Topology::LineStrip => {
                let k = k(b);
                let i_plus_j = b.fadd(i, j);
                vec3(b, k, i_plus_j, zero)
            }
            // Hardware vertex 0 is the API's vertex 1, hardware vertex 1 the API's vertex 2.
            Topology::TriangleList => {
                let k = k(b);
                vec3(b, j, k, i)
            }
            topology @ (Topology::TriangleStrip
            | Topology::TriangleFan
            | Topology::TriangleStripAdjacency
            | Topology::TriangleListAdjacency) => {
                let k = k(b);
                let odd = if topology == Topology::TriangleListAdjacency {
                    vec3(b, i, j, k)
                } else {
                    vec3(b, j, k, i)
                };
                let even = vec3(b, k, i, j);
                let primitive_id = self.fs_builtin_input(b, Type::I32, BuiltIn::PrimitiveId, None, None)?;
                let parity = b.srem(primitive_id, Operand::i32(2));
                let is_even = b.icmp(CmpPred::Eq, parity, Operand::i32(0));
                b.select(is_even, even, odd)
            }
            Topology::PatchList => {
                return Err(IoError::Config(
                    "barycentric coordinates are undefined for patch lists".into(),
                ))
            }
        })
    }
}

/// One element of a vector built-in when the marker reads a single element.
fn select_element(b: &mut Builder<'_>, value: Operand, elem_idx: Option<Operand>) -> Operand {
    match elem_idx {
        Some(idx) => b.extract_element(value, idx),
        None => value,
    }
}
