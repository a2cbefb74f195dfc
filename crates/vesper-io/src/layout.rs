//! Per-compile memory layouts: the tessellation LDS layout (`CalcFactor`), patches per
//! thread-group and the GS ring item sizes.
//!
//! All sizes are in dwords unless a name says bytes.

use tracing::debug;
use vesper_ir::ShaderStage;

use crate::context::CompilationContext;
use crate::target::{GpuProperty, GpuWorkarounds};

/// Maximum control points of a patch; the output vertex count of a TES without a TCS.
pub const MAX_TESS_PATCH_VERTICES: u32 = 32;

/// Where the output patches and patch constants start within the tessellation storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionStarts {
    pub out_patch_start: u32,
    pub patch_const_start: u32,
}

/// Tessellation layout shared by VS (as LS), TCS and TES.
///
/// ```text
///        +--------------------------+
///        | TCS inputs (VS outputs)  |  in_patch_size * patch_count
///  LDS   +--------------------------+  <- on_chip.out_patch_start
///        | TCS per-vertex outputs   |  out_patch_size * patch_count
///        +--------------------------+  <- on_chip.patch_const_start
///        | TCS patch constants      |  patch_const_size * patch_count
///        +--------------------------+
/// ```
///
/// With off-chip tessellation the outputs and patch constants move to the off-chip buffer,
/// starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalcFactor {
    pub in_vertex_count: u32,
    pub out_vertex_count: u32,
    pub in_vertex_stride: u32,
    pub out_vertex_stride: u32,
    pub patch_const_count: u32,
    pub patch_const_size: u32,
    pub patch_count_per_thread_group: u32,
    pub in_patch_size: u32,
    pub out_patch_size: u32,
    pub in_patch_total_size: u32,
    pub out_patch_total_size: u32,
    pub on_chip: RegionStarts,
    pub off_chip: RegionStarts,
    pub tess_factor_stride: u32,
}

impl CalcFactor {
    /// Derives the layout from the TCS/TES location counts. Requires locations to be assigned.
    pub fn compute(ctx: &CompilationContext) -> Self {
        let pipeline = &ctx.pipeline;
        let has_tcs = pipeline.has_stage(ShaderStage::TessControl);
        let tcs = &ctx.usage(ShaderStage::TessControl).in_out;
        let tes = &ctx.usage(ShaderStage::TessEval).in_out;

        let in_loc_count = tcs.input_map_loc_count.max(1);
        let out_loc_count = if has_tcs {
            tcs.output_map_loc_count.max(1)
        } else {
            tes.input_map_loc_count.max(1)
        };
        let in_vertex_count = pipeline.input_assembly.patch_control_points;
        let out_vertex_count = if has_tcs {
            pipeline.tessellation.output_vertices
        } else {
            MAX_TESS_PATCH_VERTICES
        };
        let tess_factor_stride = pipeline.tessellation.primitive_mode.tess_factor_stride();
        let in_vertex_stride = in_loc_count * 4;
        let out_vertex_stride = out_loc_count * 4;
        let patch_const_count = if has_tcs {
            tcs.per_patch_output_map_loc_count
        } else {
            tes.per_patch_input_map_loc_count
        };

        let params = PatchCountParams {
            in_vertex_count,
            in_vertex_stride,
            out_vertex_count,
            out_vertex_stride,
            patch_const_count,
            tess_factor_stride,
            wave_size: pipeline.wave_size(ShaderStage::TessControl),
            gfx_major: pipeline.gfx_ip.major,
            off_chip: pipeline.tess_off_chip,
        };
        let patch_count =
            patch_count_per_thread_group(&params, &ctx.target.property, &ctx.target.workarounds);

        let in_patch_size = in_vertex_count * in_vertex_stride;
        let out_patch_size = out_vertex_count * out_vertex_stride;
        let in_patch_total_size = patch_count * in_patch_size;
        let out_patch_total_size = patch_count * out_patch_size;
        let on_chip = RegionStarts {
            out_patch_start: in_patch_total_size,
            patch_const_start: in_patch_total_size + out_patch_total_size,
        };
        let off_chip = if pipeline.tess_off_chip {
            RegionStarts {
                out_patch_start: 0,
                patch_const_start: out_patch_total_size,
            }
        } else {
            RegionStarts::default()
        };

        let factor = CalcFactor {
            in_vertex_count,
            out_vertex_count,
            in_vertex_stride,
            out_vertex_stride,
            patch_const_count,
            patch_const_size: patch_const_count * 4,
            patch_count_per_thread_group: patch_count,
            in_patch_size,
            out_patch_size,
            in_patch_total_size,
            out_patch_total_size,
            on_chip,
            off_chip,
            tess_factor_stride,
        };
        debug!(
            patch_count,
            in_vertex_count,
            in_vertex_stride,
            in_patch_size,
            in_patch_total_size,
            out_vertex_count,
            out_vertex_stride,
            out_patch_size,
            out_patch_total_size,
            patch_const_count,
            patch_const_size = factor.patch_const_size,
            tess_factor_stride,
            primitive_mode = ?pipeline.tessellation.primitive_mode,
            "tessellation layout"
        );
        factor
    }

    /// Region starts of the storage the TCS outputs live in.
    pub fn regions(&self, off_chip: bool) -> RegionStarts {
        if off_chip {
            self.off_chip
        } else {
            self.on_chip
        }
    }
}

/// Inputs of [`patch_count_per_thread_group`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchCountParams {
    pub in_vertex_count: u32,
    pub in_vertex_stride: u32,
    pub out_vertex_count: u32,
    pub out_vertex_stride: u32,
    pub patch_const_count: u32,
    pub tess_factor_stride: u32,
    /// TCS wave size.
    pub wave_size: u32,
    pub gfx_major: u32,
    pub off_chip: bool,
}

/// Patches processed by one LS/HS thread-group.
pub fn patch_count_per_thread_group(
    params: &PatchCountParams,
    property: &GpuProperty,
    workarounds: &GpuWorkarounds,
) -> u32 {
    // At most 4 waves per thread-group.
    let max_threads = 4 * params.wave_size;
    let threads_per_patch = params.in_vertex_count.max(params.out_vertex_count).max(1);
    let limited_by_thread = max_threads / threads_per_patch;

    let in_patch_size = (params.in_vertex_count * params.in_vertex_stride).max(1);
    let out_patch_size = params.out_vertex_count * params.out_vertex_stride;
    let patch_const_size = params.patch_const_count * 4;

    // Only the incoming patch is accounted against the LDS budget.
    let limited_by_lds = property.lds_size_per_thread_group / in_patch_size;
    let mut count = limited_by_thread.min(limited_by_lds);

    let optimal = if params.gfx_major >= 9 { 64 } else { 16 };
    count = count.min(optimal);

    if params.off_chip {
        let out_patch_bytes = ((out_patch_size + patch_const_size) * 4).max(1);
        count = count.min(property.tess_off_chip_lds_buffer_size / out_patch_bytes);
    }

    // One TF buffer per shader engine; a thread-group may use all of it.
    let tf_buffer_bytes = 4 * property.tess_factor_buffer_size_per_se;
    let tf_patch_bytes = (params.tess_factor_stride * 4).max(1);
    let mut tf_limit = tf_buffer_bytes / tf_patch_bytes;
    if workarounds.tess_factor_buffer_size_limit_ge_utcl1_underflow {
        tf_limit /= 2;
    }
    count = count.min(tf_limit);

    if params.off_chip {
        // Off-chip tessellation writes an extra control dword per patch.
        let limit = tf_buffer_bytes.saturating_sub(count * 4) / tf_patch_bytes;
        count = count.min(limit);
    }

    if workarounds.misc_load_balance_per_watt {
        count = count.min(property.wave_size / threads_per_patch);
    }
    count
}

/// Item sizes and per-stream bases of the ES→GS and GS→VS rings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GsRingFactor {
    /// Dwords per ES vertex.
    pub es_gs_ring_item_size: u32,
    /// Dwords per GS thread, all streams.
    pub gs_vs_ring_item_size: u32,
    /// Dwords of LDS taken by the ES→GS ring when it is on chip.
    pub es_gs_lds_size: u32,
    /// First dword of each stream inside a GS→VS ring item.
    pub stream_bases: [u32; 4],
}

impl GsRingFactor {
    /// Uses the configured sizes where they are non-zero and derives the rest from usage.
    pub fn compute(ctx: &CompilationContext) -> Self {
        let pipeline = &ctx.pipeline;
        let gs = &ctx.usage(ShaderStage::Geometry).in_out;
        let configured = pipeline.gs_ring;
        let output_vertices = pipeline.geometry.output_vertices;

        let stream_bases = stream_bases(&gs.gs_out_loc_count, output_vertices);
        let total: u32 = gs
            .gs_out_loc_count
            .iter()
            .map(|c| c * 4 * output_vertices)
            .sum();

        let es_gs_ring_item_size = match configured.es_gs_ring_item_size {
            0 => 4 * gs.input_map_loc_count.max(1),
            n => n,
        };
        let gs_vs_ring_item_size = match configured.gs_vs_ring_item_size {
            0 => total.max(1),
            n => n,
        };
        let es_stage = if pipeline.stages.has(ShaderStage::TessEval) {
            ShaderStage::TessEval
        } else {
            ShaderStage::Vertex
        };
        let es_gs_lds_size = match configured.es_gs_lds_size {
            0 => es_gs_ring_item_size * pipeline.wave_size(es_stage),
            n => n,
        };
        Self {
            es_gs_ring_item_size,
            gs_vs_ring_item_size,
            es_gs_lds_size,
            stream_bases,
        }
    }
}

/// Running sum of `out_loc_count[stream] * 4 * output_vertices`.
pub fn stream_bases(out_loc_count: &[u32; 4], output_vertices: u32) -> [u32; 4] {
    let mut bases = [0u32; 4];
    let mut acc = 0;
    for (base, count) in bases.iter_mut().zip(out_loc_count) {
        *base = acc;
        acc += count * 4 * output_vertices;
    }
    bases
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::GfxIp;
    use crate::target::TargetInfo;

    fn params() -> PatchCountParams {
        PatchCountParams {
            in_vertex_count: 3,
            in_vertex_stride: 8,
            out_vertex_count: 3,
            out_vertex_stride: 8,
            patch_const_count: 2,
            tess_factor_stride: 4,
            wave_size: 64,
            gfx_major: 9,
            off_chip: false,
        }
    }

    #[test]
    fn on_chip_gfx9_is_capped_at_64() {
        let target = TargetInfo::new(GfxIp::new(9, 0));
        let count = patch_count_per_thread_group(&params(), &target.property, &target.workarounds);
        // 256 threads / 3 = 85, LDS 16384 / 24 = 682, cap 64.
        assert_eq!(count, 64);
    }

    #[test]
    fn large_patches_are_limited_by_lds() {
        let target = TargetInfo::new(GfxIp::new(9, 0));
        let p = PatchCountParams {
            in_vertex_count: 32,
            in_vertex_stride: 128,
            out_vertex_count: 32,
            ..params()
        };
        let count = patch_count_per_thread_group(&p, &target.property, &target.workarounds);
        assert_eq!(count, 4);
    }

    #[test]
    fn underflow_erratum_halves_tf_limit() {
        let target = TargetInfo::new(GfxIp::new(10, 1));
        let p = PatchCountParams {
            in_vertex_count: 1,
            in_vertex_stride: 4,
            out_vertex_count: 1,
            out_vertex_stride: 4,
            tess_factor_stride: 6,
            gfx_major: 10,
            ..params()
        };
        let full = patch_count_per_thread_group(
            &p,
            &target.property,
            &GpuWorkarounds::default(),
        );
        assert_eq!(full, 64);
        let small_tf = GpuProperty {
            tess_factor_buffer_size_per_se: 0x100,
            ..target.property
        };
        // 1024 bytes / 24 = 42, halved to 21.
        assert_eq!(
            patch_count_per_thread_group(&p, &small_tf, &target.workarounds),
            21
        );
    }

    #[test]
    fn load_balance_workaround_keeps_one_wave() {
        let target = TargetInfo::new(GfxIp::new(9, 0));
        let wa = GpuWorkarounds {
            misc_load_balance_per_watt: true,
            ..GpuWorkarounds::default()
        };
        let p = PatchCountParams {
            in_vertex_count: 16,
            out_vertex_count: 4,
            ..params()
        };
        assert_eq!(patch_count_per_thread_group(&p, &target.property, &wa), 4);
    }

    #[test]
    fn stream_bases_accumulate() {
        assert_eq!(stream_bases(&[2, 0, 1, 3], 4), [0, 32, 32, 48]);
    }
}
