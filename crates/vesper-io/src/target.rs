//! Per-generation GPU properties, workarounds and buffer format codes.

use vesper_ir::BufferFormat;

use crate::pipeline::GfxIp;

/// Hardware limits the LDS and tessellation layout depend on. Sizes are in dwords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuProperty {
    pub wave_size: u32,
    pub lds_size_per_thread_group: u32,
    pub tess_off_chip_lds_buffer_size: u32,
    pub tess_factor_buffer_size_per_se: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpuWorkarounds {
    /// Limit LS/HS thread-groups to one wave so CUs can be clock-gated safely.
    pub misc_load_balance_per_watt: bool,
    /// Only half of the TF buffer may be used per thread-group.
    pub tess_factor_buffer_size_limit_ge_utcl1_underflow: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetInfo {
    pub gfx_ip: GfxIp,
    pub property: GpuProperty,
    pub workarounds: GpuWorkarounds,
}

impl TargetInfo {
    pub fn new(gfx_ip: GfxIp) -> Self {
        let lds_size_per_thread_group = if gfx_ip.major <= 6 { 8192 } else { 16384 };
        let tess_factor_buffer_size_per_se = if gfx_ip.major >= 9 { 0x2000 } else { 0x1000 };
        let property = GpuProperty {
            wave_size: 64,
            lds_size_per_thread_group,
            tess_off_chip_lds_buffer_size: 32768,
            tess_factor_buffer_size_per_se,
        };
        let workarounds = GpuWorkarounds {
            misc_load_balance_per_watt: false,
            tess_factor_buffer_size_limit_ge_utcl1_underflow: gfx_ip.major == 10 && gfx_ip.minor < 3,
        };
        Self {
            gfx_ip,
            property,
            workarounds,
        }
    }

    pub fn with_property(mut self, property: GpuProperty) -> Self {
        self.property = property;
        self
    }

    pub fn with_workarounds(mut self, workarounds: GpuWorkarounds) -> Self {
        self.workarounds = workarounds;
        self
    }

    /// Float format of an `n`-dword (1..=4) typed store, used for stream-out and TF stores.
    pub fn float_buffer_format(&self, dwords: u32) -> BufferFormat {
        let idx = dwords.clamp(1, 4) as usize - 1;
        if self.gfx_ip.major >= 10 {
            BufferFormat(format::GFX10_FLOAT[idx])
        } else {
            BufferFormat(format::GFX9_FLOAT[idx])
        }
    }

    /// Half-float format of a 1, 2 or 4 element 16-bit stream-out store.
    pub fn half_buffer_format(&self, elems: u32) -> BufferFormat {
        let idx = match elems {
            0 | 1 => 0,
            2 => 1,
            _ => 2,
        };
        if self.gfx_ip.major >= 10 {
            BufferFormat(format::GFX10_HALF[idx])
        } else {
            BufferFormat(format::GFX9_HALF[idx])
        }
    }

    /// Single-dword unsigned format of GS ring stores.
    pub fn ring_store_format(&self) -> BufferFormat {
        if self.gfx_ip.major >= 10 {
            BufferFormat(format::GFX10_32_UINT)
        } else {
            BufferFormat(format::GFX9_32_UINT)
        }
    }
}

/// Buffer format encodings.
pub mod format {
    const NUM_FORMAT_UINT: u32 = 4;
    const NUM_FORMAT_FLOAT: u32 = 7;
    const DATA_FORMAT_16: u32 = 2;
    const DATA_FORMAT_16_16: u32 = 5;
    const DATA_FORMAT_16_16_16_16: u32 = 12;
    const DATA_FORMAT_32: u32 = 4;
    const DATA_FORMAT_32_32: u32 = 11;
    const DATA_FORMAT_32_32_32: u32 = 13;
    const DATA_FORMAT_32_32_32_32: u32 = 14;

    /// `nfmt << 4 | dfmt` before GFX10.
    pub const GFX9_FLOAT: [u32; 4] = [
        NUM_FORMAT_FLOAT << 4 | DATA_FORMAT_32,
        NUM_FORMAT_FLOAT << 4 | DATA_FORMAT_32_32,
        NUM_FORMAT_FLOAT << 4 | DATA_FORMAT_32_32_32,
        NUM_FORMAT_FLOAT << 4 | DATA_FORMAT_32_32_32_32,
    ];
    pub const GFX9_HALF: [u32; 3] = [
        NUM_FORMAT_FLOAT << 4 | DATA_FORMAT_16,
        NUM_FORMAT_FLOAT << 4 | DATA_FORMAT_16_16,
        NUM_FORMAT_FLOAT << 4 | DATA_FORMAT_16_16_16_16,
    ];
    pub const GFX9_32_UINT: u32 = NUM_FORMAT_UINT << 4 | DATA_FORMAT_32;

    /// Unified format enum from GFX10.
    pub const GFX10_FLOAT: [u32; 4] = [22, 49, 62, 77];
    pub const GFX10_HALF: [u32; 3] = [13, 29, 71];
    pub const GFX10_32_UINT: u32 = 20;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_tables_follow_generation() {
        let gfx9 = TargetInfo::new(GfxIp::new(9, 0));
        let gfx10 = TargetInfo::new(GfxIp::new(10, 1));
        assert_eq!(gfx9.float_buffer_format(1), BufferFormat(0x74));
        assert_eq!(gfx9.float_buffer_format(4), BufferFormat(0x7e));
        assert_eq!(gfx10.float_buffer_format(2), BufferFormat(49));
        assert_eq!(gfx9.ring_store_format(), BufferFormat(0x44));
        assert_eq!(gfx10.ring_store_format(), BufferFormat(20));
        assert_eq!(gfx9.half_buffer_format(2), BufferFormat(0x75));
        assert_eq!(gfx10.half_buffer_format(4), BufferFormat(71));
    }

    #[test]
    fn underflow_workaround_only_on_early_gfx10() {
        assert!(TargetInfo::new(GfxIp::new(10, 1)).workarounds.tess_factor_buffer_size_limit_ge_utcl1_underflow);
        assert!(!TargetInfo::new(GfxIp::new(10, 3)).workarounds.tess_factor_buffer_size_limit_ge_utcl1_underflow);
        assert!(!TargetInfo::new(GfxIp::new(9, 0)).workarounds.tess_factor_buffer_size_limit_ge_utcl1_underflow);
    }
}
