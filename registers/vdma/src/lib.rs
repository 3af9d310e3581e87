// Licensed under the Apache-2.0 license

//! Register map of the AMD/Xilinx LogiCORE AXI Video DMA core.
//! Reference: https://docs.amd.com/r/en-US/pg020_axi_vdma
//!
//! All accesses are 32 bits wide and go through an [`Mmio`] window so that
//! the same accessors drive real hardware and the emulator model.

#![cfg_attr(target_os = "none", no_std)]

mod mmio;
pub use mmio::*;

pub mod bits {
    //! Types that represent individual registers (bitfields).
    use tock_registers::register_bitfields;

    register_bitfields! {
        u32,
        pub Dmacr [
            /// Run / stop control.
            RunStop OFFSET(0) NUMBITS(1) [],
            /// Circular (1) or park (0) frame buffer mode.
            CircEn OFFSET(1) NUMBITS(1) [],
            /// Soft reset, self clearing.
            Reset OFFSET(2) NUMBITS(1) [],
            GenlockEn OFFSET(3) NUMBITS(1) [],
            FrameCntEn OFFSET(4) NUMBITS(1) [],
            /// Frame sync source select.
            FsyncSrc OFFSET(5) NUMBITS(2) [],
            /// Genlock master index.
            Master OFFSET(8) NUMBITS(4) [],
            FrmCntIrq OFFSET(12) NUMBITS(1) [],
            DlyCntIrq OFFSET(13) NUMBITS(1) [],
            ErrIrq OFFSET(14) NUMBITS(1) [],
            /// Interrupt coalescing frame count.
            FrameCount OFFSET(16) NUMBITS(8) [],
            /// Inter-packet delay threshold.
            Delay OFFSET(24) NUMBITS(8) [],
        ],
        pub Dmasr [
            Halted OFFSET(0) NUMBITS(1) [],
            Idle OFFSET(1) NUMBITS(1) [],
            DmaIntErr OFFSET(4) NUMBITS(1) [],
            DmaSlaveErr OFFSET(5) NUMBITS(1) [],
            DmaDecErr OFFSET(6) NUMBITS(1) [],
            SofEarlyErr OFFSET(7) NUMBITS(1) [],
            EofEarlyErr OFFSET(8) NUMBITS(1) [],
            SgSlvErr OFFSET(9) NUMBITS(1) [],
            SgDecErr OFFSET(10) NUMBITS(1) [],
            SofLateErr OFFSET(11) NUMBITS(1) [],
            FrmCntIrq OFFSET(12) NUMBITS(1) [],
            DlyCntIrq OFFSET(13) NUMBITS(1) [],
            ErrIrq OFFSET(14) NUMBITS(1) [],
            EolLateErr OFFSET(15) NUMBITS(1) [],
            FrameCount OFFSET(16) NUMBITS(8) [],
            Delay OFFSET(24) NUMBITS(8) [],
        ],
        pub ParkPtr [
            /// Frame store the MM2S channel parks on.
            ReadRef OFFSET(0) NUMBITS(8) [],
            /// Frame store the S2MM channel parks on.
            WriteRef OFFSET(8) NUMBITS(8) [],
        ],
        pub FrmdlyStride [
            Stride OFFSET(0) NUMBITS(16) [],
            FrmDly OFFSET(24) NUMBITS(5) [],
        ],
    }

    /// Every interrupt source, laid out identically in DMACR (enable) and
    /// DMASR (status, write 1 to clear).
    pub const ALL_IRQ_MASK: u32 = (1 << 12) | (1 << 13) | (1 << 14);

    /// Every DMASR error bit.
    pub const ALL_ERR_MASK: u32 = (1 << 4)
        | (1 << 5)
        | (1 << 6)
        | (1 << 7)
        | (1 << 8)
        | (1 << 9)
        | (1 << 10)
        | (1 << 11)
        | (1 << 15);

    /// Frame-sync timing errors the core survives when flush-on-fsync is
    /// enabled. These are the only error bits software may write back.
    pub const ERR_RECOVER_MASK: u32 = (1 << 7) | (1 << 8) | (1 << 11) | (1 << 15);
}

pub mod regs {
    //! Register offsets.

    /// Control block of the memory-to-stream channel.
    pub const MM2S_CTRL_OFFSET: usize = 0x00;
    /// Control block of the stream-to-memory channel.
    pub const S2MM_CTRL_OFFSET: usize = 0x30;
    /// Direct-register descriptor bank of the memory-to-stream channel.
    pub const MM2S_DESC_OFFSET: usize = 0x50;
    /// Direct-register descriptor bank of the stream-to-memory channel.
    pub const S2MM_DESC_OFFSET: usize = 0xa0;

    /// Park pointer, shared by both channels.
    pub const PARK_PTR: usize = 0x28;
    /// Core version, read only.
    pub const VERSION: usize = 0x2c;

    /// Number of frame store address registers per channel.
    pub const MAX_FRAME_STORES: usize = 16;

    /// Control block registers, relative to the channel control offset.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum CtrlReg {
        Dmacr = 0x00,
        Dmasr = 0x04,
        Curdesc = 0x08,
        Taildesc = 0x10,
    }

    /// Descriptor bank registers, relative to the channel descriptor offset.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum DescReg {
        /// Writing VSIZE starts the transfer in direct-register mode.
        Vsize,
        Hsize,
        FrmdlyStride,
        StartAddress(usize),
    }

    impl DescReg {
        pub const fn offset(self) -> usize {
            match self {
                DescReg::Vsize => 0x00,
                DescReg::Hsize => 0x04,
                DescReg::FrmdlyStride => 0x08,
                DescReg::StartAddress(n) => 0x0c + 4 * n,
            }
        }
    }

    /// Size of the whole register window.
    pub const VDMA_REGS_SIZE: usize = S2MM_DESC_OFFSET + DescReg::StartAddress(MAX_FRAME_STORES).offset();
}
