// Licensed under the Apache-2.0 license

use crate::bits::{Dmacr, Dmasr, ParkPtr};
use crate::regs::*;
use core::ptr::NonNull;
use tock_registers::fields::FieldValue;
use tock_registers::LocalRegisterCopy;

/// A 32-bit little-endian register window.
///
/// `offset` is a byte offset from the start of the window and is always a
/// multiple of 4.
pub trait Mmio: Sync {
    fn read32(&self, offset: usize) -> u32;
    fn write32(&self, offset: usize, value: u32);
}

/// Mapped register window of a real VDMA instance.
pub struct MmioWindow {
    base: NonNull<u32>,
    size: usize,
}

// Register accesses are single volatile word operations.
unsafe impl Send for MmioWindow {}
unsafe impl Sync for MmioWindow {}

impl MmioWindow {
    /// # Safety
    ///
    /// `base` must point at a device mapping of at least `size` bytes that
    /// stays mapped for the lifetime of the window.
    pub const unsafe fn new(base: NonNull<u32>, size: usize) -> Self {
        Self { base, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Mmio for MmioWindow {
    fn read32(&self, offset: usize) -> u32 {
        debug_assert!(offset + 4 <= self.size && offset % 4 == 0);
        unsafe { core::ptr::read_volatile(self.base.as_ptr().add(offset / 4)) }
    }

    fn write32(&self, offset: usize, value: u32) {
        debug_assert!(offset + 4 <= self.size && offset % 4 == 0);
        unsafe { core::ptr::write_volatile(self.base.as_ptr().add(offset / 4), value) }
    }
}

pub type DmacrValue = LocalRegisterCopy<u32, Dmacr::Register>;
pub type DmasrValue = LocalRegisterCopy<u32, Dmasr::Register>;
pub type ParkPtrValue = LocalRegisterCopy<u32, ParkPtr::Register>;

/// Register banks of one channel.
#[derive(Clone, Copy)]
pub struct ChannelRegs<'a> {
    mmio: &'a dyn Mmio,
    ctrl_offset: usize,
    desc_offset: usize,
}

impl<'a> ChannelRegs<'a> {
    pub fn mm2s(mmio: &'a dyn Mmio) -> Self {
        Self {
            mmio,
            ctrl_offset: MM2S_CTRL_OFFSET,
            desc_offset: MM2S_DESC_OFFSET,
        }
    }

    pub fn s2mm(mmio: &'a dyn Mmio) -> Self {
        Self {
            mmio,
            ctrl_offset: S2MM_CTRL_OFFSET,
            desc_offset: S2MM_DESC_OFFSET,
        }
    }

    pub fn ctrl_offset(&self) -> usize {
        self.ctrl_offset
    }

    pub fn desc_offset(&self) -> usize {
        self.desc_offset
    }

    pub fn read(&self, reg: CtrlReg) -> u32 {
        self.mmio.read32(self.ctrl_offset + reg as usize)
    }

    pub fn write(&self, reg: CtrlReg, value: u32) {
        self.mmio.write32(self.ctrl_offset + reg as usize, value)
    }

    pub fn set_bits(&self, reg: CtrlReg, mask: u32) {
        self.write(reg, self.read(reg) | mask);
    }

    pub fn clr_bits(&self, reg: CtrlReg, mask: u32) {
        self.write(reg, self.read(reg) & !mask);
    }

    pub fn dmacr(&self) -> DmacrValue {
        LocalRegisterCopy::new(self.read(CtrlReg::Dmacr))
    }

    pub fn set_dmacr(&self, value: DmacrValue) {
        self.write(CtrlReg::Dmacr, value.get());
    }

    pub fn modify_dmacr(&self, field: FieldValue<u32, Dmacr::Register>) {
        let mut dmacr = self.dmacr();
        dmacr.modify(field);
        self.set_dmacr(dmacr);
    }

    pub fn dmasr(&self) -> DmasrValue {
        LocalRegisterCopy::new(self.read(CtrlReg::Dmasr))
    }

    /// DMASR interrupt and error bits are write-1-to-clear.
    pub fn ack_dmasr(&self, mask: u32) {
        self.write(CtrlReg::Dmasr, mask);
    }

    pub fn desc_write(&self, reg: DescReg, value: u32) {
        self.mmio.write32(self.desc_offset + reg.offset(), value)
    }

    pub fn desc_read(&self, reg: DescReg) -> u32 {
        self.mmio.read32(self.desc_offset + reg.offset())
    }

    pub fn park_ptr(&self) -> ParkPtrValue {
        LocalRegisterCopy::new(self.mmio.read32(PARK_PTR))
    }

    pub fn modify_park_ptr(&self, field: FieldValue<u32, ParkPtr::Register>) {
        let mut park = self.park_ptr();
        park.modify(field);
        self.mmio.write32(PARK_PTR, park.get());
    }

    pub fn version(&self) -> u32 {
        self.mmio.read32(VERSION)
    }
}
