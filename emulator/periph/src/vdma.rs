// Licensed under the Apache-2.0 license

// Behavioural model of the AMD LogiCORE IP AXI Video DMA core at register
// level. Frames do not move any pixel data; the test drives frame timing
// through `complete_frame` and faults through `inject_error`.

use std::sync::{Arc, Mutex};

use registers_vdma::bits::{
    Dmacr, Dmasr, ParkPtr, ALL_ERR_MASK, ALL_IRQ_MASK, ERR_RECOVER_MASK,
};
use registers_vdma::regs::*;
use registers_vdma::Mmio;
use tock_registers::LocalRegisterCopy;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::DmaRam;

const CHANNELS: usize = 2;
const CURDESC_MSB: usize = 0x0c;
const TAILDESC_MSB: usize = 0x14;

/// Reads of DMACR that still return RESET after a reset request.
const RESET_LATENCY: u32 = 2;

/// Reported by the VERSION register.
pub const VDMA_VERSION: u32 = 0x0620_0000;

/// Scatter/gather descriptor fields the core fetches.
#[derive(FromBytes, Immutable, KnownLayout, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct FetchedDescriptor {
    pub next_desc: u32,
    pub next_desc_msb: u32,
    pub buf_addr: u32,
    pub buf_addr_msb: u32,
    pub vsize: u32,
    pub hsize: u32,
    pub stride: u32,
}

/// Handshakes that never complete, for timeout testing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stall {
    /// RESET never self-clears.
    pub reset: bool,
    /// HALTED never sets after RUNSTOP is cleared.
    pub halt: bool,
    /// HALTED never clears after RUNSTOP is set.
    pub start: bool,
}

struct ChannelModel {
    dmacr: LocalRegisterCopy<u32, Dmacr::Register>,
    dmasr: LocalRegisterCopy<u32, Dmasr::Register>,
    curdesc: u32,
    taildesc: u32,
    vsize: u32,
    hsize: u32,
    frmdly_stride: u32,
    start_address: [u32; MAX_FRAME_STORES],

    reset_reads_left: u32,
    reset_high_reads: u32,
    resets: u32,
    stall: Stall,

    // Frames of the running transfer: fetched descriptors in SG mode,
    // frame store addresses in register mode.
    frames: Vec<u32>,
    next_frame: usize,
    frames_since_irq: u32,
    busy: bool,
    ring: Vec<FetchedDescriptor>,
    completed: Vec<u32>,
}

impl ChannelModel {
    fn new() -> Self {
        Self {
            dmacr: LocalRegisterCopy::new(0),
            dmasr: LocalRegisterCopy::new(0),
            curdesc: 0,
            taildesc: 0,
            vsize: 0,
            hsize: 0,
            frmdly_stride: 0,
            start_address: [0; MAX_FRAME_STORES],
            reset_reads_left: 0,
            reset_high_reads: 0,
            resets: 0,
            stall: Stall::default(),
            frames: Vec::new(),
            next_frame: 0,
            frames_since_irq: 0,
            busy: false,
            ring: Vec::new(),
            completed: Vec::new(),
        }
        .power_on()
    }

    fn power_on(mut self) -> Self {
        self.soft_reset();
        self
    }

    fn soft_reset(&mut self) {
        self.dmacr.set(0);
        self.dmacr.modify(Dmacr::FrameCount.val(1));
        self.dmasr.set(0);
        self.dmasr.modify(Dmasr::Halted::SET);
        self.curdesc = 0;
        self.taildesc = 0;
        self.vsize = 0;
        self.hsize = 0;
        self.frmdly_stride = 0;
        self.start_address = [0; MAX_FRAME_STORES];
        self.stop();
    }

    fn stop(&mut self) {
        self.busy = false;
        self.frames.clear();
        self.next_frame = 0;
        self.frames_since_irq = 0;
    }

    fn running(&self) -> bool {
        self.dmacr.is_set(Dmacr::RunStop) && !self.dmasr.is_set(Dmasr::Halted)
    }

    fn irq_asserted(&self) -> bool {
        self.dmasr.get() & self.dmacr.get() & ALL_IRQ_MASK != 0
    }

    fn halt_on_error(&mut self) {
        self.dmacr.modify(Dmacr::RunStop::CLEAR);
        self.dmasr.modify(Dmasr::Halted::SET + Dmasr::Idle::CLEAR);
        self.stop();
    }

    fn raise_error(&mut self, bits: u32) {
        self.dmasr.set(self.dmasr.get() | (bits & ALL_ERR_MASK));
        self.dmasr.modify(Dmasr::ErrIrq::SET);
        if bits & !ERR_RECOVER_MASK != 0 {
            self.halt_on_error();
        }
    }

    fn read_dmacr(&mut self) -> u32 {
        if self.reset_reads_left > 0 {
            self.reset_high_reads += 1;
            if !self.stall.reset {
                self.reset_reads_left -= 1;
            }
            return self.dmacr.get() | Dmacr::Reset::SET.value;
        }
        self.dmacr.get()
    }

    fn write_dmacr(&mut self, value: u32) {
        let val: LocalRegisterCopy<u32, Dmacr::Register> = LocalRegisterCopy::new(value);
        if val.is_set(Dmacr::Reset) {
            self.soft_reset();
            self.resets += 1;
            self.reset_reads_left = RESET_LATENCY;
            return;
        }

        let was_running = self.dmacr.is_set(Dmacr::RunStop);
        self.dmacr.set(value);
        let run = val.is_set(Dmacr::RunStop);

        if run && !was_running && !self.stall.start {
            // The core refuses to leave halt with a fatal error latched.
            if self.dmasr.get() & ALL_ERR_MASK & !ERR_RECOVER_MASK == 0 {
                self.dmasr.modify(Dmasr::Halted::CLEAR + Dmasr::Idle::SET);
            }
        } else if !run && was_running {
            self.stop();
            if !self.stall.halt {
                self.dmasr.modify(Dmasr::Halted::SET + Dmasr::Idle::CLEAR);
            }
        }
    }

    fn write_dmasr(&mut self, value: u32) {
        let w1c = value & (ALL_IRQ_MASK | ERR_RECOVER_MASK);
        self.dmasr.set(self.dmasr.get() & !w1c);
    }

    fn fetch_ring(&mut self, ram: &DmaRam) {
        if !self.running() {
            return;
        }
        self.ring.clear();
        let mut addr = self.curdesc;
        for _ in 0..=MAX_FRAME_STORES {
            let mut raw = [0u8; core::mem::size_of::<FetchedDescriptor>()];
            let desc = ram
                .read(addr as u64, &mut raw)
                .and_then(|_| FetchedDescriptor::read_from_bytes(&raw).ok());
            let Some(desc) = desc else {
                self.raise_error(Dmasr::SgDecErr::SET.value);
                return;
            };
            self.ring.push(desc);
            if addr == self.taildesc {
                break;
            }
            addr = desc.next_desc;
        }
        if self.ring.len() > MAX_FRAME_STORES {
            self.raise_error(Dmasr::SgDecErr::SET.value);
            return;
        }
        self.frames = self.ring.iter().map(|d| d.buf_addr).collect();
        self.start_frames();
    }

    fn start_frames(&mut self) {
        self.next_frame = 0;
        self.frames_since_irq = 0;
        self.busy = true;
        self.dmasr.modify(Dmasr::Idle::CLEAR);
    }

    fn complete_frame(&mut self, sg: bool, park_ref: u32) -> Option<u32> {
        if !self.busy || !self.running() || self.frames.is_empty() {
            return None;
        }
        let index = if !sg && !self.dmacr.is_set(Dmacr::CircEn) {
            park_ref as usize % self.frames.len()
        } else {
            self.next_frame
        };
        let addr = self.frames[index];
        self.completed.push(addr);
        self.next_frame = (self.next_frame + 1) % self.frames.len();

        self.frames_since_irq += 1;
        let threshold = self.dmacr.read(Dmacr::FrameCount).max(1);
        if self.frames_since_irq >= threshold {
            self.frames_since_irq = 0;
            self.dmasr.modify(Dmasr::FrmCntIrq::SET);
        }

        // A scatter/gather channel goes idle once it retires the tail.
        if sg && self.next_frame == 0 {
            self.busy = false;
            self.dmasr.modify(Dmasr::Idle::SET);
        }
        Some(addr)
    }
}

struct Inner {
    chans: [ChannelModel; CHANNELS],
    park_ptr: LocalRegisterCopy<u32, ParkPtr::Register>,
}

/// Register-level model of a two channel VDMA instance.
pub struct EmulatedVdma {
    inner: Mutex<Inner>,
    ram: Arc<DmaRam>,
    has_sg: bool,
    num_fstores: usize,
}

impl EmulatedVdma {
    pub fn new(ram: Arc<DmaRam>, has_sg: bool, num_fstores: usize) -> Self {
        assert!((1..=MAX_FRAME_STORES).contains(&num_fstores));
        Self {
            inner: Mutex::new(Inner {
                chans: [ChannelModel::new(), ChannelModel::new()],
                park_ptr: LocalRegisterCopy::new(0),
            }),
            ram,
            has_sg,
            num_fstores,
        }
    }

    pub fn ram(&self) -> &Arc<DmaRam> {
        &self.ram
    }

    /// Retire one frame on `chan`. Returns the frame buffer address, or
    /// `None` if the channel is not moving data.
    pub fn complete_frame(&self, chan: usize) -> Option<u32> {
        let mut inner = self.inner.lock().unwrap();
        let park_ref = match chan {
            0 => inner.park_ptr.read(ParkPtr::ReadRef),
            _ => inner.park_ptr.read(ParkPtr::WriteRef),
        };
        inner.chans[chan].complete_frame(self.has_sg, park_ref)
    }

    /// Latch `bits` into DMASR and raise the error interrupt. Errors outside
    /// the frame sync class halt the channel.
    pub fn inject_error(&self, chan: usize, bits: u32) {
        self.inner.lock().unwrap().chans[chan].raise_error(bits);
    }

    /// Level of the interrupt line of `chan`.
    pub fn irq_pending(&self, chan: usize) -> bool {
        self.inner.lock().unwrap().chans[chan].irq_asserted()
    }

    pub fn set_stall(&self, chan: usize, stall: Stall) {
        let mut inner = self.inner.lock().unwrap();
        let model = &mut inner.chans[chan];
        model.stall = stall;
        // Releasing a stalled handshake lets it complete.
        if !stall.halt && !model.dmacr.is_set(Dmacr::RunStop) {
            model.dmasr.modify(Dmasr::Halted::SET);
        }
    }

    /// Number of soft resets requested on `chan`.
    pub fn resets(&self, chan: usize) -> u32 {
        self.inner.lock().unwrap().chans[chan].resets
    }

    /// Number of DMACR reads that returned RESET set.
    pub fn reset_high_reads(&self, chan: usize) -> u32 {
        self.inner.lock().unwrap().chans[chan].reset_high_reads
    }

    /// Frame buffer addresses retired so far, oldest first.
    pub fn completed_frames(&self, chan: usize) -> Vec<u32> {
        self.inner.lock().unwrap().chans[chan].completed.clone()
    }

    /// Descriptors fetched by the last scatter/gather start.
    pub fn fetched_ring(&self, chan: usize) -> Vec<FetchedDescriptor> {
        self.inner.lock().unwrap().chans[chan].ring.clone()
    }

    pub fn is_busy(&self, chan: usize) -> bool {
        self.inner.lock().unwrap().chans[chan].busy
    }

    /// Register mode geometry last programmed on `chan`: (vsize, hsize,
    /// frmdly_stride).
    pub fn geometry(&self, chan: usize) -> (u32, u32, u32) {
        let inner = self.inner.lock().unwrap();
        let c = &inner.chans[chan];
        (c.vsize, c.hsize, c.frmdly_stride)
    }

    fn decode_ctrl(offset: usize) -> Option<(usize, usize)> {
        match offset {
            MM2S_CTRL_OFFSET..=0x1c => Some((0, offset - MM2S_CTRL_OFFSET)),
            S2MM_CTRL_OFFSET..=0x4c => Some((1, offset - S2MM_CTRL_OFFSET)),
            _ => None,
        }
    }

    fn decode_desc(offset: usize) -> Option<(usize, usize)> {
        let bank = DescReg::StartAddress(MAX_FRAME_STORES).offset();
        if (MM2S_DESC_OFFSET..MM2S_DESC_OFFSET + bank).contains(&offset) {
            Some((0, offset - MM2S_DESC_OFFSET))
        } else if (S2MM_DESC_OFFSET..S2MM_DESC_OFFSET + bank).contains(&offset) {
            Some((1, offset - S2MM_DESC_OFFSET))
        } else {
            None
        }
    }
}

impl Mmio for EmulatedVdma {
    fn read32(&self, offset: usize) -> u32 {
        let mut inner = self.inner.lock().unwrap();
        if offset == PARK_PTR {
            return inner.park_ptr.get();
        }
        if offset == VERSION {
            return VDMA_VERSION;
        }
        if let Some((chan, reg)) = Self::decode_ctrl(offset) {
            let c = &mut inner.chans[chan];
            return match reg {
                0x00 => c.read_dmacr(),
                0x04 => c.dmasr.get(),
                0x08 => c.curdesc,
                0x10 => c.taildesc,
                CURDESC_MSB | TAILDESC_MSB => 0,
                _ => 0,
            };
        }
        if let Some((chan, reg)) = Self::decode_desc(offset) {
            let c = &inner.chans[chan];
            return match reg {
                0x00 => c.vsize,
                0x04 => c.hsize,
                0x08 => c.frmdly_stride,
                _ => c.start_address[(reg - DescReg::StartAddress(0).offset()) / 4],
            };
        }
        0
    }

    fn write32(&self, offset: usize, value: u32) {
        let mut inner = self.inner.lock().unwrap();
        if offset == PARK_PTR {
            inner.park_ptr.set(value);
            return;
        }
        if let Some((chan, reg)) = Self::decode_ctrl(offset) {
            let c = &mut inner.chans[chan];
            match reg {
                0x00 => c.write_dmacr(value),
                0x04 => c.write_dmasr(value),
                0x08 => c.curdesc = value,
                0x10 => {
                    c.taildesc = value;
                    if self.has_sg {
                        c.fetch_ring(&self.ram);
                    }
                }
                _ => {}
            }
            return;
        }
        if let Some((chan, reg)) = Self::decode_desc(offset) {
            let c = &mut inner.chans[chan];
            match reg {
                0x00 => {
                    c.vsize = value;
                    if !self.has_sg && c.running() {
                        c.frames = c.start_address[..self.num_fstores].to_vec();
                        c.start_frames();
                    }
                }
                0x04 => c.hsize = value,
                0x08 => c.frmdly_stride = value,
                _ => c.start_address[(reg - DescReg::StartAddress(0).offset()) / 4] = value,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const DMACR: usize = 0x00;
    const DMASR: usize = 0x04;

    fn setup(has_sg: bool) -> EmulatedVdma {
        let ram = Arc::new(DmaRam::new(0x8000_0000, 0x1_0000));
        EmulatedVdma::new(ram, has_sg, 3)
    }

    #[test]
    fn test_reset_self_clears() {
        let vdma = setup(true);
        vdma.write32(DMACR, Dmacr::Reset::SET.value);
        assert!(vdma.read32(DMACR) & Dmacr::Reset::SET.value != 0);
        assert!(vdma.read32(DMACR) & Dmacr::Reset::SET.value != 0);
        assert_eq!(vdma.read32(DMACR) & Dmacr::Reset::SET.value, 0);
        assert_eq!(vdma.resets(0), 1);
        assert_eq!(vdma.reset_high_reads(0), 2);
        assert_eq!(vdma.read32(DMASR), Dmasr::Halted::SET.value);
    }

    #[test]
    fn test_run_stop_handshake() {
        let vdma = setup(true);
        vdma.write32(S2MM_CTRL_OFFSET + DMACR, Dmacr::RunStop::SET.value);
        let sr = vdma.read32(S2MM_CTRL_OFFSET + DMASR);
        assert_eq!(sr & Dmasr::Halted::SET.value, 0);
        // MM2S is untouched.
        assert_ne!(vdma.read32(DMASR) & Dmasr::Halted::SET.value, 0);

        vdma.write32(S2MM_CTRL_OFFSET + DMACR, 0);
        assert_ne!(vdma.read32(S2MM_CTRL_OFFSET + DMASR) & Dmasr::Halted::SET.value, 0);
    }

    #[test]
    fn test_status_write_one_to_clear() {
        let vdma = setup(true);
        vdma.write32(DMACR, Dmacr::RunStop::SET.value | ALL_IRQ_MASK);
        vdma.inject_error(0, Dmasr::SofEarlyErr::SET.value);
        assert!(vdma.irq_pending(0));

        // Recoverable errors do not halt and clear on write.
        let sr = vdma.read32(DMASR);
        assert_eq!(sr & Dmasr::Halted::SET.value, 0);
        vdma.write32(DMASR, sr);
        assert!(!vdma.irq_pending(0));
        assert_eq!(vdma.read32(DMASR) & ALL_ERR_MASK, 0);

        // Fatal errors stick until reset.
        vdma.inject_error(0, Dmasr::DmaDecErr::SET.value);
        let sr = vdma.read32(DMASR);
        assert_ne!(sr & Dmasr::Halted::SET.value, 0);
        vdma.write32(DMASR, sr);
        assert_ne!(vdma.read32(DMASR) & Dmasr::DmaDecErr::SET.value, 0);
        vdma.write32(DMACR, Dmacr::Reset::SET.value);
        assert_eq!(vdma.read32(DMASR) & ALL_ERR_MASK, 0);
    }

    #[test]
    fn test_sg_ring_walk() {
        let vdma = setup(true);
        let ram = vdma.ram().clone();
        let (_, base) = ram.alloc(3 * 64, 64).unwrap();
        for i in 0..3u64 {
            let desc = base + i * 64;
            ram.write_u32(desc, (base + ((i + 1) % 3) * 64) as u32);
            ram.write_u32(desc + 8, 0x1000_0000 + i as u32 * 0x10_0000);
        }

        vdma.write32(0x08, base as u32);
        vdma.write32(DMACR, Dmacr::RunStop::SET.value | Dmacr::FrmCntIrq::SET.value);
        vdma.write32(0x10, (base + 2 * 64) as u32);
        assert_eq!(vdma.read32(DMASR) & Dmasr::Idle::SET.value, 0);
        assert_eq!(vdma.fetched_ring(0).len(), 3);

        assert_eq!(vdma.complete_frame(0), Some(0x1000_0000));
        assert!(vdma.irq_pending(0));
        assert_eq!(vdma.complete_frame(0), Some(0x1010_0000));
        assert_eq!(vdma.complete_frame(0), Some(0x1020_0000));
        assert_ne!(vdma.read32(DMASR) & Dmasr::Idle::SET.value, 0);
        assert_eq!(vdma.complete_frame(0), None);
    }

    #[test]
    fn test_park_register_mode() {
        let vdma = setup(false);
        vdma.write32(DMACR, Dmacr::RunStop::SET.value);
        for i in 0..3 {
            vdma.write32(MM2S_DESC_OFFSET + DescReg::StartAddress(i).offset(), 0x100 * (i as u32 + 1));
        }
        vdma.write32(PARK_PTR, ParkPtr::ReadRef.val(1).value);
        vdma.write32(MM2S_DESC_OFFSET + DescReg::Vsize.offset(), 720);
        assert_eq!(vdma.complete_frame(0), Some(0x200));
        assert_eq!(vdma.complete_frame(0), Some(0x200));
    }
}
