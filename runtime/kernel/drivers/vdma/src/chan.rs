// Licensed under the Apache-2.0 license

use alloc::collections::VecDeque;
use core::sync::atomic::{AtomicBool, Ordering};
use log::{debug, error, info};
use registers_vdma::bits::{Dmacr, Dmasr, ParkPtr, ALL_IRQ_MASK};
use registers_vdma::regs::{CtrlReg, DescReg, MAX_FRAME_STORES};
use registers_vdma::ChannelRegs;

use crate::config::VdmaConfig;
use crate::cookie::Cookie;
use crate::desc::{DescriptorPool, HwDescriptor};
use crate::error::VdmaError;
use crate::hil::{Direction, DmaStatus, Platform, TxState};
use crate::lock::IrqSafeLock;
use crate::prep::{Segment, TxDescriptor};
use crate::state::{Events, Lifecycle, States};

/// Fixed attributes of a channel, settled at probe time.
pub(crate) struct ChannelParams {
    pub direction: Direction,
    pub match_token: u32,
    pub num_frms: usize,
    pub has_sg: bool,
    pub genlock: bool,
    pub flush_on_fsync: bool,
    pub poll_limit: u32,
    pub pool_slots: usize,
    pub copy_align: u32,
}

/// Mutable channel state, only touched with the state lock held.
pub(crate) struct ChannelInner<'a> {
    pub lifecycle: Lifecycle,
    pub config: VdmaConfig,
    pub pending: VecDeque<TxDescriptor<'a>>,
    pub active: Option<TxDescriptor<'a>>,
    pub done: VecDeque<TxDescriptor<'a>>,
    /// Last cookie handed out.
    pub cookie: Cookie,
    /// Cookie of the last completed transfer.
    pub completed: Cookie,
    /// Why the channel is in the error state.
    pub fault: Option<VdmaError>,
}

/// One direction of a VDMA core.
pub struct Channel<'a> {
    platform: &'a dyn Platform,
    pub(crate) regs: ChannelRegs<'a>,
    pub(crate) params: ChannelParams,
    pub(crate) state: IrqSafeLock<ChannelInner<'a>>,
    pub(crate) pool: IrqSafeLock<DescriptorPool>,
    in_use: AtomicBool,
}

impl<'a> Channel<'a> {
    pub(crate) fn new(platform: &'a dyn Platform, params: ChannelParams) -> Self {
        let regs = match params.direction {
            Direction::MemToDev => ChannelRegs::mm2s(platform.mmio()),
            Direction::DevToMem => ChannelRegs::s2mm(platform.mmio()),
        };
        Channel {
            platform,
            regs,
            params,
            state: IrqSafeLock::new(ChannelInner {
                lifecycle: Lifecycle::new(),
                config: VdmaConfig::default(),
                pending: VecDeque::new(),
                active: None,
                done: VecDeque::new(),
                cookie: Cookie::MIN,
                completed: Cookie::MIN,
                fault: None,
            }),
            pool: IrqSafeLock::new(DescriptorPool::empty()),
            in_use: AtomicBool::new(false),
        }
    }

    pub(crate) fn platform(&self) -> &'a dyn Platform {
        self.platform
    }

    /// Channel id as seen by consumers: 0 for MM2S, 1 for S2MM.
    pub fn id(&self) -> usize {
        self.params.direction.chan_id() as usize
    }

    pub fn direction(&self) -> Direction {
        self.params.direction
    }

    pub fn match_token(&self) -> u32 {
        self.params.match_token
    }

    pub fn num_frms(&self) -> usize {
        self.params.num_frms
    }

    pub fn has_sg(&self) -> bool {
        self.params.has_sg
    }

    pub fn is_genlock_capable(&self) -> bool {
        self.params.genlock
    }

    pub fn flush_on_fsync(&self) -> bool {
        self.params.flush_on_fsync
    }

    pub fn state(&self) -> States {
        self.state.lock(|inner| inner.lifecycle.state())
    }

    /// Reason for the sticky error, if the channel is in the error state.
    pub fn fault(&self) -> Option<VdmaError> {
        self.state.lock(|inner| inner.fault)
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    /// Number of submitted transfers waiting for the hardware.
    pub fn pending_count(&self) -> usize {
        self.state.lock(|inner| inner.pending.len())
    }

    /// Number of finished transfers waiting for the deferred half.
    pub fn done_count(&self) -> usize {
        self.state.lock(|inner| inner.done.len())
    }

    pub fn has_active(&self) -> bool {
        self.state.lock(|inner| inner.active.is_some())
    }

    pub fn free_descriptors(&self) -> usize {
        self.pool.lock(|pool| pool.free_count())
    }

    /// Contents of the hardware descriptor behind `segment`.
    pub fn hw_descriptor(&self, segment: &Segment) -> Option<HwDescriptor> {
        self.pool.lock(|pool| pool.load(segment.slot))
    }

    fn poll(&self, mut done: impl FnMut() -> bool) -> bool {
        (0..self.params.poll_limit).any(|_| done())
    }

    fn requeue_active(inner: &mut ChannelInner<'a>) {
        // The hardware lost the transfer; it goes out again first.
        if let Some(tx) = inner.active.take() {
            inner.pending.push_front(tx);
        }
    }

    pub(crate) fn fail(&self, inner: &mut ChannelInner<'a>, reason: VdmaError) {
        Self::requeue_active(inner);
        inner.fault = Some(reason);
        inner.lifecycle.on(Events::Fault);
    }

    /// Soft reset of the channel. Clears the sticky error and re-arms
    /// interrupts.
    pub fn reset(&self) -> Result<(), VdmaError> {
        self.state.lock(|inner| self.reset_locked(inner))
    }

    pub(crate) fn reset_locked(&self, inner: &mut ChannelInner<'a>) -> Result<(), VdmaError> {
        self.regs.set_bits(CtrlReg::Dmacr, Dmacr::Reset::SET.value);

        if !self.poll(|| !self.regs.dmacr().is_set(Dmacr::Reset)) {
            error!(
                "vdma: chan {} reset timeout, cr {:08x}, sr {:08x}",
                self.id(),
                self.regs.read(CtrlReg::Dmacr),
                self.regs.read(CtrlReg::Dmasr)
            );
            self.fail(inner, VdmaError::Timeout);
            return Err(VdmaError::Timeout);
        }

        Self::requeue_active(inner);
        inner.fault = None;
        inner.lifecycle.on(Events::ResetDone);

        self.regs.set_bits(CtrlReg::Dmacr, ALL_IRQ_MASK);
        Ok(())
    }

    /// Clear RUNSTOP and wait for the core to report halted. A timeout puts
    /// the channel in the error state but is not reported to the caller.
    pub(crate) fn halt_locked(&self, inner: &mut ChannelInner<'a>) {
        self.regs.clr_bits(CtrlReg::Dmacr, Dmacr::RunStop::SET.value);

        if !self.poll(|| self.regs.dmasr().is_set(Dmasr::Halted)) {
            error!(
                "vdma: chan {} cannot stop, sr {:08x}",
                self.id(),
                self.regs.read(CtrlReg::Dmasr)
            );
            self.fail(inner, VdmaError::Timeout);
            return;
        }
        inner.lifecycle.on(Events::Stopped);
    }

    fn start_locked(&self, inner: &mut ChannelInner<'a>) -> Result<(), VdmaError> {
        self.regs.set_bits(CtrlReg::Dmacr, Dmacr::RunStop::SET.value);

        if !self.poll(|| !self.regs.dmasr().is_set(Dmasr::Halted)) {
            error!(
                "vdma: chan {} cannot start, sr {:08x}",
                self.id(),
                self.regs.read(CtrlReg::Dmasr)
            );
            self.fail(inner, VdmaError::Timeout);
            return Err(VdmaError::Timeout);
        }
        inner.lifecycle.on(Events::Started);
        Ok(())
    }

    fn hw_running(&self) -> bool {
        !self.regs.dmasr().is_set(Dmasr::Halted) && self.regs.dmacr().is_set(Dmacr::RunStop)
    }

    fn hw_idle(&self) -> bool {
        self.regs.dmasr().is_set(Dmasr::Idle)
    }

    /// Populate the descriptor pool. A freshly populated pool on an idle
    /// channel also restarts the cookie counters; a channel that already has
    /// resources keeps them untouched.
    ///
    /// Returns the number of descriptors available to the channel.
    pub fn alloc_chan_resources(&self) -> Result<usize, VdmaError> {
        let slots = self.params.pool_slots;
        self.state.lock(|inner| {
            inner.pending.try_reserve(slots).map_err(|_| VdmaError::OutOfMemory)?;
            inner.done.try_reserve(slots).map_err(|_| VdmaError::OutOfMemory)
        })?;
        let (capacity, fresh) = self.pool.lock(|pool| {
            if pool.is_populated() {
                return Ok((pool.capacity(), false));
            }
            let generation = pool.generation().wrapping_add(1);
            *pool = DescriptorPool::new(self.platform, slots)?.with_generation(generation);
            Ok::<_, VdmaError>((pool.capacity(), true))
        })?;
        if fresh {
            self.state.lock(|inner| {
                if inner.pending.is_empty() && inner.active.is_none() && inner.done.is_empty() {
                    inner.cookie = Cookie::MIN;
                    inner.completed = Cookie::MIN;
                }
            });
        }
        Ok(capacity)
    }

    /// Drop every queued transfer and release the descriptor pool. A channel
    /// still running is halted first.
    pub fn free_chan_resources(&self) {
        self.state.lock(|inner| {
            if self.hw_running() {
                self.halt_locked(inner);
            }
            self.free_all_locked(inner);
        });
        self.pool.lock(|pool| pool.destroy(self.platform));
    }

    fn free_all_locked(&self, inner: &mut ChannelInner<'a>) {
        let active = inner.active.take();
        let txs = inner
            .pending
            .drain(..)
            .chain(active)
            .chain(inner.done.drain(..));
        self.pool.lock(|pool| {
            for tx in txs {
                tx.release(pool);
            }
        });
    }

    /// Queue `tx` for the hardware. A channel in the error state is reset
    /// first; if that fails `tx` is released and the error returned.
    ///
    /// A transfer prepared before the channel resources were last freed is
    /// rejected; its descriptors no longer exist.
    pub fn submit(&self, mut tx: TxDescriptor<'a>) -> Result<Cookie, VdmaError> {
        let generation = self.pool.lock(|pool| pool.is_populated().then(|| pool.generation()));
        if generation != Some(tx.generation) {
            error!("vdma: chan {} stale transfer submitted", self.id());
            return Err(VdmaError::InvalidArgument);
        }

        let result = self.state.lock(|inner| {
            if inner.lifecycle.is_errored() {
                if let Err(err) = self.reset_locked(inner) {
                    return Err((err, tx));
                }
            }

            for segment in tx.segments.iter_mut() {
                inner.cookie = inner.cookie.next();
                segment.cookie = inner.cookie;
            }
            tx.cookie = inner.cookie;
            let cookie = tx.cookie;
            inner.pending.push_back(tx);
            Ok(cookie)
        });

        result.map_err(|(err, tx)| {
            self.free_tx_descriptor(tx);
            err
        })
    }

    pub fn issue_pending(&self) {
        self.state.lock(|inner| self.start_transfer(inner));
    }

    /// Program the head of the pending queue into the hardware.
    pub(crate) fn start_transfer(&self, inner: &mut ChannelInner<'a>) {
        if inner.lifecycle.is_errored() || inner.active.is_some() || inner.pending.is_empty() {
            return;
        }

        // A scatter/gather channel only takes a new chain once it has
        // finished walking the previous one.
        if self.params.has_sg && self.hw_running() && !self.hw_idle() {
            debug!("vdma: chan {} busy, start deferred", self.id());
            return;
        }

        let cfg = inner.config;
        let mut dmacr = self.regs.dmacr();
        if cfg.frm_cnt_en {
            dmacr.modify(Dmacr::FrameCntEn::SET);
        } else {
            dmacr.modify(Dmacr::FrameCntEn::CLEAR);
        }
        if self.params.has_sg || !cfg.park {
            dmacr.modify(Dmacr::CircEn::SET);
        } else {
            dmacr.modify(Dmacr::CircEn::CLEAR);
        }
        self.regs.set_dmacr(dmacr);

        if cfg.park && (cfg.park_frm as usize) < self.params.num_frms {
            self.write_park_ptr(cfg.park_frm);
        }

        let Some(tx) = inner.pending.pop_front() else {
            return;
        };

        // Register mode programs the frame stores from the descriptors.
        let mut descs = [HwDescriptor::default(); MAX_FRAME_STORES];
        if !self.params.has_sg {
            let loaded = self.pool.lock(|pool| {
                descs
                    .iter_mut()
                    .zip(tx.segments())
                    .all(|(d, segment)| pool.load(segment.slot).map(|desc| *d = desc).is_some())
            });
            if !loaded {
                error!(
                    "vdma: chan {} descriptors of cookie {} missing",
                    self.id(),
                    tx.cookie().0
                );
                inner.pending.push_front(tx);
                self.fail(inner, VdmaError::InvalidArgument);
                return;
            }
        }

        if self.params.has_sg {
            self.regs.write(CtrlReg::Curdesc, tx.head_phys());
        }

        if self.start_locked(inner).is_err() {
            inner.pending.push_front(tx);
            return;
        }

        self.regs.set_bits(CtrlReg::Dmacr, ALL_IRQ_MASK);

        if self.params.has_sg {
            self.regs.write(CtrlReg::Taildesc, tx.tail_phys());
        } else {
            let n = tx.segments().len();
            for (i, desc) in descs[..n].iter().enumerate() {
                self.regs.desc_write(DescReg::StartAddress(i), desc.buf_addr);
            }
            let last = &descs[n - 1];
            self.regs.desc_write(DescReg::Hsize, last.hsize);
            self.regs.desc_write(DescReg::FrmdlyStride, last.stride);
            // Writing VSIZE kicks off the transfer.
            self.regs.desc_write(DescReg::Vsize, last.vsize);
        }

        debug!("vdma: chan {} started cookie {}", self.id(), tx.cookie().0);
        inner.active = Some(tx);
    }

    pub(crate) fn write_park_ptr(&self, frame: u32) {
        match self.params.direction {
            Direction::MemToDev => self.regs.modify_park_ptr(ParkPtr::ReadRef.val(frame)),
            Direction::DevToMem => self.regs.modify_park_ptr(ParkPtr::WriteRef.val(frame)),
        }
    }

    /// Retire the in-flight transfer.
    pub(crate) fn complete_active(inner: &mut ChannelInner<'a>) {
        if let Some(tx) = inner.active.take() {
            inner.completed = tx.cookie();
            inner.done.push_back(tx);
        }
    }

    pub fn tx_status(&self, cookie: Cookie) -> (DmaStatus, TxState) {
        let (last, used) = self.state.lock(|inner| (inner.completed, inner.cookie));
        (
            cookie.status(last, used),
            TxState {
                last,
                used,
                residue: 0,
            },
        )
    }

    pub fn last_cookie(&self) -> Cookie {
        self.state.lock(|inner| inner.cookie)
    }

    pub fn completed_cookie(&self) -> Cookie {
        self.state.lock(|inner| inner.completed)
    }

    /// Halt the channel and drop every queued transfer without running
    /// callbacks.
    pub fn terminate_all(&self) {
        self.state.lock(|inner| {
            self.halt_locked(inner);
            self.free_all_locked(inner);
        });
        debug!("vdma: chan {} terminated", self.id());
    }

    /// Mask every interrupt source of the channel.
    pub(crate) fn mask_irqs(&self) {
        self.regs.clr_bits(CtrlReg::Dmacr, ALL_IRQ_MASK);
    }

    pub(crate) fn acquire(&self) -> Result<(), VdmaError> {
        if self
            .in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(VdmaError::Busy);
        }
        if let Err(err) = self.alloc_chan_resources() {
            self.in_use.store(false, Ordering::Release);
            return Err(err);
        }
        info!("vdma: chan {} acquired", self.id());
        Ok(())
    }

    pub(crate) fn release(&self) {
        self.free_chan_resources();
        self.in_use.store(false, Ordering::Release);
        info!("vdma: chan {} released", self.id());
    }
}
