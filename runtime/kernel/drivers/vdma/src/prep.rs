// Licensed under the Apache-2.0 license

use arrayvec::ArrayVec;
use log::{debug, error};
use registers_vdma::bits::FrmdlyStride;
use registers_vdma::regs::MAX_FRAME_STORES;
use tock_registers::LocalRegisterCopy;

use crate::chan::Channel;
use crate::cookie::Cookie;
use crate::desc::{DescriptorPool, HwDescriptor};
use crate::error::VdmaError;
use crate::hil::{Direction, TransferClient};

/// One frame buffer of a transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScatterEntry {
    pub dma_address: u64,
    pub length: u32,
}

/// One frame of a transfer, backed by a hardware descriptor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Descriptor pool slot.
    pub slot: u16,
    /// Bus address of the hardware descriptor.
    pub phys: u32,
    pub cookie: Cookie,
}

/// A prepared transfer: one segment per frame store, linked into a closed
/// ring.
///
/// A descriptor that is never submitted must be handed back with
/// [`Channel::free_tx_descriptor`].
#[must_use]
pub struct TxDescriptor<'a> {
    pub(crate) segments: ArrayVec<Segment, MAX_FRAME_STORES>,
    pub(crate) cookie: Cookie,
    /// Pool generation the segments were allocated from.
    pub(crate) generation: u32,
    callback: Option<(&'a dyn TransferClient, usize)>,
}

impl<'a> TxDescriptor<'a> {
    pub(crate) fn new() -> Self {
        Self {
            segments: ArrayVec::new(),
            cookie: Cookie::UNASSIGNED,
            generation: 0,
            callback: None,
        }
    }

    /// Cookie of the last segment, or [`Cookie::UNASSIGNED`] before submit.
    pub fn cookie(&self) -> Cookie {
        self.cookie
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Run `client` with `param` once the transfer completes.
    pub fn set_callback(&mut self, client: &'a dyn TransferClient, param: usize) {
        self.callback = Some((client, param));
    }

    pub(crate) fn callback(&self) -> Option<(&'a dyn TransferClient, usize)> {
        self.callback
    }

    pub(crate) fn head_phys(&self) -> u32 {
        self.segments.first().map_or(0, |s| s.phys)
    }

    pub(crate) fn tail_phys(&self) -> u32 {
        self.segments.last().map_or(0, |s| s.phys)
    }

    pub(crate) fn release(self, pool: &mut DescriptorPool) {
        if self.generation != pool.generation() {
            error!(
                "vdma: transfer from descriptor pool generation {} released into generation {}",
                self.generation,
                pool.generation()
            );
            return;
        }
        for segment in &self.segments {
            pool.free(segment.slot);
        }
    }
}

impl<'a> Channel<'a> {
    /// Build a transfer with one frame per entry of `sgl`.
    ///
    /// The number of entries must match the number of frame stores. Every
    /// buffer must be reachable with 32 address bits and respect the copy
    /// alignment of the device.
    ///
    /// The transfer holds its descriptor slots until it is submitted or
    /// handed to [`Channel::free_tx_descriptor`]. Dropping it instead keeps
    /// the slots out of the pool until [`Channel::free_chan_resources`].
    pub fn prep_slave_sg(
        &self,
        sgl: &[ScatterEntry],
        direction: Direction,
    ) -> Result<TxDescriptor<'a>, VdmaError> {
        if direction != self.params.direction {
            error!(
                "vdma: chan {} cannot do {:?} transfers",
                self.id(),
                direction
            );
            return Err(VdmaError::InvalidArgument);
        }
        if sgl.len() != self.params.num_frms {
            error!(
                "vdma: {} frames given, channel has {} frame stores",
                sgl.len(),
                self.params.num_frms
            );
            return Err(VdmaError::InvalidArgument);
        }
        let align_mask = (1u64 << self.params.copy_align) - 1;
        if let Some(bad) = sgl
            .iter()
            .find(|e| e.dma_address > u32::MAX as u64 || e.dma_address & align_mask != 0)
        {
            error!("vdma: frame buffer {:#x} not usable", bad.dma_address);
            return Err(VdmaError::InvalidArgument);
        }

        let cfg = self.state.lock(|inner| inner.config);
        let mut stride = LocalRegisterCopy::<u32, FrmdlyStride::Register>::new(0);
        stride.modify(FrmdlyStride::Stride.val(cfg.stride as u32) + FrmdlyStride::FrmDly.val(cfg.frm_dly));

        self.pool.lock(|pool| {
            let mut tx = TxDescriptor::new();
            tx.generation = pool.generation();
            for entry in sgl {
                let slot = match pool.alloc() {
                    Ok(slot) => slot,
                    Err(err) => {
                        error!("vdma: chan {} out of descriptors", self.id());
                        tx.release(pool);
                        return Err(err);
                    }
                };
                pool.store(
                    slot.index,
                    &HwDescriptor {
                        buf_addr: entry.dma_address as u32,
                        vsize: cfg.vsize as u32,
                        hsize: cfg.hsize as u32,
                        stride: stride.get(),
                        ..Default::default()
                    },
                );
                tx.segments.push(Segment {
                    slot: slot.index,
                    phys: slot.phys,
                    cookie: Cookie::UNASSIGNED,
                });
            }

            // Close the ring: the core follows next_desc back to the head.
            let n = tx.segments.len();
            for i in 0..n {
                let next = tx.segments[(i + 1) % n].phys;
                let index = tx.segments[i].slot;
                if let Some(mut desc) = pool.load(index) {
                    desc.next_desc = next;
                    pool.store(index, &desc);
                }
            }
            debug!(
                "vdma: chan {} prepared {} frames, head {:#x}",
                self.id(),
                n,
                tx.head_phys()
            );
            Ok(tx)
        })
    }

    /// Return every segment of an unsubmitted transfer to the pool.
    pub fn free_tx_descriptor(&self, tx: TxDescriptor<'a>) {
        self.pool.lock(|pool| tx.release(pool));
    }
}
