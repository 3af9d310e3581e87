// Licensed under the Apache-2.0 license.

//! HIL Interface for the AXI VDMA engine.
//!
//! The driver never touches the system directly. Register traffic, DMA
//! coherent memory and deferred work all go through a [`Platform`].

use core::ptr::NonNull;
use registers_vdma::Mmio;

use crate::cookie::Cookie;

/// Services a VDMA instance needs from the system it runs on.
pub trait Platform: Sync {
    /// Register window of the device.
    fn mmio(&self) -> &dyn Mmio;

    /// Allocate `size` bytes of zeroed, DMA-coherent memory aligned to
    /// `align` bytes.
    fn alloc_coherent(&self, size: usize, align: usize) -> Option<CoherentRegion>;

    /// Return a region obtained from [`Platform::alloc_coherent`].
    fn free_coherent(&self, region: CoherentRegion);

    /// Ask for [`crate::Vdma::process_completed`] to be run for channel
    /// `chan_id` outside of interrupt context.
    fn schedule_deferred(&self, chan_id: usize);
}

/// A block of memory visible to both the CPU and the DMA engine.
#[derive(Debug)]
pub struct CoherentRegion {
    pub virt: NonNull<u8>,
    pub phys: u64,
    pub size: usize,
}

// The region is plain memory owned by whoever holds the value.
unsafe impl Send for CoherentRegion {}
unsafe impl Sync for CoherentRegion {}

/// Direction of a channel, named after the dmaengine transfer directions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub enum Direction {
    /// Memory to stream (MM2S).
    #[cfg_attr(feature = "serde", serde(rename = "mm2s"))]
    MemToDev,
    /// Stream to memory (S2MM).
    #[cfg_attr(feature = "serde", serde(rename = "s2mm"))]
    DevToMem,
}

impl Direction {
    /// Channel id used by consumers to select the channel.
    pub const fn chan_id(self) -> u32 {
        match self {
            Direction::MemToDev => 0,
            Direction::DevToMem => 1,
        }
    }

    /// dmaengine encoding of the direction.
    pub const fn dmaengine_value(self) -> u32 {
        match self {
            Direction::MemToDev => 1,
            Direction::DevToMem => 2,
        }
    }
}

/// Completion state of a cookie.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DmaStatus {
    InProgress,
    Complete,
}

/// Snapshot of the cookie counters of a channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TxState {
    pub last: Cookie,
    pub used: Cookie,
    pub residue: u32,
}

/// Result of running the hard interrupt half.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IrqReturn {
    /// No enabled status bit was set; the interrupt belongs to someone else.
    NotMine,
    Handled,
}

/// A client receiving completion notifications.
///
/// Callbacks run from the deferred half with no channel lock held, so they
/// may submit new transfers on the same channel.
pub trait TransferClient: Sync {
    /// Called once per completed transfer, in submission order.
    fn transfer_done(&self, cookie: Cookie, param: usize);

    /// Called right after [`TransferClient::transfer_done`] to release
    /// transfers that were waiting on this one.
    fn dependencies_ready(&self, _cookie: Cookie) {}
}
