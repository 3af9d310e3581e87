// Licensed under the Apache-2.0 license

use alloc::vec::Vec;
use core::ops::Deref;
use log::{debug, warn};

use crate::chan::Channel;
use crate::device::Vdma;
use crate::error::VdmaError;

/// A consumer's reference to a channel: the provider node plus the
/// specifier cells.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DmaRequest<'r> {
    pub node: u32,
    pub args: &'r [u32],
}

/// Registry of probed VDMA instances that consumers request channels from.
pub struct ChannelProvider<'p, 'a> {
    devices: Vec<&'p Vdma<'a>>,
}

impl Default for ChannelProvider<'_, '_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'p, 'a> ChannelProvider<'p, 'a> {
    pub const fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    pub fn register(&mut self, vdma: &'p Vdma<'a>) -> Result<(), VdmaError> {
        if self.devices.iter().any(|d| d.node() == vdma.node()) {
            warn!("vdma: node {} registered twice", vdma.node());
            return Err(VdmaError::Busy);
        }
        self.devices.push(vdma);
        Ok(())
    }

    pub fn unregister(&mut self, node: u32) -> Option<&'p Vdma<'a>> {
        let pos = self.devices.iter().position(|d| d.node() == node)?;
        Some(self.devices.remove(pos))
    }

    /// Every channel of every registered device.
    pub fn channels(&self) -> impl Iterator<Item = &'p Channel<'a>> + '_ {
        self.devices.iter().copied().flat_map(|d| d.channels())
    }

    /// Acquire the channel a consumer specifier points at.
    pub fn request_channel(&self, req: &DmaRequest) -> Result<ChannelHandle<'p, 'a>, VdmaError> {
        if req.args.len() != 1 {
            return Err(VdmaError::InvalidArgument);
        }
        let vdma = self
            .devices
            .iter()
            .copied()
            .find(|d| d.node() == req.node)
            .ok_or(VdmaError::NotFound)?;
        let chan = vdma.xlate(req.args)?;
        debug!("vdma: node {} chan {} requested", req.node, req.args[0]);
        ChannelHandle::acquire(chan)
    }

    /// Acquire the channel whose match token equals `token`.
    pub fn request_by_token(&self, token: u32) -> Result<ChannelHandle<'p, 'a>, VdmaError> {
        let chan = self
            .channels()
            .find(|c| c.match_token() == token)
            .ok_or(VdmaError::NotFound)?;
        ChannelHandle::acquire(chan)
    }
}

/// Exclusive use of a channel. Dropping the handle frees the channel
/// resources; the hardware is not reset.
pub struct ChannelHandle<'p, 'a> {
    chan: &'p Channel<'a>,
}

impl<'p, 'a> ChannelHandle<'p, 'a> {
    fn acquire(chan: &'p Channel<'a>) -> Result<Self, VdmaError> {
        chan.acquire()?;
        Ok(Self { chan })
    }

    pub fn release(self) {
        drop(self)
    }
}

impl<'a> Deref for ChannelHandle<'_, 'a> {
    type Target = Channel<'a>;

    fn deref(&self) -> &Self::Target {
        self.chan
    }
}

impl Drop for ChannelHandle<'_, '_> {
    fn drop(&mut self) {
        self.chan.release();
    }
}
