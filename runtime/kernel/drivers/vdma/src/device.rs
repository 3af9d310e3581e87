// Licensed under the Apache-2.0 license

use alloc::vec::Vec;
use log::{error, info};
use registers_vdma::regs::MAX_FRAME_STORES;
use registers_vdma::ChannelRegs;

use crate::chan::{Channel, ChannelParams};
use crate::error::VdmaError;
use crate::hil::{Direction, IrqReturn, Platform};

/// IP type bits of a channel match token.
pub const IP_VDMA: u32 = 0x0040_0000;
const DEVICE_ID_SHIFT: u32 = 28;
const MAX_DEVICE_ID: u32 = 0xf;
const MAX_CHANS_PER_DEVICE: usize = 2;

/// Which channels drop queued frames on a frame sync error. Encoded like the
/// `xlnx,flush-fsync` property.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(try_from = "u32"))]
pub enum FlushFsync {
    #[default]
    None = 0,
    Both = 1,
    Mm2s = 2,
    S2mm = 3,
}

impl FlushFsync {
    pub fn applies_to(self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (FlushFsync::Both, _)
                | (FlushFsync::Mm2s, Direction::MemToDev)
                | (FlushFsync::S2mm, Direction::DevToMem)
        )
    }
}

impl TryFrom<u32> for FlushFsync {
    type Error = VdmaError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FlushFsync::None),
            1 => Ok(FlushFsync::Both),
            2 => Ok(FlushFsync::Mm2s),
            3 => Ok(FlushFsync::S2mm),
            _ => Err(VdmaError::InvalidArgument),
        }
    }
}

/// Description of one channel of a VDMA instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct ChannelDescription {
    pub direction: Direction,
    /// Width of the memory mapped data path in bits.
    pub datawidth_bits: u32,
    /// The channel can take part in genlock synchronisation.
    pub genlock: bool,
    /// The data realignment engine is present.
    pub include_dre: bool,
    pub device_id: u32,
}

impl Default for ChannelDescription {
    fn default() -> Self {
        ChannelDescription {
            direction: Direction::MemToDev,
            datawidth_bits: 64,
            genlock: false,
            include_dre: false,
            device_id: 0,
        }
    }
}

/// Everything probe needs to know about a VDMA instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct DeviceDescription {
    /// Identifies the instance to consumers.
    pub node: u32,
    pub has_sg: bool,
    pub num_fstores: u32,
    pub flush_fsync: FlushFsync,
    /// Iterations of the reset, halt and start handshakes.
    pub poll_limit: u32,
    /// Descriptors per channel.
    pub desc_pool_slots: usize,
    pub channels: Vec<ChannelDescription>,
}

impl Default for DeviceDescription {
    fn default() -> Self {
        DeviceDescription {
            node: 0,
            has_sg: false,
            num_fstores: 3,
            flush_fsync: FlushFsync::None,
            poll_limit: 1_000_000,
            desc_pool_slots: 256,
            channels: Vec::new(),
        }
    }
}

fn fls(value: u32) -> u32 {
    u32::BITS - value.leading_zeros()
}

/// A probed AXI VDMA instance with one or two channels.
pub struct Vdma<'a> {
    node: u32,
    has_sg: bool,
    num_frms: usize,
    flush_fsync: FlushFsync,
    copy_align: u32,
    channels: [Option<Channel<'a>>; MAX_CHANS_PER_DEVICE],
}

impl<'a> Vdma<'a> {
    pub fn probe(
        platform: &'a dyn Platform,
        desc: &DeviceDescription,
    ) -> Result<Vdma<'a>, VdmaError> {
        let num_frms = desc.num_fstores as usize;
        if !(1..=MAX_FRAME_STORES).contains(&num_frms) {
            error!("vdma: invalid number of frame stores {}", desc.num_fstores);
            return Err(VdmaError::InvalidArgument);
        }
        if desc.channels.is_empty() || desc.channels.len() > MAX_CHANS_PER_DEVICE {
            error!("vdma: {} channels described", desc.channels.len());
            return Err(VdmaError::InvalidArgument);
        }
        if desc.poll_limit == 0 || desc.desc_pool_slots < num_frms {
            return Err(VdmaError::InvalidArgument);
        }

        let mut copy_align = 0;
        for chan in &desc.channels {
            if chan.datawidth_bits == 0 || chan.device_id > MAX_DEVICE_ID {
                error!("vdma: invalid channel description {:?}", chan);
                return Err(VdmaError::InvalidArgument);
            }
            let width = chan.datawidth_bits.div_ceil(8);
            // The realignment engine only exists up to 64-bit streams.
            let has_dre = chan.include_dre && width <= 8;
            if !has_dre {
                copy_align = copy_align.max(fls(width - 1));
            }
        }

        let mut channels: [Option<Channel<'a>>; MAX_CHANS_PER_DEVICE] = [None, None];
        for chan in &desc.channels {
            let slot = &mut channels[chan.direction.chan_id() as usize];
            if slot.is_some() {
                error!("vdma: more than one {:?} channel", chan.direction);
                return Err(VdmaError::InvalidArgument);
            }
            *slot = Some(Channel::new(
                platform,
                ChannelParams {
                    direction: chan.direction,
                    match_token: (chan.direction.dmaengine_value() & 0xff)
                        | IP_VDMA
                        | (chan.device_id << DEVICE_ID_SHIFT),
                    num_frms,
                    has_sg: desc.has_sg,
                    genlock: chan.genlock,
                    flush_on_fsync: desc.flush_fsync.applies_to(chan.direction),
                    poll_limit: desc.poll_limit,
                    pool_slots: desc.desc_pool_slots,
                    copy_align,
                },
            ));
        }

        let vdma = Vdma {
            node: desc.node,
            has_sg: desc.has_sg,
            num_frms,
            flush_fsync: desc.flush_fsync,
            copy_align,
            channels,
        };

        for chan in vdma.channels() {
            if let Err(err) = chan.reset() {
                error!("vdma: chan {} reset failed during probe", chan.id());
                vdma.channels().for_each(Channel::mask_irqs);
                return Err(err);
            }
        }

        info!(
            "Xilinx AXI VDMA Engine driver probed: node {} version {:#010x}, {} frame stores, sg {}",
            vdma.node,
            ChannelRegs::mm2s(platform.mmio()).version(),
            num_frms,
            vdma.has_sg
        );
        Ok(vdma)
    }

    /// Stop every channel and release its resources.
    pub fn remove(self) {
        for chan in self.channels() {
            chan.terminate_all();
            chan.free_chan_resources();
            chan.mask_irqs();
        }
        info!("vdma: node {} removed", self.node);
    }

    pub fn node(&self) -> u32 {
        self.node
    }

    pub fn has_sg(&self) -> bool {
        self.has_sg
    }

    pub fn num_frms(&self) -> usize {
        self.num_frms
    }

    pub fn flush_fsync(&self) -> FlushFsync {
        self.flush_fsync
    }

    /// Log2 of the buffer alignment every channel of the device requires.
    pub fn copy_align(&self) -> u32 {
        self.copy_align
    }

    pub fn channel(&self, id: usize) -> Option<&Channel<'a>> {
        self.channels.get(id)?.as_ref()
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel<'a>> {
        self.channels.iter().flatten()
    }

    /// Translate a consumer specifier (one cell holding the channel id).
    pub fn xlate(&self, args: &[u32]) -> Result<&Channel<'a>, VdmaError> {
        let [id] = args else {
            return Err(VdmaError::InvalidArgument);
        };
        let id = *id as usize;
        if id >= MAX_CHANS_PER_DEVICE {
            return Err(VdmaError::InvalidArgument);
        }
        self.channel(id).ok_or(VdmaError::NotFound)
    }

    /// Route an interrupt line to the channel it belongs to.
    pub fn handle_irq(&self, chan_id: usize) -> IrqReturn {
        self.channel(chan_id)
            .map_or(IrqReturn::NotMine, Channel::handle_interrupt)
    }

    /// Run deferred completion work scheduled by [`Vdma::handle_irq`].
    pub fn process_completed(&self, chan_id: usize) {
        if let Some(chan) = self.channel(chan_id) {
            chan.process_completed();
        }
    }
}
