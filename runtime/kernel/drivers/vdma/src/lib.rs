// Licensed under the Apache-2.0 license

// This is a driver for the AMD LogiCORE IP AXI Video Direct Memory Access (VDMA) core.
// Reference: https://docs.amd.com/r/en-US/pg020_axi_vdma
// Both scatter/gather and direct register mode are supported.

#![cfg_attr(target_os = "none", no_std)]

extern crate alloc;

mod chan;
mod config;
mod cookie;
mod desc;
mod device;
mod error;
mod irq;
mod lock;
mod prep;
mod provider;
mod state;

pub mod hil;

pub use chan::Channel;
pub use config::VdmaConfig;
pub use cookie::{Cookie, MAX_COOKIE, MIN_COOKIE};
pub use desc::{DescriptorPool, HwDescriptor, DESC_SIZE};
pub use device::{ChannelDescription, DeviceDescription, FlushFsync, Vdma, IP_VDMA};
pub use error::VdmaError;
pub use prep::{ScatterEntry, Segment, TxDescriptor};
pub use provider::{ChannelHandle, ChannelProvider, DmaRequest};
pub use state::States as ChannelState;
