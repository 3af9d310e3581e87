// Licensed under the Apache-2.0 license

use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum VdmaError {
    #[error("Invalid argument.")]
    InvalidArgument,
    #[error("Out of descriptor memory.")]
    OutOfMemory,
    #[error("Hardware did not respond within the polling bound.")]
    Timeout,
    #[error("Channel is busy.")]
    Busy,
    #[error("Hardware reported an error (DMASR = 0x{0:08x}).")]
    HardwareError(u32),
    #[error("No matching channel.")]
    NotFound,
}
