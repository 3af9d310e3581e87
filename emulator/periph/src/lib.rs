/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the AXI VDMA Emulator Peripheral library.

--*/

mod dma_ram;
mod vdma;

pub use dma_ram::DmaRam;
pub use vdma::{EmulatedVdma, FetchedDescriptor, Stall};
