// Licensed under the Apache-2.0 license

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use emulator_periph::{DmaRam, EmulatedVdma};
use log::LevelFilter;
use registers_vdma::Mmio;
use simple_logger::SimpleLogger;
use vdma_driver::hil::{CoherentRegion, Direction, Platform, TransferClient};
use vdma_driver::{ChannelDescription, Cookie, DeviceDescription, ScatterEntry, Vdma};

pub const RAM_BASE: u64 = 0x8000_0000;
pub const RAM_SIZE: usize = 0x10_0000;

pub const FRAME_ADDRS: [u64; 3] = [0x1000_0000, 0x1010_0000, 0x1020_0000];

pub fn init_logger() {
    let _ = SimpleLogger::new().with_level(LevelFilter::Debug).init();
}

/// Platform glue backed by the emulated core and host RAM.
pub struct TestPlatform {
    pub vdma: EmulatedVdma,
    pub ram: Arc<DmaRam>,
    deferred: Mutex<Vec<usize>>,
    fail_alloc: Mutex<bool>,
}

impl TestPlatform {
    pub fn new(has_sg: bool, num_fstores: usize) -> Self {
        let ram = Arc::new(DmaRam::new(RAM_BASE, RAM_SIZE));
        Self {
            vdma: EmulatedVdma::new(ram.clone(), has_sg, num_fstores),
            ram,
            deferred: Mutex::new(Vec::new()),
            fail_alloc: Mutex::new(false),
        }
    }

    pub fn fail_allocations(&self, fail: bool) {
        *self.fail_alloc.lock().unwrap() = fail;
    }

    pub fn take_deferred(&self) -> Vec<usize> {
        std::mem::take(&mut *self.deferred.lock().unwrap())
    }

    pub fn ctrl(&self, chan: usize, reg: usize) -> u32 {
        let base = if chan == 0 { 0x00 } else { 0x30 };
        self.vdma.read32(base + reg)
    }

    /// Deliver pending interrupts and run the deferred work they schedule.
    pub fn service(&self, vdma: &Vdma) {
        for chan in 0..2 {
            if self.vdma.irq_pending(chan) {
                vdma.handle_irq(chan);
            }
        }
        for chan in self.take_deferred() {
            vdma.process_completed(chan);
        }
    }

    /// Retire one frame on `chan` and service the resulting interrupt.
    pub fn frame(&self, vdma: &Vdma, chan: usize) -> Option<u32> {
        let addr = self.vdma.complete_frame(chan);
        self.service(vdma);
        addr
    }
}

impl Platform for TestPlatform {
    fn mmio(&self) -> &dyn Mmio {
        &self.vdma
    }

    fn alloc_coherent(&self, size: usize, align: usize) -> Option<CoherentRegion> {
        if *self.fail_alloc.lock().unwrap() {
            return None;
        }
        let (virt, phys) = self.ram.alloc(size, align)?;
        Some(CoherentRegion { virt, phys, size })
    }

    fn free_coherent(&self, region: CoherentRegion) {
        self.ram.free(region.phys, region.size);
    }

    fn schedule_deferred(&self, chan_id: usize) {
        self.deferred.lock().unwrap().push(chan_id);
    }
}

pub fn mm2s_description(has_sg: bool, num_fstores: u32) -> DeviceDescription {
    DeviceDescription {
        node: 7,
        has_sg,
        num_fstores,
        poll_limit: 64,
        desc_pool_slots: 32,
        channels: vec![ChannelDescription {
            direction: Direction::MemToDev,
            datawidth_bits: 64,
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub fn dual_description() -> DeviceDescription {
    DeviceDescription {
        channels: vec![
            ChannelDescription {
                direction: Direction::MemToDev,
                datawidth_bits: 64,
                device_id: 1,
                ..Default::default()
            },
            ChannelDescription {
                direction: Direction::DevToMem,
                datawidth_bits: 64,
                genlock: true,
                device_id: 1,
                ..Default::default()
            },
        ],
        ..mm2s_description(true, 3)
    }
}

pub fn frames(addrs: &[u64]) -> Vec<ScatterEntry> {
    addrs
        .iter()
        .map(|&dma_address| ScatterEntry {
            dma_address,
            length: 1080 * 3840,
        })
        .collect()
}

/// Records every completion callback.
#[derive(Default)]
pub struct Recorder {
    pub done: Mutex<Vec<(Cookie, usize)>>,
    pub deps: Mutex<Vec<Cookie>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<(Cookie, usize)> {
        self.done.lock().unwrap().clone()
    }
}

impl TransferClient for Recorder {
    fn transfer_done(&self, cookie: Cookie, param: usize) {
        self.done.lock().unwrap().push((cookie, param));
    }

    fn dependencies_ready(&self, cookie: Cookie) {
        self.deps.lock().unwrap().push(cookie);
    }
}
