// Licensed under the Apache-2.0 license

use alloc::vec::Vec;
use core::ptr::NonNull;
use log::{debug, error};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::VdmaError;
use crate::hil::{CoherentRegion, Platform};

/// Size and alignment of one hardware descriptor.
pub const DESC_SIZE: usize = 64;

/// Scatter/gather descriptor as fetched by the core.
#[repr(C, align(64))]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HwDescriptor {
    pub next_desc: u32,
    pub pad0: u32,
    pub buf_addr: u32,
    pub pad1: u32,
    pub vsize: u32,
    pub hsize: u32,
    /// Stride in bits 15:0, frame delay in bits 28:24.
    pub stride: u32,
    pub reserved: [u32; 9],
}

const _: () = assert!(core::mem::size_of::<HwDescriptor>() == DESC_SIZE);

/// A descriptor slot handed out by the pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Slot {
    pub index: u16,
    pub virt: NonNull<HwDescriptor>,
    pub phys: u32,
}

/// Fixed arena of DMA coherent descriptors with a pre-populated free list,
/// so allocation never has to reach for a general purpose allocator.
pub struct DescriptorPool {
    region: Option<CoherentRegion>,
    free: Vec<u16>,
    in_use: Vec<bool>,
    // Bumped each time the channel repopulates its pool.
    generation: u32,
}

// Slots are only written through `&mut self`.
unsafe impl Send for DescriptorPool {}

impl DescriptorPool {
    /// A pool that owns no memory. Every allocation fails.
    pub const fn empty() -> Self {
        Self {
            region: None,
            free: Vec::new(),
            in_use: Vec::new(),
            generation: 0,
        }
    }

    pub fn new(platform: &dyn Platform, capacity: usize) -> Result<Self, VdmaError> {
        if capacity == 0 || capacity > u16::MAX as usize + 1 {
            return Err(VdmaError::InvalidArgument);
        }
        let mut free = Vec::new();
        free.try_reserve_exact(capacity).map_err(|_| VdmaError::OutOfMemory)?;
        // Hand out low indices first.
        free.extend((0..capacity as u32).rev().map(|i| i as u16));
        let mut in_use = Vec::new();
        in_use.try_reserve_exact(capacity).map_err(|_| VdmaError::OutOfMemory)?;
        in_use.resize(capacity, false);

        let size = capacity * DESC_SIZE;
        let region = platform
            .alloc_coherent(size, DESC_SIZE)
            .ok_or(VdmaError::OutOfMemory)?;

        // next_desc and CURDESC/TAILDESC only carry 32 address bits.
        if region.phys % DESC_SIZE as u64 != 0 || region.phys + size as u64 > 1 << 32 {
            error!(
                "vdma: descriptor memory at {:#x} is not usable by the core",
                region.phys
            );
            platform.free_coherent(region);
            return Err(VdmaError::OutOfMemory);
        }

        debug!(
            "vdma: descriptor pool of {} slots at {:#x}",
            capacity, region.phys
        );
        Ok(Self {
            region: Some(region),
            free,
            in_use,
            generation: 0,
        })
    }

    pub fn with_generation(self, generation: u32) -> Self {
        Self { generation, ..self }
    }

    /// Identifies the arena slots were handed out from. Slots of an older
    /// generation must never be returned to this pool.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn capacity(&self) -> usize {
        self.in_use.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn is_populated(&self) -> bool {
        self.region.is_some()
    }

    pub fn alloc(&mut self) -> Result<Slot, VdmaError> {
        let region = self.region.as_ref().ok_or(VdmaError::OutOfMemory)?;
        let index = self.free.pop().ok_or(VdmaError::OutOfMemory)?;
        self.in_use[index as usize] = true;
        let offset = index as usize * DESC_SIZE;
        // SAFETY: `index < capacity`, so the slot lies inside the region.
        let virt = unsafe { NonNull::new_unchecked(region.virt.as_ptr().add(offset)) }.cast();
        let slot = Slot {
            index,
            virt,
            phys: (region.phys + offset as u64) as u32,
        };
        // Stale contents of a recycled slot must never reach the core.
        self.store(slot.index, &HwDescriptor::default());
        Ok(slot)
    }

    pub fn free(&mut self, index: u16) {
        match self.in_use.get_mut(index as usize) {
            Some(used) if *used => {
                *used = false;
                self.free.push(index);
            }
            Some(_) => error!("vdma: descriptor slot {} freed twice", index),
            None => error!("vdma: descriptor slot {} is not part of the pool", index),
        }
    }

    /// Physical address of slot `index`.
    pub fn phys(&self, index: u16) -> Option<u32> {
        let region = self.region.as_ref()?;
        ((index as usize) < self.capacity())
            .then(|| (region.phys + (index as usize * DESC_SIZE) as u64) as u32)
    }

    pub fn store(&mut self, index: u16, desc: &HwDescriptor) {
        if let Some(ptr) = self.slot_ptr(index) {
            // SAFETY: in bounds and 64-byte aligned; the core may read the
            // slot at any time, hence the volatile access.
            unsafe { core::ptr::write_volatile(ptr.as_ptr(), *desc) }
        }
    }

    pub fn load(&self, index: u16) -> Option<HwDescriptor> {
        let ptr = self.slot_ptr(index)?;
        // SAFETY: see `store`.
        Some(unsafe { core::ptr::read_volatile(ptr.as_ptr()) })
    }

    fn slot_ptr(&self, index: u16) -> Option<NonNull<HwDescriptor>> {
        let region = self.region.as_ref()?;
        if index as usize >= self.capacity() {
            return None;
        }
        // SAFETY: bounds checked above.
        let ptr = unsafe { region.virt.as_ptr().add(index as usize * DESC_SIZE) };
        NonNull::new(ptr).map(NonNull::cast)
    }

    /// Release the arena. Safe to call more than once.
    pub fn destroy(&mut self, platform: &dyn Platform) {
        let outstanding = self.capacity() - self.free.len();
        if outstanding != 0 {
            error!(
                "vdma: destroying descriptor pool with {} slots in use",
                outstanding
            );
        }
        if let Some(region) = self.region.take() {
            platform.free_coherent(region);
        }
        self.free = Vec::new();
        self.in_use = Vec::new();
    }
}
