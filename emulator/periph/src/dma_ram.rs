// Licensed under the Apache-2.0 license

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::Mutex;

const RAM_ALIGN: usize = 4096;

/// Host memory standing in for DMA-able system RAM.
///
/// The block is visible to the CPU through raw pointers handed out by
/// [`DmaRam::alloc`] and to the emulated DMA engine through bus addresses
/// starting at `phys_base`.
pub struct DmaRam {
    base: NonNull<u8>,
    layout: Layout,
    phys_base: u64,
    // (offset, size), sorted by offset
    allocations: Mutex<Vec<(usize, usize)>>,
}

// All accesses go through raw pointers into a block owned by this value.
unsafe impl Send for DmaRam {}
unsafe impl Sync for DmaRam {}

impl DmaRam {
    pub fn new(phys_base: u64, size: usize) -> Self {
        assert_eq!(phys_base % RAM_ALIGN as u64, 0);
        let layout = Layout::from_size_align(size.max(1), RAM_ALIGN).unwrap();
        let base = NonNull::new(unsafe { alloc_zeroed(layout) }).unwrap();
        Self {
            base,
            layout,
            phys_base,
            allocations: Mutex::new(Vec::new()),
        }
    }

    pub fn phys_base(&self) -> u64 {
        self.phys_base
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// First-fit allocation of zeroed memory. Returns the CPU pointer and
    /// the bus address of the block.
    pub fn alloc(&self, size: usize, align: usize) -> Option<(NonNull<u8>, u64)> {
        if size == 0 || !align.is_power_of_two() || align > RAM_ALIGN {
            return None;
        }
        let mut allocations = self.allocations.lock().unwrap();
        let mut cursor: usize = 0;
        let mut insert_at = allocations.len();
        for (i, &(offset, len)) in allocations.iter().enumerate() {
            let start = cursor.next_multiple_of(align);
            if start + size <= offset {
                insert_at = i;
                break;
            }
            cursor = offset + len;
        }
        let start = cursor.next_multiple_of(align);
        if insert_at == allocations.len() && start + size > self.size() {
            return None;
        }
        allocations.insert(insert_at, (start, size));
        unsafe {
            let ptr = self.base.as_ptr().add(start);
            std::ptr::write_bytes(ptr, 0, size);
            Some((NonNull::new_unchecked(ptr), self.phys_base + start as u64))
        }
    }

    pub fn free(&self, phys: u64, size: usize) {
        let mut allocations = self.allocations.lock().unwrap();
        let offset = (phys - self.phys_base) as usize;
        let pos = allocations
            .iter()
            .position(|&a| a == (offset, size))
            .expect("freeing memory that was never allocated");
        allocations.remove(pos);
    }

    /// Bytes currently allocated.
    pub fn allocated(&self) -> usize {
        self.allocations.lock().unwrap().iter().map(|a| a.1).sum()
    }

    fn offset(&self, phys: u64, len: usize) -> Option<usize> {
        let offset = usize::try_from(phys.checked_sub(self.phys_base)?).ok()?;
        (offset + len <= self.size()).then_some(offset)
    }

    /// Bus read. `None` when the address is outside the RAM.
    pub fn read(&self, phys: u64, buf: &mut [u8]) -> Option<()> {
        let offset = self.offset(phys, buf.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.base.as_ptr().add(offset),
                buf.as_mut_ptr(),
                buf.len(),
            );
        }
        Some(())
    }

    pub fn write(&self, phys: u64, data: &[u8]) -> Option<()> {
        let offset = self.offset(phys, data.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.base.as_ptr().add(offset), data.len());
        }
        Some(())
    }

    pub fn read_u32(&self, phys: u64) -> u32 {
        let mut word = [0u8; 4];
        self.read(phys, &mut word).unwrap();
        u32::from_le_bytes(word)
    }

    pub fn write_u32(&self, phys: u64, value: u32) {
        self.write(phys, &value.to_le_bytes()).unwrap();
    }
}

impl Drop for DmaRam {
    fn drop(&mut self) {
        unsafe { dealloc(self.base.as_ptr(), self.layout) }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_alloc_alignment_and_reuse() {
        let ram = DmaRam::new(0x8000_0000, 0x1000);
        let (_, a) = ram.alloc(0x10, 4).unwrap();
        let (_, b) = ram.alloc(0x40, 64).unwrap();
        assert_eq!(a, 0x8000_0000);
        assert_eq!(b, 0x8000_0040);
        assert_eq!(ram.allocated(), 0x50);

        ram.free(a, 0x10);
        let (_, c) = ram.alloc(0x20, 16).unwrap();
        assert_eq!(c, 0x8000_0000);
        assert!(ram.alloc(0x1000, 64).is_none());
    }

    #[test]
    fn test_cpu_and_bus_views_agree() {
        let ram = DmaRam::new(0x1000_0000, 0x100);
        let (ptr, phys) = ram.alloc(8, 8).unwrap();
        unsafe { (ptr.as_ptr() as *mut u32).write(0x1234_5678) };
        assert_eq!(ram.read_u32(phys), 0x1234_5678);
        ram.write_u32(phys + 4, 0xcafe_f00d);
        assert_eq!(unsafe { (ptr.as_ptr() as *const u32).add(1).read() }, 0xcafe_f00d);
        assert!(ram.read(0x1000_0100, &mut [0u8; 4]).is_none());
    }
}
