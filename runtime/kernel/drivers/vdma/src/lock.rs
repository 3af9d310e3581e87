// Licensed under the Apache-2.0 license

/// Spin-lock that also masks local interrupts while held.
///
/// The hard interrupt half takes the same locks as thread context, so a
/// holder must never be preempted by the local interrupt line.
pub(crate) struct IrqSafeLock<T> {
    inner: spin::Mutex<T>,
}

impl<T> IrqSafeLock<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self {
            inner: spin::Mutex::new(value),
        }
    }

    pub(crate) fn lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|_| {
            let mut guard = self.inner.lock();
            f(&mut guard)
        })
    }
}
