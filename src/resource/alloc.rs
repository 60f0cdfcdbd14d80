use std::ptr::NonNull;

/// Provides the memory that override buffers live in.
///
/// Override buffers are handed to game code, so by default they come from the C heap rather than
/// from Rust's allocator.
pub trait BufferAllocator: Send + Sync {
    /// Allocates `len` bytes, returning `None` if the allocation failed.
    fn allocate(&self, len: usize) -> Option<NonNull<u8>>;

    /// Frees a buffer returned by `allocate`.
    ///
    /// # Safety
    ///
    /// `data` must have come from `allocate` on this allocator with the same `len`, and must not
    /// be used again afterwards.
    unsafe fn free(&self, data: NonNull<u8>, len: usize);
}

/// Allocates with `malloc` and frees with `free`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl BufferAllocator for SystemAllocator {
    fn allocate(&self, len: usize) -> Option<NonNull<u8>> {
        // `malloc(0)` is allowed to return null, which we'd mistake for a failure.
        let data = unsafe { libc::malloc(len.max(1)) };
        NonNull::new(data.cast())
    }

    unsafe fn free(&self, data: NonNull<u8>, _len: usize) {
        libc::free(data.as_ptr().cast());
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    /// Wraps the system allocator and keeps count of what is allocated.
    #[derive(Debug, Default)]
    pub struct CountingAllocator {
        allocations: AtomicUsize,
        frees: AtomicUsize,
        fail_next: AtomicBool,
    }

    impl CountingAllocator {
        /// The number of buffers currently allocated.
        pub fn live(&self) -> usize {
            self.allocations.load(Ordering::SeqCst) - self.frees.load(Ordering::SeqCst)
        }

        pub fn allocations(&self) -> usize {
            self.allocations.load(Ordering::SeqCst)
        }

        /// Makes the next allocation fail.
        pub fn fail_next(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }
    }

    impl BufferAllocator for CountingAllocator {
        fn allocate(&self, len: usize) -> Option<NonNull<u8>> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return None;
            }

            let data = SystemAllocator.allocate(len)?;
            self.allocations.fetch_add(1, Ordering::SeqCst);

            Some(data)
        }

        unsafe fn free(&self, data: NonNull<u8>, len: usize) {
            self.frees.fetch_add(1, Ordering::SeqCst);
            SystemAllocator.free(data, len);
        }
    }
}
