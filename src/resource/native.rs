use std::ptr::NonNull;

/// The fields that game code reads to find a resource's data.
#[repr(C)]
#[derive(Debug)]
pub struct BufferSlot {
    pub data: *mut u8,
    pub len: usize,
}

/// Pointer to a resource's buffer slot in game memory. The slot itself is owned by the game.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(NonNull<BufferSlot>);

// The slot is only ever accessed while the registry holds its lock, and the game is responsible for
// keeping it alive until it has told us the resource has been unloaded.
unsafe impl Send for NativeHandle {}
unsafe impl Sync for NativeHandle {}

impl NativeHandle {
    /// Wraps a pointer to a buffer slot, returning `None` if it is null.
    ///
    /// # Safety
    ///
    /// The slot must stay valid, and its `data` must point to at least `len` readable bytes, until
    /// the unload notification for the resource has been handled.
    pub unsafe fn from_ptr(slot: *mut BufferSlot) -> Option<NativeHandle> {
        NonNull::new(slot).map(NativeHandle)
    }

    pub fn as_ptr(self) -> *mut BufferSlot {
        self.0.as_ptr()
    }

    /// Returns the buffer pointer and length that the game is currently using.
    pub(crate) fn buffer(self) -> (*mut u8, usize) {
        let slot = unsafe { self.0.as_ref() };
        (slot.data, slot.len)
    }

    /// Points the game at a different buffer. Both fields are written together.
    pub(crate) fn set_buffer(self, data: *mut u8, len: usize) {
        let slot = unsafe { &mut *self.0.as_ptr() };

        slot.data = data;
        slot.len = len;
    }

    /// Copies out the bytes that the game is currently using.
    pub(crate) fn copy_bytes(self) -> Vec<u8> {
        let (data, len) = self.buffer();

        if data.is_null() || len == 0 {
            return Vec::new();
        }

        unsafe { std::slice::from_raw_parts(data, len) }.to_vec()
    }
}
