//! Tracks the buffer a single resource is using, and owns the override buffer when there is one.

use std::{ptr::NonNull, sync::Arc};

use super::{alloc::BufferAllocator, native::NativeHandle};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum HandleState {
    /// The game is using its own buffer.
    Original,

    /// The game is using a buffer that we allocated.
    Overridden,

    /// The resource has been unloaded. Nothing can be done with the handle any more.
    Invalid,
}

/// An override buffer along with the buffer it replaced.
struct Override {
    data: NonNull<u8>,
    len: usize,

    original_data: *mut u8,
    original_len: usize,
}

pub struct ResourceHandle {
    native: NativeHandle,
    path: String,
    path_hash: u32,

    /// Present exactly when the handle is overridden. This is the only allocation the handle owns.
    current: Option<Override>,

    valid: bool,
    allocator: Arc<dyn BufferAllocator>,
}

// The override buffer is only reachable through the handle, and the game's buffer is only touched
// while the registry's lock is held.
unsafe impl Send for ResourceHandle {}
unsafe impl Sync for ResourceHandle {}

impl std::fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("path", &self.path)
            .field("path_hash", &format_args!("{:#010x}", self.path_hash))
            .field("state", &self.state())
            .finish()
    }
}

impl ResourceHandle {
    pub(crate) fn new(
        native: NativeHandle,
        path: String,
        path_hash: u32,
        allocator: Arc<dyn BufferAllocator>,
    ) -> ResourceHandle {
        ResourceHandle {
            native,
            path,
            path_hash,
            current: None,
            valid: true,
            allocator,
        }
    }

    pub fn native(&self) -> NativeHandle {
        self.native
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn path_hash(&self) -> u32 {
        self.path_hash
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn state(&self) -> HandleState {
        match (self.valid, &self.current) {
            (false, _) => HandleState::Invalid,
            (true, Some(_)) => HandleState::Overridden,
            (true, None) => HandleState::Original,
        }
    }

    /// The length of the buffer the game is currently using.
    pub fn len(&self) -> usize {
        if self.valid {
            self.native.buffer().1
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stale(&self) -> Error {
        Error::StaleHandle {
            path_hash: self.path_hash,
        }
    }

    /// Copies the bytes the game is currently using.
    pub fn read(&self) -> Result<Vec<u8>> {
        if !self.valid {
            return Err(self.stale());
        }

        Ok(self.native.copy_bytes())
    }

    /// Makes the game use a copy of `bytes` instead of its current buffer.
    ///
    /// The first replacement remembers the game's buffer so that it can be restored later. Later
    /// replacements free the previous override buffer once the new one is in place. If this fails,
    /// nothing changes.
    pub fn replace(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.valid {
            return Err(self.stale());
        }

        let len = bytes.len();
        let data = self
            .allocator
            .allocate(len)
            .ok_or(Error::AllocationFailed { len })?;

        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), data.as_ptr(), len);
        }

        let (original_data, original_len) = match &self.current {
            Some(previous) => (previous.original_data, previous.original_len),
            None => self.native.buffer(),
        };

        self.native.set_buffer(data.as_ptr(), len);

        let previous = self.current.replace(Override {
            data,
            len,
            original_data,
            original_len,
        });

        if let Some(previous) = previous {
            unsafe { self.allocator.free(previous.data, previous.len) };
        }

        log::debug!(
            "'{}' now uses an override buffer of {} bytes (originally {})",
            self.path,
            len,
            original_len
        );

        Ok(())
    }

    /// Points the game back at its own buffer and frees the override. Does nothing if the handle
    /// isn't overridden.
    pub fn restore(&mut self) -> Result<()> {
        if !self.valid {
            return Err(self.stale());
        }

        self.restore_original();
        Ok(())
    }

    fn restore_original(&mut self) {
        if let Some(current) = self.current.take() {
            self.native
                .set_buffer(current.original_data, current.original_len);

            unsafe { self.allocator.free(current.data, current.len) };

            log::debug!("'{}' restored to its original buffer", self.path);
        }
    }

    /// Restores the original buffer and marks the handle as invalid. Called when the game unloads
    /// the resource, so this must happen before the game frees the slot.
    pub(crate) fn invalidate(&mut self) {
        if self.valid {
            self.restore_original();
            self.valid = false;
        }
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        // A handle that's still valid has a live slot, so we can put the game's buffer back.
        self.invalidate();
    }
}
