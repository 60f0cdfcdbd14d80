//! Reads resource lists that live in game memory.
//!
//! The game keeps its loaded resources in its own containers. We never take ownership of those, we
//! only walk them to find out what was loaded before we started listening for notifications.

use std::{ffi::CStr, marker::PhantomData, os::raw::c_char};

use super::native::{BufferSlot, NativeHandle};

/// Lists longer than this are assumed to be corrupt (most likely looping back on themselves).
const MAX_NODES: usize = 1 << 20;

/// A node in a singly-linked list of resources owned by the game.
#[repr(C)]
#[derive(Debug)]
pub struct RawListNode {
    pub next: *const RawListNode,

    /// Null-terminated logical path of the resource.
    pub key: *const c_char,

    pub value: *mut BufferSlot,
}

/// Iterates over the `(path, handle)` pairs in a game-owned list without copying the list.
pub struct RawList<'game> {
    next: *const RawListNode,
    visited: usize,
    _game: PhantomData<&'game RawListNode>,
}

impl<'game> RawList<'game> {
    /// Creates an iterator starting at `head`, which may be null for an empty list.
    ///
    /// # Safety
    ///
    /// Every node reachable from `head`, and every key string, must stay valid and unmodified for
    /// `'game`. Each node's value must satisfy the requirements of [`NativeHandle::from_ptr`].
    pub unsafe fn new(head: *const RawListNode) -> RawList<'game> {
        RawList {
            next: head,
            visited: 0,
            _game: PhantomData,
        }
    }
}

impl<'game> Iterator for RawList<'game> {
    type Item = (String, NativeHandle);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.next.is_null() {
                return None;
            }

            if self.visited == MAX_NODES {
                log::error!("Resource list has more than {MAX_NODES} nodes; stopping early");
                self.next = std::ptr::null();
                return None;
            }

            let node = unsafe { &*self.next };
            self.next = node.next;
            self.visited += 1;

            if node.key.is_null() {
                log::warn!("Skipping resource list node with no path");
                continue;
            }

            let path = match unsafe { CStr::from_ptr(node.key) }.to_str() {
                Ok(path) => path.to_string(),
                Err(err) => {
                    log::warn!("Skipping resource with a non-UTF-8 path: {err}");
                    continue;
                }
            };

            match unsafe { NativeHandle::from_ptr(node.value) } {
                Some(handle) => return Some((path, handle)),
                None => log::warn!("Skipping resource '{path}' with no buffer"),
            }
        }
    }
}
