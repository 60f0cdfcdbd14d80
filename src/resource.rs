//! Override buffers for resources that the game has loaded.
//!
//! The game tells us when it loads and unloads resources. For each live resource we keep a
//! [`ResourceHandle`] in the [`ResourceRegistry`], which can point the game at a buffer of our own
//! and later put the original back.

mod alloc;
mod foreign;
mod handle;
mod native;
mod registry;

pub use alloc::{BufferAllocator, SystemAllocator};
pub use foreign::{RawList, RawListNode};
pub use handle::{HandleState, ResourceHandle};
pub use native::{BufferSlot, NativeHandle};
pub use registry::{ResourceInfo, ResourceRegistry};

#[cfg(test)]
pub(crate) use alloc::testing::CountingAllocator;
#[cfg(test)]
pub(crate) use handle::tests::FakeResource;

/// Hashes a logical resource path the same way the game does.
///
/// Paths are compared case-insensitively and with either kind of slash, so both are normalised
/// before hashing.
pub fn path_hash(path: &str) -> u32 {
    normalised(path).fold(0u32, |hash, byte| {
        hash.wrapping_mul(37).wrapping_add(u32::from(byte))
    })
}

fn normalised(path: &str) -> impl Iterator<Item = u8> + '_ {
    path.bytes().map(|byte| match byte.to_ascii_lowercase() {
        b'\\' => b'/',
        byte => byte,
    })
}

/// Returns `true` if both paths name the same resource, using the comparison that `path_hash`
/// is based on.
pub fn same_path(a: &str, b: &str) -> bool {
    a.len() == b.len() && normalised(a).eq(normalised(b))
}

/// Returns the part of the file name after its last dot, or an empty string.
pub fn path_extension(path: &str) -> &str {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);

    match name.rfind('.') {
        Some(dot) => &name[dot + 1..],
        None => "",
    }
}
