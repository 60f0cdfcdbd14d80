//! C entry points for the code that hooks the game's resource manager.
//!
//! The hook code owns the context pointer returned by [`spellpatch_init`] and passes it back into
//! every other call. Nothing here keeps global state.

use std::{ffi::CStr, os::raw::c_char, path::PathBuf};

use crate::{
    context::PatchContext,
    resource::{BufferSlot, NativeHandle, RawList, RawListNode},
};

unsafe fn path_arg(path: *const c_char) -> Option<String> {
    if path.is_null() {
        return None;
    }

    match CStr::from_ptr(path).to_str() {
        Ok(path) => Some(path.to_string()),
        Err(err) => {
            log::error!("Path is not valid UTF-8: {err}");
            None
        }
    }
}

/// Loads the options at `options_path`, starts logging to `log_path` and creates a context.
/// Returns null if the context couldn't be created.
///
/// # Safety
///
/// Both arguments must be null or valid null-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn spellpatch_init(
    options_path: *const c_char,
    log_path: *const c_char,
) -> *mut PatchContext {
    let options_path = path_arg(options_path)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("spellpatch.json"));

    let log_path = path_arg(log_path)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("spellpatch.log"));

    match crate::init(options_path, log_path) {
        Ok(context) => Box::into_raw(Box::new(context)),
        Err(err) => {
            log::error!("Unable to start the spell patcher: {err:?}");
            std::ptr::null_mut()
        }
    }
}

/// Hook for the game's resource load notification. Returns the resource's path hash, or zero if
/// the arguments were unusable.
///
/// Empty paths are rejected, since zero is also the hash of the empty path.
///
/// # Safety
///
/// `context` must have come from [`spellpatch_init`]. `path` must be a valid null-terminated
/// string, and `slot` must stay valid until [`spellpatch_on_unloaded`] is called for it.
#[no_mangle]
pub unsafe extern "C" fn spellpatch_on_loaded(
    context: *const PatchContext,
    path: *const c_char,
    slot: *mut BufferSlot,
) -> u32 {
    let (Some(context), Some(path), Some(native)) =
        (context.as_ref(), path_arg(path), NativeHandle::from_ptr(slot))
    else {
        log::error!("Ignoring load notification with missing arguments");
        return 0;
    };

    if path.is_empty() {
        log::error!("Ignoring load notification for a resource with no path");
        return 0;
    }

    context.on_loaded(&path, native)
}

/// Hook for the game's resource unload notification. This must be called before the game frees
/// the slot.
///
/// # Safety
///
/// `context` must have come from [`spellpatch_init`].
#[no_mangle]
pub unsafe extern "C" fn spellpatch_on_unloaded(
    context: *const PatchContext,
    slot: *mut BufferSlot,
) -> bool {
    match (context.as_ref(), NativeHandle::from_ptr(slot)) {
        (Some(context), Some(native)) => context.on_unloaded(native),
        _ => false,
    }
}

/// Registers every resource in a game-owned list, returning how many were registered.
///
/// # Safety
///
/// `context` must have come from [`spellpatch_init`], and `head` must meet the requirements of
/// [`RawList::new`].
#[no_mangle]
pub unsafe extern "C" fn spellpatch_register_list(
    context: *const PatchContext,
    head: *const RawListNode,
) -> usize {
    match context.as_ref() {
        Some(context) => context.register_existing(RawList::new(head)),
        None => 0,
    }
}

/// Puts every resource back to its original buffer. Returns how many were overridden.
///
/// # Safety
///
/// `context` must have come from [`spellpatch_init`].
#[no_mangle]
pub unsafe extern "C" fn spellpatch_restore_all(context: *const PatchContext) -> usize {
    context.as_ref().map_or(0, PatchContext::restore_all)
}

/// Restores everything and frees the context. The pointer must not be used again.
///
/// # Safety
///
/// `context` must be null or have come from [`spellpatch_init`], and must not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn spellpatch_shutdown(context: *mut PatchContext) {
    if !context.is_null() {
        drop(Box::from_raw(context));
        log::info!("Spell patcher shut down");
    }
}
