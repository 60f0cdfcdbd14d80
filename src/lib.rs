//! Patches spell resources while the game is running.
//!
//! Spell resources are decoded into a [`spell::SpellDocument`], edited by the modification sets in
//! [`modify`], encoded again and installed as an override buffer through the
//! [`resource::ResourceRegistry`]. The original buffer can be put back at any time.
//!
//! The game side talks to a [`context::PatchContext`], either directly or through the C functions
//! in [`ffi`].

use std::path::Path;

pub mod context;
pub mod error;
pub mod ffi;
pub mod logging;
pub mod modify;
pub mod resource;
pub mod settings;
pub mod spell;

pub use context::PatchContext;
pub use error::{ApplyError, Error, Result};

/// Loads the options at `options_path`, starts logging to `log_path`, and creates a context
/// with the configured schema and modification files.
///
/// If logging has already been started (or can't be), patching still goes ahead.
pub fn init(
    options_path: impl AsRef<Path>,
    log_path: impl AsRef<Path>,
) -> eyre::Result<PatchContext> {
    let options = settings::Options::load_or_default(options_path);

    if let Err(err) = logging::init(log_path, options.level_filter()) {
        log::warn!("Logging is unavailable: {err:?}");
    }

    log::info!("spellpatch version {}", env!("CARGO_PKG_VERSION"));

    PatchContext::from_options(options)
}
