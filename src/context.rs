//! Ties the registry, the codec and the modification engine together.

use std::sync::Arc;

use eyre::{Result, WrapErr};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::{
    error::Error,
    modify::{self, ModificationCatalog, ModificationSet},
    resource::{path_extension, BufferAllocator, NativeHandle, ResourceRegistry, SystemAllocator},
    settings::Options,
    spell::{self, Schema},
};

/// Everything the patcher needs while the game is running.
///
/// The registry is only created when the first resource is loaded, and goes away when
/// [`teardown`](PatchContext::teardown) is called or the context is dropped.
pub struct PatchContext {
    options: Options,
    schema: Schema,
    catalog: ModificationCatalog,
    allocator: Arc<dyn BufferAllocator>,
    registry: OnceCell<ResourceRegistry>,

    /// Held from reading a resource's buffer until its patched buffer is installed.
    patching: Mutex<()>,
}

impl PatchContext {
    pub fn new(options: Options, schema: Schema, catalog: ModificationCatalog) -> PatchContext {
        PatchContext::with_allocator(options, schema, catalog, Arc::new(SystemAllocator))
    }

    pub fn with_allocator(
        options: Options,
        schema: Schema,
        catalog: ModificationCatalog,
        allocator: Arc<dyn BufferAllocator>,
    ) -> PatchContext {
        PatchContext {
            options,
            schema,
            catalog,
            allocator,
            registry: OnceCell::new(),
            patching: Mutex::new(()),
        }
    }

    /// Creates a context using the schema and modification files named in `options`.
    ///
    /// Modification files that fail to load are logged and skipped. A missing modification
    /// directory just means there is nothing to apply.
    pub fn from_options(options: Options) -> Result<PatchContext> {
        let schema = match &options.schema_path {
            Some(path) => Schema::load(path)?,
            None => Schema::new(),
        };

        let catalog = if options.mods_dir.is_dir() {
            let (catalog, errors) = ModificationCatalog::load_dir(&options.mods_dir)?;

            for err in errors {
                log::error!("Skipping modification file: {err:?}");
            }

            catalog
        } else {
            log::warn!(
                "Modification directory {:?} doesn't exist; nothing will be applied",
                options.mods_dir
            );

            ModificationCatalog::new()
        };

        log::info!("{} modification set(s) loaded", catalog.len());

        Ok(PatchContext::new(options, schema, catalog))
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn catalog(&self) -> &ModificationCatalog {
        &self.catalog
    }

    /// Returns the registry, or `None` if nothing has been loaded yet.
    pub fn registry(&self) -> Option<&ResourceRegistry> {
        self.registry.get()
    }

    fn registry_or_init(&self) -> &ResourceRegistry {
        self.registry.get_or_init(|| {
            log::info!("Creating resource registry");
            ResourceRegistry::with_allocator(self.allocator.clone())
        })
    }

    fn live_registry(&self, path_hash: u32) -> Result<&ResourceRegistry, Error> {
        self.registry().ok_or(Error::StaleHandle { path_hash })
    }

    fn is_spell(&self, path: &str) -> bool {
        path_extension(path).eq_ignore_ascii_case(&self.options.spell_extension)
    }

    /// Handles a load notification from the game, returning the resource's path hash.
    ///
    /// Spell resources are patched straight away when `apply_on_load` is set. Patching errors are
    /// logged rather than returned, since the game can carry on with the original resource.
    pub fn on_loaded(&self, path: &str, native: NativeHandle) -> u32 {
        let hash = self.registry_or_init().on_loaded(path, native);

        if self.options.apply_on_load && self.is_spell(path) {
            match self.patch_from_catalog(hash) {
                Ok(0) => log::debug!("No modifications for '{path}'"),
                Ok(count) => log::info!("Patched '{path}' with {count} modification set(s)"),
                Err(err) => log::error!("Unable to patch '{path}': {err:?}"),
            }
        }

        hash
    }

    /// Handles load notifications for resources that were loaded before we started listening,
    /// returning how many there were.
    pub fn register_existing(
        &self,
        resources: impl IntoIterator<Item = (String, NativeHandle)>,
    ) -> usize {
        resources
            .into_iter()
            .map(|(path, native)| self.on_loaded(&path, native))
            .count()
    }

    /// Handles an unload notification from the game.
    pub fn on_unloaded(&self, native: NativeHandle) -> bool {
        match self.registry() {
            Some(registry) => registry.on_unloaded(native),
            None => false,
        }
    }

    /// Applies every catalog set that targets a spell in the resource, returning how many were
    /// applied. Sets for spells that the resource doesn't contain are skipped.
    pub fn patch_from_catalog(&self, path_hash: u32) -> Result<usize> {
        let registry = self.live_registry(path_hash)?;
        let bytes = registry.read_buffer(path_hash)?;

        let spell_ids: Vec<u32> = spell::decode(&bytes, &self.schema)
            .wrap_err("Unable to decode resource")?
            .spell_ids()
            .collect();

        let sets: Vec<ModificationSet> = spell_ids
            .iter()
            .flat_map(|id| self.catalog.sets_for(*id))
            .cloned()
            .collect();

        if sets.is_empty() {
            return Ok(0);
        }

        self.patch(path_hash, &sets)?;
        Ok(sets.len())
    }

    /// Decodes the resource's current buffer, applies `sets` in order, and installs the result.
    ///
    /// If anything fails, the resource keeps the buffer it had before. Patches are applied one at
    /// a time, so concurrent calls stack instead of overwriting each other.
    pub fn patch(&self, path_hash: u32, sets: &[ModificationSet]) -> Result<()> {
        let registry = self.live_registry(path_hash)?;
        let _patching = self.patching.lock();

        if !registry.is_valid(path_hash) {
            return Err(Error::StaleHandle { path_hash }.into());
        }

        let bytes = registry.read_buffer(path_hash)?;
        let mut document =
            spell::decode(&bytes, &self.schema).wrap_err("Unable to decode resource")?;

        for set in sets {
            modify::apply(&mut document, set, &self.schema)
                .wrap_err_with(|| format!("Unable to apply '{}'", set.label()))?;
        }

        let encoded = spell::encode(&document, &self.schema)?;

        // The resource may have been unloaded since the check above, in which case this fails
        // with `StaleHandle` instead of touching the freed slot.
        registry.replace(path_hash, &encoded)?;

        log::debug!(
            "Resource {:#010x} is now {} bytes (was {})",
            path_hash,
            encoded.len(),
            bytes.len()
        );

        Ok(())
    }

    pub fn restore(&self, path_hash: u32) -> Result<(), Error> {
        self.live_registry(path_hash)?.restore(path_hash)
    }

    pub fn restore_all(&self) -> usize {
        self.registry().map_or(0, ResourceRegistry::restore_all)
    }

    /// Puts every resource back to its original buffer and drops the registry. A later load
    /// notification creates a fresh one.
    pub fn teardown(&mut self) {
        if let Some(registry) = self.registry.take() {
            registry.teardown();
        }
    }
}

impl Drop for PatchContext {
    fn drop(&mut self) {
        self.teardown();
    }
}
