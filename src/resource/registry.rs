//! Keeps track of every loaded resource.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use case_insensitive_hashmap::CaseInsensitiveHashMap;
use parking_lot::RwLock;

use super::{
    alloc::{BufferAllocator, SystemAllocator},
    handle::{HandleState, ResourceHandle},
    native::NativeHandle,
    path_extension, path_hash, same_path,
};
use crate::error::{Error, Result};

/// A snapshot of a handle, for listing resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub path: String,
    pub path_hash: u32,
    pub state: HandleState,

    /// The size of the buffer the game is currently using.
    pub len: usize,
}

impl ResourceInfo {
    fn of(handle: &ResourceHandle) -> ResourceInfo {
        ResourceInfo {
            path: handle.path().to_string(),
            path_hash: handle.path_hash(),
            state: handle.state(),
            len: handle.len(),
        }
    }
}

/// The resources that share an extension, ordered by path.
struct ExtensionBucket {
    /// The extension as it was first seen.
    extension: String,
    paths: BTreeMap<String, u32>,
}

struct Indices {
    by_hash: HashMap<u32, ResourceHandle>,
    by_extension: CaseInsensitiveHashMap<ExtensionBucket>,
    by_native: HashMap<NativeHandle, u32>,
}

impl Indices {
    fn new() -> Indices {
        Indices {
            by_hash: HashMap::new(),
            by_extension: CaseInsensitiveHashMap::new(),
            by_native: HashMap::new(),
        }
    }

    /// Removes a handle from every index, returning it.
    fn remove(&mut self, hash: u32) -> Option<ResourceHandle> {
        let handle = self.by_hash.remove(&hash)?;

        if self.by_native.get(&handle.native()) == Some(&hash) {
            self.by_native.remove(&handle.native());
        }

        let extension = path_extension(handle.path());

        let now_empty = match self.by_extension.get_mut(extension) {
            Some(bucket) => {
                bucket.paths.remove(handle.path());
                bucket.paths.is_empty()
            }

            None => false,
        };

        if now_empty {
            self.by_extension.remove(extension);
        }

        Some(handle)
    }

    fn insert(&mut self, handle: ResourceHandle) {
        let hash = handle.path_hash();
        let extension = path_extension(handle.path());

        self.by_extension
            .entry(extension.to_string())
            .or_insert_with(|| ExtensionBucket {
                extension: extension.to_string(),
                paths: BTreeMap::new(),
            })
            .paths
            .insert(handle.path().to_string(), hash);

        self.by_native.insert(handle.native(), hash);
        self.by_hash.insert(hash, handle);
    }
}

/// Tracks the live handle for every loaded resource.
///
/// Handles are indexed by path hash for lookups, and by extension then path for listing. The
/// registry is the only thing that changes handle state, and it only does so while holding its
/// write lock, so anything listing resources sees each handle either fully overridden or fully
/// original.
pub struct ResourceRegistry {
    allocator: Arc<dyn BufferAllocator>,
    indices: RwLock<Indices>,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        ResourceRegistry::new()
    }
}

impl ResourceRegistry {
    /// Creates a registry that allocates override buffers on the C heap.
    pub fn new() -> ResourceRegistry {
        ResourceRegistry::with_allocator(Arc::new(SystemAllocator))
    }

    pub fn with_allocator(allocator: Arc<dyn BufferAllocator>) -> ResourceRegistry {
        ResourceRegistry {
            allocator,
            indices: RwLock::new(Indices::new()),
        }
    }

    /// Starts tracking a resource that the game has loaded, returning its path hash.
    ///
    /// A resource already registered under the same hash, or for the same native handle, is
    /// dropped first (restoring its original buffer). Usually the game has reloaded it without
    /// telling us it had been unloaded. If a different path has the same hash, only one of them
    /// can be tracked, so the older one is dropped and the collision is logged as an error.
    pub fn on_loaded(&self, path: &str, native: NativeHandle) -> u32 {
        let hash = path_hash(path);
        let mut indices = self.indices.write();

        let previous_for_native = indices.by_native.get(&native).copied();

        for stale in [Some(hash), previous_for_native].into_iter().flatten() {
            if let Some(mut old) = indices.remove(stale) {
                if same_path(old.path(), path) {
                    log::warn!(
                        "'{}' was loaded again without being unloaded; replacing its handle",
                        old.path()
                    );
                } else if old.path_hash() == hash {
                    log::error!(
                        "'{}' and '{}' share the hash {:#010x}; '{}' will no longer be patched",
                        old.path(),
                        path,
                        hash,
                        old.path()
                    );
                } else {
                    log::warn!(
                        "'{}' was replaced by '{}' in the same slot without being unloaded",
                        old.path(),
                        path
                    );
                }

                old.invalidate();
            }
        }

        indices.insert(ResourceHandle::new(
            native,
            path.to_string(),
            hash,
            self.allocator.clone(),
        ));

        log::debug!("Registered '{}' ({:#010x})", path, hash);

        hash
    }

    /// Stops tracking a resource that the game is unloading, restoring its original buffer first.
    /// Returns `false` if the resource wasn't being tracked.
    pub fn on_unloaded(&self, native: NativeHandle) -> bool {
        let mut indices = self.indices.write();

        let hash = match indices.by_native.get(&native) {
            Some(hash) => *hash,
            None => {
                log::debug!("Unload notification for untracked resource {:?}", native);
                return false;
            }
        };

        match indices.remove(hash) {
            Some(mut handle) => {
                handle.invalidate();
                log::debug!("Unregistered '{}'", handle.path());
                true
            }

            None => false,
        }
    }

    /// Registers resources that were loaded before the registry existed, returning how many were
    /// registered.
    pub fn register_existing(
        &self,
        resources: impl IntoIterator<Item = (String, NativeHandle)>,
    ) -> usize {
        resources
            .into_iter()
            .map(|(path, native)| self.on_loaded(&path, native))
            .count()
    }

    /// Runs `action` on the live handle for `hash` while holding the write lock.
    fn with_handle_mut<T>(
        &self,
        hash: u32,
        action: impl FnOnce(&mut ResourceHandle) -> Result<T>,
    ) -> Result<T> {
        let mut indices = self.indices.write();

        match indices.by_hash.get_mut(&hash) {
            Some(handle) => action(handle),
            None => Err(Error::StaleHandle { path_hash: hash }),
        }
    }

    pub fn is_valid(&self, hash: u32) -> bool {
        self.indices
            .read()
            .by_hash
            .get(&hash)
            .map_or(false, ResourceHandle::is_valid)
    }

    /// Installs a copy of `bytes` as the resource's buffer. Fails with `StaleHandle` if the
    /// resource has been unloaded, even if it was valid when the caller last checked.
    pub fn replace(&self, hash: u32, bytes: &[u8]) -> Result<()> {
        self.with_handle_mut(hash, |handle| handle.replace(bytes))
    }

    /// Puts the resource's original buffer back. Does nothing if it isn't overridden.
    pub fn restore(&self, hash: u32) -> Result<()> {
        self.with_handle_mut(hash, ResourceHandle::restore)
    }

    /// Restores every overridden resource, returning how many there were.
    pub fn restore_all(&self) -> usize {
        let mut indices = self.indices.write();
        let mut restored = 0;

        for handle in indices.by_hash.values_mut() {
            if handle.state() == HandleState::Overridden && handle.restore().is_ok() {
                restored += 1;
            }
        }

        log::info!("Restored {} resource{}", restored, if restored == 1 { "" } else { "s" });

        restored
    }

    /// Copies the bytes that the resource is currently using.
    pub fn read_buffer(&self, hash: u32) -> Result<Vec<u8>> {
        match self.indices.read().by_hash.get(&hash) {
            Some(handle) => handle.read(),
            None => Err(Error::StaleHandle { path_hash: hash }),
        }
    }

    pub fn info(&self, hash: u32) -> Option<ResourceInfo> {
        self.indices.read().by_hash.get(&hash).map(ResourceInfo::of)
    }

    /// Looks up a resource by its logical path.
    pub fn find(&self, path: &str) -> Option<ResourceInfo> {
        self.info(path_hash(path))
    }

    /// Returns every extension that at least one loaded resource has, sorted.
    pub fn extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self
            .indices
            .read()
            .by_extension
            .values()
            .map(|bucket| bucket.extension.clone())
            .collect();

        extensions.sort_unstable();
        extensions
    }

    /// Lists the resources with `extension` (compared case-insensitively), ordered by path.
    pub fn resources(&self, extension: &str) -> Vec<ResourceInfo> {
        let indices = self.indices.read();

        let bucket = match indices.by_extension.get(extension) {
            Some(bucket) => bucket,
            None => return Vec::new(),
        };

        bucket
            .paths
            .values()
            .filter_map(|hash| indices.by_hash.get(hash))
            .map(ResourceInfo::of)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.indices.read().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Restores and invalidates every handle, then forgets them all.
    pub fn teardown(&self) {
        let mut indices = self.indices.write();
        let count = indices.by_hash.len();

        for handle in indices.by_hash.values_mut() {
            handle.invalidate();
        }

        *indices = Indices::new();

        log::info!("Registry torn down ({} handles released)", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{alloc::testing::CountingAllocator, handle::tests::FakeResource};

    fn registry() -> (ResourceRegistry, Arc<CountingAllocator>) {
        let allocator = Arc::new(CountingAllocator::default());
        (ResourceRegistry::with_allocator(allocator.clone()), allocator)
    }

    #[test]
    fn load_and_unload_maintain_both_indices() {
        let (registry, _) = registry();
        let mut fire = FakeResource::new(&[1]);
        let mut ice = FakeResource::new(&[2, 2]);
        let mut model = FakeResource::new(&[3]);

        let fire_hash = registry.on_loaded("magic/Fire.SPL", fire.native());
        registry.on_loaded("magic/ice.spl", ice.native());
        registry.on_loaded("chr/c0000.flver", model.native());

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.extensions(), vec!["SPL", "flver"]);

        let spells: Vec<_> = registry
            .resources("spl")
            .into_iter()
            .map(|info| info.path)
            .collect();
        assert_eq!(spells, vec!["magic/Fire.SPL", "magic/ice.spl"]);

        let info = registry.find("MAGIC\\FIRE.spl").unwrap();
        assert_eq!(info.path_hash, fire_hash);
        assert_eq!(info.state, HandleState::Original);
        assert_eq!(info.len, 1);

        assert!(registry.on_unloaded(fire.native()));
        assert!(!registry.on_unloaded(fire.native()));
        assert!(!registry.is_valid(fire_hash));

        registry.on_unloaded(ice.native());
        assert_eq!(registry.extensions(), vec!["flver"]);
        assert!(registry.resources("SPL").is_empty());
    }

    #[test]
    fn replace_after_unload_is_stale() {
        let (registry, allocator) = registry();
        let mut fire = FakeResource::new(&[1, 2, 3]);

        let hash = registry.on_loaded("magic/fire.spl", fire.native());
        assert!(registry.is_valid(hash));

        registry.replace(hash, &[4, 5]).unwrap();
        assert_eq!(registry.read_buffer(hash).unwrap(), vec![4, 5]);
        assert_eq!(registry.info(hash).unwrap().state, HandleState::Overridden);

        registry.on_unloaded(fire.native());
        assert!(fire.is_original());
        assert_eq!(allocator.live(), 0);

        assert_eq!(
            registry.replace(hash, &[6]),
            Err(Error::StaleHandle { path_hash: hash })
        );
        assert_eq!(
            registry.restore(hash),
            Err(Error::StaleHandle { path_hash: hash })
        );
        assert_eq!(allocator.allocations(), 1);
    }

    #[test]
    fn reloading_without_unloading_restores_the_old_handle() {
        let (registry, allocator) = registry();
        let mut first = FakeResource::new(&[1]);
        let mut second = FakeResource::new(&[2]);

        let hash = registry.on_loaded("magic/fire.spl", first.native());
        registry.replace(hash, &[9, 9]).unwrap();

        registry.on_loaded("magic/fire.spl", second.native());

        assert!(first.is_original());
        assert_eq!(allocator.live(), 0);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.read_buffer(hash).unwrap(), vec![2]);

        // The first resource's slot is no longer associated with anything.
        assert!(!registry.on_unloaded(first.native()));
    }

    #[test]
    fn colliding_paths_keep_the_newest_resource() {
        let (registry, allocator) = registry();
        let mut first = FakeResource::new(&[1]);
        let mut second = FakeResource::new(&[2]);

        let hash = registry.on_loaded("magic/b=.spl", first.native());
        registry.replace(hash, &[9]).unwrap();

        assert_eq!(registry.on_loaded("magic/ab.spl", second.native()), hash);

        assert!(first.is_original());
        assert_eq!(allocator.live(), 0);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.info(hash).unwrap().path, "magic/ab.spl");

        let spells: Vec<_> = registry
            .resources("spl")
            .into_iter()
            .map(|info| info.path)
            .collect();
        assert_eq!(spells, vec!["magic/ab.spl"]);
        assert!(!registry.on_unloaded(first.native()));
    }

    #[test]
    fn restore_all_and_teardown_release_every_override() {
        let (registry, allocator) = registry();
        let mut resources: Vec<_> = (0..4).map(|n| FakeResource::new(&[n])).collect();

        let hashes: Vec<_> = resources
            .iter_mut()
            .enumerate()
            .map(|(n, resource)| registry.on_loaded(&format!("magic/{n}.spl"), resource.native()))
            .collect();

        registry.replace(hashes[0], &[7]).unwrap();
        registry.replace(hashes[2], &[7]).unwrap();
        assert_eq!(allocator.live(), 2);

        assert_eq!(registry.restore_all(), 2);
        assert_eq!(allocator.live(), 0);

        registry.replace(hashes[1], &[7]).unwrap();
        registry.teardown();

        assert!(registry.is_empty());
        assert!(registry.extensions().is_empty());
        assert_eq!(allocator.live(), 0);
        assert!(resources.iter().all(FakeResource::is_original));
    }

    #[test]
    fn register_existing_counts_what_it_adds() {
        let (registry, _) = registry();
        let mut fire = FakeResource::new(&[1]);
        let mut ice = FakeResource::new(&[2]);

        let added = registry.register_existing(vec![
            ("magic/fire.spl".to_string(), fire.native()),
            ("magic/ice.spl".to_string(), ice.native()),
        ]);

        assert_eq!(added, 2);
        assert!(registry.find("magic/ice.spl").is_some());
    }

    #[test]
    fn readers_never_see_a_half_replaced_buffer() {
        let (registry, _) = registry();
        let mut resource = FakeResource::new(&[0; 8]);
        let hash = registry.on_loaded("magic/race.spl", resource.native());

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for n in 1..200u8 {
                    registry.replace(hash, &vec![n; n as usize]).unwrap();
                }
            });

            scope.spawn(|| {
                for _ in 0..200 {
                    let bytes = registry.read_buffer(hash).unwrap();
                    let first = bytes[0];

                    // Every buffer is filled with its own length, so a mismatched pointer and
                    // length would show up here.
                    if first != 0 {
                        assert_eq!(bytes.len(), first as usize);
                    }
                    assert!(bytes.iter().all(|byte| *byte == first));
                }
            });
        });

        registry.teardown();
        assert!(resource.is_original());
    }
}
