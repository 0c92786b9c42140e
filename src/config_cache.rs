//! Persistent on-disk store for the most recent [`SegmentConfig`].

use std::path::PathBuf;

use crate::{Error, Result, SegmentConfig};

const AUTOTUNE_DIR: &str = "unity.autotune";
const CACHE_FILE: &str = "segmentconfig.json";

/// Persistent store for the most recently accepted [`SegmentConfig`].
///
/// Holds a single file at `{root}/unity.autotune/segmentconfig.json`, read at startup and
/// overwritten whenever a new configuration is accepted. The file is not expected to be accessed
/// by multiple engine instances; concurrent stores within one engine are serialized by the
/// engine's state lock and the last write wins.
#[derive(Debug, Clone)]
pub struct ConfigCache {
    root: PathBuf,
}

impl ConfigCache {
    /// Creates a cache rooted at the given application-owned storage directory.
    pub fn new(root: impl Into<PathBuf>) -> ConfigCache {
        ConfigCache { root: root.into() }
    }

    fn dir_path(&self) -> PathBuf {
        self.root.join(AUTOTUNE_DIR)
    }

    /// Path of the cache file.
    pub fn file_path(&self) -> PathBuf {
        self.dir_path().join(CACHE_FILE)
    }

    /// Reads the cached configuration.
    ///
    /// Returns [`Error::NotFound`] if the file is absent and propagates
    /// [`Error::MalformedCache`] from deserialization; in both cases the caller falls back to
    /// the client defaults.
    pub fn load(&self) -> Result<SegmentConfig> {
        let path = self.file_path();
        if !path.exists() {
            log::debug!(target: "autotune", "no cached segment config at {}", path.display());
            return Err(Error::NotFound);
        }

        let json = std::fs::read_to_string(&path)?;
        let config = SegmentConfig::deserialize(&json)?;
        log::debug!(target: "autotune", "loaded cached segment config: {}", json);
        Ok(config)
    }

    /// Writes the configuration, creating the cache directory if absent.
    pub fn store(&self, config: &SegmentConfig) -> Result<()> {
        let dir = self.dir_path();
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(CACHE_FILE);
        log::debug!(target: "autotune", "storing segment config to {}", path.display());
        std::fs::write(&path, config.serialize())?;
        Ok(())
    }
}

/// A trait for resolving the host's storage roots.
///
/// Mirrors the host's split between durable application storage and a volatile cache directory;
/// the engine resolves one of the two once at init.
pub trait HostStorage {
    /// Root that survives application restarts and OS cache cleanup.
    fn durable_root(&self) -> PathBuf;
    /// Root that the OS may reclaim; cheaper, used when durability is not requested.
    fn temporary_root(&self) -> PathBuf;
}

/// [`HostStorage`] with a single fixed root for both durable and temporary storage.
pub struct FixedStorageRoot(pub PathBuf);

impl HostStorage for FixedStorageRoot {
    fn durable_root(&self) -> PathBuf {
        self.0.clone()
    }
    fn temporary_root(&self) -> PathBuf {
        self.0.clone()
    }
}

impl ConfigCache {
    /// Resolves the cache root from host storage per the durability request.
    pub fn from_host_storage(storage: &dyn HostStorage, use_durable: bool) -> ConfigCache {
        let root = if use_durable {
            storage.durable_root()
        } else {
            storage.temporary_root()
        };
        ConfigCache::new(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> SegmentConfig {
        SegmentConfig {
            segment_id: "seg-1".to_owned(),
            group_id: 3,
            settings: [("totalObjects".to_owned(), 10.into())].into_iter().collect(),
            config_hash: "deadbeef".to_owned(),
        }
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ConfigCache::new(dir.path());
        assert!(matches!(cache.load(), Err(Error::NotFound)));
    }

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ConfigCache::new(dir.path());

        cache.store(&sample_config()).unwrap();
        let loaded = cache.load().unwrap();
        assert_eq!(loaded, sample_config());
    }

    #[test]
    fn store_creates_directory_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ConfigCache::new(dir.path());

        cache.store(&sample_config()).unwrap();
        cache.store(&sample_config()).unwrap();
        assert!(cache.file_path().exists());
    }

    #[test]
    fn malformed_file_is_reported_as_such() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ConfigCache::new(dir.path());

        std::fs::create_dir_all(cache.file_path().parent().unwrap()).unwrap();
        std::fs::write(cache.file_path(), "{not json").unwrap();
        assert!(matches!(cache.load(), Err(Error::MalformedCache(_))));
    }

    #[test]
    fn last_store_wins() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ConfigCache::new(dir.path());

        cache.store(&sample_config()).unwrap();
        let mut updated = sample_config();
        updated.group_id = 9;
        cache.store(&updated).unwrap();

        assert_eq!(cache.load().unwrap().group_id, 9);
    }
}
