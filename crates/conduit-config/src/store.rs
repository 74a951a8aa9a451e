use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::Config;

/// Cached, atomically reloadable configuration
///
/// The file is parsed once on [`ConfigStore::open`]. [`ConfigStore::get`]
/// hands out the cached `Arc<Config>` without touching the file again.
/// [`ConfigStore::reload`] parses the file into a brand-new `Config` and
/// swaps it in as a whole; readers holding the previous `Arc` keep a
/// consistent view.
///
/// The store only refreshes its own snapshot. Components built from an
/// earlier snapshot, such as a running gateway, keep serving with it until
/// they are rebuilt from [`ConfigStore::get`].
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<Config>>,
}

impl ConfigStore {
    /// Parse the file at `path` and cache the result
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let config = Config::load(&path)?;

        Ok(Self {
            path,
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// Path the store was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current configuration
    pub fn get(&self) -> Arc<Config> {
        let guard = self.current.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Re-read the file and replace the cached configuration
    ///
    /// On failure the previous configuration stays in place. Snapshots
    /// already handed out are not updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the new configuration cannot be loaded
    pub fn reload(&self) -> anyhow::Result<Arc<Config>> {
        let config = Arc::new(Config::load(&self.path)?);

        let mut guard = self.current.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Arc::clone(&config);
        drop(guard);

        tracing::info!(path = %self.path.display(), providers = config.providers.len(), "configuration reloaded");

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str) -> String {
        format!(
            "[[providers]]\nname = \"{name}\"\nprotocol = \"openai\"\nbase_url = \"http://localhost\"\nkey_env = \"KEY\"\npatterns = [\"m\"]\n"
        )
    }

    #[test]
    fn get_returns_cached_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conduit.toml");
        std::fs::write(&path, provider("first")).unwrap();

        let store = ConfigStore::open(&path).unwrap();
        std::fs::write(&path, provider("second")).unwrap();

        let config = store.get();
        assert_eq!(config.providers[0].name, "first");
        assert!(Arc::ptr_eq(&config, &store.get()));
    }

    #[test]
    fn reload_swaps_whole_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conduit.toml");
        std::fs::write(&path, provider("first")).unwrap();

        let store = ConfigStore::open(&path).unwrap();
        let before = store.get();

        std::fs::write(&path, provider("second")).unwrap();
        store.reload().unwrap();

        // Earlier snapshots are left untouched
        assert_eq!(before.providers[0].name, "first");
        assert!(!Arc::ptr_eq(&before, &store.get()));
        assert_eq!(store.get().providers[0].name, "second");
    }

    #[test]
    fn failed_reload_keeps_previous_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conduit.toml");
        std::fs::write(&path, provider("first")).unwrap();

        let store = ConfigStore::open(&path).unwrap();
        std::fs::write(&path, "not = [valid").unwrap();

        assert!(store.reload().is_err());
        assert_eq!(store.get().providers[0].name, "first");
    }
}
