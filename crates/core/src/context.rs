use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::mounts::MountRegistry;
use crate::settings::Settings;

/// Pluggable secret backend used by the credential round-trip check.
pub trait CredentialStore: Send + Sync {
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn delete(&self, key: &str) -> Result<()>;
}

/// Everything a health check is allowed to touch. Checks receive this by
/// reference; none of them reach for process-wide state.
pub struct DiagnosticsContext {
    pub settings: Settings,
    pub registry: MountRegistry,
    pub credentials: Option<Arc<dyn CredentialStore>>,
}

impl DiagnosticsContext {
    pub fn new(settings: Settings) -> Self {
        let registry = MountRegistry::new(settings.clone());
        Self::with_registry(settings, registry)
    }

    pub fn with_registry(settings: Settings, registry: MountRegistry) -> Self {
        Self {
            settings,
            registry,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// Process-local store, good enough for single-host setups and tests.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, String>>,
}

impl CredentialStore for MemoryCredentialStore {
    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?;
        Ok(guard.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?;
        guard.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CredentialStore, MemoryCredentialStore};

    #[test]
    fn memory_store_round_trips_and_deletes() {
        let store = MemoryCredentialStore::default();
        store.set("probe", "value").expect("set");
        assert_eq!(store.get("probe").expect("get").as_deref(), Some("value"));
        store.delete("probe").expect("delete");
        assert_eq!(store.get("probe").expect("get after delete"), None);
    }
}
