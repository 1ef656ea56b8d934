use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{MofkaError, Result};
use crate::metadata::Metadata;

use super::selector::{PartitionSelector, RoundRobinSelector};
use super::serializer::{JsonSerializer, Serializer};
use super::validator::{AcceptAllValidator, Validator};

type ValidatorCtor = Arc<dyn Fn(&Metadata) -> Result<Arc<dyn Validator>> + Send + Sync>;
type SelectorCtor = Arc<dyn Fn(&Metadata) -> Result<Arc<dyn PartitionSelector>> + Send + Sync>;
type SerializerCtor = Arc<dyn Fn(&Metadata) -> Result<Arc<dyn Serializer>> + Send + Sync>;

/// Process-wide registry of Validator/PartitionSelector/Serializer
/// factories, keyed by name.
///
/// Mirrors the upstream `Factory<Base, Args...>` template
/// (`include/mofka/Factory.hpp`): a name of the form `"key:lib"` causes
/// the registry to attempt to load `lib` as a shared library the first
/// time `key` is looked up and not found; the library is expected to
/// self-register its factory under `key` as a side effect of loading
/// (e.g. a `#[ctor]`-style static initializer in the library). If,
/// after loading, `key` is still unregistered, resolution fails with
/// `UnknownPlugin`.
pub struct PolicyRegistry {
    validators: RwLock<HashMap<String, ValidatorCtor>>,
    selectors: RwLock<HashMap<String, SelectorCtor>>,
    serializers: RwLock<HashMap<String, SerializerCtor>>,
    // Keeps loaded libraries alive for the life of the process; a
    // library whose symbols are still referenced by factories must not
    // be unloaded underneath them.
    loaded_libs: Mutex<Vec<libloading::Library>>,
}

impl PolicyRegistry {
    fn new() -> Self {
        Self {
            validators: RwLock::new(HashMap::new()),
            selectors: RwLock::new(HashMap::new()),
            serializers: RwLock::new(HashMap::new()),
            loaded_libs: Mutex::new(Vec::new()),
        }
    }

    fn register_builtins(&self) {
        self.register_validator("default", |_cfg| Ok(Arc::new(AcceptAllValidator) as Arc<dyn Validator>));
        self.register_selector("default", |_cfg| {
            Ok(Arc::new(RoundRobinSelector::new()) as Arc<dyn PartitionSelector>)
        });
        self.register_serializer("default", |_cfg| Ok(Arc::new(JsonSerializer) as Arc<dyn Serializer>));
    }

    pub fn register_validator(
        &self,
        key: &str,
        ctor: impl Fn(&Metadata) -> Result<Arc<dyn Validator>> + Send + Sync + 'static,
    ) {
        self.validators.write().insert(key.to_string(), Arc::new(ctor));
    }

    pub fn register_selector(
        &self,
        key: &str,
        ctor: impl Fn(&Metadata) -> Result<Arc<dyn PartitionSelector>> + Send + Sync + 'static,
    ) {
        self.selectors.write().insert(key.to_string(), Arc::new(ctor));
    }

    pub fn register_serializer(
        &self,
        key: &str,
        ctor: impl Fn(&Metadata) -> Result<Arc<dyn Serializer>> + Send + Sync + 'static,
    ) {
        self.serializers.write().insert(key.to_string(), Arc::new(ctor));
    }

    fn ensure_loaded(&self, key: &str, lib_path: Option<&str>, already_registered: bool) -> Result<()> {
        if already_registered {
            return Ok(());
        }
        let Some(path) = lib_path else {
            return Ok(());
        };
        debug!(key, path, "attempting to load policy plugin library");
        // SAFETY: loading an external shared library is inherently
        // unsafe; the caller is trusted to supply a library built
        // against this crate's plugin ABI.
        let lib = unsafe { libloading::Library::new(path) }
            .map_err(|e| MofkaError::PluginLoadFailed(format!("{path}: {e}")))?;
        self.loaded_libs.lock().push(lib);
        Ok(())
    }

    pub fn create_validator(&self, name: &str, config: &Metadata) -> Result<Arc<dyn Validator>> {
        let (key, lib_path) = split_name(name);
        let existing = self.validators.read().get(key).cloned();
        self.ensure_loaded(key, lib_path, existing.is_some())?;
        let ctor = self
            .validators
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| MofkaError::UnknownPlugin(key.to_string()))?;
        ctor(config)
    }

    pub fn create_selector(&self, name: &str, config: &Metadata) -> Result<Arc<dyn PartitionSelector>> {
        let (key, lib_path) = split_name(name);
        let existing = self.selectors.read().get(key).cloned();
        self.ensure_loaded(key, lib_path, existing.is_some())?;
        let ctor = self
            .selectors
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| MofkaError::UnknownPlugin(key.to_string()))?;
        ctor(config)
    }

    pub fn create_serializer(&self, name: &str, config: &Metadata) -> Result<Arc<dyn Serializer>> {
        let (key, lib_path) = split_name(name);
        let existing = self.serializers.read().get(key).cloned();
        self.ensure_loaded(key, lib_path, existing.is_some())?;
        let ctor = self
            .serializers
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| MofkaError::UnknownPlugin(key.to_string()))?;
        ctor(config)
    }
}

fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.split_once(':') {
        Some((key, path)) => (key, Some(path)),
        None => (name, None),
    }
}

static REGISTRY: Lazy<PolicyRegistry> = Lazy::new(|| {
    let registry = PolicyRegistry::new();
    registry.register_builtins();
    registry
});

/// Returns the process-global policy registry, initializing the
/// built-in `"default"` validator/selector/serializer on first use.
pub fn registry() -> &'static PolicyRegistry {
    if REGISTRY.validators.read().is_empty() {
        warn!("policy registry initialized with no validators registered");
    }
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_validator_resolves() {
        let v = registry().create_validator("default", &Metadata::new(json!({}))).unwrap();
        assert!(v
            .validate(&Metadata::new(json!({})), &crate::data::DataView::empty())
            .is_ok());
    }

    #[test]
    fn unknown_plugin_without_lib_fails() {
        let err = registry()
            .create_validator("nonexistent", &Metadata::new(json!({})))
            .unwrap_err();
        assert!(matches!(err, MofkaError::UnknownPlugin(_)));
    }

    #[test]
    fn unknown_lib_path_fails_to_load() {
        let err = registry()
            .create_validator("custom:/no/such/library.so", &Metadata::new(json!({})))
            .unwrap_err();
        assert!(matches!(err, MofkaError::PluginLoadFailed(_)));
    }

    #[test]
    fn custom_registration_is_resolvable_by_key() {
        registry().register_validator("always_reject", |_cfg| {
            Ok(Arc::new(super::super::validator::RequiredFieldsValidator::new(vec![
                "must_have".to_string(),
            ])) as Arc<dyn Validator>)
        });
        let v = registry()
            .create_validator("always_reject", &Metadata::new(json!({})))
            .unwrap();
        assert!(v
            .validate(&Metadata::new(json!({})), &crate::data::DataView::empty())
            .is_err());
    }
}
