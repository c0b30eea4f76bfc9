//! Per-id configuration cache with lazy, memoized resolution.
//!
//! # Example
//!
//! ```
//! use formatwire_plugin::config::{ConfigCache, JsonObject};
//! use formatwire_plugin::handler::ResolveConfigResult;
//!
//! let mut cache = ConfigCache::new(|plugin: &JsonObject, _global: &JsonObject| {
//!     ResolveConfigResult::new(plugin.len())
//! });
//!
//! let mut plugin = JsonObject::new();
//! plugin.insert("indentWidth".into(), 2.into());
//! cache.register(1, JsonObject::new(), plugin);
//!
//! assert_eq!(*cache.resolve(1, None).unwrap(), 1);
//! cache.release(1).unwrap();
//! assert!(cache.resolve(1, None).is_err());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::{merge_override, JsonObject};
use crate::error::{PluginError, Result};
use crate::handler::{ConfigDiagnostic, ResolveConfigResult};

/// Resolver callback: `(plugin_config, global_config) -> result`.
pub type ConfigResolver<C> =
    Box<dyn Fn(&JsonObject, &JsonObject) -> ResolveConfigResult<C> + Send + Sync>;

/// Memoized output of the resolver for one stored config.
#[derive(Debug)]
struct Resolved<C> {
    config: Arc<C>,
    diagnostics: Vec<ConfigDiagnostic>,
}

impl<C> From<ResolveConfigResult<C>> for Resolved<C> {
    fn from(result: ResolveConfigResult<C>) -> Self {
        Self {
            config: Arc::new(result.config),
            diagnostics: result.diagnostics,
        }
    }
}

/// Raw inputs as registered, plus the lazily resolved value.
struct StoredConfig<C> {
    global_config: JsonObject,
    plugin_config: JsonObject,
    resolved: OnceCell<Resolved<C>>,
}

/// Configurations registered by the host, keyed by config id.
pub struct ConfigCache<C> {
    configs: HashMap<u32, StoredConfig<C>>,
    resolver: ConfigResolver<C>,
}

impl<C> ConfigCache<C> {
    /// Create an empty cache using `resolver` for resolution.
    pub fn new<F>(resolver: F) -> Self
    where
        F: Fn(&JsonObject, &JsonObject) -> ResolveConfigResult<C> + Send + Sync + 'static,
    {
        Self {
            configs: HashMap::new(),
            resolver: Box::new(resolver),
        }
    }

    /// Store raw configuration under `config_id`, replacing any previous
    /// entry and its memoized result.
    pub fn register(&mut self, config_id: u32, global_config: JsonObject, plugin_config: JsonObject) {
        self.configs.insert(
            config_id,
            StoredConfig {
                global_config,
                plugin_config,
                resolved: OnceCell::new(),
            },
        );
    }

    /// Forget `config_id`.
    pub fn release(&mut self, config_id: u32) -> Result<()> {
        self.configs
            .remove(&config_id)
            .map(|_| ())
            .ok_or(PluginError::ConfigNotFound(config_id))
    }

    /// Resolved configuration for `config_id`.
    ///
    /// Without an override (or with an empty one) the memoized result is
    /// used, computing it on first access. A non-empty override is merged
    /// over the plugin config and resolved fresh every time; that result
    /// is never cached.
    pub fn resolve(&self, config_id: u32, override_config: Option<&JsonObject>) -> Result<Arc<C>> {
        let stored = self.stored(config_id)?;
        match override_config {
            Some(override_config) if !override_config.is_empty() => {
                let plugin_config = merge_override(&stored.plugin_config, override_config);
                let result = (self.resolver)(&plugin_config, &stored.global_config);
                Ok(Arc::new(result.config))
            }
            _ => Ok(self.memoized(stored).config.clone()),
        }
    }

    /// Diagnostics from resolving `config_id` without overrides.
    pub fn diagnostics(&self, config_id: u32) -> Result<&[ConfigDiagnostic]> {
        let stored = self.stored(config_id)?;
        Ok(&self.memoized(stored).diagnostics)
    }

    /// Whether `config_id` is registered.
    pub fn contains(&self, config_id: u32) -> bool {
        self.configs.contains_key(&config_id)
    }

    /// Number of registered configs.
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Whether no configs are registered.
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    fn stored(&self, config_id: u32) -> Result<&StoredConfig<C>> {
        self.configs
            .get(&config_id)
            .ok_or(PluginError::ConfigNotFound(config_id))
    }

    fn memoized<'a>(&self, stored: &'a StoredConfig<C>) -> &'a Resolved<C> {
        stored.resolved.get_or_init(|| {
            tracing::debug!("resolving config");
            (self.resolver)(&stored.plugin_config, &stored.global_config).into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn object(value: serde_json::Value) -> JsonObject {
        match value {
            serde_json::Value::Object(o) => o,
            _ => panic!("not an object"),
        }
    }

    /// Cache whose resolver returns the plugin config and counts calls.
    fn counting_cache() -> (ConfigCache<JsonObject>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache = ConfigCache::new(move |plugin: &JsonObject, _global: &JsonObject| {
            counter.fetch_add(1, Ordering::SeqCst);
            ResolveConfigResult::new(plugin.clone())
        });
        (cache, calls)
    }

    #[test]
    fn test_resolve_without_override_is_memoized() {
        let (mut cache, calls) = counting_cache();
        cache.register(1, JsonObject::new(), object(json!({ "indentWidth": 2 })));

        let first = cache.resolve(1, None).unwrap();
        let second = cache.resolve(1, None).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, object(json!({ "indentWidth": 2 })));
    }

    #[test]
    fn test_empty_override_uses_memoized_value() {
        let (mut cache, calls) = counting_cache();
        cache.register(1, JsonObject::new(), JsonObject::new());

        cache.resolve(1, Some(&JsonObject::new())).unwrap();
        cache.resolve(1, None).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_override_is_never_cached() {
        let (mut cache, calls) = counting_cache();
        cache.register(1, JsonObject::new(), object(json!({ "a": 1 })));
        let overrides = object(json!({ "k": "v" }));

        cache.resolve(1, Some(&overrides)).unwrap();
        cache.resolve(1, Some(&overrides)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // The stored config is untouched by overrides.
        assert_eq!(*cache.resolve(1, None).unwrap(), object(json!({ "a": 1 })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_override_merge_passed_to_resolver() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let mut cache = ConfigCache::new(move |plugin: &JsonObject, global: &JsonObject| {
            recorder.lock().unwrap().push((plugin.clone(), global.clone()));
            ResolveConfigResult::new(())
        });
        cache.register(
            4,
            object(json!({ "lineWidth": 120 })),
            object(json!({ "a": 1, "b": 2 })),
        );

        cache.resolve(4, Some(&object(json!({ "b": 9, "c": 3 })))).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, object(json!({ "a": 1, "b": 9, "c": 3 })));
        assert_eq!(seen[0].1, object(json!({ "lineWidth": 120 })));
    }

    #[test]
    fn test_diagnostics_share_memoized_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut cache = ConfigCache::new(move |_: &JsonObject, _: &JsonObject| {
            counter.fetch_add(1, Ordering::SeqCst);
            ResolveConfigResult::new(0u8)
                .with_diagnostics(vec![ConfigDiagnostic::new("tabs", "Unknown property")])
        });
        cache.register(1, JsonObject::new(), JsonObject::new());

        assert_eq!(
            cache.diagnostics(1).unwrap(),
            &[ConfigDiagnostic::new("tabs", "Unknown property")]
        );
        cache.resolve(1, None).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_register_replaces_entry_and_memo() {
        let (mut cache, calls) = counting_cache();
        cache.register(1, JsonObject::new(), object(json!({ "v": 1 })));
        cache.resolve(1, None).unwrap();

        cache.register(1, JsonObject::new(), object(json!({ "v": 2 })));
        assert_eq!(*cache.resolve(1, None).unwrap(), object(json!({ "v": 2 })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_unknown_and_released_ids_are_not_found() {
        let (mut cache, _) = counting_cache();

        assert!(matches!(cache.resolve(3, None), Err(PluginError::ConfigNotFound(3))));
        assert!(matches!(cache.diagnostics(3), Err(PluginError::ConfigNotFound(3))));
        assert!(matches!(cache.release(3), Err(PluginError::ConfigNotFound(3))));

        cache.register(3, JsonObject::new(), JsonObject::new());
        cache.release(3).unwrap();
        assert!(!cache.contains(3));
        assert!(matches!(cache.resolve(3, None), Err(PluginError::ConfigNotFound(3))));
        assert!(matches!(cache.release(3), Err(PluginError::ConfigNotFound(3))));
    }
}
