use crate::builtin::{BundlePlugin, DumpPlugin, NilPlugin};
use crate::plugin::Plugin;
use crate::PluginError;
use craftpack_schema::PartSpec;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Plugins keyed by name.
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(NilPlugin));
        registry.register(Arc::new(DumpPlugin));
        registry.register(Arc::new(BundlePlugin));
        registry
    }
}

impl PluginRegistry {
    /// Registry with the built-in plugins.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn empty() -> Self {
        Self {
            plugins: BTreeMap::new(),
        }
    }

    /// Add a plugin, replacing any plugin registered under the same name.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.insert(plugin.name().to_owned(), plugin);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    /// Resolve the plugin for a part.
    pub fn for_part(&self, part: &PartSpec) -> Result<Arc<dyn Plugin>, PluginError> {
        self.get(&part.plugin)
            .ok_or_else(|| PluginError::UnknownPlugin {
                part: part.name.to_string(),
                plugin: part.plugin.to_string(),
            })
    }

    /// Check that every part names a known plugin and passes its option check.
    pub fn validate<'a>(
        &self,
        parts: impl IntoIterator<Item = &'a PartSpec>,
    ) -> Result<(), PluginError> {
        for part in parts {
            self.for_part(part)?.validate_options(part)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPlugin;
    use craftpack_schema::PartDecl;
    use std::path::Path;

    fn part(name: &str, plugin: &str) -> PartSpec {
        PartDecl {
            plugin: Some(plugin.to_owned()),
            ..PartDecl::default()
        }
        .normalize(name, Path::new("/proj"))
        .unwrap()
    }

    #[test]
    fn builtins_are_registered() {
        let registry = PluginRegistry::new();
        assert_eq!(registry.names(), ["bundle", "dump", "nil"]);
    }

    #[test]
    fn unknown_plugin_fails_validation() {
        let registry = PluginRegistry::new();
        let parts = [part("a", "dump"), part("b", "rust")];
        let err = registry.validate(&parts).unwrap_err();
        assert_eq!(err.to_string(), "Part 'b' uses unknown plugin 'rust'.");
    }

    #[test]
    fn registered_plugin_resolves() {
        let mut registry = PluginRegistry::empty();
        registry.register(Arc::new(MockPlugin::new("fake")));
        let p = registry.for_part(&part("x", "fake")).unwrap();
        assert_eq!(p.name(), "fake");
        assert!(registry.get("dump").is_none());
    }
}
