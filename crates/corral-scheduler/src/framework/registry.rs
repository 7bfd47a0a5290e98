use super::handle::FrameworkHandle;
use super::interface::Plugin;
use crate::error::{Result, SchedulerError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds a plugin bound to the framework handle
pub type PluginFactory =
    Box<dyn Fn(Arc<FrameworkHandle>) -> Result<Arc<dyn Plugin>> + Send + Sync>;

/// Mapping from plugin name to factory
#[derive(Default)]
pub struct Registry {
    factories: BTreeMap<String, PluginFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory; fails if the name is taken
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(Arc<FrameworkHandle>) -> Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(SchedulerError::framework_error(
                format!("a plugin named {} already exists", name),
                "Register each plugin under a unique name",
            ));
        }
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Result<()> {
        self.factories.remove(name).map(|_| ()).ok_or_else(|| {
            SchedulerError::framework_error(
                format!("no plugin named {} exists", name),
                "Check the registered plugin names",
            )
        })
    }

    /// Move every factory of `other` into this registry
    pub fn merge(&mut self, other: Registry) -> Result<()> {
        for (name, factory) in other.factories {
            if self.factories.contains_key(&name) {
                return Err(SchedulerError::framework_error(
                    format!("a plugin named {} already exists", name),
                    "Out-of-tree plugins must not reuse in-tree plugin names",
                ));
            }
            self.factories.insert(name, factory);
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &PluginFactory)> {
        self.factories.iter()
    }
}

/// Builds a registry from a fixed table; a repeated name keeps the last factory
impl FromIterator<(String, PluginFactory)> for Registry {
    fn from_iter<I: IntoIterator<Item = (String, PluginFactory)>>(iter: I) -> Self {
        Self {
            factories: iter.into_iter().collect(),
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
