use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::{DriverError, DriverParameters, DriverResult, StorageDriver};

/// Constructor stored in a [`DriverRegistry`]
pub type DriverFactory = Arc<
    dyn Fn(DriverParameters) -> BoxFuture<'static, DriverResult<Arc<dyn StorageDriver>>>
        + Send
        + Sync,
>;

/// Maps driver names to constructors.
///
/// Nothing registers itself: the host fills the registry at startup, e.g.
/// `registry.register(s3::DRIVER_NAME, s3::factory)`.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a constructor under a given name, replacing any previous one.
    pub fn register<S, F, Fut>(&mut self, name: S, factory: F)
    where
        S: Into<String>,
        F: Fn(DriverParameters) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DriverResult<Arc<dyn StorageDriver>>> + Send + 'static,
    {
        let boxed: DriverFactory = Arc::new(move |parameters| factory(parameters).boxed());
        self.factories.insert(name.into(), boxed);
    }

    /// Construct the driver registered under `name`.
    pub async fn create(
        &self,
        name: &str,
        parameters: DriverParameters,
    ) -> DriverResult<Arc<dyn StorageDriver>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| DriverError::UnknownDriver {
                name: name.to_string(),
            })?;
        factory(parameters).await
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{s3, ChunkRules, MemoryObjectStore, ObjectDriver, ObjectOptions};
    use bytes::Bytes;

    async fn memory_factory(_parameters: DriverParameters) -> DriverResult<Arc<dyn StorageDriver>> {
        let store = Arc::new(MemoryObjectStore::new());
        let driver = ObjectDriver::connect(store, ChunkRules::default(), ObjectOptions::default()).await?;
        Ok(Arc::new(driver))
    }

    #[tokio::test]
    async fn test_register_and_create() {
        let mut registry = DriverRegistry::new();
        registry.register("inmemory", memory_factory);
        registry.register(s3::DRIVER_NAME, s3::factory);

        assert!(registry.is_registered("inmemory"));
        assert_eq!(registry.names(), vec!["inmemory", "s3"]);

        let driver = registry
            .create("inmemory", DriverParameters::new())
            .await
            .unwrap();
        driver.put_content("/x", Bytes::from_static(b"1")).await.unwrap();
        assert_eq!(driver.get_content("/x").await.unwrap(), Bytes::from_static(b"1"));
    }

    #[tokio::test]
    async fn test_unknown_driver() {
        let registry = DriverRegistry::new();
        let result = registry.create("gcs", DriverParameters::new()).await;
        assert!(matches!(result, Err(DriverError::UnknownDriver { ref name }) if name == "gcs"));
    }

    #[tokio::test]
    async fn test_s3_factory_rejects_bad_parameters() {
        let mut registry = DriverRegistry::new();
        registry.register(s3::DRIVER_NAME, s3::factory);

        let result = registry.create("s3", DriverParameters::new()).await;
        assert!(matches!(result, Err(DriverError::InvalidParameter { .. })));
    }
}
