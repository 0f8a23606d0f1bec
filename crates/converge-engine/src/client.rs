//! Cloud client cache
//!
//! The engine never constructs or authenticates provider clients. A
//! [`ClientProvider`] hands out long-lived handles on demand and the
//! [`ClientCache`] keeps one per (service, region) for the life of the
//! process that owns it. Handles are opaque to the engine; adapters downcast
//! them to their concrete SDK client type.

use crate::error::Result;
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Opaque, shareable client handle
pub type ClientHandle = Arc<dyn Any + Send + Sync>;

/// Produces client handles for a (service, region) pair
#[async_trait]
pub trait ClientProvider: Send + Sync {
    async fn connect(&self, service: &str, region: &str) -> Result<ClientHandle>;
}

/// Caches client handles by (service, region)
pub struct ClientCache {
    provider: Arc<dyn ClientProvider>,
    handles: Mutex<HashMap<(String, String), ClientHandle>>,
}

impl ClientCache {
    pub fn new(provider: Arc<dyn ClientProvider>) -> Self {
        Self {
            provider,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Get the cached handle for a (service, region), connecting on first use
    pub async fn get(&self, service: &str, region: &str) -> Result<ClientHandle> {
        let key = (service.to_string(), region.to_string());
        if let Some(handle) = self.handles.lock().expect("client cache poisoned").get(&key) {
            return Ok(handle.clone());
        }
        tracing::debug!(service, region, "connecting cloud client");
        let handle = self.provider.connect(service, region).await?;
        let mut handles = self.handles.lock().expect("client cache poisoned");
        // A concurrent connect for the same key may have won; keep the first
        Ok(handles.entry(key).or_insert(handle).clone())
    }
}

/// Downcast an opaque handle to its concrete client type
pub fn typed_client<T: Send + Sync + 'static>(handle: ClientHandle) -> Option<Arc<T>> {
    handle.downcast::<T>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl ClientProvider for CountingProvider {
        async fn connect(&self, service: &str, region: &str) -> Result<ClientHandle> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(format!("{service}@{region}")))
        }
    }

    #[tokio::test]
    async fn handles_are_cached_per_service_region() {
        let provider = Arc::new(CountingProvider {
            connects: AtomicUsize::new(0),
        });
        let cache = ClientCache::new(provider.clone());

        let a = cache.get("compute", "ap-east-1").await.unwrap();
        let b = cache.get("compute", "ap-east-1").await.unwrap();
        let c = cache.get("compute", "ap-west-2").await.unwrap();

        assert_eq!(provider.connects.load(Ordering::SeqCst), 2);
        assert_eq!(
            typed_client::<String>(a).as_deref(),
            Some(&"compute@ap-east-1".to_string())
        );
        assert_eq!(
            typed_client::<String>(b).as_deref(),
            Some(&"compute@ap-east-1".to_string())
        );
        assert_eq!(
            typed_client::<String>(c).as_deref(),
            Some(&"compute@ap-west-2".to_string())
        );
    }
}
