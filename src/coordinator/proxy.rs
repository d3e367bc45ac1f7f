use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::config::CoordinatorConfig;
use crate::error::Result;
use crate::model::{ResultEnvelope, TriggerMessage};

/// The worker-side operations the coordinator invokes remotely. `run` is the
/// only call on the dispatch path; `beat`/`idle_beat` back the failover and
/// busyover route strategies.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run(&self, message: &TriggerMessage) -> Result<ResultEnvelope<String>>;

    async fn beat(&self) -> Result<ResultEnvelope<String>>;

    async fn idle_beat(&self, job_id: i32) -> Result<ResultEnvelope<String>>;
}

/// Builds a stub bound to one worker address. Construction must not block:
/// connections are established lazily on first use.
pub trait ExecutorStubFactory: Send + Sync {
    fn new_stub(
        &self,
        address: &str,
        access_token: &str,
        timeout: Duration,
    ) -> Arc<dyn RemoteExecutor>;
}

/// Maps a worker address string to a cached remote-invocation stub.
///
/// Lookup and insert are lock-free beyond the map's own shards; duplicate
/// concurrent construction for the same address is acceptable (last writer
/// wins, both stubs are behaviorally identical). Addresses are assumed
/// stable for process lifetime, so there is no eviction; `invalidate` is
/// available for callers that learn an address has moved.
pub struct ExecutorStubCache {
    stubs: DashMap<String, Arc<dyn RemoteExecutor>>,
    factory: Arc<dyn ExecutorStubFactory>,
    access_token: String,
    timeout: Duration,
}

impl ExecutorStubCache {
    pub fn new(
        factory: Arc<dyn ExecutorStubFactory>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            stubs: DashMap::new(),
            factory,
            access_token: access_token.into(),
            timeout,
        }
    }

    /// Cache carrying the configured access token and RPC timeout.
    pub fn from_config(factory: Arc<dyn ExecutorStubFactory>, config: &CoordinatorConfig) -> Self {
        Self::new(factory, config.access_token.clone(), config.rpc_timeout())
    }

    /// Resolve the stub for `address`, constructing and caching it on miss.
    /// A blank address yields `None` rather than an error, so callers can
    /// treat "no address" as a no-op.
    pub fn get_stub(&self, address: &str) -> Option<Arc<dyn RemoteExecutor>> {
        let address = address.trim();
        if address.is_empty() {
            return None;
        }

        if let Some(stub) = self.stubs.get(address) {
            return Some(stub.clone());
        }

        let stub = self
            .factory
            .new_stub(address, &self.access_token, self.timeout);
        self.stubs.insert(address.to_string(), stub.clone());
        Some(stub)
    }

    /// Drop the cached stub for `address`, forcing reconstruction on the
    /// next lookup.
    pub fn invalidate(&self, address: &str) {
        self.stubs.remove(address.trim());
    }

    #[cfg(test)]
    pub(crate) fn cached_len(&self) -> usize {
        self.stubs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullExecutor;

    #[async_trait]
    impl RemoteExecutor for NullExecutor {
        async fn run(&self, _message: &TriggerMessage) -> Result<ResultEnvelope<String>> {
            Ok(ResultEnvelope::ok())
        }

        async fn beat(&self) -> Result<ResultEnvelope<String>> {
            Ok(ResultEnvelope::ok())
        }

        async fn idle_beat(&self, _job_id: i32) -> Result<ResultEnvelope<String>> {
            Ok(ResultEnvelope::ok())
        }
    }

    struct CountingFactory {
        built: AtomicUsize,
    }

    impl ExecutorStubFactory for CountingFactory {
        fn new_stub(
            &self,
            _address: &str,
            _access_token: &str,
            _timeout: Duration,
        ) -> Arc<dyn RemoteExecutor> {
            self.built.fetch_add(1, Ordering::SeqCst);
            Arc::new(NullExecutor)
        }
    }

    fn cache_with_counter() -> (ExecutorStubCache, Arc<CountingFactory>) {
        let factory = Arc::new(CountingFactory {
            built: AtomicUsize::new(0),
        });
        let cache = ExecutorStubCache::new(factory.clone(), "", Duration::from_secs(3));
        (cache, factory)
    }

    #[test]
    fn blank_address_yields_none() {
        let (cache, factory) = cache_with_counter();
        assert!(cache.get_stub("").is_none());
        assert!(cache.get_stub("   ").is_none());
        assert_eq!(factory.built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stub_is_memoized_per_trimmed_address() {
        let (cache, factory) = cache_with_counter();
        assert!(cache.get_stub("10.0.0.1:9999").is_some());
        assert!(cache.get_stub("  10.0.0.1:9999 ").is_some());
        assert_eq!(factory.built.load(Ordering::SeqCst), 1);
        assert_eq!(cache.cached_len(), 1);
    }

    struct CapturingFactory {
        seen: std::sync::Mutex<Vec<(String, Duration)>>,
    }

    impl ExecutorStubFactory for CapturingFactory {
        fn new_stub(
            &self,
            _address: &str,
            access_token: &str,
            timeout: Duration,
        ) -> Arc<dyn RemoteExecutor> {
            self.seen
                .lock()
                .unwrap()
                .push((access_token.to_string(), timeout));
            Arc::new(NullExecutor)
        }
    }

    #[test]
    fn from_config_hands_token_and_timeout_to_the_factory() {
        let factory = Arc::new(CapturingFactory {
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let config = CoordinatorConfig {
            access_token: "secret".to_string(),
            rpc_timeout_ms: 1_500,
            ..Default::default()
        };
        let cache = ExecutorStubCache::from_config(factory.clone(), &config);
        assert!(cache.get_stub("10.0.0.1:9999").is_some());

        let seen = factory.seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[("secret".to_string(), Duration::from_millis(1_500))]
        );
    }

    #[test]
    fn invalidate_forces_reconstruction() {
        let (cache, factory) = cache_with_counter();
        cache.get_stub("10.0.0.1:9999");
        cache.invalidate("10.0.0.1:9999");
        cache.get_stub("10.0.0.1:9999");
        assert_eq!(factory.built.load(Ordering::SeqCst), 2);
    }
}
