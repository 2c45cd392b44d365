//! Adapter registry
//!
//! Authoritative, ordered collection of registered adapters. Adapters are
//! keyed by host; positions are append-only and removal keeps the relative
//! order of the remaining entries.
//!
//! Mutations (`add`, `remove`) are serialized through a single writer lock,
//! held only while the entry list is checked or changed. The adapter RPCs of
//! a registration run outside it; a per-host in-flight set keeps two
//! registrations of the same host from both reaching the adapter.
//! Readers take copies from an `RwLock`ed vector and never observe a
//! half-applied mutation; availability is read from each entry's atomic flag
//! at snapshot time.
//!
//! Hosts are compared after trimming surrounding whitespace.

use mesh_control_core::{Adapter, ComponentInfo};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::adapters::{AdapterClientError, AdapterConnector};
use crate::config::RegistrySettings;
use crate::ports::{PortAllocator, PortAllocatorError};
use crate::prober::{spawn_prober, EndpointProbe, ProbeHandle};

/// Errors from registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Adapter already registered: {0}")]
    AlreadyRegistered(String),
    #[error("Adapter not found: {0}")]
    NotFound(String),
    #[error("Invalid adapter location: {0:?}")]
    InvalidHost(String),
    #[error("Unable to connect to adapter {host}: {source}")]
    Connection {
        host: String,
        #[source]
        source: AdapterClientError,
    },
    #[error("Unable to retrieve metadata from adapter {host}: {source}")]
    MetadataFetch {
        host: String,
        #[source]
        source: AdapterClientError,
    },
    #[error("Adapter {host} did not respond within {}ms", .after.as_millis())]
    Timeout { host: String, after: Duration },
    #[error(transparent)]
    PortAllocation(#[from] PortAllocatorError),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

struct AdapterEntry {
    adapter: Adapter,
    available: Arc<AtomicBool>,
    prober: ProbeHandle,
}

impl AdapterEntry {
    fn snapshot(&self) -> Adapter {
        let mut adapter = self.adapter.clone();
        adapter.available = self.available.load(Ordering::Acquire);
        adapter
    }
}

/// The set of registered adapters
pub struct AdapterRegistry {
    connector: Arc<dyn AdapterConnector>,
    probe: Arc<dyn EndpointProbe>,
    ports: PortAllocator,
    settings: RegistrySettings,
    entries: RwLock<Vec<AdapterEntry>>,
    writer: Mutex<()>,
    in_flight: StdMutex<HashSet<String>>,
}

/// Marks a host as being registered; unmarks it on drop.
struct Reservation<'a> {
    in_flight: &'a StdMutex<HashSet<String>>,
    host: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.host);
    }
}

fn normalize_host(host: &str) -> &str {
    host.trim()
}

impl AdapterRegistry {
    pub fn new(
        connector: Arc<dyn AdapterConnector>,
        probe: Arc<dyn EndpointProbe>,
        settings: RegistrySettings,
    ) -> Self {
        let ports = PortAllocator::new(settings.port_range_start..=settings.port_range_end);
        Self::with_ports(connector, probe, settings, ports)
    }

    /// Use a caller-provided port allocator.
    pub fn with_ports(
        connector: Arc<dyn AdapterConnector>,
        probe: Arc<dyn EndpointProbe>,
        settings: RegistrySettings,
        ports: PortAllocator,
    ) -> Self {
        Self {
            connector,
            probe,
            ports,
            settings,
            entries: RwLock::new(Vec::new()),
            writer: Mutex::new(()),
            in_flight: StdMutex::new(HashSet::new()),
        }
    }

    /// Register the adapter at `host` with the default RPC deadline.
    pub async fn add(&self, host: &str) -> RegistryResult<Adapter> {
        self.add_with_deadline(host, self.settings.rpc_timeout()).await
    }

    /// Register the adapter at `host`.
    ///
    /// Connects, fetches the supported operations and component info, and
    /// only then allocates a port, starts the prober and appends the entry.
    /// Any failure before that point leaves the registry untouched.
    #[instrument(skip(self))]
    pub async fn add_with_deadline(&self, host: &str, deadline: Duration) -> RegistryResult<Adapter> {
        let host = normalize_host(host);
        if host.is_empty() {
            return Err(RegistryError::InvalidHost(host.to_string()));
        }

        let _reservation = self.reserve(host).await?;
        let (ops, info) = self.fetch_metadata(host, deadline).await?;

        let _writer = self.writer.lock().await;
        let port = self.ports.allocate()?;
        let adapter = Adapter::new(host, info, ops, port);

        let available = Arc::new(AtomicBool::new(true));
        let prober = spawn_prober(
            host.to_string(),
            available.clone(),
            self.probe.clone(),
            self.settings.probe_interval(),
        );

        self.entries.write().await.push(AdapterEntry {
            adapter: adapter.clone(),
            available,
            prober,
        });

        info!(
            host = %adapter.host,
            name = %adapter.name,
            version = %adapter.version,
            port = adapter.port,
            ops = adapter.ops.len(),
            "Registered adapter"
        );

        Ok(adapter)
    }

    /// Claim `host` for a registration, unless it is registered or already
    /// being registered.
    async fn reserve(&self, host: &str) -> RegistryResult<Reservation<'_>> {
        let _writer = self.writer.lock().await;

        let registered = self.contains_host(host).await;
        let claimed = !registered
            && self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(host.to_string());

        if !claimed {
            debug!(host = %host, "Adapter already configured");
            return Err(RegistryError::AlreadyRegistered(host.to_string()));
        }

        Ok(Reservation {
            in_flight: &self.in_flight,
            host: host.to_string(),
        })
    }

    async fn fetch_metadata(
        &self,
        host: &str,
        deadline: Duration,
    ) -> RegistryResult<(BTreeSet<String>, ComponentInfo)> {
        tokio::time::timeout(deadline, async {
            let client = self
                .connector
                .connect(host)
                .await
                .map_err(|source| RegistryError::Connection {
                    host: host.to_string(),
                    source,
                })?;
            debug!(host = %host, "Created client for adapter");

            let ops = client
                .supported_operations()
                .await
                .map_err(|source| RegistryError::MetadataFetch {
                    host: host.to_string(),
                    source,
                })?;
            let info = client
                .component_info()
                .await
                .map_err(|source| RegistryError::MetadataFetch {
                    host: host.to_string(),
                    source,
                })?;
            Ok::<_, RegistryError>((ops, info))
        })
        .await
        .map_err(|_| RegistryError::Timeout {
            host: host.to_string(),
            after: deadline,
        })?
    }

    /// Deregister the adapter at `host`.
    ///
    /// The prober is stopped and the port released before this returns.
    #[instrument(skip(self))]
    pub async fn remove(&self, host: &str) -> RegistryResult<Adapter> {
        let host = normalize_host(host);
        let _writer = self.writer.lock().await;

        let entry = {
            let mut entries = self.entries.write().await;
            let index = entries
                .iter()
                .position(|e| e.adapter.host == host)
                .ok_or_else(|| RegistryError::NotFound(host.to_string()))?;
            entries.remove(index)
        };

        let AdapterEntry {
            adapter, available, prober,
        } = entry;
        prober.stop().await;
        self.ports.release(adapter.port);

        let mut removed = adapter;
        removed.available = available.load(Ordering::Acquire);

        info!(host = %removed.host, port = removed.port, "Removed adapter");
        Ok(removed)
    }

    /// Ordered copy of all registered adapters.
    pub async fn list(&self) -> Vec<Adapter> {
        self.entries.read().await.iter().map(AdapterEntry::snapshot).collect()
    }

    /// Look an adapter up by `host` or by `host:port`.
    ///
    /// An exact host match wins over another adapter whose `host:port`
    /// happens to spell the same key.
    pub async fn resolve(&self, key: &str) -> RegistryResult<Adapter> {
        let key = normalize_host(key);
        let entries = self.entries.read().await;
        entries
            .iter()
            .find(|e| e.adapter.host == key)
            .or_else(|| entries.iter().find(|e| e.adapter.matches(key)))
            .map(AdapterEntry::snapshot)
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))
    }

    /// Run one reachability probe against the adapter registered at `host`.
    ///
    /// Does not touch the adapter's availability flag.
    #[instrument(skip(self))]
    pub async fn ping(&self, host: &str) -> RegistryResult<bool> {
        let host = normalize_host(host);
        let adapter = self
            .entries
            .read()
            .await
            .iter()
            .find(|e| e.adapter.host == host)
            .map(AdapterEntry::snapshot)
            .ok_or_else(|| RegistryError::NotFound(host.to_string()))?;

        let reachable = self.probe.probe(&adapter.host).await;
        if !reachable {
            warn!(host = %host, "Adapter ping failed");
        }
        Ok(reachable)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Stop every prober and drop all entries.
    pub async fn shutdown(&self) {
        let _writer = self.writer.lock().await;
        let entries = std::mem::take(&mut *self.entries.write().await);
        let count = entries.len();
        for entry in entries {
            entry.prober.stop().await;
            self.ports.release(entry.adapter.port);
        }
        debug!(count, "Stopped all adapter probers");
    }

    async fn contains_host(&self, host: &str) -> bool {
        self.entries.read().await.iter().any(|e| e.adapter.host == host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeConnector, FakeProbe};

    fn registry(connector: Arc<FakeConnector>, probe: Arc<FakeProbe>) -> AdapterRegistry {
        AdapterRegistry::with_ports(
            connector,
            probe,
            RegistrySettings::default(),
            PortAllocator::without_host_check(30_000..=30_099),
        )
    }

    async fn hosts(registry: &AdapterRegistry) -> Vec<String> {
        registry.list().await.into_iter().map(|a| a.host).collect()
    }

    #[tokio::test]
    async fn test_add_registers_available_adapter() {
        let connector = FakeConnector::new();
        connector.serve("A:0", "v1", &["apply"]);
        let registry = registry(connector.clone(), FakeProbe::new(true));

        let adapter = registry.add("A:0").await.unwrap();
        assert_eq!(adapter.version, "v1");
        assert!(adapter.available);
        assert!(adapter.supports("apply"));

        let listed = registry.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], adapter);
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_noop() {
        let connector = FakeConnector::new();
        connector.serve("A:0", "v1", &["apply"]);
        let registry = registry(connector.clone(), FakeProbe::new(true));

        registry.add("A:0").await.unwrap();
        let err = registry.add("A:0").await.unwrap_err();

        assert!(matches!(err, RegistryError::AlreadyRegistered(_)));
        assert_eq!(registry.len().await, 1);
        assert_eq!(connector.connects("A:0"), 1);
    }

    #[tokio::test]
    async fn test_unreachable_adapter_is_not_added() {
        let connector = FakeConnector::new();
        let registry = registry(connector.clone(), FakeProbe::new(true));

        let err = registry.add("B:0").await.unwrap_err();
        assert!(matches!(err, RegistryError::Connection { .. }));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_metadata_failure_leaves_no_partial_entry() {
        let connector = FakeConnector::new();
        connector.serve("A:0", "v1", &["apply"]);
        connector.fail_component_info("A:0");
        let registry = registry(connector.clone(), FakeProbe::new(true));

        let err = registry.add("A:0").await.unwrap_err();
        assert!(matches!(err, RegistryError::MetadataFetch { .. }));
        assert!(registry.is_empty().await);
        assert_eq!(registry.ports.allocated(), 0);
    }

    #[tokio::test]
    async fn test_blank_host_rejected() {
        let registry = registry(FakeConnector::new(), FakeProbe::new(true));
        assert!(matches!(
            registry.add("   ").await,
            Err(RegistryError::InvalidHost(_))
        ));
    }

    #[tokio::test]
    async fn test_slow_adapter_times_out() {
        let connector = FakeConnector::new();
        connector.serve("A:0", "v1", &["apply"]);
        connector.delay_metadata("A:0", Duration::from_secs(60));
        let registry = registry(connector.clone(), FakeProbe::new(true));

        let err = registry
            .add_with_deadline("A:0", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Timeout { .. }));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_unknown_host() {
        let connector = FakeConnector::new();
        connector.serve("A:0", "v1", &["apply"]);
        let registry = registry(connector.clone(), FakeProbe::new(true));
        registry.add("A:0").await.unwrap();

        let err = registry.remove("Z:0").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
        assert_eq!(hosts(&registry).await, ["A:0"]);
    }

    #[tokio::test]
    async fn test_remove_preserves_order() {
        for victim in ["A:0", "C:0", "E:0"] {
            let connector = FakeConnector::new();
            for host in ["A:0", "B:0", "C:0", "D:0", "E:0"] {
                connector.serve(host, "v1", &["apply"]);
            }
            let registry = registry(connector.clone(), FakeProbe::new(true));
            for host in ["A:0", "B:0", "C:0", "D:0", "E:0"] {
                registry.add(host).await.unwrap();
            }

            registry.remove(victim).await.unwrap();

            let expected: Vec<_> = ["A:0", "B:0", "C:0", "D:0", "E:0"]
                .into_iter()
                .filter(|h| *h != victim)
                .collect();
            assert_eq!(hosts(&registry).await, expected, "removing {}", victim);
        }
    }

    #[tokio::test]
    async fn test_remove_releases_port() {
        let connector = FakeConnector::new();
        connector.serve("A:0", "v1", &["apply"]);
        let registry = registry(connector.clone(), FakeProbe::new(true));

        let first = registry.add("A:0").await.unwrap();
        let removed = registry.remove("A:0").await.unwrap();
        assert_eq!(removed.port, first.port);
        assert_eq!(registry.ports.allocated(), 0);

        registry.add("A:0").await.unwrap();
        assert_eq!(registry.ports.allocated(), 1);
    }

    #[tokio::test]
    async fn test_resolve_by_host_and_address() {
        let connector = FakeConnector::new();
        connector.serve("A:0", "v1", &["apply"]);
        let registry = registry(connector.clone(), FakeProbe::new(true));
        let adapter = registry.add("A:0").await.unwrap();

        assert_eq!(registry.resolve("A:0").await.unwrap().host, "A:0");
        assert_eq!(registry.resolve(&adapter.address()).await.unwrap().host, "A:0");
        assert!(matches!(
            registry.resolve("A:0:1").await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_prefers_exact_host_over_address() {
        let connector = FakeConnector::new();
        connector.serve("h", "v1", &["apply"]);
        connector.serve("h:30000", "v2", &["apply"]);
        let registry = registry(connector.clone(), FakeProbe::new(true));

        let first = registry.add("h").await.unwrap();
        assert_eq!(first.address(), "h:30000");
        assert_eq!(registry.resolve("h:30000").await.unwrap().host, "h");

        let second = registry.add("h:30000").await.unwrap();
        let resolved = registry.resolve("h:30000").await.unwrap();
        assert_eq!(resolved.host, "h:30000");
        assert_eq!(resolved.version, "v2");
        assert_eq!(registry.resolve("h").await.unwrap().host, "h");
        assert_eq!(
            registry.resolve(&second.address()).await.unwrap().host,
            "h:30000"
        );
    }

    #[tokio::test]
    async fn test_surrounding_whitespace_names_the_same_adapter() {
        let connector = FakeConnector::new();
        connector.serve("A:0", "v1", &["apply"]);
        let registry = registry(connector.clone(), FakeProbe::new(true));

        let adapter = registry.add(" A:0 ").await.unwrap();
        assert_eq!(adapter.host, "A:0");
        assert!(matches!(
            registry.add("A:0\t").await,
            Err(RegistryError::AlreadyRegistered(_))
        ));

        assert_eq!(registry.resolve(" A:0").await.unwrap().host, "A:0");
        assert!(registry.ping("A:0 ").await.unwrap());

        let removed = registry.remove(" A:0").await.unwrap();
        assert_eq!(removed.host, "A:0");
        assert!(registry.is_empty().await);
        assert_eq!(registry.ports.allocated(), 0);
    }

    #[tokio::test]
    async fn test_slow_registration_does_not_block_other_hosts() {
        let connector = FakeConnector::new();
        for host in ["A:0", "B:0", "C:0"] {
            connector.serve(host, "v1", &["apply"]);
        }
        connector.delay_metadata("A:0", Duration::from_secs(60));
        let registry = Arc::new(registry(connector.clone(), FakeProbe::new(true)));
        registry.add("C:0").await.unwrap();

        let slow = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.add("A:0").await })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            while connector.connects("A:0") == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let quick = tokio::time::timeout(Duration::from_secs(5), async {
            assert!(matches!(
                registry.add("A:0").await,
                Err(RegistryError::AlreadyRegistered(_))
            ));
            registry.add("B:0").await.unwrap();
            registry.remove("C:0").await.unwrap();
        })
        .await;
        assert!(quick.is_ok());

        assert_eq!(hosts(&registry).await, ["B:0"]);
        assert_eq!(connector.connects("A:0"), 1);
        slow.abort();
    }

    #[tokio::test]
    async fn test_ping_does_not_flip_availability() {
        let connector = FakeConnector::new();
        connector.serve("A:0", "v1", &["apply"]);
        let probe = FakeProbe::new(false);
        let registry = registry(connector.clone(), probe.clone());
        registry.add("A:0").await.unwrap();

        assert!(!registry.ping("A:0").await.unwrap());
        assert!(registry.resolve("A:0").await.unwrap().available);
        assert!(matches!(registry.ping("Z:0").await, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prober_updates_listed_availability() {
        let connector = FakeConnector::new();
        connector.serve("A:0", "v1", &["apply"]);
        let probe = FakeProbe::new(false);
        let registry = registry(connector.clone(), probe.clone());
        registry.add("A:0").await.unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(!registry.list().await[0].available);

        probe.set_reachable(true);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(registry.list().await[0].available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_probe_after_removal() {
        let connector = FakeConnector::new();
        connector.serve("A:0", "v1", &["apply"]);
        let probe = FakeProbe::new(true);
        let registry = registry(connector.clone(), probe.clone());
        registry.add("A:0").await.unwrap();

        tokio::time::sleep(Duration::from_secs(25)).await;
        registry.remove("A:0").await.unwrap();
        let probes_at_removal = probe.calls();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(probe.calls(), probes_at_removal);
    }

    #[tokio::test]
    async fn test_concurrent_registration_of_same_host() {
        let connector = FakeConnector::new();
        connector.serve("A:0", "v1", &["apply"]);
        let registry = Arc::new(registry(connector.clone(), FakeProbe::new(true)));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.add("A:0").await })
            })
            .collect();

        let mut added = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                added += 1;
            }
        }

        assert_eq!(added, 1);
        assert_eq!(registry.len().await, 1);
        assert_eq!(connector.connects("A:0"), 1);
    }

    #[tokio::test]
    async fn test_shutdown_clears_entries() {
        let connector = FakeConnector::new();
        connector.serve("A:0", "v1", &["apply"]);
        connector.serve("B:0", "v1", &["apply"]);
        let registry = registry(connector.clone(), FakeProbe::new(true));
        registry.add("A:0").await.unwrap();
        registry.add("B:0").await.unwrap();

        registry.shutdown().await;
        assert!(registry.is_empty().await);
        assert_eq!(registry.ports.allocated(), 0);
    }
}
