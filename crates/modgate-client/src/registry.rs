//! Endpoint discovery and round-robin routing.
//!
//! The registry is built from a list of gateway base URLs. Discovery asks
//! each gateway once which platforms it serves (`GET /platforms`) and groups
//! the gateways by platform, keeping registration order. The resulting
//! [`RouteTable`] never changes afterwards; the only mutable state is one
//! atomic cursor per platform.
//!
//! Discovery runs at most once. Every lookup waits for it to finish, so a
//! lookup issued while discovery is in flight sees the complete table, never
//! a partial one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use modgate_core::{OperationKind, Platform};
use tokio::sync::OnceCell;
use url::Url;

use crate::error::{DispatchError, Result};

// ---------------------------------------------------------------------------
// Endpoint sets
// ---------------------------------------------------------------------------

/// The gateways serving one platform, with a shared rotation cursor.
#[derive(Debug)]
pub struct EndpointSet {
    endpoints: Vec<Url>,
    cursor: AtomicUsize,
}

impl EndpointSet {
    /// Build a set; `None` when `endpoints` is empty.
    pub fn new(endpoints: Vec<Url>) -> Option<Self> {
        if endpoints.is_empty() {
            return None;
        }
        Some(Self {
            endpoints,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Next endpoint in strict rotation. The first call returns the first
    /// registered endpoint.
    pub fn next(&self) -> &Url {
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        &self.endpoints[slot]
    }

    /// All endpoints in registration order.
    pub fn endpoints(&self) -> &[Url] {
        &self.endpoints
    }
}

/// Platform to endpoint set mapping produced by discovery.
#[derive(Debug, Default)]
pub struct RouteTable {
    sets: BTreeMap<Platform, EndpointSet>,
}

impl RouteTable {
    /// Group `(address, platforms)` answers by platform. Answers must be in
    /// registration order.
    pub fn from_answers(answers: impl IntoIterator<Item = (Url, Vec<Platform>)>) -> Self {
        let mut grouped: BTreeMap<Platform, Vec<Url>> = BTreeMap::new();
        for (address, platforms) in answers {
            for platform in platforms {
                let endpoints = grouped.entry(platform).or_default();
                if !endpoints.contains(&address) {
                    endpoints.push(address.clone());
                }
            }
        }

        let sets = grouped
            .into_iter()
            .filter_map(|(platform, endpoints)| EndpointSet::new(endpoints).map(|set| (platform, set)))
            .collect();
        Self { sets }
    }

    pub fn get(&self, platform: Platform) -> Option<&EndpointSet> {
        self.sets.get(&platform)
    }

    /// Platforms with at least one endpoint, sorted.
    pub fn platforms(&self) -> Vec<Platform> {
        self.sets.keys().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct RegistryInner {
    addresses: Vec<Url>,
    http: reqwest::Client,
    discovery_timeout: Duration,
    table: OnceCell<RouteTable>,
}

/// Discovers gateways once and hands out endpoints per platform.
///
/// Cloning is cheap and clones share the same table and cursors.
#[derive(Clone)]
pub struct EndpointRegistry {
    inner: Arc<RegistryInner>,
}

impl EndpointRegistry {
    pub fn new(addresses: Vec<Url>, http: reqwest::Client, discovery_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                addresses,
                http,
                discovery_timeout,
                table: OnceCell::new(),
            }),
        }
    }

    /// Start discovery in the background. Lookups made before it finishes
    /// wait for it.
    pub fn spawn_discovery(&self) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let table = registry.initialize().await;
            tracing::info!(platforms = ?table.platforms(), "endpoint discovery finished");
        })
    }

    /// Run discovery, or wait for the run already in progress, and return
    /// the route table.
    pub async fn initialize(&self) -> &RouteTable {
        self.inner.table.get_or_init(|| self.discover()).await
    }

    /// Next endpoint for `platform`, or `None` if no gateway serves it.
    pub async fn next_endpoint(&self, platform: Platform) -> Option<Url> {
        let set = self.initialize().await.get(platform)?;
        Some(set.next().clone())
    }

    /// Platforms served by at least one gateway, sorted.
    pub async fn platforms(&self) -> Vec<Platform> {
        self.initialize().await.platforms()
    }

    async fn discover(&self) -> RouteTable {
        let inner = &self.inner;
        let answers = join_all(inner.addresses.iter().map(|address| self.query(address))).await;

        let reachable = inner
            .addresses
            .iter()
            .zip(answers)
            .filter_map(|(address, answer)| match answer {
                Ok(platforms) => {
                    tracing::debug!(%address, ?platforms, "gateway discovered");
                    Some((address.clone(), platforms))
                }
                Err(e) => {
                    tracing::warn!(%address, error = %e, "gateway discovery failed, skipping");
                    None
                }
            })
            .collect::<Vec<_>>();

        RouteTable::from_answers(reachable)
    }

    async fn query(&self, address: &Url) -> Result<Vec<Platform>> {
        let url = join_path(address, "platforms")?;
        let response = self
            .inner
            .http
            .get(url)
            .timeout(self.inner.discovery_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Backend { status, message: None });
        }

        let names: Vec<String> = response.json().await?;
        let mut platforms = Vec::with_capacity(names.len());
        for name in names {
            match name.parse::<Platform>() {
                Ok(platform) if !platforms.contains(&platform) => platforms.push(platform),
                Ok(_) => {}
                Err(e) => tracing::debug!(%address, error = %e, "ignoring unknown platform"),
            }
        }
        Ok(platforms)
    }
}

// ---------------------------------------------------------------------------
// URLs
// ---------------------------------------------------------------------------

fn join_path(base: &Url, path: &str) -> Result<Url> {
    let joined = format!("{}/{path}", base.as_str().trim_end_matches('/'));
    Url::parse(&joined).map_err(|e| DispatchError::InvalidBackend {
        address: base.to_string(),
        reason: e.to_string(),
    })
}

/// `{base}/{platform}/{run|asm}` for a gateway base URL.
pub fn route_url(base: &Url, platform: Platform, operation: OperationKind) -> Result<Url> {
    join_path(base, &format!("{platform}/{}", operation.path_segment()))
}
