//! Per-client rate limiting.
//!
//! Each remote IP owns a token bucket inside the [`ClientRegistry`]. A
//! background sweeper evicts clients that have gone quiet so the map only
//! holds recently active addresses.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    extract::{rejection::ExtensionRejection, ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::LimiterConfig;
use crate::http::error::ApiError;
use crate::observability::metrics;

/// A token bucket rate limiter.
///
/// Tokens accrue continuously at `rate` per second up to `capacity`; each
/// admitted request consumes one.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket. A non-finite or negative `rate` never refills.
    pub fn new(rate: f64, burst: u32) -> Self {
        Self::new_at(rate, burst, Instant::now())
    }

    pub fn new_at(rate: f64, burst: u32, now: Instant) -> Self {
        let rate = if rate.is_finite() && rate > 0.0 { rate } else { 0.0 };
        let capacity = f64::from(burst);
        Self {
            rate,
            capacity,
            tokens: capacity,
            last_refill: now,
        }
    }

    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Refill for the time elapsed since the last call, then try to take one
    /// token.
    pub fn allow_at(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens available as of the last call.
    pub fn available(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

/// Limits applied to every client.
#[derive(Debug, Clone, Copy)]
pub struct LimiterSettings {
    pub enabled: bool,
    pub rate: f64,
    pub burst: u32,
    pub sweep_interval: Duration,
    pub idle_ttl: Duration,
}

impl From<&LimiterConfig> for LimiterSettings {
    fn from(config: &LimiterConfig) -> Self {
        Self {
            enabled: config.enabled,
            rate: config.requests_per_second,
            burst: config.burst,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            idle_ttl: Duration::from_secs(config.idle_ttl_secs),
        }
    }
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self::from(&LimiterConfig::default())
    }
}

#[derive(Debug)]
struct ClientEntry {
    limiter: TokenBucket,
    last_seen: Instant,
}

/// Token buckets keyed by client identity.
///
/// One mutex guards the whole map. It is held only for the lookup, create,
/// consume and touch sequence of a single admission, or for one sweep.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, ClientEntry>>,
    settings: LimiterSettings,
}

impl ClientRegistry {
    pub fn new(settings: LimiterSettings) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            settings,
        }
    }

    pub fn from_config(config: &LimiterConfig) -> Self {
        Self::new(LimiterSettings::from(config))
    }

    pub fn settings(&self) -> &LimiterSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    // Entries are plain numbers, so a panic mid-update cannot leave them in a
    // state worse than a slightly stale bucket.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientEntry>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether `client` may proceed. Always true when disabled.
    pub fn admit(&self, client: &str) -> bool {
        self.admit_at(client, Instant::now())
    }

    pub fn admit_at(&self, client: &str, now: Instant) -> bool {
        if !self.settings.enabled {
            return true;
        }

        let mut clients = self.lock();
        if let Some(entry) = clients.get_mut(client) {
            entry.last_seen = now;
            return entry.limiter.allow_at(now);
        }

        let mut limiter = TokenBucket::new_at(self.settings.rate, self.settings.burst, now);
        let allowed = limiter.allow_at(now);
        clients.insert(
            client.to_owned(),
            ClientEntry {
                limiter,
                last_seen: now,
            },
        );
        metrics::record_tracked_clients(clients.len());
        allowed
    }

    /// Evict clients idle for longer than the configured TTL. Returns how many
    /// were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let idle_ttl = self.settings.idle_ttl;
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= idle_ttl);
        let removed = before - clients.len();
        metrics::record_tracked_clients(clients.len());
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, client: &str) -> bool {
        self.lock().contains_key(client)
    }

    /// Tokens left in `client`'s bucket, if it is tracked.
    pub fn available_tokens(&self, client: &str) -> Option<f64> {
        self.lock().get(client).map(|entry| entry.limiter.available())
    }

    /// Run the idle-client sweep every `sweep_interval` until `shutdown` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = registry.settings.sweep_interval;

        tokio::spawn(async move {
            tracing::info!(
                interval_secs = period.as_secs(),
                idle_ttl_secs = registry.settings.idle_ttl.as_secs(),
                "Client sweeper starting"
            );

            let mut ticker = time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = registry.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = registry.len(), "Evicted idle clients");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Client sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}

/// Middleware admitting requests by peer IP.
pub async fn rate_limit_middleware(
    State(registry): State<Arc<ClientRegistry>>,
    peer: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
    request: Request,
    next: Next,
) -> Response {
    if !registry.is_enabled() {
        return next.run(request).await;
    }

    let ConnectInfo(addr) = match peer {
        Ok(peer) => peer,
        Err(err) => {
            return ApiError::Internal(format!("peer address unavailable: {err}")).into_response();
        }
    };

    let client = addr.ip().to_string();
    if registry.admit(&client) {
        next.run(request).await
    } else {
        tracing::warn!(client = %client, "Rate limit exceeded");
        metrics::record_rate_limited("client_rps");
        ApiError::RateLimitExceeded.into_response()
    }
}
