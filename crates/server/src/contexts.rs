//! Browser contexts hosted by the server.
//!
//! Every browser gets its own `AppContext` (session, location, quotation in
//! progress) keyed by the `sq_context` cookie. The context's `MemoryStorage`
//! plays the part of that browser's durable storage. Contexts idle longer
//! than the configured window are dropped, and the registry never holds more
//! than its capacity; the least recently used context goes first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap, HeaderValue};
use stonequote_core::{AdvancePolicy, AppContext, AuditSink, MemoryStorage};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

pub const CONTEXT_COOKIE: &str = "sq_context";
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_CAPACITY: usize = 10_000;

pub type SharedContext = Arc<Mutex<AppContext<MemoryStorage>>>;

struct Hosted {
    context: SharedContext,
    last_seen: Instant,
    /// Monotonic use counter; orders contexts whose `last_seen` ties.
    last_use: u64,
}

#[derive(Default)]
struct Hosting {
    entries: HashMap<Uuid, Hosted>,
    uses: u64,
}

impl Hosting {
    fn next_use(&mut self) -> u64 {
        self.uses += 1;
        self.uses
    }

    fn sweep_idle(&mut self, now: Instant, idle_timeout: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, hosted| now.duration_since(hosted.last_seen) < idle_timeout);
        before - self.entries.len()
    }

    fn evict_least_recent(&mut self) -> Option<Uuid> {
        let oldest = self.entries.iter().min_by_key(|(_, hosted)| hosted.last_use).map(|(id, _)| *id)?;
        self.entries.remove(&oldest);
        Some(oldest)
    }
}

#[derive(Clone)]
pub struct ContextRegistry {
    hosting: Arc<Mutex<Hosting>>,
    policy: AdvancePolicy,
    audit: Arc<dyn AuditSink>,
    idle_timeout: Duration,
    capacity: usize,
}

impl ContextRegistry {
    pub fn new(policy: AdvancePolicy, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            hosting: Arc::new(Mutex::new(Hosting::default())),
            policy,
            audit,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// A capacity of zero is treated as one.
    pub fn with_limits(mut self, idle_timeout: Duration, capacity: usize) -> Self {
        self.idle_timeout = idle_timeout;
        self.capacity = capacity.max(1);
        self
    }

    /// Returns the context named by the cookie, or a fresh one when the
    /// cookie is missing, unknown or expired. The flag is true for fresh
    /// contexts.
    pub async fn open(&self, requested: Option<Uuid>) -> (Uuid, SharedContext, bool) {
        let now = Instant::now();
        let mut hosting = self.hosting.lock().await;

        let expired = hosting.sweep_idle(now, self.idle_timeout);
        if expired > 0 {
            info!(
                event_name = "server.context.expired",
                expired,
                idle_timeout_secs = self.idle_timeout.as_secs(),
                "idle browser contexts dropped"
            );
        }

        if let Some(id) = requested {
            let last_use = hosting.next_use();
            if let Some(hosted) = hosting.entries.get_mut(&id) {
                hosted.last_seen = now;
                hosted.last_use = last_use;
                return (id, Arc::clone(&hosted.context), false);
            }
        }

        while hosting.entries.len() >= self.capacity {
            let Some(evicted) = hosting.evict_least_recent() else {
                break;
            };
            info!(
                event_name = "server.context.evicted",
                context_id = %evicted,
                capacity = self.capacity,
                "least recently used browser context dropped"
            );
        }

        let context =
            AppContext::new(MemoryStorage::default(), self.policy.clone(), Arc::clone(&self.audit));
        let id = context.context_id();
        let shared = Arc::new(Mutex::new(context));
        let last_use = hosting.next_use();
        hosting
            .entries
            .insert(id, Hosted { context: Arc::clone(&shared), last_seen: now, last_use });
        info!(
            event_name = "server.context.created",
            context_id = %id,
            "browser context created"
        );
        (id, shared, true)
    }

    pub async fn len(&self) -> usize {
        self.hosting.lock().await.entries.len()
    }
}

pub fn context_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == CONTEXT_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

pub fn context_cookie(id: Uuid) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{CONTEXT_COOKIE}={id}; HttpOnly; SameSite=Lax; Path=/")).ok()
}
