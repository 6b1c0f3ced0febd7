//! Server-side nonce bookkeeping for Digest authentication.
//!
//! A nonce value is `timestamp:salt:mac`, where the mac is the md5 of
//! timestamp and salt under the server's private key, so a nonce minted
//! under another key never validates.
//!
//! Nonces live in a concurrent map keyed by the md5 digest of their
//! value. There is no cleanup task: every lookup and every store sweeps
//! out nonces that are older than [`NONCE_TTL`], and the map never holds
//! more than [`NONCE_CAPACITY`] entries. When it is full the oldest nonces
//! are evicted. Principal bindings live in a separate bounded LRU cache
//! with the same TTL.
use std::num::NonZeroUsize;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::auth::Principal;
use crate::util::{md5_hex, unix_millis};

/// How long a nonce is accepted without a `stale=true` re-challenge.
pub const NONCE_EXPIRY: Duration = Duration::from_secs(60);
/// How long a nonce (or a principal binding) is kept around at all.
pub const NONCE_TTL: Duration = Duration::from_secs(60 * 60);

/// Most nonces kept at once.
pub const NONCE_CAPACITY: usize = 65536;

const BINDING_CAPACITY: usize = 4096;

/// Server-issued challenge value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce {
    value: String,
    created: SystemTime,
}

impl Nonce {
    /// The opaque value as sent to the client.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When the nonce was issued.
    pub fn created(&self) -> SystemTime {
        self.created
    }

    /// Key under which the nonce is stored.
    pub fn digest(&self) -> String {
        nonce_digest(&self.value)
    }

    /// A nonce is stale once strictly more than `expiry` has passed since it was issued.
    pub fn is_stale_at(&self, now: SystemTime, expiry: Duration) -> bool {
        match now.duration_since(self.created) {
            Ok(age) => age > expiry,
            Err(_) => false,
        }
    }

    fn is_older_than(&self, now: SystemTime, ttl: Duration) -> bool {
        self.is_stale_at(now, ttl)
    }
}

/// Digest of a nonce value as received from a client.
pub fn nonce_digest(value: &str) -> String {
    md5_hex(value)
}

#[derive(Debug, Clone)]
struct Binding {
    principal: Principal,
    last_seen: SystemTime,
}

/// Thread-safe registry of issued nonces.
pub struct NonceStore {
    nonces: DashMap<String, Nonce>,
    bindings: Mutex<LruCache<String, Binding>>,
    private_key: String,
    expiry: Duration,
    ttl: Duration,
    capacity: usize,
}

impl NonceStore {
    /// Create a store bound to `private_key`. Nonces issued under a
    /// different key (an earlier server instance) never validate.
    pub fn new(private_key: impl Into<String>, expiry: Duration) -> NonceStore {
        NonceStore {
            nonces: DashMap::new(),
            bindings: Mutex::new(LruCache::new(
                NonZeroUsize::new(BINDING_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
            private_key: private_key.into(),
            expiry,
            ttl: NONCE_TTL,
            capacity: NONCE_CAPACITY,
        }
    }

    /// Create a store with a random private key.
    pub fn random(expiry: Duration) -> NonceStore {
        NonceStore::new(Uuid::new_v4().simple().to_string(), expiry)
    }

    #[cfg(test)]
    pub(crate) fn with_ttl(mut self, ttl: Duration) -> NonceStore {
        self.ttl = ttl;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_capacity(mut self, capacity: usize) -> NonceStore {
        self.capacity = capacity;
        self
    }

    /// Freshness window.
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Mint a new nonce under this server's key. It is not stored yet.
    pub fn generate(&self) -> Nonce {
        let created = SystemTime::now();
        let timestamp = unix_millis(created).to_string();
        let salt = Uuid::new_v4().simple().to_string();
        let mac = self.mac(&timestamp, &salt);
        Nonce {
            value: format!("{timestamp}:{salt}:{mac}"),
            created,
        }
    }

    fn mac(&self, timestamp: &str, salt: &str) -> String {
        md5_hex(format!("{}:{}:{}", timestamp, salt, self.private_key))
    }

    /// Insert or overwrite. Sweeps expired nonces, and evicts the oldest
    /// ones if the store is full.
    pub fn store(&self, digest: String, nonce: Nonce) {
        self.sweep(SystemTime::now());
        if self.nonces.len() >= self.capacity {
            self.evict_oldest(self.nonces.len() + 1 - self.capacity);
        }
        self.nonces.insert(digest, nonce);
    }

    /// Find a nonce by digest. Sweeps expired nonces as a side effect.
    pub fn lookup(&self, digest: &str) -> Option<Nonce> {
        self.sweep(SystemTime::now());
        self.nonces.get(digest).map(|entry| entry.value().clone())
    }

    fn sweep(&self, now: SystemTime) {
        let ttl = self.ttl;
        let before = self.nonces.len();
        self.nonces.retain(|_, n| !n.is_older_than(now, ttl));
        let removed = before.saturating_sub(self.nonces.len());
        if removed > 0 {
            trace!("nonce store: swept {removed} expired nonces");
        }
    }

    // evict at least `count`, and a batch more so a full store does
    // not scan the map on every insert.
    fn evict_oldest(&self, count: usize) {
        let count = count.max(self.capacity / 16).min(self.nonces.len());
        let mut ages: Vec<(SystemTime, String)> = self
            .nonces
            .iter()
            .map(|entry| (entry.value().created, entry.key().clone()))
            .collect();
        ages.sort_unstable();
        for (_, digest) in ages.into_iter().take(count) {
            self.nonces.remove(&digest);
        }
        debug!("nonce store: full, evicted {count} oldest nonces");
    }

    /// Was this nonce issued under the current private key.
    pub fn is_valid(&self, nonce: &Nonce) -> bool {
        let mut parts = nonce.value.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(timestamp), Some(salt), Some(mac)) => self.mac(timestamp, salt) == mac,
            _ => false,
        }
    }

    /// Has the nonce outlived the freshness window.
    pub fn is_stale(&self, nonce: &Nonce) -> bool {
        nonce.is_stale_at(SystemTime::now(), self.expiry)
    }

    /// Associate a principal with a nonce.
    pub fn bind_principal(&self, nonce: &Nonce, principal: &Principal) {
        let mut bindings = self.bindings.lock();
        bindings.put(
            nonce.digest(),
            Binding {
                principal: principal.clone(),
                last_seen: SystemTime::now(),
            },
        );
    }

    /// The principal bound to a nonce, if any and not expired.
    pub fn bound_principal(&self, nonce: &Nonce) -> Option<Principal> {
        let now = SystemTime::now();
        let mut bindings = self.bindings.lock();
        let expired: Vec<String> = bindings
            .iter()
            .filter(|(_, b)| now.duration_since(b.last_seen).map(|d| d > self.ttl).unwrap_or(false))
            .map(|(k, _)| k.clone())
            .collect();
        for k in expired {
            bindings.pop(&k);
        }
        bindings.get(&nonce.digest()).map(|b| b.principal.clone())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.nonces.len()
    }
}
