//! Authentication and authorization.
//!
//! - [`NonceStore`]: issued Digest nonces and their principal bindings.
//! - [`DigestAuthenticator`]: checks `Authorization: Digest` credentials.
//! - [`AuthPolicy`]: decides which realm a resource is in and who may
//!   do what. [`RealmPolicy`] is a simple path-prefix based policy.
//! - [`PrincipalStore`]: where principals and their passwords come from.
//!
//! The gate that strings these together runs inside `DavHandler` for
//! every request except OPTIONS.
use std::collections::HashMap;

use crate::davpath::DavPath;
use crate::util::DavMethod;

pub mod digest;
pub(crate) mod gate;
pub mod nonce;

pub use digest::{AuthTarget, AuthenticateChallenge, Authentication, Credentials, DigestAuthenticator};
pub use nonce::{Nonce, NonceStore};

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal(String);

impl Principal {
    pub fn new(name: impl Into<String>) -> Principal {
        Principal(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Source of principals and their secrets.
pub trait PrincipalStore: Send + Sync {
    /// Find a principal by id (user name without domain qualifier).
    fn lookup_principal(&self, id: &str) -> Option<Principal>;

    /// The cleartext password of a principal.
    fn lookup_password(&self, principal: &Principal) -> Option<String>;
}

/// In-memory principal store.
#[derive(Debug, Clone, Default)]
pub struct MemPrincipalStore {
    users: HashMap<String, String>,
}

impl MemPrincipalStore {
    pub fn new() -> MemPrincipalStore {
        MemPrincipalStore::default()
    }

    /// Add a user.
    pub fn user(mut self, name: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.insert(name.into(), password.into());
        self
    }
}

impl PrincipalStore for MemPrincipalStore {
    fn lookup_principal(&self, id: &str) -> Option<Principal> {
        self.users.contains_key(id).then(|| Principal::new(id))
    }

    fn lookup_password(&self, principal: &Principal) -> Option<String> {
        self.users.get(principal.name()).cloned()
    }
}

/// Realm assignment and authorization.
pub trait AuthPolicy: Send + Sync {
    /// The realm protecting `path`, or `None` if the resource is in no realm.
    fn realm(&self, path: &DavPath) -> Option<String>;

    /// Called once the request has authenticated.
    ///
    /// The default lets anyone touch unrealmed resources and requires a
    /// (non-anonymous) principal inside a realm.
    fn is_authorized(
        &self,
        principal: Option<&Principal>,
        realm: Option<&str>,
        _method: DavMethod,
        _path: &DavPath,
    ) -> bool {
        realm.is_none() || principal.is_some()
    }
}

/// Path-prefix based realms.
///
/// ```
/// use dav_gate::RealmPolicy;
///
/// let policy = RealmPolicy::new()
///     .protect("/", "Files")
///     .protect("/admin", "Admin")
///     .read_only(true);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RealmPolicy {
    realms: Vec<(Vec<u8>, String)>,
    read_only: bool,
}

impl RealmPolicy {
    /// A policy without realms: everything is public.
    pub fn new() -> RealmPolicy {
        RealmPolicy::default()
    }

    /// Put everything at or below `prefix` in `realm`. The longest matching prefix wins.
    pub fn protect(mut self, prefix: &str, realm: impl Into<String>) -> Self {
        let mut prefix = prefix.trim_end_matches('/').as_bytes().to_vec();
        if prefix.is_empty() {
            prefix.push(b'/');
        }
        self.realms.push((prefix, realm.into()));
        self.realms.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    /// Refuse state-changing methods for everyone.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

fn under_prefix(path: &[u8], prefix: &[u8]) -> bool {
    if prefix == b"/" {
        return true;
    }
    path.starts_with(prefix) && matches!(path.get(prefix.len()), None | Some(&b'/'))
}

impl AuthPolicy for RealmPolicy {
    fn realm(&self, path: &DavPath) -> Option<String> {
        self.realms
            .iter()
            .find(|(prefix, _)| under_prefix(path.as_bytes(), prefix))
            .map(|(_, realm)| realm.clone())
    }

    fn is_authorized(
        &self,
        principal: Option<&Principal>,
        realm: Option<&str>,
        method: DavMethod,
        _path: &DavPath,
    ) -> bool {
        if self.read_only && method.intersects(DavMethod::WRITE) {
            return false;
        }
        realm.is_none() || principal.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> DavPath {
        DavPath::new(s).unwrap()
    }

    #[test]
    fn longest_prefix_wins() {
        let policy = RealmPolicy::new().protect("/", "Files").protect("/admin/", "Admin");
        assert_eq!(policy.realm(&p("/docs/a.txt")).as_deref(), Some("Files"));
        assert_eq!(policy.realm(&p("/admin")).as_deref(), Some("Admin"));
        assert_eq!(policy.realm(&p("/admin/x")).as_deref(), Some("Admin"));
        assert_eq!(policy.realm(&p("/administrator")).as_deref(), Some("Files"));
        assert_eq!(RealmPolicy::new().realm(&p("/a")), None);
    }

    #[test]
    fn read_only_refuses_writes() {
        let policy = RealmPolicy::new().protect("/", "Files").read_only(true);
        let me = Principal::new("me");
        let path = p("/a");
        assert!(policy.is_authorized(Some(&me), Some("Files"), DavMethod::GET, &path));
        assert!(!policy.is_authorized(Some(&me), Some("Files"), DavMethod::PUT, &path));
        assert!(!policy.is_authorized(Some(&me), Some("Files"), DavMethod::DELETE, &path));
        assert!(!policy.is_authorized(None, Some("Files"), DavMethod::GET, &path));
        assert!(policy.is_authorized(None, None, DavMethod::GET, &path));
    }

    #[test]
    fn principal_store() {
        let store = MemPrincipalStore::new().user("mufasa", "Circle Of Life");
        let p = store.lookup_principal("mufasa").unwrap();
        assert_eq!(store.lookup_password(&p).as_deref(), Some("Circle Of Life"));
        assert!(store.lookup_principal("scar").is_none());
    }
}
