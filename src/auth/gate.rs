//! Per-request authentication/authorization decision.
//!
//! Order: credentials (400 if malformed), principal and realm,
//! authenticate (stale nonce short-circuits to 401 stale=true),
//! authorize. A refusal is a 401 with a new challenge when the
//! resource has a realm, and a 403 when it has none.
use std::sync::Arc;

use http::Request;

use crate::auth::digest::{extract_credentials, AuthTarget, Authentication, DigestAuthenticator};
use crate::auth::{AuthPolicy, Principal};
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::util::DavMethod;
use crate::DavResult;

#[derive(Clone)]
pub(crate) struct AuthorizationGate {
    pub(crate) authenticator: DigestAuthenticator,
    pub(crate) policy: Arc<dyn AuthPolicy>,
}

impl AuthorizationGate {
    /// Returns the principal the request runs as (`None` for anonymous).
    pub(crate) fn check(&self, req: &Request<()>, path: &DavPath, method: DavMethod) -> DavResult<Option<Principal>> {
        let credentials = extract_credentials(req)?;
        let principal = self.authenticator.resolve_principal(credentials.as_ref());
        let realm = self.policy.realm(path);

        let target = AuthTarget {
            path,
            method: req.method(),
            request_uri: req.uri(),
            realm: realm.as_deref(),
        };
        let authenticated = match self
            .authenticator
            .authenticate(target, principal.as_ref(), credentials.as_ref())
        {
            Authentication::Authenticated => true,
            Authentication::Rejected => false,
            Authentication::Stale(challenge) => return Err(DavError::Unauthorized(challenge)),
        };

        if authenticated && self.policy.is_authorized(principal.as_ref(), realm.as_deref(), method, path) {
            if let Some(p) = &principal {
                debug!("authorized {} for {:?} {}", p.name(), method, path);
            }
            return Ok(principal);
        }

        match realm {
            Some(realm) => {
                let challenge = self.authenticator.create_challenge(&realm, None, false);
                Err(DavError::Unauthorized(challenge))
            }
            None => {
                debug!("refusing {:?} {}: no realm", method, path);
                Err(DavError::Forbidden)
            }
        }
    }
}
