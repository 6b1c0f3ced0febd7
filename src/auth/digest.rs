//! HTTP Digest authentication (RFC 2617, MD5, qop "auth" or none).
//!
//! Server side only: parse the `Authorization` header, check the
//! response against the principal's password and a nonce we issued,
//! and mint `WWW-Authenticate` challenges.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::Request;

use crate::auth::nonce::{nonce_digest, NonceStore};
use crate::auth::{Principal, PrincipalStore};
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::util::md5_hex;
use crate::DavResult;

/// Proof material from an `Authorization: Digest ...` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub realm: Option<String>,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub algorithm: Option<String>,
    pub qop: Option<String>,
    pub nc: Option<String>,
    pub cnonce: Option<String>,
    /// Method of the request that carried the header.
    pub method: String,
}

/// `WWW-Authenticate` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateChallenge {
    pub realm: String,
    pub nonce: String,
    pub stale: bool,
}

impl AuthenticateChallenge {
    /// Value for the `WWW-Authenticate` header.
    pub fn header_value(&self) -> String {
        format!(
            "Digest realm=\"{}\", qop=\"auth\", nonce=\"{}\", algorithm=MD5, stale={}",
            escape_quoted(&self.realm),
            self.nonce,
            if self.stale { "true" } else { "false" }
        )
    }
}

impl fmt::Display for AuthenticateChallenge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.header_value())
    }
}

/// Outcome of checking a request's credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    Authenticated,
    Rejected,
    /// Credentials were right but the nonce has expired. The client
    /// should retry with the new nonce, without asking the user again.
    Stale(AuthenticateChallenge),
}

/// What is being accessed, for `DigestAuthenticator::authenticate`.
#[derive(Debug, Clone, Copy)]
pub struct AuthTarget<'a> {
    pub path: &'a DavPath,
    pub method: &'a http::Method,
    pub request_uri: &'a http::Uri,
    pub realm: Option<&'a str>,
}

fn escape_quoted(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// key=value, key="quoted \" value", ...
fn parse_params(s: &str) -> Result<HashMap<String, String>, &'static str> {
    let mut params = HashMap::new();
    let mut chars = s.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' || c.is_whitespace() {
                break;
            }
            key.push(c);
            chars.next();
        }
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        if key.is_empty() || chars.next() != Some('=') {
            return Err("expected key=value");
        }
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    // quoted-pair. A lone backslash is kept, Windows clients
                    // send DOMAIN\user unescaped.
                    '\\' => match chars.peek() {
                        Some(&e) if e == '"' || e == '\\' => {
                            value.push(e);
                            chars.next();
                        }
                        _ => value.push('\\'),
                    },
                    '"' => {
                        closed = true;
                        break;
                    }
                    c => value.push(c),
                }
            }
            if !closed {
                return Err("unterminated quoted string");
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' || c.is_whitespace() {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }
        params.insert(key.to_ascii_lowercase(), value);
    }
    Ok(params)
}

impl Credentials {
    /// Parse an `Authorization` header value.
    ///
    /// Returns `Ok(None)` for schemes other than Digest, and an error if
    /// a Digest header is syntactically broken or incomplete.
    pub fn parse(value: &str, method: &str) -> Result<Option<Credentials>, String> {
        let value = value.trim();
        let (scheme, rest) = match value.find(char::is_whitespace) {
            Some(pos) => (&value[..pos], value[pos..].trim()),
            None => (value, ""),
        };
        if !scheme.eq_ignore_ascii_case("digest") {
            return Ok(None);
        }
        let mut params = parse_params(rest).map_err(|e| e.to_string())?;
        let mut required = |name: &'static str| {
            params
                .remove(name)
                .ok_or_else(|| format!("missing field {name}"))
        };
        let username = required("username")?;
        let nonce = required("nonce")?;
        let uri = required("uri")?;
        let response = required("response")?;
        let qop = params.remove("qop");
        let nc = params.remove("nc");
        let cnonce = params.remove("cnonce");
        if qop.is_some() && (nc.is_none() || cnonce.is_none()) {
            return Err("qop without nc/cnonce".to_string());
        }
        Ok(Some(Credentials {
            username,
            realm: params.remove("realm"),
            nonce,
            uri,
            response: response.to_ascii_lowercase(),
            algorithm: params.remove("algorithm"),
            qop,
            nc,
            cnonce,
            method: method.to_string(),
        }))
    }

    /// The expected `response` for this credentials' nonce, uri and method.
    pub fn expected_response(&self, realm: &str, password: &str) -> String {
        let ha1 = md5_hex(format!("{}:{}:{}", self.username, realm, password));
        let ha2 = md5_hex(format!("{}:{}", self.method, self.uri));
        match (&self.qop, &self.nc, &self.cnonce) {
            (Some(qop), Some(nc), Some(cnonce)) => md5_hex(format!(
                "{ha1}:{}:{nc}:{cnonce}:{qop}:{ha2}",
                self.nonce
            )),
            _ => md5_hex(format!("{ha1}:{}:{ha2}", self.nonce)),
        }
    }

    // we only do MD5, and qop=auth or rfc2069-style no qop.
    fn is_supported(&self) -> bool {
        let alg_ok = self
            .algorithm
            .as_deref()
            .map(|a| a.eq_ignore_ascii_case("md5"))
            .unwrap_or(true);
        let qop_ok = self
            .qop
            .as_deref()
            .map(|q| q.eq_ignore_ascii_case("auth"))
            .unwrap_or(true);
        alg_ok && qop_ok
    }

    fn uri_matches(&self, request_uri: &http::Uri) -> bool {
        let requested = request_uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| request_uri.path());
        if self.uri == requested {
            return true;
        }
        // some clients send the absolute form.
        match self.uri.parse::<http::Uri>() {
            Ok(u) if u.scheme().is_some() => {
                u.path_and_query().map(|pq| pq.as_str()) == Some(requested)
            }
            _ => false,
        }
    }
}

/// Extract Digest credentials from a request.
pub(crate) fn extract_credentials(req: &Request<()>) -> DavResult<Option<Credentials>> {
    let value = match req.headers().get(http::header::AUTHORIZATION) {
        Some(v) => v,
        None => return Ok(None),
    };
    let value = value
        .to_str()
        .map_err(|_| DavError::MalformedCredentials("non-ascii Authorization header".into()))?;
    match Credentials::parse(value, req.method().as_str()) {
        Ok(Some(c)) => Ok(Some(c)),
        Ok(None) => {
            debug!("ignoring non-Digest Authorization header");
            Ok(None)
        }
        Err(e) => Err(DavError::MalformedCredentials(e)),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Validates Digest credentials and produces challenges.
#[derive(Clone)]
pub struct DigestAuthenticator {
    nonces: Arc<NonceStore>,
    principals: Arc<dyn PrincipalStore>,
}

impl DigestAuthenticator {
    pub fn new(nonces: Arc<NonceStore>, principals: Arc<dyn PrincipalStore>) -> DigestAuthenticator {
        DigestAuthenticator { nonces, principals }
    }

    /// The nonce registry.
    pub fn nonces(&self) -> &NonceStore {
        &self.nonces
    }

    /// Look up the principal named in the credentials. A `DOMAIN\` qualifier is dropped.
    pub fn resolve_principal(&self, credentials: Option<&Credentials>) -> Option<Principal> {
        let credentials = credentials?;
        let id = match credentials.username.rfind('\\') {
            Some(pos) => &credentials.username[pos + 1..],
            None => credentials.username.as_str(),
        };
        self.principals.lookup_principal(id)
    }

    /// Check credentials against the resource being accessed.
    ///
    /// Without credentials the request authenticates only as the
    /// anonymous principal. With credentials, the realm, the request
    /// URI, the nonce and the digest response must all match.
    pub fn authenticate(
        &self,
        target: AuthTarget<'_>,
        principal: Option<&Principal>,
        credentials: Option<&Credentials>,
    ) -> Authentication {
        let credentials = match credentials {
            None if principal.is_none() => return Authentication::Authenticated,
            None => return Authentication::Rejected,
            Some(c) => c,
        };
        let realm = match target.realm {
            Some(r) if credentials.realm.as_deref() == Some(r) => r,
            _ => {
                debug!(
                    "digest: realm {:?} does not match {:?} for {}",
                    credentials.realm, target.realm, target.path
                );
                return Authentication::Rejected;
            }
        };
        if !credentials.uri_matches(target.request_uri) {
            debug!("digest: uri {} does not match request {}", credentials.uri, target.request_uri);
            return Authentication::Rejected;
        }
        if credentials.method != target.method.as_str() || !credentials.is_supported() {
            return Authentication::Rejected;
        }
        let nonce = match self.nonces.lookup(&nonce_digest(&credentials.nonce)) {
            Some(n) if self.nonces.is_valid(&n) => n,
            _ => {
                debug!("digest: unknown or foreign nonce");
                return Authentication::Rejected;
            }
        };
        let principal = match principal {
            Some(p) => p,
            None => return Authentication::Rejected,
        };
        let password = match self.principals.lookup_password(principal) {
            Some(p) => p,
            None => return Authentication::Rejected,
        };
        let expected = credentials.expected_response(realm, &password);
        if !constant_time_eq(expected.as_bytes(), credentials.response.as_bytes()) {
            debug!("digest: bad response for {}", principal.name());
            return Authentication::Rejected;
        }
        match self.nonces.bound_principal(&nonce) {
            Some(bound) if &bound != principal => {
                debug!("digest: nonce belongs to {}, not {}", bound.name(), principal.name());
                return Authentication::Rejected;
            }
            _ => {}
        }
        self.nonces.bind_principal(&nonce, principal);
        if self.nonces.is_stale(&nonce) {
            debug!("digest: stale nonce for {}", principal.name());
            return Authentication::Stale(self.create_challenge(realm, Some(principal), true));
        }
        Authentication::Authenticated
    }

    /// Mint a challenge with a fresh nonce and register the nonce.
    pub fn create_challenge(&self, realm: &str, principal: Option<&Principal>, stale: bool) -> AuthenticateChallenge {
        let nonce = self.nonces.generate();
        self.nonces.store(nonce.digest(), nonce.clone());
        if let Some(principal) = principal {
            self.nonces.bind_principal(&nonce, principal);
        }
        AuthenticateChallenge {
            realm: realm.to_string(),
            nonce: nonce.value().to_string(),
            stale,
        }
    }
}
