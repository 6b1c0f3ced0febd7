//! Test harness for the request pipeline.
//!
//! Requests are fed straight into `DavHandler::handle`; no sockets.
//! Storage is a shared `MemFs`, so a test can populate it through an
//! unprotected handler and then talk to a protected one.
#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use dav_gate::body::Body;
use dav_gate::fs::memfs::MemFs;
use dav_gate::{DavBuilder, DavHandler, FileSystem, MemPrincipalStore};
use http::{Request, Response};

pub const USER: &str = "mufasa";
pub const PASSWORD: &str = "Circle Of Life";
pub const REALM: &str = "Pride Rock";

pub struct TestServer {
    pub fs: Arc<MemFs>,
    /// Handler over `fs` without realms, for setting up fixtures.
    pub setup: DavHandler,
}

impl TestServer {
    pub fn new() -> TestServer {
        let _ = env_logger::builder().is_test(true).try_init();
        let fs = MemFs::new();
        let setup = DavHandler::builder(FileSystem::Custom(fs.clone())).build();
        TestServer { fs, setup }
    }

    /// Builder for another handler over the same storage.
    pub fn builder(&self) -> DavBuilder {
        DavHandler::builder(FileSystem::Custom(self.fs.clone()))
            .principals(MemPrincipalStore::new().user(USER, PASSWORD))
    }

    pub async fn mkcol(&self, path: &str) {
        let resp = send(&self.setup, "MKCOL", path, &[], "").await;
        assert_eq!(resp.status(), 201, "MKCOL {path}");
    }

    pub async fn put(&self, path: &str, content: &str) {
        let resp = send(&self.setup, "PUT", path, &[], content).await;
        assert!(resp.status().is_success(), "PUT {path}: {}", resp.status());
    }
}

pub fn request(method: &str, uri: &str, headers: &[(&str, &str)], body: &str) -> Request<hyper::Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    builder.body(hyper::Body::from(body.to_string())).unwrap()
}

pub async fn send(
    handler: &DavHandler,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> Response<Body> {
    handler.handle(request(method, uri, headers, body)).await
}

pub async fn body_bytes(resp: Response<Body>) -> Bytes {
    hyper::body::to_bytes(resp.into_body()).await.unwrap()
}

pub async fn body_string(resp: Response<Body>) -> String {
    String::from_utf8(body_bytes(resp).await.to_vec()).unwrap()
}

pub fn header<'a>(resp: &'a Response<Body>, name: &str) -> Option<&'a str> {
    resp.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Value of a `name="value"` or `name=value` parameter of a challenge.
pub fn challenge_param(challenge: &str, name: &str) -> Option<String> {
    let start = challenge.find(&format!("{name}="))? + name.len() + 1;
    let rest = &challenge[start..];
    let value = match rest.strip_prefix('"') {
        Some(quoted) => &quoted[..quoted.find('"')?],
        None => rest.split(',').next()?.trim(),
    };
    Some(value.to_string())
}

fn md5_hex(s: &str) -> String {
    format!("{:x}", md5::compute(s))
}

/// What a client sends back for a challenge (qop=auth).
pub fn digest_authorization(
    user: &str,
    password: &str,
    realm: &str,
    nonce: &str,
    method: &str,
    uri: &str,
) -> String {
    let nc = "00000001";
    let cnonce = "c0ffee42";
    let ha1 = md5_hex(&format!("{user}:{realm}:{password}"));
    let ha2 = md5_hex(&format!("{method}:{uri}"));
    let response = md5_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:auth:{ha2}"));
    format!(
        "Digest username=\"{user}\", realm=\"{realm}\", nonce=\"{nonce}\", uri=\"{uri}\", \
         algorithm=MD5, qop=auth, nc={nc}, cnonce=\"{cnonce}\", response=\"{response}\""
    )
}

/// Get a fresh nonce by making an unauthenticated request.
pub async fn challenge(handler: &DavHandler, method: &str, uri: &str) -> String {
    let resp = send(handler, method, uri, &[], "").await;
    assert_eq!(resp.status(), 401, "{method} {uri} without credentials");
    let www = header(&resp, "www-authenticate").expect("WWW-Authenticate");
    challenge_param(www, "nonce").expect("nonce")
}
