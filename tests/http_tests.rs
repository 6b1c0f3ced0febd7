//! Plain HTTP behaviour: canonical URLs, conditional GET, PUT/DELETE/MKCOL,
//! compression and the error boundary.

mod common;

use std::io::Read;

use common::*;
use dav_gate::fs::DavFileSystem;
use dav_gate::{DavHandler, DavMethod, FileSystem};

// ============================================================================
// Canonical collection URLs
// ============================================================================

#[tokio::test]
async fn collection_without_slash_redirects() {
    let server = TestServer::new();
    server.mkcol("/docs/").await;
    let handler = server.builder().build();

    let ua = [("User-Agent", "Mozilla/5.0 (X11; Linux x86_64)")];
    let resp = send(&handler, "GET", "/docs", &ua, "").await;
    assert_eq!(resp.status(), 301);
    assert_eq!(header(&resp, "location"), Some("/docs/"));

    let temporary = server.builder().redirect(false).build();
    let resp = send(&temporary, "GET", "/docs?x=1", &ua, "").await;
    assert_eq!(resp.status(), 302);
    assert_eq!(header(&resp, "location"), Some("/docs/?x=1"));
}

#[tokio::test]
async fn redirect_includes_prefix() {
    let server = TestServer::new();
    server.mkcol("/docs/").await;
    let handler = server.builder().strip_prefix("/dav").build();

    let resp = send(&handler, "GET", "/dav/docs", &[], "").await;
    assert_eq!(resp.status(), 301);
    assert_eq!(header(&resp, "location"), Some("/dav/docs/"));
}

#[tokio::test]
async fn no_redirect_for_denylisted_clients() {
    let server = TestServer::new();
    server.mkcol("/docs/").await;
    server.put("/docs/a.txt", "hello").await;
    let handler = server.builder().autoindex(true).build();

    let ua = [("User-Agent", "WebDAVFS/1.2 (01208000) Darwin/8.3.0 (Power Macintosh)")];
    let resp = send(&handler, "GET", "/docs", &ua, "").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "content-location"), Some("/docs/"));
    let html = body_string(resp).await;
    assert!(html.contains("href=\"/docs/a.txt\""), "{html}");

    let ua = [("User-Agent", "Microsoft-WebDAV-MiniRedir/10.0.19045"), ("Depth", "0")];
    let resp = send(&handler, "PROPFIND", "/docs", &ua, "").await;
    assert_eq!(resp.status(), 207);
    let xml = body_string(resp).await;
    assert!(xml.contains("<D:href>/docs/</D:href>"), "{xml}");
}

#[tokio::test]
async fn files_are_not_redirected() {
    let server = TestServer::new();
    server.put("/a.txt", "hello").await;
    let handler = server.builder().build();

    let resp = send(&handler, "GET", "/a.txt", &[], "").await;
    assert_eq!(resp.status(), 200);
    let resp = send(&handler, "GET", "/missing", &[], "").await;
    assert_eq!(resp.status(), 404);
}

// ============================================================================
// GET / HEAD / POST
// ============================================================================

#[tokio::test]
async fn get_head_post() {
    let server = TestServer::new();
    server.put("/a.txt", "hello world").await;
    let handler = server.builder().compression(false).build();

    let resp = send(&handler, "GET", "/a.txt", &[], "").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "content-type"), Some("text/plain"));
    assert_eq!(header(&resp, "content-length"), Some("11"));
    assert!(header(&resp, "last-modified").is_some());
    assert!(header(&resp, "etag").is_some());
    assert_eq!(body_string(resp).await, "hello world");

    let resp = send(&handler, "HEAD", "/a.txt", &[], "").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "content-length"), Some("11"));
    assert_eq!(body_string(resp).await, "");

    let resp = send(&handler, "POST", "/a.txt", &[], "").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(body_string(resp).await, "hello world");
}

#[tokio::test]
async fn get_collection_without_autoindex() {
    let server = TestServer::new();
    server.mkcol("/docs/").await;
    let handler = server.builder().build();

    let resp = send(&handler, "GET", "/docs/", &[], "").await;
    assert_eq!(resp.status(), 405);
    let allow = header(&resp, "allow").unwrap();
    assert!(allow.contains("PROPFIND"), "{allow}");
    assert!(!allow.contains("GET"), "{allow}");
}

#[tokio::test]
async fn if_modified_since() {
    let server = TestServer::new();
    server.put("/a.txt", "hello").await;
    let handler = server.builder().build();

    let resp = send(&handler, "GET", "/a.txt", &[], "").await;
    let last_modified = header(&resp, "last-modified").unwrap().to_string();

    for _ in 0..3 {
        let ims = [("If-Modified-Since", last_modified.as_str())];
        let resp = send(&handler, "GET", "/a.txt", &ims, "").await;
        assert_eq!(resp.status(), 304);
        assert!(header(&resp, "content-length").is_none());
        assert_eq!(body_string(resp).await, "");
    }

    let old = [("If-Modified-Since", "Sun, 06 Nov 1994 08:49:37 GMT")];
    let resp = send(&handler, "GET", "/a.txt", &old, "").await;
    assert_eq!(resp.status(), 200);

    let bad = [("If-Modified-Since", "last tuesday")];
    let resp = send(&handler, "GET", "/a.txt", &bad, "").await;
    assert_eq!(resp.status(), 400);

    // parsed, not enforced.
    let ius = [("If-Unmodified-Since", "Sun, 06 Nov 1994 08:49:37 GMT")];
    let resp = send(&handler, "GET", "/a.txt", &ius, "").await;
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn gzip_when_accepted() {
    let server = TestServer::new();
    let text = "all work and no play makes jack a dull boy\n".repeat(100);
    server.put("/a.txt", &text).await;
    let handler = server.builder().build();

    let accept = [("Accept-Encoding", "gzip, deflate")];
    let resp = send(&handler, "GET", "/a.txt", &accept, "").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "content-encoding"), Some("gzip"));
    let data = body_bytes(resp).await;
    assert!(data.len() < text.len());
    let mut plain = String::new();
    flate2::read::GzDecoder::new(&data[..])
        .read_to_string(&mut plain)
        .unwrap();
    assert_eq!(plain, text);

    let ie6 = [
        ("Accept-Encoding", "gzip"),
        ("User-Agent", "Mozilla/4.0 (compatible; MSIE 6.0; Windows NT 5.1)"),
    ];
    let resp = send(&handler, "GET", "/a.txt", &ie6, "").await;
    assert!(header(&resp, "content-encoding").is_none());
    assert_eq!(body_string(resp).await, text);
}

// ============================================================================
// PUT / DELETE / MKCOL
// ============================================================================

#[tokio::test]
async fn put_creates_then_replaces() {
    let server = TestServer::new();
    let handler = server.builder().build();

    let resp = send(&handler, "PUT", "/a.txt", &[], "one").await;
    assert_eq!(resp.status(), 201);
    let resp = send(&handler, "PUT", "/a.txt", &[], "two").await;
    assert_eq!(resp.status(), 204);

    let resp = send(&handler, "GET", "/a.txt", &[], "").await;
    assert_eq!(body_string(resp).await, "two");
}

#[tokio::test]
async fn put_without_parent_is_conflict() {
    let server = TestServer::new();
    let handler = server.builder().build();

    let resp = send(&handler, "PUT", "/nope/a.txt", &[], "data").await;
    assert_eq!(resp.status(), 409);

    let path = dav_gate::davpath::DavPath::new("/nope/a.txt").unwrap();
    assert!(server.fs.metadata(&path).await.is_err());
    let parent = dav_gate::davpath::DavPath::new("/nope/").unwrap();
    assert!(server.fs.metadata(&parent).await.is_err());
}

// request body that sends a chunk and then fails.
fn broken_body() -> hyper::Body {
    let chunks: Vec<Result<bytes::Bytes, std::io::Error>> = vec![
        Ok(bytes::Bytes::from_static(b"partial")),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away")),
    ];
    hyper::Body::wrap_stream(futures_util::stream::iter(chunks))
}

#[tokio::test]
async fn failed_upload_leaves_nothing_behind() {
    let server = TestServer::new();
    server.mkcol("/docs/").await;
    let handler = server.builder().build();

    let req = http::Request::builder()
        .method("PUT")
        .uri("/docs/new.txt")
        .body(broken_body())
        .unwrap();
    let resp = handler.handle(req).await;
    assert!(resp.status().is_server_error(), "{}", resp.status());

    let path = dav_gate::davpath::DavPath::new("/docs/new.txt").unwrap();
    assert!(server.fs.metadata(&path).await.is_err());
    let resp = send(&handler, "GET", "/docs/new.txt", &[], "").await;
    assert_eq!(resp.status(), 404);

    // an existing resource is not removed.
    server.put("/docs/old.txt", "old").await;
    let req = http::Request::builder()
        .method("PUT")
        .uri("/docs/old.txt")
        .body(broken_body())
        .unwrap();
    let resp = handler.handle(req).await;
    assert!(resp.status().is_server_error(), "{}", resp.status());
    let path = dav_gate::davpath::DavPath::new("/docs/old.txt").unwrap();
    assert!(server.fs.metadata(&path).await.is_ok());
}

#[tokio::test]
async fn put_on_collection() {
    let server = TestServer::new();
    server.mkcol("/docs/").await;
    let handler = server.builder().build();

    let resp = send(&handler, "PUT", "/docs/", &[], "data").await;
    assert_eq!(resp.status(), 405);
    // resolved to the collection, not redirected.
    let resp = send(&handler, "PUT", "/docs", &[], "data").await;
    assert_eq!(resp.status(), 405);
}

#[tokio::test]
async fn mkcol() {
    let server = TestServer::new();
    let handler = server.builder().build();

    let resp = send(&handler, "MKCOL", "/docs", &[], "").await;
    assert_eq!(resp.status(), 201);

    let resp = send(&handler, "MKCOL", "/docs/", &[], "").await;
    assert_eq!(resp.status(), 405);
    assert!(header(&resp, "allow").unwrap().contains("PROPFIND"));

    let resp = send(&handler, "MKCOL", "/a/b/", &[], "").await;
    assert_eq!(resp.status(), 409);

    let resp = send(&handler, "MKCOL", "/other/", &[], "<x/>").await;
    assert_eq!(resp.status(), 415);
}

#[tokio::test]
async fn delete_is_recursive() {
    let server = TestServer::new();
    server.mkcol("/docs/").await;
    server.mkcol("/docs/sub/").await;
    server.put("/docs/sub/a.txt", "a").await;
    server.put("/docs/b.txt", "b").await;
    let handler = server.builder().build();

    let resp = send(&handler, "DELETE", "/docs/b.txt", &[], "").await;
    assert_eq!(resp.status(), 204);
    let resp = send(&handler, "DELETE", "/docs/b.txt", &[], "").await;
    assert_eq!(resp.status(), 404);

    let resp = send(&handler, "DELETE", "/docs", &[], "").await;
    assert_eq!(resp.status(), 204);
    let resp = send(&handler, "PROPFIND", "/docs/", &[], "").await;
    assert_eq!(resp.status(), 404);
}

// ============================================================================
// Configuration and the error boundary
// ============================================================================

#[tokio::test]
async fn read_only_handler() {
    let server = TestServer::new();
    server.put("/a.txt", "hello").await;
    let handler = server.builder().read_only(true).build();

    for method in ["PUT", "DELETE", "MKCOL"] {
        let resp = send(&handler, method, "/a.txt", &[], "").await;
        assert_eq!(resp.status(), 501, "{method}");
    }
    let resp = send(&handler, "GET", "/a.txt", &[], "").await;
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn method_not_allowed() {
    let server = TestServer::new();
    let handler = server.builder().methods(DavMethod::HTTP_RO).build();

    let resp = send(&handler, "PUT", "/a.txt", &[], "x").await;
    assert_eq!(resp.status(), 405);
    assert_eq!(header(&resp, "allow"), Some("HEAD, GET, POST, OPTIONS"));

    let resp = send(&handler, "LOCK", "/a.txt", &[], "").await;
    assert_eq!(resp.status(), 501);
}

#[tokio::test]
async fn mount_point_is_fixed() {
    let server = TestServer::new();
    let handler = server.builder().build();

    let resp = handler
        .handle_with(request("OPTIONS", "/one/", &[], ""), Some("/one".into()))
        .await;
    assert_eq!(resp.status(), 200);

    let resp = handler
        .handle_with(request("OPTIONS", "/two/", &[], ""), Some("/two".into()))
        .await;
    assert_eq!(resp.status(), 500);

    // clones share the mount point.
    let clone = handler.clone();
    let resp = clone
        .handle_with(request("OPTIONS", "/one/", &[], ""), Some("/one".into()))
        .await;
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn local_filesystem() {
    let dir = std::env::temp_dir().join(format!("dav-gate-test-{}", std::process::id()));
    std::fs::create_dir_all(dir.join("docs")).unwrap();
    std::fs::write(dir.join("docs/a.txt"), "on disk").unwrap();

    let handler = DavHandler::builder(FileSystem::local(&dir, false)).build();
    let resp = send(&handler, "GET", "/docs", &[], "").await;
    assert_eq!(resp.status(), 301);
    let resp = send(&handler, "GET", "/docs/a.txt", &[], "").await;
    assert_eq!(body_string(resp).await, "on disk");
    let resp = send(&handler, "PUT", "/missing/b.txt", &[], "x").await;
    assert_eq!(resp.status(), 409);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn encoded_dotdot_stays_inside_the_root() {
    let base = std::env::temp_dir().join(format!("dav-gate-root-{}", std::process::id()));
    std::fs::create_dir_all(base.join("root")).unwrap();
    std::fs::write(base.join("secret.txt"), "TOP SECRET").unwrap();

    let handler = DavHandler::builder(FileSystem::local(base.join("root"), false)).build();
    for uri in ["/%2e%2e/secret.txt", "/%2E%2E/secret.txt", "/.%2e/secret.txt"] {
        let resp = send(&handler, "GET", uri, &[], "").await;
        assert_eq!(resp.status(), 403, "GET {uri}");
        assert_eq!(body_string(resp).await, "");
    }
    let resp = send(&handler, "PUT", "/%2e%2e/evil.txt", &[], "x").await;
    assert_eq!(resp.status(), 403);
    let resp = send(&handler, "DELETE", "/%2e%2e/secret.txt", &[], "").await;
    assert_eq!(resp.status(), 403);

    assert!(!base.join("evil.txt").exists());
    assert_eq!(std::fs::read_to_string(base.join("secret.txt")).unwrap(), "TOP SECRET");
    std::fs::remove_dir_all(&base).unwrap();
}
