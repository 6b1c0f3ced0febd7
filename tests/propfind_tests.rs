//! PROPFIND and the multistatus response.

mod common;

use common::*;
use dav_gate::RealmPolicy;

fn responses(xml: &str) -> usize {
    xml.matches("<D:response>").count()
}

async fn fixture() -> TestServer {
    let server = TestServer::new();
    server.mkcol("/docs/").await;
    server.put("/docs/a.txt", "alpha").await;
    server.put("/docs/b.txt", "beta").await;
    server.mkcol("/docs/sub/").await;
    server.put("/docs/sub/c.txt", "gamma").await;
    server
}

#[tokio::test]
async fn depth_one_lists_children() {
    let server = fixture().await;
    let handler = server.builder().build();

    let resp = send(&handler, "PROPFIND", "/docs/", &[("Depth", "1")], "").await;
    assert_eq!(resp.status(), 207);
    assert_eq!(header(&resp, "content-type"), Some("application/xml; charset=utf-8"));
    let xml = body_string(resp).await;

    // the collection itself plus a.txt, b.txt and sub/.
    assert_eq!(responses(&xml), 4, "{xml}");
    assert!(xml.contains("<D:href>/docs/</D:href>"));
    assert!(xml.contains("<D:href>/docs/a.txt</D:href>"));
    assert!(xml.contains("<D:href>/docs/sub/</D:href>"));
    assert!(!xml.contains("c.txt"));
    assert_eq!(xml.matches("<D:status>HTTP/1.1 200 OK</D:status>").count(), 4);
    assert!(xml.contains("<D:collection"));
    assert!(xml.contains("<D:getcontentlength>5</D:getcontentlength>"));
}

#[tokio::test]
async fn depth_zero_is_the_target_only() {
    let server = fixture().await;
    let handler = server.builder().build();

    let resp = send(&handler, "PROPFIND", "/docs/", &[("Depth", "0")], "").await;
    assert_eq!(resp.status(), 207);
    let xml = body_string(resp).await;
    assert_eq!(responses(&xml), 1, "{xml}");

    let resp = send(&handler, "PROPFIND", "/docs/a.txt", &[("Depth", "1")], "").await;
    assert_eq!(resp.status(), 207);
    let xml = body_string(resp).await;
    assert_eq!(responses(&xml), 1, "{xml}");
    assert!(xml.contains("<D:getcontenttype>text/plain</D:getcontenttype>"));
}

#[tokio::test]
async fn depth_infinity_recurses() {
    let server = fixture().await;
    let handler = server.builder().build();

    let cases: [&[(&str, &str)]; 2] = [&[("Depth", "infinity")], &[]];
    for headers in cases {
        let resp = send(&handler, "PROPFIND", "/docs/", headers, "").await;
        assert_eq!(resp.status(), 207);
        let xml = body_string(resp).await;
        assert_eq!(responses(&xml), 5, "{xml}");
        assert!(xml.contains("<D:href>/docs/sub/c.txt</D:href>"));
    }
}

#[tokio::test]
async fn named_properties() {
    let server = fixture().await;
    let handler = server.builder().build();

    let body = r#"<?xml version="1.0" encoding="utf-8"?>
        <D:propfind xmlns:D="DAV:" xmlns:Z="urn:example">
          <D:prop><D:getcontentlength/><D:displayname/><Z:color/></D:prop>
        </D:propfind>"#;
    let resp = send(&handler, "PROPFIND", "/docs/", &[("Depth", "1")], body).await;
    assert_eq!(resp.status(), 207);
    let xml = body_string(resp).await;
    assert!(xml.contains("<D:displayname>a.txt</D:displayname>"), "{xml}");
    assert!(xml.contains("<D:getcontentlength>4</D:getcontentlength>"), "{xml}");
    assert!(!xml.contains("getlastmodified"), "{xml}");
    assert!(!xml.contains("color"), "{xml}");

    let body = r#"<D:propfind xmlns:D="DAV:"><D:propname/></D:propfind>"#;
    let resp = send(&handler, "PROPFIND", "/docs/a.txt", &[("Depth", "0")], body).await;
    let xml = body_string(resp).await;
    assert!(xml.contains("<D:getetag />") || xml.contains("<D:getetag/>"), "{xml}");
    assert!(!xml.contains("alpha"), "{xml}");
}

#[tokio::test]
async fn missing_target() {
    let server = fixture().await;
    let handler = server.builder().build();

    let resp = send(&handler, "PROPFIND", "/nope/", &[("Depth", "0")], "").await;
    assert_eq!(resp.status(), 404);
    assert_eq!(body_string(resp).await, "");
}

#[tokio::test]
async fn bad_request_bodies() {
    let server = fixture().await;
    let handler = server.builder().build();

    for body in [
        "<D:propfind xmlns:D=\"DAV:\"><D:allprop/>",
        "<propfind><allprop/></propfind>",
        "<D:propfind xmlns:D=\"DAV:\"><D:allprop/><D:propname/></D:propfind>",
    ] {
        let resp = send(&handler, "PROPFIND", "/docs/", &[("Depth", "0")], body).await;
        assert_eq!(resp.status(), 400, "{body}");
    }
}

#[tokio::test]
async fn propfind_behind_a_realm() {
    let server = fixture().await;
    let handler = server
        .builder()
        .strip_prefix("/dav")
        .policy(RealmPolicy::new().protect("/docs", REALM))
        .build();

    let nonce = challenge(&handler, "PROPFIND", "/dav/docs/").await;
    let auth = digest_authorization(USER, PASSWORD, REALM, &nonce, "PROPFIND", "/dav/docs/");
    let headers = [("Authorization", auth.as_str()), ("Depth", "1")];
    let resp = send(&handler, "PROPFIND", "/dav/docs/", &headers, "").await;
    assert_eq!(resp.status(), 207);
    let xml = body_string(resp).await;
    assert_eq!(responses(&xml), 4, "{xml}");
    assert!(xml.contains("<D:href>/dav/docs/a.txt</D:href>"), "{xml}");
}
