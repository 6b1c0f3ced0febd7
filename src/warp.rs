//! Adapter for the `warp` HTTP server framework.
//!
//! The filters in this module will always succeed and never
//! return an error. For example, if a file is not found, or
//! credentials are missing, the filter will return a 404 or 401
//! reply, and not an internal rejection.
//!
use std::convert::Infallible;
use std::path::Path;

use crate::{DavHandler, FileSystem};
use warp::{filters::BoxedFilter, Filter, Reply};

/// Reply-filter that runs a DavHandler.
///
/// Just pass in a pre-configured DavHandler. The path up to this point is
/// added to the handler's prefix; it is the mount point and must not vary
/// between requests.
pub fn dav_handler(handler: DavHandler) -> BoxedFilter<(impl Reply,)> {
    use http::header::HeaderMap;
    use http::uri::Uri;
    use http::{Response, StatusCode};
    use warp::path::{FullPath, Tail};

    warp::method()
        .and(warp::path::full())
        .and(warp::path::tail())
        .and(warp::header::headers_cloned())
        .and(warp::body::stream())
        .and_then(
            move |method, path_full: FullPath, path_tail: Tail, headers: HeaderMap, body| {
                let handler = handler.clone();

                async move {
                    // rebuild an http::Request struct.
                    let path_str = path_full.as_str();
                    let mut builder = http::Request::builder().method(method);
                    if let Ok(uri) = path_str.parse::<Uri>() {
                        builder = builder.uri(uri);
                    }
                    for (k, v) in headers.iter() {
                        builder = builder.header(k, v);
                    }
                    let request = match builder.body(body) {
                        Ok(request) => request,
                        Err(e) => {
                            debug!("warp: bad request {}: {}", path_str, e);
                            let mut response = Response::new(hyper::Body::empty());
                            *response.status_mut() = StatusCode::BAD_REQUEST;
                            return Ok::<_, Infallible>(response);
                        }
                    };

                    let path_len = path_str.len();
                    let tail_len = path_tail.as_str().len();
                    let prefix = path_str[..path_len - tail_len].to_string();
                    let response = handler.handle_stream_with(request, Some(prefix)).await;

                    // Need to remap the http_body::Body to a hyper::Body.
                    let (parts, body) = response.into_parts();
                    let response = Response::from_parts(parts, hyper::Body::wrap_stream(body));
                    Ok::<_, Infallible>(response)
                }
            },
        )
        .boxed()
}

/// Creates a Filter that serves files and directories at the
/// base path joined with the remainder of the request path,
/// like `warp::filters::fs::dir`, without authentication.
///
/// With `auto_index_over_get`, a GET on a directory returns an HTML index,
/// otherwise it is refused with 405.
pub fn dav_dir(base: impl AsRef<Path>, auto_index_over_get: bool) -> BoxedFilter<(impl Reply,)> {
    dav_handler(
        DavHandler::builder(FileSystem::local(base.as_ref(), false))
            .autoindex(auto_index_over_get)
            .build(),
    )
}

/// Creates a Filter that serves a single file, ignoring the request path,
/// like `warp::filters::fs::file`.
pub fn dav_file(file: impl AsRef<Path>) -> BoxedFilter<(impl Reply,)> {
    dav_handler(DavHandler::builder(FileSystem::local_file(file.as_ref(), false)).build())
}
