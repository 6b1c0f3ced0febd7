use std::time::SystemTime;

use headers::{HeaderMapExt, IfModifiedSince, IfUnmodifiedSince};
use http::Request;

use crate::errors::DavError;
use crate::util::round_down_to_second;
use crate::DavResult;

fn if_modified_since(req: &Request<()>) -> DavResult<Option<SystemTime>> {
    match req.headers().typed_try_get::<IfModifiedSince>() {
        Ok(v) => Ok(v.map(SystemTime::from)),
        Err(_) => Err(DavError::MalformedHeader("If-Modified-Since")),
    }
}

// Parsed so that a malformed value is still a 400, but not acted upon.
fn if_unmodified_since(req: &Request<()>) -> DavResult<Option<SystemTime>> {
    match req.headers().typed_try_get::<IfUnmodifiedSince>() {
        Ok(v) => Ok(v.map(SystemTime::from)),
        Err(_) => Err(DavError::MalformedHeader("If-Unmodified-Since")),
    }
}

/// Decide whether a GET/HEAD can be answered with 304 Not Modified.
///
/// The resource time is rounded down to whole seconds, since that is all
/// an HTTP date can carry. Checking has no side effects, so repeating a
/// request with the same validator gives the same answer.
///
/// `If-Unmodified-Since` is validated but not enforced.
pub(crate) fn not_modified(req: &Request<()>, modified: Option<SystemTime>) -> DavResult<bool> {
    let ims = if_modified_since(req)?;
    if let Some(ius) = if_unmodified_since(req)? {
        debug!("If-Unmodified-Since {:?} not enforced", ius);
    }
    match (ims, modified) {
        (Some(ims), Some(modified)) => Ok(ims >= round_down_to_second(modified)),
        _ => Ok(false),
    }
}
