//! Resource URI canonicalization.
//!
//! A request URI without a trailing slash that really names a collection
//! gets the slash added. Whether the client is then told about it (with a
//! redirect) depends on its User-Agent: some WebDAV clients mishandle
//! redirects, and those get the resolved resource served directly.
use regex::Regex;

use crate::davpath::DavPath;
use crate::fs::DavFileSystem;
use crate::util::DavMethod;

lazy_static! {
    // Clients known to choke on redirects. Matched case-sensitively.
    static ref NO_REDIRECT_AGENTS: Vec<Regex> = [
        r"^Microsoft Data Access Internet Publishing Provider",
        r"^Microsoft-WebDAV-MiniRedir",
        r"^WebDAVFS/",
        r"^gvfs/",
        r"^DavClnt",
        r"^Jakarta Commons-HttpClient",
    ]
    .iter()
    .filter_map(|re| Regex::new(re).ok())
    .collect();
}

/// Result of canonicalizing a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Canonical {
    pub path: DavPath,
    /// The path differs from the one that was requested.
    pub changed: bool,
}

/// Does this User-Agent follow redirects reliably.
pub(crate) fn is_redirect_supported(user_agent: Option<&str>) -> bool {
    match user_agent {
        Some(ua) => !NO_REDIRECT_AGENTS.iter().any(|re| re.is_match(ua)),
        None => true,
    }
}

/// Resolve `path` to its canonical form.
///
/// A path without trailing slash is taken to be a collection if the
/// method creates a collection, if the analogous path (a COPY/MOVE style
/// destination) ends in a slash, or, with no analogous path, if no
/// non-collection resource exists under the bare name while the slashed
/// form is an existing collection.
///
/// Storage errors are not propagated; they mean "leave the path alone".
pub(crate) async fn canonicalize(
    fs: &dyn DavFileSystem,
    path: &DavPath,
    method: DavMethod,
    analogous: Option<&DavPath>,
) -> Canonical {
    let unchanged = || Canonical {
        path: path.clone(),
        changed: false,
    };
    let slashed = || Canonical {
        path: path.with_slash(),
        changed: true,
    };

    if path.is_collection() || path.is_star() {
        return unchanged();
    }
    if method == DavMethod::MKCOL {
        return slashed();
    }
    if let Some(analogous) = analogous {
        return if analogous.is_collection() {
            slashed()
        } else {
            unchanged()
        };
    }

    match fs.metadata(path).await {
        Ok(meta) if !meta.is_dir() => return unchanged(),
        Ok(_) => {}
        Err(e) => {
            debug!("canonicalize: {path}: {e:?}");
        }
    }
    let with_slash = path.with_slash();
    match fs.metadata(&with_slash).await {
        Ok(meta) if meta.is_dir() => Canonical {
            path: with_slash,
            changed: true,
        },
        Ok(_) => unchanged(),
        Err(e) => {
            debug!("canonicalize: {with_slash}: {e:?}");
            unchanged()
        }
    }
}
