//! Utility module to handle the path part of an URL as a filesystem path.
//!
use std::error::Error;
#[cfg(unix)]
use std::ffi::OsStr;
#[cfg(unix)]
use std::os::unix::ffi::OsStrExt;
#[cfg(unix)]
use std::path::Path;
#[cfg(not(unix))]
use std::path::PathBuf;

use percent_encoding as pct;

use crate::DavError;

/// URL path, with hidden prefix.
///
/// The path is kept percent-decoded and normalized: no `.` or `..`
/// segments, no doubled slashes. A trailing slash marks a collection.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DavPath {
    fullpath: Vec<u8>,
    pfxlen: Option<usize>,
}

/// Reference to DavPath, no prefix.
/// It's what you get when you `Deref` `DavPath`, and returned by `DavPath::with_prefix()`.
pub struct DavPathRef {
    fullpath: [u8],
}

// Encode all non-unreserved characters, except '/'.
// See RFC3986, and https://en.wikipedia.org/wiki/Percent-encoding .
const PATH_ENCODE_SET: &pct::AsciiSet = &pct::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Error returned by some of the DavPath methods.
#[derive(Debug)]
pub enum ParseError {
    /// cannot parse
    InvalidPath,
    /// outside of prefix
    PrefixMismatch,
    /// too many dotdots
    ForbiddenPath,
}

impl Error for ParseError {}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<ParseError> for DavError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::InvalidPath => DavError::InvalidPath,
            ParseError::PrefixMismatch => DavError::IllegalPath,
            ParseError::ForbiddenPath => DavError::ForbiddenPath,
        }
    }
}

// a decoded segment can contain any value except '/' or '\0'
fn valid_segment(segment: &[u8]) -> Result<(), ParseError> {
    if segment.iter().any(|&x| x == 0 || x == b'/') {
        return Err(ParseError::InvalidPath);
    }
    Ok(())
}

// encode path segment with user-defined ENCODE_SET
fn encode_path(src: &[u8]) -> Vec<u8> {
    pct::percent_encode(src, PATH_ENCODE_SET)
        .to_string()
        .into_bytes()
}

// make path safe:
// - raw path before decoding can contain only printable ascii
// - make sure path is absolute
// - remove query part (everything after ?)
// - merge consecutive slashes
// - decode percent encoded bytes per segment
// - process . and .. after decoding, so %2e%2e is a dotdot too.
// - do not allow NUL or '/' in segments.
fn normalize_path(rp: &[u8]) -> Result<Vec<u8>, ParseError> {
    // must consist of printable ASCII
    if rp.iter().any(|&x| !(32..=126).contains(&x)) {
        Err(ParseError::InvalidPath)?;
    }

    // don't allow fragments. query part gets deleted.
    let mut rawpath = rp;
    if let Some(pos) = rawpath.iter().position(|&x| x == b'?' || x == b'#') {
        if rawpath[pos] == b'#' {
            Err(ParseError::InvalidPath)?;
        }
        rawpath = &rawpath[..pos];
    }

    // must start with "/"
    if rawpath.is_empty() || rawpath[0] != b'/' {
        Err(ParseError::InvalidPath)?;
    }

    // split up in segments
    let isdir = matches!(rawpath.last(), Some(x) if *x == b'/');
    let mut v: Vec<Vec<u8>> = Vec::new();
    for raw in rawpath.split(|c| *c == b'/') {
        let segment: Vec<u8> = pct::percent_decode(raw).collect();
        match segment.as_slice() {
            b"." | b"" => {}
            b".." => {
                if v.pop().is_none() {
                    return Err(ParseError::ForbiddenPath);
                }
            }
            _ => {
                valid_segment(&segment)?;
                v.push(segment);
            }
        }
    }
    let mut path = Vec::new();
    for segment in &v {
        path.push(b'/');
        path.extend_from_slice(segment);
    }
    if isdir || path.is_empty() {
        path.push(b'/');
    }
    Ok(path)
}

impl DavPath {
    /// from URL encoded path
    pub fn new(src: &str) -> Result<DavPath, ParseError> {
        let path = normalize_path(src.as_bytes())?;
        Ok(DavPath {
            fullpath: path.to_vec(),
            pfxlen: None,
        })
    }

    /// Set prefix.
    pub fn set_prefix(&mut self, prefix: &str) -> Result<(), ParseError> {
        let path = &mut self.fullpath;
        let mut prefix = prefix.as_bytes();
        if prefix.ends_with(b"/") {
            prefix = &prefix[..prefix.len() - 1];
        }
        if !path.starts_with(prefix) {
            return Err(ParseError::PrefixMismatch);
        }
        let pfxlen = prefix.len();
        if path.len() == pfxlen {
            path.push(b'/');
        } else if path[pfxlen] != b'/' {
            return Err(ParseError::PrefixMismatch);
        }
        self.pfxlen = Some(pfxlen);
        Ok(())
    }

    /// Return a DavPathRef that refers to the entire URL path with prefix.
    pub fn with_prefix(&self) -> &DavPathRef {
        DavPathRef::new(&self.fullpath)
    }

    /// from URL encoded path and non-encoded prefix.
    pub(crate) fn from_str_and_prefix(src: &str, prefix: &str) -> Result<DavPath, ParseError> {
        let path = normalize_path(src.as_bytes())?;
        let mut davpath = DavPath {
            fullpath: path.to_vec(),
            pfxlen: None,
        };
        davpath.set_prefix(prefix)?;
        Ok(davpath)
    }

    /// from request.uri
    pub(crate) fn from_uri_and_prefix(uri: &http::uri::Uri, prefix: &str) -> Result<Self, ParseError> {
        match uri.path() {
            "*" => Ok(DavPath {
                fullpath: b"*".to_vec(),
                pfxlen: None,
            }),
            path if path.starts_with('/') => DavPath::from_str_and_prefix(path, prefix),
            _ => Err(ParseError::InvalidPath),
        }
    }

    /// Add a slash to the end of the path (if not already present).
    pub(crate) fn add_slash(&mut self) {
        if !self.is_collection() {
            self.fullpath.push(b'/');
        }
    }

    /// Return a copy with a trailing slash.
    pub(crate) fn with_slash(&self) -> DavPath {
        let mut p = self.clone();
        p.add_slash();
        p
    }

    // Add a segment to the end of the path.
    pub(crate) fn push_segment(&mut self, b: &[u8]) {
        if !self.is_collection() {
            self.fullpath.push(b'/');
        }
        self.fullpath.extend_from_slice(b);
    }

    /// Return the parent directory.
    pub(crate) fn parent(&self) -> DavPath {
        let path = self.as_bytes();
        let mut segs = path
            .split(|&c| c == b'/')
            .filter(|e| !e.is_empty())
            .collect::<Vec<&[u8]>>();
        segs.pop();
        if !segs.is_empty() {
            segs.push(b"");
        }
        segs.insert(0, b"");
        let mut rel = segs.join(&b'/');
        if rel.is_empty() {
            rel.push(b'/');
        }
        let mut fullpath = self.prefix().to_vec();
        fullpath.extend_from_slice(&rel);
        DavPath {
            pfxlen: self.pfxlen,
            fullpath,
        }
    }

    fn prefix(&self) -> &[u8] {
        &self.fullpath[..self.pfxlen.unwrap_or(0)]
    }
}

impl std::ops::Deref for DavPath {
    type Target = DavPathRef;

    fn deref(&self) -> &DavPathRef {
        let pfxlen = self.pfxlen.unwrap_or(0);
        DavPathRef::new(&self.fullpath[pfxlen..])
    }
}

impl DavPathRef {
    // NOTE: this is safe, it is what libstd does in std::path::Path::new(), see
    // https://github.com/rust-lang/rust/blob/6700e186883a83008963d1fdba23eff2b1713e56/src/libstd/path.rs#L1788
    fn new(path: &[u8]) -> &DavPathRef {
        unsafe { &*(path as *const [u8] as *const DavPathRef) }
    }

    /// As raw bytes, not encoded, no prefix.
    pub fn as_bytes(&self) -> &[u8] {
        &self.fullpath
    }

    /// As URL encoded string.
    pub fn as_url_string(&self) -> String {
        let p = encode_path(&self.fullpath);
        String::from_utf8(p).unwrap_or_default()
    }

    /// As a relative OS path, for joining onto a base directory.
    #[cfg(unix)]
    pub fn as_rel_ospath(&self) -> &Path {
        let spath = &self.fullpath;
        let mut path = if !spath.is_empty() {
            &spath[1..]
        } else {
            spath
        };
        if path.ends_with(b"/") {
            path = &path[..path.len() - 1];
        }
        let os_string = OsStr::from_bytes(path);
        Path::new(os_string)
    }

    /// As a relative OS path, for joining onto a base directory.
    #[cfg(not(unix))]
    pub fn as_rel_ospath(&self) -> PathBuf {
        let spath = String::from_utf8_lossy(&self.fullpath);
        let p = spath.trim_start_matches('/').trim_end_matches('/');
        PathBuf::from(p.replace('/', std::path::MAIN_SEPARATOR_STR))
    }

    /// Is this a collection i.e. does the original URL path end in "/".
    pub fn is_collection(&self) -> bool {
        self.fullpath.ends_with(b"/")
    }

    /// is this the root of the tree.
    pub fn is_root(&self) -> bool {
        &self.fullpath == b"/"
    }

    // is this a "star" request (only used with OPTIONS)
    pub(crate) fn is_star(&self) -> bool {
        &self.fullpath == b"*"
    }

    /// The filename is the last segment of the path. Can be empty.
    pub(crate) fn file_name_bytes(&self) -> &[u8] {
        let segs = self
            .fullpath
            .split(|&c| c == b'/')
            .filter(|e| !e.is_empty())
            .collect::<Vec<&[u8]>>();
        if !segs.is_empty() {
            segs[segs.len() - 1]
        } else {
            b""
        }
    }

    /// The filename as a (lossy) string.
    pub fn file_name(&self) -> String {
        String::from_utf8_lossy(self.file_name_bytes()).into_owned()
    }

    pub(crate) fn get_mime_type_str(&self) -> &'static str {
        let name = self.file_name_bytes();
        let d = name.rsplitn(2, |&c| c == b'.').collect::<Vec<&[u8]>>();
        if d.len() > 1 {
            if let Ok(ext) = std::str::from_utf8(d[0]) {
                if let Some(t) = mime_guess::from_ext(ext).first_raw() {
                    return t;
                }
            }
        }
        "application/octet-stream"
    }
}

impl std::fmt::Display for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", &self.as_url_string_with_prefix_debug())
    }
}

impl std::fmt::Debug for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", &self.as_url_string_with_prefix_debug())
    }
}

impl DavPath {
    fn as_url_string_with_prefix_debug(&self) -> String {
        let mut p = encode_path(self.prefix());
        if !p.is_empty() {
            p.extend_from_slice(b"[");
        }
        p.extend_from_slice(&encode_path(self.as_bytes()));
        if !self.prefix().is_empty() {
            p.extend_from_slice(b"]");
        }
        String::from_utf8_lossy(&p).into_owned()
    }
}
