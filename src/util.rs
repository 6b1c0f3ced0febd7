use std::io::{Cursor, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bitflags::bitflags;
use bytes::Bytes;
use headers::Header;
use http::method::InvalidMethod;
use time::format_description::well_known::Rfc3339;
use time::macros::offset;

use crate::errors::DavError;
use crate::DavResult;

bitflags! {
    /// HTTP and WebDAV methods understood by the handler.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DavMethod: u32 {
        const HEAD = 0x0001;
        const GET = 0x0002;
        const POST = 0x0004;
        const PUT = 0x0008;
        const DELETE = 0x0010;
        const OPTIONS = 0x0020;
        const PROPFIND = 0x0040;
        const MKCOL = 0x0080;

        const HTTP_RO = Self::HEAD.bits() | Self::GET.bits() | Self::POST.bits()
            | Self::OPTIONS.bits();
        const HTTP_RW = Self::HTTP_RO.bits() | Self::PUT.bits() | Self::DELETE.bits();
        const WEBDAV_RO = Self::HTTP_RO.bits() | Self::PROPFIND.bits();
        const WEBDAV_BODY = Self::PUT.bits() | Self::PROPFIND.bits();
        // state-changing methods; refused by read-only handlers and policies.
        const WRITE = Self::PUT.bits() | Self::DELETE.bits() | Self::MKCOL.bits();
    }
}

impl DavMethod {
    pub const WEBDAV_RW: Self = Self::all();

    /// Canonical method name.
    pub fn as_str(&self) -> &'static str {
        METHOD_NAMES
            .iter()
            .find(|(m, _)| m == self)
            .map(|(_, name)| *name)
            .unwrap_or("")
    }

    /// Comma-joined names of the single methods in this set, in `Allow` header order.
    pub fn allow_header(&self) -> String {
        self.iter()
            .map(|m| m.as_str())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

const METHOD_NAMES: [(DavMethod, &str); 8] = [
    (DavMethod::HEAD, "HEAD"),
    (DavMethod::GET, "GET"),
    (DavMethod::POST, "POST"),
    (DavMethod::PUT, "PUT"),
    (DavMethod::DELETE, "DELETE"),
    (DavMethod::OPTIONS, "OPTIONS"),
    (DavMethod::PROPFIND, "PROPFIND"),
    (DavMethod::MKCOL, "MKCOL"),
];

/// A set of allowed methods.
pub type DavMethodSet = DavMethod;

// translate method into our own enum that has webdav methods as well.
pub fn dav_method(m: &http::Method) -> DavResult<DavMethod> {
    let m = match *m {
        http::Method::HEAD => DavMethod::HEAD,
        http::Method::GET => DavMethod::GET,
        http::Method::POST => DavMethod::POST,
        http::Method::PUT => DavMethod::PUT,
        http::Method::DELETE => DavMethod::DELETE,
        http::Method::OPTIONS => DavMethod::OPTIONS,
        _ => match m.as_str() {
            "PROPFIND" => DavMethod::PROPFIND,
            "MKCOL" => DavMethod::MKCOL,
            _ => {
                return Err(DavError::UnknownDavMethod);
            }
        },
    };
    Ok(m)
}

// for external use.
impl std::convert::TryFrom<&http::Method> for DavMethod {
    type Error = InvalidMethod;

    fn try_from(value: &http::Method) -> Result<Self, Self::Error> {
        dav_method(value).map_err(|_| {
            // A trick to get at the value of http::method::InvalidMethod.
            http::method::Method::from_bytes(b"").unwrap_err()
        })
    }
}

pub(crate) fn systemtime_to_offsetdatetime(t: SystemTime) -> time::OffsetDateTime {
    match t.duration_since(UNIX_EPOCH) {
        Ok(t) => match time::OffsetDateTime::from_unix_timestamp(t.as_secs() as i64) {
            Ok(tm) => tm.to_offset(offset!(UTC)),
            Err(_) => time::OffsetDateTime::UNIX_EPOCH,
        },
        Err(_) => time::OffsetDateTime::UNIX_EPOCH.to_offset(offset!(UTC)),
    }
}

pub(crate) fn systemtime_to_httpdate(t: SystemTime) -> String {
    let d = headers::Date::from(t);
    let mut v = Vec::new();
    d.encode(&mut v);
    v.first()
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_owned())
        .unwrap_or_default()
}

pub(crate) fn systemtime_to_rfc3339(t: SystemTime) -> String {
    // 1996-12-19T16:39:57Z
    systemtime_to_offsetdatetime(t)
        .format(&Rfc3339)
        .unwrap_or_default()
}

// HTTP dates carry whole seconds only.
pub(crate) fn round_down_to_second(t: SystemTime) -> SystemTime {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => UNIX_EPOCH + Duration::from_secs(d.as_secs()),
        Err(_) => t,
    }
}

pub(crate) fn unix_millis(t: SystemTime) -> u128 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

pub(crate) fn md5_hex(data: impl AsRef<[u8]>) -> String {
    format!("{:x}", md5::compute(data))
}

// A buffer that implements "Write".
#[derive(Clone)]
pub(crate) struct MemBuffer(Cursor<Vec<u8>>);

impl MemBuffer {
    pub fn new() -> MemBuffer {
        MemBuffer(Cursor::new(Vec::new()))
    }

    pub fn take(&mut self) -> Bytes {
        let buf = std::mem::take(self.0.get_mut());
        self.0.set_position(0);
        Bytes::from(buf)
    }
}

impl Write for MemBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
