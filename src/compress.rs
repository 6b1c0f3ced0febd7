//! Content-Encoding negotiation and streaming compression of GET bodies.
use std::io::{self, Write};

use bytes::Bytes;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use futures_util::{Stream, StreamExt};
use http::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Encoding {
    Gzip,
    Deflate,
}

impl Encoding {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Encoding::Gzip => "gzip",
            Encoding::Deflate => "deflate",
        }
    }
}

// q-value of a coding in an Accept-Encoding header. `None` if not listed.
fn qvalue(accept: &str, coding: &str, alias: Option<&str>) -> Option<f32> {
    let mut wildcard = None;
    for item in accept.split(',') {
        let mut parts = item.split(';');
        let name = parts.next().unwrap_or("").trim();
        let q = parts
            .filter_map(|p| p.trim().strip_prefix("q="))
            .find_map(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);
        if name.eq_ignore_ascii_case(coding) || alias.map_or(false, |a| name.eq_ignore_ascii_case(a)) {
            return Some(q);
        }
        if name == "*" {
            wildcard = Some(q);
        }
    }
    wildcard
}

fn compressible(mime: &str) -> bool {
    mime.starts_with("text/")
        || mime.ends_with("+xml")
        || mime.ends_with("/xml")
        || mime.ends_with("/json")
        || mime.ends_with("/javascript")
}

// MSIE 6 before XP SP2 (which added "SV1" to the UA) breaks on compressed bodies.
fn agent_accepts_compression(user_agent: Option<&str>) -> bool {
    match user_agent {
        Some(ua) => !ua.contains("MSIE 6.0") || ua.contains("SV1"),
        None => true,
    }
}

/// Pick a content-coding for a response of type `mime`, if any.
pub(crate) fn negotiate(req: &Request<()>, mime: &str) -> Option<Encoding> {
    if !compressible(mime) {
        return None;
    }
    let headers = req.headers();
    let ua = headers.get(http::header::USER_AGENT).and_then(|v| v.to_str().ok());
    if !agent_accepts_compression(ua) {
        debug!("compression withheld for {:?}", ua);
        return None;
    }
    let accept = headers
        .get_all(http::header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join(",");
    let gzip = qvalue(&accept, "gzip", Some("x-gzip")).unwrap_or(0.0);
    let deflate = qvalue(&accept, "deflate", None).unwrap_or(0.0);
    if gzip > 0.0 && gzip >= deflate {
        Some(Encoding::Gzip)
    } else if deflate > 0.0 {
        Some(Encoding::Deflate)
    } else {
        None
    }
}

enum Encoder {
    Gzip(GzEncoder<Vec<u8>>),
    Deflate(ZlibEncoder<Vec<u8>>),
}

impl Encoder {
    fn new(encoding: Encoding) -> Encoder {
        match encoding {
            Encoding::Gzip => Encoder::Gzip(GzEncoder::new(Vec::new(), Compression::default())),
            Encoding::Deflate => Encoder::Deflate(ZlibEncoder::new(Vec::new(), Compression::default())),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Encoder::Gzip(e) => e.write_all(buf),
            Encoder::Deflate(e) => e.write_all(buf),
        }
    }

    // hand out whatever compressed output is ready.
    fn take(&mut self) -> Bytes {
        let buf = match self {
            Encoder::Gzip(e) => e.get_mut(),
            Encoder::Deflate(e) => e.get_mut(),
        };
        Bytes::from(std::mem::take(buf))
    }

    fn finish(self) -> io::Result<Bytes> {
        let buf = match self {
            Encoder::Gzip(e) => e.finish()?,
            Encoder::Deflate(e) => e.finish()?,
        };
        Ok(Bytes::from(buf))
    }
}

/// Compress a body stream.
pub(crate) fn compress<S>(input: S, encoding: Encoding) -> impl Stream<Item = io::Result<Bytes>> + Send
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    async_stream::try_stream! {
        let mut encoder = Encoder::new(encoding);
        let mut input = Box::pin(input);
        while let Some(chunk) = input.next().await {
            encoder.write_all(&chunk?)?;
            let out = encoder.take();
            if !out.is_empty() {
                yield out;
            }
        }
        let out = encoder.finish()?;
        if !out.is_empty() {
            yield out;
        }
    }
}
