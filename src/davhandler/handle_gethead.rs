use std::cmp::Ordering;
use std::io;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use headers::HeaderMapExt;
use htmlescape::encode_minimal;
use http::{header, HeaderValue, Request, Response, StatusCode};

use crate::body::Body;
use crate::compress::{compress, negotiate};
use crate::conditional::not_modified;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::*;
use crate::util::{systemtime_to_httpdate, DavMethod};
use crate::DavResult;

pub(crate) const READ_BUF_SIZE: usize = 16384;

// Turn an open file into a body stream, `size` bytes at a time.
fn file_stream(mut file: Box<dyn DavFile>, size: usize) -> impl Stream<Item = io::Result<Bytes>> + Send {
    async_stream::stream! {
        loop {
            match file.read_bytes(size).await {
                Ok(buf) if buf.is_empty() => break,
                Ok(buf) => yield Ok(buf),
                Err(e) => {
                    yield Err(io::Error::new(io::ErrorKind::Other, e));
                    break;
                }
            }
        }
    }
}

impl crate::DavHandler {
    /// GET, HEAD and POST (which is answered like a GET).
    pub(crate) async fn handle_get(
        &self,
        req: &Request<()>,
        path: &DavPath,
        method: DavMethod,
    ) -> DavResult<Response<Body>> {
        let head = method == DavMethod::HEAD;

        let meta = self.fs.metadata(path).await?;
        if meta.is_dir() {
            if !self.autoindex {
                let allow = self.allowed_methods(path, Some(&*meta));
                return Err(DavError::MethodNotAllowed(allow.allow_header()));
            }
            return self.handle_autoindex(path, head).await;
        }

        // validator match pre-empts everything else.
        let modified = meta.modified().ok();
        if not_modified(req, modified)? {
            let mut res = Response::new(Body::empty());
            *res.status_mut() = StatusCode::NOT_MODIFIED;
            return Ok(res);
        }

        let mime = path.get_mime_type_str();
        let encoding = if self.compression {
            negotiate(req, mime)
        } else {
            None
        };

        let mut res = Response::new(Body::empty());
        let h = res.headers_mut();
        h.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime));
        if let Some(modified) = modified {
            h.typed_insert(headers::LastModified::from(modified));
        }
        if let Some(etag) = meta.etag() {
            if let Ok(etag) = format!("\"{etag}\"").parse::<headers::ETag>() {
                h.typed_insert(etag);
            }
        }
        match encoding {
            Some(enc) => {
                h.insert(header::CONTENT_ENCODING, HeaderValue::from_static(enc.as_str()));
                h.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
            }
            None => h.typed_insert(headers::ContentLength(meta.len())),
        }

        if head {
            return Ok(res);
        }

        let file = self.fs.open(path, OpenOptions::read()).await?;
        let stream = file_stream(file, self.read_buf_size);
        *res.body_mut() = match encoding {
            Some(enc) => Body::stream(compress(stream, enc)),
            None => Body::stream(stream),
        };
        Ok(res)
    }

    async fn handle_autoindex(&self, path: &DavPath, head: bool) -> DavResult<Response<Body>> {
        struct Entry {
            name: String,
            href: String,
            is_dir: bool,
            size: u64,
            modified: String,
        }

        let mut entries = Vec::new();
        let mut dir = self.fs.read_dir(path).await?;
        while let Some(dirent) = dir.next().await {
            let meta = match dirent.metadata().await {
                Ok(meta) => meta,
                Err(e) => {
                    trace!("autoindex: skipping entry: {:?}", e);
                    continue;
                }
            };
            let name = dirent.name();
            let mut p = path.clone();
            p.push_segment(&name);
            if meta.is_dir() {
                p.add_slash();
            }
            entries.push(Entry {
                name: String::from_utf8_lossy(&name).into_owned(),
                href: p.with_prefix().as_url_string(),
                is_dir: meta.is_dir(),
                size: meta.len(),
                modified: meta
                    .modified()
                    .map(systemtime_to_httpdate)
                    .unwrap_or_default(),
            });
        }
        // directories first, then by name.
        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });

        let title = encode_minimal(&String::from_utf8_lossy(path.with_prefix().as_bytes()));
        let mut w = String::new();
        w.push_str("<!DOCTYPE html>\n<html><head>\n");
        w.push_str(&format!("<title>Index of {title}</title>\n"));
        w.push_str("<meta charset=\"utf-8\">\n</head><body>\n");
        w.push_str(&format!("<h1>Index of {title}</h1>\n"));
        w.push_str("<table>\n<tr><th>Name</th><th>Last modified</th><th>Size</th></tr>\n");
        if !path.is_root() {
            let parent = path.parent().with_prefix().as_url_string();
            w.push_str(&format!(
                "<tr><td><a href=\"{}\">Parent Directory</a></td><td></td><td></td></tr>\n",
                encode_minimal(&parent)
            ));
        }
        for e in &entries {
            let (name, size) = if e.is_dir {
                (format!("{}/", e.name), "-".to_string())
            } else {
                (e.name.clone(), e.size.to_string())
            };
            w.push_str(&format!(
                "<tr><td><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td></tr>\n",
                encode_minimal(&e.href),
                encode_minimal(&name),
                e.modified,
                size
            ));
        }
        w.push_str("</table>\n</body></html>\n");

        let mut res = Response::new(Body::empty());
        let h = res.headers_mut();
        h.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        h.typed_insert(headers::ContentLength(w.len() as u64));
        if !head {
            *res.body_mut() = Body::from(w);
        }
        Ok(res)
    }
}
