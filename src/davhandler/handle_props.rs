use std::io::Write;

use futures_util::{future::BoxFuture, FutureExt, StreamExt};
use headers::HeaderMapExt;
use http::{header, HeaderValue, Request, Response, StatusCode};
use xml::common::XmlVersion;
use xml::writer::{EmitterConfig, EventWriter, XmlEvent as XmlWEvent};
use xmltree::Element;

use crate::body::Body;
use crate::davheaders::Depth;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::*;
use crate::util::{systemtime_to_httpdate, systemtime_to_rfc3339, MemBuffer};
use crate::xmltree_ext::{ElementExt, DAV_NS};
use crate::DavResult;

// Live properties, in the order allprop/propname report them.
const LIVE_PROPS: [&str; 7] = [
    "resourcetype",
    "displayname",
    "getcontentlength",
    "getcontenttype",
    "getlastmodified",
    "creationdate",
    "getetag",
];

/// What a PROPFIND body asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PropRequest {
    AllProp,
    PropName,
    /// Qualified names: (namespace, local name).
    Prop(Vec<(Option<String>, String)>),
}

/// Parse a PROPFIND request body. An empty body means allprop.
pub(crate) fn parse_propfind(body: &[u8]) -> DavResult<PropRequest> {
    if body.iter().all(|c| c.is_ascii_whitespace()) {
        return Ok(PropRequest::AllProp);
    }
    let root = Element::parse2(body)?;
    if !root.is_dav("propfind") {
        return Err(DavError::XmlParseError);
    }
    let mut shapes = root.child_elems_iter().filter(|e| e.namespace.as_deref() == Some(DAV_NS));
    let request = match shapes.next() {
        None => PropRequest::AllProp,
        Some(e) if e.name == "allprop" => PropRequest::AllProp,
        Some(e) if e.name == "propname" => PropRequest::PropName,
        Some(e) if e.name == "prop" => PropRequest::Prop(
            e.child_elems_iter()
                .map(|p| (p.namespace.clone(), p.name.clone()))
                .collect(),
        ),
        Some(_) => return Err(DavError::XmlParseError),
    };
    // the three shapes exclude each other.
    if shapes.any(|e| matches!(e.name.as_str(), "allprop" | "propname" | "prop")) {
        return Err(DavError::XmlParseError);
    }
    Ok(request)
}

struct PropWriter {
    emitter: EventWriter<MemBuffer>,
    request: PropRequest,
}

impl PropWriter {
    fn new(request: PropRequest) -> DavResult<PropWriter> {
        let mut emitter = EmitterConfig::new()
            .perform_indent(false)
            .create_writer(MemBuffer::new());
        emitter.write(XmlWEvent::StartDocument {
            version: XmlVersion::Version10,
            encoding: Some("utf-8"),
            standalone: None,
        })?;
        emitter.write(XmlWEvent::start_element("D:multistatus").ns("D", DAV_NS))?;
        Ok(PropWriter { emitter, request })
    }

    fn text_elem(&mut self, name: &str, text: &str) -> DavResult<()> {
        self.emitter.write(XmlWEvent::start_element(name))?;
        if !text.is_empty() {
            self.emitter.write(XmlWEvent::characters(text))?;
        }
        self.emitter.write(XmlWEvent::end_element())?;
        Ok(())
    }

    fn empty_elem(&mut self, name: &str) -> DavResult<()> {
        self.emitter.write(XmlWEvent::start_element(name))?;
        self.emitter.write(XmlWEvent::end_element())?;
        Ok(())
    }

    // Write one live property. Returns false if the resource does not have it.
    fn write_live_prop(&mut self, name: &str, path: &DavPath, meta: &dyn DavMetaData) -> DavResult<bool> {
        let qname = format!("D:{name}");
        if self.request == PropRequest::PropName {
            self.empty_elem(&qname)?;
            return Ok(true);
        }
        let value = match name {
            "resourcetype" => {
                if meta.is_dir() {
                    self.emitter.write(XmlWEvent::start_element("D:resourcetype"))?;
                    self.empty_elem("D:collection")?;
                    self.emitter.write(XmlWEvent::end_element())?;
                } else {
                    self.empty_elem("D:resourcetype")?;
                }
                return Ok(true);
            }
            "displayname" => Some(path.file_name()),
            "getcontentlength" if meta.is_file() => Some(meta.len().to_string()),
            "getcontenttype" if meta.is_file() => Some(path.get_mime_type_str().to_string()),
            "getlastmodified" => meta.modified().ok().map(systemtime_to_httpdate),
            "creationdate" => meta.created().ok().map(systemtime_to_rfc3339),
            "getetag" => meta.etag().map(|t| format!("\"{t}\"")),
            _ => None,
        };
        match value {
            Some(v) => {
                self.text_elem(&qname, &v)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn write_response(&mut self, path: &DavPath, meta: &dyn DavMetaData) -> DavResult<()> {
        self.emitter.write(XmlWEvent::start_element("D:response"))?;
        let href = path.with_prefix().as_url_string();
        self.text_elem("D:href", &href)?;

        self.emitter.write(XmlWEvent::start_element("D:propstat"))?;
        self.emitter.write(XmlWEvent::start_element("D:prop"))?;
        let names: Vec<String> = match &self.request {
            PropRequest::AllProp | PropRequest::PropName => {
                LIVE_PROPS.iter().map(|s| s.to_string()).collect()
            }
            // only found live properties are reported.
            PropRequest::Prop(props) => props
                .iter()
                .filter(|(ns, name)| {
                    ns.as_deref() == Some(DAV_NS) && LIVE_PROPS.contains(&name.as_str())
                })
                .map(|(_, name)| name.clone())
                .collect(),
        };
        for name in &names {
            if !self.write_live_prop(name, path, meta)? {
                trace!("{}: no {} property", path, name);
            }
        }
        self.emitter.write(XmlWEvent::end_element())?; // prop
        self.text_elem("D:status", "HTTP/1.1 200 OK")?;
        self.emitter.write(XmlWEvent::end_element())?; // propstat
        self.emitter.write(XmlWEvent::end_element())?; // response
        Ok(())
    }

    fn finish(mut self) -> DavResult<bytes::Bytes> {
        self.emitter.write(XmlWEvent::end_element())?; // multistatus
        let mut buf = self.emitter.into_inner();
        buf.write_all(b"\n")?;
        Ok(buf.take())
    }
}

impl crate::DavHandler {
    // list the members of a collection, all the way down if `recurse`.
    fn collect_members<'a>(
        &'a self,
        path: &'a DavPath,
        recurse: bool,
        out: &'a mut Vec<(DavPath, Box<dyn DavMetaData>)>,
    ) -> BoxFuture<'a, DavResult<()>> {
        async move {
            let mut entries = self.fs.read_dir(path).await?;
            let mut subdirs = Vec::new();
            while let Some(entry) = entries.next().await {
                let meta = match entry.metadata().await {
                    Ok(meta) => meta,
                    Err(e) => {
                        trace!("propfind: skipping entry: {:?}", e);
                        continue;
                    }
                };
                let mut p = path.clone();
                p.push_segment(&entry.name());
                if meta.is_dir() {
                    p.add_slash();
                    if recurse {
                        subdirs.push(p.clone());
                    }
                }
                out.push((p, meta));
            }
            for dir in &subdirs {
                self.collect_members(dir, recurse, out).await?;
            }
            Ok(())
        }
        .boxed()
    }

    pub(crate) async fn handle_propfind(
        &self,
        req: &Request<()>,
        path: &DavPath,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        // absent or unrecognized Depth means infinity.
        let depth = req.headers().typed_get::<Depth>().unwrap_or(Depth::Infinity);
        let request = parse_propfind(body)?;
        debug!("propfind {} depth {:?} {:?}", path, depth, request);

        let meta = self.fs.metadata(path).await?;
        let mut path = path.clone();
        if meta.is_dir() {
            path.add_slash();
        }

        let is_dir = meta.is_dir();
        let mut resources = vec![(path.clone(), meta)];
        if is_dir && depth != Depth::Zero {
            self.collect_members(&path, depth == Depth::Infinity, &mut resources)
                .await?;
        }

        let mut pw = PropWriter::new(request)?;
        for (p, meta) in &resources {
            pw.write_response(p, &**meta)?;
        }
        let xml = pw.finish()?;

        let mut res = Response::new(Body::from(xml));
        *res.status_mut() = StatusCode::MULTI_STATUS;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/xml; charset=utf-8"),
        );
        Ok(res)
    }
}
