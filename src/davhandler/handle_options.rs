use headers::HeaderMapExt;
use http::{header, HeaderValue, Request, Response};

use crate::body::Body;
use crate::davpath::DavPath;
use crate::fs::DavMetaData;
use crate::util::DavMethod;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_options(&self, _req: &Request<()>, path: &DavPath) -> DavResult<Response<Body>> {
        let mut res = Response::new(Body::empty());

        let meta = if path.is_star() {
            None
        } else {
            self.fs.metadata(path).await.ok()
        };
        let allow = if path.is_star() {
            self.allow
        } else {
            self.allowed_methods(path, meta.as_deref())
        };

        let h = res.headers_mut();
        h.insert("DAV", HeaderValue::from_static("1,2"));
        h.insert("MS-Author-Via", HeaderValue::from_static("DAV"));
        h.typed_insert(headers::ContentLength(0));
        if let Ok(a) = HeaderValue::from_str(&allow.allow_header()) {
            h.insert(header::ALLOW, a);
        }

        Ok(res)
    }

    /// Methods that make sense on this resource, restricted to the configured set.
    pub(crate) fn allowed_methods(&self, path: &DavPath, meta: Option<&dyn DavMetaData>) -> DavMethod {
        let mut m = DavMethod::OPTIONS;
        match meta {
            None => m |= DavMethod::PUT | DavMethod::MKCOL,
            Some(meta) => {
                m |= DavMethod::PROPFIND;
                if meta.is_file() {
                    m |= DavMethod::HEAD | DavMethod::GET | DavMethod::POST | DavMethod::PUT;
                } else if self.autoindex {
                    m |= DavMethod::HEAD | DavMethod::GET | DavMethod::POST;
                }
                if !path.is_root() {
                    m |= DavMethod::DELETE;
                }
            }
        }
        if self.read_only {
            m.remove(DavMethod::WRITE);
        }
        m & self.allow
    }
}
