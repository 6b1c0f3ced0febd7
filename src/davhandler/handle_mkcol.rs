use headers::HeaderMapExt;
use http::{Response, StatusCode};

use crate::body::Body;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::*;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_mkcol(&self, path: &DavPath) -> DavResult<Response<Body>> {
        if let Ok(meta) = self.fs.metadata(path).await {
            let allow = self.allowed_methods(path, Some(&*meta));
            return Err(DavError::MethodNotAllowed(allow.allow_header()));
        }
        if !self.has_parent(path).await {
            return Err(FsError::Conflict.into());
        }
        match self.fs.create_dir(path).await {
            Ok(()) => {}
            Err(FsError::Exists) => {
                let meta = self.fs.metadata(path).await.ok();
                let allow = self.allowed_methods(path, meta.as_deref());
                return Err(DavError::MethodNotAllowed(allow.allow_header()));
            }
            Err(FsError::NotFound) => return Err(FsError::Conflict.into()),
            Err(e) => return Err(e.into()),
        }

        let mut res = Response::new(Body::empty());
        res.headers_mut().typed_insert(headers::ContentLength(0));
        *res.status_mut() = StatusCode::CREATED;
        Ok(res)
    }
}
