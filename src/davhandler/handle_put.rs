use std::error::Error as StdError;
use std::io;

use bytes::Buf;
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use http_body::Body as HttpBody;

use crate::body::Body;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::*;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_put<ReqBody, ReqData, ReqError>(
        &self,
        _req: &Request<()>,
        path: &DavPath,
        body: ReqBody,
    ) -> DavResult<Response<Body>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let existed = match self.fs.metadata(path).await {
            Ok(meta) if meta.is_dir() => {
                let allow = self.allowed_methods(path, Some(&*meta));
                return Err(DavError::MethodNotAllowed(allow.allow_header()));
            }
            Ok(_) => true,
            Err(FsError::NotFound) => false,
            Err(e) => return Err(e.into()),
        };
        if path.is_collection() {
            return Err(DavError::MethodNotAllowed(
                self.allowed_methods(path, None).allow_header(),
            ));
        }

        // nothing gets created if the parent collection is missing.
        if !existed && !self.has_parent(path).await {
            debug!("PUT {}: no parent collection", path);
            return Err(FsError::Conflict.into());
        }

        let mut file = match self.fs.open(path, OpenOptions::write()).await {
            Ok(f) => f,
            Err(FsError::NotFound) | Err(FsError::Conflict) => return Err(FsError::Conflict.into()),
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = copy_body(&mut file, body).await {
            drop(file);
            if !existed {
                // don't leave a half-written new resource behind.
                if let Err(rm) = self.fs.remove_file(path).await {
                    warn!("PUT {}: removing partial resource: {:?}", path, rm);
                }
            }
            return Err(e);
        }

        let mut res = Response::new(Body::empty());
        res.headers_mut().typed_insert(headers::ContentLength(0));
        *res.status_mut() = if existed {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::CREATED
        };
        Ok(res)
    }
}

// Write the whole request body into `file`.
async fn copy_body<ReqBody, ReqData, ReqError>(file: &mut Box<dyn DavFile>, body: ReqBody) -> DavResult<()>
where
    ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
    ReqData: Buf + Send + 'static,
    ReqError: StdError + Send + Sync + 'static,
{
    pin_utils::pin_mut!(body);
    while let Some(data) = body.data().await {
        let mut buf = data.map_err(|e| {
            DavError::IoError(io::Error::new(io::ErrorKind::UnexpectedEof, e.to_string()))
        })?;
        while buf.has_remaining() {
            let chunk = buf.copy_to_bytes(buf.remaining());
            file.write_bytes(chunk).await?;
        }
    }
    file.flush().await?;
    Ok(())
}
