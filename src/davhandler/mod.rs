//
// This module contains the main entry point of the library,
// DavHandler.
//
use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::{self, buf::Buf};
use futures_util::stream::Stream;
use headers::HeaderMapExt;
use http::{header, Request, Response, StatusCode};
use http_body::Body as HttpBody;

use crate::auth::gate::AuthorizationGate;
use crate::auth::nonce::NONCE_EXPIRY;
use crate::auth::{AuthPolicy, DigestAuthenticator, MemPrincipalStore, NonceStore, PrincipalStore, RealmPolicy};
use crate::body::{Body, StreamBody};
use crate::canonical::{canonicalize, is_redirect_supported};
use crate::davheaders;
use crate::davpath::DavPath;
use crate::util::{dav_method, DavMethod, DavMethodSet};

use crate::errors::DavError;
use crate::fs::*;
use crate::DavResult;

mod handle_delete;
mod handle_gethead;
mod handle_mkcol;
mod handle_options;
mod handle_props;
mod handle_put;

use handle_gethead::READ_BUF_SIZE;

// Largest request body read into memory (PROPFIND). PUT bodies are streamed.
const MAX_XML_BODY: usize = 65536;

/// Configuration of the handler.
#[derive(Clone)]
pub struct DavBuilder {
    /// Prefix to be stripped off when handling request.
    prefix: String,
    /// Filesystem backend.
    fs: FileSystem,
    /// Set of allowed methods (Defaults to "all methods")
    allow: DavMethodSet,
    /// Where principals and their passwords come from.
    principals: Option<Arc<dyn PrincipalStore>>,
    /// Realms and authorization.
    policy: Option<Arc<dyn AuthPolicy>>,
    /// How long an issued nonce stays fresh.
    nonce_expiry: Duration,
    /// Key that nonces are minted with. Random if not set.
    nonce_secret: Option<String>,
    /// Refuse PUT/DELETE/MKCOL with 501.
    read_only: bool,
    /// Compress GET responses if the client asks for it.
    compression: bool,
    /// Does GET on a directory return indexes.
    autoindex: bool,
    /// read buffer size in bytes
    read_buf_size: usize,
    /// 301 (true) or 302 (false) when adding a slash to a collection URL.
    redirect_permanent: bool,
}

/// File system backend.
#[derive(Clone)]
pub enum FileSystem {
    #[cfg(any(docsrs, feature = "memfs"))]
    Mem,
    #[cfg(any(docsrs, feature = "localfs"))]
    Local {
        /// Path to the root directory.
        base: PathBuf,
        public: bool,
    },
    #[cfg(any(docsrs, feature = "localfs"))]
    LocalFile { file: PathBuf, public: bool },
    /// Any other storage backend.
    Custom(Arc<dyn DavFileSystem>),
}

impl FileSystem {
    /// Serve a local directory
    #[cfg(any(docsrs, feature = "localfs"))]
    pub fn local(path: impl Into<PathBuf>, public: bool) -> Self {
        FileSystem::Local {
            base: path.into(),
            public,
        }
    }

    /// Serve a local file
    #[cfg(any(docsrs, feature = "localfs"))]
    pub fn local_file(file: impl Into<PathBuf>, public: bool) -> Self {
        FileSystem::LocalFile {
            file: file.into(),
            public,
        }
    }

    fn build(self) -> Arc<dyn DavFileSystem> {
        match self {
            #[cfg(any(docsrs, feature = "memfs"))]
            FileSystem::Mem => crate::fs::memfs::MemFs::new(),
            #[cfg(any(docsrs, feature = "localfs"))]
            FileSystem::Local { base, public } => crate::fs::localfs::LocalFs::new(base, public),
            #[cfg(any(docsrs, feature = "localfs"))]
            FileSystem::LocalFile { file, public } => crate::fs::localfs::LocalFs::new_file(file, public),
            FileSystem::Custom(fs) => fs,
        }
    }
}

impl DavBuilder {
    /// Create a new configuration builder.
    pub fn new(fs: FileSystem) -> DavBuilder {
        Self {
            prefix: String::new(),
            fs,
            allow: DavMethodSet::WEBDAV_RW,
            principals: None,
            policy: None,
            nonce_expiry: NONCE_EXPIRY,
            nonce_secret: None,
            read_only: false,
            compression: true,
            autoindex: false,
            read_buf_size: READ_BUF_SIZE,
            redirect_permanent: true,
        }
    }

    /// Use the configuration that was built to generate a DavHandler.
    pub fn build(self) -> DavHandler {
        self.into()
    }

    /// Prefix to be stripped off before translating the rest of
    /// the request path to a filesystem path.
    pub fn strip_prefix(self, prefix: impl Into<String>) -> Self {
        let mut this = self;
        this.prefix = prefix.into();
        this
    }

    /// Which methods to allow (default is all methods).
    pub fn methods(self, allow: DavMethodSet) -> Self {
        let mut this = self;
        this.allow = allow;
        this
    }

    /// Set the principal store used to check Digest credentials.
    pub fn principals(self, principals: impl PrincipalStore + 'static) -> Self {
        let mut this = self;
        this.principals = Some(Arc::new(principals));
        this
    }

    /// Set the realm / authorization policy. The default puts nothing in a realm.
    pub fn policy(self, policy: impl AuthPolicy + 'static) -> Self {
        let mut this = self;
        this.policy = Some(Arc::new(policy));
        this
    }

    /// How long a nonce is accepted before clients are asked to
    /// retry with a fresh one (default 60 seconds).
    pub fn nonce_expiry(self, expiry: Duration) -> Self {
        let mut this = self;
        this.nonce_expiry = expiry;
        this
    }

    /// Private key for minting nonces. Nonces issued under another key are
    /// rejected, so with a random key (the default) a restart invalidates
    /// all outstanding nonces.
    pub fn nonce_secret(self, secret: impl Into<String>) -> Self {
        let mut this = self;
        this.nonce_secret = Some(secret.into());
        this
    }

    /// Answer state-changing requests with 501 Not Implemented.
    pub fn read_only(self, read_only: bool) -> Self {
        let mut this = self;
        this.read_only = read_only;
        this
    }

    /// Compress GET bodies with gzip/deflate when negotiated (default true).
    pub fn compression(self, compression: bool) -> Self {
        let mut this = self;
        this.compression = compression;
        this
    }

    /// Does a GET on a directory produce a directory index.
    pub fn autoindex(self, autoindex: bool) -> Self {
        let mut this = self;
        this.autoindex = autoindex;
        this
    }

    /// Read buffer size in bytes
    pub fn read_buf_size(self, size: usize) -> Self {
        let mut this = self;
        this.read_buf_size = size;
        this
    }

    /// Redirect to the slash-terminated URL of a collection with
    /// 301 Moved Permanently (`true`, the default) or 302 Found.
    pub fn redirect(self, permanent: bool) -> Self {
        let mut this = self;
        this.redirect_permanent = permanent;
        this
    }
}

/// The webdav handler struct.
///
/// The `new` and `build` etc methods are used to instantiate a handler.
///
/// The `handle` and `handle_with` methods are the methods that do the actual work.
#[derive(Clone)]
pub struct DavHandler {
    pub(crate) prefix: Arc<String>,
    pub(crate) fs: Arc<dyn DavFileSystem>,
    pub(crate) allow: DavMethodSet,
    pub(crate) gate: AuthorizationGate,
    pub(crate) read_only: bool,
    pub(crate) compression: bool,
    pub(crate) autoindex: bool,
    pub(crate) read_buf_size: usize,
    pub(crate) redirect_permanent: bool,
    // mount point, fixed by the first request.
    mount: Arc<OnceLock<String>>,
}

impl From<DavBuilder> for DavHandler {
    fn from(cfg: DavBuilder) -> Self {
        let nonces = match cfg.nonce_secret {
            Some(secret) => NonceStore::new(secret, cfg.nonce_expiry),
            None => NonceStore::random(cfg.nonce_expiry),
        };
        let principals = cfg
            .principals
            .unwrap_or_else(|| Arc::new(MemPrincipalStore::new()));
        let policy = cfg.policy.unwrap_or_else(|| Arc::new(RealmPolicy::new()));
        Self {
            prefix: Arc::new(cfg.prefix),
            fs: cfg.fs.build(),
            allow: cfg.allow,
            gate: AuthorizationGate {
                authenticator: DigestAuthenticator::new(Arc::new(nonces), principals),
                policy,
            },
            read_only: cfg.read_only,
            compression: cfg.compression,
            autoindex: cfg.autoindex,
            read_buf_size: cfg.read_buf_size,
            redirect_permanent: cfg.redirect_permanent,
            mount: Arc::new(OnceLock::new()),
        }
    }
}

impl DavHandler {
    /// Return a configuration builder.
    pub fn builder(fs: FileSystem) -> DavBuilder {
        DavBuilder::new(fs)
    }

    /// Handle a webdav request.
    pub async fn handle<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
    {
        self.handle_inner(req).await
    }

    /// Handle a webdav request, with an extra prefix appended to the
    /// configured one.
    ///
    /// The combined prefix is the mount point of the handler: it must be
    /// the same on every request, a different one is a configuration error.
    pub async fn handle_with<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
        prefix: Option<String>,
    ) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
    {
        self.with_prefix(prefix).handle_inner(req).await
    }

    /// Handles a request with a `Stream` body instead of a `HttpBody`.
    /// Used with webserver frameworks that have not
    /// opted to use the `http_body` crate just yet.
    #[doc(hidden)]
    pub async fn handle_stream<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
    ) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: Stream<Item = Result<ReqData, ReqError>>,
    {
        let req = {
            let (parts, body) = req.into_parts();
            Request::from_parts(parts, StreamBody::new(body))
        };
        self.handle_inner(req).await
    }

    /// Handles a request with a `Stream` body instead of a `HttpBody`.
    #[doc(hidden)]
    pub async fn handle_stream_with<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
        prefix: Option<String>,
    ) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: Stream<Item = Result<ReqData, ReqError>>,
    {
        let req = {
            let (parts, body) = req.into_parts();
            Request::from_parts(parts, StreamBody::new(body))
        };
        self.with_prefix(prefix).handle_inner(req).await
    }

    fn with_prefix(&self, prefix: Option<String>) -> DavHandler {
        let mut this = self.clone();
        if let Some(prefix) = prefix {
            this.prefix = Arc::new(format!(
                "{}/{}",
                this.prefix.strip_suffix('/').unwrap_or(&this.prefix),
                prefix.strip_prefix('/').unwrap_or(&prefix)
            ));
        }
        this
    }
}

impl DavHandler {
    // helper.
    pub(crate) async fn has_parent<'a>(&'a self, path: &'a DavPath) -> bool {
        let p = path.parent();
        self.fs
            .metadata(&p)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    // The mount point is whatever prefix the first request came in
    // with. It cannot change afterwards.
    fn check_mount(&self) -> DavResult<()> {
        let mount = self.mount.get_or_init(|| {
            debug!("mount point is {:?}", self.prefix);
            self.prefix.to_string()
        });
        if mount.as_str() != self.prefix.as_str() {
            return Err(DavError::Fatal(format!(
                "mount point changed from {:?} to {:?}",
                mount, self.prefix
            )));
        }
        Ok(())
    }

    // drain request body and return length.
    pub(crate) async fn read_request<ReqBody, ReqData, ReqError>(
        &self,
        body: ReqBody,
        max_size: usize,
    ) -> DavResult<Vec<u8>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let mut data = Vec::new();
        pin_utils::pin_mut!(body);
        while let Some(res) = body.data().await {
            let mut buf = res.map_err(|_| {
                DavError::IoError(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "UnexpectedEof",
                ))
            })?;
            while buf.has_remaining() {
                if data.len() + buf.remaining() > max_size {
                    return Err(StatusCode::PAYLOAD_TOO_LARGE.into());
                }
                let b = buf.chunk();
                let l = b.len();
                data.extend_from_slice(b);
                buf.advance(l);
            }
        }
        Ok(data)
    }

    // internal dispatcher.
    async fn handle_inner<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
    ) -> Response<Body>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let method = req.method().clone();
        let uri = req.uri().clone();

        // Turn any DavError results into a HTTP error response.
        match self.handle2(req).await {
            Ok(resp) => {
                debug!("== END REQUEST result OK");
                resp
            }
            Err(err) => {
                let status = err.statuscode();
                if status.is_server_error() {
                    error!("{} {}: {}", method, uri, err);
                } else {
                    debug!("== END REQUEST {} {} result {:?}", method, uri, err);
                }
                error_response(&err)
            }
        }
    }

    // internal dispatcher part 2.
    async fn handle2<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
    ) -> DavResult<Response<Body>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let (req, body) = {
            let (parts, body) = req.into_parts();
            (Request::from_parts(parts, ()), body)
        };

        // translate HTTP method to Webdav method.
        let method = match dav_method(req.method()) {
            Ok(m) => m,
            Err(e) => {
                debug!("refusing method {} request {}", req.method(), req.uri());
                return Err(e);
            }
        };

        // see if method is allowed.
        if !self.allow.contains(method) {
            debug!(
                "method {} not allowed on request {}",
                req.method(),
                req.uri()
            );
            return Err(DavError::MethodNotAllowed(self.allow.allow_header()));
        }

        self.check_mount()?;

        // make sure the request path is valid.
        let path = DavPath::from_uri_and_prefix(req.uri(), &self.prefix)?;

        // capability discovery needs no credentials.
        if method == DavMethod::OPTIONS {
            debug!("== START REQUEST {:?} {}", method, path);
            return self.handle_options(&req, &path).await;
        }

        let principal = self.gate.check(&req, &path, method)?;
        debug!(
            "== START REQUEST {:?} {} as {}",
            method,
            path,
            principal.as_ref().map(|p| p.name()).unwrap_or("anonymous")
        );

        let canonical = canonicalize(&*self.fs, &path, method, None).await;
        let mut content_location = None;
        if canonical.changed && DavMethod::WEBDAV_RO.contains(method) {
            let ua = req
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok());
            let mut location = canonical.path.with_prefix().as_url_string();
            if is_redirect_supported(ua) {
                if let Some(query) = req.uri().query() {
                    location.push('?');
                    location.push_str(query);
                }
                return Err(DavError::Redirect {
                    location,
                    permanent: self.redirect_permanent,
                });
            }
            debug!("not redirecting {:?} to {}", ua, location);
            content_location = Some(location);
        }
        let path = canonical.path;

        if self.read_only && DavMethod::WRITE.contains(method) {
            return Err(FsError::NotImplemented.into());
        }

        // PUT is the only handler that reads the body itself. All the
        // other handlers either expected no body, or a pre-read Vec<u8>.
        if method == DavMethod::PUT {
            return self.handle_put(&req, &path, body).await;
        }
        let body_data = self.read_request(body, MAX_XML_BODY).await?;
        if !body_data.is_empty() && !DavMethod::WEBDAV_BODY.contains(method) {
            return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE.into());
        }

        let mut resp = if method == DavMethod::PROPFIND {
            self.handle_propfind(&req, &path, &body_data).await?
        } else if method == DavMethod::MKCOL {
            self.handle_mkcol(&path).await?
        } else if method == DavMethod::DELETE {
            self.handle_delete(&path).await?
        } else {
            self.handle_get(&req, &path, method).await?
        };
        if let Some(location) = content_location {
            resp.headers_mut()
                .typed_insert(davheaders::ContentLocation(location));
        }
        Ok(resp)
    }
}

// Render an error as a response. Some errors carry a header.
fn error_response(err: &DavError) -> Response<Body> {
    let mut resp = Response::builder();
    match err {
        DavError::Redirect { location, .. } => {
            resp = resp.header(header::LOCATION, location.as_str());
        }
        DavError::Unauthorized(challenge) => {
            resp = resp.header(header::WWW_AUTHENTICATE, challenge.header_value());
        }
        DavError::MethodNotAllowed(allow) => {
            resp = resp.header(header::ALLOW, allow.as_str());
        }
        _ => {}
    }
    resp = resp.header("Content-Length", "0").status(err.statuscode());
    if err.must_close() {
        resp = resp.header("connection", "close");
    }
    resp.body(Body::empty()).unwrap_or_else(|e| {
        error!("cannot build error response for {}: {}", err, e);
        let mut resp = Response::new(Body::empty());
        *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        resp
    })
}
