use std::error::Error;
use std::io::{self, ErrorKind};

use http::StatusCode;
use xml::reader::Error as XmlReaderError;
use xmltree::ParseError as XmlTreeParseError;

use crate::auth::AuthenticateChallenge;
use crate::fs::FsError;

pub(crate) type DavResult<T> = Result<T, DavError>;

/// Every way a request can end other than a plain `Ok(Response)`.
///
/// Handlers never build error responses themselves; they return one of
/// these and `DavHandler::handle_inner` turns it into a response.
#[derive(Debug)]
pub(crate) enum DavError {
    XmlReadError,  // error reading/parsing xml
    XmlParseError, // error interpreting xml
    InvalidPath,   // error parsing path
    IllegalPath,   // path not valid here
    ForbiddenPath, // too many dotdots
    UnknownDavMethod,
    MalformedCredentials(String),
    MalformedHeader(&'static str),
    Redirect { location: String, permanent: bool },
    Unauthorized(AuthenticateChallenge),
    Forbidden,
    MethodNotAllowed(String),
    Fatal(String),
    IoError(io::Error),
    FsError(FsError),
    Status(StatusCode),
}

impl Error for DavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DavError::FsError(e) => Some(e),
            DavError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for DavError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DavError::XmlReadError => write!(f, "XML parse error"),
            DavError::XmlParseError => write!(f, "XML parse error"),
            DavError::MalformedCredentials(m) => write!(f, "malformed credentials: {m}"),
            DavError::MalformedHeader(h) => write!(f, "malformed {h} header"),
            DavError::Redirect { location, .. } => write!(f, "redirect to {location}"),
            DavError::Unauthorized(c) => write!(f, "unauthorized (realm {})", c.realm),
            DavError::MethodNotAllowed(_) => write!(f, "method not allowed"),
            DavError::Fatal(m) => write!(f, "fatal: {m}"),
            DavError::IoError(_) => write!(f, "I/O error"),
            DavError::FsError(_) => write!(f, "Filesystem error"),
            DavError::Status(s) => write!(f, "{s}"),
            _ => write!(f, "{self:?}"),
        }
    }
}

impl From<FsError> for DavError {
    fn from(e: FsError) -> Self {
        DavError::FsError(e)
    }
}

fn ioerror_to_status(ioerror: &io::Error) -> StatusCode {
    match ioerror.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn fserror_to_status(e: &FsError) -> StatusCode {
    match e {
        FsError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        FsError::GeneralFailure => StatusCode::INTERNAL_SERVER_ERROR,
        FsError::Exists => StatusCode::METHOD_NOT_ALLOWED,
        FsError::NotFound => StatusCode::NOT_FOUND,
        FsError::Forbidden => StatusCode::FORBIDDEN,
        FsError::Conflict => StatusCode::CONFLICT,
    }
}

impl From<io::Error> for DavError {
    fn from(e: io::Error) -> Self {
        DavError::IoError(e)
    }
}

impl From<StatusCode> for DavError {
    fn from(e: StatusCode) -> Self {
        DavError::Status(e)
    }
}

impl From<XmlReaderError> for DavError {
    fn from(_e: XmlReaderError) -> Self {
        DavError::XmlReadError
    }
}

impl From<XmlTreeParseError> for DavError {
    fn from(e: XmlTreeParseError) -> Self {
        match e {
            XmlTreeParseError::MalformedXml(_) => DavError::XmlReadError,
            _ => DavError::XmlParseError,
        }
    }
}

impl From<xml::writer::Error> for DavError {
    fn from(e: xml::writer::Error) -> Self {
        match e {
            xml::writer::Error::Io(e) => DavError::IoError(e),
            _ => DavError::Status(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl DavError {
    pub(crate) fn statuscode(&self) -> StatusCode {
        match self {
            DavError::XmlReadError => StatusCode::BAD_REQUEST,
            DavError::XmlParseError => StatusCode::BAD_REQUEST,
            DavError::InvalidPath => StatusCode::BAD_REQUEST,
            DavError::IllegalPath => StatusCode::BAD_GATEWAY,
            DavError::ForbiddenPath => StatusCode::FORBIDDEN,
            DavError::UnknownDavMethod => StatusCode::NOT_IMPLEMENTED,
            DavError::MalformedCredentials(_) => StatusCode::BAD_REQUEST,
            DavError::MalformedHeader(_) => StatusCode::BAD_REQUEST,
            DavError::Redirect { permanent: true, .. } => StatusCode::MOVED_PERMANENTLY,
            DavError::Redirect { permanent: false, .. } => StatusCode::FOUND,
            DavError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            DavError::Forbidden => StatusCode::FORBIDDEN,
            DavError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            DavError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DavError::IoError(e) => ioerror_to_status(e),
            DavError::FsError(e) => fserror_to_status(e),
            DavError::Status(e) => *e,
        }
    }

    pub(crate) fn must_close(&self) -> bool {
        !matches!(
            self,
            &DavError::Status(_)
                | &DavError::FsError(FsError::NotFound)
                | &DavError::FsError(FsError::Forbidden)
                | &DavError::FsError(FsError::Exists)
                | &DavError::FsError(FsError::Conflict)
                | &DavError::Redirect { .. }
                | &DavError::Unauthorized(_)
                | &DavError::Forbidden
                | &DavError::MethodNotAllowed(_)
                | &DavError::MalformedHeader(_)
                | &DavError::MalformedCredentials(_)
        )
    }
}
