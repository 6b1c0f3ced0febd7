//! ## HTTP/WebDAV request core with Digest authentication
//!
//! A `handler` is a piece of code that takes a `http::Request`, processes it in some
//! way, and then generates a `http::Response`. This library is a `handler` that serves
//! a storage backend over HTTP (GET/HEAD/POST/PUT/DELETE/OPTIONS) and the
//! WebDAV collection and property methods (MKCOL, PROPFIND).
//!
//! Every request goes through the same pipeline:
//!
//! 1. **Authenticate**: `Authorization: Digest` credentials (RFC 2617, MD5)
//!    are checked against a [`PrincipalStore`] and a server-side
//!    [nonce store][auth::NonceStore]. Expired nonces are answered with
//!    `stale=true` so clients can retry without prompting the user.
//! 2. **Authorize**: an [`AuthPolicy`] decides which realm a resource is in
//!    and whether the principal may use the method on it. Refusals are a
//!    `401` with a fresh challenge inside a realm, and a `403` outside of one.
//! 3. **Canonicalize**: `/docs` becomes `/docs/` when it names a collection.
//!    Clients get a redirect, except for a list of clients known to
//!    mishandle redirects.
//! 4. **Conditional check**: `If-Modified-Since` can short-circuit a GET
//!    with `304 Not Modified`.
//! 5. **Dispatch** to the method handler.
//!
//! OPTIONS skips authentication and authorization, so capabilities can be
//! discovered without credentials.
//!
//! Errors are values, not panics: each stage returns a typed error that is
//! turned into a response in exactly one place.
//!
//! ## Backends.
//!
//! Included are two filesystems:
//!
//! - [`LocalFs`](fs::localfs::LocalFs): serves a directory on the local filesystem
//! - [`MemFs`](fs::memfs::MemFs): ephemeral in-memory filesystem.
//!
//! Other backends implement [`DavFileSystem`](fs::DavFileSystem) and are
//! passed in as [`FileSystem::Custom`].
//!
//! ## Example.
//!
//! Example server using [hyper] that serves the /tmp directory, with
//! everything under `/private` protected by Digest authentication.
//!
//! ```no_run
//! use std::convert::Infallible;
//! use dav_gate::{DavHandler, FileSystem, MemPrincipalStore, RealmPolicy};
//!
//! #[tokio::main]
//! async fn main() {
//!     let dir = "/tmp";
//!     let addr = ([127, 0, 0, 1], 4918).into();
//!
//!     let dav_server = DavHandler::builder(FileSystem::local(dir, false))
//!         .principals(MemPrincipalStore::new().user("mufasa", "Circle Of Life"))
//!         .policy(RealmPolicy::new().protect("/private", "Pride Rock"))
//!         .autoindex(true)
//!         .build();
//!
//!     let make_service = hyper::service::make_service_fn(move |_| {
//!         let dav_server = dav_server.clone();
//!         async move {
//!             let func = move |req| {
//!                 let dav_server = dav_server.clone();
//!                 async move {
//!                     Ok::<_, Infallible>(dav_server.handle(req).await)
//!                 }
//!             };
//!             Ok::<_, Infallible>(hyper::service::service_fn(func))
//!         }
//!     });
//!
//!     println!("Serving {} on {}", dir, addr);
//!     let _ = hyper::Server::bind(&addr)
//!         .serve(make_service)
//!         .await
//!         .map_err(|e| eprintln!("server error: {}", e));
//! }
//! ```
//!
//! [hyper]: https://hyper.rs/

#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

mod canonical;
mod compress;
mod conditional;
mod davhandler;
mod davheaders;
mod errors;
mod util;
mod xmltree_ext;

pub mod auth;
pub mod body;
pub mod davpath;
pub mod fs;

#[cfg(any(docsrs, feature = "warp-compat"))]
#[cfg_attr(docsrs, doc(cfg(feature = "warp-compat")))]
pub mod warp;

use crate::errors::{DavError, DavResult};

pub use crate::auth::{AuthPolicy, MemPrincipalStore, Principal, PrincipalStore, RealmPolicy};
pub use crate::davhandler::{DavBuilder, DavHandler, FileSystem};
pub use crate::util::{DavMethod, DavMethodSet};
