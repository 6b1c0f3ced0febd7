//
//  Sample application.
//
//  Listens on localhost:4918, plain http, no ssl.
//  Connect to http://localhost:4918/
//
//  Everything below --protect (default: the whole tree) is in the
//  realm given by --realm, and needs Digest authentication with one
//  of the --user name:password pairs.
//

use std::error::Error;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use futures_util::future::TryFutureExt;

use dav_gate::{DavHandler, FileSystem, MemPrincipalStore, RealmPolicy};

#[derive(Debug, clap::Parser)]
#[command(about, version)]
struct Cli {
    /// port to listen on
    #[arg(short, long, default_value = "4918")]
    port: u16,
    /// local directory to serve (default: ephemeral memory filesystem)
    #[arg(short, long)]
    dir: Option<String>,
    /// user as name:password, can be repeated
    #[arg(short, long = "user")]
    users: Vec<String>,
    /// authentication realm
    #[arg(short, long, default_value = "dav-gate")]
    realm: String,
    /// path prefix that requires authentication
    #[arg(long, default_value = "/")]
    protect: String,
    /// seconds before a nonce goes stale
    #[arg(long, default_value = "60")]
    nonce_expiry: u64,
    /// refuse PUT, DELETE and MKCOL
    #[arg(long)]
    read_only: bool,
    /// HTML index for GET on a directory
    #[arg(short, long)]
    autoindex: bool,
}

fn build_handler(cli: &Cli) -> Result<DavHandler, Box<dyn Error>> {
    let fs = match &cli.dir {
        Some(dir) => FileSystem::local(dir, true),
        None => FileSystem::Mem,
    };

    let mut principals = MemPrincipalStore::new();
    for user in &cli.users {
        let (name, password) = user
            .split_once(':')
            .ok_or_else(|| format!("--user {user}: expected name:password"))?;
        principals = principals.user(name, password);
    }
    let mut policy = RealmPolicy::new().read_only(cli.read_only);
    if !cli.users.is_empty() {
        policy = policy.protect(&cli.protect, cli.realm.clone());
    }

    Ok(DavHandler::builder(fs)
        .principals(principals)
        .policy(policy)
        .nonce_expiry(Duration::from_secs(cli.nonce_expiry))
        .read_only(cli.read_only)
        .autoindex(cli.autoindex)
        .build())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let dav_server = build_handler(&cli)?;
    let name = cli.dir.as_deref().unwrap_or("memory filesystem");

    let make_service = hyper::service::make_service_fn(|_| {
        let dav_server = dav_server.clone();
        async move {
            let func = move |req| {
                let dav_server = dav_server.clone();
                async move { Ok::<_, hyper::Error>(dav_server.handle(req).await) }
            };
            Ok::<_, hyper::Error>(hyper::service::service_fn(func))
        }
    });

    let addr = format!("0.0.0.0:{}", cli.port);
    let addr = SocketAddr::from_str(&addr)?;

    let server = hyper::Server::try_bind(&addr)?
        .serve(make_service)
        .map_err(|e| eprintln!("server error: {}", e));

    println!("Serving {} on {}", name, cli.port);
    let _ = server.await;
    Ok(())
}
