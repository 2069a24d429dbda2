/// This demo server streams the archive described by a local manifest.
/// A real application would generate a manifest per request from a
/// database of file lengths and checksums, then stream it the same way.

use std::net::SocketAddr;
use std::path::PathBuf;
use bytes::Bytes;
use clap::Parser;
use http_body_util::{Either, Full};
use hyper::{Method, Request, Response, StatusCode, body::{self, Body}};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use livezip::encoder::Encoder;
use livezip::error::{BoxError, Report};
use livezip::manifest::Manifest;
use livezip::serve::zip_response;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON manifest describing the archive contents
    #[arg(long, value_name="FILE")]
    manifest: PathBuf,

    /// IP:port to listen for HTTP connections
    #[arg(long, value_name="IP:PORT", default_value="[::1]:3000")]
    listen: SocketAddr,
}

async fn handle_request(req: Request<body::Incoming>, manifest: Manifest)
    -> Result<Response<Either<Full<Bytes>, impl Body<Data = Bytes, Error = BoxError>>>, hyper::http::Error>
{
    log::info!("Request: {} {}", req.method(), req.uri());

    if req.method() != Method::GET {
        return Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .body(Either::Left(Full::new(Bytes::from_static(b"Only GET requests allowed"))));
    }

    let filename = manifest.filename.clone();
    match zip_response(&filename, Encoder::new(manifest.into_entries())) {
        Ok(res) => Ok(res.map(Either::Right)),
        Err(err) => {
            log::error!("Failed to start archive stream: {}", Report(&err));
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Either::Left(Full::new(Bytes::from_static(b"Failed to produce archive"))))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut logger = env_logger::Builder::from_default_env();
    logger.filter_level(log::LevelFilter::Info);
    logger.init();
    log_panics::init();

    let args = Args::parse();
    let manifest: Manifest = serde_json::from_slice(&std::fs::read(&args.manifest)?)?;

    let listener = TcpListener::bind(args.listen).await?;
    log::info!("Listening on {}", args.listen);

    loop {
        let (stream, _) = listener.accept().await?;

        let manifest = manifest.clone();
        let io = TokioIo::new(stream);

        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .serve_connection(io, service_fn(|req| handle_request(req, manifest.clone())))
                .await
            {
                log::error!("Error serving connection: {}", err);
            }
        });
    }
}
