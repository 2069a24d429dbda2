// © 2019 3D Robotics. License: Apache-2.0
use std::path::PathBuf;
use clap::Parser;
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use livezip::encoder::Encoder;
use livezip::error::Report;
use livezip::manifest::Manifest;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON manifest describing the archive contents
    #[arg(long, value_name="FILE")]
    manifest: PathBuf,

    /// Where to write the archive
    #[arg(long, value_name="FILE")]
    output: PathBuf,
}

#[tokio::main]
async fn main() {
    let mut logger = env_logger::Builder::from_default_env();
    logger.filter_module("livezip", log::LevelFilter::Info);
    logger.init();
    log_panics::init();

    let args = Args::parse();

    if let Err(err) = run(args).await {
        log::error!("{}", Report(&*err));
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let manifest: Manifest = serde_json::from_slice(&std::fs::read(&args.manifest)?)?;
    let filename = manifest.filename.clone();

    let num_entries = manifest.entries.len();
    let mut encoder = Encoder::new(manifest.into_entries());
    encoder.prepare()?;
    let total = encoder.total_size()?;

    log::info!("Streaming zip file {}: {} entries, {} bytes", filename, num_entries, total);

    let mut stream = encoder.get_data()?;
    let mut file = File::create(&args.output).await?;

    let mut completed: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        completed += chunk.len() as u64;
    }
    file.flush().await?;

    log::info!("Wrote {} of {} bytes to {}", completed, total, args.output.display());

    Ok(())
}
