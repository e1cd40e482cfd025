use anyhow::Context;
use clap::Parser;
use imgdedup_agent::mock_service::{DuplicateMap, MockService, MockServiceConfig};
use imgdedup_protocol::PROTOCOL_VERSION;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Local service stand-in: answers version checks and duplicate requests
/// from a fixed duplicate map.
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, env = "IMGDEDUP_MOCK_ADDR", default_value = "127.0.0.1:8765")]
    addr: String,
    /// Write the bound address here once listening.
    #[arg(long)]
    addr_file: Option<PathBuf>,
    /// JSON object mapping an image name to the names it duplicates.
    #[arg(long)]
    duplicates: Option<PathBuf>,
    #[arg(long, default_value_t = PROTOCOL_VERSION)]
    version: i64,
    /// Exit after this many milliseconds instead of running forever.
    #[arg(long)]
    run_for_ms: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let duplicates: DuplicateMap = match &args.duplicates {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => DuplicateMap::new(),
    };

    let service = MockService::spawn(
        &args.addr,
        MockServiceConfig {
            version: args.version,
            duplicates,
        },
    )
    .map_err(anyhow::Error::msg)?;

    if let Some(path) = &args.addr_file {
        fs::write(path, service.listen_addr().to_string())
            .with_context(|| format!("writing {}", path.display()))?;
    }

    println!("mock_service listening on ws://{}", service.listen_addr());

    let run_for = args.run_for_ms.map(Duration::from_millis);
    let start = Instant::now();
    loop {
        thread::sleep(Duration::from_millis(33));
        if let Some(max) = run_for {
            if start.elapsed() >= max {
                break;
            }
        }
    }

    service.shutdown();
    Ok(())
}
