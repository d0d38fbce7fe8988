//! pixelchunk server binary.
//!
//! ## Usage
//!
//! ```bash
//! pixelchunk-server [--port PORT] [--data-dir DIR]
//! ```
//!
//! Verbosity is controlled by `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pixelchunk_server::{AppState, DEFAULT_DATA_DIR, DEFAULT_PORT, build_router};

fn print_usage() {
    eprintln!(
        r#"pixelchunk-server - collaborative versioned pixel canvas server

USAGE:
    pixelchunk-server [OPTIONS]

OPTIONS:
    --port <PORT>         Listen port (default: {port})
    --data-dir <DIR>      Directory for project stores (default: {data_dir})
    --help, -h            Show this help
"#,
        port = DEFAULT_PORT,
        data_dir = DEFAULT_DATA_DIR,
    );
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut port = DEFAULT_PORT;
    let mut data_dir = PathBuf::from(DEFAULT_DATA_DIR);

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            "--port" => {
                match args.get(i + 1).and_then(|s| s.parse().ok()) {
                    Some(p) => port = p,
                    None => {
                        eprintln!("--port requires a port number");
                        return ExitCode::FAILURE;
                    }
                }
                i += 2;
            }
            "--data-dir" => {
                match args.get(i + 1) {
                    Some(dir) => data_dir = PathBuf::from(dir),
                    None => {
                        eprintln!("--data-dir requires a path");
                        return ExitCode::FAILURE;
                    }
                }
                i += 2;
            }
            other => {
                eprintln!("Unknown option: {other}");
                print_usage();
                return ExitCode::FAILURE;
            }
        }
    }

    if let Err(e) = run_server(port, data_dir).await {
        tracing::error!("Server error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run_server(port: u16, data_dir: PathBuf) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(data_dir.clone()));
    let app = build_router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(%addr, data_dir = %data_dir.display(), "starting pixelchunk server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
