use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser as ClapParser;
use dllbridge_server::{BridgeConfig, Coordinator};
use tracing::info;

#[derive(ClapParser)]
#[command(name = "dllbridge-serverd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Native-side bridge server: resolves DLLs and marshals calls across the Unix/Wine boundary", long_about = None)]
struct Cli {
    /// Path to a TOML config file (spec.md §4.7). Falls back to built-in
    /// defaults, then `DLLBRIDGE_*` environment overrides, when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the bind address from the config file/defaults.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dllbridge_serverd=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load(path).unwrap_or_else(|e| {
            eprintln!("dllbridge-serverd: {e}");
            std::process::exit(1);
        }),
        None => BridgeConfig::default(),
    };
    config = config.apply_env_overrides().unwrap_or_else(|e| {
        eprintln!("dllbridge-serverd: {e}");
        std::process::exit(1);
    });
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }

    info!(bind_addr = %config.bind_addr, "starting dllbridge-serverd");

    let bind_addr = config.bind_addr.clone();
    dllbridge_transport::serve_tcp(&bind_addr, move || Coordinator::new(config.clone()))
        .await
        .map_err(std::io::Error::other)
}
