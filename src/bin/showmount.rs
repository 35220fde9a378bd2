use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use nfs_showmount::{query_exports_detailed, ExportSource, QueryOptions};

/// Show the exports of an NFS server.
#[derive(Parser, Debug)]
#[command(name = "showmount", version)]
struct Cli {
    /// Server to query
    host: String,

    /// Response timeout in milliseconds
    #[arg(short, long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Connect retries and call retransmissions
    #[arg(short, long, default_value_t = 2)]
    retries: u32,

    /// MOUNT protocol version (1 to 3)
    #[arg(long, default_value_t = 3)]
    mount_version: u32,

    /// MOUNT daemon port; skips the portmapper
    #[arg(long)]
    mount_port: Option<u16>,

    #[arg(long, default_value_t = 111)]
    portmap_port: u16,

    /// NFSv4 port used when MOUNT is unavailable
    #[arg(long, default_value_t = 2049)]
    nfs_port: u16,

    /// Do not fall back to an NFSv4 root mount
    #[arg(long)]
    no_root_probe: bool,

    /// More logging on stderr (repeatable). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn options(&self) -> QueryOptions {
        let mut options = QueryOptions::new()
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_retries(self.retries)
            .with_mount_version(self.mount_version)
            .with_portmap_port(self.portmap_port)
            .with_nfs_port(self.nfs_port)
            .with_root_probe(!self.no_root_probe);
        if let Some(port) = self.mount_port {
            options = options.with_mount_port(port);
        }
        options
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = query_exports_detailed(&cli.host, &cli.options()).await;
    if outcome.source == ExportSource::Nothing {
        match outcome.last_error() {
            Some(e) => bail!("{}: {}", cli.host, e),
            None => bail!("{}: no exports found", cli.host),
        }
    }

    println!("Export list for {}:", cli.host);
    for entry in &outcome.exports {
        println!("{entry}");
    }
    Ok(())
}
