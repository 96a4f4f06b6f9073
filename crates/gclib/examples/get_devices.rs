//! List the modules installed in a GC-100 and their firmware versions.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p gclib --example get_devices -- --host 192.168.1.70
//! ```

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gclib::Gc100Builder;

#[derive(Parser, Debug)]
#[command(about = "List GC-100 modules")]
struct Args {
    /// Gateway host name or IP address.
    #[arg(long)]
    host: String,

    /// Control port.
    #[arg(long, default_value_t = gclib::DEFAULT_CONTROL_PORT)]
    port: u16,

    /// Command timeout in seconds.
    #[arg(long, default_value_t = 2)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let gc = Gc100Builder::new(&args.host)
        .port(args.port)
        .command_timeout(Duration::from_secs(args.timeout))
        .build()
        .await?;

    let net = gc.get_network().await?;
    println!(
        "{} ({:?}, ip {}, mask {}, gw {}{})",
        gc.host(),
        net.mode,
        net.ip,
        net.subnet,
        net.gateway,
        if net.locked { ", locked" } else { "" }
    );

    for device in gc.get_devices().await? {
        // Module 0 is the unit itself and has no version of its own.
        let version = if device.module == 0 {
            String::from("-")
        } else {
            gc.get_version(device.module)
                .await
                .unwrap_or_else(|e| format!("unavailable ({e})"))
        };
        println!("module {:>2}: {:<12} {}", device.module, device.kind, version);
    }

    gc.disconnect().await;
    Ok(())
}
