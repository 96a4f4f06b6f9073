//! Send an IR code through a GC-100.
//!
//! The code is given as comma-separated on/off durations in carrier
//! cycles, the same numbers that follow the offset in a Global Cache
//! `sendir` line.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p gclib --example send_ir -- --host 192.168.1.70 --addr 2:1 \
//!     --frequency 38000 --code 341,170,21,21,21,64,21,1517
//! ```

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gclib::{ConnectorAddress, Gc100Builder, IrCommand};

#[derive(Parser, Debug)]
#[command(about = "Send an IR code through a GC-100")]
struct Args {
    /// Gateway host name or IP address.
    #[arg(long)]
    host: String,

    /// Control port.
    #[arg(long, default_value_t = gclib::DEFAULT_CONTROL_PORT)]
    port: u16,

    /// IR connector address.
    #[arg(long, default_value = "2:1")]
    addr: ConnectorAddress,

    /// Carrier frequency in Hz.
    #[arg(long, default_value_t = 38_000)]
    frequency: u32,

    /// On/off durations in carrier cycles, comma-separated.
    #[arg(long)]
    code: String,

    /// Number of times to send the code.
    #[arg(long, default_value_t = 1)]
    repeat: u16,

    /// Seconds to wait for the transmission to complete.
    #[arg(long, default_value_t = 5)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let cycles = args
        .code
        .split(',')
        .map(|v| v.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .context("IR code must be comma-separated integers")?;

    let ir = IrCommand::new(args.addr, args.frequency, cycles).with_repeat(args.repeat);

    let gc = Gc100Builder::new(&args.host)
        .port(args.port)
        .command_timeout(Duration::from_secs(args.timeout))
        .build()
        .await?;

    match gc.send_ir_command(ir).await {
        Ok(done) => println!("complete: {} id {}", done.addr, done.id),
        Err(gclib::Error::Command(e)) => {
            eprintln!("device rejected the code: {} ({})", e, e.line());
        }
        Err(e) => {
            gc.disconnect().await;
            return Err(e.into());
        }
    }

    gc.disconnect().await;
    Ok(())
}
