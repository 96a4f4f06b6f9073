//! Print everything arriving on a GC-100 serial port.
//!
//! Opens the data channel of one serial module and dumps received bytes
//! until the timeout expires or Ctrl-C is pressed. Optionally sends a line
//! first, which is handy for poking a projector or amplifier.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p gclib --example serial_listen -- --host 192.168.1.70 --timeout 30
//! cargo run -p gclib --example serial_listen -- --host 192.168.1.70 --send "PWR?"
//! ```

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use gclib::{ConnectorAddress, SerialChannel, SerialOptions};

#[derive(Parser, Debug)]
#[command(about = "Listen on a GC-100 serial data channel")]
struct Args {
    /// Gateway host name or IP address.
    #[arg(long)]
    host: String,

    /// Connector address of the serial module.
    #[arg(long, default_value = "1:1")]
    addr: ConnectorAddress,

    /// Zero-based serial module index (data port = 4999 + index).
    #[arg(long, default_value_t = 0)]
    index: u8,

    /// Data port of serial index 0.
    #[arg(long, default_value_t = gclib::DEFAULT_SERIAL_BASE_PORT)]
    port: u16,

    /// Seconds to listen; 0 listens until Ctrl-C.
    #[arg(long, default_value_t = 0)]
    timeout: u64,

    /// Text to send (with a trailing CR) before listening.
    #[arg(long)]
    send: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let data_port = gclib::data_port(args.port, args.index)
        .context("serial index runs past the last TCP port")?;

    let options = SerialOptions {
        base_port: args.port,
        ..SerialOptions::default()
    };
    let serial = SerialChannel::new(&args.host, args.addr, args.index, options);
    serial.connect().await?;
    eprintln!(
        "listening on {}:{} (module {})",
        args.host,
        data_port,
        serial.address()
    );

    if let Some(text) = &args.send {
        let mut line = text.clone().into_bytes();
        line.push(b'\r');
        serial.send(&line).await?;
    }

    let deadline = (args.timeout > 0).then(|| Instant::now() + Duration::from_secs(args.timeout));

    loop {
        let wait = match deadline {
            Some(d) => d.saturating_duration_since(Instant::now()),
            None => Duration::from_secs(3600),
        };
        if wait.is_zero() {
            break;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            result = serial.recv_with_timeout(1024, wait) => match result {
                Ok(bytes) => print!("{}", String::from_utf8_lossy(&bytes).replace('\r', "\n")),
                Err(gclib::Error::Timeout) => continue,
                Err(e) => return Err(e.into()),
            },
        }
    }

    serial.disconnect().await?;
    Ok(())
}
