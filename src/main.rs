// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

// Stop-and-wait link protocol over a serial line
mod app;
mod error;
mod framer;
mod header;
mod link;
mod protocol;
mod receiver;
mod sender;
mod serial;

use clap::{Parser, Subcommand};
use serialport::{DataBits, Parity, StopBits};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use link::{Connection, LinkParams};
use protocol::Role;
use serial::ChannelConfig;

#[derive(Parser)]
#[command(name = "arqlink")]
#[command(about = "HDLC-style stop-and-wait file transfer over a serial line", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyS0 or COM1)
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "38400")]
    baud: u32,

    /// Data bits (5, 6, 7, or 8)
    #[arg(long, default_value = "8", value_name = "BITS")]
    data_bits: u8,

    /// Parity (none, odd, or even)
    #[arg(long, default_value = "none")]
    parity: String,

    /// Stop bits (1 or 2)
    #[arg(long, default_value = "1", value_name = "BITS")]
    stop_bits: u8,

    /// Transmissions of a frame before the link is declared dead
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..))]
    tries: u32,

    /// Seconds to wait for an acknowledgment before retransmitting
    #[arg(long, default_value = "3", value_name = "SECS")]
    timeout: u64,

    /// Seconds the receiving side waits for the sender before giving up
    #[arg(long, default_value = "30", value_name = "SECS")]
    idle_timeout: u64,

    /// File bytes carried by each data packet (sending side only)
    #[arg(long, default_value = "100", value_name = "BYTES",
          value_parser = clap::value_parser!(u16).range(1..))]
    chunk_size: u16,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file
    Send {
        /// File to send
        file: PathBuf,
    },
    /// Receive a file
    Receive {
        /// Where to store the received file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn parse_data_bits(bits: u8) -> Result<DataBits, String> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        _ => Err(format!("Invalid data bits: {}. Must be 5, 6, 7, or 8", bits)),
    }
}

fn parse_parity(parity: &str) -> Result<Parity, String> {
    match parity.to_lowercase().as_str() {
        "none" => Ok(Parity::None),
        "odd" => Ok(Parity::Odd),
        "even" => Ok(Parity::Even),
        _ => Err(format!("Invalid parity: {}. Must be 'none', 'odd', or 'even'", parity)),
    }
}

fn parse_stop_bits(bits: u8) -> Result<StopBits, String> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        _ => Err(format!("Invalid stop bits: {}. Must be 1 or 2", bits)),
    }
}

fn channel_config(cli: &Cli) -> Result<ChannelConfig, String> {
    let mut config = ChannelConfig::new(cli.port.as_str(), cli.baud);
    config.data_bits = parse_data_bits(cli.data_bits)?;
    config.parity = parse_parity(&cli.parity)?;
    config.stop_bits = parse_stop_bits(cli.stop_bits)?;
    Ok(config)
}

fn link_params(cli: &Cli, role: Role) -> LinkParams {
    LinkParams {
        n_tries: cli.tries,
        timeout: Duration::from_secs(cli.timeout),
        idle_timeout: Duration::from_secs(cli.idle_timeout),
        max_payload: app::payload_limit(role, cli.chunk_size as usize),
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match channel_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        baud = config.baud_rate,
        data_bits = ?config.data_bits,
        parity = ?config.parity,
        stop_bits = ?config.stop_bits,
        tries = cli.tries,
        timeout_secs = cli.timeout,
        "line settings"
    );

    match &cli.command {
        Commands::Send { file } => {
            let params = link_params(&cli, Role::Initiator);
            if let Err(e) = send(&config, params, file, cli.chunk_size as usize) {
                eprintln!("Send failed: {}", e);
                std::process::exit(1);
            }
            println!("File sent successfully!");
        }
        Commands::Receive { output } => {
            let params = link_params(&cli, Role::Responder);
            if let Err(e) = receive(&config, params, output) {
                eprintln!("Receive failed: {}", e);
                std::process::exit(1);
            }
            println!("File received successfully!");
        }
    }
}

fn send(
    config: &ChannelConfig,
    params: LinkParams,
    file: &Path,
    chunk_size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if !file.is_file() {
        return Err(format!("File not found: {}", file.display()).into());
    }

    let mut conn = Connection::open_port(Role::Initiator, config, params)?;
    let summary = app::send_file(&mut conn, file, chunk_size)?;
    info!(bytes = summary.file_size, packets = summary.packets, "file sent");

    // Every packet is acknowledged by now; a failed disconnect loses nothing
    if let Err(e) = conn.close() {
        warn!(error = %e, "disconnect incomplete");
    }
    Ok(())
}

fn receive(
    config: &ChannelConfig,
    params: LinkParams,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.is_dir() {
            return Err(format!("Output directory not found: {}", dir.display()).into());
        }
    }

    let mut conn = Connection::open_port(Role::Responder, config, params)?;
    let summary = app::receive_file(&mut conn, output)?;
    info!(bytes = summary.file_size, packets = summary.packets, "file received");
    conn.close()?;
    Ok(())
}
