//! Command Line Interface
//!
//! `chassisctl` queries a running chassismond over its alarm socket.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cm_core::constants::paths;
use cm_core::DaemonClient;

use crate::render;

#[derive(Parser)]
#[command(name = "chassisctl")]
#[command(version)]
#[command(about = "Query the chassis hardware-condition monitor")]
#[command(long_about = "Query the chassis hardware-condition monitor

EXAMPLES:
    chassisctl alarms                  List active alarms, oldest first
    chassisctl alarms --json           Same, as a JSON array
    chassisctl ping                    Check that chassismond is answering
    chassisctl --socket /tmp/cm.sock version")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Alarm query socket of chassismond
    #[arg(short, long, default_value = paths::DAEMON_SOCKET)]
    pub socket: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List active alarms in the order they were first observed
    Alarms {
        /// Print a JSON array instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Check that the daemon is answering
    Ping,
    /// Print the daemon version
    Version,
}

pub fn run_cli(cli: &Cli) -> anyhow::Result<()> {
    let mut client = DaemonClient::connect(&cli.socket)
        .with_context(|| format!("is chassismond running? (socket {})", cli.socket.display()))?;

    match &cli.command {
        Commands::Alarms { json } => {
            let alarms = client.list_alarms().context("Failed to list alarms")?;
            if *json {
                println!("{}", render::alarms_json(&alarms)?);
            } else {
                print!("{}", render::alarms_table(&alarms));
            }
        }
        Commands::Ping => {
            let reply = client.ping().context("Ping failed")?;
            println!("{}", reply);
        }
        Commands::Version => {
            let version = client.version().context("Version query failed")?;
            println!("chassismond {}", version);
        }
    }
    Ok(())
}
