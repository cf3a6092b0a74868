#[cfg(target_os = "linux")]
pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ipvsmon")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Per-service and per-real-server traffic counters from the kernel's IPVS tables", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to a YAML configuration file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Poll IPVS every interval until interrupted")]
    Run {
        #[arg(short, long, help = "Seconds between polls")]
        interval: Option<u64>,

        #[arg(long, help = "Host name stamped on samples")]
        hostname: Option<String>,

        #[arg(long, help = "Write samples to stdout as JSON lines")]
        json: bool,

        #[arg(long, help = "Prometheus textfile to rewrite after each poll")]
        textfile: Option<PathBuf>,
    },
    #[command(about = "Poll once and print every sample")]
    Dump {
        #[arg(long, help = "Print JSON lines instead of a table")]
        json: bool,
    },
    #[command(about = "Display IPVS version and table sizes")]
    Info,
}
