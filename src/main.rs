use clap::Parser;
use ipvsmon::cli::Cli;
use std::process;

#[cfg(not(target_os = "linux"))]
fn main() {
    let _ = Cli::parse();
    let err = ipvsmon::IpvsError::UnsupportedFeature(
        "IPVS is a Linux kernel facility".to_string(),
    );
    eprintln!("Error: {}", err);
    process::exit(1);
}

#[cfg(target_os = "linux")]
#[tokio::main(flavor = "current_thread")]
async fn main() {
    use ipvsmon::IpvsError;
    use tracing_subscriber::EnvFilter;

    /// Exit status after a fatal collector error.
    const EXIT_FATAL: i32 = 3;

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting ipvsmon v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let fatal = e
            .downcast_ref::<IpvsError>()
            .is_some_and(IpvsError::is_fatal);
        process::exit(if fatal { EXIT_FATAL } else { 1 });
    }
}

#[cfg(target_os = "linux")]
async fn run(cli: Cli) -> anyhow::Result<()> {
    use anyhow::Context;
    use ipvsmon::cli::commands;
    use ipvsmon::config::Config;

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    let Some(command) = cli.command else {
        eprintln!("No command specified. Use --help for usage information.");
        process::exit(1);
    };

    commands::handle_command(command, config).await?;
    Ok(())
}
