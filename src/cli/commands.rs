use crate::cli::Commands;
use crate::config::Config;
use crate::kernel::{self, channel::KernelChannel};
use crate::metrics::{Fanout, JsonSink, LogSink, MetricSample, MetricSink, PrometheusExporter};
use crate::{Collector, Result};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub async fn handle_command(command: Commands, mut config: Config) -> Result<()> {
    match command {
        Commands::Run {
            interval,
            hostname,
            json,
            textfile,
        } => {
            if let Some(interval) = interval {
                config.interval = interval;
            }
            if hostname.is_some() {
                config.hostname = hostname;
            }
            config.sinks.json |= json;
            if textfile.is_some() {
                config.sinks.prometheus_textfile = textfile;
            }
            config.validate()?;
            handle_run(config).await
        }
        Commands::Dump { json } => handle_dump(config, json),
        Commands::Info => handle_info(),
    }
}

fn build_sink(config: &Config) -> Result<Fanout> {
    let mut sink = Fanout::new();

    if config.sinks.log_enabled() {
        sink.push(Box::new(LogSink));
    }
    if config.sinks.json {
        sink.push(Box::new(JsonSink::new(std::io::stdout())));
    }
    if let Some(path) = &config.sinks.prometheus_textfile {
        info!("Writing Prometheus textfile to {}", path.display());
        sink.push(Box::new(PrometheusExporter::new(Some(path.clone()))?));
    }

    Ok(sink)
}

async fn handle_run(config: Config) -> Result<()> {
    let sink = build_sink(&config)?;
    let mut collector = Collector::new(KernelChannel::open, sink, config.collector_settings());
    collector.on_init()?;

    let mut ticker = tokio::time::interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sigterm = signal(SignalKind::terminate())?;

    info!("Polling IPVS every {}s. Press Ctrl+C to exit.", config.interval);

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break Ok(());
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received");
                break Ok(());
            }
            _ = ticker.tick() => {
                match collector.on_read() {
                    Ok(report) => {
                        debug!(
                            "Emitted {} samples for {} services",
                            report.samples, report.services
                        );
                        if let Err(e) = collector.sink_mut().flush() {
                            warn!("Failed to flush samples: {}", e);
                        }
                    }
                    Err(e) if e.is_fatal() => break Err(e),
                    Err(e) => warn!("Read cycle failed, retrying next interval: {}", e),
                }
            }
        }
    };

    collector.on_shutdown()?;
    info!("ipvsmon stopped");
    outcome
}

fn handle_dump(config: Config, json: bool) -> Result<()> {
    let mut collector = Collector::new(
        KernelChannel::open,
        Vec::<MetricSample>::new(),
        config.collector_settings(),
    );
    collector.on_init()?;
    let report = collector.on_read();
    collector.on_shutdown()?;
    report?;

    let samples = collector.into_sink();
    if json {
        let mut out = JsonSink::new(std::io::stdout().lock());
        for sample in &samples {
            out.dispatch(sample);
        }
        return out.flush();
    }

    println!(
        "{:<28} {:<24} {:<12} VALUES",
        "SERVICE", "INSTANCE", "METRIC"
    );
    for sample in &samples {
        let values: Vec<String> = sample.values.iter().map(u64::to_string).collect();
        println!(
            "{:<28} {:<24} {:<12} {}",
            sample.plugin_instance,
            sample.type_instance,
            sample.metric.as_str(),
            values.join(" ")
        );
    }
    Ok(())
}

fn handle_info() -> Result<()> {
    let mut channel = KernelChannel::open()?;
    let info = kernel::fetch_info(&mut channel)?;

    println!("IPVS version:          {}", info.version_string());
    println!("Connection table size: {}", info.connection_table_size);
    println!("Virtual services:      {}", info.num_services);
    Ok(())
}
