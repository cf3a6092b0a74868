use crate::metrics::sample::{MetricKind, MetricSample};
use crate::metrics::sink::MetricSink;
use crate::{IpvsError, Result};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const LABELS: &[&str] = &["host", "service", "destination"];
const DIRECTIONAL_LABELS: &[&str] = &["host", "service", "destination", "direction"];

/// Exposes the latest cycle in the Prometheus text format.
///
/// Counters are set to the kernel's cumulative values rather than
/// incremented. Each `flush` renders one cycle, optionally writes it to a
/// node_exporter textfile, then clears the series so services that vanished
/// do not linger.
pub struct PrometheusExporter {
    registry: Registry,
    connections: IntCounterVec,
    packets: IntCounterVec,
    bytes: IntCounterVec,
    textfile: Option<PathBuf>,
}

impl PrometheusExporter {
    pub fn new(textfile: Option<PathBuf>) -> Result<Self> {
        let registry = Registry::new();

        let connections = IntCounterVec::new(
            Opts::new(
                "ipvs_connections_total",
                "Connections scheduled to a virtual service or real server",
            ),
            LABELS,
        )
        .map_err(metrics_err)?;
        let packets = IntCounterVec::new(
            Opts::new("ipvs_packets_total", "Packets forwarded, by direction"),
            DIRECTIONAL_LABELS,
        )
        .map_err(metrics_err)?;
        let bytes = IntCounterVec::new(
            Opts::new("ipvs_bytes_total", "Bytes forwarded, by direction"),
            DIRECTIONAL_LABELS,
        )
        .map_err(metrics_err)?;

        registry
            .register(Box::new(connections.clone()))
            .map_err(metrics_err)?;
        registry
            .register(Box::new(packets.clone()))
            .map_err(metrics_err)?;
        registry
            .register(Box::new(bytes.clone()))
            .map_err(metrics_err)?;

        Ok(Self {
            registry,
            connections,
            packets,
            bytes,
            textfile,
        })
    }

    pub fn textfile(&self) -> Option<&Path> {
        self.textfile.as_deref()
    }

    /// Current contents in the text exposition format.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer).map_err(metrics_err)?;

        String::from_utf8(buffer).map_err(|e| IpvsError::MetricsError(e.to_string()))
    }

    fn set_directional(vec: &IntCounterVec, sample: &MetricSample) {
        for (direction, value) in ["in", "out"].into_iter().zip(&sample.values) {
            let counter = vec.with_label_values(&[
                sample.host.as_str(),
                sample.plugin_instance.as_str(),
                sample.type_instance.as_str(),
                direction,
            ]);
            counter.reset();
            counter.inc_by(*value);
        }
    }
}

impl MetricSink for PrometheusExporter {
    fn dispatch(&mut self, sample: &MetricSample) {
        match sample.metric {
            MetricKind::Connections => {
                let Some(value) = sample.values.first() else {
                    warn!("connections sample for {} without value", sample.plugin_instance);
                    return;
                };
                let counter = self.connections.with_label_values(&[
                    sample.host.as_str(),
                    sample.plugin_instance.as_str(),
                    sample.type_instance.as_str(),
                ]);
                counter.reset();
                counter.inc_by(*value);
            }
            MetricKind::IfPackets => Self::set_directional(&self.packets, sample),
            MetricKind::IfOctets => Self::set_directional(&self.bytes, sample),
        }
    }

    fn flush(&mut self) -> Result<()> {
        let text = self.render()?;

        if let Some(path) = &self.textfile {
            write_atomically(path, &text)?;
            debug!("Wrote {} bytes of metrics to {}", text.len(), path.display());
        }

        self.connections.reset();
        self.packets.reset();
        self.bytes.reset();
        Ok(())
    }
}

/// Replace `path` so readers never observe a half-written file.
fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn metrics_err(e: prometheus::Error) -> IpvsError {
    IpvsError::MetricsError(e.to_string())
}
