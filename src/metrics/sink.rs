//! Dispatch targets for metric samples

use crate::metrics::sample::MetricSample;
use crate::{IpvsError, Result};
use std::io::Write;
use tracing::{info, warn};

/// Receives samples as soon as they are built.
///
/// `dispatch` is fire-and-forget: a sink that cannot deliver logs the problem
/// and drops the sample. `flush` is called by the host once per cycle.
pub trait MetricSink {
    fn dispatch(&mut self, sample: &MetricSample);

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: MetricSink + ?Sized> MetricSink for Box<S> {
    fn dispatch(&mut self, sample: &MetricSample) {
        (**self).dispatch(sample)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Keeps every sample in memory.
impl MetricSink for Vec<MetricSample> {
    fn dispatch(&mut self, sample: &MetricSample) {
        self.push(sample.clone());
    }
}

/// One log line per sample.
#[derive(Debug, Default)]
pub struct LogSink;

impl MetricSink for LogSink {
    fn dispatch(&mut self, sample: &MetricSample) {
        info!(
            host = %sample.host,
            metric = %sample.metric,
            plugin_instance = %sample.plugin_instance,
            type_instance = %sample.type_instance,
            values = ?sample.values,
            "sample"
        );
    }
}

/// Newline-delimited JSON, one object per sample.
pub struct JsonSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MetricSink for JsonSink<W> {
    fn dispatch(&mut self, sample: &MetricSample) {
        let written = serde_json::to_writer(&mut self.writer, sample)
            .map_err(|e| IpvsError::MetricsError(e.to_string()))
            .and_then(|_| self.writer.write_all(b"\n").map_err(IpvsError::from));

        if let Err(e) = written {
            warn!("Dropping {} sample for {}: {}", sample.metric, sample.plugin_instance, e);
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Forwards each sample to several sinks.
#[derive(Default)]
pub struct Fanout {
    sinks: Vec<Box<dyn MetricSink>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn MetricSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl MetricSink for Fanout {
    fn dispatch(&mut self, sample: &MetricSample) {
        for sink in &mut self.sinks {
            sink.dispatch(sample);
        }
    }

    /// Flushes every sink, reporting the first failure.
    fn flush(&mut self) -> Result<()> {
        let mut first_err = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.flush() {
                warn!("Sink flush failed: {}", e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
