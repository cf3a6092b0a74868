use crate::kernel::Counters;
use crate::metrics::sample::{MetricKind, MetricSample, PLUGIN};
use crate::metrics::sink::MetricSink;
use std::time::{Duration, SystemTime};

/// Turns counter sets into samples and hands them to a sink.
///
/// No buffering and no retry: whatever the sink does with a sample is its own
/// business.
#[derive(Debug, Clone)]
pub struct MetricEmitter {
    host: String,
    interval: Duration,
}

impl MetricEmitter {
    pub fn new(host: impl Into<String>, interval: Duration) -> Self {
        Self {
            host: host.into(),
            interval,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Emit `connections`, `if_packets` and `if_octets` for one entity.
    /// Returns the number of samples dispatched.
    pub fn emit_counters<S: MetricSink + ?Sized>(
        &self,
        sink: &mut S,
        time: SystemTime,
        plugin_instance: &str,
        type_instance: &str,
        counters: &Counters,
    ) -> usize {
        let shapes = [
            (MetricKind::Connections, vec![counters.connections]),
            (
                MetricKind::IfPackets,
                vec![counters.packets_in, counters.packets_out],
            ),
            (
                MetricKind::IfOctets,
                vec![counters.bytes_in, counters.bytes_out],
            ),
        ];

        let count = shapes.len();
        for (metric, values) in shapes {
            let sample = MetricSample {
                metric,
                host: self.host.clone(),
                plugin: PLUGIN,
                plugin_instance: plugin_instance.to_string(),
                type_instance: type_instance.to_string(),
                time,
                interval: self.interval,
                values,
            };
            sink.dispatch(&sample);
        }
        count
    }
}
