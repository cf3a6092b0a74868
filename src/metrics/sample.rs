use serde::{Serialize, Serializer};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Plugin name every sample is filed under.
pub const PLUGIN: &str = "ipvs";

/// Type instance of service-level aggregates.
pub const TOTAL: &str = "total";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Cumulative connection count
    Connections,
    /// Packets in, packets out
    IfPackets,
    /// Bytes in, bytes out
    IfOctets,
}

impl MetricKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Connections => "connections",
            MetricKind::IfPackets => "if_packets",
            MetricKind::IfOctets => "if_octets",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One dispatched measurement. Values are cumulative counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub metric: MetricKind,
    pub host: String,
    pub plugin: &'static str,
    pub plugin_instance: String,
    pub type_instance: String,
    #[serde(serialize_with = "epoch_seconds")]
    pub time: SystemTime,
    #[serde(serialize_with = "seconds")]
    pub interval: Duration,
    pub values: Vec<u64>,
}

impl MetricSample {
    pub fn is_total(&self) -> bool {
        self.type_instance == TOTAL
    }
}

fn epoch_seconds<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    serializer.serialize_f64(secs)
}

fn seconds<S: Serializer>(interval: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(interval.as_secs_f64())
}
