pub mod emitter;
pub mod exporter;
pub mod identifier;
pub mod sample;
pub mod sink;

pub use emitter::MetricEmitter;
pub use exporter::PrometheusExporter;
pub use identifier::{IdentifierBuilder, IDENTIFIER_CAPACITY};
pub use sample::{MetricKind, MetricSample, PLUGIN, TOTAL};
pub use sink::{Fanout, JsonSink, LogSink, MetricSink};
