//! Encoding of the collector-to-agent chart protocol and the shared sink it
//! is flushed through.

mod sink;
mod writer;

pub use sink::{MemoryWriter, OutputSink};
pub use writer::{ChartDefinition, DimensionDefinition, ProtocolWriter};

/// Charts whose fully-qualified id (`type.id`) is this long or longer are
/// rejected by the receiving agent.
pub const MAX_CHART_ID_LENGTH: usize = 200;
