/// Alert sinks
pub mod sink;

pub use sink::{AlertSink, ConsoleSink, MemorySink, WebhookSink};
