pub mod api;
pub mod config;
pub mod forecast;
pub mod metrics_server;
pub mod normalize;
pub mod observability;
pub mod pipeline;
pub mod query;
pub mod series;
pub mod sinks;
pub mod summary;
pub mod timefmt;
pub mod transport;

pub use pipeline::{Envelope, IngestPipeline, MessageHandler};
pub use query::QueryService;
