pub mod store;

pub use store::IngestionWriter;
