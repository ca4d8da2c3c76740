//! In-process caches shared by the ingestion pipeline.

pub mod block_time;

pub use block_time::BlockTimeCache;
