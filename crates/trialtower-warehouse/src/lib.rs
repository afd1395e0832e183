pub mod cache;
pub mod client;
pub mod loaders;

pub use cache::TtlCache;
pub use client::{QueryResult, WarehouseClient, WarehouseSettings};
pub use loaders::Loaders;
