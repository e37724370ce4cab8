pub mod compactor;
pub mod config;
pub mod engine;
pub mod http;
pub mod identity;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod repository;
pub mod wal;
