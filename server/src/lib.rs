pub mod db;
pub mod games;
pub mod identity;
pub mod ingest;
pub mod scoring;
pub mod store;
pub mod types;
