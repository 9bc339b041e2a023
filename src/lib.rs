pub mod aggregator;
pub mod analyzer;
pub mod config;
pub mod detector;
pub mod models;
pub mod parser;
pub mod registry;
pub mod routes;
pub mod rpc;
pub mod scheduler;
pub mod worker_processing;
