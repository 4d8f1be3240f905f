pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod function;
pub mod generator;
pub mod measurement;
pub mod replication;
pub mod report;
pub mod runner;
pub mod schema;
pub mod target;
pub mod workload;
