pub mod cleanup;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod infra;
pub mod location;
pub mod mqtt;
pub mod payload;
pub mod pipeline;
pub mod services;
pub mod stats;
pub mod status;
pub mod store;
pub mod topic;
pub mod writer;
