//! Outbound HTTP plumbing shared by the external lookup services.
//!
//! Services talk to an [`HttpClient`] rather than `reqwest::Client` directly so
//! that authentication can be layered on ([`auth::ApiKey`]) and tests can
//! substitute canned responses.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;
