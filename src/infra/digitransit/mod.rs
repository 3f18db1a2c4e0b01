mod client;

pub use client::DigitransitClient;
