//! REST implementation of the storefront service traits

mod client;
mod config;

pub use client::HttpClient;
pub use config::HttpConfig;
