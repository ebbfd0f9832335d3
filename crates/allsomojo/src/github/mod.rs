//! GitHub implementation of [`HostingClient`](crate::platform::HostingClient).

mod client;
mod convert;
pub mod types;

pub use client::{DEFAULT_API_URL, GitHubClient, parse_rate_limit_headers};
