//! Hosting-service abstraction.
//!
//! The discovery code talks to a [`HostingClient`] rather than to GitHub
//! directly, which keeps the search loop testable with canned responses.
//!
//! # Example
//!
//! ```ignore
//! use allsomojo::platform::{HostingClient, PlatformError};
//!
//! async fn first_page<C: HostingClient>(client: &C) -> Result<(), PlatformError> {
//!     let page = client.search_repositories("mojo in:name", 1, 100).await?;
//!     for repo in page.data.items {
//!         println!("{}", repo.full_name);
//!     }
//!     Ok(())
//! }
//! ```

mod errors;
mod rate_limit;
mod types;

pub use errors::{PlatformError, Result, short_error_message};
pub use rate_limit::{ApiRateLimiter, quota_pause, wait_for_quota};
pub use types::{ApiResponse, HostingClient, RateLimitInfo, RepoMetadata, SearchPage};
