//! allsomojo - a catalog of public Mojo repositories.
//!
//! The library discovers repositories on GitHub that mention Mojo, keeps a
//! local mirror of each one, derives code statistics from those mirrors and
//! classifies every entry as relevant or blacklisted.
//!
//! # Features
//!
//! - `sqlite` (default) / `postgres` - database backends.
//! - `migrate` (default) - enables [`connect_and_migrate`], which creates the
//!   catalog schema on connection.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use allsomojo::config::Settings;
//! use allsomojo::git::SystemGit;
//! use allsomojo::github::GitHubClient;
//! use allsomojo::pipeline::{RunFlags, update_catalog};
//!
//! let settings = Settings::load();
//! let db = Arc::new(allsomojo::connect_and_migrate(&settings.database_url()?).await?);
//! let client = GitHubClient::from_settings(&settings.github)?;
//!
//! let runner = Arc::new(SystemGit);
//! let report = update_catalog(&db, &client, runner, &settings, RunFlags::default()).await?;
//! println!("{report}");
//! ```

pub mod classify;
pub mod config;
pub mod db;
pub mod entity;
pub mod git;
pub mod github;
pub mod http;
pub mod pipeline;
pub mod platform;
pub mod repository;
pub mod retry;
pub mod search;
pub mod stats;

#[cfg(feature = "migrate")]
pub mod migration;

pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use platform::{HostingClient, PlatformError, RateLimitInfo, RepoMetadata};
pub use repository::CatalogError;
