//! snapwatch
//!
//! An in-memory snapshot cache of file and directory state for incremental
//! builds, kept valid across builds by OS change notification instead of
//! rescanning the project tree.
//!
//! ```no_run
//! use snapwatch::{Config, WatchingFileSystem};
//!
//! # fn main() -> snapwatch::Result<()> {
//! let mut vfs = WatchingFileSystem::for_platform(&Config::from_env()?)?;
//! vfs.snapshot_tree("/work/project")?;
//!
//! vfs.start_watching()?;
//! // ...idle until the next build is requested...
//! let outcome = vfs.stop_watching();
//! println!("{} paths changed", outcome.paths_invalidated);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod observability;
pub mod snapshot;
pub mod vfs;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
pub use vfs::WatchingFileSystem;
