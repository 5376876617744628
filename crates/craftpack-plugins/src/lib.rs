//! Part plugins for craftpack.
//!
//! A plugin fills a part's source area during pull and its install area
//! during build. Plugins are looked up by name in a `PluginRegistry`, which
//! ships the `nil`, `dump` and `bundle` built-ins and accepts additional
//! registrations. `MockPlugin` records calls and produces configurable
//! output for tests.

pub mod builtin;
pub mod mock;
pub mod plugin;
pub mod registry;

pub use builtin::{BundlePlugin, DumpPlugin, NilPlugin};
pub use mock::MockPlugin;
pub use plugin::{BuildOutput, Plugin, PluginContext};
pub use registry::PluginRegistry;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] craftpack_store::StoreError),
    #[error("Part '{part}' uses unknown plugin '{plugin}'.")]
    UnknownPlugin { part: String, plugin: String },
    #[error("Plugin '{plugin}' does not support option '{option}'.")]
    InvalidOption { plugin: String, option: String },
    #[error("Source for part '{part}' not found: '{}'.", path.display())]
    SourceNotFound { part: String, path: PathBuf },
    #[error("Failed to build part '{part}': {message}")]
    BuildFailed { part: String, message: String },
}
