//! Object storage for workspace files.
//!
//! Everything is addressed by slash-separated keys relative to a backend's
//! root, validated by [`validate_key`] before it touches a filesystem or a
//! bucket. The same [`StorageBackend`] trait serves two roles: the staging
//! area that holds the bytes written into a workspace, and the remote
//! environments files get synchronized to.

pub mod backend;
pub mod error;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::path::{file_name, validate as validate_key};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
