//! Compose manifests: the document model, the unit builders, and the
//! on-disk store.

pub mod infra;
pub mod model;
pub mod service;
pub mod store;

pub use model::{ComposeFile, ComposeService};
pub use store::{ManifestLayout, ManifestLock, ManifestSet};
