#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Bundler sparse reconstructions and the camera model.
pub mod bundler;

/// Error types.
pub mod error;

/// Readers and writers for the file formats.
pub mod io;

/// Small linear algebra helpers.
pub mod linalg;

/// Operations on whole reconstructions.
pub mod ops;

/// PMVS patches, cameras and options.
pub mod pmvs;

/// Point clouds for export.
pub mod pointcloud;

pub use error::{ErrorKind, SfmError};
