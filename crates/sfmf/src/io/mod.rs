/// Bundle file reader and writer.
pub mod bundler;

/// Gzip aware file helpers.
pub mod compressed;

/// Image list files.
pub mod list;

/// PMVS patch file reader and writer.
pub mod patch;

/// ASCII PLY writer.
pub mod ply;

/// PMVS camera files.
pub mod pmvs_camera;

/// PMVS options files.
pub mod pmvs_options;

pub(crate) mod tokens;
