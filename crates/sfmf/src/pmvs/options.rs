use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SfmError;

/// The content of a PMVS options file.
///
/// Only `timages` and `oimages` are interpreted by this crate; the other
/// fields are carried through so the file can be written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmvsOptions {
    /// Pyramid level used for reconstruction.
    pub level: u32,
    /// Cell size controlling the density of patches.
    pub csize: u32,
    /// Photometric consistency threshold.
    pub threshold: f32,
    /// Correlation window size.
    pub wsize: u32,
    /// Minimum number of images a patch must be visible in.
    pub min_image_num: u32,
    /// Number of threads.
    pub cpu: u32,
    /// Edge based visibility flag.
    pub set_edge: u32,
    /// Use the bounding volume of the scene.
    pub use_bound: bool,
    /// Use the visibility data of the sparse reconstruction.
    pub use_vis_data: bool,
    /// Sequence window, negative when unused.
    pub sequence: i32,
    /// Maximum angle between rays, in degrees.
    pub max_angle: f32,
    /// Outlier filtering threshold.
    pub quad: f32,
    /// Target images. `timages[i]` is the original index of dense camera `i`.
    pub timages: Vec<u32>,
    /// Other images used only for visibility.
    pub oimages: Vec<u32>,
}

impl Default for PmvsOptions {
    fn default() -> Self {
        Self {
            level: 1,
            csize: 2,
            threshold: 0.7,
            wsize: 7,
            min_image_num: 3,
            cpu: 4,
            set_edge: 0,
            use_bound: false,
            use_vis_data: false,
            sequence: -1,
            max_angle: 10.0,
            quad: 2.5,
            timages: Vec::new(),
            oimages: Vec::new(),
        }
    }
}

impl PmvsOptions {
    /// Read an options file. See [`crate::io::pmvs_options::read_pmvs_options`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SfmError> {
        crate::io::pmvs_options::read_pmvs_options(path)
    }

    /// Write an options file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SfmError> {
        crate::io::pmvs_options::write_pmvs_options(self, path)
    }

    /// Map a dense camera index to the sparse reconstruction numbering.
    pub fn original_camera_index(&self, dense: u32) -> Option<u32> {
        self.timages.get(dense as usize).copied()
    }
}
