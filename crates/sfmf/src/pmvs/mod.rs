mod camera;
mod options;

pub use camera::PmvsCamera;
pub use options::PmvsOptions;

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::SfmError;

/// The record layout of a patch, selected by its tag in the patch file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PatchVariant {
    /// `PATCHS` records.
    Basic,
    /// `PATCHPS` records, with color and reconstruction quality.
    Extended {
        /// RGB color in `[0, 1]`.
        color: [f32; 3],
        /// Reconstruction accuracy.
        reconstruction_accuracy: f32,
        /// Pyramid level the patch was reconstructed at.
        reconstruction_s_level: f32,
    },
}

/// A PMVS oriented surface patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Homogeneous position.
    pub position: [f64; 4],
    /// Homogeneous normal.
    pub normal: [f64; 4],
    /// Photometric consistency score, roughly in `[-1, 1]`.
    pub score: f64,
    /// First debugging value written by PMVS.
    pub debug1: f64,
    /// Second debugging value written by PMVS.
    pub debug2: f64,
    /// Cameras passing the photometric consistency check.
    pub good_cameras: Vec<u32>,
    /// Cameras that see the patch but fail the check.
    pub bad_cameras: Vec<u32>,
    /// Record variant and its extra fields.
    pub variant: PatchVariant,
}

impl Default for Patch {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0, 1.0],
            normal: [0.0; 4],
            score: 0.0,
            debug1: 0.0,
            debug2: 0.0,
            good_cameras: Vec::new(),
            bad_cameras: Vec::new(),
            variant: PatchVariant::Basic,
        }
    }
}

impl Patch {
    /// The file tag of the record.
    pub fn tag(&self) -> &'static str {
        match self.variant {
            PatchVariant::Basic => "PATCHS",
            PatchVariant::Extended { .. } => "PATCHPS",
        }
    }

    /// The color of extended records.
    pub fn color(&self) -> Option<[f32; 3]> {
        match self.variant {
            PatchVariant::Basic => None,
            PatchVariant::Extended { color, .. } => Some(color),
        }
    }

    /// Promote to the extended variant with zero color and quality fields.
    /// Extended records are returned unchanged.
    pub fn into_extended(self) -> Self {
        match self.variant {
            PatchVariant::Extended { .. } => self,
            PatchVariant::Basic => Self {
                variant: PatchVariant::Extended {
                    color: [0.0; 3],
                    reconstruction_accuracy: 0.0,
                    reconstruction_s_level: 0.0,
                },
                ..self
            },
        }
    }

    /// The euclidean position, dividing by the homogeneous coordinate unless
    /// it is zero.
    pub fn point(&self) -> [f64; 3] {
        let [x, y, z, w] = self.position;
        if w == 0.0 {
            [x, y, z]
        } else {
            [x / w, y / w, z / w]
        }
    }

    /// Good cameras followed by bad cameras.
    pub fn cameras(&self) -> impl Iterator<Item = u32> + '_ {
        self.good_cameras
            .iter()
            .chain(self.bad_cameras.iter())
            .copied()
    }
}

/// Whether the camera indices of a patch set use the dense numbering of the
/// patch file or the numbering of the original image set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraIndexing {
    /// Indices as written by PMVS.
    Unmapped,
    /// Indices rewritten through the `timages` table of the options file.
    Mapped,
}

/// Summary of the number of cameras per patch.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraCountStats {
    /// Smallest count.
    pub min: u32,
    /// Largest count.
    pub max: u32,
    /// Average count.
    pub mean: f64,
    /// Median count, the upper one for an even number of samples.
    pub median: u32,
    /// Number of patches.
    pub n_samples: usize,
}

/// Collects camera counts while patches are parsed.
#[derive(Debug, Default)]
pub(crate) struct StatsAccumulator {
    samples: Vec<u32>,
    sum: u64,
    min: u32,
    max: u32,
}

impl StatsAccumulator {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            min: u32::MAX,
            ..Default::default()
        }
    }

    pub fn accumulate(&mut self, sample: u32) {
        self.samples.push(sample);
        self.sum += sample as u64;
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
    }

    pub fn finish(mut self) -> CameraCountStats {
        if self.samples.is_empty() {
            return CameraCountStats::default();
        }
        self.samples.sort_unstable();
        let n = self.samples.len();
        CameraCountStats {
            min: self.min,
            max: self.max,
            mean: self.sum as f64 / n as f64,
            median: self.samples[n / 2],
            n_samples: n,
        }
    }
}

/// Options for [`PatchSet::load`].
#[derive(Debug, Clone)]
pub struct PatchLoadOptions {
    /// Look for the options file next to the patch file and remap the camera
    /// indices through it.
    pub load_options_file: bool,
}

impl Default for PatchLoadOptions {
    fn default() -> Self {
        Self {
            load_options_file: true,
        }
    }
}

/// The content of a PMVS patch file plus the cameras and image names that
/// go with it.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchSet {
    pub(crate) patches: Vec<Patch>,
    pub(crate) indexing: CameraIndexing,
    pub(crate) good_stats: CameraCountStats,
    pub(crate) bad_stats: CameraCountStats,
    pub(crate) max_camera_index: u32,
    pub(crate) cameras: BTreeMap<u32, PmvsCamera>,
    pub(crate) image_filenames: BTreeMap<u32, PathBuf>,
    pub(crate) patch_path: Option<PathBuf>,
}

/// The options file PMVS writes for a patch file:
/// `<patch dir>/../<patch file name without .patch>`.
pub fn default_options_path(patch_path: impl AsRef<Path>) -> Option<PathBuf> {
    let patch_path = patch_path.as_ref();
    let name = patch_path.file_name()?.to_str()?;
    let name = name.strip_suffix(".gz").unwrap_or(name);
    let stem = name.strip_suffix(".patch")?;
    let dir = patch_path.parent().unwrap_or_else(|| Path::new(""));
    Some(dir.join("..").join(stem))
}

impl PatchSet {
    /// Create a patch set from patches already in memory.
    pub fn from_patches(patches: Vec<Patch>, indexing: CameraIndexing) -> Self {
        let mut set = Self {
            patches,
            indexing,
            good_stats: CameraCountStats::default(),
            bad_stats: CameraCountStats::default(),
            max_camera_index: 0,
            cameras: BTreeMap::new(),
            image_filenames: BTreeMap::new(),
            patch_path: None,
        };
        set.recompute_stats();
        set
    }

    /// Read a patch file. See [`crate::io::patch::read_patch_file`].
    pub fn load(path: impl AsRef<Path>, options: &PatchLoadOptions) -> Result<Self, SfmError> {
        crate::io::patch::read_patch_file(path, options)
    }

    /// Read a patch file, logging the error and returning `None` on failure.
    pub fn open(path: impl AsRef<Path>, options: &PatchLoadOptions) -> Option<Self> {
        let path = path.as_ref();
        match Self::load(path, options) {
            Ok(set) => Some(set),
            Err(e) => {
                log::warn!("Cannot load patch file {}: {e}", path.display());
                None
            }
        }
    }

    /// Write the patches, keeping the variant of every record.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SfmError> {
        crate::io::patch::write_patch_file(self, path)
    }

    /// The patches.
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// Mutable access to the patches.
    ///
    /// PRECONDITION: call [`Self::recompute_stats`] after changing camera lists.
    pub fn patches_mut(&mut self) -> &mut Vec<Patch> {
        &mut self.patches
    }

    /// Number of patches.
    #[inline]
    pub fn n_patches(&self) -> usize {
        self.patches.len()
    }

    /// Number of loaded cameras.
    #[inline]
    pub fn n_cameras(&self) -> usize {
        self.cameras.len()
    }

    /// The numbering the camera indices are in.
    pub fn indexing(&self) -> CameraIndexing {
        self.indexing
    }

    /// Statistics of the number of good cameras per patch.
    pub fn good_camera_stats(&self) -> &CameraCountStats {
        &self.good_stats
    }

    /// Statistics of the number of bad cameras per patch.
    pub fn bad_camera_stats(&self) -> &CameraCountStats {
        &self.bad_stats
    }

    /// Highest camera index named by any patch, 0 for an empty set.
    pub fn max_camera_index(&self) -> u32 {
        self.max_camera_index
    }

    /// The loaded cameras by index.
    pub fn cameras(&self) -> &BTreeMap<u32, PmvsCamera> {
        &self.cameras
    }

    /// The image filenames by camera index.
    pub fn image_filenames(&self) -> &BTreeMap<u32, PathBuf> {
        &self.image_filenames
    }

    /// The file the patches were read from, if any.
    pub fn patch_path(&self) -> Option<&Path> {
        self.patch_path.as_deref()
    }

    /// Recompute the camera count statistics and the highest camera index.
    pub fn recompute_stats(&mut self) {
        let mut good = StatsAccumulator::with_capacity(self.patches.len());
        let mut bad = StatsAccumulator::with_capacity(self.patches.len());
        let mut max_camera_index = 0;
        for patch in self.patches.iter() {
            good.accumulate(patch.good_cameras.len() as u32);
            bad.accumulate(patch.bad_cameras.len() as u32);
            max_camera_index = patch.cameras().fold(max_camera_index, u32::max);
        }
        self.good_stats = good.finish();
        self.bad_stats = bad.finish();
        self.max_camera_index = max_camera_index;
    }

    /// Rewrite every good and bad camera index through `options.timages`.
    ///
    /// The patch set is left untouched on error.
    ///
    /// # Errors
    ///
    /// * [`SfmError::AlreadyRemapped`] if the indices were already rewritten.
    /// * [`SfmError::UnsupportedOptions`] if `oimages` is not empty.
    /// * [`SfmError::CameraIndexOutOfRange`] if an index has no entry in `timages`.
    pub fn remap_cameras(&mut self, options: &PmvsOptions) -> Result<(), SfmError> {
        if self.indexing == CameraIndexing::Mapped {
            return Err(SfmError::AlreadyRemapped);
        }
        if !options.oimages.is_empty() {
            return Err(SfmError::UnsupportedOptions(format!(
                "oimages lists {} images, only timages is supported",
                options.oimages.len()
            )));
        }

        let timages = &options.timages;
        let remap = |cameras: &[u32], context: &dyn Fn() -> String| {
            cameras
                .iter()
                .map(|&cam| {
                    options
                        .original_camera_index(cam)
                        .ok_or_else(|| SfmError::CameraIndexOutOfRange {
                            context: context(),
                            camera: cam as i64,
                            n_cameras: timages.len(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()
        };

        let mut remapped = Vec::with_capacity(self.patches.len());
        for (i, patch) in self.patches.iter().enumerate() {
            let context = || format!("patch {i}");
            remapped.push((
                remap(&patch.good_cameras, &context)?,
                remap(&patch.bad_cameras, &context)?,
            ));
        }
        let context = || "loaded cameras".to_string();
        let camera_keys = remap(&self.cameras.keys().copied().collect::<Vec<_>>(), &context)?;
        let image_keys = remap(
            &self.image_filenames.keys().copied().collect::<Vec<_>>(),
            &context,
        )?;

        for (patch, (good, bad)) in self.patches.iter_mut().zip(remapped) {
            patch.good_cameras = good;
            patch.bad_cameras = bad;
        }
        self.cameras = camera_keys
            .into_iter()
            .zip(std::mem::take(&mut self.cameras).into_values())
            .collect();
        self.image_filenames = image_keys
            .into_iter()
            .zip(std::mem::take(&mut self.image_filenames).into_values())
            .collect();

        self.indexing = CameraIndexing::Mapped;
        self.recompute_stats();
        log::info!(
            "Remapped camera indices of {} patches through {} target images",
            self.patches.len(),
            timages.len()
        );
        Ok(())
    }

    /// Append the patches of `other` and add its cameras and image names.
    /// Entries already present in `self` are kept.
    ///
    /// # Errors
    ///
    /// Fails if the two sets use different camera numberings.
    pub fn merge_with(&mut self, other: PatchSet) -> Result<(), SfmError> {
        if self.indexing != other.indexing {
            return Err(SfmError::IndexingMismatch(self.indexing, other.indexing));
        }
        self.patches.extend(other.patches);
        for (idx, cam) in other.cameras {
            self.cameras.entry(idx).or_insert(cam);
        }
        for (idx, name) in other.image_filenames {
            self.image_filenames.entry(idx).or_insert(name);
        }
        self.patch_path = None;
        self.recompute_stats();
        Ok(())
    }

    /// Load the PMVS camera files and image names of the cameras.
    ///
    /// Expects the directory layout created by PMVS: cameras in
    /// `<base>/txt/%08d.txt` and images in `<base>/visualize/%08d.jpg`.
    ///
    /// # Arguments
    ///
    /// * `basedir` - The PMVS root directory. Defaults to the parent of the
    ///   directory holding the patch file.
    /// * `only_used` - Only load the cameras named by some patch, otherwise
    ///   load every index up to [`Self::max_camera_index`].
    pub fn load_cameras_and_image_filenames(
        &mut self,
        basedir: Option<&Path>,
        only_used: bool,
    ) -> Result<(), SfmError> {
        let base = match (basedir, self.patch_path.as_deref()) {
            (Some(dir), _) => dir.to_path_buf(),
            (None, Some(patch_path)) => {
                log::info!("No base directory given, using the PMVS layout around the patch file");
                patch_path
                    .parent()
                    .unwrap_or_else(|| Path::new(""))
                    .join("..")
            }
            (None, None) => {
                return Err(SfmError::file(
                    "",
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "no base directory and no patch file to derive it from",
                    ),
                ))
            }
        };

        let cameras_dir = base.join("txt");
        let images_dir = base.join("visualize");
        if !cameras_dir.is_dir() {
            log::info!(
                "Camera directory {} does not exist, no cameras loaded",
                cameras_dir.display()
            );
            return Ok(());
        }

        let indices: BTreeSet<u32> = if only_used {
            self.patches.iter().flat_map(|p| p.cameras()).collect()
        } else if self.patches.is_empty() {
            BTreeSet::new()
        } else {
            (0..=self.max_camera_index).collect()
        };

        for idx in indices {
            let camera = crate::io::pmvs_camera::read_pmvs_camera(
                cameras_dir.join(format!("{idx:08}.txt")),
            )?;
            self.cameras.insert(idx, camera);
            self.image_filenames
                .insert(idx, images_dir.join(format!("{idx:08}.jpg")));
        }

        log::info!(
            "Loaded {} cameras from {}",
            self.cameras.len(),
            cameras_dir.display()
        );
        Ok(())
    }
}

/// Heuristic check on a patch set loaded without its options file: true if
/// every good camera index is one of the `timages` of `options`, i.e. the
/// indices already look like original image indices.
pub fn looks_remapped(patch_set: &PatchSet, options: &PmvsOptions) -> bool {
    let timages: BTreeSet<u32> = options.timages.iter().copied().collect();
    patch_set
        .patches
        .iter()
        .flat_map(|p| p.good_cameras.iter())
        .all(|cam| timages.contains(cam))
}
