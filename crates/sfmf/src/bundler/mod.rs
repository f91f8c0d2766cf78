mod camera;

pub use camera::{pmvs_pixel_from_bundler, BundlerCamera, ImageProjection, VALID_ROTATION_TOLERANCE};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SfmError;

/// One observation of a point by a camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewEntry {
    /// Index of the observing camera.
    pub camera: u32,
    /// Index of the feature in the key file of the camera, -1 if unknown.
    pub key: i32,
    /// Feature position relative to the image center, y up.
    pub key_position: [f64; 2],
}

impl ViewEntry {
    /// Create a new view entry.
    pub fn new(camera: u32, key: i32, key_position: [f64; 2]) -> Self {
        Self {
            camera,
            key,
            key_position,
        }
    }
}

/// A sparse 3D point with its color and observations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BundlerPoint {
    /// Position in world space.
    pub position: [f64; 3],
    /// RGB color.
    pub color: [u8; 3],
    /// The cameras observing the point, in file order.
    pub views: Vec<ViewEntry>,
}

/// A reference from a camera back to one of the view entries naming it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisibilityEntry {
    /// Index of the point.
    pub point: usize,
    /// Index of the view entry within the view list of the point.
    pub slot: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
enum VisibilityIndex {
    #[default]
    Stale,
    Built(Vec<Vec<VisibilityEntry>>),
}

/// A sparse reconstruction: cameras, points and optionally the image names.
///
/// Cameras and points live in plain arrays and reference each other by
/// index. The camera to point visibility index is a cache built on demand;
/// the structural methods of this type mark it stale, but changes made
/// through [`Self::cameras_mut`] or [`Self::points_mut`] are not tracked and
/// the caller must call [`Self::rebuild_visibility_index`] afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleReconstruction {
    pub(crate) cameras: Vec<BundlerCamera>,
    pub(crate) points: Vec<BundlerPoint>,
    pub(crate) image_filenames: Option<Vec<String>>,
    visibility: VisibilityIndex,
}

pub(crate) fn check_view_cameras(
    point_index: usize,
    point: &BundlerPoint,
    n_cameras: usize,
) -> Result<(), SfmError> {
    for view in point.views.iter() {
        if view.camera as usize >= n_cameras {
            return Err(SfmError::CameraIndexOutOfRange {
                context: format!("point {point_index}"),
                camera: view.camera as i64,
                n_cameras,
            });
        }
    }
    Ok(())
}

impl BundleReconstruction {
    /// Create an empty reconstruction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a reconstruction from cameras and points.
    ///
    /// # Errors
    ///
    /// Fails if a view entry names a camera outside `cameras`.
    pub fn from_parts(
        cameras: Vec<BundlerCamera>,
        points: Vec<BundlerPoint>,
    ) -> Result<Self, SfmError> {
        for (i, point) in points.iter().enumerate() {
            check_view_cameras(i, point, cameras.len())?;
        }
        Ok(Self {
            cameras,
            points,
            image_filenames: None,
            visibility: VisibilityIndex::Stale,
        })
    }

    /// Read a bundle file. See [`crate::io::bundler::read_bundle`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SfmError> {
        crate::io::bundler::read_bundle(path)
    }

    /// Read a bundle file, logging the error and returning `None` on failure.
    pub fn open(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(recon) => Some(recon),
            Err(e) => {
                log::warn!("Cannot load bundle file {}: {e}", path.display());
                None
            }
        }
    }

    /// Write the reconstruction as a bundle file, gzip compressed if the
    /// path ends in `.gz`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SfmError> {
        crate::io::bundler::write_bundle(self, path)
    }

    /// The cameras.
    pub fn cameras(&self) -> &[BundlerCamera] {
        &self.cameras
    }

    /// The points.
    pub fn points(&self) -> &[BundlerPoint] {
        &self.points
    }

    /// Mutable access to the cameras.
    ///
    /// PRECONDITION: rebuild the visibility index after structural changes.
    pub fn cameras_mut(&mut self) -> &mut [BundlerCamera] {
        &mut self.cameras
    }

    /// Mutable access to the points.
    ///
    /// PRECONDITION: rebuild the visibility index after changing view lists.
    pub fn points_mut(&mut self) -> &mut [BundlerPoint] {
        &mut self.points
    }

    /// Number of cameras, valid or not.
    #[inline]
    pub fn n_cameras(&self) -> usize {
        self.cameras.len()
    }

    /// Number of points.
    #[inline]
    pub fn n_points(&self) -> usize {
        self.points.len()
    }

    /// Number of cameras that bundler managed to reconstruct.
    pub fn n_valid_cameras(&self) -> usize {
        self.cameras.iter().filter(|c| c.is_valid()).count()
    }

    /// Append a camera and return its index.
    pub fn push_camera(&mut self, camera: BundlerCamera) -> usize {
        self.cameras.push(camera);
        if let Some(names) = self.image_filenames.as_mut() {
            names.push(String::new());
        }
        self.visibility = VisibilityIndex::Stale;
        self.cameras.len() - 1
    }

    /// Append a point and return its index.
    ///
    /// # Errors
    ///
    /// Fails if a view entry names an unknown camera.
    pub fn push_point(&mut self, point: BundlerPoint) -> Result<usize, SfmError> {
        check_view_cameras(self.points.len(), &point, self.cameras.len())?;
        self.points.push(point);
        self.visibility = VisibilityIndex::Stale;
        Ok(self.points.len() - 1)
    }

    /// The image filenames, one per camera, if a list file was loaded.
    pub fn image_filenames(&self) -> Option<&[String]> {
        self.image_filenames.as_deref()
    }

    /// The image filename of one camera, if known.
    pub fn image_filename(&self, camera: usize) -> Option<&str> {
        self.image_filenames
            .as_ref()
            .and_then(|names| names.get(camera))
            .map(String::as_str)
    }

    /// Set the image filenames.
    ///
    /// # Errors
    ///
    /// Fails unless there is exactly one name per camera.
    pub fn set_image_filenames(&mut self, names: Vec<String>) -> Result<(), SfmError> {
        if names.len() != self.cameras.len() {
            return Err(SfmError::ListFileLength {
                path: Default::default(),
                n_lines: names.len(),
                n_cameras: self.cameras.len(),
            });
        }
        self.image_filenames = Some(names);
        Ok(())
    }

    /// Read the image filenames from a list file.
    /// See [`crate::io::list::read_list_file`].
    pub fn read_list_file(&mut self, path: impl AsRef<Path>) -> Result<(), SfmError> {
        let path = path.as_ref();
        let names = crate::io::list::read_list_file(path)?;
        if names.len() != self.cameras.len() {
            return Err(SfmError::ListFileLength {
                path: path.to_path_buf(),
                n_lines: names.len(),
                n_cameras: self.cameras.len(),
            });
        }
        log::info!("Read {} image filenames from {}", names.len(), path.display());
        self.image_filenames = Some(names);
        Ok(())
    }

    /// Write the image filenames as a list file.
    pub fn write_list_file(&self, path: impl AsRef<Path>) -> Result<(), SfmError> {
        let names = self
            .image_filenames
            .as_ref()
            .ok_or(SfmError::MissingImageList(self.cameras.len()))?;
        crate::io::list::write_list_file(path, names)
    }

    /// Write the bundler focal length list: `<image> 0 <focal>` per camera,
    /// with a focal length of 0 for cameras that were not reconstructed.
    pub fn write_focal_list_file(&self, path: impl AsRef<Path>) -> Result<(), SfmError> {
        let names = self
            .image_filenames
            .as_ref()
            .ok_or(SfmError::MissingImageList(self.cameras.len()))?;
        let focals = self
            .cameras
            .iter()
            .map(|c| if c.is_valid() { c.focal_length } else { 0.0 })
            .collect::<Vec<_>>();
        crate::io::list::write_focal_list_file(path, names, &focals)
    }

    /// Build the camera to point visibility index. Does nothing if it is
    /// already built.
    pub fn build_visibility_index(&mut self) {
        if matches!(self.visibility, VisibilityIndex::Built(_)) {
            return;
        }

        let mut index = vec![Vec::new(); self.cameras.len()];
        for (point, p) in self.points.iter().enumerate() {
            for (slot, view) in p.views.iter().enumerate() {
                match index.get_mut(view.camera as usize) {
                    Some(list) => list.push(VisibilityEntry { point, slot }),
                    // only reachable through points_mut
                    None => log::warn!(
                        "Point {point} names camera {} of {}, left out of the visibility index",
                        view.camera,
                        self.cameras.len()
                    ),
                }
            }
        }

        log::debug!(
            "Built visibility index for {} cameras and {} points",
            self.cameras.len(),
            self.points.len()
        );
        self.visibility = VisibilityIndex::Built(index);
    }

    /// Mark the visibility index as stale.
    pub fn invalidate_visibility_index(&mut self) {
        self.visibility = VisibilityIndex::Stale;
    }

    /// Drop and rebuild the visibility index.
    pub fn rebuild_visibility_index(&mut self) {
        self.invalidate_visibility_index();
        self.build_visibility_index();
    }

    /// Whether the visibility index is built.
    pub fn has_visibility_index(&self) -> bool {
        matches!(self.visibility, VisibilityIndex::Built(_))
    }

    /// The visibility index, one list per camera, if built.
    pub fn visibility_index(&self) -> Option<&[Vec<VisibilityEntry>]> {
        match &self.visibility {
            VisibilityIndex::Built(index) => Some(index),
            VisibilityIndex::Stale => None,
        }
    }

    /// The view entries that reference a camera, building the index if needed.
    pub fn points_seen_by_camera(&mut self, camera: usize) -> &[VisibilityEntry] {
        self.build_visibility_index();
        match &self.visibility {
            VisibilityIndex::Built(index) => index.get(camera).map(Vec::as_slice).unwrap_or_default(),
            VisibilityIndex::Stale => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_camera_recon() -> BundleReconstruction {
        let cameras = vec![
            BundlerCamera {
                focal_length: 500.0,
                ..Default::default()
            },
            BundlerCamera {
                focal_length: 600.0,
                translation: [1.0, 0.0, 0.0],
                ..Default::default()
            },
        ];
        let points = vec![
            BundlerPoint {
                position: [0.0, 0.0, -1.0],
                color: [255, 0, 0],
                views: vec![
                    ViewEntry::new(0, 3, [1.0, 2.0]),
                    ViewEntry::new(1, -1, [0.5, -0.5]),
                ],
            },
            BundlerPoint {
                position: [1.0, 1.0, -2.0],
                color: [0, 255, 0],
                views: vec![ViewEntry::new(1, 7, [-3.0, 4.0])],
            },
        ];
        BundleReconstruction::from_parts(cameras, points).expect("valid reconstruction")
    }

    #[test]
    fn test_from_parts_rejects_bad_camera() {
        let points = vec![BundlerPoint {
            views: vec![ViewEntry::new(2, -1, [0.0, 0.0])],
            ..Default::default()
        }];
        let res = BundleReconstruction::from_parts(vec![BundlerCamera::default()], points);
        assert!(matches!(
            res,
            Err(SfmError::CameraIndexOutOfRange { camera: 2, .. })
        ));
    }

    #[test]
    fn test_visibility_index() {
        let mut recon = two_camera_recon();
        assert!(recon.visibility_index().is_none());
        recon.build_visibility_index();

        let index = recon.visibility_index().expect("index built");
        assert_eq!(index.len(), 2);
        assert_eq!(index[0], vec![VisibilityEntry { point: 0, slot: 0 }]);
        assert_eq!(
            index[1],
            vec![
                VisibilityEntry { point: 0, slot: 1 },
                VisibilityEntry { point: 1, slot: 0 }
            ]
        );

        // both directions agree
        for (point, p) in recon.points().iter().enumerate() {
            for (slot, view) in p.views.iter().enumerate() {
                assert!(index[view.camera as usize].contains(&VisibilityEntry { point, slot }));
            }
        }
        let total: usize = index.iter().map(Vec::len).sum();
        let n_views: usize = recon.points().iter().map(|p| p.views.len()).sum();
        assert_eq!(total, n_views);
    }

    #[test]
    fn test_visibility_index_is_cached() -> Result<(), Box<dyn std::error::Error>> {
        let mut recon = two_camera_recon();
        recon.build_visibility_index();

        // unchecked mutation leaves the cache untouched until rebuilt
        recon.points_mut()[1].views.clear();
        recon.build_visibility_index();
        assert_eq!(recon.points_seen_by_camera(1).len(), 2);
        recon.rebuild_visibility_index();
        assert_eq!(recon.points_seen_by_camera(1).len(), 1);

        // structural changes mark it stale
        recon.push_point(BundlerPoint {
            views: vec![ViewEntry::new(0, -1, [0.0, 0.0])],
            ..Default::default()
        })?;
        assert!(!recon.has_visibility_index());
        assert_eq!(recon.points_seen_by_camera(0).len(), 2);
        assert!(recon.points_seen_by_camera(5).is_empty());
        Ok(())
    }

    #[test]
    fn test_image_filenames() {
        let mut recon = two_camera_recon();
        assert!(recon.image_filenames().is_none());
        assert!(matches!(
            recon.set_image_filenames(vec!["a.jpg".into()]),
            Err(SfmError::ListFileLength { .. })
        ));
        assert!(recon
            .set_image_filenames(vec!["a.jpg".into(), "b.jpg".into()])
            .is_ok());
        assert_eq!(recon.image_filename(1), Some("b.jpg"));
        assert_eq!(recon.n_valid_cameras(), 2);
    }
}
