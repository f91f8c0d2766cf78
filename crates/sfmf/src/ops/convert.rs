use crate::{
    bundler::{BundleReconstruction, BundlerPoint, ViewEntry},
    error::SfmError,
    pmvs::PatchSet,
    pointcloud::{color_to_u8, PointCloud},
};

/// Color of points seen by the selected camera.
pub const SEEN_COLOR: [u8; 3] = [100, 250, 100];

/// Color of points not seen by the selected camera.
pub const NOT_SEEN_COLOR: [u8; 3] = [250, 100, 100];

/// Build a sparse reconstruction from a patch set.
///
/// Every patch becomes a point with one view entry per good camera, and per
/// bad camera too if `include_bad_cameras` is set. View entries have no
/// keypoint: their key is `-1` and their position `(0, 0)`. Cameras and image
/// names are copied from `cameras_from`.
///
/// # Arguments
///
/// * `patch_set` - The patches, usually remapped to the bundle camera indices.
/// * `cameras_from` - The reconstruction the patch cameras refer to.
/// * `include_bad_cameras` - Also add view entries for the bad cameras.
///
/// # Errors
///
/// Fails if a patch names a camera outside `cameras_from`.
pub fn patches_to_bundle(
    patch_set: &PatchSet,
    cameras_from: &BundleReconstruction,
    include_bad_cameras: bool,
) -> Result<BundleReconstruction, SfmError> {
    let points = patch_set
        .patches()
        .iter()
        .map(|patch| {
            let n_bad = if include_bad_cameras {
                patch.bad_cameras.len()
            } else {
                0
            };
            let views = patch
                .cameras()
                .take(patch.good_cameras.len() + n_bad)
                .map(|cam| ViewEntry::new(cam, -1, [0.0, 0.0]))
                .collect();
            BundlerPoint {
                position: patch.point(),
                color: patch.color().map(color_to_u8).unwrap_or_default(),
                views,
            }
        })
        .collect();

    let mut recon = BundleReconstruction::from_parts(cameras_from.cameras().to_vec(), points)?;
    recon.image_filenames = cameras_from.image_filenames.clone();

    log::info!(
        "Converted {} patches into a bundle with {} cameras",
        recon.n_points(),
        recon.n_cameras()
    );
    Ok(recon)
}

/// The points of a reconstruction, colored by whether `camera` sees them.
///
/// # Errors
///
/// Fails if `camera` is not a camera of the reconstruction.
pub fn color_points_seen_by_camera(
    recon: &mut BundleReconstruction,
    camera: usize,
) -> Result<PointCloud, SfmError> {
    if camera >= recon.n_cameras() {
        return Err(SfmError::CameraIndexOutOfRange {
            context: "camera to highlight".to_string(),
            camera: camera as i64,
            n_cameras: recon.n_cameras(),
        });
    }

    let mut colors = vec![NOT_SEEN_COLOR; recon.n_points()];
    for entry in recon.points_seen_by_camera(camera) {
        colors[entry.point] = SEEN_COLOR;
    }

    let mut cloud = PointCloud::from_bundle(recon);
    cloud.set_colors(colors);
    Ok(cloud)
}
