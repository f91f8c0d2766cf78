use super::retain_cameras;
use crate::{bundler::BundleReconstruction, error::SfmError};

/// Remove the points seen by fewer than `min_cameras` cameras.
///
/// # Returns
///
/// The number of removed points.
pub fn filter_points_by_visibility(recon: &mut BundleReconstruction, min_cameras: usize) -> usize {
    let n_before = recon.points.len();
    recon.points.retain(|p| p.views.len() >= min_cameras);
    let n_removed = n_before - recon.points.len();
    if n_removed > 0 {
        recon.invalidate_visibility_index();
    }
    log::info!(
        "Removed {} of {} points seen by fewer than {} cameras",
        n_removed,
        n_before,
        min_cameras
    );
    n_removed
}

/// Remove the cameras at `indices`, renumbering the view entries of the
/// remaining ones. Duplicated indices are removed once.
///
/// # Errors
///
/// Fails without touching the reconstruction if an index is out of range.
pub fn remove_cameras(recon: &mut BundleReconstruction, indices: &[usize]) -> Result<(), SfmError> {
    let n_cameras = recon.n_cameras();
    let mut keep = vec![true; n_cameras];
    for &idx in indices {
        match keep.get_mut(idx) {
            Some(flag) => *flag = false,
            None => {
                return Err(SfmError::CameraIndexOutOfRange {
                    context: "camera removal list".to_string(),
                    camera: idx as i64,
                    n_cameras,
                })
            }
        }
    }
    retain_cameras(recon, &keep);
    log::info!("Removed {} cameras", n_cameras - recon.n_cameras());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::test_utils::recon_with_views;

    #[test]
    fn test_filter_points_by_visibility() {
        let mut recon = recon_with_views(&["a", "b", "c"], &[&[0], &[0, 1], &[], &[0, 1, 2]]);
        recon.build_visibility_index();

        assert_eq!(filter_points_by_visibility(&mut recon, 2), 2);
        assert_eq!(recon.n_points(), 2);
        assert_eq!(recon.points()[0].position, [1.0, 0.0, -1.0]);
        assert_eq!(recon.points()[1].position, [3.0, 0.0, -1.0]);
        assert!(!recon.has_visibility_index());
        assert_eq!(recon.points_seen_by_camera(2).len(), 1);

        assert_eq!(filter_points_by_visibility(&mut recon, 0), 0);
    }

    #[test]
    fn test_remove_cameras() -> Result<(), Box<dyn std::error::Error>> {
        let mut recon = recon_with_views(&["a", "b", "c", "d"], &[&[0, 1, 3], &[2]]);
        remove_cameras(&mut recon, &[1, 2, 1])?;

        assert_eq!(recon.n_cameras(), 2);
        assert_eq!(recon.image_filenames(), Some(&["a".to_string(), "d".to_string()][..]));
        let cams: Vec<_> = recon.points()[0].views.iter().map(|v| v.camera).collect();
        assert_eq!(cams, vec![0, 1]);
        assert!(recon.points()[1].views.is_empty());
        Ok(())
    }

    #[test]
    fn test_stray_view_entries_are_dropped() -> Result<(), Box<dyn std::error::Error>> {
        let mut recon = recon_with_views(&["a", "b"], &[&[0, 1]]);
        recon.points_mut()[0].views[0].camera = 9;
        recon.rebuild_visibility_index();
        assert!(recon.points_seen_by_camera(0).is_empty());
        assert_eq!(recon.points_seen_by_camera(1).len(), 1);

        remove_cameras(&mut recon, &[0])?;
        let cams: Vec<_> = recon.points()[0].views.iter().map(|v| v.camera).collect();
        assert_eq!(cams, vec![0]);
        Ok(())
    }

    #[test]
    fn test_remove_cameras_out_of_range() {
        let mut recon = recon_with_views(&["a", "b"], &[&[0, 1]]);
        assert!(matches!(
            remove_cameras(&mut recon, &[0, 5]),
            Err(SfmError::CameraIndexOutOfRange { camera: 5, n_cameras: 2, .. })
        ));
        assert_eq!(recon.n_cameras(), 2);
    }
}
