use std::collections::HashMap;

use super::{image_basename, retain_cameras, DuplicatePolicy};
use crate::{bundler::BundleReconstruction, error::SfmError};

/// Keep a single camera per image basename.
///
/// View entries are renumbered, entries of removed cameras are dropped and
/// the surviving cameras keep their relative order.
///
/// # Returns
///
/// The number of removed cameras.
///
/// # Errors
///
/// Fails if the reconstruction has no image filenames.
pub fn remove_duplicate_cameras(
    recon: &mut BundleReconstruction,
    policy: DuplicatePolicy,
) -> Result<usize, SfmError> {
    let n_cameras = recon.n_cameras();
    let names = recon
        .image_filenames()
        .ok_or(SfmError::MissingImageList(n_cameras))?
        .to_vec();

    recon.build_visibility_index();
    let n_visible = recon
        .visibility_index()
        .map(|index| index.iter().map(Vec::len).collect::<Vec<_>>())
        .unwrap_or_else(|| vec![0; n_cameras]);

    let mut selected: HashMap<&str, usize> = HashMap::new();
    for (cam, name) in names.iter().enumerate() {
        let kept = selected.entry(image_basename(name)).or_insert(cam);
        if policy == DuplicatePolicy::MostVisible && n_visible[cam] > n_visible[*kept] {
            *kept = cam;
        }
    }

    let mut keep = vec![false; n_cameras];
    for &cam in selected.values() {
        keep[cam] = true;
    }

    let n_removed = n_cameras - selected.len();
    retain_cameras(recon, &keep);
    log::info!("Keeping {} of {} cameras", selected.len(), n_cameras);
    Ok(n_removed)
}
