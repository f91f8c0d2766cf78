//! Operations on whole reconstructions: merging, de-duplication, filtering,
//! similarity transforms and format conversion.

mod convert;
mod dedup;
mod filter;
mod merge;
mod transform;

pub use convert::{color_points_seen_by_camera, patches_to_bundle, NOT_SEEN_COLOR, SEEN_COLOR};
pub use dedup::remove_duplicate_cameras;
pub use filter::{filter_points_by_visibility, remove_cameras};
pub use merge::{merge_bundle_files, merge_bundles, MergeOptions};
pub use transform::{transform_bundle, transform_patches, SimilarityTransform};

use std::path::Path;

use crate::bundler::BundleReconstruction;

/// Which camera to keep when several cameras share an image basename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Keep the first camera seen.
    #[default]
    FirstWins,
    /// Keep the camera with the most view entries, the first one on ties.
    MostVisible,
}

/// The file name component of an image path, the whole string if it has none.
pub(crate) fn image_basename(name: &str) -> &str {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(name)
}

/// Keep the cameras flagged in `keep`, renumbering the view entries and
/// dropping the ones that name removed cameras. Entries naming a camera
/// outside the array are dropped too.
///
/// PRECONDITION: `keep` has one flag per camera.
pub(crate) fn retain_cameras(recon: &mut BundleReconstruction, keep: &[bool]) {
    assert_eq!(keep.len(), recon.cameras.len());

    let mut new_index = vec![None; keep.len()];
    let mut next = 0u32;
    for (slot, &kept) in new_index.iter_mut().zip(keep) {
        if kept {
            *slot = Some(next);
            next += 1;
        }
    }

    let mut flags = keep.iter();
    recon.cameras.retain(|_| flags.next().copied().unwrap_or(false));
    if let Some(names) = recon.image_filenames.as_mut() {
        let mut flags = keep.iter();
        names.retain(|_| flags.next().copied().unwrap_or(false));
    }

    for point in recon.points.iter_mut() {
        point.views.retain_mut(|view| {
            match new_index.get(view.camera as usize).copied().flatten() {
                Some(idx) => {
                    view.camera = idx;
                    true
                }
                None => false,
            }
        });
    }

    recon.invalidate_visibility_index();
}

#[cfg(test)]
pub(crate) mod test_utils {
    use crate::bundler::{BundleReconstruction, BundlerCamera, BundlerPoint, ViewEntry};

    /// A reconstruction with one camera per name and a point seen by the
    /// cameras listed in `views`.
    pub fn recon_with_views(names: &[&str], views: &[&[u32]]) -> BundleReconstruction {
        let cameras = names
            .iter()
            .enumerate()
            .map(|(i, _)| BundlerCamera {
                focal_length: 100.0 + i as f64,
                ..Default::default()
            })
            .collect();
        let points = views
            .iter()
            .enumerate()
            .map(|(i, cams)| BundlerPoint {
                position: [i as f64, 0.0, -1.0],
                color: [i as u8, 0, 0],
                views: cams
                    .iter()
                    .map(|&c| ViewEntry::new(c, i as i32, [c as f64, i as f64]))
                    .collect(),
            })
            .collect();
        let mut recon =
            BundleReconstruction::from_parts(cameras, points).expect("valid reconstruction");
        recon
            .set_image_filenames(names.iter().map(|n| n.to_string()).collect())
            .expect("one name per camera");
        recon
    }
}
