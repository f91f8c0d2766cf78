use std::{collections::HashMap, path::Path};

use super::{image_basename, DuplicatePolicy};
use crate::{
    bundler::{BundleReconstruction, ViewEntry},
    error::SfmError,
};

/// Options for [`merge_bundles`].
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Which camera to keep among cameras with the same image basename.
    pub policy: DuplicatePolicy,
    /// Add view entries for the cameras taken from the other inputs. This
    /// requires every input to share the points of the first one.
    pub update_visibility: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            policy: DuplicatePolicy::FirstWins,
            update_visibility: true,
        }
    }
}

/// Merge reconstructions of the same points seen by different cameras.
///
/// The points and cameras of the first input are kept. Cameras of the other
/// inputs are added in order unless their image basename was already seen.
/// With [`DuplicatePolicy::MostVisible`] such a duplicate replaces the
/// earlier camera, in its slot, when it sees more points. Duplicates within
/// the first input are left to [`crate::ops::remove_duplicate_cameras`]. With `options.update_visibility` the view
/// entries of the kept cameras of every input are added to the points,
/// copying their key and key position.
///
/// # Errors
///
/// * [`SfmError::MissingImageList`] if an input has no image filenames.
/// * [`SfmError::PointCountMismatch`] if visibility is updated and an input
///   does not have as many points as the first one.
///
/// All checks happen before anything is merged.
pub fn merge_bundles(
    mut inputs: Vec<BundleReconstruction>,
    options: &MergeOptions,
) -> Result<BundleReconstruction, SfmError> {
    let Some(first) = inputs.first() else {
        return Ok(BundleReconstruction::new());
    };
    let n_points = first.n_points();
    for input in inputs.iter() {
        if input.image_filenames().is_none() {
            return Err(SfmError::MissingImageList(input.n_cameras()));
        }
        if options.update_visibility && input.n_points() != n_points {
            return Err(SfmError::PointCountMismatch {
                expected: n_points,
                found: input.n_points(),
            });
        }
    }

    for input in inputs.iter_mut() {
        input.build_visibility_index();
    }

    let n_visible = |input: &BundleReconstruction, cam: usize| {
        input.visibility_index().map_or(0, |index| index[cam].len())
    };

    // every camera of the first input is kept, then one (input, camera) per
    // new basename in order of first appearance
    let mut winners: Vec<(usize, usize)> = Vec::new();
    let mut by_basename: HashMap<String, usize> = HashMap::new();
    for (cam, name) in inputs[0].image_filenames().unwrap_or_default().iter().enumerate() {
        by_basename
            .entry(image_basename(name).to_string())
            .or_insert(winners.len());
        winners.push((0, cam));
    }
    for (k, input) in inputs.iter().enumerate().skip(1) {
        for (cam, name) in input.image_filenames().unwrap_or_default().iter().enumerate() {
            let basename = image_basename(name).to_string();
            match by_basename.get(&basename) {
                None => {
                    by_basename.insert(basename, winners.len());
                    winners.push((k, cam));
                }
                Some(&pos) => {
                    let (wk, wcam) = winners[pos];
                    if options.policy == DuplicatePolicy::MostVisible
                        && n_visible(input, cam) > n_visible(&inputs[wk], wcam)
                    {
                        winners[pos] = (k, cam);
                    }
                }
            }
        }
    }

    // old camera index -> new camera index, per input
    let mut new_index: Vec<Vec<Option<u32>>> =
        inputs.iter().map(|input| vec![None; input.n_cameras()]).collect();
    for (new, &(k, cam)) in winners.iter().enumerate() {
        new_index[k][cam] = Some(new as u32);
    }

    let cameras = winners
        .iter()
        .map(|&(k, cam)| inputs[k].cameras()[cam].clone())
        .collect();
    let names = winners
        .iter()
        .map(|&(k, cam)| inputs[k].image_filename(cam).unwrap_or_default().to_string())
        .collect();

    let mut points = inputs[0].points().to_vec();
    for point in points.iter_mut() {
        point.views.retain_mut(|view| {
            match new_index[0].get(view.camera as usize).copied().flatten() {
                Some(idx) => {
                    view.camera = idx;
                    true
                }
                None => false,
            }
        });
    }

    if options.update_visibility {
        for (k, input) in inputs.iter().enumerate().skip(1) {
            let Some(index) = input.visibility_index() else {
                continue;
            };
            for (cam, entries) in index.iter().enumerate() {
                let Some(new) = new_index[k][cam] else {
                    continue;
                };
                for entry in entries {
                    let source = &input.points()[entry.point].views[entry.slot];
                    points[entry.point]
                        .views
                        .push(ViewEntry::new(new, source.key, source.key_position));
                }
            }
        }
    }

    let mut merged = BundleReconstruction::from_parts(cameras, points)?;
    merged.set_image_filenames(names)?;

    log::info!(
        "Merged {} reconstructions into {} cameras and {} points",
        inputs.len(),
        merged.n_cameras(),
        merged.n_points()
    );
    Ok(merged)
}

/// Load `(bundle file, list file)` pairs and merge them with
/// [`merge_bundles`]. Every input is loaded and checked before merging.
pub fn merge_bundle_files<P: AsRef<Path>>(
    inputs: &[(P, P)],
    options: &MergeOptions,
) -> Result<BundleReconstruction, SfmError> {
    let mut recons = Vec::with_capacity(inputs.len());
    for (i, (bundle_path, list_path)) in inputs.iter().enumerate() {
        log::info!(
            "[{}/{}] Loading {}",
            i + 1,
            inputs.len(),
            bundle_path.as_ref().display()
        );
        let mut recon = BundleReconstruction::load(bundle_path)?;
        recon.read_list_file(list_path)?;
        recons.push(recon);
    }
    merge_bundles(recons, options)
}
