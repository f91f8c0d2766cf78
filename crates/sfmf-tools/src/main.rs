use std::path::{Path, PathBuf};

use argh::FromArgs;

use sfmf::{
    bundler::BundleReconstruction,
    ops::{self, DuplicatePolicy, MergeOptions, SimilarityTransform},
    pmvs::{looks_remapped, PatchLoadOptions, PatchSet, PmvsOptions},
    pointcloud::PointCloud,
};

#[derive(FromArgs, Debug)]
/// Inspect, combine and convert Bundler and PMVS reconstructions.
struct Args {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
enum Command {
    BundleInfo(BundleInfo),
    BundleMerge(BundleMerge),
    BundleRmdups(BundleRmdups),
    BundleFilter(BundleFilter),
    BundleTransform(BundleTransform),
    BundleToPly(BundleToPly),
    PatchInfo(PatchInfo),
    PatchMerge(PatchMerge),
    PatchTransform(PatchTransform),
    PatchToBundle(PatchToBundle),
    PatchToPly(PatchToPly),
    PatchCheckRemapped(PatchCheckRemapped),
}

#[derive(FromArgs, Debug)]
/// Print a JSON summary of a bundle file.
#[argh(subcommand, name = "bundle-info")]
struct BundleInfo {
    /// path to the bundle file
    #[argh(option, short = 'i')]
    input: PathBuf,

    /// also dump every camera
    #[argh(switch)]
    cameras: bool,
}

#[derive(FromArgs, Debug)]
/// Merge bundle files reconstructing the same points.
#[argh(subcommand, name = "bundle-merge")]
struct BundleMerge {
    /// bundle file to merge, repeat for every input
    #[argh(option, short = 'b')]
    bundle: Vec<PathBuf>,

    /// list file of the matching bundle, repeat for every input
    #[argh(option, short = 'l')]
    list: Vec<PathBuf>,

    /// path to the merged bundle file
    #[argh(option, short = 'o')]
    output: PathBuf,

    /// path to the merged list file
    #[argh(option)]
    list_output: PathBuf,

    /// keep the duplicate camera seeing the most points
    #[argh(switch)]
    most_visible: bool,

    /// do not add the view entries of the other inputs
    #[argh(switch)]
    no_visibility: bool,
}

#[derive(FromArgs, Debug)]
/// Remove cameras sharing an image basename.
#[argh(subcommand, name = "bundle-rmdups")]
struct BundleRmdups {
    /// path to the bundle file
    #[argh(option, short = 'i')]
    input: PathBuf,

    /// path to the list file
    #[argh(option, short = 'l')]
    list: PathBuf,

    /// path to the output bundle file
    #[argh(option, short = 'o')]
    output: PathBuf,

    /// path to the output list file
    #[argh(option)]
    list_output: PathBuf,

    /// keep the duplicate camera seeing the most points
    #[argh(switch)]
    most_visible: bool,
}

#[derive(FromArgs, Debug)]
/// Remove cameras and points seen by too few cameras.
#[argh(subcommand, name = "bundle-filter")]
struct BundleFilter {
    /// path to the bundle file
    #[argh(option, short = 'i')]
    input: PathBuf,

    /// path to the output bundle file
    #[argh(option, short = 'o')]
    output: PathBuf,

    /// minimum number of cameras seeing a point
    #[argh(option, short = 'n', default = "0")]
    min_cameras: usize,

    /// index of a camera to remove, can be repeated
    #[argh(option)]
    remove_camera: Vec<usize>,

    /// path to the list file, filtered along with the cameras
    #[argh(option, short = 'l')]
    list: Option<PathBuf>,

    /// path to the output list file
    #[argh(option)]
    list_output: Option<PathBuf>,
}

#[derive(FromArgs, Debug)]
/// Apply a similarity transform to a bundle file.
#[argh(subcommand, name = "bundle-transform")]
struct BundleTransform {
    /// path to the bundle file
    #[argh(option, short = 'i')]
    input: PathBuf,

    /// path to the 3x4 transform file
    #[argh(option, short = 't')]
    transform: PathBuf,

    /// path to the output bundle file
    #[argh(option, short = 'o')]
    output: PathBuf,
}

#[derive(FromArgs, Debug)]
/// Export the points of a bundle file as a PLY file.
#[argh(subcommand, name = "bundle-to-ply")]
struct BundleToPly {
    /// path to the bundle file
    #[argh(option, short = 'i')]
    input: PathBuf,

    /// path to the PLY file
    #[argh(option, short = 'o')]
    output: PathBuf,

    /// color the points by whether this camera sees them
    #[argh(option, short = 'c')]
    camera: Option<usize>,
}

#[derive(FromArgs, Debug)]
/// Print a JSON summary of a patch file.
#[argh(subcommand, name = "patch-info")]
struct PatchInfo {
    /// path to the patch file
    #[argh(option, short = 'i')]
    input: PathBuf,

    /// do not remap the cameras through the options file
    #[argh(switch)]
    no_options: bool,
}

#[derive(FromArgs, Debug)]
/// Concatenate patch files.
#[argh(subcommand, name = "patch-merge")]
struct PatchMerge {
    /// patch file to merge, repeat for every input
    #[argh(option, short = 'i')]
    input: Vec<PathBuf>,

    /// path to the merged patch file
    #[argh(option, short = 'o')]
    output: PathBuf,
}

#[derive(FromArgs, Debug)]
/// Apply a similarity transform to a patch file.
#[argh(subcommand, name = "patch-transform")]
struct PatchTransform {
    /// path to the patch file
    #[argh(option, short = 'i')]
    input: PathBuf,

    /// path to the 3x4 transform file
    #[argh(option, short = 't')]
    transform: PathBuf,

    /// path to the output patch file
    #[argh(option, short = 'o')]
    output: PathBuf,
}

#[derive(FromArgs, Debug)]
/// Build a bundle file from the patches of a PMVS run.
#[argh(subcommand, name = "patch-to-bundle")]
struct PatchToBundle {
    /// path to the patch file
    #[argh(option, short = 'p')]
    patches: PathBuf,

    /// bundle file providing the cameras
    #[argh(option, short = 'b')]
    bundle: PathBuf,

    /// path to the output bundle file
    #[argh(option, short = 'o')]
    output: PathBuf,

    /// list file of the input bundle, copied to the output
    #[argh(option, short = 'l')]
    list: Option<PathBuf>,

    /// path to the output list file
    #[argh(option)]
    list_output: Option<PathBuf>,

    /// also add view entries for the bad cameras
    #[argh(switch)]
    include_bad: bool,
}

#[derive(FromArgs, Debug)]
/// Export the patches of a patch file as an oriented PLY file.
#[argh(subcommand, name = "patch-to-ply")]
struct PatchToPly {
    /// path to the patch file
    #[argh(option, short = 'i')]
    input: PathBuf,

    /// path to the PLY file
    #[argh(option, short = 'o')]
    output: PathBuf,
}

#[derive(FromArgs, Debug)]
/// Check whether the camera indices of a patch file look remapped.
#[argh(subcommand, name = "patch-check-remapped")]
struct PatchCheckRemapped {
    /// path to the patch file
    #[argh(option, short = 'p')]
    patches: PathBuf,

    /// path to the PMVS options file
    #[argh(option)]
    options: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    match args.command {
        Command::BundleInfo(args) => bundle_info(args),
        Command::BundleMerge(args) => bundle_merge(args),
        Command::BundleRmdups(args) => bundle_rmdups(args),
        Command::BundleFilter(args) => bundle_filter(args),
        Command::BundleTransform(args) => bundle_transform(args),
        Command::BundleToPly(args) => bundle_to_ply(args),
        Command::PatchInfo(args) => patch_info(args),
        Command::PatchMerge(args) => patch_merge(args),
        Command::PatchTransform(args) => patch_transform(args),
        Command::PatchToBundle(args) => patch_to_bundle(args),
        Command::PatchToPly(args) => patch_to_ply(args),
        Command::PatchCheckRemapped(args) => patch_check_remapped(args),
    }
}

fn policy(most_visible: bool) -> DuplicatePolicy {
    if most_visible {
        DuplicatePolicy::MostVisible
    } else {
        DuplicatePolicy::FirstWins
    }
}

fn input_comment(path: &Path) -> String {
    format!("Input filename: {}", path.display())
}

fn bundle_info(args: BundleInfo) -> Result<(), Box<dyn std::error::Error>> {
    let recon = BundleReconstruction::load(&args.input)?;
    let bounds = PointCloud::from_bundle(&recon).bounds();

    let mut info = serde_json::json!({
        "path": args.input,
        "n_cameras": recon.n_cameras(),
        "n_valid_cameras": recon.n_valid_cameras(),
        "n_points": recon.n_points(),
        "n_views": recon.points().iter().map(|p| p.views.len()).sum::<usize>(),
        "bounds": bounds,
    });
    if args.cameras {
        info["cameras"] = serde_json::to_value(recon.cameras())?;
    }

    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn bundle_merge(args: BundleMerge) -> Result<(), Box<dyn std::error::Error>> {
    if args.bundle.len() != args.list.len() {
        return Err(format!(
            "got {} bundle files but {} list files",
            args.bundle.len(),
            args.list.len()
        )
        .into());
    }

    let inputs: Vec<(PathBuf, PathBuf)> = args.bundle.into_iter().zip(args.list).collect();
    let options = MergeOptions {
        policy: policy(args.most_visible),
        update_visibility: !args.no_visibility,
    };
    let merged = ops::merge_bundle_files(&inputs, &options)?;

    merged.save(&args.output)?;
    merged.write_list_file(&args.list_output)?;
    Ok(())
}

fn bundle_rmdups(args: BundleRmdups) -> Result<(), Box<dyn std::error::Error>> {
    let mut recon = BundleReconstruction::load(&args.input)?;
    recon.read_list_file(&args.list)?;

    let n_removed = ops::remove_duplicate_cameras(&mut recon, policy(args.most_visible))?;
    log::info!("Removed {n_removed} duplicated cameras");

    recon.save(&args.output)?;
    recon.write_list_file(&args.list_output)?;
    Ok(())
}

fn bundle_filter(args: BundleFilter) -> Result<(), Box<dyn std::error::Error>> {
    let mut recon = BundleReconstruction::load(&args.input)?;
    if let Some(list) = &args.list {
        recon.read_list_file(list)?;
    }

    ops::remove_cameras(&mut recon, &args.remove_camera)?;
    ops::filter_points_by_visibility(&mut recon, args.min_cameras);

    recon.save(&args.output)?;
    if let Some(list_output) = &args.list_output {
        recon.write_list_file(list_output)?;
    }
    Ok(())
}

fn bundle_transform(args: BundleTransform) -> Result<(), Box<dyn std::error::Error>> {
    let transform = SimilarityTransform::load(&args.transform)?;
    let mut recon = BundleReconstruction::load(&args.input)?;
    ops::transform_bundle(&mut recon, &transform);
    recon.save(&args.output)?;
    Ok(())
}

fn bundle_to_ply(args: BundleToPly) -> Result<(), Box<dyn std::error::Error>> {
    let mut recon = BundleReconstruction::load(&args.input)?;
    let mut comments = vec![input_comment(&args.input)];

    let cloud = match args.camera {
        Some(camera) => {
            comments.push(format!("Points seen by camera {camera} are green"));
            ops::color_points_seen_by_camera(&mut recon, camera)?
        }
        None => PointCloud::from_bundle(&recon),
    };

    sfmf::io::ply::write_ply_ascii(&args.output, &cloud, &comments)?;
    Ok(())
}

fn patch_info(args: PatchInfo) -> Result<(), Box<dyn std::error::Error>> {
    let load_options = PatchLoadOptions {
        load_options_file: !args.no_options,
    };
    let patch_set = PatchSet::load(&args.input, &load_options)?;

    let info = serde_json::json!({
        "path": args.input,
        "n_patches": patch_set.n_patches(),
        "n_cameras": patch_set.n_cameras(),
        "indexing": patch_set.indexing(),
        "max_camera_index": patch_set.max_camera_index(),
        "good_cameras": patch_set.good_camera_stats(),
        "bad_cameras": patch_set.bad_camera_stats(),
        "bounds": PointCloud::from_patches(&patch_set).bounds(),
    });

    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn patch_merge(args: PatchMerge) -> Result<(), Box<dyn std::error::Error>> {
    let load_options = PatchLoadOptions::default();
    let mut inputs = args.input.iter();
    let Some(first) = inputs.next() else {
        return Err("no patch file to merge".into());
    };

    let mut merged = PatchSet::load(first, &load_options)?;
    for path in inputs {
        merged.merge_with(PatchSet::load(path, &load_options)?)?;
    }

    log::info!(
        "Merged {} patch files into {} patches",
        args.input.len(),
        merged.n_patches()
    );
    merged.save(&args.output)?;
    Ok(())
}

fn patch_transform(args: PatchTransform) -> Result<(), Box<dyn std::error::Error>> {
    let transform = SimilarityTransform::load(&args.transform)?;
    let load_options = PatchLoadOptions {
        load_options_file: false,
    };
    let mut patch_set = PatchSet::load(&args.input, &load_options)?;
    ops::transform_patches(&mut patch_set, &transform);
    patch_set.save(&args.output)?;
    Ok(())
}

fn patch_to_bundle(args: PatchToBundle) -> Result<(), Box<dyn std::error::Error>> {
    let patch_set = PatchSet::load(&args.patches, &PatchLoadOptions::default())?;
    let mut cameras_from = BundleReconstruction::load(&args.bundle)?;
    if let Some(list) = &args.list {
        cameras_from.read_list_file(list)?;
    }

    let recon = ops::patches_to_bundle(&patch_set, &cameras_from, args.include_bad)?;
    recon.save(&args.output)?;
    if let Some(list_output) = &args.list_output {
        recon.write_list_file(list_output)?;
    }
    Ok(())
}

fn patch_to_ply(args: PatchToPly) -> Result<(), Box<dyn std::error::Error>> {
    let patch_set = PatchSet::load(&args.input, &PatchLoadOptions::default())?;
    let cloud = PointCloud::from_patches(&patch_set);
    sfmf::io::ply::write_ply_ascii(&args.output, &cloud, &[input_comment(&args.input)])?;
    Ok(())
}

fn patch_check_remapped(args: PatchCheckRemapped) -> Result<(), Box<dyn std::error::Error>> {
    let load_options = PatchLoadOptions {
        load_options_file: false,
    };
    let patch_set = PatchSet::load(&args.patches, &load_options)?;
    let options = PmvsOptions::load(&args.options)?;

    let remapped = looks_remapped(&patch_set, &options);
    let info = serde_json::json!({
        "path": args.patches,
        "n_patches": patch_set.n_patches(),
        "n_timages": options.timages.len(),
        "looks_remapped": remapped,
    });
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
