use std::{io::Write, path::Path};

use super::{
    compressed::{read_file_text, OutputFile},
    tokens::Tokens,
};
use crate::{
    error::SfmError,
    pmvs::{
        default_options_path, CameraIndexing, Patch, PatchLoadOptions, PatchSet, PatchVariant,
        PmvsOptions, StatsAccumulator,
    },
};

/// The first token of every patch file.
pub const PATCH_FILE_HEADER: &str = "PATCHES";

// tag, position, normal, score and debug values, two camera counts
const PATCH_TOKENS: usize = 14;

/// Read a PMVS patch file, plain or gzip compressed.
///
/// With `options.load_options_file` set, the options file PMVS wrote next
/// to the patch file is looked up (see [`default_options_path`]) and, when
/// it exists, the camera indices are remapped through its `timages`.
///
/// # Arguments
///
/// * `path` - The path to the `.patch` file.
/// * `options` - Loading options.
///
/// # Returns
///
/// The patch set, in [`CameraIndexing::Mapped`] state if it was remapped.
pub fn read_patch_file(
    path: impl AsRef<Path>,
    options: &PatchLoadOptions,
) -> Result<PatchSet, SfmError> {
    let path = path.as_ref();
    let text = read_file_text(path)?;
    let mut set = parse_patches(&text)?;
    set.patch_path = Some(path.to_path_buf());
    log::info!("Read {} patches from {}", set.n_patches(), path.display());

    if options.load_options_file {
        match default_options_path(path) {
            Some(options_path) if options_path.is_file() => {
                log::info!("Found options file {}", options_path.display());
                let pmvs_options = PmvsOptions::load(&options_path)?;
                set.remap_cameras(&pmvs_options)?;
            }
            Some(options_path) => {
                log::info!("Could not find options file {}", options_path.display());
            }
            None => log::info!("Cannot derive an options file name from {}", path.display()),
        }
    }

    Ok(set)
}

/// Parse the content of a patch file.
///
/// Camera count statistics are gathered in the same pass. The result is in
/// [`CameraIndexing::Unmapped`] state.
pub fn parse_patches(text: &str) -> Result<PatchSet, SfmError> {
    let mut tokens = Tokens::new(text);

    let header = tokens.next_str()?;
    if header != PATCH_FILE_HEADER {
        return Err(SfmError::BadSignature {
            expected: PATCH_FILE_HEADER,
            found: header.to_string(),
        });
    }
    let n_patches: usize = tokens.parse("number of patches")?;

    tokens.section("patches", n_patches);
    let capacity = tokens.capacity_hint(n_patches, PATCH_TOKENS);
    let mut patches = Vec::with_capacity(capacity);
    let mut good_stats = StatsAccumulator::with_capacity(capacity);
    let mut bad_stats = StatsAccumulator::with_capacity(capacity);
    let mut max_camera_index = 0;
    for _ in 0..n_patches {
        let patch = parse_patch(&mut tokens)?;
        good_stats.accumulate(patch.good_cameras.len() as u32);
        bad_stats.accumulate(patch.bad_cameras.len() as u32);
        max_camera_index = patch.cameras().fold(max_camera_index, u32::max);
        patches.push(patch);
        tokens.record_done();
    }
    tokens.expect_end()?;

    let mut set = PatchSet::from_patches(Vec::new(), CameraIndexing::Unmapped);
    set.patches = patches;
    set.good_stats = good_stats.finish();
    set.bad_stats = bad_stats.finish();
    set.max_camera_index = max_camera_index;
    Ok(set)
}

fn parse_patch(tokens: &mut Tokens) -> Result<Patch, SfmError> {
    let tag = tokens.next_str()?;
    let extended = match tag {
        "PATCHS" => false,
        "PATCHPS" => true,
        _ => return Err(SfmError::UnknownPatchTag(tag.to_string())),
    };

    let position = tokens.parse_array("patch position")?;
    let normal = tokens.parse_array("patch normal")?;
    let color: [f32; 3] = if extended {
        tokens.parse_array("patch color")?
    } else {
        [0.0; 3]
    };
    let score = tokens.parse("patch score")?;
    let debug1 = tokens.parse("patch debug value")?;
    let debug2 = tokens.parse("patch debug value")?;

    let variant = if extended {
        PatchVariant::Extended {
            color,
            reconstruction_accuracy: tokens.parse("patch accuracy")?,
            reconstruction_s_level: tokens.parse("patch level")?,
        }
    } else {
        PatchVariant::Basic
    };

    let good_cameras = tokens.parse_counted("good cameras")?;
    let bad_cameras = tokens.parse_counted("bad cameras")?;

    Ok(Patch {
        position,
        normal,
        score,
        debug1,
        debug2,
        good_cameras,
        bad_cameras,
        variant,
    })
}

fn write_list<W: Write>(writer: &mut W, values: &[u32]) -> std::io::Result<()> {
    write!(writer, "{}", values.len())?;
    for v in values {
        write!(writer, " {v}")?;
    }
    writeln!(writer)
}

/// Serialize patches in the PMVS patch file format.
pub fn serialize_patches<W: Write>(patches: &[Patch], writer: &mut W) -> std::io::Result<()> {
    writeln!(writer, "{PATCH_FILE_HEADER}")?;
    writeln!(writer, "{}", patches.len())?;

    for patch in patches {
        writeln!(writer, "{}", patch.tag())?;
        let [px, py, pz, pw] = patch.position;
        writeln!(writer, "{px} {py} {pz} {pw}")?;
        let [nx, ny, nz, nw] = patch.normal;
        writeln!(writer, "{nx} {ny} {nz} {nw}")?;
        if let PatchVariant::Extended { color, .. } = &patch.variant {
            writeln!(writer, "{} {} {}", color[0], color[1], color[2])?;
        }
        writeln!(writer, "{} {} {}", patch.score, patch.debug1, patch.debug2)?;
        if let PatchVariant::Extended {
            reconstruction_accuracy,
            reconstruction_s_level,
            ..
        } = &patch.variant
        {
            writeln!(writer, "{reconstruction_accuracy} {reconstruction_s_level}")?;
        }
        write_list(writer, &patch.good_cameras)?;
        write_list(writer, &patch.bad_cameras)?;
        writeln!(writer)?;
    }

    Ok(())
}

/// Write a patch set to a patch file, gzip compressed if the path ends in
/// `.gz`.
pub fn write_patch_file(set: &PatchSet, path: impl AsRef<Path>) -> Result<(), SfmError> {
    let path = path.as_ref();
    let mut out = OutputFile::create(path)?;
    serialize_patches(set.patches(), &mut out)
        .and_then(|_| out.finish())
        .map_err(|e| SfmError::file(path, e))?;
    log::info!("Wrote {} patches to {}", set.n_patches(), path.display());
    Ok(())
}
