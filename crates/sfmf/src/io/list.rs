use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use crate::error::SfmError;

/// Read a list file: the first whitespace delimited token of every line.
///
/// Bundler list files may carry extra columns such as a focal length after
/// the image name; these are ignored. Blank lines are skipped.
///
/// # Arguments
///
/// * `path` - The path to the list file.
///
/// # Returns
///
/// The image filenames in line order.
pub fn read_list_file(path: impl AsRef<Path>) -> Result<Vec<String>, SfmError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| SfmError::file(path, e))?;
    let reader = BufReader::new(file);

    let mut names = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| SfmError::file(path, e))?;
        if let Some(name) = line.split_whitespace().next() {
            names.push(name.to_string());
        }
    }

    Ok(names)
}

/// Write one name per line.
pub fn write_list_file(path: impl AsRef<Path>, names: &[String]) -> Result<(), SfmError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| SfmError::file(path, e))?;
    let mut writer = BufWriter::new(file);
    names
        .iter()
        .try_for_each(|name| writeln!(writer, "{name}"))
        .and_then(|_| writer.flush())
        .map_err(|e| SfmError::file(path, e))
}

/// Write the focal length list consumed by bundler: `<image> 0 <focal>`.
///
/// PRECONDITION: `names` and `focals` have the same length.
pub fn write_focal_list_file(
    path: impl AsRef<Path>,
    names: &[String],
    focals: &[f64],
) -> Result<(), SfmError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| SfmError::file(path, e))?;
    let mut writer = BufWriter::new(file);
    names
        .iter()
        .zip(focals.iter())
        .try_for_each(|(name, focal)| writeln!(writer, "{name} 0 {focal}"))
        .and_then(|_| writer.flush())
        .map_err(|e| SfmError::file(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{BundleReconstruction, BundlerCamera};

    #[test]
    fn test_read_list_file() -> Result<(), Box<dyn std::error::Error>> {
        let file = tempfile::NamedTempFile::new()?;
        std::fs::write(file.path(), "images/a.jpg 0 512.5\nimages/b.jpg\n\n")?;
        let names = read_list_file(file.path())?;
        assert_eq!(names, vec!["images/a.jpg", "images/b.jpg"]);
        Ok(())
    }

    #[test]
    fn test_list_file_length_must_match() -> Result<(), Box<dyn std::error::Error>> {
        let file = tempfile::NamedTempFile::new()?;
        std::fs::write(file.path(), "a.jpg\nb.jpg\nc.jpg\n")?;

        let mut recon = BundleReconstruction::from_parts(vec![BundlerCamera::default(); 2], vec![])?;
        let res = recon.read_list_file(file.path());
        assert!(matches!(
            res,
            Err(SfmError::ListFileLength {
                n_lines: 3,
                n_cameras: 2,
                ..
            })
        ));
        assert!(recon.image_filenames().is_none());
        Ok(())
    }

    #[test]
    fn test_write_list_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let cameras = vec![
            BundlerCamera {
                focal_length: 512.0,
                ..Default::default()
            },
            BundlerCamera {
                rotation: [[0.0; 3]; 3],
                focal_length: 300.0,
                ..Default::default()
            },
        ];
        let mut recon = BundleReconstruction::from_parts(cameras, vec![])?;
        assert!(matches!(
            recon.write_list_file(dir.path().join("list.txt")),
            Err(SfmError::MissingImageList(2))
        ));

        recon.set_image_filenames(vec!["a.jpg".to_string(), "b.jpg".to_string()])?;
        recon.write_list_file(dir.path().join("list.txt"))?;
        recon.write_focal_list_file(dir.path().join("focals.txt"))?;

        assert_eq!(read_list_file(dir.path().join("list.txt"))?, vec!["a.jpg", "b.jpg"]);
        let focals = std::fs::read_to_string(dir.path().join("focals.txt"))?;
        assert_eq!(focals, "a.jpg 0 512\nb.jpg 0 0\n");
        Ok(())
    }
}
