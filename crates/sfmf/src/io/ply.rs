use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use crate::{error::SfmError, pointcloud::PointCloud};

/// Serialize a point cloud as an ASCII PLY file.
///
/// Vertices carry `x y z`, then `nx ny nz` if the cloud has normals, then
/// `red green blue` if it has colors. Every comment line is prefixed with
/// `comment`.
pub fn serialize_ply_ascii<W: Write>(
    cloud: &PointCloud,
    comments: &[String],
    writer: &mut W,
) -> std::io::Result<()> {
    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    for comment in comments.iter().flat_map(|c| c.lines()) {
        writeln!(writer, "comment {comment}")?;
    }

    writeln!(writer, "element vertex {}", cloud.len())?;
    for axis in ["x", "y", "z"] {
        writeln!(writer, "property float {axis}")?;
    }
    if cloud.normals().is_some() {
        for axis in ["nx", "ny", "nz"] {
            writeln!(writer, "property float {axis}")?;
        }
    }
    if cloud.colors().is_some() {
        for channel in ["red", "green", "blue"] {
            writeln!(writer, "property uchar {channel}")?;
        }
    }
    writeln!(writer, "end_header")?;

    for (i, p) in cloud.points().iter().enumerate() {
        write!(writer, "{} {} {}", p[0], p[1], p[2])?;
        if let Some(n) = cloud.normals().and_then(|normals| normals.get(i)) {
            write!(writer, " {} {} {}", n[0], n[1], n[2])?;
        }
        if let Some(c) = cloud.colors().and_then(|colors| colors.get(i)) {
            write!(writer, " {} {} {}", c[0], c[1], c[2])?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

/// Write a point cloud as an ASCII PLY file.
///
/// # Arguments
///
/// * `path` - The destination file.
/// * `cloud` - The points to write.
/// * `comments` - Free text written in the header, may span several lines.
pub fn write_ply_ascii(
    path: impl AsRef<Path>,
    cloud: &PointCloud,
    comments: &[String],
) -> Result<(), SfmError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| SfmError::file(path, e))?;
    let mut writer = BufWriter::new(file);
    serialize_ply_ascii(cloud, comments, &mut writer)
        .and_then(|_| writer.flush())
        .map_err(|e| SfmError::file(path, e))?;
    log::info!("Wrote {} vertices to {}", cloud.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_ply_ascii() -> Result<(), Box<dyn std::error::Error>> {
        let cloud = PointCloud::new(
            vec![[0.0, 1.5, -2.0], [3.0, 4.0, 5.0]],
            Some(vec![[255, 0, 10], [1, 2, 3]]),
            None,
        );
        let file = tempfile::NamedTempFile::new()?;
        write_ply_ascii(
            file.path(),
            &cloud,
            &["Input filename: bundle.out\nColored by camera".to_string()],
        )?;

        let text = std::fs::read_to_string(file.path())?;
        let expected = "ply
format ascii 1.0
comment Input filename: bundle.out
comment Colored by camera
element vertex 2
property float x
property float y
property float z
property uchar red
property uchar green
property uchar blue
end_header
0 1.5 -2 255 0 10
3 4 5 1 2 3
";
        assert_eq!(text, expected);
        Ok(())
    }
}
