use std::{io::Write, path::Path};

use super::{
    compressed::{decompress_if_gzip, read_file_bytes, OutputFile},
    tokens::Tokens,
};
use crate::{
    bundler::{BundleReconstruction, BundlerCamera, BundlerPoint, ViewEntry},
    error::SfmError,
};

/// The text every bundle file starts with, followed by the version.
pub const BUNDLE_SIGNATURE: &str = "# Bundle file v";

/// The only supported bundle file version.
pub const BUNDLE_VERSION: &str = "0.3";

// minimum number of tokens per record, used to bound pre-allocation
const CAMERA_TOKENS: usize = 15;
const POINT_TOKENS: usize = 7;
const VIEW_TOKENS: usize = 4;

/// Read a bundle file, plain or gzip compressed.
///
/// # Arguments
///
/// * `path` - The path to the bundle file.
///
/// # Returns
///
/// The reconstruction. Parsing is all or nothing.
pub fn read_bundle(path: impl AsRef<Path>) -> Result<BundleReconstruction, SfmError> {
    let path = path.as_ref();
    let bytes = read_file_bytes(path)?;
    let recon = parse_bundle(&bytes)?;
    log::info!(
        "Read {} cameras ({} valid) and {} points from {}",
        recon.n_cameras(),
        recon.n_valid_cameras(),
        recon.n_points(),
        path.display()
    );
    Ok(recon)
}

/// Parse the content of a bundle file, plain or gzip compressed.
pub fn parse_bundle(bytes: &[u8]) -> Result<BundleReconstruction, SfmError> {
    let bytes = decompress_if_gzip(bytes.to_vec()).map_err(|e| SfmError::ParseError {
        what: "gzip stream".to_string(),
        token: e.to_string(),
    })?;

    if !bytes.starts_with(BUNDLE_SIGNATURE.as_bytes()) {
        let head = &bytes[..bytes.len().min(BUNDLE_SIGNATURE.len())];
        return Err(SfmError::BadSignature {
            expected: BUNDLE_SIGNATURE,
            found: String::from_utf8_lossy(head).into_owned(),
        });
    }

    let text = std::str::from_utf8(&bytes).map_err(|e| SfmError::ParseError {
        what: "bundle text".to_string(),
        token: e.to_string(),
    })?;

    // the version is the rest of the signature line
    let (first_line, body) = text.split_once('\n').unwrap_or((text, ""));
    let version = first_line[BUNDLE_SIGNATURE.len()..].trim();
    if version != BUNDLE_VERSION {
        return Err(SfmError::UnsupportedVersion(version.to_string()));
    }

    let mut tokens = Tokens::new(body);
    let n_cameras: usize = tokens.parse("number of cameras")?;
    let n_points: usize = tokens.parse("number of points")?;

    tokens.section("cameras", n_cameras);
    let mut cameras = Vec::with_capacity(tokens.capacity_hint(n_cameras, CAMERA_TOKENS));
    for _ in 0..n_cameras {
        cameras.push(parse_camera(&mut tokens)?);
        tokens.record_done();
    }

    tokens.section("points", n_points);
    let mut points = Vec::with_capacity(tokens.capacity_hint(n_points, POINT_TOKENS));
    for i in 0..n_points {
        points.push(parse_point(&mut tokens, i, n_cameras)?);
        tokens.record_done();
    }
    tokens.expect_end()?;

    BundleReconstruction::from_parts(cameras, points)
}

fn parse_camera(tokens: &mut Tokens) -> Result<BundlerCamera, SfmError> {
    let focal_length = tokens.parse("focal length")?;
    let k1 = tokens.parse("k1")?;
    let k2 = tokens.parse("k2")?;
    let mut rotation = [[0.0; 3]; 3];
    for row in rotation.iter_mut() {
        *row = tokens.parse_array("rotation")?;
    }
    let translation = tokens.parse_array("translation")?;
    Ok(BundlerCamera::new(rotation, translation, focal_length, k1, k2))
}

fn parse_point(
    tokens: &mut Tokens,
    index: usize,
    n_cameras: usize,
) -> Result<BundlerPoint, SfmError> {
    let position = tokens.parse_array("point position")?;

    let mut color = [0u8; 3];
    for channel in color.iter_mut() {
        let token = tokens.next_str()?;
        *channel = token.parse::<u8>().map_err(|_| SfmError::ParseError {
            what: format!("color of point {index}"),
            token: token.to_string(),
        })?;
    }

    let n_views: usize = tokens.parse("view list length")?;
    let mut views = Vec::with_capacity(tokens.capacity_hint(n_views, VIEW_TOKENS));
    for _ in 0..n_views {
        let camera: i64 = tokens.parse("view camera")?;
        if camera < 0 || camera as usize >= n_cameras {
            return Err(SfmError::CameraIndexOutOfRange {
                context: format!("point {index}"),
                camera,
                n_cameras,
            });
        }
        let key = tokens.parse("view key")?;
        let key_position = tokens.parse_array("view key position")?;
        views.push(ViewEntry::new(camera as u32, key, key_position));
    }

    Ok(BundlerPoint {
        position,
        color,
        views,
    })
}

/// Serialize a reconstruction in the bundle v0.3 text format.
///
/// Floats are written in scientific notation with 16 significant digits.
pub fn serialize_bundle<W: Write>(
    recon: &BundleReconstruction,
    writer: &mut W,
) -> std::io::Result<()> {
    writeln!(writer, "{BUNDLE_SIGNATURE}{BUNDLE_VERSION}")?;
    writeln!(writer, "{} {}", recon.n_cameras(), recon.n_points())?;

    for camera in recon.cameras() {
        writeln!(
            writer,
            "{:.15e} {:.15e} {:.15e}",
            camera.focal_length, camera.k1, camera.k2
        )?;
        for row in camera.rotation.iter() {
            writeln!(writer, "{:.15e} {:.15e} {:.15e}", row[0], row[1], row[2])?;
        }
        let t = &camera.translation;
        writeln!(writer, "{:.15e} {:.15e} {:.15e}", t[0], t[1], t[2])?;
    }

    for point in recon.points() {
        let p = &point.position;
        writeln!(writer, "{:.15e} {:.15e} {:.15e}", p[0], p[1], p[2])?;
        let c = &point.color;
        writeln!(writer, "{} {} {}", c[0], c[1], c[2])?;
        write!(writer, "{}", point.views.len())?;
        for view in point.views.iter() {
            write!(
                writer,
                " {} {} {:.15e} {:.15e}",
                view.camera, view.key, view.key_position[0], view.key_position[1]
            )?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

/// Write a reconstruction to a bundle file, gzip compressed if the path ends
/// in `.gz`.
///
/// # Arguments
///
/// * `recon` - The reconstruction to write.
/// * `path` - The destination file.
pub fn write_bundle(recon: &BundleReconstruction, path: impl AsRef<Path>) -> Result<(), SfmError> {
    let path = path.as_ref();
    let mut out = OutputFile::create(path)?;
    serialize_bundle(recon, &mut out)
        .and_then(|_| out.finish())
        .map_err(|e| SfmError::file(path, e))?;
    log::info!(
        "Wrote {} cameras and {} points to {}",
        recon.n_cameras(),
        recon.n_points(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use approx::assert_relative_eq;

    const MINIMAL: &str = "# Bundle file v0.3
1 1
500 0 0
1 0 0
0 1 0
0 0 1
0 0 0
0 0 -1
255 128 0
1 0 -1 0 0
";

    fn sample_recon() -> BundleReconstruction {
        let cameras = vec![
            BundlerCamera::new(
                [
                    [9.9240045398e-01, -1.1447615454e-01, 4.5128139672e-02],
                    [9.6516563784e-02, 9.5165945078e-01, 2.9159705528e-01],
                    [-7.6327530178e-02, -2.8502543707e-01, 9.5547611606e-01],
                ],
                [1.8342005790e-01, 9.7561838757e-01, -8.2822559093e-01],
                7.0008849479e+02,
                -7.0992716605e-02,
                -2.8653295186e-02,
            ),
            BundlerCamera::new([[0.0; 3]; 3], [0.0; 3], 0.0, 0.0, 0.0),
        ];
        let points = vec![
            BundlerPoint {
                position: [-0.134889, -0.827748, -2.69439],
                color: [12, 200, 255],
                views: vec![
                    ViewEntry::new(0, 17, [-120.5, 33.25]),
                    ViewEntry::new(1, -1, [1.0 / 3.0, 0.1]),
                ],
            },
            BundlerPoint {
                position: [1e-8, 2.5e6, -0.3],
                color: [0, 0, 0],
                views: vec![],
            },
        ];
        BundleReconstruction::from_parts(cameras, points).expect("valid reconstruction")
    }

    #[test]
    fn test_minimal_scenario() -> Result<(), Box<dyn std::error::Error>> {
        let recon = parse_bundle(MINIMAL.as_bytes())?;
        assert_eq!(recon.n_cameras(), 1);
        assert_eq!(recon.n_points(), 1);
        assert_eq!(recon.n_valid_cameras(), 1);

        let point = &recon.points()[0];
        assert_eq!(point.color, [255, 128, 0]);
        assert_eq!(point.views, vec![ViewEntry::new(0, -1, [0.0, 0.0])]);

        let projection = recon.cameras()[0].world_to_image(&point.position, true, 500, 500);
        assert!(projection.in_view);
        assert_eq!(projection.position, [250.0, 250.0]);

        // a point at the center of projection is never in view
        let origin = recon.cameras()[0].world_to_image(&[0.0; 3], true, 500, 500);
        assert!(!origin.in_view);
        Ok(())
    }

    #[test]
    fn test_write_read_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let recon = sample_recon();
        let file = tempfile::NamedTempFile::new()?;
        write_bundle(&recon, file.path())?;
        let loaded = read_bundle(file.path())?;

        assert_eq!(loaded.n_cameras(), recon.n_cameras());
        assert_eq!(loaded.n_points(), recon.n_points());
        for (a, b) in loaded.cameras().iter().zip(recon.cameras()) {
            assert_relative_eq!(a.focal_length, b.focal_length, max_relative = 1e-10);
            assert_relative_eq!(a.k1, b.k1, max_relative = 1e-10);
            assert_relative_eq!(a.k2, b.k2, max_relative = 1e-10);
            for i in 0..3 {
                assert_relative_eq!(a.translation[i], b.translation[i], max_relative = 1e-10);
                for j in 0..3 {
                    assert_relative_eq!(a.rotation[i][j], b.rotation[i][j], max_relative = 1e-10);
                }
            }
        }
        for (a, b) in loaded.points().iter().zip(recon.points()) {
            assert_eq!(a.color, b.color);
            assert_eq!(a.views.len(), b.views.len());
            for i in 0..3 {
                assert_relative_eq!(a.position[i], b.position[i], max_relative = 1e-10);
            }
            for (va, vb) in a.views.iter().zip(b.views.iter()) {
                assert_eq!(va.camera, vb.camera);
                assert_eq!(va.key, vb.key);
                assert_relative_eq!(va.key_position[0], vb.key_position[0], max_relative = 1e-10);
                assert_relative_eq!(va.key_position[1], vb.key_position[1], max_relative = 1e-10);
            }
        }
        assert_eq!(loaded.n_valid_cameras(), 1);
        Ok(())
    }

    #[test]
    fn test_gzip_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let recon = sample_recon();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bundle.out.gz");
        recon.save(&path)?;

        let raw = std::fs::read(&path)?;
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);

        let loaded = BundleReconstruction::load(&path)?;
        assert_eq!(loaded.n_points(), 2);
        assert_eq!(loaded.points()[0].views, recon.points()[0].views);
        Ok(())
    }

    #[test]
    fn test_bad_signature() {
        let res = parse_bundle(b"PATCHES\n1\n");
        assert!(matches!(res, Err(SfmError::BadSignature { .. })));
        assert_eq!(res.map(|_| ()).unwrap_err().kind(), ErrorKind::Format);
    }

    #[test]
    fn test_unsupported_version() {
        let res = parse_bundle(b"# Bundle file v0.4\n0 0\n");
        assert!(matches!(res, Err(SfmError::UnsupportedVersion(v)) if v == "0.4"));
    }

    #[test]
    fn test_count_mismatch() {
        // declares two points, provides one
        let text = MINIMAL.replacen("1 1\n", "1 2\n", 1);
        let err = parse_bundle(text.as_bytes()).map(|_| ()).unwrap_err();
        assert!(matches!(
            err,
            SfmError::TruncatedRecords {
                what: "points",
                declared: 2,
                parsed: 1
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Consistency);

        // declares no points, provides one
        let text = MINIMAL.replacen("1 1\n", "1 0\n", 1);
        let res = parse_bundle(text.as_bytes());
        assert!(matches!(res, Err(SfmError::TrailingData { .. })));
    }

    #[test]
    fn test_huge_declared_counts() {
        let err = parse_bundle(b"# Bundle file v0.3\n100000000000000000 0\n")
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(
            err,
            SfmError::TruncatedRecords {
                what: "cameras",
                declared: 100000000000000000,
                parsed: 0
            }
        ));

        let text = MINIMAL.replace("1 0 -1 0 0", "1000000000000 0 -1 0 0");
        assert!(matches!(
            parse_bundle(text.as_bytes()),
            Err(SfmError::TruncatedRecords { what: "points", parsed: 0, .. })
        ));
    }

    #[test]
    fn test_camera_out_of_range() {
        let text = MINIMAL.replace("1 0 -1 0 0", "1 1 -1 0 0");
        let err = parse_bundle(text.as_bytes()).map(|_| ()).unwrap_err();
        assert!(matches!(
            err,
            SfmError::CameraIndexOutOfRange { camera: 1, n_cameras: 1, .. }
        ));
        assert_eq!(err.kind(), ErrorKind::Consistency);

        let text = MINIMAL.replace("1 0 -1 0 0", "1 -1 -1 0 0");
        assert!(parse_bundle(text.as_bytes()).is_err());
    }

    #[test]
    fn test_bad_color() {
        let text = MINIMAL.replace("255 128 0", "256 128 0");
        assert!(matches!(
            parse_bundle(text.as_bytes()),
            Err(SfmError::ParseError { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = read_bundle("/nonexistent/bundle.out").map(|_| ()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(BundleReconstruction::open("/nonexistent/bundle.out").is_none());
    }
}
