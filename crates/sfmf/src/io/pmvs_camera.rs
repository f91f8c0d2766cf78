use std::{io::Write, path::Path};

use super::{compressed::read_file_text, tokens::Tokens};
use crate::{error::SfmError, pmvs::PmvsCamera};

/// The header of a PMVS camera file.
pub const CAMERA_FILE_HEADER: &str = "CONTOUR";

/// Read a PMVS camera file: `CONTOUR` followed by the 3x4 projection matrix
/// in row-major order.
pub fn read_pmvs_camera(path: impl AsRef<Path>) -> Result<PmvsCamera, SfmError> {
    let path = path.as_ref();
    let text = read_file_text(path)?;
    let mut tokens = Tokens::new(&text);

    let header = tokens.next_str().unwrap_or_default();
    if header != CAMERA_FILE_HEADER {
        return Err(SfmError::BadCameraHeader {
            path: path.to_path_buf(),
            header: header.to_string(),
        });
    }

    tokens.section("projection matrix rows", 3);
    let mut projection = [[0.0; 4]; 3];
    for row in projection.iter_mut() {
        *row = tokens.parse_array("projection matrix")?;
        tokens.record_done();
    }

    Ok(PmvsCamera::new(projection))
}

/// Write a PMVS camera file.
pub fn write_pmvs_camera(camera: &PmvsCamera, path: impl AsRef<Path>) -> Result<(), SfmError> {
    let path = path.as_ref();
    let mut text = format!("{CAMERA_FILE_HEADER}\n");
    for row in camera.projection.iter() {
        text.push_str(&format!("{} {} {} {}\n", row[0], row[1], row[2], row[3]));
    }
    std::fs::File::create(path)
        .and_then(|mut file| file.write_all(text.as_bytes()))
        .map_err(|e| SfmError::file(path, e))
}
