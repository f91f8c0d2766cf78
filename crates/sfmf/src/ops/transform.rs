use std::path::Path;

use crate::{
    bundler::BundleReconstruction,
    error::SfmError,
    io::{compressed::read_file_text, tokens::Tokens},
    linalg,
    pmvs::PatchSet,
};

/// Maximum deviation of `Q Qᵀ` from the identity for the rotation part.
const ORTHONORMAL_TOLERANCE: f64 = 1e-4;

/// A similarity transform `x' = s R x + t` stored as the 3x4 matrix `[sR | t]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    matrix: [[f64; 4]; 3],
    scale: f64,
    rotation: [[f64; 3]; 3],
}

impl SimilarityTransform {
    /// Create a transform from a 3x4 matrix `[sR | t]`.
    ///
    /// # Errors
    ///
    /// Fails unless the left 3x3 block has a positive determinant and is a
    /// rotation once the scale `cbrt(det)` is divided out.
    pub fn from_matrix(matrix: [[f64; 4]; 3]) -> Result<Self, SfmError> {
        let linear = left_block(&matrix);
        let det = linalg::determinant3(&linear);
        if !(det.is_finite() && det > 0.0) {
            return Err(SfmError::BadTransform(format!(
                "the linear part has determinant {det}"
            )));
        }

        let scale = det.cbrt();
        let rotation = linear.map(|row| row.map(|v| v / scale));
        let qqt = linalg::mat3_mul(&rotation, &linalg::transpose3(&rotation));
        for (i, row) in qqt.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                if (v - linalg::IDENTITY3[i][j]).abs() > ORTHONORMAL_TOLERANCE {
                    return Err(SfmError::BadTransform(
                        "the linear part is not a scaled rotation".to_string(),
                    ));
                }
            }
        }

        Ok(Self {
            matrix,
            scale,
            rotation,
        })
    }

    /// Read a transform from a text file holding the 12 values of the 3x4
    /// matrix in row-major order.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SfmError> {
        let text = read_file_text(path)?;
        let mut tokens = Tokens::new(&text);
        tokens.section("transform rows", 3);
        let mut matrix = [[0.0; 4]; 3];
        for row in matrix.iter_mut() {
            *row = tokens.parse_array("transform")?;
            tokens.record_done();
        }
        tokens.expect_end()?;
        Self::from_matrix(matrix)
    }

    /// The 3x4 matrix `[sR | t]`.
    pub fn matrix(&self) -> &[[f64; 4]; 3] {
        &self.matrix
    }

    /// The scale `s`.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// The rotation `R`.
    pub fn rotation(&self) -> &[[f64; 3]; 3] {
        &self.rotation
    }

    /// The linear part `sR`.
    pub fn linear(&self) -> [[f64; 3]; 3] {
        left_block(&self.matrix)
    }

    /// The translation `t`.
    pub fn translation(&self) -> [f64; 3] {
        [self.matrix[0][3], self.matrix[1][3], self.matrix[2][3]]
    }

    /// Apply the transform to a point.
    pub fn apply_point(&self, p: &[f64; 3]) -> [f64; 3] {
        linalg::add3(&linalg::mat3_mul_vec3(&self.linear(), p), &self.translation())
    }
}

fn left_block(m: &[[f64; 4]; 3]) -> [[f64; 3]; 3] {
    m.map(|row| [row[0], row[1], row[2]])
}

/// Apply a similarity transform to a sparse reconstruction.
///
/// Points move to `sR p + t`. Cameras get the rotation `R_c Rᵀ` and the
/// translation `s t_c - R_c Rᵀ t`, so every projection is unchanged.
pub fn transform_bundle(recon: &mut BundleReconstruction, transform: &SimilarityTransform) {
    let src: Vec<[f64; 3]> = recon.points.iter().map(|p| p.position).collect();
    let mut dst = vec![[0.0; 3]; src.len()];
    linalg::transform_points(
        &src,
        &transform.linear(),
        &transform.translation(),
        &mut dst,
    );
    for (point, position) in recon.points.iter_mut().zip(dst) {
        point.position = position;
    }

    let rt = linalg::transpose3(transform.rotation());
    let t = transform.translation();
    for camera in recon.cameras.iter_mut() {
        let rotation = linalg::mat3_mul(&camera.rotation, &rt);
        camera.translation = linalg::sub3(
            &linalg::scale3(&camera.translation, transform.scale()),
            &linalg::mat3_mul_vec3(&rotation, &t),
        );
        camera.rotation = rotation;
    }

    log::info!(
        "Transformed {} cameras and {} points",
        recon.cameras.len(),
        recon.points.len()
    );
}

/// Apply a similarity transform to a patch set.
///
/// Positions are transformed as homogeneous points and keep their `w`.
/// Normals are rotated. Loaded PMVS cameras are updated so that patches
/// project to the same pixels.
pub fn transform_patches(patch_set: &mut PatchSet, transform: &SimilarityTransform) {
    let linear = transform.linear();
    let t = transform.translation();

    for patch in patch_set.patches.iter_mut() {
        let [x, y, z, w] = patch.position;
        let p = linalg::add3(
            &linalg::mat3_mul_vec3(&linear, &[x, y, z]),
            &linalg::scale3(&t, w),
        );
        patch.position = [p[0], p[1], p[2], w];

        let [nx, ny, nz, nw] = patch.normal;
        let n = linalg::mat3_mul_vec3(transform.rotation(), &[nx, ny, nz]);
        patch.normal = [n[0], n[1], n[2], nw];
    }

    // P' = P H⁻¹ with H⁻¹ = [A⁻¹ | -A⁻¹ t]
    let inv_linear = linalg::transpose3(transform.rotation())
        .map(|row| row.map(|v| v / transform.scale()));
    let inv_t = linalg::scale3(&linalg::mat3_mul_vec3(&inv_linear, &t), -1.0);
    for camera in patch_set.cameras.values_mut() {
        let block = linalg::mat3_mul(&camera.left_block(), &inv_linear);
        let offset = linalg::mat3_mul_vec3(&camera.left_block(), &inv_t);
        for (r, row) in camera.projection.iter_mut().enumerate() {
            *row = [block[r][0], block[r][1], block[r][2], offset[r] + row[3]];
        }
    }

    log::info!("Transformed {} patches", patch_set.patches.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bundler::{BundlerCamera, BundlerPoint, ViewEntry},
        pmvs::{CameraIndexing, Patch, PmvsCamera},
    };
    use approx::assert_relative_eq;

    // rotation of 90 degrees around z, scale 2, translation (1, 2, 3)
    fn test_transform() -> Result<SimilarityTransform, SfmError> {
        SimilarityTransform::from_matrix([
            [0.0, -2.0, 0.0, 1.0],
            [2.0, 0.0, 0.0, 2.0],
            [0.0, 0.0, 2.0, 3.0],
        ])
    }

    #[test]
    fn test_from_matrix() -> Result<(), Box<dyn std::error::Error>> {
        let transform = test_transform()?;
        assert_relative_eq!(transform.scale(), 2.0, epsilon = 1e-12);
        assert_relative_eq!(transform.rotation()[1][0], 1.0, epsilon = 1e-12);
        assert_eq!(transform.translation(), [1.0, 2.0, 3.0]);
        assert_eq!(transform.apply_point(&[1.0, 0.0, 0.0]), [1.0, 4.0, 3.0]);

        let mirror = [
            [-1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ];
        assert!(matches!(
            SimilarityTransform::from_matrix(mirror),
            Err(SfmError::BadTransform(_))
        ));

        let shear = [
            [1.0, 0.5, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ];
        assert!(matches!(
            SimilarityTransform::from_matrix(shear),
            Err(SfmError::BadTransform(_))
        ));
        Ok(())
    }

    #[test]
    fn test_load_transform() -> Result<(), Box<dyn std::error::Error>> {
        let file = tempfile::NamedTempFile::new()?;
        std::fs::write(file.path(), "0 -2 0 1\n2 0 0 2\n0 0 2 3\n")?;
        let transform = SimilarityTransform::load(file.path())?;
        assert_eq!(transform, test_transform()?);

        std::fs::write(file.path(), "0 -2 0 1\n2 0 0 2\n0 0 2\n")?;
        assert!(matches!(
            SimilarityTransform::load(file.path()),
            Err(SfmError::TruncatedRecords { parsed: 2, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_transform_bundle_preserves_projections() -> Result<(), Box<dyn std::error::Error>> {
        let camera = BundlerCamera {
            rotation: [[0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [-1.0, 0.0, 0.0]],
            translation: [0.1, -0.2, -6.0],
            focal_length: 500.0,
            k1: 0.01,
            k2: -0.002,
        };
        let points = vec![
            BundlerPoint {
                position: [0.3, 0.4, -0.5],
                color: [1, 2, 3],
                views: vec![ViewEntry::new(0, 0, [0.0, 0.0])],
            },
            BundlerPoint {
                position: [-1.0, 0.5, 0.2],
                color: [4, 5, 6],
                views: vec![ViewEntry::new(0, 1, [0.0, 0.0])],
            },
        ];
        let mut recon = BundleReconstruction::from_parts(vec![camera], points)?;
        let before: Vec<_> = recon
            .points()
            .iter()
            .map(|p| recon.cameras()[0].world_to_image(&p.position, true, 0, 0))
            .collect();

        let transform = test_transform()?;
        transform_bundle(&mut recon, &transform);

        assert_relative_eq!(recon.points()[0].position[0], 0.2, epsilon = 1e-12);
        assert_relative_eq!(recon.points()[0].position[1], 2.6, epsilon = 1e-12);
        assert_relative_eq!(recon.points()[0].position[2], 2.0, epsilon = 1e-12);
        assert!(recon.cameras()[0].is_valid());

        for (p, expected) in recon.points().iter().zip(before) {
            let after = recon.cameras()[0].world_to_image(&p.position, true, 0, 0);
            assert_relative_eq!(after.position[0], expected.position[0], epsilon = 1e-9);
            assert_relative_eq!(after.position[1], expected.position[1], epsilon = 1e-9);
            assert_eq!(after.in_view, expected.in_view);
        }
        Ok(())
    }

    #[test]
    fn test_transform_patches() -> Result<(), Box<dyn std::error::Error>> {
        let patch = Patch {
            position: [0.5, 1.0, 1.5, 0.5],
            normal: [1.0, 0.0, 0.0, 0.0],
            good_cameras: vec![0],
            ..Default::default()
        };
        let mut set = PatchSet::from_patches(vec![patch], CameraIndexing::Unmapped);
        let camera = PmvsCamera::new([
            [400.0, 0.0, 320.0, 10.0],
            [0.0, 400.0, 240.0, -20.0],
            [0.0, 0.0, 1.0, 5.0],
        ]);
        set.cameras.insert(0, camera);
        let before = camera.world_to_image(&set.patches()[0].point());

        let transform = test_transform()?;
        transform_patches(&mut set, &transform);

        let patch = &set.patches()[0];
        assert_eq!(patch.position[3], 0.5);
        let expected = transform.apply_point(&[1.0, 2.0, 3.0]);
        let point = patch.point();
        for i in 0..3 {
            assert_relative_eq!(point[i], expected[i], epsilon = 1e-12);
        }
        assert_relative_eq!(patch.normal[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(patch.normal[1], 1.0, epsilon = 1e-12);
        assert_eq!(patch.normal[3], 0.0);

        let after = set.cameras()[&0].world_to_image(&point);
        assert_relative_eq!(after[0], before[0], epsilon = 1e-9);
        assert_relative_eq!(after[1], before[1], epsilon = 1e-9);
        Ok(())
    }
}
