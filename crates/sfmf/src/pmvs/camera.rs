use serde::{Deserialize, Serialize};

use crate::{bundler::VALID_ROTATION_TOLERANCE, linalg};

/// A PMVS camera: a 3x4 projection matrix fusing intrinsics and pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PmvsCamera {
    /// The row-major projection matrix.
    pub projection: [[f64; 4]; 3],
}

impl Default for PmvsCamera {
    fn default() -> Self {
        Self {
            projection: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
        }
    }
}

impl PmvsCamera {
    /// Create a camera from its projection matrix.
    pub fn new(projection: [[f64; 4]; 3]) -> Self {
        Self { projection }
    }

    /// The top-left 3x3 block of the projection matrix.
    pub fn left_block(&self) -> [[f64; 3]; 3] {
        let p = &self.projection;
        [
            [p[0][0], p[0][1], p[0][2]],
            [p[1][0], p[1][1], p[1][2]],
            [p[2][0], p[2][1], p[2][2]],
        ]
    }

    /// Same rule as [`crate::bundler::BundlerCamera::is_valid`], applied to
    /// the top-left 3x3 block.
    pub fn is_valid(&self) -> bool {
        (linalg::determinant3(&self.left_block()) - 1.0).abs() < VALID_ROTATION_TOLERANCE
    }

    /// Project a world point to pixel coordinates: `P [w; 1]` divided by
    /// its third component.
    pub fn world_to_image(&self, w: &[f64; 3]) -> [f64; 2] {
        let wh = [w[0], w[1], w[2], 1.0];
        let row = |r: &[f64; 4]| r[0] * wh[0] + r[1] * wh[1] + r[2] * wh[2] + r[3] * wh[3];
        let imh = [
            row(&self.projection[0]),
            row(&self.projection[1]),
            row(&self.projection[2]),
        ];
        [imh[0] / imh[2], imh[1] / imh[2]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pmvs_camera() {
        let cam = PmvsCamera::new([
            [100.0, 0.0, 50.0, 0.0],
            [0.0, 100.0, 40.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ]);
        assert!(!cam.is_valid());
        let im = cam.world_to_image(&[1.0, 2.0, 4.0]);
        assert_relative_eq!(im[0], 75.0);
        assert_relative_eq!(im[1], 90.0);

        assert!(PmvsCamera::default().is_valid());
        assert!(!PmvsCamera::new([[0.0; 4]; 3]).is_valid());
    }
}
