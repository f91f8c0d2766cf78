use serde::{Deserialize, Serialize};

use crate::linalg;

/// Tolerance on `|det(R) - 1|` under which a camera counts as reconstructed.
pub const VALID_ROTATION_TOLERANCE: f64 = 1e-5;

/// A pinhole camera in the Bundler convention.
///
/// The camera looks down its negative z axis with y up. The rotation and
/// translation map world coordinates to camera coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundlerCamera {
    /// World to camera rotation.
    pub rotation: [[f64; 3]; 3],
    /// World to camera translation.
    pub translation: [f64; 3],
    /// Focal length in pixels.
    pub focal_length: f64,
    /// Second order radial distortion coefficient.
    pub k1: f64,
    /// Fourth order radial distortion coefficient.
    pub k2: f64,
}

impl Default for BundlerCamera {
    fn default() -> Self {
        Self {
            rotation: linalg::IDENTITY3,
            translation: [0.0; 3],
            focal_length: 1.0,
            k1: 0.0,
            k2: 0.0,
        }
    }
}

/// The result of projecting a camera space point onto the image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageProjection {
    /// Pixel coordinates, origin at the image corner.
    pub position: [f64; 2],
    /// True if the point is in front of the camera and, when the image size
    /// is known, inside the image.
    pub in_view: bool,
}

impl BundlerCamera {
    /// Create a new camera.
    ///
    /// # Arguments
    ///
    /// * `rotation` - The world to camera rotation.
    /// * `translation` - The world to camera translation.
    /// * `focal_length` - The focal length in pixels.
    /// * `k1` - The second order radial distortion coefficient.
    /// * `k2` - The fourth order radial distortion coefficient.
    pub fn new(
        rotation: [[f64; 3]; 3],
        translation: [f64; 3],
        focal_length: f64,
        k1: f64,
        k2: f64,
    ) -> Self {
        Self {
            rotation,
            translation,
            focal_length,
            k1,
            k2,
        }
    }

    /// Whether bundler reconstructed this camera.
    ///
    /// Bundler writes failed cameras with a degenerate rotation, so a camera
    /// is valid iff its rotation has unit determinant.
    pub fn is_valid(&self) -> bool {
        (linalg::determinant3(&self.rotation) - 1.0).abs() < VALID_ROTATION_TOLERANCE
    }

    /// Whether any distortion coefficient is non zero.
    #[inline]
    pub fn has_distortion(&self) -> bool {
        self.k1 != 0.0 || self.k2 != 0.0
    }

    /// Map a camera space point to world space: `R^T (c - t)`.
    pub fn cam_to_world(&self, c: &[f64; 3]) -> [f64; 3] {
        linalg::mat3_transpose_mul_vec3(&self.rotation, &linalg::sub3(c, &self.translation))
    }

    /// Map a world space point to camera space: `R w + t`.
    pub fn world_to_cam(&self, w: &[f64; 3]) -> [f64; 3] {
        linalg::add3(
            &linalg::mat3_mul_vec3(&self.rotation, w),
            &self.translation,
        )
    }

    /// Map a homogeneous world point to camera space: `R w.xyz + t w.w`.
    pub fn world_to_cam_homogeneous(&self, w: &[f64; 4]) -> [f64; 3] {
        let rotated = linalg::mat3_mul_vec3(&self.rotation, &[w[0], w[1], w[2]]);
        linalg::add3(&rotated, &linalg::scale3(&self.translation, w[3]))
    }

    /// Back project a pixel to a camera space point on the plane `z = -1`.
    ///
    /// Radial distortion is not inverted, so for a camera with non zero
    /// `k1`/`k2` this is not the exact inverse of [`Self::cam_to_image`].
    ///
    /// # Arguments
    ///
    /// * `im` - The pixel coordinates, origin at the image corner.
    /// * `width` - The image width.
    /// * `height` - The image height.
    pub fn image_to_cam(&self, im: &[f64; 2], width: u32, height: u32) -> [f64; 3] {
        let f = self.focal_length;
        [
            (width as f64 / 2.0 - im[0]) / f,
            -(height as f64 / 2.0 - im[1]) / f,
            -1.0,
        ]
    }

    /// Back project a pixel to a world space point one focal unit in front
    /// of the camera. Distortion is ignored as in [`Self::image_to_cam`].
    pub fn image_to_world(&self, im: &[f64; 2], width: u32, height: u32) -> [f64; 3] {
        self.cam_to_world(&self.image_to_cam(im, width, height))
    }

    /// Project a camera space point onto the image.
    ///
    /// # Arguments
    ///
    /// * `c` - The point in camera space.
    /// * `apply_distortion` - Apply the radial distortion of the camera.
    /// * `width` - The image width, 0 if unknown.
    /// * `height` - The image height, 0 if unknown.
    ///
    /// # Returns
    ///
    /// The pixel position and whether the point is visible. Bounds are only
    /// checked when both `width` and `height` are positive.
    pub fn cam_to_image(
        &self,
        c: &[f64; 3],
        apply_distortion: bool,
        width: u32,
        height: u32,
    ) -> ImageProjection {
        let apply_distortion = apply_distortion && self.has_distortion();
        let check_bounds = width > 0 && height > 0;
        let (w, h) = (width as f64, height as f64);
        let f = self.focal_length;

        let in_front = c[2] < 0.0;
        let at_center = c[2] == 0.0;

        // normalized coordinates on the plane z = -1
        let x = c[0] / -c[2];
        let y = c[1] / -c[2];

        let in_bounds =
            |im: &[f64; 2]| im[0] >= 0.0 && im[0] < w && im[1] >= 0.0 && im[1] < h;

        let mut position = [w / 2.0 + x * f, h / 2.0 + y * f];
        let mut inside = !check_bounds || in_bounds(&position);

        if apply_distortion {
            let rho2 = x * x + y * y;
            let r = 1.0 + self.k1 * rho2 + self.k2 * rho2 * rho2;
            position = [w / 2.0 + r * x * f, h / 2.0 + r * y * f];
            inside = inside && (!check_bounds || in_bounds(&position));
        }

        ImageProjection {
            position,
            in_view: inside && in_front && !at_center,
        }
    }

    /// Project a world space point onto the image. See [`Self::cam_to_image`].
    pub fn world_to_image(
        &self,
        w: &[f64; 3],
        apply_distortion: bool,
        width: u32,
        height: u32,
    ) -> ImageProjection {
        self.cam_to_image(&self.world_to_cam(w), apply_distortion, width, height)
    }

    /// Project a camera space point to PMVS pixel coordinates.
    ///
    /// Same as [`Self::cam_to_image`] followed by [`pmvs_pixel_from_bundler`].
    pub fn cam_to_image_pmvs(
        &self,
        c: &[f64; 3],
        apply_distortion: bool,
        width: u32,
        height: u32,
    ) -> ImageProjection {
        let projection = self.cam_to_image(c, apply_distortion, width, height);
        ImageProjection {
            position: pmvs_pixel_from_bundler(&projection.position, height),
            in_view: projection.in_view,
        }
    }

    /// Project a world space point to PMVS pixel coordinates.
    pub fn world_to_image_pmvs(
        &self,
        w: &[f64; 3],
        apply_distortion: bool,
        width: u32,
        height: u32,
    ) -> ImageProjection {
        self.cam_to_image_pmvs(&self.world_to_cam(w), apply_distortion, width, height)
    }

    /// The intrinsic matrix `K` in the camera axis convention.
    ///
    /// `K * c` divided by its third component gives the x pixel coordinate of
    /// [`Self::cam_to_image`] without distortion. The y axis of `K` points down,
    /// i.e. `K` yields `height - y`.
    pub fn intrinsic_matrix(&self, width: u32, height: u32) -> [[f64; 3]; 3] {
        let f = self.focal_length;
        [
            [f, 0.0, -(width as f64) / 2.0],
            [0.0, -f, -(height as f64) / 2.0],
            [0.0, 0.0, -1.0],
        ]
    }

    /// The inverse of [`Self::intrinsic_matrix`].
    pub fn inverse_intrinsic_matrix(&self, width: u32, height: u32) -> [[f64; 3]; 3] {
        let f = self.focal_length;
        [
            [1.0 / f, 0.0, -(width as f64) / (2.0 * f)],
            [0.0, -1.0 / f, height as f64 / (2.0 * f)],
            [0.0, 0.0, -1.0],
        ]
    }

    /// The camera center in world space.
    pub fn center(&self) -> [f64; 3] {
        self.cam_to_world(&[0.0; 3])
    }

    /// The unit up vector of the camera in world space.
    pub fn up_vector(&self) -> [f64; 3] {
        let up = self.cam_to_world(&[0.0, 1.0, 0.0]);
        linalg::normalize3(&linalg::sub3(&up, &self.center()))
    }

    /// The unit viewing direction of the camera in world space.
    pub fn looking_at(&self) -> [f64; 3] {
        let ahead = self.cam_to_world(&[0.0, 0.0, -1.0]);
        linalg::normalize3(&linalg::sub3(&ahead, &self.center()))
    }
}

/// Convert Bundler pixel coordinates to the PMVS convention.
///
/// PMVS puts pixel centers at half integers with the y axis flipped.
pub fn pmvs_pixel_from_bundler(im: &[f64; 2], height: u32) -> [f64; 2] {
    [im[0] - 0.5, height as f64 - im[1] - 0.5]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn test_camera() -> BundlerCamera {
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
        )
    }

    #[test]
    fn test_validity() {
        assert!(BundlerCamera::default().is_valid());
        let zero = BundlerCamera {
            rotation: [[0.0; 3]; 3],
            ..Default::default()
        };
        assert!(!zero.is_valid());
        assert!(test_camera().is_valid());
    }

    #[test]
    fn test_world_cam_roundtrip() {
        let cam = test_camera();
        let w = [-0.134889, -0.827748, -2.69439];
        // the fixture rotation is only orthonormal to about 1e-10
        let back = cam.cam_to_world(&cam.world_to_cam(&w));
        for k in 0..3 {
            assert_relative_eq!(back[k], w[k], epsilon = 1e-9);
        }

        let c = cam.world_to_cam(&w);
        let ch = cam.world_to_cam_homogeneous(&[w[0], w[1], w[2], 1.0]);
        for k in 0..3 {
            assert_relative_eq!(c[k], ch[k], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_project_with_distortion() {
        let cam = test_camera();
        let w = [-0.134889, -0.827748, -2.69439];
        let projection = cam.world_to_image(&w, true, 0, 0);
        assert!(projection.in_view);
        assert_relative_eq!(projection.position[0], 5.0258, epsilon = 1e-3);
        assert_relative_eq!(projection.position[1], -135.11, epsilon = 1e-2);
    }

    #[test]
    fn test_image_center() {
        let cam = BundlerCamera {
            focal_length: 500.0,
            ..Default::default()
        };
        let projection = cam.world_to_image(&[0.0, 0.0, -1.0], true, 500, 500);
        assert!(projection.in_view);
        assert_eq!(projection.position, [250.0, 250.0]);

        // degenerate: the point sits on the center of projection
        let projection = cam.world_to_image(&[0.0, 0.0, 0.0], true, 500, 500);
        assert!(!projection.in_view);

        // behind the camera
        let projection = cam.world_to_image(&[0.0, 0.0, 1.0], false, 500, 500);
        assert!(!projection.in_view);

        // outside the image
        let projection = cam.world_to_image(&[1.0, 0.0, -1.0], false, 500, 500);
        assert!(!projection.in_view);
        assert!(cam.world_to_image(&[1.0, 0.0, -1.0], false, 0, 0).in_view);
    }

    #[test]
    fn test_zero_distortion_is_noop() {
        let cam = BundlerCamera {
            focal_length: 321.0,
            ..Default::default()
        };
        let c = [0.3, -0.2, -2.0];
        assert_eq!(
            cam.cam_to_image(&c, true, 640, 480),
            cam.cam_to_image(&c, false, 640, 480)
        );
    }

    #[test]
    fn test_projection_inverse_is_colinear() {
        let cam = BundlerCamera {
            focal_length: 500.0,
            translation: [0.1, -0.2, 0.3],
            ..Default::default()
        };
        let center = cam.center();

        // back projection mirrors the x axis, so only the y offset is recovered
        let p = [-0.1, 0.4, -3.0];
        let projection = cam.world_to_image(&p, false, 640, 480);
        assert!(projection.in_view);
        let back = cam.image_to_world(&projection.position, 640, 480);
        let d0 = linalg::sub3(&p, &center);
        let d1 = linalg::sub3(&back, &center);
        let cos = linalg::dot3(&d0, &d1) / (linalg::norm3(&d0) * linalg::norm3(&d1));
        assert_relative_eq!(cos, 1.0, epsilon = 1e-9);

        let p = [0.4, 0.2, -3.0];
        let projection = cam.world_to_image(&p, false, 640, 480);
        assert!(projection.in_view);
        let back = cam.image_to_world(&projection.position, 640, 480);
        let d0 = linalg::sub3(&p, &center);
        let d1 = linalg::sub3(&back, &center);
        assert!(linalg::dot3(&d0, &d1) > 0.0);
    }

    #[test]
    fn test_intrinsics() {
        let cam = BundlerCamera {
            focal_length: 400.0,
            ..Default::default()
        };
        let (w, h) = (640, 480);
        let k = cam.intrinsic_matrix(w, h);
        let k_inv = cam.inverse_intrinsic_matrix(w, h);
        let prod = linalg::mat3_mul(&k, &k_inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(prod[i][j], expected, epsilon = 1e-12);
            }
        }

        // agree with the direct projection
        let c = [0.25, 0.1, -2.0];
        let homog = linalg::mat3_mul_vec3(&k, &c);
        let im = cam.cam_to_image(&c, false, w, h).position;
        assert_relative_eq!(homog[0] / homog[2], im[0], epsilon = 1e-9);
        assert_relative_eq!(homog[1] / homog[2], h as f64 - im[1], epsilon = 1e-9);
    }

    #[test]
    fn test_derived_vectors() {
        let cam = BundlerCamera {
            translation: [1.0, 2.0, 3.0],
            ..Default::default()
        };
        assert_eq!(cam.center(), [-1.0, -2.0, -3.0]);
        assert_eq!(cam.up_vector(), [0.0, 1.0, 0.0]);
        assert_eq!(cam.looking_at(), [0.0, 0.0, -1.0]);
    }

    #[test]
    fn test_pmvs_pixel() {
        assert_eq!(pmvs_pixel_from_bundler(&[10.0, 20.0], 100), [9.5, 79.5]);
        let cam = BundlerCamera {
            focal_length: 100.0,
            ..Default::default()
        };
        let projection = cam.world_to_image_pmvs(&[0.0, 0.0, -1.0], false, 200, 100);
        assert_eq!(projection.position, [99.5, 49.5]);
    }
}
