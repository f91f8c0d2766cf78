use crate::{bundler::BundleReconstruction, pmvs::PatchSet};

/// A point cloud with points, colors, and normals.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The colors of the points.
    colors: Option<Vec<[u8; 3]>>,
    // The normals of the points.
    normals: Option<Vec<[f64; 3]>>,
}

/// Convert a color in `[0, 1]` to 8 bits, rounding and clamping.
pub fn color_to_u8(color: [f32; 3]) -> [u8; 3] {
    color.map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8)
}

impl PointCloud {
    /// Create a new point cloud from points, colors (optional), and normals (optional).
    pub fn new(
        points: Vec<[f64; 3]>,
        colors: Option<Vec<[u8; 3]>>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> Self {
        Self {
            points,
            colors,
            normals,
        }
    }

    /// The colored points of a sparse reconstruction.
    pub fn from_bundle(recon: &BundleReconstruction) -> Self {
        let points = recon.points().iter().map(|p| p.position).collect();
        let colors = recon.points().iter().map(|p| p.color).collect();
        Self::new(points, Some(colors), None)
    }

    /// The oriented points of a patch set. Colors are only set when every
    /// patch is of the extended variant.
    pub fn from_patches(patch_set: &PatchSet) -> Self {
        let patches = patch_set.patches();
        let points = patches.iter().map(|p| p.point()).collect();
        let normals = patches
            .iter()
            .map(|p| [p.normal[0], p.normal[1], p.normal[2]])
            .collect();
        let colors = patches
            .iter()
            .map(|p| p.color().map(color_to_u8))
            .collect::<Option<Vec<_>>>();
        Self::new(points, colors, Some(normals))
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the colors of the points in the point cloud.
    pub fn colors(&self) -> Option<&[[u8; 3]]> {
        self.colors.as_deref()
    }

    /// Get as reference the normals of the points in the point cloud.
    pub fn normals(&self) -> Option<&[[f64; 3]]> {
        self.normals.as_deref()
    }

    /// Replace the colors, one per point.
    ///
    /// PRECONDITION: `colors` has one entry per point.
    pub fn set_colors(&mut self, colors: Vec<[u8; 3]>) {
        assert_eq!(colors.len(), self.points.len());
        self.colors = Some(colors);
    }

    /// Get the minimum and maximum corners of the bounding box, `None` for an
    /// empty cloud.
    pub fn bounds(&self) -> Option<([f64; 3], [f64; 3])> {
        let first = *self.points.first()?;
        Some(self.points.iter().fold((first, first), |(lo, hi), p| {
            (
                [lo[0].min(p[0]), lo[1].min(p[1]), lo[2].min(p[2])],
                [hi[0].max(p[0]), hi[1].max(p[1]), hi[2].max(p[2])],
            )
        }))
    }
}
