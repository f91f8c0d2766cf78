//! Small fixed-size linear algebra on arrays.
//!
//! Vectors are `[f64; N]` and matrices are row-major `[[f64; C]; R]`.

/// Identity rotation.
pub const IDENTITY3: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

fn mat33_to_faer(m: &[[f64; 3]; 3]) -> faer::Mat<f64> {
    faer::Mat::<f64>::from_fn(3, 3, |i, j| m[i][j])
}

/// Transform a set of points using a rotation and translation.
///
/// # Arguments
///
/// * `src_points` - A set of points to be transformed.
/// * `dst_r_src` - A 3x3 matrix, usually a rotation, possibly scaled.
/// * `dst_t_src` - A translation vector.
/// * `dst_points` - A pre-allocated vector to store the transformed points.
///
/// PRECONDITION: dst_points is a pre-allocated vector of the same size as source.
///
/// Example:
///
/// ```
/// use sfmf::linalg::transform_points;
///
/// let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
/// let rotation = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
/// let translation = [1.0, 0.0, 0.0];
/// let mut dst_points = vec![[0.0; 3]; src_points.len()];
/// transform_points(&src_points, &rotation, &translation, &mut dst_points);
/// assert_eq!(dst_points[0], [3.0, 2.0, 2.0]);
/// ```
pub fn transform_points(
    src_points: &[[f64; 3]],
    dst_r_src: &[[f64; 3]; 3],
    dst_t_src: &[f64; 3],
    dst_points: &mut [[f64; 3]],
) {
    assert_eq!(src_points.len(), dst_points.len());

    let dst_r_src_mat = mat33_to_faer(dst_r_src);

    // each column is one source point
    let points_in_src = faer::Mat::<f64>::from_fn(3, src_points.len(), |i, j| src_points[j][i]);

    let points_in_dst = &dst_r_src_mat * &points_in_src;

    for (j, point_dst) in dst_points.iter_mut().enumerate() {
        for (i, val) in point_dst.iter_mut().enumerate() {
            *val = points_in_dst.read(i, j) + dst_t_src[i];
        }
    }
}

/// Determinant of a 3x3 matrix by cofactor expansion along the first row.
///
/// Exact zero for the all-zero matrix Bundler writes for failed cameras.
pub fn determinant3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Transpose of a 3x3 matrix.
pub fn transpose3(m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = m[j][i];
        }
    }
    out
}

/// Product of two 3x3 matrices.
pub fn mat3_mul(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    out
}

/// `m * v`
pub fn mat3_mul_vec3(m: &[[f64; 3]; 3], v: &[f64; 3]) -> [f64; 3] {
    [dot3(&m[0], v), dot3(&m[1], v), dot3(&m[2], v)]
}

/// `m^T * v`
pub fn mat3_transpose_mul_vec3(m: &[[f64; 3]; 3], v: &[f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[1][0] * v[1] + m[2][0] * v[2],
        m[0][1] * v[0] + m[1][1] * v[1] + m[2][1] * v[2],
        m[0][2] * v[0] + m[1][2] * v[1] + m[2][2] * v[2],
    ]
}

/// Dot product.
#[inline]
pub fn dot3(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// `a + b`
#[inline]
pub fn add3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// `a - b`
#[inline]
pub fn sub3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// `s * a`
#[inline]
pub fn scale3(a: &[f64; 3], s: f64) -> [f64; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

/// Euclidean norm.
#[inline]
pub fn norm3(a: &[f64; 3]) -> f64 {
    dot3(a, a).sqrt()
}

/// Unit vector along `a`. A zero vector yields NaNs.
#[inline]
pub fn normalize3(a: &[f64; 3]) -> [f64; 3] {
    scale3(a, 1.0 / norm3(a))
}
