//! Small vector helpers over `[f32; 3]` world-space points.

pub type Vec3 = [f32; 3];

pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub fn scale(v: Vec3, s: f32) -> Vec3 {
    [v[0] * s, v[1] * s, v[2] * s]
}

pub fn length(v: Vec3) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Euclidean distance between two 3D points.
pub fn distance(a: Vec3, b: Vec3) -> f32 {
    length(sub(b, a))
}

/// Unit vector in the direction of `v`.  Zero-length input yields the zero
/// vector rather than NaNs.
pub fn normalize(v: Vec3) -> Vec3 {
    let len = length(v);
    if len <= f32::EPSILON {
        return [0.0; 3];
    }
    scale(v, 1.0 / len)
}

pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub fn midpoint(a: Vec3, b: Vec3) -> Vec3 {
    scale(add(a, b), 0.5)
}

/// Average of a set of points.  Empty input yields the origin.
pub fn centroid(points: &[Vec3]) -> Vec3 {
    if points.is_empty() {
        return [0.0; 3];
    }
    let sum = points.iter().fold([0.0; 3], |acc, p| add(acc, *p));
    scale(sum, 1.0 / points.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        distance(a, b) < 1e-5
    }

    #[test]
    fn test_distance() {
        assert!((distance([0.0, 0.0, 0.0], [3.0, 4.0, 0.0]) - 5.0).abs() < 1e-5);
        assert_eq!(distance([1.0, 2.0, 3.0], [1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_normalize() {
        assert!(approx(normalize([0.0, 0.0, 2.0]), [0.0, 0.0, 1.0]));
        assert!((length(normalize([1.0, -2.0, 3.0])) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(normalize([0.0; 3]), [0.0; 3]);
    }

    #[test]
    fn test_cross_right_handed() {
        assert!(approx(cross([1.0, 0.0, 0.0], [0.0, 1.0, 0.0]), [0.0, 0.0, 1.0]));
        assert!(approx(cross([0.0, 1.0, 0.0], [1.0, 0.0, 0.0]), [0.0, 0.0, -1.0]));
    }

    #[test]
    fn test_midpoint_and_centroid() {
        assert!(approx(midpoint([0.0, 0.0, 0.0], [0.0, 0.0, 0.02]), [0.0, 0.0, 0.01]));
        let c = centroid(&[[0.0, 0.0, 0.0], [3.0, 0.0, 0.0], [0.0, 3.0, 0.0]]);
        assert!(approx(c, [1.0, 1.0, 0.0]));
        assert_eq!(centroid(&[]), [0.0; 3]);
    }
}
