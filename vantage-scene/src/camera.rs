use cgmath::{Deg, Matrix4, Point3, Rad, SquareMatrix, Vector3};

use crate::document::Camera;

/// Builds the projection matrix for a camera definition.
///
/// Matrices target a clip space with depth in [0, 1] and Y pointing down,
/// so the result feeds the vertex shader directly with no fix-up multiply.
/// `fallback_aspect` is used when a perspective camera leaves the aspect
/// ratio unspecified.
pub fn projection(camera: &Camera, fallback_aspect: f32) -> Matrix4<f32> {
    match *camera {
        Camera::Perspective {
            yfov,
            aspect,
            znear,
            zfar,
        } => {
            let aspect = aspect.unwrap_or(fallback_aspect);
            match zfar {
                Some(zfar) => perspective(yfov, aspect, znear, zfar),
                None => perspective_infinite(yfov, aspect, znear),
            }
        }
        Camera::Orthographic {
            xmag,
            ymag,
            znear,
            zfar,
        } => orthographic(xmag, ymag, znear, zfar),
    }
}

/// Right-handed perspective projection, depth 0 at the near plane and 1 at
/// the far plane, Y flipped.
pub fn perspective(yfov: f32, aspect: f32, znear: f32, zfar: f32) -> Matrix4<f32> {
    let f = 1.0 / (yfov * 0.5).tan();
    #[rustfmt::skip]
    let m = Matrix4::new(
        f / aspect, 0.0,  0.0,                           0.0,
        0.0,        -f,   0.0,                           0.0,
        0.0,        0.0,  zfar / (znear - zfar),        -1.0,
        0.0,        0.0,  (znear * zfar) / (znear - zfar), 0.0,
    );
    m
}

/// Perspective projection with the far plane at infinity.
pub fn perspective_infinite(yfov: f32, aspect: f32, znear: f32) -> Matrix4<f32> {
    let f = 1.0 / (yfov * 0.5).tan();
    #[rustfmt::skip]
    let m = Matrix4::new(
        f / aspect, 0.0,  0.0,    0.0,
        0.0,        -f,   0.0,    0.0,
        0.0,        0.0, -1.0,   -1.0,
        0.0,        0.0, -znear,  0.0,
    );
    m
}

/// Right-handed orthographic projection, depth in [0, 1], Y flipped.
pub fn orthographic(xmag: f32, ymag: f32, znear: f32, zfar: f32) -> Matrix4<f32> {
    #[rustfmt::skip]
    let m = Matrix4::new(
        1.0 / xmag, 0.0,         0.0,                   0.0,
        0.0,        -1.0 / ymag, 0.0,                   0.0,
        0.0,        0.0,         1.0 / (znear - zfar),  0.0,
        0.0,        0.0,         znear / (znear - zfar), 1.0,
    );
    m
}

/// Combined projection-view matrix for the built-in fallback camera, used
/// when the document defines no camera of its own.
///
/// A 60 degree perspective looking from (200, 300, 200) at the origin. The
/// constants are arbitrary but fixed, so the matrix is reproducible bit for
/// bit across runs.
pub fn default_view_projection() -> Matrix4<f32> {
    let projection = perspective(Rad::from(Deg(60.0)).0, 1.0, 1.0, 10_000.0);
    let view = Matrix4::look_at_rh(
        Point3::new(200.0, 300.0, 200.0),
        Point3::new(0.0, 0.0, 0.0),
        Vector3::unit_y(),
    );
    projection * view
}

/// Projection-view matrix for a camera node: the projection composed with the
/// inverse of the node's world transform.
///
/// Falls back to the default camera when the world transform is singular.
pub fn view_projection(
    camera: &Camera,
    world_transform: Matrix4<f32>,
    fallback_aspect: f32,
) -> Matrix4<f32> {
    match world_transform.invert() {
        Some(view) => projection(camera, fallback_aspect) * view,
        None => default_view_projection(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Rad, Vector4};

    fn project(m: Matrix4<f32>, p: Vector4<f32>) -> Vector4<f32> {
        let clip = m * p;
        clip / clip.w
    }

    fn assert_close(actual: f32, expected: f32, epsilon: f32) {
        assert!(
            (actual - expected).abs() <= epsilon,
            "{actual} not within {epsilon} of {expected}"
        );
    }

    #[test]
    fn perspective_maps_near_plane_to_zero_depth() {
        let m = perspective(Rad(1.0).0, 1.0, 1.0, 100.0);
        let near = project(m, Vector4::new(0.0, 0.0, -1.0, 1.0));
        let far = project(m, Vector4::new(0.0, 0.0, -100.0, 1.0));
        assert_close(near.z, 0.0, 1e-6);
        assert_close(far.z, 1.0, 1e-5);
    }

    #[test]
    fn perspective_flips_y() {
        let m = perspective(Rad(1.0).0, 1.0, 1.0, 100.0);
        let up = project(m, Vector4::new(0.0, 1.0, -10.0, 1.0));
        assert!(up.y < 0.0);
    }

    #[test]
    fn infinite_far_plane_approaches_one() {
        let m = perspective_infinite(Rad(1.0).0, 1.0, 0.5);
        let near = project(m, Vector4::new(0.0, 0.0, -0.5, 1.0));
        let distant = project(m, Vector4::new(0.0, 0.0, -1.0e6, 1.0));
        assert_close(near.z, 0.0, 1e-6);
        assert!(distant.z > 0.999 && distant.z <= 1.0);
    }

    #[test]
    fn orthographic_maps_magnification_to_unit_box() {
        let m = orthographic(2.0, 4.0, 1.0, 10.0);
        let p = project(m, Vector4::new(2.0, 4.0, -1.0, 1.0));
        assert_close(p.x, 1.0, 1e-6);
        assert_close(p.y, -1.0, 1e-6);
        assert_close(p.z, 0.0, 1e-6);
    }

    #[test]
    fn default_camera_is_deterministic() {
        let a = default_view_projection();
        let b = default_view_projection();
        let a: &[f32; 16] = a.as_ref();
        let b: &[f32; 16] = b.as_ref();
        for (x, y) in a.iter().zip(b) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }
}
