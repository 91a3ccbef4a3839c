//! Stereo camera projection model.
//!
//! Pure geometry: maps sensor-space points to image coordinates and back,
//! and converts pixel/disparity noise into metric uncertainty at a given
//! depth. Used to size each polar cell's smoothing window and to decide
//! whether a voxel is observable at all.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Intrinsic and mounting parameters of a rectified stereo pair.
///
/// Sensor frame convention: x right, y down, z forward (optical axis).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraParams {
    /// Horizontal focal length in pixels
    pub focal_u: f64,
    /// Vertical focal length in pixels
    pub focal_v: f64,
    /// Principal point, horizontal (pixels)
    pub principal_u: f64,
    /// Principal point, vertical (pixels)
    pub principal_v: f64,
    /// Stereo baseline in meters
    pub baseline: f64,
    /// Mount height above ground in meters
    pub height: f64,
    /// Image width in pixels
    pub image_width: u32,
    /// Image height in pixels
    pub image_height: u32,
    /// Disparity noise standard deviation (pixels)
    pub disparity_sigma: f64,
    /// Image-plane noise standard deviation (pixels)
    pub pixel_sigma: f64,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            focal_u: 700.0,
            focal_v: 700.0,
            principal_u: 640.0,
            principal_v: 480.0,
            baseline: 0.12,
            height: 1.2,
            image_width: 1280,
            image_height: 960,
            disparity_sigma: 0.5,
            pixel_sigma: 1.0,
        }
    }
}

/// A point on the image plane with its stereo disparity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePoint {
    pub u: f64,
    pub v: f64,
    pub disparity: f64,
}

impl CameraParams {
    /// Rejects parameters that would make projection meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("focal_u", self.focal_u),
            ("focal_v", self.focal_v),
            ("baseline", self.baseline),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidCamera(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if self.image_width == 0 || self.image_height == 0 {
            return Err(ConfigError::InvalidCamera(
                "image dimensions must be positive".to_string(),
            ));
        }
        if !(self.disparity_sigma >= 0.0 && self.pixel_sigma >= 0.0) {
            return Err(ConfigError::InvalidCamera(
                "noise sigmas must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Projects a sensor-space point. `None` behind the camera.
    pub fn project(&self, p: &Vector3<f64>) -> Option<ImagePoint> {
        if !(p.z > 0.0) {
            return None;
        }
        Some(ImagePoint {
            u: self.principal_u + self.focal_u * p.x / p.z,
            v: self.principal_v + self.focal_v * p.y / p.z,
            disparity: self.focal_u * self.baseline / p.z,
        })
    }

    /// Triangulates an image point back into sensor space.
    pub fn back_project(&self, u: f64, v: f64, disparity: f64) -> Option<Vector3<f64>> {
        if !(disparity > 0.0) {
            return None;
        }
        let z = self.focal_u * self.baseline / disparity;
        Some(Vector3::new(
            (u - self.principal_u) * z / self.focal_u,
            (v - self.principal_v) * z / self.focal_v,
            z,
        ))
    }

    /// True when the point projects inside the image.
    pub fn is_visible(&self, p: &Vector3<f64>) -> bool {
        match self.project(p) {
            Some(ip) => {
                ip.u >= 0.0
                    && ip.u < self.image_width as f64
                    && ip.v >= 0.0
                    && ip.v < self.image_height as f64
            }
            None => false,
        }
    }

    /// Depth uncertainty (meters) at depth `z`: grows quadratically.
    pub fn depth_sigma(&self, z: f64) -> f64 {
        z * z * self.disparity_sigma / (self.focal_u * self.baseline)
    }

    /// Lateral uncertainty (meters) at depth `z`: grows linearly.
    pub fn lateral_sigma(&self, z: f64) -> f64 {
        z * self.pixel_sigma / self.focal_u
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_project_back_project_identity() {
        let cam = CameraParams::default();
        let p = Vector3::new(0.7, -0.3, 6.0);

        let ip = cam.project(&p).unwrap();
        let q = cam.back_project(ip.u, ip.v, ip.disparity).unwrap();

        assert_relative_eq!(p, q, epsilon = 1e-9);
    }

    #[test]
    fn test_behind_camera_not_projected() {
        let cam = CameraParams::default();
        assert!(cam.project(&Vector3::new(0.0, 0.0, -1.0)).is_none());
        assert!(cam.project(&Vector3::new(0.0, 0.0, 0.0)).is_none());
        assert!(!cam.is_visible(&Vector3::new(0.0, 0.0, -1.0)));
        assert!(cam.back_project(10.0, 10.0, 0.0).is_none());
    }

    #[test]
    fn test_visibility_respects_image_bounds() {
        let cam = CameraParams::default();
        assert!(cam.is_visible(&Vector3::new(0.0, 0.0, 5.0)));
        // Far off to the side at short range
        assert!(!cam.is_visible(&Vector3::new(50.0, 0.0, 1.0)));
    }

    #[test]
    fn test_uncertainty_grows_with_range() {
        let cam = CameraParams::default();
        assert!(cam.depth_sigma(20.0) > cam.depth_sigma(5.0) * 10.0);
        assert!(cam.lateral_sigma(20.0) > cam.lateral_sigma(5.0));
        assert_relative_eq!(cam.depth_sigma(0.0), 0.0);
    }

    #[test]
    fn test_validate_rejects_bad_intrinsics() {
        let mut cam = CameraParams::default();
        assert!(cam.validate().is_ok());

        cam.baseline = 0.0;
        assert!(matches!(cam.validate(), Err(ConfigError::InvalidCamera(_))));

        let cam = CameraParams {
            image_width: 0,
            ..Default::default()
        };
        assert!(cam.validate().is_err());

        let cam = CameraParams {
            focal_u: f64::NAN,
            ..Default::default()
        };
        assert!(cam.validate().is_err());
    }
}
