//! Pixel -> robot coordinate mapping.

use glam::DVec3;

use super::{Homography, MappingError, PixelPoint, RobotPoint};
use crate::detection::Detection;

/// Below this homogeneous scale a point is treated as mapping to infinity.
const W_EPSILON: f64 = 1e-10;

/// A detection with its robot-frame position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappedDetection {
    /// Position of the detection in the file it was read from.
    pub index: usize,
    pub pixel: PixelPoint,
    pub robot: RobotPoint,
}

impl Homography {
    /// Map a pixel to robot millimeters: `[x', y', w] = H [u, v, 1]`.
    pub fn map(&self, u: f64, v: f64) -> Result<RobotPoint, MappingError> {
        let p = self.matrix * DVec3::new(u, v, 1.0);
        if p.z.abs() < W_EPSILON {
            return Err(MappingError::PointAtInfinity { u, v });
        }

        let point = RobotPoint::new(p.x / p.z, p.y / p.z);
        if !point.x.is_finite() || !point.y.is_finite() {
            return Err(MappingError::PointAtInfinity { u, v });
        }
        Ok(point)
    }

    /// Project a robot point back into the image.
    pub fn project(&self, point: RobotPoint) -> Result<PixelPoint, MappingError> {
        let inverse = self.inverse().map_err(|_| MappingError::PointAtInfinity {
            u: point.x,
            v: point.y,
        })?;
        let p = inverse.matrix * DVec3::new(point.x, point.y, 1.0);
        if p.z.abs() < W_EPSILON {
            return Err(MappingError::PointAtInfinity {
                u: point.x,
                v: point.y,
            });
        }
        Ok(PixelPoint::new(p.x / p.z, p.y / p.z))
    }
}

/// Map every detection of a run; the first unmappable one aborts the run.
pub fn map_detections(
    homography: &Homography,
    detections: &[Detection],
) -> Result<Vec<MappedDetection>, MappingError> {
    map_indexed(homography, detections.iter().copied().enumerate())
}

/// Like [`map_detections`] for a filtered detection set, keeping each
/// detection's index in the original set.
pub fn map_indexed<I>(homography: &Homography, detections: I) -> Result<Vec<MappedDetection>, MappingError>
where
    I: IntoIterator<Item = (usize, Detection)>,
{
    detections
        .into_iter()
        .map(|(index, detection)| {
            let robot = homography
                .map(detection.pixel.u, detection.pixel.v)
                .map_err(|e| MappingError::Detection {
                    index,
                    source: Box::new(e),
                })?;
            tracing::debug!(
                index,
                u = detection.pixel.u,
                v = detection.pixel.v,
                x = robot.x,
                y = robot.y,
                "detection mapped"
            );
            Ok(MappedDetection {
                index,
                pixel: detection.pixel,
                robot,
            })
        })
        .collect()
}
