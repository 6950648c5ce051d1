//! Exact 4-point homography between the camera image and the robot plane.
//!
//! Each point set is written as the projective image of the unit square;
//! composing one mapping with the inverse of the other gives the
//! pixel -> robot transform that hits all four correspondences exactly.

use glam::{DMat3, DVec3};

use super::{CalibrationError, CalibrationPoint, CALIBRATION_POINTS};

/// Relative area threshold below which three points count as collinear.
const COLLINEAR_TOLERANCE: f64 = 1e-6;

/// Determinant threshold for a usable (invertible) matrix.
const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Immutable pixel -> robot projective transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    pub(crate) matrix: DMat3,
}

impl Default for Homography {
    fn default() -> Self {
        Self {
            matrix: DMat3::IDENTITY,
        }
    }
}

impl Homography {
    /// Fit the transform from exactly four correspondences.
    pub fn fit(points: &[CalibrationPoint]) -> Result<Self, CalibrationError> {
        if points.len() != CALIBRATION_POINTS {
            return Err(CalibrationError::WrongPointCount {
                expected: CALIBRATION_POINTS,
                got: points.len(),
            });
        }

        let pixels: Vec<(f64, f64)> = points.iter().map(|p| (p.pixel.u, p.pixel.v)).collect();
        let robots: Vec<(f64, f64)> = points.iter().map(|p| (p.robot.x, p.robot.y)).collect();

        check_general_position("pixel", &pixels)?;
        check_general_position("robot", &robots)?;

        let from_pixels = unit_square_to_quad(&pixels).ok_or_else(|| {
            CalibrationError::Degenerate("pixel quadrilateral has no projective basis".to_string())
        })?;
        let from_robots = unit_square_to_quad(&robots).ok_or_else(|| {
            CalibrationError::Degenerate("robot quadrilateral has no projective basis".to_string())
        })?;

        if from_pixels.determinant().abs() < SINGULAR_TOLERANCE {
            return Err(CalibrationError::Degenerate(
                "pixel basis matrix is singular".to_string(),
            ));
        }

        let mut matrix = from_robots * from_pixels.inverse();
        let scale = matrix.z_axis.z;
        if scale.abs() > f64::EPSILON {
            matrix = matrix * (1.0 / scale);
        }

        if !matrix.is_finite() || matrix.determinant().abs() < SINGULAR_TOLERANCE {
            return Err(CalibrationError::Degenerate(
                "fitted homography is singular".to_string(),
            ));
        }

        let homography = Self { matrix };
        tracing::debug!(matrix = ?homography.to_rows(), "homography fitted");
        Ok(homography)
    }

    /// Build from a row-major matrix.
    pub fn from_rows(rows: [[f64; 3]; 3]) -> Self {
        Self {
            matrix: DMat3::from_cols(
                DVec3::new(rows[0][0], rows[1][0], rows[2][0]),
                DVec3::new(rows[0][1], rows[1][1], rows[2][1]),
                DVec3::new(rows[0][2], rows[1][2], rows[2][2]),
            ),
        }
    }

    /// Row-major copy of the matrix.
    pub fn to_rows(&self) -> [[f64; 3]; 3] {
        let m = &self.matrix;
        [
            [m.x_axis.x, m.y_axis.x, m.z_axis.x],
            [m.x_axis.y, m.y_axis.y, m.z_axis.y],
            [m.x_axis.z, m.y_axis.z, m.z_axis.z],
        ]
    }

    /// Robot -> pixel transform.
    pub fn inverse(&self) -> Result<Self, CalibrationError> {
        if self.matrix.determinant().abs() < SINGULAR_TOLERANCE {
            return Err(CalibrationError::Degenerate(
                "matrix is singular, cannot invert".to_string(),
            ));
        }
        Ok(Self {
            matrix: self.matrix.inverse(),
        })
    }

    /// Mean distance (mm) between mapped pixels and their robot partners.
    pub fn reprojection_error(&self, points: &[CalibrationPoint]) -> f64 {
        let residuals = self.residuals(points);
        if residuals.is_empty() {
            return 0.0;
        }
        residuals.iter().sum::<f64>() / residuals.len() as f64
    }

    /// Per-point distance (mm); points that map to infinity count as infinite.
    pub fn residuals(&self, points: &[CalibrationPoint]) -> Vec<f64> {
        points
            .iter()
            .map(|p| match self.map(p.pixel.u, p.pixel.v) {
                Ok(mapped) => mapped.distance(&p.robot),
                Err(_) => f64::INFINITY,
            })
            .collect()
    }

    /// Fit and summarize a calibration for display.
    pub fn report(points: &[CalibrationPoint]) -> Result<CalibrationReport, CalibrationError> {
        let homography = Self::fit(points)?;
        let residuals = homography.residuals(points);
        let mean_error = homography.reprojection_error(points);

        tracing::info!(
            points = points.len(),
            mean_error_mm = mean_error,
            "calibration fitted"
        );

        Ok(CalibrationReport {
            homography,
            points: points.to_vec(),
            residuals,
            mean_error,
        })
    }
}

/// Fitted calibration with its residuals.
#[derive(Debug, Clone)]
pub struct CalibrationReport {
    pub homography: Homography,
    pub points: Vec<CalibrationPoint>,
    /// Distance in mm per correspondence.
    pub residuals: Vec<f64>,
    pub mean_error: f64,
}

impl std::fmt::Display for CalibrationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Homography (pixel -> robot mm):")?;
        for row in self.homography.to_rows() {
            writeln!(f, "  [{:>14.8} {:>14.8} {:>14.8}]", row[0], row[1], row[2])?;
        }
        writeln!(f, "Correspondences:")?;
        for (point, residual) in self.points.iter().zip(&self.residuals) {
            writeln!(
                f,
                "  ({:>8.2}, {:>8.2}) px -> ({:>8.2}, {:>8.2}) mm  residual {:.4} mm",
                point.pixel.u, point.pixel.v, point.robot.x, point.robot.y, residual
            )?;
        }
        write!(f, "Mean reprojection error: {:.4} mm", self.mean_error)
    }
}

/// Reject sets where any three points are collinear (duplicates included).
fn check_general_position(label: &str, points: &[(f64, f64)]) -> Result<(), CalibrationError> {
    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &(x, y) in points {
        if !x.is_finite() || !y.is_finite() {
            return Err(CalibrationError::Degenerate(format!(
                "{} point ({}, {}) is not finite",
                label, x, y
            )));
        }
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    let extent = (max_x - min_x).hypot(max_y - min_y);
    if extent <= f64::EPSILON {
        return Err(CalibrationError::Degenerate(format!(
            "all {} points coincide",
            label
        )));
    }

    let threshold = COLLINEAR_TOLERANCE * extent * extent;
    for (i, j, k) in [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)] {
        let (ax, ay) = points[i];
        let (bx, by) = points[j];
        let (cx, cy) = points[k];
        let cross = (bx - ax) * (cy - ay) - (by - ay) * (cx - ax);
        if cross.abs() <= threshold {
            return Err(CalibrationError::Degenerate(format!(
                "{} points {}, {} and {} are collinear or duplicated",
                label, i, j, k
            )));
        }
    }

    Ok(())
}

/// Projective map taking the unit square corners (0,0), (1,0), (1,1), (0,1)
/// onto `quad[0..4]` in that order.
fn unit_square_to_quad(quad: &[(f64, f64)]) -> Option<DMat3> {
    let (x0, y0) = quad[0];
    let (x1, y1) = quad[1];
    let (x2, y2) = quad[2];
    let (x3, y3) = quad[3];

    let dx1 = x1 - x2;
    let dx2 = x3 - x2;
    let dx3 = x0 - x1 + x2 - x3;
    let dy1 = y1 - y2;
    let dy2 = y3 - y2;
    let dy3 = y0 - y1 + y2 - y3;

    let den = dx1 * dy2 - dx2 * dy1;
    if den.abs() <= f64::EPSILON {
        return None;
    }

    let g = (dx3 * dy2 - dx2 * dy3) / den;
    let h = (dx1 * dy3 - dx3 * dy1) / den;

    let a = x1 - x0 + g * x1;
    let b = x3 - x0 + h * x3;
    let d = y1 - y0 + g * y1;
    let e = y3 - y0 + h * y3;

    Some(DMat3::from_cols(
        DVec3::new(a, d, g),
        DVec3::new(b, e, h),
        DVec3::new(x0, y0, 1.0),
    ))
}
