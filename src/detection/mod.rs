//! File-based handoff between the external can detector and the planner.
//!
//! The detector writes one line per can (`u v [radius]`, pixels) once the
//! operator has confirmed the detections; the stacker polls the file until
//! it holds at least one detection.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::calibration::PixelPoint;
use crate::config::{CameraConfig, DetectionConfig};

/// One detected can in image space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub pixel: PixelPoint,
    /// Estimated radius in pixels, when the detector reports one.
    pub radius: Option<f64>,
}

impl Detection {
    pub fn new(u: f64, v: f64) -> Self {
        Self {
            pixel: PixelPoint::new(u, v),
            radius: None,
        }
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }
}

/// Errors from reading or writing the detection file.
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("detection file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("detection file line {line}: cannot parse {text:?}")]
    Parse { line: usize, text: String },
    #[error("no detections appeared in {path} within {waited:?}")]
    Timeout { path: PathBuf, waited: Duration },
}

/// Parse detection lines; blank lines and lines with fewer than two fields
/// are skipped. A third field is read as the radius when it is numeric and
/// ignored otherwise.
pub fn parse_detections(contents: &str) -> Result<Vec<Detection>, DetectionError> {
    let mut detections = Vec::new();

    for (line_index, line) in contents.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            continue;
        }

        let parse = |s: &str| {
            s.parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| DetectionError::Parse {
                    line: line_index + 1,
                    text: line.trim().to_string(),
                })
        };

        let mut detection = Detection::new(parse(fields[0])?, parse(fields[1])?);
        if let Some(radius) = fields
            .get(2)
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|r| r.is_finite())
        {
            detection = detection.with_radius(radius);
        }
        detections.push(detection);
    }

    Ok(detections)
}

/// Drops detector output that cannot be a can: pixels outside the camera
/// frame, or a reported radius outside the expected range. Detections
/// without a radius are only checked against the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionGate {
    frame_width: f64,
    frame_height: f64,
    radius_min: f64,
    radius_max: f64,
}

impl DetectionGate {
    pub fn from_config(camera: &CameraConfig) -> Self {
        Self {
            frame_width: camera.frame_width as f64,
            frame_height: camera.frame_height as f64,
            radius_min: camera.radius_min,
            radius_max: camera.radius_max,
        }
    }

    /// Why `detection` is rejected, if it is.
    pub fn rejection(&self, detection: &Detection) -> Option<&'static str> {
        let PixelPoint { u, v } = detection.pixel;
        if !(0.0..=self.frame_width).contains(&u) || !(0.0..=self.frame_height).contains(&v) {
            return Some("outside the camera frame");
        }
        match detection.radius {
            Some(r) if r < self.radius_min || r > self.radius_max => {
                Some("radius outside the expected range")
            }
            _ => None,
        }
    }

    /// Accepted detections with their index in `detections`.
    pub fn filter(&self, detections: &[Detection]) -> Vec<(usize, Detection)> {
        detections
            .iter()
            .copied()
            .enumerate()
            .filter(|(index, detection)| match self.rejection(detection) {
                Some(reason) => {
                    tracing::warn!(
                        index,
                        u = detection.pixel.u,
                        v = detection.pixel.v,
                        radius = ?detection.radius,
                        "ignoring detection: {}",
                        reason
                    );
                    false
                }
                None => true,
            })
            .collect()
    }
}

/// The detection file shared with the detector process.
#[derive(Debug, Clone)]
pub struct DetectionFile {
    path: PathBuf,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl DetectionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: Duration::from_millis(100),
            timeout: None,
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            path: PathBuf::from(&config.file),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            timeout: config.poll_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file once. A missing file reads as no detections.
    pub fn read(&self) -> Result<Vec<Detection>, DetectionError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => parse_detections(&contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(DetectionError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Block until the detector has written at least one detection, then
    /// consume the file so the next run waits for a fresh write.
    pub fn wait_for_detections(&self) -> Result<Vec<Detection>, DetectionError> {
        tracing::info!(path = %self.path.display(), "waiting for detected cans");
        let started = Instant::now();

        loop {
            let detections = self.read()?;
            if !detections.is_empty() {
                tracing::info!(count = detections.len(), "found detections");
                self.consume()?;
                return Ok(detections);
            }

            if let Some(timeout) = self.timeout {
                let waited = started.elapsed();
                if waited >= timeout {
                    return Err(DetectionError::Timeout {
                        path: self.path.clone(),
                        waited,
                    });
                }
            }

            thread::sleep(self.poll_interval);
        }
    }

    /// Remove the file once its detections have been taken.
    fn consume(&self) -> Result<(), DetectionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(DetectionError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Producer side: write detections sorted left to right.
    pub fn write_detections(&self, detections: &[Detection]) -> Result<(), DetectionError> {
        let mut sorted = detections.to_vec();
        sorted.sort_by(|a, b| a.pixel.u.total_cmp(&b.pixel.u));

        let mut contents = String::new();
        for detection in &sorted {
            match detection.radius {
                Some(radius) => contents.push_str(&format!(
                    "{:.4} {:.4} {:.4}\n",
                    detection.pixel.u, detection.pixel.v, radius
                )),
                None => contents.push_str(&format!(
                    "{:.4} {:.4}\n",
                    detection.pixel.u, detection.pixel.v
                )),
            }
        }

        fs::write(&self.path, contents).map_err(|source| DetectionError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::info!(count = sorted.len(), path = %self.path.display(), "saved detections");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("can_stacker_{}_{}.txt", name, std::process::id()))
    }

    #[test]
    fn test_parse_skips_blank_and_short_lines() {
        let detections = parse_detections("420.6 263.4\n\n  \n17\n281.4 256.2 41.5\n").unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0], Detection::new(420.6, 263.4));
        assert_eq!(detections[1].radius, Some(41.5));
    }

    #[test]
    fn test_parse_reports_line_number() {
        match parse_detections("1 2\n3 abc\n") {
            Err(DetectionError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_third_field_is_not_a_radius() {
        let detections = parse_detections("420.6 263.4 CAN0\n").unwrap();
        assert_eq!(detections, vec![Detection::new(420.6, 263.4)]);
    }

    #[test]
    fn test_gate_checks_frame_and_radius() {
        let gate = DetectionGate::from_config(&CameraConfig::default());
        let detections = [
            Detection::new(420.6, 263.4).with_radius(41.0),
            Detection::new(281.4, 256.2).with_radius(20.0),
            Detection::new(412.2, 397.8),
            Detection::new(1200.0, 100.0),
            Detection::new(275.4, 391.8).with_radius(50.0),
        ];

        let kept: Vec<usize> = gate.filter(&detections).iter().map(|(i, _)| *i).collect();
        assert_eq!(kept, vec![0, 2]);
        assert_eq!(
            gate.rejection(&detections[1]),
            Some("radius outside the expected range")
        );
        assert_eq!(gate.rejection(&detections[3]), Some("outside the camera frame"));
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let file = DetectionFile::new(temp_path("missing"));
        assert!(file.read().unwrap().is_empty());
    }

    #[test]
    fn test_wait_times_out_on_empty_file() {
        let path = temp_path("empty");
        fs::write(&path, "\n").unwrap();

        let file = DetectionFile::new(&path)
            .with_poll_interval(Duration::from_millis(5))
            .with_timeout(Some(Duration::from_millis(30)));
        assert!(matches!(
            file.wait_for_detections(),
            Err(DetectionError::Timeout { .. })
        ));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_written_detections_are_read_back_sorted() {
        let path = temp_path("written");
        let file = DetectionFile::new(&path).with_timeout(Some(Duration::from_secs(1)));
        file.write_detections(&[Detection::new(300.25, 10.0), Detection::new(100.5, 20.0)])
            .unwrap();

        let detections = file.wait_for_detections().unwrap();
        assert_eq!(
            detections,
            vec![Detection::new(100.5, 20.0), Detection::new(300.25, 10.0)]
        );

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_radius_survives_write_and_read() {
        let path = temp_path("radius");
        let file = DetectionFile::new(&path);
        file.write_detections(&[Detection::new(10.0, 20.0).with_radius(41.25), Detection::new(30.0, 40.0)])
            .unwrap();

        assert_eq!(
            file.read().unwrap(),
            vec![Detection::new(10.0, 20.0).with_radius(41.25), Detection::new(30.0, 40.0)]
        );

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_detections_are_consumed_once() {
        let path = temp_path("consumed");
        let file = DetectionFile::new(&path)
            .with_poll_interval(Duration::from_millis(5))
            .with_timeout(Some(Duration::from_millis(50)));
        file.write_detections(&[Detection::new(1.0, 2.0)]).unwrap();

        assert_eq!(file.wait_for_detections().unwrap().len(), 1);
        assert!(!path.exists());
        assert!(matches!(
            file.wait_for_detections(),
            Err(DetectionError::Timeout { .. })
        ));
    }
}
