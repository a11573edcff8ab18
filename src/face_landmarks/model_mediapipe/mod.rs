use std::path::Path;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::RgbImage;
use nalgebra::Point3;
use ndarray::{Array, CowArray, IxDyn};
use ort::{Environment, Session, SessionBuilder, Value};

use crate::error::{Error, Result};
use crate::face::LandmarkSet;
use crate::face_detection::FaceDetectionModel;
use crate::face_landmarks::LandmarkProvider;
use crate::utils::{image_to_nhwc, sigmoid, tensor_to_array};

const INPUT_SIZE: u32 = 256;

// fraction of the face size added on every side of the crop
const ROI_PADDING: f32 = 0.25;

/// Pixel rectangle `(x, y, width, height)`.
type Roi = (u32, u32, u32, u32);

/// MediaPipe face mesh (478 points with irises) behind the landmark boundary.
///
/// The model only sees a crop around the face. The crop follows the face
/// from frame to frame; when the face is lost it is seeded again by the
/// optional face detector, or by a centred square.
pub struct MediapipeFaceLandmarksModel {
    session: Session,
    detector: Option<Box<dyn FaceDetectionModel + Send>>,
    roi: Option<Roi>,
    min_confidence: f32,
}

impl MediapipeFaceLandmarksModel {
    pub fn new(
        environment: &Arc<Environment>,
        model_path: &Path,
        detector: Option<Box<dyn FaceDetectionModel + Send>>,
        min_confidence: f32,
    ) -> Result<Self> {
        let session = SessionBuilder::new(environment)?
            .with_intra_threads(4)?
            .with_model_from_file(model_path)?;

        log::info!("Loaded face landmark model {}", model_path.display());

        Ok(Self {
            session,
            detector,
            roi: None,
            min_confidence,
        })
    }

    fn seed_roi(&self, frame: &RgbImage) -> Result<Roi> {
        if let Some(detector) = &self.detector {
            if let Some(bbox) = detector.run(frame)? {
                log::debug!("Face detector seeded {:?}", bbox);
                return Ok(bbox.to_tuple());
            }
        }
        Ok(centred_square(frame.width(), frame.height()))
    }

    /// Runs the mesh model on a crop; returns flat crop-normalized points and face score.
    fn infer(&self, crop: &RgbImage) -> Result<(Vec<f32>, f32)> {
        let input = imageops::resize(crop, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
        let data = image_to_nhwc(&input);

        let array: CowArray<f32, IxDyn> =
            Array::from_shape_vec((1, INPUT_SIZE as usize, INPUT_SIZE as usize, 3), data)?
                .into_dyn()
                .into();

        let inputs = vec![Value::from_array(self.session.allocator(), &array)?];
        let outputs: Vec<Value> = self.session.run(inputs)?;

        let points = tensor_to_array(outputs.first().ok_or(Error::MissingOutput(0))?)?;
        let face_flag = tensor_to_array(outputs.get(1).ok_or(Error::MissingOutput(1))?)?;

        let score = face_flag.iter().next().copied().map(sigmoid).unwrap_or(0.0);
        let points = points.iter().map(|p| p / INPUT_SIZE as f32).collect();

        Ok((points, score))
    }
}

impl LandmarkProvider for MediapipeFaceLandmarksModel {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<LandmarkSet>> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let face_roi = match self.roi {
            Some(roi) => roi,
            None => self.seed_roi(frame)?,
        };
        let crop_roi = pad_roi(face_roi, width, height);

        let crop = imageops::crop_imm(frame, crop_roi.0, crop_roi.1, crop_roi.2, crop_roi.3)
            .to_image();
        let (crop_points, score) = self.infer(&crop)?;

        if score < self.min_confidence {
            if self.roi.take().is_some() {
                log::debug!("Lost face (score {:.2})", score);
            }
            return Ok(Vec::new());
        }

        let points = crop_to_frame(&crop_points, crop_roi, width, height);
        let landmarks = LandmarkSet::new(points)?;

        let (x, y, w, h) = landmarks.pixel_bbox(width, height);
        self.roi = Some(square_roi(x, y, w, h));

        Ok(vec![landmarks])
    }
}

/// Maps crop-normalized landmarks to frame-normalized ones.
fn crop_to_frame(points: &[f32], crop: Roi, width: u32, height: u32) -> Vec<Point3<f32>> {
    let (x0, y0, w, h) = (crop.0 as f32, crop.1 as f32, crop.2 as f32, crop.3 as f32);
    let (fw, fh) = (width as f32, height as f32);

    points
        .chunks_exact(3)
        .map(|p| {
            Point3::new(
                (p[0] * w + x0) / fw,
                (p[1] * h + y0) / fh,
                // depth shares the x scale
                p[2] * w / fw,
            )
        })
        .collect()
}

/// Pads a face box on all sides and clamps it to the frame.
fn pad_roi(roi: Roi, width: u32, height: u32) -> Roi {
    let padding = ROI_PADDING * roi.2.max(roi.3) as f32;

    let x = (roi.0 as f32 - padding).max(0.0);
    let y = (roi.1 as f32 - padding).max(0.0);
    let x_end = (roi.0 as f32 + roi.2 as f32 + padding).min(width as f32);
    let y_end = (roi.1 as f32 + roi.3 as f32 + padding).min(height as f32);

    let x = (x as u32).min(width - 1);
    let y = (y as u32).min(height - 1);
    let w = ((x_end as u32).saturating_sub(x)).max(1);
    let h = ((y_end as u32).saturating_sub(y)).max(1);

    (x, y, w, h)
}

/// Square box with the same centre as `(x, y, w, h)`.
fn square_roi(x: f32, y: f32, w: f32, h: f32) -> Roi {
    let size = w.max(h);
    let cx = x + w / 2.0;
    let cy = y + h / 2.0;

    (
        (cx - size / 2.0).max(0.0) as u32,
        (cy - size / 2.0).max(0.0) as u32,
        size.max(1.0) as u32,
        size.max(1.0) as u32,
    )
}

fn centred_square(width: u32, height: u32) -> Roi {
    let side = width.min(height);
    ((width - side) / 2, (height - side) / 2, side, side)
}
