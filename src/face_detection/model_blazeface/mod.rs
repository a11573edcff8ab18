use std::cmp::min;
use std::path::Path;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::prelude::*;
use ndarray::CowArray;
use ort::{Environment, Session, SessionBuilder, Value};

use crate::error::{Error, Result};
use crate::face_detection::{FaceBoundingBox, FaceDetectionModel};
use crate::utils::{image_to_nhwc, sigmoid, tensor_to_array};

const INPUT_SIZE: u32 = 256;

// raw box layout: cx, cy, w, h, then 6 keypoints (x, y)
const RAW_BOX_LEN: usize = 16;

pub struct BlazefaceModel {
    session: Session,
    anchors: Array2<f32>,
    min_score: f32,
}

impl BlazefaceModel {
    pub fn new(
        environment: &Arc<Environment>,
        model_path: &Path,
        anchors_path: &Path,
        min_score: f32,
    ) -> Result<Self> {
        let session = SessionBuilder::new(environment)?
            .with_intra_threads(2)?
            .with_model_from_file(model_path)?;

        let anchors: Array2<f64> = ndarray_npy::read_npy(anchors_path)?;
        let anchors = anchors.mapv(|x| x as f32);

        log::info!(
            "Loaded face detector {} with {} anchors",
            model_path.display(),
            anchors.nrows()
        );

        Ok(Self {
            session,
            anchors,
            min_score,
        })
    }

    fn outputs(&self, input: &RgbImage) -> Result<(Array3<f32>, Array3<f32>)> {
        let data = image_to_nhwc(input);
        let array: CowArray<f32, IxDyn> =
            Array::from_shape_vec((1, INPUT_SIZE as usize, INPUT_SIZE as usize, 3), data)?
                .into_dyn()
                .into();

        let inputs = vec![Value::from_array(self.session.allocator(), &array)?];
        let outputs: Vec<Value> = self.session.run(inputs)?;

        let output = |i: usize| -> Result<ArrayD<f32>> {
            outputs
                .get(i)
                .ok_or(Error::MissingOutput(i))
                .and_then(tensor_to_array)
        };

        // the model reports two anchor scales separately
        let scores = ndarray::concatenate(Axis(1), &[output(0)?.view(), output(1)?.view()])?
            .into_dimensionality::<Ix3>()?;
        let boxes = ndarray::concatenate(Axis(1), &[output(2)?.view(), output(3)?.view()])?
            .into_dimensionality::<Ix3>()?;

        Ok((scores, boxes))
    }
}

impl FaceDetectionModel for BlazefaceModel {
    fn run(&self, image: &RgbImage) -> Result<Option<FaceBoundingBox>> {
        // centred square crop
        let side = min(image.width(), image.height());
        let crop_x = (image.width() - side) / 2;
        let crop_y = (image.height() - side) / 2;

        let cropped = imageops::crop_imm(image, crop_x, crop_y, side, side).to_image();
        let input = imageops::resize(&cropped, INPUT_SIZE, INPUT_SIZE, FilterType::Nearest);

        let (scores, boxes) = self.outputs(&input)?;

        let Some(best) = argmax(scores.iter().copied()) else {
            return Ok(None);
        };
        let score = sigmoid(scores[[0, best, 0]]);
        if score < self.min_score || best >= self.anchors.nrows() {
            return Ok(None);
        }

        let raw = boxes.slice(s![0, best, ..]);
        if raw.len() < RAW_BOX_LEN {
            return Ok(None);
        }
        let anchor = self.anchors.row(best);
        let (x_min, y_min, x_max, y_max) = decode_box(
            [raw[0], raw[1], raw[2], raw[3]],
            [anchor[0], anchor[1], anchor[2], anchor[3]],
            INPUT_SIZE as f32,
        );

        // back to pixels of the uncropped image
        let to_px = |v: f32| (v.clamp(0.0, 1.0) * side as f32) as u32;
        let x = to_px(x_min) + crop_x;
        let y = to_px(y_min) + crop_y;
        let width = to_px(x_max).saturating_sub(to_px(x_min));
        let height = to_px(y_max).saturating_sub(to_px(y_min));

        if width == 0 || height == 0 {
            return Ok(None);
        }

        Ok(Some(FaceBoundingBox {
            x,
            y,
            width,
            height,
            score,
        }))
    }
}

/// Decodes a raw regression against its anchor into `(xmin, ymin, xmax, ymax)`,
/// normalized to the detector input.
fn decode_box(raw: [f32; 4], anchor: [f32; 4], scale: f32) -> (f32, f32, f32, f32) {
    let x_center = raw[0] / scale * anchor[2] + anchor[0];
    let y_center = raw[1] / scale * anchor[3] + anchor[1];

    let w = raw[2] / scale * anchor[2];
    let h = raw[3] / scale * anchor[3];

    (
        x_center - w / 2.0,
        y_center - h / 2.0,
        x_center + w / 2.0,
        y_center + h / 2.0,
    )
}

fn argmax(values: impl Iterator<Item = f32>) -> Option<usize> {
    values
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |best: Option<(usize, f32)>, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn decode_box_centres_on_anchor() {
        let (x0, y0, x1, y1) = decode_box([0.0, 0.0, 64.0, 128.0], [0.5, 0.25, 1.0, 1.0], 256.0);

        assert_relative_eq!(x0, 0.375);
        assert_relative_eq!(x1, 0.625);
        assert_relative_eq!(y0, 0.0);
        assert_relative_eq!(y1, 0.5);
    }

    #[test]
    fn decode_box_applies_offset() {
        let (x0, _, x1, _) = decode_box([25.6, 0.0, 0.0, 0.0], [0.5, 0.5, 1.0, 1.0], 256.0);

        assert_relative_eq!(x0, 0.6);
        assert_relative_eq!(x1, 0.6);
    }

    #[test]
    fn argmax_handles_negative_logits() {
        assert_eq!(argmax([-3.0, -1.0, -2.0].into_iter()), Some(1));
        assert_eq!(argmax(std::iter::empty()), None);
        assert_eq!(argmax([f32::NAN, 0.5].into_iter()), Some(1));
    }
}
