use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use image::RgbImage;
use ndarray::{ArrayD, IxDyn};
use ort::Value;
use rayon::prelude::*;

use crate::error::Result;
use crate::session::FrameReport;

// state shared between the capture worker and the GUI
pub type SharedState = Arc<Mutex<State>>;

#[derive(Default)]
pub struct State {
    pub fps: Option<f32>,
    pub resolution: Option<(u32, u32)>,
    pub camera_name: Option<String>,
    // last processed frame and what was found in it
    pub image: Option<RgbImage>,
    pub report: Option<FrameReport>,

    // requests from the GUI, consumed by the worker
    pub calibration_requested: bool,
    pub quit: bool,

    // set by the worker once it stopped
    pub finished: bool,
}

/// Locks the shared state. A panicked holder leaves plain data behind, so a
/// poisoned lock is still usable.
pub fn lock(state: &SharedState) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Rolling frame rate over the last `max_length` frame intervals.
pub struct FrameRateMeter {
    deltas: VecDeque<f32>,
    max_length: usize,
    last_frame: Option<Instant>,
}

impl FrameRateMeter {
    pub fn new(max_length: usize) -> Self {
        Self {
            deltas: VecDeque::new(),
            max_length: max_length.max(1),
            last_frame: None,
        }
    }

    /// Records a frame at `now` and returns the mean rate, once known.
    pub fn tick(&mut self, now: Instant) -> Option<f32> {
        if let Some(last) = self.last_frame.replace(now) {
            self.deltas
                .push_back(now.saturating_duration_since(last).as_secs_f32());
            if self.deltas.len() > self.max_length {
                self.deltas.pop_front();
            }
        }
        self.get_mean()
    }

    pub fn get_mean(&self) -> Option<f32> {
        let total: f32 = self.deltas.iter().sum();
        if total <= f32::EPSILON {
            return None;
        }
        Some(self.deltas.len() as f32 / total)
    }
}

/// Flattens an RGB image into a normalized NHWC float buffer.
pub(crate) fn image_to_nhwc(image: &RgbImage) -> Vec<f32> {
    image
        .as_raw()
        .par_iter()
        .map(|&p| p as f32 / 255.0)
        .collect()
}

/// Copies an ONNX output tensor into an owned array.
pub(crate) fn tensor_to_array(value: &Value<'_>) -> Result<ArrayD<f32>> {
    let tensor = value.try_extract::<f32>()?;
    let view = tensor.view();
    let shape = view.shape().to_vec();
    let data: Vec<f32> = view.iter().copied().collect();

    Ok(ArrayD::from_shape_vec(IxDyn(&shape), data)?)
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
