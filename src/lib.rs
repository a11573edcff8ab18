//! Head pose, head distance and bad-posture tracking from webcam landmarks.

pub mod app;
pub mod calibration;
pub mod config;
pub mod distance;
pub mod error;
pub mod face;
pub mod face_detection;
pub mod face_landmarks;
pub mod features;
pub mod notify;
pub mod pose;
pub mod posture;
pub mod session;
pub mod utils;
pub mod webcam;

pub use error::{Error, Result};
