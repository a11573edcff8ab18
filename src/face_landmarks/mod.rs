pub mod model_mediapipe;

use image::RgbImage;

use crate::error::Result;
use crate::face::LandmarkSet;

/// Maps a frame to the landmark sets of the faces found in it.
///
/// Implementations may keep state between frames (e.g. a tracked region of
/// interest), which is why `detect` takes `&mut self`.
pub trait LandmarkProvider {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<LandmarkSet>>;
}

impl<P: LandmarkProvider + ?Sized> LandmarkProvider for Box<P> {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<LandmarkSet>> {
        (**self).detect(frame)
    }
}
