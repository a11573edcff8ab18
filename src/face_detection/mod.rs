pub mod model_blazeface;

use core::fmt::Debug;

use image::RgbImage;

use crate::error::Result;

pub trait FaceDetectionModel {
    /// Returns the most confident face in the image, if any.
    fn run(&self, image: &RgbImage) -> Result<Option<FaceBoundingBox>>;
}

/// Bounding box around a detected face, in pixels of the original image.
#[derive(Clone, Copy, PartialEq)]
pub struct FaceBoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub score: f32,
}

impl FaceBoundingBox {
    /// `(x, y, width, height)` of the box.
    pub fn to_tuple(&self) -> (u32, u32, u32, u32) {
        (self.x, self.y, self.width, self.height)
    }
}

impl Debug for FaceBoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceBoundingBox")
            .field("origin", &(self.x, self.y))
            .field("width", &self.width)
            .field("height", &self.height)
            .field("score", &self.score)
            .finish()
    }
}
