// thin wrapper around nokhwa
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, CameraInfo, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

use crate::error::Result;

pub struct Webcam {
    camera: Camera,
}

impl Webcam {
    /// Opens camera `index` at its highest frame rate and starts streaming.
    pub fn open(index: u32) -> Result<Self> {
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(CameraIndex::Index(index), requested)?;
        camera.open_stream()?;

        log::info!(
            "Opened camera {} ({})",
            camera.info().human_name(),
            camera.camera_format()
        );

        Ok(Self { camera })
    }

    /// Blocks until the next frame is available.
    pub fn capture(&mut self) -> Result<RgbImage> {
        let frame = self.camera.frame()?;
        Ok(frame.decode_image::<RgbFormat>()?)
    }

    pub fn resolution(&self) -> (u32, u32) {
        let resolution = self.camera.resolution();
        (resolution.width(), resolution.height())
    }

    pub fn name(&self) -> String {
        self.camera.info().human_name()
    }
}

impl Drop for Webcam {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            log::warn!("Failed to stop camera stream: {}", e);
        }
    }
}

pub fn list_cameras() -> Result<Vec<CameraInfo>> {
    Ok(nokhwa::query(ApiBackend::Auto)?)
}
