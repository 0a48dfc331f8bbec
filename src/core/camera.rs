//! Camera sources and the owned stream resource
//!
//! A [`CameraStream`] is acquired from a [`CameraSource`] when the camera is
//! switched on and released exactly once, either explicitly or on drop. The
//! stream also owns the host-size channel the overlay follows, so releasing
//! the camera ends any overlay loop still attached to it.

use crate::core::models::validate_image_upload;
use crate::core::overlay::CanvasSize;
use async_trait::async_trait;
use base64::Engine;
use image::{ImageReader, RgbImage};
use log::{debug, info, warn};
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use tokio::sync::watch;

/// JPEG quality used for captured frames.
const CAPTURE_JPEG_QUALITY: u8 = 80;

#[async_trait]
pub trait CameraSource: Send + Sync {
    fn name(&self) -> &str;

    async fn acquire(&self) -> io::Result<CameraStream>;
}

/// Encoded image handed to the history backend as a data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl CapturedFrame {
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

enum FrameSource {
    Synthetic,
    Still(CapturedFrame),
}

pub struct CameraStream {
    label: String,
    resolution: CanvasSize,
    host_size: watch::Sender<CanvasSize>,
    source: FrameSource,
    released: bool,
}

impl CameraStream {
    fn new(label: String, resolution: CanvasSize, source: FrameSource) -> Self {
        let (host_size, _) = watch::channel(resolution);
        info!(
            "Acquired camera stream '{label}' at {}x{}",
            resolution.width, resolution.height
        );
        Self {
            label,
            resolution,
            host_size,
            source,
            released: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Negotiated pixel dimensions of the feed.
    pub fn resolution(&self) -> CanvasSize {
        self.resolution
    }

    pub fn host_size(&self) -> watch::Receiver<CanvasSize> {
        self.host_size.subscribe()
    }

    /// Report a new on-screen size of the view hosting this feed.
    pub fn resize_host(&self, size: CanvasSize) {
        self.host_size.send_if_modified(|current| {
            if *current == size {
                false
            } else {
                *current = size;
                true
            }
        });
    }

    /// Grab the current frame as an encoded image.
    pub fn capture(&self) -> io::Result<CapturedFrame> {
        match &self.source {
            FrameSource::Still(frame) => Ok(frame.clone()),
            FrameSource::Synthetic => {
                let image = RgbImage::from_pixel(
                    self.resolution.width,
                    self.resolution.height,
                    image::Rgb([224, 172, 150]),
                );
                let mut bytes = Vec::new();
                let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut bytes,
                    CAPTURE_JPEG_QUALITY,
                );
                image
                    .write_with_encoder(encoder)
                    .map_err(|e| io::Error::other(format!("Failed to encode frame: {e}")))?;
                Ok(CapturedFrame {
                    mime_type: "image/jpeg".to_string(),
                    bytes,
                })
            }
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Stop the feed. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        // Closing the size channel tells attached overlay loops to stop.
        let (closed, _) = watch::channel(self.resolution);
        drop(std::mem::replace(&mut self.host_size, closed));
        info!("Released camera stream '{}'", self.label);
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Stand-in for a webcam: a synthetic feed at a fixed resolution.
pub struct SimulatedCamera {
    name: String,
    resolution: CanvasSize,
}

impl SimulatedCamera {
    pub const DEFAULT_WIDTH: u32 = 1280;
    pub const DEFAULT_HEIGHT: u32 = 720;

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            name: "Simulated camera".to_string(),
            resolution: CanvasSize::new(width, height),
        }
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WIDTH, Self::DEFAULT_HEIGHT)
    }
}

#[async_trait]
impl CameraSource for SimulatedCamera {
    fn name(&self) -> &str {
        &self.name
    }

    async fn acquire(&self) -> io::Result<CameraStream> {
        debug!(
            "Serving synthetic {}x{} frames",
            self.resolution.width, self.resolution.height
        );
        Ok(CameraStream::new(
            self.name.clone(),
            self.resolution,
            FrameSource::Synthetic,
        ))
    }
}

/// A user-supplied photo presented as a camera feed.
pub struct StillImageCamera {
    path: PathBuf,
    name: String,
    frame: CapturedFrame,
    resolution: CanvasSize,
}

impl StillImageCamera {
    /// Validate and load an uploaded image.
    pub fn open(path: &Path, max_bytes: u64) -> io::Result<Self> {
        validate_image_upload(path, max_bytes)?;
        let bytes = fs::read(path)?;

        let format = image::guess_format(&bytes).map_err(|e| {
            warn!("Rejected upload {}: {e}", path.display());
            io::Error::new(io::ErrorKind::InvalidInput, "Please select an image file")
        })?;
        let (width, height) = ImageReader::with_format(Cursor::new(&bytes), format)
            .into_dimensions()
            .map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Could not read image dimensions: {e}"),
                )
            })?;

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();
        info!("Loaded {name} ({width}x{height}, {format:?})");

        Ok(Self {
            path: path.to_path_buf(),
            name,
            frame: CapturedFrame {
                mime_type: format.to_mime_type().to_string(),
                bytes,
            },
            resolution: CanvasSize::new(width, height),
        })
    }
}

#[async_trait]
impl CameraSource for StillImageCamera {
    fn name(&self) -> &str {
        &self.name
    }

    async fn acquire(&self) -> io::Result<CameraStream> {
        debug!("Serving frames from {}", self.path.display());
        Ok(CameraStream::new(
            self.name.clone(),
            self.resolution,
            FrameSource::Still(self.frame.clone()),
        ))
    }
}
