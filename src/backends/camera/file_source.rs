// SPDX-License-Identifier: GPL-3.0-only

//! Still-image decode platform
//!
//! Treats every image in a directory as a capture device, which makes the
//! whole session lifecycle usable on machines without a camera. Each file is
//! decoded at the configured rate like a frozen camera feed; a payload is
//! reported once per capture.

use super::DecodePlatform;
use super::device_selector::DeviceSelector;
use super::frame_loop::LoopAction;
use super::registry::CaptureRegistry;
use super::types::*;
use crate::decoder::{LumaFrame, QrDecoder};
use crate::errors::{BackendError, BackendResult};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

/// Platform whose "cameras" are image files in a directory
#[derive(Debug)]
pub struct FileSourcePlatform {
    dir: PathBuf,
    registry: CaptureRegistry,
}

impl FileSourcePlatform {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            registry: CaptureRegistry::new(),
        }
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn list_images(dir: &Path) -> BackendResult<Vec<CaptureDevice>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_image(p))
        .collect();
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|p| {
            let label = p
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            CaptureDevice::new(p.to_string_lossy(), label)
        })
        .collect())
}

/// Luma plane of a loaded image
struct StillFrame {
    pixels: image::GrayImage,
    reported: HashSet<String>,
}

fn load_still(path: &Path) -> BackendResult<StillFrame> {
    let img = image::open(path).map_err(|e| match e {
        image::ImageError::IoError(io) => BackendError::from(io),
        other => BackendError::InitializationFailed(format!("{}: {}", path.display(), other)),
    })?;

    let pixels = img.to_luma8();
    debug!(
        path = %path.display(),
        width = pixels.width(),
        height = pixels.height(),
        "Loaded still image"
    );

    Ok(StillFrame {
        pixels,
        reported: HashSet::new(),
    })
}

impl DecodePlatform for FileSourcePlatform {
    fn enumerate_devices(&self) -> BoxFuture<'_, BackendResult<Vec<CaptureDevice>>> {
        futures::future::ready(list_images(&self.dir)).boxed()
    }

    fn start_capture(&self, request: CaptureRequest) -> BoxFuture<'_, BackendResult<CaptureHandle>> {
        async move {
            let devices = list_images(&self.dir)?;
            let device = match &request.device {
                DeviceRequest::Exact(id) => devices
                    .iter()
                    .find(|d| &d.id == id)
                    .cloned()
                    .ok_or_else(|| BackendError::DeviceNotFound(id.clone()))?,
                DeviceRequest::Facing(facing) => DeviceSelector::new(*facing)
                    .find_facing(&devices)
                    .cloned()
                    .ok_or_else(|| BackendError::OverConstrained(format!("facingMode={}", facing)))?,
            };
            info!(device = %device, "Starting still-image capture");

            let decoder = QrDecoder::new(Some(request.config.scan_region));
            let events = request.events;
            let path = PathBuf::from(&device.id);

            self.registry
                .launch(
                    &device.id,
                    &request.render_target,
                    request.config.decode_interval(),
                    move || load_still(&path),
                    move |still: &mut StillFrame| {
                        if events.is_cancelled() {
                            return LoopAction::Stop;
                        }

                        let frame = LumaFrame::packed(
                            still.pixels.as_raw(),
                            still.pixels.width(),
                            still.pixels.height(),
                        );
                        for text in decoder.decode(&frame) {
                            if still.reported.insert(text.clone()) && !events.decoded(text) {
                                return LoopAction::Stop;
                            }
                        }
                        LoopAction::Continue
                    },
                )
                .await
        }
        .boxed()
    }

    fn stop_capture<'a>(&'a self, handle: &'a CaptureHandle) -> BoxFuture<'a, BackendResult<()>> {
        self.registry.stop(handle).boxed()
    }

    fn clear_capture<'a>(&'a self, handle: &'a CaptureHandle) -> BoxFuture<'a, BackendResult<()>> {
        futures::future::ready(self.registry.clear(handle)).boxed()
    }

    fn query_state(&self, handle: &CaptureHandle) -> EngineState {
        self.registry.state(handle)
    }

    fn release_render_target(&self, render_target: &str) -> usize {
        self.registry.release_render_target(render_target)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionToken;
    use tokio::sync::mpsc;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("scan-session-files-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_blank_png(path: &Path) {
        image::GrayImage::from_pixel(64, 64, image::Luma([255u8]))
            .save(path)
            .unwrap();
    }

    fn request(device: DeviceRequest) -> (CaptureRequest, mpsc::UnboundedReceiver<TaggedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let request = CaptureRequest {
            device,
            config: ScanConfig::default(),
            render_target: "reader".to_string(),
            events: EngineEventSender::new(SessionToken::new(), tx),
        };
        (request, rx)
    }

    #[tokio::test]
    async fn test_lists_images_sorted_by_path() {
        let dir = temp_dir();
        write_blank_png(&dir.join("b-rear.png"));
        write_blank_png(&dir.join("a-front.png"));
        std::fs::write(dir.join("notes.txt"), "not an image").unwrap();

        let platform = FileSourcePlatform::new(&dir);
        let devices = platform.enumerate_devices().await.unwrap();
        let labels: Vec<_> = devices.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["a-front", "b-rear"]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_facing_request_uses_file_label() {
        let dir = temp_dir();
        write_blank_png(&dir.join("desk.png"));

        let platform = FileSourcePlatform::new(&dir);
        let (req, _rx) = request(DeviceRequest::Facing(Facing::User));
        let result = platform.start_capture(req).await;
        assert!(matches!(result, Err(BackendError::OverConstrained(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_capture_lifecycle() {
        let dir = temp_dir();
        let path = dir.join("front.png");
        write_blank_png(&path);

        let platform = FileSourcePlatform::new(&dir);
        let (req, _rx) = request(DeviceRequest::Exact(path.to_string_lossy().to_string()));
        let handle = platform.start_capture(req).await.unwrap();

        assert_eq!(platform.query_state(&handle), EngineState::Scanning);
        platform.stop_capture(&handle).await.unwrap();
        assert_eq!(platform.query_state(&handle), EngineState::Stopped);
        platform.clear_capture(&handle).await.unwrap();
        assert_eq!(platform.release_render_target("reader"), 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_unreadable_image_fails_start() {
        let dir = temp_dir();
        let path = dir.join("broken.png");
        std::fs::write(&path, b"not really a png").unwrap();

        let platform = FileSourcePlatform::new(&dir);
        let (req, _rx) = request(DeviceRequest::Exact(path.to_string_lossy().to_string()));
        assert!(platform.start_capture(req).await.is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
