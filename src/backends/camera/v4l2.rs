// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 decode platform
//!
//! Enumerates `/dev/video*` capture nodes and decodes QR codes from a YUYV
//! stream, one thread per running capture. Facing requests are resolved from
//! the card label since V4L2 exposes no facing metadata.

use super::DecodePlatform;
use super::device_selector::DeviceSelector;
use super::frame_loop::LoopAction;
use super::registry::CaptureRegistry;
use super::types::*;
use crate::constants::{CAPTURE_BUFFER_COUNT, CAPTURE_HEIGHT, CAPTURE_WIDTH};
use crate::decoder::{LumaFrame, QrDecoder, yuyv_to_luma};
use crate::errors::{BackendError, BackendResult};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

/// Open device plus its memory-mapped stream
struct V4l2Capture {
    stream: Stream<'static>,
    _device: Device,
    width: u32,
    height: u32,
}

/// Platform backed by Video4Linux2 capture devices
#[derive(Debug)]
pub struct V4l2Platform {
    dev_dir: PathBuf,
    registry: CaptureRegistry,
}

impl Default for V4l2Platform {
    fn default() -> Self {
        Self::new()
    }
}

impl V4l2Platform {
    pub fn new() -> Self {
        Self::with_dev_dir("/dev")
    }

    /// Scan a different directory for `video*` nodes
    pub fn with_dev_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dev_dir: dir.into(),
            registry: CaptureRegistry::new(),
        }
    }

    async fn resolve_device(&self, request: &DeviceRequest) -> BackendResult<CaptureDevice> {
        let devices = self.enumerate_devices().await?;
        match request {
            DeviceRequest::Exact(id) => devices
                .into_iter()
                .find(|d| &d.id == id)
                .ok_or_else(|| BackendError::DeviceNotFound(id.clone())),
            DeviceRequest::Facing(facing) => DeviceSelector::new(*facing)
                .find_facing(&devices)
                .cloned()
                .ok_or_else(|| BackendError::OverConstrained(format!("facingMode={}", facing))),
        }
    }
}

/// List capture-capable nodes in path order
fn scan_video_nodes(dev_dir: &Path) -> BackendResult<Vec<CaptureDevice>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dev_dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("video"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut devices = Vec::new();
    let mut denied = false;

    for path in paths {
        let path_str = path.to_string_lossy().to_string();
        let dev = match Device::with_path(&path) {
            Ok(dev) => dev,
            Err(e) => {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    denied = true;
                }
                debug!(path = %path_str, error = %e, "Skipping video node");
                continue;
            }
        };

        let caps = match dev.query_caps() {
            Ok(caps) => caps,
            Err(e) => {
                debug!(path = %path_str, error = %e, "QUERYCAP failed");
                continue;
            }
        };

        // Metadata nodes share the card name but cannot stream video
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }

        debug!(path = %path_str, card = %caps.card, driver = %caps.driver, "Found capture device");
        devices.push(CaptureDevice::new(path_str, caps.card));
    }

    if devices.is_empty() && denied {
        return Err(BackendError::PermissionDenied(format!(
            "no accessible video nodes in {}",
            dev_dir.display()
        )));
    }

    Ok(devices)
}

/// Open a device and start streaming YUYV at the capture resolution
fn open_capture(path: &str) -> BackendResult<V4l2Capture> {
    let device = Device::with_path(path)?;

    let yuyv = FourCC::new(b"YUYV");
    let format = device
        .set_format(&Format::new(CAPTURE_WIDTH, CAPTURE_HEIGHT, yuyv))
        .map_err(|e| BackendError::OverConstrained(format!("failed to set format: {}", e)))?;

    if format.fourcc != yuyv {
        return Err(BackendError::OverConstrained(format!(
            "device negotiated {} instead of YUYV",
            format.fourcc
        )));
    }

    info!(
        path,
        width = format.width,
        height = format.height,
        "V4L2 capture format configured"
    );

    let stream = Stream::with_buffers(&device, Type::VideoCapture, CAPTURE_BUFFER_COUNT)
        .map_err(|e| BackendError::InitializationFailed(format!("failed to create stream: {}", e)))?;

    Ok(V4l2Capture {
        stream,
        _device: device,
        width: format.width,
        height: format.height,
    })
}

impl DecodePlatform for V4l2Platform {
    fn enumerate_devices(&self) -> BoxFuture<'_, BackendResult<Vec<CaptureDevice>>> {
        let dev_dir = self.dev_dir.clone();
        async move {
            tokio::task::spawn_blocking(move || scan_video_nodes(&dev_dir))
                .await
                .map_err(|e| BackendError::Other(e.to_string()))?
        }
        .boxed()
    }

    fn start_capture(&self, request: CaptureRequest) -> BoxFuture<'_, BackendResult<CaptureHandle>> {
        async move {
            let device = self.resolve_device(&request.device).await?;
            info!(device = %device, "Starting V4L2 capture");

            let decoder = QrDecoder::new(Some(request.config.scan_region));
            let events = request.events;
            let path = device.id.clone();

            self.registry
                .launch(
                    &device.id,
                    &request.render_target,
                    request.config.decode_interval(),
                    move || open_capture(&path),
                    move |capture: &mut V4l2Capture| {
                        if events.is_cancelled() {
                            return LoopAction::Stop;
                        }

                        let (width, height) = (capture.width, capture.height);
                        let luma = match capture.stream.next() {
                            Ok((buf, _meta)) => yuyv_to_luma(buf, width, height),
                            Err(e) => {
                                warn!(error = %e, "Failed to capture frame");
                                return if events.frame_error(e.to_string()) {
                                    LoopAction::Continue
                                } else {
                                    LoopAction::Stop
                                };
                            }
                        };

                        for text in decoder.decode(&LumaFrame::packed(&luma, width, height)) {
                            if !events.decoded(text) {
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
        "v4l2"
    }
}
