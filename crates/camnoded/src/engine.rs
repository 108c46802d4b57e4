use crate::topics::Topics;
use camnode_core::bus::{self, SET_CAMERA_INFO_SERVICE};
use camnode_core::{
    default_camera_info, load_camera_info, save_camera_info, url, CameraInfo, Header, Image, Time,
};
use camnode_hw::FrameSource;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};

/// Longest the capture thread sleeps before looking for requests again.
const REQUEST_POLL: Duration = Duration::from_millis(5);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to spawn capture thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Node identity and timing, fixed at startup.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub frame_id: String,
    pub namespace: String,
    pub node_name: String,
    pub camera_info_path: PathBuf,
    pub frame_period: Duration,
}

impl NodeSettings {
    fn camera_name(&self) -> String {
        url::camera_name(&self.namespace, &self.node_name)
    }
}

/// Reply to a `set_camera_info` call.
#[derive(Debug, Clone)]
pub struct SetCameraInfoResponse {
    pub success: bool,
    pub status_message: String,
}

/// Snapshot of the node's counters and configuration.
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub width: u32,
    pub height: u32,
    pub frame_id: String,
    pub published: u64,
    pub read_failures: u64,
    pub calibrated: bool,
    pub camera_info_path: PathBuf,
    pub image_topic: String,
    pub camera_info_topic: String,
    pub service: String,
}

/// Messages sent from D-Bus handlers to the capture thread.
enum EngineRequest {
    SetCameraInfo {
        info: CameraInfo,
        reply: oneshot::Sender<SetCameraInfoResponse>,
    },
    GetCameraInfo {
        reply: oneshot::Sender<CameraInfo>,
    },
    LatestImage {
        reply: oneshot::Sender<Option<Arc<Image>>>,
    },
    Status {
        reply: oneshot::Sender<NodeStatus>,
    },
}

/// Clone-safe handle to the capture thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Replace the current calibration and persist it.
    pub async fn set_camera_info(
        &self,
        info: CameraInfo,
    ) -> Result<SetCameraInfoResponse, EngineError> {
        self.request(|reply| EngineRequest::SetCameraInfo { info, reply })
            .await
    }

    pub async fn camera_info(&self) -> Result<CameraInfo, EngineError> {
        self.request(|reply| EngineRequest::GetCameraInfo { reply }).await
    }

    /// Most recently published image, if any frame has been captured yet.
    pub async fn latest_image(&self) -> Result<Option<Arc<Image>>, EngineError> {
        self.request(|reply| EngineRequest::LatestImage { reply }).await
    }

    pub async fn status(&self) -> Result<NodeStatus, EngineError> {
        self.request(|reply| EngineRequest::Status { reply }).await
    }
}

/// Camera-node state owned by the capture thread.
struct CameraNode<S> {
    source: S,
    settings: NodeSettings,
    topics: Topics,
    camera_info: CameraInfo,
    latest: Option<Arc<Image>>,
    published: u64,
    read_failures: u64,
    read_failure_warned: bool,
}

impl<S: FrameSource> CameraNode<S> {
    fn new(source: S, settings: NodeSettings, topics: Topics) -> Self {
        let camera_info = initial_camera_info(&settings, source.resolution());
        Self {
            source,
            settings,
            topics,
            camera_info,
            latest: None,
            published: 0,
            read_failures: 0,
            read_failure_warned: false,
        }
    }

    /// Capture one frame and publish it with a matching camera info.
    fn tick(&mut self) {
        let frame = match self.source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.read_failures += 1;
                if !self.read_failure_warned {
                    self.read_failure_warned = true;
                    tracing::warn!(error = %e, "camera read failed (further warnings suppressed)");
                }
                return;
            }
        };

        let header = Header {
            stamp: Time::now(),
            frame_id: self.settings.frame_id.clone(),
        };
        let stamp = header.stamp;
        let image = Arc::new(Image::bgr8(header, frame.width, frame.height, frame.data));
        self.topics.image_raw.publish(Arc::clone(&image));
        self.latest = Some(image);

        let info = self.camera_info.stamped(stamp, &self.settings.frame_id);
        self.topics.camera_info.publish(info);

        self.published += 1;
        tracing::trace!(seq = frame.sequence, "frame published");
    }

    fn set_camera_info(&mut self, mut info: CameraInfo) -> SetCameraInfoResponse {
        if info.header.frame_id.is_empty() {
            info.header.frame_id = self.settings.frame_id.clone();
        }
        if info.width == 0 || info.height == 0 {
            let (w, h) = self.source.resolution();
            if w != 0 {
                info.width = w;
            }
            if h != 0 {
                info.height = h;
            }
        }

        self.camera_info = info;
        match save_camera_info(
            &self.camera_info,
            &self.settings.camera_info_path,
            &self.settings.camera_name(),
        ) {
            Ok(path) => {
                let status_message = format!("Camera info saved to {}", path.display());
                tracing::info!("{status_message}");
                SetCameraInfoResponse {
                    success: true,
                    status_message,
                }
            }
            Err(e) => {
                let status_message = format!("Error saving camera info: {e}");
                tracing::error!("{status_message}");
                SetCameraInfoResponse {
                    success: false,
                    status_message,
                }
            }
        }
    }

    fn status(&self) -> NodeStatus {
        let (width, height) = self.source.resolution();
        NodeStatus {
            width,
            height,
            frame_id: self.settings.frame_id.clone(),
            published: self.published,
            read_failures: self.read_failures,
            calibrated: self.camera_info.is_calibrated(),
            camera_info_path: self.settings.camera_info_path.clone(),
            image_topic: self.topics.image_raw.name().to_string(),
            camera_info_topic: self.topics.camera_info.name().to_string(),
            service: bus::qualify(&self.settings.namespace, SET_CAMERA_INFO_SERVICE),
        }
    }

    fn handle(&mut self, req: EngineRequest) {
        match req {
            EngineRequest::SetCameraInfo { info, reply } => {
                let _ = reply.send(self.set_camera_info(info));
            }
            EngineRequest::GetCameraInfo { reply } => {
                let _ = reply.send(self.camera_info.clone());
            }
            EngineRequest::LatestImage { reply } => {
                let _ = reply.send(self.latest.clone());
            }
            EngineRequest::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }
}

/// Calibration from disk if present and readable, otherwise the
/// uncalibrated placeholder sized to the camera.
fn initial_camera_info(settings: &NodeSettings, resolution: (u32, u32)) -> CameraInfo {
    let path = &settings.camera_info_path;
    if path.exists() {
        match load_camera_info(path) {
            Ok(mut info) => {
                if info.header.frame_id.is_empty() {
                    info.header.frame_id = settings.frame_id.clone();
                }
                tracing::info!(path = %path.display(), "loaded camera_info");
                return info;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to load camera_info");
            }
        }
    }

    tracing::info!("using default (uninitialized) camera_info until a calibrator updates it");
    default_camera_info(resolution.0, resolution.1, &settings.frame_id)
}

/// Spawn the camera node on a dedicated OS thread.
///
/// The thread publishes one frame per `frame_period` and services
/// requests between ticks. It exits once every [`EngineHandle`] is
/// dropped, releasing the source.
pub fn spawn_engine<S>(
    source: S,
    settings: NodeSettings,
    topics: Topics,
) -> Result<EngineHandle, EngineError>
where
    S: FrameSource + 'static,
{
    let period = settings.frame_period;
    let mut node = CameraNode::new(source, settings, topics);
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("camnode-capture".into())
        .spawn(move || {
            tracing::info!(period_ms = period.as_millis() as u64, "capture thread started");
            let mut next_tick = Instant::now();
            loop {
                loop {
                    match rx.try_recv() {
                        Ok(req) => node.handle(req),
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            tracing::info!("capture thread exiting");
                            return;
                        }
                    }
                }

                let now = Instant::now();
                if now >= next_tick {
                    node.tick();
                    next_tick += period;
                    // Fell behind (slow camera): restart the schedule instead of bursting.
                    if next_tick < now {
                        next_tick = now + period;
                    }
                } else {
                    std::thread::sleep((next_tick - now).min(REQUEST_POLL));
                }
            }
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
