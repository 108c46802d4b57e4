use crate::engine::{EngineError, EngineHandle};
use camnode_core::bus::OBJECT_PATH;
use camnode_core::CameraInfo;
use std::future::Future;
use tokio::sync::broadcast::{self, error::RecvError};
use zbus::interface;
use zbus::object_server::SignalEmitter;

/// D-Bus interface for the camera node.
///
/// Bus name: io.camnode.Camera1
/// Object path: /io/camnode/Camera1
pub struct CameraService {
    engine: EngineHandle,
}

impl CameraService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

fn engine_error(e: EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

#[interface(name = "io.camnode.Camera1")]
impl CameraService {
    /// Store a new calibration, given as camera-info JSON. Called by
    /// calibration tools once they have a result.
    async fn set_camera_info(&self, camera_info: &str) -> zbus::fdo::Result<(bool, String)> {
        let info: CameraInfo = serde_json::from_str(camera_info)
            .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("invalid camera info: {e}")))?;
        tracing::info!(
            width = info.width,
            height = info.height,
            model = %info.distortion_model,
            "set_camera_info requested"
        );
        let resp = self
            .engine
            .set_camera_info(info)
            .await
            .map_err(engine_error)?;
        Ok((resp.success, resp.status_message))
    }

    /// Current calibration as JSON.
    async fn get_camera_info(&self) -> zbus::fdo::Result<String> {
        let info = self.engine.camera_info().await.map_err(engine_error)?;
        serde_json::to_string(&info).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Latest published frame as (width, height, encoding, data).
    async fn capture_image(&self) -> zbus::fdo::Result<(u32, u32, String, Vec<u8>)> {
        let image = self
            .engine
            .latest_image()
            .await
            .map_err(engine_error)?
            .ok_or_else(|| zbus::fdo::Error::Failed("no frame captured yet".into()))?;
        Ok((
            image.width,
            image.height,
            image.encoding.clone(),
            image.data.clone(),
        ))
    }

    /// Return node status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(engine_error)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "width": status.width,
            "height": status.height,
            "frame_id": status.frame_id,
            "published": status.published,
            "read_failures": status.read_failures,
            "calibrated": status.calibrated,
            "camera_info_path": status.camera_info_path.display().to_string(),
            "topics": [status.image_topic, status.camera_info_topic],
            "service": status.service,
        })
        .to_string())
    }

    /// Emitted for every published frame.
    #[zbus(signal)]
    async fn frame_published(
        emitter: &SignalEmitter<'_>,
        sec: i32,
        nanosec: u32,
        frame_id: &str,
    ) -> zbus::Result<()>;
}

/// Forward the camera_info topic to the `FramePublished` signal.
///
/// Runs until the topic closes (capture thread gone).
pub async fn relay_frames(conn: zbus::Connection, rx: broadcast::Receiver<CameraInfo>) {
    let emitter = match SignalEmitter::new(&conn, OBJECT_PATH) {
        Ok(emitter) => emitter,
        Err(e) => {
            tracing::warn!(error = %e, "cannot emit frame signals");
            return;
        }
    };
    let emitter = &emitter;

    forward_frames(rx, move |info| async move {
        let stamp = info.header.stamp;
        CameraService::frame_published(emitter, stamp.sec, stamp.nanosec, &info.header.frame_id)
            .await
    })
    .await;
}

/// Hand every received camera info to `emit` until the topic closes.
/// Failed emits and lagged receives are logged and skipped.
async fn forward_frames<F, Fut>(mut rx: broadcast::Receiver<CameraInfo>, mut emit: F)
where
    F: FnMut(CameraInfo) -> Fut,
    Fut: Future<Output = zbus::Result<()>>,
{
    loop {
        match rx.recv().await {
            Ok(info) => {
                if let Err(e) = emit(info).await {
                    tracing::debug!(error = %e, "frame signal not sent");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "signal relay lagging");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use crate::testing::{settings, ScriptedSource};
    use crate::topics::Topics;
    use camnode_core::Time;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn service(source: ScriptedSource, dir: &std::path::Path) -> CameraService {
        let engine = spawn_engine(source, settings(dir), Topics::new("/my_camera")).unwrap();
        CameraService::new(engine)
    }

    #[tokio::test]
    async fn test_set_camera_info_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(ScriptedSource::endless(4, 2), dir.path());

        let err = svc.set_camera_info("{not json").await.unwrap_err();
        assert!(matches!(err, zbus::fdo::Error::InvalidArgs(_)), "{err:?}");
        // Nothing was written for the rejected call.
        assert!(!settings(dir.path()).camera_info_path.exists());
    }

    #[tokio::test]
    async fn test_capture_image_before_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        // Every read fails, so no frame is ever published.
        let svc = service(ScriptedSource::new(4, 2, vec![]), dir.path());

        match svc.capture_image().await {
            Err(zbus::fdo::Error::Failed(msg)) => assert_eq!(msg, "no frame captured yet"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_capture_image_returns_latest_frame() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(ScriptedSource::endless(4, 2), dir.path());

        let image = loop {
            match svc.capture_image().await {
                Ok(image) => break image,
                Err(_) => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        };
        let (width, height, encoding, data) = image;
        assert_eq!((width, height), (4, 2));
        assert_eq!(encoding, "bgr8");
        assert_eq!(data.len(), 24);
    }

    #[tokio::test]
    async fn test_camera_info_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(ScriptedSource::endless(640, 480), dir.path());

        let json = r#"{"d":[0.1,-0.2,0.0,0.0,0.0],"k":[600,0,320,0,600,240,0,0,1],"p":[600,0,320,0,0,600,240,0,0,0,1,0]}"#;
        let (success, message) = svc.set_camera_info(json).await.unwrap();
        assert!(success, "{message}");
        assert!(message.starts_with("Camera info saved to "));

        let info: CameraInfo = serde_json::from_str(&svc.get_camera_info().await.unwrap()).unwrap();
        assert_eq!(info.k[0], 600.0);
        assert_eq!(info.d, vec![0.1, -0.2, 0.0, 0.0, 0.0]);
        assert_eq!((info.width, info.height), (640, 480));
        assert_eq!(info.header.frame_id, "camera_link");

        let status: serde_json::Value = serde_json::from_str(&svc.status().await.unwrap()).unwrap();
        assert_eq!(status["calibrated"], true);
        assert_eq!(status["service"], "/my_camera/set_camera_info");
    }

    fn stamped(sec: i32, frame_id: &str) -> CameraInfo {
        CameraInfo::default().stamped(Time { sec, nanosec: 0 }, frame_id)
    }

    #[tokio::test]
    async fn test_forward_frames_stops_when_topic_closes() {
        let (tx, rx) = broadcast::channel(8);
        tx.send(stamped(1, "a")).unwrap();
        tx.send(stamped(2, "b")).unwrap();
        tx.send(stamped(3, "c")).unwrap();
        drop(tx);

        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        let relay = forward_frames(rx, |info| {
            let seen_tx = seen_tx.clone();
            async move {
                let sec = info.header.stamp.sec;
                seen_tx.send(sec).ok();
                // A failed emit must not end the relay.
                if sec == 2 {
                    return Err(zbus::Error::Failure("bus gone".into()));
                }
                Ok(())
            }
        });
        tokio::time::timeout(Duration::from_secs(5), relay).await.unwrap();

        let mut secs = Vec::new();
        while let Ok(sec) = seen.try_recv() {
            secs.push(sec);
        }
        assert_eq!(secs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_forward_frames_survives_lag() {
        let (tx, rx) = broadcast::channel(2);
        for sec in 0..6 {
            tx.send(stamped(sec, "lagged")).unwrap();
        }
        drop(tx);

        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        let relay = forward_frames(rx, |info| {
            let seen_tx = seen_tx.clone();
            async move {
                seen_tx.send(info.header.stamp.sec).ok();
                Ok::<(), zbus::Error>(())
            }
        });
        tokio::time::timeout(Duration::from_secs(5), relay).await.unwrap();

        // Only the newest messages survive; the relay still drains them.
        let mut secs = Vec::new();
        while let Ok(sec) = seen.try_recv() {
            secs.push(sec);
        }
        assert_eq!(secs, vec![4, 5]);
    }
}
