//! Scripted frame source and settings shared by the daemon's tests.

use crate::engine::NodeSettings;
use camnode_hw::{CameraError, Frame, FrameSource};
use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

/// Plays back a fixed sequence of capture results, then keeps producing
/// frames if `endless` is set, or fails otherwise.
pub(crate) struct ScriptedSource {
    width: u32,
    height: u32,
    script: VecDeque<Result<u8, ()>>,
    endless: bool,
    sequence: u32,
}

impl ScriptedSource {
    pub(crate) fn new(width: u32, height: u32, script: Vec<Result<u8, ()>>) -> Self {
        Self {
            width,
            height,
            script: script.into(),
            endless: false,
            sequence: 0,
        }
    }

    pub(crate) fn endless(width: u32, height: u32) -> Self {
        Self {
            endless: true,
            ..Self::new(width, height, Vec::new())
        }
    }
}

impl FrameSource for ScriptedSource {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let fill = match self.script.pop_front() {
            Some(Ok(v)) => v,
            Some(Err(())) => return Err(CameraError::CaptureFailed("scripted failure".into())),
            None if self.endless => 128,
            None => return Err(CameraError::CaptureFailed("script exhausted".into())),
        };
        self.sequence += 1;
        Ok(Frame {
            data: vec![fill; (self.width * self.height * 3) as usize],
            width: self.width,
            height: self.height,
            sequence: self.sequence,
            timestamp: Instant::now(),
        })
    }
}

pub(crate) fn settings(dir: &Path) -> NodeSettings {
    NodeSettings {
        frame_id: "camera_link".into(),
        namespace: "/my_camera".into(),
        node_name: "simple_camera_node".into(),
        camera_info_path: dir.join("camera_info/my_camera.yaml"),
        frame_period: Duration::from_millis(10),
    }
}
