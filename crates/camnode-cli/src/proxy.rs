//! Client side of the `io.camnode.Camera1` interface.

use zbus::proxy;

#[proxy(
    interface = "io.camnode.Camera1",
    default_service = "io.camnode.Camera1",
    default_path = "/io/camnode/Camera1"
)]
pub trait CameraNode {
    fn set_camera_info(&self, camera_info: &str) -> zbus::Result<(bool, String)>;

    fn get_camera_info(&self) -> zbus::Result<String>;

    fn capture_image(&self) -> zbus::Result<(u32, u32, String, Vec<u8>)>;

    fn status(&self) -> zbus::Result<String>;

    #[zbus(signal)]
    fn frame_published(&self, sec: i32, nanosec: u32, frame_id: String) -> zbus::Result<()>;
}
