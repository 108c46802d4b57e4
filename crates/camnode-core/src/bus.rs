//! Names shared between the daemon and its clients.

/// Well-known D-Bus name owned by `camnoded`.
pub const BUS_NAME: &str = "io.camnode.Camera1";

/// Object path of the camera interface.
pub const OBJECT_PATH: &str = "/io/camnode/Camera1";

/// Interface name for method calls and signals.
pub const INTERFACE: &str = "io.camnode.Camera1";

pub const IMAGE_RAW_TOPIC: &str = "camera/image_raw";
pub const CAMERA_INFO_TOPIC: &str = "camera/camera_info";
pub const SET_CAMERA_INFO_SERVICE: &str = "set_camera_info";

/// Qualify a relative topic or service name with a namespace.
///
/// `("", "camera/image_raw")` becomes `/camera/image_raw`,
/// `("/left/", "camera/image_raw")` becomes `/left/camera/image_raw`.
pub fn qualify(namespace: &str, name: &str) -> String {
    let ns = namespace.trim_matches('/');
    if ns.is_empty() {
        format!("/{name}")
    } else {
        format!("/{ns}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify_root_namespace() {
        assert_eq!(qualify("", IMAGE_RAW_TOPIC), "/camera/image_raw");
        assert_eq!(qualify("/", CAMERA_INFO_TOPIC), "/camera/camera_info");
    }

    #[test]
    fn test_qualify_nested_namespace() {
        assert_eq!(qualify("/left/", SET_CAMERA_INFO_SERVICE), "/left/set_camera_info");
        assert_eq!(qualify("stereo/left", IMAGE_RAW_TOPIC), "/stereo/left/camera/image_raw");
    }
}
