//! Camera-info URL resolution.

use std::path::{Path, PathBuf};

const FILE_SCHEME: &str = "file://";

/// Name a camera is stored under: its namespace without slashes, or the
/// node name when it runs in the root namespace.
pub fn camera_name(namespace: &str, node_name: &str) -> String {
    let ns = namespace.trim_matches('/');
    if ns.is_empty() {
        node_name.to_string()
    } else {
        ns.to_string()
    }
}

/// Directory that holds per-camera calibration files.
pub fn default_camera_info_dir(home: &Path) -> PathBuf {
    home.join(".ros").join("camera_info")
}

/// Resolve a `camera_info_url` parameter to a file path.
///
/// `file:///x.yaml` and `/x.yaml` both name `/x.yaml`. An empty URL picks
/// `<home>/.ros/camera_info/<camera_name>.yaml`.
pub fn resolve_camera_info_path(
    url: &str,
    namespace: &str,
    node_name: &str,
    home: &Path,
) -> PathBuf {
    if let Some(path) = url.strip_prefix(FILE_SCHEME) {
        return PathBuf::from(path);
    }
    if !url.is_empty() {
        return PathBuf::from(url);
    }
    default_camera_info_dir(home).join(format!("{}.yaml", camera_name(namespace, node_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_scheme() {
        let p = resolve_camera_info_path("file:///etc/cam/left.yaml", "", "node", Path::new("/home/u"));
        assert_eq!(p, PathBuf::from("/etc/cam/left.yaml"));
    }

    #[test]
    fn test_plain_path() {
        let p = resolve_camera_info_path("calib/ost.yaml", "", "node", Path::new("/home/u"));
        assert_eq!(p, PathBuf::from("calib/ost.yaml"));
    }

    #[test]
    fn test_default_uses_namespace() {
        let p = resolve_camera_info_path("", "/my_camera/", "simple_camera_node", Path::new("/home/u"));
        assert_eq!(p, PathBuf::from("/home/u/.ros/camera_info/my_camera.yaml"));
    }

    #[test]
    fn test_default_uses_node_name_in_root_namespace() {
        let p = resolve_camera_info_path("", "/", "simple_camera_node", Path::new("/home/u"));
        assert_eq!(
            p,
            PathBuf::from("/home/u/.ros/camera_info/simple_camera_node.yaml")
        );
    }

    #[test]
    fn test_camera_name() {
        assert_eq!(camera_name("", "n"), "n");
        assert_eq!(camera_name("/front", "n"), "front");
    }
}
