//! Source handles accepted by capture backends.

use std::{fmt, path::PathBuf, str::FromStr};

/// Transport behind a [`SourceHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Local capture device addressed by index.
    Camera,
    /// Pre-recorded video or image sequence on disk.
    File,
}

/// Camera index or file path identifying what the pipeline reads from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SourceHandle {
    Camera(i32),
    File(PathBuf),
}

impl SourceHandle {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceHandle::Camera(_) => SourceKind::Camera,
            SourceHandle::File(_) => SourceKind::File,
        }
    }

    pub fn is_camera(&self) -> bool {
        matches!(self, SourceHandle::Camera(_))
    }
}

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceHandle::Camera(index) => write!(f, "{index}"),
            SourceHandle::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl From<i32> for SourceHandle {
    fn from(index: i32) -> Self {
        SourceHandle::Camera(index)
    }
}

impl FromStr for SourceHandle {
    type Err = std::convert::Infallible;

    /// Integers and `/dev/videoN` paths address cameras; anything else is a file.
    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let uri = uri.trim();
        Ok(match parse_device_index(uri) {
            Some(index) => SourceHandle::Camera(index),
            None => SourceHandle::File(PathBuf::from(uri)),
        })
    }
}

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub(crate) fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return (index >= 0).then_some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            return stripped.parse::<i32>().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_and_device_nodes_are_cameras() {
        assert_eq!("0".parse::<SourceHandle>(), Ok(SourceHandle::Camera(0)));
        assert_eq!(
            "/dev/video2".parse::<SourceHandle>(),
            Ok(SourceHandle::Camera(2))
        );
        assert_eq!(" 3 ".parse::<SourceHandle>(), Ok(SourceHandle::Camera(3)));
    }

    #[test]
    fn everything_else_is_a_file() {
        assert_eq!(
            "uploads/clip.mp4".parse::<SourceHandle>(),
            Ok(SourceHandle::File(PathBuf::from("uploads/clip.mp4")))
        );
        assert_eq!(
            "/dev/video".parse::<SourceHandle>(),
            Ok(SourceHandle::File(PathBuf::from("/dev/video")))
        );
        assert_eq!("-1".parse::<SourceHandle>().map(|h| h.kind()), Ok(SourceKind::File));
    }

    #[test]
    fn display_round_trips_the_parsed_handle() {
        assert_eq!(SourceHandle::Camera(1).to_string(), "1");
        assert_eq!(
            SourceHandle::File(PathBuf::from("a/b.avi")).to_string(),
            "a/b.avi"
        );
    }
}
