use std::{
    fs,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use image::{Rgb, RgbImage};
use video_ingest::{CaptureBackend, FrameFormat, ImageSequenceBackend, SourceHandle};

fn scratch_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let dir = std::env::temp_dir().join(format!("video-ingest-{name}-{nanos}"));
    fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

#[test]
fn replays_directory_in_lexical_order_then_fails_reads() {
    let dir = scratch_dir("ordered");
    RgbImage::from_pixel(4, 2, Rgb([200, 0, 0]))
        .save(dir.join("b.png"))
        .expect("write b");
    RgbImage::from_pixel(4, 2, Rgb([0, 200, 0]))
        .save(dir.join("a.png"))
        .expect("write a");
    fs::write(dir.join("notes.txt"), b"ignored").expect("write txt");

    let backend = ImageSequenceBackend::new().with_frame_rate(12.0);
    let mut capture = backend
        .open(&SourceHandle::File(dir.clone()))
        .expect("sequence opens");
    assert!(capture.is_opened());
    assert_eq!(capture.frame_rate(), Some(12.0));

    let first = capture.read().expect("first frame");
    assert_eq!(first.format, FrameFormat::Rgb8);
    assert_eq!((first.width, first.height), (4, 2));
    assert_eq!(&first.data[..3], &[0, 200, 0]);

    let second = capture.read().expect("second frame");
    assert_eq!(&second.data[..3], &[200, 0, 0]);

    assert!(capture.read().is_err());
    capture.release();
    assert!(!capture.is_opened());

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn fits_frames_inside_the_working_resolution() {
    let dir = scratch_dir("resize");
    let square = dir.join("a_square.png");
    RgbImage::from_pixel(8, 8, Rgb([9, 9, 9]))
        .save(&square)
        .expect("write square");
    RgbImage::from_pixel(16, 8, Rgb([9, 9, 9]))
        .save(dir.join("b_wide.png"))
        .expect("write wide");

    let mut capture = ImageSequenceBackend::new()
        .open(&SourceHandle::File(dir.clone()))
        .expect("directory opens");
    capture.set_resolution(4, 2);

    let frame = capture.read().expect("square frame");
    assert_eq!((frame.width, frame.height), (2, 2));
    assert_eq!(frame.data.len(), 2 * 2 * 3);

    let frame = capture.read().expect("wide frame");
    assert_eq!((frame.width, frame.height), (4, 2));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn missing_paths_and_cameras_are_unavailable() {
    let backend = ImageSequenceBackend::new();
    assert!(
        backend
            .open(&SourceHandle::File(PathBuf::from("/definitely/not/here")))
            .is_err()
    );
    assert!(backend.open(&SourceHandle::Camera(0)).is_err());
    assert!(backend.probe_cameras(5).is_empty());

    let empty = scratch_dir("empty");
    assert!(backend.open(&SourceHandle::File(empty.clone())).is_err());
    let _ = fs::remove_dir_all(empty);
}
