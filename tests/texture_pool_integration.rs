use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use swipe_compare::UploadError;
use swipe_compare::gpu::{HeadlessUploader, TextureUploader};
use swipe_compare::texture::{PixelBuffer, TextureHandle, TextureId, TextureStatus};
use swipe_compare::texture_pool::TexturePool;

fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]))
        .save(&path)
        .unwrap();
    path
}

fn settle(pool: &TexturePool, uploader: &mut dyn TextureUploader) -> Vec<TextureHandle> {
    let deadline = Instant::now() + Duration::from_secs(20);
    let mut ready = Vec::new();
    loop {
        match pool.upload(uploader) {
            Ok(batch) => {
                assert!(batch.failed.is_empty(), "{:?}", batch.failed);
                ready.extend(batch.ready);
            }
            Err(err) => panic!("upload failed: {err}"),
        }
        if pool.has_no_pending_tasks() {
            return ready;
        }
        assert!(Instant::now() < deadline, "pool did not settle");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn every_request_becomes_ready() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = (0..8)
        .map(|i| write_png(dir.path(), &format!("{i}.png"), 4 + i, 3))
        .collect();

    let mut pool = TexturePool::new();
    pool.initialize(3);
    let handles: Vec<_> = paths.iter().map(|p| pool.acquire_texture(p)).collect();

    let mut uploader = HeadlessUploader::new();
    let ready = settle(&pool, &mut uploader);
    assert_eq!(ready.len(), 8);
    assert_eq!(uploader.len(), 8);
    assert_eq!(pool.decode_count(), 8);
    assert_eq!(pool.pending_uploads(), 0);
    assert_eq!(pool.outstanding(), 0);

    for (i, handle) in handles.iter().enumerate() {
        assert!(handle.is_ready());
        assert_eq!(handle.dimensions(), (4 + i as u32, 3));
        let uploaded = uploader.get(handle.gpu_id().unwrap()).unwrap();
        assert_eq!(uploaded.width, 4 + i as u32);
    }
    pool.release();
}

#[test]
fn bad_file_does_not_block_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_png(dir.path(), "good.png", 2, 2);
    let bad = dir.path().join("bad.png");
    std::fs::write(&bad, b"definitely not a png").unwrap();

    let mut pool = TexturePool::new();
    pool.initialize(2);
    let bad = pool.acquire_texture(&bad);
    let missing = pool.acquire_texture(dir.path().join("missing.png"));
    let good = pool.acquire_texture(&good);

    let mut uploader = HeadlessUploader::new();
    let ready = settle(&pool, &mut uploader);
    assert_eq!(ready.len(), 1);
    assert!(good.is_ready());
    assert_eq!(bad.status(), TextureStatus::Failed);
    assert_eq!(missing.status(), TextureStatus::Failed);
    assert_eq!(bad.gpu_id(), None);
}

#[test]
fn concurrent_acquires_share_one_texture() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_png(dir.path(), "shared.png", 5, 5);

    let mut pool = TexturePool::new();
    pool.initialize(4);
    let handles: Vec<TextureHandle> = thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| pool.acquire_texture(&path)))
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(pool.len(), 1);
    assert!(handles.windows(2).all(|w| TextureHandle::ptr_eq(&w[0], &w[1])));
    assert_eq!(handles[0].owner_count(), 8);

    let mut uploader = HeadlessUploader::new();
    settle(&pool, &mut uploader);
    assert_eq!(pool.decode_count(), 1);
    assert_eq!(uploader.upload_count(), 1);
}

#[test]
fn cleaning_releases_unreferenced_textures() {
    let dir = tempfile::tempdir().unwrap();
    let a_path = write_png(dir.path(), "a.png", 2, 2);
    let b_path = write_png(dir.path(), "b.png", 3, 3);

    let mut pool = TexturePool::new();
    pool.initialize(2);
    let a = pool.acquire_texture(&a_path);
    let b = pool.acquire_texture(&b_path);
    let mut uploader = HeadlessUploader::new();
    settle(&pool, &mut uploader);
    assert_eq!(uploader.len(), 2);

    drop(a);
    assert_eq!(pool.clean_unused_textures(&mut uploader), 1);
    assert_eq!(pool.len(), 1);
    assert_eq!(uploader.len(), 1);
    assert!(b.is_ready());

    // A cleaned path is loaded again from scratch.
    let again = pool.acquire_texture(&a_path);
    assert!(!again.is_ready());
    settle(&pool, &mut uploader);
    assert!(again.is_ready());
    assert_eq!(pool.decode_count(), 3);
}

#[test]
fn cleaning_keeps_textures_in_flight() {
    let mut pool = TexturePool::new();
    let handle = pool.acquire_texture("queued.png");
    drop(handle);

    let mut uploader = HeadlessUploader::new();
    assert_eq!(pool.clean_unused_textures(&mut uploader), 0);
    assert_eq!(pool.len(), 1);
}

/// Refuses anything wider than `max_width`, or everything once the
/// device is gone.
struct LimitedUploader {
    inner: HeadlessUploader,
    max_width: u32,
    lost: bool,
}

impl LimitedUploader {
    fn new(max_width: u32) -> Self {
        Self {
            inner: HeadlessUploader::new(),
            max_width,
            lost: false,
        }
    }
}

impl TextureUploader for LimitedUploader {
    fn upload(
        &mut self,
        existing: Option<TextureId>,
        pixels: &PixelBuffer,
    ) -> Result<TextureId, UploadError> {
        if self.lost {
            return Err(UploadError::Device("lost".into()));
        }
        if pixels.width > self.max_width {
            return Err(UploadError::TooLarge {
                width: pixels.width,
                height: pixels.height,
                limit: self.max_width,
            });
        }
        self.inner.upload(existing, pixels)
    }

    fn release(&mut self, id: TextureId) {
        self.inner.release(id);
    }
}

fn wait_for_decodes(pool: &TexturePool, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(20);
    while pool.pending_uploads() < count {
        assert!(Instant::now() < deadline, "decodes never finished");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn oversized_texture_fails_alone() {
    let dir = tempfile::tempdir().unwrap();
    let big_path = write_png(dir.path(), "big.png", 16, 4);
    let small_path = write_png(dir.path(), "small.png", 4, 4);

    let mut pool = TexturePool::new();
    pool.initialize(2);
    let big = pool.acquire_texture(&big_path);
    let small = pool.acquire_texture(&small_path);
    wait_for_decodes(&pool, 2);

    let mut uploader = LimitedUploader::new(8);
    let batch = pool.upload(&mut uploader).unwrap();
    assert_eq!(batch.ready.len(), 1);
    assert!(TextureHandle::ptr_eq(&batch.ready[0], &small));
    assert_eq!(batch.failed.len(), 1);
    assert!(TextureHandle::ptr_eq(&batch.failed[0].0, &big));
    assert!(matches!(batch.failed[0].1, UploadError::TooLarge { limit: 8, .. }));
    drop(batch);

    assert!(small.is_ready());
    assert_eq!(big.status(), TextureStatus::Failed);
    assert!(pool.has_no_pending_tasks());

    // A failed path is loaded again on the next request.
    uploader.max_width = 32;
    let retried = pool.acquire_texture(&big_path);
    assert!(TextureHandle::ptr_eq(&retried, &big));
    assert!(!pool.has_no_pending_tasks());
    settle(&pool, &mut uploader);
    assert!(big.is_ready());
    assert_eq!(pool.len(), 2);
}

#[test]
fn device_loss_requeues_the_rest_of_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = (0..3)
        .map(|i| write_png(dir.path(), &format!("{i}.png"), 2, 2))
        .collect();

    let mut pool = TexturePool::new();
    pool.initialize(2);
    let handles: Vec<_> = paths.iter().map(|p| pool.acquire_texture(p)).collect();
    wait_for_decodes(&pool, 3);

    let mut uploader = LimitedUploader::new(8);
    uploader.lost = true;
    let err = pool.upload(&mut uploader).unwrap_err();
    assert!(matches!(err, UploadError::Device(_)));
    assert_eq!(pool.pending_uploads(), 2);
    assert_eq!(pool.outstanding(), 2);

    uploader.lost = false;
    let batch = pool.upload(&mut uploader).unwrap();
    assert_eq!(batch.ready.len(), 2);
    assert!(pool.has_no_pending_tasks());
    let failed = handles
        .iter()
        .filter(|h| h.status() == TextureStatus::Failed)
        .count();
    assert_eq!(failed, 1);
}

struct RejectingUploader;

impl TextureUploader for RejectingUploader {
    fn upload(
        &mut self,
        _existing: Option<TextureId>,
        pixels: &PixelBuffer,
    ) -> Result<TextureId, UploadError> {
        Err(UploadError::TooLarge {
            width: pixels.width,
            height: pixels.height,
            limit: 1,
        })
    }

    fn release(&mut self, _id: TextureId) {}
}

#[test]
fn upload_failure_marks_texture_failed() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_png(dir.path(), "big.png", 4, 4);

    let mut pool = TexturePool::new();
    pool.initialize(1);
    let handle = pool.acquire_texture(&path);
    wait_for_decodes(&pool, 1);

    let batch = pool.upload(&mut RejectingUploader).unwrap();
    assert!(batch.ready.is_empty());
    assert_eq!(batch.failed.len(), 1);
    assert!(matches!(batch.failed[0].1, UploadError::TooLarge { limit: 1, .. }));
    assert_eq!(handle.status(), TextureStatus::Failed);
    assert!(pool.has_no_pending_tasks());
}
