//! Request-driven texture loading.
//!
//! `acquire_texture` registers a path and queues a load request. Worker
//! threads decode files off-thread and park the pixel buffers on an upload
//! queue; the thread owning the graphics device drains that queue with
//! `upload` once per frame.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use tracing::{debug, debug_span, error, info, warn};

use crate::error::UploadError;
use crate::gpu::TextureUploader;
use crate::texture::{PixelBuffer, Texture, TextureHandle, TextureStatus};

/// Message consumed by decode workers.
enum WorkItem {
    /// Decode this file into its texture.
    Load(LoadRequest),
    /// Stop the worker that receives it.
    Shutdown,
}

struct LoadRequest {
    path: PathBuf,
    texture: Arc<Texture>,
}

struct UploadTask {
    texture: Arc<Texture>,
    pixels: PixelBuffer,
}

#[derive(Default)]
struct Shared {
    uploads: Mutex<VecDeque<UploadTask>>,
    /// Requests not yet uploaded or abandoned.
    outstanding: AtomicUsize,
    /// Decoded buffers waiting for `upload`.
    pending_uploads: AtomicUsize,
    decodes: AtomicUsize,
}

/// Outcome of one [`TexturePool::upload`] pass.
#[derive(Debug, Default)]
pub struct UploadBatch {
    /// Textures that became resident this pass.
    pub ready: Vec<TextureHandle>,
    /// Textures the device refused, with the reason.
    pub failed: Vec<(TextureHandle, UploadError)>,
}

impl UploadBatch {
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.failed.is_empty()
    }
}

pub struct TexturePool {
    registry: Mutex<Vec<Arc<Texture>>>,
    load_tx: Sender<WorkItem>,
    load_rx: Receiver<WorkItem>,
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    released: bool,
}

impl Default for TexturePool {
    fn default() -> Self {
        Self::new()
    }
}

impl TexturePool {
    pub fn new() -> Self {
        let (load_tx, load_rx) = unbounded();
        Self {
            registry: Mutex::new(Vec::new()),
            load_tx,
            load_rx,
            shared: Arc::new(Shared::default()),
            workers: Vec::new(),
            released: false,
        }
    }

    /// Spawns `worker_count` decode threads.
    pub fn initialize(&mut self, worker_count: usize) {
        if !self.workers.is_empty() {
            warn!(
                workers = self.workers.len(),
                "texture pool already initialized"
            );
            return;
        }

        for index in 0..worker_count {
            let load_rx = self.load_rx.clone();
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(format!("texture-worker-{index}"))
                .spawn(move || run_worker(index, load_rx, shared));
            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(err) => error!(worker = index, error = %err, "failed to spawn texture worker"),
            }
        }
        info!(workers = self.workers.len(), "texture pool initialized");
    }

    /// Returns the texture for `path`, queueing a decode on first sight.
    ///
    /// Never blocks on decoding: a fresh texture stays empty until a later
    /// `upload` call makes it ready. A texture that failed earlier is
    /// queued again. After [`Self::release`] nothing is queued and new
    /// textures come back failed.
    pub fn acquire_texture(&self, path: impl AsRef<Path>) -> TextureHandle {
        let path = path.as_ref();
        let mut registry = self.registry.lock();

        let existing = registry.iter().find(|t| t.path() == path).cloned();
        let texture = match existing {
            Some(texture) if texture.status() != TextureStatus::Failed || self.released => {
                debug!(path = %path.display(), "texture cache hit");
                return TextureHandle::new(texture);
            }
            Some(texture) => {
                debug!(path = %path.display(), "retrying failed texture");
                texture.mark_queued();
                texture
            }
            None => {
                let texture = Arc::new(Texture::new(path.to_path_buf()));
                registry.push(Arc::clone(&texture));
                if self.released {
                    warn!(path = %path.display(), "texture pool released, not loading");
                    texture.mark_failed();
                    return TextureHandle::new(texture);
                }
                texture
            }
        };

        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        // The pool keeps a receiver alive, so the send cannot fail.
        let _ = self.load_tx.send(WorkItem::Load(LoadRequest {
            path: path.to_path_buf(),
            texture: Arc::clone(&texture),
        }));
        debug!(path = %path.display(), "texture load queued");

        TextureHandle::new(texture)
    }

    /// Drains every decoded texture and uploads it. Call only from the
    /// thread owning the graphics device.
    ///
    /// A texture the device rejects is marked failed on its own and the
    /// rest of the batch still uploads. Losing the device aborts the pass:
    /// the untouched tasks go back on the queue and the error is returned.
    pub fn upload(&self, uploader: &mut dyn TextureUploader) -> Result<UploadBatch, UploadError> {
        let mut tasks = std::mem::take(&mut *self.shared.uploads.lock());
        let mut batch = UploadBatch::default();

        while let Some(UploadTask { texture, pixels }) = tasks.pop_front() {
            let result = texture.upload(pixels, uploader);
            self.shared.pending_uploads.fetch_sub(1, Ordering::AcqRel);
            self.shared.outstanding.fetch_sub(1, Ordering::AcqRel);

            match result {
                Ok(id) => {
                    debug!(path = %texture.path().display(), id = %id, "texture ready");
                    batch.ready.push(TextureHandle::new(texture));
                }
                Err(err @ UploadError::Device(_)) => {
                    error!(path = %texture.path().display(), error = %err, requeued = tasks.len(), "graphics device lost");
                    texture.mark_failed();
                    let mut queue = self.shared.uploads.lock();
                    while let Some(task) = tasks.pop_back() {
                        queue.push_front(task);
                    }
                    return Err(err);
                }
                Err(err) => {
                    error!(path = %texture.path().display(), error = %err, "texture upload failed");
                    texture.mark_failed();
                    batch.failed.push((TextureHandle::new(texture), err));
                }
            }
        }

        Ok(batch)
    }

    /// True once every acquired texture has been uploaded or has failed.
    pub fn has_no_pending_tasks(&self) -> bool {
        self.outstanding() == 0
    }

    /// Removes textures no handle refers to and frees their GPU copies.
    /// Textures still being decoded or uploaded are kept.
    pub fn clean_unused_textures(&self, uploader: &mut dyn TextureUploader) -> usize {
        let mut registry = self.registry.lock();
        let before = registry.len();
        registry.retain(|texture| {
            let keep = texture.is_referenced() || texture.is_in_flight();
            if !keep {
                debug!(path = %texture.path().display(), "dropping unused texture");
                texture.release(uploader);
            }
            keep
        });
        before - registry.len()
    }

    /// Textures no handle refers to that are still being decoded or
    /// uploaded. [`Self::clean_unused_textures`] skips these.
    pub fn unreferenced_in_flight(&self) -> usize {
        self.registry
            .lock()
            .iter()
            .filter(|texture| !texture.is_referenced() && texture.is_in_flight())
            .count()
    }

    /// Stops the workers. Queued requests no worker has picked up are
    /// abandoned; decodes already running finish first. Later acquires
    /// queue nothing.
    pub fn release(&mut self) {
        self.released = true;
        let mut abandoned = 0usize;
        while let Ok(item) = self.load_rx.try_recv() {
            if let WorkItem::Load(request) = item {
                request.texture.mark_failed();
                self.shared.outstanding.fetch_sub(1, Ordering::AcqRel);
                abandoned += 1;
            }
        }

        for _ in &self.workers {
            let _ = self.load_tx.send(WorkItem::Shutdown);
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("texture worker panicked");
            }
        }
        info!(abandoned, "texture pool released");
    }

    /// Number of registered textures.
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Decodes attempted since the pool was created.
    pub fn decode_count(&self) -> usize {
        self.shared.decodes.load(Ordering::Acquire)
    }

    /// Textures decoded but not yet uploaded.
    pub fn pending_uploads(&self) -> usize {
        self.shared.pending_uploads.load(Ordering::Acquire)
    }

    /// Textures acquired but not yet uploaded or failed.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }
}

impl Drop for TexturePool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.release();
        }
    }
}

fn run_worker(index: usize, load_rx: Receiver<WorkItem>, shared: Arc<Shared>) {
    debug!(worker = index, "texture worker started");
    while let Ok(item) = load_rx.recv() {
        let LoadRequest { path, texture } = match item {
            WorkItem::Load(request) => request,
            WorkItem::Shutdown => break,
        };

        let span = debug_span!("decode", worker = index, path = %path.display());
        let _entered = span.enter();
        shared.decodes.fetch_add(1, Ordering::AcqRel);

        match texture.decode() {
            Ok(pixels) => {
                debug!(width = pixels.width, height = pixels.height, "decoded");
                let mut uploads = shared.uploads.lock();
                uploads.push_back(UploadTask { texture, pixels });
                shared.pending_uploads.fetch_add(1, Ordering::AcqRel);
            }
            Err(err) => {
                // One bad file must not stall the rest of the import.
                error!(error = %err, "failed to load texture");
                texture.mark_failed();
                shared.outstanding.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }
    debug!(worker = index, "texture worker exiting");
}
