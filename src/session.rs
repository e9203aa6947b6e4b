//! The ordered image stack being compared, its selection, and undo history.
//!
//! Everything here runs on the thread that owns the graphics device. Imports
//! only queue work on the pool; [`Session::process_uploads`] must be called
//! once per frame to move decoded textures to the GPU and settle the
//! selection.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use glam::Vec2;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::colour::ColorEncoding;
use crate::config::Configuration;
use crate::error::{Error, UploadError};
use crate::gpu::TextureUploader;
use crate::navigation::ViewSet;
use crate::picture::{Image, ImageId, ImageIdAllocator};
use crate::texture::{ImageKind, TextureId};
use crate::texture_pool::TexturePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompositeMode {
    /// Only the top image.
    #[default]
    Top,
    /// Top and compare image on either side of a movable splitter.
    Split,
    /// Top and compare image in two independently pannable columns.
    SideBySide,
}

impl CompositeMode {
    pub fn is_compare(self) -> bool {
        self != Self::Top
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Add,
    Remove,
    Move,
}

/// Where an image sat in the stack when an action was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub id: ImageId,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct Action {
    pub kind: ActionKind,
    pub paths: Vec<PathBuf>,
    pub slots: Vec<Slot>,
    pub prev_top: Option<usize>,
    pub prev_cmp: Option<usize>,
}

impl Action {
    fn new(kind: ActionKind, prev_top: Option<usize>, prev_cmp: Option<usize>) -> Self {
        Self {
            kind,
            paths: Vec::new(),
            slots: Vec::new(),
            prev_top,
            prev_cmp,
        }
    }
}

fn normalize_path(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().replace('\\', "/"))
}

pub struct Session {
    pool: TexturePool,
    images: Vec<Image>,
    ids: ImageIdAllocator,
    history: VecDeque<Action>,
    undo_depth: usize,
    /// A `Remove` being undone; its imports are still settling.
    replay: Option<Action>,
    top: Option<usize>,
    cmp: Option<usize>,
    composite: CompositeMode,
    initial_composite: Option<CompositeMode>,
    selection_dirty: bool,
    cleanup_pending: bool,
    views: ViewSet,
}

impl Session {
    pub fn new(config: &Configuration) -> Self {
        let mut pool = TexturePool::new();
        pool.initialize(config.workers());
        Self {
            pool,
            images: Vec::new(),
            ids: ImageIdAllocator::new(),
            history: VecDeque::new(),
            undo_depth: config.undo_depth.max(1),
            replay: None,
            top: None,
            cmp: None,
            composite: CompositeMode::Top,
            initial_composite: config.composite.is_compare().then_some(config.composite),
            selection_dirty: false,
            cleanup_pending: false,
            views: ViewSet::new(
                config.viewport_padding,
                config.safe_margin,
                config.zoom_limits(),
            ),
        }
    }

    pub fn pool(&self) -> &TexturePool {
        &self.pool
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn image(&self, index: usize) -> Option<&Image> {
        self.images.get(index)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn top_index(&self) -> Option<usize> {
        self.top
    }

    pub fn compare_index(&self) -> Option<usize> {
        self.cmp
    }

    pub fn top_image(&self) -> Option<&Image> {
        self.top.and_then(|i| self.images.get(i))
    }

    pub fn compare_image(&self) -> Option<&Image> {
        self.cmp.and_then(|i| self.images.get(i))
    }

    pub fn image_mut(&mut self, index: usize) -> Option<&mut Image> {
        self.images.get_mut(index)
    }

    pub fn composite(&self) -> CompositeMode {
        self.composite
    }

    pub fn views(&self) -> &ViewSet {
        &self.views
    }

    pub fn views_mut(&mut self) -> &mut ViewSet {
        &mut self.views
    }

    pub fn undo_len(&self) -> usize {
        self.history.len()
    }

    pub fn is_replaying(&self) -> bool {
        self.replay.is_some()
    }

    /// True when no import or undo replay is waiting on the pool and the
    /// selection reflects the last import.
    pub fn is_settled(&self) -> bool {
        self.replay.is_none() && !self.selection_dirty && self.pool.has_no_pending_tasks()
    }

    /// Queues `paths` for loading and appends them to the stack.
    ///
    /// Unsupported files are skipped with a warning. Returns how many
    /// images were added.
    pub fn import_files<I, P>(&mut self, paths: I, record: bool) -> usize
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
        self.import(&paths, None, record)
    }

    fn import(&mut self, paths: &[PathBuf], slots: Option<&[Slot]>, record: bool) -> usize {
        if paths.is_empty() {
            return 0;
        }

        let mut action = Action::new(ActionKind::Add, self.top, self.cmp);
        for (i, raw) in paths.iter().enumerate() {
            let path = normalize_path(raw);
            let Some(kind) = ImageKind::detect(&path) else {
                warn!(path = %path.display(), "unsupported image type");
                continue;
            };

            let recorded = slots.and_then(|slots| slots.get(i));
            let (id, index) = match recorded {
                Some(slot) => {
                    let index = slot.index.min(self.images.len());
                    for selected in [&mut self.top, &mut self.cmp] {
                        if let Some(current) = selected.as_mut() {
                            if index <= *current {
                                *current += 1;
                            }
                        }
                    }
                    (slot.id, index)
                }
                None => (self.ids.next_id(), self.images.len()),
            };

            let texture = self.pool.acquire_texture(&path);
            let mut image = Image::new(texture, id);
            if kind.is_high_dynamic_range() {
                image.set_encoding(ColorEncoding::Linear);
            }
            self.images.insert(index, image);
            debug!(path = %path.display(), id = %id, index, "image added");

            action.paths.push(path);
            action.slots.push(Slot { id, index });
            self.selection_dirty = true;
        }

        let added = action.slots.len();
        if record && added > 0 {
            self.append_action(action);
        }
        added
    }

    fn append_action(&mut self, action: Action) {
        self.history.push_back(action);
        while self.history.len() > self.undo_depth {
            self.history.pop_front();
        }
    }

    /// Uploads decoded textures and settles the selection. Call once per
    /// frame from the thread owning the graphics device.
    ///
    /// Returns how many textures became ready.
    pub fn process_uploads(&mut self, uploader: &mut dyn TextureUploader) -> Result<usize, UploadError> {
        let uploaded = self.pool.upload(uploader).map(|batch| {
            for (texture, err) in &batch.failed {
                warn!(file = texture.file_name(), error = %err, "image could not be uploaded");
            }
            batch.ready.len()
        });
        if self.cleanup_pending {
            let removed = self.pool.clean_unused_textures(uploader);
            // Removed textures still decoding are cleaned once they land.
            let waiting = self.pool.unreferenced_in_flight();
            debug!(removed, waiting, "unused textures cleaned");
            self.cleanup_pending = waiting > 0;
        }

        let fresh = uploaded.as_ref().map_or(0, |ready| *ready);
        let settled = self.pool.has_no_pending_tasks();
        let replaying = self.replay.is_some();

        if replaying && settled {
            if let Some(action) = self.replay.take() {
                if action.kind == ActionKind::Remove {
                    let last = self.images.len().checked_sub(1);
                    self.top = action.prev_top.zip(last).map(|(t, l)| t.min(l));
                    self.cmp = action.prev_cmp.zip(last).map(|(c, l)| c.min(l));
                    self.normalize_selection();
                    self.selection_dirty = false;
                }
                debug!(kind = ?action.kind, "undo replay settled");
            }
        }

        if self.images.is_empty() && settled {
            self.selection_dirty = false;
        }

        if (fresh > 0 || self.selection_dirty) && !replaying && settled && !self.images.is_empty() {
            let top = self.images.len() - 1;
            self.top = Some(top);
            let size = self.images[top].size();
            self.views.reset(size, false);
            if self.cmp.is_none() && top >= 1 {
                self.cmp = Some(0);
            }
            self.selection_dirty = false;
            info!(images = self.images.len(), top, "import settled");
        }

        if self.images.len() >= 2 && self.cmp.is_some() {
            if let Some(mode) = self.initial_composite.take() {
                self.set_composite(mode);
            }
        }

        uploaded
    }

    /// Sizes the views for the current top image.
    pub fn layout(&mut self, display_size: Vec2) {
        let size = self.top_image().map_or(Vec2::ONE, Image::size);
        self.views.layout(display_size, size);
    }

    /// Resets pan and zoom for the top image.
    pub fn reset_view(&mut self, fit_viewport: bool) {
        if let Some(size) = self.top_image().map(Image::size) {
            self.views.reset(size, fit_viewport);
        }
    }

    fn set_composite(&mut self, mode: CompositeMode) {
        self.composite = mode;
        self.views.set_side_by_side(mode == CompositeMode::SideBySide);
    }

    /// Clamps indices to the stack and drops the compare image when there
    /// is nothing left to compare against.
    fn normalize_selection(&mut self) {
        let len = self.images.len();
        let last = len.checked_sub(1);
        self.top = self.top.zip(last).map(|(t, l)| t.min(l));
        self.cmp = self.cmp.zip(last).map(|(c, l)| c.min(l));
        if len < 2 {
            self.cmp = None;
        }
        if let (Some(top), Some(cmp)) = (self.top, self.cmp) {
            if top == cmp {
                self.cmp = Some((cmp + len - 1) % len);
            }
        }
        if self.cmp.is_none() {
            self.set_composite(CompositeMode::Top);
        }
    }

    /// Removes the top image. Its texture is freed on the next
    /// [`Self::process_uploads`] unless another image still uses it.
    pub fn remove_top(&mut self, record: bool) -> Option<ImageId> {
        let index = self.top?;
        let image = self.images.remove(index);

        if record {
            let mut action = Action::new(ActionKind::Remove, self.top, self.cmp);
            action.paths.push(image.path().to_path_buf());
            action.slots.push(Slot {
                id: image.id(),
                index,
            });
            self.append_action(action);
        }

        if let Some(cmp) = self.cmp.as_mut() {
            if *cmp > index {
                *cmp -= 1;
            }
        }
        self.normalize_selection();
        self.cleanup_pending = true;
        info!(id = %image.id(), name = image.file_name(), "image removed");
        Some(image.id())
    }

    /// Removes every image.
    pub fn clear(&mut self, record: bool) {
        if self.images.is_empty() {
            return;
        }
        if record {
            let mut action = Action::new(ActionKind::Remove, self.top, self.cmp);
            for (index, image) in self.images.iter().enumerate() {
                action.paths.push(image.path().to_path_buf());
                action.slots.push(Slot {
                    id: image.id(),
                    index,
                });
            }
            self.append_action(action);
        }

        self.images.clear();
        self.top = None;
        self.cmp = None;
        self.set_composite(CompositeMode::Top);
        self.cleanup_pending = true;
        info!("images cleared");
    }

    /// Moves the image at `from` to `to`. The selection follows the images.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        let len = self.images.len();
        if from == to || from >= len || to >= len {
            return false;
        }

        let mut action = Action::new(ActionKind::Move, self.top, self.cmp);
        for (index, image) in self.images.iter().enumerate() {
            action.slots.push(Slot {
                id: image.id(),
                index,
            });
        }

        let top_id = self.top_image().map(Image::id);
        let cmp_id = self.compare_image().map(Image::id);
        let image = self.images.remove(from);
        self.images.insert(to, image);
        self.top = top_id.and_then(|id| self.position_of(id));
        self.cmp = cmp_id.and_then(|id| self.position_of(id));

        self.append_action(action);
        true
    }

    fn position_of(&self, id: ImageId) -> Option<usize> {
        self.images.iter().position(|image| image.id() == id)
    }

    /// Makes `index` the top image. A compare image at the same index moves
    /// to the next layer.
    pub fn select_top(&mut self, index: usize) -> bool {
        let len = self.images.len();
        if index >= len {
            return false;
        }
        self.top = Some(index);
        if self.cmp == Some(index) {
            self.cmp = Some((index + 1) % len);
        }
        true
    }

    /// Makes `index` the compare image. Selecting the top image swaps the pair.
    pub fn select_compare(&mut self, index: usize) -> bool {
        if index >= self.images.len() || self.images.len() < 2 {
            return false;
        }
        if self.top == Some(index) {
            self.top = self.cmp.or(Some((index + 1) % self.images.len()));
        }
        self.cmp = Some(index);
        true
    }

    /// Reverts the most recent action. Ignored while a previous undo is
    /// still importing.
    pub fn undo(&mut self) -> bool {
        if self.replay.is_some() {
            debug!("undo ignored while a replay is settling");
            return false;
        }
        let Some(action) = self.history.pop_back() else {
            return false;
        };
        let kind = action.kind;

        match action.kind {
            ActionKind::Remove => {
                let paths = action.paths.clone();
                let slots = action.slots.clone();
                self.replay = Some(action);
                self.import(&paths, Some(&slots), false);
            }
            ActionKind::Add => {
                self.images
                    .retain(|image| !action.slots.iter().any(|slot| slot.id == image.id()));
                self.top = action.prev_top;
                self.cmp = action.prev_cmp;
                self.normalize_selection();
                self.cleanup_pending = true;
            }
            ActionKind::Move => {
                let mut remaining = std::mem::take(&mut self.images);
                for slot in &action.slots {
                    if let Some(pos) = remaining.iter().position(|image| image.id() == slot.id) {
                        self.images.push(remaining.remove(pos));
                    }
                }
                self.images.append(&mut remaining);
                self.top = action.prev_top;
                self.cmp = action.prev_cmp;
                self.normalize_selection();
            }
        }
        info!(?kind, "undo");
        true
    }

    pub fn toggle_split(&mut self) -> CompositeMode {
        self.toggle(CompositeMode::Split)
    }

    pub fn toggle_side_by_side(&mut self) -> CompositeMode {
        self.toggle(CompositeMode::SideBySide)
    }

    fn toggle(&mut self, mode: CompositeMode) -> CompositeMode {
        if self.cmp.is_some() {
            let next = if self.composite == mode {
                CompositeMode::Top
            } else {
                mode
            };
            self.set_composite(next);
        }
        self.composite
    }

    /// Exchanges top and compare image while comparing.
    pub fn swap_pair(&mut self) -> bool {
        if self.images.len() < 2 || !self.composite.is_compare() {
            return false;
        }
        std::mem::swap(&mut self.top, &mut self.cmp);
        true
    }

    /// While comparing with more than two images, steps the compare image;
    /// otherwise steps the top image. The other selection is skipped over.
    pub fn next_image(&mut self) -> bool {
        self.rotate(true)
    }

    pub fn previous_image(&mut self) -> bool {
        self.rotate(false)
    }

    fn rotate(&mut self, forward: bool) -> bool {
        let len = self.images.len();
        if len < 2 {
            return false;
        }
        let step = |index: usize| {
            if forward {
                (index + 1) % len
            } else {
                (index + len - 1) % len
            }
        };

        if self.composite.is_compare() {
            if len == 2 {
                return false;
            }
            let (Some(top), Some(cmp)) = (self.top, self.cmp) else {
                return false;
            };
            let mut next = step(cmp);
            if next == top {
                next = step(next);
            }
            self.cmp = Some(next);
        } else {
            let Some(top) = self.top else {
                return false;
            };
            let top = step(top);
            self.top = Some(top);
            if let Some(cmp) = self.cmp {
                if cmp == top {
                    self.cmp = Some(step(cmp));
                }
            }
        }
        true
    }

    /// Re-reads the top image from disk.
    pub fn reload_top(&self, uploader: &mut dyn TextureUploader) -> Result<Option<TextureId>, Error> {
        match self.top_image() {
            Some(image) => image.reload(uploader).map(Some),
            None => Ok(None),
        }
    }

    /// Stops the decode workers. Pending imports are abandoned.
    pub fn shutdown(&mut self) {
        self.pool.release();
    }
}
