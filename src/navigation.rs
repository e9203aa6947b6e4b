//! Pan and zoom for the single view and the two side-by-side columns.
//!
//! Pointer positions handed to this module use the window convention: origin
//! at the top-left, y growing downwards. They are flipped into the
//! bottom-left viewport space of [`View`] here.

use glam::Vec2;
use tracing::trace;

use crate::view::{DEFAULT_SAFE_MARGIN, ImagePoint, Padding, View, snap_to_pixel_center};

pub const SPLIT_MIN: f32 = 0.02;
pub const SPLIT_MAX: f32 = 0.98;

/// Scale factors reachable by zooming.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomLimits {
    pub min: f32,
    pub max: f32,
    /// Scale jumped to while the magnifier is held.
    pub magnifier: f32,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self {
            min: 0.125,
            max: 256.0,
            magnifier: 72.0,
        }
    }
}

impl ZoomLimits {
    pub fn clamp(&self, scale: f32) -> f32 {
        scale.clamp(self.min, self.max)
    }
}

/// Next scale for a wheel movement of `wheel` notches, before clamping.
///
/// Below 2x the scale moves in powers of two, above it in steps of sqrt(2).
/// Exactly at 2x a positive wheel adds the notch count instead.
pub fn zoom_step(current: f32, wheel: f32) -> f32 {
    let notches = wheel.abs().trunc() as i32;
    if current == 2.0 {
        if wheel >= 0.0 {
            current + wheel
        } else {
            current / 2f32.powi(notches)
        }
    } else if current > 2.0 {
        if wheel > 0.0 {
            current * 1.414
        } else {
            current * 0.707
        }
    } else if wheel >= 0.0 {
        current * 2f32.powi(notches)
    } else {
        current / 2f32.powi(notches)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanMode {
    /// Both columns follow the pointer.
    Linked,
    /// Only the column under the pointer moves, by whole image pixels.
    Locked,
}

#[derive(Debug, Clone)]
pub struct ViewSet {
    single: View,
    columns: [View; 2],
    split_pos: f32,
    display_size: Vec2,
    side_by_side: bool,
    limits: ZoomLimits,
    magnifier_restore: Option<f32>,
    pan_residual: Vec2,
}

impl Default for ViewSet {
    fn default() -> Self {
        Self::new(Padding::default(), DEFAULT_SAFE_MARGIN, ZoomLimits::default())
    }
}

impl ViewSet {
    pub fn new(padding: Padding, safe_margin: f32, limits: ZoomLimits) -> Self {
        let mut view = View::new().with_safe_margin(safe_margin);
        view.set_viewport_padding(padding);
        Self {
            single: view.clone(),
            columns: [view.clone(), view],
            split_pos: 0.5,
            display_size: Vec2::ONE,
            side_by_side: false,
            limits,
            magnifier_restore: None,
            pan_residual: Vec2::ZERO,
        }
    }

    pub fn single(&self) -> &View {
        &self.single
    }

    pub fn column(&self, index: usize) -> &View {
        &self.columns[index & 1]
    }

    pub fn limits(&self) -> ZoomLimits {
        self.limits
    }

    pub fn is_side_by_side(&self) -> bool {
        self.side_by_side
    }

    pub fn set_side_by_side(&mut self, enabled: bool) {
        self.side_by_side = enabled;
    }

    /// Splitter position as a fraction of the display width.
    pub fn split_position(&self) -> f32 {
        self.split_pos
    }

    pub fn set_split_position(&mut self, fraction: f32) {
        self.split_pos = fraction.clamp(SPLIT_MIN, SPLIT_MAX);
    }

    /// Moves the splitter under a pointer at `pointer_x` display pixels.
    pub fn drag_splitter(&mut self, pointer_x: f32) {
        self.set_split_position(pointer_x / self.display_size.x.max(1.0));
    }

    pub fn is_magnifying(&self) -> bool {
        self.magnifier_restore.is_some()
    }

    /// Current scale of the active views.
    pub fn image_scale(&self) -> f32 {
        if self.side_by_side {
            self.columns[0].image_scale()
        } else {
            self.single.image_scale()
        }
    }

    fn left_column_width(&self) -> f32 {
        self.display_size.x * self.split_pos
    }

    fn column_under(&self, pointer_x: f32) -> usize {
        usize::from(pointer_x > self.left_column_width())
    }

    /// Sizes the active views for this frame.
    pub fn layout(&mut self, display_size: Vec2, image_size: Vec2) {
        self.display_size = display_size.max(Vec2::ONE);
        if self.side_by_side {
            let left = self.left_column_width();
            self.columns[0].resize(Vec2::new(left, self.display_size.y));
            self.columns[1].resize(Vec2::new(self.display_size.x - left, self.display_size.y));
            for column in &mut self.columns {
                column.set_image_size(image_size);
            }
        } else {
            self.single.resize(self.display_size);
            self.single.set_image_size(image_size);
        }
    }

    /// Resets every view for a newly shown image.
    pub fn reset(&mut self, image_size: Vec2, fit_viewport: bool) {
        self.magnifier_restore = None;
        self.pan_residual = Vec2::ZERO;
        for view in self.views_mut() {
            view.set_image_size(image_size);
            view.reset(fit_viewport);
        }
    }

    fn views_mut(&mut self) -> impl Iterator<Item = &mut View> {
        std::iter::once(&mut self.single).chain(self.columns.iter_mut())
    }

    /// Converts a pointer into a snapped pivot in the local space of the
    /// view it falls in, returning the column index alongside.
    fn pivot_for(&self, pointer: Vec2) -> (Vec2, usize) {
        let mut pivot = Vec2::new(pointer.x, self.display_size.y - pointer.y);
        let mut column = 0;
        if self.side_by_side {
            let left = self.left_column_width();
            if pivot.x > left {
                pivot.x -= left;
                column = 1;
            }
        }
        (snap_to_pixel_center(pivot), column)
    }

    /// Pans by a pointer movement in window pixels.
    pub fn pan(&mut self, delta: Vec2, pointer: Vec2, mode: PanMode) {
        let translate = Vec2::new(delta.x, -delta.y);
        if !self.side_by_side {
            self.single.translate(translate);
            return;
        }

        match mode {
            PanMode::Linked => {
                for column in &mut self.columns {
                    column.translate(translate);
                }
            }
            PanMode::Locked => {
                let scale = self.image_scale();
                let translate = translate + self.pan_residual;
                let rounded = (translate / scale).round();
                let index = self.column_under(pointer.x);
                self.columns[index].translate_local(rounded);
                self.pan_residual = translate - rounded * scale;
            }
        }
    }

    /// Scales the active views by `relative`.
    ///
    /// With a pointer, the column under it zooms about the pointer and the
    /// other column zooms about the same image pixel, at the same height.
    /// Without one, each view keeps its previous pivot.
    pub fn zoom(&mut self, relative: f32, pointer: Option<Vec2>) {
        if (relative - 1.0).abs() < 1e-4 {
            return;
        }

        let pivot = pointer.map(|p| self.pivot_for(p));
        if !self.side_by_side {
            self.single.scale(relative, pivot.map(|(pivot, _)| pivot));
            return;
        }

        match pivot {
            None => {
                for column in &mut self.columns {
                    column.scale(relative, None);
                }
            }
            Some((pivot, focus)) => {
                let other = focus ^ 1;
                self.columns[focus].scale(relative, Some(pivot));
                let pivot = self.columns[focus].scale_pivot();

                let pixel = self.columns[focus].image_coords(pivot).coords;
                let mut mirrored = self.columns[other].viewport_coords(pixel);
                mirrored.y = pivot.y;
                self.columns[other].scale(relative, Some(mirrored));
            }
        }
    }

    /// Moves to `target` (clamped to the limits).
    pub fn zoom_to(&mut self, target: f32, pointer: Option<Vec2>) {
        let current = self.image_scale();
        let target = self.limits.clamp(target);
        trace!(current, target, "zoom");
        self.zoom(target / current, pointer);
    }

    /// Applies one wheel event at `pointer`.
    pub fn wheel(&mut self, wheel: f32, pointer: Vec2) {
        if wheel == 0.0 {
            return;
        }
        let target = zoom_step(self.image_scale(), wheel);
        self.zoom_to(target, Some(pointer));
    }

    /// Zoom by dragging vertically with both buttons held.
    pub fn drag_zoom(&mut self, delta_y: f32) {
        let target = self.image_scale() * (1.0 - delta_y.round_ties_even() / 128.0);
        self.zoom_to(target, None);
    }

    pub fn zoom_in(&mut self) {
        self.zoom_to(self.image_scale() * 2.0, None);
    }

    pub fn zoom_out(&mut self) {
        self.zoom_to(self.image_scale() * 0.5, None);
    }

    /// Jumps to the magnifier scale about `pointer`. Ignored while already
    /// magnifying.
    pub fn begin_magnifier(&mut self, pointer: Vec2) {
        if self.magnifier_restore.is_some() {
            return;
        }
        self.magnifier_restore = Some(self.image_scale());
        self.zoom_to(self.limits.magnifier, Some(pointer));
    }

    /// Returns to the scale in effect before [`Self::begin_magnifier`].
    pub fn end_magnifier(&mut self) {
        if let Some(previous) = self.magnifier_restore.take() {
            self.zoom_to(previous, None);
        }
    }

    /// Copies the other column's local offset into the column under the
    /// pointer so both show the same region.
    pub fn sync_columns(&mut self, pointer_x: f32) {
        let index = self.column_under(pointer_x);
        let offset = self.columns[index ^ 1].local_offset();
        self.columns[index].set_local_offset(offset);
    }

    /// Image pixel under a window pointer, floored.
    pub fn pixel_at(&self, pointer: Vec2) -> ImagePoint {
        let mut viewport = Vec2::new(pointer.x, self.display_size.y - pointer.y);
        let view = if self.side_by_side {
            let left = self.left_column_width().round();
            if viewport.x > left {
                viewport.x -= left;
                &self.columns[1]
            } else {
                &self.columns[0]
            }
        } else {
            &self.single
        };

        let point = view.image_coords(viewport);
        ImagePoint {
            coords: point.coords.floor(),
            inside: point.inside,
        }
    }
}
