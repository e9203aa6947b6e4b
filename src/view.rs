//! Mapping between image pixels and on-screen viewport pixels for one pane.
//!
//! Both spaces put the origin at the bottom-left. Pan and zoom accumulate
//! into a single affine transform applied after the image is centred in the
//! visible (padding-excluded) area.

use glam::{Affine2, Mat2, Vec2};
use serde::Deserialize;

/// Minimum overlap, in viewport pixels, kept between image and visible area.
pub const DEFAULT_SAFE_MARGIN: f32 = 100.0;

/// Margins reserved around the viewport, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Padding {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Padding {
    pub const fn new(top: f32, right: f32, bottom: f32, left: f32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    fn origin(&self) -> Vec2 {
        Vec2::new(self.left, self.bottom)
    }

    fn total(&self) -> Vec2 {
        Vec2::new(self.left + self.right, self.top + self.bottom)
    }
}

/// Snaps a viewport point to the centre of the pixel it falls in.
pub fn snap_to_pixel_center(point: Vec2) -> Vec2 {
    (point + Vec2::splat(0.5)).round() - Vec2::splat(0.5)
}

fn scale_about(factor: f32, pivot: Vec2) -> Affine2 {
    Affine2::from_mat2_translation(Mat2::from_diagonal(Vec2::splat(factor)), pivot - factor * pivot)
}

/// Result of mapping a viewport point into the image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePoint {
    /// Image coordinates, clamped to the image bounds.
    pub coords: Vec2,
    /// Whether the unclamped point lies inside `[0, size)` on both axes.
    pub inside: bool,
}

#[derive(Debug, Clone)]
pub struct View {
    local_offset: Vec2,
    transform: Affine2,
    padding: Padding,
    viewport_size: Vec2,
    image_size: Vec2,
    pivot: Vec2,
    scale: f32,
    safe_margin: f32,
}

impl Default for View {
    fn default() -> Self {
        Self {
            local_offset: Vec2::ZERO,
            transform: Affine2::IDENTITY,
            padding: Padding::default(),
            viewport_size: Vec2::ONE,
            image_size: Vec2::ONE,
            pivot: Vec2::ZERO,
            scale: 1.0,
            safe_margin: DEFAULT_SAFE_MARGIN,
        }
    }
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_safe_margin(mut self, margin: f32) -> Self {
        self.safe_margin = margin;
        self
    }

    pub fn set_image_size(&mut self, size: Vec2) {
        self.image_size = size.max(Vec2::ONE);
    }

    pub fn set_viewport_padding(&mut self, padding: Padding) {
        self.padding = padding;
    }

    /// Changes the viewport size; shrinking may pull the image back into view.
    pub fn resize(&mut self, size: Vec2) {
        self.viewport_size = size;
        self.restrict_translation();
    }

    pub fn image_size(&self) -> Vec2 {
        self.image_size
    }

    pub fn viewport_size(&self) -> Vec2 {
        self.viewport_size
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    pub fn safe_margin(&self) -> f32 {
        self.safe_margin
    }

    pub fn image_scale(&self) -> f32 {
        self.scale
    }

    pub fn scale_pivot(&self) -> Vec2 {
        self.pivot
    }

    pub fn transform(&self) -> Affine2 {
        self.transform
    }

    pub fn local_offset(&self) -> Vec2 {
        self.local_offset
    }

    pub fn set_local_offset(&mut self, offset: Vec2) {
        self.local_offset = offset;
    }

    /// Viewport size minus padding.
    pub fn visible_size(&self) -> Vec2 {
        self.viewport_size - self.padding.total()
    }

    fn raw_image_offset(&self) -> Vec2 {
        let centred = (self.visible_size() - self.image_size) * 0.5
            + self.local_offset
            + self.padding.origin();
        self.transform.transform_point2(centred)
    }

    /// Viewport position of the image's bottom-left corner.
    pub fn image_offset(&self) -> Vec2 {
        snap_to_pixel_center(self.raw_image_offset())
    }

    pub fn image_coords(&self, viewport: Vec2) -> ImagePoint {
        let coords = (viewport - self.image_offset()) / self.scale;
        let inside = coords.cmpge(Vec2::ZERO).all() && coords.cmplt(self.image_size).all();
        ImagePoint {
            coords: coords.clamp(Vec2::ZERO, self.image_size),
            inside,
        }
    }

    pub fn viewport_coords(&self, image: Vec2) -> Vec2 {
        (image * self.scale + self.image_offset()).clamp(Vec2::ZERO, self.viewport_size)
    }

    /// Multiplies the image scale by `factor` about a pivot.
    ///
    /// Zooming in snaps the pivot (given, or the previous one) onto the
    /// image's on-screen box. Zooming out keeps the previous pivot and
    /// ignores `pivot`.
    pub fn scale(&mut self, factor: f32, pivot: Option<Vec2>) {
        if factor > 1.0 {
            self.pivot = self.constrained_pivot(pivot.unwrap_or(self.pivot));
        }
        self.transform = scale_about(factor, self.pivot) * self.transform;
        self.scale *= factor;
    }

    /// Pans in viewport pixels.
    pub fn translate(&mut self, offset: Vec2) {
        self.transform.translation += offset;
        self.restrict_translation();
    }

    /// Pans in untransformed space. Column views share this offset to stay
    /// aligned regardless of their own zoom history.
    pub fn translate_local(&mut self, offset: Vec2) {
        self.local_offset += offset;
        self.restrict_translation();
    }

    /// Back to identity, centred. `fit_viewport` scales the image to fit the
    /// visible area.
    pub fn reset(&mut self, fit_viewport: bool) {
        self.transform = Affine2::IDENTITY;
        self.scale = 1.0;
        self.local_offset = Vec2::ZERO;

        let visible = self.visible_size();
        self.pivot = snap_to_pixel_center(visible * 0.5 + self.padding.origin());

        if fit_viewport {
            let fit = (visible / self.image_size).min_element();
            if fit.is_finite() && fit > 0.0 {
                self.scale = fit;
                self.transform = scale_about(fit, self.pivot);
            }
        }
    }

    fn constrained_pivot(&self, pivot: Vec2) -> Vec2 {
        let offset = self.image_offset();
        let extent = offset + self.image_size * self.scale;
        snap_to_pixel_center(pivot.clamp(offset, extent))
    }

    /// Pulls the image back so at least `safe_margin` of it overlaps the
    /// visible area on each axis. Moves by exactly the deficit.
    fn restrict_translation(&mut self) {
        let offset = self.raw_image_offset();
        let scaled = self.image_size * self.scale;
        let margin = Vec2::splat(self.safe_margin);
        let origin = self.padding.origin();

        let min = origin + margin - scaled;
        let max = origin + self.visible_size() - margin;

        let mut correction = Vec2::ZERO;
        correction = Vec2::select(offset.cmplt(min), min - offset, correction);
        correction = Vec2::select(offset.cmpgt(max), max - offset, correction);
        self.transform.translation += correction;
    }
}
