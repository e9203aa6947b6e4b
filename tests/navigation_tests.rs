use glam::Vec2;
use swipe_compare::navigation::{PanMode, ViewSet};

const DISPLAY: Vec2 = Vec2::new(800.0, 600.0);
const IMAGE: Vec2 = Vec2::new(200.0, 100.0);

fn views(side_by_side: bool) -> ViewSet {
    let mut views = ViewSet::default();
    views.set_side_by_side(side_by_side);
    views.layout(DISPLAY, IMAGE);
    views.reset(IMAGE, false);
    views
}

#[test]
fn columns_split_the_display() {
    let views = views(true);
    assert_eq!(views.column(0).viewport_size(), Vec2::new(400.0, 600.0));
    assert_eq!(views.column(1).viewport_size(), Vec2::new(400.0, 600.0));
    assert_eq!(views.column(0).image_offset(), Vec2::new(100.5, 250.5));
}

#[test]
fn column_zoom_keeps_same_image_pixel_under_both_pivots() {
    let mut views = views(true);
    // Offset the right column so the two no longer line up on screen.
    views.pan(Vec2::new(10.0, 0.0), Vec2::new(600.0, 300.0), PanMode::Locked);
    assert_eq!(views.column(1).image_offset(), Vec2::new(110.5, 250.5));

    views.zoom(2.0, Some(Vec2::new(150.0, 300.0)));
    assert_eq!(views.column(0).image_scale(), 2.0);
    assert_eq!(views.column(1).image_scale(), 2.0);

    let left = views.column(0);
    let right = views.column(1);
    assert_eq!(left.scale_pivot(), Vec2::new(150.5, 300.5));
    assert_eq!(left.scale_pivot().y, right.scale_pivot().y);

    let left_pixel = left.image_coords(left.scale_pivot()).coords;
    let right_pixel = right.image_coords(right.scale_pivot()).coords;
    assert!(
        left_pixel.abs_diff_eq(right_pixel, 1.01),
        "{left_pixel:?} vs {right_pixel:?}"
    );
}

#[test]
fn zoom_without_pointer_scales_both_columns() {
    let mut views = views(true);
    views.zoom_in();
    assert_eq!(views.column(0).image_scale(), 2.0);
    assert_eq!(views.column(1).image_scale(), 2.0);
    assert_eq!(views.single().image_scale(), 1.0);
}

#[test]
fn locked_pan_moves_whole_pixels_and_carries_residual() {
    let mut views = views(true);
    views.zoom_to(4.0, None);

    let pointer = Vec2::new(100.0, 300.0);
    views.pan(Vec2::new(6.0, 0.0), pointer, PanMode::Locked);
    assert_eq!(views.column(0).local_offset(), Vec2::new(2.0, 0.0));
    views.pan(Vec2::new(6.0, 0.0), pointer, PanMode::Locked);
    assert_eq!(views.column(0).local_offset(), Vec2::new(3.0, 0.0));
    assert_eq!(views.column(1).local_offset(), Vec2::ZERO);

    views.sync_columns(600.0);
    assert_eq!(views.column(1).local_offset(), Vec2::new(3.0, 0.0));
}

#[test]
fn linked_pan_moves_both_columns() {
    let mut views = views(true);
    views.pan(Vec2::new(20.0, 10.0), Vec2::new(100.0, 100.0), PanMode::Linked);
    assert_eq!(views.column(0).image_offset(), Vec2::new(120.5, 240.5));
    assert_eq!(views.column(1).image_offset(), Vec2::new(120.5, 240.5));
}

#[test]
fn single_view_pan_flips_y() {
    let mut views = views(false);
    views.pan(Vec2::new(5.0, 5.0), Vec2::ZERO, PanMode::Locked);
    assert_eq!(views.single().image_offset(), Vec2::new(305.5, 245.5));
}

#[test]
fn pixel_at_uses_top_left_pointer() {
    let single = views(false);
    let point = single.pixel_at(Vec2::new(310.0, 340.0));
    assert!(point.inside);
    assert_eq!(point.coords, Vec2::new(9.0, 9.0));

    let columns = views(true);
    let point = columns.pixel_at(Vec2::new(510.0, 340.0));
    assert!(point.inside);
    assert_eq!(point.coords, Vec2::new(9.0, 9.0));

    assert!(!columns.pixel_at(Vec2::new(5.0, 5.0)).inside);
}

#[test]
fn wheel_zooms_about_pointer() {
    let mut views = views(false);
    views.wheel(1.0, Vec2::new(350.0, 300.0));
    assert_eq!(views.image_scale(), 2.0);
    assert_eq!(views.single().scale_pivot(), Vec2::new(350.5, 300.5));

    views.wheel(1.0, Vec2::new(350.0, 300.0));
    assert_eq!(views.image_scale(), 3.0);
    views.wheel(-1.0, Vec2::new(350.0, 300.0));
    assert!((views.image_scale() - 2.121).abs() < 1e-3);
}
