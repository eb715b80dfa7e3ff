use crate::{
    guidance::Point,
    pose::{BodyPart, BoundingBox, Person},
    types::{Direction, Frame},
};

pub const CONNECTIONS: &[(BodyPart, BodyPart)] = &[
    (BodyPart::Nose, BodyPart::LeftEye),
    (BodyPart::Nose, BodyPart::RightEye),
    (BodyPart::LeftEye, BodyPart::LeftEar),
    (BodyPart::RightEye, BodyPart::RightEar),
    (BodyPart::Nose, BodyPart::LeftShoulder),
    (BodyPart::Nose, BodyPart::RightShoulder),
    (BodyPart::LeftShoulder, BodyPart::LeftElbow),
    (BodyPart::LeftElbow, BodyPart::LeftWrist),
    (BodyPart::RightShoulder, BodyPart::RightElbow),
    (BodyPart::RightElbow, BodyPart::RightWrist),
    (BodyPart::LeftShoulder, BodyPart::RightShoulder),
    (BodyPart::LeftShoulder, BodyPart::LeftHip),
    (BodyPart::RightShoulder, BodyPart::RightHip),
    (BodyPart::LeftHip, BodyPart::RightHip),
    (BodyPart::LeftHip, BodyPart::LeftKnee),
    (BodyPart::LeftKnee, BodyPart::LeftAnkle),
    (BodyPart::RightHip, BodyPart::RightKnee),
    (BodyPart::RightKnee, BodyPart::RightAnkle),
];

const GRID_COLOR: [u8; 4] = [255, 255, 255, 255];
const CENTERED_COLOR: [u8; 4] = [34, 197, 94, 255];
const OFF_CENTER_COLOR: [u8; 4] = [239, 68, 68, 255];
const BODY_CENTER_COLOR: [u8; 4] = [59, 130, 246, 255];
const ARROW_COLOR: [u8; 4] = [239, 68, 68, 255];

const GRID_THICKNESS: i32 = 2;
const SKELETON_LINE_THICKNESS: i32 = 4;
const KEYPOINT_RADIUS: i32 = 6;
const ARROW_THICKNESS: i32 = 4;

/// What the overlay needs to know about one processed frame.
#[derive(Clone, Copy, Debug)]
pub struct OverlayInput<'a> {
    pub person: Option<&'a Person>,
    pub center: Option<Point>,
    pub centered: bool,
    pub direction: Direction,
}

/// Draw the 3×3 grid, skeleton, body center, tracked box and direction arrow in place.
pub fn annotate(frame: &mut Frame, input: &OverlayInput<'_>) {
    let (width, height) = (frame.width, frame.height);
    let buffer = frame.rgba.as_mut_slice();

    draw_grid(buffer, width, height);

    let Some(person) = input.person else {
        return;
    };

    let color = if input.centered {
        CENTERED_COLOR
    } else {
        OFF_CENTER_COLOR
    };

    if let (Some(_), Some(bbox)) = (person.id, person.bounding_box) {
        draw_box(buffer, width, height, &bbox, color, SKELETON_LINE_THICKNESS);
    }

    for &(a, b) in CONNECTIONS {
        let (pa, pb) = (person.get(a), person.get(b));
        draw_line(
            buffer,
            width,
            height,
            (pa.x, pa.y),
            (pb.x, pb.y),
            color,
            SKELETON_LINE_THICKNESS,
        );
    }

    for kp in &person.keypoints {
        if let Some(at) = to_pixel((kp.x, kp.y), width, height, KEYPOINT_RADIUS) {
            draw_circle(buffer, width, height, at, KEYPOINT_RADIUS, color);
        }
    }

    if let Some(at) = input
        .center
        .and_then(|center| to_pixel((center.x, center.y), width, height, KEYPOINT_RADIUS))
    {
        draw_circle(buffer, width, height, at, KEYPOINT_RADIUS, BODY_CENTER_COLOR);
    }

    draw_arrow(buffer, width, height, input.direction);
}

fn draw_grid(buffer: &mut [u8], width: u32, height: u32) {
    let (w, h) = (width as f32, height as f32);
    for i in 1..=2 {
        let x = w * i as f32 / 3.0;
        let y = h * i as f32 / 3.0;
        draw_line(buffer, width, height, (x, 0.0), (x, h), GRID_COLOR, GRID_THICKNESS);
        draw_line(buffer, width, height, (0.0, y), (w, y), GRID_COLOR, GRID_THICKNESS);
    }
}

fn draw_box(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    bbox: &BoundingBox,
    color: [u8; 4],
    thickness: i32,
) {
    let corners = [
        (bbox.left, bbox.top),
        (bbox.right, bbox.top),
        (bbox.right, bbox.bottom),
        (bbox.left, bbox.bottom),
    ];
    for i in 0..corners.len() {
        let next = corners[(i + 1) % corners.len()];
        draw_line(buffer, width, height, corners[i], next, color, thickness);
    }
}

/// Arrow pointing the way the platform should move, scaled to the frame.
fn draw_arrow(buffer: &mut [u8], width: u32, height: u32, direction: Direction) {
    let (w, h) = (width as f32, height as f32);
    let head = w.min(h) / 24.0;
    let (tail, tip) = match direction {
        Direction::Left => ((w / 4.0, h / 2.0), (w / 12.0, h / 2.0)),
        Direction::Right => ((w * 3.0 / 4.0, h / 2.0), (w * 11.0 / 12.0, h / 2.0)),
        Direction::Up => ((w / 2.0, h / 10.0), (w / 2.0, h / 32.0)),
        Direction::Down => ((w / 2.0, h * 9.0 / 10.0), (w / 2.0, h * 31.0 / 32.0)),
        Direction::Center | Direction::None => return,
    };

    draw_line(buffer, width, height, tail, tip, ARROW_COLOR, ARROW_THICKNESS);

    let (dx, dy) = (tip.0 - tail.0, tip.1 - tail.1);
    let len = (dx * dx + dy * dy).sqrt().max(f32::EPSILON);
    let (ux, uy) = (dx / len, dy / len);
    let base = (tip.0 - ux * head, tip.1 - uy * head);
    for side in [-1.0f32, 1.0] {
        let wing = (base.0 - uy * head * side, base.1 + ux * head * side);
        draw_line(buffer, width, height, wing, tip, ARROW_COLOR, ARROW_THICKNESS);
    }
}

fn draw_line(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    p0: (f32, f32),
    p1: (f32, f32),
    color: [u8; 4],
    thickness: i32,
) {
    let radius = (thickness.max(1) - 1) / 2;
    let Some((p0, p1)) = clip_segment(p0, p1, width, height, radius) else {
        return;
    };
    let (mut x0, mut y0) = p0;
    let (x1, y1) = p1;
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if radius > 0 {
            draw_circle(buffer, width, height, (x0, y0), radius, color);
        } else {
            put_pixel_safe(buffer, width, height, x0, y0, color);
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Visible part of a segment, in pixels, on the frame grown by `margin` on every side.
/// Non-finite endpoints draw nothing.
fn clip_segment(
    p0: (f32, f32),
    p1: (f32, f32),
    width: u32,
    height: u32,
    margin: i32,
) -> Option<((i32, i32), (i32, i32))> {
    if ![p0.0, p0.1, p1.0, p1.1].iter().all(|v| v.is_finite()) {
        return None;
    }
    let margin = f64::from(margin);
    let (min_x, min_y) = (-margin, -margin);
    let max_x = f64::from(width) - 1.0 + margin;
    let max_y = f64::from(height) - 1.0 + margin;

    // Liang-Barsky in f64 so far-away endpoints keep sub-pixel precision.
    let (x0, y0) = (f64::from(p0.0), f64::from(p0.1));
    let (dx, dy) = (f64::from(p1.0) - x0, f64::from(p1.1) - y0);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [(-dx, x0 - min_x), (dx, max_x - x0), (-dy, y0 - min_y), (dy, max_y - y0)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else if p < 0.0 {
            t0 = t0.max(q / p);
        } else {
            t1 = t1.min(q / p);
        }
        if t0 > t1 {
            return None;
        }
    }

    let snap = |t: f64| {
        (
            (x0 + t * dx).clamp(min_x, max_x).round() as i32,
            (y0 + t * dy).clamp(min_y, max_y).round() as i32,
        )
    };
    Some((snap(t0), snap(t1)))
}

/// Pixel position of a point near the frame, `None` when it cannot touch the frame.
fn to_pixel(point: (f32, f32), width: u32, height: u32, radius: i32) -> Option<(i32, i32)> {
    let (x, y) = point;
    let reach = radius as f32;
    let inside = x.is_finite()
        && y.is_finite()
        && x >= -reach
        && y >= -reach
        && x <= width as f32 + reach
        && y <= height as f32 + reach;
    inside.then(|| (x.round() as i32, y.round() as i32))
}

fn draw_circle(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    center: (i32, i32),
    radius: i32,
    color: [u8; 4],
) {
    let (cx, cy) = center;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_safe(buffer, width, height, cx + dx, cy + dy, color);
            }
        }
    }
}

fn put_pixel_safe(buffer: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u32, y as u32);
    if ux >= width || uy >= height {
        return;
    }
    let idx = ((uy * width + ux) as usize) * 4;
    if idx + 3 < buffer.len() {
        buffer[idx..idx + 4].copy_from_slice(&color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * frame.width + x) * 4) as usize;
        [
            frame.rgba[idx],
            frame.rgba[idx + 1],
            frame.rgba[idx + 2],
            frame.rgba[idx + 3],
        ]
    }

    fn empty_input() -> OverlayInput<'static> {
        OverlayInput {
            person: None,
            center: None,
            centered: false,
            direction: Direction::None,
        }
    }

    #[test]
    fn grid_lines_are_drawn_at_thirds() {
        let mut frame = Frame::filled(90, 60, [0, 0, 0, 255]);
        annotate(&mut frame, &empty_input());
        assert_eq!(pixel(&frame, 30, 5), GRID_COLOR);
        assert_eq!(pixel(&frame, 60, 50), GRID_COLOR);
        assert_eq!(pixel(&frame, 5, 20), GRID_COLOR);
        assert_eq!(pixel(&frame, 10, 10), [0, 0, 0, 255]);
    }

    #[test]
    fn keypoint_color_follows_centered_flag() {
        let person = Person::undetected(0.9)
            .with_keypoint(BodyPart::Nose, 10.0, 10.0, 0.9)
            .with_keypoint(BodyPart::LeftEye, 10.0, 10.0, 0.9)
            .with_keypoint(BodyPart::RightEye, 10.0, 10.0, 0.9);

        let mut frame = Frame::filled(300, 300, [0, 0, 0, 255]);
        let mut input = empty_input();
        input.person = Some(&person);
        input.centered = true;
        annotate(&mut frame, &input);
        assert_eq!(pixel(&frame, 10, 10), CENTERED_COLOR);

        let mut frame = Frame::filled(300, 300, [0, 0, 0, 255]);
        input.centered = false;
        annotate(&mut frame, &input);
        assert_eq!(pixel(&frame, 10, 10), OFF_CENTER_COLOR);
    }

    #[test]
    fn left_arrow_points_at_left_edge() {
        let person = Person::undetected(0.9);
        let mut frame = Frame::filled(480, 640, [0, 0, 0, 255]);
        let mut input = empty_input();
        input.person = Some(&person);
        input.direction = Direction::Left;
        annotate(&mut frame, &input);
        assert_eq!(pixel(&frame, 80, 320), ARROW_COLOR);
    }

    #[test]
    fn drawing_outside_the_frame_is_clipped() {
        let person = Person::undetected(0.9)
            .with_keypoint(BodyPart::Nose, -500.0, 9_000.0, 0.9)
            .with_bounding_box(BoundingBox {
                left: -100.0,
                top: -100.0,
                right: 1_000.0,
                bottom: 1_000.0,
            })
            .with_id(3);
        let mut frame = Frame::filled(40, 40, [0, 0, 0, 255]);
        let mut input = empty_input();
        input.person = Some(&person);
        input.center = Some(Point::new(-1.0, -1.0));
        annotate(&mut frame, &input);
        assert!(frame.is_well_formed());
    }

    #[test]
    fn far_away_keypoint_is_clipped_to_the_frame_edge() {
        for far_x in [3.0e9f32, 2.0e7, -3.0e9] {
            let person = Person::undetected(0.9)
                .with_keypoint(BodyPart::LeftElbow, 240.0, 10.0, 0.9)
                .with_keypoint(BodyPart::LeftWrist, far_x, 10.0, 0.01);
            let mut frame = Frame::filled(480, 640, [0, 0, 0, 255]);
            let mut input = empty_input();
            input.person = Some(&person);

            let started = std::time::Instant::now();
            annotate(&mut frame, &input);
            assert!(started.elapsed() < std::time::Duration::from_secs(1), "x = {far_x}");

            let edge = if far_x > 0.0 { 479 } else { 0 };
            assert_eq!(pixel(&frame, edge, 10), OFF_CENTER_COLOR, "x = {far_x}");
        }
    }

    #[test]
    fn non_finite_points_are_skipped() {
        let person = Person::undetected(0.9)
            .with_keypoint(BodyPart::LeftShoulder, f32::NAN, 10.0, 0.9)
            .with_keypoint(BodyPart::LeftElbow, f32::INFINITY, f32::NEG_INFINITY, 0.9);
        let mut frame = Frame::filled(60, 60, [0, 0, 0, 255]);
        let mut input = empty_input();
        input.person = Some(&person);
        input.center = Some(Point::new(f32::NAN, f32::NAN));
        annotate(&mut frame, &input);
        assert!(frame.is_well_formed());
    }

    #[test]
    fn clipping_keeps_visible_segments_intact() {
        assert_eq!(
            clip_segment((5.0, 5.0), (20.0, 5.0), 40, 40, 0),
            Some(((5, 5), (20, 5)))
        );
        assert_eq!(
            clip_segment((-100.0, 10.0), (100.0, 10.0), 40, 40, 1),
            Some(((-1, 10), (40, 10)))
        );
        assert_eq!(clip_segment((-10.0, -10.0), (-5.0, -20.0), 40, 40, 1), None);
        assert_eq!(clip_segment((f32::NAN, 0.0), (1.0, 1.0), 40, 40, 1), None);
    }
}
