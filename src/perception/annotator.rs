/// Draw the selected candidate and its aim point onto a copy of the frame.
use image::{Rgb, RgbImage};

use crate::perception::types::{ClassId, Detection, Point};

const MARKER_COLOUR: Rgb<u8> = Rgb([255, 255, 255]);

/// Colour palette indexed by class id, cycling for larger models.
fn class_colour(class: ClassId) -> Rgb<u8> {
    const PALETTE: [[u8; 3]; 4] = [
        [255, 68, 68],  // red
        [68, 140, 255], // blue
        [68, 255, 68],  // green
        [255, 170, 0],  // orange
    ];
    Rgb(PALETTE[class.0 % PALETTE.len()])
}

/// Returns an annotated copy; the source frame is left untouched.
pub fn annotate_target(frame: &RgbImage, detection: &Detection, aim: Point) -> RgbImage {
    let mut canvas = frame.clone();
    let thickness: i32 = if canvas.width() > 1600 { 3 } else { 2 };

    let b = detection.bbox;
    draw_rect(
        &mut canvas,
        b.x1.round() as i32,
        b.y1.round() as i32,
        b.x2.round() as i32,
        b.y2.round() as i32,
        class_colour(detection.class_id),
        thickness,
    );
    draw_cross(&mut canvas, aim.x.round() as i32, aim.y.round() as i32, 6, MARKER_COLOUR);
    canvas
}

fn put(canvas: &mut RgbImage, x: i32, y: i32, col: Rgb<u8>) {
    let (w, h) = canvas.dimensions();
    if x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h {
        canvas.put_pixel(x as u32, y as u32, col);
    }
}

fn draw_rect(
    canvas: &mut RgbImage,
    x1: i32, y1: i32, x2: i32, y2: i32,
    col: Rgb<u8>,
    thickness: i32,
) {
    for t in 0..thickness {
        // Top & bottom edges
        for x in x1..=x2 {
            put(canvas, x, y1 + t, col);
            put(canvas, x, y2 - t, col);
        }
        // Left & right edges
        for y in y1..=y2 {
            put(canvas, x1 + t, y, col);
            put(canvas, x2 - t, y, col);
        }
    }
}

fn draw_cross(canvas: &mut RgbImage, cx: i32, cy: i32, arm: i32, col: Rgb<u8>) {
    for d in -arm..=arm {
        put(canvas, cx + d, cy, col);
        put(canvas, cx, cy + d, col);
    }
}
