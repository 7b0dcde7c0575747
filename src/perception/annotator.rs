//! Marker annotation for resolved screen coordinates.
//!
//! Extracts a coordinate pair from a worker reply (tolerating the quasi-JSON
//! the model actually emits) and draws a fixed-size marker on a copy of the
//! captured frame for traceability.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::artifacts::derived_path;
use crate::errors::{TapCrewError, TapCrewResult};
use crate::perception::grid::quote_bare_keys;

const BOX_SIZE: i32 = 20;
const DOT_RADIUS: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct CoordinateAnnotation {
    pub bbox: BoundingBox,
    pub center: (i32, i32),
    pub annotated_path: PathBuf,
}

impl CoordinateAnnotation {
    /// Quasi-JSON rendering consumed by downstream workers; the tuple form
    /// mirrors how proposed coordinates are rendered into replies.
    pub fn describe(&self) -> String {
        format!(
            "{{\"center\": ({}, {}), \"bbox\": {{\"x\": {}, \"y\": {}, \"width\": {}, \"height\": {}}}}}",
            self.center.0, self.center.1, self.bbox.x, self.bbox.y, self.bbox.width, self.bbox.height
        )
    }
}

fn json_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*(\{[^`]*\})\s*```").unwrap())
}

/// Pull a two-element `coordinates` pair out of a reply's first ```json
/// block. Bare keys are quoted and parenthesis tuples converted to arrays
/// before the strict parse; anything still malformed yields `None`.
pub fn extract_coordinates(reply: &str) -> Option<(i32, i32)> {
    let block = json_block_re().captures(reply)?;
    let normalized = quote_bare_keys(block[1].trim())
        .replace('(', "[")
        .replace(')', "]");
    let data: serde_json::Value = serde_json::from_str(&normalized).ok()?;
    let coords = data.get("coordinates")?.as_array()?;
    if coords.len() != 2 {
        return None;
    }
    let x = coords[0].as_i64()?;
    let y = coords[1].as_i64()?;
    Some((x as i32, y as i32))
}

/// Draw a cyan box and blue center dot at `center` on a copy of `frame`,
/// written under `out_dir`.
pub fn annotate_point(
    frame: &Path,
    center: (i32, i32),
    out_dir: &Path,
) -> TapCrewResult<CoordinateAnnotation> {
    let img = image::open(frame)
        .map_err(|e| TapCrewError::Perception(format!("load frame {}: {e}", frame.display())))?;
    let mut canvas = img.to_rgba8();

    let (cx, cy) = center;
    let x1 = cx - BOX_SIZE / 2;
    let y1 = cy - BOX_SIZE / 2;
    let x2 = cx + BOX_SIZE / 2;
    let y2 = cy + BOX_SIZE / 2;

    draw_rect(&mut canvas, x1, y1, x2, y2, [0, 255, 255, 255], 3);
    draw_disc(&mut canvas, cx, cy, DOT_RADIUS, [0, 0, 255, 255]);

    let annotated_path = derived_path(frame, out_dir, "_marked");
    image::DynamicImage::ImageRgba8(canvas)
        .save(&annotated_path)
        .map_err(|e| TapCrewError::Perception(format!("save annotation: {e}")))?;

    tracing::debug!(
        frame = %frame.display(),
        annotated = %annotated_path.display(),
        x = cx,
        y = cy,
        "coordinate marker drawn"
    );

    Ok(CoordinateAnnotation {
        bbox: BoundingBox {
            x: x1,
            y: y1,
            width: BOX_SIZE as u32,
            height: BOX_SIZE as u32,
        },
        center,
        annotated_path,
    })
}

/// Combined extraction + annotation. `Ok(None)` when the reply carries no
/// well-formed coordinate pair.
pub fn annotate_from_reply(
    reply: &str,
    frame: &Path,
    out_dir: &Path,
) -> TapCrewResult<Option<CoordinateAnnotation>> {
    match extract_coordinates(reply) {
        Some(center) => annotate_point(frame, center, out_dir).map(Some),
        None => Ok(None),
    }
}

// ── Drawing primitives ──────────────────────────────────────────────────────

fn draw_rect(
    canvas: &mut image::RgbaImage,
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    col: [u8; 4],
    thickness: i32,
) {
    let (w, h) = canvas.dimensions();
    let (iw, ih) = (w as i32, h as i32);

    for t in 0..thickness {
        let ty = y1 + t;
        let by = y2 - t;
        for x in x1..=x2 {
            if x >= 0 && x < iw {
                if ty >= 0 && ty < ih {
                    canvas.put_pixel(x as u32, ty as u32, image::Rgba(col));
                }
                if by >= 0 && by < ih {
                    canvas.put_pixel(x as u32, by as u32, image::Rgba(col));
                }
            }
        }
        let lx = x1 + t;
        let rx = x2 - t;
        for y in y1..=y2 {
            if y >= 0 && y < ih {
                if lx >= 0 && lx < iw {
                    canvas.put_pixel(lx as u32, y as u32, image::Rgba(col));
                }
                if rx >= 0 && rx < iw {
                    canvas.put_pixel(rx as u32, y as u32, image::Rgba(col));
                }
            }
        }
    }
}

fn draw_disc(canvas: &mut image::RgbaImage, cx: i32, cy: i32, radius: i32, col: [u8; 4]) {
    let (w, h) = canvas.dimensions();
    let (iw, ih) = (w as i32, h as i32);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let x = cx + dx;
            let y = cy + dy;
            if x >= 0 && x < iw && y >= 0 && y < ih {
                canvas.put_pixel(x as u32, y as u32, image::Rgba(col));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_parenthesis_tuple_coordinates() {
        let reply = "Click here.\n```json\n{\"cell_numbers\": [787, 788], \"coordinates\": (539, 1950)}\n```";
        assert_eq!(extract_coordinates(reply), Some((539, 1950)));
    }

    #[test]
    fn extracts_bracket_coordinates_with_bare_keys() {
        let reply = "```json\n{coordinates: [74, 37]}\n```";
        assert_eq!(extract_coordinates(reply), Some((74, 37)));
    }

    #[test]
    fn absent_when_no_usable_pair() {
        assert_eq!(extract_coordinates("no block"), None);
        assert_eq!(extract_coordinates("```json\n{\"coordinates\": [1]}\n```"), None);
        assert_eq!(
            extract_coordinates("```json\n{\"coordinates\": [1, 2, 3]}\n```"),
            None
        );
        assert_eq!(extract_coordinates("```json\n{\"cell_numbers\": [1]}\n```"), None);
    }

    #[test]
    fn annotates_frame_copy() {
        let dir = tempfile::tempdir().unwrap();
        let frame = dir.path().join("shot.png");
        image::RgbaImage::from_pixel(200, 200, image::Rgba([10, 10, 10, 255]))
            .save(&frame)
            .unwrap();

        let annotation = annotate_point(&frame, (100, 100), dir.path()).unwrap();
        assert_eq!(annotation.center, (100, 100));
        assert_eq!(
            annotation.bbox,
            BoundingBox { x: 90, y: 90, width: 20, height: 20 }
        );
        assert!(annotation.annotated_path.exists());

        // Center dot is blue on the annotated copy, source stays untouched.
        let marked = image::open(&annotation.annotated_path).unwrap().to_rgba8();
        assert_eq!(marked.get_pixel(100, 100).0, [0, 0, 255, 255]);
        let original = image::open(&frame).unwrap().to_rgba8();
        assert_eq!(original.get_pixel(100, 100).0, [10, 10, 10, 255]);
    }

    #[test]
    fn annotate_from_reply_passes_through_absence() {
        let dir = tempfile::tempdir().unwrap();
        let frame = dir.path().join("shot.png");
        image::RgbaImage::from_pixel(50, 50, image::Rgba([0, 0, 0, 255]))
            .save(&frame)
            .unwrap();
        let result = annotate_from_reply("nothing structured", &frame, dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn describe_renders_tuple_center() {
        let annotation = CoordinateAnnotation {
            bbox: BoundingBox { x: 64, y: 27, width: 20, height: 20 },
            center: (74, 37),
            annotated_path: PathBuf::from("x.png"),
        };
        assert!(annotation.describe().contains("(74, 37)"));
    }
}
