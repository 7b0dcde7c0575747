//! Numbered grid overlay and cell-to-pixel resolution.
//!
//! Pixel-accurate coordinate naming from a vision model is unreliable;
//! discrete cell selection is not. A captured frame gets a uniform grid
//! with every cell number drawn on it, the model answers in cell numbers,
//! and this module turns those numbers back into one pixel coordinate.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::artifacts::derived_path;
use crate::errors::{TapCrewError, TapCrewResult};

/// One grid cell: pixel bounds and center.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub center: (u32, u32),
}

/// Dense 1-based row-major cell map for one captured frame.
#[derive(Debug, Clone)]
pub struct GridOverlay {
    pub source_path: PathBuf,
    pub grid_image_path: PathBuf,
    pub cell_size: u32,
    pub width: u32,
    pub height: u32,
    pub cols: u32,
    pub rows: u32,
    cells: BTreeMap<u32, GridCell>,
}

impl GridOverlay {
    pub fn total_cells(&self) -> u32 {
        self.cols * self.rows
    }

    pub fn cell(&self, number: u32) -> Option<&GridCell> {
        self.cells.get(&number)
    }

    /// Arithmetic mean of the selected cells' centers, truncated per axis.
    ///
    /// Indices absent from the map are logged and skipped. An empty or
    /// entirely invalid selection yields the (0, 0) sentinel; callers must
    /// treat it as "no usable selection", never as a screen position.
    pub fn resolve(&self, cell_numbers: &[i64]) -> (u32, u32) {
        let mut centers: Vec<(u32, u32)> = Vec::new();
        for &number in cell_numbers {
            let cell = u32::try_from(number).ok().and_then(|n| self.cells.get(&n));
            match cell {
                Some(cell) => centers.push(cell.center),
                None => tracing::warn!(cell = number, "invalid cell number skipped"),
            }
        }

        if centers.is_empty() {
            return (0, 0);
        }

        let n = centers.len() as u64;
        let sum_x: u64 = centers.iter().map(|c| u64::from(c.0)).sum();
        let sum_y: u64 = centers.iter().map(|c| u64::from(c.1)).sum();
        ((sum_x / n) as u32, (sum_y / n) as u32)
    }
}

// ── Overlay construction ─────────────────────────────────────────────────────

/// Partition `frame` into `cell_size` squares, number them row-major from 1,
/// and write a visually annotated copy (grid lines plus cell numbers) under
/// `out_dir` for the vision model to reference.
pub fn build_overlay(frame: &Path, cell_size: u32, out_dir: &Path) -> TapCrewResult<GridOverlay> {
    let img = image::open(frame)
        .map_err(|e| TapCrewError::Perception(format!("load frame {}: {e}", frame.display())))?;
    let mut canvas = img.to_rgba8();
    let (width, height) = canvas.dimensions();

    let cell_size = cell_size.max(1);
    let cols = width / cell_size;
    let rows = height / cell_size;

    const LINE: [u8; 4] = [255, 0, 0, 255]; // red grid lines
    const LABEL: [u8; 4] = [0, 0, 255, 255]; // blue cell numbers

    // Grid lines, 2 px wide, including the outer edges.
    for col in 0..=cols {
        let x = col * cell_size;
        for y in 0..height {
            for dx in 0..2 {
                if x + dx < width {
                    canvas.put_pixel(x + dx, y, image::Rgba(LINE));
                }
            }
        }
    }
    for row in 0..=rows {
        let y = row * cell_size;
        for x in 0..width {
            for dy in 0..2 {
                if y + dy < height {
                    canvas.put_pixel(x, y + dy, image::Rgba(LINE));
                }
            }
        }
    }

    let scale = (cell_size / 20).clamp(2, 6);
    let mut cells = BTreeMap::new();
    let mut number = 1u32;
    for row in 0..rows {
        for col in 0..cols {
            let x = col * cell_size;
            let y = row * cell_size;
            draw_number(&mut canvas, number, x + 5, y + 5, scale, LABEL);
            cells.insert(
                number,
                GridCell {
                    x,
                    y,
                    width: cell_size,
                    height: cell_size,
                    center: (x + cell_size / 2, y + cell_size / 2),
                },
            );
            number += 1;
        }
    }

    let grid_image_path = derived_path(frame, out_dir, "_grid");
    image::DynamicImage::ImageRgba8(canvas)
        .save(&grid_image_path)
        .map_err(|e| TapCrewError::Perception(format!("save grid overlay: {e}")))?;

    tracing::debug!(
        frame = %frame.display(),
        grid = %grid_image_path.display(),
        cols,
        rows,
        "grid overlay built"
    );

    Ok(GridOverlay {
        source_path: frame.to_path_buf(),
        grid_image_path,
        cell_size,
        width,
        height,
        cols,
        rows,
        cells,
    })
}

// ── Cell selection extraction ────────────────────────────────────────────────

fn json_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*(\{[^`]*\})\s*```").unwrap())
}

fn bare_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w+)\s*:").unwrap())
}

/// Quote unquoted object keys so quasi-JSON survives a strict parse.
/// Already-quoted keys are untouched (the closing quote breaks the match).
pub(crate) fn quote_bare_keys(text: &str) -> String {
    bare_key_re().replace_all(text, "\"${1}\":").into_owned()
}

/// Extract the `cell_numbers` list from the reply's first ```json block.
/// `None` when no block exists, the JSON stays malformed after key quoting,
/// or the list holds anything but integers.
pub fn extract_cell_numbers(reply: &str) -> Option<Vec<i64>> {
    let block = json_block_re().captures(reply)?;
    let normalized = quote_bare_keys(block[1].trim());
    let data: serde_json::Value = serde_json::from_str(&normalized).ok()?;
    let values = data.get("cell_numbers")?.as_array()?;
    values.iter().map(serde_json::Value::as_i64).collect()
}

/// Replace the reply's first ```json block with the resolved coordinate and
/// the original selection, so downstream workers see a concrete position
/// instead of cell numbers.
pub fn embed_coordinates(reply: &str, coordinates: (u32, u32), cell_numbers: &[i64]) -> String {
    static REPLACE_RE: OnceLock<Regex> = OnceLock::new();
    let re = REPLACE_RE.get_or_init(|| Regex::new(r"(?s)```json\s*\{[^`]*\}\s*```").unwrap());

    let cells = cell_numbers
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let replacement = format!(
        "```json\n{{\"cell_numbers\": [{cells}], \"coordinates\": ({}, {})}}\n```",
        coordinates.0, coordinates.1
    );
    re.replacen(reply, 1, replacement.as_str()).into_owned()
}

// ── Number drawing ───────────────────────────────────────────────────────────

// 5×5 bitmap digits; bit4 = leftmost pixel of the row.
const DIGIT_FONT: [[u8; 5]; 10] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110], // 0
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110], // 1
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111], // 2
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110], // 3
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010], // 4
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110], // 5
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110], // 6
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100], // 7
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110], // 8
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110], // 9
];

fn draw_number(canvas: &mut image::RgbaImage, number: u32, px: u32, py: u32, scale: u32, col: [u8; 4]) {
    let char_step = 5 * scale + scale; // glyph width + gap
    for (i, c) in number.to_string().chars().enumerate() {
        let glyph = DIGIT_FONT[(c as u8 - b'0') as usize];
        draw_glyph(canvas, &glyph, px + i as u32 * char_step, py, scale, col);
    }
}

fn draw_glyph(
    canvas: &mut image::RgbaImage,
    glyph: &[u8; 5],
    px: u32,
    py: u32,
    scale: u32,
    col: [u8; 4],
) {
    let (w, h) = canvas.dimensions();
    for (row, &bits) in glyph.iter().enumerate() {
        for bit in 0..5u32 {
            if (bits >> (4 - bit)) & 1 == 0 {
                continue;
            }
            for sy in 0..scale {
                for sx in 0..scale {
                    let x = px + bit * scale + sx;
                    let y = py + row as u32 * scale + sy;
                    if x < w && y < h {
                        canvas.put_pixel(x, y, image::Rgba(col));
                    }
                }
            }
        }
    }
}
