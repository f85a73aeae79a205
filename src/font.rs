//! Stroke fonts for turning label text into knife-free pen strokes.
//!
//! Fonts come in the CXF format QCAD and LinuxCNC's engraving scripts use:
//!
//! ```text
//! [r] 3
//! L 0,0,0,6
//! L 0,6,2,6
//! A 2,5,1,0,90
//!
//! ```
//!
//! A header names the glyph and how many records follow, `L` records are
//! straight strokes, `A` records counter-clockwise arcs (centre, radius,
//! start and end angle in degrees). A blank line ends the glyph.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use lyon::math::{point, vector, Point};

use crate::error::{Error, FontError};
use crate::plot::Label;

/// Turns a label into the polylines that draw it.
pub trait LabelRenderer {
    fn render(&self, label: &Label) -> Vec<Vec<Point>>;
}

/// Arcs are approximated by one segment per this many degrees (or less).
const ARC_STEP_DEGREES: f32 = 20.0;
/// Glyph units from baseline to the top of a capital.
const CAP_HEIGHT: f32 = 9.0;
/// Glyph units a typical character is wide.
const NOMINAL_WIDTH: f32 = 6.0;
const PLOTTER_UNITS_PER_CM: f32 = 400.0;
/// Character cell width as a multiple of the character width.
const CHAR_ADVANCE: f32 = 1.5;

type Stroke = Vec<Point>;

#[derive(Clone, Debug, Default)]
pub struct CxfFont {
    glyphs: HashMap<char, Vec<Stroke>>,
}

struct GlyphInProgress {
    key: Option<char>,
    declared: usize,
    read: usize,
    strokes: Vec<Stroke>,
}

fn parse_numbers(record: &str, expected: usize, line: usize) -> Result<Vec<f32>, FontError> {
    let nums = record
        .split(',')
        .map(|n| n.trim().parse::<f32>())
        .collect::<Result<Vec<f32>, _>>()
        .map_err(|e| FontError {
            line,
            detail: format!("bad number in '{}': {}", record, e),
        })?;

    if nums.len() != expected {
        return Err(FontError {
            line,
            detail: format!("expected {} numbers, got {}", expected, nums.len()),
        });
    }
    Ok(nums)
}

/// `a`, or `#0041` style code points.
fn glyph_key(name: &str) -> Option<char> {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        (Some('#'), Some(_)) => u32::from_str_radix(&name[1..], 16).ok().and_then(std::char::from_u32),
        _ => None,
    }
}

/// Flattens a counter-clockwise arc into a polyline.
fn flatten_arc(cx: f32, cy: f32, radius: f32, start: f32, end: f32) -> Stroke {
    let start = if end < start { start - 360.0 } else { start };
    let segments = ((end - start) / ARC_STEP_DEGREES) as usize + 1;
    let step = (end - start) / segments as f32;

    (0..=segments)
        .map(|i| {
            let angle = (start + step * i as f32).to_radians();
            point(cx + radius * angle.cos(), cy + radius * angle.sin())
        })
        .collect()
}

impl CxfFont {
    pub fn parse(source: &str) -> Result<Self, FontError> {
        let mut font = CxfFont::default();
        let mut current: Option<GlyphInProgress> = None;

        for (idx, text) in source.lines().enumerate() {
            let line = idx + 1;
            let text = text.trim_end();

            if text.is_empty() {
                if let Some(glyph) = current.take() {
                    font.finish_glyph(glyph, line);
                }
                continue;
            }

            if text.starts_with('[') {
                let close = text.rfind(']').ok_or(FontError {
                    line,
                    detail: "glyph header without ']'".to_string(),
                })?;
                let name = &text[1..close];
                let declared = text[close + 1..].trim().parse().unwrap_or(0);
                let key = glyph_key(name);
                if key.is_none() {
                    warn!("font line {}: cannot use glyph name '{}', skipping it", line, name);
                }
                if let Some(glyph) = current.take() {
                    font.finish_glyph(glyph, line);
                }
                current = Some(GlyphInProgress {
                    key,
                    declared,
                    read: 0,
                    strokes: Vec::new(),
                });
                continue;
            }

            let glyph = match current.as_mut() {
                Some(glyph) => glyph,
                // comments and metadata outside of glyphs
                None => continue,
            };

            if let Some(record) = text.strip_prefix("L ") {
                let n = parse_numbers(record, 4, line)?;
                glyph.strokes.push(vec![point(n[0], n[1]), point(n[2], n[3])]);
                glyph.read += 1;
            } else if let Some(record) = text.strip_prefix("A ") {
                let n = parse_numbers(record, 5, line)?;
                glyph.strokes.push(flatten_arc(n[0], n[1], n[2], n[3], n[4]));
                glyph.read += 1;
            } else {
                trace!("font line {}: ignoring '{}'", line, text);
            }
        }

        if let Some(glyph) = current.take() {
            font.finish_glyph(glyph, source.lines().count());
        }

        debug!("loaded font with {} glyphs", font.glyphs.len());
        Ok(font)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let source = fs::read_to_string(path)?;
        Ok(CxfFont::parse(&source)?)
    }

    fn finish_glyph(&mut self, glyph: GlyphInProgress, line: usize) {
        if glyph.declared != glyph.read {
            warn!(
                "font line {}: glyph {:?} declares {} records but has {}",
                line, glyph.key, glyph.declared, glyph.read
            );
        }
        if let Some(key) = glyph.key {
            self.glyphs.insert(key, glyph.strokes);
        }
    }

    pub fn glyph(&self, c: char) -> Option<&[Stroke]> {
        self.glyphs.get(&c).map(|strokes| strokes.as_slice())
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

impl LabelRenderer for CxfFont {
    fn render(&self, label: &Label) -> Vec<Vec<Point>> {
        let width = label.size.x * PLOTTER_UNITS_PER_CM;
        let height = label.size.y * PLOTTER_UNITS_PER_CM;
        let (sx, sy) = (width / NOMINAL_WIDTH, height / CAP_HEIGHT);

        let length = label.direction.length();
        let run = if length > 0.0 { label.direction / length } else { vector(1.0, 0.0) };
        let rise = vector(-run.y, run.x);

        let mut strokes = Vec::new();
        let mut advance = 0.0;

        for c in label.text.chars() {
            match self.glyphs.get(&c) {
                Some(glyph) => {
                    for stroke in glyph {
                        strokes.push(
                            stroke
                                .iter()
                                .map(|p| label.origin + run * (advance + p.x * sx) + rise * (p.y * sy))
                                .collect(),
                        );
                    }
                }
                None if !c.is_whitespace() => warn!("no glyph for {:?} in label {:?}", c, label.text),
                None => {}
            }
            advance += width * CHAR_ADVANCE;
        }

        strokes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FONT: &str = "# Format: QCAD 2 Font\n\
                        # Name: test\n\
                        \n\
                        [I] 1\n\
                        L 0,0,0,9\n\
                        \n\
                        [#0043] 1\n\
                        A 3,4.5,3,90,270\n\
                        \n\
                        [-] 2\n\
                        L 0,4,6,4\n";

    fn close(a: Point, b: Point) -> bool {
        (a - b).length() < 1e-3
    }

    #[test]
    fn parses_lines_arcs_and_code_points() {
        let font = CxfFont::parse(FONT).unwrap();
        assert_eq!(font.len(), 3);
        assert_eq!(font.glyph('I').unwrap(), &[vec![point(0.0, 0.0), point(0.0, 9.0)]][..]);

        let arc = &font.glyph('C').unwrap()[0];
        assert!(close(arc[0], point(3.0, 7.5)));
        assert!(close(arc[arc.len() - 1], point(3.0, 1.5)));
        // 180 degrees at <= 20 degrees per segment
        assert_eq!(arc.len(), 11);

        // the final glyph has no blank line after it, and declares one record too many
        assert_eq!(font.glyph('-').unwrap().len(), 1);
    }

    #[test]
    fn closing_bracket_can_name_a_glyph() {
        let font = CxfFont::parse("[]] 2\nL 0,0,0,9\nL 0,9,3,9\n\n[[] 1\nL 3,0,3,9\n").unwrap();
        assert_eq!(font.len(), 2);
        assert_eq!(font.glyph(']').unwrap().len(), 2);
        assert_eq!(font.glyph('[').unwrap().len(), 1);
    }

    #[test]
    fn arcs_crossing_zero_go_counter_clockwise() {
        let arc = flatten_arc(0.0, 0.0, 1.0, 270.0, 90.0);
        assert!(close(arc[0], point(0.0, -1.0)));
        assert!(close(arc[arc.len() / 2], point(1.0, 0.0)));
        assert!(close(arc[arc.len() - 1], point(0.0, 1.0)));
    }

    #[test]
    fn malformed_records_are_errors() {
        let err = CxfFont::parse("[a] 1\nL 0,0,x,1\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(CxfFont::parse("[a] 1\nA 0,0,1\n").is_err());
        assert!(CxfFont::parse("[a 1\n").is_err());
    }

    #[test]
    fn label_layout_scales_rotates_and_advances() {
        let font = CxfFont::parse(FONT).unwrap();
        let label = Label {
            text: "I I".to_string(),
            origin: point(100.0, 100.0),
            direction: vector(0.0, 2.0),
            // 1.5cm wide, 0.9cm high
            size: vector(1.5, 0.9),
        };
        let strokes = font.render(&label);
        assert_eq!(strokes.len(), 2);

        // upright stroke of height 9 becomes 360 plotter units, rotated to point left
        assert!(close(strokes[0][0], point(100.0, 100.0)));
        assert!(close(strokes[0][1], point(-260.0, 100.0)));

        // two character cells further along the text direction
        let cell = 1.5 * 400.0 * CHAR_ADVANCE;
        assert!(close(strokes[1][0], point(100.0, 100.0 + 2.0 * cell)));
    }

    #[test]
    fn unknown_glyphs_are_skipped() {
        let font = CxfFont::parse(FONT).unwrap();
        let label = Label {
            text: "?I".to_string(),
            origin: point(0.0, 0.0),
            direction: vector(1.0, 0.0),
            size: vector(0.19, 0.27),
        };
        let strokes = font.render(&label);
        assert_eq!(strokes.len(), 1);
        assert!(close(strokes[0][0], point(0.19 * 400.0 * CHAR_ADVANCE, 0.0)));
    }
}
