//! Restructures HPGL exported by garment CAD for a combined pen/knife plotter.
//!
//! The stream is parsed into blocks, knife strokes sharing endpoints are
//! stitched into continuous cuts, and the result is reordered into a pen
//! pass, a knife pass and a label pass. Optionally the Y axis is mirrored.

#[macro_use]
extern crate log;

pub mod block_builder;
pub mod error;
pub mod font;
pub mod parser;
pub mod passes;
pub mod plot;
pub mod statement;
pub mod stitch;
pub mod transform;

pub use error::{Error, FontError, FormatError, MissingSetupError};
pub use font::{CxfFont, LabelRenderer};
pub use parser::{parse_lines, parse_str};
pub use passes::{organize, OrganizeReport, Pass, Passes};
pub use plot::{Block, Label, Plot, Previewer};
pub use statement::{Args, Command, Statement};
pub use stitch::{stitch_plot, Chain, StitchReport, Stitcher};
pub use transform::{mirror_y, ScaleMapping};

#[derive(Clone, Debug, PartialEq)]
pub struct Options {
    /// maximum endpoint distance for two knife strokes to be joined
    pub tolerance: f32,
    /// pen for all stitched cuts instead of 3 for rings and 2 for open cuts
    pub knife_pen: Option<i32>,
    pub mirror: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            tolerance: stitch::DEFAULT_TOLERANCE,
            knife_pen: None,
            mirror: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Summary {
    pub labels: usize,
    pub stitch: StitchReport,
    pub organize: OrganizeReport,
}

/// Runs the whole pipeline on one HPGL stream.
///
/// Labels are only expanded into strokes if a renderer is given, otherwise
/// text blocks go through unchanged into the label pass.
pub fn process(input: &str, options: &Options, labels: Option<&dyn LabelRenderer>) -> Result<(Plot, Summary), Error> {
    let mut plot = parse_str(input)?;
    let mut summary = Summary::default();

    plot.assign_pens();

    if let Some(renderer) = labels {
        summary.labels = plot.expand_labels(renderer);
        info!("expanded {} labels", summary.labels);
    }

    summary.stitch = stitch_plot(&mut plot, options.tolerance, options.knife_pen);
    summary.organize = organize(&mut plot);

    if options.mirror {
        mirror_y(&mut plot)?;
    }

    Ok((plot, summary))
}
