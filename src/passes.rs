//! Orders a stitched plot into contiguous tool passes: everything drawn with
//! the pen first, then the knife, then labels, behind the initialization block.

use std::fmt;

use crate::plot::{Block, Plot, PEN_CUT, PEN_CUT_RING, PEN_DRAW, PEN_LABEL};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pass {
    Pen,
    Knife,
    Labels,
}

impl Pass {
    pub const ORDER: [Pass; 3] = [Pass::Pen, Pass::Knife, Pass::Labels];

    pub fn for_pen(pen: i32) -> Option<Pass> {
        match pen {
            PEN_DRAW => Some(Pass::Pen),
            PEN_CUT | PEN_CUT_RING => Some(Pass::Knife),
            PEN_LABEL => Some(Pass::Labels),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrganizeReport {
    pub pen: usize,
    pub knife: usize,
    pub labels: usize,
    /// state-only blocks without anything to draw
    pub dropped: usize,
    /// blocks with geometry but no usable pen
    pub unresolved: usize,
}

impl fmt::Display for OrganizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "passes: {} pen, {} knife, {} label blocks ({} dropped, {} without a usable pen)",
            self.pen, self.knife, self.labels, self.dropped, self.unresolved
        )
    }
}

#[derive(Clone, Debug, Default)]
pub struct Passes {
    pub init: Option<Block>,
    pub pen: Vec<Block>,
    pub knife: Vec<Block>,
    pub labels: Vec<Block>,
}

impl Passes {
    /// Takes all blocks out of `plot` and sorts them into passes, keeping
    /// their relative order within each pass.
    pub fn classify(plot: &mut Plot) -> (Passes, OrganizeReport) {
        let pens = plot.effective_pens();
        let mut passes = Passes::default();
        let mut report = OrganizeReport::default();

        for (idx, (block, pen)) in plot.take_blocks().into_iter().zip(pens).enumerate() {
            if passes.init.is_none() && block.is_initialization() {
                trace!("block {} is the initialization block", idx);
                passes.init = Some(block);
                continue;
            }

            let drawable = block.is_text() || block.trace().is_some();
            let resolved = pen.and_then(|pen| Pass::for_pen(pen).map(|pass| (pen, pass)));
            match resolved {
                Some((pen, pass)) if drawable => {
                    // the block may be moved away from the SP it inherited
                    let block = if block.pen() == Some(pen) { block } else { block.with_pen(pen) };
                    trace!("block {} -> {:?} pass", idx, pass);
                    passes.get_mut(pass).push(block);
                }
                None if drawable => {
                    warn!("block {} draws something but pen {:?} is not a known tool, dropping it", idx, pen);
                    report.unresolved += 1;
                }
                _ => {
                    trace!("block {} has nothing to draw, dropping it", idx);
                    report.dropped += 1;
                }
            }
        }

        report.pen = passes.pen.len();
        report.knife = passes.knife.len();
        report.labels = passes.labels.len();
        (passes, report)
    }

    pub fn get(&self, pass: Pass) -> &[Block] {
        match pass {
            Pass::Pen => &self.pen,
            Pass::Knife => &self.knife,
            Pass::Labels => &self.labels,
        }
    }

    pub fn get_mut(&mut self, pass: Pass) -> &mut Vec<Block> {
        match pass {
            Pass::Pen => &mut self.pen,
            Pass::Knife => &mut self.knife,
            Pass::Labels => &mut self.labels,
        }
    }

    pub fn into_blocks(self) -> Vec<Block> {
        let mut blocks = Vec::with_capacity(1 + self.pen.len() + self.knife.len() + self.labels.len());
        blocks.extend(self.init);
        blocks.extend(self.pen);
        blocks.extend(self.knife);
        blocks.extend(self.labels);
        blocks
    }
}

/// Reorders `plot` in place: initialization block, pen pass, knife pass, labels.
pub fn organize(plot: &mut Plot) -> OrganizeReport {
    let (passes, report) = Passes::classify(plot);
    if passes.init.is_none() {
        warn!("no initialization block found");
    }
    plot.set_blocks(passes.into_blocks());
    // dropped state-only blocks may have carried the effective IP or SC
    plot.restore_setup();
    info!("{}", report);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use crate::statement::Statement;

    fn pens(plot: &Plot) -> Vec<Option<i32>> {
        plot.iter().map(Block::pen).collect()
    }

    #[test]
    fn passes_follow_tool_order() {
        let mut plot = parse_str(
            "SP2;PU0,0;PD1,1;PU;\
             SP1;PU2,2;PD3,3;PU;\
             SP4;PA5,5;LBX\u{3};PU;\
             SP1;PU4,4;PD5,5;PU;\
             SP3;PU6,6;PD7,7;PU;",
        )
        .unwrap();
        let report = organize(&mut plot);

        assert_eq!(pens(&plot), vec![Some(1), Some(1), Some(2), Some(3), Some(4)]);
        assert_eq!(report, OrganizeReport { pen: 2, knife: 2, labels: 1, dropped: 0, unresolved: 0 });
        // relative order inside a pass is kept
        assert_eq!(plot.blocks()[0].trace().unwrap()[0].x, 2.0);
        assert_eq!(plot.blocks()[1].trace().unwrap()[0].x, 4.0);
    }

    #[test]
    fn initialization_block_is_found_anywhere() {
        let mut plot = parse_str("SP1;PU0,0;PD1,1;PU;IN;SP0;PU;SP2;PU3,3;PD4,4;PU;").unwrap();
        organize(&mut plot);
        assert!(plot.blocks()[0].is_initialization());
        assert_eq!(plot.len(), 3);
    }

    #[test]
    fn state_only_and_unknown_pen_blocks_are_dropped() {
        let mut plot = parse_str("IN;SP0;PU;SP1;PU;SP7;PU0,0;PD1,1;PU;VS10;PU;SP2;PU3,3;PD4,4;PU;").unwrap();
        let report = organize(&mut plot);
        assert_eq!(report.dropped, 2);
        assert_eq!(report.unresolved, 1);
        assert_eq!(plot.len(), 2);
    }

    #[test]
    fn inherited_pens_are_made_explicit() {
        let mut plot = parse_str("SP2;PU0,0;PD1,1;PU;SP1;PU5,5;PD6,6;PU;PU8,8;PD9,9;PU;").unwrap();
        organize(&mut plot);
        // third block inherited pen 1 and moved in front of the knife block
        assert_eq!(pens(&plot), vec![Some(1), Some(1), Some(2)]);
    }

    #[test]
    fn effective_scale_survives_dropped_blocks() {
        let mut plot = parse_str(
            "IN;IP0,0,100,100;SC0,100,0,100;SP0;PU;SP1;SC0,200,0,200;PU;SP1;PU0,0;PD1,1;PU;",
        )
        .unwrap();
        organize(&mut plot);

        let text = plot.to_hpgl();
        assert!(text.contains("SC0,200,0,200;"));
        assert!(!text.contains("SC0,100,0,100;"));
        assert_eq!(plot.scale().unwrap().tail(), "0,200,0,200");
    }

    #[test]
    fn setup_from_dropped_block_goes_back_after_initialize() {
        let mut plot = parse_str("IN;SP0;PU;IP0,0,10,10;SC0,10,0,10;PU;SP1;PU0,0;PD1,1;PU;").unwrap();
        let report = organize(&mut plot);
        assert_eq!(report.dropped, 1);

        let init: Vec<String> = plot.blocks()[0].iter().map(Statement::to_text).collect();
        assert_eq!(init, vec!["IN;", "IP0,0,10,10;", "SC0,10,0,10;", "SP0;", "PU;"]);
    }

    #[test]
    fn every_drawable_block_lands_in_exactly_one_pass() {
        let mut plot = parse_str("IN;PU;SP1;PU0,0;PD1,1;PU;SP2;PU1,1;PD2,2;PU;SP3;PU2,2;PD3,3;PU;SP4;PA0,0;LBa\u{3};PU;").unwrap();
        let (passes, report) = Passes::classify(&mut plot);
        assert!(passes.init.is_some());
        let total: usize = Pass::ORDER.iter().map(|&p| passes.get(p).len()).sum();
        assert_eq!(total, 4);
        assert_eq!(report.pen + report.knife + report.labels, 4);
        assert!(plot.is_empty());
    }
}
