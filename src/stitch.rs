//! Joins knife strokes that share endpoints into maximal continuous cuts.
//!
//! Every incoming trace is offered to a map of currently open polylines keyed
//! by their endpoints. If one of them touches the trace (within the tolerance)
//! the two are concatenated and the result is offered again, until nothing
//! touches it anymore or it closes into a ring. Polylines live in an arena and
//! are referred to by index, so a polyline reachable from both of its endpoint
//! slots is still only emitted once.

use std::collections::HashMap;
use std::fmt;

use lyon::math::Point;

use crate::block_builder::BlockBuilder;
use crate::plot::{Plot, PEN_CUT, PEN_CUT_RING};

/// Endpoint tolerance in plotter units; absorbs rounding in the CAD export.
pub const DEFAULT_TOLERANCE: f32 = 0.5;

/// One stitched result.
#[derive(Clone, Debug, PartialEq)]
pub enum Chain {
    Open(Vec<Point>),
    /// Closed polyline, last point repeats the first (within tolerance).
    Ring(Vec<Point>),
}

impl Chain {
    pub fn points(&self) -> &[Point] {
        match self {
            Chain::Open(pts) | Chain::Ring(pts) => pts,
        }
    }

    pub fn is_ring(&self) -> bool {
        match self {
            Chain::Ring(_) => true,
            Chain::Open(_) => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StitchReport {
    /// knife traces fed into the stitcher
    pub consumed: usize,
    pub merges: usize,
    pub open: usize,
    pub rings: usize,
    pub self_intersections: usize,
    /// knife blocks whose trace had fewer than two points
    pub degenerate: usize,
}

impl fmt::Display for StitchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} knife traces -> {} open cuts + {} rings ({} merges, {} self-intersections skipped, {} degenerate ignored)",
            self.consumed, self.open, self.rings, self.merges, self.self_intersections, self.degenerate
        )
    }
}

/// How an incoming polyline attaches to an open one, in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Join {
    /// incoming tail meets existing head
    TailToHead,
    /// incoming head meets existing tail
    HeadToTail,
    /// both heads meet, existing gets reversed
    HeadToHead,
    /// both tails meet, existing gets reversed
    TailToTail,
}

impl Join {
    const PRIORITY: [Join; 4] = [Join::TailToHead, Join::HeadToTail, Join::HeadToHead, Join::TailToTail];

    /// The (incoming, existing) endpoints this join connects.
    fn ends(self, incoming: &[Point], existing: &[Point]) -> (Point, Point) {
        let (ih, it) = (incoming[0], incoming[incoming.len() - 1]);
        let (eh, et) = (existing[0], existing[existing.len() - 1]);
        match self {
            Join::TailToHead => (it, eh),
            Join::HeadToTail => (ih, et),
            Join::HeadToHead => (ih, eh),
            Join::TailToTail => (it, et),
        }
    }

    /// Concatenates the two, dropping the duplicated joint point.
    fn apply(self, incoming: Vec<Point>, mut existing: Vec<Point>) -> Vec<Point> {
        match self {
            Join::TailToHead => concat(incoming, existing),
            Join::HeadToTail => concat(existing, incoming),
            Join::HeadToHead => {
                existing.reverse();
                concat(existing, incoming)
            }
            Join::TailToTail => {
                existing.reverse();
                concat(incoming, existing)
            }
        }
    }
}

fn concat(mut first: Vec<Point>, second: Vec<Point>) -> Vec<Point> {
    first.extend(second.into_iter().skip(1));
    first
}

#[derive(Clone, Debug)]
enum Slot {
    Open(Vec<Point>),
    Ring(Vec<Point>),
    /// left alone after a self-intersection, never extended
    Passthrough(Vec<Point>),
    /// absorbed into a newer polyline
    Merged,
}

type Cell = (i64, i64);

/// Buckets endpoints into square cells at least as large as the tolerance,
/// so all candidates for a point are within its 3x3 neighbourhood.
#[derive(Clone, Debug)]
struct EndpointGrid {
    cell_size: f32,
    cells: HashMap<Cell, Vec<usize>>,
}

impl EndpointGrid {
    fn new(tolerance: f32) -> Self {
        EndpointGrid {
            cell_size: if tolerance > 0.0 { tolerance } else { 1.0 },
            cells: HashMap::new(),
        }
    }

    fn cell_of(&self, p: Point) -> Cell {
        ((p.x / self.cell_size).floor() as i64, (p.y / self.cell_size).floor() as i64)
    }

    fn insert(&mut self, idx: usize, p: Point) {
        let cell = self.cell_of(p);
        self.cells.entry(cell).or_insert_with(Vec::new).push(idx);
    }

    fn remove(&mut self, idx: usize, p: Point) {
        let cell = self.cell_of(p);
        let now_empty = match self.cells.get_mut(&cell) {
            Some(entries) => {
                entries.retain(|&i| i != idx);
                entries.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.cells.remove(&cell);
        }
    }

    fn near(&self, p: Point, out: &mut Vec<usize>) {
        let (cx, cy) = self.cell_of(p);
        for dx in -1..=1 {
            for dy in -1..=1 {
                if let Some(entries) = self.cells.get(&(cx + dx, cy + dy)) {
                    out.extend_from_slice(entries);
                }
            }
        }
    }
}

pub struct Stitcher {
    tolerance: f32,
    slots: Vec<Slot>,
    grid: EndpointGrid,
    report: StitchReport,
}

impl Stitcher {
    pub fn new(tolerance: f32) -> Self {
        Stitcher {
            tolerance,
            slots: Vec::new(),
            grid: EndpointGrid::new(tolerance),
            report: StitchReport::default(),
        }
    }

    fn coincide(&self, a: Point, b: Point) -> bool {
        a.distance_to(b) <= self.tolerance
    }

    /// Exactly coincident ends always close a ring. A fuzzy match needs a
    /// third point, otherwise a stroke shorter than the tolerance would count.
    fn is_closed(&self, points: &[Point]) -> bool {
        let (head, tail) = (points[0], points[points.len() - 1]);
        head == tail || (points.len() > 2 && self.coincide(head, tail))
    }

    pub fn add(&mut self, trace: Vec<Point>) {
        if trace.len() < 2 {
            trace!("ignoring degenerate trace {:?}", trace);
            self.report.degenerate += 1;
            return;
        }
        self.report.consumed += 1;

        let mut points = trace;
        loop {
            if self.is_closed(&points) {
                trace!(" -> closed ring with {} points", points.len());
                self.slots.push(Slot::Ring(points));
                return;
            }

            let (idx, join) = match self.find_partner(&points) {
                Some(found) => found,
                None => {
                    self.insert_open(points);
                    return;
                }
            };

            if self.touches_one_end_twice(&points, idx) {
                warn!(
                    "self-intersection: trace {:?}..{:?} meets polyline {} twice at the same end, not merging",
                    points[0],
                    points[points.len() - 1],
                    idx
                );
                self.report.self_intersections += 1;
                self.slots.push(Slot::Passthrough(points));
                return;
            }

            let existing = self.take_open(idx);
            trace!(" -> {:?} with polyline {} ({} + {} points)", join, idx, points.len(), existing.len());
            points = join.apply(points, existing);
            self.report.merges += 1;
        }
    }

    /// First open polyline that touches `points`, trying the joins in
    /// priority order and lower (older) indices first.
    fn find_partner(&self, points: &[Point]) -> Option<(usize, Join)> {
        let mut candidates = Vec::new();
        self.grid.near(points[0], &mut candidates);
        self.grid.near(points[points.len() - 1], &mut candidates);
        candidates.sort_unstable();
        candidates.dedup();

        for join in Join::PRIORITY.iter() {
            for &idx in &candidates {
                if let Slot::Open(ref existing) = self.slots[idx] {
                    let (a, b) = join.ends(points, existing);
                    if self.coincide(a, b) {
                        return Some((idx, *join));
                    }
                }
            }
        }
        None
    }

    /// Both ends of `points` land on the same end of polyline `idx`. Only
    /// possible with a fuzzy tolerance; joining would fold the cut onto itself.
    fn touches_one_end_twice(&self, points: &[Point], idx: usize) -> bool {
        let (head, tail) = (points[0], points[points.len() - 1]);
        match self.slots[idx] {
            Slot::Open(ref existing) => [existing[0], existing[existing.len() - 1]]
                .iter()
                .any(|&end| self.coincide(head, end) && self.coincide(tail, end)),
            _ => false,
        }
    }

    fn insert_open(&mut self, points: Vec<Point>) {
        let idx = self.slots.len();
        self.grid.insert(idx, points[0]);
        self.grid.insert(idx, points[points.len() - 1]);
        trace!(" -> open polyline {} with {} points", idx, points.len());
        self.slots.push(Slot::Open(points));
    }

    fn take_open(&mut self, idx: usize) -> Vec<Point> {
        match std::mem::replace(&mut self.slots[idx], Slot::Merged) {
            Slot::Open(points) => {
                self.grid.remove(idx, points[0]);
                self.grid.remove(idx, points[points.len() - 1]);
                points
            }
            other => {
                // find_partner only ever hands out open slots
                self.slots[idx] = other;
                Vec::new()
            }
        }
    }

    /// The final polylines in creation order, each exactly once.
    pub fn finish(mut self) -> (Vec<Chain>, StitchReport) {
        let mut chains = Vec::new();
        for slot in self.slots {
            match slot {
                Slot::Open(pts) | Slot::Passthrough(pts) => {
                    self.report.open += 1;
                    chains.push(Chain::Open(pts));
                }
                Slot::Ring(pts) => {
                    self.report.rings += 1;
                    chains.push(Chain::Ring(pts));
                }
                Slot::Merged => {}
            }
        }
        (chains, self.report)
    }
}

/// Stitches a set of traces in one go.
pub fn stitch_traces<I>(traces: I, tolerance: f32) -> (Vec<Chain>, StitchReport)
where
    I: IntoIterator<Item = Vec<Point>>,
{
    let mut stitcher = Stitcher::new(tolerance);
    for trace in traces {
        stitcher.add(trace);
    }
    stitcher.finish()
}

fn is_knife(pen: Option<i32>) -> bool {
    pen == Some(PEN_CUT) || pen == Some(PEN_CUT_RING)
}

/// Replaces every knife block of `plot` with one block per stitched cut,
/// appended after the remaining blocks. Rings get pen 3 and open cuts pen 2
/// unless `pen_override` says otherwise.
pub fn stitch_plot(plot: &mut Plot, tolerance: f32, pen_override: Option<i32>) -> StitchReport {
    let pens = plot.effective_pens();
    let knife_blocks = plot.extract_blocks(|idx, block| {
        is_knife(pens[idx]) && !block.is_initialization() && !block.is_uncuttable() && block.trace().is_some()
    });
    debug!("stitching {} knife blocks", knife_blocks.len());

    // travel moves inside a block split it into separate cuts
    let (chains, report) = stitch_traces(knife_blocks.iter().flat_map(|b| b.traces()), tolerance);

    for chain in &chains {
        let pen = pen_override.unwrap_or(if chain.is_ring() { PEN_CUT_RING } else { PEN_CUT });
        plot.append_block(BlockBuilder::polyline(pen, chain.points()));
    }

    info!("{}", report);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use lyon::math::point;

    fn seg(a: (f32, f32), b: (f32, f32)) -> Vec<Point> {
        vec![point(a.0, a.1), point(b.0, b.1)]
    }

    fn open_ends(chains: &[Chain]) -> Vec<(usize, Point)> {
        chains
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_ring())
            .flat_map(|(i, c)| {
                let pts = c.points();
                vec![(i, pts[0]), (i, pts[pts.len() - 1])]
            })
            .collect()
    }

    #[test]
    fn triangle_closes_and_dangling_segment_stays_open() {
        let (chains, report) = stitch_traces(
            vec![
                seg((0.0, 0.0), (1.0, 1.0)),
                seg((1.0, 1.0), (2.0, 2.0)),
                seg((2.0, 2.0), (0.0, 0.0)),
                seg((5.0, 5.0), (6.0, 6.0)),
            ],
            0.0,
        );

        assert_eq!(chains.len(), 2);
        assert_eq!(report.rings, 1);
        assert_eq!(report.open, 1);
        assert_eq!(report.merges, 2);

        let ring = chains.iter().find(|c| c.is_ring()).unwrap();
        assert_eq!(ring.points().len(), 4);
        for p in &[point(0.0, 0.0), point(1.0, 1.0), point(2.0, 2.0)] {
            assert!(ring.points().contains(p));
        }
        assert_eq!(ring.points()[0], ring.points()[3]);

        let open = chains.iter().find(|c| !c.is_ring()).unwrap();
        assert_eq!(open.points(), &[point(5.0, 5.0), point(6.0, 6.0)][..]);
    }

    #[test]
    fn each_join_orientation() {
        // tail-to-head
        let (c, _) = stitch_traces(vec![seg((1.0, 0.0), (2.0, 0.0)), seg((0.0, 0.0), (1.0, 0.0))], 0.0);
        assert_eq!(c, vec![Chain::Open(vec![point(0.0, 0.0), point(1.0, 0.0), point(2.0, 0.0)])]);

        // head-to-tail
        let (c, _) = stitch_traces(vec![seg((0.0, 0.0), (1.0, 0.0)), seg((1.0, 0.0), (2.0, 0.0))], 0.0);
        assert_eq!(c, vec![Chain::Open(vec![point(0.0, 0.0), point(1.0, 0.0), point(2.0, 0.0)])]);

        // head-to-head
        let (c, _) = stitch_traces(vec![seg((0.0, 0.0), (1.0, 0.0)), seg((0.0, 0.0), (0.0, 1.0))], 0.0);
        assert_eq!(c, vec![Chain::Open(vec![point(1.0, 0.0), point(0.0, 0.0), point(0.0, 1.0)])]);

        // tail-to-tail
        let (c, _) = stitch_traces(vec![seg((0.0, 0.0), (1.0, 0.0)), seg((2.0, 2.0), (1.0, 0.0))], 0.0);
        assert_eq!(c, vec![Chain::Open(vec![point(2.0, 2.0), point(1.0, 0.0), point(0.0, 0.0)])]);
    }

    #[test]
    fn merged_result_keeps_extending() {
        // the middle piece bridges two existing chains
        let (chains, report) = stitch_traces(
            vec![seg((0.0, 0.0), (1.0, 0.0)), seg((2.0, 0.0), (3.0, 0.0)), seg((1.0, 0.0), (2.0, 0.0))],
            0.0,
        );
        assert_eq!(report.merges, 2);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].points().len(), 4);
    }

    #[test]
    fn fuzzy_tolerance_joins_near_misses() {
        let (chains, _) = stitch_traces(vec![seg((0.0, 0.0), (10.0, 0.0)), seg((10.25, 0.0), (20.0, 0.0))], 0.5);
        assert_eq!(chains.len(), 1);

        let (chains, _) = stitch_traces(vec![seg((0.0, 0.0), (10.0, 0.0)), seg((10.25, 0.0), (20.0, 0.0))], 0.1);
        assert_eq!(chains.len(), 2);
    }

    #[test]
    fn exactly_coincident_ends_always_make_a_ring() {
        let square = vec![point(0.0, 0.0), point(10.0, 0.0), point(10.0, 10.0), point(0.0, 0.0)];
        let (chains, report) = stitch_traces(vec![square.clone()], 0.0);
        assert_eq!(chains, vec![Chain::Ring(square)]);
        assert_eq!(report.rings, 1);
    }

    #[test]
    fn closed_two_point_trace_is_a_ring_but_short_stroke_is_not() {
        let (chains, _) = stitch_traces(vec![seg((3.0, 3.0), (3.0, 3.0))], 0.5);
        assert_eq!(chains, vec![Chain::Ring(seg((3.0, 3.0), (3.0, 3.0)))]);

        let (chains, _) = stitch_traces(vec![seg((0.0, 0.0), (0.25, 0.0))], 0.5);
        assert_eq!(chains, vec![Chain::Open(seg((0.0, 0.0), (0.25, 0.0)))]);
    }

    #[test]
    fn rings_are_never_extended() {
        let square = vec![point(0.0, 0.0), point(10.0, 0.0), point(10.0, 10.0), point(0.0, 0.0)];
        let (chains, _) = stitch_traces(vec![square, seg((0.0, 0.0), (-5.0, 0.0))], 0.0);
        assert_eq!(chains.len(), 2);
        assert!(chains[0].is_ring());
        assert!(!chains[1].is_ring());
    }

    #[test]
    fn self_intersection_is_skipped() {
        // both ends of the second trace are within tolerance of (10,0), but not of each other
        let (chains, report) = stitch_traces(vec![seg((0.0, 0.0), (10.0, 0.0)), seg((10.75, 0.0), (10.0, 0.75))], 1.0);
        assert_eq!(report.self_intersections, 1);
        assert_eq!(report.merges, 0);
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[1].points(), &[point(10.75, 0.0), point(10.0, 0.75)][..]);
    }

    #[test]
    fn degenerate_traces_are_ignored() {
        let (chains, report) = stitch_traces(vec![vec![point(1.0, 1.0)], vec![]], 0.5);
        assert!(chains.is_empty());
        assert_eq!(report.degenerate, 2);
        assert_eq!(report.consumed, 0);
    }

    #[test]
    fn output_is_maximal() {
        // a zig-zag fed in scrambled order plus a few independent strokes
        let y = |i: usize| if i % 2 == 0 { 0.0 } else { 5.0 };
        let mut traces = Vec::new();
        for &i in &[11, 4, 7, 0, 9, 2, 5, 10, 1, 6, 3, 8] {
            let x = i as f32;
            let mut s = seg((x, y(i)), (x + 1.0, y(i + 1)));
            if i % 3 == 0 {
                s.reverse();
            }
            traces.push(s);
        }
        traces.push(seg((100.0, 0.0), (100.0, 10.0)));
        traces.push(seg((200.0, 0.0), (200.0, 10.0)));

        let tolerance = 0.25;
        let (chains, _) = stitch_traces(traces, tolerance);
        let ends = open_ends(&chains);
        for &(i, a) in &ends {
            for &(j, b) in &ends {
                if i != j {
                    assert!(a.distance_to(b) > tolerance, "chains {} and {} share endpoint {:?}", i, j, a);
                }
            }
        }
    }

    #[test]
    fn stitching_is_idempotent() {
        let traces = vec![
            seg((0.0, 0.0), (1.0, 1.0)),
            seg((3.0, 3.0), (2.0, 2.0)),
            seg((1.0, 1.0), (2.0, 2.0)),
            seg((2.0, 2.0), (0.0, 0.0)),
            seg((5.0, 5.0), (6.0, 6.0)),
            seg((7.0, 5.0), (6.0, 6.0)),
        ];
        let (first, _) = stitch_traces(traces, 0.0);
        let (second, report) = stitch_traces(first.iter().map(|c| c.points().to_vec()), 0.0);
        assert_eq!(first, second);
        assert_eq!(report.merges, 0);
    }

    #[test]
    fn plot_knife_blocks_are_replaced() {
        let input = "IN;SP0;PU;\
                     SP1;PU0,0;PD50,50;PU;\
                     SP2;PU0,0;PD1,1;PU;\
                     PU1,1;PD2,2;PU;\
                     PU2,2;PD0,0;PU;\
                     PU5,5;PD6,6;PU;";
        let mut plot = parse_str(input).unwrap();
        let report = stitch_plot(&mut plot, 0.0, None);

        assert_eq!(report.consumed, 4);
        assert_eq!(report.rings, 1);
        assert_eq!(report.open, 1);

        // untouched prefix first, then the synthesized cuts
        assert_eq!(plot.len(), 4);
        assert!(plot.blocks()[0].is_initialization());
        assert_eq!(plot.blocks()[1].pen(), Some(1));
        assert_eq!(plot.blocks()[2].pen(), Some(PEN_CUT_RING));
        assert_eq!(plot.blocks()[3].pen(), Some(PEN_CUT));
        assert_eq!(plot.blocks()[3].trace(), Some(seg((5.0, 5.0), (6.0, 6.0))));
    }

    #[test]
    fn travel_move_inside_a_block_is_not_cut() {
        let mut plot = parse_str("IN;SP0;PU;SP2;PU0,0;PD1,1;PU50,50;PD51,51;PU;").unwrap();
        let report = stitch_plot(&mut plot, 0.0, None);

        assert_eq!(report.consumed, 2);
        assert_eq!(report.open, 2);
        let cuts: Vec<Vec<Point>> = plot.iter().skip(1).filter_map(|b| b.trace()).collect();
        assert_eq!(cuts, vec![seg((0.0, 0.0), (1.0, 1.0)), seg((50.0, 50.0), (51.0, 51.0))]);
        assert!(!plot.to_hpgl().contains("PD1,1,51,51;"));
    }

    #[test]
    fn pen_override_applies_to_every_cut() {
        let mut plot = parse_str("SP2;PU0,0;PD1,1;PU;PU1,1;PD1,0;PD0,0;PU;PU7,7;PD8,8;PU;").unwrap();
        stitch_plot(&mut plot, 0.0, Some(5));
        assert!(plot.iter().all(|b| b.pen() == Some(5)));
    }
}
