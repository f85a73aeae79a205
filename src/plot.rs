use std::io::{self, Write};
use std::mem;

use lyon::math::{point, vector, Box2D, Point, Vector};
use rand::Rng;

use crate::block_builder::BlockBuilder;
use crate::font::LabelRenderer;
use crate::parser::DEFAULT_TERMINATOR;
use crate::statement::{Args, Command, Statement};

pub const PEN_DRAW: i32 = 1;
pub const PEN_CUT: i32 = 2;
pub const PEN_CUT_RING: i32 = 3;
pub const PEN_LABEL: i32 = 4;

/// Maximum offset (in plotter units) of a block's preview jitter.
const JITTER: f32 = 8.0;

/// HPGL default character size (width, height) in cm.
const DEFAULT_CHAR_SIZE: (f32, f32) = (0.19, 0.27);

/// Everything a text block says about where and how to write its label.
#[derive(Clone, Debug, PartialEq)]
pub struct Label {
    pub text: String,
    pub origin: Point,
    pub direction: Vector,
    /// (width, height) in cm
    pub size: Vector,
}

/// One pen-lift-to-pen-lift group of statements.
#[derive(Clone, Debug)]
pub struct Block {
    statements: Vec<Statement>,
    jitter: Vector,
}

impl Block {
    pub fn new() -> Self {
        Block::from_statements(Vec::new())
    }

    pub fn from_statements(statements: Vec<Statement>) -> Self {
        let mut rng = rand::thread_rng();
        Block {
            statements,
            jitter: vector(rng.gen_range(-JITTER..JITTER), rng.gen_range(-JITTER..JITTER)),
        }
    }

    pub fn push_back(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Statement> {
        self.statements.iter()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn contains(&self, command: &Command) -> bool {
        self.statements.iter().any(|s| s.is(command))
    }

    /// Random offset used only to tell overlapping traces apart in previews.
    pub fn jitter(&self) -> Vector {
        self.jitter
    }

    /// The last pen this block selects itself, if any.
    pub fn pen(&self) -> Option<i32> {
        self.statements.iter().rev().filter_map(Statement::pen).next()
    }

    pub fn has_pen_selection(&self) -> bool {
        self.contains(&Command::SelectPen)
    }

    pub fn is_text(&self) -> bool {
        self.contains(&Command::Label)
    }

    /// Blocks that belong to a text label must never go to the knife.
    pub fn is_uncuttable(&self) -> bool {
        self.statements.iter().any(|s| s.command().is_label_part())
    }

    pub fn is_initialization(&self) -> bool {
        self.contains(&Command::Initialize)
    }

    pub fn is_page_eject(&self) -> bool {
        !self.is_empty() && self.statements.iter().all(|s| s.is(&Command::PageEject))
    }

    /// Every polyline this block draws. A `PU` with coordinates ends the
    /// current polyline; the next one starts at its target.
    pub fn traces(&self) -> Vec<Vec<Point>> {
        let mut traces = Vec::new();
        let mut start = None;
        let mut drawn: Vec<Point> = Vec::new();

        for s in &self.statements {
            match s.command() {
                Command::PenUp => {
                    if let Some(p) = s.coords().last() {
                        if !drawn.is_empty() {
                            traces.push(mem::replace(&mut drawn, Vec::new()));
                        }
                        start = Some(*p);
                    }
                }
                Command::PenDown if !s.coords().is_empty() => {
                    if drawn.is_empty() {
                        drawn.extend(start.take());
                    }
                    drawn.extend_from_slice(s.coords());
                }
                _ => {}
            }
        }

        if !drawn.is_empty() {
            traces.push(drawn);
        }
        traces
    }

    /// The first polyline this block draws: the pen-up target (if any)
    /// followed by the pen-down points up to the next travel move. `None` if
    /// the pen never goes down.
    pub fn trace(&self) -> Option<Vec<Point>> {
        self.traces().into_iter().next()
    }

    pub fn jittered_trace(&self) -> Option<Vec<Point>> {
        let jitter = self.jitter;
        self.trace().map(|pts| pts.into_iter().map(|p| p + jitter).collect())
    }

    pub fn bounds(&self) -> Option<Box2D> {
        let points: Vec<Point> = self.traces().into_iter().flatten().collect();
        if points.is_empty() {
            None
        } else {
            Some(Box2D::from_points(&points))
        }
    }

    /// Same block, drawn with `pen`. Existing selections are rewritten, a
    /// block without one gets it prepended.
    pub fn with_pen(&self, pen: i32) -> Block {
        let selection = Statement::new(Command::SelectPen, Args::Pen(pen));
        let mut statements: Vec<Statement> = self
            .statements
            .iter()
            .map(|s| if s.is(&Command::SelectPen) { selection.clone() } else { s.clone() })
            .collect();

        if !self.has_pen_selection() {
            statements.insert(0, selection);
        }

        Block {
            statements,
            jitter: self.jitter,
        }
    }

    pub fn label(&self, terminator: char) -> Option<Label> {
        let body = self.statements.iter().rev().find(|s| s.is(&Command::Label))?;
        let text = body.tail().strip_suffix(terminator).unwrap_or(body.tail());

        let origin = self
            .statements
            .iter()
            .filter(|s| s.is(&Command::PlotAbsolute) || s.is(&Command::PenUp))
            .filter_map(|s| s.coords().last())
            .last()
            .cloned()
            .unwrap_or(point(0.0, 0.0));

        let last_pair = |command: Command| {
            self.statements
                .iter()
                .rev()
                .find(|s| s.is(&command))
                .and_then(|s| s.coords().first())
                .map(|p| p.to_vector())
        };

        Some(Label {
            text: text.to_string(),
            origin,
            direction: last_pair(Command::Direction).unwrap_or(vector(1.0, 0.0)),
            size: last_pair(Command::CharSize).unwrap_or(vector(DEFAULT_CHAR_SIZE.0, DEFAULT_CHAR_SIZE.1)),
        })
    }
}

impl<'a> IntoIterator for &'a Block {
    type Item = &'a Statement;
    type IntoIter = std::slice::Iter<'a, Statement>;

    fn into_iter(self) -> Self::IntoIter {
        self.statements.iter()
    }
}

/// A whole plot: its blocks in order plus the setup statements (`IP`, `SC`)
/// that were last seen anywhere in the stream.
#[derive(Clone, Debug)]
pub struct Plot {
    blocks: Vec<Block>,
    input_window: Option<Statement>,
    scale: Option<Statement>,
    terminator: char,
    page_eject: bool,
}

impl Plot {
    pub fn new() -> Self {
        Plot {
            blocks: Vec::new(),
            input_window: None,
            scale: None,
            terminator: DEFAULT_TERMINATOR,
            page_eject: false,
        }
    }

    pub fn push_block(&mut self) {
        self.blocks.push(Block::new());
    }

    /// Appends to the last block, tracking setup and terminator state.
    pub fn push_statement(&mut self, statement: Statement) {
        match statement.command() {
            Command::InputWindow => self.input_window = Some(statement.clone()),
            Command::Scale => self.scale = Some(statement.clone()),
            Command::DefineTerminator => {
                self.terminator = statement.tail().chars().next().unwrap_or(DEFAULT_TERMINATOR)
            }
            _ => {}
        }

        if self.blocks.is_empty() {
            self.push_block();
        }
        if let Some(block) = self.blocks.last_mut() {
            block.push_back(statement);
        }
    }

    pub fn pop_block(&mut self) -> Option<Block> {
        self.blocks.pop()
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// All statements in stream order.
    pub fn linear(&self) -> impl Iterator<Item = &Statement> {
        self.blocks.iter().flat_map(|b| b.iter())
    }

    pub fn input_window(&self) -> Option<&Statement> {
        self.input_window.as_ref()
    }

    pub fn scale(&self) -> Option<&Statement> {
        self.scale.as_ref()
    }

    pub fn terminator(&self) -> char {
        self.terminator
    }

    pub fn ends_with_page_eject(&self) -> bool {
        self.page_eject
    }

    pub fn set_page_eject(&mut self, page_eject: bool) {
        self.page_eject = page_eject;
    }

    pub fn initialization_index(&self) -> Option<usize> {
        self.blocks.iter().position(Block::is_initialization)
    }

    /// Pen in effect for every block. Pen selection is modal, so a block
    /// without its own `SP` draws with whatever was selected before it.
    pub fn effective_pens(&self) -> Vec<Option<i32>> {
        let mut current = None;
        self.blocks
            .iter()
            .map(|b| {
                if let Some(pen) = b.pen() {
                    current = Some(pen);
                }
                current
            })
            .collect()
    }

    /// Gives every drawing or text block an explicit pen selection so it
    /// stays correct once blocks are reordered. Returns how many were rewritten.
    pub fn assign_pens(&mut self) -> usize {
        let pens = self.effective_pens();
        let mut rewritten = 0;

        for (block, pen) in self.blocks.iter_mut().zip(pens) {
            if block.has_pen_selection() || !(block.is_text() || block.trace().is_some()) {
                continue;
            }
            if let Some(pen) = pen {
                *block = block.with_pen(pen);
                rewritten += 1;
            }
        }

        debug!("assigned inherited pens to {} blocks", rewritten);
        rewritten
    }

    pub fn bounds(&self) -> Option<Box2D> {
        self.blocks
            .iter()
            .filter_map(Block::bounds)
            .fold(None, |acc: Option<Box2D>, b| Some(acc.map_or(b, |a| a.union(&b))))
    }

    /// Removes the blocks `pred` selects, keeping the order of the rest.
    pub fn extract_blocks<F>(&mut self, mut pred: F) -> Vec<Block>
    where
        F: FnMut(usize, &Block) -> bool,
    {
        let mut taken = Vec::new();
        let mut kept = Vec::new();

        for (idx, block) in mem::replace(&mut self.blocks, Vec::new()).into_iter().enumerate() {
            if pred(idx, &block) {
                taken.push(block);
            } else {
                kept.push(block);
            }
        }

        self.blocks = kept;
        taken
    }

    pub fn take_blocks(&mut self) -> Vec<Block> {
        mem::replace(&mut self.blocks, Vec::new())
    }

    pub fn set_blocks(&mut self, blocks: Vec<Block>) {
        self.blocks = blocks;
    }

    pub fn append_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Replaces the effective (last) `IP` or `SC` statement in the stream.
    /// If no block carries one anymore it goes into the initialization block,
    /// right after `IN`.
    pub fn replace_setup(&mut self, statement: Statement) {
        let command = statement.command().clone();
        match command {
            Command::InputWindow => self.input_window = Some(statement.clone()),
            Command::Scale => self.scale = Some(statement.clone()),
            _ => {
                warn!("{} is not a setup statement, not replacing anything", command);
                return;
            }
        }

        for block in self.blocks.iter_mut().rev() {
            if let Some(slot) = block.statements.iter_mut().rev().find(|s| s.is(&command)) {
                *slot = statement;
                return;
            }
        }

        let target = self.initialization_index().unwrap_or(0);
        if self.blocks.is_empty() {
            self.push_block();
        }
        let block = &mut self.blocks[target];
        let at = block
            .statements
            .iter()
            .rposition(|s| s.is(&Command::Initialize) || s.is(&Command::InputWindow) || s.is(&Command::Scale))
            .map_or(0, |i| i + 1);
        block.statements.insert(at, statement);
    }

    /// Makes sure the stream still ends up with the tracked `IP` and `SC`
    /// after blocks have been dropped or reordered. Returns how many had to
    /// be written back.
    pub fn restore_setup(&mut self) -> usize {
        let tracked: Vec<Statement> = self.input_window.iter().chain(self.scale.iter()).cloned().collect();
        let mut restored = 0;

        for statement in tracked {
            let effective = self.linear().filter(|s| s.is(statement.command())).last();
            if effective != Some(&statement) {
                debug!("writing back {}", statement);
                self.replace_setup(statement);
                restored += 1;
            }
        }

        restored
    }

    /// Replaces every text block with one label-pen block per stroke the
    /// renderer produces. Returns the number of labels expanded.
    pub fn expand_labels<R: LabelRenderer + ?Sized>(&mut self, renderer: &R) -> usize {
        let terminator = self.terminator;
        let mut expanded = 0;

        for block in self.take_blocks() {
            match block.label(terminator) {
                Some(label) => {
                    let strokes = renderer.render(&label);
                    debug!("label {:?} at {:?} -> {} strokes", label.text, label.origin, strokes.len());
                    self.blocks.extend(
                        strokes
                            .iter()
                            .filter(|stroke| stroke.len() >= 2)
                            .map(|stroke| BlockBuilder::polyline(PEN_LABEL, stroke)),
                    );
                    expanded += 1;
                }
                None => self.blocks.push(block),
            }
        }

        expanded
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for statement in self.linear() {
            writeln!(writer, "{}", statement)?;
        }
        if self.page_eject {
            writeln!(writer, "{}", Statement::bare(Command::PageEject))?;
        }
        Ok(())
    }

    pub fn to_hpgl(&self) -> String {
        let mut out = Vec::new();
        // writing into a Vec cannot fail
        let _ = self.write_to(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }

    pub fn preview<P: Previewer>(&self, previewer: &P) -> Result<P::Image, P::Error> {
        previewer.render(&self.to_hpgl())
    }
}

impl<'a> IntoIterator for &'a Plot {
    type Item = &'a Block;
    type IntoIter = std::slice::Iter<'a, Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

/// Something that turns a serialized plot into a picture. We only ever hand
/// it text and never look at what comes back.
pub trait Previewer {
    type Image;
    type Error;

    fn render(&self, hpgl: &str) -> Result<Self::Image, Self::Error>;
}
