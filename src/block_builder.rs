use lyon::math::Point;

use crate::plot::Block;
use crate::statement::{Args, Command, Statement};

/// Assembles a fresh block one statement at a time.
///
/// Every block we synthesize (stitched cuts, label strokes) goes through
/// here, so they all share the same layout: `SP`, `PU` to the start, `PD`
/// through the rest, bare `PU`.
#[derive(Clone, Debug)]
pub struct BlockBuilder {
    statements: Vec<Statement>,
}

pub trait IntoStatement {
    fn into_statement(self) -> Statement;
}

impl IntoStatement for Statement {
    fn into_statement(self) -> Statement {
        self
    }
}

impl IntoStatement for Command {
    fn into_statement(self) -> Statement {
        Statement::bare(self)
    }
}

impl IntoStatement for (Command, Args) {
    fn into_statement(self) -> Statement {
        Statement::new(self.0, self.1)
    }
}

impl BlockBuilder {
    pub fn new(pen: i32) -> Self {
        BlockBuilder {
            statements: vec![(Command::SelectPen, Args::Pen(pen)).into_statement()],
        }
    }

    pub fn push<S: IntoStatement>(&mut self, statement: S) {
        self.statements.push(statement.into_statement());
    }

    pub fn move_to(&mut self, to: Point) {
        self.push((Command::PenUp, Args::Coords(vec![to])));
    }

    pub fn draw_through(&mut self, points: &[Point]) {
        if points.is_empty() {
            return;
        }
        self.push((Command::PenDown, Args::Coords(points.to_vec())));
    }

    pub fn lift(&mut self) {
        self.push(Command::PenUp);
    }

    pub fn add_polyline(&mut self, points: &[Point]) {
        if let Some((first, rest)) = points.split_first() {
            self.move_to(*first);
            self.draw_through(rest);
            self.lift();
        }
    }

    pub fn build(self) -> Block {
        Block::from_statements(self.statements)
    }

    /// Shorthand for a block that draws a single polyline with `pen`.
    pub fn polyline(pen: i32, points: &[Point]) -> Block {
        let mut builder = BlockBuilder::new(pen);
        builder.add_polyline(points);
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyon::math::point;

    #[test]
    fn polyline_block_layout() {
        let block = BlockBuilder::polyline(3, &[point(0.0, 0.0), point(1.0, 1.0), point(2.5, 0.0)]);
        let text: Vec<String> = block.iter().map(Statement::to_text).collect();
        assert_eq!(text, vec!["SP3;", "PU0,0;", "PD1,1,2.5,0;", "PU;"]);
        assert_eq!(block.pen(), Some(3));
        assert_eq!(block.trace().unwrap().len(), 3);
    }

    #[test]
    fn empty_polyline_only_selects_pen() {
        let block = BlockBuilder::polyline(2, &[]);
        assert_eq!(block.len(), 1);
        assert!(block.trace().is_none());
    }

    #[test]
    fn push_accepts_anything_statement_like() {
        let mut builder = BlockBuilder::new(1);
        builder.push(Command::Initialize);
        builder.push(Statement::parse("VS5").unwrap());
        let block = builder.build();
        assert_eq!(block.statements()[1].to_text(), "IN;");
        assert_eq!(block.statements()[2].to_text(), "VS5;");
    }
}
