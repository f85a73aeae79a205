use std::fmt;

use lyon::math::{point, Point};

use crate::error::FormatError;

/// The two-letter instruction codes we understand. Anything else is kept as
/// an opaque `Other` statement and simply passed through.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    PenUp,
    PenDown,
    PlotAbsolute,
    SelectPen,
    InputWindow,
    Scale,
    Label,
    DefineTerminator,
    Direction,
    CharSize,
    Initialize,
    PageEject,
    Other(String),
}

impl Command {
    pub fn from_code(code: &str) -> Self {
        match code.to_ascii_uppercase().as_str() {
            "PU" => Command::PenUp,
            "PD" => Command::PenDown,
            "PA" => Command::PlotAbsolute,
            "SP" => Command::SelectPen,
            "IP" => Command::InputWindow,
            "SC" => Command::Scale,
            "LB" => Command::Label,
            "DT" => Command::DefineTerminator,
            "DI" => Command::Direction,
            "SI" => Command::CharSize,
            "IN" => Command::Initialize,
            "PG" => Command::PageEject,
            _ => Command::Other(code.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Command::PenUp => "PU",
            Command::PenDown => "PD",
            Command::PlotAbsolute => "PA",
            Command::SelectPen => "SP",
            Command::InputWindow => "IP",
            Command::Scale => "SC",
            Command::Label => "LB",
            Command::DefineTerminator => "DT",
            Command::Direction => "DI",
            Command::CharSize => "SI",
            Command::Initialize => "IN",
            Command::PageEject => "PG",
            Command::Other(code) => code,
        }
    }

    /// Commands whose tail is a list of x,y pairs.
    pub fn takes_coords(&self) -> bool {
        match self {
            Command::PenUp
            | Command::PenDown
            | Command::PlotAbsolute
            | Command::InputWindow
            | Command::Direction
            | Command::CharSize => true,
            _ => false,
        }
    }

    /// Commands that only make sense as part of a text label.
    pub fn is_label_part(&self) -> bool {
        match self {
            Command::Label | Command::DefineTerminator | Command::Direction | Command::CharSize => true,
            _ => false,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Parsed form of a statement's argument tail.
#[derive(Clone, Debug, PartialEq)]
pub enum Args {
    None,
    Coords(Vec<Point>),
    Pen(i32),
    Numbers(Vec<f32>),
    Raw(String),
}

impl Args {
    fn to_tail(&self) -> String {
        match self {
            Args::None => String::new(),
            Args::Coords(pts) => pts
                .iter()
                .map(|p| format!("{},{}", format_number(p.x), format_number(p.y)))
                .collect::<Vec<_>>()
                .join(","),
            Args::Pen(pen) => pen.to_string(),
            Args::Numbers(nums) => nums.iter().map(|n| format_number(*n)).collect::<Vec<_>>().join(","),
            Args::Raw(raw) => raw.clone(),
        }
    }
}

/// Formats a regenerated argument: shortest decimal that reads back to the
/// same `f32`, no fraction for integral values, never `-0`.
pub fn format_number(value: f32) -> String {
    // adding 0.0 turns -0.0 into 0.0
    format!("{}", value + 0.0)
}

fn parse_number(command: &Command, item: &str) -> Result<f32, FormatError> {
    let value: f32 = item
        .trim()
        .parse()
        .map_err(|_| FormatError::new(command.code(), format!("'{}' is not a number", item)))?;

    if !value.is_finite() {
        return Err(FormatError::new(command.code(), format!("'{}' is not a finite number", item)));
    }
    Ok(value)
}

fn parse_args(command: &Command, tail: &str) -> Result<Args, FormatError> {
    if tail.is_empty() {
        return Ok(Args::None);
    }

    if command.takes_coords() {
        let values = tail
            .split(',')
            .map(|item| parse_number(command, item))
            .collect::<Result<Vec<f32>, FormatError>>()?;

        if values.len() % 2 != 0 {
            return Err(FormatError::new(
                command.code(),
                format!("expected x,y pairs but got {} values", values.len()),
            ));
        }

        return Ok(Args::Coords(values.chunks(2).map(|xy| point(xy[0], xy[1])).collect()));
    }

    match command {
        Command::SelectPen => tail
            .trim()
            .parse()
            .map(Args::Pen)
            .map_err(|_| FormatError::new(command.code(), format!("'{}' is not a pen number", tail))),
        Command::Scale => tail
            .split(',')
            .map(|item| parse_number(command, item))
            .collect::<Result<Vec<f32>, FormatError>>()
            .map(Args::Numbers),
        _ => Ok(Args::Raw(tail.to_string())),
    }
}

/// One plotter instruction.
///
/// The textual tail and the parsed arguments always agree: the only way to
/// change the arguments is `with_args`/`set_args`, which regenerate the tail.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    command: Command,
    tail: String,
    args: Args,
}

impl Statement {
    /// Parses one instruction without its trailing `;`, e.g. `PD10,20,30,40`.
    pub fn parse(text: &str) -> Result<Self, FormatError> {
        let split = text.char_indices().nth(2).map(|(i, _)| i).unwrap_or(text.len());
        let (code, tail) = text.split_at(split);
        Statement::from_parts(Command::from_code(code), tail)
    }

    pub fn from_parts(command: Command, tail: &str) -> Result<Self, FormatError> {
        let args = parse_args(&command, tail)?;
        Ok(Statement {
            command,
            tail: tail.to_string(),
            args,
        })
    }

    pub fn new(command: Command, args: Args) -> Self {
        let tail = args.to_tail();
        // an empty tail always reads back as Args::None
        let args = if tail.is_empty() { Args::None } else { args };
        Statement { command, tail, args }
    }

    pub fn with_args(&self, args: Args) -> Self {
        Statement::new(self.command.clone(), args)
    }

    /// Replaces the arguments in place; the tail is regenerated with them.
    pub fn set_args(&mut self, args: Args) {
        *self = self.with_args(args);
    }

    pub fn bare(command: Command) -> Self {
        Statement::new(command, Args::None)
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn tail(&self) -> &str {
        &self.tail
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn is(&self, command: &Command) -> bool {
        self.command == *command
    }

    pub fn coords(&self) -> &[Point] {
        match self.args {
            Args::Coords(ref pts) => pts,
            _ => &[],
        }
    }

    pub fn numbers(&self) -> &[f32] {
        match self.args {
            Args::Numbers(ref nums) => nums,
            _ => &[],
        }
    }

    /// The pen this statement selects. A bare `SP` selects pen 0.
    pub fn pen(&self) -> Option<i32> {
        match (&self.command, &self.args) {
            (Command::SelectPen, Args::Pen(pen)) => Some(*pen),
            (Command::SelectPen, Args::None) => Some(0),
            _ => None,
        }
    }

    /// `PU` without coordinates: lift the pen, don't move.
    pub fn is_bare_pen_up(&self) -> bool {
        self.command == Command::PenUp && self.args == Args::None
    }

    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{};", self.command, self.tail)
    }
}
