//! Turns a line-oriented HPGL stream into a [`Plot`].
//!
//! Statements end with `;`, several may share a line. A bare `PU` closes the
//! current block, the next statement opens a new one. Label bodies (`LB`) run
//! up to the active terminator instead, so they may contain `;`.

use crate::error::FormatError;
use crate::plot::Plot;
use crate::statement::{Command, Statement};

/// ETX, the label terminator until a `DT` says otherwise.
pub const DEFAULT_TERMINATOR: char = '\u{3}';

fn is_label(token: &str) -> bool {
    token.len() >= 2 && token.is_char_boundary(2) && token[..2].eq_ignore_ascii_case("LB")
}

/// Splits the next statement off `rest`, returning it without its `;`.
fn next_token<'a>(rest: &'a str, terminator: char) -> (&'a str, &'a str) {
    if is_label(rest) {
        return match rest[2..].find(terminator) {
            Some(pos) => {
                let end = 2 + pos + terminator.len_utf8();
                let (token, remainder) = rest.split_at(end);
                (token, remainder.strip_prefix(';').unwrap_or(remainder))
            }
            None => {
                warn!("label without terminator {:?}: {}", terminator, rest);
                (rest.trim_end().trim_end_matches(';'), "")
            }
        };
    }

    match rest.find(';') {
        Some(pos) => (&rest[..pos], &rest[pos + 1..]),
        None => (rest, ""),
    }
}

pub fn parse_str(input: &str) -> Result<Plot, FormatError> {
    parse_lines(input.lines())
}

pub fn parse_lines<I, S>(lines: I) -> Result<Plot, FormatError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut plot = Plot::new();
    // a bare PU closes the block it ends, so the next statement needs a fresh one
    let mut closed = true;

    for (idx, line) in lines.into_iter().enumerate() {
        let line_no = idx + 1;
        let mut rest = line.as_ref().trim_end_matches(|c: char| c == '\r' || c == '\n');

        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }

            let (token, remainder) = next_token(rest, plot.terminator());
            rest = remainder;

            let token = if is_label(token) { token } else { token.trim() };
            if token.is_empty() {
                continue;
            }

            let statement = Statement::parse(token).map_err(|e| e.at_line(line_no))?;
            if let Command::Other(ref code) = *statement.command() {
                debug!("line {}: passing through unknown command {}", line_no, code);
            }

            if closed {
                plot.push_block();
            }
            closed = statement.is_bare_pen_up();
            plot.push_statement(statement);
        }
    }

    if plot.last_block().map_or(false, |b| b.is_page_eject()) {
        trace!("dropping trailing page eject block");
        plot.pop_block();
        plot.set_page_eject(true);
    }

    info!("parsed {} blocks", plot.len());
    Ok(plot)
}
