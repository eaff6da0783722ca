/*! Read programs written in the textual CFG format.
 *
 * Front ends that already lowered C into basic blocks can hand the analyzer a `.tfir` file
 * instead of linking against the builder API. Parsing is two steps: pest turns the text into a
 * parse tree, then [`lower`] walks the tree and drives the core builders, resolving variable and
 * block names along the way.
 */

#![allow(unreachable_patterns)]

use pest::Parser;
use pest_derive::Parser;
use taintflow_core::Program;
use thiserror::Error;

pub mod lower;

pub use lower::{lower_program, LowerError};

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct TfirParser;

pub type ParseResult<T> = Result<T, Box<pest::error::Error<Rule>>>;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("syntax error\n{0}")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),
    #[error(transparent)]
    Lower(#[from] LowerError),
}

pub fn parse(input: &str) -> ParseResult<pest::iterators::Pairs<'_, Rule>> {
    TfirParser::parse(Rule::program, input).map_err(Box::new)
}

pub fn check(input: &str) -> bool {
    parse(input).is_ok()
}

/// Parses `input` and builds the program it describes.
pub fn parse_program(input: &str) -> Result<Program, ParseError> {
    let mut pairs = parse(input)?;
    let Some(program) = pairs.next() else {
        return Ok(Program::new());
    };
    Ok(lower_program(program)?)
}
