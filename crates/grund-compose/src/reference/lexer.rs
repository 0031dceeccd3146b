//! Scanning of `${namespace.path}` placeholders using `nom`.
//!
//! A template is split into literal runs and placeholders in one pass. A `${`
//! that does not open a well-formed placeholder is an error rather than
//! literal text.

use std::fmt;

use grund_common::error::{GrundError, Result};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::char,
    combinator::{rest, verify},
    multi::separated_list1,
    sequence::delimited,
};

/// A placeholder path such as `postgres.host` or `sqs.orders.url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Path segments; the first one is the namespace.
    pub path: Vec<String>,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path.join("."))
    }
}

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Text copied verbatim.
    Literal(&'a str),
    /// A placeholder to substitute.
    Reference(Reference),
}

const fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn path_segment(input: &str) -> IResult<&str, &str> {
    take_while1(is_segment_char)(input)
}

/// Parses `${a.b.c}`.
fn placeholder(input: &str) -> IResult<&str, Reference> {
    let (input, path) = delimited(
        tag("${"),
        separated_list1(char('.'), path_segment),
        char('}'),
    )
    .parse(input)?;
    let path = path.into_iter().map(str::to_owned).collect();
    Ok((input, Reference { path }))
}

/// Parses a non-empty run of text up to the next `${` or the end of input.
fn literal(input: &str) -> IResult<&str, &str> {
    verify(alt((take_until("${"), rest)), |s: &str| !s.is_empty()).parse(input)
}

/// Splits a template into literal text and placeholders.
///
/// `key` is only used to name the variable in errors.
///
/// # Errors
///
/// Returns [`GrundError::MalformedReference`] if a `${` is not followed by a
/// dotted path and a closing `}`.
pub fn parse_template<'a>(key: &str, input: &'a str) -> Result<Vec<Segment<'a>>> {
    let mut segments = Vec::new();
    let mut remaining = input;

    while !remaining.is_empty() {
        if let Ok((rest, text)) = literal(remaining) {
            segments.push(Segment::Literal(text));
            remaining = rest;
            continue;
        }

        let (rest, reference) =
            placeholder(remaining).map_err(|_| GrundError::MalformedReference {
                key: key.to_owned(),
                value: input.to_owned(),
                offset: input.len() - remaining.len(),
            })?;
        segments.push(Segment::Reference(reference));
        remaining = rest;
    }

    Ok(segments)
}
