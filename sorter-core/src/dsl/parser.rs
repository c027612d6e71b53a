//! The grammar layer: turns already-filtered DSL text into a [`Document`].
//!
//! Built with `nom`, matching the LALR-ish grammar in the design: a
//! hashtag/item/vote/attribute-decl/email alternation, tried in an order
//! that resolves the `vote`/`item` ambiguity (both start with `/ident`) by
//! attempting `vote` first.

use lazy_static::lazy_static;
use nom::branch::alt;
use nom::bytes::complete::{take_until, take_while, take_while1};
use nom::character::complete::char;
use nom::combinator::{map_res, opt, recognize};
use nom::multi::many0;
use nom::sequence::{pair, preceded};
use nom::IResult;
use regex::Regex;

use super::{Document, Statement};
use crate::error::{ParseError, Position};

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap();
}

type NomResult<'a, O> = IResult<&'a str, O>;

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_horizontal_ws(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn is_doc_ws(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\r' || c == '\n'
}

/// `[A-Za-z0-9_]+(-[A-Za-z0-9_]+)*`
fn ident(input: &str) -> NomResult<&str> {
    recognize(pair(
        take_while1(is_ident_char),
        many0(pair(char('-'), take_while1(is_ident_char))),
    ))(input)
}

fn ws0(input: &str) -> NomResult<&str> {
    take_while(is_horizontal_ws)(input)
}

fn doc_ws0(input: &str) -> NomResult<&str> {
    take_while(is_doc_ws)(input)
}

fn number(input: &str) -> NomResult<u32> {
    map_res(take_while1(|c: char| c.is_ascii_digit()), |s: &str| {
        s.parse::<u32>()
    })(input)
}

/// `comparison := NUM ':' NUM | '>' | '<' | '='`
fn comparison(input: &str) -> NomResult<(u32, u32)> {
    alt((
        |input| {
            let (input, left) = number(input)?;
            let (input, _) = ws0(input)?;
            let (input, _) = char(':')(input)?;
            let (input, _) = ws0(input)?;
            let (input, right) = number(input)?;
            Ok((input, (left, right)))
        },
        nom::combinator::value((2, 1), char('>')),
        nom::combinator::value((1, 2), char('<')),
        nom::combinator::value((1, 1), char('=')),
    ))(input)
}

/// `body := '{{' chars_nosent '}}' | '{' chars_nobrace '}'`, trimmed.
fn body(input: &str) -> NomResult<String> {
    alt((body_double, body_single))(input)
}

fn body_double(input: &str) -> NomResult<String> {
    let (input, _) = nom::bytes::complete::tag("{{")(input)?;
    let (input, text) = take_until("}}")(input)?;
    let (input, _) = nom::bytes::complete::tag("}}")(input)?;
    Ok((input, text.trim().to_string()))
}

fn body_single(input: &str) -> NomResult<String> {
    let (input, _) = char('{')(input)?;
    let (input, text) = take_while(|c| c != '{' && c != '}')(input)?;
    let (input, _) = char('}')(input)?;
    Ok((input, text.trim().to_string()))
}

fn hashtag_stmt(input: &str) -> NomResult<Statement> {
    let (input, _) = char('#')(input)?;
    let (input, name) = ident(input)?;
    Ok((input, Statement::Hashtag(name.to_string())))
}

fn vote_stmt(input: &str) -> NomResult<Statement> {
    let (input, _) = char('/')(input)?;
    let (input, item1) = ident(input)?;
    let (input, _) = ws0(input)?;
    let (input, (ratio_left, ratio_right)) = comparison(input)?;
    let (input, _) = ws0(input)?;
    let (input, _) = char('/')(input)?;
    let (input, item2) = ident(input)?;
    let (input, explanation) = opt(preceded(ws0, body))(input)?;
    Ok((
        input,
        Statement::Vote {
            item1: item1.to_string(),
            item2: item2.to_string(),
            ratio_left,
            ratio_right,
            explanation,
        },
    ))
}

fn item_stmt(input: &str) -> NomResult<Statement> {
    let (input, _) = char('/')(input)?;
    let (input, title) = ident(input)?;
    let (input, body) = opt(preceded(ws0, body))(input)?;
    Ok((
        input,
        Statement::Item {
            title: title.to_string(),
            body,
        },
    ))
}

fn attribute(input: &str) -> NomResult<&str> {
    preceded(char(':'), ident)(input)
}

fn attr_decl_stmt(input: &str) -> NomResult<Statement> {
    let (input, first) = attribute(input)?;
    let (input, rest) = many0(preceded(ws0, attribute))(input)?;
    let mut names = vec![first.to_string()];
    names.extend(rest.into_iter().map(|s| s.to_string()));
    Ok((input, Statement::AttributeDecl(names)))
}

fn email_stmt(input: &str) -> NomResult<Statement> {
    let (input, _) = char('@')(input)?;
    match EMAIL_RE.find(input) {
        Some(m) if m.start() == 0 => Ok((
            &input[m.end()..],
            Statement::EmailLiteral(m.as_str().to_string()),
        )),
        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        ))),
    }
}

fn statement(input: &str) -> NomResult<Statement> {
    alt((
        hashtag_stmt,
        vote_stmt,
        item_stmt,
        attr_decl_stmt,
        email_stmt,
    ))(input)
}

fn document(input: &str) -> NomResult<Vec<Statement>> {
    let (input, stmts) = many0(preceded(doc_ws0, statement))(input)?;
    let (input, _) = doc_ws0(input)?;
    Ok((input, stmts))
}

/// Byte offset of `remaining` within `original`, assuming `remaining` is a
/// suffix slice produced by parsing `original` (true for every parser in
/// this module, which only ever narrows the input from the front).
fn locate(original: &str, remaining: &str) -> Position {
    let offset = remaining.as_ptr() as usize - original.as_ptr() as usize;
    let consumed = &original[..offset];
    let line = consumed.matches('\n').count() + 1;
    let col = match consumed.rfind('\n') {
        Some(idx) => offset - idx,
        None => offset + 1,
    };
    Position { line, col }
}

/// Parses already-filtered DSL text (i.e. text that has already been
/// through [`crate::dsl::mask::mask_and_filter`]) into a [`Document`].
pub fn parse(text: &str) -> Result<Document, ParseError> {
    match document(text) {
        Ok((remaining, statements)) => {
            if remaining.trim().is_empty() {
                Ok(Document { statements })
            } else {
                let snippet: String = remaining.chars().take(24).collect();
                Err(ParseError::syntax(
                    locate(text, remaining),
                    format!("unexpected input near {snippet:?}"),
                ))
            }
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ParseError::syntax(
            locate(text, e.input),
            "could not parse statement",
        )),
        Err(nom::Err::Incomplete(_)) => {
            unreachable!("complete-style combinators never return Incomplete")
        }
    }
}

/// Runs the masking/filtering pipeline first, then [`parse`].
pub fn parse_filtered(text: &str) -> Result<Document, ParseError> {
    let filtered = super::mask::mask_and_filter(text);
    parse(&filtered)
}
