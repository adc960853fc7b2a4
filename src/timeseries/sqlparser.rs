//! SQL comment scanning for query directives
//!
//! Range queries can tune caching from inside the query text itself, using
//! ordinary SQL comments so the upstream ignores them:
//!
//! ```text
//! SELECT avg(cpu) FROM hosts -- deltacache-backfill-tolerance:5m
//! /* deltacache-fast-forward:off */ SELECT count() FROM events
//! ```
//!
//! Only comments are inspected. Comment markers inside single-quoted string
//! literals are not comments. The same tokenizer yields the normalized
//! statement the cache is keyed on, so directives never split a series.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_till1, take_until},
    character::complete::{anychar, char},
    combinator::{map, rest, value},
    sequence::{preceded, terminated},
    IResult,
};

use crate::timeseries::error::TimeseriesResult;
use crate::timeseries::request::{RequestOptions, TimeRangeQuery};

#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    Comment(&'a str),
    Literal,
    Other,
}

/// Return the trimmed bodies of every `-- line` and `/* block */` comment
pub fn extract_comments(sql: &str) -> Vec<&str> {
    let mut comments = Vec::new();
    let mut input = sql;

    while !input.is_empty() {
        match token(input) {
            Ok((remaining, Token::Comment(body))) => {
                comments.push(body.trim());
                input = remaining;
            }
            Ok((remaining, _)) => input = remaining,
            Err(_) => break,
        }
    }

    comments
}

/// `sql` without comments, with whitespace runs outside string literals
/// collapsed to one space and the ends trimmed
pub fn normalize_statement(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut input = sql;
    let mut gap = false;

    while !input.is_empty() {
        let Ok((remaining, tok)) = token(input) else {
            push_word(&mut out, &mut gap, input);
            break;
        };
        let consumed = &input[..input.len() - remaining.len()];
        match tok {
            Token::Comment(_) => gap = true,
            Token::Literal => push_word(&mut out, &mut gap, consumed),
            Token::Other => {
                for c in consumed.chars() {
                    if c.is_whitespace() {
                        gap = true;
                    } else {
                        push_word(&mut out, &mut gap, c.encode_utf8(&mut [0; 4]));
                    }
                }
            }
        }
        input = remaining;
    }

    out
}

fn push_word(out: &mut String, gap: &mut bool, word: &str) {
    if *gap && !out.is_empty() {
        out.push(' ');
    }
    *gap = false;
    out.push_str(word);
}

/// Run every directive extractor over every comment in `sql`
pub fn apply_directives(
    sql: &str,
    trq: &mut TimeRangeQuery,
    ro: &mut RequestOptions,
) -> TimeseriesResult<()> {
    for comment in extract_comments(sql) {
        trq.extract_backfill_tolerance(comment)?;
        ro.extract_fast_forward_disabled(comment);
    }
    Ok(())
}

fn token(input: &str) -> IResult<&str, Token<'_>> {
    alt((
        map(line_comment, Token::Comment),
        map(block_comment, Token::Comment),
        value(Token::Literal, quoted_string),
        value(Token::Other, plain_text),
    ))(input)
}

/// `-- body` up to the end of the line
fn line_comment(input: &str) -> IResult<&str, &str> {
    preceded(tag("--"), take_till(|c| c == '\n'))(input)
}

/// `/* body */`; an unterminated block runs to the end of input
fn block_comment(input: &str) -> IResult<&str, &str> {
    preceded(
        tag("/*"),
        alt((terminated(take_until("*/"), tag("*/")), rest)),
    )(input)
}

/// `'...'`; a doubled quote lexes as two adjacent strings
fn quoted_string(input: &str) -> IResult<&str, &str> {
    preceded(
        char('\''),
        alt((terminated(take_till(|c| c == '\''), char('\'')), rest)),
    )(input)
}

/// Anything that cannot start a comment or a string, or a lone marker char
fn plain_text(input: &str) -> IResult<&str, ()> {
    alt((
        value((), take_till1(|c| c == '-' || c == '/' || c == '\'')),
        value((), anychar),
    ))(input)
}
