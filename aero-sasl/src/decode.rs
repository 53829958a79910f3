use base64::Engine;
use nom::{
    bytes::complete::{tag, take, take_while, take_while1},
    character::complete::{tab, u16, u64},
    combinator::{all_consuming, map, opt, rest},
    multi::many0,
    sequence::{pair, preceded, tuple},
    IResult,
};

use crate::codec::Line;
use crate::error::{Error, Result};

fn is_not_tab_or_lf(c: u8) -> bool {
    c != 0x09 && c != 0x0a // TAB or LF
}

fn command(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(is_not_tab_or_lf)(input)
}

fn parameter(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(is_not_tab_or_lf)(input)
}

fn raw_line(input: &[u8]) -> IResult<&[u8], (&[u8], Vec<&[u8]>)> {
    pair(command, many0(preceded(tab, parameter)))(input)
}

fn utf8(buf: &[u8]) -> Result<String> {
    std::str::from_utf8(buf)
        .map(|v| v.to_string())
        .map_err(|_| Error::MalformedLine("invalid UTF-8".into()))
}

/// Split one received line, with or without its trailing LF, into a command
/// and its tab-delimited parameters. Empty parameters are kept.
pub fn line(input: &[u8]) -> Result<Line> {
    let input = input.strip_suffix(b"\n").unwrap_or(input);
    let (_, (cmd, params)) = all_consuming(raw_line)(input)
        .map_err(|_| Error::MalformedLine(String::from_utf8_lossy(input).into_owned()))?;

    Ok(Line {
        command: utf8(cmd)?,
        params: params.into_iter().map(utf8).collect::<Result<_>>()?,
    })
}

/// `key=value` or a bare `flag`, the value keeps any further `=`.
pub fn key_value(param: &str) -> (&str, Option<&str>) {
    let parsed: IResult<&str, (&str, Option<&str>)> =
        pair(take_while(|c| c != '='), opt(preceded(tag("="), rest)))(param);
    match parsed {
        Ok((_, kv)) => kv,
        Err(_) => (param, None),
    }
}

pub fn number(param: &str) -> Option<u64> {
    all_consuming(u64::<&str, ()>)(param).ok().map(|(_, v)| v)
}

pub fn port(param: &str) -> Option<u16> {
    all_consuming(u16::<&str, ()>)(param).ok().map(|(_, v)| v)
}

pub fn base64(data: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(data)
}

pub fn base64_enc(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

// -----------------------------------------------------------------
//
// SASL DECODING
//
// -----------------------------------------------------------------

fn not_null(c: u8) -> bool {
    c != 0x0
}

// impersonated user, login, password
pub fn auth_plain<'a>(input: &'a [u8]) -> IResult<&'a [u8], (&'a [u8], &'a [u8], &'a [u8])> {
    map(
        tuple((
            take_while(not_null),
            take(1usize),
            take_while(not_null),
            take(1usize),
            rest,
        )),
        |(imp, _, user, _, pass)| (imp, user, pass),
    )(input)
}
