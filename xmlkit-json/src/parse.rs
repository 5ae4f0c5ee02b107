//! Tolerant JSON reading.
//!
//! One parser covers strict JSON, JSONC (comments, trailing commas) and
//! JSON5 (unquoted keys, single quotes, extended numbers). Leaf tokens
//! are nom combinators; the value grammar is recursive descent that
//! threads a feature record through, so the caller learns which dialect
//! the text actually used.

use crate::JsonError;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::char as nom_char;
use nom::combinator::{opt, recognize};
use nom::number::complete::double;
use nom::sequence::pair;
use nom::IResult;
use serde_json::{Map, Number, Value};

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum DetectedFormat {
    Json,
    Jsonc,
    Json5,
}

impl std::fmt::Display for DetectedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DetectedFormat::Json => "json",
            DetectedFormat::Jsonc => "jsonc",
            DetectedFormat::Json5 => "json5",
        })
    }
}

#[derive(Debug)]
pub struct Parsed {
    pub value: Value,
    pub detected_format: DetectedFormat,
}

#[derive(Default)]
struct Features {
    comments: bool,
    trailing_commas: bool,
    json5: bool,
}

impl Features {
    fn detected(&self) -> DetectedFormat {
        if self.json5 {
            DetectedFormat::Json5
        } else if self.comments || self.trailing_commas {
            DetectedFormat::Jsonc
        } else {
            DetectedFormat::Json
        }
    }
}

/// Parse text in any of the tolerated dialects.
pub fn parse(text: &str) -> Result<Parsed, JsonError> {
    let mut features = Features::default();
    let rest = skip_trivia(text, &mut features);
    let (rest, value) = value(rest, &mut features).map_err(|e| error_at(text, &e))?;
    let rest = skip_trivia(rest, &mut features);
    if !rest.is_empty() {
        return Err(position_error(text, rest, "trailing characters after value"));
    }
    let detected_format = features.detected();
    log::debug!("detected JSON dialect: {detected_format}");
    Ok(Parsed {
        value,
        detected_format,
    })
}

fn error_at(full: &str, err: &nom::Err<nom::error::Error<&str>>) -> JsonError {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            position_error(full, e.input, "unexpected token")
        }
        nom::Err::Incomplete(_) => JsonError::Parse {
            line: 1,
            column: 1,
            message: "unexpected end of input".to_string(),
        },
    }
}

fn position_error(full: &str, rest: &str, message: &str) -> JsonError {
    let consumed = full.len() - rest.len();
    let prefix = &full[..consumed];
    let line = prefix.bytes().filter(|&b| b == b'\n').count() as u32 + 1;
    let column = prefix
        .rsplit_once('\n')
        .map(|(_, tail)| tail.chars().count())
        .unwrap_or_else(|| prefix.chars().count()) as u32
        + 1;
    JsonError::Parse {
        line,
        column,
        message: message.to_string(),
    }
}

/// Whitespace and comments.
fn skip_trivia<'a>(mut input: &'a str, features: &mut Features) -> &'a str {
    loop {
        let trimmed = input.trim_start();
        if let Some(rest) = trimmed.strip_prefix("//") {
            features.comments = true;
            input = rest.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
        } else if let Some(rest) = trimmed.strip_prefix("/*") {
            features.comments = true;
            input = rest.split_once("*/").map(|(_, tail)| tail).unwrap_or("");
        } else {
            return trimmed;
        }
    }
}

fn value<'a>(input: &'a str, features: &mut Features) -> IResult<&'a str, Value> {
    if let Ok((rest, _)) = tag::<_, _, nom::error::Error<&str>>("true")(input) {
        return Ok((rest, Value::Bool(true)));
    }
    if let Ok((rest, _)) = tag::<_, _, nom::error::Error<&str>>("false")(input) {
        return Ok((rest, Value::Bool(false)));
    }
    if let Ok((rest, _)) = tag::<_, _, nom::error::Error<&str>>("null")(input) {
        return Ok((rest, Value::Null));
    }
    match input.chars().next() {
        Some('{') => object(input, features),
        Some('[') => array(input, features),
        Some('"') => {
            let (rest, s) = string(input, '"')?;
            Ok((rest, Value::String(s)))
        }
        Some('\'') => {
            features.json5 = true;
            let (rest, s) = string(input, '\'')?;
            Ok((rest, Value::String(s)))
        }
        _ => number(input, features),
    }
}

fn object<'a>(input: &'a str, features: &mut Features) -> IResult<&'a str, Value> {
    let (mut input, _) = nom_char('{')(input)?;
    let mut map = Map::new();
    loop {
        input = skip_trivia(input, features);
        if let Some(rest) = input.strip_prefix('}') {
            return Ok((rest, Value::Object(map)));
        }
        let (rest, key) = member_key(input, features)?;
        let rest = skip_trivia(rest, features);
        let (rest, _) = nom_char(':')(rest)?;
        let rest = skip_trivia(rest, features);
        let (rest, val) = value(rest, features)?;
        map.insert(key, val);
        let rest = skip_trivia(rest, features);
        if let Some(after) = rest.strip_prefix(',') {
            input = skip_trivia(after, features);
            if input.starts_with('}') {
                features.trailing_commas = true;
            }
        } else {
            let (rest, _) = nom_char('}')(rest)?;
            return Ok((rest, Value::Object(map)));
        }
    }
}

fn member_key<'a>(input: &'a str, features: &mut Features) -> IResult<&'a str, String> {
    match input.chars().next() {
        Some('"') => string(input, '"'),
        Some('\'') => {
            features.json5 = true;
            string(input, '\'')
        }
        _ => {
            // Unquoted ECMAScript identifier key.
            let (rest, ident) = recognize(pair(
                take_while1(|c: char| c.is_alphabetic() || c == '_' || c == '$'),
                take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '$'),
            ))(input)?;
            features.json5 = true;
            Ok((rest, ident.to_string()))
        }
    }
}

fn string(input: &str, quote: char) -> IResult<&str, String> {
    let (mut rest, _) = nom_char(quote)(input)?;
    let mut out = String::new();
    let mut chars = rest.char_indices();
    loop {
        let Some((i, c)) = chars.next() else {
            return Err(nom::Err::Failure(nom::error::Error::new(
                rest,
                nom::error::ErrorKind::Char,
            )));
        };
        match c {
            c if c == quote => {
                rest = &rest[i + c.len_utf8()..];
                return Ok((rest, out));
            }
            '\\' => {
                let Some((_, esc)) = chars.next() else {
                    return Err(nom::Err::Failure(nom::error::Error::new(
                        rest,
                        nom::error::ErrorKind::Escaped,
                    )));
                };
                match esc {
                    '"' => out.push('"'),
                    '\'' => out.push('\''),
                    '\\' => out.push('\\'),
                    '/' => out.push('/'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    // JSON5 line continuation.
                    '\n' => {}
                    'u' => {
                        let mut code = 0u32;
                        for _ in 0..4 {
                            let Some((_, h)) = chars.next() else {
                                return Err(nom::Err::Failure(nom::error::Error::new(
                                    rest,
                                    nom::error::ErrorKind::HexDigit,
                                )));
                            };
                            let digit = h.to_digit(16).ok_or_else(|| {
                                nom::Err::Failure(nom::error::Error::new(
                                    rest,
                                    nom::error::ErrorKind::HexDigit,
                                ))
                            })?;
                            code = code * 16 + digit;
                        }
                        out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                    }
                    other => out.push(other),
                }
            }
            c => out.push(c),
        }
    }
}

fn number<'a>(input: &'a str, features: &mut Features) -> IResult<&'a str, Value> {
    // JSON5 extensions first: explicit plus, hex, Infinity, NaN.
    if let Ok((rest, _)) = tag::<_, _, nom::error::Error<&str>>("Infinity")(input) {
        features.json5 = true;
        return Ok((rest, float_value(f64::INFINITY)));
    }
    if let Ok((rest, _)) = tag::<_, _, nom::error::Error<&str>>("-Infinity")(input) {
        features.json5 = true;
        return Ok((rest, float_value(f64::NEG_INFINITY)));
    }
    if let Ok((rest, _)) = tag::<_, _, nom::error::Error<&str>>("NaN")(input) {
        features.json5 = true;
        return Ok((rest, Value::Null));
    }
    if let Ok((rest, (sign, _))) = pair(
        opt(alt((nom_char::<_, nom::error::Error<&str>>('+'), nom_char('-')))),
        alt((tag("0x"), tag("0X"))),
    )(input)
    {
        let (rest, digits) = take_while1(|c: char| c.is_ascii_hexdigit())(rest)?;
        features.json5 = true;
        let magnitude = i64::from_str_radix(digits, 16).unwrap_or(0);
        let signed = if sign == Some('-') { -magnitude } else { magnitude };
        return Ok((rest, Value::Number(Number::from(signed))));
    }
    if input.starts_with('+') {
        features.json5 = true;
        let (rest, v) = number(&input[1..], features)?;
        return Ok((rest, v));
    }

    // Strict JSON number: prefer integer representation when exact.
    let (rest, literal) = recognize(double)(input)?;
    if !literal.contains(['.', 'e', 'E']) {
        if let Ok(int) = literal.parse::<i64>() {
            return Ok((rest, Value::Number(Number::from(int))));
        }
        if let Ok(int) = literal.parse::<u64>() {
            return Ok((rest, Value::Number(Number::from(int))));
        }
    } else if literal.starts_with('.') || literal.ends_with('.') {
        features.json5 = true;
    }
    let parsed: f64 = literal.parse().map_err(|_| {
        nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Float))
    })?;
    Ok((rest, float_value(parsed)))
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn array<'a>(input: &'a str, features: &mut Features) -> IResult<&'a str, Value> {
    let (mut input, _) = nom_char('[')(input)?;
    let mut items = Vec::new();
    loop {
        input = skip_trivia(input, features);
        if let Some(rest) = input.strip_prefix(']') {
            return Ok((rest, Value::Array(items)));
        }
        let (rest, val) = value(input, features)?;
        items.push(val);
        let rest = skip_trivia(rest, features);
        if let Some(after) = rest.strip_prefix(',') {
            input = skip_trivia(after, features);
            if input.starts_with(']') {
                features.trailing_commas = true;
            }
        } else {
            let (rest, _) = nom_char(']')(rest)?;
            return Ok((rest, Value::Array(items)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_is_detected_as_json() {
        let parsed = parse(r#"{"a": 1, "b": [2, 3], "c": "x"}"#).unwrap();
        assert_eq!(parsed.detected_format, DetectedFormat::Json);
        assert_eq!(parsed.value["b"][1], serde_json::json!(3));
    }

    #[test]
    fn comments_make_it_jsonc() {
        let parsed = parse(
            r#"{
  // line comment
  "a": 1, /* block */ "b": 2
}"#,
        )
        .unwrap();
        assert_eq!(parsed.detected_format, DetectedFormat::Jsonc);
        assert_eq!(parsed.value["b"], serde_json::json!(2));
    }

    #[test]
    fn trailing_commas_stay_jsonc() {
        let parsed = parse("[1, 2, 3,]").unwrap();
        assert_eq!(parsed.detected_format, DetectedFormat::Jsonc);
        assert_eq!(parsed.value, serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn json5_constructs_are_detected() {
        let parsed = parse("{unquoted: 'single', hex: 0x1F, plus: +4}").unwrap();
        assert_eq!(parsed.detected_format, DetectedFormat::Json5);
        assert_eq!(parsed.value["unquoted"], serde_json::json!("single"));
        assert_eq!(parsed.value["hex"], serde_json::json!(31));
        assert_eq!(parsed.value["plus"], serde_json::json!(4));
    }

    #[test]
    fn key_order_is_preserved() {
        let parsed = parse(r#"{"z": 1, "a": 2, "m": 3}"#).unwrap();
        let keys: Vec<&String> = parsed.value.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn parse_errors_carry_position() {
        let err = parse("{\n  \"a\": }").unwrap_err();
        match err {
            JsonError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn escapes_are_decoded() {
        let parsed = parse(r#""a\nbA""#).unwrap();
        assert_eq!(parsed.value, serde_json::json!("a\nbA"));
    }
}
