//! JSONPath querying.
//!
//! Supported syntax: `$`, dot and bracket member access, wildcard `*`,
//! array indices (negative counts from the end), slices `[start:end]`,
//! recursive descent `..`, and union lists `[a,b]` / `[0,2]`. The
//! expression is parsed to segments first and evaluated against the
//! tree second.

use crate::JsonError;
use serde_json::Value;

#[derive(PartialEq, Clone, Debug)]
enum Segment {
    /// `.name` or `['name']`
    Key(String),
    /// `[2]`, `[-1]`
    Index(i64),
    /// `[start:end]`, either bound open
    Slice(Option<i64>, Option<i64>),
    /// `.*` or `[*]`
    Wildcard,
    /// `..` — recursive descent applied to the following segment
    Descend,
    /// `['a','b']` / `[0,2]`
    Union(Vec<Segment>),
}

fn parse_error(message: impl Into<String>) -> JsonError {
    JsonError::Path {
        message: message.into(),
    }
}

fn parse(query: &str) -> Result<Vec<Segment>, JsonError> {
    let mut segments = Vec::new();
    let mut rest = query.trim();
    if let Some(after) = rest.strip_prefix('$') {
        rest = after;
    }
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("..") {
            segments.push(Segment::Descend);
            rest = after;
            continue;
        }
        if let Some(after) = rest.strip_prefix('.') {
            rest = after;
            if let Some(after) = rest.strip_prefix('*') {
                segments.push(Segment::Wildcard);
                rest = after;
                continue;
            }
            let end = rest
                .find(|c: char| c == '.' || c == '[')
                .unwrap_or(rest.len());
            if end == 0 {
                return Err(parse_error(format!("empty member name in {query:?}")));
            }
            segments.push(Segment::Key(rest[..end].to_string()));
            rest = &rest[end..];
            continue;
        }
        if let Some(after) = rest.strip_prefix('[') {
            let close = after
                .find(']')
                .ok_or_else(|| parse_error(format!("unclosed bracket in {query:?}")))?;
            let inside = &after[..close];
            segments.push(parse_bracket(inside, query)?);
            rest = &after[close + 1..];
            continue;
        }
        return Err(parse_error(format!(
            "unexpected {rest:?} in JSONPath {query:?}"
        )));
    }
    Ok(segments)
}

fn parse_bracket(inside: &str, query: &str) -> Result<Segment, JsonError> {
    let inside = inside.trim();
    if inside == "*" {
        return Ok(Segment::Wildcard);
    }
    if inside.contains(',') {
        let mut parts = Vec::new();
        for part in inside.split(',') {
            parts.push(parse_bracket(part, query)?);
        }
        return Ok(Segment::Union(parts));
    }
    if let Some(colon) = inside.find(':') {
        let start = inside[..colon].trim();
        let end = inside[colon + 1..].trim();
        let parse_bound = |s: &str| -> Result<Option<i64>, JsonError> {
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse::<i64>()
                    .map(Some)
                    .map_err(|_| parse_error(format!("invalid slice bound {s:?} in {query:?}")))
            }
        };
        return Ok(Segment::Slice(parse_bound(start)?, parse_bound(end)?));
    }
    if let Some(quoted) = inside
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| inside.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
    {
        return Ok(Segment::Key(quoted.to_string()));
    }
    if let Ok(index) = inside.parse::<i64>() {
        return Ok(Segment::Index(index));
    }
    // Bare identifier in brackets.
    Ok(Segment::Key(inside.to_string()))
}

fn select<'v>(current: Vec<&'v Value>, segment: &Segment, descend: bool) -> Vec<&'v Value> {
    let mut out = Vec::new();
    for value in current {
        if descend {
            collect_descendants(value, &mut |v| apply(v, segment, &mut out));
        } else {
            apply(value, segment, &mut out);
        }
    }
    out
}

fn apply<'v>(value: &'v Value, segment: &Segment, out: &mut Vec<&'v Value>) {
    match segment {
        Segment::Key(key) => {
            if let Some(found) = value.get(key.as_str()) {
                out.push(found);
            }
        }
        Segment::Index(index) => {
            if let Value::Array(items) = value {
                let idx = if *index < 0 {
                    items.len() as i64 + index
                } else {
                    *index
                };
                if idx >= 0 {
                    if let Some(found) = items.get(idx as usize) {
                        out.push(found);
                    }
                }
            }
        }
        Segment::Slice(start, end) => {
            if let Value::Array(items) = value {
                let len = items.len() as i64;
                let clamp = |bound: i64| bound.clamp(0, len) as usize;
                let from = clamp(start.map(|s| if s < 0 { len + s } else { s }).unwrap_or(0));
                let to = clamp(end.map(|e| if e < 0 { len + e } else { e }).unwrap_or(len));
                if from < to {
                    out.extend(items[from..to].iter());
                }
            }
        }
        Segment::Wildcard => match value {
            Value::Object(map) => out.extend(map.values()),
            Value::Array(items) => out.extend(items.iter()),
            _ => {}
        },
        Segment::Union(parts) => {
            for part in parts {
                apply(value, part, out);
            }
        }
        Segment::Descend => {}
    }
}

fn collect_descendants<'v>(value: &'v Value, visit: &mut impl FnMut(&'v Value)) {
    visit(value);
    match value {
        Value::Object(map) => {
            for v in map.values() {
                collect_descendants(v, visit);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_descendants(v, visit);
            }
        }
        _ => {}
    }
}

/// Evaluate `query` against `value`, returning matches in document order.
pub fn query<'v>(value: &'v Value, query: &str) -> Result<Vec<&'v Value>, JsonError> {
    let segments = parse(query)?;
    let mut current = vec![value];
    let mut pending_descend = false;
    for segment in &segments {
        if *segment == Segment::Descend {
            pending_descend = true;
            continue;
        }
        current = select(current, segment, pending_descend);
        pending_descend = false;
    }
    if pending_descend {
        // `$..` with nothing after it selects every node.
        let mut all = Vec::new();
        for v in current {
            collect_descendants(v, &mut |n| all.push(n));
        }
        current = all;
    }
    Ok(current)
}

/// The string contract used by the editor: a single match serializes as
/// itself, anything else as a JSON array of matches.
pub fn execute(text: &str, path: &str) -> Result<String, JsonError> {
    let parsed = crate::parse::parse(text)?;
    let matches = query(&parsed.value, path)?;
    let rendered = match matches.as_slice() {
        [single] => serde_json::to_string_pretty(single),
        many => serde_json::to_string_pretty(&many.iter().collect::<Vec<_>>()),
    };
    rendered.map_err(JsonError::from_serde)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "store": {
                "book": [
                    {"title": "Sayings", "price": 8.95},
                    {"title": "Moby Dick", "price": 8.99},
                    {"title": "SICP", "price": 12.99}
                ],
                "bicycle": {"color": "red", "price": 19.95}
            }
        })
    }

    #[test]
    fn dot_and_bracket_access() {
        let doc = doc();
        let titles = query(&doc, "$.store.book[0].title").unwrap();
        assert_eq!(titles, [&json!("Sayings")]);
        let same = query(&doc, "$['store']['book'][0]['title']").unwrap();
        assert_eq!(same, [&json!("Sayings")]);
    }

    #[test]
    fn wildcard_and_slice() {
        let doc = doc();
        assert_eq!(query(&doc, "$.store.book[*].title").unwrap().len(), 3);
        assert_eq!(query(&doc, "$.store.book[0:2]").unwrap().len(), 2);
        assert_eq!(query(&doc, "$.store.book[-1].title").unwrap(), [&json!("SICP")]);
    }

    #[test]
    fn recursive_descent_finds_all_prices() {
        let doc = doc();
        let prices = query(&doc, "$..price").unwrap();
        assert_eq!(prices.len(), 4);
    }

    #[test]
    fn union_selects_multiple_members() {
        let doc = doc();
        let picked = query(&doc, "$.store.book[0,2].title").unwrap();
        assert_eq!(picked, [&json!("Sayings"), &json!("SICP")]);
    }

    #[test]
    fn execute_returns_single_match_or_array() {
        let text = r#"{"a": {"b": 1}, "c": [1, 2]}"#;
        let single = execute(text, "$.a.b").unwrap();
        assert_eq!(single.trim(), "1");
        let multi = execute(text, "$.c[*]").unwrap();
        assert!(multi.starts_with('['));
    }

    #[test]
    fn bad_path_is_an_error() {
        assert!(query(&json!({}), "$.[").is_err());
    }
}
