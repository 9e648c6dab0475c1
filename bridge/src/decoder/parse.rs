//! Parsers for the printed forms in `protocol.rs`. Engine output is only ever
//! read through these, never evaluated.

use crate::types::ScalarTag;
use crate::value::{LongDouble, Scalar};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed {what} at offset {offset}: {detail}")]
    Malformed {
        what: &'static str,
        offset: usize,
        detail: String,
    },
    #[error("{text:?} is not a valid {tag:?} value")]
    InvalidScalar { tag: ScalarTag, text: String },
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    what: &'static str,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str, what: &'static str) -> Self {
        Self { src, pos: 0, what }
    }

    fn error(&self, detail: impl Into<String>) -> ParseError {
        ParseError::Malformed {
            what: self.what,
            offset: self.pos,
            detail: detail.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), ParseError> {
        if self.eat(c) {
            Ok(())
        } else {
            let found = self.rest().chars().next();
            Err(self.error(match found {
                Some(f) => format!("expected {c:?}, found {f:?}"),
                None => format!("expected {c:?}, found end of input"),
            }))
        }
    }

    /// A double-quoted string; `\` escapes the next character.
    fn quoted(&mut self) -> Result<String, ParseError> {
        self.expect('"')?;
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                },
                c => out.push(c),
            }
        }
        self.pos = self.src.len();
        Err(self.error("unterminated string"))
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        self.skip_ws();
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error("trailing characters"))
        }
    }
}

/// `"a","b","c"` -> `["a", "b", "c"]`. Empty input is an empty list.
pub fn flat_list(text: &str) -> Result<Vec<String>, ParseError> {
    let mut cur = Cursor::new(text, "element list");
    let mut items = Vec::new();
    cur.skip_ws();
    if cur.at_end() {
        return Ok(items);
    }
    loop {
        items.push(cur.quoted()?);
        cur.skip_ws();
        if !cur.eat(',') {
            break;
        }
        cur.skip_ws();
    }
    cur.finish()?;
    Ok(items)
}

/// `"k1":"v1","k2":"v2"` -> `[("k1", "v1"), ("k2", "v2")]`.
pub fn pair_list(text: &str) -> Result<Vec<(String, String)>, ParseError> {
    let mut cur = Cursor::new(text, "pair list");
    let mut pairs = Vec::new();
    cur.skip_ws();
    if cur.at_end() {
        return Ok(pairs);
    }
    loop {
        let key = cur.quoted()?;
        cur.skip_ws();
        cur.expect(':')?;
        cur.skip_ws();
        let value = cur.quoted()?;
        pairs.push((key, value));
        cur.skip_ws();
        if !cur.eat(',') {
            break;
        }
        cur.skip_ws();
    }
    cur.finish()?;
    Ok(pairs)
}

/// `3,3` -> `[3, 3]`. Tolerates one level of `()`, `{}` or `[]` around the
/// extents, as printed by some xtensor versions.
pub fn shape(text: &str) -> Result<Vec<usize>, ParseError> {
    let mut cur = Cursor::new(text, "shape");
    cur.skip_ws();
    let close = match cur.rest().chars().next() {
        Some('(') => Some(')'),
        Some('{') => Some('}'),
        Some('[') => Some(']'),
        _ => None,
    };
    if close.is_some() {
        cur.pos += 1;
    }
    let mut extents = Vec::new();
    loop {
        cur.skip_ws();
        let digits = cur.rest().len() - cur.rest().trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            break;
        }
        let extent = cur.rest()[..digits]
            .parse()
            .map_err(|e| cur.error(format!("bad extent: {e}")))?;
        extents.push(extent);
        cur.pos += digits;
        cur.skip_ws();
        if !cur.eat(',') {
            break;
        }
    }
    if let Some(c) = close {
        cur.skip_ws();
        cur.expect(c)?;
    }
    cur.finish()?;
    Ok(extents)
}

/// Parse the printed form of one scalar of the given engine type.
pub fn scalar(tag: ScalarTag, text: &str) -> Result<Scalar, ParseError> {
    let invalid = || ParseError::InvalidScalar {
        tag,
        text: text.to_string(),
    };
    let trimmed = text.trim();
    match tag {
        ScalarTag::Int32 | ScalarTag::Int64 => {
            trimmed.parse::<i128>().map(Scalar::Int).map_err(|_| invalid())
        }
        ScalarTag::Float32 => {
            let single = parse_float(trimmed.strip_suffix('f').unwrap_or(trimmed))
                .ok_or_else(invalid)? as f32;
            // Widen through the shortest decimal form so `0.1f` comes back as 0.1.
            let wide = if single.is_finite() {
                single.to_string().parse::<f64>().map_err(|_| invalid())?
            } else {
                f64::from(single)
            };
            Ok(Scalar::Float(wide))
        }
        ScalarTag::Float64 => parse_float(trimmed).map(Scalar::Float).ok_or_else(invalid),
        ScalarTag::Float128 => trimmed
            .parse::<LongDouble>()
            .map(Scalar::LongDouble)
            .map_err(|_| invalid()),
        ScalarTag::Char | ScalarTag::Text => Ok(Scalar::Text(text.to_string())),
        ScalarTag::Bool | ScalarTag::BitReference => match trimmed {
            "true" | "1" => Ok(Scalar::Bool(true)),
            "false" | "0" => Ok(Scalar::Bool(false)),
            _ => Err(invalid()),
        },
    }
}

/// Decimal float as printed by iostreams, including `inf`/`nan` spellings.
fn parse_float(text: &str) -> Option<f64> {
    match text.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        "nan" | "-nan" | "+nan" => Some(f64::NAN),
        other => {
            if other.is_empty()
                || !other
                    .chars()
                    .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | '+' | '-'))
            {
                return None;
            }
            other.parse().ok()
        }
    }
}
