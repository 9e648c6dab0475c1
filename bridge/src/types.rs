//! Scalar type mapping between the host and the engine.
//!
//! [`classify`] picks the narrowest engine kind whose range holds a host scalar
//! and renders its literal; [`RuntimeType::from_tag`] is the inverse table used
//! when reading values back.

use std::cmp::Ordering;

use crate::value::{LongDouble, Scalar, ScalarKind};

/// A host scalar classified for the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct Classified {
    pub kind: ScalarKind,
    pub literal: String,
}

/// The value has no engine kind: integer beyond 64 bits, non-finite float, or
/// a float outside every supported range.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{value} ({host_type}) has no C++ representation")]
pub struct Unrepresentable {
    pub value: String,
    pub host_type: &'static str,
}

impl Unrepresentable {
    fn of(scalar: &Scalar) -> Self {
        Self {
            value: scalar.to_string(),
            host_type: scalar.type_name(),
        }
    }
}

/// Normal range of one floating kind, as inclusive magnitude bounds.
struct FloatRange {
    kind: ScalarKind,
    min: LongDouble,
    max: LongDouble,
}

const FLOAT_RANGES: [FloatRange; 3] = [
    FloatRange {
        kind: ScalarKind::Float32,
        min: LongDouble::from_parts(1.17549, -38),
        max: LongDouble::from_parts(3.40282, 38),
    },
    FloatRange {
        kind: ScalarKind::Float64,
        min: LongDouble::from_parts(2.22507, -308),
        max: LongDouble::from_parts(1.79769, 308),
    },
    FloatRange {
        kind: ScalarKind::Float128,
        min: LongDouble::from_parts(3.3621, -4932),
        max: LongDouble::from_parts(1.18973, 4932),
    },
];

/// Classify a host scalar and render it as an engine literal.
pub fn classify(scalar: &Scalar) -> Result<Classified, Unrepresentable> {
    let kind = match scalar {
        Scalar::Bool(_) => Some(ScalarKind::Bool),
        Scalar::Int(i) => int_kind(*i),
        Scalar::Float(f) => float_kind(&LongDouble::from_f64(*f)),
        Scalar::LongDouble(ld) => float_kind(ld),
        Scalar::Text(_) => Some(ScalarKind::Text),
    }
    .ok_or_else(|| Unrepresentable::of(scalar))?;
    Ok(Classified {
        kind,
        literal: render_literal(scalar, kind),
    })
}

/// Render `scalar` as a literal of `kind`. Callers pass the classified kind
/// or a wider kind of the same family (see [`ScalarKind::widens_to`]).
pub fn render_literal(scalar: &Scalar, kind: ScalarKind) -> String {
    match (scalar, kind) {
        (Scalar::Bool(b), _) => b.to_string(),
        (Scalar::Int(i), ScalarKind::Int64) if *i == i64::MIN as i128 => {
            // `9223372036854775808L` alone does not fit in a long.
            "(-9223372036854775807L - 1)".to_string()
        }
        (Scalar::Int(i), ScalarKind::Int64) => format!("{i}L"),
        (Scalar::Int(i), _) => i.to_string(),
        (Scalar::Float(f), kind) => float_literal(kind, *f, None),
        (Scalar::LongDouble(ld), kind) => float_literal(kind, ld.to_f64(), Some(ld)),
        (Scalar::Text(s), _) => quote(s),
    }
}

fn int_kind(i: i128) -> Option<ScalarKind> {
    if i32::try_from(i).is_ok() {
        Some(ScalarKind::Int32)
    } else if i64::try_from(i).is_ok() {
        Some(ScalarKind::Int64)
    } else {
        None
    }
}

/// Narrowest floating kind for a value. Zero goes to Float32; a non-zero value
/// below a kind's normal minimum falls through to the next wider kind, and
/// anything below the extended minimum is held by Float128 as a subnormal.
fn float_kind(v: &LongDouble) -> Option<ScalarKind> {
    if !v.is_finite() {
        return None;
    }
    if v.is_zero() {
        return Some(ScalarKind::Float32);
    }
    for range in &FLOAT_RANGES {
        let above_min = v.cmp_magnitude(&range.min)? != Ordering::Less;
        let below_max = v.cmp_magnitude(&range.max)? != Ordering::Greater;
        if above_min && below_max {
            return Some(range.kind);
        }
    }
    let extended = &FLOAT_RANGES[2];
    if v.cmp_magnitude(&extended.min)? == Ordering::Less {
        return Some(ScalarKind::Float128);
    }
    None
}

fn float_literal(kind: ScalarKind, approx: f64, exact: Option<&LongDouble>) -> String {
    match kind {
        ScalarKind::Float32 => format!("{approx:?}f"),
        ScalarKind::Float128 => match exact {
            Some(ld) => format!("{ld}L"),
            None => format!("{approx:e}L"),
        },
        _ => format!("{approx:?}"),
    }
}

/// Double-quoted C++ string literal.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\{:03o}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ── Inverse table ──

/// Scalar families the engine reports, finer than [`ScalarKind`] where the
/// printed form differs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarTag {
    Int32,
    Int64,
    Float32,
    Float64,
    Float128,
    Char,
    Text,
    Bool,
    /// `std::vector<bool>` element proxy; prints as `0`/`1`.
    BitReference,
}

impl ScalarTag {
    pub fn kind(self) -> ScalarKind {
        match self {
            ScalarTag::Int32 => ScalarKind::Int32,
            ScalarTag::Int64 => ScalarKind::Int64,
            ScalarTag::Float32 => ScalarKind::Float32,
            ScalarTag::Float64 => ScalarKind::Float64,
            ScalarTag::Float128 => ScalarKind::Float128,
            ScalarTag::Char | ScalarTag::Text => ScalarKind::Text,
            ScalarTag::Bool | ScalarTag::BitReference => ScalarKind::Bool,
        }
    }
}

/// Decoding family of an engine runtime type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeType {
    Scalar(ScalarTag),
    Mapping,
    Sequence,
    NdArray,
    Table,
}

const SCALAR_TAGS: &[(&str, ScalarTag)] = &[
    ("bool", ScalarTag::Bool),
    ("_Bool", ScalarTag::Bool),
    ("std::_Bit_reference", ScalarTag::BitReference),
    ("std::_Bit_const_reference", ScalarTag::BitReference),
    ("short", ScalarTag::Int32),
    ("short int", ScalarTag::Int32),
    ("unsigned short", ScalarTag::Int32),
    ("unsigned short int", ScalarTag::Int32),
    ("int", ScalarTag::Int32),
    ("signed int", ScalarTag::Int32),
    ("unsigned", ScalarTag::Int64),
    ("unsigned int", ScalarTag::Int64),
    ("long", ScalarTag::Int64),
    ("long int", ScalarTag::Int64),
    ("unsigned long", ScalarTag::Int64),
    ("unsigned long int", ScalarTag::Int64),
    ("long long", ScalarTag::Int64),
    ("long long int", ScalarTag::Int64),
    ("unsigned long long", ScalarTag::Int64),
    ("unsigned long long int", ScalarTag::Int64),
    ("float", ScalarTag::Float32),
    ("double", ScalarTag::Float64),
    ("long double", ScalarTag::Float128),
    ("char", ScalarTag::Char),
    ("signed char", ScalarTag::Char),
    ("unsigned char", ScalarTag::Char),
    ("std::string", ScalarTag::Text),
    ("char const*", ScalarTag::Text),
    ("char*", ScalarTag::Text),
    ("pointer to char", ScalarTag::Text),
];

const CONTAINER_PREFIXES: &[(&str, RuntimeType)] = &[
    ("std::basic_string<char", RuntimeType::Scalar(ScalarTag::Text)),
    ("std::map<", RuntimeType::Mapping),
    ("std::unordered_map<", RuntimeType::Mapping),
    ("std::multimap<", RuntimeType::Mapping),
    ("std::vector<", RuntimeType::Sequence),
    ("std::list<", RuntimeType::Sequence),
    ("std::deque<", RuntimeType::Sequence),
    ("std::array<", RuntimeType::Sequence),
    ("xt::xarray_container<", RuntimeType::NdArray),
    ("xt::xarray<", RuntimeType::NdArray),
    ("xt::xtensor_container<", RuntimeType::NdArray),
    ("xt::xtensor<", RuntimeType::NdArray),
    ("xf::xvariable_container<", RuntimeType::Table),
    ("xf::xvariable<", RuntimeType::Table),
    ("xf::variable", RuntimeType::Table),
];

impl RuntimeType {
    /// Look up a runtime type tag as reported by the engine. `None` means the
    /// type is not supported.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = normalize_tag(tag);
        if let Some((_, t)) = SCALAR_TAGS.iter().find(|(name, _)| *name == tag) {
            return Some(RuntimeType::Scalar(*t));
        }
        CONTAINER_PREFIXES
            .iter()
            .find(|(prefix, _)| tag.starts_with(prefix))
            .map(|(_, t)| *t)
    }
}

/// Canonical spelling of an engine type name: no surrounding quotes, no
/// cv/reference qualifiers, no ABI inline namespaces, single spaces.
pub fn normalize_tag(tag: &str) -> String {
    let tag = tag.trim();
    let tag = tag
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(tag);
    let tag = tag.replace("__cxx11::", "").replace("__1::", "");
    let tag = tag.trim_end_matches(|c: char| c == '&' || c.is_whitespace());
    let words: Vec<&str> = tag
        .split_whitespace()
        .filter(|w| *w != "const" && *w != "volatile")
        .collect();
    let joined = words.join(" ");
    // `const char *` becomes `char*`
    joined.replace(" *", "*")
}
