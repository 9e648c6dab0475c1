//! Host-side value model.
//!
//! Everything that crosses the bridge is a [`HostValue`]: a scalar or one of the
//! homogeneous containers the engine can represent. The JSON form (externally
//! tagged, snake_case) is what the CLI reads and prints.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical scalar classification, independent of either side's type names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    Float128,
    Text,
}

impl ScalarKind {
    /// C++ type used when declaring a value of this kind.
    pub fn cpp_type(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int32 => "int",
            ScalarKind::Int64 => "long int",
            ScalarKind::Float32 => "float",
            ScalarKind::Float64 => "double",
            ScalarKind::Float128 => "long double",
            ScalarKind::Text => "std::string",
        }
    }

    /// Whether every value of `self` is representable in `wider` without loss.
    pub fn widens_to(self, wider: ScalarKind) -> bool {
        use ScalarKind::*;
        self == wider
            || matches!(
                (self, wider),
                (Int32, Int64) | (Float32, Float64) | (Float32, Float128) | (Float64, Float128)
            )
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cpp_type())
    }
}

/// A single host value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    Bool(bool),
    /// Host integers are unbounded; 128 bits is enough to detect every
    /// out-of-range case the engine cares about.
    Int(i128),
    Float(f64),
    LongDouble(LongDouble),
    Text(String),
}

impl Scalar {
    pub fn text(s: impl Into<String>) -> Self {
        Scalar::Text(s.into())
    }

    /// Short name of the host-side type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::LongDouble(_) => "long_double",
            Scalar::Text(_) => "text",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::LongDouble(ld) => Some(ld.to_f64()),
            Scalar::Bool(_) | Scalar::Text(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::LongDouble(ld) => write!(f, "{ld}"),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// N-dimensional homogeneous array, stored flat in row-major order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NdArray {
    pub shape: Vec<usize>,
    pub dtype: ScalarKind,
    pub data: Vec<Scalar>,
}

impl NdArray {
    pub fn new(shape: Vec<usize>, dtype: ScalarKind, data: Vec<Scalar>) -> Self {
        Self { shape, dtype, data }
    }

    /// Number of elements implied by the shape.
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Element at a multi-dimensional index.
    pub fn get(&self, index: &[usize]) -> Option<&Scalar> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut flat = 0;
        for (&i, &dim) in index.iter().zip(&self.shape) {
            if i >= dim {
                return None;
            }
            flat = flat * dim + i;
        }
        self.data.get(flat)
    }
}

/// Flat table: row labels x column labels, one dtype, row-major data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub index: Vec<Scalar>,
    pub columns: Vec<Scalar>,
    pub dtype: ScalarKind,
    pub data: Vec<Scalar>,
}

impl Table {
    pub fn rows(&self) -> usize {
        self.index.len()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&Scalar> {
        if row >= self.index.len() || column >= self.columns.len() {
            return None;
        }
        self.data.get(row * self.columns.len() + column)
    }
}

/// Any value that can be pushed to or pulled from the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostValue {
    Scalar(Scalar),
    Sequence(Vec<HostValue>),
    Mapping(Vec<(Scalar, Scalar)>),
    NdArray(NdArray),
    Table(Table),
}

impl HostValue {
    pub fn int(v: i128) -> Self {
        HostValue::Scalar(Scalar::Int(v))
    }

    pub fn float(v: f64) -> Self {
        HostValue::Scalar(Scalar::Float(v))
    }

    pub fn bool(v: bool) -> Self {
        HostValue::Scalar(Scalar::Bool(v))
    }

    pub fn text(v: impl Into<String>) -> Self {
        HostValue::Scalar(Scalar::text(v))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            HostValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Short description of the value's shape, for log lines.
    pub fn shape_name(&self) -> &'static str {
        match self {
            HostValue::Scalar(s) => s.type_name(),
            HostValue::Sequence(_) => "sequence",
            HostValue::Mapping(_) => "mapping",
            HostValue::NdArray(_) => "nd_array",
            HostValue::Table(_) => "table",
        }
    }
}

impl From<Scalar> for HostValue {
    fn from(s: Scalar) -> Self {
        HostValue::Scalar(s)
    }
}

// ── LongDouble ──

/// Extended-precision float kept as a normalised decimal `mantissa * 10^exponent`.
///
/// Finite non-zero values keep `1 <= |mantissa| < 10`, which lets magnitudes far
/// outside binary64 (up to the x87 extended range and beyond) be compared and
/// rendered exactly as the engine spells them. Zero and non-finite values keep
/// `exponent == 0`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LongDouble {
    mantissa: f64,
    exponent: i32,
}

impl LongDouble {
    pub const ZERO: LongDouble = LongDouble::from_parts(0.0, 0);
    pub const INFINITY: LongDouble = LongDouble::from_parts(f64::INFINITY, 0);
    pub const NEG_INFINITY: LongDouble = LongDouble::from_parts(f64::NEG_INFINITY, 0);
    pub const NAN: LongDouble = LongDouble::from_parts(f64::NAN, 0);

    /// Caller guarantees the parts are already normalised.
    pub(crate) const fn from_parts(mantissa: f64, exponent: i32) -> Self {
        Self { mantissa, exponent }
    }

    pub fn from_f64(v: f64) -> Self {
        if !v.is_finite() || v == 0.0 {
            return Self::from_parts(v, 0);
        }
        let exponent = v.abs().log10().floor() as i32;
        // binary64 exponents sit far inside i32, so this never hits the limits.
        Self::normalise(scale_down(v, exponent), exponent).unwrap_or(Self::from_parts(v, 0))
    }

    /// `None` when shifting the mantissa into `[1, 10)` overflows the exponent.
    fn normalise(mut mantissa: f64, mut exponent: i32) -> Option<Self> {
        if mantissa == 0.0 || !mantissa.is_finite() {
            return Some(Self::from_parts(mantissa, 0));
        }
        while mantissa.abs() >= 10.0 {
            mantissa /= 10.0;
            exponent = exponent.checked_add(1)?;
        }
        while mantissa.abs() < 1.0 {
            mantissa *= 10.0;
            exponent = exponent.checked_sub(1)?;
        }
        Some(Self::from_parts(mantissa, exponent))
    }

    pub fn mantissa(&self) -> f64 {
        self.mantissa
    }

    pub fn exponent(&self) -> i32 {
        self.exponent
    }

    pub fn is_finite(&self) -> bool {
        self.mantissa.is_finite()
    }

    pub fn is_nan(&self) -> bool {
        self.mantissa.is_nan()
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0.0
    }

    pub fn abs(&self) -> Self {
        Self::from_parts(self.mantissa.abs(), self.exponent)
    }

    /// Compare magnitudes, ignoring sign. `None` when either side is NaN.
    pub fn cmp_magnitude(&self, other: &LongDouble) -> Option<Ordering> {
        let (a, b) = (self.abs(), other.abs());
        if a.is_nan() || b.is_nan() {
            return None;
        }
        match (a.is_finite(), b.is_finite()) {
            (false, false) => return Some(Ordering::Equal),
            (false, true) => return Some(Ordering::Greater),
            (true, false) => return Some(Ordering::Less),
            (true, true) => {}
        }
        match (a.is_zero(), b.is_zero()) {
            (true, true) => return Some(Ordering::Equal),
            (true, false) => return Some(Ordering::Less),
            (false, true) => return Some(Ordering::Greater),
            (false, false) => {}
        }
        a.exponent
            .cmp(&b.exponent)
            .then(a.mantissa.partial_cmp(&b.mantissa)?)
            .into()
    }

    /// Nearest binary64 value; saturates to infinity or zero outside its range.
    pub fn to_f64(&self) -> f64 {
        if !self.is_finite() || self.is_zero() {
            return self.mantissa;
        }
        if self.exponent > 308 {
            return self.mantissa.signum() * f64::INFINITY;
        }
        if self.exponent < -330 {
            return self.mantissa.signum() * 0.0;
        }
        scale_down(self.mantissa, -self.exponent)
    }
}

/// `v / 10^exponent`, split so the intermediate power never leaves binary64 range.
fn scale_down(mut v: f64, mut exponent: i32) -> f64 {
    while exponent > 300 {
        v /= 1e300;
        exponent -= 300;
    }
    while exponent < -300 {
        v *= 1e300;
        exponent += 300;
    }
    v / 10f64.powi(exponent)
}

impl fmt::Display for LongDouble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nan() {
            return f.write_str("nan");
        }
        if !self.is_finite() {
            return f.write_str(if self.mantissa < 0.0 { "-inf" } else { "inf" });
        }
        if self.is_zero() {
            return f.write_str("0");
        }
        write!(f, "{}e{}", self.mantissa, self.exponent)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid extended float literal: {0:?}")]
pub struct LongDoubleParseError(pub String);

impl FromStr for LongDouble {
    type Err = LongDoubleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || LongDoubleParseError(s.to_string());
        let lower = s.trim().to_ascii_lowercase();
        let body = lower.strip_suffix('l').unwrap_or(&lower);
        let (negative, unsigned) = match body.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, body.strip_prefix('+').unwrap_or(body)),
        };
        let sign = if negative { -1.0 } else { 1.0 };

        match unsigned {
            "inf" | "infinity" => return Ok(Self::from_parts(sign * f64::INFINITY, 0)),
            "nan" => return Ok(Self::NAN),
            _ => {}
        }

        let (digits, exponent) = match unsigned.split_once('e') {
            Some((m, e)) => (m, e.parse::<i32>().map_err(|_| err())?),
            None => (unsigned, 0),
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(err());
        }
        let mantissa: f64 = digits.parse().map_err(|_| err())?;
        if !mantissa.is_finite() {
            return Err(err());
        }
        Self::normalise(sign * mantissa, exponent).ok_or_else(err)
    }
}

impl TryFrom<String> for LongDouble {
    type Error = LongDoubleParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LongDouble> for String {
    fn from(value: LongDouble) -> Self {
        value.to_string()
    }
}
