//! Host value -> C++ declaration statement.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::protocol::TableAxis;
use crate::types::{Unrepresentable, classify, render_literal};
use crate::value::{HostValue, NdArray, Scalar, ScalarKind, Table};

/// `None` only if the pattern fails to compile, in which case no name is accepted.
static IDENTIFIER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok());

/// A declaration ready to run in the engine. Single use.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedStatement {
    pub name: String,
    pub source: String,
}

/// Why a value produced no statement without being an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Zero elements: the C++ element type cannot be inferred.
    Empty,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Empty => f.write_str("empty container, element type cannot be inferred"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Encoded {
    Statement(EncodedStatement),
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("{0:?} is not a valid C++ identifier")]
    InvalidName(String),
    #[error(transparent)]
    Unrepresentable(#[from] Unrepresentable),
    #[error(
        "{container} is not homogeneous: element {position} is {found}, expected {expected}"
    )]
    Heterogeneous {
        container: &'static str,
        position: usize,
        expected: ScalarKind,
        found: ScalarKind,
    },
    #[error("{0} elements must be scalars")]
    Nested(&'static str),
    #[error("shape {shape:?} needs {expected} elements, got {found}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        found: usize,
    },
}

pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.as_ref().is_some_and(|re| re.is_match(name))
}

/// Build the declaration binding `name` to `value` in the engine.
pub fn encode(name: &str, value: &HostValue) -> Result<Encoded, EncodeError> {
    if !is_identifier(name) {
        return Err(EncodeError::InvalidName(name.to_string()));
    }
    let source = match value {
        HostValue::Scalar(s) => {
            let c = classify(s)?;
            format!("{} {name} = {};", c.kind.cpp_type(), c.literal)
        }
        HostValue::Sequence(items) => {
            if items.is_empty() {
                return Ok(Encoded::Skip(SkipReason::Empty));
            }
            let scalars = items
                .iter()
                .map(|v| v.as_scalar().ok_or(EncodeError::Nested("sequence")))
                .collect::<Result<Vec<_>, _>>()?;
            let (kind, literals) = homogeneous("sequence", scalars)?;
            format!(
                "std::vector<{}> {name} = {{{}}};",
                kind.cpp_type(),
                literals.join(", ")
            )
        }
        HostValue::Mapping(entries) => {
            if entries.is_empty() {
                return Ok(Encoded::Skip(SkipReason::Empty));
            }
            let (key_kind, keys) = homogeneous("mapping keys", entries.iter().map(|(k, _)| k))?;
            let (value_kind, values) =
                homogeneous("mapping values", entries.iter().map(|(_, v)| v))?;
            let pairs: Vec<String> = keys
                .iter()
                .zip(&values)
                .map(|(k, v)| format!("{{{k}, {v}}}"))
                .collect();
            format!(
                "std::map<{}, {}> {name} = {{{}}};",
                key_kind.cpp_type(),
                value_kind.cpp_type(),
                pairs.join(", ")
            )
        }
        HostValue::NdArray(array) => match nd_array(name, array)? {
            Some(source) => source,
            None => return Ok(Encoded::Skip(SkipReason::Empty)),
        },
        HostValue::Table(table) => match table_variable(name, table)? {
            Some(source) => source,
            None => return Ok(Encoded::Skip(SkipReason::Empty)),
        },
    };
    Ok(Encoded::Statement(EncodedStatement {
        name: name.to_string(),
        source,
    }))
}

/// Classify every scalar and require one shared kind, taken from the first.
fn homogeneous<'a>(
    container: &'static str,
    scalars: impl IntoIterator<Item = &'a Scalar>,
) -> Result<(ScalarKind, Vec<String>), EncodeError> {
    let mut kind = None;
    let mut literals = Vec::new();
    for (position, scalar) in scalars.into_iter().enumerate() {
        let c = classify(scalar)?;
        match kind {
            None => kind = Some(c.kind),
            Some(expected) if expected != c.kind => {
                return Err(EncodeError::Heterogeneous {
                    container,
                    position,
                    expected,
                    found: c.kind,
                });
            }
            Some(_) => {}
        }
        literals.push(c.literal);
    }
    // Callers reject empty input before getting here.
    Ok((kind.unwrap_or(ScalarKind::Int32), literals))
}

/// Literals for data declared with an explicit dtype: every element must
/// classify to the dtype or a narrower kind of the same family.
fn conforming(
    container: &'static str,
    dtype: ScalarKind,
    data: &[Scalar],
) -> Result<Vec<String>, EncodeError> {
    data.iter()
        .enumerate()
        .map(|(position, scalar)| {
            let c = classify(scalar)?;
            if !c.kind.widens_to(dtype) {
                return Err(EncodeError::Heterogeneous {
                    container,
                    position,
                    expected: dtype,
                    found: c.kind,
                });
            }
            Ok(render_literal(scalar, dtype))
        })
        .collect()
}

fn check_shape(shape: &[usize], found: usize) -> Result<(), EncodeError> {
    let expected = shape.iter().product();
    if expected != found {
        return Err(EncodeError::ShapeMismatch {
            shape: shape.to_vec(),
            expected,
            found,
        });
    }
    Ok(())
}

fn extents(shape: &[usize]) -> String {
    shape
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn nd_array(name: &str, array: &NdArray) -> Result<Option<String>, EncodeError> {
    check_shape(&array.shape, array.data.len())?;
    if array.data.is_empty() {
        return Ok(None);
    }
    let literals = conforming("array", array.dtype, &array.data)?;
    Ok(Some(format!(
        "xt::xarray<{ty}> {name} = {{{data}}}; {name}.reshape({{{shape}}});",
        ty = array.dtype.cpp_type(),
        data = literals.join(", "),
        shape = extents(&array.shape),
    )))
}

/// One immediately-invoked lambda so the table binds a single name.
fn table_variable(name: &str, table: &Table) -> Result<Option<String>, EncodeError> {
    let shape = [table.index.len(), table.columns.len()];
    check_shape(&shape, table.data.len())?;
    if table.data.is_empty() {
        return Ok(None);
    }
    let data = conforming("table", table.dtype, &table.data)?;
    let (index_kind, index) = homogeneous("index labels", &table.index)?;
    let (column_kind, columns) = homogeneous("column labels", &table.columns)?;

    let (index_axis, column_axis) = (TableAxis::Index.label(), TableAxis::Columns.label());
    Ok(Some(format!(
        "auto {name} = [] {{ \
         xt::xarray<{ty}> bridge_data = {{{data}}}; \
         bridge_data.reshape({{{shape}}}); \
         auto bridge_index = xf::axis<{index_ty}>({{{index}}}); \
         auto bridge_columns = xf::axis<{column_ty}>({{{columns}}}); \
         auto bridge_coords = xf::coordinate({{{{\"{index_axis}\", bridge_index}}, {{\"{column_axis}\", bridge_columns}}}}); \
         auto bridge_dims = xf::dimension({{\"{index_axis}\", \"{column_axis}\"}}); \
         return xf::variable(std::move(bridge_data), std::move(bridge_coords), std::move(bridge_dims)); \
         }}();",
        ty = table.dtype.cpp_type(),
        data = data.join(", "),
        shape = extents(&shape),
        index_ty = index_kind.cpp_type(),
        index = index.join(", "),
        column_ty = column_kind.cpp_type(),
        columns = columns.join(", "),
    )))
}
