//! In-process stand-in for a cling kernel.
//!
//! Understands exactly the declarations `encoder` produces and the queries
//! `protocol` builds, and answers the way gcc/libstdc++ cling would: demangled
//! type names and `max_digits10` printing. `long double` is binary64 here, as
//! on platforms where it aliases `double`, so `1e1000L` overflows to `inf`.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::protocol::{self, TableAxis};
use crate::transport::{ExecOptions, Response, ResponseKind, Transport, TransportError};

const STRING_TAG: &str =
    "std::__cxx11::basic_string<char, std::char_traits<char>, std::allocator<char> >";

static SCALAR_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(bool|int|long int|float|double|long double|std::string) (\w+) = (.*);$").unwrap()
});
static VECTOR_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^std::vector<(.+?)> (\w+) = \{(.*)\};$").unwrap());
static MAP_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^std::map<(.+?), (.+?)> (\w+) = \{(.*)\};$").unwrap());
static ARRAY_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^xt::xarray<(.+?)> (\w+) = \{(.*)\}; (\w+)\.reshape\(\{(.*)\}\);$").unwrap()
});
static TABLE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^auto (\w+) = \[\] \{ xt::xarray<(.+?)> bridge_data = \{(.*)\}; ",
        r"bridge_data\.reshape\(\{(.*?)\}\); ",
        r"auto bridge_index = xf::axis<(.+?)>\(\{(.*)\}\); ",
        r"auto bridge_columns = xf::axis<(.+?)>\(\{(.*)\}\); ",
        r"auto bridge_coords = .*\}\(\);$",
    ))
    .unwrap()
});

/// Column of printed values sharing one C++ type.
#[derive(Clone, Debug)]
struct Column {
    ty: String,
    printed: Vec<String>,
}

#[derive(Clone, Debug)]
enum Stored {
    Scalar { ty: String, printed: String },
    Vector(Column),
    Map { keys: Column, values: Column },
    Array { shape: Vec<usize>, data: Column },
    Table { data: Column, index: Column, columns: Column },
    /// Something user code declared that the bridge knows nothing about.
    Raw { tag: String, printed: String },
}

#[derive(Default)]
pub(crate) struct FakeEngine {
    vars: HashMap<String, Stored>,
    failing: Vec<String>,
    stall_every: u32,
    stalled: u32,
    pub executed: Vec<String>,
    pub requests: Vec<String>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request with `n` empty responses before the real one.
    pub fn stalling(n: u32) -> Self {
        Self {
            stall_every: n,
            ..Self::default()
        }
    }

    /// Make declarations of `name` fail on the engine side.
    pub fn fail_on(&mut self, name: &str) {
        self.failing.push(name.to_string());
    }

    /// Bind a variable of a type the bridge does not model.
    pub fn define_raw(&mut self, name: &str, tag: &str, printed: &str) {
        self.vars.insert(
            name.to_string(),
            Stored::Raw {
                tag: tag.to_string(),
                printed: printed.to_string(),
            },
        );
    }

    /// Run a declaration directly, as user code in the kernel would.
    pub fn declare(&mut self, statement: &str) {
        let (name, stored) = declaration(statement)
            .unwrap_or_else(|e| panic!("bad declaration {statement:?}: {e}"))
            .unwrap_or_else(|| panic!("not a declaration: {statement:?}"));
        self.vars.insert(name, stored);
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    fn answer(&self, statement: &str) -> Option<Response> {
        self.vars
            .iter()
            .flat_map(|(name, stored)| queries(name, stored))
            .find(|(query, _)| query == statement)
            .map(|(_, response)| response)
    }
}

#[async_trait::async_trait]
impl Transport for FakeEngine {
    async fn execute(
        &mut self,
        statement: &str,
        options: &ExecOptions,
    ) -> Result<(), TransportError> {
        self.executed.push(statement.to_string());
        match declaration(statement) {
            Ok(Some((name, _))) if self.failing.contains(&name) => {
                Err(TransportError::Engine(options.on_error.clone()))
            }
            Ok(Some((name, stored))) => {
                self.vars.insert(name, stored);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(TransportError::Engine(format!("{}: {e}", options.on_error))),
        }
    }

    async fn request(
        &mut self,
        statement: &str,
        _kinds: &[ResponseKind],
    ) -> Result<Vec<Response>, TransportError> {
        self.requests.push(statement.to_string());
        if self.stalled < self.stall_every {
            self.stalled += 1;
            return Ok(Vec::new());
        }
        self.stalled = 0;
        match self.answer(statement) {
            Some(response) => Ok(vec![response]),
            None => Err(TransportError::Engine(format!(
                "use of undeclared identifier in {statement:?}"
            ))),
        }
    }
}

// ── Queries ──

fn queries(name: &str, stored: &Stored) -> Vec<(String, Response)> {
    let type_of = |expr: &str, tag: String| {
        (protocol::type_query(expr), Response::plain(format!("\"{tag}\"")))
    };
    let elements = |expr: &str, column: &Column| {
        (protocol::print_elements(expr), printed(&flat(&column.printed)))
    };
    let element_type = |expr: &str, column: &Column| type_of(&protocol::element_of(expr), element_tag(&column.ty));

    match stored {
        Stored::Scalar { ty, printed: value } => vec![
            type_of(name, demangle(ty)),
            (protocol::print_value(name), printed(value)),
        ],
        Stored::Raw { tag, printed: value } => vec![
            type_of(name, tag.clone()),
            (protocol::print_value(name), printed(value)),
        ],
        Stored::Vector(column) => vec![
            type_of(name, vector_tag(&column.ty)),
            elements(name, column),
            element_type(name, column),
        ],
        Stored::Map { keys, values } => {
            let pairs: Vec<String> = keys
                .printed
                .iter()
                .zip(&values.printed)
                .map(|(k, v)| format!("{}:{}", quoted(k), quoted(v)))
                .collect();
            vec![
                type_of(name, map_tag(&keys.ty, &values.ty)),
                (protocol::print_pairs(name), printed(&pairs.join(","))),
                type_of(&protocol::key_of(name), demangle(&keys.ty)),
                type_of(&protocol::mapped_of(name), demangle(&values.ty)),
            ]
        }
        Stored::Array { shape, data } => vec![
            type_of(name, array_tag(&data.ty)),
            elements(name, data),
            (protocol::print_shape(name), printed(&extents(shape))),
            element_type(name, data),
        ],
        Stored::Table {
            data,
            index,
            columns,
        } => {
            let data_expr = protocol::table_data(name);
            let index_expr = protocol::axis_labels(name, TableAxis::Index);
            let column_expr = protocol::axis_labels(name, TableAxis::Columns);
            let shape = [index.printed.len(), columns.printed.len()];
            vec![
                type_of(name, table_tag(&data.ty)),
                elements(&data_expr, data),
                (protocol::print_shape(&data_expr), printed(&extents(&shape))),
                element_type(&data_expr, data),
                elements(&index_expr, index),
                element_type(&index_expr, index),
                elements(&column_expr, columns),
                element_type(&column_expr, columns),
            ]
        }
    }
}

fn printed(text: &str) -> Response {
    Response::stream(format!("{text}\n"))
}

fn quoted(s: &str) -> String {
    let mut out = String::from('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn flat(items: &[String]) -> String {
    items.iter().map(|i| quoted(i)).collect::<Vec<_>>().join(",")
}

fn extents(shape: &[usize]) -> String {
    shape.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(",")
}

// ── Type names ──

fn demangle(ty: &str) -> String {
    match ty {
        "long int" => "long".to_string(),
        "std::string" => STRING_TAG.to_string(),
        other => other.to_string(),
    }
}

fn element_tag(ty: &str) -> String {
    // Dereferencing a vector<bool> iterator yields the bit proxy.
    if ty == "bool" {
        "std::_Bit_reference".to_string()
    } else {
        demangle(ty)
    }
}

fn vector_tag(ty: &str) -> String {
    let t = demangle(ty);
    format!("std::vector<{t}, std::allocator<{t}> >")
}

fn map_tag(key: &str, value: &str) -> String {
    let (k, v) = (demangle(key), demangle(value));
    format!("std::map<{k}, {v}, std::less<{k}>, std::allocator<std::pair<{k} const, {v}> > >")
}

fn array_tag(ty: &str) -> String {
    let t = demangle(ty);
    format!(
        "xt::xarray_container<xt::uvector<{t}, xsimd::aligned_allocator<{t}, 16ul> >, \
         (xt::layout_type)1, xt::svector<unsigned long, 4ul, std::allocator<unsigned long>, true>, \
         xt::xtensor_expression_tag>"
    )
}

fn table_tag(ty: &str) -> String {
    format!(
        "xf::xvariable_container<xf::xcoordinate<{STRING_TAG}, xf::map_container<{STRING_TAG}>, \
         unsigned long>, {}>",
        array_tag(ty)
    )
}

// ── Declarations ──

/// `Ok(None)` for statements that declare nothing (headers, `chdir`).
fn declaration(statement: &str) -> Result<Option<(String, Stored)>, String> {
    let statement = statement.trim();
    if let Some(c) = TABLE_DECL.captures(statement) {
        let data = column(&c[2], &c[3])?;
        let shape = shape(&c[4])?;
        let index = column(&c[5], &c[6])?;
        let columns = column(&c[7], &c[8])?;
        if shape != [index.printed.len(), columns.printed.len()]
            || data.printed.len() != shape.iter().product::<usize>()
        {
            return Err(format!("cannot reshape {} elements to {shape:?}", data.printed.len()));
        }
        return Ok(Some((
            c[1].to_string(),
            Stored::Table {
                data,
                index,
                columns,
            },
        )));
    }
    if let Some(c) = ARRAY_DECL.captures(statement) {
        if c[2] != c[4] {
            return Err("reshape of a different variable".to_string());
        }
        let data = column(&c[1], &c[3])?;
        let shape = shape(&c[5])?;
        if data.printed.len() != shape.iter().product::<usize>() {
            return Err(format!("cannot reshape {} elements to {shape:?}", data.printed.len()));
        }
        return Ok(Some((c[2].to_string(), Stored::Array { shape, data })));
    }
    if let Some(c) = MAP_DECL.captures(statement) {
        let mut keys = Vec::new();
        let mut values = Vec::new();
        for pair in split_top(&c[4]) {
            let inner = pair
                .strip_prefix('{')
                .and_then(|p| p.strip_suffix('}'))
                .ok_or_else(|| format!("bad map entry {pair}"))?;
            match split_top(inner).as_slice() {
                [k, v] => {
                    keys.push(evaluate(&c[1], k)?);
                    values.push(evaluate(&c[2], v)?);
                }
                _ => return Err(format!("bad map entry {pair}")),
            }
        }
        return Ok(Some((
            c[3].to_string(),
            Stored::Map {
                keys: Column {
                    ty: c[1].to_string(),
                    printed: keys,
                },
                values: Column {
                    ty: c[2].to_string(),
                    printed: values,
                },
            },
        )));
    }
    if let Some(c) = VECTOR_DECL.captures(statement) {
        return Ok(Some((c[2].to_string(), Stored::Vector(column(&c[1], &c[3])?))));
    }
    if let Some(c) = SCALAR_DECL.captures(statement) {
        return Ok(Some((
            c[2].to_string(),
            Stored::Scalar {
                ty: c[1].to_string(),
                printed: evaluate(&c[1], &c[3])?,
            },
        )));
    }
    Ok(None)
}

fn column(ty: &str, literals: &str) -> Result<Column, String> {
    let printed = split_top(literals)
        .iter()
        .map(|l| evaluate(ty, l))
        .collect::<Result<_, _>>()?;
    Ok(Column {
        ty: ty.to_string(),
        printed,
    })
}

fn shape(extents: &str) -> Result<Vec<usize>, String> {
    split_top(extents)
        .iter()
        .map(|d| d.parse().map_err(|_| format!("bad extent {d}")))
        .collect()
}

/// Split on commas outside quotes, braces and parentheses.
fn split_top(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut depth = 0i32;
    let mut in_str = false;
    let mut escaped = false;
    for c in s.chars() {
        if in_str {
            cur.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_str = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_str = true;
                cur.push(c);
            }
            '{' | '(' => {
                depth += 1;
                cur.push(c);
            }
            '}' | ')' => {
                depth -= 1;
                cur.push(c);
            }
            ',' if depth == 0 => {
                out.push(cur.trim().to_string());
                cur.clear();
            }
            _ => cur.push(c),
        }
    }
    if !cur.trim().is_empty() {
        out.push(cur.trim().to_string());
    }
    out
}

/// What `bridge_format` prints for a literal of C++ type `ty`.
fn evaluate(ty: &str, literal: &str) -> Result<String, String> {
    let lit = literal.trim();
    let bad = || format!("{lit:?} is not a valid {ty} literal");
    match ty {
        "bool" => match lit {
            "true" | "false" => Ok(lit.to_string()),
            _ => Err(bad()),
        },
        "int" => lit.parse::<i32>().map(|v| v.to_string()).map_err(|_| bad()),
        "long int" => {
            if lit == "(-9223372036854775807L - 1)" {
                return Ok(i64::MIN.to_string());
            }
            let digits = lit.strip_suffix('L').unwrap_or(lit);
            digits.parse::<i64>().map(|v| v.to_string()).map_err(|_| bad())
        }
        "float" => {
            let digits = lit.strip_suffix('f').unwrap_or(lit);
            let v: f32 = digits.parse().map_err(|_| bad())?;
            Ok(general(f64::from(v), 9))
        }
        "double" => lit.parse::<f64>().map(|v| general(v, 17)).map_err(|_| bad()),
        "long double" => {
            let digits = lit.strip_suffix('L').unwrap_or(lit);
            digits.parse::<f64>().map(|v| general(v, 17)).map_err(|_| bad())
        }
        "std::string" => unquote(lit).ok_or_else(bad),
        _ => Err(format!("unsupported type {ty}")),
    }
}

/// iostream default float formatting at `precision` significant digits.
fn general(v: f64, precision: usize) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if v == 0.0 {
        return "0".to_string();
    }
    let sci = format!("{:.*e}", precision - 1, v);
    let (mantissa, exp) = sci.split_once('e').unwrap();
    let exp: i32 = exp.parse().unwrap();
    if exp < -4 || exp >= precision as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_zeros(mantissa), exp.abs())
    } else {
        let decimals = (precision as i32 - 1 - exp) as usize;
        trim_zeros(&format!("{v:.decimals$}"))
    }
}

fn trim_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

fn unquote(lit: &str) -> Option<String> {
    let inner = lit.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::new();
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            d @ '0'..='7' => {
                let mut code = d.to_digit(8)?;
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(next) => {
                            code = code * 8 + next;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(code)?);
            }
            other => out.push(other),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_matches_iostream() {
        assert_eq!(general(f64::from(0.1f32), 9), "0.100000001");
        assert_eq!(general(5.5, 17), "5.5");
        assert_eq!(general(1.1, 17), "1.1000000000000001");
        assert_eq!(general(1e50, 17), "1.0000000000000001e+50");
        assert_eq!(general(0.0001, 17), "0.0001");
        assert_eq!(general(f64::INFINITY, 17), "inf");
    }

    #[test]
    fn splits_nested_literals() {
        assert_eq!(
            split_top(r#"{"a,b", true}, {"c", (-1 - 1)}"#),
            vec![r#"{"a,b", true}"#.to_string(), r#"{"c", (-1 - 1)}"#.to_string()]
        );
    }

    #[test]
    fn unquotes_cpp_escapes() {
        assert_eq!(unquote(r#""a\"b\\c\n\001""#).unwrap(), "a\"b\\c\n\u{1}");
    }
}
