//! Statements the bridge sends to the interpreter to inspect live variables.
//!
//! Every read goes through the helpers in `cpp/bridge_utils.hpp`, which the
//! session sends once at start-up. The printed forms these statements produce
//! are parsed by `decoder::parse`. Every print ends with a newline so an empty
//! value still produces output:
//!
//! - flat lists: `"e1","e2"` (each element quoted, `"` and `\` escaped)
//! - pair lists: `"k1":"v1","k2":"v2"`
//! - shapes: `3,3`

/// Helper header sent as the first init statement of every session.
pub const UTILS_HPP: &str = include_str!("../cpp/bridge_utils.hpp");

/// The two label axes of a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableAxis {
    Index,
    Columns,
}

impl TableAxis {
    pub fn label(self) -> &'static str {
        match self {
            TableAxis::Index => "index",
            TableAxis::Columns => "columns",
        }
    }

    fn position(self) -> usize {
        match self {
            TableAxis::Index => 0,
            TableAxis::Columns => 1,
        }
    }
}

/// Expression whose `execute_result` is the quoted runtime type name of `expr`.
pub fn type_query(expr: &str) -> String {
    format!("bridge_type_name({expr})")
}

/// Print a scalar variable.
pub fn print_value(name: &str) -> String {
    format!("bridge_print({name}); std::cout << std::endl;")
}

/// Print every element of an iterable expression as a flat list.
pub fn print_elements(expr: &str) -> String {
    format!(
        "{{ bool bridge_first = true; for (const auto& bridge_e : {expr}) {{ \
         if (!bridge_first) std::cout << \",\"; bridge_first = false; \
         bridge_print_quoted(bridge_e); }} std::cout << std::endl; }}"
    )
}

/// Print every entry of a map as a pair list.
pub fn print_pairs(name: &str) -> String {
    format!(
        "{{ bool bridge_first = true; for (const auto& bridge_kv : {name}) {{ \
         if (!bridge_first) std::cout << \",\"; bridge_first = false; \
         bridge_print_quoted(bridge_kv.first); std::cout << \":\"; \
         bridge_print_quoted(bridge_kv.second); }} std::cout << std::endl; }}"
    )
}

/// Print the shape of an xtensor expression as comma-separated extents.
pub fn print_shape(expr: &str) -> String {
    format!(
        "{{ bool bridge_first = true; for (auto bridge_d : {expr}.shape()) {{ \
         if (!bridge_first) std::cout << \",\"; bridge_first = false; \
         std::cout << bridge_d; }} std::cout << std::endl; }}"
    )
}

/// A value-initialised element of an iterable expression. Only the type is
/// observed, so this is well-formed for empty containers too.
pub fn element_of(expr: &str) -> String {
    format!("std::decay<decltype(*std::begin({expr}))>::type{{}}")
}

pub fn key_of(name: &str) -> String {
    format!("std::decay<decltype({name}.begin()->first)>::type{{}}")
}

pub fn mapped_of(name: &str) -> String {
    format!("std::decay<decltype({name}.begin()->second)>::type{{}}")
}

/// Data array of a table variable.
pub fn table_data(name: &str) -> String {
    format!("{name}.data()")
}

/// Label container of one table axis.
pub fn axis_labels(name: &str, axis: TableAxis) -> String {
    format!("bridge_axis_labels({name}, {})", axis.position())
}

/// Fill the configured change-directory template.
pub fn change_dir(template: &str, dir: &str) -> String {
    let quoted = crate::types::quote(dir);
    template.replace("{dir}", &quoted[1..quoted.len() - 1])
}
