//! Dependency extraction from definition text.
//!
//! Only the type names a definition references are extracted; field names,
//! constants and comments are ignored.

use crate::format::DefinitionFormat;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Field types in `.msg` text: `foo_msgs/Bar` in `foo_msgs/Bar[] bar`.
static MSG_FIELD_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\n)\s*([a-zA-Z0-9_/]+)(?:\[[^\]]*\])?\s+").expect("valid msg field pattern")
});

/// Includes in `.idl` text: `foo_msgs/msg/Bar` in `#include <foo_msgs/msg/Bar.idl>`.
static IDL_INCLUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|\n)#include\s+(?:"|<)([a-zA-Z0-9_/]+)\.idl(?:"|>)"#)
        .expect("valid idl include pattern")
});

/// Built-in scalar types of the `.msg` dialect.
pub const PRIMITIVE_TYPES: &[&str] = &[
    "bool", "byte", "char", "float32", "float64", "int8", "uint8", "int16", "uint16", "int32",
    "uint32", "int64", "uint64", "string",
];

/// Whether `type_name` is a built-in `.msg` scalar.
pub fn is_primitive(type_name: &str) -> bool {
    PRIMITIVE_TYPES.contains(&type_name)
}

/// Extract the fully qualified names of the types `text` depends on.
///
/// `package_context` is the package of the type whose text is parsed; it
/// qualifies bare type names in `.msg` text. `.idl` includes are already
/// qualified and ignore it.
pub fn parse_dependencies(
    format: DefinitionFormat,
    text: &str,
    package_context: &str,
) -> BTreeSet<String> {
    match format {
        DefinitionFormat::Msg => parse_msg_dependencies(text, package_context),
        DefinitionFormat::Idl => parse_idl_dependencies(text),
    }
}

fn parse_msg_dependencies(text: &str, package_context: &str) -> BTreeSet<String> {
    MSG_FIELD_TYPE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|type_name| !is_primitive(type_name))
        .map(|type_name| {
            if type_name.contains('/') {
                type_name.to_string()
            } else {
                format!("{}/{}", package_context, type_name)
            }
        })
        .collect()
}

fn parse_idl_dependencies(text: &str) -> BTreeSet<String> {
    IDL_INCLUDE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}
