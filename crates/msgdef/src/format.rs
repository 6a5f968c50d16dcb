//! Textual definition dialects.

use crate::error::DefinitionError;
use std::fmt;
use std::str::FromStr;

/// The two mutually exclusive definition dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DefinitionFormat {
    /// `.msg` field lists
    Msg,
    /// `.idl` modules
    Idl,
}

impl DefinitionFormat {
    /// Schema encoding recorded in the container for this dialect.
    pub fn schema_encoding(self) -> &'static str {
        match self {
            DefinitionFormat::Msg => "ros2msg",
            DefinitionFormat::Idl => "ros2idl",
        }
    }

    /// File extension of definition files, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            DefinitionFormat::Msg => "msg",
            DefinitionFormat::Idl => "idl",
        }
    }

    /// Dialect recorded under a container schema encoding.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::MalformedInput`] for any other encoding.
    pub fn from_encoding(encoding: &str) -> Result<Self, DefinitionError> {
        match encoding {
            "ros2msg" => Ok(DefinitionFormat::Msg),
            "ros2idl" => Ok(DefinitionFormat::Idl),
            _ => Err(DefinitionError::MalformedInput(format!(
                "unknown schema encoding '{}'",
                encoding
            ))),
        }
    }

    /// Tag used in the header line preceding a dependency in a closure blob.
    pub fn tag(self) -> &'static str {
        match self {
            DefinitionFormat::Msg => "MSG",
            DefinitionFormat::Idl => "IDL",
        }
    }
}

impl fmt::Display for DefinitionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for DefinitionFormat {
    type Err = DefinitionError;

    /// Accepts the dialect name, its file extension or its schema encoding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "msg" | "ros2msg" => Ok(DefinitionFormat::Msg),
            "idl" | "ros2idl" => Ok(DefinitionFormat::Idl),
            _ => Err(DefinitionError::MalformedInput(format!(
                "unknown definition format '{}'",
                s
            ))),
        }
    }
}
