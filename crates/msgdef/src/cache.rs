//! Memoized definitions and dependency-closure assembly.
//!
//! A recorded schema has to be self-describing: the blob stored for a type
//! carries the text of the type itself followed by the text of every type it
//! transitively references, each exactly once.
//!
//! ```text
//! <root text>
//! ================================================================================
//! MSG: pkg_b/Bar
//! <text of pkg_b/Bar>
//! ```
//!
//! IDL closures put the header in front of every definition, the root included.

use crate::error::DefinitionResult;
use crate::format::DefinitionFormat;
use crate::parser::parse_dependencies;
use crate::source::{parse_resource_name, DefinitionSource};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Width of the separator line between definitions in a closure.
pub const SEPARATOR_WIDTH: usize = 80;

/// A type name in a specific dialect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionIdentifier {
    /// Dialect of the definition
    pub format: DefinitionFormat,
    /// `pkg/Type` or `pkg/msg/Type`
    pub package_resource_name: String,
}

impl DefinitionIdentifier {
    /// Create an identifier.
    pub fn new(format: DefinitionFormat, package_resource_name: impl Into<String>) -> Self {
        DefinitionIdentifier {
            format,
            package_resource_name: package_resource_name.into(),
        }
    }
}

/// A parsed definition. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSpec {
    /// Dialect of `text`
    pub format: DefinitionFormat,
    /// Raw definition text
    pub text: String,
    /// Fully qualified names of referenced types
    pub dependencies: BTreeSet<String>,
}

impl MessageSpec {
    /// Parse `text`, qualifying bare type names with `package_context`.
    pub fn new(format: DefinitionFormat, text: impl Into<String>, package_context: &str) -> Self {
        let text = text.into();
        let dependencies = parse_dependencies(format, &text, package_context);
        MessageSpec {
            format,
            text,
            dependencies,
        }
    }
}

/// Insert-only cache of parsed definitions in front of a [`DefinitionSource`].
///
/// Entries are handed out as `Arc<MessageSpec>`, so a handle stays valid no
/// matter how many entries are added after it was returned.
#[derive(Debug)]
pub struct MessageDefinitionCache<S> {
    source: S,
    specs: HashMap<DefinitionIdentifier, Arc<MessageSpec>>,
}

impl<S: DefinitionSource> MessageDefinitionCache<S> {
    /// Empty cache reading through `source`.
    pub fn new(source: S) -> Self {
        MessageDefinitionCache {
            source,
            specs: HashMap::new(),
        }
    }

    /// The underlying definition source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Number of cached definitions.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Load and parse a definition, consulting the source only on a miss.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentifier` for malformed names, `DefinitionNotFound`
    /// or `PackageNotFound` if the source has no such definition.
    pub fn load(&mut self, id: &DefinitionIdentifier) -> DefinitionResult<Arc<MessageSpec>> {
        if let Some(spec) = self.specs.get(id) {
            return Ok(Arc::clone(spec));
        }

        let (package, _) = parse_resource_name(&id.package_resource_name)?;
        let text = self
            .source
            .read_definition_text(&id.package_resource_name, id.format)?;
        let spec = Arc::new(MessageSpec::new(id.format, text, package));
        self.specs.insert(id.clone(), Arc::clone(&spec));
        Ok(spec)
    }

    /// Build the self-contained closure blob for `root`.
    ///
    /// The dialect is chosen once: `.msg` if the root has a `.msg` definition,
    /// `.idl` otherwise. Every dependency is then loaded in that dialect; a
    /// dependency only available in the other one is reported as missing.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionNotFound` naming the first reachable type that
    /// cannot be loaded, or the error raised while probing the root.
    pub fn get_full_text(&mut self, root: &str) -> DefinitionResult<(DefinitionFormat, String)> {
        let format = if self.source.definition_exists(root)? {
            DefinitionFormat::Msg
        } else {
            DefinitionFormat::Idl
        };

        let mut blob = String::new();
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(root.to_string());
        self.append_closure(format, root, true, &mut seen, &mut blob)?;
        Ok((format, blob))
    }

    fn append_closure(
        &mut self,
        format: DefinitionFormat,
        name: &str,
        is_root: bool,
        seen: &mut HashSet<String>,
        blob: &mut String,
    ) -> DefinitionResult<()> {
        let spec = self.load(&DefinitionIdentifier::new(format, name))?;

        if format == DefinitionFormat::Idl || !is_root {
            push_header(blob, format, name);
        }
        blob.push_str(&spec.text);

        for dependency in &spec.dependencies {
            if seen.insert(dependency.clone()) {
                self.append_closure(format, dependency, false, seen, blob)?;
            }
        }
        Ok(())
    }
}

fn push_header(blob: &mut String, format: DefinitionFormat, name: &str) {
    blob.push('\n');
    blob.extend(std::iter::repeat('=').take(SEPARATOR_WIDTH));
    blob.push('\n');
    blob.push_str(format.tag());
    blob.push_str(": ");
    blob.push_str(name);
    blob.push('\n');
}
