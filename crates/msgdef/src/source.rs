//! Where definition text comes from.
//!
//! The cache never touches the filesystem itself; it asks a
//! [`DefinitionSource`]. [`AmentIndex`] looks definitions up in installed
//! package share directories, [`InMemoryDefinitions`] serves them from a map.

use crate::error::{DefinitionError, DefinitionResult};
use crate::format::DefinitionFormat;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// `foo_msgs/Bar` or `foo_msgs/msg/Bar`.
static PACKAGE_TYPENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z0-9_]+)/(?:msg/)?([a-zA-Z0-9_]+)$").expect("valid type name pattern")
});

/// Split a package resource name into `(package, type)`.
///
/// # Errors
///
/// Returns [`DefinitionError::InvalidIdentifier`] if the name is not of the
/// form `pkg/Type` or `pkg/msg/Type`.
pub fn parse_resource_name(package_resource_name: &str) -> DefinitionResult<(&str, &str)> {
    let caps = PACKAGE_TYPENAME
        .captures(package_resource_name)
        .ok_or_else(|| DefinitionError::InvalidIdentifier(package_resource_name.to_string()))?;
    match (caps.get(1), caps.get(2)) {
        (Some(package), Some(type_name)) => Ok((package.as_str(), type_name.as_str())),
        _ => Err(DefinitionError::InvalidIdentifier(
            package_resource_name.to_string(),
        )),
    }
}

/// Lookup of message definition text by qualified type name.
///
/// Implementations must be cheap to call repeatedly; the cache in front of
/// them only memoizes successful loads.
pub trait DefinitionSource: Send + Sync {
    /// Share directory of `package`.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::PackageNotFound`] if the package is unknown.
    fn resolve(&self, package: &str) -> DefinitionResult<PathBuf>;

    /// Whether a `.msg` definition exists for the type.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is malformed or its package is unknown.
    fn definition_exists(&self, package_resource_name: &str) -> DefinitionResult<bool>;

    /// Raw definition text of the type in the given dialect.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::DefinitionNotFound`] naming the type if no
    /// such definition exists.
    fn read_definition_text(
        &self,
        package_resource_name: &str,
        format: DefinitionFormat,
    ) -> DefinitionResult<String>;
}

impl<T: DefinitionSource + ?Sized> DefinitionSource for Box<T> {
    fn resolve(&self, package: &str) -> DefinitionResult<PathBuf> {
        (**self).resolve(package)
    }

    fn definition_exists(&self, package_resource_name: &str) -> DefinitionResult<bool> {
        (**self).definition_exists(package_resource_name)
    }

    fn read_definition_text(
        &self,
        package_resource_name: &str,
        format: DefinitionFormat,
    ) -> DefinitionResult<String> {
        (**self).read_definition_text(package_resource_name, format)
    }
}

impl<T: DefinitionSource + ?Sized> DefinitionSource for Arc<T> {
    fn resolve(&self, package: &str) -> DefinitionResult<PathBuf> {
        (**self).resolve(package)
    }

    fn definition_exists(&self, package_resource_name: &str) -> DefinitionResult<bool> {
        (**self).definition_exists(package_resource_name)
    }

    fn read_definition_text(
        &self,
        package_resource_name: &str,
        format: DefinitionFormat,
    ) -> DefinitionResult<String> {
        (**self).read_definition_text(package_resource_name, format)
    }
}

// ============================================================================
// Ament resource index
// ============================================================================

/// Definitions installed in ament prefixes.
///
/// A package is installed under a prefix when the marker file
/// `<prefix>/share/ament_index/resource_index/packages/<package>` exists.
/// Its definitions live at `<prefix>/share/<package>/msg/<Type>.<ext>`.
/// Prefixes are searched in order; the first one providing the package wins.
#[derive(Debug, Clone, Default)]
pub struct AmentIndex {
    prefixes: Vec<PathBuf>,
}

impl AmentIndex {
    /// Environment variable listing install prefixes.
    pub const PREFIX_PATH_VAR: &'static str = "AMENT_PREFIX_PATH";

    /// Index over explicit prefixes.
    pub fn new<I, P>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        AmentIndex {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Index over the prefixes in `AMENT_PREFIX_PATH`.
    ///
    /// An unset variable yields an empty index in which every package is
    /// unknown.
    pub fn from_env() -> Self {
        let prefixes = env::var_os(Self::PREFIX_PATH_VAR)
            .map(|value| {
                env::split_paths(&value)
                    .filter(|p| !p.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();
        AmentIndex { prefixes }
    }

    /// Configured prefixes in search order.
    pub fn prefixes(&self) -> &[PathBuf] {
        &self.prefixes
    }

    fn package_marker(prefix: &Path, package: &str) -> PathBuf {
        prefix
            .join("share")
            .join("ament_index")
            .join("resource_index")
            .join("packages")
            .join(package)
    }

    fn definition_path(
        &self,
        package_resource_name: &str,
        format: DefinitionFormat,
    ) -> DefinitionResult<PathBuf> {
        let (package, type_name) = parse_resource_name(package_resource_name)?;
        let share_dir = self.resolve(package)?;
        Ok(share_dir
            .join("msg")
            .join(format!("{}.{}", type_name, format.extension())))
    }
}

impl DefinitionSource for AmentIndex {
    fn resolve(&self, package: &str) -> DefinitionResult<PathBuf> {
        self.prefixes
            .iter()
            .find(|prefix| Self::package_marker(prefix, package).exists())
            .map(|prefix| prefix.join("share").join(package))
            .ok_or_else(|| DefinitionError::PackageNotFound(package.to_string()))
    }

    fn definition_exists(&self, package_resource_name: &str) -> DefinitionResult<bool> {
        let path = self.definition_path(package_resource_name, DefinitionFormat::Msg)?;
        Ok(path.is_file())
    }

    fn read_definition_text(
        &self,
        package_resource_name: &str,
        format: DefinitionFormat,
    ) -> DefinitionResult<String> {
        let path = match self.definition_path(package_resource_name, format) {
            Ok(path) => path,
            Err(DefinitionError::PackageNotFound(_)) => {
                return Err(DefinitionError::DefinitionNotFound(
                    package_resource_name.to_string(),
                ))
            }
            Err(e) => return Err(e),
        };
        std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                DefinitionError::DefinitionNotFound(package_resource_name.to_string())
            }
            _ => DefinitionError::Io(e),
        })
    }
}

// ============================================================================
// In-memory definitions
// ============================================================================

/// Definitions held in memory, keyed by dialect, package and type.
///
/// `pkg/Type` and `pkg/msg/Type` name the same entry. Every call to
/// `read_definition_text` is counted, hit or miss.
#[derive(Debug, Default)]
pub struct InMemoryDefinitions {
    definitions: BTreeMap<(DefinitionFormat, String, String), String>,
    packages: BTreeSet<String>,
    reads: AtomicUsize,
}

impl InMemoryDefinitions {
    /// Empty set of definitions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a definition.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::InvalidIdentifier`] for a malformed name.
    pub fn insert(
        &mut self,
        format: DefinitionFormat,
        package_resource_name: &str,
        text: impl Into<String>,
    ) -> DefinitionResult<()> {
        let (package, type_name) = parse_resource_name(package_resource_name)?;
        self.packages.insert(package.to_string());
        self.definitions.insert(
            (format, package.to_string(), type_name.to_string()),
            text.into(),
        );
        Ok(())
    }

    /// Add a `.msg` definition (builder pattern). Malformed names are ignored.
    pub fn with_msg(mut self, package_resource_name: &str, text: impl Into<String>) -> Self {
        if let Err(e) = self.insert(DefinitionFormat::Msg, package_resource_name, text) {
            tracing::warn!(error = %e, "Ignoring in-memory definition");
        }
        self
    }

    /// Add an `.idl` definition (builder pattern). Malformed names are ignored.
    pub fn with_idl(mut self, package_resource_name: &str, text: impl Into<String>) -> Self {
        if let Err(e) = self.insert(DefinitionFormat::Idl, package_resource_name, text) {
            tracing::warn!(error = %e, "Ignoring in-memory definition");
        }
        self
    }

    /// Number of `read_definition_text` calls served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    fn lookup(
        &self,
        format: DefinitionFormat,
        package_resource_name: &str,
    ) -> DefinitionResult<Option<&String>> {
        let (package, type_name) = parse_resource_name(package_resource_name)?;
        Ok(self
            .definitions
            .get(&(format, package.to_string(), type_name.to_string())))
    }
}

impl DefinitionSource for InMemoryDefinitions {
    fn resolve(&self, package: &str) -> DefinitionResult<PathBuf> {
        if self.packages.contains(package) {
            Ok(PathBuf::from(package))
        } else {
            Err(DefinitionError::PackageNotFound(package.to_string()))
        }
    }

    fn definition_exists(&self, package_resource_name: &str) -> DefinitionResult<bool> {
        let (package, _) = parse_resource_name(package_resource_name)?;
        self.resolve(package)?;
        Ok(self
            .lookup(DefinitionFormat::Msg, package_resource_name)?
            .is_some())
    }

    fn read_definition_text(
        &self,
        package_resource_name: &str,
        format: DefinitionFormat,
    ) -> DefinitionResult<String> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.lookup(format, package_resource_name)?
            .cloned()
            .ok_or_else(|| DefinitionError::DefinitionNotFound(package_resource_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn install(prefix: &Path, package: &str, file: &str, text: &str) {
        let marker_dir = prefix.join("share/ament_index/resource_index/packages");
        std::fs::create_dir_all(&marker_dir).unwrap();
        std::fs::write(marker_dir.join(package), "").unwrap();
        let msg_dir = prefix.join("share").join(package).join("msg");
        std::fs::create_dir_all(&msg_dir).unwrap();
        std::fs::write(msg_dir.join(file), text).unwrap();
    }

    #[test]
    fn test_parse_resource_name_forms() {
        assert_eq!(parse_resource_name("std_msgs/String").unwrap(), ("std_msgs", "String"));
        assert_eq!(
            parse_resource_name("std_msgs/msg/String").unwrap(),
            ("std_msgs", "String")
        );
    }

    #[test]
    fn test_parse_resource_name_rejects_malformed() {
        for name in ["String", "std_msgs/srv/Trigger", "a/b/c/d", "bad-pkg/Type", ""] {
            assert!(
                matches!(
                    parse_resource_name(name),
                    Err(DefinitionError::InvalidIdentifier(_))
                ),
                "{} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_ament_index_reads_msg_and_idl() {
        let dir = TempDir::new().unwrap();
        install(dir.path(), "pkg_a", "Foo.msg", "int32 x\n");
        install(dir.path(), "pkg_a", "Bar.idl", "module pkg_a {};\n");
        let index = AmentIndex::new([dir.path()]);

        assert_eq!(index.resolve("pkg_a").unwrap(), dir.path().join("share/pkg_a"));
        assert!(index.definition_exists("pkg_a/msg/Foo").unwrap());
        assert!(!index.definition_exists("pkg_a/Bar").unwrap());
        assert_eq!(
            index
                .read_definition_text("pkg_a/Foo", DefinitionFormat::Msg)
                .unwrap(),
            "int32 x\n"
        );
        assert_eq!(
            index
                .read_definition_text("pkg_a/msg/Bar", DefinitionFormat::Idl)
                .unwrap(),
            "module pkg_a {};\n"
        );
    }

    #[test]
    fn test_ament_index_missing_package_and_definition() {
        let dir = TempDir::new().unwrap();
        install(dir.path(), "pkg_a", "Foo.msg", "int32 x\n");
        let index = AmentIndex::new([dir.path()]);

        assert!(matches!(
            index.resolve("pkg_missing"),
            Err(DefinitionError::PackageNotFound(_))
        ));
        assert!(matches!(
            index.definition_exists("pkg_missing/Foo"),
            Err(DefinitionError::PackageNotFound(_))
        ));
        assert!(matches!(
            index.read_definition_text("pkg_a/Nope", DefinitionFormat::Msg),
            Err(DefinitionError::DefinitionNotFound(name)) if name == "pkg_a/Nope"
        ));
        assert!(matches!(
            index.read_definition_text("pkg_missing/Foo", DefinitionFormat::Msg),
            Err(DefinitionError::DefinitionNotFound(_))
        ));
    }

    #[test]
    fn test_ament_index_first_prefix_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        install(first.path(), "pkg", "Foo.msg", "int32 first\n");
        install(second.path(), "pkg", "Foo.msg", "int32 second\n");
        let index = AmentIndex::new([first.path(), second.path()]);
        assert_eq!(
            index
                .read_definition_text("pkg/Foo", DefinitionFormat::Msg)
                .unwrap(),
            "int32 first\n"
        );
    }

    #[test]
    fn test_in_memory_counts_reads() {
        let defs = InMemoryDefinitions::new().with_msg("pkg/Foo", "int32 x\n");
        assert!(defs.definition_exists("pkg/msg/Foo").unwrap());
        assert_eq!(defs.reads(), 0);
        assert!(defs
            .read_definition_text("pkg/Foo", DefinitionFormat::Msg)
            .is_ok());
        assert!(defs
            .read_definition_text("pkg/Foo", DefinitionFormat::Idl)
            .is_err());
        assert_eq!(defs.reads(), 2);
    }
}
