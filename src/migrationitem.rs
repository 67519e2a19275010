// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! Migration items: one candidate action on the target suite, either the
//! migration of a source (or of the binaries of one architecture) or a
//! removal.

use std::cmp::Ordering;
use std::fmt::{self, Display};

use debian_archive_utils::{architectures::Architecture, version::PackageVersion};
use thiserror::Error;

use crate::suites::{BinaryPackageId, SuiteRef, Suites};

/// Errors when parsing a migration item from its textual form.
#[derive(Clone, Debug, Error)]
pub enum ItemParseError {
    /// The item does not follow `package[/architecture]/version`
    #[error("malformed migration item: {0}")]
    Malformed(String),
    /// The given architecture is not valid
    #[error("invalid architecture in migration item: {0}")]
    InvalidArchitecture(String),
    /// The given version is not valid
    #[error("invalid version in migration item: {0}")]
    InvalidVersion(String),
    /// The suite alias is not known
    #[error("unknown suite alias in migration item: {0}")]
    UnknownSuite(String),
    /// The version was omitted and could not be resolved from the suite
    #[error("cannot determine version for migration item: {0}")]
    UnknownVersion(String),
}

/// A single candidate action.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MigrationItem {
    /// The source package name
    pub package: String,
    /// The version to act on
    pub version: PackageVersion,
    /// `Source` for whole-source items, a concrete architecture otherwise
    pub architecture: Architecture,
    /// The suite the item migrates from (the target suite for removals)
    pub suite: SuiteRef,
    /// Suffix identifying non-primary source suites in item names
    pub suite_suffix: String,
    /// Whether the item removes the package from the target suite
    pub is_removal: bool,
    /// Whether the removal was generated for a cruft binary
    pub is_cruft_removal: bool,
}

impl MigrationItem {
    fn base_name(&self) -> String {
        if self.suite_suffix.is_empty() {
            self.package.clone()
        } else {
            format!("{}_{}", self.package, self.suite_suffix)
        }
    }

    /// Unversioned name, e.g. `zathura` or `zathura/amd64`.
    pub fn uvname(&self) -> String {
        if self.architecture.is_source() {
            self.base_name()
        } else {
            format!("{}/{}", self.base_name(), self.architecture)
        }
    }

    /// Full name, e.g. `zathura/1.0-1`, with a `-` prefix for removals.
    pub fn name(&self) -> String {
        let prefix = if self.is_removal { "-" } else { "" };
        format!("{}{}/{}", prefix, self.uvname(), self.version)
    }
}

impl Display for MigrationItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl PartialOrd for MigrationItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MigrationItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.uvname()
            .cmp(&other.uvname())
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.is_removal.cmp(&other.is_removal))
    }
}

/// Build a removal item for a cruft binary in the target suite.
pub fn removal_for_cruft_item(pkg_id: &BinaryPackageId) -> MigrationItem {
    MigrationItem {
        package: pkg_id.package_name.clone(),
        version: pkg_id.version.clone(),
        architecture: pkg_id.architecture,
        suite: SuiteRef::Target,
        suite_suffix: String::new(),
        is_removal: true,
        is_cruft_removal: true,
    }
}

/// Parse a migration item such as `zathura/1.0-1`, `zathura/amd64/1.0-1` or
/// `-obsolete/1.0-1`.
///
/// With `auto_correct`, the version may be omitted and is looked up in the
/// relevant suite. Additional source suites are addressed by suffixing the
/// package with the suite alias (`zathura_tpu/1.0-1`).
pub fn parse_item(
    suites: &Suites,
    input: &str,
    auto_correct: bool,
) -> Result<MigrationItem, ItemParseError> {
    let (is_removal, rest) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };
    if rest.is_empty() {
        return Err(ItemParseError::Malformed(input.to_owned()));
    }

    let parts: Vec<&str> = rest.split('/').collect();
    let (pkg_part, architecture, version_str) = match parts.as_slice() {
        [pkg] => (*pkg, Architecture::Source, None),
        [pkg, version] => {
            // `pkg/arch` (with auto correction) or `pkg/version`
            if let Ok(arch) = Architecture::try_from(*version) {
                (*pkg, arch, None)
            } else {
                (*pkg, Architecture::Source, Some(*version))
            }
        }
        [pkg, arch, version] => {
            let arch = Architecture::try_from(*arch)
                .map_err(|_| ItemParseError::InvalidArchitecture((*arch).to_owned()))?;
            (*pkg, arch, Some(*version))
        }
        _ => return Err(ItemParseError::Malformed(input.to_owned())),
    };
    if architecture.is_all() {
        return Err(ItemParseError::InvalidArchitecture("all".to_owned()));
    }

    // package names cannot contain underscores, so a suffix unambiguously
    // addresses a non-primary suite
    let (package, suite, suite_suffix) = match pkg_part.split_once('_') {
        Some((package, alias)) => {
            let suite = suites
                .by_name_or_alias(alias)
                .ok_or_else(|| ItemParseError::UnknownSuite(alias.to_owned()))?;
            (package.to_owned(), suite, alias.to_owned())
        }
        None => {
            let suite = if is_removal {
                SuiteRef::Target
            } else {
                SuiteRef::Source(0)
            };
            (pkg_part.to_owned(), suite, String::new())
        }
    };

    let version = match version_str {
        Some(version) => PackageVersion::try_from(version)
            .map_err(|_| ItemParseError::InvalidVersion(version.to_owned()))?,
        None => {
            if !auto_correct {
                return Err(ItemParseError::UnknownVersion(input.to_owned()));
            }
            suites
                .get(suite)
                .sources
                .get(&package)
                .map(|src| src.version.clone())
                .ok_or_else(|| ItemParseError::UnknownVersion(input.to_owned()))?
        }
    };

    Ok(MigrationItem {
        package,
        version,
        architecture,
        suite,
        suite_suffix,
        is_removal,
        is_cruft_removal: false,
    })
}

/// Parse a whitespace separated list of items.
pub fn parse_items(
    suites: &Suites,
    inputs: &[&str],
    auto_correct: bool,
) -> Result<Vec<MigrationItem>, ItemParseError> {
    inputs
        .iter()
        .map(|input| parse_item(suites, input, auto_correct))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::suites::{Suite, SuiteClass};
    use std::path::PathBuf;

    fn suites() -> Suites {
        let archs = [Architecture::Amd64];
        Suites {
            target: Suite::new(SuiteClass::Target, "testing", PathBuf::new(), "", &archs),
            sources: vec![
                Suite::new(
                    SuiteClass::PrimarySource,
                    "unstable",
                    PathBuf::new(),
                    "",
                    &archs,
                ),
                Suite::new(
                    SuiteClass::AdditionalSource,
                    "tpu",
                    PathBuf::new(),
                    "tpu",
                    &archs,
                ),
            ],
        }
    }

    #[test]
    fn parse_source_item() {
        let suites = suites();
        let item = parse_item(&suites, "zathura/1.0-1", false).unwrap();
        assert_eq!(item.package, "zathura");
        assert_eq!(item.architecture, Architecture::Source);
        assert_eq!(item.suite, SuiteRef::Source(0));
        assert!(!item.is_removal);
        assert_eq!(item.uvname(), "zathura");
        assert_eq!(item.name(), "zathura/1.0-1");
    }

    #[test]
    fn parse_srcarch_item() {
        let suites = suites();
        let item = parse_item(&suites, "zathura/amd64/1.0-1", false).unwrap();
        assert_eq!(item.architecture, Architecture::Amd64);
        assert_eq!(item.uvname(), "zathura/amd64");
    }

    #[test]
    fn parse_removal() {
        let suites = suites();
        let item = parse_item(&suites, "-zathura/1.0-1", false).unwrap();
        assert!(item.is_removal);
        assert_eq!(item.suite, SuiteRef::Target);
        assert_eq!(item.name(), "-zathura/1.0-1");
    }

    #[test]
    fn parse_suffixed_item() {
        let suites = suites();
        let item = parse_item(&suites, "zathura_tpu/1.0-1", false).unwrap();
        assert_eq!(item.suite, SuiteRef::Source(1));
        assert_eq!(item.uvname(), "zathura_tpu");
    }

    #[test]
    fn parse_errors() {
        let suites = suites();
        assert!(parse_item(&suites, "", false).is_err());
        assert!(parse_item(&suites, "zathura/notaversion!", false).is_err());
        assert!(parse_item(&suites, "zathura_nosuite/1.0", false).is_err());
        assert!(parse_item(&suites, "zathura", false).is_err());
    }

    #[test]
    fn ordering_is_by_uvname() {
        let suites = suites();
        let a = parse_item(&suites, "aalib/1.0", false).unwrap();
        let b = parse_item(&suites, "zathura/0.1", false).unwrap();
        assert!(a < b);
    }
}
