// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! The typed model of the suites under consideration: sources, per
//! architecture binaries and the provides tables of the target suite and the
//! source suites.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::{self, Display};
use std::path::PathBuf;

use anyhow::{bail, Result};
use debian_archive_utils::{
    architectures::Architecture, package::MultiArch, relations::RelationClause,
    version::PackageVersion,
};
use log::{error, info};

/// Class of a suite within a migration run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SuiteClass {
    /// The suite packages migrate into
    Target,
    /// The primary suite packages migrate from
    PrimarySource,
    /// An additional source suite (proposed-updates style)
    AdditionalSource,
}

impl SuiteClass {
    /// Whether this is a source suite.
    pub fn is_source(self) -> bool {
        !matches!(self, SuiteClass::Target)
    }

    /// Whether this is the target suite.
    pub fn is_target(self) -> bool {
        matches!(self, SuiteClass::Target)
    }

    /// Whether this is the primary source suite.
    pub fn is_primary_source(self) -> bool {
        matches!(self, SuiteClass::PrimarySource)
    }

    /// Whether this is an additional source suite.
    pub fn is_additional_source(self) -> bool {
        matches!(self, SuiteClass::AdditionalSource)
    }
}

/// Cheap handle identifying a suite within [Suites].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SuiteRef {
    /// The target suite
    Target,
    /// A source suite, by position (0 is the primary source suite)
    Source(usize),
}

/// Identifier of a source or binary package.
///
/// Binary package ids never use [Architecture::All]; arch:all binaries are
/// expanded into one id per concrete architecture. Source ids use
/// [Architecture::Source].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId {
    /// The package name
    pub package_name: String,
    /// The package version
    pub version: PackageVersion,
    /// The architecture; `Source` for source packages
    pub architecture: Architecture,
}

/// A [PackageId] that refers to a binary package.
pub type BinaryPackageId = PackageId;

impl PackageId {
    /// Id of a source package.
    pub fn source(package_name: &str, version: PackageVersion) -> Self {
        Self {
            package_name: package_name.to_owned(),
            version,
            architecture: Architecture::Source,
        }
    }

    /// Id of a binary package on a concrete architecture.
    pub fn binary(package_name: &str, version: PackageVersion, architecture: Architecture) -> Self {
        assert!(
            !architecture.is_all() && !architecture.is_source(),
            "binary package id {}/{} must use a concrete architecture",
            package_name,
            version
        );
        Self {
            package_name: package_name.to_owned(),
            version,
            architecture,
        }
    }

    /// Full name, e.g. `zathura/1.0-1` or `zathura/1.0-1/amd64`.
    pub fn name(&self) -> String {
        if self.architecture.is_source() {
            format!("{}/{}", self.package_name, self.version)
        } else {
            format!("{}/{}/{}", self.package_name, self.version, self.architecture)
        }
    }

    /// Unversioned name, e.g. `zathura` or `zathura/amd64`.
    pub fn uvname(&self) -> String {
        if self.architecture.is_source() {
            self.package_name.clone()
        } else {
            format!("{}/{}", self.package_name, self.architecture)
        }
    }
}

impl Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A source package record of one suite.
#[derive(Clone, Debug)]
pub struct SourcePackage {
    /// The source package name
    pub source: String,
    /// The current version in the suite
    pub version: PackageVersion,
    /// The section, `faux` for synthesised records
    pub section: String,
    /// Ids of the binaries built by this source in the suite
    pub binaries: HashSet<BinaryPackageId>,
    /// The maintainer, with the email address stripped on demand
    pub maintainer: Option<String>,
    /// Whether the record was synthesised (faux packages, unknown sources)
    pub is_fakesrc: bool,
    /// Raw `Build-Depends` merged with `Build-Depends-Arch`
    pub build_deps_arch: Option<String>,
    /// Raw `Build-Depends-Indep`
    pub build_deps_indep: Option<String>,
    /// The `Testsuite` entries
    pub testsuite: Vec<String>,
    /// The `Testsuite-Triggers` entries
    pub testsuite_triggers: Vec<String>,
}

/// A provider entry of the provides table.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Provider {
    /// Name of the providing binary package
    pub package: String,
    /// The provided version, if the provides is versioned
    pub version: Option<PackageVersion>,
}

/// A binary package record of one suite.
#[derive(Clone, Debug)]
pub struct BinaryPackage {
    /// The binary version
    pub version: PackageVersion,
    /// The section
    pub section: Option<String>,
    /// Name of the source package that built this binary
    pub source: String,
    /// Version of the source package that built this binary
    pub source_version: PackageVersion,
    /// The declared architecture; `All` for arch independent packages
    pub architecture: Architecture,
    /// The multi-arch value
    pub multi_arch: MultiArch,
    /// Parsed `Depends` (with `Pre-Depends` merged in)
    pub depends: Vec<RelationClause>,
    /// Parsed `Conflicts` (with `Breaks` merged in)
    pub conflicts: Vec<RelationClause>,
    /// Parsed `Provides` entries
    pub provides: Vec<Provider>,
    /// Whether the package is `Essential: yes`
    pub is_essential: bool,
    /// The package id (with the concrete architecture)
    pub pkg_id: BinaryPackageId,
    /// Parsed `Built-Using` entries
    pub built_using: Vec<(String, PackageVersion)>,
}

/// Sources, binaries and provides of a single suite.
#[derive(Debug)]
pub struct Suite {
    /// The class of the suite
    pub suite_class: SuiteClass,
    /// The name, updated from the Release file when available
    pub name: String,
    /// The on-disk location
    pub path: PathBuf,
    /// Short name used as an item suffix for additional source suites
    pub suite_short_name: String,
    /// The source packages
    pub sources: HashMap<String, SourcePackage>,
    /// The binary packages per architecture
    pub binaries: HashMap<Architecture, HashMap<String, BinaryPackage>>,
    /// The provides table per architecture
    pub provides_table: HashMap<Architecture, HashMap<String, BTreeSet<Provider>>>,
}

impl Suite {
    /// Create an empty suite.
    pub fn new(
        suite_class: SuiteClass,
        name: &str,
        path: PathBuf,
        suite_short_name: &str,
        architectures: &[Architecture],
    ) -> Self {
        Self {
            suite_class,
            name: name.to_owned(),
            path,
            suite_short_name: suite_short_name.to_owned(),
            sources: HashMap::new(),
            binaries: architectures
                .iter()
                .map(|&arch| (arch, HashMap::new()))
                .collect(),
            provides_table: architectures
                .iter()
                .map(|&arch| (arch, HashMap::new()))
                .collect(),
        }
    }

    /// Suffix appended to item names of this suite.
    pub fn excuses_suffix(&self) -> &str {
        &self.suite_short_name
    }

    /// Check if the binary is cruft in this suite, i.e. no longer built by
    /// the current version of its source. The package is assumed to be in
    /// the suite.
    pub fn is_cruft(&self, pkg: &BinaryPackage) -> bool {
        self.sources[&pkg.source].version != pkg.source_version
    }

    /// Test if a package id is currently in the suite.
    pub fn is_pkg_in_suite(&self, pkg_id: &BinaryPackageId) -> bool {
        self.binaries
            .get(&pkg_id.architecture)
            .and_then(|packages| packages.get(&pkg_id.package_name))
            .is_some_and(|pkg| pkg.version == pkg_id.version)
    }

    /// Test if at least one package of the given set is in the suite.
    pub fn any_of_these_are_in_the_suite<'a>(
        &self,
        pkgs: impl IntoIterator<Item = &'a BinaryPackageId>,
    ) -> bool {
        pkgs.into_iter().any(|pkg_id| self.is_pkg_in_suite(pkg_id))
    }

    /// Insert a binary package, updating the provides table.
    pub fn insert_binary(&mut self, pkg: BinaryPackage) {
        let arch = pkg.pkg_id.architecture;
        let provides = self.provides_table.entry(arch).or_default();
        for provider in &pkg.provides {
            provides
                .entry(provider.package.clone())
                .or_default()
                .insert(Provider {
                    package: pkg.pkg_id.package_name.clone(),
                    version: provider.version.clone(),
                });
        }
        self.binaries
            .entry(arch)
            .or_default()
            .insert(pkg.pkg_id.package_name.clone(), pkg);
    }

    /// Remove a binary package, updating the provides table. Returns the
    /// removed record.
    pub fn remove_binary(&mut self, pkg_id: &BinaryPackageId) -> Option<BinaryPackage> {
        let packages = self.binaries.get_mut(&pkg_id.architecture)?;
        let pkg = packages.get(&pkg_id.package_name)?;
        if pkg.version != pkg_id.version {
            return None;
        }
        let pkg = packages.remove(&pkg_id.package_name)?;
        if let Some(provides) = self.provides_table.get_mut(&pkg_id.architecture) {
            for provider in &pkg.provides {
                if let Some(entries) = provides.get_mut(&provider.package) {
                    entries.retain(|entry| entry.package != pkg_id.package_name);
                    if entries.is_empty() {
                        provides.remove(&provider.package);
                    }
                }
            }
        }
        Some(pkg)
    }

    /// Validate the source/binary cross references of the suite.
    ///
    /// Logs every inconsistency found and fails if there was any.
    pub fn check_suite_source_pkg_consistency(&self, comment: &str) -> Result<()> {
        let mut issues_found = false;

        info!("check_suite_source_pkg_consistency {} ({})", self.name, comment);

        for (arch, packages) in &self.binaries {
            for (pkg_name, pkg) in packages {
                if !self.sources.contains_key(&pkg.source) {
                    issues_found = true;
                    error!(
                        "inconsistency found ({}): src {} not in {}, which has pkg {}/{}",
                        comment, pkg.source, self.name, pkg_name, arch
                    );
                }
            }
        }

        for (src, source_data) in &self.sources {
            for pkg_id in &source_data.binaries {
                let known = self
                    .binaries
                    .get(&pkg_id.architecture)
                    .is_some_and(|packages| packages.contains_key(&pkg_id.package_name));
                if !known {
                    issues_found = true;
                    error!(
                        "inconsistency found ({}): binary {} from source {} not in binaries[{}]",
                        comment, pkg_id.package_name, src, pkg_id.architecture
                    );
                }
            }
        }

        if issues_found {
            bail!("inconsistencies found in suite {}", self.name);
        }
        Ok(())
    }
}

/// The set of suites of a migration run.
#[derive(Debug)]
pub struct Suites {
    /// The target suite
    pub target: Suite,
    /// The source suites, primary first
    pub sources: Vec<Suite>,
}

impl Suites {
    /// The primary source suite.
    pub fn primary_source_suite(&self) -> &Suite {
        &self.sources[0]
    }

    /// The additional source suites.
    pub fn additional_source_suites(&self) -> &[Suite] {
        &self.sources[1..]
    }

    /// Resolve a suite reference.
    pub fn get(&self, suite: SuiteRef) -> &Suite {
        match suite {
            SuiteRef::Target => &self.target,
            SuiteRef::Source(index) => &self.sources[index],
        }
    }

    /// Resolve a suite reference mutably.
    pub fn get_mut(&mut self, suite: SuiteRef) -> &mut Suite {
        match suite {
            SuiteRef::Target => &mut self.target,
            SuiteRef::Source(index) => &mut self.sources[index],
        }
    }

    /// Find a suite by name or short name.
    pub fn by_name_or_alias(&self, name: &str) -> Option<SuiteRef> {
        if self.target.name == name || self.target.suite_short_name == name {
            return Some(SuiteRef::Target);
        }
        self.sources
            .iter()
            .position(|suite| {
                suite.name == name
                    || (!suite.suite_short_name.is_empty() && suite.suite_short_name == name)
            })
            .map(SuiteRef::Source)
    }

}

#[cfg(test)]
mod test {
    use super::*;

    fn version(s: &str) -> PackageVersion {
        PackageVersion::try_from(s).unwrap()
    }

    fn binary(name: &str, ver: &str, source: &str, srcver: &str) -> BinaryPackage {
        BinaryPackage {
            version: version(ver),
            section: Some("devel".to_owned()),
            source: source.to_owned(),
            source_version: version(srcver),
            architecture: Architecture::Amd64,
            multi_arch: MultiArch::No,
            depends: vec![],
            conflicts: vec![],
            provides: vec![],
            is_essential: false,
            pkg_id: PackageId::binary(name, version(ver), Architecture::Amd64),
            built_using: vec![],
        }
    }

    fn source_package(name: &str, ver: &str) -> SourcePackage {
        SourcePackage {
            source: name.to_owned(),
            version: version(ver),
            section: "devel".to_owned(),
            binaries: HashSet::new(),
            maintainer: None,
            is_fakesrc: false,
            build_deps_arch: None,
            build_deps_indep: None,
            testsuite: vec![],
            testsuite_triggers: vec![],
        }
    }

    #[test]
    fn package_id_names() {
        let src = PackageId::source("green", version("2"));
        assert_eq!(src.name(), "green/2");
        assert_eq!(src.uvname(), "green");

        let bin = PackageId::binary("libgreen1", version("2"), Architecture::Amd64);
        assert_eq!(bin.name(), "libgreen1/2/amd64");
        assert_eq!(bin.uvname(), "libgreen1/amd64");
    }

    #[test]
    #[should_panic]
    fn no_arch_all_binary_ids() {
        PackageId::binary("libgreen1", version("2"), Architecture::All);
    }

    #[test]
    fn cruft_detection() {
        let mut suite = Suite::new(
            SuiteClass::Target,
            "testing",
            PathBuf::new(),
            "",
            &[Architecture::Amd64],
        );
        suite
            .sources
            .insert("green".to_owned(), source_package("green", "2"));
        let old = binary("libgreen1", "1", "green", "1");
        assert!(suite.is_cruft(&old));
        let new = binary("libgreen1", "2", "green", "2");
        assert!(!suite.is_cruft(&new));
    }

    #[test]
    fn insert_and_remove_maintain_provides() {
        let mut suite = Suite::new(
            SuiteClass::Target,
            "testing",
            PathBuf::new(),
            "",
            &[Architecture::Amd64],
        );
        let mut pkg = binary("default-mta", "1", "mta", "1");
        pkg.provides = vec![Provider {
            package: "mail-transport-agent".to_owned(),
            version: None,
        }];
        let pkg_id = pkg.pkg_id.clone();
        suite.insert_binary(pkg);
        assert!(suite.provides_table[&Architecture::Amd64].contains_key("mail-transport-agent"));

        assert!(suite.remove_binary(&pkg_id).is_some());
        assert!(!suite.provides_table[&Architecture::Amd64].contains_key("mail-transport-agent"));
        // removing again is a no-op
        assert!(suite.remove_binary(&pkg_id).is_none());
    }

    #[test]
    fn consistency_check() {
        let mut suite = Suite::new(
            SuiteClass::Target,
            "testing",
            PathBuf::new(),
            "",
            &[Architecture::Amd64],
        );
        suite
            .sources
            .insert("green".to_owned(), source_package("green", "1"));
        let pkg = binary("green", "1", "green", "1");
        let pkg_id = pkg.pkg_id.clone();
        suite.insert_binary(pkg);
        suite
            .sources
            .get_mut("green")
            .unwrap()
            .binaries
            .insert(pkg_id);
        assert!(suite.check_suite_source_pkg_consistency("test").is_ok());

        // orphan the binary
        suite.sources.remove("green");
        assert!(suite.check_suite_source_pkg_consistency("test").is_err());
    }
}
