// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! Parsing, validation and storage of user supplied hints.
//!
//! Hints are read from per-user files with one directive per line. The parser
//! is parameterised by per-user permission lists; invalid or unauthorised
//! hints are reported and skipped, never guessed.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::{self, Display};

use debian_archive_utils::{
    architectures::Architecture, package::PackageName, version::PackageVersion,
};
use log::warn;

use crate::suites::{SuiteRef, Suites};

/// Hints that trusted helpers may use.
pub const HINTS_HELPERS: &[&str] = &[
    "easy",
    "hint",
    "remove",
    "block",
    "block-udeb",
    "unblock",
    "unblock-udeb",
    "approve",
    "ignore-piuparts",
    "ignore-rc-bugs",
];

/// Hints of the standard permission set.
pub const HINTS_STANDARD: &[&str] = &[
    "easy",
    "hint",
    "remove",
    "block",
    "block-udeb",
    "unblock",
    "unblock-udeb",
    "approve",
    "ignore-piuparts",
    "ignore-rc-bugs",
    "urgent",
    "age-days",
];

/// One package reference of a hint, e.g. `zathura/1.0-1` or `zathura/amd64/1.0-1`.
///
/// Unlike migration items, the version is optional; a hint without version
/// applies to any version.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HintTarget {
    /// The package name
    pub package: String,
    /// The version the hint applies to, if restricted
    pub version: Option<PackageVersion>,
    /// The architecture, `Source` if not restricted
    pub architecture: Architecture,
    /// The suite addressed by the hint
    pub suite: SuiteRef,
    /// Alias suffix for non-primary source suites
    pub suite_suffix: String,
    /// Whether the hint asks for a removal
    pub is_removal: bool,
}

impl HintTarget {
    fn parse(suites: &Suites, token: &str) -> Result<Self, String> {
        let (is_removal, rest) = match token.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        if rest.is_empty() {
            return Err(format!("empty package reference in '{}'", token));
        }

        let parts: Vec<&str> = rest.split('/').collect();
        let (pkg_part, architecture, version) = match parts.as_slice() {
            [pkg] => (*pkg, Architecture::Source, None),
            [pkg, second] => match Architecture::try_from(*second) {
                Ok(arch) => (*pkg, arch, None),
                Err(_) => {
                    let version = PackageVersion::try_from(*second)
                        .map_err(|_| format!("invalid version in '{}'", token))?;
                    (*pkg, Architecture::Source, Some(version))
                }
            },
            [pkg, arch, version] => {
                let arch = Architecture::try_from(*arch)
                    .map_err(|_| format!("invalid architecture in '{}'", token))?;
                let version = PackageVersion::try_from(*version)
                    .map_err(|_| format!("invalid version in '{}'", token))?;
                (*pkg, arch, Some(version))
            }
            _ => return Err(format!("malformed package reference '{}'", token)),
        };

        let (package, suite, suite_suffix) = match pkg_part.split_once('_') {
            Some((package, alias)) => {
                let suite = suites
                    .by_name_or_alias(alias)
                    .ok_or_else(|| format!("unknown suite alias in '{}'", token))?;
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
        if PackageName::try_from(package.as_str()).is_err() {
            return Err(format!("invalid package name in '{}'", token));
        }

        Ok(HintTarget {
            package,
            version,
            architecture,
            suite,
            suite_suffix,
            is_removal,
        })
    }

    /// Render the target the way it was written.
    pub fn name(&self) -> String {
        let mut out = String::new();
        if self.is_removal {
            out.push('-');
        }
        out.push_str(&self.package);
        if !self.suite_suffix.is_empty() {
            out.push('_');
            out.push_str(&self.suite_suffix);
        }
        if !self.architecture.is_source() {
            out.push('/');
            out.push_str(self.architecture.as_str());
        }
        if let Some(version) = &self.version {
            out.push('/');
            out.push_str(&version.to_string());
        }
        out
    }
}

/// The policy parameter of parameterised hints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HintParameter {
    /// Number of days (`age-days`)
    Days(u32),
    /// A set of bug numbers (`ignore-rc-bugs`)
    Bugs(BTreeSet<String>),
}

impl Display for HintParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HintParameter::Days(days) => write!(f, "{}", days),
            HintParameter::Bugs(bugs) => {
                write!(f, "{}", bugs.iter().cloned().collect::<Vec<_>>().join(","))
            }
        }
    }
}

/// A parsed, validated hint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hint {
    /// The user that issued the hint
    pub user: String,
    /// The canonical hint type
    pub hint_type: &'static str,
    /// The packages the hint applies to
    pub targets: Vec<HintTarget>,
    /// The policy parameter of parameterised hints
    pub parameter: Option<HintParameter>,
    /// Whether the hint is active; overridden hints are deactivated
    pub active: bool,
}

impl Hint {
    /// The package of single-package hints.
    pub fn package(&self) -> &str {
        &self.targets[0].package
    }

    /// The version of single-package hints.
    pub fn version(&self) -> Option<&PackageVersion> {
        self.targets[0].version.as_ref()
    }

    /// The architecture of single-package hints.
    pub fn architecture(&self) -> Architecture {
        self.targets[0].architecture
    }

    /// The days parameter of `age-days` hints.
    pub fn days(&self) -> Option<u32> {
        match self.parameter {
            Some(HintParameter::Days(days)) => Some(days),
            _ => None,
        }
    }

    /// The ignored bugs of `ignore-rc-bugs` hints.
    pub fn ignored_bugs(&self) -> Option<&BTreeSet<String>> {
        match &self.parameter {
            Some(HintParameter::Bugs(bugs)) => Some(bugs),
            _ => None,
        }
    }
}

impl Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hint_type)?;
        if let Some(parameter) = &self.parameter {
            write!(f, " {}", parameter)?;
        }
        for target in &self.targets {
            write!(f, " {}", target.name())?;
        }
        Ok(())
    }
}

/// Expanded hint permissions of one user.
#[derive(Clone, Debug, Default)]
pub struct Permissions {
    all: bool,
    allowed: HashSet<String>,
}

impl Permissions {
    /// Permissions allowing every hint type.
    pub fn all() -> Self {
        Self {
            all: true,
            allowed: HashSet::new(),
        }
    }

    /// Expand a raw permission list, resolving the `ALL`, `STANDARD` and
    /// `HELPERS` macros.
    pub fn expand(tokens: &[String]) -> Self {
        let mut permissions = Permissions::default();
        for token in tokens {
            match token.as_str() {
                "ALL" => permissions.all = true,
                "STANDARD" => permissions
                    .allowed
                    .extend(HINTS_STANDARD.iter().map(|s| s.to_string())),
                "HELPERS" => permissions
                    .allowed
                    .extend(HINTS_HELPERS.iter().map(|s| s.to_string())),
                other => {
                    permissions.allowed.insert(other.to_owned());
                }
            }
        }
        permissions
    }

    fn permits(&self, hint_name: &str) -> bool {
        self.all || self.allowed.contains(hint_name)
    }
}

/// How the arguments of a hint type are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HintStyle {
    /// Every argument becomes its own hint (`block foo bar`)
    OneHintPerTarget,
    /// All arguments form a single hint (`easy foo/1 bar/2`)
    AllTargetsInOneHint,
    /// First argument is a day count, the rest are targets
    DaysThenTargets,
    /// First argument is a comma separated bug list, the rest are targets
    BugsThenTargets,
}

#[derive(Clone, Copy, Debug)]
struct HintType {
    canonical: &'static str,
    min_args: usize,
    style: HintStyle,
}

/// Parser and registry of hint types.
#[derive(Debug)]
pub struct HintParser {
    types: HashMap<&'static str, HintType>,
    hints: HintCollection,
}

impl Default for HintParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HintParser {
    /// Create a parser with the built-in hint types registered.
    pub fn new() -> Self {
        let mut parser = Self {
            types: HashMap::new(),
            hints: HintCollection::default(),
        };
        for name in ["easy", "hint", "force-hint"] {
            parser.register_hint_type(name, 1, HintStyle::AllTargetsInOneHint, &[]);
        }
        for name in [
            "block",
            "block-all",
            "block-udeb",
            "force",
            "remove",
            "allow-uninst",
            "allow-smooth-update",
        ] {
            parser.register_hint_type(name, 1, HintStyle::OneHintPerTarget, &[]);
        }
        parser.register_hint_type("unblock", 1, HintStyle::OneHintPerTarget, &["approve"]);
        parser.register_hint_type("unblock-udeb", 1, HintStyle::OneHintPerTarget, &[]);
        parser
    }

    /// Register a hint type. Aliased names parse into the canonical type.
    pub fn register_hint_type(
        &mut self,
        name: &'static str,
        min_args: usize,
        style: HintStyle,
        aliases: &[&'static str],
    ) {
        let hint_type = HintType {
            canonical: name,
            min_args,
            style,
        };
        self.types.insert(name, hint_type);
        for alias in aliases {
            self.types.insert(alias, hint_type);
        }
    }

    /// The registered hint names.
    pub fn registered_hints(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.types.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Parse hint lines of one user, skipping invalid or unauthorised lines.
    pub fn parse_hints<'a>(
        &mut self,
        suites: &Suites,
        who: &str,
        permissions: &Permissions,
        filename: &str,
        lines: impl IntoIterator<Item = &'a str>,
    ) {
        for line in lines {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let Some(name) = tokens.next() else {
                continue;
            };
            if name == "finished" {
                break;
            }
            let args: Vec<&str> = tokens.collect();

            let Some(hint_type) = self.types.get(name).copied() else {
                warn!("Unknown hint found in {} (line: {:?})", filename, line);
                continue;
            };
            if !permissions.permits(name) && !permissions.permits(hint_type.canonical) {
                warn!(
                    "Hint {} is not a part of the permitted hints for {} (file {})",
                    name, who, filename
                );
                continue;
            }
            if args.len() < hint_type.min_args {
                warn!(
                    "Malformed hint in {}: Needs at least {} argument(s), got {} (line: {:?})",
                    filename,
                    hint_type.min_args,
                    args.len(),
                    line
                );
                continue;
            }

            if let Err(error) = self.parse_hint(suites, who, hint_type, &args) {
                warn!("Malformed hint in {}: {} (line: {:?})", filename, error, line);
            }
        }
    }

    fn parse_hint(
        &mut self,
        suites: &Suites,
        who: &str,
        hint_type: HintType,
        args: &[&str],
    ) -> Result<(), String> {
        match hint_type.style {
            HintStyle::AllTargetsInOneHint => {
                let targets = args
                    .iter()
                    .map(|token| {
                        let target = HintTarget::parse(suites, token)?;
                        if target.version.is_none() {
                            return Err(format!("'{}' needs an explicit version", token));
                        }
                        Ok(target)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.hints.add(Hint {
                    user: who.to_owned(),
                    hint_type: hint_type.canonical,
                    targets,
                    parameter: None,
                    active: true,
                });
            }
            HintStyle::OneHintPerTarget => {
                let targets = args
                    .iter()
                    .map(|token| HintTarget::parse(suites, token))
                    .collect::<Result<Vec<_>, _>>()?;
                for target in targets {
                    self.hints.add(Hint {
                        user: who.to_owned(),
                        hint_type: hint_type.canonical,
                        targets: vec![target],
                        parameter: None,
                        active: true,
                    });
                }
            }
            HintStyle::DaysThenTargets => {
                let days = args[0]
                    .parse::<u32>()
                    .map_err(|_| format!("invalid day count '{}'", args[0]))?;
                for token in &args[1..] {
                    let target = HintTarget::parse(suites, token)?;
                    self.hints.add(Hint {
                        user: who.to_owned(),
                        hint_type: hint_type.canonical,
                        targets: vec![target],
                        parameter: Some(HintParameter::Days(days)),
                        active: true,
                    });
                }
            }
            HintStyle::BugsThenTargets => {
                let bugs: BTreeSet<String> =
                    args[0].split(',').map(str::to_owned).collect();
                for token in &args[1..] {
                    let target = HintTarget::parse(suites, token)?;
                    self.hints.add(Hint {
                        user: who.to_owned(),
                        hint_type: hint_type.canonical,
                        targets: vec![target],
                        parameter: Some(HintParameter::Bugs(bugs.clone())),
                        active: true,
                    });
                }
            }
        }
        Ok(())
    }

    /// The parsed hints.
    pub fn hints(&self) -> &HintCollection {
        &self.hints
    }

    /// Finish parsing and hand out the collected hints.
    pub fn into_hints(mut self) -> HintCollection {
        self.hints.resolve_conflicts();
        self.hints
    }
}

/// Hint types where a later hint overrides an earlier one on the same
/// package and architecture.
const OVERRIDABLE_TYPES: &[&str] = &[
    "block",
    "block-all",
    "block-udeb",
    "unblock",
    "unblock-udeb",
    "force",
    "urgent",
    "remove",
    "age-days",
];

/// All parsed hints with search support.
#[derive(Clone, Debug, Default)]
pub struct HintCollection {
    hints: Vec<Hint>,
}

impl HintCollection {
    /// Store a hint.
    pub fn add(&mut self, hint: Hint) {
        self.hints.push(hint);
    }

    /// Whether no hints were collected.
    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }

    /// Merge another collection into this one, re-resolving conflicts.
    pub fn extend(&mut self, other: HintCollection) {
        self.hints.extend(other.hints);
        self.resolve_conflicts();
    }

    /// Iterate over the active hints of one type.
    pub fn of_type<'a>(&'a self, hint_type: &'a str) -> impl Iterator<Item = &'a Hint> + 'a {
        self.hints
            .iter()
            .filter(move |hint| hint.active && hint.hint_type == hint_type)
    }

    /// Search the active hints matching the filter.
    ///
    /// A hint without version restriction matches any queried version.
    pub fn search(
        &self,
        hint_type: &str,
        package: Option<&str>,
        version: Option<&PackageVersion>,
        architecture: Option<Architecture>,
        removal: Option<bool>,
    ) -> Vec<&Hint> {
        self.hints
            .iter()
            .filter(|hint| hint.active && hint.hint_type == hint_type)
            .filter(|hint| {
                hint.targets.iter().any(|target| {
                    package.is_none_or(|p| target.package == p)
                        && version.is_none_or(|v| {
                            target.version.as_ref().is_none_or(|tv| tv == v)
                        })
                        && architecture.is_none_or(|a| target.architecture == a)
                        && removal.is_none_or(|r| target.is_removal == r)
                })
            })
            .collect()
    }

    /// Resolve conflicting hints of the same type on the same package and
    /// architecture: `unblock`/`unblock-udeb` keep the hint with the highest
    /// version, every other type keeps the last declared hint.
    pub fn resolve_conflicts(&mut self) {
        for hint_type in OVERRIDABLE_TYPES {
            let mut winner: HashMap<(String, Architecture), usize> = HashMap::new();
            let indices: Vec<usize> = self
                .hints
                .iter()
                .enumerate()
                .filter(|(_, hint)| hint.hint_type == *hint_type && hint.active)
                .map(|(index, _)| index)
                .collect();
            for index in indices {
                let key = (
                    self.hints[index].package().to_owned(),
                    self.hints[index].architecture(),
                );
                match winner.get(&key) {
                    None => {
                        winner.insert(key, index);
                    }
                    Some(&previous) => {
                        let (loser, kept) = if matches!(*hint_type, "unblock" | "unblock-udeb") {
                            let previous_version = self.hints[previous].version();
                            let current_version = self.hints[index].version();
                            if current_version > previous_version {
                                (previous, index)
                            } else {
                                (index, previous)
                            }
                        } else {
                            (previous, index)
                        };
                        warn!(
                            "Overriding {}[{}] = '{}' by {} with '{}' by {}",
                            hint_type,
                            self.hints[kept].package(),
                            self.hints[loser],
                            self.hints[loser].user,
                            self.hints[kept],
                            self.hints[kept].user,
                        );
                        self.hints[loser].active = false;
                        winner.insert(key, kept);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::suites::{Suite, SuiteClass};
    use std::path::PathBuf;

    fn suites() -> Suites {
        let archs = [Architecture::Amd64, Architecture::I386];
        Suites {
            target: Suite::new(SuiteClass::Target, "testing", PathBuf::new(), "", &archs),
            sources: vec![Suite::new(
                SuiteClass::PrimarySource,
                "unstable",
                PathBuf::new(),
                "",
                &archs,
            )],
        }
    }

    fn version(s: &str) -> PackageVersion {
        PackageVersion::try_from(s).unwrap()
    }

    #[test]
    fn parse_and_search() {
        let suites = suites();
        let mut parser = HintParser::new();
        parser.parse_hints(
            &suites,
            "tester",
            &Permissions::all(),
            "test",
            ["unblock zathura/1.0-1", "block libfoo", "# comment"],
        );
        let hints = parser.into_hints();

        assert_eq!(
            hints
                .search("unblock", Some("zathura"), Some(&version("1.0-1")), None, None)
                .len(),
            1
        );
        // hints without version restriction match any version
        assert_eq!(
            hints
                .search("block", Some("libfoo"), Some(&version("2")), None, None)
                .len(),
            1
        );
        assert!(hints
            .search("unblock", Some("libfoo"), None, None, None)
            .is_empty());
    }

    #[test]
    fn aliases_resolve_to_canonical_type() {
        let suites = suites();
        let mut parser = HintParser::new();
        parser.parse_hints(
            &suites,
            "tester",
            &Permissions::all(),
            "test",
            ["approve zathura_tpu/1.0-1"],
        );
        // tpu is not configured in this test setup, so the hint is dropped
        assert!(parser.hints().is_empty());

        let mut parser = HintParser::new();
        parser.parse_hints(
            &suites,
            "tester",
            &Permissions::all(),
            "test",
            ["approve zathura/1.0-1"],
        );
        let hints = parser.into_hints();
        assert_eq!(hints.search("unblock", Some("zathura"), None, None, None).len(), 1);
        assert!(hints.search("approve", Some("zathura"), None, None, None).is_empty());
    }

    #[test]
    fn unknown_min_args_and_permissions() {
        let suites = suites();
        let mut parser = HintParser::new();
        parser.register_hint_type("min-10-arg", 10, HintStyle::OneHintPerTarget, &[]);
        parser.parse_hints(
            &suites,
            "tester",
            &Permissions::all(),
            "test",
            ["min-10-arg foo bar", "undefined-hint with args"],
        );
        assert!(parser.hints().is_empty());

        let permissions = Permissions::expand(&["block".to_owned()]);
        let mut parser = HintParser::new();
        parser.parse_hints(
            &suites,
            "tester",
            &permissions,
            "test",
            ["unblock zathura/1.0-1", "block zathura"],
        );
        let hints = parser.into_hints();
        assert!(hints.search("unblock", None, None, None, None).is_empty());
        assert_eq!(hints.search("block", None, None, None, None).len(), 1);
    }

    #[test]
    fn unblock_keeps_highest_version() {
        let suites = suites();
        let mut parser = HintParser::new();
        parser.parse_hints(
            &suites,
            "tester",
            &Permissions::all(),
            "test",
            ["unblock zathura/1.0-1", "unblock zathura/2.0-1"],
        );
        let hints = parser.into_hints();
        let found = hints.search("unblock", Some("zathura"), None, None, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].version(), Some(&version("2.0-1")));

        // parse order does not matter
        let mut parser = HintParser::new();
        parser.parse_hints(
            &suites,
            "tester",
            &Permissions::all(),
            "test",
            ["unblock zathura/2.0-1", "unblock zathura/1.0-1"],
        );
        let hints = parser.into_hints();
        let found = hints.search("unblock", Some("zathura"), None, None, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].version(), Some(&version("2.0-1")));
    }

    #[test]
    fn last_block_wins() {
        let suites = suites();
        let mut parser = HintParser::new();
        parser.parse_hints(
            &suites,
            "alice",
            &Permissions::all(),
            "test",
            ["block zathura"],
        );
        parser.parse_hints(
            &suites,
            "bob",
            &Permissions::all(),
            "test",
            ["block zathura"],
        );
        let hints = parser.into_hints();
        let found = hints.search("block", Some("zathura"), None, None, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user, "bob");
    }

    #[test]
    fn parameterised_hints() {
        let suites = suites();
        let mut parser = HintParser::new();
        parser.register_hint_type("age-days", 2, HintStyle::DaysThenTargets, &[]);
        parser.register_hint_type("ignore-rc-bugs", 2, HintStyle::BugsThenTargets, &[]);
        parser.parse_hints(
            &suites,
            "tester",
            &Permissions::all(),
            "test",
            [
                "age-days 3 zathura/1.0-1 girara/2.0-1",
                "ignore-rc-bugs 1000,1001 zathura/1.0-1",
                "age-days x zathura/1.0-1",
            ],
        );
        let hints = parser.into_hints();
        let age = hints.search("age-days", Some("girara"), None, None, None);
        assert_eq!(age.len(), 1);
        assert_eq!(age[0].days(), Some(3));
        let bugs = hints.search("ignore-rc-bugs", Some("zathura"), None, None, None);
        assert_eq!(bugs.len(), 1);
        assert_eq!(bugs[0].ignored_bugs().unwrap().len(), 2);
    }

    #[test]
    fn block_all_source() {
        let suites = suites();
        let mut parser = HintParser::new();
        parser.parse_hints(
            &suites,
            "freeze",
            &Permissions::all(),
            "test",
            ["block-all source"],
        );
        let hints = parser.into_hints();
        assert_eq!(hints.search("block-all", Some("source"), None, None, None).len(), 1);
    }
}
