// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! Update excuses.
//!
//! An excuse is the detailed explanation of why a candidate can or cannot
//! migrate to the target suite. Excuses carry the policy verdict, human
//! readable notes, the packages that would migrate, and dependencies on other
//! excuses.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;

use debian_archive_utils::architectures::Architecture;
use debian_archive_utils::excuses::{
    ExcuseDependencies, ExcusesItem, HintInfo, MissingBuilds,
};

use crate::migrationitem::MigrationItem;
use crate::policies::PolicyVerdict;
use crate::suites::PackageId;

/// The kind of a dependency between excuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// A binary package dependency
    Depends,
    /// `Build-Depends` or `Build-Depends-Arch`
    BuildDepends,
    /// `Build-Depends-Indep`
    BuildDependsIndep,
    /// `Built-Using`
    BuiltUsing,
    /// A Breaks/Conflicts relation turned into an inverted dependency
    ImplicitDependency,
}

impl DependencyKind {
    /// Human readable label.
    pub fn label(self) -> &'static str {
        match self {
            DependencyKind::Depends => "Depends",
            DependencyKind::BuildDepends => "Build-Depends(-Arch)",
            DependencyKind::BuildDependsIndep => "Build-Depends-Indep",
            DependencyKind::BuiltUsing => "Built-Using",
            DependencyKind::ImplicitDependency => "Implicit dependency",
        }
    }

    /// Machine readable reason tag.
    pub fn reason(self) -> &'static str {
        match self {
            DependencyKind::Depends => "depends",
            DependencyKind::BuildDepends => "build-depends",
            DependencyKind::BuildDependsIndep => "build-depends-indep",
            DependencyKind::BuiltUsing => "built-using",
            DependencyKind::ImplicitDependency => "implicit-dependency",
        }
    }

    /// Description used in invalidation notes.
    pub fn description(self) -> &'static str {
        match self {
            DependencyKind::Depends => "dependency",
            DependencyKind::BuildDepends => "build-dependency",
            DependencyKind::BuildDependsIndep => "build-dependency (indep)",
            DependencyKind::BuiltUsing => "built-using",
            DependencyKind::ImplicitDependency => "implicit-dependency",
        }
    }
}

/// Kind and architecture of a dependency.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DependencySpec {
    /// The dependency kind
    pub kind: DependencyKind,
    /// The architecture, if the dependency is architecture specific
    pub architecture: Option<Architecture>,
}

impl DependencySpec {
    /// A dependency of the given kind without architecture restriction.
    pub fn new(kind: DependencyKind) -> Self {
        Self {
            kind,
            architecture: None,
        }
    }

    /// An architecture specific dependency.
    pub fn on_arch(kind: DependencyKind, architecture: Architecture) -> Self {
        assert!(!architecture.is_all(), "all not allowed for DependencySpec");
        Self {
            kind,
            architecture: Some(architecture),
        }
    }
}

/// State of one alternative of an excuse dependency.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyState {
    /// Name of the excuse satisfying the dependency; `None` when impossible
    pub dep: Option<String>,
    /// Whether the alternative is (still) valid
    pub valid: bool,
    /// The verdict attached to the alternative
    pub verdict: PolicyVerdict,
    /// Description of an impossible dependency
    pub desc: Option<String>,
}

impl DependencyState {
    /// A valid dependency on the given excuse.
    pub fn new(dep: String) -> Self {
        Self {
            dep: Some(dep),
            valid: true,
            verdict: PolicyVerdict::Pass,
            desc: None,
        }
    }

    /// A dependency that no candidate can satisfy.
    pub fn impossible(verdict: PolicyVerdict, desc: String) -> Self {
        Self {
            dep: None,
            valid: false,
            verdict,
            desc: Some(desc),
        }
    }

    /// Whether any candidate could satisfy this alternative.
    pub fn possible(&self) -> bool {
        self.dep.is_some()
    }

    fn invalidate(&mut self, verdict: PolicyVerdict) {
        self.valid = false;
        if verdict > self.verdict {
            self.verdict = verdict;
        }
    }
}

/// A dependency of an excuse: an OR over alternatives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExcuseDependency {
    /// Kind and architecture of the dependency
    pub spec: DependencySpec,
    /// The alternatives, any of which satisfies the dependency
    pub depstates: Vec<DependencyState>,
}

impl ExcuseDependency {
    /// The dependency is valid if any alternative is valid.
    pub fn valid(&self) -> bool {
        self.depstates.iter().any(|state| state.valid)
    }

    /// The dependency is possible if any alternative is possible.
    pub fn possible(&self) -> bool {
        self.depstates.iter().any(|state| state.possible())
    }

    /// The first valid alternative, or the first possible one.
    pub fn first_dep(&self) -> Option<&str> {
        let mut first = None;
        for state in &self.depstates {
            if state.valid {
                return state.dep.as_deref();
            }
            if first.is_none() && state.possible() {
                first = state.dep.as_deref();
            }
        }
        first
    }

    /// The description of the first impossible alternative.
    pub fn first_impossible_dep(&self) -> Option<&str> {
        self.depstates
            .iter()
            .find(|state| !state.possible())
            .and_then(|state| state.desc.as_deref())
    }

    /// The verdict of the dependency is the best among the alternatives.
    pub fn verdict(&self) -> PolicyVerdict {
        self.depstates
            .iter()
            .map(|state| state.verdict)
            .min()
            .unwrap_or(PolicyVerdict::RejectedPermanently)
    }

    /// Invalidate the alternatives satisfied by `excuse`. Returns whether a
    /// valid alternative is left.
    pub fn invalidate(&mut self, excuse: &str, verdict: PolicyVerdict) -> bool {
        let mut valid_alternative_left = false;
        for state in &mut self.depstates {
            if state.dep.as_deref() == Some(excuse) {
                state.invalidate(verdict);
            } else if state.valid {
                valid_alternative_left = true;
            }
        }
        valid_alternative_left
    }
}

/// A package-level dependency added by a policy, later translated into an
/// excuse-level dependency.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageDependency {
    /// Kind and architecture of the dependency
    pub spec: DependencySpec,
    /// The package ids, any of which satisfies the dependency
    pub packages: BTreeSet<PackageId>,
}

fn verdict_description(verdict: PolicyVerdict) -> &'static str {
    match verdict {
        PolicyVerdict::NotApplicable | PolicyVerdict::Pass => {
            "Will attempt migration (Any information below is purely informational)"
        }
        PolicyVerdict::PassHinted => {
            "Will attempt migration due to a hint (Any information below is purely informational)"
        }
        PolicyVerdict::RejectedTemporarily => {
            "Waiting for test results, another package or too young (no action required now - check later)"
        }
        PolicyVerdict::RejectedWaitingForAnotherItem => {
            "Waiting for another item to be ready to migrate (no action required now - check later)"
        }
        PolicyVerdict::RejectedBlockedByAnotherItem => {
            "BLOCKED: Cannot migrate due to another item, which is blocked (please check which dependencies are stuck)"
        }
        PolicyVerdict::RejectedNeedsApproval => {
            "BLOCKED: Needs an approval (either due to a freeze, the source suite or a manual hint)"
        }
        PolicyVerdict::RejectedCannotDetermineIfPermanent => {
            "BLOCKED: Maybe temporary, maybe blocked but the migration engine is missing information (check below)"
        }
        PolicyVerdict::RejectedPermanently => {
            "BLOCKED: Rejected/violates migration policy/introduces a regression"
        }
    }
}

/// An update excuse for one migration item.
#[derive(Clone, Debug)]
pub struct Excuse {
    /// The migration item this excuse describes
    pub item: MigrationItem,
    /// Displayed versions in the target and source suite, `-` if missing
    pub ver: (String, String),
    /// The maintainer, without the email address
    pub maint: Option<String>,
    /// The section
    pub section: Option<String>,
    /// Current age in days
    pub daysold: Option<f64>,
    /// Required age in days
    pub mindays: Option<u32>,
    /// Whether migration requires manual approval
    pub needs_approval: bool,
    /// Hints that were applied to this excuse
    pub hints: Vec<HintInfo>,
    /// Whether a `force` hint overrides rejections
    pub forced: bool,
    verdict: PolicyVerdict,

    /// Dependencies on other excuses
    pub all_deps: Vec<ExcuseDependency>,
    /// Excuses this one depends on via break/new architectures only
    pub break_deps: Vec<(String, Architecture)>,
    /// Architectures with unsatisfiable dependencies
    pub unsatisfiable_on_archs: Vec<Architecture>,
    /// Unsatisfiable dependency signatures per architecture
    pub unsat_deps: BTreeMap<Architecture, BTreeSet<String>>,
    /// Release critical bugs introduced by the migration
    pub newbugs: BTreeSet<String>,
    /// Release critical bugs fixed by the migration
    pub oldbugs: BTreeSet<String>,
    /// Machine readable reasons
    pub reason: BTreeSet<String>,
    /// Informational notes
    pub infoline: Vec<String>,
    /// Notes attached to a verdict level
    pub verdict_info: BTreeMap<PolicyVerdict, Vec<String>>,
    /// Details that do not influence the verdict
    pub detailed_info: Vec<String>,
    /// Architectures missing a build
    pub missing_builds: BTreeSet<Architecture>,
    /// Out-of-date architectures missing a build
    pub missing_builds_ood_arch: BTreeSet<Architecture>,
    /// Cruft binaries per old source version
    pub old_binaries: BTreeMap<String, BTreeSet<String>>,
    /// Per-policy structured info
    pub policy_info: serde_yaml::Mapping,

    /// Packages that enter the target suite if the item migrates
    pub packages: BTreeMap<Architecture, BTreeSet<PackageId>>,
    /// Package-level dependencies added by policies
    pub depends_packages: Vec<PackageDependency>,
    /// All package ids of `depends_packages`
    pub depends_packages_flattened: BTreeSet<PackageId>,

    /// Bounty points per policy
    pub bounty: BTreeMap<String, u32>,
    /// Penalty points per policy
    pub penalty: BTreeMap<String, u32>,
}

impl Excuse {
    /// Create an excuse for the given item, initially rejected.
    pub fn new(item: MigrationItem) -> Self {
        Self {
            item,
            ver: ("-".to_owned(), "-".to_owned()),
            maint: None,
            section: None,
            daysold: None,
            mindays: None,
            needs_approval: false,
            hints: vec![],
            forced: false,
            verdict: PolicyVerdict::RejectedPermanently,
            all_deps: vec![],
            break_deps: vec![],
            unsatisfiable_on_archs: vec![],
            unsat_deps: BTreeMap::new(),
            newbugs: BTreeSet::new(),
            oldbugs: BTreeSet::new(),
            reason: BTreeSet::new(),
            infoline: vec![],
            verdict_info: BTreeMap::new(),
            detailed_info: vec![],
            missing_builds: BTreeSet::new(),
            missing_builds_ood_arch: BTreeSet::new(),
            old_binaries: BTreeMap::new(),
            policy_info: serde_yaml::Mapping::new(),
            packages: BTreeMap::new(),
            depends_packages: vec![],
            depends_packages_flattened: BTreeSet::new(),
            bounty: BTreeMap::new(),
            penalty: BTreeMap::new(),
        }
    }

    /// Full item name.
    pub fn name(&self) -> String {
        self.item.name()
    }

    /// Unversioned item name.
    pub fn uvname(&self) -> String {
        self.item.uvname()
    }

    /// The source package.
    pub fn source(&self) -> &str {
        &self.item.package
    }

    /// Whether the item is a valid migration candidate.
    pub fn is_valid(&self) -> bool {
        !self.verdict.is_rejected()
    }

    /// The current policy verdict.
    pub fn policy_verdict(&self) -> PolicyVerdict {
        self.verdict
    }

    /// Set the verdict. A forced excuse converts rejections into
    /// [PolicyVerdict::PassHinted].
    pub fn set_verdict(&mut self, verdict: PolicyVerdict) {
        if verdict.is_rejected() && self.forced {
            self.verdict = PolicyVerdict::PassHinted;
        } else {
            self.verdict = verdict;
        }
    }

    /// Raise the verdict; a policy may never lower it.
    pub fn raise_verdict(&mut self, verdict: PolicyVerdict) {
        if verdict > self.verdict {
            self.set_verdict(verdict);
        }
    }

    /// Set the versions in the target and source suite.
    pub fn set_vers(&mut self, tver: Option<&str>, uver: Option<&str>) {
        if let Some(tver) = tver {
            self.ver.0 = tver.to_owned();
        }
        if let Some(uver) = uver {
            self.ver.1 = uver.to_owned();
        }
    }

    /// Set the maintainer, stripping the email address.
    pub fn set_maint(&mut self, maint: &str) {
        let stripped = match maint.find('<') {
            Some(index) => maint[..index].trim_end(),
            None => maint,
        };
        self.maint = Some(stripped.to_owned());
    }

    /// Set the section.
    pub fn set_section(&mut self, section: &str) {
        self.section = Some(section.to_owned());
    }

    /// Record the current and required age.
    pub fn setdaysold(&mut self, daysold: f64, mindays: u32) {
        self.daysold = Some(daysold);
        self.mindays = Some(mindays);
    }

    /// Apply a `force` hint. Returns whether the verdict changed.
    pub fn force(&mut self) -> bool {
        self.forced = true;
        if self.verdict.is_rejected() {
            self.verdict = PolicyVerdict::PassHinted;
            return true;
        }
        false
    }

    /// Add an informational note.
    pub fn addinfo(&mut self, note: impl Into<String>) {
        self.infoline.push(note.into());
    }

    /// Add a note explaining (part of) the given verdict.
    pub fn add_verdict_info(&mut self, verdict: PolicyVerdict, note: impl Into<String>) {
        self.verdict_info.entry(verdict).or_default().push(note.into());
    }

    /// Add a detail note.
    pub fn add_detailed_info(&mut self, note: impl Into<String>) {
        self.detailed_info.push(note.into());
    }

    /// Record a machine readable reason.
    pub fn addreason(&mut self, reason: &str) {
        self.reason.insert(reason.to_owned());
    }

    /// Whether the reason was recorded.
    pub fn hasreason(&self, reason: &str) -> bool {
        self.reason.contains(reason)
    }

    /// Note a missing build on a blocking architecture.
    pub fn missing_build_on_arch(&mut self, arch: Architecture) {
        self.missing_builds.insert(arch);
    }

    /// Note a missing build on an out-of-date architecture.
    pub fn missing_build_on_ood_arch(&mut self, arch: Architecture) {
        self.missing_builds_ood_arch.insert(arch);
    }

    /// Record an old binary left over from a previous source version.
    pub fn add_old_binary(&mut self, binary: &str, from_source_version: &str) {
        self.old_binaries
            .entry(from_source_version.to_owned())
            .or_default()
            .insert(binary.to_owned());
    }

    /// Record a hint that was applied.
    pub fn add_hint(&mut self, hint_type: &str, user: &str) {
        self.hints.push(HintInfo {
            hint_type: hint_type.to_owned(),
            hint_from: user.to_owned(),
        });
    }

    /// Record a package that migrates with this item.
    pub fn add_package(&mut self, pkg_id: PackageId) {
        self.packages
            .entry(pkg_id.architecture)
            .or_default()
            .insert(pkg_id);
    }

    /// Record a break/new architecture only dependency.
    pub fn add_break_dep(&mut self, name: &str, arch: Architecture) {
        if !self
            .break_deps
            .iter()
            .any(|(n, a)| n == name && *a == arch)
        {
            self.break_deps.push((name.to_owned(), arch));
        }
    }

    /// Record an architecture with unsatisfiable dependencies.
    pub fn add_unsatisfiable_on_arch(&mut self, arch: Architecture) {
        if !self.unsatisfiable_on_archs.contains(&arch) {
            self.unsatisfiable_on_archs.push(arch);
        }
    }

    /// Record an unsatisfiable dependency.
    pub fn add_unsatisfiable_dep(&mut self, signature: String, arch: Architecture) {
        self.unsat_deps.entry(arch).or_default().insert(signature);
    }

    /// Set the lists of fixed and introduced release critical bugs.
    pub fn setbugs(&mut self, oldbugs: &[String], newbugs: &[String]) {
        self.oldbugs.extend(oldbugs.iter().cloned());
        self.newbugs.extend(newbugs.iter().cloned());
    }

    /// Add a dependency on other excuses. Returns whether the dependency is
    /// valid; an invalid dependency raises the verdict.
    pub fn add_dependency(
        &mut self,
        depstates: Vec<DependencyState>,
        spec: DependencySpec,
    ) -> bool {
        assert!(
            !depstates.is_empty(),
            "{}: adding empty list of dependencies",
            self.name()
        );
        let dep = ExcuseDependency { spec, depstates };
        let valid = dep.valid();
        if !valid {
            self.addreason(dep.spec.kind.reason());
            let verdict = dep.verdict();
            self.raise_verdict(verdict);
        }
        self.all_deps.push(dep);
        valid
    }

    /// Add a package-level dependency for later translation.
    pub fn add_package_depends(&mut self, spec: DependencySpec, depends: BTreeSet<PackageId>) {
        assert!(
            !depends.is_empty(),
            "{}: adding empty list of package dependencies",
            self.name()
        );
        self.depends_packages_flattened
            .extend(depends.iter().cloned());
        self.depends_packages.push(PackageDependency {
            spec,
            packages: depends,
        });
    }

    /// The excuses (of kind Depends) this one validly depends on. Used by
    /// the auto hinter.
    pub fn get_deps(&self) -> BTreeSet<String> {
        let mut deps = BTreeSet::new();
        for dep in &self.all_deps {
            if dep.spec.kind != DependencyKind::Depends {
                continue;
            }
            for state in &dep.depstates {
                if state.valid {
                    deps.extend(state.dep.clone());
                    break;
                }
            }
        }
        deps
    }

    /// Invalidate the dependency on the given excuse. Returns whether this
    /// excuse is still valid.
    pub fn invalidate_dependency(&mut self, name: &str, verdict: PolicyVerdict) -> bool {
        let mut still_valid = true;
        let mut invalidated = vec![];
        for (index, dep) in self.all_deps.iter_mut().enumerate() {
            if !dep.invalidate(name, verdict) {
                still_valid = false;
                invalidated.push(index);
            }
        }
        for index in invalidated {
            let reason = self.all_deps[index].spec.kind.reason().to_owned();
            let verdict = self.all_deps[index].verdict();
            self.reason.insert(reason);
            self.raise_verdict(verdict);
        }
        still_valid
    }

    /// Add a bounty of a policy.
    pub fn add_bounty(&mut self, policy: &str, bounty: u32) {
        self.bounty.insert(policy.to_owned(), bounty);
    }

    /// Add a penalty of a policy.
    pub fn add_penalty(&mut self, policy: &str, penalty: u32) {
        self.penalty.insert(policy.to_owned(), penalty);
    }

    /// Sort key for the excuses output: oldest first, then by name.
    pub fn sortkey(&self) -> (i64, String) {
        match self.daysold {
            None => (-1, self.uvname()),
            Some(days) => (days as i64, self.uvname()),
        }
    }

    fn dep_issue_lines(
        &self,
        uvnames: &HashMap<String, String>,
    ) -> BTreeMap<PolicyVerdict, BTreeSet<String>> {
        let mut issues: BTreeMap<PolicyVerdict, BTreeSet<String>> = BTreeMap::new();
        let uvname = self.uvname();
        for dep in &self.all_deps {
            let verdict = dep.verdict();
            if !dep.possible() {
                let desc = dep.first_impossible_dep().unwrap_or("?");
                issues.entry(verdict).or_default().insert(format!(
                    "Impossible {}: {} -> {}",
                    dep.spec.kind.label(),
                    uvname,
                    desc
                ));
                continue;
            }
            let Some(first) = dep.first_dep() else {
                continue;
            };
            let duv = uvnames
                .get(first)
                .cloned()
                .unwrap_or_else(|| first.to_owned());
            if dep.valid() {
                issues.entry(verdict).or_default().insert(format!(
                    "{}: {} -> {}",
                    dep.spec.kind.label(),
                    uvname,
                    duv
                ));
            } else {
                issues.entry(verdict).or_default().insert(format!(
                    "{}: {} -> {} (not considered)",
                    dep.spec.kind.label(),
                    uvname,
                    duv
                ));
                issues.entry(verdict).or_default().insert(format!(
                    "Invalidated by {}",
                    dep.spec.kind.description()
                ));
            }
        }
        issues
    }

    /// Render the human readable explanation lines.
    pub fn text(&self, uvnames: &HashMap<String, String>) -> Vec<String> {
        let mut res = vec![format!(
            "Migration status for {} ({} to {}): {}",
            self.uvname(),
            self.ver.0,
            self.ver.1,
            verdict_description(self.verdict)
        )];
        if !self.is_valid() {
            res.push("Issues preventing migration:".to_owned());
        }

        let mut merged: BTreeMap<PolicyVerdict, Vec<String>> = self.verdict_info.clone();
        for (verdict, lines) in self.dep_issue_lines(uvnames) {
            merged.entry(verdict).or_default().extend(lines);
        }
        for (_, lines) in merged.iter().rev() {
            res.extend(lines.iter().cloned());
        }

        if !self.infoline.is_empty() {
            res.push("Additional info:".to_owned());
            res.extend(self.infoline.iter().cloned());
        }
        res
    }

    /// Render the excuse as an HTML list item body.
    pub fn html(&self, uvnames: &HashMap<String, String>) -> String {
        let uvname = self.uvname();
        let mut res = format!(
            "<a id=\"{0}\" name=\"{0}\">{0}</a> ({1} to {2})\n<ul>\n",
            uvname, self.ver.0, self.ver.1
        );
        for line in self.text(uvnames) {
            let _ = writeln!(res, "<li>{}", line);
        }
        res.push_str("</ul>\n");
        res
    }

    /// Render the excuse as structured data for `excuses.yaml`.
    pub fn excuse_data(&self, uvnames: &HashMap<String, String>) -> ExcusesItem {
        let uvname_of = |name: &str| {
            uvnames
                .get(name)
                .cloned()
                .unwrap_or_else(|| name.to_owned())
        };

        let migrate_after: BTreeSet<String> = self
            .all_deps
            .iter()
            .filter(|dep| dep.valid())
            .filter_map(|dep| dep.first_dep())
            .map(uvname_of)
            .collect();
        let blocked_by: BTreeSet<String> = self
            .all_deps
            .iter()
            .filter(|dep| !dep.valid() && dep.possible())
            .filter_map(|dep| dep.first_dep())
            .map(uvname_of)
            .collect();
        let unimportant: Vec<String> = self
            .break_deps
            .iter()
            .map(|(name, _)| uvname_of(name))
            .filter(|name| !migrate_after.contains(name) && !blocked_by.contains(name))
            .collect();

        let dependencies = if self.all_deps.is_empty()
            && self.break_deps.is_empty()
            && self.unsat_deps.is_empty()
        {
            None
        } else {
            Some(ExcuseDependencies {
                blocked_by: blocked_by.iter().cloned().collect(),
                migrate_after: migrate_after.iter().cloned().collect(),
                unimportant_dependencies: unimportant,
                unsatisfiable_dependencies: self
                    .unsat_deps
                    .iter()
                    .map(|(arch, signatures)| {
                        (
                            arch.to_string(),
                            signatures.iter().cloned().collect::<Vec<_>>(),
                        )
                    })
                    .collect(),
            })
        };

        let missing_builds = if self.missing_builds.is_empty()
            && self.missing_builds_ood_arch.is_empty()
        {
            None
        } else {
            Some(MissingBuilds {
                on_architectures: self.missing_builds.iter().map(|a| a.to_string()).collect(),
                on_unimportant_architectures: self
                    .missing_builds_ood_arch
                    .iter()
                    .map(|a| a.to_string())
                    .collect(),
            })
        };

        let manual_approval_status = if self.needs_approval {
            if self.hints.iter().any(|hint| hint.hint_type == "unblock") {
                Some("approved".to_owned())
            } else {
                Some("not-approved".to_owned())
            }
        } else {
            None
        };

        let (reason, forced_reason) = if self.forced {
            (vec![], self.reason.iter().cloned().collect())
        } else {
            (self.reason.iter().cloned().collect(), vec![])
        };

        ExcusesItem {
            item_name: self.uvname(),
            source: self.source().to_owned(),
            migration_policy_verdict: self.verdict,
            old_version: self.ver.0.clone(),
            new_version: self.ver.1.clone(),
            is_candidate: self.is_valid(),
            excuses: self.text(uvnames),
            maintainer: self.maint.clone(),
            component: self
                .section
                .as_deref()
                .filter(|section| section.contains('/'))
                .map(|section| section.split('/').next().unwrap_or(section).to_owned()),
            reason,
            forced_reason,
            policy_info: if self.policy_info.is_empty() {
                None
            } else {
                Some(self.policy_info.clone())
            },
            missing_builds,
            invalidated_by_other_package: self
                .all_deps
                .iter()
                .any(|dep| !dep.valid() && dep.possible())
                .then_some(true),
            dependencies,
            manual_approval_status,
            hints: self.hints.clone(),
            old_binaries: self
                .old_binaries
                .iter()
                .map(|(version, binaries)| {
                    (version.clone(), binaries.iter().cloned().collect::<Vec<_>>())
                })
                .collect(),
            detailed_info: self.detailed_info.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::suites::SuiteRef;
    use debian_archive_utils::version::PackageVersion;

    fn item(package: &str) -> MigrationItem {
        MigrationItem {
            package: package.to_owned(),
            version: PackageVersion::try_from("2").unwrap(),
            architecture: Architecture::Source,
            suite: SuiteRef::Source(0),
            suite_suffix: String::new(),
            is_removal: false,
            is_cruft_removal: false,
        }
    }

    #[test]
    fn verdict_monotonicity() {
        let mut excuse = Excuse::new(item("green"));
        excuse.set_verdict(PolicyVerdict::Pass);
        excuse.raise_verdict(PolicyVerdict::RejectedTemporarily);
        assert_eq!(excuse.policy_verdict(), PolicyVerdict::RejectedTemporarily);
        // raising never lowers
        excuse.raise_verdict(PolicyVerdict::Pass);
        assert_eq!(excuse.policy_verdict(), PolicyVerdict::RejectedTemporarily);
    }

    #[test]
    fn force_overrides_rejection() {
        let mut excuse = Excuse::new(item("green"));
        assert!(excuse.force());
        assert_eq!(excuse.policy_verdict(), PolicyVerdict::PassHinted);
        // later rejections are converted as well
        excuse.raise_verdict(PolicyVerdict::RejectedPermanently);
        assert_eq!(excuse.policy_verdict(), PolicyVerdict::PassHinted);
        assert!(excuse.is_valid());
    }

    #[test]
    fn dependency_alternatives() {
        let mut excuse = Excuse::new(item("green"));
        excuse.set_verdict(PolicyVerdict::Pass);
        let valid = excuse.add_dependency(
            vec![
                DependencyState::new("libgreen1".to_owned()),
                DependencyState::new("libgreen2".to_owned()),
            ],
            DependencySpec::new(DependencyKind::Depends),
        );
        assert!(valid);

        // invalidating one alternative keeps the dependency valid
        assert!(excuse
            .invalidate_dependency("libgreen1", PolicyVerdict::RejectedWaitingForAnotherItem));
        assert!(excuse.is_valid());

        // invalidating the last alternative invalidates the excuse
        assert!(!excuse
            .invalidate_dependency("libgreen2", PolicyVerdict::RejectedWaitingForAnotherItem));
        assert_eq!(
            excuse.policy_verdict(),
            PolicyVerdict::RejectedWaitingForAnotherItem
        );
        assert!(excuse.hasreason("depends"));
    }

    #[test]
    fn impossible_dependency_rejects() {
        let mut excuse = Excuse::new(item("green"));
        excuse.set_verdict(PolicyVerdict::Pass);
        let valid = excuse.add_dependency(
            vec![DependencyState::impossible(
                PolicyVerdict::RejectedPermanently,
                "ghost/1/amd64".to_owned(),
            )],
            DependencySpec::new(DependencyKind::Depends),
        );
        assert!(!valid);
        assert_eq!(excuse.policy_verdict(), PolicyVerdict::RejectedPermanently);
    }

    #[test]
    fn bounties_and_penalties_are_tracked_per_policy() {
        let mut excuse = Excuse::new(item("green"));
        excuse.add_bounty("autopkgtest", 3);
        excuse.add_bounty("autopkgtest", 5);
        excuse.add_penalty("piuparts", 2);
        assert_eq!(excuse.bounty.get("autopkgtest"), Some(&5));
        assert_eq!(excuse.penalty.get("piuparts"), Some(&2));
        assert_eq!(excuse.bounty.values().sum::<u32>(), 5);
    }

    #[test]
    fn excuse_data_rendering() {
        let mut excuse = Excuse::new(item("green"));
        excuse.set_vers(Some("1"), Some("2"));
        excuse.set_maint("Jane Doe <jane@example.org>");
        excuse.set_section("libs/devel");
        excuse.set_verdict(PolicyVerdict::Pass);
        excuse.add_package(PackageId::source(
            "green",
            PackageVersion::try_from("2").unwrap(),
        ));

        let data = excuse.excuse_data(&HashMap::new());
        assert_eq!(data.item_name, "green");
        assert_eq!(data.maintainer.as_deref(), Some("Jane Doe"));
        assert_eq!(data.component.as_deref(), Some("libs"));
        assert!(data.is_candidate);
        assert_eq!(data.old_version, "1");
        assert_eq!(data.new_version, "2");
    }
}
