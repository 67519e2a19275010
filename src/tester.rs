// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! The installability tester.
//!
//! Answers whether a binary package currently in the target suite can be
//! installed together with a consistent set of other target-suite packages.
//! The tester under-approximates: a positive answer is witnessed by a closed,
//! conflict free package set, while a negative answer only binds that no such
//! set was found within the bounded search.

use std::collections::{BTreeMap, HashSet};

use debian_archive_utils::architectures::Architecture;

use crate::suites::Suite;
use crate::universe::{PackageUniverse, PkgIx};

/// Upper bound on search steps per installability query. Exhaustion counts
/// as "not installable", which the callers treat as uninstallable for
/// britney's purposes.
const SEARCH_BUDGET: u32 = 5000;

/// Per-architecture statistics of the tester.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArchStats {
    /// Number of target-suite packages on the architecture
    pub in_target: usize,
    /// Number of packages with a cached "uninstallable" verdict
    pub cached_uninstallable: usize,
}

impl ArchStats {
    /// Render the stats for logging.
    pub fn stat_summary(&self) -> Vec<String> {
        vec![
            format!("packages in target suite: {}", self.in_target),
            format!("cached uninstallable: {}", self.cached_uninstallable),
        ]
    }
}

/// The mutable installability model of the target suite.
#[derive(Debug)]
pub struct InstallabilityTester {
    in_target: Vec<bool>,
    cache: Vec<Option<bool>>,
    cache_hits: u64,
    cache_misses: u64,
    exhausted_searches: u64,
}

impl InstallabilityTester {
    /// Create the tester with the membership of the given target suite.
    pub fn new(universe: &PackageUniverse, target: &Suite) -> Self {
        let mut in_target = vec![false; universe.len()];
        for packages in target.binaries.values() {
            for pkg in packages.values() {
                let ix = universe.must_lookup(&pkg.pkg_id);
                in_target[ix.index()] = true;
            }
        }
        Self {
            in_target,
            cache: vec![None; universe.len()],
            cache_hits: 0,
            cache_misses: 0,
            exhausted_searches: 0,
        }
    }

    /// Whether the package is currently in the target suite model.
    pub fn is_in_target(&self, ix: PkgIx) -> bool {
        self.in_target[ix.index()]
    }

    /// Add a binary to the target suite model.
    ///
    /// Invalidates the cached verdicts of the package and of its transitive
    /// reverse dependency closure (including conflicts).
    pub fn add_binary(&mut self, universe: &PackageUniverse, ix: PkgIx) {
        let i = ix.index();
        assert!(!self.in_target[i], "added {} twice", universe.pkg_id(ix));
        self.in_target[i] = true;
        self.invalidate(universe, ix);
    }

    /// Remove a binary from the target suite model.
    pub fn remove_binary(&mut self, universe: &PackageUniverse, ix: PkgIx) {
        let i = ix.index();
        assert!(
            self.in_target[i],
            "removed {} which is not in the target suite",
            universe.pkg_id(ix)
        );
        self.in_target[i] = false;
        self.invalidate(universe, ix);
    }

    fn invalidate(&mut self, universe: &PackageUniverse, start: PkgIx) {
        let mut seen: HashSet<PkgIx> = HashSet::new();
        let mut remain = vec![start];
        seen.insert(start);
        while let Some(ix) = remain.pop() {
            self.cache[ix.index()] = None;
            for &other in universe
                .reverse_dependencies_of(ix)
                .iter()
                .chain(universe.negative_dependencies_of(ix))
            {
                if seen.insert(other) {
                    remain.push(other);
                }
            }
        }
    }

    /// Drop all cached verdicts, forcing a full recompute.
    pub fn compute_installability(&mut self) {
        self.cache.fill(None);
    }

    /// Whether the package is installable within the current target suite.
    pub fn is_installable(&mut self, universe: &PackageUniverse, ix: PkgIx) -> bool {
        let i = ix.index();
        if let Some(cached) = self.cache[i] {
            self.cache_hits += 1;
            return cached;
        }
        self.cache_misses += 1;
        let result = self.check_installable(universe, ix);
        self.cache[i] = Some(result);
        result
    }

    fn check_installable(&mut self, universe: &PackageUniverse, root: PkgIx) -> bool {
        if !self.in_target[root.index()] {
            return false;
        }
        let mut chosen: HashSet<PkgIx> = HashSet::new();
        let mut forbidden: HashSet<PkgIx> = HashSet::new();
        chosen.insert(root);
        forbidden.extend(universe.negative_dependencies_of(root).iter().copied());

        let mut budget = SEARCH_BUDGET;
        let result = self.solve(universe, &mut chosen, &mut forbidden, &mut budget);
        if budget == 0 {
            self.exhausted_searches += 1;
        }
        result
    }

    /// Unit-propagate forced choices and branch on the first ambiguous
    /// clause. `chosen` must be conflict free on entry.
    fn solve(
        &mut self,
        universe: &PackageUniverse,
        chosen: &mut HashSet<PkgIx>,
        forbidden: &mut HashSet<PkgIx>,
        budget: &mut u32,
    ) -> bool {
        loop {
            if *budget == 0 {
                return false;
            }
            *budget -= 1;

            let mut progress = false;
            let mut branch: Option<Vec<PkgIx>> = None;
            let snapshot: Vec<PkgIx> = chosen.iter().copied().collect();
            for p in snapshot {
                for clause in universe.dependencies_of(p) {
                    if clause.iter().any(|q| chosen.contains(q)) {
                        continue;
                    }
                    let candidates: Vec<PkgIx> = clause
                        .iter()
                        .copied()
                        .filter(|q| {
                            self.in_target[q.index()] && !forbidden.contains(q)
                        })
                        .collect();
                    match candidates.as_slice() {
                        [] => return false,
                        [single] => {
                            if universe
                                .negative_dependencies_of(*single)
                                .iter()
                                .any(|n| chosen.contains(n))
                            {
                                return false;
                            }
                            chosen.insert(*single);
                            forbidden.extend(
                                universe.negative_dependencies_of(*single).iter().copied(),
                            );
                            progress = true;
                        }
                        _ => {
                            if branch.is_none() {
                                branch = Some(candidates);
                            }
                        }
                    }
                }
            }

            if progress {
                continue;
            }
            let Some(candidates) = branch else {
                // every clause of every chosen package is satisfied
                return true;
            };
            for candidate in candidates {
                if universe
                    .negative_dependencies_of(candidate)
                    .iter()
                    .any(|n| chosen.contains(n))
                {
                    continue;
                }
                let mut chosen_branch = chosen.clone();
                let mut forbidden_branch = forbidden.clone();
                chosen_branch.insert(candidate);
                forbidden_branch
                    .extend(universe.negative_dependencies_of(candidate).iter().copied());
                if self.solve(universe, &mut chosen_branch, &mut forbidden_branch, budget) {
                    return true;
                }
            }
            return false;
        }
    }

    /// Per-architecture statistics for logging.
    pub fn compute_stats(
        &self,
        universe: &PackageUniverse,
        architectures: &[Architecture],
    ) -> BTreeMap<Architecture, ArchStats> {
        let mut stats: BTreeMap<Architecture, ArchStats> = architectures
            .iter()
            .map(|&arch| (arch, ArchStats::default()))
            .collect();
        for (ix, pkg_id) in universe.iter() {
            if !self.in_target[ix.index()] {
                continue;
            }
            if let Some(arch_stats) = stats.get_mut(&pkg_id.architecture) {
                arch_stats.in_target += 1;
                if self.cache[ix.index()] == Some(false) {
                    arch_stats.cached_uninstallable += 1;
                }
            }
        }
        stats
    }

    /// Global cache statistics for logging.
    pub fn cache_stats(&self) -> Vec<String> {
        vec![
            format!("cache hits: {}", self.cache_hits),
            format!("cache misses: {}", self.cache_misses),
            format!("exhausted searches: {}", self.exhausted_searches),
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::suites::{BinaryPackage, PackageId, SuiteClass};
    use debian_archive_utils::{
        package::MultiArch, relations::parse_relations, version::PackageVersion,
    };
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn version(s: &str) -> PackageVersion {
        PackageVersion::try_from(s).unwrap()
    }

    fn binary(name: &str, ver: &str, depends: &str, conflicts: &str) -> BinaryPackage {
        let pkg_id = PackageId::binary(name, version(ver), Architecture::Amd64);
        BinaryPackage {
            version: version(ver),
            section: Some("devel".to_owned()),
            source: name.to_owned(),
            source_version: version(ver),
            architecture: Architecture::Amd64,
            multi_arch: MultiArch::No,
            depends: parse_relations(depends).unwrap(),
            conflicts: parse_relations(conflicts).unwrap(),
            provides: vec![],
            is_essential: false,
            pkg_id,
            built_using: vec![],
        }
    }

    fn setup(packages: Vec<BinaryPackage>) -> (PackageUniverse, InstallabilityTester, Suite) {
        let mut suite = Suite::new(
            SuiteClass::Target,
            "testing",
            PathBuf::new(),
            "",
            &[Architecture::Amd64],
        );
        let mut all: HashMap<PackageId, BinaryPackage> = HashMap::new();
        for pkg in packages {
            all.insert(pkg.pkg_id.clone(), pkg.clone());
            suite.insert_binary(pkg);
        }
        let universe = PackageUniverse::build(&all);
        let tester = InstallabilityTester::new(&universe, &suite);
        (universe, tester, suite)
    }

    fn ix(universe: &PackageUniverse, name: &str, ver: &str) -> PkgIx {
        universe.must_lookup(&PackageId::binary(name, version(ver), Architecture::Amd64))
    }

    #[test]
    fn simple_chain_is_installable() {
        let (universe, mut tester, _suite) = setup(vec![
            binary("blue", "1", "libgreen1", ""),
            binary("libgreen1", "1", "", ""),
        ]);
        assert!(tester.is_installable(&universe, ix(&universe, "blue", "1")));
    }

    #[test]
    fn missing_dependency_is_uninstallable() {
        let (universe, mut tester, _suite) = setup(vec![binary("blue", "1", "libgreen1", "")]);
        assert!(!tester.is_installable(&universe, ix(&universe, "blue", "1")));
    }

    #[test]
    fn conflicting_dependency_chain_is_uninstallable() {
        // app depends on both sides of a conflict
        let (universe, mut tester, _suite) = setup(vec![
            binary("app", "1", "left, right", ""),
            binary("left", "1", "", "right"),
            binary("right", "1", "", ""),
        ]);
        assert!(!tester.is_installable(&universe, ix(&universe, "app", "1")));
        assert!(tester.is_installable(&universe, ix(&universe, "left", "1")));
    }

    #[test]
    fn alternative_saves_the_day() {
        let (universe, mut tester, _suite) = setup(vec![
            binary("app", "1", "broken | working", ""),
            binary("broken", "1", "missing", ""),
            binary("working", "1", "", ""),
        ]);
        assert!(tester.is_installable(&universe, ix(&universe, "app", "1")));
    }

    #[test]
    fn add_and_remove_invalidate_reverse_closure() {
        let (universe, mut tester, _suite) = setup(vec![
            binary("blue", "1", "libgreen1", ""),
            binary("libgreen1", "1", "", ""),
        ]);
        let blue = ix(&universe, "blue", "1");
        let green = ix(&universe, "libgreen1", "1");

        assert!(tester.is_installable(&universe, blue));
        tester.remove_binary(&universe, green);
        assert!(!tester.is_in_target(green));
        assert!(!tester.is_installable(&universe, blue));
        assert!(!tester.is_installable(&universe, green));
        tester.add_binary(&universe, green);
        assert!(tester.is_in_target(green));
        assert!(tester.is_installable(&universe, blue));
    }

    #[test]
    #[should_panic]
    fn double_add_is_fatal() {
        let (universe, mut tester, _suite) = setup(vec![binary("blue", "1", "", "")]);
        tester.add_binary(&universe, ix(&universe, "blue", "1"));
    }
}
