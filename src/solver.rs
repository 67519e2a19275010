// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! Ordering of migration groups.
//!
//! Candidate items are related by the dependencies of the binaries they
//! bring in: if an update of item A depends on a binary provided by item B,
//! then B should be attempted before A. Strongly connected components must
//! move together and are merged into one group; the components are emitted
//! dependencies first, ties broken by component size and name.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::migrationitem::MigrationItem;
use crate::suites::BinaryPackageId;
use crate::universe::PackageUniverse;

/// A candidate item with its computed updates and removals.
#[derive(Clone, Debug)]
pub struct GroupInfo {
    /// The migration item
    pub item: MigrationItem,
    /// Binaries entering the target suite
    pub updates: BTreeSet<BinaryPackageId>,
    /// Binaries leaving the target suite
    pub removals: BTreeSet<BinaryPackageId>,
}

fn dependency_edges(universe: &PackageUniverse, groups: &[GroupInfo]) -> Vec<HashSet<usize>> {
    let mut provider: HashMap<&BinaryPackageId, usize> = HashMap::new();
    for (index, group) in groups.iter().enumerate() {
        for pkg_id in &group.updates {
            provider.insert(pkg_id, index);
        }
    }

    let mut edges: Vec<HashSet<usize>> = vec![HashSet::new(); groups.len()];
    for (index, group) in groups.iter().enumerate() {
        for pkg_id in &group.updates {
            let Some(ix) = universe.lookup(pkg_id) else {
                continue;
            };
            for clause in universe.dependencies_of(ix) {
                for &alternative in clause {
                    if let Some(&other) = provider.get(universe.pkg_id(alternative)) {
                        if other != index {
                            edges[index].insert(other);
                        }
                    }
                }
            }
        }
    }
    edges
}

/// Iterative strongly connected components (Kosaraju).
fn strongly_connected_components(edges: &[HashSet<usize>]) -> Vec<Vec<usize>> {
    let n = edges.len();
    let mut finish_order: Vec<usize> = Vec::with_capacity(n);
    let mut visited = vec![false; n];

    for start in 0..n {
        if visited[start] {
            continue;
        }
        let mut stack: Vec<(usize, Vec<usize>)> = vec![(
            start,
            edges[start].iter().copied().collect(),
        )];
        visited[start] = true;
        while !stack.is_empty() {
            let next = stack.last_mut().and_then(|(_, pending)| pending.pop());
            match next {
                Some(next) if !visited[next] => {
                    visited[next] = true;
                    stack.push((next, edges[next].iter().copied().collect()));
                }
                Some(_) => {}
                None => {
                    let (node, _) = stack.pop().expect("stack checked to be non-empty");
                    finish_order.push(node);
                }
            }
        }
    }

    let mut reverse: Vec<HashSet<usize>> = vec![HashSet::new(); n];
    for (from, targets) in edges.iter().enumerate() {
        for &to in targets {
            reverse[to].insert(from);
        }
    }

    let mut component_of = vec![usize::MAX; n];
    let mut components: Vec<Vec<usize>> = vec![];
    for &start in finish_order.iter().rev() {
        if component_of[start] != usize::MAX {
            continue;
        }
        let component_index = components.len();
        let mut members = vec![];
        let mut stack = vec![start];
        component_of[start] = component_index;
        while let Some(node) = stack.pop() {
            members.push(node);
            for &other in &reverse[node] {
                if component_of[other] == usize::MAX {
                    component_of[other] = component_index;
                    stack.push(other);
                }
            }
        }
        components.push(members);
    }
    components
}

/// Order the groups into a worklist: dependencies first, strongly connected
/// components merged, smallest component and lexicographically first name on
/// ties.
pub fn solve_groups(universe: &PackageUniverse, groups: &[GroupInfo]) -> Vec<Vec<MigrationItem>> {
    if groups.is_empty() {
        return vec![];
    }

    let edges = dependency_edges(universe, groups);
    let components = strongly_connected_components(&edges);
    let component_of: HashMap<usize, usize> = components
        .iter()
        .enumerate()
        .flat_map(|(component, members)| {
            members.iter().map(move |&member| (member, component))
        })
        .collect();

    // component-level DAG: component A depends on component B
    let mut comp_deps: Vec<HashSet<usize>> = vec![HashSet::new(); components.len()];
    let mut comp_rdeps: Vec<HashSet<usize>> = vec![HashSet::new(); components.len()];
    for (from, targets) in edges.iter().enumerate() {
        for &to in targets {
            let (cf, ct) = (component_of[&from], component_of[&to]);
            if cf != ct {
                comp_deps[cf].insert(ct);
                comp_rdeps[ct].insert(cf);
            }
        }
    }

    let sort_key = |component: usize| {
        let mut names: Vec<String> = components[component]
            .iter()
            .map(|&member| groups[member].item.uvname())
            .collect();
        names.sort();
        (components[component].len(), names)
    };

    // Kahn's algorithm with a deterministic ready queue
    let mut pending: Vec<usize> = (0..components.len()).collect();
    let mut remaining_deps: Vec<usize> = comp_deps.iter().map(|deps| deps.len()).collect();
    let mut ready: BTreeSet<(usize, Vec<String>, usize)> = pending
        .iter()
        .filter(|&&component| remaining_deps[component] == 0)
        .map(|&component| {
            let (size, names) = sort_key(component);
            (size, names, component)
        })
        .collect();
    pending.retain(|&component| remaining_deps[component] != 0);

    let mut worklist: Vec<Vec<MigrationItem>> = vec![];
    while let Some(entry) = ready.iter().next().cloned() {
        ready.remove(&entry);
        let component = entry.2;
        let mut items: Vec<MigrationItem> = components[component]
            .iter()
            .map(|&member| groups[member].item.clone())
            .collect();
        items.sort();
        worklist.push(items);

        for &dependent in &comp_rdeps[component] {
            remaining_deps[dependent] -= 1;
            if remaining_deps[dependent] == 0 {
                let (size, names) = sort_key(dependent);
                ready.insert((size, names, dependent));
                pending.retain(|&other| other != dependent);
            }
        }
    }

    // a cycle between components cannot happen after SCC merging
    debug_assert!(pending.is_empty());
    worklist
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::suites::{BinaryPackage, PackageId, SuiteRef};
    use debian_archive_utils::{
        architectures::Architecture, package::MultiArch, relations::parse_relations,
        version::PackageVersion,
    };
    use std::collections::HashMap;

    fn version(s: &str) -> PackageVersion {
        PackageVersion::try_from(s).unwrap()
    }

    fn binary(name: &str, ver: &str, depends: &str) -> (PackageId, BinaryPackage) {
        let pkg_id = PackageId::binary(name, version(ver), Architecture::Amd64);
        let pkg = BinaryPackage {
            version: version(ver),
            section: Some("devel".to_owned()),
            source: name.to_owned(),
            source_version: version(ver),
            architecture: Architecture::Amd64,
            multi_arch: MultiArch::No,
            depends: parse_relations(depends).unwrap(),
            conflicts: vec![],
            provides: vec![],
            is_essential: false,
            pkg_id: pkg_id.clone(),
            built_using: vec![],
        };
        (pkg_id, pkg)
    }

    fn item(package: &str) -> MigrationItem {
        MigrationItem {
            package: package.to_owned(),
            version: version("2"),
            architecture: Architecture::Source,
            suite: SuiteRef::Source(0),
            suite_suffix: String::new(),
            is_removal: false,
            is_cruft_removal: false,
        }
    }

    fn group(universe_pkg: &PackageId, package: &str) -> GroupInfo {
        GroupInfo {
            item: item(package),
            updates: [universe_pkg.clone()].into_iter().collect(),
            removals: BTreeSet::new(),
        }
    }

    #[test]
    fn dependencies_come_first() {
        let (app_id, app) = binary("app", "2", "lib");
        let (lib_id, lib) = binary("lib", "2", "");
        let all: HashMap<PackageId, BinaryPackage> =
            [(app_id.clone(), app), (lib_id.clone(), lib)].into();
        let universe = PackageUniverse::build(&all);

        let groups = vec![group(&app_id, "app"), group(&lib_id, "lib")];
        let worklist = solve_groups(&universe, &groups);
        assert_eq!(worklist.len(), 2);
        assert_eq!(worklist[0][0].package, "lib");
        assert_eq!(worklist[1][0].package, "app");
    }

    #[test]
    fn circular_groups_are_merged() {
        let (a_id, a) = binary("alpha", "2", "beta (>= 2)");
        let (b_id, b) = binary("beta", "2", "alpha (>= 2)");
        let all: HashMap<PackageId, BinaryPackage> =
            [(a_id.clone(), a), (b_id.clone(), b)].into();
        let universe = PackageUniverse::build(&all);

        let groups = vec![group(&a_id, "alpha"), group(&b_id, "beta")];
        let worklist = solve_groups(&universe, &groups);
        assert_eq!(worklist.len(), 1);
        let names: Vec<&str> = worklist[0]
            .iter()
            .map(|item| item.package.as_str())
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn independent_groups_sort_by_name() {
        let (a_id, a) = binary("zeta", "2", "");
        let (b_id, b) = binary("alpha", "2", "");
        let all: HashMap<PackageId, BinaryPackage> =
            [(a_id.clone(), a), (b_id.clone(), b)].into();
        let universe = PackageUniverse::build(&all);

        let groups = vec![group(&a_id, "zeta"), group(&b_id, "alpha")];
        let worklist = solve_groups(&universe, &groups);
        assert_eq!(worklist[0][0].package, "alpha");
        assert_eq!(worklist[1][0].package, "zeta");
    }
}
