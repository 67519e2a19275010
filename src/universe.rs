// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! The package universe: an immutable graph over every binary package of
//! every suite, with dependency clauses in CNF, the negative (conflict)
//! neighbourhood and reverse dependency edges.
//!
//! Packages are assigned dense integer ids so that the installability tester
//! and the migration manager can work on plain index vectors.

use std::collections::HashMap;

use debian_archive_utils::{
    architectures::Architecture, package::MultiArch, relations::Relation,
    version::PackageVersion,
};
use smallvec::SmallVec;

use crate::suites::{BinaryPackage, BinaryPackageId};

/// Dense id of a binary package within the universe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PkgIx(u32);

impl PkgIx {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// One alternative list of a dependency clause.
pub type DepClause = SmallVec<[PkgIx; 4]>;

/// The immutable package universe.
#[derive(Debug)]
pub struct PackageUniverse {
    ids: Vec<BinaryPackageId>,
    index: HashMap<BinaryPackageId, PkgIx>,
    dependencies: Vec<Vec<DepClause>>,
    negative_deps: Vec<Vec<PkgIx>>,
    reverse_deps: Vec<Vec<PkgIx>>,
}

struct Candidate {
    ix: PkgIx,
    version: PackageVersion,
    multi_arch: MultiArch,
}

impl PackageUniverse {
    /// Build the universe over all known binaries.
    pub fn build(all_binaries: &HashMap<BinaryPackageId, BinaryPackage>) -> Self {
        let mut ids: Vec<BinaryPackageId> = all_binaries.keys().cloned().collect();
        ids.sort();

        let index: HashMap<BinaryPackageId, PkgIx> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), PkgIx(i as u32)))
            .collect();

        // name and provides lookup tables over the whole universe
        let mut by_name: HashMap<(&str, Architecture), Vec<Candidate>> = HashMap::new();
        let mut by_provides: HashMap<(&str, Architecture), Vec<(PkgIx, Option<PackageVersion>)>> =
            HashMap::new();
        for (i, id) in ids.iter().enumerate() {
            let ix = PkgIx(i as u32);
            let pkg = &all_binaries[id];
            by_name
                .entry((id.package_name.as_str(), id.architecture))
                .or_default()
                .push(Candidate {
                    ix,
                    version: id.version.clone(),
                    multi_arch: pkg.multi_arch,
                });
            for provider in &pkg.provides {
                by_provides
                    .entry((provider.package.as_str(), id.architecture))
                    .or_default()
                    .push((ix, provider.version.clone()));
            }
        }

        let resolve = |relation: &Relation, arch: Architecture, exclude_name: Option<&str>| {
            let mut out: Vec<PkgIx> = Vec::new();
            match relation.archqual.as_deref() {
                // `:any` only matches Multi-Arch: allowed packages; other
                // qualifiers cannot be satisfied within one architecture
                Some("any") => {
                    if let Some(candidates) = by_name.get(&(relation.package.as_str(), arch)) {
                        for candidate in candidates {
                            if candidate.multi_arch == MultiArch::Allowed
                                && relation
                                    .constraint
                                    .as_ref()
                                    .is_none_or(|c| c.satisfied_by(&candidate.version))
                            {
                                out.push(candidate.ix);
                            }
                        }
                    }
                }
                Some(_) => {}
                None => {
                    if exclude_name != Some(relation.package.as_str()) {
                        if let Some(candidates) = by_name.get(&(relation.package.as_str(), arch)) {
                            for candidate in candidates {
                                if relation
                                    .constraint
                                    .as_ref()
                                    .is_none_or(|c| c.satisfied_by(&candidate.version))
                                {
                                    out.push(candidate.ix);
                                }
                            }
                        }
                    }
                    // a provides only satisfies an unversioned dependency or a
                    // versioned one with a matching versioned provides
                    if let Some(providers) = by_provides.get(&(relation.package.as_str(), arch)) {
                        for (ix, provided_version) in providers {
                            let satisfied = match &relation.constraint {
                                None => true,
                                Some(constraint) => provided_version
                                    .as_ref()
                                    .is_some_and(|version| constraint.satisfied_by(version)),
                            };
                            if satisfied
                                && exclude_name != Some(ids[ix.index()].package_name.as_str())
                            {
                                out.push(*ix);
                            }
                        }
                    }
                }
            }
            out.sort();
            out.dedup();
            out
        };

        let mut dependencies: Vec<Vec<DepClause>> = Vec::with_capacity(ids.len());
        let mut negative_deps: Vec<Vec<PkgIx>> = vec![Vec::new(); ids.len()];

        for id in &ids {
            let pkg = &all_binaries[id];
            let arch = id.architecture;

            let mut clauses: Vec<DepClause> = Vec::with_capacity(pkg.depends.len());
            for clause in &pkg.depends {
                let mut alternatives = DepClause::new();
                for relation in clause {
                    alternatives.extend(resolve(relation, arch, None));
                }
                alternatives.sort();
                alternatives.dedup();
                clauses.push(alternatives);
            }
            dependencies.push(clauses);

            // conflicts never apply to the package itself
            let ix = index[id];
            for clause in &pkg.conflicts {
                for relation in clause {
                    for other in resolve(relation, arch, Some(id.package_name.as_str())) {
                        negative_deps[ix.index()].push(other);
                        negative_deps[other.index()].push(ix);
                    }
                }
            }
        }

        for negatives in &mut negative_deps {
            negatives.sort();
            negatives.dedup();
        }

        let mut reverse_deps: Vec<Vec<PkgIx>> = vec![Vec::new(); ids.len()];
        for (i, clauses) in dependencies.iter().enumerate() {
            for clause in clauses {
                for &dep in clause {
                    reverse_deps[dep.index()].push(PkgIx(i as u32));
                }
            }
        }
        for rdeps in &mut reverse_deps {
            rdeps.sort();
            rdeps.dedup();
        }

        Self {
            ids,
            index,
            dependencies,
            negative_deps,
            reverse_deps,
        }
    }

    /// Number of packages in the universe.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the universe is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Look up the id of a package.
    pub fn lookup(&self, pkg_id: &BinaryPackageId) -> Option<PkgIx> {
        self.index.get(pkg_id).copied()
    }

    /// Look up the id of a package that must be known.
    ///
    /// Panics on unknown packages; those indicate a loader bug.
    pub fn must_lookup(&self, pkg_id: &BinaryPackageId) -> PkgIx {
        match self.lookup(pkg_id) {
            Some(ix) => ix,
            None => panic!("unknown package {}", pkg_id),
        }
    }

    /// The package id of a universe id.
    pub fn pkg_id(&self, ix: PkgIx) -> &BinaryPackageId {
        &self.ids[ix.index()]
    }

    /// The dependency clauses of a package.
    pub fn dependencies_of(&self, ix: PkgIx) -> &[DepClause] {
        &self.dependencies[ix.index()]
    }

    /// The packages in a mutual conflict with the given package.
    pub fn negative_dependencies_of(&self, ix: PkgIx) -> &[PkgIx] {
        &self.negative_deps[ix.index()]
    }

    /// The packages with a dependency alternative on the given package.
    pub fn reverse_dependencies_of(&self, ix: PkgIx) -> &[PkgIx] {
        &self.reverse_deps[ix.index()]
    }

    /// Iterate over all package ids with their universe ids.
    pub fn iter(&self) -> impl Iterator<Item = (PkgIx, &BinaryPackageId)> {
        self.ids
            .iter()
            .enumerate()
            .map(|(i, id)| (PkgIx(i as u32), id))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::suites::{PackageId, Provider};
    use debian_archive_utils::relations::parse_relations;

    fn version(s: &str) -> PackageVersion {
        PackageVersion::try_from(s).unwrap()
    }

    fn binary(
        name: &str,
        ver: &str,
        depends: &str,
        conflicts: &str,
        provides: Vec<Provider>,
    ) -> (BinaryPackageId, BinaryPackage) {
        let pkg_id = PackageId::binary(name, version(ver), Architecture::Amd64);
        let pkg = BinaryPackage {
            version: version(ver),
            section: Some("devel".to_owned()),
            source: name.to_owned(),
            source_version: version(ver),
            architecture: Architecture::Amd64,
            multi_arch: MultiArch::No,
            depends: parse_relations(depends).unwrap(),
            conflicts: parse_relations(conflicts).unwrap(),
            provides,
            is_essential: false,
            pkg_id: pkg_id.clone(),
            built_using: vec![],
        };
        (pkg_id, pkg)
    }

    fn universe(packages: Vec<(BinaryPackageId, BinaryPackage)>) -> PackageUniverse {
        PackageUniverse::build(&packages.into_iter().collect())
    }

    #[test]
    fn versioned_dependency_resolution() {
        let universe = universe(vec![
            binary("blue", "1", "libgreen1 (>= 2)", "", vec![]),
            binary("libgreen1", "1", "", "", vec![]),
            binary("libgreen1", "2", "", "", vec![]),
        ]);

        let blue = universe.must_lookup(&PackageId::binary(
            "blue",
            version("1"),
            Architecture::Amd64,
        ));
        let green2 = universe.must_lookup(&PackageId::binary(
            "libgreen1",
            version("2"),
            Architecture::Amd64,
        ));
        let clauses = universe.dependencies_of(blue);
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].as_slice(), &[green2]);
        assert_eq!(universe.reverse_dependencies_of(green2), &[blue]);
    }

    #[test]
    fn provides_resolution() {
        let universe = universe(vec![
            binary("mutt", "1", "mail-transport-agent", "", vec![]),
            binary(
                "postfix",
                "1",
                "",
                "",
                vec![Provider {
                    package: "mail-transport-agent".to_owned(),
                    version: None,
                }],
            ),
            binary(
                "exim4",
                "1",
                "",
                "",
                vec![Provider {
                    package: "mail-transport-agent".to_owned(),
                    version: Some(version("4.96")),
                }],
            ),
        ]);

        let mutt = universe.must_lookup(&PackageId::binary(
            "mutt",
            version("1"),
            Architecture::Amd64,
        ));
        assert_eq!(universe.dependencies_of(mutt)[0].len(), 2);
    }

    #[test]
    fn versioned_provides_needs_matching_version() {
        let universe = universe(vec![
            binary("app", "1", "api (>= 2)", "", vec![]),
            binary(
                "impl-old",
                "1",
                "",
                "",
                vec![Provider {
                    package: "api".to_owned(),
                    version: Some(version("1")),
                }],
            ),
            binary(
                "impl-new",
                "1",
                "",
                "",
                vec![Provider {
                    package: "api".to_owned(),
                    version: Some(version("2")),
                }],
            ),
            binary(
                "impl-unversioned",
                "1",
                "",
                "",
                vec![Provider {
                    package: "api".to_owned(),
                    version: None,
                }],
            ),
        ]);

        let app =
            universe.must_lookup(&PackageId::binary("app", version("1"), Architecture::Amd64));
        let new = universe.must_lookup(&PackageId::binary(
            "impl-new",
            version("1"),
            Architecture::Amd64,
        ));
        assert_eq!(universe.dependencies_of(app)[0].as_slice(), &[new]);
    }

    #[test]
    fn conflicts_are_symmetric_and_skip_self() {
        let universe = universe(vec![
            binary("purple", "1", "", "lightgreen (<< 3)", vec![]),
            binary("lightgreen", "2", "", "", vec![]),
            // self conflicts are ignored
            binary("selfish", "1", "", "selfish", vec![]),
        ]);

        let purple = universe.must_lookup(&PackageId::binary(
            "purple",
            version("1"),
            Architecture::Amd64,
        ));
        let lightgreen = universe.must_lookup(&PackageId::binary(
            "lightgreen",
            version("2"),
            Architecture::Amd64,
        ));
        let selfish = universe.must_lookup(&PackageId::binary(
            "selfish",
            version("1"),
            Architecture::Amd64,
        ));
        assert_eq!(universe.negative_dependencies_of(purple), &[lightgreen]);
        assert_eq!(universe.negative_dependencies_of(lightgreen), &[purple]);
        assert!(universe.negative_dependencies_of(selfish).is_empty());
    }

    #[test]
    #[should_panic(expected = "unknown package")]
    fn unknown_package_is_fatal() {
        let universe = universe(vec![]);
        universe.must_lookup(&PackageId::binary(
            "ghost",
            version("1"),
            Architecture::Amd64,
        ));
    }
}
