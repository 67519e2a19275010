// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! Implicit dependency policy.
//!
//! A Breaks/Conflicts relation effectively becomes an inverted dependency:
//! if the new `q` breaks `p` currently in the target suite, a newer `p` must
//! migrate before (or together with) `q`. When no newer `p` exists anywhere,
//! migrating `q` would leave `p` broken for good.

use std::collections::BTreeSet;

use debian_archive_utils::architectures::Architecture;
use serde_yaml::Mapping;

use crate::excuse::{DependencyKind, DependencySpec, Excuse};
use crate::migrationitem::MigrationItem;
use crate::policies::{Policy, PolicyContext, PolicyVerdict};
use crate::suites::{BinaryPackage, PackageId, SourcePackage, SuiteClass, Suites};

/// Newer versions of the binary (or of its source, where the binary was
/// dropped) available in any source suite.
fn find_newer_binaries(suites: &Suites, pkg: &BinaryPackage) -> Vec<PackageId> {
    let arch = pkg.pkg_id.architecture;
    let mut newer = vec![];

    for suite in &suites.sources {
        let newerbin = suite
            .binaries
            .get(&arch)
            .and_then(|packages| packages.get(&pkg.pkg_id.package_name))
            // cruft binaries are treated as if the source dropped them
            .filter(|candidate| !suite.is_cruft(candidate));

        match newerbin {
            Some(candidate) => {
                if candidate.version > pkg.version {
                    newer.push(candidate.pkg_id.clone());
                }
            }
            None => {
                if let Some(newer_src) = suite.sources.get(&pkg.source) {
                    if newer_src.version > pkg.source_version {
                        newer.push(PackageId::source(&pkg.source, newer_src.version.clone()));
                    }
                }
            }
        }
    }

    newer
}

/// The implicit dependency policy.
#[derive(Debug, Default)]
pub struct ImplicitDependencyPolicy;

impl ImplicitDependencyPolicy {
    /// Create the policy.
    pub fn new() -> Self {
        Self
    }

    fn check_arch(
        &self,
        ctx: &PolicyContext,
        item: &MigrationItem,
        arch: Architecture,
        source_u: &SourcePackage,
        excuse: &mut Excuse,
    ) -> PolicyVerdict {
        let source_suite = ctx.suites.get(item.suite);
        let target = &ctx.suites.target;
        let mut verdict = PolicyVerdict::Pass;

        let mut pkg_ids: Vec<&PackageId> = source_u
            .binaries
            .iter()
            .filter(|pkg_id| pkg_id.architecture == arch)
            .collect();
        pkg_ids.sort();

        for pkg_id in pkg_ids {
            if !source_suite
                .binaries
                .get(&arch)
                .and_then(|packages| packages.get(&pkg_id.package_name))
                .is_some_and(|pkg| pkg.version == pkg_id.version)
            {
                continue;
            }
            let Some(ix) = ctx.universe.lookup(pkg_id) else {
                continue;
            };

            for &broken_ix in ctx.universe.negative_dependencies_of(ix) {
                let broken_id = ctx.universe.pkg_id(broken_ix);
                if broken_id.architecture != arch || !target.is_pkg_in_suite(broken_id) {
                    continue;
                }
                let broken_pkg = &target.binaries[&arch][&broken_id.package_name];
                // binaries of the same source leave together with the old
                // source version
                if broken_pkg.source == source_u.source {
                    continue;
                }

                let newer = find_newer_binaries(ctx.suites, broken_pkg);
                if newer.is_empty() {
                    verdict = PolicyVerdict::RejectedPermanently;
                    excuse.addreason(DependencyKind::ImplicitDependency.reason());
                    excuse.add_verdict_info(
                        verdict,
                        format!(
                            "{}/{} breaks {} and no newer version is available",
                            pkg_id.package_name, arch, broken_id.package_name
                        ),
                    );
                } else {
                    excuse.add_package_depends(
                        DependencySpec::on_arch(DependencyKind::ImplicitDependency, arch),
                        newer.into_iter().collect::<BTreeSet<_>>(),
                    );
                }
            }
        }

        verdict
    }
}

impl Policy for ImplicitDependencyPolicy {
    fn policy_id(&self) -> &'static str {
        "implicit-deps"
    }

    fn applies_to(&self, class: SuiteClass) -> bool {
        class.is_source()
    }

    fn apply_src(
        &mut self,
        ctx: &PolicyContext,
        _info: &mut Mapping,
        item: &MigrationItem,
        _source_t: Option<&SourcePackage>,
        source_u: &SourcePackage,
        excuse: &mut Excuse,
    ) -> PolicyVerdict {
        let mut verdict = PolicyVerdict::Pass;
        for &arch in &ctx.config.architectures {
            if ctx.config.break_arches.contains(&arch) || ctx.config.new_arches.contains(&arch) {
                continue;
            }
            verdict = verdict.max(self.check_arch(ctx, item, arch, source_u, excuse));
        }
        verdict
    }

    fn apply_srcarch(
        &mut self,
        ctx: &PolicyContext,
        _info: &mut Mapping,
        item: &MigrationItem,
        arch: Architecture,
        _source_t: Option<&SourcePackage>,
        source_u: &SourcePackage,
        excuse: &mut Excuse,
    ) -> PolicyVerdict {
        if ctx.config.break_arches.contains(&arch) || ctx.config.new_arches.contains(&arch) {
            return PolicyVerdict::NotApplicable;
        }
        self.check_arch(ctx, item, arch, source_u, excuse)
    }
}
