// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! Dependency satisfaction policy.
//!
//! Every binary the source builds must have its dependencies satisfiable in
//! the target suite after migration. Clauses that only the source suite can
//! satisfy become dependencies on the excuses that provide those packages;
//! clauses nobody can satisfy reject the item.

use debian_archive_utils::architectures::Architecture;
use serde_yaml::{Mapping, Value};

use crate::excuse::{DependencyKind, DependencySpec, Excuse};
use crate::migrationitem::MigrationItem;
use crate::policies::{Policy, PolicyContext, PolicyVerdict};
use crate::suites::{PackageId, SourcePackage, SuiteClass};
use crate::utils::get_dependency_solvers;

/// Policy checking `Depends` of all binaries of the source.
#[derive(Debug, Default)]
pub struct DependsPolicy;

impl DependsPolicy {
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
        let empty = Default::default();
        let binaries_t = target.binaries.get(&arch).unwrap_or(&empty);
        let empty_provides = Default::default();
        let provides_t = target.provides_table.get(&arch).unwrap_or(&empty_provides);
        let binaries_s = source_suite.binaries.get(&arch).unwrap_or(&empty);
        let provides_s = source_suite
            .provides_table
            .get(&arch)
            .unwrap_or(&empty_provides);

        let unimportant = ctx.config.break_arches.contains(&arch)
            || ctx.config.new_arches.contains(&arch);
        let mut verdict = PolicyVerdict::Pass;
        let mut any_unsat = false;

        let mut pkg_ids: Vec<&PackageId> = source_u
            .binaries
            .iter()
            .filter(|pkg_id| pkg_id.architecture == arch)
            .collect();
        pkg_ids.sort();

        for pkg_id in pkg_ids {
            let Some(binary_u) = binaries_s.get(&pkg_id.package_name) else {
                continue;
            };
            if binary_u.version != pkg_id.version {
                continue;
            }

            for clause in &binary_u.depends {
                if !get_dependency_solvers(clause, binaries_t, provides_t, false).is_empty() {
                    continue;
                }
                let solvers_s = get_dependency_solvers(clause, binaries_s, provides_s, false);
                let signature = clause
                    .iter()
                    .map(|relation| relation.to_string())
                    .collect::<Vec<_>>()
                    .join(" | ");

                if solvers_s.is_empty() {
                    any_unsat = true;
                    excuse.add_unsatisfiable_dep(signature.clone(), arch);
                    if unimportant {
                        excuse.add_detailed_info(format!(
                            "{}/{} has unsatisfiable dependency {} (but {} is not a blocker)",
                            pkg_id.package_name, arch, signature, arch
                        ));
                    } else {
                        verdict = PolicyVerdict::RejectedPermanently;
                        excuse.add_verdict_info(
                            verdict,
                            format!(
                                "{}/{} unsatisfiable Depends: {}",
                                pkg_id.package_name, arch, signature
                            ),
                        );
                    }
                    continue;
                }

                if unimportant {
                    // migrations on break/new architectures do not wait for
                    // their dependencies, but note them for the output
                    for solver in &solvers_s {
                        excuse.add_break_dep(&solver.source, arch);
                    }
                    continue;
                }

                let depends: std::collections::BTreeSet<PackageId> = solvers_s
                    .iter()
                    .map(|solver| solver.pkg_id.clone())
                    .collect();
                excuse.add_package_depends(
                    DependencySpec::on_arch(DependencyKind::Depends, arch),
                    depends,
                );
            }
        }

        if any_unsat && !unimportant {
            excuse.add_unsatisfiable_on_arch(arch);
        }
        verdict
    }
}

impl Policy for DependsPolicy {
    fn policy_id(&self) -> &'static str {
        "depends"
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
            let arch_verdict = self.check_arch(ctx, item, arch, source_u, excuse);
            if arch_verdict > verdict {
                verdict = arch_verdict;
            }
        }
        verdict
    }

    fn apply_srcarch(
        &mut self,
        ctx: &PolicyContext,
        info: &mut Mapping,
        item: &MigrationItem,
        arch: Architecture,
        _source_t: Option<&SourcePackage>,
        source_u: &SourcePackage,
        excuse: &mut Excuse,
    ) -> PolicyVerdict {
        let verdict = self.check_arch(ctx, item, arch, source_u, excuse);
        if verdict.is_rejected() {
            info.insert(
                Value::String("unsatisfiable-on".to_owned()),
                Value::String(arch.to_string()),
            );
        }
        verdict
    }
}
