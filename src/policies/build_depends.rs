// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! Build dependency satisfaction policy.
//!
//! The build dependencies of the source must remain satisfiable in the
//! target suite after migration. Clauses only satisfiable from the source
//! suite become dependencies on the providing excuses.

use std::collections::BTreeSet;

use debian_archive_utils::architectures::Architecture;
use debian_archive_utils::relations::{parse_relations, RelationClause};
use log::warn;
use serde_yaml::{Mapping, Value};

use crate::excuse::{DependencyKind, DependencySpec, Excuse};
use crate::migrationitem::MigrationItem;
use crate::policies::{Policy, PolicyContext, PolicyVerdict};
use crate::suites::{PackageId, SourcePackage, SuiteClass};
use crate::utils::get_dependency_solvers;

/// The build dependency policy.
#[derive(Debug, Default)]
pub struct BuildDependsPolicy;

impl BuildDependsPolicy {
    /// Create the policy.
    pub fn new() -> Self {
        Self
    }

    fn check_clauses(
        &self,
        ctx: &PolicyContext,
        item: &MigrationItem,
        arch: Architecture,
        clauses: &[RelationClause],
        kind: DependencyKind,
        info: &mut Mapping,
        excuse: &mut Excuse,
    ) -> PolicyVerdict {
        let source_suite = ctx.suites.get(item.suite);
        let target = &ctx.suites.target;
        let empty = Default::default();
        let empty_provides = Default::default();
        let binaries_t = target.binaries.get(&arch).unwrap_or(&empty);
        let provides_t = target.provides_table.get(&arch).unwrap_or(&empty_provides);
        let binaries_s = source_suite.binaries.get(&arch).unwrap_or(&empty);
        let provides_s = source_suite
            .provides_table
            .get(&arch)
            .unwrap_or(&empty_provides);

        let mut verdict = PolicyVerdict::Pass;
        for clause in clauses {
            let applicable: RelationClause = clause
                .iter()
                .filter(|relation| relation.applies_to_arch(arch.as_str()))
                .cloned()
                .collect();
            if applicable.is_empty() {
                continue;
            }
            if !get_dependency_solvers(&applicable, binaries_t, provides_t, true).is_empty() {
                continue;
            }
            let solvers_s = get_dependency_solvers(&applicable, binaries_s, provides_s, true);
            let signature = applicable
                .iter()
                .map(|relation| relation.to_string())
                .collect::<Vec<_>>()
                .join(" | ");

            if solvers_s.is_empty() {
                verdict = PolicyVerdict::RejectedPermanently;
                excuse.add_verdict_info(
                    verdict,
                    format!(
                        "{} unsatisfiable {} on {}: {}",
                        excuse.uvname(),
                        kind.label(),
                        arch,
                        signature
                    ),
                );
                excuse.addreason(kind.reason());
                let key = Value::String(format!("unsatisfiable-{}", arch));
                info.insert(key, Value::String(signature));
                continue;
            }

            let depends: BTreeSet<PackageId> = solvers_s
                .iter()
                .map(|solver| solver.pkg_id.clone())
                .collect();
            excuse.add_package_depends(DependencySpec::on_arch(kind, arch), depends);
        }
        verdict
    }
}

impl Policy for BuildDependsPolicy {
    fn policy_id(&self) -> &'static str {
        "build-depends"
    }

    fn applies_to(&self, class: SuiteClass) -> bool {
        class.is_source()
    }

    fn apply_src(
        &mut self,
        ctx: &PolicyContext,
        info: &mut Mapping,
        item: &MigrationItem,
        _source_t: Option<&SourcePackage>,
        source_u: &SourcePackage,
        excuse: &mut Excuse,
    ) -> PolicyVerdict {
        let mut verdict = PolicyVerdict::Pass;

        if let Some(raw) = &source_u.build_deps_arch {
            match parse_relations(raw) {
                Ok(clauses) => {
                    for &arch in &ctx.config.architectures {
                        if ctx.config.break_arches.contains(&arch)
                            || ctx.config.new_arches.contains(&arch)
                        {
                            continue;
                        }
                        let arch_verdict = self.check_clauses(
                            ctx,
                            item,
                            arch,
                            &clauses,
                            DependencyKind::BuildDepends,
                            info,
                            excuse,
                        );
                        verdict = verdict.max(arch_verdict);
                    }
                }
                Err(error) => {
                    warn!(
                        "unparsable Build-Depends of {}: {}",
                        source_u.source, error
                    );
                }
            }
        }

        if let Some(raw) = &source_u.build_deps_indep {
            match parse_relations(raw) {
                Ok(clauses) => {
                    // arch independent builds happen once; check the first
                    // architecture that can host them
                    if let Some(&arch) = ctx.config.architectures.iter().find(|arch| {
                        !ctx.config.break_arches.contains(arch)
                            && !ctx.config.new_arches.contains(arch)
                    }) {
                        let arch_verdict = self.check_clauses(
                            ctx,
                            item,
                            arch,
                            &clauses,
                            DependencyKind::BuildDependsIndep,
                            info,
                            excuse,
                        );
                        verdict = verdict.max(arch_verdict);
                    }
                }
                Err(error) => {
                    warn!(
                        "unparsable Build-Depends-Indep of {}: {}",
                        source_u.source, error
                    );
                }
            }
        }

        verdict
    }
}
