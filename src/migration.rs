// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! The migration manager.
//!
//! Computes, for every candidate item, the set of binaries to add and remove
//! (including smooth update and cruft consequences), applies groups of items
//! to the target suite under a transaction, and evaluates the resulting
//! uninstallability counters against the acceptance rules.

use std::collections::{BTreeSet, HashMap, HashSet};

use debian_archive_utils::architectures::Architecture;
use thiserror::Error;

use crate::config::Config;
use crate::hints::HintCollection;
use crate::loader::AllBinaries;
use crate::migrationitem::{removal_for_cruft_item, MigrationItem};
use crate::suites::{BinaryPackageId, Suites};
use crate::tester::InstallabilityTester;
use crate::transaction::{Journal, UndoOp};
use crate::universe::{PackageUniverse, PkgIx};
use crate::utils::{
    compute_reverse_tree, find_failing_arch, find_smooth_updateable_binaries,
    is_nuninst_asgood_generous, Constraints, Nuninst,
};

/// A group of items cannot be computed or applied; the solver drops the
/// item and carries on.
#[derive(Clone, Debug, Error)]
#[error("migration constraint: {0}")]
pub struct MigrationConstraintError(pub String);

/// Read-only view of the world needed by the migration manager.
#[derive(Clone, Copy)]
pub struct MigrationContext<'a> {
    /// The configuration
    pub config: &'a Config,
    /// The package universe
    pub universe: &'a PackageUniverse,
    /// The active hints
    pub hints: &'a HintCollection,
    /// The keep-installable constraints
    pub constraints: &'a Constraints,
    /// Packages allowed to be uninstallable, per architecture
    pub allow_uninst: &'a HashMap<Architecture, BTreeSet<String>>,
    /// Every known binary record
    pub all_binaries: &'a AllBinaries,
}

/// Result of applying a group of items.
#[derive(Debug)]
pub struct MigrationOutcome {
    /// Whether the result is at least as good as the baseline
    pub accepted: bool,
    /// The uninstallability counters after the change
    pub nuninst_after: Nuninst,
    /// The first architecture failing the acceptance test
    pub failed_arch: Option<Architecture>,
    /// Cruft removal items that became available through this change
    pub new_cruft: BTreeSet<MigrationItem>,
}

/// Transactional apply/rollback of migration groups.
#[derive(Debug, Default)]
pub struct MigrationManager {
    journal: Journal,
}

impl MigrationManager {
    /// Create a manager with no open transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a transaction; every mutation until `commit`/`rollback` is
    /// journalled.
    pub fn start_transaction(&mut self) {
        self.journal.start();
    }

    /// Persist the changes of the open transaction.
    pub fn commit(&mut self) {
        self.journal.commit();
    }

    /// Revert the changes of the open transaction.
    pub fn rollback(
        &mut self,
        universe: &PackageUniverse,
        suites: &mut Suites,
        tester: &mut InstallabilityTester,
    ) {
        self.journal.rollback(universe, suites, tester);
    }

    /// Compute the binaries to add and remove when the item migrates.
    pub fn compute_groups(
        &self,
        ctx: &MigrationContext,
        suites: &Suites,
        item: &MigrationItem,
    ) -> Result<(BTreeSet<BinaryPackageId>, BTreeSet<BinaryPackageId>), MigrationConstraintError>
    {
        let target = &suites.target;
        let mut updates: BTreeSet<BinaryPackageId> = BTreeSet::new();
        let mut removals: BTreeSet<BinaryPackageId> = BTreeSet::new();

        if item.is_removal {
            if item.is_cruft_removal || !item.architecture.is_source() {
                let arch = item.architecture;
                if item.is_cruft_removal {
                    if !target.is_pkg_in_suite(&BinaryPackageId {
                        package_name: item.package.clone(),
                        version: item.version.clone(),
                        architecture: arch,
                    }) {
                        return Err(MigrationConstraintError(format!(
                            "cruft binary {} is no longer in the target suite",
                            item.name()
                        )));
                    }
                    removals.insert(BinaryPackageId {
                        package_name: item.package.clone(),
                        version: item.version.clone(),
                        architecture: arch,
                    });
                } else {
                    let source_t = target.sources.get(&item.package).ok_or_else(|| {
                        MigrationConstraintError(format!(
                            "source {} is not in the target suite",
                            item.package
                        ))
                    })?;
                    removals.extend(
                        source_t
                            .binaries
                            .iter()
                            .filter(|pkg_id| pkg_id.architecture == arch)
                            .cloned(),
                    );
                }
            } else {
                let source_t = target.sources.get(&item.package).ok_or_else(|| {
                    MigrationConstraintError(format!(
                        "source {} is not in the target suite",
                        item.package
                    ))
                })?;
                removals.extend(source_t.binaries.iter().cloned());
            }
        } else {
            let source_suite = suites.get(item.suite);
            let source_u = source_suite.sources.get(&item.package).ok_or_else(|| {
                MigrationConstraintError(format!(
                    "source {} is not in {}",
                    item.package, source_suite.name
                ))
            })?;

            let on_arch = |pkg_id: &&BinaryPackageId| {
                item.architecture.is_source() || pkg_id.architecture == item.architecture
            };

            for pkg_id in source_u.binaries.iter().filter(on_arch) {
                let Some(binary_u) = source_suite
                    .binaries
                    .get(&pkg_id.architecture)
                    .and_then(|packages| packages.get(&pkg_id.package_name))
                else {
                    continue;
                };
                if binary_u.version != pkg_id.version {
                    continue;
                }
                // arch:all binaries only move with the full source
                if !item.architecture.is_source() && binary_u.architecture.is_all() {
                    continue;
                }
                if target.is_pkg_in_suite(pkg_id) {
                    continue;
                }
                updates.insert(pkg_id.clone());
            }

            if let Some(source_t) = target.sources.get(&item.package) {
                let updated_names: HashSet<(&str, Architecture)> = updates
                    .iter()
                    .map(|pkg_id| (pkg_id.package_name.as_str(), pkg_id.architecture))
                    .collect();

                let mut leftovers: Vec<BinaryPackageId> = source_t
                    .binaries
                    .iter()
                    .filter(on_arch)
                    .filter(|pkg_id| {
                        !updated_names
                            .contains(&(pkg_id.package_name.as_str(), pkg_id.architecture))
                    })
                    .filter(|pkg_id| {
                        // arch:all binaries only move with the full source
                        item.architecture.is_source()
                            || target
                                .binaries
                                .get(&pkg_id.architecture)
                                .and_then(|packages| packages.get(&pkg_id.package_name))
                                .is_some_and(|pkg| !pkg.architecture.is_all())
                    })
                    .cloned()
                    .collect();
                leftovers.sort();

                let leftover_set: HashSet<BinaryPackageId> =
                    leftovers.iter().cloned().collect();
                let smoothbins = find_smooth_updateable_binaries(
                    &leftovers,
                    source_u,
                    ctx.universe,
                    target,
                    source_suite,
                    &leftover_set,
                    &ctx.config.smooth_updates,
                    ctx.hints,
                );

                // replaced binaries leave together with the update
                for pkg_id in source_t.binaries.iter().filter(on_arch) {
                    if updated_names
                        .contains(&(pkg_id.package_name.as_str(), pkg_id.architecture))
                    {
                        removals.insert(pkg_id.clone());
                    }
                }
                for pkg_id in leftovers {
                    if !smoothbins.contains(&pkg_id) {
                        removals.insert(pkg_id);
                    }
                }
            }
        }

        // forecast: removing a keep-installable package outright can never
        // be accepted, so do not even try
        for pkg_id in &removals {
            if ctx
                .constraints
                .keep_installable
                .contains(&pkg_id.package_name)
                && !updates
                    .iter()
                    .any(|update| update.package_name == pkg_id.package_name)
            {
                return Err(MigrationConstraintError(format!(
                    "removal of {} would violate keep-installable",
                    pkg_id.package_name
                )));
            }
        }

        Ok((updates, removals))
    }

    fn snapshot_source(&mut self, suites: &Suites, name: &str) {
        self.journal.push(UndoOp::SourceSet {
            name: name.to_owned(),
            old: suites.target.sources.get(name).cloned(),
        });
    }

    fn remove_from_target(
        &mut self,
        ctx: &MigrationContext,
        suites: &mut Suites,
        tester: &mut InstallabilityTester,
        pkg_id: &BinaryPackageId,
    ) {
        if !suites.target.is_pkg_in_suite(pkg_id) {
            return;
        }
        let owner = suites.target.binaries[&pkg_id.architecture][&pkg_id.package_name]
            .source
            .clone();
        self.snapshot_source(suites, &owner);
        let pkg = suites
            .target
            .remove_binary(pkg_id)
            .expect("binary vanished during migration");
        if let Some(src) = suites.target.sources.get_mut(&owner) {
            src.binaries.remove(pkg_id);
        }
        tester.remove_binary(ctx.universe, ctx.universe.must_lookup(pkg_id));
        self.journal.push(UndoOp::BinaryRemoved { pkg });
    }

    fn add_to_target(
        &mut self,
        ctx: &MigrationContext,
        suites: &mut Suites,
        tester: &mut InstallabilityTester,
        pkg_id: &BinaryPackageId,
    ) {
        if let Some(existing) = suites
            .target
            .binaries
            .get(&pkg_id.architecture)
            .and_then(|packages| packages.get(&pkg_id.package_name))
        {
            if existing.version == pkg_id.version {
                return;
            }
            let old_id = existing.pkg_id.clone();
            self.remove_from_target(ctx, suites, tester, &old_id);
        }

        let pkg = match ctx.all_binaries.get(pkg_id) {
            Some(pkg) => pkg.clone(),
            None => panic!("unknown package {}", pkg_id),
        };
        if suites.target.sources.contains_key(&pkg.source) {
            self.snapshot_source(suites, &pkg.source);
            suites
                .target
                .sources
                .get_mut(&pkg.source)
                .expect("source checked above")
                .binaries
                .insert(pkg_id.clone());
        }
        suites.target.insert_binary(pkg);
        tester.add_binary(ctx.universe, ctx.universe.must_lookup(pkg_id));
        self.journal.push(UndoOp::BinaryAdded {
            pkg_id: pkg_id.clone(),
        });
    }

    /// Apply a group of items inside the open transaction, recompute the
    /// uninstallability counters of the affected architectures, and compare
    /// them against `nuninst_last`.
    ///
    /// On a negative outcome, the caller rolls the transaction back.
    pub fn migrate_items_to_target_suite(
        &mut self,
        ctx: &MigrationContext,
        suites: &mut Suites,
        tester: &mut InstallabilityTester,
        items: &[MigrationItem],
        nuninst_last: &Nuninst,
        break_arches: &[Architecture],
    ) -> Result<MigrationOutcome, MigrationConstraintError> {
        assert!(self.journal.is_open(), "migration outside of a transaction");

        let mut all_updates: BTreeSet<BinaryPackageId> = BTreeSet::new();
        let mut all_removals: BTreeSet<BinaryPackageId> = BTreeSet::new();
        let mut per_item: Vec<(&MigrationItem, BTreeSet<BinaryPackageId>)> = vec![];
        let mut old_source_binaries: HashMap<String, BTreeSet<BinaryPackageId>> = HashMap::new();

        for item in items {
            let (updates, removals) = self.compute_groups(ctx, suites, item)?;
            if let Some(source_t) = suites.target.sources.get(&item.package) {
                old_source_binaries
                    .entry(item.package.clone())
                    .or_insert_with(|| source_t.binaries.iter().cloned().collect());
            }
            all_updates.extend(updates.iter().cloned());
            all_removals.extend(removals);
            per_item.push((item, updates));
        }

        // everything whose installability may change
        let mut affected: HashSet<PkgIx> = HashSet::new();
        for pkg_id in all_updates.iter().chain(all_removals.iter()) {
            affected.insert(ctx.universe.must_lookup(pkg_id));
        }
        compute_reverse_tree(ctx.universe, &mut affected);

        for pkg_id in &all_removals {
            self.remove_from_target(ctx, suites, tester, pkg_id);
        }
        for pkg_id in &all_updates {
            self.add_to_target(ctx, suites, tester, pkg_id);
        }

        // update the source records of the target suite
        for (item, updates) in &per_item {
            if item.is_removal {
                if item.architecture.is_source() && !item.is_cruft_removal {
                    self.snapshot_source(suites, &item.package);
                    suites.target.sources.remove(&item.package);
                }
                continue;
            }
            if !item.architecture.is_source() {
                continue;
            }
            let source_suite = suites.get(item.suite);
            let mut record = source_suite.sources[&item.package].clone();
            let mut binaries: HashSet<BinaryPackageId> = HashSet::new();
            for pkg_id in updates {
                if suites.target.is_pkg_in_suite(pkg_id) {
                    binaries.insert(pkg_id.clone());
                }
            }
            if let Some(old) = old_source_binaries.get(&item.package) {
                for pkg_id in old {
                    if suites.target.is_pkg_in_suite(pkg_id) {
                        binaries.insert(pkg_id.clone());
                    }
                }
            }
            record.binaries = binaries;
            self.snapshot_source(suites, &item.package);
            suites.target.sources.insert(item.package.clone(), record);
        }

        // recompute nuninst for the affected architectures only
        let mut nuninst_after = nuninst_last.clone();
        let affected_archs: BTreeSet<Architecture> = affected
            .iter()
            .map(|&ix| ctx.universe.pkg_id(ix).architecture)
            .filter(|arch| ctx.config.architectures.contains(arch))
            .collect();
        for &arch in &affected_archs {
            let check_archall = ctx.config.nobreakall_arches.contains(&arch);
            let empty = Default::default();
            let packages_t_a = suites.target.binaries.get(&arch).unwrap_or(&empty);

            for pkg_id in all_removals.iter().filter(|r| r.architecture == arch) {
                if !packages_t_a.contains_key(&pkg_id.package_name) {
                    if let Some(set) = nuninst_after.arch.get_mut(&arch) {
                        set.remove(&pkg_id.package_name);
                    }
                    if let Some(set) = nuninst_after.arch_all.get_mut(&arch) {
                        set.remove(&pkg_id.package_name);
                    }
                }
            }

            for &ix in affected
                .iter()
                .filter(|&&ix| ctx.universe.pkg_id(ix).architecture == arch)
            {
                let pkg_id = ctx.universe.pkg_id(ix);
                let Some(pkg) = packages_t_a.get(&pkg_id.package_name) else {
                    continue;
                };
                if pkg.version != pkg_id.version {
                    // not the version in the target suite right now
                    continue;
                }
                let installable = tester.is_installable(ctx.universe, ix);
                let name = &pkg_id.package_name;
                let arch_all = nuninst_after.arch_all.entry(arch).or_default();
                let arch_set = nuninst_after.arch.entry(arch).or_default();
                if installable {
                    arch_all.remove(name);
                    arch_set.remove(name);
                } else {
                    arch_all.insert(name.clone());
                    if check_archall || !pkg.architecture.is_all() {
                        arch_set.insert(name.clone());
                    } else {
                        arch_set.remove(name);
                    }
                }
            }
        }

        let accepted = is_nuninst_asgood_generous(
            ctx.constraints,
            ctx.allow_uninst,
            &ctx.config.architectures,
            nuninst_last,
            &nuninst_after,
            break_arches,
        );
        let failed_arch = if accepted {
            None
        } else {
            find_failing_arch(
                ctx.constraints,
                ctx.allow_uninst,
                &ctx.config.architectures,
                nuninst_last,
                &nuninst_after,
                break_arches,
            )
            .map(|(arch, _)| arch)
        };

        // binaries that became cruft through this change are new removal
        // candidates
        let mut new_cruft: BTreeSet<MigrationItem> = BTreeSet::new();
        for (item, _) in &per_item {
            if item.is_removal || !item.architecture.is_source() {
                continue;
            }
            if let Some(old) = old_source_binaries.get(&item.package) {
                for pkg_id in old {
                    if suites.target.is_pkg_in_suite(pkg_id) {
                        let pkg =
                            &suites.target.binaries[&pkg_id.architecture][&pkg_id.package_name];
                        if suites.target.is_cruft(pkg) {
                            new_cruft.insert(removal_for_cruft_item(pkg_id));
                        }
                    }
                }
            }
        }

        Ok(MigrationOutcome {
            accepted,
            nuninst_after,
            failed_arch,
            new_cruft,
        })
    }
}
