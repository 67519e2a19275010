// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! The excuse finder.
//!
//! Synthesises an excuse for every candidate: removals of sources that left
//! the primary source suite, source upgrades (with out-of-date detection),
//! and per-architecture binary migrations. Policies are applied to every
//! excuse; finally excuses depending on rejected excuses are invalidated
//! transitively. The surviving valid excuses form the actionable set.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use debian_archive_utils::architectures::Architecture;
use log::info;

use crate::config::Config;
use crate::excuse::Excuse;
use crate::hints::HintCollection;
use crate::loader::AllBinaries;
use crate::migrationitem::MigrationItem;
use crate::policies::{PolicyContext, PolicyEngine, PolicyVerdict};
use crate::suites::{PackageId, SuiteRef, Suites};
use crate::universe::PackageUniverse;
use crate::utils::{find_smooth_updateable_binaries, invalidate_excuses};

/// Generator of the excuses and the actionable item set.
pub struct ExcuseFinder<'a> {
    /// The configuration
    pub config: &'a Config,
    /// All suites
    pub suites: &'a Suites,
    /// Every known binary
    pub all_binaries: &'a AllBinaries,
    /// The package universe
    pub universe: &'a PackageUniverse,
    /// The active hints
    pub hints: &'a HintCollection,
    /// The policy engine
    pub policy_engine: &'a mut PolicyEngine,
    excuses: BTreeMap<String, Excuse>,
}

impl<'a> ExcuseFinder<'a> {
    /// Create a finder over the loaded world.
    pub fn new(
        config: &'a Config,
        suites: &'a Suites,
        all_binaries: &'a AllBinaries,
        universe: &'a PackageUniverse,
        hints: &'a HintCollection,
        policy_engine: &'a mut PolicyEngine,
    ) -> Self {
        Self {
            config,
            suites,
            all_binaries,
            universe,
            hints,
            policy_engine,
            excuses: BTreeMap::new(),
        }
    }

    fn policy_context(&self) -> PolicyContext<'a> {
        PolicyContext {
            config: self.config,
            suites: self.suites,
            universe: self.universe,
            hints: self.hints,
        }
    }

    /// Check if a source package should be removed from the target suite;
    /// this happens when it is no longer in the primary source suite.
    fn should_remove_source(&mut self, item: &MigrationItem) -> bool {
        // removals only ever consult the primary source suite
        let source_suite = self.suites.primary_source_suite();
        if source_suite.sources.contains_key(&item.package) {
            return false;
        }

        let src = &self.suites.target.sources[&item.package];
        let mut excuse = Excuse::new(item.clone());
        excuse.addinfo(format!(
            "Package not in {}, will try to remove",
            source_suite.name
        ));
        excuse.set_vers(Some(&src.version.to_string()), None);
        if let Some(maintainer) = &src.maintainer {
            excuse.set_maint(maintainer);
        }
        if !src.section.is_empty() {
            excuse.set_section(&src.section);
        }

        if let Some(hint) = self
            .hints
            .search("block", Some(&item.package), None, None, Some(true))
            .first()
        {
            excuse.set_verdict(PolicyVerdict::RejectedPermanently);
            excuse.add_verdict_info(
                excuse.policy_verdict(),
                format!(
                    "Not touching package, as requested by {} (contact debian-release if update is needed)",
                    hint.user
                ),
            );
            excuse.addreason("block");
            self.excuses.insert(excuse.name(), excuse);
            return false;
        }

        excuse.set_verdict(PolicyVerdict::Pass);
        self.excuses.insert(excuse.name(), excuse);
        true
    }

    /// Check if the binaries produced by the source on one architecture
    /// should be updated (binNMUs and similar binary-only migrations).
    fn should_upgrade_srcarch(&mut self, item: &MigrationItem) -> bool {
        let target = &self.suites.target;
        let source_suite = self.suites.get(item.suite);
        let src = &item.package;
        let arch = item.architecture;
        let source_t = &target.sources[src];
        let source_u = &source_suite.sources[src];

        let mut excuse = Excuse::new(item.clone());
        let version_string = source_t.version.to_string();
        excuse.set_vers(Some(&version_string), Some(&version_string));
        if let Some(maintainer) = &source_u.maintainer {
            excuse.set_maint(maintainer);
        }
        if !source_u.section.is_empty() {
            excuse.set_section(&source_u.section);
        }

        // a removal hint for the version in the target suite wins over any
        // binary migration
        if let Some(hint) = self
            .hints
            .search("remove", Some(src), Some(&source_t.version), None, None)
            .first()
        {
            excuse.add_hint(hint.hint_type, &hint.user);
            excuse.set_verdict(PolicyVerdict::RejectedPermanently);
            excuse.add_verdict_info(
                excuse.policy_verdict(),
                format!("Removal request by {}", hint.user),
            );
            excuse.add_verdict_info(
                excuse.policy_verdict(),
                "Trying to remove package, not update it",
            );
            self.excuses.insert(excuse.name(), excuse);
            return false;
        }

        let mut anywrongver = false;
        let mut anyworthdoing = false;
        let wrong_verdict = PolicyVerdict::RejectedPermanently;

        let empty = Default::default();
        let packages_t_a = target.binaries.get(&arch).unwrap_or(&empty);
        let packages_s_a = source_suite.binaries.get(&arch).unwrap_or(&empty);

        let mut bin_ids: Vec<&PackageId> = source_u
            .binaries
            .iter()
            .filter(|pkg_id| pkg_id.architecture == arch)
            .collect();
        bin_ids.sort();

        for pkg_id in bin_ids {
            let pkg_name = &pkg_id.package_name;
            excuse.add_package(pkg_id.clone());

            let binary_t = packages_t_a.get(pkg_name);
            let Some(binary_u) = packages_s_a.get(pkg_name) else {
                continue;
            };
            let pkgsv = &binary_u.source_version;

            // arch:all binaries only migrate with the source itself
            if binary_u.architecture.is_all() {
                if !source_t.binaries.contains(pkg_id) {
                    excuse.add_detailed_info(format!(
                        "Ignoring {} {} (from {}) as it is arch: all",
                        pkg_name, binary_u.version, pkgsv
                    ));
                }
                continue;
            }

            // built by the new source, so part of a source migration
            if source_u.version == *pkgsv && source_t.version != *pkgsv {
                anywrongver = true;
                excuse.add_verdict_info(
                    wrong_verdict,
                    format!(
                        "From wrong source: {} {} ({} not {})",
                        pkg_name, binary_u.version, pkgsv, source_t.version
                    ),
                );
                continue;
            }

            // cruft in the source suite
            if source_u.version != *pkgsv && source_t.version != *pkgsv {
                if self.config.ignore_cruft {
                    excuse.add_detailed_info(format!(
                        "Old cruft: {} {} (but ignoring cruft, so nevermind)",
                        pkg_name, pkgsv
                    ));
                } else {
                    anywrongver = true;
                    excuse.add_verdict_info(
                        wrong_verdict,
                        format!("Old cruft: {} {}", pkg_name, pkgsv),
                    );
                }
                continue;
            }

            // the source was updated in the source suite; these binaries are
            // now out of date
            if source_t.version == *pkgsv && source_t.version != source_u.version {
                anywrongver = true;
                excuse.add_verdict_info(
                    wrong_verdict,
                    format!(
                        "From wrong source: {} {} ({} not {})",
                        pkg_name, binary_u.version, pkgsv, source_u.version
                    ),
                );
                continue;
            }

            let Some(binary_t) = binary_t else {
                excuse.add_detailed_info(format!(
                    "New binary: {} ({})",
                    pkg_name, binary_u.version
                ));
                anyworthdoing = true;
                continue;
            };

            if binary_t.version > binary_u.version {
                anywrongver = true;
                excuse.add_verdict_info(
                    wrong_verdict,
                    format!(
                        "Not downgrading: {} ({} to {})",
                        pkg_name, binary_t.version, binary_u.version
                    ),
                );
                break;
            } else if binary_t.version < binary_u.version {
                excuse.add_detailed_info(format!(
                    "Updated binary: {} ({} to {})",
                    pkg_name, binary_t.version, binary_u.version
                ));
                anyworthdoing = true;
            }
        }

        let same_source = source_t.version == source_u.version;
        let is_primary_source = source_suite.suite_class.is_primary_source();

        if !anywrongver && (anyworthdoing || !source_u.is_fakesrc) {
            // remove binaries that are no longer produced by the new source,
            // except:
            // - binNMUs from non-primary suites never cause removals, as
            //   that would drop binaries on other architectures
            // - smooth updatable binaries stay
            if !same_source || is_primary_source {
                let mut smoothbins = HashSet::new();
                if is_primary_source {
                    let mut possible_smooth_updates: Vec<PackageId> = source_t
                        .binaries
                        .iter()
                        .filter(|pkg_id| pkg_id.architecture == arch)
                        .cloned()
                        .collect();
                    possible_smooth_updates.sort();
                    smoothbins = find_smooth_updateable_binaries(
                        &possible_smooth_updates,
                        source_u,
                        self.universe,
                        target,
                        source_suite,
                        &HashSet::new(),
                        &self.config.smooth_updates,
                        self.hints,
                    );
                }

                let mut removed_ids: Vec<&PackageId> = source_t
                    .binaries
                    .iter()
                    .filter(|pkg_id| pkg_id.architecture == arch)
                    .collect();
                removed_ids.sort();
                for pkg_id in removed_ids {
                    let pkg_name = &pkg_id.package_name;
                    let Some(tpkg_data) = packages_t_a.get(pkg_name) else {
                        continue;
                    };
                    if tpkg_data.architecture.is_all() {
                        if !source_u.binaries.contains(pkg_id) {
                            excuse.add_detailed_info(format!(
                                "Ignoring removal of {} as it is arch: all",
                                pkg_name
                            ));
                        }
                        continue;
                    }
                    if !packages_s_a.contains_key(pkg_name) {
                        excuse.add_detailed_info(format!(
                            "Removed binary: {} {}",
                            pkg_name, tpkg_data.version
                        ));
                        // a smooth updatable binary is not "interesting" on
                        // its own; it usually survives the whole run
                        if same_source && !smoothbins.contains(pkg_id) {
                            anyworthdoing = true;
                        }
                    }
                }
            }
        }

        if !anyworthdoing {
            return false;
        }

        excuse.set_verdict(PolicyVerdict::Pass);
        if anywrongver {
            excuse.set_verdict(wrong_verdict);
        }

        let ctx = self.policy_context();
        self.policy_engine.apply_srcarch_policies(
            &ctx,
            item,
            arch,
            Some(source_t),
            source_u,
            &mut excuse,
        );

        let valid = excuse.is_valid();
        self.excuses.insert(excuse.name(), excuse);
        valid
    }

    /// Check if a source package should be upgraded.
    fn should_upgrade_src(&mut self, item: &MigrationItem) -> bool {
        let src = &item.package;
        let source_suite = self.suites.get(item.suite);
        let target = &self.suites.target;
        let source_u = &source_suite.sources[src];
        if source_u.is_fakesrc {
            // a fake package created to satisfy implementation details;
            // silently ignore it
            return false;
        }

        let source_t = match target.sources.get(src) {
            Some(source_t) => {
                if source_t.version == source_u.version {
                    // candidate for binNMUs only
                    return false;
                }
                Some(source_t)
            }
            None => None,
        };

        let mut excuse = Excuse::new(item.clone());
        excuse.set_vers(
            source_t.map(|source_t| source_t.version.to_string()).as_deref(),
            Some(&source_u.version.to_string()),
        );
        if let Some(maintainer) = &source_u.maintainer {
            excuse.set_maint(maintainer);
        }
        if !source_u.section.is_empty() {
            excuse.set_section(&source_u.section);
        }
        excuse.add_package(PackageId::source(src, source_u.version.clone()));

        if let Some(source_t) = source_t {
            if source_u.version < source_t.version {
                excuse.set_verdict(PolicyVerdict::RejectedPermanently);
                excuse.add_verdict_info(
                    excuse.policy_verdict(),
                    format!(
                        "ALERT: {} is newer in the target suite ({} {})",
                        src, source_t.version, source_u.version
                    ),
                );
                excuse.addreason("newerintesting");
                self.excuses.insert(excuse.name(), excuse);
                return false;
            }
        }

        excuse.set_verdict(PolicyVerdict::Pass);

        // a removal hint for the version in either suite wins
        for hint in self.hints.search("remove", Some(src), None, None, None) {
            let matches = match hint.version() {
                Some(version) => {
                    source_t.is_some_and(|source_t| source_t.version == *version)
                        || source_u.version == *version
                }
                None => true,
            };
            if matches {
                excuse.add_hint(hint.hint_type, &hint.user);
                excuse.set_verdict(PolicyVerdict::RejectedPermanently);
                excuse.add_verdict_info(
                    excuse.policy_verdict(),
                    format!("Removal request by {}", hint.user),
                );
                excuse.add_verdict_info(
                    excuse.policy_verdict(),
                    "Trying to remove package, not update it",
                );
                break;
            }
        }

        // out-of-date detection: every architecture (and the arch:all
        // pseudo architecture) needs a build of the current version
        let mut archs_to_consider = self.config.architectures.clone();
        archs_to_consider.push(Architecture::All);
        for arch in archs_to_consider {
            let mut oodbins: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            let mut uptodatebins = false;

            let mut consider: Vec<&PackageId> = if arch.is_all() {
                source_u.binaries.iter().collect()
            } else {
                source_u
                    .binaries
                    .iter()
                    .filter(|pkg_id| pkg_id.architecture == arch)
                    .collect()
            };
            consider.sort();

            for pkg_id in consider {
                let Some(binary_u) = self.all_binaries.get(pkg_id) else {
                    continue;
                };
                // arch:all binaries are treated separately from arch:any
                if binary_u.architecture != arch {
                    continue;
                }
                excuse.add_package(pkg_id.clone());

                if source_u.version != binary_u.source_version {
                    oodbins
                        .entry(binary_u.source_version.to_string())
                        .or_default()
                        .insert(pkg_id.package_name.clone());
                    excuse.add_old_binary(
                        &pkg_id.package_name,
                        &binary_u.source_version.to_string(),
                    );
                } else {
                    uptodatebins = true;
                }
            }

            if oodbins.is_empty() {
                continue;
            }
            let oodtxt = oodbins
                .iter()
                .map(|(version, names)| {
                    format!(
                        "{} (from {})",
                        names.iter().cloned().collect::<Vec<_>>().join(", "),
                        version
                    )
                })
                .collect::<Vec<_>>()
                .join("; ");
            let text = if uptodatebins {
                format!("old binaries left on {}: {}", arch, oodtxt)
            } else {
                format!("missing build on {}", arch)
            };

            if self.config.outofsync_arches.contains(&arch) {
                excuse.add_detailed_info(format!(
                    "{} (but {} isn't keeping up, so nevermind)",
                    text, arch
                ));
                if !uptodatebins {
                    excuse.missing_build_on_ood_arch(arch);
                }
            } else if uptodatebins {
                if self.config.ignore_cruft {
                    excuse.add_detailed_info(format!(
                        "{} (but ignoring cruft, so nevermind)",
                        text
                    ));
                } else {
                    excuse.set_verdict(PolicyVerdict::RejectedPermanently);
                    excuse.addreason("cruft");
                    excuse.add_verdict_info(excuse.policy_verdict(), text);
                }
            } else {
                excuse.raise_verdict(PolicyVerdict::RejectedCannotDetermineIfPermanent);
                excuse.missing_build_on_arch(arch);
                excuse.addreason("missingbuild");
                excuse.add_verdict_info(
                    PolicyVerdict::RejectedCannotDetermineIfPermanent,
                    text,
                );
                excuse.add_detailed_info(format!("old binaries on {}: {}", arch, oodtxt));
            }
        }

        if source_u.binaries.is_empty() {
            excuse.set_verdict(PolicyVerdict::RejectedPermanently);
            excuse.add_verdict_info(
                excuse.policy_verdict(),
                format!("{} has no binaries on any arch", src),
            );
            excuse.addreason("no-binaries");
        }

        let ctx = self.policy_context();
        self.policy_engine
            .apply_src_policies(&ctx, item, source_t, source_u, &mut excuse);

        // uploads to additional source suites may intentionally drop
        // binaries, but not fall behind the target suite
        if source_suite.suite_class.is_additional_source() {
            if let Some(source_t) = source_t {
                for &arch in &self.config.architectures {
                    let target_has_build = source_t.binaries.iter().any(|pkg_id| {
                        pkg_id.architecture == arch
                            && self
                                .all_binaries
                                .get(pkg_id)
                                .is_some_and(|pkg| !pkg.architecture.is_all())
                    });
                    if !target_has_build {
                        continue;
                    }
                    let suite_has_build = source_suite
                        .binaries
                        .get(&arch)
                        .is_some_and(|packages| {
                            packages.values().any(|pkg| {
                                pkg.source == *src
                                    && pkg.source_version == source_u.version
                                    && !pkg.architecture.is_all()
                            })
                        });
                    if suite_has_build {
                        continue;
                    }

                    let text =
                        format!("Not yet built on {} (relative to target suite)", arch);
                    if self.config.outofsync_arches.contains(&arch) {
                        excuse.addinfo(format!(
                            "{} (but {} isn't keeping up, so never mind)",
                            text, arch
                        ));
                        excuse.missing_build_on_ood_arch(arch);
                    } else {
                        excuse.raise_verdict(PolicyVerdict::RejectedCannotDetermineIfPermanent);
                        excuse.missing_build_on_arch(arch);
                        excuse.addreason("missingbuild");
                        excuse.add_verdict_info(
                            PolicyVerdict::RejectedCannotDetermineIfPermanent,
                            text,
                        );
                    }
                }
            }
        }

        // a force hint allows the package in even when it is not updateable;
        // force-hint implies force for the items it names
        let forces = self
            .hints
            .search("force", Some(src), Some(&source_u.version), None, None);
        let force_hints = self
            .hints
            .search("force-hint", Some(src), Some(&source_u.version), None, None);
        if let Some(hint) = forces.first().or_else(|| force_hints.first()) {
            if excuse.force() {
                excuse.addinfo(format!("Should ignore, but forced by {}", hint.user));
            }
        }

        let valid = excuse.is_valid();
        self.excuses.insert(excuse.name(), excuse);
        valid
    }

    fn compute_excuses_and_initial_actionable_items(&mut self) -> BTreeSet<MigrationItem> {
        let mut actionable: BTreeSet<MigrationItem> = BTreeSet::new();

        // removals of sources that left the primary source suite
        let mut target_sources: Vec<&String> = self.suites.target.sources.keys().collect();
        target_sources.sort();
        let removal_candidates: Vec<MigrationItem> = target_sources
            .iter()
            .filter(|pkg| {
                !self
                    .suites
                    .primary_source_suite()
                    .sources
                    .contains_key(**pkg)
            })
            .map(|pkg| MigrationItem {
                package: (*pkg).clone(),
                version: self.suites.target.sources[*pkg].version.clone(),
                architecture: Architecture::Source,
                suite: SuiteRef::Target,
                suite_suffix: String::new(),
                is_removal: true,
                is_cruft_removal: false,
            })
            .collect();
        for item in removal_candidates {
            if self.should_remove_source(&item) {
                actionable.insert(item);
            }
        }

        // upgrades from every source suite
        for index in 0..self.suites.sources.len() {
            let suite_ref = SuiteRef::Source(index);
            let suite = &self.suites.sources[index];
            let suffix = suite.suite_short_name.clone();
            let mut names: Vec<&String> = suite.sources.keys().collect();
            names.sort();
            let candidates: Vec<(String, debian_archive_utils::version::PackageVersion, bool)> =
                names
                    .iter()
                    .filter(|pkg| !suite.sources[**pkg].is_fakesrc)
                    .map(|pkg| {
                        let version = suite.sources[*pkg].version.clone();
                        let same_version = self
                            .suites
                            .target
                            .sources
                            .get(*pkg)
                            .is_some_and(|src| src.version == version);
                        ((*pkg).clone(), version, same_version)
                    })
                    .collect();

            for (package, version, same_version) in candidates {
                if !same_version {
                    let item = MigrationItem {
                        package,
                        version,
                        architecture: Architecture::Source,
                        suite: suite_ref,
                        suite_suffix: suffix.clone(),
                        is_removal: false,
                        is_cruft_removal: false,
                    };
                    if self.should_upgrade_src(&item) {
                        actionable.insert(item);
                    }
                } else {
                    for &arch in &self.config.architectures {
                        let item = MigrationItem {
                            package: package.clone(),
                            version: version.clone(),
                            architecture: arch,
                            suite: suite_ref,
                            suite_suffix: suffix.clone(),
                            is_removal: false,
                            is_cruft_removal: false,
                        };
                        if self.should_upgrade_srcarch(&item) {
                            actionable.insert(item);
                        }
                    }
                }
            }
        }

        // removal hints that did not already generate an item
        let remove_hints: Vec<(String, Option<debian_archive_utils::version::PackageVersion>, String)> =
            self.hints
                .of_type("remove")
                .map(|hint| {
                    (
                        hint.package().to_owned(),
                        hint.version().cloned(),
                        hint.user.clone(),
                    )
                })
                .collect();
        for (src, version, user) in remove_hints {
            let Some(source_t) = self.suites.target.sources.get(&src) else {
                continue;
            };
            let tsrcv = source_t.version.clone();
            if actionable.iter().any(|item| item.package == src) {
                info!(
                    "removal hint for {} ignored due to existing item(s)",
                    src
                );
                continue;
            }
            if version.as_ref().is_some_and(|version| *version != tsrcv) {
                continue;
            }

            let item = MigrationItem {
                package: src.clone(),
                version: tsrcv.clone(),
                architecture: Architecture::Source,
                suite: SuiteRef::Target,
                suite_suffix: String::new(),
                is_removal: true,
                is_cruft_removal: false,
            };
            let mut excuse = Excuse::new(item.clone());
            excuse.set_vers(Some(&tsrcv.to_string()), None);
            excuse.addinfo(format!("Removal request by {}", user));

            let mut blocked = false;
            for hint in self
                .hints
                .search("block", Some(&src), None, None, Some(true))
            {
                excuse.set_verdict(PolicyVerdict::RejectedPermanently);
                excuse.add_verdict_info(
                    excuse.policy_verdict(),
                    format!(
                        "Not removing package, due to block hint by {} (contact debian-release if update is needed)",
                        hint.user
                    ),
                );
                excuse.addreason("block");
                blocked = true;
            }
            if blocked {
                self.excuses.insert(excuse.name(), excuse);
                continue;
            }

            excuse.addinfo("Package is broken, will try to remove");
            excuse.add_hint("remove", &user);
            // "created by a hint" is not "accepted due to a hint"
            excuse.set_verdict(PolicyVerdict::Pass);
            self.excuses.insert(excuse.name(), excuse);
            actionable.insert(item);
        }

        actionable
    }

    /// Produce the excuses and the actionable items.
    pub fn find_actionable_excuses(mut self) -> (BTreeMap<String, Excuse>, Vec<MigrationItem>) {
        let actionable_items = self.compute_excuses_and_initial_actionable_items();
        let mut valid: HashSet<String> =
            actionable_items.iter().map(|item| item.name()).collect();
        let mut invalid: HashSet<String> = self
            .excuses
            .keys()
            .filter(|name| !valid.contains(*name))
            .cloned()
            .collect();
        let mut invalidated: HashSet<String> = HashSet::new();

        invalidate_excuses(&mut self.excuses, &mut valid, &mut invalid, &mut invalidated);

        // the valid excuses and the actionable items must agree
        debug_assert_eq!(
            valid,
            self.excuses
                .values()
                .filter(|excuse| excuse.is_valid())
                .map(|excuse| excuse.name())
                .collect::<HashSet<_>>()
        );

        let actionable: Vec<MigrationItem> = actionable_items
            .into_iter()
            .filter(|item| valid.contains(&item.name()))
            .collect();
        (self.excuses, actionable)
    }
}
