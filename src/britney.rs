// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! The migration driver.
//!
//! Owns the loaded world (suites, universe, tester, hints, policies) and
//! runs the phases of a migration run: excuse generation, the greedy
//! iteration over candidate groups, hint processing, the auto hinter, the
//! final sweeps and the output files.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fs::{self, File};
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use debian_archive_utils::architectures::Architecture;
use itertools::Itertools;
use log::{error, info, warn};

use crate::cli::Options;
use crate::config::Config;
use crate::excuse::Excuse;
use crate::excusefinder::ExcuseFinder;
use crate::hints::{HintCollection, HintParser, HintTarget, Permissions};
use crate::loader::{self, AllBinaries, SuiteContentLoader};
use crate::migration::{MigrationContext, MigrationManager};
use crate::migrationitem::{parse_items, MigrationItem};
use crate::policies::{
    AgePolicy, BlockBugPolicy, BlockPolicy, BuildDependsPolicy, DependsPolicy, ExcuseBugPolicy,
    ImplicitDependencyPolicy, PiupartsPolicy, PolicyContext, PolicyEngine, RCBugPolicy,
};
use crate::solver::{solve_groups, GroupInfo};
use crate::suites::Suites;
use crate::tester::InstallabilityTester;
use crate::universe::PackageUniverse;
use crate::utils::{
    compile_nuninst, eval_nuninst, is_nuninst_asgood_generous, newly_uninst, old_libraries,
    old_libraries_format, read_nuninst, uninst_lines, write_excuses_html, write_excuses_yaml,
    write_heidi, write_heidi_delta, write_nuninst, Constraints, Nuninst,
};

/// Human readable output of the upgrade run, mirrored to a file.
#[derive(Debug, Default)]
pub struct UpgradeOutput {
    file: Option<BufWriter<File>>,
}

impl UpgradeOutput {
    fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)
            .with_context(|| format!("cannot write upgrade output {}", path.display()))?;
        Ok(Self {
            file: Some(BufWriter::new(file)),
        })
    }

    fn info(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref();
        info!("{}", line);
        if let Some(file) = &mut self.file {
            let _ = writeln!(file, "{}", line);
        }
    }

    fn warning(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref();
        warn!("{}", line);
        if let Some(file) = &mut self.file {
            let _ = writeln!(file, "{}", line);
        }
    }

    fn flush(&mut self) {
        if let Some(file) = &mut self.file {
            let _ = file.flush();
        }
    }
}

/// The state of one migration run.
pub struct Britney {
    /// Command line options
    pub options: Options,
    /// The parsed configuration
    pub config: Config,
    /// The loaded suites
    pub suites: Suites,
    /// Every known binary record
    pub all_binaries: AllBinaries,
    /// The package universe
    pub universe: PackageUniverse,
    /// The installability tester
    pub tester: InstallabilityTester,
    /// The active hints
    pub hints: HintCollection,
    /// The policy engine
    pub policy_engine: PolicyEngine,
    /// The keep-installable constraints
    pub constraints: Constraints,
    /// Packages allowed to be uninstallable, per architecture
    pub allow_uninst: HashMap<Architecture, BTreeSet<String>>,
    /// The generated excuses
    pub excuses: BTreeMap<String, Excuse>,
    /// The current candidate list
    pub upgrade_me: Vec<MigrationItem>,

    all_selected: Vec<MigrationItem>,
    nuninst_orig: Nuninst,
    nuninst_orig_save: Nuninst,
    break_arches: Vec<Architecture>,
    mm: MigrationManager,
    out: UpgradeOutput,
}

impl Britney {
    /// Load the world: configuration, suites, universe, tester, hints and
    /// policies.
    pub fn setup(options: Options) -> Result<Self> {
        let mut config = Config::load(&options.config, &options.series)?;
        if let Some(override_archs) = &options.architectures {
            config.architectures = override_archs
                .split_whitespace()
                .map(|arch| {
                    Architecture::try_from(arch)
                        .map_err(|_| anyhow::anyhow!("invalid architecture {}", arch))
                })
                .collect::<Result<_>>()?;
        }

        let (mut suites, mut all_binaries) = SuiteContentLoader::load(&mut config)?;
        if config.series.is_empty() {
            config.series = suites.target.name.clone();
        }

        let mut constraints = Constraints::default();
        if let Some(static_input_dir) = config.static_input_dir.clone() {
            let faux_packages = static_input_dir.join("faux-packages");
            if faux_packages.exists() {
                info!("Loading faux packages from {}", faux_packages.display());
                loader::load_faux_packages(
                    &faux_packages,
                    &config,
                    &mut suites,
                    &mut all_binaries,
                )?;
            }
            let constraints_file = static_input_dir.join("constraints");
            if constraints_file.exists() {
                info!("Loading constraints from {}", constraints_file.display());
                constraints = loader::load_constraints(
                    &constraints_file,
                    &config,
                    &mut suites,
                    &mut all_binaries,
                )?;
            }
        } else {
            info!("The STATIC_INPUT_DIR option is not set");
        }

        info!("Compiling Installability tester");
        let universe = PackageUniverse::build(&all_binaries);
        let mut tester = InstallabilityTester::new(&universe, &suites.target);

        let mut policy_engine = PolicyEngine::new();
        policy_engine.add_policy(Box::new(DependsPolicy::new()));
        policy_engine.add_policy(Box::new(RCBugPolicy::new()));
        policy_engine.add_policy(Box::new(PiupartsPolicy::new()));
        policy_engine.add_policy(Box::new(AgePolicy::new(&config)));
        policy_engine.add_policy(Box::new(BuildDependsPolicy::new()));
        if config.extra.get("IMPLICIT_DEPS").map(String::as_str) != Some("no") {
            policy_engine.add_policy(Box::new(ImplicitDependencyPolicy::new()));
        }
        policy_engine.add_policy(Box::new(BlockPolicy::new()));
        policy_engine.add_policy(Box::new(BlockBugPolicy::new()));
        policy_engine.add_policy(Box::new(ExcuseBugPolicy::new()));

        let mut hint_parser = HintParser::new();
        policy_engine.register_policy_hints(&mut hint_parser);
        Self::read_hints(&options, &config, &suites, &mut hint_parser)?;
        let hints = hint_parser.into_hints();
        if hints.search("block", None, None, None, None).is_empty()
            && hints.search("block-udeb", None, None, None, None).is_empty()
        {
            warn!("WARNING: No block hints at all, not even udeb ones!");
        }

        let mut allow_uninst: HashMap<Architecture, BTreeSet<String>> = config
            .architectures
            .iter()
            .map(|&arch| (arch, BTreeSet::new()))
            .collect();
        for hint in hints.of_type("allow-uninst") {
            let architecture = hint.architecture();
            if architecture.is_source() {
                for set in allow_uninst.values_mut() {
                    set.insert(hint.package().to_owned());
                }
            } else if let Some(set) = allow_uninst.get_mut(&architecture) {
                set.insert(hint.package().to_owned());
            }
        }

        {
            let ctx = PolicyContext {
                config: &config,
                suites: &suites,
                universe: &universe,
                hints: &hints,
            };
            policy_engine.initialise(&ctx)?;
        }

        let nuninst_orig = if options.nuninst_cache {
            info!("Not building the list of non-installable packages, as requested");
            let path = config
                .noninst_status
                .as_ref()
                .context("NONINST_STATUS is not configured but --nuninst-cache was given")?;
            read_nuninst(path, &config.architectures)?
        } else {
            info!("Building the list of non-installable packages for the full archive");
            tester.compute_installability();
            let nuninst = compile_nuninst(
                &suites.target,
                &mut tester,
                &universe,
                &config.architectures,
                &config.nobreakall_arches,
            );
            for arch in &config.architectures {
                info!(
                    "> Found {} non-installable packages on {}",
                    nuninst.packages(*arch).len(),
                    arch
                );
            }
            if let Some(path) = &config.noninst_status {
                if !options.dry_run {
                    write_nuninst(path, &nuninst)?;
                }
            }
            for (arch, stats) in tester.compute_stats(&universe, &config.architectures) {
                info!("> Installability tester statistics for {}", arch);
                for line in stats.stat_summary() {
                    info!(">  - {}", line);
                }
            }
            nuninst
        };

        let break_arches = config.break_arches.clone();
        let nuninst_orig_save = nuninst_orig.clone();

        Ok(Self {
            options,
            config,
            suites,
            all_binaries,
            universe,
            tester,
            hints,
            policy_engine,
            constraints,
            allow_uninst,
            excuses: BTreeMap::new(),
            upgrade_me: vec![],
            all_selected: vec![],
            nuninst_orig,
            nuninst_orig_save,
            break_arches,
            mm: MigrationManager::new(),
            out: UpgradeOutput::default(),
        })
    }

    fn read_hints(
        options: &Options,
        config: &Config,
        suites: &Suites,
        parser: &mut HintParser,
    ) -> Result<()> {
        let hintsdir = config
            .hintsdir
            .clone()
            .unwrap_or_else(|| config.unstable.join("Hints"));

        let mut users: Vec<&String> = config.hints.keys().collect();
        users.sort();
        for user in users {
            let permissions = Permissions::expand(&config.hints[user]);
            let path = hintsdir.join(user);
            let Ok(content) = fs::read_to_string(&path) else {
                error!("Cannot read hints list from {}, no such file!", path.display());
                continue;
            };
            info!("Loading hints list from {}", path.display());
            parser.parse_hints(
                suites,
                user,
                &permissions,
                &path.display().to_string(),
                content.lines(),
            );
        }

        if let Some(cmdline) = &options.hints {
            parser.parse_hints(
                suites,
                "command-line",
                &Permissions::all(),
                "<cmd-line>",
                cmdline.split(';'),
            );
        }
        Ok(())
    }

    /// The current uninstallability counters.
    pub fn nuninst(&self) -> &Nuninst {
        &self.nuninst_orig
    }

    fn eval(&self, nuninst: &Nuninst) -> String {
        eval_nuninst(
            nuninst,
            Some(&self.nuninst_orig),
            &self.config.architectures,
            &self.break_arches,
        )
    }

    /// Produce and write the update excuses, populating the candidate list.
    pub fn write_excuses(&mut self) -> Result<()> {
        info!("Update Excuses generation started");

        let finder = ExcuseFinder::new(
            &self.config,
            &self.suites,
            &self.all_binaries,
            &self.universe,
            &self.hints,
            &mut self.policy_engine,
        );
        let (excuses, mut upgrade_me) = finder.find_actionable_excuses();
        self.excuses = excuses;
        upgrade_me.sort();

        let old_lib_removals = old_libraries(&self.suites, &self.config.outofsync_arches);
        self.out.info(format!(
            "List of old libraries added to the candidate list ({}):",
            old_lib_removals.len()
        ));
        for line in old_libraries_format(&old_lib_removals) {
            self.out.info(line);
        }
        upgrade_me.extend(old_lib_removals);
        self.upgrade_me = upgrade_me;

        if !self.options.dry_run {
            if let Some(path) = &self.config.excuses_output {
                info!("> Writing Excuses to {}", path.display());
                write_excuses_html(path, &self.excuses)?;
            }
            if let Some(path) = &self.config.excuses_yaml_output {
                info!("> Writing YAML Excuses to {}", path.display());
                write_excuses_yaml(path, &self.excuses)?;
            }
        }

        info!("Update Excuses generation completed");
        Ok(())
    }

    /// Iterate over the candidate list, committing every group that keeps
    /// the uninstallability counters as good as before.
    ///
    /// Returns the final counters and the items that never migrated.
    pub fn iter_packages(
        &mut self,
        packages: Vec<MigrationItem>,
        selected: &mut Vec<MigrationItem>,
        nuninst: Option<Nuninst>,
    ) -> Result<(Nuninst, Vec<MigrationItem>)> {
        let mut rescheduled: Vec<MigrationItem> = packages;
        rescheduled.sort();
        let mut maybe_rescheduled: Vec<MigrationItem> = vec![];
        let mut group_info: HashMap<String, GroupInfo> = HashMap::new();

        {
            let ctx = MigrationContext {
                config: &self.config,
                universe: &self.universe,
                hints: &self.hints,
                constraints: &self.constraints,
                allow_uninst: &self.allow_uninst,
                all_binaries: &self.all_binaries,
            };
            let mm = &self.mm;
            let suites = &self.suites;
            let out = &mut self.out;
            rescheduled.retain(|item| match mm.compute_groups(&ctx, suites, item) {
                Ok((updates, removals)) => {
                    group_info.insert(
                        item.name(),
                        GroupInfo {
                            item: item.clone(),
                            updates,
                            removals,
                        },
                    );
                    true
                }
                Err(error) => {
                    out.info(format!("not adding package to list: {}", item.package));
                    out.info(format!("    got exception: {}", error));
                    false
                }
            });
        }

        let mut nuninst_last = nuninst.unwrap_or_else(|| self.nuninst_orig.clone());

        self.out.info(format!(
            "recur: [] {} {}/0",
            selected.iter().map(|item| item.uvname()).join(","),
            rescheduled.len()
        ));

        while !rescheduled.is_empty() {
            let groups: Vec<GroupInfo> = rescheduled
                .iter()
                .map(|item| group_info[&item.name()].clone())
                .collect();
            let mut worklist: VecDeque<Vec<MigrationItem>> =
                solve_groups(&self.universe, &groups).into();
            rescheduled.clear();

            while let Some(comp) = worklist.pop_front() {
                let comp_name = comp.iter().map(|item| item.uvname()).join(" ");
                self.out.info(format!("trying: {}", comp_name));

                self.mm.start_transaction();
                let result = {
                    let ctx = MigrationContext {
                        config: &self.config,
                        universe: &self.universe,
                        hints: &self.hints,
                        constraints: &self.constraints,
                        allow_uninst: &self.allow_uninst,
                        all_binaries: &self.all_binaries,
                    };
                    self.mm.migrate_items_to_target_suite(
                        &ctx,
                        &mut self.suites,
                        &mut self.tester,
                        &comp,
                        &nuninst_last,
                        &self.break_arches,
                    )
                };

                let mut accepted = false;
                match result {
                    Ok(outcome) if outcome.accepted => {
                        accepted = true;
                        selected.extend(comp.iter().cloned());
                        self.mm.commit();
                        self.out.info(format!("accepted: {}", comp_name));
                        let ori = self.eval(&self.nuninst_orig);
                        let pre = self.eval(&nuninst_last);
                        let now = self.eval(&outcome.nuninst_after);
                        self.out.info(format!("   ori: {}", ori));
                        self.out.info(format!("   pre: {}", pre));
                        self.out.info(format!("   now: {}", now));
                        if !outcome.new_cruft.is_empty() {
                            self.out.info(format!(
                                "   added new cruft items to list: {}",
                                outcome
                                    .new_cruft
                                    .iter()
                                    .map(|item| item.uvname())
                                    .collect::<Vec<_>>()
                                    .join(" ")
                            ));
                        }
                        if selected.len() <= 20 {
                            self.out.info(format!(
                                "   all: {}",
                                selected
                                    .iter()
                                    .map(|item| item.uvname())
                                    .collect::<Vec<_>>()
                                    .join(" ")
                            ));
                        } else {
                            self.out.info(format!(
                                "  most: ({}) .. {}",
                                selected.len(),
                                selected[selected.len() - 20..]
                                    .iter()
                                    .map(|item| item.uvname())
                                    .collect::<Vec<_>>()
                                    .join(" ")
                            ));
                        }
                        if self.config.check_consistency_level >= 3 {
                            self.suites
                                .target
                                .check_suite_source_pkg_consistency("iter_packages after commit")?;
                        }
                        nuninst_last = outcome.nuninst_after;

                        for cruft_item in outcome.new_cruft {
                            let ctx = MigrationContext {
                                config: &self.config,
                                universe: &self.universe,
                                hints: &self.hints,
                                constraints: &self.constraints,
                                allow_uninst: &self.allow_uninst,
                                all_binaries: &self.all_binaries,
                            };
                            match self.mm.compute_groups(&ctx, &self.suites, &cruft_item) {
                                Ok((updates, removals)) => {
                                    group_info.insert(
                                        cruft_item.name(),
                                        GroupInfo {
                                            item: cruft_item.clone(),
                                            updates,
                                            removals,
                                        },
                                    );
                                    worklist.push_front(vec![cruft_item]);
                                }
                                Err(error) => {
                                    self.out.info(format!(
                                        "    got exception adding cruft item {} to list: {}",
                                        cruft_item.uvname(),
                                        error
                                    ));
                                }
                            }
                        }
                        rescheduled.append(&mut maybe_rescheduled);
                    }
                    Ok(outcome) => {
                        self.mm
                            .rollback(&self.universe, &mut self.suites, &mut self.tester);
                        self.out.info(format!(
                            "skipped: {} ({}, {}, {})",
                            comp_name,
                            rescheduled.len(),
                            maybe_rescheduled.len(),
                            worklist.len()
                        ));
                        let got = self.eval(&outcome.nuninst_after);
                        self.out.info(format!("    got: {}", got));
                        if let Some(failed_arch) = outcome.failed_arch {
                            let broken: Vec<String> = outcome
                                .nuninst_after
                                .packages(failed_arch)
                                .difference(nuninst_last.packages(failed_arch))
                                .cloned()
                                .collect();
                            self.out.info(format!(
                                "    * {}: {}",
                                failed_arch,
                                broken.join(", ")
                            ));
                        }
                        if self.config.check_consistency_level >= 3 {
                            self.suites.target.check_suite_source_pkg_consistency(
                                "iter_packages after rollback (not accepted)",
                            )?;
                        }
                    }
                    Err(error) => {
                        self.mm
                            .rollback(&self.universe, &mut self.suites, &mut self.tester);
                        self.out.info(format!(
                            "skipped: {} ({}, {}, {})",
                            comp_name,
                            rescheduled.len(),
                            maybe_rescheduled.len(),
                            worklist.len()
                        ));
                        self.out.info(format!("    got exception: {}", error));
                        if self.config.check_consistency_level >= 3 {
                            self.suites.target.check_suite_source_pkg_consistency(
                                "iter_packages after rollback (migration constraint)",
                            )?;
                        }
                    }
                }

                if !accepted {
                    if comp.len() > 1 {
                        self.out.info(
                            "    - splitting the component into single items and retrying them",
                        );
                        for item in comp {
                            worklist.push_front(vec![item]);
                        }
                    } else {
                        maybe_rescheduled.push(comp.into_iter().next().unwrap());
                    }
                }
            }
        }

        self.out.info(format!(
            " finish: [{}]",
            selected.iter().map(|item| item.uvname()).join(",")
        ));
        let endloop = self.eval(&self.nuninst_orig);
        let now = self.eval(&nuninst_last);
        self.out.info(format!("endloop: {}", endloop));
        self.out.info(format!("    now: {}", now));
        for line in uninst_lines(
            &self.config.architectures,
            &newly_uninst(&self.nuninst_orig, &nuninst_last),
        ) {
            self.out.info(line);
        }
        self.out.info("");

        Ok((nuninst_last, maybe_rescheduled))
    }

    /// The update runner: apply candidates (or an explicit hint), accept the
    /// overall result if the counters are at least as good as before.
    pub fn do_all(
        &mut self,
        hinttype: Option<&str>,
        init: Option<Vec<MigrationItem>>,
        actions: Option<Vec<MigrationItem>>,
        break_ok: bool,
    ) -> Result<()> {
        let mut selected: Vec<MigrationItem> = vec![];
        let mut upgrade_me = match &actions {
            Some(actions) => actions.clone(),
            None => self.upgrade_me.clone(),
        };
        let nuninst_start = self.nuninst_orig.clone();
        let force = hinttype == Some("force-hint");
        let recurse = !matches!(hinttype, Some("easy") | Some("force-hint"));
        let mut nuninst_end: Option<Nuninst> = None;
        let mut extra: Vec<MigrationItem> = vec![];

        if let Some(init_items) = &init {
            for item in init_items {
                if !upgrade_me.contains(item) {
                    self.out.warning(format!(
                        "failed: {} is not a valid candidate (or it already migrated)",
                        item.uvname()
                    ));
                    return Ok(());
                }
            }
            upgrade_me.retain(|item| !init_items.contains(item));
            selected.extend(init_items.iter().cloned());
        }

        let start = self.eval(&nuninst_start);
        self.out.info(format!("start: {}", start));
        self.out.info(format!("orig: {}", start));

        // hint runs must be revertible as a whole; the main run only
        // contains individually accepted commits
        self.mm.start_transaction();

        if init.is_some() {
            let result = {
                let ctx = MigrationContext {
                    config: &self.config,
                    universe: &self.universe,
                    hints: &self.hints,
                    constraints: &self.constraints,
                    allow_uninst: &self.allow_uninst,
                    all_binaries: &self.all_binaries,
                };
                self.mm.migrate_items_to_target_suite(
                    &ctx,
                    &mut self.suites,
                    &mut self.tester,
                    &selected,
                    &nuninst_start,
                    &self.break_arches,
                )
            };
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(error) => {
                    self.out
                        .warning(format!("failed: hint cannot be applied: {}", error));
                    self.mm
                        .rollback(&self.universe, &mut self.suites, &mut self.tester);
                    return Ok(());
                }
            };
            let mut new_cruft = outcome.new_cruft.clone();
            nuninst_end = Some(outcome.nuninst_after);

            if recurse {
                let selected_set: HashSet<MigrationItem> = selected.iter().cloned().collect();
                upgrade_me.retain(|item| !selected_set.contains(item));
            } else {
                // on non-recursive hints, purge cruft proactively in case it
                // "fixes" the hint
                let mut cruft: Vec<MigrationItem> = upgrade_me
                    .iter()
                    .filter(|item| item.is_cruft_removal)
                    .cloned()
                    .collect();
                if !new_cruft.is_empty() {
                    self.out.info(format!(
                        "Change added new cruft items to list: {}",
                        new_cruft
                            .iter()
                            .map(|item| item.uvname())
                            .collect::<Vec<_>>()
                            .join(" ")
                    ));
                    cruft.extend(new_cruft.iter().cloned());
                }
                if !cruft.is_empty() {
                    self.out.info("Checking if changes enables cruft removal");
                    let cruft_total = cruft.len();
                    let (end, remaining_cruft) =
                        self.iter_packages(cruft, &mut selected, nuninst_end.take())?;
                    nuninst_end = Some(end);
                    self.out.info(format!(
                        "Removed {} of {} cruft item(s) after the changes",
                        cruft_total - remaining_cruft.len(),
                        cruft_total
                    ));
                    let remaining: HashSet<MigrationItem> =
                        remaining_cruft.into_iter().collect();
                    new_cruft.retain(|item| !remaining.contains(item));
                }
            }

            // keep new cruft around regardless; a future run might clean it
            upgrade_me.extend(new_cruft);
        }

        if recurse {
            let (end, remaining) =
                self.iter_packages(upgrade_me.clone(), &mut selected, nuninst_end.take())?;
            nuninst_end = Some(end);
            extra = remaining;
        }

        let nuninst_end = nuninst_end.expect("nuninst_end is always computed");
        let nuninst_end_str = self.eval(&nuninst_end);

        if !recurse {
            self.out.info(format!("easy: {}", nuninst_end_str));
            if !force {
                for line in uninst_lines(
                    &self.config.architectures,
                    &newly_uninst(&nuninst_start, &nuninst_end),
                ) {
                    self.out.info(line);
                }
            }
        }

        let better = if force {
            true
        } else {
            let mut break_arches = self.break_arches.clone();
            if !break_ok
                && !selected.is_empty()
                && selected
                    .iter()
                    .all(|item| break_arches.contains(&item.architecture))
            {
                // migrating only break-arch items must not regress there
                break_arches.clear();
            }
            is_nuninst_asgood_generous(
                &self.constraints,
                &self.allow_uninst,
                &self.config.architectures,
                &self.nuninst_orig,
                &nuninst_end,
                &break_arches,
            )
        };

        if better {
            self.out.info(format!(
                "final: {}",
                selected
                    .iter()
                    .map(|item| item.uvname())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect::<Vec<_>>()
                    .join(",")
            ));
            let start = self.eval(&nuninst_start);
            let orig = self.eval(&self.nuninst_orig);
            self.out.info(format!("start: {}", start));
            self.out.info(format!(" orig: {}", orig));
            self.out.info(format!("  end: {}", nuninst_end_str));
            if force {
                let broken = newly_uninst(&nuninst_start, &nuninst_end);
                if broken.is_empty() {
                    self.out.info("force did not break any packages");
                } else {
                    self.out.warning("force breaks:");
                    for line in uninst_lines(&self.config.architectures, &broken) {
                        self.out.warning(line);
                    }
                }
            }
            self.out.info(format!(
                "SUCCESS ({}/{})",
                actions
                    .as_ref()
                    .map(|actions| actions.len())
                    .unwrap_or(self.upgrade_me.len()),
                extra.len()
            ));
            self.nuninst_orig = nuninst_end;
            self.all_selected.extend(selected.iter().cloned());
            self.mm.commit();
            if self.config.check_consistency_level >= 2 {
                self.suites
                    .target
                    .check_suite_source_pkg_consistency("do_all after commit")?;
            }
            if actions.is_none() {
                if recurse {
                    self.upgrade_me = extra;
                } else {
                    let selected_set: HashSet<MigrationItem> =
                        selected.into_iter().collect();
                    self.upgrade_me.retain(|item| !selected_set.contains(item));
                }
            }
        } else {
            self.out.info("FAILED");
            if init.is_none() {
                // the main run only contains individually accepted commits,
                // so it can never end up worse than its baseline
                bail!("do_all FAILED but every commit was non-regressing");
            }
            self.mm
                .rollback(&self.universe, &mut self.suites, &mut self.tester);
            if self.config.check_consistency_level >= 2 {
                self.suites
                    .target
                    .check_suite_source_pkg_consistency("do_all after rollback")?;
            }
        }
        self.out.info("");
        Ok(())
    }

    /// Process an `easy`, `hint` or `force-hint` hint.
    pub fn do_hint(&mut self, hinttype: &str, who: &str, items: Vec<MigrationItem>) -> Result<bool> {
        info!("> Processing '{}' hint from {}", hinttype, who);
        self.out.info(format!(
            "Trying {} from {}: {}",
            hinttype,
            who,
            items
                .iter()
                .map(|item| format!("{}/{}", item.uvname(), item.version))
                .join(" ")
        ));

        let mut issues = vec![];
        for item in &items {
            if item.is_removal {
                continue;
            }
            let suite = self.suites.get(item.suite);
            match suite.sources.get(&item.package) {
                None => issues.push(format!(
                    "Source {} has no version in {}",
                    item.package, suite.name
                )),
                Some(src) if src.version != item.version => issues.push(format!(
                    "Version mismatch, {} {} != {}",
                    item.package, item.version, src.version
                )),
                Some(_) => {}
            }
        }
        if !issues.is_empty() {
            self.out
                .warning(format!("{}: Not using hint", issues.join(", ")));
            return Ok(false);
        }

        self.do_all(Some(hinttype), Some(items), None, false)?;
        Ok(true)
    }

    /// Propose sets of excuses that must migrate together and try each one
    /// as an `easy` hint.
    fn run_auto_hinter(&mut self) -> Result<()> {
        info!("> Processing hints from the auto hinter");

        let upgrade_items: HashSet<String> =
            self.upgrade_me.iter().map(|item| item.name()).collect();
        let valid_excuses: BTreeSet<String> = self
            .excuses
            .values()
            .filter(|excuse| upgrade_items.contains(&excuse.name()))
            .map(|excuse| excuse.name())
            .collect();
        let excuses_deps: BTreeMap<String, BTreeSet<String>> = valid_excuses
            .iter()
            .map(|name| {
                let deps: BTreeSet<String> = self.excuses[name]
                    .get_deps()
                    .into_iter()
                    .filter(|dep| valid_excuses.contains(dep))
                    .collect();
                (name.clone(), deps)
            })
            .collect();
        let mut excuses_rdeps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (name, deps) in &excuses_deps {
            for dep in deps {
                excuses_rdeps
                    .entry(dep.clone())
                    .or_default()
                    .insert(name.clone());
            }
        }

        fn find_related(
            name: &str,
            hint: &mut BTreeSet<String>,
            circular_first: bool,
            excuses_deps: &BTreeMap<String, BTreeSet<String>>,
            valid_excuses: &BTreeSet<String>,
        ) -> bool {
            if !circular_first {
                hint.insert(name.to_owned());
            }
            let Some(deps) = excuses_deps.get(name) else {
                return true;
            };
            if deps.is_empty() {
                return true;
            }
            for dep in deps {
                if hint.contains(dep) || !valid_excuses.contains(dep) {
                    continue;
                }
                if !find_related(dep, hint, false, excuses_deps, valid_excuses) {
                    return false;
                }
            }
            true
        }

        let mut candidates: Vec<BTreeSet<String>> = vec![];
        let mut mincands: Vec<BTreeSet<String>> = vec![];
        let mut seen_hints: HashSet<BTreeSet<String>> = HashSet::new();
        for name in &valid_excuses {
            if !excuses_deps[name].is_empty() {
                let mut hint = BTreeSet::new();
                if find_related(name, &mut hint, true, &excuses_deps, &valid_excuses)
                    && hint.contains(name)
                    && seen_hints.insert(hint.clone())
                {
                    candidates.push(hint);
                }
            } else {
                // grow the set over dependencies and reverse dependencies
                let mut items: Vec<String> = vec![name.clone()];
                let mut seen_items: BTreeSet<String> = items.iter().cloned().collect();
                let mut first_level = true;
                let mut orig_size = 1;
                let mut index = 0;
                while index < items.len() {
                    let current = items[index].clone();
                    index += 1;
                    let empty = BTreeSet::new();
                    let related: BTreeSet<&String> = excuses_deps
                        .get(&current)
                        .unwrap_or(&empty)
                        .iter()
                        .chain(excuses_rdeps.get(&current).unwrap_or(&empty).iter())
                        .collect();
                    for other in related {
                        if seen_items.insert(other.clone()) {
                            items.push(other.clone());
                        }
                    }
                    if first_level && items.len() > 1 {
                        orig_size = items.len();
                        if seen_hints.insert(seen_items.clone()) {
                            mincands.push(seen_items.clone());
                        }
                    }
                    first_level = false;
                }
                if items.len() != orig_size
                    && mincands.last() != Some(&seen_items)
                    && seen_hints.insert(seen_items.clone())
                {
                    candidates.push(seen_items);
                }
            }
        }

        for hint_set in candidates.into_iter().chain(mincands) {
            if hint_set.len() < 2 {
                continue;
            }
            let items: Vec<MigrationItem> = hint_set
                .iter()
                .filter_map(|name| self.excuses.get(name).map(|excuse| excuse.item.clone()))
                .collect();
            if items.len() == hint_set.len() {
                self.do_hint("easy", "autohinter", items)?;
            }
        }
        Ok(())
    }

    fn assert_nuninst_is_correct(&mut self) -> Result<()> {
        info!("> Update complete - Verifying non-installability counters");

        let cached_nuninst = self.nuninst_orig.clone();
        self.tester.compute_installability();
        let computed_nuninst = compile_nuninst(
            &self.suites.target,
            &mut self.tester,
            &self.universe,
            &self.config.architectures,
            &self.config.nobreakall_arches,
        );

        if cached_nuninst != computed_nuninst {
            let mut only_on_break_archs = true;
            error!("==================== NUNINST OUT OF SYNC =========================");
            for arch in &self.config.architectures {
                let expected = cached_nuninst.packages(*arch);
                let actual = computed_nuninst.packages(*arch);
                let false_negatives: Vec<&String> = actual.difference(expected).collect();
                let false_positives: Vec<&String> = expected.difference(actual).collect();
                if (!false_negatives.is_empty() || !false_positives.is_empty())
                    && !self.break_arches.contains(arch)
                {
                    only_on_break_archs = false;
                }
                if !false_negatives.is_empty() {
                    error!(" {} - unnoticed nuninst: {:?}", arch, false_negatives);
                }
                if !false_positives.is_empty() {
                    error!(" {} - invalid nuninst: {:?}", arch, false_positives);
                }
            }
            error!("==================== NUNINST OUT OF SYNC =========================");
            if !only_on_break_archs {
                bail!("NUNINST OUT OF SYNC");
            }
            warn!("Nuninst is out of sync on some break arches");
        }

        info!("> All non-installability counters are ok");
        Ok(())
    }

    fn printuninstchange(&mut self) {
        info!("Checking for newly uninstallable packages");
        let uninst = newly_uninst(&self.nuninst_orig_save, &self.nuninst_orig);
        if !uninst.is_empty() {
            self.out.warning("");
            self.out
                .warning("Newly uninstallable packages in the target suite:");
            for line in uninst_lines(&self.config.architectures, &uninst) {
                self.out.warning(line);
            }
        }
    }

    /// Upgrade the target suite using the packages from the source suites.
    pub fn upgrade_testing(&mut self) -> Result<()> {
        info!("Starting the upgrade test");
        self.out.info(format!(
            "Generated on: {}",
            Utc::now().format("%Y.%m.%d %H:%M:%S %z")
        ));
        self.out.info(format!(
            "Arch order is: {}",
            self.config
                .architectures
                .iter()
                .map(|arch| arch.to_string())
                .join(", ")
        ));

        let explicit_actions = self.options.actions.is_some();
        if !explicit_actions {
            let easy_hints: Vec<(String, Vec<HintTarget>)> = self
                .hints
                .of_type("easy")
                .map(|hint| (hint.user.clone(), hint.targets.clone()))
                .collect();
            for (user, targets) in easy_hints {
                if let Some(items) = self.hint_targets_to_items(&targets) {
                    self.do_hint("easy", &user, items)?;
                }
            }
            let force_hints: Vec<(String, Vec<HintTarget>)> = self
                .hints
                .of_type("force-hint")
                .map(|hint| (hint.user.clone(), hint.targets.clone()))
                .collect();
            for (user, targets) in force_hints {
                if let Some(items) = self.hint_targets_to_items(&targets) {
                    self.do_hint("force-hint", &user, items)?;
                }
            }
        }

        // first round: break architectures are handled in separate passes
        // where only their own regressions are tolerated
        let mut allpackages: Vec<MigrationItem> = vec![];
        let mut normpackages = self.upgrade_me.clone();
        let mut archpackages: BTreeMap<Architecture, Vec<MigrationItem>> = BTreeMap::new();
        for &arch in &self.break_arches.clone() {
            let (on_arch, rest): (Vec<MigrationItem>, Vec<MigrationItem>) = normpackages
                .into_iter()
                .partition(|item| item.architecture == arch);
            archpackages.insert(arch, on_arch);
            normpackages = rest;
        }
        self.upgrade_me = normpackages;
        self.out.info("info: main run");
        self.do_all(None, None, None, false)?;
        allpackages.extend(self.upgrade_me.iter().cloned());
        for (arch, packages) in archpackages {
            self.break_arches.retain(|&a| a != arch);
            self.upgrade_me = packages;
            self.out.info(format!("info: broken arch run for {}", arch));
            self.do_all(None, None, None, false)?;
            allpackages.extend(self.upgrade_me.iter().cloned());
            self.break_arches.push(arch);
        }
        self.upgrade_me = allpackages;

        if explicit_actions {
            self.printuninstchange();
            return Ok(());
        }

        // process `hint` hints (the first 50 only)
        let hint_hints: Vec<(String, Vec<HintTarget>)> = self
            .hints
            .of_type("hint")
            .take(50)
            .map(|hint| (hint.user.clone(), hint.targets.clone()))
            .collect();
        let mut hintcnt = 0;
        for (user, targets) in hint_hints {
            if hintcnt > 50 {
                self.out.info("Skipping remaining hints...");
                break;
            }
            if let Some(items) = self.hint_targets_to_items(&targets) {
                if self.do_hint("hint", &user, items)? {
                    hintcnt += 1;
                }
            }
        }

        if self.config.auto_hinter {
            self.run_auto_hinter()?;
        }

        if self.config.remove_obsolete {
            // a source is obsolete if none of the binaries in the target
            // suite are built by it
            info!("> Removing obsolete source packages from the target suite");
            let used: HashSet<&String> = self
                .suites
                .target
                .binaries
                .values()
                .flat_map(|packages| packages.values())
                .map(|pkg| &pkg.source)
                .collect();
            let removals: Vec<MigrationItem> = self
                .suites
                .target
                .sources
                .iter()
                .filter(|(name, _)| !used.contains(name))
                .map(|(name, src)| MigrationItem {
                    package: name.clone(),
                    version: src.version.clone(),
                    architecture: Architecture::Source,
                    suite: crate::suites::SuiteRef::Target,
                    suite_suffix: String::new(),
                    is_removal: true,
                    is_cruft_removal: false,
                })
                .collect();
            if !removals.is_empty() {
                self.out.info(format!(
                    "Removing obsolete source packages from the target suite ({}):",
                    removals.len()
                ));
                self.do_all(None, None, Some(removals), false)?;
            }
        }

        // smooth updates and cruft left in the target suite
        let mut removals = old_libraries(&self.suites, &self.config.outofsync_arches);
        if !removals.is_empty() {
            self.out.info(
                "Removing packages left in the target suite (e.g. smooth updates or cruft)",
            );
            for line in old_libraries_format(&removals) {
                self.out.info(line);
            }
            self.do_all(None, None, Some(removals), true)?;
            removals = old_libraries(&self.suites, &self.config.outofsync_arches);
        }
        self.out.info(format!(
            "List of old libraries in the target suite ({}):",
            removals.len()
        ));
        for line in old_libraries_format(&removals) {
            self.out.info(line);
        }

        self.printuninstchange();
        if self.config.check_consistency_level >= 1 {
            self.assert_nuninst_is_correct()?;
            self.suites.target.check_suite_source_pkg_consistency("end")?;
        }

        if !self.options.dry_run {
            if let Some(path) = self.config.heidi_output.clone() {
                info!("Writing Heidi results to {}", path.display());
                write_heidi(&path, &self.suites.target, &self.config.outofsync_arches)?;
            }
            if let Some(path) = self.config.heidi_delta_output.clone() {
                info!("Writing delta to {}", path.display());
                write_heidi_delta(&path, &self.all_selected)?;
            }
        }

        self.out.flush();
        info!("Test completed!");
        Ok(())
    }

    fn hint_targets_to_items(&mut self, targets: &[HintTarget]) -> Option<Vec<MigrationItem>> {
        let mut items = vec![];
        for target in targets {
            let Some(version) = &target.version else {
                self.out.warning(format!(
                    "Ignoring hint without version for {}",
                    target.package
                ));
                return None;
            };
            items.push(MigrationItem {
                package: target.package.clone(),
                version: version.clone(),
                architecture: target.architecture,
                suite: target.suite,
                suite_suffix: target.suite_suffix.clone(),
                is_removal: target.is_removal,
                is_cruft_removal: false,
            });
        }
        Some(items)
    }

    fn nuninst_arch_report(&self, nuninst: &Nuninst, arch: Architecture) {
        let mut by_source: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();
        if let Some(packages) = self.suites.target.binaries.get(&arch) {
            for name in nuninst.packages(arch) {
                if let Some(pkg) = packages.get(name) {
                    by_source
                        .entry((pkg.source.clone(), pkg.source_version.to_string()))
                        .or_default()
                        .insert(name.clone());
                }
            }
        }
        println!("* {}", arch);
        for ((source, version), packages) in by_source {
            println!(
                "  {} ({}): {}",
                source,
                version,
                packages.into_iter().collect::<Vec<_>>().join(" ")
            );
        }
        println!();
    }

    /// Interactive console to try hints against the loaded data set.
    pub fn hint_tester(&mut self) -> Result<()> {
        let mut parser = HintParser::new();
        self.policy_engine.register_policy_hints(&mut parser);
        let known_hints = parser.registered_hints();

        println!("britney hint tester");
        println!();
        println!("Known hints: {}", known_hints.join(" "));
        println!("Other commands: quit/exit");
        println!();

        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            print!("britney> ");
            std::io::stdout().flush()?;
            line.clear();
            if stdin.lock().read_line(&mut line)? == 0 {
                println!();
                break;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let Some(&command) = tokens.first() else {
                continue;
            };
            match command {
                "quit" | "exit" => break,
                "easy" | "hint" | "force-hint" => {
                    match parse_items(&self.suites, &tokens[1..], true) {
                        Ok(items) => {
                            self.do_hint(command, "hint-tester", items)?;
                            self.printuninstchange();
                        }
                        Err(error) => println!("failed to parse hint: {}", error),
                    }
                }
                _ => {
                    let mut parser = HintParser::new();
                    self.policy_engine.register_policy_hints(&mut parser);
                    parser.parse_hints(
                        &self.suites,
                        "hint-tester",
                        &Permissions::all(),
                        "<stdin>",
                        [line.trim()],
                    );
                    let new_hints = parser.into_hints();
                    if new_hints.is_empty() {
                        println!("unknown command: {}", command);
                        continue;
                    }
                    self.hints.extend(new_hints);
                    self.write_excuses()?;
                }
            }
        }
        Ok(())
    }

    /// Entry point after setup.
    pub fn run(&mut self) -> Result<()> {
        if self.options.print_uninst {
            let nuninst = self.nuninst_orig.clone();
            for &arch in &self.config.architectures.clone() {
                self.nuninst_arch_report(&nuninst, arch);
            }
            println!("* summary");
            for arch in &self.config.architectures {
                println!("{:4} {}", nuninst.packages(*arch).len(), arch);
            }
            return Ok(());
        }

        if let Some(actions) = self.options.actions.clone() {
            let tokens: Vec<&str> = actions.split_whitespace().collect();
            self.upgrade_me = parse_items(&self.suites, &tokens, true)?;
        } else {
            self.write_excuses()?;
        }

        if self.options.compute_migrations() || self.options.hint_tester {
            if self.options.dry_run {
                info!("Upgrade output not written to a file as this is a dry-run.");
            } else if let Some(path) = self.config.upgrade_output.clone() {
                self.out = UpgradeOutput::open(&path)?;
                info!("Logging upgrade output to {}", path.display());
            } else {
                info!("Upgrade output not written to a file as UPGRADE_OUTPUT is not set.");
            }

            if self.options.hint_tester {
                self.hint_tester()?;
            } else {
                self.upgrade_testing()?;
            }

            info!("> Stats from the installability tester");
            for line in self.tester.cache_stats() {
                info!(">   {}", line);
            }
        } else {
            info!("Migration computation skipped as requested.");
        }

        if !self.options.dry_run {
            let ctx = PolicyContext {
                config: &self.config,
                suites: &self.suites,
                universe: &self.universe,
                hints: &self.hints,
            };
            self.policy_engine.save_state(&ctx)?;
        }
        Ok(())
    }
}
