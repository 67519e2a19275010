// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! Shared helpers: the nuninst counters, dependency solving against suite
//! tables, smooth updates, excuse invalidation and the output writers.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use debian_archive_utils::{
    architectures::Architecture,
    excuses::{Excuses, ExcusesItem},
    relations::RelationClause,
};

use crate::excuse::Excuse;
use crate::hints::HintCollection;
use crate::migrationitem::{removal_for_cruft_item, MigrationItem};
use crate::policies::PolicyVerdict;
use crate::suites::{BinaryPackage, BinaryPackageId, Provider, SourcePackage, Suite, Suites};
use crate::tester::InstallabilityTester;
use crate::universe::{PackageUniverse, PkgIx};

/// Extra constraints loaded from the static input directory.
#[derive(Clone, Debug, Default)]
pub struct Constraints {
    /// Packages that must stay installable on every architecture
    pub keep_installable: Vec<String>,
}

/// The per-architecture sets of uninstallable binary package names.
///
/// `arch` excludes arch:all packages unless the architecture is in the
/// nobreakall set; `arch_all` always includes them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Nuninst {
    /// Uninstallable packages per architecture
    pub arch: BTreeMap<Architecture, BTreeSet<String>>,
    /// Uninstallable packages per architecture, including arch:all packages
    pub arch_all: BTreeMap<Architecture, BTreeSet<String>>,
}

impl Nuninst {
    /// The packages tracked for an architecture.
    pub fn packages(&self, arch: Architecture) -> &BTreeSet<String> {
        static EMPTY: BTreeSet<String> = BTreeSet::new();
        self.arch.get(&arch).unwrap_or(&EMPTY)
    }
}

/// Compile the nuninst counters from the current target suite.
pub fn compile_nuninst(
    target: &Suite,
    tester: &mut InstallabilityTester,
    universe: &PackageUniverse,
    architectures: &[Architecture],
    nobreakall_arches: &[Architecture],
) -> Nuninst {
    let mut nuninst = Nuninst::default();

    for &arch in architectures {
        let check_archall = nobreakall_arches.contains(&arch);
        let mut uninstallable = BTreeSet::new();
        let mut uninstallable_all = BTreeSet::new();

        if let Some(packages) = target.binaries.get(&arch) {
            for (pkg_name, pkg) in packages {
                let ix = universe.must_lookup(&pkg.pkg_id);
                if !tester.is_installable(universe, ix) {
                    uninstallable_all.insert(pkg_name.clone());
                    if check_archall || !pkg.architecture.is_all() {
                        uninstallable.insert(pkg_name.clone());
                    }
                }
            }
        }

        nuninst.arch.insert(arch, uninstallable);
        nuninst.arch_all.insert(arch, uninstallable_all);
    }

    nuninst
}

/// The uninstallable packages of `new` that were installable in `old`.
pub fn newly_uninst(old: &Nuninst, new: &Nuninst) -> BTreeMap<Architecture, Vec<String>> {
    let mut res = BTreeMap::new();
    for (arch, new_packages) in &new.arch {
        let Some(old_packages) = old.arch.get(arch) else {
            continue;
        };
        let broken: Vec<String> = new_packages.difference(old_packages).cloned().collect();
        if !broken.is_empty() {
            res.insert(*arch, broken);
        }
    }
    res
}

/// Render the newly uninstallable packages for the upgrade output.
pub fn uninst_lines(
    architectures: &[Architecture],
    uninst: &BTreeMap<Architecture, Vec<String>>,
) -> Vec<String> {
    let mut lines = vec![];
    for arch in architectures {
        if let Some(broken) = uninst.get(arch) {
            if !broken.is_empty() {
                let mut sorted = broken.clone();
                sorted.sort();
                lines.push(format!("    * {}: {}", arch, sorted.join(", ")));
            }
        }
    }
    lines
}

/// Summarise the uninstallability counters, e.g. `1+2: i-0:a-1:m-2`.
pub fn eval_nuninst(
    nuninst: &Nuninst,
    original: Option<&Nuninst>,
    architectures: &[Architecture],
    break_arches: &[Architecture],
) -> String {
    let mut parts = vec![];
    let mut total = 0;
    let mut totalbreak = 0;
    for arch in architectures {
        let count = match nuninst.arch.get(arch) {
            Some(packages) => packages.len(),
            None => match original.and_then(|orig| orig.arch.get(arch)) {
                Some(packages) => packages.len(),
                None => continue,
            },
        };
        if break_arches.contains(arch) {
            totalbreak += count;
        } else {
            total += count;
        }
        let letter = arch.as_str().chars().next().unwrap_or('?');
        parts.push(format!("{}-{}", letter, count));
    }
    format!("{}+{}: {}", total, totalbreak, parts.join(":"))
}

/// Compare the nuninst counters and the constraints.
///
/// The uninstallability regressions (net of `allow_uninst`) summed over the
/// non-break architectures must not be positive, and no keep-installable
/// package may become uninstallable on any architecture (break architectures
/// included in the latter check).
pub fn is_nuninst_asgood_generous(
    constraints: &Constraints,
    allow_uninst: &HashMap<Architecture, BTreeSet<String>>,
    architectures: &[Architecture],
    old: &Nuninst,
    new: &Nuninst,
    break_arches: &[Architecture],
) -> bool {
    static EMPTY: BTreeSet<String> = BTreeSet::new();
    let mut diff: i64 = 0;
    for arch in architectures {
        if break_arches.contains(arch) {
            continue;
        }
        let allowed = allow_uninst.get(arch).unwrap_or(&EMPTY);
        let new_broken = new.packages(*arch).difference(allowed).count() as i64;
        let old_broken = old.packages(*arch).difference(allowed).count() as i64;
        diff += new_broken - old_broken;
    }
    if diff > 0 {
        return false;
    }
    // break arches are excluded from the sum above, but keep-installable
    // still binds there
    for arch in architectures {
        let regression: BTreeSet<_> = new
            .packages(*arch)
            .difference(old.packages(*arch))
            .collect();
        if constraints
            .keep_installable
            .iter()
            .any(|pkg| regression.contains(pkg))
        {
            return false;
        }
    }
    true
}

/// The first architecture failing the acceptance test, with the packages
/// that broke there.
pub fn find_failing_arch(
    constraints: &Constraints,
    allow_uninst: &HashMap<Architecture, BTreeSet<String>>,
    architectures: &[Architecture],
    old: &Nuninst,
    new: &Nuninst,
    break_arches: &[Architecture],
) -> Option<(Architecture, Vec<String>)> {
    static EMPTY: BTreeSet<String> = BTreeSet::new();
    for arch in architectures {
        let broken: Vec<String> = new
            .packages(*arch)
            .difference(old.packages(*arch))
            .cloned()
            .collect();
        if broken.is_empty() {
            continue;
        }
        let keep_violation = constraints
            .keep_installable
            .iter()
            .any(|pkg| broken.contains(pkg));
        if keep_violation {
            return Some((*arch, broken));
        }
        if break_arches.contains(arch) {
            continue;
        }
        let allowed = allow_uninst.get(arch).unwrap_or(&EMPTY);
        let new_broken = new.packages(*arch).difference(allowed).count();
        let old_broken = old.packages(*arch).difference(allowed).count();
        if new_broken > old_broken {
            return Some((*arch, broken));
        }
    }
    None
}

/// Write the nuninst cache file.
pub fn write_nuninst(path: &Path, nuninst: &Nuninst) -> Result<()> {
    let mut file = BufWriter::new(
        File::create(path).with_context(|| format!("cannot write {}", path.display()))?,
    );
    let now = Utc::now().format("%Y.%m.%d %H:%M:%S %z");
    writeln!(file, "Built on: {}", now)?;
    writeln!(file, "Last update: {}", now)?;
    writeln!(file)?;
    for (arch, packages) in &nuninst.arch {
        writeln!(
            file,
            "{}: {}",
            arch,
            packages.iter().cloned().collect::<Vec<_>>().join(" ")
        )?;
    }
    for (arch, packages) in &nuninst.arch_all {
        writeln!(
            file,
            "{}+all: {}",
            arch,
            packages.iter().cloned().collect::<Vec<_>>().join(" ")
        )?;
    }
    Ok(())
}

/// Read the nuninst cache file, keeping only the given architectures.
pub fn read_nuninst(path: &Path, architectures: &[Architecture]) -> Result<Nuninst> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("cannot read nuninst cache {}", path.display()))?;
    let mut nuninst = Nuninst::default();
    for &arch in architectures {
        nuninst.arch.insert(arch, BTreeSet::new());
        nuninst.arch_all.insert(arch, BTreeSet::new());
    }
    for line in content.lines() {
        let Some((key, packages)) = line.split_once(':') else {
            continue;
        };
        let (arch_str, include_all) = match key.strip_suffix("+all") {
            Some(arch) => (arch, true),
            None => (key, false),
        };
        let Ok(arch) = Architecture::try_from(arch_str.trim()) else {
            continue;
        };
        if !architectures.contains(&arch) {
            continue;
        }
        let packages: BTreeSet<String> =
            packages.split_whitespace().map(str::to_owned).collect();
        if include_all {
            nuninst.arch_all.insert(arch, packages);
        } else {
            nuninst.arch.insert(arch, packages);
        }
    }
    Ok(nuninst)
}

/// Find the packages in a suite table that satisfy a dependency clause.
///
/// `build_depends` enables the `:native` architecture qualifier.
pub fn get_dependency_solvers<'a>(
    clause: &RelationClause,
    binaries_s_a: &'a HashMap<String, BinaryPackage>,
    provides_s_a: &'a HashMap<String, BTreeSet<Provider>>,
    build_depends: bool,
) -> Vec<&'a BinaryPackage> {
    use debian_archive_utils::package::MultiArch;

    let mut packages: Vec<&BinaryPackage> = vec![];
    for relation in clause {
        let archqual = relation.archqual.as_deref();

        if let Some(package) = binaries_s_a.get(&relation.package) {
            let version_ok = relation
                .constraint
                .as_ref()
                .is_none_or(|constraint| constraint.satisfied_by(&package.version));
            if version_ok {
                match archqual {
                    None => packages.push(package),
                    // :native is ok for build-dependencies
                    Some("native") if build_depends => packages.push(package),
                    // :any is ok iff the target has Multi-Arch: allowed
                    Some("any") if package.multi_arch == MultiArch::Allowed => {
                        packages.push(package)
                    }
                    Some(_) => {}
                }
            }
        }

        // a provides only satisfies an unversioned dependency without an
        // architecture qualifier, or a matching versioned provides
        if archqual.is_none() {
            if let Some(providers) = provides_s_a.get(&relation.package) {
                for provider in providers {
                    let satisfied = match &relation.constraint {
                        None => true,
                        Some(constraint) => provider
                            .version
                            .as_ref()
                            .is_some_and(|version| constraint.satisfied_by(version)),
                    };
                    if satisfied {
                        if let Some(package) = binaries_s_a.get(&provider.package) {
                            packages.push(package);
                        }
                    }
                }
            }
        }
    }

    packages.sort_by(|a, b| a.pkg_id.cmp(&b.pkg_id));
    packages.dedup_by(|a, b| a.pkg_id == b.pkg_id);
    packages
}

/// Extend the set with the transitive reverse dependency closure, following
/// conflicts as well (a package's installability can change when a conflict
/// partner appears or disappears).
pub fn compute_reverse_tree(universe: &PackageUniverse, affected: &mut HashSet<PkgIx>) {
    let mut remain: Vec<PkgIx> = affected.iter().copied().collect();
    while let Some(ix) = remain.pop() {
        for &other in universe
            .reverse_dependencies_of(ix)
            .iter()
            .chain(universe.negative_dependencies_of(ix))
        {
            if affected.insert(other) {
                remain.push(other);
            }
        }
    }
}

/// Whether the configuration or a hint allows a smooth update of the binary.
pub fn is_smooth_update_allowed(
    binary: &BinaryPackage,
    smooth_updates: &[String],
    hints: &HintCollection,
) -> bool {
    if smooth_updates.iter().any(|entry| entry == "ALL") {
        return true;
    }
    let section = binary
        .section
        .as_deref()
        .map(|section| section.rsplit('/').next().unwrap_or(section))
        .unwrap_or("");
    if smooth_updates.iter().any(|entry| entry == section) {
        return true;
    }
    // note that this needs to match the source version in the target suite
    !hints
        .search(
            "allow-smooth-update",
            Some(&binary.source),
            Some(&binary.source_version),
            None,
            None,
        )
        .is_empty()
}

/// Find the binaries of the old source that can be kept in the target suite
/// after the source migrated (smooth updates).
#[allow(clippy::too_many_arguments)]
pub fn find_smooth_updateable_binaries(
    binaries_to_check: &[BinaryPackageId],
    source_u: &SourcePackage,
    universe: &PackageUniverse,
    target: &Suite,
    source_suite: &Suite,
    removals: &HashSet<BinaryPackageId>,
    smooth_updates: &[String],
    hints: &HintCollection,
) -> HashSet<BinaryPackageId> {
    let mut check: Vec<PkgIx> = vec![];
    let mut smoothbins: HashSet<PkgIx> = HashSet::new();
    let to_check_ixs: HashSet<PkgIx> = binaries_to_check
        .iter()
        .filter_map(|pkg_id| universe.lookup(pkg_id))
        .collect();
    let removal_ixs: HashSet<PkgIx> = removals
        .iter()
        .filter_map(|pkg_id| universe.lookup(pkg_id))
        .collect();

    for pkg_id in binaries_to_check {
        let arch = pkg_id.architecture;
        let mut cruftbins: HashSet<PkgIx> = HashSet::new();

        // not a candidate if the new source still builds the binary
        if let Some(newer) = source_suite
            .binaries
            .get(&arch)
            .and_then(|packages| packages.get(&pkg_id.package_name))
        {
            if newer.source_version == source_u.version {
                continue;
            }
            if let Some(ix) = universe.lookup(&newer.pkg_id) {
                cruftbins.insert(ix);
            }
        }

        let Some(binary_t) = target
            .binaries
            .get(&arch)
            .and_then(|packages| packages.get(&pkg_id.package_name))
        else {
            continue;
        };
        if !is_smooth_update_allowed(binary_t, smooth_updates, hints) {
            continue;
        }

        let ix = universe.must_lookup(pkg_id);
        let mut rdeps: HashSet<PkgIx> = universe
            .reverse_dependencies_of(ix)
            .iter()
            .copied()
            .collect();
        // binaries leaving together with this one cannot keep it alive
        rdeps.retain(|r| !removal_ixs.contains(r) && !to_check_ixs.contains(r));

        let rdep_ids: Vec<&BinaryPackageId> =
            rdeps.iter().map(|&r| universe.pkg_id(r)).collect();
        let mut smooth_update_it = false;
        if target.any_of_these_are_in_the_suite(rdep_ids.iter().copied()) {
            let mut combined = smoothbins.clone();
            combined.insert(ix);
            'rdeps: for &rdep in &rdeps {
                if !target.is_pkg_in_suite(universe.pkg_id(rdep)) {
                    continue;
                }
                for clause in universe.dependencies_of(rdep) {
                    // if every alternative that is not cruft lies within the
                    // smooth set, only this binary can satisfy the clause
                    let clause_within: bool = clause
                        .iter()
                        .filter(|q| !cruftbins.contains(*q))
                        .all(|q| combined.contains(q));
                    if clause_within && clause.iter().any(|q| combined.contains(q)) {
                        smooth_update_it = true;
                        break 'rdeps;
                    }
                }
            }
            if smooth_update_it {
                smoothbins = combined;
            } else {
                check.push(ix);
            }
        } else {
            check.push(ix);
        }
    }

    // candidates whose only reverse dependencies are other smooth binaries
    loop {
        let mut found_any = false;
        for &ix in &check {
            if smoothbins.contains(&ix) {
                continue;
            }
            if universe
                .reverse_dependencies_of(ix)
                .iter()
                .any(|r| smoothbins.contains(r))
            {
                smoothbins.insert(ix);
                found_any = true;
            }
        }
        if !found_any {
            break;
        }
    }

    smoothbins
        .into_iter()
        .map(|ix| universe.pkg_id(ix).clone())
        .collect()
}

/// Detect old libraries left in the target suite for smooth transitions.
///
/// For out-of-sync architectures, outdated binaries are only scheduled for
/// removal once they left the primary source suite as well.
pub fn old_libraries(suites: &Suites, outofsync_arches: &[Architecture]) -> Vec<MigrationItem> {
    let sources_t = &suites.target.sources;
    let binaries_s = &suites.primary_source_suite().binaries;
    let mut removals = vec![];
    for (arch, packages) in &suites.target.binaries {
        for (pkg_name, pkg) in packages {
            if sources_t
                .get(&pkg.source)
                .is_some_and(|src| src.version != pkg.source_version)
                && (!outofsync_arches.contains(arch)
                    || !binaries_s
                        .get(arch)
                        .is_some_and(|packages| packages.contains_key(pkg_name)))
            {
                removals.push(removal_for_cruft_item(&pkg.pkg_id));
            }
        }
    }
    removals.sort();
    removals
}

/// Group removal items by package for logging.
pub fn old_libraries_format(libs: &[MigrationItem]) -> Vec<String> {
    let mut libraries: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for item in libs {
        libraries
            .entry(item.package.as_str())
            .or_default()
            .push(item.architecture.to_string());
    }
    libraries
        .into_iter()
        .map(|(pkg, arches)| format!(" {}: {}", pkg, arches.join(" ")))
        .collect()
}

/// Translate package-level dependencies into excuse-level dependencies and
/// transitively invalidate rejected excuses.
pub fn invalidate_excuses(
    excuses: &mut BTreeMap<String, Excuse>,
    valid: &mut HashSet<String>,
    invalid: &mut HashSet<String>,
    invalidated: &mut HashSet<String>,
) {
    use crate::excuse::DependencyState;

    // map each package id to the excuses that would add it to the target
    let mut excuses_packages: HashMap<crate::suites::PackageId, BTreeSet<String>> = HashMap::new();
    for excuse in excuses.values() {
        for pkg_ids in excuse.packages.values() {
            for pkg_id in pkg_ids {
                excuses_packages
                    .entry(pkg_id.clone())
                    .or_default()
                    .insert(excuse.name());
            }
        }
    }

    // create excuse-level dependencies from the package-level ones
    let mut excuses_rdeps: HashMap<String, BTreeSet<String>> = HashMap::new();
    let names: Vec<String> = excuses.keys().cloned().collect();
    for name in &names {
        let pkg_deps = excuses[name].depends_packages.clone();
        for pkg_dep in pkg_deps {
            let mut depstates = vec![];
            let mut satisfied_by_self = false;
            let mut seen: BTreeSet<String> = BTreeSet::new();
            for pkg_id in &pkg_dep.packages {
                match excuses_packages.get(pkg_id) {
                    None => {
                        depstates.push(DependencyState::impossible(
                            PolicyVerdict::RejectedPermanently,
                            pkg_id.name(),
                        ));
                    }
                    Some(pkg_excuses) => {
                        for dep_name in pkg_excuses {
                            if dep_name == name {
                                satisfied_by_self = true;
                                break;
                            }
                            if seen.insert(dep_name.clone()) {
                                depstates.push(DependencyState::new(dep_name.clone()));
                                excuses_rdeps
                                    .entry(dep_name.clone())
                                    .or_default()
                                    .insert(name.clone());
                            }
                        }
                    }
                }
                if satisfied_by_self {
                    break;
                }
            }
            if satisfied_by_self || depstates.is_empty() {
                continue;
            }
            let excuse = excuses.get_mut(name).unwrap();
            if !excuse.add_dependency(depstates, pkg_dep.spec.clone()) {
                valid.remove(name);
                invalid.insert(name.clone());
            }
        }
    }

    // transitively invalidate the reverse dependencies of invalid excuses
    while let Some(name) = invalid.iter().next().cloned() {
        invalid.remove(&name);
        invalidated.insert(name.clone());
        let Some(rdeps) = excuses_rdeps.get(&name).cloned() else {
            continue;
        };

        let rdep_verdict = if excuses[&name].policy_verdict().is_blocked() {
            PolicyVerdict::RejectedBlockedByAnotherItem
        } else {
            PolicyVerdict::RejectedWaitingForAnotherItem
        };

        for rdep_name in rdeps {
            let Some(excuse) = excuses.get_mut(&rdep_name) else {
                continue;
            };
            if valid.contains(&rdep_name) && !excuse.forced {
                let still_valid = excuse.invalidate_dependency(&name, rdep_verdict);
                if !still_valid {
                    valid.remove(&rdep_name);
                    invalid.insert(rdep_name);
                }
            }
        }
    }
}

/// Write the HeidiResult file: every binary and source of the target suite.
pub fn write_heidi(
    path: &Path,
    target: &Suite,
    outofsync_arches: &[Architecture],
) -> Result<()> {
    let mut file = BufWriter::new(
        File::create(path).with_context(|| format!("cannot write {}", path.display()))?,
    );

    let mut arches: Vec<Architecture> = target.binaries.keys().copied().collect();
    arches.sort();
    for arch in arches {
        let packages = &target.binaries[&arch];
        let mut names: Vec<&String> = packages.keys().collect();
        names.sort();
        for name in names {
            let pkg = &packages[name];
            let section = pkg.section.as_deref().unwrap_or("faux");
            if section == "faux" || section.ends_with("/faux") {
                continue;
            }
            // out-of-sync architectures may carry arch:all binaries that are
            // older than the source in the target suite; exclude those
            if pkg.architecture.is_all()
                && outofsync_arches.contains(&arch)
                && target
                    .sources
                    .get(&pkg.source)
                    .is_some_and(|src| src.version != pkg.source_version)
            {
                continue;
            }
            writeln!(
                file,
                "{} {} {} {}",
                name, pkg.version, pkg.architecture, section
            )?;
        }
    }

    let mut sources: Vec<&String> = target.sources.keys().collect();
    sources.sort();
    for name in sources {
        let src = &target.sources[name];
        let section = if src.section.is_empty() {
            "unknown"
        } else {
            src.section.as_str()
        };
        if section == "faux" || section.ends_with("/faux") {
            continue;
        }
        writeln!(file, "{} {} source {}", name, src.version, section)?;
    }

    Ok(())
}

/// Write the HeidiDelta file: the accepted items in order of acceptance.
pub fn write_heidi_delta(path: &Path, all_selected: &[MigrationItem]) -> Result<()> {
    let mut file = BufWriter::new(
        File::create(path).with_context(|| format!("cannot write {}", path.display()))?,
    );
    writeln!(file, "#HeidiDelta")?;
    for item in all_selected {
        let prefix = if item.is_removal { "-" } else { "" };
        if item.architecture.is_source() {
            writeln!(file, "{}{} {}", prefix, item.package, item.version)?;
        } else {
            writeln!(
                file,
                "{}{} {} {}",
                prefix, item.package, item.version, item.architecture
            )?;
        }
    }
    Ok(())
}

fn render_excuses(excuses: &BTreeMap<String, Excuse>) -> (Vec<&Excuse>, HashMap<String, String>) {
    let mut excuselist: Vec<&Excuse> = excuses.values().collect();
    excuselist.sort_by_key(|excuse| excuse.sortkey());
    let uvnames: HashMap<String, String> = excuses
        .values()
        .map(|excuse| (excuse.name(), excuse.uvname()))
        .collect();
    (excuselist, uvnames)
}

fn open_possibly_compressed_writer(path: &Path) -> Result<Box<dyn Write>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path).with_context(|| format!("cannot write {}", path.display()))?;
    let writer: Box<dyn Write> = match path.extension().and_then(|ext| ext.to_str()) {
        Some("gz") => Box::new(flate2::write::GzEncoder::new(
            file,
            flate2::Compression::default(),
        )),
        Some("xz") => Box::new(xz2::write::XzEncoder::new(file, 6)),
        _ => Box::new(BufWriter::new(file)),
    };
    Ok(writer)
}

/// Write the excuses as YAML.
pub fn write_excuses_yaml(path: &Path, excuses: &BTreeMap<String, Excuse>) -> Result<()> {
    let (excuselist, uvnames) = render_excuses(excuses);
    let sources: Vec<ExcusesItem> = excuselist
        .iter()
        .map(|excuse| excuse.excuse_data(&uvnames))
        .collect();
    let document = Excuses {
        generated_date: Utc::now(),
        sources,
    };
    let mut writer = open_possibly_compressed_writer(path)?;
    debian_archive_utils::excuses::to_writer(&mut writer, &document)?;
    writer.flush()?;
    Ok(())
}

/// Write the excuses as legacy HTML.
pub fn write_excuses_html(path: &Path, excuses: &BTreeMap<String, Excuse>) -> Result<()> {
    let (excuselist, uvnames) = render_excuses(excuses);
    let mut writer = open_possibly_compressed_writer(path)?;
    writeln!(
        writer,
        "<!DOCTYPE HTML PUBLIC \"-//W3C//DTD HTML 4.01//EN\" \"http://www.w3.org/TR/REC-html40/strict.dtd\">"
    )?;
    writeln!(writer, "<html><head><title>excuses...</title>")?;
    writeln!(
        writer,
        "<meta http-equiv=\"Content-Type\" content=\"text/html;charset=utf-8\"></head><body>"
    )?;
    writeln!(
        writer,
        "<p>Generated: {}</p>",
        Utc::now().format("%Y.%m.%d %H:%M:%S %z")
    )?;
    writeln!(writer, "<ul>")?;
    for excuse in excuselist {
        writeln!(writer, "<li>{}", excuse.html(&uvnames))?;
    }
    writeln!(writer, "</ul></body></html>")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn nuninst(broken: &[(&str, &[&str])]) -> Nuninst {
        let mut res = Nuninst::default();
        for (arch, packages) in broken {
            let arch = Architecture::try_from(*arch).unwrap();
            let set: BTreeSet<String> = packages.iter().map(|s| s.to_string()).collect();
            res.arch.insert(arch, set.clone());
            res.arch_all.insert(arch, set);
        }
        res
    }

    #[test]
    fn asgood_accepts_equal_and_better() {
        let constraints = Constraints::default();
        let allow = HashMap::new();
        let archs = [Architecture::Amd64, Architecture::I386];

        let old = nuninst(&[("amd64", &["a"]), ("i386", &[])]);
        let same = old.clone();
        let better = nuninst(&[("amd64", &[]), ("i386", &[])]);
        let worse = nuninst(&[("amd64", &["a", "b"]), ("i386", &[])]);

        assert!(is_nuninst_asgood_generous(
            &constraints,
            &allow,
            &archs,
            &old,
            &same,
            &[]
        ));
        assert!(is_nuninst_asgood_generous(
            &constraints,
            &allow,
            &archs,
            &old,
            &better,
            &[]
        ));
        assert!(!is_nuninst_asgood_generous(
            &constraints,
            &allow,
            &archs,
            &old,
            &worse,
            &[]
        ));
    }

    #[test]
    fn asgood_sums_across_architectures() {
        let constraints = Constraints::default();
        let allow = HashMap::new();
        let archs = [Architecture::Amd64, Architecture::I386];

        let old = nuninst(&[("amd64", &["a"]), ("i386", &[])]);
        // an improvement on amd64 offsets the regression on i386
        let shifted = nuninst(&[("amd64", &[]), ("i386", &["b"])]);
        assert!(is_nuninst_asgood_generous(
            &constraints,
            &allow,
            &archs,
            &old,
            &shifted,
            &[]
        ));
    }

    #[test]
    fn asgood_break_arches_and_keep_installable() {
        let allow = HashMap::new();
        let archs = [Architecture::Amd64, Architecture::I386];
        let break_arches = [Architecture::I386];

        let old = nuninst(&[("amd64", &[]), ("i386", &[])]);
        let broken_on_break = nuninst(&[("amd64", &[]), ("i386", &["b"])]);

        // regressions on break arches are ignored for the sum
        assert!(is_nuninst_asgood_generous(
            &Constraints::default(),
            &allow,
            &archs,
            &old,
            &broken_on_break,
            &break_arches
        ));

        // but keep-installable still applies there
        let constraints = Constraints {
            keep_installable: vec!["b".to_owned()],
        };
        assert!(!is_nuninst_asgood_generous(
            &constraints,
            &allow,
            &archs,
            &old,
            &broken_on_break,
            &break_arches
        ));
        let failing = find_failing_arch(
            &constraints,
            &allow,
            &archs,
            &old,
            &broken_on_break,
            &break_arches,
        );
        assert_eq!(
            failing,
            Some((Architecture::I386, vec!["b".to_owned()]))
        );
    }

    #[test]
    fn allow_uninst_discounts_regressions() {
        let constraints = Constraints::default();
        let mut allow: HashMap<Architecture, BTreeSet<String>> = HashMap::new();
        allow
            .entry(Architecture::Amd64)
            .or_default()
            .insert("flaky".to_owned());
        let archs = [Architecture::Amd64];

        let old = nuninst(&[("amd64", &[])]);
        let new = nuninst(&[("amd64", &["flaky"])]);
        assert!(is_nuninst_asgood_generous(
            &constraints,
            &allow,
            &archs,
            &old,
            &new,
            &[]
        ));
    }

    #[test]
    fn eval_summary_format() {
        let nuninst = nuninst(&[("amd64", &["a"]), ("i386", &["b", "c"])]);
        let summary = eval_nuninst(
            &nuninst,
            None,
            &[Architecture::Amd64, Architecture::I386],
            &[Architecture::I386],
        );
        assert_eq!(summary, "1+2: a-1:i-2");
    }

    #[test]
    fn newly_uninst_reports_regressions_only() {
        let old = nuninst(&[("amd64", &["a"])]);
        let new = nuninst(&[("amd64", &["a", "b"])]);
        let diff = newly_uninst(&old, &new);
        assert_eq!(diff[&Architecture::Amd64], vec!["b".to_owned()]);
        assert!(newly_uninst(&new, &old).is_empty());
    }
}
