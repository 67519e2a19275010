// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! Loading of suite contents from a deb-mirror-like tree.
//!
//! Every suite provides a `Sources` file and one `Packages` file per
//! architecture, either directly (`Sources`, `Packages_<arch>`) or within
//! components as listed in the `Release` file (`main/source/Sources`,
//! `main/binary-<arch>/Packages`). Plain, gzip and xz compressed files are
//! accepted.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use debian_archive_utils::{
    architectures::Architecture,
    package::MultiArch,
    relations::parse_relations,
    version::PackageVersion,
};
use log::{info, warn};
use serde::Deserialize;

use crate::config::Config;
use crate::suites::{
    BinaryPackage, BinaryPackageId, PackageId, Provider, SourcePackage, Suite, SuiteClass, Suites,
};
use crate::utils::Constraints;

/// Index of every known binary across all suites.
pub type AllBinaries = HashMap<BinaryPackageId, BinaryPackage>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReleaseParagraph {
    suite: Option<String>,
    codename: Option<String>,
    components: Option<String>,
    architectures: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SourceParagraph {
    package: String,
    version: PackageVersion,
    maintainer: Option<String>,
    section: Option<String>,
    #[serde(rename = "Build-Depends")]
    build_depends: Option<String>,
    #[serde(rename = "Build-Depends-Arch")]
    build_depends_arch: Option<String>,
    #[serde(rename = "Build-Depends-Indep")]
    build_depends_indep: Option<String>,
    testsuite: Option<String>,
    #[serde(rename = "Testsuite-Triggers")]
    testsuite_triggers: Option<String>,
    #[serde(rename = "Extra-Source-Only")]
    extra_source_only: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BinaryParagraph {
    package: String,
    version: PackageVersion,
    source: Option<String>,
    architecture: String,
    #[serde(rename = "Multi-Arch")]
    multi_arch: Option<MultiArch>,
    section: Option<String>,
    #[serde(rename = "Pre-Depends")]
    pre_depends: Option<String>,
    depends: Option<String>,
    conflicts: Option<String>,
    breaks: Option<String>,
    provides: Option<String>,
    essential: Option<String>,
    #[serde(rename = "Built-Using")]
    built_using: Option<String>,
}

/// Find a (possibly compressed) variant of the given path.
fn possibly_compressed(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    for extension in ["gz", "xz"] {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(".");
        candidate.push(extension);
        let candidate = PathBuf::from(candidate);
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    bail!("no such file: {}", path.display())
}

fn open_reader(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    Ok(match path.extension().and_then(|ext| ext.to_str()) {
        Some("gz") => Box::new(flate2::read::GzDecoder::new(file)),
        Some("xz") => Box::new(xz2::read::XzDecoder::new(file)),
        _ => Box::new(file),
    })
}

fn read_paragraphs<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = BufReader::new(open_reader(path)?);
    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .with_context(|| format!("cannot read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(vec![]);
    }
    rfc822_like::from_str(&content)
        .with_context(|| format!("malformed index file {}", path.display()))
}

fn read_release_file(suite_dir: &Path) -> Result<Option<ReleaseParagraph>> {
    let path = suite_dir.join("Release");
    if !path.exists() {
        return Ok(None);
    }
    let reader = BufReader::new(open_reader(&path)?);
    let release: ReleaseParagraph = rfc822_like::from_reader(reader)
        .with_context(|| format!("malformed Release file {}", path.display()))?;
    Ok(Some(release))
}

/// Merge two optional relationship fields into one.
fn merge_fields(first: Option<&str>, second: Option<&str>) -> Option<String> {
    let fields: Vec<&str> = [first, second]
        .into_iter()
        .flatten()
        .filter(|field| !field.trim().is_empty())
        .collect();
    if fields.is_empty() {
        None
    } else {
        Some(fields.join(", "))
    }
}

fn parse_provides_field(raw: &str, pkg_id: &BinaryPackageId) -> Vec<Provider> {
    let mut providers = vec![];
    let Ok(clauses) = parse_relations(raw) else {
        warn!("Ignoring unparsable Provides in {}", pkg_id);
        return providers;
    };
    for clause in clauses {
        if clause.len() != 1 {
            warn!("Ignoring invalid provides in {}: alternatives", pkg_id);
            continue;
        }
        let relation = &clause[0];
        match &relation.constraint {
            None => providers.push(Provider {
                package: relation.package.clone(),
                version: None,
            }),
            Some(constraint)
                if constraint.op == debian_archive_utils::relations::RelOp::Equal =>
            {
                providers.push(Provider {
                    package: relation.package.clone(),
                    version: Some(constraint.version.clone()),
                })
            }
            Some(constraint) => {
                warn!(
                    "Ignoring invalid provides in {}: {} ({} {})",
                    pkg_id, relation.package, constraint.op, constraint.version
                );
            }
        }
    }
    providers
}

fn parse_builtusing_field(raw: &str, pkg_id: &BinaryPackageId) -> Vec<(String, PackageVersion)> {
    let mut entries = vec![];
    let Ok(clauses) = parse_relations(raw) else {
        warn!("Ignoring unparsable Built-Using in {}", pkg_id);
        return entries;
    };
    for clause in clauses {
        if clause.len() != 1 {
            warn!("Ignoring invalid builtusing in {}: alternatives", pkg_id);
            continue;
        }
        let relation = &clause[0];
        match &relation.constraint {
            Some(constraint)
                if constraint.op == debian_archive_utils::relations::RelOp::Equal =>
            {
                entries.push((relation.package.clone(), constraint.version.clone()))
            }
            _ => {
                warn!("Ignoring invalid builtusing in {}: {}", pkg_id, relation);
            }
        }
    }
    entries
}

/// The deb-mirror-like suite content loader.
#[derive(Debug)]
pub struct SuiteContentLoader {
    components: Vec<String>,
    architectures: Vec<Architecture>,
}

impl SuiteContentLoader {
    /// Load all configured suites.
    ///
    /// Updates the architectures and components of the configuration from
    /// the target suite's Release file where necessary.
    pub fn load(config: &mut Config) -> Result<(Suites, AllBinaries)> {
        let mut loader = Self {
            components: vec![],
            architectures: config.architectures.clone(),
        };

        let target_release = read_release_file(&config.testing)?;
        if let Some(release) = &target_release {
            if let Some(components) = &release.components {
                loader.components = components.split_whitespace().map(str::to_owned).collect();
                info!(
                    "Using components listed in Release file: {}",
                    loader.components.join(" ")
                );
            }
            if loader.architectures.is_empty() {
                let raw = release.architectures.as_deref().ok_or_else(|| {
                    anyhow!("no configured architectures and the Release file lists none")
                })?;
                loader.architectures = raw
                    .split_whitespace()
                    .map(|arch| {
                        Architecture::try_from(arch)
                            .map_err(|_| anyhow!("invalid architecture {} in Release file", arch))
                    })
                    .collect::<Result<Vec<_>>>()?;
                info!(
                    "Using architectures listed in Release file: {}",
                    loader
                        .architectures
                        .iter()
                        .map(|arch| arch.to_string())
                        .collect::<Vec<_>>()
                        .join(" ")
                );
            }
        }
        if loader.architectures.is_empty() {
            bail!("ARCHITECTURES is not set and cannot be auto-detected");
        }
        assert!(
            !loader.architectures.contains(&Architecture::All),
            "all not allowed in architectures"
        );
        loader.reorder_architectures(config);
        config.architectures = loader.architectures.clone();
        config.components = loader.components.clone();

        let mut target = Suite::new(
            SuiteClass::Target,
            "testing",
            config.testing.clone(),
            "",
            &loader.architectures,
        );
        loader.update_suite_name(&mut target, target_release);

        let mut sources = vec![Suite::new(
            SuiteClass::PrimarySource,
            "unstable",
            config.unstable.clone(),
            "",
            &loader.architectures,
        )];
        for (name, path) in [("pu", &config.pu), ("tpu", &config.tpu)] {
            if let Some(path) = path {
                sources.push(Suite::new(
                    SuiteClass::AdditionalSource,
                    name,
                    path.clone(),
                    name,
                    &loader.architectures,
                ));
            } else {
                info!("Optional suite {} is not defined", name);
            }
        }

        let mut all_binaries = AllBinaries::new();
        for suite in sources.iter_mut().chain(std::iter::once(&mut target)) {
            if suite.suite_class.is_source() {
                let release = read_release_file(&suite.path)?;
                loader.update_suite_name(suite, release);
            }
            suite.sources = loader.read_sources(suite)?;
            loader.read_binaries(suite, &mut all_binaries)?;
        }

        Ok((Suites { target, sources }, all_binaries))
    }

    /// Order the architectures such that the most important ones come first;
    /// this both stabilises the outputs and makes the logs easier to read.
    fn reorder_architectures(&mut self, config: &Config) {
        let all = self.architectures.clone();
        let mut ordered: Vec<Architecture> = all
            .iter()
            .copied()
            .filter(|a| config.nobreakall_arches.contains(a))
            .collect();
        for excluded in [
            &config.outofsync_arches,
            &config.break_arches,
            &config.new_arches,
        ] {
            let next: Vec<Architecture> = all
                .iter()
                .copied()
                .filter(|a| !ordered.contains(a) && !excluded.contains(a))
                .collect();
            ordered.extend(next);
        }
        let rest: Vec<Architecture> = all
            .iter()
            .copied()
            .filter(|a| !ordered.contains(a))
            .collect();
        ordered.extend(rest);
        self.architectures = ordered;
    }

    fn update_suite_name(&self, suite: &mut Suite, release: Option<ReleaseParagraph>) {
        let Some(release) = release else {
            info!(
                "The {} suite does not have a Release file, unable to update the name",
                suite.name
            );
            return;
        };
        if let Some(name) = release.suite.or(release.codename) {
            info!("Using suite name from Release file: {}", name);
            suite.name = name;
        }
    }

    fn sources_paths(&self, suite: &Suite) -> Result<Vec<PathBuf>> {
        if self.components.is_empty() {
            Ok(vec![possibly_compressed(&suite.path.join("Sources"))?])
        } else {
            self.components
                .iter()
                .map(|component| {
                    possibly_compressed(&suite.path.join(component).join("source").join("Sources"))
                })
                .collect()
        }
    }

    fn read_sources(&self, suite: &Suite) -> Result<HashMap<String, SourcePackage>> {
        let mut sources = HashMap::new();
        for path in self.sources_paths(suite)? {
            info!("Loading source packages from {}", path.display());
            for paragraph in read_paragraphs::<SourceParagraph>(&path)? {
                // sources only referenced by Built-Using do not migrate
                if paragraph.extra_source_only.as_deref() == Some("yes") {
                    continue;
                }
                // multiple versions may exist; keep the highest
                if sources
                    .get(&paragraph.package)
                    .is_some_and(|existing: &SourcePackage| existing.version > paragraph.version)
                {
                    continue;
                }
                let build_deps_arch = merge_fields(
                    paragraph.build_depends.as_deref(),
                    paragraph.build_depends_arch.as_deref(),
                );
                sources.insert(
                    paragraph.package.clone(),
                    SourcePackage {
                        source: paragraph.package,
                        version: paragraph.version,
                        section: paragraph.section.unwrap_or_default(),
                        binaries: Default::default(),
                        maintainer: paragraph.maintainer,
                        is_fakesrc: false,
                        build_deps_arch,
                        build_deps_indep: paragraph.build_depends_indep,
                        testsuite: paragraph
                            .testsuite
                            .map(|value| {
                                value.split_whitespace().map(str::to_owned).collect()
                            })
                            .unwrap_or_default(),
                        testsuite_triggers: paragraph
                            .testsuite_triggers
                            .map(|value| {
                                value
                                    .replace(',', " ")
                                    .split_whitespace()
                                    .map(str::to_owned)
                                    .collect()
                            })
                            .unwrap_or_default(),
                    },
                );
            }
        }
        Ok(sources)
    }

    fn packages_paths(&self, suite: &Suite, arch: Architecture) -> Result<Vec<PathBuf>> {
        if self.components.is_empty() {
            Ok(vec![possibly_compressed(
                &suite.path.join(format!("Packages_{}", arch)),
            )?])
        } else {
            self.components
                .iter()
                .map(|component| {
                    possibly_compressed(
                        &suite
                            .path
                            .join(component)
                            .join(format!("binary-{}", arch))
                            .join("Packages"),
                    )
                })
                .collect()
        }
    }

    fn read_binaries(&self, suite: &mut Suite, all_binaries: &mut AllBinaries) -> Result<()> {
        for &arch in &self.architectures {
            for path in self.packages_paths(suite, arch)? {
                info!("Loading binary packages from {}", path.display());
                for paragraph in read_paragraphs::<BinaryParagraph>(&path)? {
                    self.add_binary(suite, arch, paragraph, all_binaries)
                        .with_context(|| format!("while reading {}", path.display()))?;
                }
            }
        }
        Ok(())
    }

    fn add_binary(
        &self,
        suite: &mut Suite,
        arch: Architecture,
        paragraph: BinaryParagraph,
        all_binaries: &mut AllBinaries,
    ) -> Result<()> {
        let pkg_id = PackageId::binary(&paragraph.package, paragraph.version.clone(), arch);

        // there may be multiple versions of arch:all packages if some
        // architectures are out of date; keep the highest version only
        if let Some(existing) = suite
            .binaries
            .get(&arch)
            .and_then(|packages| packages.get(&paragraph.package))
        {
            if existing.version > paragraph.version {
                return Ok(());
            }
            let old_id = existing.pkg_id.clone();
            let old_source = existing.source.clone();
            suite.remove_binary(&old_id);
            if let Some(old_src) = suite.sources.get_mut(&old_source) {
                old_src.binaries.remove(&old_id);
            }
        }

        let raw_arch = Architecture::try_from(paragraph.architecture.as_str())
            .map_err(|_| anyhow!("{} has invalid architecture", pkg_id))?;
        if !raw_arch.is_all() && raw_arch != arch {
            bail!(
                "{} has wrong architecture ({}) - should be either {} or all",
                pkg_id,
                raw_arch,
                arch
            );
        }

        // britney is not interested in the finer semantic differences, so
        // Pre-Depends folds into Depends and Breaks into Conflicts
        let depends_raw = merge_fields(
            paragraph.pre_depends.as_deref(),
            paragraph.depends.as_deref(),
        );
        let conflicts_raw = merge_fields(
            paragraph.conflicts.as_deref(),
            paragraph.breaks.as_deref(),
        );
        let depends = match &depends_raw {
            Some(raw) => parse_relations(raw)
                .with_context(|| format!("malformed Depends of {}", pkg_id))?,
            None => vec![],
        };
        let conflicts = match &conflicts_raw {
            Some(raw) => parse_relations(raw)
                .with_context(|| format!("malformed Conflicts of {}", pkg_id))?,
            None => vec![],
        };

        let (source, source_version) = match &paragraph.source {
            Some(raw) => {
                let name = raw.split_whitespace().next().unwrap_or(raw).to_owned();
                let version = match (raw.find('('), raw.find(')')) {
                    (Some(open), Some(close)) if open < close => {
                        PackageVersion::try_from(raw[open + 1..close].trim())
                            .map_err(|_| anyhow!("invalid source version of {}", pkg_id))?
                    }
                    _ => paragraph.version.clone(),
                };
                (name, version)
            }
            None => (paragraph.package.clone(), paragraph.version.clone()),
        };

        let provides = match &paragraph.provides {
            Some(raw) => parse_provides_field(raw, &pkg_id),
            None => vec![],
        };
        let built_using = match &paragraph.built_using {
            Some(raw) => parse_builtusing_field(raw, &pkg_id),
            None => vec![],
        };

        let pkg = BinaryPackage {
            version: paragraph.version,
            section: paragraph.section.clone(),
            source: source.clone(),
            source_version: source_version.clone(),
            architecture: raw_arch,
            multi_arch: paragraph.multi_arch.unwrap_or_default(),
            depends,
            conflicts,
            provides,
            is_essential: paragraph.essential.as_deref() == Some("yes"),
            pkg_id: pkg_id.clone(),
            built_using,
        };

        // register the binary with its source, synthesising a record when
        // the archive does not ship the source (anymore)
        match suite.sources.get_mut(&source) {
            Some(src) => {
                src.binaries.insert(pkg_id.clone());
            }
            None => {
                suite.sources.insert(
                    source.clone(),
                    SourcePackage {
                        source: source.clone(),
                        version: source_version,
                        section: "faux".to_owned(),
                        binaries: [pkg_id.clone()].into_iter().collect(),
                        maintainer: None,
                        is_fakesrc: true,
                        build_deps_arch: None,
                        build_deps_indep: None,
                        testsuite: vec![],
                        testsuite_triggers: vec![],
                    },
                );
            }
        }

        match all_binaries.get(&pkg_id) {
            Some(known) => {
                if known.version != pkg.version
                    || known.source != pkg.source
                    || known.source_version != pkg.source_version
                    || known.architecture != pkg.architecture
                {
                    bail!("inconsistent duplicate data for {}", pkg_id);
                }
            }
            None => {
                all_binaries.insert(pkg_id, pkg.clone());
            }
        }

        suite.insert_binary(pkg);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FauxParagraph {
    package: String,
    version: Option<PackageVersion>,
    provides: Option<String>,
    architecture: Option<String>,
    component: Option<String>,
    #[serde(rename = "Multi-Arch")]
    multi_arch: Option<MultiArch>,
}

/// Load faux packages into the target and primary source suite.
///
/// Faux packages satisfy dependencies on packages that are not shipped on
/// this mirror (e.g. vendor provided setup packages).
pub fn load_faux_packages(
    path: &Path,
    config: &Config,
    suites: &mut Suites,
    all_binaries: &mut AllBinaries,
) -> Result<()> {
    let paragraphs: Vec<FauxParagraph> = read_paragraphs(path)?;
    for (number, paragraph) in paragraphs.into_iter().enumerate() {
        let version = paragraph
            .version
            .unwrap_or_else(|| PackageVersion::try_from("1.0-1").unwrap());
        let component = paragraph.component.as_deref().unwrap_or("non-free");
        let faux_section = if component == "main" {
            "faux".to_owned()
        } else {
            format!("{}/faux", component)
        };
        let archs: Vec<Architecture> = match &paragraph.architecture {
            Some(raw) => raw
                .split_whitespace()
                .map(|arch| {
                    Architecture::try_from(arch).map_err(|_| {
                        anyhow!(
                            "invalid architecture in paragraph {} of {}",
                            number + 1,
                            path.display()
                        )
                    })
                })
                .collect::<Result<_>>()?,
            None => config.architectures.clone(),
        };

        let src_data = SourcePackage {
            source: paragraph.package.clone(),
            version: version.clone(),
            section: faux_section.clone(),
            binaries: Default::default(),
            maintainer: None,
            is_fakesrc: true,
            build_deps_arch: None,
            build_deps_indep: None,
            testsuite: vec![],
            testsuite_triggers: vec![],
        };
        suites
            .target
            .sources
            .insert(paragraph.package.clone(), src_data.clone());
        suites.sources[0]
            .sources
            .insert(paragraph.package.clone(), src_data);

        for arch in archs {
            let pkg_id = PackageId::binary(&paragraph.package, version.clone(), arch);
            let provides = match &paragraph.provides {
                Some(raw) => parse_provides_field(raw, &pkg_id),
                None => vec![],
            };
            let pkg = BinaryPackage {
                version: version.clone(),
                section: Some(faux_section.clone()),
                source: paragraph.package.clone(),
                source_version: version.clone(),
                architecture: arch,
                multi_arch: paragraph.multi_arch.unwrap_or_default(),
                depends: vec![],
                conflicts: vec![],
                provides,
                is_essential: false,
                pkg_id: pkg_id.clone(),
                built_using: vec![],
            };

            for suite in [&mut suites.target, &mut suites.sources[0]] {
                suite
                    .sources
                    .get_mut(&paragraph.package)
                    .expect("faux source was just inserted")
                    .binaries
                    .insert(pkg_id.clone());
                suite.insert_binary(pkg.clone());
            }
            all_binaries.insert(pkg_id, pkg);
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConstraintParagraph {
    #[serde(rename = "Fake-Package-Name")]
    fake_package_name: String,
    constraint: String,
    #[serde(rename = "Package-List")]
    package_list: String,
}

/// Load the constraints file, installing one faux package per constraint.
pub fn load_constraints(
    path: &Path,
    config: &Config,
    suites: &mut Suites,
    all_binaries: &mut AllBinaries,
) -> Result<Constraints> {
    let faux_version = PackageVersion::try_from("1").unwrap();
    let mut constraints = Constraints::default();

    let paragraphs: Vec<ConstraintParagraph> = read_paragraphs(path)?;
    for paragraph in paragraphs {
        if paragraph.constraint != "present-and-installable" {
            bail!(
                "unsupported constraint {} for {} (file {})",
                paragraph.constraint,
                paragraph.fake_package_name,
                path.display()
            );
        }
        info!(" - constraint {}", paragraph.fake_package_name);

        let pkg_list: Vec<String> = paragraph
            .package_list
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_owned)
            .collect();

        let src_data = SourcePackage {
            source: paragraph.fake_package_name.clone(),
            version: faux_version.clone(),
            section: "faux".to_owned(),
            binaries: Default::default(),
            maintainer: None,
            is_fakesrc: true,
            build_deps_arch: None,
            build_deps_indep: None,
            testsuite: vec![],
            testsuite_triggers: vec![],
        };
        suites
            .target
            .sources
            .insert(paragraph.fake_package_name.clone(), src_data.clone());
        suites.sources[0]
            .sources
            .insert(paragraph.fake_package_name.clone(), src_data);
        constraints
            .keep_installable
            .push(paragraph.fake_package_name.clone());

        for &arch in &config.architectures {
            let mut deps: Vec<String> = vec![];
            for pkg_spec in &pkg_list {
                match pkg_spec.split_once(char::is_whitespace) {
                    None => deps.push(pkg_spec.clone()),
                    Some((pkg, arch_restriction)) => {
                        let arch_restriction = arch_restriction.trim();
                        if !(arch_restriction.starts_with('[') && arch_restriction.ends_with(']'))
                        {
                            bail!(
                                "invalid arch-restriction on {} - should be [arch1 arch2] (for {} file {})",
                                pkg,
                                paragraph.fake_package_name,
                                path.display()
                            );
                        }
                        for restriction in arch_restriction[1..arch_restriction.len() - 1]
                            .split_whitespace()
                        {
                            if restriction.contains(',') || restriction.contains('!') {
                                bail!(
                                    "invalid arch-restriction for {}: uses comma or negation (for {} file {})",
                                    pkg,
                                    paragraph.fake_package_name,
                                    path.display()
                                );
                            }
                            if restriction == arch.as_str() {
                                deps.push(pkg.to_owned());
                            }
                        }
                    }
                }
            }

            let pkg_id =
                PackageId::binary(&paragraph.fake_package_name, faux_version.clone(), arch);
            let depends = parse_relations(&deps.join(", ")).with_context(|| {
                format!("invalid package list for {}", paragraph.fake_package_name)
            })?;
            let pkg = BinaryPackage {
                version: faux_version.clone(),
                section: Some("faux".to_owned()),
                source: paragraph.fake_package_name.clone(),
                source_version: faux_version.clone(),
                architecture: arch,
                multi_arch: MultiArch::No,
                depends,
                conflicts: vec![],
                provides: vec![],
                is_essential: false,
                pkg_id: pkg_id.clone(),
                built_using: vec![],
            };

            for suite in [&mut suites.target, &mut suites.sources[0]] {
                suite
                    .sources
                    .get_mut(&paragraph.fake_package_name)
                    .expect("constraint source was just inserted")
                    .binaries
                    .insert(pkg_id.clone());
                suite.insert_binary(pkg.clone());
            }
            all_binaries.insert(pkg_id, pkg);
        }
    }

    Ok(constraints)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn base_config(root: &Path) -> Config {
        Config {
            testing: root.join("testing"),
            unstable: root.join("unstable"),
            architectures: vec![Architecture::Amd64],
            default_urgency: "low".to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn loads_flat_mirror_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            &root.join("testing/Sources"),
            "Package: green\nVersion: 1\nSection: libs\nMaintainer: Jane <jane@example.org>\n\n",
        );
        write(
            &root.join("testing/Packages_amd64"),
            "Package: green\nVersion: 1\nArchitecture: amd64\nSection: libs\n\n\
             Package: libgreen1\nVersion: 1\nSource: green (1)\nArchitecture: amd64\nSection: libs\nDepends: libc6\n\n",
        );
        write(
            &root.join("unstable/Sources"),
            "Package: green\nVersion: 2\nSection: libs\nMaintainer: Jane <jane@example.org>\n\n",
        );
        write(
            &root.join("unstable/Packages_amd64"),
            "Package: green\nVersion: 2\nArchitecture: amd64\nSection: libs\n\n",
        );

        let mut config = base_config(root);
        let (suites, all_binaries) = SuiteContentLoader::load(&mut config).unwrap();

        assert_eq!(suites.target.sources["green"].version.to_string(), "1");
        assert_eq!(
            suites.primary_source_suite().sources["green"]
                .version
                .to_string(),
            "2"
        );
        let libgreen = &suites.target.binaries[&Architecture::Amd64]["libgreen1"];
        assert_eq!(libgreen.source, "green");
        assert_eq!(libgreen.depends.len(), 1);
        assert_eq!(all_binaries.len(), 3);
    }

    #[test]
    fn sources_keep_highest_version_and_skip_eso() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            &root.join("testing/Sources"),
            "Package: green\nVersion: 2\n\nPackage: green\nVersion: 1\n\n\
             Package: hidden\nVersion: 1\nExtra-Source-Only: yes\n\n",
        );
        write(&root.join("testing/Packages_amd64"), "");
        write(&root.join("unstable/Sources"), "");
        write(&root.join("unstable/Packages_amd64"), "");

        let mut config = base_config(root);
        let (suites, _) = SuiteContentLoader::load(&mut config).unwrap();
        assert_eq!(suites.target.sources["green"].version.to_string(), "2");
        assert!(!suites.target.sources.contains_key("hidden"));
    }

    #[test]
    fn unknown_source_creates_faux_record() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("testing/Sources"), "");
        write(
            &root.join("testing/Packages_amd64"),
            "Package: orphan\nVersion: 1\nSource: vanished (1)\nArchitecture: amd64\nSection: misc\n\n",
        );
        write(&root.join("unstable/Sources"), "");
        write(&root.join("unstable/Packages_amd64"), "");

        let mut config = base_config(root);
        let (suites, _) = SuiteContentLoader::load(&mut config).unwrap();
        let faux = &suites.target.sources["vanished"];
        assert!(faux.is_fakesrc);
        assert_eq!(faux.binaries.len(), 1);
    }

    #[test]
    fn missing_index_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("testing/Sources"), "");
        // no Packages_amd64 anywhere
        let mut config = base_config(root);
        assert!(SuiteContentLoader::load(&mut config).is_err());
    }
}
