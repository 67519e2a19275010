// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! Construction of small on-disk archives for end-to-end tests.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use britney::{Britney, Options};
use tempfile::TempDir;

/// Architectures with pre-created index files; the default configuration
/// only uses amd64, tests may override ARCHITECTURES via extra config.
pub const ARCHITECTURES: &[&str] = &["amd64", "i386"];

/// A temporary archive with a testing and an unstable suite.
pub struct TestArchive {
    pub dir: TempDir,
    added_sources: BTreeSet<(bool, String)>,
}

impl TestArchive {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("cannot create temporary archive");
        for suite in ["testing", "unstable"] {
            let suite_dir = dir.path().join(suite);
            fs::create_dir_all(&suite_dir).unwrap();
            fs::write(suite_dir.join("Sources"), "").unwrap();
            for arch in ARCHITECTURES {
                fs::write(suite_dir.join(format!("Packages_{}", arch)), "").unwrap();
            }
        }
        fs::create_dir_all(dir.path().join("unstable/Hints")).unwrap();
        fs::create_dir_all(dir.path().join("output")).unwrap();
        Self {
            dir,
            added_sources: BTreeSet::new(),
        }
    }

    fn suite_dir(&self, unstable: bool) -> PathBuf {
        self.dir
            .path()
            .join(if unstable { "unstable" } else { "testing" })
    }

    fn append(&self, path: &Path, paragraph: &str) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        writeln!(file, "{}", paragraph).unwrap();
    }

    /// Add a source package paragraph.
    pub fn add_src(&mut self, unstable: bool, name: &str, version: &str, section: &str) {
        if !self.added_sources.insert((unstable, name.to_owned())) {
            return;
        }
        let paragraph = format!(
            "Package: {}\nVersion: {}\nSection: {}\nMaintainer: Joe <joe@example.com>\n",
            name, version, section
        );
        self.append(&self.suite_dir(unstable).join("Sources"), &paragraph);
    }

    /// Add a binary package paragraph (and its source record).
    ///
    /// `fields` are extra `Field: value` pairs such as `("Depends", "libgreen1")`.
    pub fn add_bin(
        &mut self,
        unstable: bool,
        name: &str,
        version: &str,
        arch: &str,
        fields: &[(&str, &str)],
    ) {
        let mut paragraph = format!(
            "Package: {}\nVersion: {}\nArchitecture: {}\n",
            name, version, arch
        );
        let mut section = "devel";
        let mut source_field = None;
        for (field, value) in fields {
            match *field {
                "Section" => section = value,
                "Source" => source_field = Some(*value),
                _ => paragraph.push_str(&format!("{}: {}\n", field, value)),
            }
        }
        paragraph.push_str(&format!("Section: {}\n", section));
        if let Some(source) = source_field {
            paragraph.push_str(&format!("Source: {}\n", source));
        }

        let arches: Vec<&str> = if arch == "all" {
            ARCHITECTURES.to_vec()
        } else {
            vec![arch]
        };
        for target_arch in arches {
            self.append(
                &self
                    .suite_dir(unstable)
                    .join(format!("Packages_{}", target_arch)),
                &paragraph,
            );
        }

        let (src_name, src_version) = match source_field {
            Some(source) => {
                let name = source.split_whitespace().next().unwrap();
                let version = source
                    .find('(')
                    .map(|open| source[open + 1..source.find(')').unwrap()].trim())
                    .unwrap_or(version);
                (name, version)
            }
            None => (name, version),
        };
        self.add_src(unstable, src_name, src_version, section);
    }

    /// Write a hints file for the given user.
    pub fn write_hints(&self, user: &str, content: &str) {
        fs::write(
            self.dir.path().join("unstable/Hints").join(user),
            content,
        )
        .unwrap();
    }

    /// Write a state file below the suite directories (e.g. `BugsV`).
    pub fn write_suite_file(&self, unstable: bool, name: &str, content: &str) {
        fs::write(self.suite_dir(unstable).join(name), content).unwrap();
    }

    /// Write the britney configuration and return its path.
    pub fn write_config(&self, extra: &str) -> PathBuf {
        let root = self.dir.path();
        let config = format!(
            "TESTING = {}\n\
             UNSTABLE = {}\n\
             ARCHITECTURES = amd64\n\
             NOBREAKALL_ARCHES = amd64\n\
             MINDAYS_LOW = 0\n\
             MINDAYS_MEDIUM = 0\n\
             MINDAYS_HIGH = 0\n\
             DEFAULT_URGENCY = low\n\
             HEIDI_OUTPUT = {}\n\
             EXCUSES_YAML_OUTPUT = {}\n\
             UPGRADE_OUTPUT = {}\n\
             NONINST_STATUS = {}\n\
             {}\n",
            root.join("testing").display(),
            root.join("unstable").display(),
            root.join("output/HeidiResult").display(),
            root.join("output/excuses.yaml").display(),
            root.join("output/output.txt").display(),
            root.join("output/non-installable-status").display(),
            extra,
        );
        let path = root.join("britney.conf");
        fs::write(&path, config).unwrap();
        path
    }

    /// Run the full pipeline: setup, excuses, upgrade run, outputs.
    pub fn run(&self, extra_config: &str) -> Britney {
        let mut britney = self.setup(extra_config);
        britney.run().expect("migration run failed");
        britney
    }

    /// Load the world without running anything.
    pub fn setup(&self, extra_config: &str) -> Britney {
        let options = Options {
            config: self.write_config(extra_config),
            architectures: None,
            actions: None,
            hints: None,
            hint_tester: false,
            dry_run: false,
            nuninst_cache: false,
            print_uninst: false,
            compute_migrations: false,
            no_compute_migrations: false,
            series: String::new(),
            distribution: "Debian".to_owned(),
            verbose: Default::default(),
        };
        Britney::setup(options).expect("setup failed")
    }

    /// Read the upgrade output log written by the run.
    pub fn upgrade_output(&self) -> String {
        fs::read_to_string(self.dir.path().join("output/output.txt")).unwrap_or_default()
    }

    /// Read the HeidiResult written by the run.
    pub fn heidi_result(&self) -> String {
        fs::read_to_string(self.dir.path().join("output/HeidiResult")).unwrap_or_default()
    }

    /// Read the YAML excuses written by the run.
    pub fn excuses_yaml(&self) -> String {
        fs::read_to_string(self.dir.path().join("output/excuses.yaml")).unwrap_or_default()
    }
}
