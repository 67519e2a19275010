// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration file handling.
//!
//! The configuration file consists of `KEY = VALUE` lines with `#` comments.
//! Keys are case-insensitive; `%(SERIES)` in values is substituted with the
//! series name. Unknown keys are preserved but unused.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use debian_archive_utils::architectures::Architecture;
use log::warn;

/// Typed view of the britney configuration file.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Path of the target suite (usually "testing")
    pub testing: PathBuf,
    /// Path of the primary source suite (usually "unstable")
    pub unstable: PathBuf,
    /// Path of the testing-proposed-updates suite, if used
    pub tpu: Option<PathBuf>,
    /// Path of the proposed-updates suite, if used
    pub pu: Option<PathBuf>,
    /// Directory with state files maintained across runs
    pub state_dir: Option<PathBuf>,
    /// Directory with static input (faux packages, constraints)
    pub static_input_dir: Option<PathBuf>,
    /// Directory with per-user hint files
    pub hintsdir: Option<PathBuf>,
    /// Path of the nuninst cache file
    pub noninst_status: Option<PathBuf>,
    /// Path of the legacy HTML excuses output
    pub excuses_output: Option<PathBuf>,
    /// Path of the YAML excuses output
    pub excuses_yaml_output: Option<PathBuf>,
    /// Path of the human readable upgrade output
    pub upgrade_output: Option<PathBuf>,
    /// Path of the HeidiResult output
    pub heidi_output: Option<PathBuf>,
    /// Path of the HeidiDelta output
    pub heidi_delta_output: Option<PathBuf>,

    /// Architectures of the target suite
    pub architectures: Vec<Architecture>,
    /// Architectures where arch:all packages must stay installable
    pub nobreakall_arches: Vec<Architecture>,
    /// Architectures that are not blocking when out of date
    pub outofsync_arches: Vec<Architecture>,
    /// Architectures where uninstallability regressions are tolerated
    pub break_arches: Vec<Architecture>,
    /// Architectures that were recently added
    pub new_arches: Vec<Architecture>,

    /// Minimum age in days per urgency
    pub mindays: HashMap<String, u32>,
    /// Urgency assumed for unknown or missing urgencies
    pub default_urgency: String,
    /// Raw hint permissions per user (may contain the ALL/STANDARD/HELPERS macros)
    pub hints: HashMap<String, Vec<String>>,
    /// Sections eligible for smooth updates, or ALL
    pub smooth_updates: Vec<String>,
    /// Whether to ignore cruft when deciding migrations
    pub ignore_cruft: bool,
    /// Aggressiveness of the suite consistency checks (0-3)
    pub check_consistency_level: u8,
    /// Whether obsolete sources are removed at the end of a run
    pub remove_obsolete: bool,
    /// Whether the auto hinter runs
    pub auto_hinter: bool,

    /// Components listed in the target Release file
    pub components: Vec<String>,
    /// The series name used for substitutions
    pub series: String,
    /// Unrecognised keys, preserved verbatim
    pub extra: BTreeMap<String, String>,
}

fn parse_arch_list(value: &str, key: &str) -> Result<Vec<Architecture>> {
    value
        .split_whitespace()
        .map(|tok| {
            Architecture::try_from(tok)
                .with_context(|| format!("invalid architecture '{}' in {}", tok, key))
        })
        .collect()
}

fn parse_bool(value: &str) -> bool {
    !matches!(value, "" | "0" | "no" | "No" | "NO" | "false")
}

impl Config {
    /// Read the configuration from `path`, substituting `series`.
    pub fn load(path: &Path, series: &str) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("unable to read the configuration file {}", path.display()))?;

        let mut config = Config {
            default_urgency: "low".to_owned(),
            check_consistency_level: 2,
            remove_obsolete: true,
            auto_hinter: true,
            series: series.to_owned(),
            ..Default::default()
        };
        let mut seen_testing = false;
        let mut seen_unstable = false;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().to_uppercase();
            let value = value.trim().replace("%(SERIES)", series);

            if let Some(urgency) = key.strip_prefix("MINDAYS_") {
                let days = value
                    .parse::<u32>()
                    .with_context(|| format!("invalid day count for {}", key))?;
                config.mindays.insert(urgency.to_lowercase(), days);
                continue;
            }
            if let Some(user) = key.strip_prefix("HINTS_") {
                config.hints.insert(
                    user.to_lowercase(),
                    value.split_whitespace().map(str::to_owned).collect(),
                );
                continue;
            }

            match key.as_str() {
                "TESTING" => {
                    config.testing = PathBuf::from(&value);
                    seen_testing = true;
                }
                "UNSTABLE" => {
                    config.unstable = PathBuf::from(&value);
                    seen_unstable = true;
                }
                "TPU" => config.tpu = Some(PathBuf::from(&value)),
                "PU" => config.pu = Some(PathBuf::from(&value)),
                "STATE_DIR" => config.state_dir = Some(PathBuf::from(&value)),
                "STATIC_INPUT_DIR" => config.static_input_dir = Some(PathBuf::from(&value)),
                "HINTSDIR" => config.hintsdir = Some(PathBuf::from(&value)),
                "NONINST_STATUS" => config.noninst_status = Some(PathBuf::from(&value)),
                "EXCUSES_OUTPUT" => config.excuses_output = Some(PathBuf::from(&value)),
                "EXCUSES_YAML_OUTPUT" => config.excuses_yaml_output = Some(PathBuf::from(&value)),
                "UPGRADE_OUTPUT" => config.upgrade_output = Some(PathBuf::from(&value)),
                "HEIDI_OUTPUT" => config.heidi_output = Some(PathBuf::from(&value)),
                "HEIDI_DELTA_OUTPUT" => config.heidi_delta_output = Some(PathBuf::from(&value)),
                "ARCHITECTURES" => config.architectures = parse_arch_list(&value, &key)?,
                "NOBREAKALL_ARCHES" => config.nobreakall_arches = parse_arch_list(&value, &key)?,
                "OUTOFSYNC_ARCHES" => config.outofsync_arches = parse_arch_list(&value, &key)?,
                "BREAK_ARCHES" => config.break_arches = parse_arch_list(&value, &key)?,
                "NEW_ARCHES" => config.new_arches = parse_arch_list(&value, &key)?,
                "DEFAULT_URGENCY" => config.default_urgency = value,
                "SMOOTH_UPDATES" => {
                    config.smooth_updates = value.split_whitespace().map(str::to_owned).collect();
                }
                "IGNORE_CRUFT" => config.ignore_cruft = parse_bool(&value),
                "CHECK_CONSISTENCY_LEVEL" => {
                    config.check_consistency_level = value
                        .parse::<u8>()
                        .with_context(|| "invalid CHECK_CONSISTENCY_LEVEL")?;
                }
                "REMOVE_OBSOLETE" => config.remove_obsolete = value == "yes",
                "AUTO_HINTER" => config.auto_hinter = value == "yes",
                "COMPONENTS" => {
                    bail!("the COMPONENTS configuration has been removed; britney reads the value from the Release file")
                }
                _ => {
                    config.extra.insert(key, value);
                }
            }
        }

        if !seen_testing || !seen_unstable {
            bail!(
                "configuration {} does not define both TESTING and UNSTABLE",
                path.display()
            );
        }
        if config.mindays.is_empty() {
            warn!("no MINDAYS_* settings found; the age policy will not delay anything");
        }
        if !config.mindays.contains_key(&config.default_urgency) {
            config.mindays.insert(config.default_urgency.clone(), 0);
        }
        if config.heidi_delta_output.is_none() {
            if let Some(heidi) = &config.heidi_output {
                let mut delta = heidi.as_os_str().to_owned();
                delta.push("Delta");
                config.heidi_delta_output = Some(PathBuf::from(delta));
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_basic_config() {
        let file = write_config(
            "# comment\n\
             TESTING = /data/%(SERIES)\n\
             UNSTABLE = /data/%(SERIES)-proposed\n\
             ARCHITECTURES = amd64 i386\n\
             NOBREAKALL_ARCHES = amd64\n\
             MINDAYS_LOW = 10\n\
             MINDAYS_HIGH = 2\n\
             DEFAULT_URGENCY = low\n\
             HINTS_FREEZE = block block-all unblock\n\
             SMOOTH_UPDATES = libs oldlibs\n\
             IGNORE_CRUFT = 1\n",
        );
        let config = Config::load(file.path(), "trixie").unwrap();
        assert_eq!(config.testing, PathBuf::from("/data/trixie"));
        assert_eq!(config.unstable, PathBuf::from("/data/trixie-proposed"));
        assert_eq!(
            config.architectures,
            vec![Architecture::Amd64, Architecture::I386]
        );
        assert_eq!(config.mindays.get("low"), Some(&10));
        assert_eq!(config.mindays.get("high"), Some(&2));
        assert_eq!(config.hints.get("freeze").unwrap().len(), 3);
        assert_eq!(config.smooth_updates, vec!["libs", "oldlibs"]);
        assert!(config.ignore_cruft);
        assert_eq!(config.check_consistency_level, 2);
    }

    #[test]
    fn missing_required_keys() {
        let file = write_config("TESTING = /data/testing\n");
        assert!(Config::load(file.path(), "").is_err());
    }

    #[test]
    fn heidi_delta_defaults_to_heidi_output() {
        let file = write_config(
            "TESTING = /t\nUNSTABLE = /u\nARCHITECTURES = amd64\nHEIDI_OUTPUT = /out/HeidiResult\n",
        );
        let config = Config::load(file.path(), "").unwrap();
        assert_eq!(
            config.heidi_delta_output,
            Some(PathBuf::from("/out/HeidiResultDelta"))
        );
    }

    #[test]
    fn unknown_keys_are_preserved() {
        let file = write_config("TESTING = /t\nUNSTABLE = /u\nADT_ENABLE = yes\n");
        let config = Config::load(file.path(), "").unwrap();
        assert_eq!(
            config.extra.get("ADT_ENABLE").map(String::as_str),
            Some("yes")
        );
    }
}
