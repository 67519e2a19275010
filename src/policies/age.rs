// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! Configurable aging policy.
//!
//! Packages stay in the source suite for a per-urgency minimum number of
//! days before they may migrate. Urgencies are sticky: the most urgent
//! urgency seen for a newer-than-target version wins. The `urgent` and
//! `age-days` hints override the requirement; bounties and penalties from
//! other policies adjust it.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use debian_archive_utils::version::PackageVersion;
use log::info;
use serde_yaml::{Mapping, Value};

use crate::config::Config;
use crate::excuse::Excuse;
use crate::hints::{HintParser, HintStyle};
use crate::migrationitem::MigrationItem;
use crate::policies::{Policy, PolicyContext, PolicyVerdict};
use crate::suites::SourcePackage;

const SECONDS_PER_DAY: f64 = 86400.0;

/// The aging policy.
#[derive(Debug)]
pub struct AgePolicy {
    min_days: HashMap<String, u32>,
    default_urgency: String,
    min_days_default: u32,
    date_now: i64,
    dates: BTreeMap<String, (PackageVersion, i64)>,
    urgencies: HashMap<String, String>,
}

impl AgePolicy {
    /// Create the policy from the configured minimum days.
    pub fn new(config: &Config) -> Self {
        let min_days_default = config
            .mindays
            .get(&config.default_urgency)
            .copied()
            .unwrap_or(0);
        Self {
            min_days: config.mindays.clone(),
            default_urgency: config.default_urgency.clone(),
            min_days_default,
            date_now: Utc::now().timestamp(),
            dates: BTreeMap::new(),
            urgencies: HashMap::new(),
        }
    }

    fn dates_file(&self, ctx: &PolicyContext) -> PathBuf {
        match &ctx.config.state_dir {
            Some(state_dir) => {
                let preferred = state_dir.join("age-policy-dates");
                let fallback = ctx.config.testing.join("Dates");
                if !preferred.exists() && fallback.exists() {
                    fallback
                } else {
                    preferred
                }
            }
            None => ctx.config.testing.join("Dates"),
        }
    }

    fn urgencies_file(&self, ctx: &PolicyContext) -> PathBuf {
        match &ctx.config.state_dir {
            Some(state_dir) => {
                let preferred = state_dir.join("age-policy-urgencies");
                let fallback = ctx.config.testing.join("Urgency");
                if !preferred.exists() && fallback.exists() {
                    fallback
                } else {
                    preferred
                }
            }
            None => ctx.config.testing.join("Urgency"),
        }
    }

    fn read_dates(&mut self, ctx: &PolicyContext) {
        let path = self.dates_file(ctx);
        let Ok(content) = fs::read_to_string(&path) else {
            info!(
                "{} does not appear to exist; starting with an empty dates file",
                path.display()
            );
            return;
        };
        for line in content.lines() {
            // <source> <version> <date>
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [source, version, date] = fields.as_slice() else {
                continue;
            };
            let (Ok(version), Ok(date)) =
                (PackageVersion::try_from(*version), date.parse::<i64>())
            else {
                continue;
            };
            self.dates.insert((*source).to_owned(), (version, date));
        }
    }

    fn read_urgencies(&mut self, ctx: &PolicyContext) {
        let path = self.urgencies_file(ctx);
        let Ok(content) = fs::read_to_string(&path) else {
            info!("{} missing; using default urgency for all packages", path.display());
            return;
        };
        let sources_t = &ctx.suites.target.sources;
        let sources_u = &ctx.suites.primary_source_suite().sources;
        for line in content.lines() {
            // <source> <version> <urgency>
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [source, version, urgency] = fields.as_slice() else {
                continue;
            };
            let Ok(version) = PackageVersion::try_from(*version) else {
                continue;
            };

            let mindays_old = self
                .urgencies
                .get(*source)
                .and_then(|old| self.min_days.get(old))
                .copied()
                .unwrap_or(1000);
            let mindays_new = self
                .min_days
                .get(*urgency)
                .copied()
                .unwrap_or(self.min_days_default);
            // urgencies are sticky; a less urgent upload changes nothing
            if mindays_old <= mindays_new {
                continue;
            }
            // the urgency only counts for versions newer than the target
            // and not newer than the source suite
            if sources_t
                .get(*source)
                .is_some_and(|src| src.version >= version)
            {
                continue;
            }
            if !sources_u.get(*source).is_some_and(|src| src.version >= version) {
                continue;
            }

            self.urgencies
                .insert((*source).to_owned(), (*urgency).to_owned());
        }
    }
}

impl Policy for AgePolicy {
    fn policy_id(&self) -> &'static str {
        "age"
    }

    fn register_hints(&self, parser: &mut HintParser) {
        parser.register_hint_type("age-days", 2, HintStyle::DaysThenTargets, &[]);
        parser.register_hint_type("urgent", 1, HintStyle::OneHintPerTarget, &[]);
    }

    fn initialise(&mut self, ctx: &PolicyContext) -> Result<()> {
        self.read_dates(ctx);
        self.read_urgencies(ctx);
        Ok(())
    }

    fn apply_src(
        &mut self,
        ctx: &PolicyContext,
        info: &mut Mapping,
        _item: &MigrationItem,
        source_t: Option<&SourcePackage>,
        source_u: &SourcePackage,
        excuse: &mut Excuse,
    ) -> PolicyVerdict {
        let source_name = &source_u.source;
        let mut urgency = self
            .urgencies
            .get(source_name)
            .cloned()
            .unwrap_or_else(|| self.default_urgency.clone());

        if !self.min_days.contains_key(&urgency) {
            info.insert(
                Value::String("unknown-urgency".to_owned()),
                Value::String(urgency.clone()),
            );
            urgency = self.default_urgency.clone();
        }

        if source_t.is_none() && self.min_days[&urgency] < self.min_days_default {
            // NEW packages do not benefit from high urgencies
            let mut reduced = Mapping::new();
            reduced.insert(
                Value::String("from".to_owned()),
                Value::String(urgency.clone()),
            );
            reduced.insert(
                Value::String("to".to_owned()),
                Value::String(self.default_urgency.clone()),
            );
            info.insert(Value::String("urgency-reduced".to_owned()), Value::Mapping(reduced));
            urgency = self.default_urgency.clone();
        }

        let entry = self.dates.get(source_name);
        if entry.is_none_or(|(version, _)| *version != source_u.version) {
            self.dates.insert(
                source_name.clone(),
                (source_u.version.clone(), self.date_now),
            );
        }

        let days_old =
            (self.date_now - self.dates[source_name].1) as f64 / SECONDS_PER_DAY;
        let mut min_days = self.min_days[&urgency];
        info.insert(
            Value::String("age-requirement".to_owned()),
            Value::Number(min_days.into()),
        );
        info.insert(
            Value::String("current-age".to_owned()),
            Value::Number(serde_yaml::Number::from(days_old)),
        );

        let mut reduced_by: Option<(u32, String)> = None;
        for hint in ctx.hints.search(
            "age-days",
            Some(source_name),
            Some(&source_u.version),
            None,
            None,
        ) {
            if let Some(days) = hint.days() {
                reduced_by = Some((days, hint.user.clone()));
                min_days = days;
            }
        }

        // bounties lower the requirement, penalties raise it
        let bounty: u32 = excuse.bounty.values().sum();
        let penalty: u32 = excuse.penalty.values().sum();
        if bounty > 0 || penalty > 0 {
            let adjusted = min_days.saturating_sub(bounty).saturating_add(penalty);
            info.insert(
                Value::String("age-requirement-adjusted".to_owned()),
                Value::Number(adjusted.into()),
            );
            min_days = adjusted;
        }

        let mut verdict = PolicyVerdict::Pass;
        if days_old < f64::from(min_days) {
            let urgent_hints = ctx.hints.search(
                "urgent",
                Some(source_name),
                Some(&source_u.version),
                None,
                None,
            );
            if let Some(hint) = urgent_hints.first() {
                reduced_by = Some((0, hint.user.clone()));
                verdict = PolicyVerdict::PassHinted;
            } else {
                verdict = PolicyVerdict::RejectedTemporarily;
            }
        }

        if let Some((new_requirement, changed_by)) = reduced_by {
            let mut reduced = Mapping::new();
            reduced.insert(
                Value::String("new-requirement".to_owned()),
                Value::Number(new_requirement.into()),
            );
            reduced.insert(
                Value::String("changed-by".to_owned()),
                Value::String(changed_by.clone()),
            );
            info.insert(
                Value::String("age-requirement-reduced".to_owned()),
                Value::Mapping(reduced),
            );
            if new_requirement > 0 {
                excuse.addinfo(format!(
                    "Overriding age needed from {} days to {} by {}",
                    self.min_days[&urgency], new_requirement, changed_by
                ));
            } else {
                excuse.addinfo(format!("Too young, but urgency pushed by {}", changed_by));
            }
        }
        excuse.setdaysold(days_old, min_days);

        verdict
    }

    fn save_state(&self, ctx: &PolicyContext) -> Result<()> {
        let directory = match &ctx.config.state_dir {
            Some(state_dir) => state_dir.clone(),
            None => ctx.config.testing.clone(),
        };
        let basename = if ctx.config.state_dir.is_some() {
            "age-policy-dates"
        } else {
            "Dates"
        };
        fs::create_dir_all(&directory)
            .with_context(|| format!("cannot create {}", directory.display()))?;
        let path = directory.join(basename);
        let tmp_path = directory.join(format!("{}_new", basename));

        let mut content = String::new();
        for (source, (version, date)) in &self.dates {
            content.push_str(&format!("{} {} {}\n", source, version, date));
        }
        fs::write(&tmp_path, content)
            .with_context(|| format!("cannot write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("cannot rename {} into place", tmp_path.display()))?;
        Ok(())
    }
}
