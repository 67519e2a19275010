// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! Piuparts status policy.
//!
//! Reads the externally maintained piuparts summary files and rejects
//! regressions: a package that passed piuparts in the target suite but fails
//! in the source suite may not migrate.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Result};
use log::info;
use serde_yaml::{Mapping, Value};

use crate::excuse::Excuse;
use crate::hints::{HintParser, HintStyle};
use crate::migrationitem::MigrationItem;
use crate::policies::{Policy, PolicyContext, PolicyVerdict};
use crate::suites::SourcePackage;

/// State and result URL of one source package.
type Summary = HashMap<String, (char, Option<String>)>;

/// The piuparts policy.
#[derive(Debug, Default)]
pub struct PiupartsPolicy {
    summary_testing: Summary,
    summary_unstable: Summary,
}

fn read_summary(path: &Path, keep_url: bool) -> Result<Summary> {
    let mut summary = Summary::new();
    let Ok(content) = fs::read_to_string(path) else {
        info!("{} missing; skipping piuparts processing", path.display());
        return Ok(summary);
    };
    if content.trim().is_empty() {
        return Ok(summary);
    }
    info!("Loading piuparts report from {}", path.display());

    let data: serde_json::Value = serde_json::from_str(&content)?;
    if data.get("_id").and_then(|v| v.as_str()) != Some("Piuparts Package Test Results Summary")
        || data.get("_version").and_then(|v| v.as_str()) != Some("1.0")
    {
        bail!(
            "Piuparts results in {} do not have the expected id or version",
            path.display()
        );
    }
    let Some(packages) = data.get("packages").and_then(|v| v.as_object()) else {
        return Ok(summary);
    };
    for (source, suite_data) in packages {
        let Some(object) = suite_data.as_object() else {
            continue;
        };
        if object.len() != 1 {
            bail!(
                "Piuparts results in {}: source {} does not have exactly one result set",
                path.display(),
                source
            );
        }
        let Some(result) = object.values().next().and_then(|v| v.as_array()) else {
            continue;
        };
        let state = result
            .first()
            .and_then(|v| v.as_str())
            .and_then(|s| s.chars().next())
            .unwrap_or('X');
        let url = if keep_url {
            result.get(2).and_then(|v| v.as_str()).map(str::to_owned)
        } else {
            None
        };
        summary.insert(source.clone(), (state, url));
    }
    Ok(summary)
}

impl PiupartsPolicy {
    /// Create the policy.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Policy for PiupartsPolicy {
    fn policy_id(&self) -> &'static str {
        "piuparts"
    }

    fn register_hints(&self, parser: &mut HintParser) {
        parser.register_hint_type("ignore-piuparts", 1, HintStyle::OneHintPerTarget, &[]);
    }

    fn initialise(&mut self, ctx: &PolicyContext) -> Result<()> {
        let Some(state_dir) = &ctx.config.state_dir else {
            info!("STATE_DIR not set; skipping piuparts processing");
            return Ok(());
        };
        self.summary_testing =
            read_summary(&state_dir.join("piuparts-summary-testing.json"), false)?;
        self.summary_unstable =
            read_summary(&state_dir.join("piuparts-summary-unstable.json"), true)?;
        Ok(())
    }

    fn apply_src(
        &mut self,
        ctx: &PolicyContext,
        info: &mut Mapping,
        _item: &MigrationItem,
        _source_t: Option<&SourcePackage>,
        source_u: &SourcePackage,
        excuse: &mut Excuse,
    ) -> PolicyVerdict {
        let source_name = &source_u.source;
        let testing_state = self
            .summary_testing
            .get(source_name)
            .map(|(state, _)| *state)
            .unwrap_or('X');
        let (unstable_state, url) = self
            .summary_unstable
            .get(source_name)
            .cloned()
            .unwrap_or(('X', None));

        let (test_results, message, mut result) = match unstable_state {
            'P' => ("pass", "Piuparts tested OK".to_owned(), PolicyVerdict::Pass),
            'F' => {
                if testing_state != unstable_state {
                    (
                        "regression",
                        "Rejected due to piuparts regression".to_owned(),
                        PolicyVerdict::RejectedPermanently,
                    )
                } else {
                    (
                        "failed",
                        "Ignoring piuparts failure (Not a regression)".to_owned(),
                        PolicyVerdict::Pass,
                    )
                }
            }
            'W' => (
                "waiting-for-test-results",
                "Waiting for piuparts test results (stalls testing migration)".to_owned(),
                PolicyVerdict::RejectedTemporarily,
            ),
            _ => (
                "cannot-be-tested",
                "Cannot be tested by piuparts (not a blocker)".to_owned(),
                PolicyVerdict::Pass,
            ),
        };

        info.insert(
            Value::String("test-results".to_owned()),
            Value::String(test_results.to_owned()),
        );
        if let Some(url) = &url {
            info.insert(
                Value::String("piuparts-test-url".to_owned()),
                Value::String(url.clone()),
            );
        }
        match &url {
            Some(url) => excuse.addinfo(format!("{} - {}", message, url)),
            None => excuse.addinfo(message),
        }

        if result.is_rejected() {
            if let Some(hint) = ctx
                .hints
                .search(
                    "ignore-piuparts",
                    Some(source_name),
                    Some(&source_u.version),
                    None,
                    None,
                )
                .first()
            {
                let mut ignored = Mapping::new();
                ignored.insert(
                    Value::String("issued-by".to_owned()),
                    Value::String(hint.user.clone()),
                );
                info.insert(
                    Value::String("ignored-piuparts".to_owned()),
                    Value::Mapping(ignored),
                );
                excuse.addinfo(format!("Ignoring piuparts issue as requested by {}", hint.user));
                result = PolicyVerdict::PassHinted;
            }
        }

        result
    }
}
