// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! Release critical bug regression policy.
//!
//! Blocks any source upload that would introduce a release critical bug that
//! the target suite does not already have. The bug lists are provided
//! externally, one file per suite.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use log::{info, warn};
use serde_yaml::{Mapping, Value};

use crate::excuse::Excuse;
use crate::hints::{HintParser, HintStyle};
use crate::migrationitem::MigrationItem;
use crate::policies::{Policy, PolicyContext, PolicyVerdict};
use crate::suites::SourcePackage;

/// The release critical bug policy.
#[derive(Debug, Default)]
pub struct RCBugPolicy {
    bugs_testing: HashMap<String, BTreeSet<String>>,
    bugs_unstable: HashMap<String, BTreeSet<String>>,
}

fn read_bugs(path: &PathBuf) -> HashMap<String, BTreeSet<String>> {
    let mut bugs: HashMap<String, BTreeSet<String>> = HashMap::new();
    let Ok(content) = fs::read_to_string(path) else {
        info!("{} missing; skipping bug-based processing", path.display());
        return bugs;
    };
    info!("Loading RC bugs data from {}", path.display());
    for line in content.lines() {
        // <package> <bug>[,<bug>...]
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [package, bug_list] = fields.as_slice() else {
            warn!("Malformed line found in {}: {:?}", path.display(), line);
            continue;
        };
        bugs.entry((*package).to_owned())
            .or_default()
            .extend(bug_list.split(',').map(str::to_owned));
    }
    bugs
}

impl RCBugPolicy {
    /// Create the policy.
    pub fn new() -> Self {
        Self::default()
    }

    fn bugs_for(
        bugs: &HashMap<String, BTreeSet<String>>,
        source: &SourcePackage,
    ) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        for key in [source.source.clone(), format!("src:{}", source.source)] {
            if let Some(entries) = bugs.get(&key) {
                found.extend(entries.iter().cloned());
            }
        }
        for pkg_id in &source.binaries {
            if let Some(entries) = bugs.get(&pkg_id.package_name) {
                found.extend(entries.iter().cloned());
            }
        }
        found
    }
}

impl Policy for RCBugPolicy {
    fn policy_id(&self) -> &'static str {
        "rc-bugs"
    }

    fn register_hints(&self, parser: &mut HintParser) {
        parser.register_hint_type("ignore-rc-bugs", 2, HintStyle::BugsThenTargets, &[]);
    }

    fn initialise(&mut self, ctx: &PolicyContext) -> Result<()> {
        let (testing, unstable) = match &ctx.config.state_dir {
            Some(state_dir) => {
                let testing = state_dir.join("rc-bugs-testing");
                let unstable = state_dir.join("rc-bugs-unstable");
                if !testing.exists()
                    && !unstable.exists()
                    && ctx.config.testing.join("BugsV").exists()
                    && ctx.config.unstable.join("BugsV").exists()
                {
                    (
                        ctx.config.testing.join("BugsV"),
                        ctx.config.unstable.join("BugsV"),
                    )
                } else {
                    (testing, unstable)
                }
            }
            None => (
                ctx.config.testing.join("BugsV"),
                ctx.config.unstable.join("BugsV"),
            ),
        };
        self.bugs_testing = read_bugs(&testing);
        self.bugs_unstable = read_bugs(&unstable);
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
        let mut bugs_u = Self::bugs_for(&self.bugs_unstable, source_u);
        let mut bugs_t = match source_t {
            // a package not in the target suite has no bugs there by definition
            Some(source_t) => Self::bugs_for(&self.bugs_testing, source_t),
            None => BTreeSet::new(),
        };

        let mut success_verdict = PolicyVerdict::Pass;
        for hint in ctx.hints.search(
            "ignore-rc-bugs",
            Some(source_name),
            Some(&source_u.version),
            None,
            None,
        ) {
            let Some(ignored_bugs) = hint.ignored_bugs() else {
                continue;
            };
            // only handle one hint
            if info.contains_key(&Value::String("ignored-bugs".to_owned())) {
                info!(
                    "Ignoring ignore-rc-bugs hint from {} on {} due to another hint",
                    hint.user, source_name
                );
                continue;
            }
            if ignored_bugs.iter().any(|bug| bugs_u.contains(bug)) {
                bugs_u.retain(|bug| !ignored_bugs.contains(bug));
                bugs_t.retain(|bug| !ignored_bugs.contains(bug));
                let mut ignored = Mapping::new();
                ignored.insert(
                    Value::String("bugs".to_owned()),
                    Value::Sequence(
                        ignored_bugs
                            .iter()
                            .map(|bug| Value::String(bug.clone()))
                            .collect(),
                    ),
                );
                ignored.insert(
                    Value::String("issued-by".to_owned()),
                    Value::String(hint.user.clone()),
                );
                info.insert(Value::String("ignored-bugs".to_owned()), Value::Mapping(ignored));
                success_verdict = PolicyVerdict::PassHinted;
            } else {
                info!(
                    "Ignoring ignore-rc-bugs hint from {} on {} as none of the bugs affect the package",
                    hint.user, source_name
                );
            }
        }

        let shared: Vec<String> = bugs_u.intersection(&bugs_t).cloned().collect();
        let unique_u: Vec<String> = bugs_u.difference(&bugs_t).cloned().collect();
        let unique_t: Vec<String> = bugs_t.difference(&bugs_u).cloned().collect();
        info.insert(
            Value::String("shared-bugs".to_owned()),
            Value::Sequence(shared.iter().cloned().map(Value::String).collect()),
        );
        info.insert(
            Value::String("unique-source-bugs".to_owned()),
            Value::Sequence(unique_u.iter().cloned().map(Value::String).collect()),
        );
        info.insert(
            Value::String("unique-target-bugs".to_owned()),
            Value::Sequence(unique_t.iter().cloned().map(Value::String).collect()),
        );

        excuse.setbugs(&unique_t, &unique_u);
        if !unique_u.is_empty() {
            excuse.add_verdict_info(
                PolicyVerdict::RejectedPermanently,
                format!(
                    "Updating {} introduces new bugs: {}",
                    source_name,
                    unique_u
                        .iter()
                        .map(|bug| format!("#{}", bug))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            );
        }
        if !unique_t.is_empty() {
            excuse.addinfo(format!(
                "Updating {} fixes old bugs: {}",
                source_name,
                unique_t
                    .iter()
                    .map(|bug| format!("#{}", bug))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        if !unique_u.is_empty() && unique_t.len() > unique_u.len() {
            excuse.addinfo(format!(
                "{} introduces new bugs, so still ignored (even though it fixes more than it introduces)",
                source_name
            ));
        }

        if unique_u.is_empty() {
            success_verdict
        } else {
            PolicyVerdict::RejectedPermanently
        }
    }
}
