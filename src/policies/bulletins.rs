// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! User supplied bulletin policies.
//!
//! Both policies read simple `<source> <bug> <date>` files maintained by
//! external scripts in the primary source suite directory: `Blocks` entries
//! prevent migration, `ExcuseBugs` entries merely link a bug report to the
//! excuse.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::Result;
use chrono::DateTime;
use log::{error, info, warn};
use serde_yaml::{Mapping, Value};

use crate::excuse::Excuse;
use crate::migrationitem::MigrationItem;
use crate::policies::{Policy, PolicyContext, PolicyVerdict};
use crate::suites::SourcePackage;

type Bulletins = HashMap<String, Vec<(String, i64)>>;

fn read_bulletins(path: &Path, what: &str) -> Bulletins {
    let mut bulletins = Bulletins::new();
    let Ok(content) = fs::read_to_string(path) else {
        info!("{}, data file {} not found", what, path.display());
        return bulletins;
    };
    info!("Loading user-supplied {} data from {}", what, path.display());
    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [source, bug, date] = fields.as_slice() else {
            warn!("{}, ignoring malformed line {:?}", what, line);
            continue;
        };
        match date.parse::<i64>() {
            Ok(date) => bulletins
                .entry((*source).to_owned())
                .or_default()
                .push(((*bug).to_owned(), date)),
            Err(_) => error!("{}, unable to parse {:?}", what, line),
        }
    }
    bulletins
}

fn format_date(date: i64) -> String {
    DateTime::from_timestamp(date, 0)
        .map(|datetime| datetime.format("%a %b %e %H:%M:%S %Y").to_string())
        .unwrap_or_else(|| date.to_string())
}

/// Policy rejecting packages named in the `Blocks` bulletin file.
#[derive(Debug, Default)]
pub struct BlockBugPolicy {
    blocks: Bulletins,
}

impl BlockBugPolicy {
    /// Create the policy.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Policy for BlockBugPolicy {
    fn policy_id(&self) -> &'static str {
        "block-bugs"
    }

    fn initialise(&mut self, ctx: &PolicyContext) -> Result<()> {
        self.blocks = read_bulletins(&ctx.config.unstable.join("Blocks"), "Blocks");
        Ok(())
    }

    fn apply_src(
        &mut self,
        _ctx: &PolicyContext,
        info: &mut Mapping,
        _item: &MigrationItem,
        _source_t: Option<&SourcePackage>,
        source_u: &SourcePackage,
        excuse: &mut Excuse,
    ) -> PolicyVerdict {
        let Some(blocks) = self.blocks.get(&source_u.source) else {
            return PolicyVerdict::Pass;
        };

        for (bug, date) in blocks {
            info.insert(Value::String(bug.clone()), Value::Number((*date).into()));
            excuse.add_verdict_info(
                PolicyVerdict::RejectedPermanently,
                format!(
                    "Not touching package as requested in bug {} on {}",
                    bug,
                    format_date(*date)
                ),
            );
        }
        excuse.addreason("block");
        PolicyVerdict::RejectedPermanently
    }
}

/// Policy linking `ExcuseBugs` bug reports to excuses without blocking them.
#[derive(Debug, Default)]
pub struct ExcuseBugPolicy {
    excuse_bugs: Bulletins,
}

impl ExcuseBugPolicy {
    /// Create the policy.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Policy for ExcuseBugPolicy {
    fn policy_id(&self) -> &'static str {
        "update-excuse"
    }

    fn initialise(&mut self, ctx: &PolicyContext) -> Result<()> {
        self.excuse_bugs = read_bulletins(&ctx.config.unstable.join("ExcuseBugs"), "ExcuseBugs");
        Ok(())
    }

    fn apply_src(
        &mut self,
        _ctx: &PolicyContext,
        info: &mut Mapping,
        _item: &MigrationItem,
        _source_t: Option<&SourcePackage>,
        source_u: &SourcePackage,
        excuse: &mut Excuse,
    ) -> PolicyVerdict {
        if let Some(bugs) = self.excuse_bugs.get(&source_u.source) {
            for (bug, date) in bugs {
                info.insert(Value::String(bug.clone()), Value::Number((*date).into()));
                excuse.addinfo(format!(
                    "Also see bug {} last updated on {}",
                    bug,
                    format_date(*date)
                ));
            }
        }
        PolicyVerdict::Pass
    }
}
