// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! Freeze and approval policy.
//!
//! `block` and `block-all` hints (and the implicit block on additional
//! source suites) reject candidates until a release team member issues a
//! matching `unblock` (alias `approve`) for the version under
//! consideration.

use serde_yaml::{Mapping, Value};

use crate::excuse::Excuse;
use crate::migrationitem::MigrationItem;
use crate::policies::{Policy, PolicyContext, PolicyVerdict};
use crate::suites::{SourcePackage, SuiteClass};

/// The block/unblock policy.
#[derive(Debug, Default)]
pub struct BlockPolicy;

impl BlockPolicy {
    /// Create the policy.
    pub fn new() -> Self {
        Self
    }
}

impl Policy for BlockPolicy {
    fn policy_id(&self) -> &'static str {
        "block"
    }

    fn applies_to(&self, class: SuiteClass) -> bool {
        class.is_source()
    }

    fn apply_src(
        &mut self,
        ctx: &PolicyContext,
        info: &mut Mapping,
        item: &MigrationItem,
        _source_t: Option<&SourcePackage>,
        source_u: &SourcePackage,
        excuse: &mut Excuse,
    ) -> PolicyVerdict {
        let suite = ctx.suites.get(item.suite);
        let source_name = &source_u.source;

        // the reason the package is blocked, if it is
        let mut block_description: Option<String> = None;

        if suite.suite_class.is_additional_source() {
            excuse.needs_approval = true;
            block_description = Some(format!(
                "Not touching package as uploads to {} need explicit approval",
                suite.name
            ));
        }
        if let Some(hint) = ctx
            .hints
            .search("block", Some(source_name), None, None, Some(false))
            .first()
        {
            excuse.add_hint(hint.hint_type, &hint.user);
            block_description = Some(format!(
                "Not touching package due to block request by {} (contact debian-release if update is needed)",
                hint.user
            ));
            info.insert(
                Value::String("blocked-by".to_owned()),
                Value::String(hint.user.clone()),
            );
        }
        if block_description.is_none() {
            if let Some(hint) = ctx
                .hints
                .search("block-all", Some("source"), None, None, None)
                .first()
            {
                block_description = Some(format!(
                    "Not touching package as all source packages are blocked by {}",
                    hint.user
                ));
                info.insert(
                    Value::String("blocked-by".to_owned()),
                    Value::String(hint.user.clone()),
                );
            }
        }

        let Some(block_description) = block_description else {
            return PolicyVerdict::Pass;
        };

        // an unblock for the right version lifts the block
        let unblocks = ctx
            .hints
            .search("unblock", Some(source_name), None, None, None);
        let mut version_mismatch = None;
        for hint in &unblocks {
            match hint.version() {
                None => {
                    excuse.add_hint(hint.hint_type, &hint.user);
                    info.insert(
                        Value::String("unblocked-by".to_owned()),
                        Value::String(hint.user.clone()),
                    );
                    excuse.addinfo(format!("Ignoring request to block package by {}", hint.user));
                    return PolicyVerdict::Pass;
                }
                Some(version) if *version == source_u.version => {
                    excuse.add_hint(hint.hint_type, &hint.user);
                    info.insert(
                        Value::String("unblocked-by".to_owned()),
                        Value::String(hint.user.clone()),
                    );
                    excuse.addinfo(format!(
                        "Ignoring request to block package by {}, due to unblock request by {}",
                        info.get(&Value::String("blocked-by".to_owned()))
                            .and_then(|v| v.as_str())
                            .unwrap_or("the suite policy"),
                        hint.user
                    ));
                    return PolicyVerdict::Pass;
                }
                Some(version) => {
                    version_mismatch = Some((version.clone(), hint.user.clone()));
                }
            }
        }

        if let Some((version, user)) = version_mismatch {
            excuse.addinfo(format!(
                "unblock request by {} ignored due to version mismatch: {}",
                user, version
            ));
        }

        excuse.addreason("block");
        let verdict = PolicyVerdict::RejectedNeedsApproval;
        excuse.add_verdict_info(verdict, block_description);
        verdict
    }
}
