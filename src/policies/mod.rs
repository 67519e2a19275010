// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! The policy engine.
//!
//! Policies are orthogonal admission checks layered on every candidate. Each
//! policy may append info to the excuse, add structured data to
//! `policy_info`, and raise (never lower) the excuse verdict. The effective
//! verdict of an excuse is the maximum of all contributions.

use anyhow::Result;
use debian_archive_utils::architectures::Architecture;
use serde_yaml::{Mapping, Value};

use crate::config::Config;
use crate::excuse::Excuse;
use crate::hints::{HintCollection, HintParser};
use crate::migrationitem::MigrationItem;
use crate::suites::{SourcePackage, SuiteClass, Suites};
use crate::universe::PackageUniverse;

mod age;
mod block;
mod build_depends;
mod bulletins;
mod depends;
mod implicit_deps;
mod piuparts;
mod rcbugs;

pub use age::AgePolicy;
pub use block::BlockPolicy;
pub use build_depends::BuildDependsPolicy;
pub use bulletins::{BlockBugPolicy, ExcuseBugPolicy};
pub use depends::DependsPolicy;
pub use implicit_deps::ImplicitDependencyPolicy;
pub use piuparts::PiupartsPolicy;
pub use rcbugs::RCBugPolicy;

/// The verdict of a policy on a migration item.
pub use debian_archive_utils::excuses::Verdict as PolicyVerdict;

/// The SCREAMING_SNAKE name of a verdict as used in the outputs.
pub fn verdict_name(verdict: PolicyVerdict) -> &'static str {
    match verdict {
        PolicyVerdict::NotApplicable => "NOT_APPLICABLE",
        PolicyVerdict::Pass => "PASS",
        PolicyVerdict::PassHinted => "PASS_HINTED",
        PolicyVerdict::RejectedTemporarily => "REJECTED_TEMPORARILY",
        PolicyVerdict::RejectedWaitingForAnotherItem => "REJECTED_WAITING_FOR_ANOTHER_ITEM",
        PolicyVerdict::RejectedBlockedByAnotherItem => "REJECTED_BLOCKED_BY_ANOTHER_ITEM",
        PolicyVerdict::RejectedNeedsApproval => "REJECTED_NEEDS_APPROVAL",
        PolicyVerdict::RejectedCannotDetermineIfPermanent => {
            "REJECTED_CANNOT_DETERMINE_IF_PERMANENT"
        }
        PolicyVerdict::RejectedPermanently => "REJECTED_PERMANENTLY",
    }
}

/// Read-only view of the world handed to policies.
#[derive(Clone, Copy)]
pub struct PolicyContext<'a> {
    /// The configuration
    pub config: &'a Config,
    /// All suites
    pub suites: &'a Suites,
    /// The package universe
    pub universe: &'a PackageUniverse,
    /// The active hints
    pub hints: &'a HintCollection,
}

/// A pluggable admission check.
pub trait Policy {
    /// The id used as the `policy_info` key.
    fn policy_id(&self) -> &'static str;

    /// The source-suite classes this policy applies to.
    fn applies_to(&self, class: SuiteClass) -> bool {
        class.is_primary_source()
    }

    /// Register hint types this policy understands.
    fn register_hints(&self, _parser: &mut HintParser) {}

    /// One-time initialisation (parsing state files etc).
    fn initialise(&mut self, _ctx: &PolicyContext) -> Result<()> {
        Ok(())
    }

    /// Apply the policy to a source migration.
    fn apply_src(
        &mut self,
        ctx: &PolicyContext,
        info: &mut Mapping,
        item: &MigrationItem,
        source_t: Option<&SourcePackage>,
        source_u: &SourcePackage,
        excuse: &mut Excuse,
    ) -> PolicyVerdict;

    /// Apply the policy to a binary-only migration on one architecture.
    fn apply_srcarch(
        &mut self,
        _ctx: &PolicyContext,
        _info: &mut Mapping,
        _item: &MigrationItem,
        _arch: Architecture,
        _source_t: Option<&SourcePackage>,
        _source_u: &SourcePackage,
        _excuse: &mut Excuse,
    ) -> PolicyVerdict {
        PolicyVerdict::NotApplicable
    }

    /// Persist any state at the end of a run.
    fn save_state(&self, _ctx: &PolicyContext) -> Result<()> {
        Ok(())
    }
}

/// Ordered list of policies applied to every excuse.
#[derive(Default)]
pub struct PolicyEngine {
    policies: Vec<Box<dyn Policy>>,
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field(
                "policies",
                &self
                    .policies
                    .iter()
                    .map(|policy| policy.policy_id())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PolicyEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a policy; policies run in registration order.
    pub fn add_policy(&mut self, policy: Box<dyn Policy>) {
        self.policies.push(policy);
    }

    /// Let every policy register its hint types.
    pub fn register_policy_hints(&self, parser: &mut HintParser) {
        for policy in &self.policies {
            policy.register_hints(parser);
        }
    }

    /// Initialise every policy.
    pub fn initialise(&mut self, ctx: &PolicyContext) -> Result<()> {
        for policy in &mut self.policies {
            policy.initialise(ctx)?;
        }
        Ok(())
    }

    /// Save the state of every policy.
    pub fn save_state(&self, ctx: &PolicyContext) -> Result<()> {
        for policy in &self.policies {
            policy.save_state(ctx)?;
        }
        Ok(())
    }

    fn take_info(excuse: &mut Excuse, policy_id: &str) -> Mapping {
        match excuse.policy_info.remove(&Value::String(policy_id.to_owned())) {
            Some(Value::Mapping(mapping)) => mapping,
            _ => Mapping::new(),
        }
    }

    fn store_info(excuse: &mut Excuse, policy_id: &str, mut info: Mapping, verdict: PolicyVerdict) {
        info.insert(
            Value::String("verdict".to_owned()),
            Value::String(verdict_name(verdict).to_owned()),
        );
        excuse
            .policy_info
            .insert(Value::String(policy_id.to_owned()), Value::Mapping(info));
    }

    /// Run all applicable policies for a source migration.
    pub fn apply_src_policies(
        &mut self,
        ctx: &PolicyContext,
        item: &MigrationItem,
        source_t: Option<&SourcePackage>,
        source_u: &SourcePackage,
        excuse: &mut Excuse,
    ) {
        let suite_class = ctx.suites.get(item.suite).suite_class;
        for policy in &mut self.policies {
            if !policy.applies_to(suite_class) {
                continue;
            }
            let mut info = Self::take_info(excuse, policy.policy_id());
            let verdict = policy.apply_src(ctx, &mut info, item, source_t, source_u, excuse);
            Self::store_info(excuse, policy.policy_id(), info, verdict);
            excuse.raise_verdict(verdict);
        }
    }

    /// Run all applicable policies for a binary-only migration.
    pub fn apply_srcarch_policies(
        &mut self,
        ctx: &PolicyContext,
        item: &MigrationItem,
        arch: Architecture,
        source_t: Option<&SourcePackage>,
        source_u: &SourcePackage,
        excuse: &mut Excuse,
    ) {
        let suite_class = ctx.suites.get(item.suite).suite_class;
        for policy in &mut self.policies {
            if !policy.applies_to(suite_class) {
                continue;
            }
            let mut info = Self::take_info(excuse, policy.policy_id());
            let verdict =
                policy.apply_srcarch(ctx, &mut info, item, arch, source_t, source_u, excuse);
            if verdict == PolicyVerdict::NotApplicable {
                // policy skipped this item; keep any info it had stored before
                if !info.is_empty() {
                    excuse.policy_info.insert(
                        Value::String(policy.policy_id().to_owned()),
                        Value::Mapping(info),
                    );
                }
                continue;
            }
            Self::store_info(excuse, policy.policy_id(), info, verdict);
            excuse.raise_verdict(verdict);
        }
    }
}
