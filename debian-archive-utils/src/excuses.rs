// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: LGPL-3.0-or-later

//! # The data model of `excuses.yaml`
//!
//! This module provides the serializable data model of the
//! [excuses.yaml](https://release.debian.org/britney/excuses.yaml) document
//! produced by testing migration. Every source package under consideration is
//! described by one [ExcusesItem].

use std::collections::BTreeMap;
use std::io;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// A policy's verdict on a migration item
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verdict {
    /// The policy does not apply to this item
    #[serde(rename = "NOT_APPLICABLE")]
    NotApplicable,
    /// Policy passed
    #[serde(rename = "PASS")]
    Pass,
    /// Policy passed due to a hint
    #[serde(rename = "PASS_HINTED")]
    PassHinted,
    /// Rejected due to a transient issue
    #[serde(rename = "REJECTED_TEMPORARILY")]
    RejectedTemporarily,
    /// Rejected while waiting for another item to become ready
    #[serde(rename = "REJECTED_WAITING_FOR_ANOTHER_ITEM")]
    RejectedWaitingForAnotherItem,
    /// Rejected because another item this one depends on is blocked
    #[serde(rename = "REJECTED_BLOCKED_BY_ANOTHER_ITEM")]
    RejectedBlockedByAnotherItem,
    /// Rejected due to a block hint or because the upload requires explicit
    /// approval (e.g., uploads to proposed-updates)
    #[serde(rename = "REJECTED_NEEDS_APPROVAL")]
    RejectedNeedsApproval,
    /// Rejected, but not able to determine if the issue is transient
    #[serde(rename = "REJECTED_CANNOT_DETERMINE_IF_PERMANENT")]
    RejectedCannotDetermineIfPermanent,
    /// Rejected due to a permanent issue
    #[serde(rename = "REJECTED_PERMANENTLY")]
    RejectedPermanently,
}

impl Verdict {
    /// Whether the verdict rejects the migration.
    pub fn is_rejected(self) -> bool {
        self >= Verdict::RejectedTemporarily
    }

    /// Whether the rejection cannot be lifted by simply waiting.
    pub fn is_blocked(self) -> bool {
        self >= Verdict::RejectedBlockedByAnotherItem
    }
}

fn serialize_datetime<S>(datetime: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&datetime.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
}

/// List of missing builds of an item
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct MissingBuilds {
    /// Architectures that block the migration
    pub on_architectures: Vec<String>,
    /// Out-of-sync architectures that do not block the migration
    pub on_unimportant_architectures: Vec<String>,
}

/// Dependency information of an item
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ExcuseDependencies {
    /// Items this item is blocked by
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
    /// Items that will migrate before or together with this item
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub migrate_after: Vec<String>,
    /// Dependencies that do not influence the migration
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unimportant_dependencies: Vec<String>,
    /// Unsatisfiable dependencies per architecture
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub unsatisfiable_dependencies: BTreeMap<String, Vec<String>>,
}

/// A hint that applies to an item
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct HintInfo {
    /// The hint type
    pub hint_type: String,
    /// The user who issued the hint
    pub hint_from: String,
}

/// A source package's excuses
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ExcusesItem {
    /// Name of the migration item, e.g. `zathura` or `zathura/amd64`
    pub item_name: String,
    /// The source package
    pub source: String,
    /// The verdict of the migration policies
    pub migration_policy_verdict: Verdict,
    /// Version in the target suite, `-` if not present
    pub old_version: String,
    /// Version in the source suite, `-` for removals
    pub new_version: String,
    /// Whether the item is a valid migration candidate
    pub is_candidate: bool,
    /// Human readable explanation lines
    pub excuses: Vec<String>,
    /// The package maintainer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,
    /// The archive component, omitted for main
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Machine readable reasons for the verdict
    pub reason: Vec<String>,
    /// Reasons overridden by a force hint
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub forced_reason: Vec<String>,
    /// Per-policy details
    #[serde(rename = "policy_info", skip_serializing_if = "Option::is_none")]
    pub policy_info: Option<serde_yaml::Mapping>,
    /// Missing builds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_builds: Option<MissingBuilds>,
    /// Whether the item was invalidated by another item
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalidated_by_other_package: Option<bool>,
    /// Dependency information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<ExcuseDependencies>,
    /// Approval status of items that need manual approval
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_approval_status: Option<String>,
    /// Hints that apply to this item
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<HintInfo>,
    /// Old binaries per source version
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub old_binaries: BTreeMap<String, Vec<String>>,
    /// Additional details not influencing the verdict
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub detailed_info: Vec<String>,
}

/// The excuses document
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Excuses {
    /// Generation time of the document
    #[serde(serialize_with = "serialize_datetime")]
    pub generated_date: DateTime<Utc>,
    /// The per-source excuses
    pub sources: Vec<ExcusesItem>,
}

/// Result type
pub type Result<T> = serde_yaml::Result<T>;

/// Write excuses to a writer
pub fn to_writer(writer: impl io::Write, excuses: &Excuses) -> Result<()> {
    serde_yaml::to_writer(writer, excuses)
}

/// Render excuses as a string
pub fn to_string(excuses: &Excuses) -> Result<String> {
    serde_yaml::to_string(excuses)
}

#[cfg(test)]
mod test {
    use super::Verdict;

    #[test]
    fn verdict_order() {
        assert!(Verdict::NotApplicable < Verdict::Pass);
        assert!(Verdict::Pass < Verdict::PassHinted);
        assert!(Verdict::PassHinted < Verdict::RejectedTemporarily);
        assert!(Verdict::RejectedTemporarily < Verdict::RejectedWaitingForAnotherItem);
        assert!(Verdict::RejectedWaitingForAnotherItem < Verdict::RejectedBlockedByAnotherItem);
        assert!(Verdict::RejectedBlockedByAnotherItem < Verdict::RejectedNeedsApproval);
        assert!(Verdict::RejectedNeedsApproval < Verdict::RejectedCannotDetermineIfPermanent);
        assert!(Verdict::RejectedCannotDetermineIfPermanent < Verdict::RejectedPermanently);
    }

    #[test]
    fn verdict_classes() {
        assert!(!Verdict::Pass.is_rejected());
        assert!(!Verdict::PassHinted.is_rejected());
        assert!(Verdict::RejectedTemporarily.is_rejected());
        assert!(!Verdict::RejectedTemporarily.is_blocked());
        assert!(Verdict::RejectedNeedsApproval.is_blocked());
        assert!(Verdict::RejectedPermanently.is_blocked());
    }
}
