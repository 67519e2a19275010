// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: LGPL-3.0-or-later

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use debian_archive_utils::excuses::{Excuses, ExcusesItem, HintInfo, MissingBuilds, Verdict};

fn item(name: &str, verdict: Verdict, candidate: bool) -> ExcusesItem {
    ExcusesItem {
        item_name: name.to_owned(),
        source: name.split('/').next().unwrap().to_owned(),
        migration_policy_verdict: verdict,
        old_version: "1".to_owned(),
        new_version: "2".to_owned(),
        is_candidate: candidate,
        excuses: vec!["Migration status: something".to_owned()],
        maintainer: Some("Jane Doe".to_owned()),
        component: None,
        reason: vec![],
        forced_reason: vec![],
        policy_info: None,
        missing_builds: None,
        invalidated_by_other_package: None,
        dependencies: None,
        manual_approval_status: None,
        hints: vec![],
        old_binaries: BTreeMap::new(),
        detailed_info: vec![],
    }
}

#[test]
fn serialize_candidate() {
    let excuses = Excuses {
        generated_date: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        sources: vec![item("zathura", Verdict::Pass, true)],
    };

    let rendered = debian_archive_utils::excuses::to_string(&excuses).unwrap();
    assert!(rendered.contains("generated-date: 2025-03-01 12:00:00"));
    assert!(rendered.contains("item-name: zathura"));
    assert!(rendered.contains("migration-policy-verdict: PASS"));
    assert!(rendered.contains("is-candidate: true"));
    // empty optional sections are omitted
    assert!(!rendered.contains("missing-builds"));
    assert!(!rendered.contains("hints:"));
}

#[test]
fn serialize_rejected_with_details() {
    let mut rejected = item(
        "zathura/amd64",
        Verdict::RejectedCannotDetermineIfPermanent,
        false,
    );
    rejected.missing_builds = Some(MissingBuilds {
        on_architectures: vec!["i386".to_owned()],
        on_unimportant_architectures: vec![],
    });
    rejected.hints = vec![HintInfo {
        hint_type: "unblock".to_owned(),
        hint_from: "release-member".to_owned(),
    }];
    rejected.reason = vec!["missingbuild".to_owned()];

    let excuses = Excuses {
        generated_date: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        sources: vec![rejected],
    };

    let rendered = debian_archive_utils::excuses::to_string(&excuses).unwrap();
    assert!(rendered.contains("item-name: zathura/amd64"));
    assert!(rendered.contains("REJECTED_CANNOT_DETERMINE_IF_PERMANENT"));
    assert!(rendered.contains("missing-builds"));
    assert!(rendered.contains("on-architectures"));
    assert!(rendered.contains("hint-type: unblock"));
    assert!(rendered.contains("- missingbuild"));
}
