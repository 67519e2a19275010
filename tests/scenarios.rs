// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! End-to-end migration scenarios over small on-disk archives.

mod common;

use common::TestArchive;
use debian_archive_utils::architectures::Architecture;

fn target_has(britney: &britney::Britney, name: &str, version: &str) -> bool {
    britney
        .suites
        .target
        .binaries
        .get(&Architecture::Amd64)
        .and_then(|packages| packages.get(name))
        .is_some_and(|pkg| pkg.version.to_string() == version)
}

/// A source producing a new binary migrates together with it; reverse
/// dependencies stay installable.
#[test]
fn new_binary_migrates_with_source() {
    let mut archive = TestArchive::new();
    // target: green/1 with libgreen1/1; blue needs libgreen1
    archive.add_bin(false, "green", "1", "amd64", &[]);
    archive.add_bin(false, "libgreen1", "1", "amd64", &[("Source", "green (1)")]);
    archive.add_bin(false, "blue", "1", "amd64", &[("Depends", "libgreen1")]);
    // unstable: green/2 with updated binaries
    archive.add_bin(true, "green", "2", "amd64", &[]);
    archive.add_bin(true, "libgreen1", "2", "amd64", &[("Source", "green (2)")]);
    archive.add_bin(true, "blue", "1", "amd64", &[("Depends", "libgreen1")]);

    let britney = archive.run("");

    let excuse = &britney.excuses["green/2"];
    assert!(excuse.is_valid());
    assert!(target_has(&britney, "green", "2"));
    assert!(target_has(&britney, "libgreen1", "2"));
    assert!(britney.nuninst().packages(Architecture::Amd64).is_empty());

    let heidi = archive.heidi_result();
    assert!(heidi.contains("green 2 amd64 devel"));
    assert!(heidi.contains("libgreen1 2 amd64 devel"));
    assert!(heidi.contains("green 2 source devel"));
    assert!(archive.upgrade_output().contains("accepted: green"));
}

/// A missing build on a non-out-of-sync architecture blocks the source with
/// REJECTED_CANNOT_DETERMINE_IF_PERMANENT.
#[test]
fn missing_build_blocks_migration() {
    let mut archive = TestArchive::new();
    archive.add_bin(false, "green", "1", "amd64", &[]);
    archive.add_bin(false, "green-old-i386", "1", "i386", &[("Source", "green (1)")]);
    // unstable has a new build on amd64 but only the old binary on i386
    archive.add_bin(true, "green", "2", "amd64", &[]);
    archive.add_bin(true, "green-old-i386", "1", "i386", &[("Source", "green (1)")]);

    let britney = archive.run("ARCHITECTURES = amd64 i386");

    let excuse = &britney.excuses["green/2"];
    assert!(!excuse.is_valid());
    assert!(excuse.hasreason("missingbuild"));
    assert!(excuse.missing_builds.contains(&Architecture::I386));
    assert!(!target_has(&britney, "green", "2"));

    let yaml = archive.excuses_yaml();
    assert!(yaml.contains("REJECTED_CANNOT_DETERMINE_IF_PERMANENT"));
    assert!(yaml.contains("missing-builds"));
}

/// The same situation on an out-of-sync architecture does not block.
#[test]
fn out_of_sync_arch_does_not_block() {
    let mut archive = TestArchive::new();
    archive.add_bin(false, "green", "1", "amd64", &[]);
    archive.add_bin(false, "green-old-i386", "1", "i386", &[("Source", "green (1)")]);
    archive.add_bin(true, "green", "2", "amd64", &[]);
    archive.add_bin(true, "green-old-i386", "1", "i386", &[("Source", "green (1)")]);

    let britney = archive.run("ARCHITECTURES = amd64 i386\nOUTOFSYNC_ARCHES = i386");

    let excuse = &britney.excuses["green/2"];
    assert!(excuse.is_valid());
    assert!(target_has(&britney, "green", "2"));
}

/// A migration that would break a reverse dependency through a conflict is
/// rolled back.
#[test]
fn conflict_regression_is_rolled_back() {
    let mut archive = TestArchive::new();
    // blue needs both purple and lightgreen; purple conflicts with the new
    // lightgreen
    archive.add_bin(false, "lightgreen", "1", "amd64", &[]);
    archive.add_bin(
        false,
        "purple",
        "1",
        "amd64",
        &[("Conflicts", "lightgreen (>= 2)")],
    );
    archive.add_bin(
        false,
        "blue",
        "1",
        "amd64",
        &[("Depends", "purple, lightgreen")],
    );
    archive.add_bin(true, "lightgreen", "2", "amd64", &[]);
    archive.add_bin(
        true,
        "purple",
        "1",
        "amd64",
        &[("Conflicts", "lightgreen (>= 2)")],
    );
    archive.add_bin(
        true,
        "blue",
        "1",
        "amd64",
        &[("Depends", "purple, lightgreen")],
    );

    // the implicit-dependency policy would reject the candidate up front;
    // disable it so the regression is caught by the migration attempt
    let britney = archive.run("IMPLICIT_DEPS = no");

    let excuse = &britney.excuses["lightgreen/2"];
    assert!(excuse.is_valid());
    // the attempt failed and was rolled back
    assert!(target_has(&britney, "lightgreen", "1"));
    assert!(!target_has(&britney, "lightgreen", "2"));
    assert!(britney.nuninst().packages(Architecture::Amd64).is_empty());

    let output = archive.upgrade_output();
    assert!(output.contains("trying: lightgreen"));
    assert!(output.contains("skipped: lightgreen"));
    assert!(output.contains("blue"));
}

/// With the implicit-dependency policy enabled, the same situation is
/// rejected before any migration attempt.
#[test]
fn implicit_dependency_rejects_breaks_without_replacement() {
    let mut archive = TestArchive::new();
    archive.add_bin(false, "lightgreen", "1", "amd64", &[]);
    archive.add_bin(
        false,
        "purple",
        "1",
        "amd64",
        &[("Conflicts", "lightgreen (>= 2)")],
    );
    archive.add_bin(true, "lightgreen", "2", "amd64", &[]);
    archive.add_bin(
        true,
        "purple",
        "1",
        "amd64",
        &[("Conflicts", "lightgreen (>= 2)")],
    );

    let britney = archive.run("");

    let excuse = &britney.excuses["lightgreen/2"];
    assert!(!excuse.is_valid());
    assert!(excuse.hasreason("implicit-dependency"));
    assert!(target_has(&britney, "lightgreen", "1"));
}

/// An old library is kept in the target suite while reverse dependencies
/// still need it (smooth update), and removed once they no longer do.
#[test]
fn smooth_update_keeps_old_library() {
    let mut archive = TestArchive::new();
    archive.add_bin(false, "foo", "1", "amd64", &[]);
    archive.add_bin(
        false,
        "libfoo1",
        "1",
        "amd64",
        &[("Source", "foo (1)"), ("Section", "libs")],
    );
    archive.add_bin(false, "bar", "1", "amd64", &[("Depends", "libfoo1")]);
    // the new foo drops libfoo1 in favour of libfoo2
    archive.add_bin(true, "foo", "2", "amd64", &[]);
    archive.add_bin(
        true,
        "libfoo2",
        "2",
        "amd64",
        &[("Source", "foo (2)"), ("Section", "libs")],
    );
    archive.add_bin(true, "bar", "1", "amd64", &[("Depends", "libfoo1")]);

    let britney = archive.run("SMOOTH_UPDATES = libs");

    assert!(target_has(&britney, "foo", "2"));
    assert!(target_has(&britney, "libfoo2", "2"));
    // libfoo1 survives as bar still depends on it
    assert!(target_has(&britney, "libfoo1", "1"));
    assert!(britney.nuninst().packages(Architecture::Amd64).is_empty());
}

/// Once the reverse dependency dropped the old library, the leftover is
/// swept away.
#[test]
fn smooth_update_leftover_is_removed_later() {
    let mut archive = TestArchive::new();
    // the target suite still has the leftover from the earlier smooth update
    archive.add_bin(false, "foo", "2", "amd64", &[]);
    archive.add_bin(
        false,
        "libfoo2",
        "2",
        "amd64",
        &[("Source", "foo (2)"), ("Section", "libs")],
    );
    archive.add_bin(
        false,
        "libfoo1",
        "1",
        "amd64",
        &[("Source", "foo (1)"), ("Section", "libs")],
    );
    archive.add_bin(false, "bar", "2", "amd64", &[("Depends", "libfoo2")]);
    archive.add_bin(true, "foo", "2", "amd64", &[]);
    archive.add_bin(
        true,
        "libfoo2",
        "2",
        "amd64",
        &[("Source", "foo (2)"), ("Section", "libs")],
    );
    archive.add_bin(true, "bar", "2", "amd64", &[("Depends", "libfoo2")]);

    let britney = archive.run("SMOOTH_UPDATES = libs");

    assert!(target_has(&britney, "foo", "2"));
    assert!(!target_has(&britney, "libfoo1", "1"));
    assert!(britney.nuninst().packages(Architecture::Amd64).is_empty());
}

/// A force-hint overrides a release critical bug rejection and commits the
/// migration even though it breaks a reverse dependency.
#[test]
fn force_hint_overrides_rejection_and_breakage() {
    let mut archive = TestArchive::new();
    archive.add_bin(false, "green", "1", "amd64", &[]);
    archive.add_bin(false, "libgreen1", "1", "amd64", &[("Source", "green (1)")]);
    archive.add_bin(false, "blue", "1", "amd64", &[("Depends", "libgreen1")]);
    // the new green drops libgreen1, breaking blue
    archive.add_bin(true, "green", "2", "amd64", &[]);
    archive.add_bin(true, "blue", "1", "amd64", &[("Depends", "libgreen1")]);

    // green/2 has a new RC bug
    archive.write_suite_file(true, "BugsV", "green 123456\n");
    archive.write_suite_file(false, "BugsV", "");
    archive.write_hints("release-member", "force-hint green/2\n");

    let britney = archive.run("HINTS_RELEASE-MEMBER = ALL");

    let excuse = &britney.excuses["green/2"];
    assert!(excuse.forced);
    assert_eq!(
        excuse.policy_verdict(),
        britney::policies::PolicyVerdict::PassHinted
    );

    assert!(target_has(&britney, "green", "2"));
    assert!(!target_has(&britney, "libgreen1", "1"));
    // the regression was accepted and logged
    assert!(britney
        .nuninst()
        .packages(Architecture::Amd64)
        .contains("blue"));
    let output = archive.upgrade_output();
    assert!(output.contains("force breaks:"));
    assert!(output.contains("blue"));
}

/// Without the force-hint the same update is rejected by the bug policy.
#[test]
fn rc_bug_regression_blocks_migration() {
    let mut archive = TestArchive::new();
    archive.add_bin(false, "green", "1", "amd64", &[]);
    archive.add_bin(true, "green", "2", "amd64", &[]);
    archive.write_suite_file(true, "BugsV", "green 123456\n");
    archive.write_suite_file(false, "BugsV", "");

    let britney = archive.run("");

    let excuse = &britney.excuses["green/2"];
    assert!(!excuse.is_valid());
    assert!(excuse.newbugs.contains("123456"));
    assert!(!target_has(&britney, "green", "2"));
}

/// Mutually dependent packages migrate together as one group.
#[test]
fn circular_dependencies_migrate_together() {
    let mut archive = TestArchive::new();
    archive.add_bin(false, "alpha", "1", "amd64", &[]);
    archive.add_bin(false, "beta", "1", "amd64", &[]);
    archive.add_bin(true, "alpha", "2", "amd64", &[("Depends", "beta (>= 2)")]);
    archive.add_bin(true, "beta", "2", "amd64", &[("Depends", "alpha (>= 2)")]);

    let britney = archive.run("");

    assert!(target_has(&britney, "alpha", "2"));
    assert!(target_has(&britney, "beta", "2"));
    assert!(britney.nuninst().packages(Architecture::Amd64).is_empty());
    // the solver merged the cycle into one group
    assert!(archive.upgrade_output().contains("trying: alpha beta"));
}

/// A block hint needs a matching unblock to lift it; the unblock must name
/// the version under consideration.
#[test]
fn block_and_unblock_hints() {
    let mut archive = TestArchive::new();
    archive.add_bin(false, "green", "1", "amd64", &[]);
    archive.add_bin(true, "green", "2", "amd64", &[]);
    archive.write_hints("freeze", "block green\n");

    let britney = archive.run("HINTS_FREEZE = ALL");
    let excuse = &britney.excuses["green/2"];
    assert!(!excuse.is_valid());
    assert_eq!(
        excuse.policy_verdict(),
        britney::policies::PolicyVerdict::RejectedNeedsApproval
    );
    assert!(!target_has(&britney, "green", "2"));

    // an unblock for the wrong version does not help
    let mut archive = TestArchive::new();
    archive.add_bin(false, "green", "1", "amd64", &[]);
    archive.add_bin(true, "green", "2", "amd64", &[]);
    archive.write_hints("freeze", "block green\nunblock green/1\n");
    let britney = archive.run("HINTS_FREEZE = ALL");
    assert!(!britney.excuses["green/2"].is_valid());

    // the right version migrates
    let mut archive = TestArchive::new();
    archive.add_bin(false, "green", "1", "amd64", &[]);
    archive.add_bin(true, "green", "2", "amd64", &[]);
    archive.write_hints("freeze", "block green\nunblock green/2\n");
    let britney = archive.run("HINTS_FREEZE = ALL");
    assert!(britney.excuses["green/2"].is_valid());
    assert!(target_has(&britney, "green", "2"));
}

/// Sources dropped from unstable are removed from the target suite along
/// with their binaries.
#[test]
fn removed_source_is_removed_from_target() {
    let mut archive = TestArchive::new();
    archive.add_bin(false, "obsolete", "1", "amd64", &[]);
    archive.add_bin(false, "green", "1", "amd64", &[]);
    archive.add_bin(true, "green", "1", "amd64", &[]);

    let britney = archive.run("");

    assert!(!target_has(&britney, "obsolete", "1"));
    assert!(!britney.suites.target.sources.contains_key("obsolete"));
    assert!(!archive.heidi_result().contains("obsolete"));
    let excuse = &britney.excuses["-obsolete/1"];
    assert!(excuse.is_valid());
}

/// An easy hint is accepted or rejected atomically; an incomplete set is
/// rolled back even though the full group can migrate later.
#[test]
fn easy_hint_is_atomic() {
    let mut archive = TestArchive::new();
    archive.add_bin(false, "alpha", "1", "amd64", &[]);
    archive.add_bin(false, "beta", "1", "amd64", &[]);
    // the new alpha needs the new beta
    archive.add_bin(true, "alpha", "2", "amd64", &[("Depends", "beta (>= 2)")]);
    archive.add_bin(true, "beta", "2", "amd64", &[]);
    // the hint only names half of the group
    archive.write_hints("release-member", "easy alpha/2\n");

    let britney = archive.run("HINTS_RELEASE-MEMBER = ALL");

    // the easy run was rejected and rolled back as a whole ...
    let output = archive.upgrade_output();
    assert!(output.contains("easy:"));
    assert!(output.contains("FAILED"));
    // ... and the main run later migrated the complete group
    assert!(target_has(&britney, "alpha", "2"));
    assert!(target_has(&britney, "beta", "2"));
    assert!(britney.nuninst().packages(Architecture::Amd64).is_empty());
}

/// The nuninst cache written at the end matches a full recomputation.
#[test]
fn nuninst_cache_is_coherent() {
    let mut archive = TestArchive::new();
    archive.add_bin(false, "green", "1", "amd64", &[]);
    archive.add_bin(false, "broken", "1", "amd64", &[("Depends", "missing")]);
    archive.add_bin(true, "green", "2", "amd64", &[]);

    let britney = archive.run("");

    // "broken" was uninstallable before and after; the migration of green
    // does not change that
    assert!(britney
        .nuninst()
        .packages(Architecture::Amd64)
        .contains("broken"));
    assert!(target_has(&britney, "green", "2"));
}
