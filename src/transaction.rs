// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

//! Log based transactions over the target suite and the installability
//! tester.
//!
//! Instead of copying the large suite maps, every mutation records its
//! inverse operation; `rollback` replays the journal in reverse, `commit`
//! discards it.

use crate::suites::{BinaryPackage, BinaryPackageId, SourcePackage, Suites};
use crate::tester::InstallabilityTester;
use crate::universe::PackageUniverse;

/// Inverse of one applied operation.
#[derive(Debug)]
pub enum UndoOp {
    /// A binary was added to the target suite
    BinaryAdded {
        /// Id of the added binary
        pkg_id: BinaryPackageId,
    },
    /// A binary was removed from the target suite
    BinaryRemoved {
        /// The removed record
        pkg: BinaryPackage,
    },
    /// A source record of the target suite was replaced or removed
    SourceSet {
        /// The source package name
        name: String,
        /// The previous record, `None` if the source was not present
        old: Option<SourcePackage>,
    },
}

/// The journal of the open transactions.
///
/// Transactions nest: a hint run may wrap the whole migration sequence in an
/// outer transaction while every group attempt opens an inner one. Each
/// `start` records a mark; `commit` folds the inner operations into the
/// enclosing transaction, `rollback` reverts down to the last mark.
#[derive(Debug, Default)]
pub struct Journal {
    ops: Vec<UndoOp>,
    marks: Vec<usize>,
}

impl Journal {
    /// Open a (possibly nested) transaction.
    pub fn start(&mut self) {
        self.marks.push(self.ops.len());
    }

    /// Whether a transaction is open.
    pub fn is_open(&self) -> bool {
        !self.marks.is_empty()
    }

    /// Record the inverse of an applied operation.
    pub fn push(&mut self, op: UndoOp) {
        assert!(self.is_open(), "mutation outside of a transaction");
        self.ops.push(op);
    }

    /// Keep the changes of the innermost transaction.
    pub fn commit(&mut self) {
        self.marks.pop().expect("commit without a transaction");
        if self.marks.is_empty() {
            self.ops.clear();
        }
    }

    /// Revert the changes of the innermost transaction.
    pub fn rollback(
        &mut self,
        universe: &PackageUniverse,
        suites: &mut Suites,
        tester: &mut InstallabilityTester,
    ) {
        let mark = self.marks.pop().expect("rollback without a transaction");
        for op in self.ops.drain(mark..).rev() {
            match op {
                UndoOp::BinaryAdded { pkg_id } => {
                    let removed = suites.target.remove_binary(&pkg_id);
                    debug_assert!(removed.is_some());
                    tester.remove_binary(universe, universe.must_lookup(&pkg_id));
                }
                UndoOp::BinaryRemoved { pkg } => {
                    let ix = universe.must_lookup(&pkg.pkg_id);
                    tester.add_binary(universe, ix);
                    suites.target.insert_binary(pkg);
                }
                UndoOp::SourceSet { name, old } => match old {
                    Some(record) => {
                        suites.target.sources.insert(name, record);
                    }
                    None => {
                        suites.target.sources.remove(&name);
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::Journal;

    #[test]
    fn nested_commit_keeps_parent_journal() {
        let mut journal = Journal::default();
        journal.start();
        assert!(journal.is_open());
        journal.start();
        journal.commit();
        // the outer transaction is still open
        assert!(journal.is_open());
        journal.commit();
        assert!(!journal.is_open());
    }

    #[test]
    #[should_panic(expected = "mutation outside of a transaction")]
    fn mutation_requires_transaction() {
        let mut journal = Journal::default();
        journal.push(super::UndoOp::SourceSet {
            name: "green".to_owned(),
            old: None,
        });
    }
}

