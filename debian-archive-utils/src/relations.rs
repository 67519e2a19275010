// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: LGPL-3.0-or-later

//! # Parsing of package relationship fields
//!
//! This module parses relationship fields such as `Depends`, `Conflicts`,
//! `Provides` and the build-dependency fields into a conjunction of clauses,
//! where each clause is a list of alternatives.
//!
//! ```
//! use debian_archive_utils::relations::parse_relations;
//!
//! let relations = parse_relations("libgreen1 (>= 2), default-mta | mail-transport-agent").unwrap();
//! assert_eq!(relations.len(), 2);
//! assert_eq!(relations[0][0].package, "libgreen1");
//! assert_eq!(relations[1].len(), 2);
//! ```

use std::fmt::{self, Display};
use std::str::FromStr;

use smallvec::SmallVec;
use thiserror::Error;

use crate::version::PackageVersion;

/// Errors when parsing relationship fields
#[derive(Clone, Debug, Error)]
pub enum RelationError {
    /// A clause contains an empty alternative
    #[error("empty alternative in relationship")]
    EmptyAlternative,
    /// The package name contains invalid characters
    #[error("invalid package name in relationship: {0}")]
    InvalidPackageName(String),
    /// A version constraint is missing its closing parenthesis
    #[error("unterminated version constraint")]
    UnterminatedConstraint,
    /// The relation operator is not one of `<<`, `<=`, `=`, `>=`, `>>`
    #[error("invalid relation operator: {0}")]
    InvalidOperator(String),
    /// The version in a constraint is invalid
    #[error("invalid version in relationship: {0}")]
    InvalidVersion(String),
    /// An architecture restriction is missing its closing bracket
    #[error("unterminated architecture restriction")]
    UnterminatedRestriction,
    /// Trailing characters after a relation
    #[error("trailing characters in relationship: {0}")]
    TrailingGarbage(String),
}

/// A relation operator of a versioned dependency
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelOp {
    /// Strictly earlier (`<<`)
    StrictlyEarlier,
    /// Earlier or equal (`<=`)
    EarlierEqual,
    /// Exactly equal (`=`)
    Equal,
    /// Later or equal (`>=`)
    LaterEqual,
    /// Strictly later (`>>`)
    StrictlyLater,
}

impl RelOp {
    /// Check whether `candidate` satisfies the operator against `reference`.
    pub fn satisfied_by(self, candidate: &PackageVersion, reference: &PackageVersion) -> bool {
        match self {
            RelOp::StrictlyEarlier => candidate < reference,
            RelOp::EarlierEqual => candidate <= reference,
            RelOp::Equal => candidate == reference,
            RelOp::LaterEqual => candidate >= reference,
            RelOp::StrictlyLater => candidate > reference,
        }
    }
}

impl Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                RelOp::StrictlyEarlier => "<<",
                RelOp::EarlierEqual => "<=",
                RelOp::Equal => "=",
                RelOp::LaterEqual => ">=",
                RelOp::StrictlyLater => ">>",
            }
        )
    }
}

impl TryFrom<&str> for RelOp {
    type Error = RelationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "<<" => Ok(RelOp::StrictlyEarlier),
            // the single-character forms are deprecated aliases
            "<=" | "<" => Ok(RelOp::EarlierEqual),
            "=" => Ok(RelOp::Equal),
            ">=" | ">" => Ok(RelOp::LaterEqual),
            ">>" => Ok(RelOp::StrictlyLater),
            _ => Err(RelationError::InvalidOperator(value.to_owned())),
        }
    }
}

impl FromStr for RelOp {
    type Err = RelationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelOp::try_from(s)
    }
}

/// A version constraint of a relation
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VersionConstraint {
    /// The relation operator
    pub op: RelOp,
    /// The reference version
    pub version: PackageVersion,
}

impl VersionConstraint {
    /// Check whether the given version satisfies this constraint.
    pub fn satisfied_by(&self, candidate: &PackageVersion) -> bool {
        self.op.satisfied_by(candidate, &self.version)
    }
}

/// An architecture restriction of a build dependency
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArchRestriction {
    /// Whether the restriction is negated (`!arch`)
    pub negated: bool,
    /// The architecture name
    pub arch: String,
}

/// A single relation, i.e., one alternative of a relationship clause
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Relation {
    /// Name of the target package
    pub package: String,
    /// Optional architecture qualifier (`:any`, `:native`, a concrete architecture)
    pub archqual: Option<String>,
    /// Optional version constraint
    pub constraint: Option<VersionConstraint>,
    /// Architecture restriction list of build dependencies
    pub arch_restrictions: Option<Vec<ArchRestriction>>,
}

impl Relation {
    /// Check whether the relation applies on the given architecture.
    ///
    /// Relations without restriction list apply everywhere. A list of
    /// negated entries excludes the named architectures, otherwise the list
    /// enumerates the applicable architectures.
    pub fn applies_to_arch(&self, arch: &str) -> bool {
        match &self.arch_restrictions {
            None => true,
            Some(restrictions) => {
                if restrictions.iter().all(|r| r.negated) {
                    restrictions.iter().all(|r| r.arch != arch)
                } else {
                    restrictions.iter().any(|r| !r.negated && r.arch == arch)
                }
            }
        }
    }
}

impl Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.package)?;
        if let Some(qual) = &self.archqual {
            write!(f, ":{}", qual)?;
        }
        if let Some(constraint) = &self.constraint {
            write!(f, " ({} {})", constraint.op, constraint.version)?;
        }
        Ok(())
    }
}

/// A clause of alternatives; the clause is satisfied if any alternative is.
pub type RelationClause = SmallVec<[Relation; 2]>;

fn valid_package_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || ".+-".contains(c))
}

fn parse_single_relation(input: &str) -> Result<Relation, RelationError> {
    let mut rest = input.trim();
    if rest.is_empty() {
        return Err(RelationError::EmptyAlternative);
    }

    let name_end = rest
        .find(|c: char| c.is_whitespace() || "(:[<".contains(c))
        .unwrap_or(rest.len());
    let name = &rest[..name_end];
    if !valid_package_name(name) {
        return Err(RelationError::InvalidPackageName(name.to_owned()));
    }
    rest = rest[name_end..].trim_start();

    let archqual = if let Some(stripped) = rest.strip_prefix(':') {
        let qual_end = stripped
            .find(|c: char| c.is_whitespace() || "([<".contains(c))
            .unwrap_or(stripped.len());
        let qual = &stripped[..qual_end];
        if qual.is_empty() {
            return Err(RelationError::InvalidPackageName(input.trim().to_owned()));
        }
        rest = stripped[qual_end..].trim_start();
        Some(qual.to_owned())
    } else {
        None
    };

    let constraint = if let Some(stripped) = rest.strip_prefix('(') {
        let end = stripped
            .find(')')
            .ok_or(RelationError::UnterminatedConstraint)?;
        let inner = stripped[..end].trim();
        let op_end = inner
            .find(|c: char| !"<>=".contains(c))
            .unwrap_or(inner.len());
        let op = RelOp::try_from(&inner[..op_end])?;
        let version_str = inner[op_end..].trim();
        let version = PackageVersion::try_from(version_str)
            .map_err(|_| RelationError::InvalidVersion(version_str.to_owned()))?;
        rest = stripped[end + 1..].trim_start();
        Some(VersionConstraint { op, version })
    } else {
        None
    };

    let arch_restrictions = if let Some(stripped) = rest.strip_prefix('[') {
        let end = stripped
            .find(']')
            .ok_or(RelationError::UnterminatedRestriction)?;
        let restrictions = stripped[..end]
            .split_whitespace()
            .map(|entry| {
                if let Some(arch) = entry.strip_prefix('!') {
                    ArchRestriction {
                        negated: true,
                        arch: arch.to_owned(),
                    }
                } else {
                    ArchRestriction {
                        negated: false,
                        arch: entry.to_owned(),
                    }
                }
            })
            .collect();
        rest = stripped[end + 1..].trim_start();
        Some(restrictions)
    } else {
        None
    };

    // build profiles are not relevant for installability
    while let Some(stripped) = rest.strip_prefix('<') {
        let end = stripped
            .find('>')
            .ok_or(RelationError::UnterminatedRestriction)?;
        rest = stripped[end + 1..].trim_start();
    }

    if !rest.is_empty() {
        return Err(RelationError::TrailingGarbage(rest.to_owned()));
    }

    Ok(Relation {
        package: name.to_owned(),
        archqual,
        constraint,
        arch_restrictions,
    })
}

/// Parse a relationship field into clauses of alternatives.
///
/// Clauses are separated by commas, alternatives within a clause by pipes.
/// An empty field parses to an empty list of clauses.
pub fn parse_relations(input: &str) -> Result<Vec<RelationClause>, RelationError> {
    let mut clauses = Vec::new();
    for clause in input.split(',') {
        if clause.trim().is_empty() {
            continue;
        }
        let alternatives = clause
            .split('|')
            .map(parse_single_relation)
            .collect::<Result<RelationClause, _>>()?;
        clauses.push(alternatives);
    }
    Ok(clauses)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn simple() {
        let relations = parse_relations("libc6 (>= 2.2.1), libgreen1").unwrap();
        assert_eq!(relations.len(), 2);
        assert_eq!(relations[0][0].package, "libc6");
        let constraint = relations[0][0].constraint.as_ref().unwrap();
        assert_eq!(constraint.op, RelOp::LaterEqual);
        assert_eq!(
            constraint.version,
            PackageVersion::try_from("2.2.1").unwrap()
        );
        assert!(relations[1][0].constraint.is_none());
    }

    #[test]
    fn alternatives() {
        let relations = parse_relations("default-mta | mail-transport-agent").unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].len(), 2);
        assert_eq!(relations[0][1].package, "mail-transport-agent");
    }

    #[test]
    fn archqual() {
        let relations = parse_relations("python3:any (>= 3.5~)").unwrap();
        assert_eq!(relations[0][0].archqual.as_deref(), Some("any"));
        assert!(relations[0][0].constraint.is_some());
    }

    #[test]
    fn arch_restrictions() {
        let relations = parse_relations("gcc-multilib [amd64 i386], libfoo [!s390x]").unwrap();
        assert!(relations[0][0].applies_to_arch("amd64"));
        assert!(!relations[0][0].applies_to_arch("s390x"));
        assert!(relations[1][0].applies_to_arch("amd64"));
        assert!(!relations[1][0].applies_to_arch("s390x"));
    }

    #[test]
    fn build_profiles_are_skipped() {
        let relations = parse_relations("debhelper-compat (= 13) <!nocheck>").unwrap();
        assert_eq!(relations[0][0].package, "debhelper-compat");
    }

    #[test]
    fn empty_field() {
        assert!(parse_relations("").unwrap().is_empty());
        assert!(parse_relations("  ").unwrap().is_empty());
    }

    #[test]
    fn invalid() {
        assert!(parse_relations("foo | ").is_err());
        assert!(parse_relations("foo (>= 1.0").is_err());
        assert!(parse_relations("foo (~~ 1.0)").is_err());
        assert!(parse_relations("Foo").is_err());
    }

    #[test]
    fn deprecated_operators() {
        let relations = parse_relations("foo (< 1.0), bar (> 2.0)").unwrap();
        assert_eq!(
            relations[0][0].constraint.as_ref().unwrap().op,
            RelOp::EarlierEqual
        );
        assert_eq!(
            relations[1][0].constraint.as_ref().unwrap().op,
            RelOp::LaterEqual
        );
    }

    #[test]
    fn satisfaction() {
        let relations = parse_relations("libgreen1 (<< 3)").unwrap();
        let constraint = relations[0][0].constraint.as_ref().unwrap();
        assert!(constraint.satisfied_by(&PackageVersion::try_from("2").unwrap()));
        assert!(!constraint.satisfied_by(&PackageVersion::try_from("3").unwrap()));
    }

    #[test]
    fn display_roundtrip() {
        let relations = parse_relations("python3:any (>= 3.5)").unwrap();
        assert_eq!(relations[0][0].to_string(), "python3:any (>= 3.5)");
    }
}
