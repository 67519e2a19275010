// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: LGPL-3.0-or-later

//! # Helpers for working with Debian-style archives
//!
//! This crate consists of the following modules:
//! * [architectures]: Helpers to handle Debian architectures
//! * [excuses]: The data model of `excuses.yaml` produced by testing migration
//! * [package]: Helpers to handle package names and multi-arch values
//! * [relations]: Parsing of package relationship fields
//! * [version]: Helpers to handle package versions

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use thiserror::Error;

pub mod architectures;
pub mod excuses;
pub mod package;
pub mod relations;
mod utils;
pub mod version;

/// Parsing error
#[derive(Clone, Debug, Error)]
pub enum ParseError {
    /// Given string is not a valid architecture
    #[error("invalid architecture")]
    InvalidArchitecture,
    /// Given string is not a valid version
    #[error("invalid version: {0}")]
    InvalidVersion(#[from] version::VersionError),
    /// Given string is not a valid multi-arch value
    #[error("invalid multi-arch")]
    InvalidMultiArch,
}
