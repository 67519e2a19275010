// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use clap::Parser;

/// Decide which source packages may migrate into the target suite.
#[derive(Debug, Parser)]
#[clap(about, version)]
pub struct Options {
    /// Path of the configuration file
    #[clap(short, long, default_value = "/etc/britney.conf")]
    pub config: PathBuf,
    /// Override the architectures from the configuration file
    #[clap(long)]
    pub architectures: Option<String>,
    /// Override the list of actions to be performed
    #[clap(long)]
    pub actions: Option<String>,
    /// Additional hints, separated by semicolons
    #[clap(long)]
    pub hints: Option<String>,
    /// Provide a command line interface to test hints
    #[clap(long)]
    pub hint_tester: bool,
    /// Disable all outputs to the target suite directory
    #[clap(long)]
    pub dry_run: bool,
    /// Do not rebuild the non-installability status, use the cache
    #[clap(long)]
    pub nuninst_cache: bool,
    /// Just print a summary of uninstallable packages
    #[clap(long)]
    pub print_uninst: bool,
    /// Compute which packages can migrate (the default)
    #[clap(long, overrides_with = "no_compute_migrations")]
    pub compute_migrations: bool,
    /// Do not compute which packages can migrate
    #[clap(long)]
    pub no_compute_migrations: bool,
    /// Set the distribution series name
    #[clap(long, default_value = "")]
    pub series: String,
    /// Set the distribution name
    #[clap(long, default_value = "Debian")]
    pub distribution: String,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::WarnLevel>,
}

impl Options {
    /// Whether migrations are computed this run.
    pub fn compute_migrations(&self) -> bool {
        !self.no_compute_migrations
    }
}
