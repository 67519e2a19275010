// Copyright 2025 Debian Release Tooling
// SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::Result;
use clap::Parser;

use britney::{Britney, Options};

fn main() -> Result<()> {
    let options = Options::parse();

    let verbosity = match options.verbose.log_level_filter() {
        log::LevelFilter::Off | log::LevelFilter::Error => 0,
        log::LevelFilter::Warn => 1,
        log::LevelFilter::Info => 2,
        log::LevelFilter::Debug => 3,
        log::LevelFilter::Trace => 4,
    };
    stderrlog::new().verbosity(verbosity).init()?;

    let mut britney = Britney::setup(options)?;
    britney.run()
}
