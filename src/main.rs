//! The `collab` command line: post collaborations, apply to roles and staff them.

use clap::Parser;

mod cli;

fn main() -> anyhow::Result<()> {
    cli::Cli::parse().run()
}
