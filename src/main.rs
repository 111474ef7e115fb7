//
// main.rs
// Sarco-Tools-rs
//
// Binary entry point that hands off execution to the CLI layer.
//
// Thales Matheus Mendonça Santos - November 2025

use sarco_tools::cli;

fn main() -> anyhow::Result<()> {
    cli::run()
}
