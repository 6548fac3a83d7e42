//! Man page generator for servo_updater
//!
//! Writes `servo_updater.1` plus one `servo_updater-<command>.1` page per
//! subcommand.
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use clap_mangen::Man;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
#[allow(dead_code)]
mod cli;

const BIN_NAME: &str = "servo_updater";

fn render(man: Man, path: PathBuf) -> io::Result<PathBuf> {
    let mut buffer = Vec::new();
    man.render(&mut buffer)?;
    fs::write(&path, buffer)?;
    Ok(path)
}

/// Render every page into `dir`, returning the written paths
fn write_pages(dir: &Path) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let cmd = cli::Cli::command();
    let main_page = dir.join(format!("{}.1", BIN_NAME));
    let mut pages = vec![render(Man::new(cmd.clone()), main_page)?];

    for sub in cmd.get_subcommands().filter(|s| s.get_name() != "help") {
        let title = format!("{}-{}", BIN_NAME, sub.get_name());
        let path = dir.join(format!("{}.1", title));
        pages.push(render(Man::new(sub.clone()).title(title), path)?);
    }

    Ok(pages)
}

fn main() -> io::Result<()> {
    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));

    let pages = write_pages(&output_dir)?;
    for page in &pages {
        println!("Man page generated at: {}", page.display());
    }
    println!("\nTo view the man page:");
    println!("  man -l {}", output_dir.join(format!("{}.1", BIN_NAME)).display());

    Ok(())
}
