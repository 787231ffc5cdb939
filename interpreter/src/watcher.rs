//! Hot reload: every `*.kts` below a directory is compiled once at start, then a
//! filesystem watcher recompiles each script that gets created or written to.

use anyhow::{Context, Result};
use glob::glob;
use notify::event::{Event, EventKind};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info, warn};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::script;

/// how a changed script fared
#[derive(Debug)]
pub struct Report {
    pub path: PathBuf,
    pub outcome: Result<usize>,
}

fn compile(path: PathBuf) -> Report {
    let outcome = script::compile_file(&path).map(|prog| prog.len());
    Report { path, outcome }
}

/// compiles every script below `dir`
pub fn validate_all(dir: &Path) -> Result<Vec<Report>> {
    let pattern = dir
        .join("**")
        .join("*.kts")
        .to_str()
        .context("the watched directory is not valid utf-8")?
        .to_owned();
    let mut reports = vec![];
    for entry in glob(&pattern)? {
        reports.push(compile(entry?));
    }
    Ok(reports)
}

fn is_script(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "kts")
}

/// the scripts an event asks to recompile. Removals and metadata changes are ignored
pub fn changed_scripts(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => event
            .paths
            .iter()
            .filter(|p| is_script(p) && p.is_file())
            .cloned()
            .collect(),
        _ => vec![],
    }
}

/// Blocks for the next event, then keeps collecting for `debounce`, so an editor that
/// writes a file in several steps triggers one compilation. None once the watcher is gone.
fn next_batch(
    events: &Receiver<notify::Result<Event>>,
    debounce: Duration,
) -> Option<BTreeSet<PathBuf>> {
    let mut batch = BTreeSet::new();
    let mut record = |res: notify::Result<Event>| match res {
        Ok(event) => {
            debug!(kind = ?event.kind, paths = ?event.paths, "fs event");
            batch.extend(changed_scripts(&event));
        }
        Err(e) => warn!(error = %e, "watch error"),
    };
    record(events.recv().ok()?);
    loop {
        match events.recv_timeout(debounce) {
            Ok(res) => record(res),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return Some(batch),
        }
    }
}

fn print_report(report: &Report) {
    match &report.outcome {
        Ok(len) => {
            info!(path = %report.path.display(), instructions = len, "validated");
            println!("✅ {} was validated successfully", report.path.display());
        }
        Err(e) => {
            error!(path = %report.path.display(), "{:#}", e);
            println!("❌ {}: {:#}", report.path.display(), e);
        }
    }
}

pub fn run(dir: &Path, debounce: Duration) -> Result<()> {
    for report in validate_all(dir)? {
        print_report(&report);
    }

    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(tx, Config::default())
        .context("could not create the file watcher")?;
    watcher
        .watch(dir, RecursiveMode::Recursive)
        .with_context(|| format!("could not watch {}", dir.display()))?;
    info!(dir = %dir.display(), "watching");

    while let Some(batch) = next_batch(&rx, debounce) {
        for path in batch {
            print_report(&compile(path));
        }
    }
    Ok(())
}
