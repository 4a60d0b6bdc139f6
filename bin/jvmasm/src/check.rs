use crate::diagnostics::{Collector, Diagnostic};
use jvmasm::pipeline::{AssemblerPipeline, PipelineSettings};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use walkdir::WalkDir;

pub const EXTENSION: &str = "jasm";

pub enum CheckOutcome {
    /// Assembles without any diagnostics
    Ok,

    /// Validation or generation found problems
    Fail(Vec<Diagnostic>),

    /// The file could not be read
    Error(io::Error),
}

/// Expand directories into the assembly files under them
pub fn collect_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = vec![];
    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = WalkDir::new(input)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|e| e.is_file() && e.extension().map_or(false, |ex| ex == EXTENSION))
            .collect();
        found.sort();
        files.append(&mut found);
    }
    files
}

/// Check every file on `jobs` worker threads, returning outcomes in the order of `files`
///
/// Each file gets its own pipeline, so workers share nothing but the queue.
pub fn check_all(
    files: &[PathBuf],
    owner: &str,
    settings: PipelineSettings,
    jobs: usize,
) -> Vec<CheckOutcome> {
    let next = AtomicUsize::new(0);
    let outcomes: Mutex<Vec<(usize, CheckOutcome)>> = Mutex::new(Vec::with_capacity(files.len()));

    thread::scope(|scope| {
        for worker in 0..jobs.max(1).min(files.len().max(1)) {
            let next = &next;
            let outcomes = &outcomes;
            scope.spawn(move || loop {
                let idx = next.fetch_add(1, Ordering::Relaxed);
                let file = match files.get(idx) {
                    Some(file) => file,
                    None => break,
                };
                log::debug!("Worker {} checking {:?}", worker, file);
                let outcome = check_file(file, owner, settings);
                if let Ok(mut outcomes) = outcomes.lock() {
                    outcomes.push((idx, outcome));
                }
            });
        }
    });

    let mut outcomes = outcomes.into_inner().unwrap_or_else(|err| err.into_inner());
    outcomes.sort_by_key(|(idx, _)| *idx);
    outcomes.into_iter().map(|(_, outcome)| outcome).collect()
}

pub fn check_file(file: &Path, owner: &str, settings: PipelineSettings) -> CheckOutcome {
    let text = match fs::read_to_string(file) {
        Ok(text) => text,
        Err(err) => return CheckOutcome::Error(err),
    };

    let collector = Collector::default();
    let mut pipeline = AssemblerPipeline::new(owner);
    pipeline.set_settings(settings);
    pipeline.add_listener(Box::new(collector.clone()));
    pipeline.set_text(text);
    pipeline.update_ast(settings.use_prefixed_keywords);
    pipeline.validate_ast();
    if pipeline.last_unit().is_some() {
        pipeline.generate_class();
    }

    let diagnostics = collector.take();
    if diagnostics.is_empty() {
        CheckOutcome::Ok
    } else {
        CheckOutcome::Fail(diagnostics)
    }
}
