/*!
 * Batch translation processing.
 *
 * Independent documents are translated concurrently by a bounded pool of
 * workers sharing one [`TranslationManager`]. Each document still runs its
 * pipeline end to end on a single worker, and results are returned in
 * input order.
 */

use anyhow::{Context, Result, anyhow};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use walkdir::WalkDir;

use super::manager::TranslationManager;
use super::result::TranslationResult;
use crate::errors::TranslatorError;

/// Extensions picked up when walking an input directory
pub const INPUT_EXTENSIONS: &[&str] = &["txt", "pseudo", "md"];

/// One translated document of a batch
#[derive(Debug)]
pub struct BatchOutcome {
    /// Position in the input
    pub index: usize,
    /// Path or caller-supplied label of the document
    pub source: PathBuf,
    pub result: Result<TranslationResult, TranslatorError>,
    /// Where the generated code was written, if it was
    pub output: Option<PathBuf>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(result) if result.success)
    }
}

/// Outcomes of a batch in input order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} document(s): {} succeeded, {} failed in {} ms",
            self.outcomes.len(),
            self.succeeded(),
            self.failed(),
            self.duration_ms
        )
    }
}

/// Bounded worker pool over a shared manager
pub struct BatchTranslator {
    manager: Arc<TranslationManager>,
    workers: usize,
    show_progress: bool,
}

impl BatchTranslator {
    /// `workers` is clamped to at least one
    pub fn new(manager: Arc<TranslationManager>, workers: usize) -> Self {
        Self { manager, workers: workers.max(1), show_progress: false }
    }

    /// Draws a progress bar on stderr while the batch runs
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Translates in-memory documents; the returned results follow input order
    pub async fn translate_texts(&self, documents: &[String]) -> Vec<TranslationResult> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let progress = self.progress_bar(documents.len(), "documents");

        let mut results = stream::iter(documents.iter().enumerate())
            .map(|(index, text)| {
                let manager = self.manager.clone();
                let semaphore = semaphore.clone();
                let progress = progress.clone();
                async move {
                    let _permit = semaphore.acquire().await.ok();
                    let result = manager.translate_text(text).await;
                    progress.inc(1);
                    (index, result)
                }
            })
            .buffer_unordered(self.workers)
            .collect::<Vec<_>>()
            .await;

        progress.finish_and_clear();
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    /// Translates files; a file that cannot be read yields an `Err` outcome
    pub async fn translate_files(&self, paths: &[PathBuf]) -> BatchReport {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let progress = self.progress_bar(paths.len(), "files");

        let mut outcomes = stream::iter(paths.iter().enumerate())
            .map(|(index, path)| {
                let manager = self.manager.clone();
                let semaphore = semaphore.clone();
                let progress = progress.clone();
                async move {
                    let _permit = semaphore.acquire().await.ok();
                    progress.set_message(file_label(path));
                    let result = manager.translate_file(path).await;
                    match &result {
                        Ok(translation) if translation.success => {
                            info!("Translated {}: {}", path.display(), translation.summary());
                        }
                        Ok(translation) => warn!("{}: {}", path.display(), translation.summary()),
                        Err(e) => error!("Could not translate {}: {}", path.display(), e),
                    }
                    progress.inc(1);
                    BatchOutcome { index, source: path.clone(), result, output: None }
                }
            })
            .buffer_unordered(self.workers)
            .collect::<Vec<_>>()
            .await;

        progress.finish_and_clear();
        outcomes.sort_by_key(|outcome| outcome.index);
        BatchReport { outcomes, duration_ms: started.elapsed().as_millis() as u64 }
    }

    /// Translates every input file under `input_dir` and writes the code of
    /// successful translations to `output_dir`, mirroring the directory
    /// layout with a `.py` extension
    pub async fn translate_directory(&self, input_dir: &Path, output_dir: &Path) -> Result<BatchReport> {
        let inputs = collect_inputs(input_dir)?;
        if inputs.is_empty() {
            return Err(anyhow!("No input files found in directory: {}", input_dir.display()));
        }
        info!(
            "Translating {} file(s) from {} with {} worker(s)",
            inputs.len(),
            input_dir.display(),
            self.workers
        );

        let mut report = self.translate_files(&inputs).await;
        for outcome in &mut report.outcomes {
            let Ok(result) = &outcome.result else {
                continue;
            };
            let Some(code) = result.code.as_deref().filter(|_| result.success) else {
                continue;
            };
            let target = output_path(input_dir, output_dir, &outcome.source);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            tokio::fs::write(&target, code)
                .await
                .with_context(|| format!("Failed to write file: {}", target.display()))?;
            outcome.output = Some(target);
        }

        info!("{}", report.summary());
        Ok(report)
    }

    fn progress_bar(&self, len: usize, unit: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        let template = format!(
            "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{percent}}%) {{msg}}",
            unit
        );
        let style = ProgressStyle::default_bar()
            .template(&template)
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style.progress_chars("█▓▒░"));
        bar
    }
}

fn file_label(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
}

fn is_input_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| INPUT_EXTENSIONS.iter().any(|known| ext.to_string_lossy().eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Input files under `dir`, sorted by path
pub fn collect_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(anyhow!("Not a directory: {}", dir.display()));
    }
    let mut inputs = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.context("Failed to read directory entry")?;
        let path = entry.path();
        if path.is_file() && is_input_file(path) {
            inputs.push(path.to_path_buf());
        }
    }
    inputs.sort();
    Ok(inputs)
}

/// `input` relocated under `output_dir` with a `.py` extension
pub fn output_path(input_dir: &Path, output_dir: &Path, input: &Path) -> PathBuf {
    let relative = input
        .strip_prefix(input_dir)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| PathBuf::from(input.file_name().unwrap_or_default()));
    output_dir.join(relative).with_extension("py")
}
