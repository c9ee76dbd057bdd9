/*!
 * Translation orchestration.
 *
 * A call moves through parsing, block processing, dependency resolution,
 * assembly and validation, with a single repair attempt when validation
 * fails. Every call returns a [`TranslationResult`]: parsing and assembly
 * failures end the call early, while a block the backend cannot translate
 * is flagged and skipped.
 */

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::context::ContextWindow;
use super::dependencies;
use super::result::{Stage, TranslationResult};
use crate::app_config::Config;
use crate::assembler::CodeAssembler;
use crate::backends::{BackendRegistry, GenerationBackend, GenerationRequest, GenerationResult};
use crate::blocks::{BlockParser, BlockType, CodeBlock, meta};
use crate::cache::{AstCache, AstCacheConfig};
use crate::errors::{BackendError, ParsingError, TranslatorError};
use crate::validation::{ValidationResult, Validator};

const BLOCK_FAILURE_SUGGESTIONS: [&str; 3] = [
    "Simplify the instruction",
    "Check for ambiguous language",
    "Break down complex requirements",
];
const SUB_BLOCK_SUGGESTION: &str = "Separate English and Python parts";
const REVIEW_SUGGESTION: &str = "Rephrase the instructions around the reported lines and translate again";
const AUTO_FIX_WARNING: &str = "Could not auto-fix validation errors";

/// Runs the translation pipeline against one generation backend
pub struct TranslationManager {
    config: Config,
    backend: Arc<dyn GenerationBackend>,
    cache: Arc<AstCache>,
    parser: BlockParser,
    assembler: CodeAssembler,
    validator: Validator,
    context: ContextWindow,
    request: GenerationRequest,
    last_id: Mutex<u64>,
    backend_ready: tokio::sync::Mutex<bool>,
}

impl std::fmt::Debug for TranslationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationManager")
            .field("backend", &self.backend.name())
            .field("cache_entries", &self.cache.len())
            .finish()
    }
}

impl TranslationManager {
    pub fn new(config: Config, backend: Arc<dyn GenerationBackend>, cache: Arc<AstCache>) -> Self {
        Self {
            parser: BlockParser::new(cache.clone(), &config),
            assembler: CodeAssembler::new(cache.clone(), &config),
            validator: Validator::new(cache.clone(), &config),
            context: ContextWindow::new(&config.heuristics, config.max_context_length),
            request: GenerationRequest::from_config(&config),
            last_id: Mutex::new(0),
            backend_ready: tokio::sync::Mutex::new(false),
            config,
            backend,
            cache,
        }
    }

    /// Validates `config`, then builds the cache and the configured backend
    pub fn from_config(config: Config, registry: &BackendRegistry) -> Result<Self, TranslatorError> {
        config.validate()?;
        let cache = Arc::new(AstCache::new(AstCacheConfig::from(&config.cache)));
        let backend = registry.create(&config.backend)?;
        info!(
            "Using backend '{}' with model '{}'",
            backend.name(),
            config.backend.model
        );
        Ok(Self::new(config, backend, cache))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn GenerationBackend> {
        &self.backend
    }

    pub fn cache(&self) -> &Arc<AstCache> {
        &self.cache
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn assembler(&self) -> &CodeAssembler {
        &self.assembler
    }

    /// Initializes the backend and starts the cache's background tasks.
    /// Translation calls initialize the backend lazily when this is skipped.
    pub async fn initialize(&self) -> Result<(), TranslatorError> {
        if self.cache.start_background_tasks() {
            debug!("AST cache background tasks started");
        }
        self.ensure_backend().await?;
        Ok(())
    }

    /// Stops the backend and the cache tasks; the cache is saved if persistent
    pub async fn shutdown(&self) {
        let mut ready = self.backend_ready.lock().await;
        if *ready {
            if let Err(e) = self.backend.shutdown().await {
                warn!("Backend '{}' did not shut down cleanly: {}", self.backend.name(), e);
            }
            *ready = false;
        }
        self.cache.shutdown().await;
        info!("Translation manager shut down");
    }

    pub async fn translate_text(&self, text: &str) -> TranslationResult {
        self.translate_with_cancellation(text, CancellationToken::new()).await
    }

    pub async fn translate_file(&self, path: impl AsRef<Path>) -> Result<TranslationResult, TranslatorError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TranslatorError::with_cause(format!("Failed to read {}", path.display()), e))?;
        Ok(self.translate_text(&text).await)
    }

    /// Translates `text`; cancelling `cancel` fails the block in flight and
    /// every block after it, then the call finishes with what it has
    pub async fn translate_with_cancellation(&self, text: &str, cancel: CancellationToken) -> TranslationResult {
        let started = Instant::now();
        let hits_before = self.cache.stats().hits;
        let mut result = TranslationResult::new(self.next_id(), self.backend.name());

        if let Err((stage, err)) = self.run(text, &cancel, &mut result).await {
            Self::fail(&mut result, stage, err);
        }

        result.metadata.cache_hits = self.cache.stats().hits.saturating_sub(hits_before);
        result.metadata.duration_ms = started.elapsed().as_millis() as u64;
        info!("[#{}] {}", result.id, result.summary());
        result
    }

    fn next_id(&self) -> u64 {
        let mut last = self.last_id.lock();
        *last += 1;
        *last
    }

    async fn ensure_backend(&self) -> Result<(), BackendError> {
        let mut ready = self.backend_ready.lock().await;
        if !*ready {
            self.backend.initialize().await?;
            *ready = true;
            info!("Backend '{}' initialized", self.backend.name());
        }
        Ok(())
    }

    async fn run(
        &self,
        text: &str,
        cancel: &CancellationToken,
        result: &mut TranslationResult,
    ) -> Result<(), (Stage, TranslatorError)> {
        Self::enter(result, Stage::Parsing);
        let mut blocks = self.parse_blocks(text, result).map_err(|e| (Stage::Parsing, e))?;

        Self::enter(result, Stage::BlockProcessing);
        self.process_blocks(&mut blocks, cancel, result).await;

        Self::enter(result, Stage::DependencyResolution);
        result.warnings.extend(dependencies::resolve(&mut blocks, &self.cache));

        Self::enter(result, Stage::Assembly);
        let assembled = self
            .assembler
            .assemble(&blocks)
            .map_err(|e| (Stage::Assembly, TranslatorError::from(e)))?;
        result.warnings.extend(assembled.warnings);

        Self::enter(result, Stage::Validation);
        let code = assembled.code;
        let validation = self.validator.validate_all(&code);
        if validation.is_valid() {
            self.accept(result, code, validation);
            return Ok(());
        }
        if code.trim().is_empty() || cancel.is_cancelled() {
            Self::reject(result, code, validation);
            return Ok(());
        }

        Self::enter(result, Stage::Repair);
        match self.repair(&code, &validation, cancel, result).await {
            Some((refined, revalidation)) => {
                info!("[#{}] Repaired code passed validation", result.id);
                result.metadata.repaired = true;
                self.accept(result, refined, revalidation);
            }
            None => {
                result.warnings.push(AUTO_FIX_WARNING.to_string());
                Self::reject(result, code, validation);
            }
        }
        Ok(())
    }

    fn enter(result: &mut TranslationResult, stage: Stage) {
        result.metadata.stage = stage;
        debug!("[#{}] Stage: {}", result.id, stage);
    }

    /// Segments the input and splits mixed blocks into sub-blocks
    fn parse_blocks(&self, text: &str, result: &mut TranslationResult) -> Result<Vec<CodeBlock>, TranslatorError> {
        if text.trim().is_empty() {
            return Err(ParsingError {
                message: "Input is empty".to_string(),
                line: 1,
                column: 0,
                snippet: None,
            }
            .into());
        }

        let mut parsed = self.parser.parse(text);
        result.warnings.append(&mut parsed.warnings);
        if !parsed.success() {
            let mut errors = parsed.errors.into_iter();
            let first = errors.next().map(TranslatorError::from);
            result.errors.extend(errors.map(|e| e.to_string()));
            return Err(first.unwrap_or_else(|| TranslatorError::other("Input could not be segmented")));
        }

        let mut blocks = Vec::with_capacity(parsed.blocks.len());
        for block in parsed.blocks {
            if block.block_type == BlockType::Mixed {
                let parts = self.parser.split_mixed(&block);
                debug!(
                    "[#{}] Mixed block at lines {}-{} split into {} parts",
                    result.id,
                    block.line_range.0,
                    block.line_range.1,
                    parts.len()
                );
                blocks.extend(parts);
            } else {
                blocks.push(block);
            }
        }
        result.metadata.blocks_total = blocks.len();
        Ok(blocks)
    }

    async fn process_blocks(&self, blocks: &mut [CodeBlock], cancel: &CancellationToken, result: &mut TranslationResult) {
        let pending = blocks.iter().filter(|b| b.needs_translation()).count();
        if pending > 0 {
            info!("[#{}] Translating {} of {} blocks", result.id, pending, blocks.len());
        }

        for index in 0..blocks.len() {
            if !blocks[index].needs_translation() {
                continue;
            }
            if cancel.is_cancelled() {
                result.metadata.cancelled = true;
                Self::mark_failed(&mut blocks[index], "Translation cancelled", result);
                continue;
            }

            let context = self.context.build(blocks, index);
            let instruction = blocks[index].text().to_string();
            debug!(
                "[#{}] Block {} (lines {}-{}), {} context chars",
                result.id,
                index,
                blocks[index].line_range.0,
                blocks[index].line_range.1,
                context.as_deref().map(str::len).unwrap_or(0)
            );

            match self.translate_block(&instruction, context.as_deref(), cancel).await {
                Ok(generated) => {
                    let block = &mut blocks[index];
                    let original_type = block.block_type.to_string();
                    block.set_meta(meta::ORIGINAL_TYPE, original_type);
                    block.set_meta(meta::TRANSLATED, true);
                    block.block_type = BlockType::TargetCode;
                    block.content = format!("{}\n", generated.code.trim_end());
                    result.metadata.blocks_translated += 1;
                    result.metadata.tokens_used += generated.tokens_used;
                }
                Err(e) => {
                    if cancel.is_cancelled() {
                        result.metadata.cancelled = true;
                    }
                    Self::mark_failed(&mut blocks[index], &e.to_string(), result);
                }
            }
        }
    }

    /// One backend call bounded by the configured timeout and `cancel`
    async fn translate_block(
        &self,
        instruction: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, TranslatorError> {
        self.ensure_backend().await?;
        let timeout = self.config.backend.timeout();
        let call = tokio::time::timeout(timeout, self.backend.translate(instruction, &self.request, context));

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(TranslatorError::other("Translation cancelled")),
            outcome = call => outcome,
        };
        let generated = outcome.map_err(|_| BackendError::Timeout(timeout.as_secs()))??;

        if !generated.success {
            let reason = generated
                .errors
                .first()
                .cloned()
                .unwrap_or_else(|| "backend reported a failure".to_string());
            return Err(BackendError::RequestFailed(reason).into());
        }
        if generated.code.trim().is_empty() {
            return Err(BackendError::ParseError("backend returned no code".to_string()).into());
        }
        Ok(generated)
    }

    fn mark_failed(block: &mut CodeBlock, reason: &str, result: &mut TranslationResult) {
        let (start, end) = block.line_range;
        warn!("[#{}] Failed to translate block at lines {}-{}: {}", result.id, start, end, reason);
        block.set_meta(meta::TRANSLATION_FAILED, true);
        block.set_meta(meta::ERROR, reason);

        result.warnings.push(format!("Failed to translate block at lines {}-{}: {}", start, end, reason));
        result.metadata.blocks_failed += 1;
        for suggestion in BLOCK_FAILURE_SUGGESTIONS {
            result.add_suggestion(suggestion);
        }
        if block.is_sub_block() {
            result.add_suggestion(SUB_BLOCK_SUGGESTION);
        }
    }

    /// Asks the backend once to fix `code`. Returns the refined code only
    /// when it passes a second validation.
    async fn repair(
        &self,
        code: &str,
        validation: &ValidationResult,
        cancel: &CancellationToken,
        result: &mut TranslationResult,
    ) -> Option<(String, ValidationResult)> {
        if let Err(e) = self.ensure_backend().await {
            warn!("[#{}] Skipping repair: {}", result.id, e);
            return None;
        }

        let errors = validation.top_errors(self.config.heuristics.repair_error_count);
        let request = self.request.clone().with_temperature(self.config.heuristics.repair_temperature);
        let timeout = self.config.backend.timeout();
        info!("[#{}] Requesting repair for {} error(s)", result.id, errors.len());

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                result.metadata.cancelled = true;
                return None;
            }
            outcome = tokio::time::timeout(timeout, self.backend.refine(code, &errors, &request)) => outcome,
        };

        let refined = match outcome {
            Ok(Ok(refined)) if refined.success && !refined.code.trim().is_empty() => refined,
            Ok(Ok(refined)) => {
                warn!("[#{}] Repair returned no usable code: {:?}", result.id, refined.errors);
                return None;
            }
            Ok(Err(e)) => {
                warn!("[#{}] Repair request failed: {}", result.id, e);
                return None;
            }
            Err(_) => {
                warn!("[#{}] Repair request timed out after {} seconds", result.id, timeout.as_secs());
                return None;
            }
        };
        result.metadata.tokens_used += refined.tokens_used;

        let code = format!("{}\n", refined.code.trim_end());
        let revalidation = self.validator.validate_all(&code);
        if revalidation.is_valid() {
            Some((code, revalidation))
        } else {
            debug!(
                "[#{}] Repaired code still has {} error(s)",
                result.id,
                revalidation.errors.len()
            );
            None
        }
    }

    fn accept(&self, result: &mut TranslationResult, code: String, validation: ValidationResult) {
        result.warnings.extend(validation.warnings);
        for suggestion in validation.suggestions {
            result.add_suggestion(suggestion);
        }
        for suggestion in self.validator.suggest_improvements(&code) {
            result.add_suggestion(suggestion);
        }
        result.metadata.validation_passed = true;
        result.metadata.stage = Stage::Done;
        result.success = true;
        result.code = Some(code);
    }

    /// Surfaces the validation errors; non-empty code is kept for inspection
    fn reject(result: &mut TranslationResult, code: String, validation: ValidationResult) {
        error!(
            "[#{}] Generated code failed validation with {} error(s)",
            result.id,
            validation.errors.len()
        );
        result.errors.extend(validation.errors);
        result.warnings.extend(validation.warnings);
        for suggestion in validation.suggestions {
            result.add_suggestion(suggestion);
        }
        if result.suggestions.is_empty() {
            result.add_suggestion(REVIEW_SUGGESTION);
        }
        result.success = false;
        result.code = if code.trim().is_empty() { None } else { Some(code) };
        result.metadata.stage = Stage::Failed;
        result.metadata.failed_stage = Some(Stage::Validation);
    }

    fn fail(result: &mut TranslationResult, stage: Stage, err: TranslatorError) {
        error!("[#{}] {} failed: {}", result.id, stage, err);
        result.errors.push(err.to_string());
        for suggestion in err.suggestions() {
            result.add_suggestion(suggestion);
        }
        result.success = false;
        result.metadata.stage = Stage::Failed;
        result.metadata.failed_stage = Some(stage);
    }
}
