/*!
 * Mock backend for tests and offline runs.
 *
 * - `MockBackend::working()` - translates a few common instruction shapes
 *   with fixed templates
 * - `MockBackend::fixed(code)` - always answers with the same code
 * - `MockBackend::failing()` - every call errors
 * - `MockBackend::intermittent(n)` - every n-th translate call errors
 * - `MockBackend::slow(ms)` - answers after a delay
 */

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::{GenerationBackend, GenerationRequest, GenerationResult};
use crate::errors::BackendError;

static BINARY_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)function (?:called|named) (\w+) that (?:returns|computes|calculates) the (sum|product|difference|quotient) of (\w+) and (\w+)",
    )
    .unwrap()
});
static PRINT_MESSAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)^\s*(?:print|display|show)\s+(?:the\s+message\s+)?["']?(.+?)["']?\s*$"#).unwrap());
static ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:set|assign|initialize)\s+(\w+)\s+to\s+(-?\d+(?:\.\d+)?|\w+)\s*$").unwrap());
static LIST_SUM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)function (?:called|named) (\w+) that (?:returns|computes) the (?:sum|total) of (?:a |the )?list").unwrap()
});

/// Behavior mode for the mock backend
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Template translations for common instructions
    Working,
    /// Always returns this code
    Fixed(String),
    /// Fails every Nth translate call
    Intermittent { fail_every: usize },
    /// Always fails with an error
    Failing,
    /// Reports success with no code
    Empty,
    /// Simulates a slow response (for timeout testing)
    Slow { delay_ms: u64 },
}

#[derive(Debug)]
pub struct MockBackend {
    behavior: MockBehavior,
    /// Code returned by `refine`; the input is echoed back when unset
    refinement: Option<String>,
    initialized: AtomicBool,
    translate_calls: Arc<AtomicUsize>,
    refine_calls: Arc<AtomicUsize>,
    last_context: Arc<Mutex<Option<String>>>,
}

impl MockBackend {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            refinement: None,
            initialized: AtomicBool::new(false),
            translate_calls: Arc::new(AtomicUsize::new(0)),
            refine_calls: Arc::new(AtomicUsize::new(0)),
            last_context: Arc::new(Mutex::new(None)),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn fixed(code: impl Into<String>) -> Self {
        Self::new(MockBehavior::Fixed(code.into()))
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every: fail_every.max(1) })
    }

    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Sets the code `refine` answers with
    pub fn with_refinement(mut self, code: impl Into<String>) -> Self {
        self.refinement = Some(code.into());
        self
    }

    pub fn translate_calls(&self) -> usize {
        self.translate_calls.load(Ordering::SeqCst)
    }

    pub fn refine_calls(&self) -> usize {
        self.refine_calls.load(Ordering::SeqCst)
    }

    /// Context passed to the most recent `translate` call
    pub fn last_context(&self) -> Option<String> {
        self.last_context.lock().clone()
    }

    fn ensure_initialized(&self) -> Result<(), BackendError> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::NotInitialized("mock".to_string()))
        }
    }

    /// Fixed template for the instruction, or a commented placeholder
    pub fn template_for(instruction: &str) -> String {
        let instruction = instruction.trim();
        if let Some(caps) = BINARY_FUNCTION.captures(instruction) {
            let operator = match &caps[2].to_lowercase()[..] {
                "sum" => "+",
                "product" => "*",
                "difference" => "-",
                _ => "/",
            };
            return format!(
                "def {}({}, {}):\n    return {} {} {}",
                &caps[1], &caps[3], &caps[4], &caps[3], operator, &caps[4]
            );
        }
        if let Some(caps) = LIST_SUM.captures(instruction) {
            return format!("def {}(items):\n    total = 0\n    for item in items:\n        total += item\n    return total", &caps[1]);
        }
        if let Some(caps) = ASSIGNMENT.captures(instruction) {
            return format!("{} = {}", &caps[1], &caps[2]);
        }
        if let Some(caps) = PRINT_MESSAGE.captures(instruction) {
            return format!("print({:?})", &caps[1]);
        }
        let summary = instruction.lines().next().unwrap_or_default();
        format!("# {}\npass", summary)
    }

    fn tokens_for(text: &str) -> u64 {
        text.split_whitespace().count() as u64
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn translate(
        &self,
        instruction: &str,
        _request: &GenerationRequest,
        context: Option<&str>,
    ) -> Result<GenerationResult, BackendError> {
        self.ensure_initialized()?;
        self.validate_input(instruction)?;
        let count = self.translate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_context.lock() = context.map(str::to_string);

        match &self.behavior {
            MockBehavior::Working => {
                let code = Self::template_for(instruction);
                let tokens = Self::tokens_for(instruction) + Self::tokens_for(&code);
                Ok(GenerationResult::ok(code, tokens))
            }
            MockBehavior::Fixed(code) => Ok(GenerationResult::ok(code.clone(), Self::tokens_for(code))),
            MockBehavior::Intermittent { fail_every } => {
                if count % fail_every == fail_every - 1 {
                    Err(BackendError::ApiError {
                        status_code: 503,
                        message: format!("Simulated intermittent failure (request #{})", count + 1),
                    })
                } else {
                    Ok(GenerationResult::ok(Self::template_for(instruction), 10))
                }
            }
            MockBehavior::Failing => Err(BackendError::ApiError {
                status_code: 500,
                message: "Simulated backend failure".to_string(),
            }),
            MockBehavior::Empty => Ok(GenerationResult::ok(String::new(), 0)),
            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                Ok(GenerationResult::ok(Self::template_for(instruction), 10))
            }
        }
    }

    async fn refine(
        &self,
        code: &str,
        errors: &[String],
        _request: &GenerationRequest,
    ) -> Result<GenerationResult, BackendError> {
        self.ensure_initialized()?;
        self.refine_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior == MockBehavior::Failing {
            return Err(BackendError::ApiError {
                status_code: 500,
                message: "Simulated backend failure".to_string(),
            });
        }
        let refined = self.refinement.clone().unwrap_or_else(|| code.to_string());
        let tokens = Self::tokens_for(&refined) + errors.len() as u64;
        Ok(GenerationResult::ok(refined, tokens))
    }

    async fn shutdown(&self) -> Result<(), BackendError> {
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }
}
