use async_trait::async_trait;
use log::{debug, error, warn};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

use super::{GenerationBackend, GenerationRequest, GenerationResult};
use crate::app_config::BackendConfig;
use crate::errors::BackendError;

static FENCED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[ \t]*(?:python3?|py)?[ \t]*\n(.*?)```").unwrap());
static ANSWER_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:here is|here's|fixed code|python code|code)[^\n]*:\s*\n").unwrap());

const SYSTEM_PROMPT: &str = "You are an expert Python programmer. Translate instructions into \
correct, idiomatic Python. Answer with code only, inside a single ```python fenced block.";

/// Generate request for the Ollama API
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    system: &'a str,
    options: GenerateOptions,
    stream: bool,
}

/// Sampling options for the Ollama API
#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    num_predict: u32,
}

/// Generate response from the Ollama API
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

impl GenerateResponse {
    fn tokens(&self) -> u64 {
        self.prompt_eval_count.unwrap_or(0) + self.eval_count.unwrap_or(0)
    }
}

/// Backend talking to a local Ollama server over HTTP
#[derive(Debug)]
pub struct OllamaBackend {
    config: BackendConfig,
    base_url: Url,
    client: Client,
    initialized: AtomicBool,
    tokens_used: AtomicU64,
}

impl OllamaBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let base_url = normalize_endpoint(&config.endpoint)?;
        let client = Client::builder()
            .timeout(config.timeout())
            // Ollama speaks HTTP/1.1
            .http1_only()
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| BackendError::ConnectionError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config: config.clone(),
            base_url,
            client,
            initialized: AtomicBool::new(false),
            tokens_used: AtomicU64::new(0),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Tokens reported by the server across all calls
    pub fn tokens_used(&self) -> u64 {
        self.tokens_used.load(Ordering::Relaxed)
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::RequestFailed(format!("Invalid endpoint path '{}': {}", path, e)))
    }

    fn ensure_initialized(&self) -> Result<(), BackendError> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::NotInitialized(self.name().to_string()))
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.config.timeout_seconds)
        } else if e.is_connect() {
            BackendError::ConnectionError(format!("Failed to reach Ollama at {}: {}", self.base_url, e))
        } else {
            BackendError::RequestFailed(e.to_string())
        }
    }

    /// POSTs to /api/generate, retrying server and network errors with
    /// exponential backoff. Client errors are returned immediately.
    async fn generate(&self, prompt: String, request: &GenerationRequest) -> Result<GenerateResponse, BackendError> {
        let url = self.endpoint("api/generate")?;
        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            system: SYSTEM_PROMPT,
            options: GenerateOptions {
                temperature: request.temperature,
                top_p: request.top_p,
                top_k: request.top_k,
                num_predict: request.max_tokens,
            },
            stream: false,
        };

        let max_retries = self.config.retry_count;
        let mut attempt = 0;
        let mut last_error = None;

        while attempt <= max_retries {
            match self.client.post(url.clone()).json(&body).send().await {
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.map_err(|e| self.map_send_error(e))?;
                    if status.is_success() {
                        let parsed = parse_generate_response(&text)?;
                        self.tokens_used.fetch_add(parsed.tokens(), Ordering::Relaxed);
                        return Ok(parsed);
                    }
                    let api_error = BackendError::ApiError { status_code: status.as_u16(), message: text };
                    if !status.is_server_error() {
                        error!("Ollama API error: {}", api_error);
                        return Err(api_error);
                    }
                    error!("Ollama API error: {} - attempt {}/{}", api_error, attempt + 1, max_retries + 1);
                    last_error = Some(api_error);
                }
                Err(e) => {
                    let send_error = self.map_send_error(e);
                    error!("Ollama request failed: {} - attempt {}/{}", send_error, attempt + 1, max_retries + 1);
                    last_error = Some(send_error);
                }
            }

            attempt += 1;
            if attempt <= max_retries {
                let backoff_ms = self.config.retry_backoff_ms.saturating_mul(1u64 << (attempt - 1).min(16));
                // Up to 10% jitter
                let jitter_ms = rand::rng().random_range(0..=backoff_ms / 10);
                tokio::time::sleep(Duration::from_millis(backoff_ms + jitter_ms)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BackendError::RequestFailed(format!("Ollama request failed after {} attempts", max_retries + 1))
        }))
    }
}

/// Accepts `host`, `host:port` or a full URL; the default port is 11434
fn normalize_endpoint(endpoint: &str) -> Result<Url, BackendError> {
    let endpoint = endpoint.trim().trim_end_matches('/');
    let with_scheme = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    };
    let mut url = Url::parse(&format!("{}/", with_scheme))
        .map_err(|e| BackendError::ConnectionError(format!("Invalid Ollama endpoint '{}': {}", endpoint, e)))?;
    if url.port().is_none() && !endpoint.starts_with("https://") {
        url.set_port(Some(11434))
            .map_err(|_| BackendError::ConnectionError(format!("Invalid Ollama endpoint '{}'", endpoint)))?;
    }
    Ok(url)
}

/// Parses a single JSON answer, falling back to a streamed JSONL body
fn parse_generate_response(text: &str) -> Result<GenerateResponse, BackendError> {
    match serde_json::from_str::<GenerateResponse>(text) {
        Ok(response) => Ok(response),
        Err(e) => {
            let lines: Vec<GenerateResponse> = text
                .lines()
                .filter(|line| !line.trim().is_empty())
                .filter_map(|line| serde_json::from_str(line).ok())
                .collect();
            if lines.is_empty() {
                let preview: String = text.chars().take(500).collect();
                error!("Failed to parse Ollama response: {}. Raw response (first 500 chars): {}", e, preview);
                return Err(BackendError::ParseError(e.to_string()));
            }
            debug!("Joined {} streamed response chunks", lines.len());
            let response = lines.iter().map(|chunk| chunk.response.as_str()).collect();
            let last = lines.last();
            Ok(GenerateResponse {
                response,
                prompt_eval_count: last.and_then(|chunk| chunk.prompt_eval_count),
                eval_count: last.and_then(|chunk| chunk.eval_count),
            })
        }
    }
}

fn translation_prompt(instruction: &str, request: &GenerationRequest, context: Option<&str>) -> String {
    let mut prompt = format!("Translate this instruction into {}:\n{}\n", request.target_language, instruction.trim());
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!(
            "\nIt continues this existing code; reuse its names and do not repeat it:\n```python\n{}\n```\n",
            context.trim_end()
        ));
    }
    prompt.push_str("\nRequirements:\n");
    if request.follow_conventions {
        prompt.push_str("- Follow PEP 8 naming and layout\n");
    }
    if request.use_type_hints {
        prompt.push_str("- Add type hints to function signatures\n");
    }
    if request.include_comments {
        prompt.push_str("- Add brief comments where the intent is not obvious\n");
    } else {
        prompt.push_str("- Do not add comments\n");
    }
    prompt.push_str("- Return only the code\n");
    prompt
}

fn refinement_prompt(code: &str, errors: &[String]) -> String {
    let listed: Vec<String> = errors.iter().map(|e| format!("- {}", e)).collect();
    format!(
        "Fix the following Python code based on the errors.\n\nCode:\n```python\n{}\n```\n\nErrors:\n{}\n\nReturn the complete fixed code.",
        code.trim_end(),
        listed.join("\n")
    )
}

/// Code inside fenced blocks, or the whole answer without a lead-in line
pub fn extract_code(answer: &str) -> String {
    let fenced: Vec<&str> = FENCED_CODE
        .captures_iter(answer)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim_end()))
        .filter(|code| !code.trim().is_empty())
        .collect();
    if !fenced.is_empty() {
        return fenced.join("\n\n");
    }
    let stripped = ANSWER_PREFIX.replace(answer, "");
    stripped.trim_matches('\n').trim_end().replace("```", "")
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    /// Checks that the server answers and lists models
    async fn initialize(&self) -> Result<(), BackendError> {
        let url = self.endpoint("api/tags")?;
        let response = self.client.get(url).send().await.map_err(|e| self.map_send_error(e))?;
        if !response.status().is_success() {
            return Err(BackendError::ApiError {
                status_code: response.status().as_u16(),
                message: "Ollama did not list its models".to_string(),
            });
        }
        let tags: serde_json::Value = response.json().await.map_err(|e| BackendError::ParseError(e.to_string()))?;
        let has_model = tags
            .get("models")
            .and_then(|models| models.as_array())
            .is_some_and(|models| {
                models.iter().any(|m| m.get("name").and_then(|n| n.as_str()) == Some(self.config.model.as_str()))
            });
        if !has_model {
            warn!("Model '{}' is not listed by Ollama; it may be pulled on first use", self.config.model);
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn translate(
        &self,
        instruction: &str,
        request: &GenerationRequest,
        context: Option<&str>,
    ) -> Result<GenerationResult, BackendError> {
        self.ensure_initialized()?;
        self.validate_input(instruction)?;
        let response = self.generate(translation_prompt(instruction, request, context), request).await?;
        let code = extract_code(&response.response);
        if code.trim().is_empty() {
            return Ok(GenerationResult::failed("Backend returned no code"));
        }
        Ok(GenerationResult::ok(code, response.tokens()))
    }

    async fn refine(
        &self,
        code: &str,
        errors: &[String],
        request: &GenerationRequest,
    ) -> Result<GenerationResult, BackendError> {
        self.ensure_initialized()?;
        let response = self.generate(refinement_prompt(code, errors), request).await?;
        let refined = extract_code(&response.response);
        if refined.trim().is_empty() {
            return Ok(GenerationResult::failed("Backend returned no code"));
        }
        Ok(GenerationResult::ok(refined, response.tokens()))
    }

    async fn shutdown(&self) -> Result<(), BackendError> {
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_should_get_scheme_and_default_port() {
        assert_eq!(normalize_endpoint("localhost").unwrap().as_str(), "http://localhost:11434/");
        assert_eq!(normalize_endpoint("http://10.0.0.2:8080/").unwrap().as_str(), "http://10.0.0.2:8080/");
    }

    #[test]
    fn test_extract_code_should_prefer_fenced_blocks() {
        let answer = "Here is the code:\n```python\ndef add(a, b):\n    return a + b\n```\nThat adds.";
        assert_eq!(extract_code(answer), "def add(a, b):\n    return a + b");
        assert_eq!(extract_code("Fixed code:\nx = 1\n"), "x = 1");
        assert_eq!(extract_code("```\ny = 2\n```"), "y = 2");
    }

    #[test]
    fn test_streamed_response_should_be_joined() {
        let body = "{\"response\":\"x = \",\"done\":false}\n{\"response\":\"1\",\"done\":true,\"eval_count\":3}\n";
        let parsed = parse_generate_response(body).unwrap();
        assert_eq!(parsed.response, "x = 1");
        assert_eq!(parsed.tokens(), 3);
        assert!(matches!(parse_generate_response("not json"), Err(BackendError::ParseError(_))));
    }

    #[test]
    fn test_prompt_should_carry_context_and_options() {
        let request = GenerationRequest { use_type_hints: false, ..GenerationRequest::default() };
        let prompt = translation_prompt("add a and b", &request, Some("a = 1"));
        assert!(prompt.contains("add a and b"));
        assert!(prompt.contains("```python\na = 1\n```"));
        assert!(!prompt.contains("type hints"));
        let refine = refinement_prompt("print(y)", &["Undefined name 'y'".to_string()]);
        assert!(refine.contains("- Undefined name 'y'"));
    }

    #[tokio::test]
    async fn test_translate_before_initialize_should_fail() {
        let backend = OllamaBackend::new(&BackendConfig::default()).unwrap();
        let result = backend.translate("set x to 1", &GenerationRequest::default(), None).await;
        assert!(matches!(result, Err(BackendError::NotInitialized(_))));
    }

    #[tokio::test]
    async fn test_initialize_against_closed_port_should_fail() {
        let config = BackendConfig { endpoint: "http://127.0.0.1:9".to_string(), retry_count: 0, ..BackendConfig::default() };
        let backend = OllamaBackend::new(&config).unwrap();
        assert!(backend.initialize().await.is_err());
    }
}
