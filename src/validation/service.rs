/*!
 * Validator service.
 *
 * Parses through the shared AST cache, dispatches to the syntax, logic and
 * suggestion passes and memoizes each result by check kind and content hash.
 */

use log::debug;
use std::sync::Arc;

use super::result_cache::{DEFAULT_CAPACITY, ResultCache, ResultCacheStats};
use super::{ValidationResult, logic, suggestions, syntax};
use crate::app_config::Config;
use crate::cache::AstCache;
use crate::python::{Module, ParseMode, SyntaxError};

/// Identifier used for validated code in the AST cache
const VALIDATED_FILENAME: &str = "<validated>";

pub struct Validator {
    config: Config,
    cache: Arc<AstCache>,
    results: ResultCache,
}

impl Validator {
    pub fn new(cache: Arc<AstCache>, config: &Config) -> Self {
        Self { config: config.clone(), cache, results: ResultCache::new(DEFAULT_CAPACITY) }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn parse(&self, code: &str) -> Result<Arc<Module>, SyntaxError> {
        self.cache.parse(code, VALIDATED_FILENAME, ParseMode::Exec)
    }

    /// Parse check plus indentation, scope, import, safety and smell checks
    pub fn validate_syntax(&self, code: &str) -> ValidationResult {
        let key = ResultCache::key("syntax", code);
        if let Some(cached) = self.results.get(&key) {
            return cached;
        }

        let mut result = ValidationResult::new();
        if code.trim().is_empty() {
            result.add_error("Empty code provided", None);
            return result;
        }

        match self.parse(code) {
            Ok(module) => syntax::SyntaxChecks::new(&self.config).run(code, &module, &mut result),
            Err(err) => {
                debug!("Syntax validation failed: {}", err);
                syntax::report_parse_failure(&err, &mut result);
            }
        }

        self.results.put(key, result.clone());
        result
    }

    /// Heuristic logic warnings; only an unparseable input yields an error
    pub fn validate_logic(&self, code: &str) -> ValidationResult {
        let key = ResultCache::key("logic", code);
        if let Some(cached) = self.results.get(&key) {
            return cached;
        }

        let mut result = ValidationResult::new();
        match self.parse(code) {
            Ok(module) => logic::check(&module, self.config.validation_level, &mut result),
            Err(err) => {
                result.add_error(
                    "Cannot perform logic validation on syntactically invalid code",
                    Some(err.line),
                );
                result.add_suggestion("Fix syntax errors first");
            }
        }

        self.results.put(key, result.clone());
        result
    }

    /// Syntax pass, then the logic pass when the syntax pass parsed the code
    pub fn validate_all(&self, code: &str) -> ValidationResult {
        let mut result = self.validate_syntax(code);
        if self.parse(code).is_ok() {
            result.merge(self.validate_logic(code));
        }
        result
    }

    pub fn suggest_improvements(&self, code: &str) -> Vec<String> {
        match self.parse(code) {
            Ok(module) => suggestions::suggest(&module, code),
            Err(_) => vec!["Fix syntax errors before requesting improvements".to_string()],
        }
    }

    pub fn cache_stats(&self) -> ResultCacheStats {
        self.results.stats()
    }

    pub fn clear_cache(&self) {
        self.results.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::AstCacheConfig;

    fn validator() -> Validator {
        Validator::new(Arc::new(AstCache::new(AstCacheConfig::default())), &Config::default())
    }

    #[test]
    fn test_undefined_name_should_invalidate() {
        let result = validator().validate_syntax("print(y)");
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("'y'"));
        assert_eq!(result.line_numbers, vec![1]);
    }

    #[test]
    fn test_valid_function_should_pass_all_checks() {
        let code = "def add(a, b):\n    return a + b\n";
        let result = validator().validate_all(code);
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_empty_code_should_be_error() {
        let result = validator().validate_syntax("  \n");
        assert_eq!(result.errors, vec!["Empty code provided".to_string()]);
    }

    #[test]
    fn test_syntax_error_should_carry_line_and_suggestions() {
        let result = validator().validate_syntax("def f()\n    return 1\n");
        assert!(!result.is_valid());
        assert!(result.errors[0].starts_with("Syntax error: expected ':'"));
        assert_eq!(result.line_numbers, vec![1]);
        assert!(!result.suggestions.is_empty());
    }

    #[test]
    fn test_logic_on_invalid_code_should_be_error() {
        let result = validator().validate_logic("if x\n");
        assert_eq!(result.errors[0], "Cannot perform logic validation on syntactically invalid code");
    }

    #[test]
    fn test_repeated_validation_should_hit_result_cache() {
        let validator = validator();
        validator.validate_syntax("x = 1\n");
        validator.validate_syntax("x = 1\n");
        let stats = validator.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.size, 1);
        validator.clear_cache();
        assert_eq!(validator.cache_stats().size, 0);
    }

    #[test]
    fn test_validate_all_should_merge_logic_warnings() {
        let code = "def f():\n    return 1\n    print('never')\n";
        let result = validator().validate_all(code);
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("Unreachable code")));
    }

    #[test]
    fn test_suggestions_on_broken_code_should_ask_for_fix() {
        assert_eq!(
            validator().suggest_improvements("def (:"),
            vec!["Fix syntax errors before requesting improvements".to_string()]
        );
    }
}
