/*!
 * Tests for the validator service
 */

use pseudocode_translator::app_config::{Config, ValidationLevel};
use pseudocode_translator::validation::Validator;

use crate::common;

fn validator_with(config: Config) -> Validator {
    Validator::new(common::fresh_cache(), &config)
}

fn validator() -> Validator {
    validator_with(Config::default())
}

#[test]
fn test_validate_all_simple_function_should_pass() {
    let result = validator().validate_all("def add(a, b):\n    return a + b\n");
    assert!(result.is_valid(), "{:?}", result.errors);
    assert!(result.line_numbers.is_empty());
}

#[test]
fn test_loop_variable_used_after_loop_should_be_reported_once() {
    let result = validator().validate_syntax("for item in range(3):\n    print(item)\nprint(item)\n");
    assert_eq!(result.errors.len(), 1, "{:?}", result.errors);
    assert!(result.errors[0].contains("Undefined name 'item'"));
    assert_eq!(result.line_numbers, vec![3]);
}

#[test]
fn test_names_defined_anywhere_in_scope_chain_should_not_be_reported() {
    let code = concat!(
        "import os\n",
        "\n",
        "BASE = os.getcwd()\n",
        "\n",
        "def join(name):\n",
        "    return os.path.join(BASE, name)\n",
        "\n",
        "class Store:\n",
        "    def path(self, name):\n",
        "        return join(name)\n",
        "\n",
        "print(Store().path('x'), len([n for n in range(3)]))\n",
    );
    let result = validator().validate_all(code);
    assert!(result.is_valid(), "{:?}", result.errors);
}

#[test]
fn test_blank_and_comment_lines_inside_body_should_validate() {
    let code = concat!(
        "def total(items):\n",
        "    # running sum\n",
        "    result = 0\n",
        "\n",
        "    for item in items:\n",
        "        # skip negatives\n",
        "\n",
        "        if item > 0:\n",
        "            result += item\n",
        "    return result\n",
    );
    let result = validator().validate_syntax(code);
    assert!(result.is_valid(), "{:?}", result.errors);
}

#[test]
fn test_module_level_forward_call_should_validate() {
    let code = concat!(
        "def main():\n",
        "    return helper(2)\n",
        "\n",
        "\n",
        "def helper(n):\n",
        "    return n * 2\n",
        "\n",
        "\n",
        "main()\n",
    );
    let result = validator().validate_syntax(code);
    assert!(result.is_valid(), "{:?}", result.errors);
    assert!(result.line_numbers.is_empty());
}

#[test]
fn test_call_before_module_definition_should_still_fail() {
    let result = validator().validate_syntax("main()

def main():
    return 1
");
    assert!(!result.is_valid());
    assert_eq!(result.line_numbers, vec![1]);
}

#[test]
fn test_eval_call_should_fail_unless_allowed() {
    let code = "value = eval(input())\nprint(value)\n";
    let result = validator().validate_syntax(code);
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.contains("eval()")));

    let permissive = validator_with(Config { allow_unsafe_operations: true, ..Config::default() });
    assert!(permissive.validate_syntax(code).is_valid());
}

#[test]
fn test_syntax_error_should_report_line_and_suggestion() {
    let result = validator().validate_syntax("x = 1\nif x > 0\n    print(x)\n");
    assert!(!result.is_valid());
    assert_eq!(result.line_numbers, vec![2]);
    assert!(!result.suggestions.is_empty());
}

#[test]
fn test_logic_problems_should_only_warn() {
    let code = "def ratio(a):\n    return a / 0\n    print('done')\n\nwhile True:\n    print(ratio(1))\n";
    let result = validator().validate_all(code);
    assert!(result.is_valid(), "{:?}", result.errors);
    let joined = result.warnings.join("\n");
    assert!(joined.contains("Unreachable code"));
    assert!(joined.contains("division by zero"));
    assert!(joined.contains("infinite loop"));
}

#[test]
fn test_unused_local_should_warn_only_in_strict_mode() {
    let code = "def f():\n    scratch = 1\n    return 2\n";
    let normal = validator_with(Config { validation_level: ValidationLevel::Normal, ..Config::default() });
    assert!(!normal.validate_logic(code).warnings.iter().any(|w| w.contains("scratch")));

    let strict = validator_with(Config { validation_level: ValidationLevel::Strict, ..Config::default() });
    assert!(strict.validate_logic(code).warnings.iter().any(|w| w.contains("Unused variable 'scratch'")));
}

#[test]
fn test_suggest_improvements_on_broken_code_should_ask_for_fix() {
    let suggestions = validator().suggest_improvements("def f(:\n");
    assert_eq!(suggestions, vec!["Fix syntax errors before requesting improvements".to_string()]);
}
