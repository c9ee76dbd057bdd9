/*!
 * Text passes run over assembled code.
 *
 * Lines inside triple-quoted strings are never touched, so these passes
 * cannot change string contents.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::blocks::scoring::{Continuation, strip_comment};
use crate::errors::AssemblyError;

static EXCESS_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());
static DEDENT_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(else\s*:|elif\b|except\b|finally\s*:|case\b.*:$)").unwrap());
static TOP_LEVEL_DEFINITION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(@|def\s|async\s+def\s|class\s)").unwrap());

/// A source line and whether it lies inside a triple-quoted string
fn classify_lines(code: &str) -> Vec<(&str, bool)> {
    let mut continuation = Continuation::default();
    code.split('\n')
        .enumerate()
        .map(|(index, line)| {
            let in_string = continuation.open_string_line().is_some();
            continuation.feed(line, index + 1);
            (line, in_string)
        })
        .collect()
}

fn leading_width(line: &str, tab_width: usize) -> usize {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { tab_width } else { 1 })
        .sum()
}

pub fn normalize_line_endings(code: &str) -> String {
    code.replace("\r\n", "\n").replace('\r', "\n")
}

/// Collapses three or more consecutive blank lines into two
pub fn collapse_blank_lines(code: &str) -> String {
    EXCESS_BLANK_LINES.replace_all(code, "\n\n\n").into_owned()
}

/// Removes the common leading indentation of code lines
pub fn dedent(text: &str) -> String {
    let lines = classify_lines(text);
    let margin = lines
        .iter()
        .filter(|(line, in_string)| !in_string && !line.trim().is_empty())
        .map(|(line, _)| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|(line, in_string)| {
            if *in_string {
                line.to_string()
            } else if line.trim().is_empty() {
                String::new()
            } else {
                line[margin.min(line.len())..].to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Indents every non-blank code line by `width` spaces
pub fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    classify_lines(text)
        .into_iter()
        .map(|(line, in_string)| {
            if in_string || line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drops lines that hold only a comment, keeping a leading shebang
pub fn strip_full_line_comments(code: &str) -> String {
    classify_lines(code)
        .into_iter()
        .enumerate()
        .filter(|(index, (line, in_string))| {
            let trimmed = line.trim_start();
            *in_string || !trimmed.starts_with('#') || (*index == 0 && trimmed.starts_with("#!"))
        })
        .map(|(_, (line, _))| line)
        .collect::<Vec<_>>()
        .join("\n")
}

struct Level {
    original: usize,
    target: usize,
}

/// Rebuilds indentation with an explicit level stack.
///
/// A line ending in `:` opens a block one `indent_size` deeper than its
/// own level. Dedent keywords (`else`, `elif`, `except`, `finally`, `case`)
/// that sit at their block's body level are moved out one level. Lines
/// continuing an open bracket keep their offset relative to the line that
/// opened it. Well-formed code indented by `indent_size` comes back unchanged.
pub fn reindent(code: &str, indent_size: usize) -> Result<String, AssemblyError> {
    let mut output = Vec::new();
    let mut stack = vec![Level { original: 0, target: 0 }];
    let mut opens_block = false;
    let mut shift: isize = 0;
    let mut continuation = Continuation::default();

    for (index, raw) in code.split('\n').enumerate() {
        let in_string = continuation.open_string_line().is_some();
        let continued = continuation.is_open();
        continuation.feed(raw, index + 1);

        if in_string {
            output.push(raw.to_string());
            continue;
        }
        let content = raw.trim_start_matches([' ', '\t']);
        if content.is_empty() {
            output.push(String::new());
            continue;
        }
        let width = leading_width(raw, indent_size);

        if continued {
            let target = (width as isize + shift).max(0) as usize;
            output.push(format!("{}{}", " ".repeat(target), content));
            if !continuation.is_open() {
                opens_block = strip_comment(content).trim_end().ends_with(':');
            }
            continue;
        }

        if content.starts_with('#') {
            let target = comment_target(&stack, width, opens_block, indent_size);
            output.push(format!("{}{}", " ".repeat(target), content));
            continue;
        }

        let top_original = stack.last().map_or(0, |level| level.original);
        let top_target = stack.last().map_or(0, |level| level.target);
        let target = if opens_block {
            let body = top_target + indent_size;
            stack.push(Level { original: width, target: body });
            body
        } else if width > top_original {
            top_target
        } else {
            let mut dedented = false;
            while stack.len() > 1 && stack.last().is_some_and(|level| level.original > width) {
                stack.pop();
                dedented = true;
            }
            if !dedented && stack.len() > 1 && DEDENT_KEYWORD.is_match(strip_comment(content).trim_end()) {
                stack.pop();
            }
            stack.last().map_or(0, |level| level.target)
        };

        output.push(format!("{}{}", " ".repeat(target), content));
        shift = target as isize - width as isize;
        opens_block = !continuation.is_open() && strip_comment(content).trim_end().ends_with(':');
    }

    if let Some(line) = continuation.open_string_line() {
        return Err(AssemblyError::new(
            "consistency",
            format!("unterminated triple-quoted string starting on line {}", line),
        ));
    }
    Ok(output.join("\n"))
}

fn comment_target(stack: &[Level], width: usize, opens_block: bool, indent_size: usize) -> usize {
    let top_target = stack.last().map_or(0, |level| level.target);
    if opens_block {
        return top_target + indent_size;
    }
    match stack.iter().rev().find(|level| level.original <= width) {
        Some(level) => (level.target + (width - level.original)).min(top_target),
        None => 0,
    }
}

/// Line endings, re-indentation, blank-line collapsing and the trailing newline
pub fn ensure_consistency(code: &str, indent_size: usize) -> Result<String, AssemblyError> {
    let normalized = normalize_line_endings(code);
    let reindented = reindent(&normalized, indent_size)?;
    let mut collapsed = collapse_blank_lines(&reindented);
    if !collapsed.is_empty() && !collapsed.ends_with('\n') {
        collapsed.push('\n');
    }
    Ok(collapsed)
}

/// Strips trailing whitespace and puts two blank lines between top-level definitions
pub fn final_cleanup(code: &str) -> String {
    let mut output: Vec<String> = Vec::new();
    let mut seen_definition = false;

    for (line, in_string) in classify_lines(code) {
        let line = if in_string { line.to_string() } else { line.trim_end().to_string() };
        let previous = output.iter().rev().find(|l| !l.is_empty());
        let after_decorator = previous.is_some_and(|l| l.starts_with('@'));
        let after_comment = previous.is_some_and(|l| l.starts_with('#'));
        let starts_definition = !in_string && TOP_LEVEL_DEFINITION.is_match(&line) && !after_decorator;

        if starts_definition && seen_definition && !after_comment {
            while output.last().is_some_and(|l| l.is_empty()) {
                output.pop();
            }
            output.push(String::new());
            output.push(String::new());
        }
        if starts_definition {
            seen_definition = true;
        }
        output.push(line);
    }

    while output.last().is_some_and(|l| l.is_empty()) {
        output.pop();
    }
    let mut cleaned = output.join("\n");
    if !cleaned.is_empty() {
        cleaned.push('\n');
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reindent_should_keep_well_formed_code() {
        let code = "def f(x):\n    if x:\n        return 1\n    else:\n        return [\n            1,\n        ]\n";
        assert_eq!(reindent(code, 4).unwrap(), code);
    }

    #[test]
    fn test_reindent_should_widen_two_space_code() {
        let code = "def f(x):\n  if x:\n    return 1\n  return 2";
        assert_eq!(reindent(code, 4).unwrap(), "def f(x):\n    if x:\n        return 1\n    return 2");
    }

    #[test]
    fn test_reindent_should_expand_tabs() {
        assert_eq!(reindent("if x:\n\ty = 1", 4).unwrap(), "if x:\n    y = 1");
    }

    #[test]
    fn test_reindent_should_indent_missing_block_body() {
        assert_eq!(reindent("def f():\nreturn 1", 4).unwrap(), "def f():\n    return 1");
    }

    #[test]
    fn test_reindent_should_pull_misaligned_else_out() {
        let code = "if x:\n    a = 1\n    else:\n    a = 2";
        assert_eq!(reindent(code, 4).unwrap(), "if x:\n    a = 1\nelse:\n    a = 2");
    }

    #[test]
    fn test_reindent_should_leave_string_contents_alone() {
        let code = "def f():\n    return '''\n  keep\n'''";
        assert_eq!(reindent(code, 4).unwrap(), code);
    }

    #[test]
    fn test_reindent_should_handle_multiline_header() {
        let code = "def f(a,\n      b):\n    return a";
        assert_eq!(reindent(code, 4).unwrap(), code);
    }

    #[test]
    fn test_reindent_unterminated_string_should_fail() {
        let err = reindent("x = '''\nabc", 4).unwrap_err();
        assert_eq!(err.stage, "consistency");
    }

    #[test]
    fn test_collapse_blank_lines_should_keep_two() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
    }

    #[test]
    fn test_final_cleanup_should_space_definitions() {
        let code = "def a():\n    pass\ndef b():   \n    pass\n\n\n\n\n@dec\ndef c():\n    pass";
        assert_eq!(
            final_cleanup(code),
            "def a():\n    pass\n\n\ndef b():\n    pass\n\n\n@dec\ndef c():\n    pass\n"
        );
    }

    #[test]
    fn test_dedent_and_indent_should_round_trip() {
        let body = "print(x)\nif x:\n    y = '''\ntext\n'''";
        let indented = indent(body, 4);
        assert_eq!(indented, "    print(x)\n    if x:\n        y = '''\ntext\n'''");
        assert_eq!(dedent(&indented), body);
    }

    #[test]
    fn test_strip_full_line_comments_should_keep_inline_comments() {
        let code = "#!/usr/bin/env python\n# note\nx = 1  # keep\n    # indented note\ny = '''\n# text\n'''";
        assert_eq!(strip_full_line_comments(code), "#!/usr/bin/env python\nx = 1  # keep\ny = '''\n# text\n'''");
    }
}
