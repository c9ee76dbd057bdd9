/*!
 * Code assembly.
 *
 * Merges translated and original code blocks into one Python program:
 *
 * - `imports`: import collection, bucketing and auto-imports
 * - `sections`: filing top-level statements into program sections
 * - `formatting`: consistency and cleanup passes over the joined text
 * - `incremental`: appending new blocks to previously assembled code
 *
 * The section order is fixed: module docstring, imports, globals,
 * functions, classes and main code, separated by two blank lines.
 */

use log::{debug, info, warn};
use regex::Regex;
use std::sync::Arc;

use crate::app_config::Config;
use crate::blocks::CodeBlock;
use crate::cache::AstCache;
use crate::errors::AssemblyError;
use crate::python::ParseMode;

pub mod formatting;
pub mod imports;
pub mod incremental;
pub mod sections;

use formatting::{dedent, ensure_consistency, final_cleanup, indent, normalize_line_endings};
use sections::Sections;

/// Identifier used for assembled code in the AST cache
const ASSEMBLY_FILENAME: &str = "<assembly>";

/// Two blank lines between program sections
const SECTION_SEPARATOR: &str = "\n\n\n";

const MAIN_GUARD: &str = "if __name__ == \"__main__\":";

/// Assembled program text and the non-fatal problems met on the way
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledCode {
    pub code: String,
    pub warnings: Vec<String>,
}

pub struct CodeAssembler {
    cache: Arc<AstCache>,
    indent_size: usize,
    preserve_comments: bool,
    preserve_docstrings: bool,
    auto_import_common: bool,
    executable_patterns: Vec<Regex>,
}

impl CodeAssembler {
    pub fn new(cache: Arc<AstCache>, config: &Config) -> Self {
        let executable_patterns = config
            .heuristics
            .executable_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!("Ignoring invalid executable pattern '{}': {}", pattern, e);
                    None
                }
            })
            .collect();

        Self {
            cache,
            indent_size: config.indent_size,
            preserve_comments: config.preserve_comments,
            preserve_docstrings: config.preserve_docstrings,
            auto_import_common: config.auto_import_common,
            executable_patterns,
        }
    }

    pub fn indent_size(&self) -> usize {
        self.indent_size
    }

    /// Merges the target-code blocks into a single program.
    ///
    /// Blocks of other types are ignored. Without any code the result is
    /// empty and carries a warning. Blocks that do not parse are kept
    /// verbatim in the main section.
    pub fn assemble(&self, blocks: &[CodeBlock]) -> Result<AssembledCode, AssemblyError> {
        let mut warnings = Vec::new();
        let code_blocks: Vec<&CodeBlock> = blocks.iter().filter(|b| b.is_code()).collect();
        if code_blocks.is_empty() {
            warn!("No code blocks to assemble");
            warnings.push("No code blocks to assemble".to_string());
            return Ok(AssembledCode { code: String::new(), warnings });
        }

        info!("Assembling {} code block(s)", code_blocks.len());
        let mut sections = self.collect_sections(&code_blocks, self.preserve_docstrings, &mut warnings);

        let globals = sections.render_globals();
        let functions = join_definitions(&sections.merged_functions());
        let classes = join_definitions(&sections.merged_classes());
        let main = self.render_main(&sections.main, sections.main_guard);

        if self.auto_import_common {
            let body = join_sections([globals.as_str(), functions.as_str(), classes.as_str(), main.as_str()]);
            self.add_common_imports(&mut sections, &body);
        }

        let docstring = sections.docstring.clone().unwrap_or_default();
        let imports = sections.imports.render();
        let joined = join_sections([
            docstring.as_str(),
            imports.as_str(),
            globals.as_str(),
            functions.as_str(),
            classes.as_str(),
            main.as_str(),
        ]);

        let code = self.finish(&joined)?;
        debug!("Assembled {} line(s) with {} warning(s)", code.lines().count(), warnings.len());
        Ok(AssembledCode { code, warnings })
    }

    /// Files every block's statements; unparseable blocks go to main verbatim
    fn collect_sections(&self, blocks: &[&CodeBlock], allow_docstring: bool, warnings: &mut Vec<String>) -> Sections {
        let mut sections = Sections::new();
        for (index, block) in blocks.iter().enumerate() {
            let text = self.prepare_block_text(block);
            if text.trim().is_empty() {
                continue;
            }
            match self.cache.parse(&text, ASSEMBLY_FILENAME, ParseMode::Exec) {
                Ok(module) => sections.add_module(&text, &module, allow_docstring && index == 0),
                Err(e) => {
                    let (first, last) = block.line_range;
                    warn!("Block at lines {}-{} does not parse ({}); keeping it verbatim", first, last, e);
                    warnings.push(format!("Block at lines {}-{} could not be parsed; kept verbatim", first, last));
                    sections.add_verbatim(&text);
                }
            }
        }
        sections
    }

    fn prepare_block_text(&self, block: &CodeBlock) -> String {
        let text = dedent(&normalize_line_endings(block.text()));
        if self.preserve_comments {
            text
        } else {
            formatting::strip_full_line_comments(&text)
        }
    }

    /// Joins main statements, under a `__main__` guard when any of them runs
    /// something or the input already had one
    fn render_main(&self, statements: &[String], guarded: bool) -> String {
        let main = statements.join("\n");
        if main.trim().is_empty() {
            return String::new();
        }
        if guarded || self.is_executable(&main) {
            format!("{}\n{}", MAIN_GUARD, indent(&main, self.indent_size))
        } else {
            main
        }
    }

    fn is_executable(&self, code: &str) -> bool {
        self.executable_patterns.iter().any(|pattern| pattern.is_match(code))
    }

    fn add_common_imports(&self, sections: &mut Sections, body: &str) {
        if body.trim().is_empty() {
            return;
        }
        match self.cache.parse(body, ASSEMBLY_FILENAME, ParseMode::Exec) {
            Ok(module) => {
                let added = sections.imports.add_common_imports(&module, body);
                if !added.is_empty() {
                    debug!("Auto-imported: {}", added.join(", "));
                }
            }
            Err(e) => debug!("Skipping auto-imports, assembled body does not parse: {}", e),
        }
    }

    /// Consistency pass followed by the final cleanup
    fn finish(&self, code: &str) -> Result<String, AssemblyError> {
        let consistent = ensure_consistency(code, self.indent_size)?;
        Ok(final_cleanup(&consistent))
    }
}

fn join_definitions(definitions: &[sections::Definition]) -> String {
    definitions.iter().map(|d| d.code.as_str()).collect::<Vec<_>>().join(SECTION_SEPARATOR)
}

/// Non-empty sections separated by two blank lines
fn join_sections<'a>(sections: impl IntoIterator<Item = &'a str>) -> String {
    sections
        .into_iter()
        .map(|section| section.trim_matches('\n'))
        .filter(|section| !section.trim().is_empty())
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockType;
    use crate::cache::AstCacheConfig;

    fn assembler() -> CodeAssembler {
        CodeAssembler::new(Arc::new(AstCache::new(AstCacheConfig::default())), &Config::default())
    }

    fn code(text: &str) -> CodeBlock {
        CodeBlock::new(BlockType::TargetCode, text, (1, text.lines().count().max(1)))
    }

    #[test]
    fn test_assemble_without_code_should_warn() {
        let prose = CodeBlock::new(BlockType::NaturalLanguage, "make a list\n", (1, 1));
        let result = assembler().assemble(&[prose]).unwrap();
        assert_eq!(result.code, "");
        assert_eq!(result.warnings, vec!["No code blocks to assemble".to_string()]);
    }

    #[test]
    fn test_duplicate_function_should_keep_later_body() {
        let result = assembler()
            .assemble(&[code("def f():\n    return 1\n"), code("def f():\n    return 2\n")])
            .unwrap();
        assert_eq!(result.code, "def f():\n    return 2\n");
    }

    #[test]
    fn test_imports_should_be_merged_before_other_sections() {
        let result = assembler()
            .assemble(&[code("import os\nimport os\nfrom typing import List\n"), code("import os\nfrom typing import Dict\n")])
            .unwrap();
        assert_eq!(result.code, "import os\nfrom typing import Dict, List\n");
    }

    #[test]
    fn test_executable_main_should_be_guarded() {
        let result = assembler()
            .assemble(&[code("def main():\n    return 0\n"), code("main()\n")])
            .unwrap();
        assert_eq!(
            result.code,
            "def main():\n    return 0\n\n\nif __name__ == \"__main__\":\n    main()\n"
        );
    }

    #[test]
    fn test_sections_should_follow_fixed_order() {
        let result = assembler()
            .assemble(&[
                code("class Box:\n    pass\n"),
                code("total = 0\nLIMIT = 10\n"),
                code("def grow(box):\n    return box\n"),
                code("import sys\n"),
            ])
            .unwrap();
        assert_eq!(
            result.code,
            "import sys\n\n\n# Constants\nLIMIT = 10\n\n# Global variables\ntotal = 0\n\n\ndef grow(box):\n    return box\n\n\nclass Box:\n    pass\n"
        );
    }

    #[test]
    fn test_assembled_program_should_be_stable() {
        let assembler = assembler();
        let first = assembler
            .assemble(&[
                code("\"\"\"Area tools.\"\"\"\nimport os\nLIMIT = 3\n"),
                code("def run():\n    return os.getcwd()\n"),
                code("print(run())\n"),
            ])
            .unwrap();
        let second = assembler.assemble(&[code(&first.code)]).unwrap();
        assert_eq!(second.code, first.code);
    }

    #[test]
    fn test_unparseable_block_should_be_kept_verbatim() {
        let result = assembler().assemble(&[code("x = 1\n"), code("for i in\n")]).unwrap();
        assert!(result.code.contains("for i in"));
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("kept verbatim"));
    }

    #[test]
    fn test_common_modules_should_be_auto_imported() {
        let result = assembler().assemble(&[code("def area(r):\n    return math.pi * r ** 2\n")]).unwrap();
        assert!(result.code.starts_with("import math\n\n\ndef area(r):"));
    }

    #[test]
    fn test_comments_should_be_dropped_when_not_preserved() {
        let config = Config { preserve_comments: false, ..Config::default() };
        let assembler = CodeAssembler::new(Arc::new(AstCache::new(AstCacheConfig::default())), &config);
        let result = assembler.assemble(&[code("# helper\ndef f():\n    return 1  # one\n")]).unwrap();
        assert_eq!(result.code, "def f():\n    return 1  # one\n");
    }
}
