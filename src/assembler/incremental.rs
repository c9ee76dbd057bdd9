/*!
 * Incremental and streaming assembly.
 *
 * New blocks are merged into already assembled code without reprocessing
 * it: the previous text is parsed once to learn which imports, definitions
 * and statements it holds, and only new ones are spliced in.
 */

use log::{debug, warn};
use std::collections::{BTreeSet, HashSet};

use super::formatting::{dedent, indent, normalize_line_endings};
use super::imports::ImportSet;
use super::sections::{Definition, is_main_guard, segments};
use super::{ASSEMBLY_FILENAME, AssembledCode, CodeAssembler, SECTION_SEPARATOR};
use crate::blocks::CodeBlock;
use crate::errors::AssemblyError;
use crate::python::{Module, ParseMode};

/// What previously assembled code already contains
#[derive(Default)]
struct ExistingCode {
    imports: BTreeSet<String>,
    names: HashSet<String>,
    statements: HashSet<String>,
    /// Last line of the last top-level import
    import_end: Option<usize>,
    docstring_end: Option<usize>,
    /// First line of a `__main__` guard closing the module
    guard_line: Option<usize>,
}

impl ExistingCode {
    fn scan(source: &str, module: &Module) -> Self {
        let mut existing = ExistingCode::default();
        let mut imports = ImportSet::new();

        for (index, segment) in segments(source, &module.body, 0).0.into_iter().enumerate() {
            let stmt = segment.stmt;
            if index == 0 && stmt.is_docstring() {
                existing.docstring_end = Some(stmt.span.end_line);
            } else if stmt.is_import() {
                imports.add_statement(stmt);
                existing.import_end = Some(stmt.span.end_line);
            } else if let Some(name) = stmt.definition_name() {
                existing.names.insert(name.to_string());
            } else if is_main_guard(stmt) {
                for inner in stmt.child_bodies() {
                    for guarded in segments(source, inner, stmt.span.line).0 {
                        existing.statements.insert(statement_key(&guarded.text));
                    }
                }
            } else {
                existing.statements.insert(statement_key(&segment.text));
            }
        }

        existing.imports = imports.atoms();
        existing.guard_line = module.body.last().filter(|stmt| is_main_guard(stmt)).map(|stmt| stmt.span.line);
        existing
    }
}

/// Statement text without comments, blank lines or indentation
fn statement_key(text: &str) -> String {
    dedent(text)
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

fn text_lines(text: &str) -> Vec<String> {
    text.split('\n').map(str::to_string).collect()
}

impl CodeAssembler {
    /// Merges `new_blocks` into `previous`, keeping everything already there.
    ///
    /// Imports go after the existing imports, definitions before a closing
    /// `__main__` guard (or at the end) and main statements into that guard.
    /// Names and statements the previous code already has are skipped.
    pub fn assemble_incremental(
        &self,
        previous: &str,
        new_blocks: &[CodeBlock],
    ) -> Result<AssembledCode, AssemblyError> {
        if previous.trim().is_empty() {
            return self.assemble(new_blocks);
        }
        let previous = normalize_line_endings(previous);
        let code_blocks: Vec<&CodeBlock> = new_blocks.iter().filter(|b| b.is_code()).collect();
        if code_blocks.is_empty() {
            return Ok(AssembledCode {
                code: self.finish(&previous)?,
                warnings: vec!["No new code blocks to assemble".to_string()],
            });
        }

        let module = match self.cache.parse(&previous, ASSEMBLY_FILENAME, ParseMode::Exec) {
            Ok(module) => module,
            Err(e) => {
                warn!("Previously assembled code does not parse ({}); appending new code", e);
                let mut appended = self.assemble(new_blocks)?;
                appended.warnings.insert(0, "Previous code could not be parsed; new code appended as-is".to_string());
                appended.code = format!("{}{}{}", previous.trim_end(), SECTION_SEPARATOR, appended.code);
                return Ok(appended);
            }
        };

        let existing = ExistingCode::scan(&previous, &module);
        let mut warnings = Vec::new();
        let sections = self.collect_sections(&code_blocks, false, &mut warnings);

        let new_imports = sections.imports.without(&existing.imports);
        let definitions: Vec<Definition> = sections
            .merged_functions()
            .into_iter()
            .chain(sections.merged_classes())
            .filter(|definition| {
                let known = existing.names.contains(&definition.name);
                if known {
                    debug!("'{}' is already defined; skipping", definition.name);
                }
                !known
            })
            .collect();
        let globals: Vec<&str> = sections
            .globals
            .iter()
            .map(|assignment| assignment.code.as_str())
            .filter(|code| !existing.statements.contains(&statement_key(code)))
            .collect();
        let main: Vec<String> = sections
            .main
            .iter()
            .filter(|code| !existing.statements.contains(&statement_key(code)))
            .cloned()
            .collect();

        let declarations = [
            globals.join("\n"),
            definitions.iter().map(|d| d.code.as_str()).collect::<Vec<_>>().join(SECTION_SEPARATOR),
        ]
        .into_iter()
        .filter(|section| !section.is_empty())
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR);

        let mut lines = text_lines(previous.trim_end_matches('\n'));
        let mut inserts: Vec<(usize, Vec<String>)> = Vec::new();

        match existing.guard_line {
            Some(guard_line) => {
                if !main.is_empty() {
                    lines.extend(text_lines(&indent(&main.join("\n"), self.indent_size)));
                }
                if !declarations.is_empty() {
                    let mut chunk = text_lines(&declarations);
                    chunk.extend([String::new(), String::new()]);
                    inserts.push((guard_line - 1, chunk));
                }
            }
            None => {
                let main = self.render_main(&main, sections.main_guard);
                for section in [declarations.as_str(), main.as_str()] {
                    if !section.is_empty() {
                        lines.extend([String::new(), String::new()]);
                        lines.extend(text_lines(section));
                    }
                }
            }
        }

        if !new_imports.is_empty() {
            let rendered = text_lines(&new_imports.render());
            let insert = match (existing.import_end, existing.docstring_end) {
                (Some(end), _) => (end, rendered),
                (None, Some(end)) => {
                    let mut chunk = vec![String::new(), String::new()];
                    chunk.extend(rendered);
                    (end, chunk)
                }
                (None, None) => {
                    let mut chunk = rendered;
                    chunk.extend([String::new(), String::new()]);
                    (0, chunk)
                }
            };
            inserts.push(insert);
        }

        inserts.sort_by(|a, b| b.0.cmp(&a.0));
        for (at, chunk) in inserts {
            let at = at.min(lines.len());
            lines.splice(at..at, chunk);
        }

        let code = self.finish(&lines.join("\n"))?;
        Ok(AssembledCode { code, warnings })
    }

    /// Assembles chunks of blocks one after another, each merged into the
    /// result of the chunks before it
    pub fn assemble_streaming<I>(&self, chunks: I) -> Result<AssembledCode, AssemblyError>
    where
        I: IntoIterator,
        I::Item: AsRef<[CodeBlock]>,
    {
        let mut assembled = AssembledCode::default();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let step = self.assemble_incremental(&assembled.code, chunk.as_ref())?;
            debug!("Chunk {} merged, {} line(s) so far", index + 1, step.code.lines().count());
            assembled.code = step.code;
            assembled.warnings.extend(step.warnings);
        }
        Ok(assembled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::Config;
    use crate::blocks::BlockType;
    use crate::cache::{AstCache, AstCacheConfig};
    use std::sync::Arc;

    fn assembler() -> CodeAssembler {
        CodeAssembler::new(Arc::new(AstCache::new(AstCacheConfig::default())), &Config::default())
    }

    fn code(text: &str) -> CodeBlock {
        CodeBlock::new(BlockType::TargetCode, text, (1, text.lines().count().max(1)))
    }

    #[test]
    fn test_incremental_should_append_only_new_items() {
        let previous = "import os\n\n\ndef a():\n    return os.sep\n";
        let result = assembler()
            .assemble_incremental(
                previous,
                &[code("import os\nimport sys\n\ndef a():\n    return 1\n\ndef b():\n    return sys.argv\n")],
            )
            .unwrap();
        assert_eq!(
            result.code,
            "import os\nimport sys\n\n\ndef a():\n    return os.sep\n\n\ndef b():\n    return sys.argv\n"
        );
    }

    #[test]
    fn test_incremental_should_extend_existing_main_guard() {
        let previous = "def main():\n    return 0\n\n\nif __name__ == \"__main__\":\n    main()\n";
        let result = assembler()
            .assemble_incremental(previous, &[code("def helper():\n    return 1\n"), code("main()\nprint(helper())\n")])
            .unwrap();
        assert_eq!(
            result.code,
            "def main():\n    return 0\n\n\ndef helper():\n    return 1\n\n\nif __name__ == \"__main__\":\n    main()\n    print(helper())\n"
        );
    }

    #[test]
    fn test_streaming_should_fold_chunks_in_order() {
        let chunks = vec![vec![code("import json\n")], vec![code("def load(s):\n    return json.loads(s)\n")]];
        let result = assembler().assemble_streaming(chunks).unwrap();
        assert_eq!(result.code, "import json\n\n\ndef load(s):\n    return json.loads(s)\n");
    }

    #[test]
    fn test_incremental_on_broken_previous_should_append() {
        let result = assembler().assemble_incremental("def broken(:\n", &[code("x = 1\n")]).unwrap();
        assert!(result.code.starts_with("def broken(:"));
        assert!(result.code.contains("x = 1"));
        assert!(result.warnings[0].contains("could not be parsed"));
    }

    #[test]
    fn test_incremental_without_new_code_should_keep_previous() {
        let previous = "x = 1\n";
        let result = assembler().assemble_incremental(previous, &[]).unwrap();
        assert_eq!(result.code, previous);
    }
}
