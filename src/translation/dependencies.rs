/*!
 * Dependency resolution between code blocks.
 *
 * Records on each code block which top-level names it defines and which
 * import statements it needs. Blocks that do not parse are skipped with a
 * warning; resolution never fails a translation.
 */

use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::blocks::{CodeBlock, meta};
use crate::cache::AstCache;
use crate::python::{Module, ParseMode, StmtKind};

const DEPENDENCY_FILENAME: &str = "<dependencies>";

/// Names bound at the top level of a module
fn defined_names(module: &Module) -> Vec<String> {
    let mut names = Vec::new();
    for stmt in &module.body {
        match &stmt.kind {
            StmtKind::FunctionDef(_) | StmtKind::ClassDef(_) => {
                names.extend(stmt.definition_name().map(str::to_string));
            }
            StmtKind::Assign { targets, .. } => {
                names.extend(targets.iter().filter_map(|t| t.as_name().map(str::to_string)));
            }
            StmtKind::AnnAssign { target, .. } => names.extend(target.as_name().map(str::to_string)),
            _ => {}
        }
    }
    names
}

fn import_statements(source: &str, module: &Module) -> Vec<String> {
    module
        .body
        .iter()
        .filter(|stmt| stmt.is_import())
        .filter_map(|stmt| stmt.span.slice(source))
        .map(|text| text.trim().to_string())
        .collect()
}

/// Annotates code blocks and returns warnings for unparseable blocks and
/// for names defined by more than one block
pub fn resolve(blocks: &mut [CodeBlock], cache: &AstCache) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut definers: BTreeMap<String, Vec<usize>> = BTreeMap::new();

    for (index, block) in blocks.iter_mut().enumerate().filter(|(_, b)| b.is_code()) {
        let text = block.text().to_string();
        match cache.parse(&text, DEPENDENCY_FILENAME, ParseMode::Exec) {
            Ok(module) => {
                let names = defined_names(&module);
                for name in &names {
                    definers.entry(name.clone()).or_default().push(index);
                }
                let imports = import_statements(&text, &module);
                block.set_meta(meta::DEFINED_NAMES, Value::from(names));
                block.set_meta(meta::REQUIRED_IMPORTS, Value::from(imports));
            }
            Err(e) => {
                debug!("Dependency analysis skipped block {}: {}", index, e);
                warnings.push(format!(
                    "Dependency analysis skipped block at lines {}-{}: {}",
                    block.line_range.0, block.line_range.1, e
                ));
            }
        }
    }

    for (name, indices) in definers {
        if indices.len() > 1 {
            warnings.push(format!(
                "'{}' is defined in {} blocks; the last definition is kept",
                name,
                indices.len()
            ));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockType;
    use crate::cache::AstCacheConfig;

    #[test]
    fn test_resolve_should_record_names_and_imports() {
        let cache = AstCache::new(AstCacheConfig::default());
        let mut blocks = vec![
            CodeBlock::new(BlockType::TargetCode, "import os\nLIMIT = 3\n\ndef f():\n    return os.sep\n", (1, 5)),
            CodeBlock::new(BlockType::NaturalLanguage, "now do it\n", (6, 6)),
        ];
        let warnings = resolve(&mut blocks, &cache);
        assert!(warnings.is_empty());
        assert_eq!(blocks[0].meta_list(meta::DEFINED_NAMES), vec!["LIMIT", "f"]);
        assert_eq!(blocks[0].meta_list(meta::REQUIRED_IMPORTS), vec!["import os"]);
        assert!(blocks[1].meta_list(meta::DEFINED_NAMES).is_empty());
    }

    #[test]
    fn test_resolve_should_warn_on_redefinition_and_broken_blocks() {
        let cache = AstCache::new(AstCacheConfig::default());
        let mut blocks = vec![
            CodeBlock::new(BlockType::TargetCode, "def f():\n    return 1\n", (1, 2)),
            CodeBlock::new(BlockType::TargetCode, "def f():\n    return 2\n", (3, 4)),
            CodeBlock::new(BlockType::TargetCode, "def g(:\n", (5, 5)),
        ];
        let warnings = resolve(&mut blocks, &cache);
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("lines 5-5")));
        assert!(warnings.iter().any(|w| w.contains("'f' is defined in 2 blocks")));
    }
}
