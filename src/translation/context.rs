/*!
 * Context sent to the backend with each instruction.
 *
 * The context is bounded: the last few code blocks in a small window before
 * the instruction plus the beginning of the block right after it.
 */

use serde_json::Value;

use crate::app_config::HeuristicsConfig;
use crate::blocks::segmenter::{head_chars, tail_chars};
use crate::blocks::{CodeBlock, ctx};

/// Limits applied when building context
#[derive(Debug, Clone, Copy)]
pub struct ContextWindow {
    /// Code blocks joined from before the instruction
    pub code_blocks: usize,
    /// How many blocks back to look for them
    pub window_blocks: usize,
    pub lookahead_chars: usize,
    pub max_chars: usize,
}

impl ContextWindow {
    pub fn new(heuristics: &HeuristicsConfig, max_chars: usize) -> Self {
        Self {
            code_blocks: heuristics.context_code_blocks,
            window_blocks: heuristics.context_window_blocks,
            lookahead_chars: heuristics.context_lookahead_chars,
            max_chars,
        }
    }

    /// Preceding code for block `index`, oldest first
    pub fn preceding(&self, blocks: &[CodeBlock], index: usize) -> Option<String> {
        let start = index.saturating_sub(self.window_blocks);
        let mut code: Vec<&str> = blocks[start..index.min(blocks.len())]
            .iter()
            .rev()
            .filter(|block| block.is_code() && !block.text().trim().is_empty())
            .take(self.code_blocks)
            .map(CodeBlock::text)
            .collect();
        if code.is_empty() {
            return None;
        }
        code.reverse();
        Some(tail_chars(&code.join("\n\n"), self.max_chars).to_string())
    }

    /// Start of the block after `index`
    pub fn following(&self, blocks: &[CodeBlock], index: usize) -> Option<String> {
        let next = blocks.get(index + 1)?.text();
        if next.trim().is_empty() {
            return None;
        }
        Some(head_chars(next, self.lookahead_chars).to_string())
    }

    /// Joined preceding and following text, or `None` when both are empty.
    /// The parts are also stored in the block's context map.
    pub fn build(&self, blocks: &mut [CodeBlock], index: usize) -> Option<String> {
        let preceding = self.preceding(blocks, index);
        let following = self.following(blocks, index);

        let block = &mut blocks[index];
        block.context.insert(ctx::BLOCK_INDEX.to_string(), Value::from(index));
        if let Some(text) = &preceding {
            block.context.insert(ctx::PRECEDING_CODE.to_string(), Value::from(text.as_str()));
        }
        if let Some(text) = &following {
            block.context.insert(ctx::FOLLOWING_CODE.to_string(), Value::from(text.as_str()));
        }

        match (preceding, following) {
            (None, None) => None,
            (Some(before), None) => Some(before),
            (None, Some(after)) => Some(format!("# Followed by:\n{}", after)),
            (Some(before), Some(after)) => Some(format!("{}\n\n# Followed by:\n{}", before, after)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockType;

    fn window() -> ContextWindow {
        ContextWindow::new(&HeuristicsConfig::default(), 2048)
    }

    fn block(block_type: BlockType, text: &str) -> CodeBlock {
        CodeBlock::new(block_type, text, (1, 1))
    }

    #[test]
    fn test_preceding_should_take_last_two_code_blocks_in_window() {
        let blocks = vec![
            block(BlockType::TargetCode, "a = 1\n"),
            block(BlockType::TargetCode, "b = 2\n"),
            block(BlockType::NaturalLanguage, "then\n"),
            block(BlockType::TargetCode, "c = 3\n"),
            block(BlockType::NaturalLanguage, "add them\n"),
        ];
        assert_eq!(window().preceding(&blocks, 4).as_deref(), Some("b = 2\n\nc = 3"));
    }

    #[test]
    fn test_preceding_should_ignore_blocks_outside_window() {
        let blocks = vec![
            block(BlockType::TargetCode, "a = 1\n"),
            block(BlockType::NaturalLanguage, "x\n"),
            block(BlockType::NaturalLanguage, "y\n"),
            block(BlockType::NaturalLanguage, "z\n"),
            block(BlockType::NaturalLanguage, "now\n"),
        ];
        assert_eq!(window().preceding(&blocks, 4), None);
    }

    #[test]
    fn test_build_should_bound_lookahead_and_record_context() {
        let long = format!("{}\n", "x".repeat(500));
        let mut blocks = vec![block(BlockType::NaturalLanguage, "make x\n"), block(BlockType::TargetCode, &long)];
        let context = window().build(&mut blocks, 0).unwrap();
        assert_eq!(context, format!("# Followed by:\n{}", "x".repeat(200)));
        assert_eq!(blocks[0].context_str(ctx::FOLLOWING_CODE).map(str::len), Some(200));
        assert_eq!(window().build(&mut blocks[..1], 0), None);
    }
}
