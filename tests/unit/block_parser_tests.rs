/*!
 * Tests for block segmentation
 */

use pseudocode_translator::app_config::Config;
use pseudocode_translator::blocks::{BlockParser, BlockType, CodeBlock, meta};

use crate::common;

fn parser() -> BlockParser {
    BlockParser::new(common::fresh_cache(), &Config::default())
}

/// Line ranges must tile the input from line 1 without gaps or overlap
fn assert_partition(text: &str, blocks: &[CodeBlock]) {
    let mut next_line = 1;
    for block in blocks {
        assert_eq!(block.line_range.0, next_line, "gap or overlap before {:?}", block.line_range);
        assert!(block.line_range.1 >= block.line_range.0);
        next_line = block.line_range.1 + 1;
    }
    assert_eq!(next_line - 1, text.lines().count());
}

#[test]
fn test_parse_documents_should_partition_input_exactly() {
    let documents = [
        common::MIXED_DOCUMENT,
        "x = 1\n",
        "Read a number from the user\n\n\nnumber = int(input())\n\n",
        "# setup\nimport sys\n\nPrint the arguments given on the command line\nprint(sys.argv)\n",
        "def f():\n    return 1\n\n\n\nclass A:\n    pass\n",
    ];
    for text in documents {
        let result = parser().parse(text);
        assert_eq!(result.reconstruct(), text);
        assert_partition(text, &result.blocks);
    }
}

#[test]
fn test_parse_mixed_document_should_alternate_block_types() {
    let result = parser().parse(common::MIXED_DOCUMENT);
    let types: Vec<BlockType> = result.blocks.iter().map(|b| b.block_type).collect();
    assert_eq!(
        types,
        vec![
            BlockType::TargetCode,
            BlockType::NaturalLanguage,
            BlockType::TargetCode,
            BlockType::NaturalLanguage,
        ]
    );
    assert!(result.blocks[0].flag(meta::HAS_IMPORTS));
    assert!(result.blocks[2].flag(meta::HAS_FUNCTIONS));
}

#[test]
fn test_parse_comment_only_input_should_not_need_translation() {
    let result = parser().parse("# just a note\n# and another\n");
    assert!(result.success());
    assert!(result.blocks.iter().all(|b| !b.needs_translation()));
}

#[test]
fn test_split_mixed_should_produce_tagged_sub_blocks() {
    let p = parser();
    let text = "def total(numbers):\n    Add up all of the numbers in the list\n    return result\n";
    let parsed = p.parse(text);
    assert_eq!(parsed.blocks[0].block_type, BlockType::Mixed);

    let parts = p.split_mixed(&parsed.blocks[0]);
    assert!(parts.len() >= 2);
    assert!(parts.iter().all(|b| b.is_sub_block()));
    assert!(parts.iter().any(|b| b.block_type == BlockType::NaturalLanguage));
    assert_eq!(parts.iter().map(|b| b.content.as_str()).collect::<String>(), text);
    assert_partition(text, &parts);
}
