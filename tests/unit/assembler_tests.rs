/*!
 * Tests for assembling code blocks into one program
 */

use pseudocode_translator::app_config::Config;
use pseudocode_translator::assembler::CodeAssembler;
use pseudocode_translator::blocks::{BlockType, CodeBlock};

use crate::common;

fn assembler() -> CodeAssembler {
    CodeAssembler::new(common::fresh_cache(), &Config::default())
}

fn code(text: &str) -> CodeBlock {
    CodeBlock::new(BlockType::TargetCode, text, (1, text.lines().count().max(1)))
}

#[test]
fn test_assemble_imports_should_merge_and_sort_atoms() {
    let blocks = [
        code("import os\nfrom typing import List\n"),
        code("import os\nfrom typing import Dict\n"),
    ];
    let assembled = assembler().assemble(&blocks).unwrap();
    assert_eq!(assembled.code, "import os\nfrom typing import Dict, List\n");
}

#[test]
fn test_assemble_should_group_imports_by_origin() {
    let blocks = [code("import requests\nfrom . import helpers\nimport json\n")];
    let assembled = assembler().assemble(&blocks).unwrap();
    let json = assembled.code.find("import json").unwrap();
    let requests = assembled.code.find("import requests").unwrap();
    let local = assembled.code.find("from . import helpers").unwrap();
    assert!(json < requests && requests < local, "{}", assembled.code);
}

#[test]
fn test_assemble_duplicate_definitions_should_keep_one() {
    let blocks = [
        code("def area(r):\n    return 3 * r * r\n"),
        code("class Shape:\n    pass\n"),
        code("def area(r):\n    return 3.14 * r * r\n"),
    ];
    let assembled = assembler().assemble(&blocks).unwrap();
    assert_eq!(assembled.code.matches("def area").count(), 1);
    assert!(assembled.code.contains("3.14"));
    assert_eq!(assembled.code.matches("class Shape").count(), 1);
}

#[test]
fn test_assemble_output_should_be_stable_when_reassembled() {
    let blocks = [
        code("import math\nRADIUS = 2\n"),
        code("def area(r):\n    return math.pi * r ** 2\n"),
        code("print(area(RADIUS))\n"),
    ];
    let asm = assembler();
    let first = asm.assemble(&blocks).unwrap().code;
    let second = asm.assemble(&[code(&first)]).unwrap().code;
    assert_eq!(first, second);
    assert!(first.contains("if __name__ == \"__main__\":\n    print(area(RADIUS))"));
}

#[test]
fn test_assemble_incremental_should_add_only_missing_parts() {
    let asm = assembler();
    let previous = asm.assemble(&[code("import os\n\ndef cwd():\n    return os.getcwd()\n")]).unwrap().code;

    let updated = asm
        .assemble_incremental(&previous, &[code("import os\nimport sys\n\ndef argv():\n    return sys.argv\n")])
        .unwrap();
    assert_eq!(updated.code.matches("import os").count(), 1);
    assert!(updated.code.contains("import sys"));
    assert!(updated.code.contains("def cwd():"));
    assert!(updated.code.contains("def argv():"));
    assert!(updated.code.find("import sys").unwrap() < updated.code.find("def cwd").unwrap());
}
