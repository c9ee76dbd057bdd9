/*!
 * Input segmentation.
 *
 * - `models`: block and parse-result types
 * - `scoring`: per-line code/prose heuristics
 * - `segmenter`: grouping lines into classified blocks
 */

pub mod models;
pub mod scoring;
pub mod segmenter;

pub use models::{BlockType, CodeBlock, ParseResult, ctx, meta};
pub use scoring::{LineKind, LineScorer};
pub use segmenter::BlockParser;
