/*!
 * Translation of pseudocode documents into Python.
 *
 * - `manager`: the per-call pipeline and its repair attempt
 * - `context`: bounded context sent with each instruction
 * - `dependencies`: defined names and imports recorded per code block
 * - `result`: the result and metadata returned by every call
 * - `batch`: concurrent translation of many documents
 */

pub use self::batch::{BatchOutcome, BatchReport, BatchTranslator};
pub use self::context::ContextWindow;
pub use self::manager::TranslationManager;
pub use self::result::{Stage, TranslationMetadata, TranslationResult};

pub mod batch;
pub mod context;
pub mod dependencies;
pub mod manager;
pub mod result;
