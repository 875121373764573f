// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Typed failures the pipeline can name. Everything else
// (tensor failures, I/O) travels as anyhow::Error and ends
// the run; callers that need to react to one of these use
// `err.downcast_ref::<PipelineError>()`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A raw pair lacks one of the configured language tags.
    #[error("example {index} has no '{lang}' text")]
    Preprocessing { index: usize, lang: String },

    /// The tokenizer produced no ids for a non-optional field.
    #[error("example {index} tokenized to an empty {field} sequence")]
    EmptySequence { index: usize, field: &'static str },

    #[error("evaluation set is empty")]
    EmptyEvaluationSet,

    #[error("training set is empty")]
    EmptyTrainingSet,

    /// Accuracy was requested for a batch whose labels are all padding.
    #[error("batch has no non-padding labels; token accuracy is undefined")]
    DivisionDegeneracy,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Generation was called without entering inference mode.
    #[error("generation requires the model to be in inference mode")]
    InferenceModeRequired,
}
