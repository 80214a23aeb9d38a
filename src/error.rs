use crate::block::BlockId;
use crate::script::LabelId;
use crate::target::TargetId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("project has no stage")]
  MissingStage,

  /// The procedure metadata of a definition or call could not be used.
  /// Only the script containing it fails to compile.
  #[error("malformed procedure {proccode:?}: {reason}")]
  MalformedProcedure { proccode: String, reason: String },

  #[error("block {0} is its own ancestor")]
  BlockCycle(BlockId),

  /// A script refers to a label it did not reserve.
  #[error("label {label} is outside of the labels {start}..{end} of its script")]
  DanglingLabel {
    label: LabelId,
    start: LabelId,
    end: LabelId,
  },

  #[error("jump to {target} past the end of a script of {length} ops")]
  DanglingJump { target: usize, length: usize },

  #[error("no continuation with label {0}")]
  MissingContinuation(LabelId),

  #[error("target {0} does not exist")]
  MissingTarget(TargetId),

  #[error("restore without a saved frame in target {0}")]
  FrameUnderflow(TargetId),
}
