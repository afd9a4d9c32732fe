mod assets;
mod merge;
mod scanner;

pub use assets::{AssetWriter, WriteReceipt};
pub use merge::{ContentOnlyMerge, LlmMerge, MergeLlmTrace, MergeOutcome, MergeSkill};
pub use scanner::{parse_manifest, CommandScanner, ProjectScanner, ScanRequest};

#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("project scan failed: {reason}")]
    Scanner { reason: String },
    #[error("merge failed for `{file}`: {reason}")]
    Merge { file: String, reason: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("backup failed at {path}: {source}")]
    BackupFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
