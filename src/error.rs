use thiserror::Error;

/// Errors raised while turning fetched records into engine inputs or while
/// running the engine over them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A record is missing a field or violates a record invariant. Carries the
    /// project and the issue key / analysis version that locate it.
    #[error("malformed record {record} in project {project}: {reason}")]
    MalformedRecord {
        project: String,
        record: String,
        reason: String,
    },
}

impl EngineError {
    pub fn malformed(
        project: impl Into<String>,
        record: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        EngineError::MalformedRecord {
            project: project.into(),
            record: record.into(),
            reason: reason.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
