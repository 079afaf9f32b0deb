use std::fmt;

use serde::Serialize;

use rma_storage::{Stage, StorageError};

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every field-level problem found in one input, reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn fields(&self) -> Vec<&'static str> {
        self.errors.iter().map(|e| e.field).collect()
    }

    /// `Ok(())` when nothing was pushed.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", e.field, e.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// A rejected stage transition. The case is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The requested stage is more than one step behind the current one.
    #[error("cannot move from {from} back to {to}")]
    Ordering { from: Stage, to: Stage },

    /// `received` cannot jump straight to `repaired_replaced`.
    #[error("cannot move from {from} to {to} without testing")]
    SkippedTesting { from: Stage, to: Stage },

    /// Evidence required to enter `to` is not recorded on the case.
    #[error("cannot enter {to}: missing {}", .missing.join(", "))]
    MissingEvidence {
        to: Stage,
        missing: Vec<&'static str>,
    },

    /// Reopening a closed case while another open case holds its reference.
    #[error("cannot reopen {case_id}: open case {existing_case_id} holds the same reference")]
    ReferenceInUse {
        case_id: String,
        existing_case_id: String,
    },
}

impl TransitionError {
    /// Machine-readable name of the rule that rejected the move.
    pub fn rule(&self) -> &'static str {
        match self {
            TransitionError::Ordering { .. } => "ordering",
            TransitionError::SkippedTesting { .. } => "skipped_testing",
            TransitionError::MissingEvidence { .. } => "missing_evidence",
            TransitionError::ReferenceInUse { .. } => "reference_in_use",
        }
    }

    /// Fields the operator must fill in first. Empty for ordering rules.
    pub fn missing_fields(&self) -> &[&'static str] {
        match self {
            TransitionError::MissingEvidence { missing, .. } => missing,
            _ => &[],
        }
    }
}

/// Errors returned by [`Engine`](crate::Engine) operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    Validation(ValidationErrors),

    #[error("transition rejected ({rule}): {0}", rule = .0.rule())]
    Transition(TransitionError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The case kept changing underneath us; the caller may retry.
    #[error("case {case_id} was modified concurrently after {attempts} attempts")]
    Conflict { case_id: String, attempts: u32 },

    #[error("order lookup failed: {0}")]
    Lookup(#[from] crate::lookup::LookupError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("case creation failed: {0}")]
    CaseCreation(#[source] StorageError),

    #[error(transparent)]
    Storage(StorageError),
}

impl EngineError {
    /// Stable identifier for the error class, used in JSON error output.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::Transition(_) => "transition",
            EngineError::NotFound { .. } => "not_found",
            EngineError::Conflict { .. } => "conflict",
            EngineError::Lookup(_) => "lookup",
            EngineError::Config(_) => "config",
            EngineError::CaseCreation(_) => "case_creation",
            EngineError::Storage(_) => "storage",
        }
    }
}

impl From<ValidationErrors> for EngineError {
    fn from(e: ValidationErrors) -> Self {
        EngineError::Validation(e)
    }
}

impl From<TransitionError> for EngineError {
    fn from(e: TransitionError) -> Self {
        EngineError::Transition(e)
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::CaseNotFound { case_id } => EngineError::NotFound {
                kind: "case",
                id: case_id,
            },
            StorageError::SerialNotFound { serial_id } => EngineError::NotFound {
                kind: "serial",
                id: serial_id,
            },
            other => EngineError::Storage(other),
        }
    }
}
