/// All errors that can be returned by a ReturnStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency control conflict: another writer updated the
    /// case after it was read. The expected version was not found.
    #[error("concurrent conflict on case {case_id}: expected version {expected_version}")]
    ConcurrentConflict {
        case_id: String,
        expected_version: i64,
    },

    /// No case with the given id.
    #[error("case not found: {case_id}")]
    CaseNotFound { case_id: String },

    /// An open case already carries this external reference (dedup key).
    #[error("external reference {external_reference} already used by open case {existing_case_id}")]
    DuplicateReference {
        external_reference: String,
        existing_case_id: String,
    },

    /// The write touched columns the backend schema does not have.
    #[error("{table} has no column(s): {}", .columns.join(", "))]
    UnsupportedColumns {
        table: &'static str,
        columns: Vec<&'static str>,
    },

    /// No serial registry entry with the given id.
    #[error("serial registry entry not found: {serial_id}")]
    SerialNotFound { serial_id: String },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
