use thiserror::Error;

/// Failures from the backing store: connectivity, serialization, writes and
/// deletes.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("open database: {0}")]
    Open(#[from] redb::DatabaseError),

    #[error("transaction: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("encode record: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("decode record: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("data directory: {0}")]
    Io(#[from] std::io::Error),

    /// Store refused or could not service the call for another reason.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
