use super::model::Secret;
use super::StoreError;

/// Contract for the key-value store that holds secrets.
///
/// Records carry an absolute `expire_at`; the implementation is responsible for
/// hiding and eventually removing records past that instant. Nothing above this
/// trait sweeps.
pub trait StoreGateway: Send + Sync {
    /// Insert or overwrite the record keyed by `secret.id`.
    fn put(&self, secret: &Secret) -> Result<(), StoreError>;

    /// All live records whose key equals `id` (zero or one in practice).
    fn query(&self, id: &str) -> Result<Vec<Secret>, StoreError>;

    /// Remove the record keyed by `id`. Deleting a missing key is not an error.
    fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Remove the record keyed by `id` and return what was there.
    ///
    /// Exactly one of any number of concurrent callers may observe `Some`.
    /// The default body is only as strong as `query` followed by `delete`;
    /// stores with a native delete-returning-old-value must override it.
    fn take(&self, id: &str) -> Result<Option<Secret>, StoreError> {
        let previous = self.query(id)?.into_iter().next();
        if previous.is_some() {
            self.delete(id)?;
        }
        Ok(previous)
    }
}
