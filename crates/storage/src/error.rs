/// All errors that can be returned by an object store or the result store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend could not be reached or refused the request. Transient;
    /// callers may retry.
    #[error("object store unavailable: {0}")]
    Unavailable(String),

    /// A stored object could not be decoded. Retrying will not help.
    #[error("corrupted object {key}: {message}")]
    Corrupted { key: String, message: String },

    /// The key cannot be represented by this backend (empty, absolute,
    /// or containing `..` segments).
    #[error("invalid object key: {key:?}")]
    InvalidKey { key: String },

    /// The record is larger than the body limit even with its bulky output
    /// removed.
    #[error("record {key} is {size} bytes without output, limit is {limit}")]
    BodyTooLarge {
        key: String,
        size: usize,
        limit: usize,
    },
}

impl StorageError {
    /// Whether the operation may succeed if attempted again.
    pub fn is_retriable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_retriable() {
        assert!(StorageError::Unavailable("timeout".into()).is_retriable());
        assert!(!StorageError::Corrupted {
            key: "k".into(),
            message: "bad json".into()
        }
        .is_retriable());
        assert!(!StorageError::InvalidKey { key: "/x".into() }.is_retriable());
    }

    #[test]
    fn display_names_the_key() {
        let err = StorageError::Corrupted {
            key: "checks/a/1.json".into(),
            message: "expected value".into(),
        };
        assert_eq!(
            err.to_string(),
            "corrupted object checks/a/1.json: expected value"
        );
    }
}
