use heed::MdbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LmdbError {
    #[error("LMDB error: {0}")]
    Heed(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("key already exists: {0}")]
    KeyExists(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database is corrupted: {0}")]
    Corruption(String),

    #[error("arithmetic overflow: {0}")]
    Overflow(String),
}

impl From<heed::Error> for LmdbError {
    fn from(e: heed::Error) -> Self {
        match e {
            heed::Error::Mdb(MdbError::KeyExist) => LmdbError::KeyExists(e.to_string()),
            heed::Error::Mdb(MdbError::Corrupted) => LmdbError::Corruption(e.to_string()),
            other => LmdbError::Heed(other.to_string()),
        }
    }
}

impl From<bincode::Error> for LmdbError {
    fn from(e: bincode::Error) -> Self {
        LmdbError::Serialization(e.to_string())
    }
}

impl From<LmdbError> for pointgate_store::StoreError {
    fn from(e: LmdbError) -> Self {
        use pointgate_store::StoreError;
        match e {
            LmdbError::NotFound(m) => StoreError::NotFound(m),
            LmdbError::KeyExists(m) => StoreError::Duplicate(m),
            LmdbError::Serialization(m) => StoreError::Serialization(m),
            LmdbError::Corruption(m) => StoreError::Corruption(m),
            LmdbError::Overflow(m) => StoreError::Overflow(m),
            LmdbError::Heed(m) => StoreError::Backend(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pointgate_store::StoreError;

    #[test]
    fn key_exist_maps_to_duplicate() {
        let err: StoreError = LmdbError::from(heed::Error::Mdb(MdbError::KeyExist)).into();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[test]
    fn other_heed_errors_map_to_backend() {
        let err: StoreError = LmdbError::from(heed::Error::Mdb(MdbError::MapFull)).into();
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
