use thiserror::Error;

#[derive(Debug, Error)]
pub enum LmdbError {
    #[error("LMDB error: {0}")]
    Heed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<heed::Error> for LmdbError {
    fn from(e: heed::Error) -> Self {
        LmdbError::Heed(e.to_string())
    }
}

impl From<LmdbError> for provstore_store::StoreError {
    fn from(e: LmdbError) -> Self {
        match e {
            LmdbError::Io(io) => provstore_store::StoreError::Io(io),
            other => provstore_store::StoreError::Backend(other.to_string()),
        }
    }
}
