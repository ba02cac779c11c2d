use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("store failure: {0}")]
    Store(#[from] provstore_store::StoreError),

    #[error("request canceled before it was serviced")]
    Canceled,

    #[error("provider manager is closed")]
    Closed,

    #[error("config error: {0}")]
    Config(String),
}
