/// Core error type for the forwarder.
///
/// Expected store outcomes travel as `mapping::StoreError` and become command
/// replies; this type covers startup and transport failures. Adapter crates map
/// their client errors into `External`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
