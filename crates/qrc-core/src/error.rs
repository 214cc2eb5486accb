use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Rpc(#[from] qrc_rpc::Error),

    #[error("Filter '{filter}' matched {count} components; component names must be unique")]
    MultipleMatch { filter: String, count: usize },

    #[error("Component '{0}' not found")]
    ComponentNotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
