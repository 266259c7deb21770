use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Dump parse error at line {line}: {message}")]
    DumpParse { line: usize, message: String },

    #[error("SMF parse error: {0}")]
    SmfParse(String),

    #[error("gbsplay error: {0}")]
    Gbsplay(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
