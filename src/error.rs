use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GcisError {
    #[error("GCIS request failed: {0}")]
    Http(String),

    #[error("GCIS returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("GCIS returned malformed JSON: {0}")]
    InvalidJson(String),

    #[error("unexpected GCIS payload: {0}")]
    UnexpectedPayload(String),

    #[error("endpoint template references unknown parameter: {0}")]
    MissingTemplateParam(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("archive contains no files: {0}")]
    EmptyArchive(String),

    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("invalid timestamp format: {0}")]
    InvalidTimestampFormat(String),

    #[error("unsupported encoding: {0}")]
    InvalidEncoding(String),

    #[error("failed to read CSV dataset: {0}")]
    Csv(String),

    #[error("column not found in dataset: {0}")]
    MissingColumn(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}
