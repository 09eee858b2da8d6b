use std::fs;
use std::io::{self, Write};

use camino::Utf8Path;
use clap::ValueEnum;
use serde::Serialize;

use crate::app::{BatchResult, DatasetInfo};
use crate::error::GcisError;
use crate::table::Table;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_table(table: &Table) -> io::Result<()> {
        Self::print_json(&table.records())
    }

    pub fn print_batch(result: &BatchResult) -> io::Result<()> {
        #[derive(Serialize)]
        struct Failure<'a> {
            input: &'a str,
            error: String,
        }

        #[derive(Serialize)]
        struct Batch<'a> {
            rows: Vec<serde_json::Map<String, serde_json::Value>>,
            empty: &'a [String],
            failures: Vec<Failure<'a>>,
        }

        Self::print_json(&Batch {
            rows: result.table.records(),
            empty: &result.empty,
            failures: result
                .failures
                .iter()
                .map(|failure| Failure {
                    input: &failure.input,
                    error: failure.error.to_string(),
                })
                .collect(),
        })
    }

    pub fn print_dataset_info(info: &DatasetInfo) -> io::Result<()> {
        Self::print_json(info)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Writes exported CSV bytes either to a file or to stdout.
pub struct CsvOutput;

impl CsvOutput {
    pub fn write(bytes: &[u8], destination: Option<&Utf8Path>) -> Result<(), GcisError> {
        match destination {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
                    fs::create_dir_all(parent.as_std_path())
                        .map_err(|err| GcisError::Filesystem(err.to_string()))?;
                }
                fs::write(path.as_std_path(), bytes)
                    .map_err(|err| GcisError::Filesystem(format!("write {path}: {err}")))
            }
            None => io::stdout()
                .write_all(bytes)
                .map_err(|err| GcisError::Filesystem(err.to_string())),
        }
    }
}
