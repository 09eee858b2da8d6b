use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub const MAX_SKIP: u32 = 500_000;
pub const MAX_TOP: u32 = 1_000;

/// Bounds of a single API request: rows to skip and rows to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub skip: u32,
    pub top: u32,
}

impl Cursor {
    /// `skip` is clamped to `[0, 500000]` (absent is 0), `top` to `[1, 1000]`
    /// (absent is 1000).
    pub fn clamp(skip: Option<i64>, top: Option<i64>) -> Self {
        let skip = match skip {
            None => 0,
            Some(value) if value < 0 => 0,
            Some(value) if value > MAX_SKIP as i64 => MAX_SKIP,
            Some(value) => value as u32,
        };
        let top = match top {
            None => MAX_TOP,
            Some(value) if value > MAX_TOP as i64 => MAX_TOP,
            Some(value) if value <= 0 => 1,
            Some(value) => value as u32,
        };
        Self { skip, top }
    }

    pub fn advance(self) -> Self {
        Self {
            skip: self.skip + self.top,
            top: self.top,
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::clamp(None, None)
    }
}

/// Caller-supplied paging window, before clamping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub skip: Option<i64>,
    pub top: Option<i64>,
}

impl PageRequest {
    pub fn cursor(&self) -> Cursor {
        Cursor::clamp(self.skip, self.top)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    /// A row matches when any requested field matches.
    #[default]
    Union,
    /// A row matches when every requested field matches.
    Intersection,
}

impl fmt::Display for CombineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombineMode::Union => write!(f, "union"),
            CombineMode::Intersection => write!(f, "intersection"),
        }
    }
}

/// Field name to accepted values, plus how per-field matches combine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySpec {
    fields: Vec<(String, Vec<String>)>,
    mode: CombineMode,
}

impl QuerySpec {
    pub fn new(mode: CombineMode) -> Self {
        Self {
            fields: Vec::new(),
            mode,
        }
    }

    pub fn field(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.fields.push((name.into(), values));
        self
    }

    pub fn fields(&self) -> &[(String, Vec<String>)] {
        &self.fields
    }

    pub fn mode(&self) -> CombineMode {
        self.mode
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Splits comma-separated form input into trimmed items. Blank input yields no
/// items.
pub fn split_input(input: &str) -> Vec<String> {
    if input.trim().is_empty() {
        return Vec::new();
    }
    input
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}
