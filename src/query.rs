use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::domain::{Cursor, PageRequest};
use crate::error::GcisError;
use crate::gcis::GcisClient;
use crate::table::Table;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex"));

/// Result of a remote query. A failed query never carries partial rows.
#[derive(Debug)]
pub enum QueryOutcome {
    Found(Table),
    Empty,
    Failed(GcisError),
}

impl QueryOutcome {
    pub fn table(&self) -> Option<&Table> {
        match self {
            QueryOutcome::Found(table) => Some(table),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, QueryOutcome::Failed(_))
    }

    /// `Ok(None)` for a query that matched nothing.
    pub fn into_result(self) -> Result<Option<Table>, GcisError> {
        match self {
            QueryOutcome::Found(table) => Ok(Some(table)),
            QueryOutcome::Empty => Ok(None),
            QueryOutcome::Failed(err) => Err(err),
        }
    }
}

/// Named values substituted into an endpoint template.
pub type QueryParams = BTreeMap<String, String>;

/// Replaces every `{name}` in `template` with `params[name]`.
pub fn render_template(template: &str, params: &QueryParams) -> Result<String, GcisError> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for captures in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let value = params
            .get(name.as_str())
            .ok_or_else(|| GcisError::MissingTemplateParam(name.as_str().to_string()))?;
        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(value);
        last = whole.end();
    }
    rendered.push_str(&template[last..]);
    Ok(rendered)
}

/// Parses one page body: a JSON array of objects. A blank body or `null` is an
/// empty page.
pub fn parse_page(body: &str) -> Result<Vec<Map<String, Value>>, GcisError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value =
        serde_json::from_str(body).map_err(|err| GcisError::InvalidJson(err.to_string()))?;
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record),
                other => Err(GcisError::UnexpectedPayload(format!(
                    "expected an object row, got {other}"
                ))),
            })
            .collect(),
        other => Err(GcisError::UnexpectedPayload(format!(
            "expected an array of rows, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Runs `template` page by page until a page shorter than `top` arrives.
///
/// The server is assumed never to return a short page while more rows
/// follow. When the total is an exact multiple of `top` the last request
/// returns no rows.
pub fn run_paginated<C: GcisClient + ?Sized>(
    client: &C,
    template: &str,
    params: &QueryParams,
    page: PageRequest,
) -> QueryOutcome {
    match collect_pages(client, template, params, page.cursor()) {
        Ok(table) if table.is_empty() => QueryOutcome::Empty,
        Ok(table) => QueryOutcome::Found(table),
        Err(err) => {
            tracing::warn!(error = %err, "GCIS query aborted");
            QueryOutcome::Failed(err)
        }
    }
}

fn collect_pages<C: GcisClient + ?Sized>(
    client: &C,
    template: &str,
    params: &QueryParams,
    mut cursor: Cursor,
) -> Result<Table, GcisError> {
    let mut params = params.clone();
    let mut table = Table::default();
    loop {
        params.insert("skip".to_string(), cursor.skip.to_string());
        params.insert("top".to_string(), cursor.top.to_string());
        let url = render_template(template, &params)?;
        let records = parse_page(&client.fetch_page(&url)?)?;
        let count = records.len();
        tracing::debug!(skip = cursor.skip, top = cursor.top, rows = count, "fetched page");
        table.append(Table::from_records(records));

        if count < cursor.top as usize {
            return Ok(table);
        }
        cursor = cursor.advance();
    }
}
