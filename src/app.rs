use std::sync::Arc;

use camino::Utf8PathBuf;
use serde::Serialize;
use serde_json::Value;

use crate::config::ResolvedConfig;
use crate::domain::PageRequest;
use crate::endpoints::{Endpoint, business_no_params, company_name_params};
use crate::error::GcisError;
use crate::filter::{BUSINESS_NO_COLUMN, BodQuery, filter, load_dataset};
use crate::gcis::GcisClient;
use crate::query::{QueryOutcome, QueryParams, run_paginated};
use crate::store::{Clock, DatasetCache};
use crate::table::{CsvExportCache, Table};

/// Column the BOD lookups are tagged with; the API response omits it.
pub const BOD_TAG_COLUMN: &str = "Business_Accounting_NO";

/// Per-input outcomes of a batch lookup, concatenated and de-duplicated.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub table: Table,
    pub failures: Vec<BatchFailure>,
    pub empty: Vec<String>,
}

#[derive(Debug)]
pub struct BatchFailure {
    pub input: String,
    pub error: GcisError,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetInfo {
    pub current: String,
    pub snapshots: Vec<String>,
}

pub struct App<C: GcisClient> {
    client: C,
    config: ResolvedConfig,
    cache: DatasetCache,
    exports: CsvExportCache,
}

impl<C: GcisClient> App<C> {
    pub fn new(client: C, config: ResolvedConfig) -> Self {
        let cache = DatasetCache::new(config.cache_policy.clone())
            .with_repair(config.repair_strategy());
        Self {
            client,
            config,
            cache,
            exports: CsvExportCache::new(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.cache = self.cache.with_clock(clock);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn search_company_by_business_no(
        &self,
        business_no: &str,
        page: PageRequest,
    ) -> QueryOutcome {
        self.run(
            Endpoint::CompanyByBusinessNo,
            business_no_params(business_no),
            page,
        )
    }

    /// Keyword search over company names, restricted to `company_status`
    /// (`01`, approved, when `None`).
    pub fn search_company_by_name(
        &self,
        company_name: &str,
        company_status: Option<&str>,
        page: PageRequest,
    ) -> QueryOutcome {
        let status = company_status.unwrap_or(&self.config.company_status);
        self.run(
            Endpoint::CompanyByName,
            company_name_params(company_name, status),
            page,
        )
    }

    pub fn search_bod_by_business_no(&self, business_no: &str, page: PageRequest) -> QueryOutcome {
        self.run(
            Endpoint::BodByBusinessNo,
            business_no_params(business_no),
            page,
        )
    }

    fn run(
        &self,
        endpoint: Endpoint,
        params: QueryParams,
        page: PageRequest,
    ) -> QueryOutcome {
        let template = endpoint.template(&self.config.api_base);
        run_paginated(&self.client, &template, &params, page)
    }

    /// Path of the current dataset snapshot, downloading it if needed.
    pub fn fetch_bod_dataset(&self) -> Result<Utf8PathBuf, GcisError> {
        self.cache.ensure_fresh(
            &self.client,
            &self.config.dataset_path,
            &self.config.dataset_url,
        )
    }

    pub fn search_bod_dataset(&self, query: &BodQuery) -> Result<Table, GcisError> {
        let path = self.fetch_bod_dataset()?;
        let table = load_dataset(&path, BUSINESS_NO_COLUMN)?;
        filter(table, &query.to_spec())
    }

    pub fn dataset_info(&self) -> Result<DatasetInfo, GcisError> {
        let current = self.cache.current_path(&self.config.dataset_path);
        let snapshots = self.cache.list_snapshots(&self.config.dataset_path)?;
        Ok(DatasetInfo {
            current: current.to_string(),
            snapshots: snapshots.into_iter().map(|path| path.to_string()).collect(),
        })
    }

    /// CSV bytes for `table`, reused for as long as this `App` lives when the
    /// same table is exported again.
    pub fn export_csv(&self, table: &Table, index: bool) -> Result<Arc<[u8]>, GcisError> {
        self.exports.get_or_export(table, index)
    }

    pub fn lookup_companies(&self, business_nos: &[String]) -> BatchResult {
        batch(business_nos, None, |id| {
            self.search_company_by_business_no(id, PageRequest::default())
        })
    }

    pub fn lookup_keywords(
        &self,
        company_names: &[String],
        company_status: Option<&str>,
    ) -> BatchResult {
        batch(company_names, None, |name| {
            self.search_company_by_name(name, company_status, PageRequest::default())
        })
    }

    /// Each result set is tagged with the business number it was queried with.
    pub fn lookup_bods(&self, business_nos: &[String]) -> BatchResult {
        batch(business_nos, Some(BOD_TAG_COLUMN), |id| {
            self.search_bod_by_business_no(id, PageRequest::default())
        })
    }
}

fn batch(
    inputs: &[String],
    tag: Option<&str>,
    mut run: impl FnMut(&str) -> QueryOutcome,
) -> BatchResult {
    let mut tables = Vec::new();
    let mut result = BatchResult::default();
    for input in inputs {
        match run(input) {
            QueryOutcome::Found(mut table) => {
                if let Some(column) = tag {
                    table.insert_column(0, column, Value::String(input.clone()));
                }
                tables.push(table);
            }
            QueryOutcome::Empty => {
                tracing::debug!(input = input.as_str(), "no matching rows");
                result.empty.push(input.clone());
            }
            QueryOutcome::Failed(error) => {
                tracing::warn!(input = input.as_str(), error = %error, "lookup failed");
                result.failures.push(BatchFailure {
                    input: input.clone(),
                    error,
                });
            }
        }
    }
    result.table = Table::concat(tables);
    result.table.dedup_rows();
    result
}
