use std::sync::Mutex;

use assert_matches::assert_matches;
use serde_json::{Value, json};

use gcis_query::domain::PageRequest;
use gcis_query::error::GcisError;
use gcis_query::gcis::GcisClient;
use gcis_query::query::{QueryOutcome, QueryParams, run_paginated};

const TEMPLATE: &str = "mock://rows?$filter=Business_Accounting_NO%20eq%20{business_no}&$skip={skip}&$top={top}";

/// Serves `total` rows, honouring `$skip` and `$top` like the GCIS API.
struct PagedApi {
    total: usize,
    fail_on_call: Option<usize>,
    calls: Mutex<Vec<String>>,
}

impl PagedApi {
    fn new(total: usize) -> Self {
        Self {
            total,
            fail_on_call: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing_on(total: usize, call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::new(total)
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn query_value(url: &str, key: &str) -> usize {
    let prefix = format!("{key}=");
    url.split(['?', '&'])
        .find_map(|part| part.strip_prefix(prefix.as_str()))
        .unwrap()
        .parse()
        .unwrap()
}

impl GcisClient for PagedApi {
    fn download(&self, _url: &str) -> Result<Vec<u8>, GcisError> {
        Err(GcisError::Http("not used".to_string()))
    }

    fn fetch_page(&self, url: &str) -> Result<String, GcisError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(url.to_string());
        if Some(calls.len()) == self.fail_on_call {
            return Err(GcisError::Status {
                status: 500,
                message: "internal error".to_string(),
            });
        }
        let skip = query_value(url, "$skip");
        let top = query_value(url, "$top");
        let rows = (skip..(skip + top).min(self.total))
            .map(|seq| json!({"Business_Accounting_NO": "22099131", "Seq_No": seq}))
            .collect::<Vec<_>>();
        Ok(serde_json::to_string(&rows).unwrap())
    }
}

fn params() -> QueryParams {
    QueryParams::from([("business_no".to_string(), "22099131".to_string())])
}

fn page(top: i64) -> PageRequest {
    PageRequest {
        skip: None,
        top: Some(top),
    }
}

#[test]
fn request_count_follows_page_size() {
    for top in [1usize, 3, 7, 1000] {
        for total in [0usize, 1, 2, 3, 6, 7, 10, 21, 1000, 2500] {
            if top == 1 && total > 100 {
                continue;
            }
            let api = PagedApi::new(total);
            let outcome = run_paginated(&api, TEMPLATE, &params(), page(top as i64));

            // ceil(total / top) full or partial pages, plus one empty page
            // when total is a multiple of top
            assert_eq!(api.calls().len(), total / top + 1, "top={top} total={total}");
            match outcome {
                QueryOutcome::Found(table) => {
                    assert_eq!(table.len(), total);
                    let last = table.get(total - 1, "Seq_No").cloned();
                    assert_eq!(last, Some(json!(total - 1)));
                }
                QueryOutcome::Empty => assert_eq!(total, 0),
                QueryOutcome::Failed(err) => panic!("unexpected failure: {err}"),
            }
        }
    }
}

#[test]
fn skip_advances_by_top() {
    let api = PagedApi::new(5);
    let outcome = run_paginated(
        &api,
        TEMPLATE,
        &params(),
        PageRequest {
            skip: Some(-5),
            top: Some(2),
        },
    );
    assert_matches!(outcome, QueryOutcome::Found(ref table) if table.len() == 5);
    let skips = api
        .calls()
        .iter()
        .map(|url| query_value(url, "$skip"))
        .collect::<Vec<_>>();
    assert_eq!(skips, vec![0, 2, 4]);
}

#[test]
fn failure_mid_query_discards_partial_rows() {
    let api = PagedApi::failing_on(6, 2);
    let outcome = run_paginated(&api, TEMPLATE, &params(), page(2));
    assert_matches!(
        outcome,
        QueryOutcome::Failed(GcisError::Status { status: 500, .. })
    );
    assert_eq!(api.calls().len(), 2);
}

#[test]
fn zero_matches_is_distinct_from_failure() {
    let api = PagedApi::new(0);
    let outcome = run_paginated(&api, TEMPLATE, &params(), PageRequest::default());
    assert_matches!(outcome, QueryOutcome::Empty);
    assert!(api.calls()[0].ends_with("$skip=0&$top=1000"));
}

struct Body(&'static str);

impl GcisClient for Body {
    fn download(&self, _url: &str) -> Result<Vec<u8>, GcisError> {
        Err(GcisError::Http("not used".to_string()))
    }

    fn fetch_page(&self, _url: &str) -> Result<String, GcisError> {
        Ok(self.0.to_string())
    }
}

#[test]
fn malformed_json_fails_the_query() {
    let outcome = run_paginated(&Body("[{\"a\": 1"), TEMPLATE, &params(), page(10));
    assert_matches!(outcome, QueryOutcome::Failed(GcisError::InvalidJson(_)));
}

#[test]
fn blank_body_is_an_empty_page() {
    let outcome = run_paginated(&Body(""), TEMPLATE, &params(), page(10));
    assert_matches!(outcome, QueryOutcome::Empty);
}

#[test]
fn missing_template_parameter_fails_the_query() {
    let outcome = run_paginated(&Body("[]"), TEMPLATE, &QueryParams::new(), page(10));
    assert_matches!(
        outcome,
        QueryOutcome::Failed(GcisError::MissingTemplateParam(ref name)) if name == "business_no"
    );
}

#[test]
fn native_json_types_are_kept() {
    let body = r#"[{"Company_Name":"台灣積體電路製造股份有限公司","Capital_Stock_Amount":280500000000,"Active":true}]"#;
    let outcome = run_paginated(&Body(body), TEMPLATE, &params(), page(10));
    let table = outcome.into_result().unwrap().unwrap();
    assert_eq!(
        table.columns(),
        ["Company_Name", "Capital_Stock_Amount", "Active"]
    );
    assert_eq!(
        table.get(0, "Capital_Stock_Amount"),
        Some(&json!(280500000000u64))
    );
    assert_eq!(table.get(0, "Active"), Some(&Value::Bool(true)));
}
