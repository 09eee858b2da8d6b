use std::collections::HashSet;

use camino::Utf8Path;
use serde_json::Value;

use crate::domain::{CombineMode, QuerySpec, split_input};
use crate::error::GcisError;
use crate::table::Table;

pub const BUSINESS_NO_COLUMN: &str = "統一編號";
pub const COMPANY_NAME_COLUMN: &str = "公司名稱";
pub const DIRECTOR_NAME_COLUMN: &str = "姓名";
pub const REPRESENTATIVE_FOR_COLUMN: &str = "所代表法人";

/// Cell values read as missing, the same set a pandas `read_csv` treats as NaN
/// by default.
pub const NA_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND",
    "1.#QNAN", "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn is_na(cell: &str) -> bool {
    NA_TOKENS.contains(&cell)
}

/// Loads a CSV file with every cell as a string. Cells matching [`NA_TOKENS`]
/// become `Null`, and rows without a value in `id_column` are dropped. Cells
/// past the header width are discarded.
pub fn load_dataset(path: &Utf8Path, id_column: &str) -> Result<Table, GcisError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path.as_std_path())
        .map_err(|err| GcisError::Csv(format!("{path}: {err}")))?;

    let columns = reader
        .headers()
        .map_err(|err| GcisError::Csv(format!("{path}: {err}")))?
        .iter()
        .map(|header| header.trim_start_matches('\u{feff}').to_string())
        .collect::<Vec<_>>();
    let id_index = columns
        .iter()
        .position(|column| column == id_column)
        .ok_or_else(|| GcisError::MissingColumn(id_column.to_string()))?;
    let width = columns.len();

    let mut table = Table::new(columns);
    let mut dropped = 0usize;
    for record in reader.records() {
        let record = record.map_err(|err| GcisError::Csv(format!("{path}: {err}")))?;
        if record.get(id_index).is_none_or(is_na) {
            dropped += 1;
            continue;
        }
        if record.len() > width {
            tracing::debug!(
                path = %path,
                line = record.position().map(|pos| pos.line()),
                cells = record.len(),
                width,
                "row wider than header, extra cells discarded"
            );
        }
        table.push_row(
            record
                .iter()
                .take(width)
                .map(|cell| {
                    if is_na(cell) {
                        Value::Null
                    } else {
                        Value::String(cell.to_string())
                    }
                })
                .collect(),
        );
    }
    tracing::debug!(path = %path, rows = table.len(), dropped, "loaded dataset");
    Ok(table)
}

/// Keeps the rows matching `spec`. Each field tests exact membership of the
/// row's value in the accepted list; an empty spec keeps everything.
pub fn filter(mut table: Table, spec: &QuerySpec) -> Result<Table, GcisError> {
    if spec.is_empty() {
        return Ok(table);
    }

    let tests = spec
        .fields()
        .iter()
        .map(|(field, values)| {
            table
                .column_index(field)
                .map(|index| (index, values.iter().map(String::as_str).collect::<HashSet<_>>()))
                .ok_or_else(|| GcisError::MissingColumn(field.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let matches = |row: &[Value], (index, accepted): &(usize, HashSet<&str>)| {
        row.get(*index)
            .and_then(Value::as_str)
            .is_some_and(|value| accepted.contains(value))
    };

    match spec.mode() {
        CombineMode::Union => table.retain_rows(|row| tests.iter().any(|test| matches(row, test))),
        CombineMode::Intersection => {
            table.retain_rows(|row| tests.iter().all(|test| matches(row, test)))
        }
    }
    Ok(table)
}

/// Filters over the board-of-directors dataset columns.
#[derive(Debug, Clone, Default)]
pub struct BodQuery {
    pub business_no: Option<Vec<String>>,
    pub company_name: Option<Vec<String>>,
    pub directors: Option<Vec<String>>,
    pub representative_for: Option<Vec<String>>,
    pub mode: CombineMode,
}

impl BodQuery {
    /// Builds a query from comma-separated form fields. Blank fields are unset.
    pub fn from_inputs(
        business_no: Option<&str>,
        company_name: Option<&str>,
        directors: Option<&str>,
        representative_for: Option<&str>,
        mode: CombineMode,
    ) -> Self {
        let field = |input: Option<&str>| input.map(split_input).filter(|items| !items.is_empty());
        Self {
            business_no: field(business_no),
            company_name: field(company_name),
            directors: field(directors),
            representative_for: field(representative_for),
            mode,
        }
    }

    /// True when no field has any accepted value.
    pub fn is_empty(&self) -> bool {
        self.fields().all(|(_, values)| values.is_empty())
    }

    fn fields(&self) -> impl Iterator<Item = (&'static str, &[String])> {
        [
            (BUSINESS_NO_COLUMN, &self.business_no),
            (COMPANY_NAME_COLUMN, &self.company_name),
            (DIRECTOR_NAME_COLUMN, &self.directors),
            (REPRESENTATIVE_FOR_COLUMN, &self.representative_for),
        ]
        .into_iter()
        .map(|(column, values)| (column, values.as_deref().unwrap_or_default()))
    }

    /// Fields with no accepted values are left out, so a blank input never
    /// rules out every row.
    pub fn to_spec(&self) -> QuerySpec {
        self.fields()
            .filter(|(_, values)| !values.is_empty())
            .fold(QuerySpec::new(self.mode), |spec, (column, values)| {
                spec.field(column, values.to_vec())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Table {
        let mut table = Table::new(vec!["id".to_string(), "name".to_string()]);
        table.push_row(vec![json!("A"), json!("X")]);
        table.push_row(vec![json!("B"), json!("Y")]);
        table
    }

    #[test]
    fn union_and_intersection() {
        let spec = QuerySpec::new(CombineMode::Union)
            .field("id", vec!["A".to_string()])
            .field("name", vec!["Y".to_string()]);
        assert_eq!(filter(sample(), &spec).unwrap().len(), 2);

        let spec = QuerySpec::new(CombineMode::Intersection)
            .field("id", vec!["A".to_string()])
            .field("name", vec!["Y".to_string()]);
        assert!(filter(sample(), &spec).unwrap().is_empty());
    }

    #[test]
    fn empty_spec_keeps_all_rows() {
        assert_eq!(filter(sample(), &QuerySpec::default()).unwrap(), sample());
    }

    #[test]
    fn unknown_field_is_an_error() {
        let spec = QuerySpec::default().field("missing", vec!["A".to_string()]);
        assert!(matches!(
            filter(sample(), &spec),
            Err(GcisError::MissingColumn(column)) if column == "missing"
        ));
    }

    #[test]
    fn bod_query_maps_columns() {
        let query = BodQuery {
            company_name: Some(vec!["台灣積體電路製造股份有限公司".to_string()]),
            directors: Some(vec!["魏哲家".to_string()]),
            mode: CombineMode::Intersection,
            ..BodQuery::default()
        };
        let spec = query.to_spec();
        assert_eq!(spec.mode(), CombineMode::Intersection);
        let names = spec.fields().iter().map(|(f, _)| f.as_str()).collect::<Vec<_>>();
        assert_eq!(names, [COMPANY_NAME_COLUMN, DIRECTOR_NAME_COLUMN]);
    }

    #[test]
    fn blank_inputs_do_not_constrain_intersection() {
        let query = BodQuery::from_inputs(
            Some(" , "),
            None,
            Some("曾繁城"),
            Some(""),
            CombineMode::Intersection,
        );
        assert_eq!(query.business_no, None);
        assert_eq!(query.representative_for, None);

        let spec = query.to_spec();
        let names = spec.fields().iter().map(|(f, _)| f.as_str()).collect::<Vec<_>>();
        assert_eq!(names, [DIRECTOR_NAME_COLUMN]);

        let mut table = Table::new(vec![
            BUSINESS_NO_COLUMN.to_string(),
            DIRECTOR_NAME_COLUMN.to_string(),
        ]);
        table.push_row(vec![json!("22099131"), json!("曾繁城")]);
        table.push_row(vec![json!("22099131"), json!("魏哲家")]);
        assert_eq!(filter(table, &spec).unwrap().len(), 1);
    }

    #[test]
    fn all_blank_inputs_are_no_query() {
        let blank = BodQuery::from_inputs(Some(""), Some(" , "), None, None, CombineMode::Union);
        assert!(blank.is_empty());
        let query = BodQuery {
            business_no: Some(Vec::new()),
            ..BodQuery::default()
        };
        assert!(query.is_empty());
        assert!(query.to_spec().is_empty());
    }

    fn write_csv(content: &str) -> (tempfile::TempDir, camino::Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(temp.path().join("bod.csv")).unwrap();
        std::fs::write(&path, content).unwrap();
        (temp, path)
    }

    #[test]
    fn na_tokens_are_missing_values() {
        let (_temp, path) = write_csv(
            "\u{feff}統一編號,姓名,所代表法人\n\
             22099131,魏哲家,NA\n\
             N/A,某人,\n\
             nan,某人,\n\
             NULL,某人,\n\
             04541302,洪嘉聰,null\n",
        );
        let table = load_dataset(&path, BUSINESS_NO_COLUMN).unwrap();
        assert_eq!(table.columns()[0], BUSINESS_NO_COLUMN);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, REPRESENTATIVE_FOR_COLUMN), Some(&Value::Null));
        assert_eq!(table.get(1, DIRECTOR_NAME_COLUMN), Some(&json!("洪嘉聰")));
    }

    #[test]
    fn ragged_rows_fit_the_header() {
        let (_temp, path) = write_csv("統一編號,姓名\n22099131,魏哲家,extra\n04541302\n");
        let table = load_dataset(&path, BUSINESS_NO_COLUMN).unwrap();
        assert_eq!(table.rows()[0], vec![json!("22099131"), json!("魏哲家")]);
        assert_eq!(table.rows()[1], vec![json!("04541302"), Value::Null]);
    }
}
