//! Reshape a shared-view payload into rows keyed by column name.
//!
//! The payload nests the table under `data.table`: `columns` carry ids,
//! names and (for select fields) a `typeOptions.choices` map of choice id to
//! choice; `rows` carry `cellValuesByColumnId`.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TableError {
    #[error("payload has no {0}")]
    Missing(&'static str),

    #[error("malformed {0}")]
    Malformed(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedTable {
    pub columns: Vec<Column>,
    /// One map per record: column name to value, plus the record `id`.
    pub rows: Vec<Map<String, Value>>,
}

impl SharedTable {
    pub fn from_payload(payload: &Value) -> Result<Self, TableError> {
        let table = payload
            .pointer("/data/table")
            .ok_or(TableError::Missing("data.table"))?;
        let raw_columns = table
            .get("columns")
            .ok_or(TableError::Missing("data.table.columns"))?
            .as_array()
            .ok_or(TableError::Malformed("data.table.columns"))?;
        let raw_rows = table
            .get("rows")
            .ok_or(TableError::Missing("data.table.rows"))?
            .as_array()
            .ok_or(TableError::Malformed("data.table.rows"))?;

        let mut columns = Vec::with_capacity(raw_columns.len());
        let mut names: HashMap<&str, &str> = HashMap::new();
        let mut choices: HashMap<&str, HashMap<&str, &str>> = HashMap::new();
        for col in raw_columns {
            let id = col
                .get("id")
                .and_then(Value::as_str)
                .ok_or(TableError::Malformed("column id"))?;
            let name = col.get("name").and_then(Value::as_str).unwrap_or(id);
            names.insert(id, name);
            columns.push(Column {
                id: id.to_string(),
                name: name.to_string(),
            });

            if let Some(map) = col.pointer("/typeOptions/choices").and_then(Value::as_object) {
                let by_id = map
                    .iter()
                    .filter_map(|(choice_id, choice)| {
                        let label = choice.get("name").and_then(Value::as_str)?;
                        Some((choice_id.as_str(), label))
                    })
                    .collect();
                choices.insert(id, by_id);
            }
        }

        let mut rows = Vec::with_capacity(raw_rows.len());
        for raw in raw_rows {
            let mut row = Map::new();
            if let Some(id) = raw.get("id") {
                row.insert("id".to_string(), id.clone());
            }
            let cells = match raw.get("cellValuesByColumnId") {
                Some(Value::Object(cells)) => cells,
                Some(_) => return Err(TableError::Malformed("cellValuesByColumnId")),
                None => {
                    rows.push(row);
                    continue;
                }
            };
            for (col_id, value) in cells {
                let name = names.get(col_id.as_str()).copied().unwrap_or(col_id.as_str());
                let value = match choices.get(col_id.as_str()) {
                    Some(by_id) => resolve_choices(value, by_id),
                    None => value.clone(),
                };
                row.insert(name.to_string(), value);
            }
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Swap choice ids for their labels; unknown ids are kept as-is.
fn resolve_choices(value: &Value, by_id: &HashMap<&str, &str>) -> Value {
    match value {
        Value::String(id) => by_id
            .get(id.as_str())
            .map(|label| Value::String(label.to_string()))
            .unwrap_or_else(|| value.clone()),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| resolve_choices(v, by_id)).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "msg": "SUCCESS",
            "data": {
                "table": {
                    "columns": [
                        { "id": "fldCompany", "name": "Company", "type": "text" },
                        { "id": "fldCount", "name": "# Laid Off", "type": "number" },
                        {
                            "id": "fldIndustry", "name": "Industry", "type": "select",
                            "typeOptions": { "choices": {
                                "selRetail": { "id": "selRetail", "name": "Retail" },
                                "selFinance": { "id": "selFinance", "name": "Finance" }
                            } }
                        },
                        {
                            "id": "fldLocation", "name": "Location HQ", "type": "multiSelect",
                            "typeOptions": { "choices": {
                                "selSF": { "id": "selSF", "name": "SF Bay Area" },
                                "selNYC": { "id": "selNYC", "name": "New York City" }
                            } }
                        }
                    ],
                    "rows": [
                        {
                            "id": "rec1",
                            "cellValuesByColumnId": {
                                "fldCompany": "Acme",
                                "fldCount": 120,
                                "fldIndustry": "selRetail",
                                "fldLocation": ["selSF", "selNYC"]
                            }
                        },
                        {
                            "id": "rec2",
                            "cellValuesByColumnId": {
                                "fldCompany": "Globex",
                                "fldIndustry": "selUnknown"
                            }
                        }
                    ]
                }
            }
        })
    }

    #[test]
    fn test_rows_use_column_and_choice_names() {
        let table = SharedTable::from_payload(&payload()).unwrap();
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            vec!["Company", "# Laid Off", "Industry", "Location HQ"]
        );
        assert_eq!(table.rows.len(), 2);

        let first = &table.rows[0];
        assert_eq!(first["id"], "rec1");
        assert_eq!(first["Company"], "Acme");
        assert_eq!(first["# Laid Off"], 120);
        assert_eq!(first["Industry"], "Retail");
        assert_eq!(first["Location HQ"], json!(["SF Bay Area", "New York City"]));
    }

    #[test]
    fn test_unknown_choice_ids_are_kept() {
        let table = SharedTable::from_payload(&payload()).unwrap();
        assert_eq!(table.rows[1]["Industry"], "selUnknown");
        assert!(table.rows[1].get("# Laid Off").is_none());
    }

    #[test]
    fn test_wrong_shape_is_an_error() {
        assert_eq!(
            SharedTable::from_payload(&json!({"data": {}})),
            Err(TableError::Missing("data.table"))
        );
        assert_eq!(
            SharedTable::from_payload(&json!({"data": {"table": {"columns": {}, "rows": []}}})),
            Err(TableError::Malformed("data.table.columns"))
        );
        assert_eq!(
            SharedTable::from_payload(&json!({"data": {"table": {"columns": []}}})),
            Err(TableError::Missing("data.table.rows"))
        );
    }
}
