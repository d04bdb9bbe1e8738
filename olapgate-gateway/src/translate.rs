// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! DMV to object-model translation
//!
//! Re-expresses introspection queries in object-model terms for the fallback
//! path. Two shapes translate:
//!
//! ```text
//! SELECT <* | [Col], ...> FROM $SYSTEM.TMSCHEMA_<COLLECTION> [WHERE [Col] = <literal>]
//! EVALUATE INFO.<COLLECTION>()
//! ```
//!
//! Anything else (analytical queries, DISCOVER rowsets, compound predicates)
//! has no translation and the fallback path reports exhaustion.

use olapgate_core::{EngineRows, ModelCollection, ObjectModelRequest, Row};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static DMV_SELECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)^\s*SELECT\s+(?P<cols>.+?)\s+FROM\s+\$SYSTEM\.TMSCHEMA_(?P<rowset>\w+)(?:\s+WHERE\s+(?P<predicate>.+?))?\s*;?\s*$",
    )
    .expect("static regex")
});

static INFO_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*EVALUATE\s+INFO\.(?P<function>\w+)\s*\(\s*\)\s*;?\s*$")
        .expect("static regex")
});

static EQUALITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\[?(?P<column>\w+)\]?\s*=\s*(?P<value>'(?:[^']|'')*'|-?\d+(?:\.\d+)?)$")
        .expect("static regex")
});

static COLUMN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[?(?P<name>\w+)\]?$").expect("static regex"));

/// Equality predicate applied to object-model rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFilter {
    pub column: String,
    pub value: Value,
}

impl RowFilter {
    fn matches(&self, row: &Row) -> bool {
        let Some(actual) = row.get(&self.column) else {
            return false;
        };
        match (&self.value, actual) {
            (Value::Number(expected), Value::Number(actual)) => expected.as_f64() == actual.as_f64(),
            (Value::String(expected), Value::String(actual)) => expected == actual,
            (Value::Number(expected), Value::String(actual)) => {
                actual.parse::<f64>().ok() == expected.as_f64()
            }
            _ => false,
        }
    }
}

/// Object-model equivalent of a DMV-style request.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub collection: ModelCollection,
    /// Projected columns; `None` keeps every column
    pub columns: Option<Vec<String>>,
    pub filter: Option<RowFilter>,
}

impl Translation {
    /// The request to send, given the row cap of the current plan.
    pub fn request(&self, row_limit: Option<usize>) -> ObjectModelRequest {
        ObjectModelRequest {
            collection: self.collection,
            // Filtering happens here, so the engine must not truncate first
            row_limit: if self.filter.is_some() { None } else { row_limit },
        }
    }

    /// Filter and project raw object-model rows.
    pub fn apply(&self, rows: EngineRows) -> EngineRows {
        rows.into_iter()
            .filter(|row| self.filter.as_ref().map_or(true, |f| f.matches(row)))
            .map(|row| match &self.columns {
                Some(columns) => columns
                    .iter()
                    .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
                    .collect(),
                None => row,
            })
            .collect()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DmvTranslator;

impl DmvTranslator {
    pub fn new() -> Self {
        Self
    }

    /// Whether `text` addresses the introspection surface at all.
    pub fn is_dmv(text: &str) -> bool {
        let upper = text.to_ascii_uppercase();
        upper.contains("$SYSTEM.") || INFO_FUNCTION.is_match(text)
    }

    pub fn translate(&self, text: &str) -> Option<Translation> {
        if let Some(caps) = INFO_FUNCTION.captures(text) {
            return Some(Translation {
                collection: collection_from_name(&caps["function"])?,
                columns: None,
                filter: None,
            });
        }

        let caps = DMV_SELECT.captures(text)?;
        let collection = collection_from_name(&caps["rowset"])?;
        let columns = parse_columns(&caps["cols"])?;
        let filter = match caps.name("predicate") {
            Some(predicate) => Some(parse_predicate(predicate.as_str().trim())?),
            None => None,
        };

        Some(Translation {
            collection,
            columns,
            filter,
        })
    }
}

fn collection_from_name(name: &str) -> Option<ModelCollection> {
    match name.to_ascii_uppercase().as_str() {
        "TABLES" => Some(ModelCollection::Tables),
        "COLUMNS" => Some(ModelCollection::Columns),
        "MEASURES" => Some(ModelCollection::Measures),
        "RELATIONSHIPS" => Some(ModelCollection::Relationships),
        "PARTITIONS" => Some(ModelCollection::Partitions),
        "HIERARCHIES" => Some(ModelCollection::Hierarchies),
        "ROLES" => Some(ModelCollection::Roles),
        _ => None,
    }
}

/// `None` outer = untranslatable; `Some(None)` = all columns.
fn parse_columns(list: &str) -> Option<Option<Vec<String>>> {
    let list = list.trim();
    if list == "*" {
        return Some(None);
    }
    list.split(',')
        .map(|part| {
            COLUMN
                .captures(part.trim())
                .map(|caps| caps["name"].to_string())
        })
        .collect::<Option<Vec<_>>>()
        .map(Some)
}

fn parse_predicate(predicate: &str) -> Option<RowFilter> {
    let caps = EQUALITY.captures(predicate)?;
    let raw = &caps["value"];
    let value = if let Some(quoted) = raw.strip_prefix('\'') {
        Value::String(quoted.strip_suffix('\'')?.replace("''", "'"))
    } else {
        serde_json::from_str::<Value>(raw).ok()?
    };
    Some(RowFilter {
        column: caps["column"].to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_translates_select_star() {
        let t = DmvTranslator::new()
            .translate("SELECT * FROM $SYSTEM.TMSCHEMA_TABLES")
            .unwrap();
        assert_eq!(t.collection, ModelCollection::Tables);
        assert!(t.columns.is_none());
        assert!(t.filter.is_none());
        assert_eq!(t.request(Some(10)).row_limit, Some(10));
    }

    #[test]
    fn test_translates_projection_and_filter() {
        let t = DmvTranslator::new()
            .translate("select [Name], [ExplicitDataType] from $system.tmschema_columns where [TableName] = 'Sales''s';")
            .unwrap();
        assert_eq!(t.collection, ModelCollection::Columns);
        assert_eq!(
            t.columns,
            Some(vec!["Name".to_string(), "ExplicitDataType".to_string()])
        );
        assert_eq!(
            t.filter,
            Some(RowFilter {
                column: "TableName".to_string(),
                value: json!("Sales's"),
            })
        );
        assert_eq!(t.request(Some(10)).row_limit, None);
    }

    #[test]
    fn test_apply_filters_and_projects() {
        let t = DmvTranslator::new()
            .translate("SELECT [Name] FROM $SYSTEM.TMSCHEMA_MEASURES WHERE [TableID] = 3")
            .unwrap();
        let rows = vec![
            row(json!({"Name": "Revenue", "TableID": 3, "Expression": "SUM(x)"})),
            row(json!({"Name": "Cost", "TableID": 4, "Expression": "SUM(y)"})),
            row(json!({"Name": "Margin", "TableID": "3", "Expression": "x-y"})),
        ];
        let out = t.apply(rows);
        assert_eq!(out, vec![row(json!({"Name": "Revenue"})), row(json!({"Name": "Margin"}))]);
    }

    #[test]
    fn test_info_functions() {
        let t = DmvTranslator::new().translate("EVALUATE INFO.RELATIONSHIPS()").unwrap();
        assert_eq!(t.collection, ModelCollection::Relationships);
        assert!(DmvTranslator::is_dmv("EVALUATE INFO.TABLES()"));
    }

    #[test]
    fn test_untranslatable_requests() {
        let translator = DmvTranslator::new();
        assert!(translator.translate("EVALUATE Sales").is_none());
        assert!(translator.translate("SELECT * FROM $SYSTEM.DISCOVER_SESSIONS").is_none());
        assert!(translator
            .translate("SELECT * FROM $SYSTEM.TMSCHEMA_TABLES WHERE [A] = 1 AND [B] = 2")
            .is_none());
        assert!(translator.translate("SELECT * FROM $SYSTEM.TMSCHEMA_CULTURES").is_none());
        assert!(!DmvTranslator::is_dmv("EVALUATE Sales"));
    }
}
