//! Aggregate Table Module
//! Holds every flattened row of a run and exposes column-wise views for export.

use crate::data::record::passthrough_text;
use polars::prelude::*;
use serde_json::{Map, Value};

/// One normalized slider reading.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRow {
    pub user: String,
    pub round: u32,
    pub iteration: u32,
    pub valence: Option<f64>,
    pub arousal: Option<f64>,
    pub time: Option<Value>,
    pub risk: Option<Value>,
    pub arrival: Option<Value>,
    pub target_valence: Option<f64>,
    pub target_arousal: Option<f64>,
    pub source_file: String,
    pub global_id: u64,
    pub row_id: u64,
}

/// Output columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    User,
    Round,
    Iteration,
    Valence,
    Arousal,
    Time,
    Risk,
    Arrival,
    TargetValence,
    TargetArousal,
    SourceFile,
    GlobalId,
    RowId,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::User => "user",
            Field::Round => "round",
            Field::Iteration => "iteration",
            Field::Valence => "valence",
            Field::Arousal => "arousal",
            Field::Time => "time",
            Field::Risk => "risk",
            Field::Arrival => "arrival",
            Field::TargetValence => "target_valence",
            Field::TargetArousal => "target_arousal",
            Field::SourceFile => "source_file",
            Field::GlobalId => "global_id",
            Field::RowId => "row_id",
        }
    }

    /// Auxiliary fields copied through from the raw records.
    pub fn is_passthrough(self) -> bool {
        matches!(self, Field::Time | Field::Risk | Field::Arrival)
    }

    /// Value of this column for one row, in JSON form.
    pub fn json_value(self, row: &FlatRow) -> Value {
        let number = |v: Option<f64>| v.map(Value::from).unwrap_or(Value::Null);
        let raw = |v: &Option<Value>| v.clone().unwrap_or(Value::Null);

        match self {
            Field::User => Value::from(row.user.as_str()),
            Field::Round => Value::from(row.round),
            Field::Iteration => Value::from(row.iteration),
            Field::Valence => number(row.valence),
            Field::Arousal => number(row.arousal),
            Field::Time => raw(&row.time),
            Field::Risk => raw(&row.risk),
            Field::Arrival => raw(&row.arrival),
            Field::TargetValence => number(row.target_valence),
            Field::TargetArousal => number(row.target_arousal),
            Field::SourceFile => Value::from(row.source_file.as_str()),
            Field::GlobalId => Value::from(row.global_id),
            Field::RowId => Value::from(row.row_id),
        }
    }

    /// Build a polars column holding this field for every row.
    fn column(self, rows: &[FlatRow]) -> Column {
        let name: PlSmallStr = self.name().into();
        let text = |get: fn(&FlatRow) -> &str| -> Vec<String> {
            rows.iter().map(|r| get(r).to_string()).collect()
        };
        let index = |get: fn(&FlatRow) -> u32| -> Vec<u32> { rows.iter().map(get).collect() };
        let id = |get: fn(&FlatRow) -> u64| -> Vec<u64> { rows.iter().map(get).collect() };
        let number = |get: fn(&FlatRow) -> Option<f64>| -> Vec<Option<f64>> {
            rows.iter().map(get).collect()
        };
        let passthrough = |get: fn(&FlatRow) -> &Option<Value>| -> Vec<Option<String>> {
            rows.iter()
                .map(|r| get(r).as_ref().and_then(passthrough_text))
                .collect()
        };

        match self {
            Field::User => Column::new(name, text(|r| r.user.as_str())),
            Field::Round => Column::new(name, index(|r| r.round)),
            Field::Iteration => Column::new(name, index(|r| r.iteration)),
            Field::Valence => Column::new(name, number(|r| r.valence)),
            Field::Arousal => Column::new(name, number(|r| r.arousal)),
            Field::Time => Column::new(name, passthrough(|r| &r.time)),
            Field::Risk => Column::new(name, passthrough(|r| &r.risk)),
            Field::Arrival => Column::new(name, passthrough(|r| &r.arrival)),
            Field::TargetValence => Column::new(name, number(|r| r.target_valence)),
            Field::TargetArousal => Column::new(name, number(|r| r.target_arousal)),
            Field::SourceFile => Column::new(name, text(|r| r.source_file.as_str())),
            Field::GlobalId => Column::new(name, id(|r| r.global_id)),
            Field::RowId => Column::new(name, id(|r| r.row_id)),
        }
    }
}

/// All rows of a run, in file-processing order then within-file order.
#[derive(Debug, Default)]
pub struct AggregateTable {
    rows: Vec<FlatRow>,
}

impl AggregateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one file's rows.
    pub fn extend(&mut self, rows: Vec<FlatRow>) {
        self.rows.extend(rows);
    }

    pub fn rows(&self) -> &[FlatRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct users in order of first appearance.
    pub fn users(&self) -> Vec<&str> {
        let mut users: Vec<&str> = Vec::new();
        for row in &self.rows {
            if !users.contains(&row.user.as_str()) {
                users.push(&row.user);
            }
        }
        users
    }

    /// Rows belonging to `user`, in table order.
    pub fn rows_for_user<'a>(&'a self, user: &'a str) -> impl Iterator<Item = &'a FlatRow> + 'a {
        self.rows.iter().filter(move |r| r.user == user)
    }

    /// Column-oriented view restricted to `fields`.
    pub fn to_dataframe(&self, fields: &[Field]) -> PolarsResult<DataFrame> {
        let columns: Vec<Column> = fields.iter().map(|f| f.column(&self.rows)).collect();
        DataFrame::new(columns)
    }

    /// Array-of-objects view restricted to `fields`, keys in field order.
    pub fn to_json_records(&self, fields: &[Field]) -> Value {
        let records = self
            .rows
            .iter()
            .map(|row| {
                let mut object = Map::new();
                for field in fields {
                    object.insert(field.name().to_string(), field.json_value(row));
                }
                Value::Object(object)
            })
            .collect();
        Value::Array(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(user: &str, round: u32, iteration: u32, valence: Option<f64>) -> FlatRow {
        FlatRow {
            user: user.to_string(),
            round,
            iteration,
            valence,
            arousal: Some(40.0),
            time: Some(json!(12)),
            risk: None,
            arrival: Some(json!("left")),
            target_valence: None,
            target_arousal: None,
            source_file: format!("{}.json", user),
            global_id: 0,
            row_id: 0,
        }
    }

    fn sample() -> AggregateTable {
        let mut table = AggregateTable::new();
        table.extend(vec![row("B", 0, 0, Some(1.0)), row("B", 0, 1, None)]);
        table.extend(vec![row("A", 0, 0, Some(3.0))]);
        table.extend(vec![row("B", 1, 0, Some(4.0))]);
        table
    }

    #[test]
    fn test_extend_preserves_order() {
        let table = sample();
        assert_eq!(table.len(), 4);
        let users: Vec<&str> = table.rows().iter().map(|r| r.user.as_str()).collect();
        assert_eq!(users, vec!["B", "B", "A", "B"]);
    }

    #[test]
    fn test_users_first_appearance() {
        let table = sample();
        assert_eq!(table.users(), vec!["B", "A"]);
        assert_eq!(table.rows_for_user("B").count(), 3);
    }

    #[test]
    fn test_to_dataframe_columns() {
        let table = sample();
        let fields = [Field::User, Field::Valence, Field::Time, Field::Risk, Field::GlobalId];
        let df = table.to_dataframe(&fields).unwrap();

        assert_eq!(df.height(), 4);
        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["user", "valence", "time", "risk", "global_id"]);

        let valence = df.column("valence").unwrap().f64().unwrap();
        assert_eq!(valence.get(0), Some(1.0));
        assert_eq!(valence.get(1), None);
        assert_eq!(valence.null_count(), 1);

        let risk = df.column("risk").unwrap();
        assert_eq!(risk.null_count(), 4);
    }

    #[test]
    fn test_empty_dataframe_keeps_schema() {
        let table = AggregateTable::new();
        let df = table.to_dataframe(&[Field::User, Field::Round]).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 2);
    }

    #[test]
    fn test_json_records_in_field_order() {
        let table = sample();
        let records = table.to_json_records(&[Field::User, Field::Valence, Field::Arrival]);
        let array = records.as_array().unwrap();
        assert_eq!(array.len(), 4);

        let keys: Vec<&String> = array[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["user", "valence", "arrival"]);
        assert_eq!(array[1]["valence"], Value::Null);
        assert_eq!(array[0]["arrival"], json!("left"));
    }
}
