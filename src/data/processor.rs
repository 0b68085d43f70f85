//! Experiment Flattener Module
//! Turns nested per-round / per-iteration slider readings into flat table rows.

use crate::config::{FieldPolicy, Variant};
use crate::data::record::{
    coerce_number, json_type_name, user_of, Coercion, InputFile, ObservationRecord,
    AROUSAL_KEY, EMOTION_VALUE_KEY, HISTORY_KEY, SOLUTION_KEY, VALENCE_KEY,
};
use crate::data::table::FlatRow;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum FlattenError {
    #[error("{file}: expected a JSON object at the top level, found {found}")]
    UnexpectedShape { file: String, found: &'static str },
    #[error("{file}: {context} should be a list, found {found}")]
    NotAList {
        file: String,
        context: String,
        found: &'static str,
    },
    #[error("{file}: round {round}, iteration {iteration} is not an object")]
    BadRecord {
        file: String,
        round: u32,
        iteration: u32,
    },
    #[error("{file}: missing field `{field}`")]
    MissingField { file: String, field: String },
    #[error("{file}: `{field}` is not numeric: {value}")]
    InvalidNumber {
        file: String,
        field: String,
        value: String,
    },
}

/// Per-file values copied onto every row.
struct RowContext<'a> {
    user: &'a str,
    file: &'a str,
    target_valence: Option<f64>,
    target_arousal: Option<f64>,
}

/// Flattens accepted files one at a time and hands out identifiers.
///
/// `row_id` grows by one per emitted row across the whole run. `global_id`
/// equals `row_id` in the simple form; in the rich form every row of a file
/// shares one value, which advances once per accepted file.
pub struct Flattener {
    variant: Variant,
    policy: FieldPolicy,
    next_row_id: u64,
    next_file_id: u64,
}

impl Flattener {
    pub fn new(variant: Variant, policy: FieldPolicy) -> Self {
        Self {
            variant,
            policy,
            next_row_id: 0,
            next_file_id: 0,
        }
    }

    /// Flatten one file. On error nothing is emitted and no counter moves.
    pub fn flatten(&mut self, file: &InputFile) -> Result<Vec<FlatRow>, FlattenError> {
        let name = file.file_name();
        let root = file
            .as_object()
            .ok_or_else(|| FlattenError::UnexpectedShape {
                file: name.clone(),
                found: file.shape(),
            })?;

        let user = user_of(root);
        let mut rows = match self.variant {
            Variant::Simple => self.flatten_simple(root, &user, &name)?,
            Variant::Rich => self.flatten_rich(root, &user, &name)?,
        };

        self.assign_ids(&mut rows);
        Ok(rows)
    }

    /// Files accepted so far.
    pub fn files_flattened(&self) -> u64 {
        self.next_file_id
    }

    fn assign_ids(&mut self, rows: &mut [FlatRow]) {
        let file_id = self.next_file_id;
        for row in rows.iter_mut() {
            row.row_id = self.next_row_id;
            row.global_id = match self.variant {
                Variant::Simple => self.next_row_id,
                Variant::Rich => file_id,
            };
            self.next_row_id += 1;
        }
        self.next_file_id += 1;
    }

    /// First round only, with the solution targets on every row.
    fn flatten_simple(
        &self,
        root: &Map<String, Value>,
        user: &str,
        file: &str,
    ) -> Result<Vec<FlatRow>, FlattenError> {
        let (target_valence, target_arousal) = self.targets(root, file)?;
        let rounds = self.history(root, file)?;

        let Some(first) = rounds.first() else {
            return match self.policy {
                FieldPolicy::Strict => Err(FlattenError::MissingField {
                    file: file.to_string(),
                    field: format!("{}[0]", HISTORY_KEY),
                }),
                FieldPolicy::Lenient => Ok(Vec::new()),
            };
        };

        let ctx = RowContext {
            user,
            file,
            target_valence,
            target_arousal,
        };
        let mut rows = Vec::new();
        self.flatten_round(first, 0, &ctx, &mut rows)?;
        Ok(rows)
    }

    /// Every round, every iteration.
    fn flatten_rich(
        &self,
        root: &Map<String, Value>,
        user: &str,
        file: &str,
    ) -> Result<Vec<FlatRow>, FlattenError> {
        let rounds = self.history(root, file)?;
        let ctx = RowContext {
            user,
            file,
            target_valence: None,
            target_arousal: None,
        };

        let mut rows = Vec::new();
        for (round_idx, round) in rounds.iter().enumerate() {
            self.flatten_round(round, round_idx as u32, &ctx, &mut rows)?;
        }
        Ok(rows)
    }

    fn flatten_round(
        &self,
        round: &Value,
        round_idx: u32,
        ctx: &RowContext<'_>,
        rows: &mut Vec<FlatRow>,
    ) -> Result<(), FlattenError> {
        let records = round.as_array().ok_or_else(|| FlattenError::NotAList {
            file: ctx.file.to_string(),
            context: format!("round {}", round_idx),
            found: json_type_name(round),
        })?;

        // A slider key that no record carries is a missing column, not a missing value.
        if self.policy == FieldPolicy::Strict && !records.is_empty() {
            for key in [VALENCE_KEY, AROUSAL_KEY] {
                if !records.iter().any(|r| r.get(key).is_some()) {
                    return Err(FlattenError::MissingField {
                        file: ctx.file.to_string(),
                        field: format!("round {}: {}", round_idx, key),
                    });
                }
            }
        }

        for (iteration, value) in records.iter().enumerate() {
            let iteration = iteration as u32;
            let record =
                ObservationRecord::from_value(value).ok_or_else(|| FlattenError::BadRecord {
                    file: ctx.file.to_string(),
                    round: round_idx,
                    iteration,
                })?;

            rows.push(FlatRow {
                user: ctx.user.to_string(),
                round: round_idx,
                iteration,
                valence: self.number(record.valence.as_ref(), VALENCE_KEY, ctx.file)?,
                arousal: self.number(record.arousal.as_ref(), AROUSAL_KEY, ctx.file)?,
                time: record.time,
                risk: record.risk,
                arrival: record.arrival,
                target_valence: ctx.target_valence,
                target_arousal: ctx.target_arousal,
                source_file: ctx.file.to_string(),
                global_id: 0,
                row_id: 0,
            });
        }

        Ok(())
    }

    fn history<'a>(
        &self,
        root: &'a Map<String, Value>,
        file: &str,
    ) -> Result<&'a [Value], FlattenError> {
        match root.get(HISTORY_KEY) {
            None | Some(Value::Null) => match self.policy {
                FieldPolicy::Strict => Err(FlattenError::MissingField {
                    file: file.to_string(),
                    field: HISTORY_KEY.to_string(),
                }),
                FieldPolicy::Lenient => Ok(&[]),
            },
            Some(Value::Array(rounds)) => Ok(rounds.as_slice()),
            Some(other) => Err(FlattenError::NotAList {
                file: file.to_string(),
                context: HISTORY_KEY.to_string(),
                found: json_type_name(other),
            }),
        }
    }

    /// Target `(valence, arousal)` from the solution block.
    fn targets(
        &self,
        root: &Map<String, Value>,
        file: &str,
    ) -> Result<(Option<f64>, Option<f64>), FlattenError> {
        let field = format!("{}.{}", SOLUTION_KEY, EMOTION_VALUE_KEY);
        let pair = root
            .get(SOLUTION_KEY)
            .and_then(|solution| solution.get(EMOTION_VALUE_KEY))
            .and_then(|value| value.as_array())
            .filter(|pair| pair.len() >= 2);

        let Some(pair) = pair else {
            return match self.policy {
                FieldPolicy::Strict => Err(FlattenError::MissingField {
                    file: file.to_string(),
                    field,
                }),
                FieldPolicy::Lenient => Ok((None, None)),
            };
        };

        let valence = self.number(pair.first(), &field, file)?;
        let arousal = self.number(pair.get(1), &field, file)?;
        Ok((valence, arousal))
    }

    fn number(
        &self,
        value: Option<&Value>,
        field: &str,
        file: &str,
    ) -> Result<Option<f64>, FlattenError> {
        let coerced = coerce_number(value);
        if coerced != Coercion::Invalid {
            return Ok(coerced.lenient());
        }

        let raw = value.map(|v| v.to_string()).unwrap_or_default();
        match self.policy {
            FieldPolicy::Strict => Err(FlattenError::InvalidNumber {
                file: file.to_string(),
                field: field.to_string(),
                value: raw,
            }),
            FieldPolicy::Lenient => {
                debug!("{}: `{}` value {} is not numeric, keeping it empty", file, field, raw);
                Ok(None)
            }
        }
    }
}
