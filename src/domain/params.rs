//! Parameter specification table and the per-run parameter vector.
//!
//! The table is a small CSV:
//!
//! ```text
//! # parameter,value,fixed,tied
//! c,1.0,false,false
//! v,0.0,false,true
//! period,0.5,true,-1
//! ```
//!
//! `tied` accepts either booleans or the numeric convention where `-1` means
//! "shared across visits" and any other integer means "one value per visit".
//! An untied boolean row expands to every visit with the same starting value.
//! In the numeric form an untied parameter is listed once per visit, on
//! consecutive rows:
//!
//! ```text
//! c,1.0,false,0
//! c,1.1,false,1
//! v,0.0,false,-1
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::AppError;

/// One row of the parameter table.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamRow {
    pub name: String,
    pub value: f64,
    pub fixed: bool,
    pub tied: bool,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    parameter: String,
    value: f64,
    fixed: String,
    tied: String,
}

/// Validated parameter table.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterTable {
    rows: Vec<ParamRow>,
    /// Starting values listed one row per visit, parallel to `rows`.
    visit_values: Vec<Option<Vec<f64>>>,
}

impl ParameterTable {
    pub fn from_rows(rows: Vec<ParamRow>) -> Result<Self, AppError> {
        let visit_values = vec![None; rows.len()];
        Self::validated(rows, visit_values)
    }

    fn validated(rows: Vec<ParamRow>, visit_values: Vec<Option<Vec<f64>>>) -> Result<Self, AppError> {
        if rows.is_empty() {
            return Err(AppError::input("Parameter table has no rows."));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.name.is_empty() {
                return Err(AppError::input(format!("Parameter row {i} has an empty name.")));
            }
            if !row.value.is_finite() {
                return Err(AppError::input(format!(
                    "Parameter '{}' has a non-finite value.",
                    row.name
                )));
            }
            if rows[..i].iter().any(|r| r.name == row.name) {
                return Err(AppError::input(format!(
                    "Parameter '{}' is listed twice.",
                    row.name
                )));
            }
        }
        if let Some(row) = rows
            .iter()
            .zip(&visit_values)
            .find(|(_, values)| values.iter().flatten().any(|v| !v.is_finite()))
            .map(|(row, _)| row)
        {
            return Err(AppError::input(format!(
                "Parameter '{}' has a non-finite value.",
                row.name
            )));
        }
        Ok(Self { rows, visit_values })
    }

    pub fn read_csv(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path).map_err(|e| {
            AppError::io(format!(
                "Failed to open parameter table '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, AppError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .has_headers(false)
            .from_reader(reader);

        let mut rows: Vec<ParamRow> = Vec::new();
        let mut visit_values: Vec<Option<Vec<f64>>> = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record =
                record.map_err(|e| AppError::input(format!("Parameter table parse error: {e}")))?;
            // Accept an optional plain header row.
            if idx == 0 && record.get(0).is_some_and(|f| f.eq_ignore_ascii_case("parameter")) {
                continue;
            }
            let raw: RawRow = record.deserialize(None).map_err(|e| {
                AppError::input(format!("Parameter table row {}: {e}", idx + 1))
            })?;
            let fixed = parse_flag(&raw.fixed, &raw.parameter, "fixed")?;
            let tied = parse_tied(&raw.tied, &raw.parameter)?;
            let per_visit = !tied && raw.tied.parse::<i64>().is_ok();

            // Numeric untied rows for the same name continue that parameter's visits.
            if per_visit {
                if let (Some(last), Some(Some(values))) = (rows.last(), visit_values.last_mut()) {
                    if last.name == raw.parameter {
                        if last.fixed != fixed {
                            return Err(AppError::input(format!(
                                "Parameter '{}': visits disagree on the fixed flag.",
                                raw.parameter
                            )));
                        }
                        values.push(raw.value);
                        continue;
                    }
                }
            }

            visit_values.push(per_visit.then(|| vec![raw.value]));
            rows.push(ParamRow {
                name: raw.parameter,
                value: raw.value,
                fixed,
                tied,
            });
        }
        Self::validated(rows, visit_values)
    }

    pub fn rows(&self) -> &[ParamRow] {
        &self.rows
    }

    /// Per-visit starting values of row `i` when the table lists them one row
    /// per visit.
    pub fn visit_values(&self, i: usize) -> Option<&[f64]> {
        self.visit_values.get(i)?.as_deref()
    }
}

fn parse_flag(raw: &str, name: &str, column: &str) -> Result<bool, AppError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "1" => Ok(true),
        "false" | "f" | "no" | "0" => Ok(false),
        other => Err(AppError::input(format!(
            "Parameter '{name}': invalid {column} flag '{other}'."
        ))),
    }
}

fn parse_tied(raw: &str, name: &str) -> Result<bool, AppError> {
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(n == -1);
    }
    parse_flag(raw, name, "tied")
}

/// A single fitted (or fixed) scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSlot {
    pub name: String,
    /// `None` for a tied parameter shared by all visits.
    pub visit: Option<usize>,
    pub value: f64,
    pub fixed: bool,
}

impl ParameterSlot {
    pub fn label(&self) -> String {
        match self.visit {
            None => self.name.clone(),
            Some(v) => format!("{}{v}", self.name),
        }
    }

    pub fn applies_to(&self, visit: usize) -> bool {
        self.visit.is_none_or(|v| v == visit)
    }
}

/// Ordered parameter slots for a run with `nvisit` visits.
///
/// Tied rows expand to one slot, untied rows to `nvisit` consecutive slots.
/// Rows listed once per visit must list exactly `nvisit` of them.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterVector {
    slots: Vec<ParameterSlot>,
    nvisit: usize,
}

impl ParameterVector {
    pub fn build(table: &ParameterTable, nvisit: usize) -> Result<Self, AppError> {
        if nvisit == 0 {
            return Err(AppError::input("nvisit must be >= 1."));
        }
        let mut slots = Vec::new();
        for (i, row) in table.rows().iter().enumerate() {
            let listed = table.visit_values(i);
            if let Some(values) = listed {
                if values.len() != nvisit {
                    return Err(AppError::input(format!(
                        "Parameter '{}' lists {} visit row(s) but the run has {nvisit} visit(s).",
                        row.name,
                        values.len()
                    )));
                }
            }
            if row.tied {
                slots.push(ParameterSlot {
                    name: row.name.clone(),
                    visit: None,
                    value: row.value,
                    fixed: row.fixed,
                });
            } else {
                for v in 0..nvisit {
                    slots.push(ParameterSlot {
                        name: row.name.clone(),
                        visit: Some(v),
                        value: listed.map_or(row.value, |values| values[v]),
                        fixed: row.fixed,
                    });
                }
            }
        }
        Ok(Self { slots, nvisit })
    }

    pub fn slots(&self) -> &[ParameterSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn nvisit(&self) -> usize {
        self.nvisit
    }

    /// Positions of the free (fitted) slots.
    pub fn free_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.fixed)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn n_free(&self) -> usize {
        self.slots.iter().filter(|s| !s.fixed).count()
    }

    /// Display labels for the free slots, in slot order.
    pub fn labels(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|s| !s.fixed)
            .map(ParameterSlot::label)
            .collect()
    }

    pub fn initial_values(&self) -> Vec<f64> {
        self.slots.iter().map(|s| s.value).collect()
    }

    /// Slot holding `name` for rows of `visit`.
    pub fn slot_for(&self, name: &str, visit: usize) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.name == name && s.applies_to(visit))
    }
}
