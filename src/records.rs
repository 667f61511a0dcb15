// 🗳️ Records - Typed view of the electoral expenditure data model
//
// The warehouse hands back loosely typed tables. These structs name the
// shapes the dashboard relies on and decode them from a Table.

use crate::error::TableError;
use crate::table::{Table, Value};
use serde::{Deserialize, Serialize};

/// Column names as they appear in the warehouse and on the wire.
pub mod columns {
    pub const MUNICIPALITY_ID: &str = "id_municipio";
    pub const MUNICIPALITY_NAME: &str = "nome_municipio";
    pub const PARTY_CODE: &str = "sigla_partido";
    pub const EXPENDITURE: &str = "valor_despesa";
    pub const TOTAL_EXPENDITURE: &str = "gasto_total";
    pub const ATTENDANCE: &str = "comparecimento";
    pub const ABSTENTION: &str = "abstencoes";
    pub const TURNOUT_RATE: &str = "taxa_comparecimento";
}

/// Attendance as a percentage of attendance + abstention.
/// `None` when nobody was registered to vote.
pub fn turnout_rate(attendance: f64, abstention: f64) -> Option<f64> {
    let denominator = attendance + abstention;
    if denominator == 0.0 {
        None
    } else {
        Some(attendance / denominator * 100.0)
    }
}

// ============================================================================
// EXPENDITURE RECORD
// ============================================================================

/// One campaign expense line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenditureRecord {
    #[serde(rename = "id_municipio")]
    pub municipality_id: i64,
    #[serde(rename = "nome_municipio")]
    pub municipality_name: String,
    #[serde(rename = "sigla_partido")]
    pub party_code: String,
    #[serde(rename = "valor_despesa")]
    pub expenditure_amount: f64,
}

impl ExpenditureRecord {
    pub fn from_table(table: &Table) -> Result<Vec<Self>, TableError> {
        let id = table.column_index(columns::MUNICIPALITY_ID)?;
        let name = table.column_index(columns::MUNICIPALITY_NAME)?;
        let party = table.column_index(columns::PARTY_CODE)?;
        let amount = table.column_index(columns::EXPENDITURE)?;

        table
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| {
                Ok(ExpenditureRecord {
                    municipality_id: int_cell(&row[id], columns::MUNICIPALITY_ID, i)?,
                    municipality_name: text_cell(&row[name]),
                    party_code: text_cell(&row[party]),
                    expenditure_amount: float_cell(&row[amount], columns::EXPENDITURE, i)?,
                })
            })
            .collect()
    }

    pub fn to_table(records: &[Self]) -> Table {
        let mut table = Table::new([
            columns::MUNICIPALITY_ID,
            columns::MUNICIPALITY_NAME,
            columns::PARTY_CODE,
            columns::EXPENDITURE,
        ]);
        for r in records {
            table.push_row_unchecked(vec![
                Value::Int(r.municipality_id),
                Value::Text(r.municipality_name.clone()),
                Value::Text(r.party_code.clone()),
                Value::Float(r.expenditure_amount),
            ]);
        }
        table
    }
}

// ============================================================================
// TURNOUT RECORD
// ============================================================================

/// Attendance and abstention totals for one municipality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnoutRecord {
    #[serde(rename = "id_municipio")]
    pub municipality_id: i64,
    #[serde(rename = "comparecimento")]
    pub attendance_count: i64,
    #[serde(rename = "abstencoes")]
    pub abstention_count: i64,
}

impl TurnoutRecord {
    pub fn from_table(table: &Table) -> Result<Vec<Self>, TableError> {
        let id = table.column_index(columns::MUNICIPALITY_ID)?;
        let attendance = table.column_index(columns::ATTENDANCE)?;
        let abstention = table.column_index(columns::ABSTENTION)?;

        table
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| {
                Ok(TurnoutRecord {
                    municipality_id: int_cell(&row[id], columns::MUNICIPALITY_ID, i)?,
                    attendance_count: int_cell(&row[attendance], columns::ATTENDANCE, i)?,
                    abstention_count: int_cell(&row[abstention], columns::ABSTENTION, i)?,
                })
            })
            .collect()
    }

    pub fn to_table(records: &[Self]) -> Table {
        let mut table = Table::new([
            columns::MUNICIPALITY_ID,
            columns::ATTENDANCE,
            columns::ABSTENTION,
        ]);
        for r in records {
            table.push_row_unchecked(vec![
                Value::Int(r.municipality_id),
                Value::Int(r.attendance_count),
                Value::Int(r.abstention_count),
            ]);
        }
        table
    }

    pub fn turnout_rate(&self) -> Option<f64> {
        turnout_rate(self.attendance_count as f64, self.abstention_count as f64)
    }
}

// ============================================================================
// CROSSED RECORD
// ============================================================================

/// Expenditure joined with turnout, one per municipality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossedRecord {
    #[serde(rename = "nome_municipio")]
    pub municipality_name: String,
    #[serde(rename = "gasto_total")]
    pub total_expenditure: f64,
    #[serde(rename = "comparecimento")]
    pub attendance_count: i64,
    #[serde(rename = "abstencoes")]
    pub abstention_count: i64,
    #[serde(rename = "taxa_comparecimento")]
    pub turnout_rate: Option<f64>,
}

impl CrossedRecord {
    pub fn from_table(table: &Table) -> Result<Vec<Self>, TableError> {
        let name = table.column_index(columns::MUNICIPALITY_NAME)?;
        let total = table.column_index(columns::TOTAL_EXPENDITURE)?;
        let attendance = table.column_index(columns::ATTENDANCE)?;
        let abstention = table.column_index(columns::ABSTENTION)?;
        let rate = table.column_index(columns::TURNOUT_RATE)?;

        table
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| {
                Ok(CrossedRecord {
                    municipality_name: text_cell(&row[name]),
                    total_expenditure: float_cell(&row[total], columns::TOTAL_EXPENDITURE, i)?,
                    attendance_count: int_cell(&row[attendance], columns::ATTENDANCE, i)?,
                    abstention_count: int_cell(&row[abstention], columns::ABSTENTION, i)?,
                    turnout_rate: row[rate].as_f64(),
                })
            })
            .collect()
    }
}

// ============================================================================
// CELL HELPERS
// ============================================================================

fn text_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn int_cell(value: &Value, column: &str, row: usize) -> Result<i64, TableError> {
    value.as_i64().ok_or_else(|| TableError::NotNumeric {
        column: column.to_string(),
        row,
    })
}

fn float_cell(value: &Value, column: &str, row: usize) -> Result<f64, TableError> {
    value.as_f64().ok_or_else(|| TableError::NotNumeric {
        column: column.to_string(),
        row,
    })
}
