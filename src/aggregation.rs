// 📊 Aggregation - group-by / sum / mean / top-N over a Table
//
// Pure functions: inputs are never mutated, every call builds a new Table.
//
// Ordering rules:
//   - full listings come back sorted by group key, ascending
//   - top-N listings are sorted by aggregate, descending; equal aggregates
//     fall back to group key ascending so the output is deterministic

use crate::error::TableError;
use crate::records::{columns, turnout_rate};
use crate::table::{Table, Value};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

// ============================================================================
// ACCUMULATOR
// ============================================================================

#[derive(Debug, Default, Clone)]
struct Accumulator {
    int_sum: i128,
    float_sum: f64,
    saw_float: bool,
    count: usize,
}

impl Accumulator {
    fn add(&mut self, value: &Value) {
        match value {
            Value::Int(i) => {
                self.int_sum += *i as i128;
                self.float_sum += *i as f64;
            }
            Value::Float(f) => {
                self.saw_float = true;
                self.float_sum += f;
            }
            _ => return,
        }
        self.count += 1;
    }

    /// Integer inputs keep an integer total; any float promotes it.
    fn sum(&self) -> Value {
        if self.saw_float {
            return Value::Float(self.float_sum);
        }
        match i64::try_from(self.int_sum) {
            Ok(total) => Value::Int(total),
            Err(_) => Value::Float(self.float_sum),
        }
    }

    fn mean(&self) -> Value {
        if self.count == 0 {
            Value::Null
        } else {
            Value::Float(self.float_sum / self.count as f64)
        }
    }
}

/// Groups rows by the values of `keys`. Rows with a null key are skipped,
/// null values are ignored, text values are an error.
fn accumulate(
    table: &Table,
    keys: &[&str],
    value_col: &str,
) -> Result<BTreeMap<Vec<Value>, Accumulator>, TableError> {
    let key_idx = keys
        .iter()
        .map(|k| table.column_index(k))
        .collect::<Result<Vec<_>, _>>()?;
    let value_idx = table.column_index(value_col)?;

    let mut groups: BTreeMap<Vec<Value>, Accumulator> = BTreeMap::new();

    for (row_no, row) in table.rows().iter().enumerate() {
        if key_idx.iter().any(|&i| row[i].is_null()) {
            continue;
        }

        let value = &row[value_idx];
        if matches!(value, Value::Text(_) | Value::Bool(_)) {
            return Err(TableError::NotNumeric {
                column: value_col.to_string(),
                row: row_no,
            });
        }

        let key: Vec<Value> = key_idx.iter().map(|&i| row[i].clone()).collect();
        groups.entry(key).or_default().add(value);
    }

    Ok(groups)
}

fn build_table(keys: &[&str], value_name: &str, groups: Vec<(Vec<Value>, Value)>) -> Table {
    let mut table = Table::new(keys.iter().copied().chain(std::iter::once(value_name)));
    for (mut key, aggregate) in groups {
        key.push(aggregate);
        table.push_row_unchecked(key);
    }
    table
}

/// Sort by aggregate descending and keep `n`. Input must already be in key
/// order; the stable sort then keeps key order among ties.
fn top_n(mut groups: Vec<(Vec<Value>, Value)>, n: usize) -> Vec<(Vec<Value>, Value)> {
    groups.retain(|(_, aggregate)| !aggregate.is_null());
    groups.sort_by(|a, b| b.1.cmp(&a.1));
    groups.truncate(n);
    groups
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Sum `value_col` per distinct combination of `keys`.
///
/// Output columns are `keys` followed by `alias`, one row per group, ordered
/// by key ascending.
pub fn group_sum_by(
    table: &Table,
    keys: &[&str],
    value_col: &str,
    alias: &str,
) -> Result<Table, TableError> {
    let groups = accumulate(table, keys, value_col)?
        .into_iter()
        .map(|(key, acc)| (key, acc.sum()))
        .collect();
    Ok(build_table(keys, alias, groups))
}

/// Sum `value_col` per `group_col`, all groups.
pub fn group_sum_all(table: &Table, group_col: &str, value_col: &str) -> Result<Table, TableError> {
    group_sum_by(table, &[group_col], value_col, value_col)
}

/// The `n` groups with the largest `value_col` sum.
pub fn group_sum_top_n(
    table: &Table,
    group_col: &str,
    value_col: &str,
    n: usize,
) -> Result<Table, TableError> {
    let groups = accumulate(table, &[group_col], value_col)?
        .into_iter()
        .map(|(key, acc)| (key, acc.sum()))
        .collect();
    Ok(build_table(&[group_col], value_col, top_n(groups, n)))
}

/// The `n` groups with the largest `value_col` mean.
/// Groups without any numeric value have no mean and are left out.
pub fn group_mean_top_n(
    table: &Table,
    group_col: &str,
    value_col: &str,
    n: usize,
) -> Result<Table, TableError> {
    let groups = accumulate(table, &[group_col], value_col)?
        .into_iter()
        .map(|(key, acc)| (key, acc.mean()))
        .collect();
    Ok(build_table(&[group_col], value_col, top_n(groups, n)))
}

/// Inner join of per-municipality expenditure and turnout on `key`.
///
/// `expenditure_by_muni` needs `key`, `nome_municipio` and `gasto_total`;
/// `turnout_by_muni` needs `key`, `comparecimento` and `abstencoes`.
/// Municipalities missing from either side are dropped. Rows come back
/// ordered by `key`.
pub fn join_and_rate(
    expenditure_by_muni: &Table,
    turnout_by_muni: &Table,
    key: &str,
) -> Result<Table, TableError> {
    let e_key = expenditure_by_muni.column_index(key)?;
    let e_name = expenditure_by_muni.column_index(columns::MUNICIPALITY_NAME)?;
    let e_total = expenditure_by_muni.column_index(columns::TOTAL_EXPENDITURE)?;

    let t_key = turnout_by_muni.column_index(key)?;
    let t_attendance = turnout_by_muni.column_index(columns::ATTENDANCE)?;
    let t_abstention = turnout_by_muni.column_index(columns::ABSTENTION)?;

    let mut turnout: BTreeMap<&Value, &Vec<Value>> = BTreeMap::new();
    for row in turnout_by_muni.rows() {
        if row[t_key].is_null() {
            continue;
        }
        match turnout.entry(&row[t_key]) {
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
            Entry::Occupied(_) => {
                return Err(TableError::DuplicateKey {
                    column: key.to_string(),
                    key: row[t_key].to_string(),
                })
            }
        }
    }

    let mut expenditure: BTreeMap<&Value, &Vec<Value>> = BTreeMap::new();
    for row in expenditure_by_muni.rows() {
        if row[e_key].is_null() {
            continue;
        }
        if expenditure.insert(&row[e_key], row).is_some() {
            return Err(TableError::DuplicateKey {
                column: key.to_string(),
                key: row[e_key].to_string(),
            });
        }
    }

    let mut joined = Table::new([
        columns::MUNICIPALITY_NAME,
        columns::TOTAL_EXPENDITURE,
        columns::ATTENDANCE,
        columns::ABSTENTION,
        columns::TURNOUT_RATE,
    ]);

    for (muni, e_row) in expenditure {
        let Some(t_row) = turnout.get(muni) else {
            continue;
        };

        let attendance = &t_row[t_attendance];
        let abstention = &t_row[t_abstention];
        let rate = match (attendance.as_f64(), abstention.as_f64()) {
            (Some(a), Some(b)) => turnout_rate(a, b).into(),
            _ => Value::Null,
        };

        joined.push_row_unchecked(vec![
            e_row[e_name].clone(),
            e_row[e_total].clone(),
            attendance.clone(),
            abstention.clone(),
            rate,
        ]);
    }

    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::columns::*;

    fn expenses() -> Table {
        let mut table = Table::new(["muni", "party", "amt"]);
        table.push_row(vec!["A".into(), "X".into(), Value::Int(100)]).unwrap();
        table.push_row(vec!["A".into(), "Y".into(), Value::Int(50)]).unwrap();
        table.push_row(vec!["B".into(), "X".into(), Value::Int(200)]).unwrap();
        table
    }

    fn pairs(table: &Table) -> Vec<(String, Value)> {
        table
            .rows()
            .iter()
            .map(|r| (r[0].to_string(), r[1].clone()))
            .collect()
    }

    #[test]
    fn test_ranking_by_municipality() {
        let ranking = group_sum_top_n(&expenses(), "muni", "amt", 15).unwrap();
        assert_eq!(ranking.columns(), &["muni".to_string(), "amt".to_string()]);
        assert_eq!(
            pairs(&ranking),
            vec![("B".to_string(), Value::Int(200)), ("A".to_string(), Value::Int(150))]
        );
    }

    #[test]
    fn test_ranking_by_party() {
        let ranking = group_sum_top_n(&expenses(), "party", "amt", 10).unwrap();
        assert_eq!(
            pairs(&ranking),
            vec![("X".to_string(), Value::Int(300)), ("Y".to_string(), Value::Int(50))]
        );
    }

    #[test]
    fn test_top_n_truncates() {
        let ranking = group_sum_top_n(&expenses(), "muni", "amt", 1).unwrap();
        assert_eq!(pairs(&ranking), vec![("B".to_string(), Value::Int(200))]);
        assert!(group_sum_top_n(&expenses(), "muni", "amt", 0).unwrap().is_empty());
    }

    #[test]
    fn test_sum_all_sorted_by_key() {
        let mut table = Table::new(["muni", "amt"]);
        table.push_row(vec!["Caxias".into(), Value::Float(1.5)]).unwrap();
        table.push_row(vec!["Alegrete".into(), Value::Float(9.0)]).unwrap();
        table.push_row(vec!["Caxias".into(), Value::Int(2)]).unwrap();

        let all = group_sum_all(&table, "muni", "amt").unwrap();
        assert_eq!(
            pairs(&all),
            vec![
                ("Alegrete".to_string(), Value::Float(9.0)),
                ("Caxias".to_string(), Value::Float(3.5)),
            ]
        );
    }

    #[test]
    fn test_top_n_matches_sorted_full_listing() {
        let mut table = Table::new(["muni", "amt"]);
        for (i, amount) in [5, 3, 9, 3, 7, 1, 9, 4].iter().enumerate() {
            let muni = format!("M{}", i % 5);
            table.push_row(vec![muni.into(), Value::Int(*amount)]).unwrap();
        }

        let mut all = pairs(&group_sum_all(&table, "muni", "amt").unwrap());
        all.sort_by(|a, b| b.1.cmp(&a.1));
        let top = pairs(&group_sum_top_n(&table, "muni", "amt", 3).unwrap());

        assert_eq!(top.len(), 3);
        let top_totals: Vec<_> = top.iter().map(|p| p.1.clone()).collect();
        let all_totals: Vec<_> = all.iter().take(3).map(|p| p.1.clone()).collect();
        assert_eq!(top_totals, all_totals);
    }

    #[test]
    fn test_ties_break_by_key() {
        let mut table = Table::new(["party", "amt"]);
        table.push_row(vec!["PT".into(), Value::Int(10)]).unwrap();
        table.push_row(vec!["MDB".into(), Value::Int(10)]).unwrap();
        table.push_row(vec!["PP".into(), Value::Int(10)]).unwrap();

        let ranking = group_sum_top_n(&table, "party", "amt", 2).unwrap();
        let names: Vec<_> = pairs(&ranking).into_iter().map(|p| p.0).collect();
        assert_eq!(names, vec!["MDB", "PP"]);
    }

    #[test]
    fn test_row_order_does_not_change_totals() {
        let forward = expenses();
        let mut reversed = Table::new(["muni", "party", "amt"]);
        for row in forward.rows().iter().rev() {
            reversed.push_row(row.clone()).unwrap();
        }

        assert_eq!(
            group_sum_all(&forward, "muni", "amt").unwrap(),
            group_sum_all(&reversed, "muni", "amt").unwrap()
        );
    }

    #[test]
    fn test_null_keys_and_values() {
        let mut table = Table::new(["muni", "amt"]);
        table.push_row(vec![Value::Null, Value::Int(1000)]).unwrap();
        table.push_row(vec!["A".into(), Value::Null]).unwrap();
        table.push_row(vec!["A".into(), Value::Int(5)]).unwrap();

        let all = group_sum_all(&table, "muni", "amt").unwrap();
        assert_eq!(pairs(&all), vec![("A".to_string(), Value::Int(5))]);
    }

    #[test]
    fn test_text_value_is_an_error() {
        let mut table = Table::new(["muni", "amt"]);
        table.push_row(vec!["A".into(), "cem reais".into()]).unwrap();

        let err = group_sum_all(&table, "muni", "amt").unwrap_err();
        assert_eq!(
            err,
            TableError::NotNumeric {
                column: "amt".to_string(),
                row: 0
            }
        );
    }

    #[test]
    fn test_unknown_column_is_an_error() {
        let err = group_sum_top_n(&expenses(), "uf", "amt", 3).unwrap_err();
        assert_eq!(err, TableError::UnknownColumn("uf".to_string()));
    }

    #[test]
    fn test_mean_top_n() {
        let mut table = Table::new(["muni", "amt"]);
        table.push_row(vec!["A".into(), Value::Int(10)]).unwrap();
        table.push_row(vec!["A".into(), Value::Int(30)]).unwrap();
        table.push_row(vec!["B".into(), Value::Int(25)]).unwrap();
        table.push_row(vec!["C".into(), Value::Null]).unwrap();

        let ranking = group_mean_top_n(&table, "muni", "amt", 5).unwrap();
        assert_eq!(
            pairs(&ranking),
            vec![
                ("B".to_string(), Value::Float(25.0)),
                ("A".to_string(), Value::Float(20.0)),
            ]
        );
    }

    #[test]
    fn test_group_sum_by_multiple_keys() {
        let mut table = Table::new([MUNICIPALITY_ID, MUNICIPALITY_NAME, EXPENDITURE]);
        table.push_row(vec![Value::Int(2), "Canoas".into(), Value::Float(10.0)]).unwrap();
        table.push_row(vec![Value::Int(1), "Bagé".into(), Value::Float(1.0)]).unwrap();
        table.push_row(vec![Value::Int(2), "Canoas".into(), Value::Float(5.0)]).unwrap();

        let totals = group_sum_by(&table, &[MUNICIPALITY_ID, MUNICIPALITY_NAME], EXPENDITURE, TOTAL_EXPENDITURE)
            .unwrap();
        assert_eq!(
            totals.columns(),
            &[MUNICIPALITY_ID.to_string(), MUNICIPALITY_NAME.to_string(), TOTAL_EXPENDITURE.to_string()]
        );
        assert_eq!(totals.len(), 2);
        assert_eq!(totals.get(1, TOTAL_EXPENDITURE), Some(&Value::Float(15.0)));
    }

    fn spending() -> Table {
        let mut table = Table::new([MUNICIPALITY_ID, MUNICIPALITY_NAME, TOTAL_EXPENDITURE]);
        table.push_row(vec![Value::Int(1), "Alvorada".into(), Value::Float(100.0)]).unwrap();
        table.push_row(vec![Value::Int(2), "Bagé".into(), Value::Float(50.0)]).unwrap();
        table.push_row(vec![Value::Int(3), "Cachoeirinha".into(), Value::Float(75.0)]).unwrap();
        table
    }

    fn turnout() -> Table {
        let mut table = Table::new([MUNICIPALITY_ID, ATTENDANCE, ABSTENTION]);
        table.push_row(vec![Value::Int(2), Value::Int(0), Value::Int(0)]).unwrap();
        table.push_row(vec![Value::Int(1), Value::Int(800), Value::Int(200)]).unwrap();
        table.push_row(vec![Value::Int(9), Value::Int(10), Value::Int(10)]).unwrap();
        table
    }

    #[test]
    fn test_join_and_rate_inner_join() {
        let joined = join_and_rate(&spending(), &turnout(), MUNICIPALITY_ID).unwrap();

        assert_eq!(joined.len(), 2);
        let names: Vec<_> = joined.column(MUNICIPALITY_NAME).unwrap().map(|v| v.to_string()).collect();
        assert_eq!(names, vec!["Alvorada", "Bagé"]);

        assert_eq!(joined.get(0, TURNOUT_RATE), Some(&Value::Float(80.0)));
        assert_eq!(joined.get(1, TURNOUT_RATE), Some(&Value::Null));
    }

    #[test]
    fn test_join_rate_within_bounds() {
        let joined = join_and_rate(&spending(), &turnout(), MUNICIPALITY_ID).unwrap();
        for rate in joined.column(TURNOUT_RATE).unwrap() {
            if let Some(r) = rate.as_f64() {
                assert!((0.0..=100.0).contains(&r));
            }
        }
    }

    #[test]
    fn test_join_rejects_duplicate_turnout_keys() {
        let mut dup = turnout();
        dup.push_row(vec![Value::Int(1), Value::Int(1), Value::Int(1)]).unwrap();

        let err = join_and_rate(&spending(), &dup, MUNICIPALITY_ID).unwrap_err();
        assert!(matches!(err, TableError::DuplicateKey { .. }));
    }

    #[test]
    fn test_inputs_are_not_mutated() {
        let table = expenses();
        let before = table.clone();
        let _ = group_sum_top_n(&table, "muni", "amt", 1).unwrap();
        let _ = group_mean_top_n(&table, "party", "amt", 1).unwrap();
        assert_eq!(table, before);
    }
}
