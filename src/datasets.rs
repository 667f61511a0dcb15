// 🗂️ Datasets - What the dashboard loads from the warehouse
//
// Two cached datasets:
//   despesas - one row per campaign expense (municipality, party, amount)
//   cruzado  - per-municipality expenditure joined with voter turnout
//
// Scope: city council candidates ("vereador"), Rio Grande do Sul, 2024.

use crate::aggregation::{group_sum_by, join_and_rate};
use crate::cache::{CacheStatus, DatasetCache};
use crate::error::LoadError;
use crate::records::columns;
use crate::table::Table;
use crate::warehouse::Warehouse;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

pub const EXPENDITURE_DATASET: &str = "despesas";
pub const CROSSED_DATASET: &str = "cruzado";

/// Expense lines joined with the municipality directory for names.
pub const EXPENDITURE_SQL: &str = r#"
WITH despesas AS (
    SELECT id_municipio, sigla_partido, valor_despesa
    FROM `basedosdados.br_tse_eleicoes.despesas_candidato`
    WHERE ano = 2024 AND cargo = 'vereador' AND sigla_uf = 'RS'
)
SELECT d.id_municipio, m.nome AS nome_municipio, d.sigla_partido, d.valor_despesa
FROM despesas d
JOIN `basedosdados.br_bd_diretorios_brasil.municipio` m ON d.id_municipio = m.id_municipio
"#;

/// Attendance and abstention totals per municipality.
pub const TURNOUT_SQL: &str = r#"
SELECT
    id_municipio,
    SUM(comparecimento) AS comparecimento,
    SUM(abstencoes) AS abstencoes
FROM `basedosdados.br_tse_eleicoes.detalhes_votacao_municipio`
WHERE ano = 2024 AND sigla_uf = 'RS'
GROUP BY id_municipio
"#;

// ============================================================================
// READINESS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DatasetState {
    pub name: &'static str,
    pub status: CacheStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub datasets: Vec<DatasetState>,
}

// ============================================================================
// DATASETS
// ============================================================================

pub struct Datasets {
    warehouse: Arc<dyn Warehouse>,
    expenditures: DatasetCache<Table>,
    crossed: DatasetCache<Table>,
}

impl Datasets {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self {
            warehouse,
            expenditures: DatasetCache::new(EXPENDITURE_DATASET),
            crossed: DatasetCache::new(CROSSED_DATASET),
        }
    }

    /// Raw expense lines. `None` when the load failed.
    pub async fn expenditures(&self) -> Option<Arc<Table>> {
        self.expenditures
            .get_or_load(|| async {
                let table = self.warehouse.query(EXPENDITURE_SQL).await?;
                tracing::info!(dataset = EXPENDITURE_DATASET, rows = table.len(), "expenditure rows fetched");
                Ok::<_, LoadError>(table)
            })
            .await
    }

    /// Expenditure vs turnout, one row per municipality present in both.
    pub async fn crossed(&self) -> Option<Arc<Table>> {
        self.crossed
            .get_or_load(|| async {
                let expenditures = self.expenditures().await.ok_or_else(|| {
                    LoadError::Dependency(format!("{} dataset unavailable", EXPENDITURE_DATASET))
                })?;
                let turnout = self.warehouse.query(TURNOUT_SQL).await?;
                tracing::info!(dataset = CROSSED_DATASET, rows = turnout.len(), "turnout rows fetched");

                let totals = group_sum_by(
                    &expenditures,
                    &[columns::MUNICIPALITY_ID, columns::MUNICIPALITY_NAME],
                    columns::EXPENDITURE,
                    columns::TOTAL_EXPENDITURE,
                )?;
                Ok::<_, LoadError>(join_and_rate(&totals, &turnout, columns::MUNICIPALITY_ID)?)
            })
            .await
    }

    /// Load every dataset now instead of on first request.
    pub async fn warm_up(&self) -> Readiness {
        self.expenditures().await;
        self.crossed().await;
        self.readiness()
    }

    pub fn readiness(&self) -> Readiness {
        let datasets = vec![state_of(&self.expenditures), state_of(&self.crossed)];
        Readiness {
            ready: datasets.iter().all(|d| d.status == CacheStatus::Loaded),
            datasets,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.readiness().ready
    }
}

fn state_of(cache: &DatasetCache<Table>) -> DatasetState {
    DatasetState {
        name: cache.name(),
        status: cache.status(),
        rows: cache.get().map(|t| t.len()),
        error: cache.failure().map(str::to_string),
        finished_at: cache.finished_at(),
    }
}
