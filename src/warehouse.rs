// 🏛️ Warehouse - Remote SQL execution
//
// `Warehouse` is the seam between the dataset loaders and the remote store.
// `BigQueryClient` talks to the BigQuery REST API:
//   1. POST projects/{project}/queries           (jobs.query)
//   2. GET  projects/{project}/queries/{job_id}  (jobs.getQueryResults)
//      repeated while the job is still running or more pages remain

use crate::credentials::{resolve_credentials_path, AccessToken, ServiceAccountKey};
use crate::error::QueryError;
use crate::table::{Table, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::OnceCell;

pub const DEFAULT_API_BASE: &str = "https://bigquery.googleapis.com";

const PAGE_SIZE: u32 = 10_000;
const SERVER_WAIT_MS: u64 = 10_000;
const MAX_POLLS: usize = 60;

/// Something that can run a SQL query and hand back a table.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn query(&self, sql: &str) -> Result<Table, QueryError>;
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    timeout_ms: u64,
    max_results: u32,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize, Clone)]
struct FieldSchema {
    name: String,
    #[serde(rename = "type", default)]
    field_type: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

// ============================================================================
// DECODING
// ============================================================================

fn decode_cell(field: &FieldSchema, cell: &serde_json::Value) -> Result<Value, QueryError> {
    let raw = match cell {
        serde_json::Value::Null => return Ok(Value::Null),
        serde_json::Value::String(s) => s.as_str(),
        // Repeated / record fields: keep the JSON text
        other => return Ok(Value::Text(other.to_string())),
    };

    let bad = || QueryError::Decode(format!("field {} ({}): cannot parse {:?}", field.name, field.field_type, raw));

    match field.field_type.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT64" => raw.parse::<i64>().map(Value::Int).map_err(|_| bad()),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => {
            raw.parse::<f64>().map(Value::Float).map_err(|_| bad())
        }
        "BOOLEAN" | "BOOL" => match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(bad()),
        },
        _ => Ok(Value::Text(raw.to_string())),
    }
}

fn append_rows(table: &mut Table, fields: &[FieldSchema], rows: &[TableRow]) -> Result<(), QueryError> {
    for row in rows {
        if row.f.len() != fields.len() {
            return Err(QueryError::Decode(format!(
                "row has {} cells, schema has {} fields",
                row.f.len(),
                fields.len()
            )));
        }
        let values = fields
            .iter()
            .zip(&row.f)
            .map(|(field, cell)| decode_cell(field, &cell.v))
            .collect::<Result<Vec<_>, _>>()?;
        table
            .push_row(values)
            .map_err(|e| QueryError::Decode(e.to_string()))?;
    }
    Ok(())
}

async fn read_response(response: reqwest::Response) -> Result<QueryResponse, QueryError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        return Err(QueryError::Api {
            status: status.as_u16(),
            message,
        });
    }
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| QueryError::Decode(e.to_string()))
}

// ============================================================================
// BIGQUERY CLIENT
// ============================================================================

enum TokenSource {
    ServiceAccount {
        path: PathBuf,
        key: OnceCell<ServiceAccountKey>,
    },
    Static(AccessToken),
}

pub struct BigQueryClient {
    http: reqwest::Client,
    api_base: String,
    billing_project: String,
    tokens: TokenSource,
    poll_interval: Duration,
}

impl BigQueryClient {
    /// Client billing `billing_project`, authenticating with the service
    /// account key at `credentials_path`. The key is read on first query.
    pub fn new(billing_project: impl Into<String>, credentials_path: impl Into<PathBuf>) -> Self {
        Self::with_tokens(
            billing_project.into(),
            TokenSource::ServiceAccount {
                path: credentials_path.into(),
                key: OnceCell::new(),
            },
        )
    }

    /// Client that sends a fixed bearer token.
    pub fn with_access_token(billing_project: impl Into<String>, token: AccessToken) -> Self {
        Self::with_tokens(billing_project.into(), TokenSource::Static(token))
    }

    fn with_tokens(billing_project: String, tokens: TokenSource) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            billing_project,
            tokens,
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn billing_project(&self) -> &str {
        &self.billing_project
    }

    async fn access_token(&self) -> Result<AccessToken, QueryError> {
        match &self.tokens {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::ServiceAccount { path, key } => {
                let key = key
                    .get_or_try_init(|| async {
                        let resolved = resolve_credentials_path(path);
                        ServiceAccountKey::from_file(&resolved)
                    })
                    .await?;
                Ok(key.access_token(&self.http).await?)
            }
        }
    }

    fn queries_url(&self) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/queries",
            self.api_base, self.billing_project
        )
    }

    async fn start_query(&self, token: &AccessToken, sql: &str) -> Result<QueryResponse, QueryError> {
        let request = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            timeout_ms: SERVER_WAIT_MS,
            max_results: PAGE_SIZE,
        };
        let response = self
            .http
            .post(self.queries_url())
            .bearer_auth(token.secret())
            .json(&request)
            .send()
            .await?;
        read_response(response).await
    }

    async fn fetch_results(
        &self,
        token: &AccessToken,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, QueryError> {
        let mut params: Vec<(&str, String)> = vec![
            ("timeoutMs", SERVER_WAIT_MS.to_string()),
            ("maxResults", PAGE_SIZE.to_string()),
        ];
        if let Some(location) = &job.location {
            params.push(("location", location.clone()));
        }
        if let Some(page) = page_token {
            params.push(("pageToken", page.to_string()));
        }

        let response = self
            .http
            .get(format!("{}/{}", self.queries_url(), job.job_id))
            .bearer_auth(token.secret())
            .query(&params)
            .send()
            .await?;
        read_response(response).await
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    async fn query(&self, sql: &str) -> Result<Table, QueryError> {
        let token = self.access_token().await?;
        let mut page = self.start_query(&token, sql).await?;

        let job = page
            .job_reference
            .clone()
            .ok_or_else(|| QueryError::Decode("response has no jobReference".to_string()))?;

        let mut polls = 0;
        while !page.job_complete {
            polls += 1;
            if polls > MAX_POLLS {
                return Err(QueryError::Incomplete(job.job_id.clone()));
            }
            tracing::debug!(job_id = %job.job_id, polls, "query still running");
            tokio::time::sleep(self.poll_interval).await;
            page = self.fetch_results(&token, &job, None).await?;
        }

        let fields = page
            .schema
            .take()
            .map(|s| s.fields)
            .ok_or_else(|| QueryError::Decode("completed job has no schema".to_string()))?;
        let mut table = Table::new(fields.iter().map(|f| f.name.clone()));

        loop {
            append_rows(&mut table, &fields, &page.rows)?;
            let Some(next) = page.page_token.take() else {
                break;
            };
            page = self.fetch_results(&token, &job, Some(&next)).await?;
        }

        tracing::debug!(job_id = %job.job_id, rows = table.len(), "query finished");
        Ok(table)
    }
}
