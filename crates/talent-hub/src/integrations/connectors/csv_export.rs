use std::io::Read;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{AtsConnector, Connector, ConnectorContext};
use crate::integrations::domain::{NativeRecord, RateLimitState, RecordFilters};
use crate::integrations::error::ConnectorError;

/// ATS exports delivered as CSV files (or inline CSV text in the integration settings).
///
/// Each row becomes a JSON object keyed by column header; empty cells are omitted.
/// Exports are full snapshots, so `updated_since` is not applied.
#[derive(Debug, Clone)]
pub struct CsvExportConnector {
    candidates: CsvSource,
    jobs: CsvSource,
}

#[derive(Debug, Clone)]
enum CsvSource {
    Path(PathBuf),
    Inline(String),
    Missing,
}

impl CsvSource {
    fn from_settings(ctx: &ConnectorContext, path_key: &str, inline_key: &str) -> Self {
        if let Some(path) = ctx.setting(path_key) {
            return CsvSource::Path(PathBuf::from(path));
        }
        match ctx.settings.get(inline_key).and_then(Value::as_str) {
            Some(text) if !text.trim().is_empty() => CsvSource::Inline(text.to_string()),
            _ => CsvSource::Missing,
        }
    }

    fn readable(&self) -> bool {
        match self {
            CsvSource::Path(path) => path.is_file(),
            CsvSource::Inline(_) => true,
            CsvSource::Missing => false,
        }
    }

    fn read(&self) -> Result<Vec<NativeRecord>, ConnectorError> {
        match self {
            CsvSource::Path(path) => {
                let file = std::fs::File::open(path).map_err(|err| {
                    ConnectorError::Unavailable(format!("{}: {err}", path.display()))
                })?;
                parse_rows(file)
            }
            CsvSource::Inline(text) => parse_rows(text.as_bytes()),
            CsvSource::Missing => Ok(Vec::new()),
        }
    }
}

/// Short rows keep the cells they have, so mapping rejects them per record. Rows the
/// reader cannot decode at all are skipped with a warning.
fn parse_rows<R: Read>(reader: R) -> Result<Vec<NativeRecord>, ConnectorError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader
        .headers()
        .map_err(|err| ConnectorError::InvalidResponse(format!("unreadable header row: {err}")))?
        .clone();
    let mut records = Vec::new();

    for row in csv_reader.records() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                let line = err.position().map(|position| position.line());
                tracing::warn!(provider = "csv_export", ?line, error = %err, "skipping undecodable row");
                continue;
            }
        };
        let object: Map<String, Value> = headers
            .iter()
            .zip(row.iter())
            .filter(|(_, value)| !value.is_empty())
            .map(|(header, value)| (header.to_string(), Value::String(value.to_string())))
            .collect();
        records.push(Value::Object(object));
    }

    Ok(records)
}

impl CsvExportConnector {
    pub fn new(ctx: &ConnectorContext) -> Self {
        Self {
            candidates: CsvSource::from_settings(ctx, "candidates_path", "candidates_csv"),
            jobs: CsvSource::from_settings(ctx, "jobs_path", "jobs_csv"),
        }
    }

    async fn load(
        source: &CsvSource,
        filters: &RecordFilters,
    ) -> Result<Vec<NativeRecord>, ConnectorError> {
        let source = source.clone();
        let mut records = tokio::task::spawn_blocking(move || source.read())
            .await
            .map_err(|err| ConnectorError::Unavailable(err.to_string()))??;
        if let Some(limit) = filters.limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}

#[async_trait]
impl Connector for CsvExportConnector {
    fn provider(&self) -> &'static str {
        "csv_export"
    }

    async fn authenticate(&self) -> bool {
        let readable = self.candidates.readable();
        if !readable {
            tracing::warn!(provider = "csv_export", "candidate export is not configured or readable");
        }
        readable
    }

    async fn test_connection(&self) -> bool {
        self.candidates.readable()
    }

    fn rate_limits(&self) -> Option<RateLimitState> {
        None
    }
}

#[async_trait]
impl AtsConnector for CsvExportConnector {
    async fn get_candidates(
        &self,
        filters: &RecordFilters,
    ) -> Result<Vec<NativeRecord>, ConnectorError> {
        if matches!(self.candidates, CsvSource::Missing) {
            return Err(ConnectorError::Misconfigured(
                "no candidates export configured".to_string(),
            ));
        }
        Self::load(&self.candidates, filters).await
    }

    async fn get_jobs(&self, filters: &RecordFilters) -> Result<Vec<NativeRecord>, ConnectorError> {
        Self::load(&self.jobs, filters).await
    }
}
