use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dog_broker::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use super::JobContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Xlsx,
    Pdf,
}

impl ExportFormat {
    /// Rough generation time, used to favour quick exports
    pub fn estimated_millis(self) -> u64 {
        match self {
            Self::Csv => 2000,
            Self::Json => 1500,
            Self::Xlsx => 4000,
            Self::Pdf => 8000,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Xlsx => "xlsx",
            Self::Pdf => "pdf",
        }
    }

    /// `10 - estimated seconds`, so a csv outranks a pdf
    pub fn priority(self) -> JobPriority {
        JobPriority::clamped(10 - (self.estimated_millis() / 1000) as i64)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "xlsx" => Ok(Self::Xlsx),
            "pdf" => Ok(Self::Pdf),
            _ => Err(QueueError::config(format!(
                "Invalid format '{}'. Valid formats: csv, json, xlsx, pdf",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    pub format: String,
    #[serde(default)]
    pub filters: Value,
    #[serde(default)]
    pub user_id: Option<String>,
    pub file_name: String,
}

impl ExportData {
    /// Validate the format up front so bad requests never reach the queue
    pub fn new(format: &str, user_id: Option<String>) -> QueueResult<Self> {
        let format: ExportFormat = format.parse()?;
        Ok(Self {
            format: format.to_string(),
            filters: Value::Null,
            user_id,
            file_name: format!("export-{}.{}", Utc::now().timestamp_millis(), format),
        })
    }

    pub fn with_filters(mut self, filters: Value) -> Self {
        self.filters = filters;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    pub success: bool,
    pub format: ExportFormat,
    pub export_id: String,
    pub download_url: String,
    pub record_count: usize,
    pub generated_at: DateTime<Utc>,
    pub user_id: Option<String>,
}

#[async_trait]
impl Job for ExportData {
    type Context = JobContext;
    type Output = ExportResult;

    const JOB_TYPE: &'static str = "export-data";
    const QUEUE: QueueName = QueueName::DataExport;

    async fn execute(&self, ctx: Self::Context) -> Result<Self::Output, JobError> {
        let format: ExportFormat = self
            .format
            .parse()
            .map_err(|_| JobError::permanent(format!("Unsupported export format: {}", self.format)))?;

        // Gathering rows
        ctx.simulate(2000).await;
        let record_count = ctx.users.count().await;

        // Rendering takes the rest of the estimate
        ctx.simulate(format.estimated_millis().saturating_sub(2000)).await;

        let generated_at = Utc::now();
        let export_id = format!("export_{}", generated_at.timestamp_millis());
        info!(format = %format, record_count, "Data export completed");

        Ok(ExportResult {
            success: true,
            format,
            download_url: format!("/exports/{}.{}", export_id, format),
            export_id,
            record_count,
            generated_at,
            user_id: self.user_id.clone(),
        })
    }

    fn options(&self) -> Option<JobOptions> {
        let priority = self
            .format
            .parse::<ExportFormat>()
            .map(ExportFormat::priority)
            .unwrap_or_default();

        Some(
            JobOptions::default()
                .with_priority(priority)
                .with_retention(20, 10)
                .with_max_attempts(2)
                .with_base_backoff(Duration::from_millis(5000)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::UserDirectory;
    use std::sync::Arc;

    #[test]
    fn test_faster_formats_rank_higher() {
        assert_eq!(ExportFormat::Csv.priority().as_u8(), 8);
        assert_eq!(ExportFormat::Json.priority().as_u8(), 9);
        assert_eq!(ExportFormat::Xlsx.priority().as_u8(), 6);
        assert_eq!(ExportFormat::Pdf.priority().as_u8(), 2);
    }

    #[test]
    fn test_export_profile() {
        let options = ExportData::new("PDF", None).unwrap().options().unwrap();
        assert_eq!(options.priority.as_u8(), 2);
        assert_eq!(options.max_attempts, 2);
        assert_eq!(options.base_backoff, Duration::from_millis(5000));
        assert_eq!((options.keep_completed, options.keep_failed), (20, 10));
    }

    #[test]
    fn test_unknown_format_rejected_before_enqueue() {
        let err = ExportData::new("docx", None).unwrap_err();
        assert!(matches!(err, QueueError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unsupported_payload_fails_permanently() {
        let ctx = JobContext::new(Arc::new(UserDirectory::seeded()), 0.0);
        let job = ExportData {
            format: "docx".to_string(),
            filters: Value::Null,
            user_id: None,
            file_name: "export.docx".to_string(),
        };

        let err = job.execute(ctx).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_csv_export_counts_users() {
        let ctx = JobContext::new(Arc::new(UserDirectory::seeded()), 0.0);
        let result = ExportData::new("csv", Some("u-1001".into())).unwrap().execute(ctx).await.unwrap();
        assert_eq!(result.record_count, 3);
        assert!(result.download_url.ends_with(".csv"));
    }
}
