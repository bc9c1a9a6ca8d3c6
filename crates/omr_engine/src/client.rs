use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use omr_core::{
    ArtifactKind, BatchReceipt, DetailRecord, ExamSummary, FileContent, FileEntry, GroupKey,
};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use url::Url;

use crate::{FailureKind, ServiceError};

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Upper bound for JSON responses.
    pub max_response_bytes: u64,
    /// Upper bound for CSV and zip downloads.
    pub max_artifact_bytes: u64,
    /// Multipart field name repeated once per uploaded file.
    pub upload_field: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            max_response_bytes: 64 * 1024 * 1024,
            max_artifact_bytes: 512 * 1024 * 1024,
            upload_field: "file".to_string(),
        }
    }
}

/// The remote scoring service, as seen from the client.
#[async_trait::async_trait]
pub trait EvaluationService: Send + Sync {
    async fn submit_batch(&self, files: &[FileEntry]) -> Result<BatchReceipt, ServiceError>;

    async fn fetch_summary(&self) -> Result<Vec<ExamSummary>, ServiceError>;

    async fn fetch_grades(&self, key: &GroupKey) -> Result<Vec<DetailRecord>, ServiceError>;

    async fn download_artifact(
        &self,
        key: &GroupKey,
        kind: &ArtifactKind,
    ) -> Result<Bytes, ServiceError>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GradesPayload {
    Bare(Vec<DetailRecord>),
    Wrapped { grades: Vec<DetailRecord> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SummaryPayload {
    Bare(Vec<ExamSummary>),
    Wrapped { exams: Vec<ExamSummary> },
}

#[derive(Debug, Clone)]
pub struct ReqwestService {
    settings: ServiceSettings,
    base: Url,
    client: reqwest::Client,
}

impl ReqwestService {
    pub fn new(settings: ServiceSettings) -> Result<Self, ServiceError> {
        let base = Url::parse(&settings.base_url)
            .map_err(|err| ServiceError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ServiceError::new(
                FailureKind::InvalidUrl,
                format!("{base} cannot be used as a base url"),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ServiceError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            settings,
            base,
            client,
        })
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Appends path segments to the base url, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::new(FailureKind::InvalidUrl, "base url has no path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn build_form(&self, files: &[FileEntry]) -> Result<Form, ServiceError> {
        let mut form = Form::new();
        for file in files {
            let part = match file.content() {
                FileContent::Bytes(bytes) => Part::bytes(bytes.to_vec()),
                FileContent::Path(path) => {
                    let handle = tokio::fs::File::open(path).await.map_err(|err| {
                        ServiceError::new(FailureKind::Io, format!("{}: {err}", path.display()))
                    })?;
                    let len = handle
                        .metadata()
                        .await
                        .map_err(|err| {
                            ServiceError::new(FailureKind::Io, format!("{}: {err}", path.display()))
                        })?
                        .len();
                    let body = reqwest::Body::wrap_stream(ReaderStream::new(handle));
                    Part::stream_with_length(body, len)
                }
            };
            let part = part
                .file_name(file.name().to_string())
                .mime_str(file.mime())
                .map_err(|err| ServiceError::new(FailureKind::InvalidRequest, err.to_string()))?;
            form = form.part(self.settings.upload_field.clone(), part);
        }
        Ok(form)
    }

    async fn read_body(
        &self,
        response: reqwest::Response,
        max_bytes: u64,
    ) -> Result<Bytes, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(ServiceError::new(
                    FailureKind::TooLarge {
                        max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(ServiceError::new(
                    FailureKind::TooLarge {
                        max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(bytes))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ServiceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body = self
            .read_body(response, self.settings.max_response_bytes)
            .await?;
        parse_json(&body)
    }
}

#[async_trait::async_trait]
impl EvaluationService for ReqwestService {
    async fn submit_batch(&self, files: &[FileEntry]) -> Result<BatchReceipt, ServiceError> {
        let url = self.endpoint(&["process-omr-batch"])?;
        let form = self.build_form(files).await?;
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body = self
            .read_body(response, self.settings.max_response_bytes)
            .await?;
        parse_json(&body).map(BatchReceipt)
    }

    async fn fetch_summary(&self) -> Result<Vec<ExamSummary>, ServiceError> {
        let url = self.endpoint(&["my-exams", "summary"])?;
        Ok(match self.get_json(url).await? {
            SummaryPayload::Bare(rows) | SummaryPayload::Wrapped { exams: rows } => rows,
        })
    }

    async fn fetch_grades(&self, key: &GroupKey) -> Result<Vec<DetailRecord>, ServiceError> {
        let url = self.endpoint(&["my-exams", key.as_str(), "grades"])?;
        Ok(match self.get_json(url).await? {
            GradesPayload::Bare(records) | GradesPayload::Wrapped { grades: records } => records,
        })
    }

    async fn download_artifact(
        &self,
        key: &GroupKey,
        kind: &ArtifactKind,
    ) -> Result<Bytes, ServiceError> {
        let url = match kind {
            ArtifactKind::GradesCsv => {
                self.endpoint(&["my-exams", key.as_str(), "grades", "csv"])?
            }
            ArtifactKind::GradedImagesZip => {
                self.endpoint(&["my-exams", key.as_str(), "graded-images"])?
            }
            ArtifactKind::GradedImage(image) => self.endpoint(&["download", image.as_str()])?,
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        self.read_body(response, self.settings.max_artifact_bytes)
            .await
    }
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ServiceError> {
    serde_json::from_slice(body)
        .map_err(|err| ServiceError::new(FailureKind::MalformedBody, err.to_string()))
}

fn map_reqwest_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        return ServiceError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_decode() {
        return ServiceError::new(FailureKind::MalformedBody, err.to_string());
    }
    ServiceError::new(FailureKind::Network, err.to_string())
}
