/// OCR 服务客户端
///
/// `GET {base}/warmup` 预热，`POST {base}/extract` 上传图片（表单字段 `file`）
use crate::config::Config;
use crate::error::OcrError;
use crate::models::ocr::OcrResponse;
use crate::models::progress::LocalFile;
use crate::services::ocr_reconciler::PassportExtractor;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use std::time::Duration;
use tracing::debug;

/// OCR 客户端
#[derive(Clone)]
pub struct OcrClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OcrClient {
    pub fn new(config: &Config) -> Self {
        Self::with_base_url(&config.ocr_base_url, config.ocr_timeout())
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn timeout_millis(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// 4xx / 5xx 分类
    async fn check_status(response: Response) -> Result<Response, OcrError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.ok().filter(|b| !b.trim().is_empty());
        if status.is_server_error() {
            Err(OcrError::Server {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(OcrError::Client {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl PassportExtractor for OcrClient {
    async fn warm_up(&self) -> Result<(), OcrError> {
        let url = format!("{}/warmup", self.base_url);
        debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| OcrError::from_reqwest(&e, self.timeout_millis()))?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn extract(&self, file: &LocalFile) -> Result<OcrResponse, OcrError> {
        let url = format!("{}/extract", self.base_url);
        debug!("POST {} ({})", url, file.file_name);

        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| OcrError::Transport(e.to_string()))?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| OcrError::from_reqwest(&e, self.timeout_millis()))?;

        let response = Self::check_status(response).await?;
        response
            .json::<OcrResponse>()
            .await
            .map_err(|e| OcrError::Decode(e.to_string()))
    }
}
