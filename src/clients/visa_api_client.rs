/// 签证后端 API 客户端
///
/// 封装文档目录、已有申请查询和分步保存三个接口
use crate::config::Config;
use crate::error::{CatalogError, PersistenceError};
use crate::models::application::{ApplicationEnvelope, VisaApplicationAggregate};
use crate::models::document::CatalogDocument;
use crate::services::catalog::CatalogSource;
use crate::services::persistence::{ApplicationStore, StepPayload};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

const APPLY_VISA_PATH: &str = "/api/VisaApplication/apply-visa";

/// 目录接口响应
#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    documents: Vec<CatalogDocument>,
}

/// 错误响应里可能带的说明
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "error")]
    message: Option<String>,
}

/// 签证后端客户端
#[derive(Clone)]
pub struct VisaApiClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl VisaApiClient {
    /// 创建新的后端客户端
    pub fn new(config: &Config) -> Self {
        Self::with_base_url(&config.api_base_url, config.access_token.clone())
    }

    pub fn with_base_url(base_url: &str, access_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// 构建保存请求的表单
    fn build_form(payload: &StepPayload) -> Result<Form, PersistenceError> {
        let fields = payload.text_fields().map_err(|e| PersistenceError::Decode {
            endpoint: APPLY_VISA_PATH.to_string(),
            message: format!("无法序列化表单字段: {}", e),
        })?;

        let mut form = Form::new();
        for (name, value) in fields {
            form = form.text(name, value);
        }
        for part in &payload.files {
            let file_part = Part::bytes(part.file.bytes.clone())
                .file_name(part.file.file_name.clone())
                .mime_str(&part.file.content_type)
                .map_err(|e| PersistenceError::transport(APPLY_VISA_PATH, &e))?;
            form = form.part(part.field_name.clone(), file_part);
        }
        Ok(form)
    }

    async fn error_message(response: Response) -> Option<String> {
        let text = response.text().await.ok()?;
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => body.message,
            Err(_) if text.trim().is_empty() => None,
            Err(_) => Some(text),
        }
    }

    async fn decode_envelope(
        endpoint: &str,
        response: Response,
    ) -> Result<VisaApplicationAggregate, PersistenceError> {
        let envelope: ApplicationEnvelope =
            response.json().await.map_err(|e| PersistenceError::Decode {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;
        if let Some(message) = &envelope.message {
            debug!("{} 响应: {}", endpoint, message);
        }
        Ok(envelope.visa_application)
    }
}

#[async_trait]
impl CatalogSource for VisaApiClient {
    async fn fetch_documents(&self, visa_id: &str) -> Result<Vec<CatalogDocument>, CatalogError> {
        let url = self.url(&format!(
            "/api/configurations/documents/{}/documents-only",
            visa_id
        ));
        debug!("GET {}", url);

        let response = self
            .authorized(self.http.get(&url))
            .send()
            .await
            .map_err(|e| CatalogError::RequestFailed {
                visa_id: visa_id.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::BadResponse {
                visa_id: visa_id.to_string(),
                status: status.as_u16(),
                message: Self::error_message(response).await,
            });
        }

        let body: CatalogResponse = response.json().await.map_err(|e| CatalogError::DecodeFailed {
            visa_id: visa_id.to_string(),
            message: e.to_string(),
        })?;

        if !body.success {
            return Err(CatalogError::BadResponse {
                visa_id: visa_id.to_string(),
                status: status.as_u16(),
                message: body.message,
            });
        }

        Ok(body.documents)
    }
}

#[async_trait]
impl ApplicationStore for VisaApiClient {
    async fn fetch_application(
        &self,
        payment_id: &str,
    ) -> Result<Option<VisaApplicationAggregate>, PersistenceError> {
        let path = format!("/api/VisaApplication/application/{}", payment_id);
        let url = self.url(&path);
        debug!("GET {}", url);

        let response = self
            .authorized(self.http.get(&url))
            .send()
            .await
            .map_err(|e| PersistenceError::transport(&path, &e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(PersistenceError::Status {
                endpoint: path,
                status: status.as_u16(),
                message: Self::error_message(response).await,
            });
        }

        Self::decode_envelope(&path, response).await.map(Some)
    }

    async fn save(
        &self,
        payload: &StepPayload,
    ) -> Result<VisaApplicationAggregate, PersistenceError> {
        let url = self.url(APPLY_VISA_PATH);
        let form = Self::build_form(payload)?;
        debug!("POST {} ({} 个文件)", url, payload.files.len());

        let response = self
            .authorized(self.http.post(&url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| PersistenceError::transport(APPLY_VISA_PATH, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PersistenceError::Status {
                endpoint: APPLY_VISA_PATH.to_string(),
                status: status.as_u16(),
                message: Self::error_message(response).await,
            });
        }

        Self::decode_envelope(APPLY_VISA_PATH, response).await
    }
}
