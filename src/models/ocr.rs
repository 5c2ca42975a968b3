use crate::models::passport::PassportData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OCR 服务 `/extract` 的响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResponse {
    pub success: bool,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub data: PassportData,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// 一次护照正面上传对应的 OCR 结果
///
/// 无论成功与否，`extracted_data` 都用于预填手工表单（失败时全部为空）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub succeeded: bool,
    pub extracted_data: PassportData,
    pub error_message: Option<String>,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
}

impl OcrResult {
    /// 由服务响应构建
    pub fn from_response(response: OcrResponse, filename: &str) -> Self {
        let error_message = (!response.success)
            .then(|| "OCR 未能识别护照信息，请手动填写护照信息后继续".to_string());
        Self {
            succeeded: response.success,
            extracted_data: response.data,
            error_message,
            filename: if response.filename.is_empty() {
                filename.to_string()
            } else {
                response.filename
            },
            timestamp: Utc::now(),
        }
    }

    /// OCR 失败，退化为手工填写
    pub fn failed(filename: &str, error_message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            extracted_data: PassportData::default(),
            error_message: Some(error_message.into()),
            filename: filename.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// 从已保存的护照记录恢复
    pub fn restored(data: PassportData, filename: &str) -> Self {
        Self {
            succeeded: true,
            extracted_data: data,
            error_message: None,
            filename: filename.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// 是否识别出可用数据
    pub fn has_usable_data(&self) -> bool {
        self.succeeded && self.extracted_data.has_any_data()
    }
}
