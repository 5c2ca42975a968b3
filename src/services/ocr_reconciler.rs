//! OCR 协调服务 - 业务能力层
//!
//! 护照识别只是"锦上添花"：任何失败都转换为 `succeeded = false` 的
//! `OcrResult`，调用方继续展示手工表单，绝不阻塞上传流程。
//!
//! 调用策略：
//! 1. 先发一次预热请求（失败忽略）
//! 2. 带超时提取一次
//! 3. 服务端故障（5xx / 超时）时等待固定时间后再试一次
//! 4. 仍失败则退化为手工填写

use crate::config::Config;
use crate::error::OcrError;
use crate::models::ocr::{OcrResponse, OcrResult};
use crate::models::progress::LocalFile;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// 外部护照识别服务
#[async_trait]
pub trait PassportExtractor: Send + Sync {
    /// 预热，降低冷启动延迟
    async fn warm_up(&self) -> Result<(), OcrError>;

    /// 提交一张图片并返回识别结果
    async fn extract(&self, file: &LocalFile) -> Result<OcrResponse, OcrError>;
}

/// OCR 协调器
pub struct OcrReconciler {
    extractor: Arc<dyn PassportExtractor>,
    timeout: Duration,
    retry_delay: Duration,
}

impl OcrReconciler {
    pub fn new(
        extractor: Arc<dyn PassportExtractor>,
        timeout: Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            extractor,
            timeout,
            retry_delay,
        }
    }

    pub fn from_config(extractor: Arc<dyn PassportExtractor>, config: &Config) -> Self {
        Self::new(extractor, config.ocr_timeout(), config.ocr_retry_delay())
    }

    /// 识别护照正面，永远返回结果
    pub async fn extract(&self, file: &LocalFile) -> OcrResult {
        debug!("OCR 识别: {} ({} 字节)", file.file_name, file.size());

        self.warm_up().await;

        let outcome = match self.attempt(file).await {
            Err(e) if e.is_transient() => {
                warn!(
                    "OCR 服务端故障: {}，{}ms 后重试一次",
                    e,
                    self.retry_delay.as_millis()
                );
                sleep(self.retry_delay).await;
                self.warm_up().await;
                self.attempt(file).await
            }
            other => other,
        };

        match outcome {
            Ok(response) => {
                let result = OcrResult::from_response(response, &file.file_name);
                if result.succeeded {
                    info!("✓ OCR 识别成功: {}", file.file_name);
                } else {
                    warn!("⚠️ OCR 未识别出护照信息: {}", file.file_name);
                }
                result
            }
            Err(e) => {
                warn!("⚠️ OCR 失败，转为手工填写: {}", e);
                OcrResult::failed(&file.file_name, manual_entry_message(&e))
            }
        }
    }

    async fn attempt(&self, file: &LocalFile) -> Result<OcrResponse, OcrError> {
        match timeout(self.timeout, self.extractor.extract(file)).await {
            Ok(result) => result,
            Err(_) => Err(OcrError::Timeout {
                millis: self.timeout.as_millis() as u64,
            }),
        }
    }

    async fn warm_up(&self) {
        match timeout(self.timeout, self.extractor.warm_up()).await {
            Ok(Ok(())) => debug!("OCR 预热完成"),
            Ok(Err(e)) => debug!("OCR 预热失败（忽略）: {}", e),
            Err(_) => debug!("OCR 预热超时（忽略）"),
        }
    }
}

/// 展示给用户的可关闭提示
fn manual_entry_message(err: &OcrError) -> String {
    match err {
        OcrError::Transport(_) => "无法连接到 OCR 服务，请手动填写护照信息后继续".to_string(),
        other => format!("OCR 处理失败: {}，请手动填写护照信息后继续", other),
    }
}
