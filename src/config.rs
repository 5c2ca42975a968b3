use crate::error::ConfigError;
use std::time::Duration;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    // --- 后端 API 配置 ---
    /// 签证后端地址
    pub api_base_url: String,
    /// 访问令牌（为空时不带 Authorization 头）
    pub access_token: Option<String>,
    // --- OCR 配置 ---
    /// OCR 服务地址（`/warmup` 与 `/extract` 的公共前缀）
    pub ocr_base_url: String,
    /// 单次 OCR 请求超时（秒）
    pub ocr_timeout_secs: u64,
    /// 5xx 后重试前的等待时间（毫秒）
    pub ocr_retry_delay_ms: u64,
    // --- 上传限制 ---
    /// 单个文件最大字节数
    pub max_upload_bytes: u64,
    // --- 批量录入配置 ---
    /// 录入清单（TOML）存放目录
    pub manifest_folder: String,
    /// 同时处理的申请数量
    pub max_concurrent_sessions: usize,
    /// 输出日志文件
    pub output_log_file: String,
    /// 无法自动完成的申请记录文件
    pub warn_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 试运行：保存写入内存而不是后端（目录与 OCR 仍然访问真实服务）
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000".to_string(),
            access_token: None,
            ocr_base_url: "http://localhost:8000".to_string(),
            ocr_timeout_secs: 30,
            ocr_retry_delay_ms: 800,
            max_upload_bytes: 5 * 1024 * 1024,
            manifest_folder: "intake_manifests".to_string(),
            max_concurrent_sessions: 4,
            output_log_file: "intake_log.txt".to_string(),
            warn_file: "warn.txt".to_string(),
            verbose_logging: false,
            dry_run: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            api_base_url: std::env::var("VISA_API_BASE_URL").unwrap_or(default.api_base_url),
            access_token: std::env::var("VISA_ACCESS_TOKEN").ok().filter(|v| !v.trim().is_empty()),
            ocr_base_url: std::env::var("OCR_BASE_URL").unwrap_or(default.ocr_base_url),
            ocr_timeout_secs: std::env::var("OCR_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.ocr_timeout_secs),
            ocr_retry_delay_ms: std::env::var("OCR_RETRY_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.ocr_retry_delay_ms),
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_upload_bytes),
            manifest_folder: std::env::var("MANIFEST_FOLDER").unwrap_or(default.manifest_folder),
            max_concurrent_sessions: std::env::var("MAX_CONCURRENT_SESSIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_sessions),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            warn_file: std::env::var("WARN_FILE").unwrap_or(default.warn_file),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            dry_run: std::env::var("DRY_RUN").ok().and_then(|v| v.parse().ok()).unwrap_or(default.dry_run),
        }
    }

    /// 检查配置是否可用
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_sessions == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrent_sessions",
                reason: "并发数必须大于 0".to_string(),
            });
        }
        if self.ocr_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "ocr_timeout_secs",
                reason: "OCR 超时必须大于 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs)
    }

    pub fn ocr_retry_delay(&self) -> Duration {
        Duration::from_millis(self.ocr_retry_delay_ms)
    }
}
