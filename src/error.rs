use crate::models::document::Side;
use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 文档目录错误（会话无法开始）
    #[error("文档目录错误: {0}")]
    Catalog(#[from] CatalogError),
    /// 分步保存错误
    #[error("保存错误: {0}")]
    Persistence(#[from] PersistenceError),
    /// 数据校验错误
    #[error("校验错误: {0}")]
    Validation(#[from] ValidationError),
    /// 最终提交错误
    #[error("提交错误: {0}")]
    Submission(#[from] SubmissionError),
    /// 会话操作错误
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 文档目录错误
///
/// 空目录单独成为一个变体：它表示"没有需要收集的文档"，
/// 与"加载失败"是两种不同的终态。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// 网络请求失败
    #[error("无法加载签证 {visa_id} 的文档目录: {message}")]
    RequestFailed { visa_id: String, message: String },
    /// 服务端返回非成功状态
    #[error("文档目录接口返回错误 (签证 {visa_id}): status={status}, message={message:?}")]
    BadResponse {
        visa_id: String,
        status: u16,
        message: Option<String>,
    },
    /// 响应解析失败
    #[error("文档目录解析失败 (签证 {visa_id}): {message}")]
    DecodeFailed { visa_id: String, message: String },
    /// 目录为空
    #[error("签证 {visa_id} 没有需要上传的文档")]
    Empty { visa_id: String },
}

/// OCR 调用错误
///
/// 只在 `OcrReconciler` 内部流转，对外一律转换为 `OcrResult`。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OcrError {
    /// 连接失败
    #[error("无法连接到 OCR 服务: {0}")]
    Transport(String),
    /// 超时
    #[error("OCR 请求超时 ({millis}ms)")]
    Timeout { millis: u64 },
    /// 服务端错误 (5xx)
    #[error("OCR 服务端错误: status={status}")]
    Server { status: u16, body: Option<String> },
    /// 客户端错误 (4xx)，重试没有意义
    #[error("OCR 请求被拒绝: status={status}")]
    Client { status: u16, body: Option<String> },
    /// 响应解析失败
    #[error("OCR 响应解析失败: {0}")]
    Decode(String),
}

impl OcrError {
    /// 是否属于值得重试一次的服务端故障
    pub fn is_transient(&self) -> bool {
        matches!(self, OcrError::Server { .. } | OcrError::Timeout { .. })
    }
}

/// 分步保存错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    /// 网络请求失败
    #[error("保存请求失败 ({endpoint}): {message}")]
    Transport { endpoint: String, message: String },
    /// 服务端返回 4xx/5xx
    #[error("保存接口返回错误 ({endpoint}): status={status}, message={message:?}")]
    Status {
        endpoint: String,
        status: u16,
        message: Option<String>,
    },
    /// 响应解析失败
    #[error("保存响应解析失败 ({endpoint}): {message}")]
    Decode { endpoint: String, message: String },
    /// 服务端明确拒绝
    #[error("保存被拒绝: {message}")]
    Rejected { message: String },
}

/// 数据校验错误（永远不会发送到服务端）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// 当前位置缺少文件
    #[error("旅客 {traveller} 的文档 {document} 缺少 {side} 面")]
    MissingSide {
        traveller: usize,
        document: String,
        side: Side,
    },
    /// 护照必填字段缺失
    #[error("护照信息缺少必填字段: {}", fields.join(", "))]
    MissingPassportFields { fields: Vec<&'static str> },
    /// 护照信息尚未保存
    #[error("旅客 {traveller} 的护照信息尚未保存")]
    PassportNotSaved { traveller: usize },
    /// 当前位置的文件尚未确认保存
    #[error("旅客 {traveller} 的文档 {document} {side} 面尚未保存")]
    UnsavedStep {
        traveller: usize,
        document: String,
        side: Side,
    },
    /// 文件不符合要求
    #[error("{message}")]
    InvalidFile { code: &'static str, message: String },
    /// 线下办理必须填写员工编号
    #[error("线下办理必须填写员工编号")]
    EmployeeIdRequired,
    /// 当前不在任何上传位置（已进入总览）
    #[error("当前不在上传位置")]
    NoActivePosition,
    /// 护照信息只能在护照正面填写
    #[error("当前位置不是护照正面")]
    NotPassportStep,
    /// 旅客索引越界
    #[error("旅客索引 {index} 超出范围 [0, {count})")]
    TravellerOutOfRange { index: usize, count: usize },
}

/// 最终提交错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    /// 已经提交成功过
    #[error("申请已提交，不能重复提交")]
    AlreadySubmitted,
    /// 不在总览状态
    #[error("只能在总览页提交申请")]
    NotInReview,
    /// 护照正面已上传但缺少护照记录
    #[error("旅客 {traveller} 缺少护照信息，不能提交")]
    PassportMissing { traveller: usize },
    /// 传输或服务端失败
    #[error("最终提交失败: {0}")]
    Failed(#[from] PersistenceError),
}

/// 会话操作错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// 有未完成的异步操作
    #[error("上一个操作尚未完成")]
    Busy,
    /// 会话为只读（已最终提交）
    #[error("申请已完成，会话为只读")]
    ReadOnly,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 目录不存在
    #[error("目录不存在: {path}")]
    DirectoryNotFound { path: String },
}

// ========== 从常见错误类型转换 ==========

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::File(FileError::TomlParseFailed {
            path: String::new(), // TOML错误通常不包含路径信息
            source: err,
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: err,
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(format!("JSON解析失败: {}", err))
    }
}

// ========== 便捷构造函数 ==========

impl PersistenceError {
    /// 从 reqwest 错误创建传输错误
    pub fn transport(endpoint: impl Into<String>, err: &reqwest::Error) -> Self {
        PersistenceError::Transport {
            endpoint: endpoint.into(),
            message: err.to_string(),
        }
    }
}

impl OcrError {
    /// 从 reqwest 错误分类
    pub fn from_reqwest(err: &reqwest::Error, timeout_millis: u64) -> Self {
        if err.is_timeout() {
            OcrError::Timeout {
                millis: timeout_millis,
            }
        } else if err.is_decode() {
            OcrError::Decode(err.to_string())
        } else {
            OcrError::Transport(err.to_string())
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
