//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量申请处理器
//! - 初始化后端与 OCR 客户端
//! - 加载录入清单（Vec<IntakeManifest>）
//! - 控制并发数量（Semaphore）
//! - 输出全局统计信息
//!
//! ### `intake_processor` - 单个申请处理器
//! - 按清单驱动一个 IntakeSession 走完所有位置
//! - 决定是否最终提交
//! - 无法完成时写 warn 文件
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<IntakeManifest>)
//!     ↓
//! intake_processor (处理单个申请)
//!     ↓
//! workflow::IntakeSession (状态机)
//!     ↓
//! services (能力层：catalog / ocr / persistence / submission)
//!     ↓
//! clients (HTTP：VisaApiClient / OcrClient)
//! ```

pub mod batch_processor;
pub mod intake_processor;

pub use batch_processor::{App, ProcessingStats};
pub use intake_processor::{process_application, IntakeStatus};
