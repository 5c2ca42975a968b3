//! # Visa Intake
//!
//! 签证申请材料收集状态机：按旅客 × 文档 × 正反面逐项收集证件图片，
//! 护照正面尽力做 OCR 预填，每一步增量保存，中断后可以从服务端记录精确恢复。
//!
//! ## 架构设计
//!
//! ### ① 模型层（Models）
//! - `models/` - 文档要求、护照信息、OCR 结果、旅客进度、服务端申请聚合、录入清单
//!
//! ### ② 客户端层（Clients）
//! - `VisaApiClient` - 文档目录 / 已有申请 / 分步保存
//! - `OcrClient` - 预热 + 护照识别
//!
//! ### ③ 业务能力层（Services）
//! - `DocumentCatalog` - 每个会话固定的文档目录
//! - `OcrReconciler` - 尽力而为的 OCR，失败退化为手工填写
//! - `StepPersistenceGateway` - 串行化的分步保存
//! - `SubmissionGate` - 只成功一次的最终提交
//! - `WarnWriter` - 写 warn.txt 能力
//!
//! ### ④ 流程层（Workflow）
//! - `NavigationCursor` - (旅客, 文档, 面) 遍历状态机
//! - `ApplicationHydrator` - 从服务端记录恢复进度
//! - `IntakeSession` - 守卫、busy 标志、错误转状态
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量处理录入清单，管理并发
//! - `orchestrator/intake_processor` - 按清单驱动单个申请
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use orchestrator::App;
pub use services::DocumentCatalog;
pub use workflow::{IntakeSession, NavigationCursor, SessionDeps, SessionStart};
