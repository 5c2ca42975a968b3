//! 单个申请处理器 - 编排层
//!
//! 按清单驱动一个 `IntakeSession` 走完全部位置：
//! 1. 选择办理方式（未恢复时）
//! 2. 只为缺失的面上传文件
//! 3. 护照正面：OCR 预填 + 清单字段覆盖 → 保存
//! 4. 到达总览后按清单决定是否最终提交
//!
//! 无法自动完成的申请写入 warn 文件，等待人工处理。

use crate::config::Config;
use crate::models::application::ProcessingMode;
use crate::models::document::Side;
use crate::models::loaders::IntakeManifest;
use crate::models::progress::{LocalFile, UploadedSide};
use crate::services::file_validation::content_type_for;
use crate::services::WarnWriter;
use crate::workflow::{CursorState, IntakeSession, Position, SessionDeps, SessionStart};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{error, info, warn};

/// 单个申请的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeStatus {
    /// 已最终提交
    Submitted,
    /// 全部上传完成，清单要求暂不提交
    AwaitingSubmit,
    /// 之前已经最终提交过
    AlreadySubmitted,
    /// 签证没有需要上传的文档
    NothingToCollect,
    /// 中途停止，已写入 warn 文件
    Incomplete,
}

/// 处理单个申请
///
/// # 参数
/// - `manifest`: 录入清单
/// - `app_index`: 申请序号（仅用于日志）
/// - `deps`: 会话依赖
/// - `config`: 配置
/// - `warn_writer`: 警告写入
pub async fn process_application(
    manifest: &IntakeManifest,
    app_index: usize,
    deps: SessionDeps,
    config: &Config,
    warn_writer: &WarnWriter,
) -> Result<IntakeStatus> {
    info!(
        "[申请 {}] 📄 {} (签证 {}, {} 位旅客)",
        app_index,
        manifest.display_name(),
        manifest.visa_id,
        manifest.travellers
    );

    let start = IntakeSession::start(manifest.applicant_info(), deps, config)
        .await
        .with_context(|| format!("无法开始申请 {}", manifest.payment_id))?;

    let mut session = match start {
        SessionStart::Ready(session) => session,
        SessionStart::NothingToCollect { visa_id } => {
            info!("[申请 {}] 签证 {} 无需上传文档，跳过", app_index, visa_id);
            return Ok(IntakeStatus::NothingToCollect);
        }
    };

    if session.is_read_only() {
        info!("[申请 {}] ✓ 申请已提交过，跳过", app_index);
        return Ok(IntakeStatus::AlreadySubmitted);
    }

    if session.needs_processing_mode() {
        let mode = manifest.processing_mode.unwrap_or(ProcessingMode::Online);
        if let Err(e) = session.choose_processing_mode(mode, manifest.employee_id.as_deref()) {
            return give_up(manifest, warn_writer, "办理方式", &e.to_string());
        }
    }

    info!(
        "[申请 {}] 从 {:.0}% 开始",
        app_index,
        session.completion() * 100.0
    );

    while let CursorState::At(position) = session.state() {
        let stage = stage_name(&session, position);

        if let Err(reason) = fill_position(&mut session, manifest, position).await {
            return give_up(manifest, warn_writer, &stage, &reason);
        }

        if let Err(e) = session.advance() {
            return give_up(manifest, warn_writer, &stage, &e.to_string());
        }
    }

    info!("[申请 {}] ✓ 所有文档已上传", app_index);

    if !manifest.submit {
        info!("[申请 {}] 清单设置 submit = false，暂不提交", app_index);
        return Ok(IntakeStatus::AwaitingSubmit);
    }

    match session.submit().await {
        Ok(_) => {
            info!("[申请 {}] ✅ 最终提交成功", app_index);
            Ok(IntakeStatus::Submitted)
        }
        Err(e) => {
            error!("[申请 {}] ❌ 最终提交失败: {}", app_index, e);
            give_up(manifest, warn_writer, "最终提交", &e.to_string())
        }
    }
}

/// 补齐当前位置：上传缺失的面，护照正面补存护照信息
async fn fill_position(
    session: &mut IntakeSession,
    manifest: &IntakeManifest,
    position: Position,
) -> std::result::Result<(), String> {
    let document = session
        .catalog()
        .get(position.document)
        .cloned()
        .ok_or_else(|| "目录位置越界".to_string())?;
    let pending = session.progress()[position.traveller]
        .side(&document.id, position.side)
        .map(UploadedSide::is_pending);

    match pending {
        None => {
            let path = manifest
                .file_for(position.traveller, &document.id, position.side)
                .ok_or_else(|| "清单中没有对应文件".to_string())?;
            let file = read_local_file(&path).await.map_err(|e| e.to_string())?;
            if let Err(e) = session.select_file(file).await {
                retry_once(session, &e.to_string()).await?;
            }
        }
        Some(true) => session.retry_save().await.map_err(|e| e.to_string())?,
        Some(false) => {}
    }

    if document.gates_passport(position.side) {
        let traveller = &session.progress()[position.traveller];
        let wants_save = !traveller.passport_gate_open()
            || (!traveller.passport_saved && manifest.passport_for(position.traveller).is_some());

        if wants_save {
            let mut data = session
                .passport_form(position.traveller)
                .map_err(|e| e.to_string())?;
            if let Some(from_manifest) = manifest.passport_for(position.traveller) {
                data.overlay(from_manifest);
            }
            if let Err(e) = session.save_passport(data).await {
                retry_once(session, &e.to_string()).await?;
            }
        }
    }

    Ok(())
}

/// 保存失败时重发一次
async fn retry_once(
    session: &mut IntakeSession,
    first_error: &str,
) -> std::result::Result<(), String> {
    if session.save_failure().is_none() {
        return Err(first_error.to_string());
    }
    warn!("保存失败，重试一次: {}", first_error);
    session.retry_save().await.map_err(|e| e.to_string())
}

async fn read_local_file(path: &Path) -> Result<LocalFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("无法读取文件: {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let content_type = content_type_for(&file_name).unwrap_or("application/octet-stream");
    Ok(LocalFile::new(file_name, content_type, bytes))
}

fn stage_name(session: &IntakeSession, position: Position) -> String {
    let document = session
        .catalog()
        .get(position.document)
        .map(|d| d.name.as_str())
        .unwrap_or("?");
    let side = match position.side {
        Side::Front => "正面",
        Side::Back => "背面",
    };
    format!("旅客 {} / {} / {}", position.traveller, document, side)
}

fn give_up(
    manifest: &IntakeManifest,
    warn_writer: &WarnWriter,
    stage: &str,
    reason: &str,
) -> Result<IntakeStatus> {
    warn!("[申请 {}] ⚠️ {} 无法完成: {}", manifest.payment_id, stage, reason);
    warn_writer.write(&manifest.payment_id, stage, reason)?;
    Ok(IntakeStatus::Incomplete)
}
