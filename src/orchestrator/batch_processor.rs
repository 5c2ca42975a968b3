//! 批量申请处理器 - 编排层
//!
//! ## 职责
//!
//! 应用入口：初始化客户端、加载录入清单、并发处理每个申请、汇总统计。
//!
//! 不同申请的聚合互相独立，可以并发；同一申请内部的保存由会话串行化。
//! 并发数量由 Semaphore 限制。

use crate::clients::{OcrClient, VisaApiClient};
use crate::config::Config;
use crate::models::loaders::{load_all_manifests, IntakeManifest};
use crate::orchestrator::intake_processor::{self, IntakeStatus};
use crate::services::{ApplicationStore, InMemoryApplicationStore, WarnWriter};
use crate::workflow::SessionDeps;
use anyhow::{Context, Result};
use futures::future::join_all;
use std::fs;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    deps: SessionDeps,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate().context("配置不合法")?;

        init_log_file(&config.output_log_file)?;
        log_startup(&config);

        let api = Arc::new(VisaApiClient::new(&config));
        let store: Arc<dyn ApplicationStore> = if config.dry_run {
            warn!("🧪 试运行模式：保存只写入内存");
            Arc::new(InMemoryApplicationStore::new())
        } else {
            api.clone()
        };

        let deps = SessionDeps {
            catalog_source: api,
            store,
            extractor: Arc::new(OcrClient::new(&config)),
        };

        Ok(Self { config, deps })
    }

    /// 使用自定义依赖创建（测试或嵌入场景）
    pub fn with_deps(config: Config, deps: SessionDeps) -> Self {
        Self { config, deps }
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<ProcessingStats> {
        info!("\n📁 正在扫描录入清单...");
        let manifests = load_all_manifests(&self.config.manifest_folder)
            .await
            .with_context(|| format!("无法加载清单目录: {}", self.config.manifest_folder))?;

        if manifests.is_empty() {
            warn!("⚠️ 没有找到待处理的TOML文件，程序结束");
            return Ok(ProcessingStats::default());
        }

        info!(
            "✓ 找到 {} 个申请，最大并发 {}",
            manifests.len(),
            self.config.max_concurrent_sessions
        );

        let stats = self.process_all(manifests).await?;
        print_final_stats(&stats, &self.config);
        Ok(stats)
    }

    /// 并发处理全部申请
    async fn process_all(&self, manifests: Vec<IntakeManifest>) -> Result<ProcessingStats> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_sessions));
        let warn_writer = Arc::new(WarnWriter::with_path(&self.config.warn_file));
        let mut handles = Vec::new();

        for (idx, manifest) in manifests.into_iter().enumerate() {
            let app_index = idx + 1;
            let permit = semaphore.clone().acquire_owned().await?;
            let deps = self.deps.clone();
            let config = self.config.clone();
            let warn_writer = warn_writer.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                intake_processor::process_application(
                    &manifest,
                    app_index,
                    deps,
                    &config,
                    &warn_writer,
                )
                .await
                .map_err(|e| {
                    error!("[申请 {}] ❌ 处理过程中发生错误: {:#}", app_index, e);
                    let reason = format!("{:#}", e);
                    if let Err(write_err) =
                        warn_writer.write(&manifest.payment_id, "会话", &reason)
                    {
                        error!("写入 warn 文件失败: {}", write_err);
                    }
                    e
                })
            });
            handles.push(handle);
        }

        let mut stats = ProcessingStats {
            total: handles.len(),
            ..Default::default()
        };
        for (idx, joined) in join_all(handles).await.into_iter().enumerate() {
            match joined {
                Ok(Ok(status)) => stats.record(status),
                Ok(Err(_)) => stats.failed += 1,
                Err(e) => {
                    error!("[申请 {}] 任务执行失败: {}", idx + 1, e);
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }
}

/// 处理统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessingStats {
    pub total: usize,
    pub submitted: usize,
    pub awaiting_submit: usize,
    pub already_submitted: usize,
    pub nothing_to_collect: usize,
    pub incomplete: usize,
    pub failed: usize,
}

impl ProcessingStats {
    fn record(&mut self, status: IntakeStatus) {
        match status {
            IntakeStatus::Submitted => self.submitted += 1,
            IntakeStatus::AwaitingSubmit => self.awaiting_submit += 1,
            IntakeStatus::AlreadySubmitted => self.already_submitted += 1,
            IntakeStatus::NothingToCollect => self.nothing_to_collect += 1,
            IntakeStatus::Incomplete => self.incomplete += 1,
        }
    }
}

// ========== 日志辅助函数 ==========

fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n签证材料录入日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .with_context(|| format!("无法写入日志文件: {}", log_file_path))?;
    Ok(())
}

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 批量签证材料录入");
    info!("🌐 后端: {} | OCR: {}", config.api_base_url, config.ocr_base_url);
    info!("📊 最大并发数: {}", config.max_concurrent_sessions);
    info!("{}", "=".repeat(60));
}

fn print_final_stats(stats: &ProcessingStats, config: &Config) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 已提交: {}/{}", stats.submitted, stats.total);
    info!("⏸ 待提交: {}", stats.awaiting_submit);
    info!("↩ 之前已提交: {}", stats.already_submitted);
    info!("∅ 无需上传: {}", stats.nothing_to_collect);
    info!("⚠️ 未完成: {}", stats.incomplete);
    info!("❌ 失败: {}", stats.failed);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", config.output_log_file);
    if stats.incomplete + stats.failed > 0 {
        info!("需要人工处理的申请见: {}", config.warn_file);
    }
}
