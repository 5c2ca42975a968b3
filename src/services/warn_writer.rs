//! 警告写入服务 - 业务能力层
//!
//! 只负责把"无法自动完成的申请"追加到 warn.txt，不关心流程

use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use tracing::debug;

/// 警告写入服务
///
/// 职责：
/// - 记录批量录入中需要人工处理的申请
/// - 每次只写一条
pub struct WarnWriter {
    warn_file_path: String,
}

impl WarnWriter {
    pub fn new() -> Self {
        Self {
            warn_file_path: "warn.txt".to_string(),
        }
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            warn_file_path: path.into(),
        }
    }

    /// 写入警告信息
    ///
    /// # 参数
    /// - `payment_id`: 支付单号
    /// - `stage`: 出问题的环节，例如 `"旅客 0 / passport / back"`
    /// - `reason`: 原因
    pub fn write(&self, payment_id: &str, stage: &str, reason: &str) -> Result<()> {
        debug!("写入警告: 申请 {} | {} | {}", payment_id, stage, reason);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.warn_file_path)?;

        let line = format!(
            "{} | 申请 {} | {} | {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            payment_id,
            stage,
            reason
        );
        file.write_all(line.as_bytes())?;

        Ok(())
    }
}

impl Default for WarnWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warn.txt");
        let writer = WarnWriter::with_path(path.to_string_lossy());

        writer.write("pay_1", "旅客 0 / passport / front", "文件不存在").unwrap();
        writer.write("pay_2", "提交", "保存失败").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("申请 pay_1 | 旅客 0 / passport / front | 文件不存在"));
        assert!(lines[1].contains("申请 pay_2"));
    }
}
