use crate::error::FileError;
use crate::models::application::{ApplicantInfo, ProcessingMode};
use crate::models::document::Side;
use crate::models::passport::PassportData;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 一份申请的录入清单
///
/// 文件路径相对于清单所在目录。
#[derive(Debug, Clone, Deserialize)]
pub struct IntakeManifest {
    pub visa_id: String,
    pub payment_id: String,
    pub country: String,
    pub travellers: usize,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub processing_mode: Option<ProcessingMode>,
    #[serde(default)]
    pub employee_id: Option<String>,
    /// 全部上传后是否最终提交
    #[serde(default = "default_submit")]
    pub submit: bool,
    #[serde(default, rename = "traveller")]
    pub traveller_files: Vec<TravellerManifest>,
    #[serde(skip)]
    pub file_path: Option<PathBuf>,
}

fn default_submit() -> bool {
    true
}

/// 单个旅客的文件与护照信息
#[derive(Debug, Clone, Deserialize)]
pub struct TravellerManifest {
    pub index: usize,
    #[serde(default)]
    pub passport: Option<PassportData>,
    #[serde(default, rename = "document")]
    pub documents: Vec<DocumentFiles>,
}

/// 某份文档的正反面文件
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentFiles {
    pub document_id: String,
    #[serde(default)]
    pub front: Option<PathBuf>,
    #[serde(default)]
    pub back: Option<PathBuf>,
}

impl IntakeManifest {
    /// 申请基本信息
    pub fn applicant_info(&self) -> ApplicantInfo {
        ApplicantInfo {
            visa_id: self.visa_id.clone(),
            payment_id: self.payment_id.clone(),
            travellers: self.travellers,
            email: self.email.clone(),
            phone: self.phone.clone(),
            country: self.country.clone(),
            processing_mode: None,
            employee_id: None,
        }
    }

    fn traveller(&self, index: usize) -> Option<&TravellerManifest> {
        self.traveller_files.iter().find(|t| t.index == index)
    }

    /// 某个位置对应的本地文件路径
    pub fn file_for(
        &self,
        traveller_index: usize,
        document_id: &str,
        side: Side,
    ) -> Option<PathBuf> {
        let files = self
            .traveller(traveller_index)?
            .documents
            .iter()
            .find(|d| d.document_id == document_id)?;
        let relative = match side {
            Side::Front => files.front.as_ref()?,
            Side::Back => files.back.as_ref()?,
        };
        let base = self
            .file_path
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new("."));
        Some(base.join(relative))
    }

    /// 清单中填写的护照信息
    pub fn passport_for(&self, traveller_index: usize) -> Option<&PassportData> {
        self.traveller(traveller_index)?.passport.as_ref()
    }

    /// 用于日志和警告的名称
    pub fn display_name(&self) -> String {
        self.file_path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.payment_id.clone())
    }
}

/// 从 TOML 文件加载录入清单
pub async fn load_manifest(manifest_path: &Path) -> Result<IntakeManifest, FileError> {
    let path_text = manifest_path.display().to_string();
    let content = fs::read_to_string(manifest_path)
        .await
        .map_err(|source| FileError::ReadFailed {
            path: path_text.clone(),
            source,
        })?;

    let mut manifest: IntakeManifest =
        toml::from_str(&content).map_err(|source| FileError::TomlParseFailed {
            path: path_text,
            source,
        })?;

    manifest.file_path = Some(manifest_path.to_path_buf());

    Ok(manifest)
}

/// 从文件夹中加载所有录入清单，按文件名排序
///
/// 单个文件解析失败只记录警告，不影响其他清单。
pub async fn load_all_manifests(folder_path: &str) -> Result<Vec<IntakeManifest>, FileError> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        return Err(FileError::DirectoryNotFound {
            path: folder_path.to_string(),
        });
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .map_err(|source| FileError::ReadFailed {
            path: folder_path.to_string(),
            source,
        })?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| FileError::ReadFailed {
            path: folder_path.to_string(),
            source,
        })?
    {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut manifests = Vec::new();
    for path in paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_manifest(&path).await {
            Ok(manifest) => {
                tracing::info!(
                    "成功加载申请 {} ({} 位旅客)",
                    manifest.payment_id,
                    manifest.travellers
                );
                manifests.push(manifest);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
visa_id = "visa-jp"
payment_id = "pay_001"
country = "Japan"
travellers = 1
email = "a@example.com"
phone = "9000000000"
processing_mode = "offline"
employee_id = "EMP-9"

[[traveller]]
index = 0

[traveller.passport]
surname = "RAO"

[[traveller.document]]
document_id = "passport"
front = "t0/front.jpg"
back = "t0/back.jpg"
"#;

    #[test]
    fn manifest_paths_resolve_next_to_the_manifest() {
        let mut manifest: IntakeManifest = toml::from_str(MANIFEST).unwrap();
        manifest.file_path = Some(PathBuf::from("/data/intake/pay_001.toml"));

        assert!(manifest.submit);
        assert_eq!(manifest.processing_mode, Some(ProcessingMode::Offline));
        assert_eq!(
            manifest.file_for(0, "passport", Side::Back),
            Some(PathBuf::from("/data/intake/t0/back.jpg"))
        );
        assert_eq!(manifest.file_for(0, "photo", Side::Front), None);
        assert_eq!(manifest.file_for(1, "passport", Side::Front), None);
        assert_eq!(manifest.passport_for(0).unwrap().surname, "RAO");
        assert_eq!(manifest.display_name(), "pay_001.toml");
    }
}
