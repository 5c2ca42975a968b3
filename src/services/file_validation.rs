//! 上传文件校验
//!
//! 只允许 JPG / PNG / WEBP 图片，并限制大小。

use crate::error::ValidationError;
use crate::models::progress::LocalFile;

pub const INVALID_FILE_TYPE: &str = "INVALID_FILE_TYPE";
pub const FILE_SIZE_EXCEEDED: &str = "FILE_SIZE_EXCEEDED";
pub const INVALID_FILE_EXTENSION: &str = "INVALID_FILE_EXTENSION";

const ALLOWED_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/webp"];
const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// 校验选项
#[derive(Debug, Clone, Copy)]
pub struct FileValidationOptions {
    pub max_size: u64,
}

impl Default for FileValidationOptions {
    fn default() -> Self {
        Self {
            max_size: 5 * 1024 * 1024,
        }
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    Some(ext.to_lowercase())
}

/// 校验单个文件：类型、大小、扩展名依次检查
pub fn validate_file(
    file: &LocalFile,
    options: FileValidationOptions,
) -> Result<(), ValidationError> {
    if !ALLOWED_TYPES.contains(&file.content_type.to_lowercase().as_str()) {
        return Err(ValidationError::InvalidFile {
            code: INVALID_FILE_TYPE,
            message: format!(
                "文件格式无效，请只上传 {} 图片",
                ALLOWED_EXTENSIONS.map(str::to_uppercase).join(", ")
            ),
        });
    }

    if file.size() > options.max_size {
        return Err(ValidationError::InvalidFile {
            code: FILE_SIZE_EXCEEDED,
            message: format!(
                "文件过大 ({})，最大允许 {}",
                format_file_size(file.size()),
                format_file_size(options.max_size)
            ),
        });
    }

    match extension_of(&file.file_name) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(ValidationError::InvalidFile {
            code: INVALID_FILE_EXTENSION,
            message: format!(
                "文件扩展名无效，请使用 {} 文件",
                ALLOWED_EXTENSIONS.map(|ext| format!(".{ext}")).join(", ")
            ),
        }),
    }
}

/// 根据扩展名推断图片类型，无法识别时返回 `None`
pub fn content_type_for(file_name: &str) -> Option<&'static str> {
    match extension_of(file_name)?.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// 人类可读的文件大小
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    let rounded = (size * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
