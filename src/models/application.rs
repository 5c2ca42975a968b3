//! 签证申请聚合（服务端记录）
//!
//! 服务端的字段类型并不严格：`travellers` 可能是字符串也可能是数字，
//! `isFinalSubmit` 可能是布尔值、`"true"` 或 `1`，这里统一在反序列化时处理。

use crate::error::ValidationError;
use crate::models::document::Side;
use crate::models::passport::PassportRecord;
use crate::models::progress::FileRef;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// 办理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// 线上自助
    Online,
    /// 线下由员工代办
    Offline,
}

impl ProcessingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingMode::Online => "online",
            ProcessingMode::Offline => "offline",
        }
    }
}

/// 申请人与申请的基本信息，每次保存都会随表单发送
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantInfo {
    pub visa_id: String,
    pub payment_id: String,
    pub travellers: usize,
    pub email: String,
    pub phone: String,
    pub country: String,
    #[serde(default)]
    pub processing_mode: Option<ProcessingMode>,
    #[serde(default)]
    pub employee_id: Option<String>,
}

impl ApplicantInfo {
    /// 选择办理方式，线下办理必须带员工编号
    pub fn choose_processing_mode(
        &mut self,
        mode: ProcessingMode,
        employee_id: Option<&str>,
    ) -> Result<(), ValidationError> {
        let employee_id = employee_id.map(str::trim).filter(|id| !id.is_empty());
        match mode {
            ProcessingMode::Offline if employee_id.is_none() => {
                return Err(ValidationError::EmployeeIdRequired)
            }
            ProcessingMode::Offline => self.employee_id = employee_id.map(str::to_string),
            ProcessingMode::Online => self.employee_id = None,
        }
        self.processing_mode = Some(mode);
        Ok(())
    }
}

/// 聚合中 `documents` 的键：`<travellerIndex>_<documentId>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    pub traveller_index: usize,
    pub document_id: String,
}

fn field_name_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^documents\[(\d+)\]\[(.+?)\]\[(front|back)\]$").ok())
        .as_ref()
}

impl DocumentKey {
    pub fn new(traveller_index: usize, document_id: impl Into<String>) -> Self {
        Self {
            traveller_index,
            document_id: document_id.into(),
        }
    }

    /// 解析 `<travellerIndex>_<documentId>`
    pub fn parse(key: &str) -> Option<Self> {
        let (index, document_id) = key.split_once('_')?;
        if document_id.is_empty() {
            return None;
        }
        Some(Self::new(index.parse().ok()?, document_id))
    }

    /// 上传表单中文件字段的名称
    pub fn field_name(&self, side: Side) -> String {
        format!(
            "documents[{}][{}][{}]",
            self.traveller_index, self.document_id, side
        )
    }

    /// 解析 `documents[<t>][<docId>][front|back]`
    pub fn parse_field_name(name: &str) -> Option<(Self, Side)> {
        let caps = field_name_regex()?.captures(name)?;
        let traveller_index = caps.get(1)?.as_str().parse().ok()?;
        let side = Side::parse(caps.get(3)?.as_str())?;
        Some((Self::new(traveller_index, caps.get(2)?.as_str()), side))
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.traveller_index, self.document_id)
    }
}

/// 聚合中某份文档已保存的正反面
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub front: Option<FileRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back: Option<FileRef>,
}

impl StoredSides {
    pub fn get(&self, side: Side) -> Option<&FileRef> {
        match side {
            Side::Front => self.front.as_ref(),
            Side::Back => self.back.as_ref(),
        }
    }
}

/// 服务端的签证申请记录
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisaApplicationAggregate {
    #[serde(default)]
    pub visa_id: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default, deserialize_with = "count_from_string_or_number")]
    pub travellers: usize,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub processing_mode: Option<ProcessingMode>,
    #[serde(default)]
    pub employee_id: Option<String>,
    #[serde(default)]
    pub documents: BTreeMap<String, StoredSides>,
    #[serde(default)]
    pub passport_data: Vec<PassportRecord>,
    #[serde(default, deserialize_with = "loose_bool")]
    pub is_final_submit: bool,
}

impl VisaApplicationAggregate {
    /// 查找某个 (旅客, 文档, 面) 的已保存文件
    pub fn stored_side(&self, key: &DocumentKey, side: Side) -> Option<&FileRef> {
        self.documents
            .get(&key.to_string())
            .and_then(|sides| sides.get(side))
    }

    /// 某位旅客的护照记录
    pub fn passport_for(&self, traveller_index: usize) -> Option<&PassportRecord> {
        self.passport_data
            .iter()
            .find(|record| record.traveller_index == traveller_index)
    }
}

/// `apply-visa` 与查询接口的响应外层
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationEnvelope {
    #[serde(default)]
    pub message: Option<String>,
    pub visa_application: VisaApplicationAggregate,
}

fn count_from_string_or_number<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u64),
        Text(String),
    }

    match Count::deserialize(deserializer)? {
        Count::Number(n) => usize::try_from(n).map_err(D::Error::custom),
        Count::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("无效的旅客人数: {}", text))),
    }
}

fn loose_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Bool(bool),
        Number(i64),
        Text(String),
        Null(()),
    }

    Ok(match Loose::deserialize(deserializer)? {
        Loose::Bool(b) => b,
        Loose::Number(n) => n == 1,
        Loose::Text(text) => matches!(text.as_str(), "true" | "1"),
        Loose::Null(()) => false,
    })
}
