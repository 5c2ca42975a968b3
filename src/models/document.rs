//! 文档要求
//!
//! "是否需要正反两面"与"是否为护照类文档"在目录加载时一次性计算，
//! 作为 `DocumentRequirement` 上的声明式能力保存。

use phf::phf_set;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 需要上传正反两面的证件名称（小写、去空白后比较）
static DOUBLE_SIDED_NAMES: phf::Set<&'static str> = phf_set! {
    "passport",
    "valid passport",
    "national id",
    "national id card",
    "aadhar card",
    "aadhaar card",
    "pan card",
    "driver license",
    "driver's license",
    "driving license",
    "voter id",
};

/// 护照类文档名称，正面上传时触发 OCR
static PASSPORT_NAMES: phf::Set<&'static str> = phf_set! {
    "passport",
    "valid passport",
};

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// 根据文档名称判断是否需要正反两面
pub fn requires_both_sides(name: &str) -> bool {
    DOUBLE_SIDED_NAMES.contains(normalize_name(name).as_str())
}

/// 根据文档名称判断是否为护照类文档
pub fn is_passport_class(name: &str) -> bool {
    PASSPORT_NAMES.contains(normalize_name(name).as_str())
}

/// 证件的一面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Front,
    Back,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Front => "front",
            Side::Back => "back",
        }
    }

    /// 从 `front` / `back` 解析
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "front" => Some(Side::Front),
            "back" => Some(Side::Back),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 目录接口返回的原始文档条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub format: String,
    #[serde(rename = "isMandatory", default)]
    pub is_mandatory: bool,
}

/// 一项文档要求，在一次会话内不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRequirement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub format: String,
    pub is_mandatory: bool,
    pub requires_both_sides: bool,
    pub is_passport: bool,
}

impl DocumentRequirement {
    /// 构建文档要求，派生能力由名称决定
    pub fn new(id: impl Into<String>, name: impl Into<String>, is_mandatory: bool) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            requires_both_sides: requires_both_sides(&name),
            is_passport: is_passport_class(&name),
            name,
            description: String::new(),
            format: String::new(),
            is_mandatory,
        }
    }

    /// 由目录条目转换
    pub fn from_catalog(doc: CatalogDocument) -> Self {
        Self {
            description: doc.description,
            format: doc.format,
            ..Self::new(doc.id, doc.name, doc.is_mandatory)
        }
    }

    /// 需要上传的面（按遍历顺序）
    pub fn sides(&self) -> &'static [Side] {
        if self.requires_both_sides {
            &[Side::Front, Side::Back]
        } else {
            &[Side::Front]
        }
    }

    /// 护照正面需要经过护照信息保存关卡
    pub fn gates_passport(&self, side: Side) -> bool {
        self.is_passport && side == Side::Front
    }
}
