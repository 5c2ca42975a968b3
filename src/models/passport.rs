//! 护照信息
//!
//! OCR 的提取结果与用户手工填写共用同一个结构。
//! 家庭信息字段（父母、配偶、地址）永远是可选的。

use crate::error::ValidationError;
use serde::{Deserialize, Deserializer, Serialize};

/// 必填字段
pub const REQUIRED_FIELDS: [&str; 6] = [
    "passport_number",
    "surname",
    "given_names",
    "date_of_birth",
    "nationality",
    "sex",
];

/// 护照字段（扁平结构，缺失值为空字符串）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassportData {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub passport_number: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub surname: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub given_names: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub date_of_birth: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub date_of_issue: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub date_of_expiry: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub place_of_birth: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub place_of_issue: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub nationality: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sex: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub father_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub mother_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub spouse_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub address: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub file_number: String,
}

// OCR 服务对识别不到的字段返回 null
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl PassportData {
    /// 按字段名取值
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "passport_number" => &self.passport_number,
            "surname" => &self.surname,
            "given_names" => &self.given_names,
            "date_of_birth" => &self.date_of_birth,
            "date_of_issue" => &self.date_of_issue,
            "date_of_expiry" => &self.date_of_expiry,
            "place_of_birth" => &self.place_of_birth,
            "place_of_issue" => &self.place_of_issue,
            "nationality" => &self.nationality,
            "sex" => &self.sex,
            "father_name" => &self.father_name,
            "mother_name" => &self.mother_name,
            "spouse_name" => &self.spouse_name,
            "address" => &self.address,
            "file_number" => &self.file_number,
            _ => return None,
        };
        Some(value.as_str())
    }

    fn values(&self) -> [&String; 15] {
        [
            &self.passport_number,
            &self.surname,
            &self.given_names,
            &self.date_of_birth,
            &self.date_of_issue,
            &self.date_of_expiry,
            &self.place_of_birth,
            &self.place_of_issue,
            &self.nationality,
            &self.sex,
            &self.father_name,
            &self.mother_name,
            &self.spouse_name,
            &self.address,
            &self.file_number,
        ]
    }

    fn values_mut(&mut self) -> [&mut String; 15] {
        [
            &mut self.passport_number,
            &mut self.surname,
            &mut self.given_names,
            &mut self.date_of_birth,
            &mut self.date_of_issue,
            &mut self.date_of_expiry,
            &mut self.place_of_birth,
            &mut self.place_of_issue,
            &mut self.nationality,
            &mut self.sex,
            &mut self.father_name,
            &mut self.mother_name,
            &mut self.spouse_name,
            &mut self.address,
            &mut self.file_number,
        ]
    }

    /// 缺失的必填字段
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|name| self.field(name).map_or(true, |v| v.trim().is_empty()))
            .collect()
    }

    /// 必填字段是否齐全
    pub fn is_valid(&self) -> bool {
        self.missing_required_fields().is_empty()
    }

    /// 校验必填字段
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = self.missing_required_fields();
        if fields.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingPassportFields { fields })
        }
    }

    /// 是否至少识别出一个字段
    pub fn has_any_data(&self) -> bool {
        self.values().iter().any(|v| !v.trim().is_empty())
    }

    /// 用 `other` 中的非空字段覆盖当前值
    pub fn overlay(&mut self, other: &PassportData) {
        for (target, value) in self.values_mut().into_iter().zip(other.values()) {
            if !value.trim().is_empty() {
                *target = value.trim().to_string();
            }
        }
    }
}

/// 某位旅客的护照记录（服务端 `passportData` 数组的元素）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassportRecord {
    #[serde(rename = "travellerIndex")]
    pub traveller_index: usize,
    #[serde(flatten)]
    pub data: PassportData,
}

impl PassportRecord {
    pub fn new(traveller_index: usize, data: PassportData) -> Self {
        Self {
            traveller_index,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> PassportData {
        PassportData {
            passport_number: "N1234567".into(),
            surname: "SHARMA".into(),
            given_names: "ANITA".into(),
            date_of_birth: "12/04/1990".into(),
            nationality: "INDIAN".into(),
            sex: "F".into(),
            ..PassportData::default()
        }
    }

    #[test]
    fn family_fields_are_optional() {
        let data = complete();
        assert!(data.is_valid());
        assert!(data.father_name.is_empty() && data.address.is_empty());
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut data = complete();
        data.surname = "   ".into();
        data.sex.clear();
        assert_eq!(data.missing_required_fields(), vec!["surname", "sex"]);
        assert!(matches!(
            data.validate(),
            Err(ValidationError::MissingPassportFields { .. })
        ));
    }

    #[test]
    fn nulls_from_ocr_become_empty_strings() {
        let data: PassportData =
            serde_json::from_str(r#"{"passport_number":"Z999","surname":null}"#).unwrap();
        assert_eq!(data.passport_number, "Z999");
        assert_eq!(data.surname, "");
        assert!(data.has_any_data());
        assert!(!PassportData::default().has_any_data());
    }

    #[test]
    fn overlay_keeps_existing_values_for_blank_input() {
        let mut data = complete();
        let patch = PassportData {
            surname: " VERMA ".into(),
            address: "Pune".into(),
            ..PassportData::default()
        };
        data.overlay(&patch);
        assert_eq!(data.surname, "VERMA");
        assert_eq!(data.address, "Pune");
        assert_eq!(data.given_names, "ANITA");
    }

    #[test]
    fn record_flattens_fields_next_to_traveller_index() {
        let record = PassportRecord::new(1, complete());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["travellerIndex"], 1);
        assert_eq!(value["surname"], "SHARMA");

        let back: PassportRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
