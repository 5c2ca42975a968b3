//! 旅客上传进度
//!
//! 每个 (旅客, 文档, 面) 只有一个 `UploadedSide`，
//! 要么是尚未确认保存的本地文件，要么是服务端已持久化的远程引用。

use crate::models::document::{DocumentRequirement, Side};
use crate::models::ocr::OcrResult;
use crate::models::passport::{PassportData, PassportRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 服务端保存的文件引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub url: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
}

/// 用户选择的本地文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl LocalFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// 某一面的上传状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UploadedSide {
    /// 本地文件，等待保存确认
    Pending { file: LocalFile, preview: String },
    /// 已持久化的远程文件
    Remote(FileRef),
}

impl UploadedSide {
    pub fn file_name(&self) -> &str {
        match self {
            UploadedSide::Pending { file, .. } => &file.file_name,
            UploadedSide::Remote(file_ref) => &file_ref.file_name,
        }
    }

    pub fn pending_file(&self) -> Option<&LocalFile> {
        match self {
            UploadedSide::Pending { file, .. } => Some(file),
            UploadedSide::Remote(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, UploadedSide::Pending { .. })
    }
}

/// 一份文档的正反面
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front: Option<UploadedSide>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back: Option<UploadedSide>,
}

impl DocumentSides {
    pub fn get(&self, side: Side) -> Option<&UploadedSide> {
        match side {
            Side::Front => self.front.as_ref(),
            Side::Back => self.back.as_ref(),
        }
    }

    pub fn set(&mut self, side: Side, value: UploadedSide) {
        match side {
            Side::Front => self.front = Some(value),
            Side::Back => self.back = Some(value),
        }
    }

    pub fn take(&mut self, side: Side) -> Option<UploadedSide> {
        match side {
            Side::Front => self.front.take(),
            Side::Back => self.back.take(),
        }
    }

    /// 双面文档需要两面都在，单面文档只看正面
    pub fn is_complete(&self, requires_both_sides: bool) -> bool {
        self.front.is_some() && (!requires_both_sides || self.back.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.front.is_none() && self.back.is_none()
    }
}

/// 单个旅客的进度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravellerProgress {
    pub traveller_index: usize,
    pub sides_by_document: BTreeMap<String, DocumentSides>,
    pub ocr_result: Option<OcrResult>,
    pub passport_saved: bool,
}

impl TravellerProgress {
    pub fn new(traveller_index: usize) -> Self {
        Self {
            traveller_index,
            sides_by_document: BTreeMap::new(),
            ocr_result: None,
            passport_saved: false,
        }
    }

    /// 为每位旅客创建空进度
    pub fn for_travellers(count: usize) -> Vec<Self> {
        (0..count).map(Self::new).collect()
    }

    pub fn side(&self, document_id: &str, side: Side) -> Option<&UploadedSide> {
        self.sides_by_document
            .get(document_id)
            .and_then(|sides| sides.get(side))
    }

    pub fn has_side(&self, document_id: &str, side: Side) -> bool {
        self.side(document_id, side).is_some()
    }

    pub fn is_document_complete(&self, document: &DocumentRequirement) -> bool {
        self.sides_by_document
            .get(&document.id)
            .is_some_and(|sides| sides.is_complete(document.requires_both_sides))
    }

    /// 放入新选择的本地文件
    ///
    /// 护照正面被替换时，之前的 OCR 结果和保存状态一律作废。
    pub fn place_pending(&mut self, document: &DocumentRequirement, side: Side, file: LocalFile) {
        let preview = format!(
            "preview://{}/{}/{}/{}",
            self.traveller_index, document.id, side, file.file_name
        );
        self.sides_by_document
            .entry(document.id.clone())
            .or_default()
            .set(side, UploadedSide::Pending { file, preview });

        if document.gates_passport(side) {
            self.ocr_result = None;
            self.passport_saved = false;
        }
    }

    /// 保存确认后，用远程引用替换本地文件
    pub fn mark_persisted(&mut self, document_id: &str, side: Side, file_ref: FileRef) {
        self.sides_by_document
            .entry(document_id.to_string())
            .or_default()
            .set(side, UploadedSide::Remote(file_ref));
    }

    /// 移除某一面
    pub fn remove_side(
        &mut self,
        document: &DocumentRequirement,
        side: Side,
    ) -> Option<UploadedSide> {
        let removed = self
            .sides_by_document
            .get_mut(&document.id)
            .and_then(|sides| sides.take(side));

        if self
            .sides_by_document
            .get(&document.id)
            .is_some_and(DocumentSides::is_empty)
        {
            self.sides_by_document.remove(&document.id);
        }

        if document.gates_passport(side) {
            self.ocr_result = None;
            self.passport_saved = false;
        }
        removed
    }

    pub fn record_ocr(&mut self, result: OcrResult) {
        self.ocr_result = Some(result);
    }

    /// 记录用户确认的护照信息
    pub fn save_passport(&mut self, data: PassportData) {
        match self.ocr_result.as_mut() {
            Some(result) => result.extracted_data = data,
            None => self.ocr_result = Some(OcrResult::restored(data, "")),
        }
        self.passport_saved = true;
    }

    /// 手工表单的预填数据（OCR 失败时为空）
    pub fn passport_form(&self) -> PassportData {
        self.ocr_result
            .as_ref()
            .map(|result| result.extracted_data.clone())
            .unwrap_or_default()
    }

    /// 已保存的护照记录
    pub fn passport_record(&self) -> Option<PassportRecord> {
        if !self.passport_saved {
            return None;
        }
        self.ocr_result
            .as_ref()
            .map(|result| PassportRecord::new(self.traveller_index, result.extracted_data.clone()))
    }

    /// 护照关卡：没有待确认的 OCR 数据，或者已保存
    pub fn passport_gate_open(&self) -> bool {
        self.ocr_result.is_none() || self.passport_saved
    }

    /// 护照正面已上传但还没有保存过护照记录
    pub fn lacks_passport_record(&self, document: &DocumentRequirement) -> bool {
        document.gates_passport(Side::Front)
            && self.has_side(&document.id, Side::Front)
            && !self.passport_saved
    }

    /// 恢复出的护照正面没有对应记录时，用空表单关闭护照关卡
    pub fn require_passport_review(&mut self, document: &DocumentRequirement) -> bool {
        if !self.lacks_passport_record(document) || self.ocr_result.is_some() {
            return false;
        }
        let file_name = self
            .side(&document.id, Side::Front)
            .map(|side| side.file_name().to_string())
            .unwrap_or_default();
        self.ocr_result = Some(OcrResult::failed(
            &file_name,
            "未找到已保存的护照信息，请核对后保存",
        ));
        true
    }

    /// 所有尚未确认保存的本地文件
    pub fn pending_sides(&self) -> impl Iterator<Item = (&str, Side, &LocalFile)> {
        self.sides_by_document.iter().flat_map(|(document_id, sides)| {
            [Side::Front, Side::Back].into_iter().filter_map(move |side| {
                sides
                    .get(side)
                    .and_then(UploadedSide::pending_file)
                    .map(|file| (document_id.as_str(), side, file))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passport() -> DocumentRequirement {
        DocumentRequirement::new("passport", "Passport", true)
    }

    fn jpeg(name: &str) -> LocalFile {
        LocalFile::new(name, "image/jpeg", vec![0xFF, 0xD8, 0xFF])
    }

    #[test]
    fn reuploading_passport_front_invalidates_saved_record() {
        let doc = passport();
        let mut progress = TravellerProgress::new(0);
        progress.place_pending(&doc, Side::Front, jpeg("a.jpg"));
        progress.record_ocr(OcrResult::failed("a.jpg", "offline"));
        progress.save_passport(PassportData::default());
        assert!(progress.passport_saved);

        progress.place_pending(&doc, Side::Front, jpeg("b.jpg"));
        assert!(!progress.passport_saved);
        assert!(progress.ocr_result.is_none());
    }

    #[test]
    fn restored_front_without_record_closes_the_gate() {
        let doc = passport();
        let mut progress = TravellerProgress::new(0);
        progress.mark_persisted(
            "passport",
            Side::Front,
            FileRef {
                url: "https://cdn/f.jpg".into(),
                file_name: "f.jpg".into(),
            },
        );
        assert!(progress.lacks_passport_record(&doc));
        assert!(progress.passport_gate_open());

        assert!(progress.require_passport_review(&doc));
        assert!(!progress.passport_gate_open());
        assert_eq!(progress.passport_form(), PassportData::default());
        assert_eq!(progress.ocr_result.as_ref().unwrap().filename, "f.jpg");

        progress.save_passport(PassportData::default());
        assert!(!progress.lacks_passport_record(&doc));
        assert!(!progress.require_passport_review(&doc));
        assert!(progress.passport_gate_open());
    }

    #[test]
    fn back_side_upload_keeps_passport_state() {
        let doc = passport();
        let mut progress = TravellerProgress::new(0);
        progress.place_pending(&doc, Side::Front, jpeg("a.jpg"));
        progress.save_passport(PassportData::default());
        progress.place_pending(&doc, Side::Back, jpeg("back.jpg"));
        assert!(progress.passport_saved);
        assert!(progress.is_document_complete(&doc));
    }

    #[test]
    fn removing_last_side_drops_document_entry() {
        let doc = passport();
        let mut progress = TravellerProgress::new(2);
        progress.place_pending(&doc, Side::Front, jpeg("a.jpg"));
        progress.save_passport(PassportData::default());

        let removed = progress.remove_side(&doc, Side::Front);
        assert_eq!(removed.map(|s| s.file_name().to_string()).as_deref(), Some("a.jpg"));
        assert!(progress.sides_by_document.is_empty());
        assert!(!progress.passport_saved);
    }

    #[test]
    fn persisted_side_is_no_longer_pending() {
        let doc = DocumentRequirement::new("photo", "Photo", true);
        let mut progress = TravellerProgress::new(0);
        progress.place_pending(&doc, Side::Front, jpeg("me.jpg"));
        assert_eq!(progress.pending_sides().count(), 1);

        progress.mark_persisted(
            "photo",
            Side::Front,
            FileRef {
                url: "https://cdn/me.jpg".into(),
                file_name: "me.jpg".into(),
            },
        );
        assert_eq!(progress.pending_sides().count(), 0);
        assert!(progress.is_document_complete(&doc));
    }
}
