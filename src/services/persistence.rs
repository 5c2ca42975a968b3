//! 分步保存网关 - 业务能力层
//!
//! 每次保存都是对服务端聚合的一次定向 upsert：
//! `documents[<t>_<docId>][side]` 以及（可选的）按旅客替换的 `passportData`。
//!
//! 同一会话内的保存严格串行：网关持有一把异步锁，
//! 上一个请求的应答（或失败）返回之前，下一个请求不会发出。

use crate::error::PersistenceError;
use crate::models::application::{ApplicantInfo, DocumentKey, VisaApplicationAggregate};
use crate::models::document::{DocumentRequirement, Side};
use crate::models::passport::PassportRecord;
use crate::models::progress::{LocalFile, TravellerProgress};
use crate::services::catalog::DocumentCatalog;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// 服务端申请记录的读写接口
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// 按支付单号查询已有申请，不存在时返回 `None`
    async fn fetch_application(
        &self,
        payment_id: &str,
    ) -> Result<Option<VisaApplicationAggregate>, PersistenceError>;

    /// 提交一次保存，返回更新后的聚合
    async fn save(&self, payload: &StepPayload)
        -> Result<VisaApplicationAggregate, PersistenceError>;
}

/// 表单中的一个文件字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field_name: String,
    pub file: LocalFile,
}

/// 上传标志
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadedFlags {
    pub front: bool,
    pub back: bool,
}

/// 单份文档的元数据，服务端用 `name` 给文件命名
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentEntryMetadata {
    pub id: String,
    pub name: String,
    pub sides: Vec<Side>,
    pub uploaded: UploadedFlags,
}

/// 单个旅客的文档元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TravellerDocumentsMetadata {
    pub traveller_index: usize,
    pub documents: Vec<DocumentEntryMetadata>,
}

/// 一次保存请求，与具体传输方式无关
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPayload {
    pub applicant: ApplicantInfo,
    pub files: Vec<FilePart>,
    pub passport_data: Vec<PassportRecord>,
    pub documents_metadata: Vec<TravellerDocumentsMetadata>,
    pub is_final_submit: bool,
}

impl StepPayload {
    /// 单个位置的分步保存
    pub fn step(
        applicant: &ApplicantInfo,
        traveller_index: usize,
        document: &DocumentRequirement,
        side: Side,
        file: Option<&LocalFile>,
        passport: Option<&PassportRecord>,
    ) -> Self {
        let key = DocumentKey::new(traveller_index, document.id.clone());
        let files = file
            .map(|file| FilePart {
                field_name: key.field_name(side),
                file: file.clone(),
            })
            .into_iter()
            .collect::<Vec<_>>();

        let uploaded = UploadedFlags {
            front: file.is_some() && side == Side::Front,
            back: file.is_some() && side == Side::Back,
        };

        Self {
            applicant: applicant.clone(),
            files,
            passport_data: passport.cloned().into_iter().collect(),
            documents_metadata: vec![TravellerDocumentsMetadata {
                traveller_index,
                documents: vec![DocumentEntryMetadata {
                    id: document.id.clone(),
                    name: document.name.clone(),
                    sides: document.sides().to_vec(),
                    uploaded,
                }],
            }],
            is_final_submit: false,
        }
    }

    /// 最终提交：补发仍未确认的本地文件，并带上全部护照记录
    pub fn final_submit(
        applicant: &ApplicantInfo,
        catalog: &DocumentCatalog,
        progress: &[TravellerProgress],
    ) -> Self {
        let files = progress
            .iter()
            .flat_map(|traveller| {
                traveller.pending_sides().map(move |(document_id, side, file)| FilePart {
                    field_name: DocumentKey::new(traveller.traveller_index, document_id)
                        .field_name(side),
                    file: file.clone(),
                })
            })
            .collect();

        let documents_metadata = progress
            .iter()
            .map(|traveller| TravellerDocumentsMetadata {
                traveller_index: traveller.traveller_index,
                documents: catalog
                    .iter()
                    .map(|document| DocumentEntryMetadata {
                        id: document.id.clone(),
                        name: document.name.clone(),
                        sides: document.sides().to_vec(),
                        uploaded: UploadedFlags {
                            front: traveller.has_side(&document.id, Side::Front),
                            back: traveller.has_side(&document.id, Side::Back),
                        },
                    })
                    .collect(),
            })
            .collect();

        Self {
            applicant: applicant.clone(),
            files,
            passport_data: progress
                .iter()
                .filter_map(TravellerProgress::passport_record)
                .collect(),
            documents_metadata,
            is_final_submit: true,
        }
    }

    /// 表单文本字段
    pub fn text_fields(&self) -> Result<Vec<(&'static str, String)>, serde_json::Error> {
        let applicant = &self.applicant;
        let mut fields = vec![
            ("visaId", applicant.visa_id.clone()),
            ("travellers", applicant.travellers.to_string()),
            ("email", applicant.email.clone()),
            ("phone", applicant.phone.clone()),
            ("country", applicant.country.clone()),
            ("paymentId", applicant.payment_id.clone()),
            ("paymentOrderId", applicant.payment_id.clone()),
        ];
        if let Some(mode) = applicant.processing_mode {
            fields.push(("processingMode", mode.as_str().to_string()));
        }
        if let Some(employee_id) = &applicant.employee_id {
            fields.push(("employeeId", employee_id.clone()));
        }
        if !self.passport_data.is_empty() {
            fields.push(("passportData", serde_json::to_string(&self.passport_data)?));
        }
        fields.push((
            "documentsMetadata",
            serde_json::to_string(&self.documents_metadata)?,
        ));
        if self.is_final_submit {
            fields.push(("isFinalSubmit", "true".to_string()));
        }
        Ok(fields)
    }
}

/// 分步保存网关
pub struct StepPersistenceGateway {
    store: Arc<dyn ApplicationStore>,
    applicant: ApplicantInfo,
    /// 串行锁，内部计数为已发出的请求序号
    sequence: Mutex<u64>,
}

impl StepPersistenceGateway {
    pub fn new(store: Arc<dyn ApplicationStore>, applicant: ApplicantInfo) -> Self {
        Self {
            store,
            applicant,
            sequence: Mutex::new(0),
        }
    }

    pub fn applicant(&self) -> &ApplicantInfo {
        &self.applicant
    }

    pub fn applicant_mut(&mut self) -> &mut ApplicantInfo {
        &mut self.applicant
    }

    /// 保存一个位置
    ///
    /// # 参数
    /// - `traveller_index`: 旅客索引
    /// - `document`: 文档要求
    /// - `side`: 哪一面
    /// - `file`: 本次上传的文件（仅保存护照信息时为 `None`）
    /// - `passport`: 护照记录（会替换该旅客之前的记录）
    ///
    /// # 返回
    /// 服务端回显的最新聚合
    pub async fn save_step(
        &self,
        traveller_index: usize,
        document: &DocumentRequirement,
        side: Side,
        file: Option<&LocalFile>,
        passport: Option<&PassportRecord>,
    ) -> Result<VisaApplicationAggregate, PersistenceError> {
        let payload = StepPayload::step(
            &self.applicant,
            traveller_index,
            document,
            side,
            file,
            passport,
        );
        self.commit(&payload).await
    }

    /// 发出一次保存，和其他保存严格串行
    pub async fn commit(
        &self,
        payload: &StepPayload,
    ) -> Result<VisaApplicationAggregate, PersistenceError> {
        let mut sequence = self.sequence.lock().await;
        *sequence += 1;
        let seq = *sequence;

        debug!(
            "[申请 {}] 保存 #{}: {} 个文件, {} 条护照记录, final={}",
            self.applicant.payment_id,
            seq,
            payload.files.len(),
            payload.passport_data.len(),
            payload.is_final_submit
        );

        match self.store.save(payload).await {
            Ok(aggregate) => {
                info!("[申请 {}] ✓ 保存 #{} 完成", self.applicant.payment_id, seq);
                Ok(aggregate)
            }
            Err(e) => {
                error!("[申请 {}] ❌ 保存 #{} 失败: {}", self.applicant.payment_id, seq, e);
                Err(e)
            }
        }
    }

    /// 查询已有申请
    pub async fn fetch_existing(
        &self,
    ) -> Result<Option<VisaApplicationAggregate>, PersistenceError> {
        self.store.fetch_application(&self.applicant.payment_id).await
    }
}
