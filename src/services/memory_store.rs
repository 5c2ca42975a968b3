//! 内存申请存储
//!
//! 按服务端的合并规则维护聚合，用于试运行（不写后端）和测试。

use crate::error::PersistenceError;
use crate::models::application::{DocumentKey, VisaApplicationAggregate};
use crate::models::document::Side;
use crate::models::progress::FileRef;
use crate::services::persistence::{ApplicationStore, StepPayload};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// 内存申请存储
#[derive(Default)]
pub struct InMemoryApplicationStore {
    applications: Mutex<HashMap<String, VisaApplicationAggregate>>,
    saves: Mutex<Vec<StepPayload>>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一条已有申请
    pub async fn seed(&self, aggregate: VisaApplicationAggregate) {
        let payment_id = aggregate.payment_id.clone().unwrap_or_default();
        self.applications.lock().await.insert(payment_id, aggregate);
    }

    /// 当前聚合快照
    pub async fn snapshot(&self, payment_id: &str) -> Option<VisaApplicationAggregate> {
        self.applications.lock().await.get(payment_id).cloned()
    }

    /// 收到的全部保存请求（按到达顺序）
    pub async fn saves(&self) -> Vec<StepPayload> {
        self.saves.lock().await.clone()
    }
}

/// 把一次保存合并进聚合
fn merge(aggregate: &mut VisaApplicationAggregate, payload: &StepPayload) {
    let applicant = &payload.applicant;
    aggregate.visa_id = applicant.visa_id.clone();
    aggregate.payment_id = Some(applicant.payment_id.clone());
    aggregate.travellers = applicant.travellers;
    aggregate.email = applicant.email.clone();
    aggregate.phone = applicant.phone.clone();
    aggregate.country = applicant.country.clone();
    if applicant.processing_mode.is_some() {
        aggregate.processing_mode = applicant.processing_mode;
        aggregate.employee_id = applicant.employee_id.clone();
    }

    for part in &payload.files {
        let Some((key, side)) = DocumentKey::parse_field_name(&part.field_name) else {
            warn!("忽略无法识别的文件字段: {}", part.field_name);
            continue;
        };
        let file_ref = FileRef {
            url: format!(
                "memory://{}/{}/{}/{}",
                applicant.payment_id, key, side, part.file.file_name
            ),
            file_name: part.file.file_name.clone(),
        };
        let stored = aggregate.documents.entry(key.to_string()).or_default();
        match side {
            Side::Front => stored.front = Some(file_ref),
            Side::Back => stored.back = Some(file_ref),
        }
    }

    for record in &payload.passport_data {
        aggregate
            .passport_data
            .retain(|existing| existing.traveller_index != record.traveller_index);
        aggregate.passport_data.push(record.clone());
    }
    aggregate.passport_data.sort_by_key(|record| record.traveller_index);

    // 只会从 false 变成 true
    if payload.is_final_submit {
        aggregate.is_final_submit = true;
    }
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn fetch_application(
        &self,
        payment_id: &str,
    ) -> Result<Option<VisaApplicationAggregate>, PersistenceError> {
        Ok(self.snapshot(payment_id).await)
    }

    async fn save(
        &self,
        payload: &StepPayload,
    ) -> Result<VisaApplicationAggregate, PersistenceError> {
        self.saves.lock().await.push(payload.clone());

        let mut applications = self.applications.lock().await;
        let aggregate = applications
            .entry(payload.applicant.payment_id.clone())
            .or_default();
        merge(aggregate, payload);
        debug!(
            "[内存存储] {} 已合并, documents={}",
            payload.applicant.payment_id,
            aggregate.documents.len()
        );
        Ok(aggregate.clone())
    }
}
