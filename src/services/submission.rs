//! 最终提交闸门
//!
//! 一次会话只允许一次成功的最终提交；失败可以重试。

use crate::error::SubmissionError;
use crate::models::application::VisaApplicationAggregate;
use crate::models::progress::TravellerProgress;
use crate::services::catalog::DocumentCatalog;
use crate::services::persistence::{StepPayload, StepPersistenceGateway};
use tracing::{info, warn};

/// 最终提交闸门
#[derive(Debug, Default)]
pub struct SubmissionGate {
    submitted: bool,
}

impl SubmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从已提交的聚合恢复时直接关闭闸门
    pub fn closed() -> Self {
        Self { submitted: true }
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    /// 发出最终提交
    ///
    /// 补发所有尚未确认的本地文件，附带全部护照记录，`isFinalSubmit = true`。
    /// 任何旅客的护照正面已上传却没有护照记录时拒绝提交，不发送请求。
    /// 成功后闸门关闭，之后的调用返回 `AlreadySubmitted` 且不产生任何请求。
    pub async fn submit(
        &mut self,
        gateway: &StepPersistenceGateway,
        catalog: &DocumentCatalog,
        progress: &[TravellerProgress],
    ) -> Result<VisaApplicationAggregate, SubmissionError> {
        if self.submitted {
            warn!("[申请 {}] 重复提交被拒绝", gateway.applicant().payment_id);
            return Err(SubmissionError::AlreadySubmitted);
        }

        let missing = progress.iter().find(|traveller| {
            catalog
                .iter()
                .any(|document| traveller.lacks_passport_record(document))
        });
        if let Some(traveller) = missing {
            warn!(
                "[申请 {}] 旅客 {} 没有护照记录，拒绝提交",
                gateway.applicant().payment_id,
                traveller.traveller_index
            );
            return Err(SubmissionError::PassportMissing {
                traveller: traveller.traveller_index,
            });
        }

        let payload = StepPayload::final_submit(gateway.applicant(), catalog, progress);
        info!(
            "[申请 {}] 🚀 最终提交 ({} 个待补发文件)",
            gateway.applicant().payment_id,
            payload.files.len()
        );

        let aggregate = gateway.commit(&payload).await?;
        self.submitted = true;
        info!("[申请 {}] ✅ 申请已提交", gateway.applicant().payment_id);
        Ok(aggregate)
    }
}
