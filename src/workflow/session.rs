//! 材料收集会话 - 流程层
//!
//! 核心职责：把目录、进度、游标、OCR、分步保存和最终提交串成一个
//! 事件驱动的状态机。调用方（界面或批量编排）只和这里打交道。
//!
//! 一次会话的流程：
//! 1. 加载文档目录（空目录 → 无需收集）
//! 2. 查询已有申请并恢复进度（已最终提交 → 只读）
//! 3. 选择文件 → 护照正面时 OCR → 分步保存
//! 4. 护照正面需要保存护照信息
//! 5. 前进直到 `ReviewAll`，最终提交
//!
//! 同一时刻最多只有一个异步操作在途，由 busy 标志保证。

use crate::config::Config;
use crate::error::{
    AppError, AppResult, CatalogError, PersistenceError, SessionError, SubmissionError,
    ValidationError,
};
use crate::models::application::{
    ApplicantInfo, DocumentKey, ProcessingMode, VisaApplicationAggregate,
};
use crate::models::document::{DocumentRequirement, Side};
use crate::models::ocr::OcrResult;
use crate::models::passport::PassportData;
use crate::models::progress::{LocalFile, TravellerProgress, UploadedSide};
use crate::services::catalog::{CatalogSource, DocumentCatalog};
use crate::services::file_validation::{validate_file, FileValidationOptions};
use crate::services::ocr_reconciler::{OcrReconciler, PassportExtractor};
use crate::services::persistence::{ApplicationStore, StepPersistenceGateway};
use crate::services::submission::SubmissionGate;
use crate::workflow::cursor::{CursorState, NavigationCursor, Position};
use crate::workflow::hydrator::{ApplicationHydrator, HydrationOutcome};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 会话依赖的外部能力
#[derive(Clone)]
pub struct SessionDeps {
    pub catalog_source: Arc<dyn CatalogSource>,
    pub store: Arc<dyn ApplicationStore>,
    pub extractor: Arc<dyn PassportExtractor>,
}

/// 会话启动结果
pub enum SessionStart {
    /// 可以开始（或已只读）
    Ready(Box<IntakeSession>),
    /// 该签证没有需要上传的文档
    NothingToCollect { visa_id: String },
}

/// busy 标志，离开作用域时自动复位
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, SessionError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::Busy)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 材料收集会话
pub struct IntakeSession {
    catalog: DocumentCatalog,
    progress: Vec<TravellerProgress>,
    cursor: NavigationCursor,
    gateway: StepPersistenceGateway,
    ocr: OcrReconciler,
    submission: SubmissionGate,
    validation: FileValidationOptions,
    hydration: HydrationOutcome,
    busy: Arc<AtomicBool>,
    /// 已在本地保存、但尚未被服务端确认的护照记录
    unsynced_passports: BTreeSet<usize>,
    /// 最近一次保存失败（成功后清除）
    save_failure: Option<PersistenceError>,
    /// 可关闭的 OCR 提示
    ocr_warning: Option<String>,
}

impl IntakeSession {
    /// 启动会话
    ///
    /// # 参数
    /// - `applicant`: 申请基本信息（`payment_id` 用于查询已有进度）
    /// - `deps`: 目录、存储和 OCR 能力
    /// - `config`: 程序配置
    ///
    /// # 返回
    /// 目录加载失败或查询已有申请失败时返回错误；空目录不是错误。
    pub async fn start(
        applicant: ApplicantInfo,
        deps: SessionDeps,
        config: &Config,
    ) -> AppResult<SessionStart> {
        info!("[申请 {}] 开始材料收集 (签证 {})", applicant.payment_id, applicant.visa_id);

        let loaded = DocumentCatalog::load(deps.catalog_source.as_ref(), &applicant.visa_id).await;
        let catalog = match loaded {
            Ok(catalog) => catalog,
            Err(CatalogError::Empty { visa_id }) => {
                info!("[申请 {}] 签证 {} 没有需要上传的文档", applicant.payment_id, visa_id);
                return Ok(SessionStart::NothingToCollect { visa_id });
            }
            Err(e) => return Err(AppError::Catalog(e)),
        };

        let mut gateway = StepPersistenceGateway::new(deps.store, applicant);
        let existing = gateway.fetch_existing().await?;

        let traveller_count = gateway.applicant().travellers;
        let mut progress = TravellerProgress::for_travellers(traveller_count);
        let mut cursor = NavigationCursor::new(traveller_count, catalog.layout());

        let hydration =
            ApplicationHydrator::hydrate(existing.as_ref(), &catalog, &mut progress, &mut cursor);
        let submission = match &hydration {
            HydrationOutcome::AlreadySubmitted => SubmissionGate::closed(),
            HydrationOutcome::Resumed {
                processing_mode,
                employee_id,
            } => {
                if let Some(mode) = processing_mode {
                    let applicant = gateway.applicant_mut();
                    applicant.processing_mode = Some(*mode);
                    applicant.employee_id = employee_id.clone();
                }
                SubmissionGate::new()
            }
            HydrationOutcome::Fresh => SubmissionGate::new(),
        };

        Ok(SessionStart::Ready(Box::new(Self {
            catalog,
            progress,
            cursor,
            gateway,
            ocr: OcrReconciler::from_config(deps.extractor, config),
            submission,
            validation: FileValidationOptions {
                max_size: config.max_upload_bytes,
            },
            hydration,
            busy: Arc::new(AtomicBool::new(false)),
            unsynced_passports: BTreeSet::new(),
            save_failure: None,
            ocr_warning: None,
        })))
    }

    // ========== 查询 ==========

    pub fn catalog(&self) -> &DocumentCatalog {
        &self.catalog
    }

    pub fn cursor(&self) -> &NavigationCursor {
        &self.cursor
    }

    pub fn state(&self) -> CursorState {
        self.cursor.state()
    }

    pub fn progress(&self) -> &[TravellerProgress] {
        &self.progress
    }

    pub fn applicant(&self) -> &ApplicantInfo {
        self.gateway.applicant()
    }

    pub fn hydration(&self) -> &HydrationOutcome {
        &self.hydration
    }

    /// 已最终提交，会话只读
    pub fn is_read_only(&self) -> bool {
        self.submission.is_submitted()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// 是否还需要选择办理方式
    pub fn needs_processing_mode(&self) -> bool {
        !self.is_read_only() && self.applicant().processing_mode.is_none()
    }

    pub fn save_failure(&self) -> Option<&PersistenceError> {
        self.save_failure.as_ref()
    }

    pub fn ocr_warning(&self) -> Option<&str> {
        self.ocr_warning.as_deref()
    }

    pub fn dismiss_ocr_warning(&mut self) {
        self.ocr_warning = None;
    }

    /// 当前位置对应的文档
    pub fn current_document(&self) -> Option<&DocumentRequirement> {
        self.cursor
            .position()
            .and_then(|position| self.catalog.get(position.document))
    }

    pub fn ocr_result(&self, traveller: usize) -> Option<&OcrResult> {
        self.progress.get(traveller).and_then(|t| t.ocr_result.as_ref())
    }

    /// 手工护照表单的预填数据
    pub fn passport_form(&self, traveller: usize) -> Result<PassportData, ValidationError> {
        Ok(self.traveller(traveller)?.passport_form())
    }

    /// 总体进度
    pub fn completion(&self) -> f64 {
        self.cursor.completion()
    }

    /// 当前旅客已完成的文档比例
    pub fn traveller_completion(&self, traveller: usize) -> f64 {
        let Some(progress) = self.progress.get(traveller) else {
            return 0.0;
        };
        if self.catalog.is_empty() {
            return 1.0;
        }
        let done = self
            .catalog
            .iter()
            .filter(|document| progress.is_document_complete(document))
            .count();
        done as f64 / self.catalog.len() as f64
    }

    // ========== 操作 ==========

    /// 选择办理方式，线下办理必须提供员工编号
    pub fn choose_processing_mode(
        &mut self,
        mode: ProcessingMode,
        employee_id: Option<&str>,
    ) -> Result<(), SessionError> {
        self.ensure_writable()?;
        self.gateway
            .applicant_mut()
            .choose_processing_mode(mode, employee_id)?;
        info!("[申请 {}] 办理方式: {}", self.applicant().payment_id, mode.as_str());
        Ok(())
    }

    /// 为当前位置选择文件
    ///
    /// 校验 → 放入本地 → 护照正面时 OCR → 分步保存。
    /// 保存失败时本地文件保留，可通过 `retry_save` 重发。
    pub async fn select_file(&mut self, file: LocalFile) -> Result<(), SessionError> {
        self.ensure_writable()?;
        let position = self.current_position()?;
        validate_file(&file, self.validation)?;
        let _busy = BusyGuard::acquire(&self.busy)?;

        let document = self.document_at(position)?.clone();
        let gates_passport = document.gates_passport(position.side);
        debug!(
            "[申请 {}] {} 选择文件 {}",
            self.applicant().payment_id,
            position,
            file.file_name
        );

        self.progress[position.traveller].place_pending(&document, position.side, file.clone());

        if gates_passport {
            self.unsynced_passports.remove(&position.traveller);
            self.ocr_warning = None;

            let result = self.ocr.extract(&file).await;
            if !result.has_usable_data() {
                self.ocr_warning = Some(
                    result
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "OCR 未识别出护照信息，请手动填写".to_string()),
                );
            }
            self.progress[position.traveller].record_ocr(result);
        }

        self.persist(position, &document).await
    }

    /// 移除当前位置的文件（只影响本地）
    pub fn remove_file(&mut self) -> Result<(), SessionError> {
        self.ensure_writable()?;
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        let position = self.current_position()?;
        let document = self.document_at(position)?.clone();

        self.progress[position.traveller].remove_side(&document, position.side);
        if document.gates_passport(position.side) {
            self.unsynced_passports.remove(&position.traveller);
            self.ocr_warning = None;
        }
        self.save_failure = None;
        info!(
            "[申请 {}] {} 已移除文件",
            self.applicant().payment_id,
            position
        );
        Ok(())
    }

    /// 保存当前旅客的护照信息
    ///
    /// 必填字段不全时返回校验错误且不发送请求；重复保存会覆盖之前的记录。
    pub async fn save_passport(&mut self, data: PassportData) -> Result<(), SessionError> {
        self.ensure_writable()?;
        let position = self.current_position()?;
        let document = self.document_at(position)?.clone();
        if !document.gates_passport(position.side) {
            return Err(ValidationError::NotPassportStep.into());
        }
        data.validate()?;
        let _busy = BusyGuard::acquire(&self.busy)?;

        self.progress[position.traveller].save_passport(data);
        self.unsynced_passports.insert(position.traveller);
        self.ocr_warning = None;
        info!(
            "[申请 {}] [旅客 {}] 护照信息已保存",
            self.applicant().payment_id,
            position.traveller
        );

        self.persist(position, &document).await
    }

    /// 重发当前位置尚未确认的保存
    pub async fn retry_save(&mut self) -> Result<(), SessionError> {
        self.ensure_writable()?;
        let position = self.current_position()?;
        let document = self.document_at(position)?.clone();
        let _busy = BusyGuard::acquire(&self.busy)?;

        self.persist(position, &document).await
    }

    /// 前进一步
    ///
    /// 守卫：当前面已上传并已确认保存；护照正面还需护照信息已保存并同步。
    pub fn advance(&mut self) -> Result<CursorState, SessionError> {
        self.ensure_writable()?;
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        let position = self.current_position()?;
        self.check_can_advance(position)?;

        let state = self.cursor.advance();
        match state {
            CursorState::At(next) => debug!("[申请 {}] → {}", self.applicant().payment_id, next),
            CursorState::ReviewAll => {
                info!("[申请 {}] ✓ 所有文档已收集，进入总览", self.applicant().payment_id)
            }
        }
        Ok(state)
    }

    /// 是否允许前进
    pub fn can_advance(&self) -> bool {
        !self.is_read_only()
            && !self.is_busy()
            && self
                .cursor
                .position()
                .is_some_and(|position| self.check_can_advance(position).is_ok())
    }

    /// 后退一步，第一个位置上是空操作
    pub fn retreat(&mut self) -> Result<CursorState, SessionError> {
        self.ensure_writable()?;
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        self.save_failure = None;
        Ok(self.cursor.retreat())
    }

    /// 最终提交，只能在 `ReviewAll` 状态下调用且只会成功一次
    pub async fn submit(&mut self) -> Result<VisaApplicationAggregate, SessionError> {
        if self.submission.is_submitted() {
            return Err(SubmissionError::AlreadySubmitted.into());
        }
        if !self.cursor.is_review_all() {
            return Err(SubmissionError::NotInReview.into());
        }
        let _busy = BusyGuard::acquire(&self.busy)?;

        let aggregate = self
            .submission
            .submit(&self.gateway, &self.catalog, &self.progress)
            .await?;
        self.apply_echo(&aggregate);
        self.unsynced_passports.clear();
        self.save_failure = None;
        Ok(aggregate)
    }

    // ========== 内部 ==========

    fn ensure_writable(&self) -> Result<(), SessionError> {
        if self.is_read_only() {
            return Err(SessionError::ReadOnly);
        }
        Ok(())
    }

    fn current_position(&self) -> Result<Position, ValidationError> {
        self.cursor.position().ok_or(ValidationError::NoActivePosition)
    }

    fn document_at(&self, position: Position) -> Result<&DocumentRequirement, ValidationError> {
        self.catalog
            .get(position.document)
            .ok_or(ValidationError::NoActivePosition)
    }

    fn traveller(&self, index: usize) -> Result<&TravellerProgress, ValidationError> {
        self.progress
            .get(index)
            .ok_or(ValidationError::TravellerOutOfRange {
                index,
                count: self.progress.len(),
            })
    }

    fn check_can_advance(&self, position: Position) -> Result<(), ValidationError> {
        let document = self.document_at(position)?;
        let traveller = self.traveller(position.traveller)?;

        match traveller.side(&document.id, position.side) {
            None => {
                return Err(ValidationError::MissingSide {
                    traveller: position.traveller,
                    document: document.name.clone(),
                    side: position.side,
                })
            }
            Some(UploadedSide::Pending { .. }) => {
                return Err(ValidationError::UnsavedStep {
                    traveller: position.traveller,
                    document: document.name.clone(),
                    side: position.side,
                })
            }
            Some(UploadedSide::Remote(_)) => {}
        }

        if document.gates_passport(position.side) {
            if !traveller.passport_gate_open() {
                return Err(ValidationError::PassportNotSaved {
                    traveller: position.traveller,
                });
            }
            if self.unsynced_passports.contains(&position.traveller) {
                return Err(ValidationError::UnsavedStep {
                    traveller: position.traveller,
                    document: document.name.clone(),
                    side: position.side,
                });
            }
        }
        Ok(())
    }

    /// 保存某个位置上尚未确认的内容，没有需要保存的内容时直接返回
    async fn persist(
        &mut self,
        position: Position,
        document: &DocumentRequirement,
    ) -> Result<(), SessionError> {
        let traveller = &self.progress[position.traveller];
        let file = traveller
            .side(&document.id, position.side)
            .and_then(UploadedSide::pending_file)
            .cloned();
        let passport = if document.gates_passport(position.side)
            && self.unsynced_passports.contains(&position.traveller)
        {
            traveller.passport_record()
        } else {
            None
        };

        if file.is_none() && passport.is_none() {
            return Ok(());
        }

        let result = self
            .gateway
            .save_step(
                position.traveller,
                document,
                position.side,
                file.as_ref(),
                passport.as_ref(),
            )
            .await;

        let aggregate = match result {
            Ok(aggregate) => aggregate,
            Err(e) => {
                warn!(
                    "[申请 {}] {} 保存失败，本地文件已保留: {}",
                    self.applicant().payment_id,
                    position,
                    e
                );
                self.save_failure = Some(e.clone());
                return Err(e.into());
            }
        };

        let key = DocumentKey::new(position.traveller, document.id.clone());
        if let Some(sent) = &file {
            let echoed = aggregate.stored_side(&key, position.side).cloned();
            let Some(file_ref) = echoed else {
                let e = PersistenceError::Rejected {
                    message: format!("服务端未确认 {} {} 面", key, position.side),
                };
                self.save_failure = Some(e.clone());
                return Err(e.into());
            };
            // 在途期间被替换或移除的文件不覆盖
            let still_same = self.progress[position.traveller]
                .side(&document.id, position.side)
                .and_then(UploadedSide::pending_file)
                == Some(sent);
            if still_same {
                self.progress[position.traveller].mark_persisted(
                    &document.id,
                    position.side,
                    file_ref,
                );
            }
        }
        if passport.is_some() {
            self.unsynced_passports.remove(&position.traveller);
        }
        self.save_failure = None;
        Ok(())
    }

    /// 用最终提交的回显替换本地待发文件
    fn apply_echo(&mut self, aggregate: &VisaApplicationAggregate) {
        for traveller in &mut self.progress {
            let pending: Vec<(String, Side)> = traveller
                .pending_sides()
                .map(|(document_id, side, _)| (document_id.to_string(), side))
                .collect();
            for (document_id, side) in pending {
                let key = DocumentKey::new(traveller.traveller_index, document_id.clone());
                if let Some(file_ref) = aggregate.stored_side(&key, side) {
                    traveller.mark_persisted(&document_id, side, file_ref.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcrError;
    use crate::models::application::StoredSides;
    use crate::models::document::CatalogDocument;
    use crate::models::ocr::OcrResponse;
    use crate::models::progress::FileRef;
    use crate::services::memory_store::InMemoryApplicationStore;
    use crate::services::persistence::StepPayload;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio_test::{assert_err, assert_ok};

    struct FixedCatalog(Vec<CatalogDocument>);

    #[async_trait]
    impl CatalogSource for FixedCatalog {
        async fn fetch_documents(
            &self,
            _visa_id: &str,
        ) -> Result<Vec<CatalogDocument>, CatalogError> {
            Ok(self.0.clone())
        }
    }

    struct DownOcr;

    #[async_trait]
    impl PassportExtractor for DownOcr {
        async fn warm_up(&self) -> Result<(), OcrError> {
            Err(OcrError::Transport("connection refused".into()))
        }

        async fn extract(&self, _file: &LocalFile) -> Result<OcrResponse, OcrError> {
            Err(OcrError::Transport("connection refused".into()))
        }
    }

    /// 识别成功但没有任何字段
    struct BlankOcr;

    #[async_trait]
    impl PassportExtractor for BlankOcr {
        async fn warm_up(&self) -> Result<(), OcrError> {
            Ok(())
        }

        async fn extract(&self, file: &LocalFile) -> Result<OcrResponse, OcrError> {
            Ok(OcrResponse {
                success: true,
                filename: file.file_name.clone(),
                data: PassportData::default(),
                timestamp: None,
            })
        }
    }

    /// 前 `failures` 次保存失败，之后转发给内存存储
    struct FlakyStore {
        inner: InMemoryApplicationStore,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl ApplicationStore for FlakyStore {
        async fn fetch_application(
            &self,
            payment_id: &str,
        ) -> Result<Option<VisaApplicationAggregate>, PersistenceError> {
            self.inner.fetch_application(payment_id).await
        }

        async fn save(
        &self,
        payload: &StepPayload,
    ) -> Result<VisaApplicationAggregate, PersistenceError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(PersistenceError::Transport {
                    endpoint: "/api/VisaApplication/apply-visa".into(),
                    message: "connection reset".into(),
                });
            }
            self.inner.save(payload).await
        }
    }

    fn entry(id: &str, name: &str) -> CatalogDocument {
        CatalogDocument {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            format: String::new(),
            is_mandatory: true,
        }
    }

    fn applicant(travellers: usize) -> ApplicantInfo {
        ApplicantInfo {
            visa_id: "visa-jp".into(),
            payment_id: "pay_42".into(),
            travellers,
            email: "a@b.c".into(),
            phone: "98".into(),
            country: "Japan".into(),
            processing_mode: None,
            employee_id: None,
        }
    }

    fn config() -> Config {
        Config {
            ocr_timeout_secs: 1,
            ocr_retry_delay_ms: 1,
            ..Config::default()
        }
    }

    fn jpeg(name: &str) -> LocalFile {
        LocalFile::new(name, "image/jpeg", vec![0xFF, 0xD8, 0xFF])
    }

    fn filled_passport() -> PassportData {
        PassportData {
            passport_number: "K1234567".into(),
            surname: "SHARMA".into(),
            given_names: "ASHA".into(),
            date_of_birth: "1990-01-01".into(),
            nationality: "INDIAN".into(),
            sex: "F".into(),
            ..PassportData::default()
        }
    }

    async fn start(store: Arc<dyn ApplicationStore>, travellers: usize) -> IntakeSession {
        let deps = SessionDeps {
            catalog_source: Arc::new(FixedCatalog(vec![
                entry("passport", "Passport"),
                entry("photo", "Photo"),
            ])),
            store,
            extractor: Arc::new(DownOcr),
        };
        match IntakeSession::start(applicant(travellers), deps, &config()).await {
            Ok(SessionStart::Ready(session)) => *session,
            _ => panic!("session should start"),
        }
    }

    #[tokio::test]
    async fn advance_requires_an_uploaded_side() {
        let mut session = start(Arc::new(InMemoryApplicationStore::new()), 1).await;
        assert!(!session.can_advance());
        let err = session.advance().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Validation(ValidationError::MissingSide { side: Side::Front, .. })
        ));
    }

    #[tokio::test]
    async fn ocr_outage_falls_back_to_manual_passport_entry() {
        let store = Arc::new(InMemoryApplicationStore::new());
        let mut session = start(store.clone(), 1).await;

        assert_ok!(session.select_file(jpeg("front.jpg")).await);
        let ocr = session.ocr_result(0).unwrap();
        assert!(!ocr.succeeded);
        assert!(session.ocr_warning().unwrap().contains("无法连接到 OCR 服务"));
        assert_eq!(session.passport_form(0).unwrap(), PassportData::default());

        let err = session.advance().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Validation(ValidationError::PassportNotSaved { traveller: 0 })
        ));

        let blank = session.save_passport(PassportData::default()).await;
        assert!(matches!(
            blank,
            Err(SessionError::Validation(ValidationError::MissingPassportFields { .. }))
        ));

        assert_ok!(session.save_passport(filled_passport()).await);
        assert!(session.can_advance());
        assert_eq!(
            session.advance().unwrap(),
            CursorState::At(Position::new(0, 0, Side::Back))
        );

        let saved = store.snapshot("pay_42").await.unwrap();
        assert_eq!(saved.passport_for(0).unwrap().data.surname, "SHARMA");
    }

    #[tokio::test]
    async fn reupload_of_passport_front_invalidates_saved_passport() {
        let mut session = start(Arc::new(InMemoryApplicationStore::new()), 1).await;
        session.select_file(jpeg("front.jpg")).await.unwrap();
        session.save_passport(filled_passport()).await.unwrap();
        assert!(session.progress()[0].passport_saved);

        session.select_file(jpeg("front2.jpg")).await.unwrap();
        assert!(!session.progress()[0].passport_saved);
        assert!(!session.can_advance());
    }

    #[tokio::test]
    async fn failed_save_keeps_the_pending_file_for_retry() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryApplicationStore::new(),
            failures: AtomicUsize::new(0),
        });
        let mut session = start(store.clone(), 1).await;

        session.select_file(jpeg("front.jpg")).await.unwrap();
        session.save_passport(filled_passport()).await.unwrap();
        session.advance().unwrap();
        session.select_file(jpeg("back.jpg")).await.unwrap();
        session.advance().unwrap();

        store.failures.store(1, Ordering::SeqCst);
        let err = session.select_file(jpeg("photo.png")).await.unwrap_err();
        assert!(matches!(err, SessionError::Persistence(PersistenceError::Transport { .. })));
        assert!(session.save_failure().is_some());
        assert!(session.progress()[0]
            .side("photo", Side::Front)
            .is_some_and(UploadedSide::is_pending));

        let blocked = session.advance().unwrap_err();
        assert!(matches!(
            blocked,
            SessionError::Validation(ValidationError::UnsavedStep { .. })
        ));
        assert_eq!(session.cursor().position(), Some(Position::new(0, 1, Side::Front)));

        assert_ok!(session.retry_save().await);
        assert!(session.save_failure().is_none());
        assert_eq!(session.advance().unwrap(), CursorState::ReviewAll);
    }

    #[tokio::test]
    async fn submit_is_single_fire() {
        let store = Arc::new(InMemoryApplicationStore::new());
        let mut session = start(store.clone(), 1).await;

        assert!(matches!(
            session.submit().await,
            Err(SessionError::Submission(SubmissionError::NotInReview))
        ));

        session.select_file(jpeg("front.jpg")).await.unwrap();
        session.save_passport(filled_passport()).await.unwrap();
        session.advance().unwrap();
        session.select_file(jpeg("back.jpg")).await.unwrap();
        session.advance().unwrap();
        session.select_file(jpeg("photo.png")).await.unwrap();
        session.advance().unwrap();

        let aggregate = session.submit().await.unwrap();
        assert!(aggregate.is_final_submit);
        assert!(session.is_read_only());
        assert_err!(session.retreat());

        let again = session.submit().await;
        assert!(matches!(
            again,
            Err(SessionError::Submission(SubmissionError::AlreadySubmitted))
        ));
        assert_eq!(store.saves().await.iter().filter(|p| p.is_final_submit).count(), 1);
    }

    #[tokio::test]
    async fn final_aggregate_opens_read_only() {
        let store = Arc::new(InMemoryApplicationStore::new());
        store
            .seed(VisaApplicationAggregate {
                payment_id: Some("pay_42".into()),
                is_final_submit: true,
                ..VisaApplicationAggregate::default()
            })
            .await;

        let mut session = start(store, 1).await;
        assert_eq!(session.hydration(), &HydrationOutcome::AlreadySubmitted);
        assert!(session.is_read_only());
        assert!(session.cursor().is_initial());
        assert!(!session.needs_processing_mode());
        assert!(matches!(
            session.select_file(jpeg("x.jpg")).await,
            Err(SessionError::ReadOnly)
        ));
    }

    #[tokio::test]
    async fn resumed_session_restores_processing_mode() {
        let store = Arc::new(InMemoryApplicationStore::new());
        store
            .seed(VisaApplicationAggregate {
                payment_id: Some("pay_42".into()),
                processing_mode: Some(ProcessingMode::Offline),
                employee_id: Some("E7".into()),
                ..VisaApplicationAggregate::default()
            })
            .await;

        let session = start(store, 1).await;
        assert!(!session.needs_processing_mode());
        assert_eq!(session.applicant().employee_id.as_deref(), Some("E7"));
    }

    #[tokio::test]
    async fn invalid_files_never_reach_the_store() {
        let store = Arc::new(InMemoryApplicationStore::new());
        let mut session = start(store.clone(), 1).await;

        let pdf = LocalFile::new("scan.pdf", "application/pdf", vec![1]);
        let err = session.select_file(pdf).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Validation(ValidationError::InvalidFile { code: "INVALID_FILE_TYPE", .. })
        ));
        assert!(store.saves().await.is_empty());
    }

    #[tokio::test]
    async fn removing_passport_front_resets_ocr_state() {
        let mut session = start(Arc::new(InMemoryApplicationStore::new()), 1).await;
        session.select_file(jpeg("front.jpg")).await.unwrap();
        session.save_passport(filled_passport()).await.unwrap();

        session.remove_file().unwrap();
        assert!(session.ocr_result(0).is_none());
        assert!(!session.progress()[0].passport_saved);
        assert!(session.ocr_warning().is_none());
        assert!(!session.can_advance());
    }

    #[tokio::test]
    async fn offline_mode_needs_employee_id() {
        let mut session = start(Arc::new(InMemoryApplicationStore::new()), 1).await;
        assert!(session.needs_processing_mode());
        assert!(matches!(
            session.choose_processing_mode(ProcessingMode::Offline, None),
            Err(SessionError::Validation(ValidationError::EmployeeIdRequired))
        ));
        session
            .choose_processing_mode(ProcessingMode::Offline, Some("E1"))
            .unwrap();
        assert!(!session.needs_processing_mode());
    }

    #[test]
    fn busy_guard_is_exclusive_and_resets_on_drop() {
        let flag = Arc::new(AtomicBool::new(false));
        let guard = BusyGuard::acquire(&flag).unwrap();
        assert!(matches!(BusyGuard::acquire(&flag), Err(SessionError::Busy)));
        drop(guard);
        assert!(!flag.load(Ordering::SeqCst));
        assert!(BusyGuard::acquire(&flag).is_ok());
    }

    #[tokio::test]
    async fn passport_can_only_be_saved_on_the_passport_front() {
        let mut session = start(Arc::new(InMemoryApplicationStore::new()), 1).await;
        session.select_file(jpeg("front.jpg")).await.unwrap();
        session.save_passport(filled_passport()).await.unwrap();
        session.advance().unwrap();

        let err = session.save_passport(filled_passport()).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(ValidationError::NotPassportStep)));
    }

    #[tokio::test]
    async fn dismissing_the_ocr_warning_keeps_the_failed_result() {
        let mut session = start(Arc::new(InMemoryApplicationStore::new()), 1).await;
        session.select_file(jpeg("front.jpg")).await.unwrap();
        assert!(session.ocr_warning().is_some());

        session.dismiss_ocr_warning();
        assert!(session.ocr_warning().is_none());
        let ocr = session.ocr_result(0).unwrap();
        assert!(!ocr.succeeded);
        assert!(ocr.error_message.as_deref().unwrap().contains("无法连接到 OCR 服务"));
        assert!(!session.can_advance());
    }

    #[tokio::test]
    async fn traveller_completion_counts_finished_documents() {
        let mut session = start(Arc::new(InMemoryApplicationStore::new()), 1).await;
        assert_eq!(session.traveller_completion(0), 0.0);

        session.select_file(jpeg("front.jpg")).await.unwrap();
        session.save_passport(filled_passport()).await.unwrap();
        assert_eq!(session.traveller_completion(0), 0.0);
        session.advance().unwrap();

        session.select_file(jpeg("back.jpg")).await.unwrap();
        assert_eq!(session.traveller_completion(0), 0.5);
        session.advance().unwrap();

        session.select_file(jpeg("photo.png")).await.unwrap();
        assert_eq!(session.traveller_completion(0), 1.0);
        assert_eq!(session.traveller_completion(3), 0.0);
    }

    #[tokio::test]
    async fn restored_passport_front_without_record_must_be_confirmed() {
        let store = Arc::new(InMemoryApplicationStore::new());
        let remote = |name: &str| {
            Some(FileRef {
                url: format!("memory://pay_42/{}", name),
                file_name: name.to_string(),
            })
        };
        let mut aggregate = VisaApplicationAggregate {
            payment_id: Some("pay_42".into()),
            travellers: 1,
            ..VisaApplicationAggregate::default()
        };
        aggregate.documents.insert(
            "0_passport".into(),
            StoredSides {
                front: remote("front.jpg"),
                back: remote("back.jpg"),
            },
        );
        aggregate.documents.insert(
            "0_photo".into(),
            StoredSides {
                front: remote("photo.png"),
                back: None,
            },
        );
        store.seed(aggregate).await;

        let mut session = start(store.clone(), 1).await;
        assert_eq!(session.cursor().position(), Some(Position::INITIAL));
        assert!(!session.can_advance());
        assert!(matches!(
            session.advance(),
            Err(SessionError::Validation(ValidationError::PassportNotSaved { traveller: 0 }))
        ));
        assert_eq!(session.passport_form(0).unwrap(), PassportData::default());

        session.save_passport(filled_passport()).await.unwrap();
        for _ in 0..3 {
            session.advance().unwrap();
        }
        assert!(session.cursor().is_review_all());

        let submitted = session.submit().await.unwrap();
        assert_eq!(submitted.passport_for(0).unwrap().data.surname, "SHARMA");
    }

    #[tokio::test]
    async fn blank_ocr_result_still_warns() {
        let deps = SessionDeps {
            catalog_source: Arc::new(FixedCatalog(vec![entry("passport", "Passport")])),
            store: Arc::new(InMemoryApplicationStore::new()),
            extractor: Arc::new(BlankOcr),
        };
        let Ok(SessionStart::Ready(mut session)) =
            IntakeSession::start(applicant(1), deps, &config()).await
        else {
            panic!("session should start");
        };

        session.select_file(jpeg("front.jpg")).await.unwrap();
        assert!(session.ocr_result(0).unwrap().succeeded);
        assert_eq!(session.ocr_warning(), Some("OCR 未识别出护照信息，请手动填写"));
        assert!(matches!(
            session.advance(),
            Err(SessionError::Validation(ValidationError::PassportNotSaved { .. }))
        ));
    }
}
