//! 申请恢复 - 流程层
//!
//! 把服务端已保存的聚合回放到本地进度，并计算游标的恢复位置。

use crate::models::application::{DocumentKey, ProcessingMode, VisaApplicationAggregate};
use crate::models::progress::TravellerProgress;
use crate::services::catalog::DocumentCatalog;
use crate::workflow::cursor::NavigationCursor;
use tracing::{debug, info, warn};

/// 恢复结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydrationOutcome {
    /// 没有历史记录，从头开始
    Fresh,
    /// 已恢复进度
    Resumed {
        processing_mode: Option<ProcessingMode>,
        employee_id: Option<String>,
    },
    /// 申请已最终提交，会话只读，本地状态未做任何修改
    AlreadySubmitted,
}

/// 申请恢复器
pub struct ApplicationHydrator;

impl ApplicationHydrator {
    /// 回放聚合
    ///
    /// # 参数
    /// - `aggregate`: 服务端记录，`None` 表示没有历史进度
    /// - `catalog`: 本次会话固定的文档目录
    /// - `progress`: 每位旅客一条的本地进度
    /// - `cursor`: 导航游标
    ///
    /// 目录在会话期间视为固定：聚合里出现的未知文档或越界旅客只记警告并忽略。
    pub fn hydrate(
        aggregate: Option<&VisaApplicationAggregate>,
        catalog: &DocumentCatalog,
        progress: &mut [TravellerProgress],
        cursor: &mut NavigationCursor,
    ) -> HydrationOutcome {
        let Some(aggregate) = aggregate else {
            debug!("没有历史申请，从头开始");
            return HydrationOutcome::Fresh;
        };

        if aggregate.is_final_submit {
            info!("申请已最终提交，跳过恢复");
            return HydrationOutcome::AlreadySubmitted;
        }

        let mut restored_sides = 0;
        for (raw_key, stored) in &aggregate.documents {
            let Some(key) = DocumentKey::parse(raw_key) else {
                warn!("忽略无法识别的文档键: {}", raw_key);
                continue;
            };
            let Some(document) = catalog.by_id(&key.document_id) else {
                warn!("忽略目录中不存在的文档: {}", raw_key);
                continue;
            };
            let Some(traveller) = progress.get_mut(key.traveller_index) else {
                warn!("忽略越界的旅客索引: {}", raw_key);
                continue;
            };

            for &side in document.sides() {
                if let Some(file_ref) = stored.get(side) {
                    traveller.mark_persisted(&document.id, side, file_ref.clone());
                    restored_sides += 1;
                }
            }
        }

        let mut restored_passports = 0;
        for record in &aggregate.passport_data {
            match progress.get_mut(record.traveller_index) {
                Some(traveller) => {
                    traveller.save_passport(record.data.clone());
                    restored_passports += 1;
                }
                None => warn!("忽略越界的护照记录: 旅客 {}", record.traveller_index),
            }
        }

        // 已上传护照正面却没有护照记录：必须重新确认护照信息
        let mut needs_review = 0;
        for traveller in progress.iter_mut() {
            for document in catalog.iter() {
                if traveller.require_passport_review(document) {
                    warn!(
                        "[旅客 {}] {} 正面已上传但没有护照记录，需要重新保存",
                        traveller.traveller_index, document.name
                    );
                    needs_review += 1;
                }
            }
        }

        let resume_at = cursor.positions().find(|position| {
            let Some(document) = catalog.get(position.document) else {
                return false;
            };
            let Some(traveller) = progress.get(position.traveller) else {
                return true;
            };
            !traveller.has_side(&document.id, position.side)
                || (document.gates_passport(position.side) && !traveller.passport_gate_open())
        });

        match resume_at {
            Some(position) => {
                cursor.jump_to(position);
                info!(
                    "✓ 已恢复 {} 个文件面、{} 条护照记录（{} 条待确认），从 {} 继续",
                    restored_sides, restored_passports, needs_review, position
                );
            }
            None => {
                cursor.finish();
                info!(
                    "✓ 已恢复 {} 个文件面、{} 条护照记录，全部文档已上传",
                    restored_sides, restored_passports
                );
            }
        }

        HydrationOutcome::Resumed {
            processing_mode: aggregate.processing_mode,
            employee_id: aggregate.employee_id.clone(),
        }
    }
}
