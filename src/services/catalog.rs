//! 文档目录服务 - 业务能力层
//!
//! 每个会话开始时加载一次，之后顺序固定不变，
//! 它定义了导航游标的遍历顺序。

use crate::error::CatalogError;
use crate::models::document::{CatalogDocument, DocumentRequirement};
use async_trait::async_trait;
use tracing::{debug, info};

/// 文档目录的数据来源
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// 按签证 ID 获取有序的文档条目
    async fn fetch_documents(&self, visa_id: &str) -> Result<Vec<CatalogDocument>, CatalogError>;
}

/// 有序、有限的文档要求列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentCatalog {
    visa_id: String,
    documents: Vec<DocumentRequirement>,
}

impl DocumentCatalog {
    pub fn new(visa_id: impl Into<String>, documents: Vec<DocumentRequirement>) -> Self {
        Self {
            visa_id: visa_id.into(),
            documents,
        }
    }

    /// 由接口条目构建，派生能力在这里一次性计算
    pub fn from_entries(visa_id: impl Into<String>, entries: Vec<CatalogDocument>) -> Self {
        Self::new(
            visa_id,
            entries
                .into_iter()
                .map(DocumentRequirement::from_catalog)
                .collect(),
        )
    }

    /// 从数据源加载
    ///
    /// 空目录返回 `CatalogError::Empty`，表示没有需要收集的文档。
    pub async fn load(source: &dyn CatalogSource, visa_id: &str) -> Result<Self, CatalogError> {
        debug!("加载签证 {} 的文档目录", visa_id);

        let entries = source.fetch_documents(visa_id).await?;
        let catalog = Self::from_entries(visa_id, entries);

        if catalog.is_empty() {
            return Err(CatalogError::Empty {
                visa_id: visa_id.to_string(),
            });
        }

        info!(
            "✓ 文档目录加载完成: {} 项 (双面 {} 项)",
            catalog.len(),
            catalog.iter().filter(|d| d.requires_both_sides).count()
        );

        Ok(catalog)
    }

    pub fn visa_id(&self) -> &str {
        &self.visa_id
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DocumentRequirement> {
        self.documents.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DocumentRequirement> {
        self.documents.iter()
    }

    pub fn by_id(&self, document_id: &str) -> Option<&DocumentRequirement> {
        self.documents.iter().find(|d| d.id == document_id)
    }

    /// 每份文档是否需要双面，按目录顺序
    pub fn layout(&self) -> Vec<bool> {
        self.documents.iter().map(|d| d.requires_both_sides).collect()
    }
}

impl<'a> IntoIterator for &'a DocumentCatalog {
    type Item = &'a DocumentRequirement;
    type IntoIter = std::slice::Iter<'a, DocumentRequirement>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
