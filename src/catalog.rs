use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::StoreError;

// ============================================================================
// Article / Category Catalog Collaborator
// ============================================================================
//
// Read-only lookup consumed when validating order lines (price snapshot,
// owning seller) and when authorizing delivery creation (seller-of-line).
// The catalog itself is maintained elsewhere; StaticCatalog is the
// dev/test stand-in.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ArticleSummary {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub price: Decimal,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn article(&self, id: Uuid) -> Result<Option<ArticleSummary>, StoreError>;

    /// Whether `variation_id` is a variant of `article_id`.
    async fn variation_belongs_to(
        &self,
        article_id: Uuid,
        variation_id: Uuid,
    ) -> Result<bool, StoreError>;
}

#[derive(Default)]
pub struct StaticCatalog {
    inner: RwLock<CatalogTables>,
}

#[derive(Default)]
struct CatalogTables {
    articles: HashMap<Uuid, ArticleSummary>,
    variation_article: HashMap<Uuid, Uuid>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_article(&self, article: ArticleSummary) {
        self.inner
            .write()
            .await
            .articles
            .insert(article.id, article);
    }

    pub async fn add_variation(&self, article_id: Uuid, variation_id: Uuid) {
        self.inner
            .write()
            .await
            .variation_article
            .insert(variation_id, article_id);
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn article(&self, id: Uuid) -> Result<Option<ArticleSummary>, StoreError> {
        Ok(self.inner.read().await.articles.get(&id).cloned())
    }

    async fn variation_belongs_to(
        &self,
        article_id: Uuid,
        variation_id: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(self.inner.read().await.variation_article.get(&variation_id) == Some(&article_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_article_lookup_and_variation_ownership() {
        let catalog = StaticCatalog::new();
        let article_id = Uuid::new_v4();
        let variation_id = Uuid::new_v4();

        catalog
            .add_article(ArticleSummary {
                id: article_id,
                seller_id: Uuid::new_v4(),
                price: Decimal::new(4999, 2),
            })
            .await;
        catalog.add_variation(article_id, variation_id).await;

        assert!(catalog.article(article_id).await.unwrap().is_some());
        assert!(catalog.article(Uuid::new_v4()).await.unwrap().is_none());
        assert!(catalog
            .variation_belongs_to(article_id, variation_id)
            .await
            .unwrap());
        assert!(!catalog
            .variation_belongs_to(Uuid::new_v4(), variation_id)
            .await
            .unwrap());
    }
}
