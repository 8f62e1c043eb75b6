//! Reconciler: mirrors marketplace feedbacks and chats into the store.
//!
//! A run walks the remote pages from the start, asks the store which external
//! ids it already has, and inserts only the rest. Re-running after a failure
//! is therefore safe, and two overlapping runs cannot create duplicates.
//! Pages are paced with a fixed delay between fetches.

mod mapping;

pub use mapping::{chat_from_info, message_from_event, review_from_feedback};

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use uuid::Uuid;

use crate::config::MarketplaceConfig;
use crate::marketplace::MarketplaceApi;
use crate::models::{Cabinet, NewChat, NewChatMessage, NewReview};
use crate::store::{Store, StoreError};
use crate::upstream::UpstreamError;

/// Outcome of a feedback sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub fetched: u64,
    pub inserted: u64,
}

/// Outcome of a chat sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChatSyncReport {
    pub fetched: u64,
    pub inserted: u64,
    pub messages_inserted: u64,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Cabinet {0} not found")]
    CabinetNotFound(Uuid),

    #[error("Cabinet {0} has no valid marketplace API key")]
    MissingCredential(Uuid),

    /// Run aborted; everything counted here is already durable
    #[error("Sync aborted after {fetched} fetched / {inserted} inserted: {source}")]
    Upstream {
        source: UpstreamError,
        fetched: u64,
        inserted: u64,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Feedback listing to mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackScope {
    /// Already answered feedback (`isAnswered=true`), mirrored as `answered`
    Archive,
    /// Unanswered feedback, mirrored as `new`
    Unanswered,
}

impl FeedbackScope {
    fn is_answered(self) -> bool {
        matches!(self, FeedbackScope::Archive)
    }
}

pub struct Reconciler {
    store: Arc<dyn Store>,
    marketplace: Arc<dyn MarketplaceApi>,
    config: MarketplaceConfig,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        marketplace: Arc<dyn MarketplaceApi>,
        config: MarketplaceConfig,
    ) -> Self {
        Self {
            store,
            marketplace,
            config,
        }
    }

    /// Mirror answered feedback
    pub async fn run_archive_sync(&self, cabinet_id: Uuid) -> Result<SyncReport, SyncError> {
        self.sync_feedbacks(cabinet_id, FeedbackScope::Archive).await
    }

    /// Mirror unanswered feedback
    pub async fn run_review_sync(&self, cabinet_id: Uuid) -> Result<SyncReport, SyncError> {
        self.sync_feedbacks(cabinet_id, FeedbackScope::Unanswered).await
    }

    async fn resolve(&self, cabinet_id: Uuid) -> Result<(Cabinet, String), SyncError> {
        let cabinet = self
            .store
            .get_cabinet(cabinet_id)
            .await?
            .ok_or(SyncError::CabinetNotFound(cabinet_id))?;
        let key = cabinet
            .usable_api_key()
            .ok_or(SyncError::MissingCredential(cabinet_id))?
            .to_string();
        Ok((cabinet, key))
    }

    /// Record a rejected key and turn the failure into a partial report
    async fn abort(
        &self,
        cabinet_id: Uuid,
        source: UpstreamError,
        fetched: u64,
        inserted: u64,
    ) -> SyncError {
        if source.is_unauthorized() {
            tracing::warn!(cabinet_id = %cabinet_id, "Marketplace rejected API key, marking invalid");
            if let Err(e) = self.store.invalidate_api_key(cabinet_id).await {
                tracing::error!(cabinet_id = %cabinet_id, error = %e, "Failed to mark API key invalid");
            }
        }

        tracing::warn!(
            cabinet_id = %cabinet_id,
            fetched,
            inserted,
            error = %source,
            "Sync aborted"
        );

        SyncError::Upstream {
            source,
            fetched,
            inserted,
        }
    }

    pub async fn sync_feedbacks(
        &self,
        cabinet_id: Uuid,
        scope: FeedbackScope,
    ) -> Result<SyncReport, SyncError> {
        let (_, key) = self.resolve(cabinet_id).await?;
        let take = self.config.page_size;
        let mut skip = 0u32;
        let mut report = SyncReport::default();

        tracing::info!(cabinet_id = %cabinet_id, scope = ?scope, "Feedback sync started");

        loop {
            let page = match self
                .marketplace
                .fetch_reviews_page(&key, scope.is_answered(), skip, take)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    return Err(self
                        .abort(cabinet_id, e, report.fetched, report.inserted)
                        .await)
                }
            };

            if page.is_empty() {
                break;
            }
            report.fetched += page.len() as u64;

            let rows: Vec<NewReview> = page
                .iter()
                .filter_map(|f| review_from_feedback(cabinet_id, f, scope.is_answered()))
                .collect();
            let ids: Vec<String> = rows.iter().map(|r| r.external_id.clone()).collect();
            let mut known = self.store.existing_review_ids(cabinet_id, &ids).await?;

            // `insert` doubles as an in-page duplicate filter
            let fresh: Vec<NewReview> = rows
                .into_iter()
                .filter(|r| known.insert(r.external_id.clone()))
                .collect();
            report.inserted += self.store.insert_reviews(fresh).await?;

            tracing::debug!(cabinet_id = %cabinet_id, skip, fetched = report.fetched, inserted = report.inserted, "Feedback page mirrored");

            if (page.len() as u32) < take {
                break;
            }
            skip += take;
            sleep(self.config.page_delay).await;
        }

        tracing::info!(
            cabinet_id = %cabinet_id,
            fetched = report.fetched,
            inserted = report.inserted,
            "Feedback sync finished"
        );
        Ok(report)
    }

    /// Mirror chats, then their messages from the events feed
    pub async fn run_chat_sync(&self, cabinet_id: Uuid) -> Result<ChatSyncReport, SyncError> {
        let (_, key) = self.resolve(cabinet_id).await?;
        let take = self.config.page_size;
        let mut skip = 0u32;
        let mut report = ChatSyncReport::default();

        tracing::info!(cabinet_id = %cabinet_id, "Chat sync started");

        loop {
            let page = match self.marketplace.fetch_chats_page(&key, skip, take).await {
                Ok(page) => page,
                Err(e) => {
                    return Err(self
                        .abort(cabinet_id, e, report.fetched, report.inserted)
                        .await)
                }
            };

            if page.is_empty() {
                break;
            }
            report.fetched += page.len() as u64;

            let rows: Vec<NewChat> = page
                .iter()
                .filter_map(|c| chat_from_info(cabinet_id, c))
                .collect();
            let ids: Vec<String> = rows.iter().map(|c| c.external_id.clone()).collect();
            let known = self.store.existing_chat_ids(cabinet_id, &ids).await?;

            let mut seen = HashSet::new();
            let mut fresh = Vec::new();
            for row in rows {
                if !seen.insert(row.external_id.clone()) {
                    continue;
                }
                if known.contains(&row.external_id) {
                    self.store.refresh_chat(&row).await?;
                } else {
                    fresh.push(row);
                }
            }
            report.inserted += self.store.insert_chats(fresh).await?;

            if (page.len() as u32) < take {
                break;
            }
            skip += take;
            sleep(self.config.page_delay).await;
        }

        self.sync_chat_events(cabinet_id, &key, &mut report).await?;

        tracing::info!(
            cabinet_id = %cabinet_id,
            fetched = report.fetched,
            inserted = report.inserted,
            messages_inserted = report.messages_inserted,
            "Chat sync finished"
        );
        Ok(report)
    }

    /// Walk the events feed until it runs dry or the cursor stops moving
    async fn sync_chat_events(
        &self,
        cabinet_id: Uuid,
        key: &str,
        report: &mut ChatSyncReport,
    ) -> Result<(), SyncError> {
        let mut next = None;

        loop {
            let page = match self.marketplace.fetch_chat_events(key, next).await {
                Ok(page) => page,
                Err(e) => {
                    return Err(self
                        .abort(cabinet_id, e, report.fetched, report.inserted)
                        .await)
                }
            };
            if page.events.is_empty() {
                break;
            }

            let messages: Vec<NewChatMessage> =
                page.events.iter().filter_map(message_from_event).collect();
            let event_ids: Vec<String> = messages
                .iter()
                .filter_map(|m| m.event_id.clone())
                .collect();
            report.messages_inserted += self.store_messages(cabinet_id, messages, &event_ids).await?;

            match page.next {
                Some(cursor) if Some(cursor) != next => next = Some(cursor),
                _ => break,
            }
            sleep(self.config.page_delay).await;
        }

        Ok(())
    }

    async fn store_messages(
        &self,
        cabinet_id: Uuid,
        messages: Vec<NewChatMessage>,
        event_ids: &[String],
    ) -> Result<u64, StoreError> {
        let mut known = self
            .store
            .existing_message_keys(cabinet_id, event_ids)
            .await?;

        let fresh: Vec<_> = messages
            .into_iter()
            .filter(|m| match &m.event_id {
                Some(event_id) => known.insert((m.chat_external_id.clone(), event_id.clone())),
                None => true,
            })
            .collect();

        self.store.insert_messages(cabinet_id, fresh).await
    }
}
