//! PostgreSQL-backed store

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    CabinetStore, ChatStore, LedgerStore, PaymentStore, ReviewStore, Settlement, StatusWrite,
    StoreError,
};
use crate::models::{
    Cabinet, Chat, ChatMessage, NewChat, NewChatMessage, NewReview, NewTransaction, Payment,
    PaymentStatus, PromptSettings, Review, ReviewStatus, SenderRole, Transaction,
    TransactionType,
};

/// Store backed by a Postgres connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Resolve why a conditional status update matched nothing
    async fn status_write_miss(&self, id: Uuid) -> Result<StatusWrite, StoreError> {
        let current: Option<ReviewStatus> =
            sqlx::query_scalar("SELECT status FROM reviews WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match current {
            Some(status) => StatusWrite::Conflict(status),
            None => StatusWrite::NotFound,
        })
    }
}

/// Move the balance projection and append the log row inside `tx`.
///
/// Credits upsert the balance row. Debits only match when the result stays
/// non-negative, so two concurrent debits can never overdraw.
async fn apply_in_tx(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    entry: &NewTransaction,
) -> Result<Transaction, StoreError> {
    let balance_after: Option<i64> = if entry.amount >= 0 {
        sqlx::query_scalar(
            r#"
            INSERT INTO balances (user_id, balance, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id)
            DO UPDATE SET balance = balances.balance + EXCLUDED.balance, updated_at = NOW()
            RETURNING balance
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.amount)
        .fetch_optional(&mut **tx)
        .await?
    } else {
        sqlx::query_scalar(
            r#"
            UPDATE balances
            SET balance = balance + $2, updated_at = NOW()
            WHERE user_id = $1 AND balance + $2 >= 0
            RETURNING balance
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.amount)
        .fetch_optional(&mut **tx)
        .await?
    };

    let balance_after = match balance_after {
        Some(balance) => balance,
        None => {
            let balance: Option<i64> =
                sqlx::query_scalar("SELECT balance FROM balances WHERE user_id = $1")
                    .bind(entry.user_id)
                    .fetch_optional(&mut **tx)
                    .await?;
            return Err(StoreError::InsufficientBalance {
                balance: balance.unwrap_or(0),
                requested: -entry.amount,
            });
        }
    };

    let transaction = sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (id, user_id, amount, transaction_type, description, balance_after)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entry.user_id)
    .bind(entry.amount)
    .bind(entry.transaction_type)
    .bind(&entry.description)
    .bind(balance_after)
    .fetch_one(&mut **tx)
    .await?;

    Ok(transaction)
}

#[async_trait]
impl CabinetStore for PgStore {
    async fn get_cabinet(&self, id: Uuid) -> Result<Option<Cabinet>, StoreError> {
        let cabinet = sqlx::query_as::<_, Cabinet>("SELECT * FROM cabinets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(cabinet)
    }

    async fn invalidate_api_key(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE cabinets SET api_key_valid = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn prompt_settings(&self) -> Result<PromptSettings, StoreError> {
        let settings = sqlx::query_as::<_, PromptSettings>(
            "SELECT default_prompt, model FROM prompt_settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(settings.unwrap_or_default())
    }
}

#[async_trait]
impl ReviewStore for PgStore {
    async fn existing_review_ids(
        &self,
        cabinet_id: Uuid,
        external_ids: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        if external_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT external_id FROM reviews WHERE cabinet_id = $1 AND external_id = ANY($2)",
        )
        .bind(cabinet_id)
        .bind(external_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn insert_reviews(&self, reviews: Vec<NewReview>) -> Result<u64, StoreError> {
        if reviews.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO reviews (id, cabinet_id, external_id, rating, author_name, text, pros, cons, \
             product_name, product_article, photo_urls, has_video, status, sent_answer, review_created_at) ",
        );
        builder.push_values(reviews, |mut b, r| {
            b.push_bind(Uuid::new_v4())
                .push_bind(r.cabinet_id)
                .push_bind(r.external_id)
                .push_bind(r.rating)
                .push_bind(r.author_name)
                .push_bind(r.text)
                .push_bind(r.pros)
                .push_bind(r.cons)
                .push_bind(r.product_name)
                .push_bind(r.product_article)
                .push_bind(r.photo_urls)
                .push_bind(r.has_video)
                .push_bind(r.status)
                .push_bind(r.sent_answer)
                .push_bind(r.review_created_at);
        });
        builder.push(" ON CONFLICT (cabinet_id, external_id) DO NOTHING");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn get_review(&self, id: Uuid) -> Result<Option<Review>, StoreError> {
        let review = sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(review)
    }

    async fn list_reviews(
        &self,
        cabinet_id: Uuid,
        status: Option<ReviewStatus>,
    ) -> Result<Vec<Review>, StoreError> {
        let reviews = sqlx::query_as::<_, Review>(
            r#"
            SELECT * FROM reviews
            WHERE cabinet_id = $1 AND ($2::review_status IS NULL OR status = $2)
            ORDER BY review_created_at DESC
            "#,
        )
        .bind(cabinet_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(reviews)
    }

    async fn new_reviews_for_auto_reply(
        &self,
        cabinet_id: Uuid,
        min_rating: i16,
        limit: i64,
    ) -> Result<Vec<Review>, StoreError> {
        let reviews = sqlx::query_as::<_, Review>(
            r#"
            SELECT * FROM reviews
            WHERE cabinet_id = $1 AND status = 'new' AND rating >= $2
            ORDER BY review_created_at ASC
            LIMIT $3
            "#,
        )
        .bind(cabinet_id)
        .bind(min_rating)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(reviews)
    }

    async fn save_draft(
        &self,
        id: Uuid,
        expected: ReviewStatus,
        next: ReviewStatus,
        draft: &str,
    ) -> Result<StatusWrite, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE reviews SET ai_draft = $3, status = $4, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(draft)
        .bind(next)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(StatusWrite::Applied)
        } else {
            self.status_write_miss(id).await
        }
    }

    async fn record_answer(
        &self,
        id: Uuid,
        expected: ReviewStatus,
        next: ReviewStatus,
        answer: &str,
    ) -> Result<StatusWrite, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE reviews SET sent_answer = $3, status = $4, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(answer)
        .bind(next)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(StatusWrite::Applied)
        } else {
            self.status_write_miss(id).await
        }
    }

    async fn force_status(
        &self,
        id: Uuid,
        status: ReviewStatus,
    ) -> Result<Option<ReviewStatus>, StoreError> {
        let previous: Option<ReviewStatus> = sqlx::query_scalar(
            r#"
            UPDATE reviews r SET status = $2, updated_at = NOW()
            FROM (SELECT id, status FROM reviews WHERE id = $1 FOR UPDATE) old
            WHERE r.id = old.id
            RETURNING old.status
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;
        Ok(previous)
    }

    async fn archive_candidates(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM reviews
            WHERE status IN ('sent', 'auto') AND updated_at < $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn archive_batch(&self, ids: &[Uuid], cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE reviews SET status = 'archived', updated_at = NOW()
            WHERE id = ANY($1) AND status IN ('sent', 'auto') AND updated_at < $2
            "#,
        )
        .bind(ids)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn existing_chat_ids(
        &self,
        cabinet_id: Uuid,
        external_ids: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        if external_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT external_id FROM chats WHERE cabinet_id = $1 AND external_id = ANY($2)",
        )
        .bind(cabinet_id)
        .bind(external_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn insert_chats(&self, chats: Vec<NewChat>) -> Result<u64, StoreError> {
        if chats.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO chats (id, cabinet_id, external_id, client_name, product_name, \
             last_message_text, last_message_at, is_read, reply_sign) ",
        );
        builder.push_values(chats, |mut b, c| {
            b.push_bind(Uuid::new_v4())
                .push_bind(c.cabinet_id)
                .push_bind(c.external_id)
                .push_bind(c.client_name)
                .push_bind(c.product_name)
                .push_bind(c.last_message_text)
                .push_bind(c.last_message_at)
                .push_bind(c.is_read)
                .push_bind(c.reply_sign);
        });
        builder.push(" ON CONFLICT (cabinet_id, external_id) DO NOTHING");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn refresh_chat(&self, chat: &NewChat) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE chats SET
                client_name = COALESCE($3, client_name),
                product_name = COALESCE($4, product_name),
                last_message_text = COALESCE($5, last_message_text),
                last_message_at = COALESCE($6, last_message_at),
                is_read = $7,
                reply_sign = COALESCE($8, reply_sign),
                updated_at = NOW()
            WHERE cabinet_id = $1 AND external_id = $2
            "#,
        )
        .bind(chat.cabinet_id)
        .bind(&chat.external_id)
        .bind(&chat.client_name)
        .bind(&chat.product_name)
        .bind(&chat.last_message_text)
        .bind(chat.last_message_at)
        .bind(chat.is_read)
        .bind(&chat.reply_sign)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_chat(&self, id: Uuid) -> Result<Option<Chat>, StoreError> {
        let chat = sqlx::query_as::<_, Chat>("SELECT * FROM chats WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(chat)
    }

    async fn existing_message_keys(
        &self,
        cabinet_id: Uuid,
        event_ids: &[String],
    ) -> Result<HashSet<(String, String)>, StoreError> {
        if event_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT c.external_id, m.event_id
            FROM chat_messages m
            JOIN chats c ON c.id = m.chat_id
            WHERE c.cabinet_id = $1 AND m.event_id = ANY($2)
            "#,
        )
        .bind(cabinet_id)
        .bind(event_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn insert_messages(
        &self,
        cabinet_id: Uuid,
        messages: Vec<NewChatMessage>,
    ) -> Result<u64, StoreError> {
        if messages.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for message in messages {
            let result = sqlx::query(
                r#"
                INSERT INTO chat_messages (id, chat_id, sender, text, attachments, event_id, sent_at)
                SELECT $1, c.id, $4, $5, $6, $7, $8
                FROM chats c
                WHERE c.cabinet_id = $2 AND c.external_id = $3
                ON CONFLICT (chat_id, event_id) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(cabinet_id)
            .bind(&message.chat_external_id)
            .bind(message.sender)
            .bind(&message.text)
            .bind(&message.attachments)
            .bind(&message.event_id)
            .bind(message.sent_at)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn record_outbound(&self, chat_id: Uuid, text: &str) -> Result<ChatMessage, StoreError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let message = sqlx::query_as::<_, ChatMessage>(
            r#"
            INSERT INTO chat_messages (id, chat_id, sender, text, attachments, event_id, sent_at)
            VALUES ($1, $2, $3, $4, '{}', NULL, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(chat_id)
        .bind(SenderRole::Seller)
        .bind(text)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE chats SET last_message_text = $2, last_message_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(chat_id)
        .bind(text)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(message)
    }
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn create_pending(
        &self,
        user_id: Uuid,
        amount: i64,
        tokens: i64,
    ) -> Result<Payment, StoreError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (id, user_id, amount, tokens, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(amount)
        .bind(tokens)
        .bind(PaymentStatus::Pending)
        .fetch_one(&self.pool)
        .await?;
        Ok(payment)
    }

    async fn find_by_invoice(&self, invoice_id: i64) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE invoice_id = $1")
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(payment)
    }

    async fn settle(&self, invoice_id: i64, description: &str) -> Result<Settlement, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Only one caller can win the pending -> completed flip
        let flipped = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments SET status = 'completed', completed_at = NOW()
            WHERE invoice_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await?;

        let payment = match flipped {
            Some(payment) => payment,
            None => {
                tx.rollback().await?;
                return Ok(match self.find_by_invoice(invoice_id).await? {
                    Some(payment) => Settlement::AlreadyCompleted(payment),
                    None => Settlement::NotFound,
                });
            }
        };

        let transaction = apply_in_tx(
            &mut tx,
            &NewTransaction {
                user_id: payment.user_id,
                amount: payment.tokens,
                transaction_type: TransactionType::Purchase,
                description: description.to_string(),
            },
        )
        .await?;

        tx.commit().await?;
        Ok(Settlement::Settled {
            payment,
            transaction,
        })
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn apply_entry(&self, entry: NewTransaction) -> Result<Transaction, StoreError> {
        let mut tx = self.pool.begin().await?;
        let transaction = apply_in_tx(&mut tx, &entry).await?;
        tx.commit().await?;
        Ok(transaction)
    }

    async fn balance(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM balances WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(balance.unwrap_or(0))
    }

    async fn transactions_sum(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM transactions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(sum)
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        transaction_type: Option<TransactionType>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE user_id = $1 AND ($2::transaction_type IS NULL OR transaction_type = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(transaction_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(transactions)
    }
}
