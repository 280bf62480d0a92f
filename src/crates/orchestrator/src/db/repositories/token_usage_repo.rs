//! Token usage repository: records plus a per-day/per-model trend report

use crate::db::connection::DatabasePool;
use crate::db::models::TokenUsageRow;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub struct TokenUsageRepository;

/// One day's worth of aggregated usage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageTrendDay {
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub estimated_cost_usd: f64,
}

/// Per-model cost breakdown across the whole requested range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageTrendModel {
    pub model: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub estimated_cost_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UsageTrend {
    pub by_day: Vec<UsageTrendDay>,
    pub by_model: Vec<UsageTrendModel>,
}

impl TokenUsageRepository {
    pub async fn save(pool: &DatabasePool, record: &TokenUsageRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO token_usage
                (id, workflow_id, node, model, prompt_tokens, completion_tokens, estimated_cost_usd, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.workflow_id)
        .bind(&record.node)
        .bind(&record.model)
        .bind(record.prompt_tokens)
        .bind(record.completion_tokens)
        .bind(record.estimated_cost_usd)
        .bind(&record.timestamp)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn for_workflow(pool: &DatabasePool, workflow_id: &str) -> Result<Vec<TokenUsageRow>, sqlx::Error> {
        sqlx::query_as::<_, TokenUsageRow>(
            "SELECT * FROM token_usage WHERE workflow_id = ? ORDER BY timestamp ASC",
        )
        .bind(workflow_id)
        .fetch_all(pool)
        .await
    }

    /// Aggregate usage between `start_date` and `end_date` (inclusive,
    /// `YYYY-MM-DD`) into per-day totals and per-model cost breakdowns.
    pub async fn usage_trend(
        pool: &DatabasePool,
        start_date: &str,
        end_date: &str,
    ) -> Result<UsageTrend, sqlx::Error> {
        let rows: Vec<TokenUsageRow> = sqlx::query_as::<_, TokenUsageRow>(
            "SELECT * FROM token_usage WHERE date(timestamp) BETWEEN date(?) AND date(?) ORDER BY timestamp ASC",
        )
        .bind(start_date)
        .bind(end_date)
        .fetch_all(pool)
        .await?;

        let mut by_day: HashMap<String, UsageTrendDay> = HashMap::new();
        let mut by_model: HashMap<String, UsageTrendModel> = HashMap::new();

        for row in &rows {
            let date = row.timestamp.get(0..10).unwrap_or(&row.timestamp).to_string();
            let day = by_day.entry(date.clone()).or_insert_with(|| UsageTrendDay {
                date,
                prompt_tokens: 0,
                completion_tokens: 0,
                estimated_cost_usd: 0.0,
            });
            day.prompt_tokens += row.prompt_tokens;
            day.completion_tokens += row.completion_tokens;
            day.estimated_cost_usd += row.estimated_cost_usd;

            let model = by_model.entry(row.model.clone()).or_insert_with(|| UsageTrendModel {
                model: row.model.clone(),
                prompt_tokens: 0,
                completion_tokens: 0,
                estimated_cost_usd: 0.0,
            });
            model.prompt_tokens += row.prompt_tokens;
            model.completion_tokens += row.completion_tokens;
            model.estimated_cost_usd += row.estimated_cost_usd;
        }

        let mut by_day: Vec<UsageTrendDay> = by_day.into_values().collect();
        by_day.sort_by(|a, b| a.date.cmp(&b.date));
        let mut by_model: Vec<UsageTrendModel> = by_model.into_values().collect();
        by_model.sort_by(|a, b| a.model.cmp(&b.model));

        Ok(UsageTrend { by_day, by_model })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> sqlx::sqlite::SqlitePool {
        let pool = sqlx::sqlite::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE token_usage (
                id TEXT PRIMARY KEY NOT NULL,
                workflow_id TEXT NOT NULL,
                node TEXT NOT NULL,
                model TEXT NOT NULL,
                prompt_tokens INTEGER NOT NULL,
                completion_tokens INTEGER NOT NULL,
                estimated_cost_usd REAL NOT NULL,
                timestamp TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn save_and_fetch_for_workflow() {
        let pool = setup_db().await;
        let record = TokenUsageRow::new("wf-1", "architect", "claude-3", 100, 50, 0.01);
        TokenUsageRepository::save(&pool, &record).await.unwrap();

        let rows = TokenUsageRepository::for_workflow(&pool, "wf-1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].model, "claude-3");
    }

    #[tokio::test]
    async fn usage_trend_aggregates_by_day_and_model() {
        let pool = setup_db().await;
        TokenUsageRepository::save(&pool, &TokenUsageRow::new("wf-1", "architect", "claude-3", 100, 50, 0.01))
            .await
            .unwrap();
        TokenUsageRepository::save(&pool, &TokenUsageRow::new("wf-1", "developer", "claude-3", 200, 80, 0.02))
            .await
            .unwrap();
        TokenUsageRepository::save(&pool, &TokenUsageRow::new("wf-2", "architect", "gpt-4", 10, 5, 0.05))
            .await
            .unwrap();

        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let trend = TokenUsageRepository::usage_trend(&pool, &today, &today).await.unwrap();

        assert_eq!(trend.by_day.len(), 1);
        assert_eq!(trend.by_day[0].prompt_tokens, 310);
        assert_eq!(trend.by_model.len(), 2);
        let claude = trend.by_model.iter().find(|m| m.model == "claude-3").unwrap();
        assert_eq!(claude.completion_tokens, 130);
    }
}
