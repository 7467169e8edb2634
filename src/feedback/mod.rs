// Message feedback aggregation. Thumbs ratings feed a natural-language
// summary injected into the system prompt for adaptive behavior.

use chrono::Utc;
use serde::Deserialize;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFeedback {
    pub message_id: String,
    pub conversation_id: String,
    /// `up` or `down`.
    pub rating: String,
    pub category: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FeedbackRepository {
    pool: SqlitePool,
}

impl FeedbackRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, user_id: &str, data: CreateFeedback) -> Result<()> {
        sqlx::query(
            "INSERT INTO message_feedback (id, message_id, conversation_id, user_id, rating, category, comment, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&data.message_id)
        .bind(&data.conversation_id)
        .bind(user_id)
        .bind(&data.rating)
        .bind(&data.category)
        .bind(&data.comment)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Natural-language feedback summary for prompt injection. Empty when the
    /// user has no feedback on record. At most the latest 50 submissions are
    /// considered; the top 5 categories and 3 comments are included.
    pub async fn summary_for_user(&self, user_id: &str) -> Result<String> {
        let rows = sqlx::query(
            "SELECT rating, category, comment FROM message_feedback
             WHERE user_id = ? ORDER BY created_at DESC LIMIT 50",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() {
            return Ok(String::new());
        }

        let mut positive = 0;
        let mut negative = 0;
        let mut category_counts: HashMap<String, usize> = HashMap::new();
        let mut comments: Vec<String> = Vec::new();
        for row in &rows {
            match row.get::<String, _>("rating").as_str() {
                "up" => positive += 1,
                "down" => negative += 1,
                _ => {}
            }
            if let Some(category) = row.get::<Option<String>, _>("category") {
                *category_counts.entry(category).or_default() += 1;
            }
            if comments.len() < 3 {
                if let Some(comment) = row.get::<Option<String>, _>("comment") {
                    comments.push(comment);
                }
            }
        }

        let mut parts = vec![format!(
            "User has given {positive} positive and {negative} negative ratings across the last {} feedback submissions.",
            positive + negative
        )];
        if !category_counts.is_empty() {
            let mut counts: Vec<(String, usize)> = category_counts.into_iter().collect();
            counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            counts.truncate(5);
            let rendered: Vec<String> = counts
                .iter()
                .map(|(category, count)| format!("{category} ({count}x)"))
                .collect();
            parts.push(format!("Negative feedback patterns: {}.", rendered.join(", ")));
        }
        if !comments.is_empty() {
            let quoted: Vec<String> = comments.iter().map(|c| format!("\"{c}\"")).collect();
            parts.push(format!("Recent user comments: {}.", quoted.join("; ")));
        }

        Ok(parts.join(" "))
    }
}
