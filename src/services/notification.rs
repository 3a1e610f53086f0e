use anyhow::Result;
use chrono::{Duration, Utc};
use sqlx::PgPool;

use crate::models::inspection::{Inspection, InspectionStatus};
use crate::models::user::{User, UserRole};

pub struct NotificationService {
    pub db: PgPool,
}

impl NotificationService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Inspections sitting in manager review for longer than `days`.
    pub async fn find_stale_reviews(&self, days: i32) -> Result<Vec<Inspection>> {
        let cutoff = Utc::now() - Duration::days(days as i64);

        let results = sqlx::query_as::<_, Inspection>(
            r#"
            SELECT * FROM inspections
            WHERE status = $1 AND updated_at < $2
            ORDER BY updated_at ASC
            "#,
        )
        .bind(InspectionStatus::PendingManagerReview)
        .bind(cutoff)
        .fetch_all(&self.db)
        .await?;

        Ok(results)
    }

    /// Approved inspections whose field verification never started or never
    /// finished within `days`.
    pub async fn find_stale_verifications(&self, days: i32) -> Result<Vec<Inspection>> {
        let cutoff = Utc::now() - Duration::days(days as i64);

        let results = sqlx::query_as::<_, Inspection>(
            r#"
            SELECT * FROM inspections
            WHERE status IN ($1, $2) AND updated_at < $3
            ORDER BY updated_at ASC
            "#,
        )
        .bind(InspectionStatus::Approved)
        .bind(InspectionStatus::PendingConsultantVerification)
        .bind(cutoff)
        .fetch_all(&self.db)
        .await?;

        Ok(results)
    }

    pub async fn send_notification(
        &self,
        user_email: &str,
        inspections: &[Inspection],
    ) -> Result<()> {
        // Delivery channel is out of scope; the reminder is logged so the
        // daily sweep stays observable.
        tracing::info!(
            "Notification: {} has {} stale inspections: {:?}",
            user_email,
            inspections.len(),
            inspections.iter().map(|i| i.id).collect::<Vec<_>>()
        );

        Ok(())
    }

    pub async fn process_stale_notifications(&self) -> Result<()> {
        self.process_stale_notifications_with_days(7).await
    }

    pub async fn process_stale_notifications_with_days(&self, days: i32) -> Result<()> {
        let stale_reviews = self.find_stale_reviews(days).await?;
        if !stale_reviews.is_empty() {
            let managers = sqlx::query_as::<_, User>(
                "SELECT * FROM users WHERE role = $1 AND is_active = TRUE",
            )
            .bind(UserRole::Manager)
            .fetch_all(&self.db)
            .await?;

            for manager in &managers {
                if let Err(e) = self.send_notification(&manager.email, &stale_reviews).await {
                    tracing::error!("Failed to notify {}: {}", manager.email, e);
                }
            }
        }

        let stale_verifications = self.find_stale_verifications(days).await?;
        for inspection in &stale_verifications {
            let consultants = sqlx::query_as::<_, User>(
                r#"
                SELECT u.* FROM users u
                JOIN consultant_establishments ce ON ce.user_id = u.id
                WHERE ce.establishment_id = $1 AND u.is_active = TRUE
                "#,
            )
            .bind(inspection.establishment_id)
            .fetch_all(&self.db)
            .await?;

            for consultant in &consultants {
                if let Err(e) = self
                    .send_notification(&consultant.email, std::slice::from_ref(inspection))
                    .await
                {
                    tracing::error!("Failed to notify {}: {}", consultant.email, e);
                }
            }
        }

        Ok(())
    }
}
