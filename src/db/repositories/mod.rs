//! Database repositories
//!
//! One repository per aggregate. Each exposes a trait plus an `Sqlx*`
//! implementation constructed with `new(pool)` or `boxed(pool)`.

pub mod account;
pub mod campaign;
pub mod category;
pub mod form_submission;
pub mod media;
pub mod page;
pub mod post;
pub mod product;
pub mod service;
pub mod session;
pub mod testimonial;
pub mod two_factor;
pub mod user;

pub use account::{AccountRepository, OrderRejection, SqlxAccountRepository};
pub use campaign::{CampaignRepository, SqlxCampaignRepository};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use form_submission::{FormSubmissionRepository, SqlxFormSubmissionRepository};
pub use media::{MediaRepository, NewMediaVariant, SqlxMediaRepository};
pub use page::{PageRepository, SqlxPageRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use product::{ProductRepository, SqlxProductRepository};
pub use service::{ServiceRepository, SqlxServiceRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use testimonial::{SqlxTestimonialRepository, TestimonialRepository};
pub use two_factor::{SqlxTwoFactorRepository, TwoFactorRepository};
pub use user::{SqlxUserRepository, UserRepository};

use crate::services::hierarchy::PathChange;
use anyhow::{Context, Result};
use chrono::Utc;

/// Write planned path changes to `table` inside an open transaction.
///
/// SQLite checks UNIQUE per statement, so a plan where one row takes over
/// another row's old path would fail half way. Every row is first moved to a
/// placeholder path that cannot collide, then to its final path.
pub(crate) async fn apply_path_changes(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    table: &'static str,
    changes: &[PathChange],
) -> Result<()> {
    let now = Utc::now();
    let placeholder_sql = format!("UPDATE {} SET path = ? WHERE id = ?", table);
    let final_sql = format!("UPDATE {} SET path = ?, updated_at = ? WHERE id = ?", table);

    for change in changes {
        sqlx::query(&placeholder_sql)
            .bind(format!("~moving/{}", change.id))
            .bind(change.id)
            .execute(&mut **tx)
            .await
            .with_context(|| format!("Failed to stage path change in {}", table))?;
    }

    for change in changes {
        sqlx::query(&final_sql)
            .bind(&change.new_path)
            .bind(now)
            .bind(change.id)
            .execute(&mut **tx)
            .await
            .with_context(|| format!("Failed to update path in {}", table))?;
    }

    Ok(())
}
