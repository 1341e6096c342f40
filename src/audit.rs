use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::Value;
use uuid::Uuid;

use crate::{entity::audit_logs, error::AppResult};

pub async fn log_audit(
    orm: &DatabaseConnection,
    user_id: Option<Uuid>,
    action: &str,
    resource: Option<&str>,
    metadata: Option<Value>,
) -> AppResult<()> {
    let row = audit_logs::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        action: Set(action.to_string()),
        resource: Set(resource.map(|r| r.to_string())),
        metadata: Set(metadata),
        created_at: Set(Utc::now().into()),
    };
    row.insert(orm).await?;

    Ok(())
}
