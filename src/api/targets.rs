use std::sync::Arc;

use axum::extract::{Path, State};

use super::App;
use crate::auth::{require_owner, ManagerAuth};
use crate::error::AppError;
use crate::lifecycle;

/// `PUT /targets/delete/<tid>` (`spec.md` §6). `spec.md` classifies this as
/// manager-authenticated with owner match enforced, even though the source
/// handler (`DeleteTargetHandler`) carries no visible auth decorator --
/// treated as an oversight in the source rather than a Non-goal.
pub async fn delete(
    State(app): State<Arc<App>>,
    Path(target_id): Path<String>,
    ManagerAuth { user_id }: ManagerAuth,
) -> Result<(), AppError> {
    require_owner(&app, &target_id, &user_id).await?;
    lifecycle::delete_target(&app, &target_id).await
}
