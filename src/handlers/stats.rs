use axum::{extract::State, Json};

use crate::{error::SentinelError, handlers::AppState, models::VerificationStats};

pub async fn get_stats(
    State(state): State<AppState>,
) -> Result<Json<VerificationStats>, SentinelError> {
    let stats = state.stats.get_stats().await?;
    Ok(Json(stats))
}
