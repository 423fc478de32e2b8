use axum::{extract::State, Json};
use chrono::Utc;
use futures::future::join_all;

use crate::{handlers::AppState, models::HealthStatus};

pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let store_ok = state.orchestrator.store().ping().await;

    let chains = state.adapters.chains();
    let probes = join_all(chains.iter().map(|&chain| {
        let adapters = state.adapters.clone();
        async move {
            match adapters.get(chain) {
                Some(adapter) => (chain, adapter.healthy().await),
                None => (chain, false),
            }
        }
    }))
    .await;

    let healthy_chains: Vec<String> = probes
        .iter()
        .filter(|(_, ok)| *ok)
        .map(|(chain, _)| chain.to_string())
        .collect();
    let all_chains_ok = healthy_chains.len() == probes.len();

    let status = if store_ok && all_chains_ok {
        "healthy"
    } else if store_ok {
        "degraded"
    } else {
        "unhealthy"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store_ok,
        chains: healthy_chains,
        uptime_seconds: state.stats.uptime_seconds(),
        timestamp: Utc::now(),
    })
}
