//! Identity and leaderboard endpoints.

use super::{ApiError, AppState};
use crate::metrics;
use axum::{Json, extract::State};
use poker_core::auth::{self, AuthError, TelegramUser};
use poker_core::profile::Profile;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct MeRequest {
    #[serde(default, rename = "initData")]
    pub init_data: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: i64,
    pub display_name: String,
    pub balance: u32,
}

/// Resolve an identity from raw init data. Empty init data is a guest;
/// anything else must carry a valid signature.
pub(super) fn resolve_identity(
    state: &AppState,
    init_data: &str,
) -> Result<TelegramUser, ApiError> {
    if init_data.is_empty() {
        return Ok(TelegramUser::guest());
    }
    let Some(token) = state.config.telegram_token.as_deref() else {
        return Err(ApiError::Internal(
            "server misconfigured: TELEGRAM_TOKEN not set".to_string(),
        ));
    };
    match auth::verify_init_data(init_data, token) {
        Ok(user) => {
            metrics::identity_checks_total(true);
            Ok(user)
        }
        Err(err @ (AuthError::BadSignature | AuthError::MissingHash | AuthError::MalformedUser)) => {
            metrics::identity_checks_total(false);
            Err(ApiError::Unauthorized(err.to_string()))
        }
        Err(err) => Err(ApiError::Unauthorized(err.to_string())),
    }
}

/// `POST /api/me` — verify init data (or fall back to a guest) and return
/// the profile, creating it with the starting balance on first sight.
pub async fn me(
    State(state): State<AppState>,
    Json(request): Json<MeRequest>,
) -> Result<Json<MeResponse>, ApiError> {
    let user = resolve_identity(&state, &request.init_data)?;
    let display = if user.first_name.is_empty() {
        "Player".to_string()
    } else {
        user.first_name.clone()
    };
    let profile = state.profiles.get_or_create(user.id, &display).await;
    if user.id != 0 {
        state.profiles.set_display_name(user.id, &display).await;
    }
    Ok(Json(MeResponse {
        user_id: profile.user_id,
        display_name: if user.id != 0 { display } else { profile.display_name },
        balance: profile.balance,
    }))
}

#[derive(Debug, Serialize)]
pub struct TopResponse {
    pub top: Vec<Profile>,
}

/// `GET /api/top` — balance leaderboard.
pub async fn top(State(state): State<AppState>) -> Json<TopResponse> {
    Json(TopResponse {
        top: state.profiles.top_balances(10).await,
    })
}
