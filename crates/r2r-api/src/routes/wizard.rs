//! Configuration wizard sessions
//!
//! `POST /wizard` opens a session for an account; every user action goes
//! through `POST /wizard/:id/action`. Responses carry the full session view,
//! including the unsigned transactions the wallet should send next.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use r2r_core::{EvmAddress, ProtocolError};
use rent2repay::{ActivationChoice, PeriodChoice, WizardError, WizardEvent, WizardStep};
use uuid::Uuid;

use crate::dto::{ApiError, StartWizardRequest, WizardActionRequest, WizardResponse};
use crate::sessions;
use crate::state::{reject, unix_now, AppError};
use crate::AppState;

/// Create wizard routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(start))
        .route("/:id", get(get_session).delete(close))
        .route("/:id/action", post(action))
}

/// POST /wizard - Open a session
pub async fn start(
    State(state): State<AppState>,
    Json(request): Json<StartWizardRequest>,
) -> Result<Json<WizardResponse>, (StatusCode, Json<ApiError>)> {
    let account = EvmAddress::parse(&request.account).map_err(reject)?;
    let id = state.create_wizard(account).await;

    if request.load_existing {
        if let Err(e) = sessions::load_existing(&state, id).await {
            state.remove_wizard(id).await;
            return Err(reject(e));
        }
    }

    sessions::view(&state, id).await.map(Json).map_err(reject)
}

/// GET /wizard/:id - Current session view
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WizardResponse>, (StatusCode, Json<ApiError>)> {
    sessions::view(&state, id).await.map(Json).map_err(reject)
}

/// DELETE /wizard/:id - Drop a session
pub async fn close(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    if state.remove_wizard(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(reject(AppError::SessionNotFound(id)))
    }
}

/// POST /wizard/:id/action - Apply one user action
pub async fn action(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<WizardActionRequest>,
) -> Result<Json<WizardResponse>, (StatusCode, Json<ApiError>)> {
    let before = state.wizard(id).await.map_err(reject)?.step();

    match to_event(request).map_err(reject)? {
        Some(event) => {
            tracing::debug!(session = %id, event = event.name(), "Wizard action");
            state
                .with_wizard(id, |w| w.apply(event, unix_now()))
                .await
                .map_err(reject)?;
        }
        None if before == WizardStep::Approval => {}
        None => {
            return Err(reject(WizardError::InvalidTransition {
                step: before.as_str(),
                event: "refresh-allowances",
            }))
        }
    }

    let after = state.wizard(id).await.map_err(reject)?.step();
    match after {
        // Entering the approval step, or an explicit refresh
        WizardStep::Approval => {
            if let Err(e) = sessions::refresh_allowances(&state, id).await {
                tracing::warn!(session = %id, error = %e, "Allowance refresh failed");
            }
        }
        WizardStep::Check if before != WizardStep::Check => {
            if let Err(e) = sessions::load_existing(&state, id).await {
                tracing::warn!(session = %id, error = %e, "Failed to reload configuration");
            }
        }
        _ => {}
    }

    sessions::view(&state, id).await.map(Json).map_err(reject)
}

/// Map a request to a wizard event; `None` is an allowance refresh
fn to_event(request: WizardActionRequest) -> Result<Option<WizardEvent>, ProtocolError> {
    use WizardActionRequest as A;

    let event = match request {
        A::Configure | A::Modify => WizardEvent::Configure,
        A::AddToken { token, amount } => WizardEvent::AddToken {
            token: EvmAddress::parse(&token)?,
            amount,
        },
        A::RemoveToken { token } => WizardEvent::RemoveToken {
            token: EvmAddress::parse(&token)?,
        },
        A::Continue => WizardEvent::Continue,
        A::SelectPeriod { preset, custom } => match (preset, custom) {
            (Some(seconds), _) => WizardEvent::SelectPeriod(PeriodChoice::Preset(seconds)),
            (None, Some(raw)) => WizardEvent::SelectPeriod(PeriodChoice::Custom(raw)),
            (None, None) => {
                return Err(ProtocolError::InvalidPeriod {
                    message: "choose a preset or enter a custom period".to_string(),
                })
            }
        },
        A::SelectActivation { asap: true, .. } => {
            WizardEvent::SelectActivation(ActivationChoice::Asap)
        }
        A::SelectActivation { date, time, .. } => {
            WizardEvent::SelectActivation(ActivationChoice::At {
                date: date.unwrap_or_default(),
                time: time.unwrap_or_default(),
            })
        }
        A::RefreshAllowances => return Ok(None),
        A::ApprovalFailed { token, message } => WizardEvent::ApprovalFailed {
            token: EvmAddress::parse(&token)?,
            message,
        },
        A::Submit => WizardEvent::Submit,
        A::SubmissionFailed { message } => WizardEvent::SubmissionFailed { message },
        A::Back => WizardEvent::Back,
        A::Cancel => WizardEvent::Cancel,
    };
    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::create_router;
    use crate::routes::test_support::{offline_state, send};
    use serde_json::{json, Value};

    const ACCOUNT: &str = "0x2222222222222222222222222222222222222222";
    const USDC: &str = "0xddafbb505ad214d7b80b1f830fccc89b60fb7a83";

    async fn start_session(state: &AppState) -> String {
        let (status, body) = send(
            create_router(state.clone()),
            "POST",
            "/wizard",
            Some(json!({ "account": ACCOUNT, "load_existing": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["id"].as_str().unwrap().to_string()
    }

    async fn act(state: &AppState, id: &str, action: Value) -> (StatusCode, Value) {
        send(
            create_router(state.clone()),
            "POST",
            &format!("/wizard/{}/action", id),
            Some(action),
        )
        .await
    }

    #[tokio::test]
    async fn test_walk_to_timestamp_selection() {
        let state = offline_state();
        let id = start_session(&state).await;

        let (status, body) = act(&state, &id, json!({ "action": "configure" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["step"], "token-selection");
        assert_eq!(body["can_add_token"], true);

        let (status, body) = act(
            &state,
            &id,
            json!({ "action": "add-token", "token": USDC, "amount": "100" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"]["tokens"][0]["amount"], "100");

        let (_, body) = act(&state, &id, json!({ "action": "continue" })).await;
        assert_eq!(body["step"], "periodicity-selection");

        let (status, body) = act(
            &state,
            &id,
            json!({ "action": "select-period", "custom": "2" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["step"], "timestamp-selection");
        assert_eq!(body["state"]["period"], 5);

        let (status, body) = act(
            &state,
            &id,
            json!({ "action": "select-activation", "date": "", "time": "" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "missing_date_time");
    }

    #[tokio::test]
    async fn test_out_of_order_action_conflicts() {
        let state = offline_state();
        let id = start_session(&state).await;

        let (status, body) = act(&state, &id, json!({ "action": "submit" })).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "invalid_transition");

        let (status, _) = act(&state, &id, json!({ "action": "refresh-allowances" })).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let state = offline_state();
        let (status, body) = send(
            create_router(state),
            "GET",
            &format!("/wizard/{}", Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn test_close_session() {
        let state = offline_state();
        let id = start_session(&state).await;
        let uri = format!("/wizard/{}", id);
        let (status, _) = send(create_router(state.clone()), "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(create_router(state), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_period_action_requires_choice() {
        let err = to_event(WizardActionRequest::SelectPeriod {
            preset: None,
            custom: None,
        })
        .unwrap_err();
        assert_eq!(err.error_code(), "invalid_period");
    }
}
