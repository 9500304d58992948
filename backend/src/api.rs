use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::maps::MapCatalog;
use crate::ranks::RankUpdateError;
use crate::session::{RunSessions, SessionError};
use crate::submission::{RunSubmissions, SubmissionError};

pub struct ApiState {
    pub sessions: Arc<RunSessions>,
    pub maps: Arc<MapCatalog>,
    pub submissions: Arc<RunSubmissions>,
    pub max_replay_size: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Session(e) | ApiError::Submission(SubmissionError::Session(e)) => match e {
                SessionError::WrongUser => StatusCode::FORBIDDEN,
                _ => StatusCode::BAD_REQUEST,
            },
            ApiError::Submission(SubmissionError::UnknownMap(_))
            | ApiError::Submission(SubmissionError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Submission(SubmissionError::Rank(
                RankUpdateError::ConcurrentUpdateExhausted { .. },
            )) => StatusCode::CONFLICT,
            ApiError::Submission(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Submission(SubmissionError::Validation(e)) => {
                (status, axum::Json(e.body())).into_response()
            }
            e if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!("Handling request: {}", e);
                (status, "Internal error").into_response()
            }
            e => (status, e.to_string()).into_response(),
        }
    }
}

pub mod session {
    use super::{ApiError, ApiState};
    use crate::identity::UserIdentity;
    use crate::session::RunSessionTimestamp;
    use axum::extract::{Path, State};
    use std::sync::Arc;

    pub fn router(state: Arc<ApiState>) -> axum::Router {
        let max_replay_size = state.max_replay_size;

        axum::Router::new()
            .route(
                "/run",
                axum::routing::post(create).delete(invalidate),
            )
            .route("/run/:id", axum::routing::post(update))
            .route(
                "/run/:id/end",
                axum::routing::post(end)
                    .layer(axum::extract::DefaultBodyLimit::max(max_replay_size)),
            )
            .with_state(state)
    }

    pub async fn create(
        State(state): State<Arc<ApiState>>,
        identity: UserIdentity,
        axum::Json(request): axum::Json<common::CreateRunSession>,
    ) -> Result<axum::Json<common::RunSessionInfo>, ApiError> {
        let map = state.maps.get(request.map_id);
        let session = state.sessions.create(
            identity.user_id,
            &request,
            map.as_deref(),
            chrono::Utc::now(),
        )?;

        tracing::info!("User {} started session {}", identity.user_id, session.id);

        Ok(axum::Json(session.info()))
    }

    pub async fn update(
        State(state): State<Arc<ApiState>>,
        identity: UserIdentity,
        Path(session_id): Path<u64>,
        axum::Json(timestamp): axum::Json<common::UpdateRunSession>,
    ) -> Result<axum::http::StatusCode, ApiError> {
        state.sessions.add_timestamp(
            identity.user_id,
            session_id,
            RunSessionTimestamp::from(timestamp),
            chrono::Utc::now(),
        )?;

        Ok(axum::http::StatusCode::NO_CONTENT)
    }

    pub async fn invalidate(
        State(state): State<Arc<ApiState>>,
        identity: UserIdentity,
    ) -> Result<axum::http::StatusCode, ApiError> {
        state.sessions.invalidate(identity.user_id)?;

        Ok(axum::http::StatusCode::NO_CONTENT)
    }

    pub async fn end(
        State(state): State<Arc<ApiState>>,
        identity: UserIdentity,
        Path(session_id): Path<u64>,
        replay: axum::body::Bytes,
    ) -> Result<axum::Json<common::CompletedRun>, ApiError> {
        let completed = state
            .submissions
            .submit(
                identity.user_id,
                identity.steam_id,
                session_id,
                replay,
                chrono::Utc::now(),
            )
            .await?;

        Ok(axum::Json(completed))
    }
}

pub fn router(state: Arc<ApiState>) -> axum::Router {
    axum::Router::new().nest("/session", session::router(state))
}
