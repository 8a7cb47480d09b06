//! The job-trigger HTTP API (spec §6): a manual trigger and an execution
//! poll endpoint, both gated by [`crate::auth`] and [`crate::rate_limit`].

use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use backhaul_protocol::{BackhaulError, ErrorKind, ExecutionId, ExecutionRepository, ExecutionStatus, JobId, LogEntry};
use backhaul_scheduler::Scheduler;

use crate::auth::{AuthContext, Capability};

#[derive(Clone)]
pub struct AppState {
    pub execution_repo: Arc<dyn ExecutionRepository>,
    pub scheduler: Arc<Scheduler>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/jobs/:job_id/run", post(trigger_job))
        .route("/api/executions/:execution_id", get(get_execution))
}

/// Wraps [`BackhaulError`] for the HTTP boundary (spec §7): `4xx` for
/// validation/authz-shaped kinds, `5xx` with the message replaced by a
/// generic one for `Internal` so invariant-violation detail never leaks to
/// a caller.
struct ApiError(BackhaulError);

impl From<BackhaulError> for ApiError {
    fn from(err: BackhaulError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::ConfigInvalid => StatusCode::BAD_REQUEST,
            ErrorKind::AuthDenied => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Cancelled => StatusCode::CONFLICT,
            ErrorKind::Unreachable => StatusCode::BAD_GATEWAY,
            ErrorKind::SubprocessFailed { .. }
            | ErrorKind::SubprocessSignaled { .. }
            | ErrorKind::StreamIo
            | ErrorKind::Integrity => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if self.0.kind == ErrorKind::Internal {
            "internal error".to_string()
        } else {
            self.0.message
        };

        (status, Json(serde_json::json!({ "error": message, "code": status.as_u16() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerResponse {
    execution_id: ExecutionId,
}

async fn trigger_job(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(job_id): Path<JobId>,
) -> Result<Response, ApiError> {
    if !auth.allows(Capability::JobsExecute) {
        return Ok((StatusCode::FORBIDDEN, "missing jobs:execute capability").into_response());
    }

    let execution_id = state
        .scheduler
        .run_now(job_id)
        .await
        .map_err(BackhaulError::from)?;

    Ok((StatusCode::ACCEPTED, Json(TriggerResponse { execution_id })).into_response())
}

#[derive(Debug, Deserialize, Default)]
struct PollQuery {
    #[serde(default, rename = "includeLogs")]
    include_logs: bool,
}

/// The external status enum (spec §6) is a 4-value projection of the
/// 5-value internal [`ExecutionStatus`]: `Queued` reads as `Pending` to a
/// caller who only cares whether a run has started, and `Cancelled` folds
/// into `Failed` since the external contract has no separate terminal
/// state for it.
fn wire_status(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Queued => "Pending",
        ExecutionStatus::Running => "Running",
        ExecutionStatus::Success => "Success",
        ExecutionStatus::Failed | ExecutionStatus::Cancelled => "Failed",
    }
}

#[derive(Debug, Serialize)]
struct ExecutionData<'a> {
    status: &'static str,
    progress: f32,
    stage: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logs: Option<&'a [LogEntry]>,
}

#[derive(Debug, Serialize)]
struct PollResponse<'a> {
    data: ExecutionData<'a>,
}

fn stage_name(log_type: backhaul_protocol::LogType) -> &'static str {
    use backhaul_protocol::LogType;
    match log_type {
        LogType::Resolve => "resolve",
        LogType::Dump => "dump",
        LogType::Transform => "transform",
        LogType::Upload => "upload",
        LogType::Sidecar => "sidecar",
        LogType::Retention => "retention",
        LogType::Finalize => "finalize",
    }
}

async fn get_execution(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(execution_id): Path<ExecutionId>,
    Query(query): Query<PollQuery>,
) -> Result<Response, ApiError> {
    if !auth.allows(Capability::JobsRead) {
        return Ok((StatusCode::FORBIDDEN, "missing jobs:read capability").into_response());
    }

    let execution = state.execution_repo.get_execution(execution_id).await?;

    let data = ExecutionData {
        status: wire_status(execution.status),
        progress: execution.progress,
        stage: execution.logs.last().map(|entry| stage_name(entry.log_type)),
        error: execution.error.as_ref().map(|err| err.message.clone()),
        logs: query.include_logs.then_some(execution.logs.as_slice()),
    };

    Ok(Json(PollResponse { data }).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_status_folds_cancelled_into_failed() {
        assert_eq!(wire_status(ExecutionStatus::Cancelled), "Failed");
        assert_eq!(wire_status(ExecutionStatus::Failed), "Failed");
    }

    #[test]
    fn wire_status_renames_queued_to_pending() {
        assert_eq!(wire_status(ExecutionStatus::Queued), "Pending");
    }
}

#[cfg(test)]
mod http_integration {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use backhaul_protocol::{
        Channel, ChannelId, Destination, DestinationId, EncryptionProfile, ExecutionKind, Job,
        JobRepository, ProfileId, Source, SourceId,
    };
    use backhaul_scheduler::{Scheduler, SchedulerConfig};
    use backhaul_security::SecretStore;

    use crate::auth::ApiKeyConfig;
    use crate::rate_limit::RateLimiterState;

    use super::*;

    struct StubJobRepo;

    #[async_trait::async_trait]
    impl JobRepository for StubJobRepo {
        async fn get_job(&self, _id: JobId) -> Result<Job, BackhaulError> {
            unimplemented!("not exercised by these tests")
        }
        async fn get_source(&self, _id: SourceId) -> Result<Source, BackhaulError> {
            unimplemented!("not exercised by these tests")
        }
        async fn get_destination(&self, _id: DestinationId) -> Result<Destination, BackhaulError> {
            unimplemented!("not exercised by these tests")
        }
        async fn get_encryption_profile(&self, _id: ProfileId) -> Result<EncryptionProfile, BackhaulError> {
            unimplemented!("not exercised by these tests")
        }
        async fn get_channels(&self, _ids: &[ChannelId]) -> Result<Vec<Channel>, BackhaulError> {
            unimplemented!("not exercised by these tests")
        }
        async fn list_enabled_jobs(&self) -> Result<Vec<Job>, BackhaulError> {
            Ok(Vec::new())
        }
    }

    struct StubExecutionRepo {
        execution: backhaul_protocol::Execution,
    }

    #[async_trait::async_trait]
    impl ExecutionRepository for StubExecutionRepo {
        async fn insert_execution(&self, _execution: &backhaul_protocol::Execution) -> Result<(), BackhaulError> {
            unimplemented!("not exercised by these tests")
        }
        async fn update_execution(&self, _execution: &backhaul_protocol::Execution) -> Result<(), BackhaulError> {
            unimplemented!("not exercised by these tests")
        }
        async fn get_execution(&self, id: ExecutionId) -> Result<backhaul_protocol::Execution, BackhaulError> {
            if id == self.execution.id {
                Ok(self.execution.clone())
            } else {
                Err(BackhaulError::not_found("no such execution"))
            }
        }
        async fn list_executions_for_job(&self, _job_id: JobId) -> Result<Vec<backhaul_protocol::Execution>, BackhaulError> {
            unimplemented!("not exercised by these tests")
        }
        async fn has_running_execution(&self, _job_id: JobId) -> Result<bool, BackhaulError> {
            Ok(false)
        }
    }

    fn app_with(execution_repo: Arc<dyn ExecutionRepository>) -> Router {
        let job_repo: Arc<dyn JobRepository> = Arc::new(StubJobRepo);
        let secret_store = Arc::new(SecretStore::new([7u8; 32]));
        let scheduler = Scheduler::new(
            job_repo,
            execution_repo.clone(),
            secret_store,
            SchedulerConfig::default(),
        );

        let api_keys = ApiKeyConfig::from_env_str("rk:jobs:read;wk:jobs:execute").unwrap();
        let rate_limiter = RateLimiterState::new(100, std::time::Duration::from_secs(60));

        router()
            .layer(axum::middleware::from_fn_with_state(
                rate_limiter,
                crate::rate_limit::rate_limit_middleware,
            ))
            .layer(axum::middleware::from_fn_with_state(
                api_keys,
                crate::auth::auth_middleware,
            ))
            .with_state(AppState {
                execution_repo,
                scheduler,
            })
    }

    fn sample_execution() -> backhaul_protocol::Execution {
        backhaul_protocol::Execution {
            id: ExecutionId::new(),
            job_id: JobId::new(),
            kind: ExecutionKind::Backup,
            status: ExecutionStatus::Success,
            started_at: chrono::Utc::now(),
            finished_at: Some(chrono::Utc::now()),
            progress: 1.0,
            artifact_size_bytes: Some(4096),
            error: None,
            logs: Vec::new(),
        }
    }

    #[tokio::test]
    async fn rejects_requests_with_no_authorization_header() {
        let execution = sample_execution();
        let app = app_with(Arc::new(StubExecutionRepo { execution: execution.clone() }));

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/executions/{}", execution.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejects_a_key_lacking_the_required_capability() {
        let execution = sample_execution();
        let app = app_with(Arc::new(StubExecutionRepo { execution: execution.clone() }));

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/executions/{}", execution.id))
                    .header("authorization", "Bearer wk")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn returns_the_execution_for_an_authorized_caller() {
        let execution = sample_execution();
        let app = app_with(Arc::new(StubExecutionRepo { execution: execution.clone() }));

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/executions/{}", execution.id))
                    .header("authorization", "Bearer rk")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn trigger_job_on_an_unknown_job_returns_not_found() {
        let execution = sample_execution();
        let app = app_with(Arc::new(StubExecutionRepo { execution }));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/jobs/{}/run", JobId::new()))
                    .header("authorization", "Bearer wk")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn requests_past_the_quota_are_rate_limited() {
        let execution = sample_execution();
        let job_repo: Arc<dyn JobRepository> = Arc::new(StubJobRepo);
        let execution_repo: Arc<dyn ExecutionRepository> = Arc::new(StubExecutionRepo { execution: execution.clone() });
        let secret_store = Arc::new(SecretStore::new([7u8; 32]));
        let scheduler = Scheduler::new(job_repo, execution_repo.clone(), secret_store, SchedulerConfig::default());

        let api_keys = ApiKeyConfig::from_env_str("rk:jobs:read").unwrap();
        let rate_limiter = RateLimiterState::new(1, std::time::Duration::from_secs(60));
        let app = router()
            .layer(axum::middleware::from_fn_with_state(
                rate_limiter,
                crate::rate_limit::rate_limit_middleware,
            ))
            .layer(axum::middleware::from_fn_with_state(
                api_keys,
                crate::auth::auth_middleware,
            ))
            .with_state(AppState {
                execution_repo,
                scheduler,
            });

        let request = || {
            Request::builder()
                .uri(format!("/api/executions/{}", execution.id))
                .header("authorization", "Bearer rk")
                .body(Body::empty())
                .unwrap()
        };

        let first = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
