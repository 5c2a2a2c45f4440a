use axum::Json;
use axum::extract::{Multipart, Query, State};

use super::{UserQuery, WithMessage, read_submission};
use crate::error::PipelineError;
use crate::state::AppState;
use crate::test_run::{TestRunReport, run_test_prompt};

pub async fn test_prompt(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
    multipart: Multipart,
) -> Result<Json<WithMessage<TestRunReport>>, PipelineError> {
    let submission = read_submission(multipart).await?;
    let report = run_test_prompt(
        &state,
        &query.user_id,
        &submission.file_name,
        &submission.bytes,
        &submission.description,
    )
    .await?;
    Ok(WithMessage::new("Test prompt run completed", report))
}
