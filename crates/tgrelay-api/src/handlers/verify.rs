use crate::auth::check_password;
use crate::error::HttpAppError;
use crate::state::AppState;
use crate::utils::form::FormFields;
use axum::extract::State;
use std::sync::Arc;

/// Lets the web client check the access password before uploading.
pub async fn verify_password(
    State(state): State<Arc<AppState>>,
    form: FormFields,
) -> Result<&'static str, HttpAppError> {
    check_password(state.config.access_password(), form.text("pwd"))?;
    Ok("ok")
}
