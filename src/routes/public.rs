use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use serde::Deserialize;

use crate::{auth, error::AppError, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register_submit))
        .route("/login", post(login_submit))
        .route("/logout", post(logout))
}

#[derive(Deserialize)]
struct RegisterForm {
    username: String,
    email: String,
    password: String,
}

async fn register_submit(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Json(form): Json<RegisterForm>,
) -> Result<impl IntoResponse, AppError> {
    let user = auth::register_user(&state, &form.username, &form.email, &form.password).await?;
    let session_id = auth::create_session(&state, user.id).await?;
    Ok((
        StatusCode::CREATED,
        auth::apply_session_cookie(jar, &session_id),
        Json(user),
    ))
}

#[derive(Deserialize)]
struct LoginForm {
    identifier: String,
    password: String,
}

async fn login_submit(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Json(form): Json<LoginForm>,
) -> Result<impl IntoResponse, AppError> {
    let user = auth::authenticate_user(&state, &form.identifier, &form.password).await?;
    let session_id = auth::create_session(&state, user.id).await?;
    Ok((auth::apply_session_cookie(jar, &session_id), Json(user)))
}

async fn logout(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, StatusCode), AppError> {
    if let Some(cookie) = jar.get(auth::SESSION_COOKIE) {
        auth::destroy_session(&state, cookie.value()).await?;
    }
    Ok((auth::clear_session_cookie(jar), StatusCode::NO_CONTENT))
}
