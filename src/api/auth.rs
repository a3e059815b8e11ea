use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentSchool;
use crate::api::validation::validation_message;
use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::now_utc;
use crate::repositories::schools::{CreateSchool, SchoolRecord};
use crate::schemas::auth::{SchoolLogin, SchoolResponse, SchoolSignup, TokenResponse};

const INVALID_LOGIN: &str = "Incorrect EMIS Number or password.";

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/me", get(me))
}

async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SchoolSignup>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    payload.validate().map_err(|errors| ApiError::BadRequest(validation_message(&errors)))?;

    if state.schools().find_by_emis(&payload.emis_number).await.is_some() {
        return Err(ApiError::Conflict(
            "An account with this EMIS Number already exists.".to_string(),
        ));
    }

    let hashed_password = security::hash_password(&payload.password)
        .map_err(|e| ApiError::internal(e, "Failed to hash password"))?;

    let school = state
        .schools()
        .create(CreateSchool {
            id: &Uuid::new_v4().to_string(),
            school_name: &payload.school_name,
            emis_number: &payload.emis_number,
            hashed_password,
            created_at: now_utc(),
        })
        .await?;

    tracing::info!(school_id = %school.id, emis_number = %school.emis_number, "School registered");

    Ok((StatusCode::CREATED, Json(token_response(&state, &school)?)))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<SchoolLogin>,
) -> Result<Json<TokenResponse>, ApiError> {
    payload.validate().map_err(|errors| ApiError::BadRequest(validation_message(&errors)))?;

    let school = state
        .schools()
        .find_by_emis(&payload.emis_number)
        .await
        .ok_or(ApiError::Unauthorized(INVALID_LOGIN))?;

    let verified = security::verify_password(&payload.password, &school.hashed_password)
        .map_err(|_| ApiError::Unauthorized(INVALID_LOGIN))?;

    if !verified {
        return Err(ApiError::Unauthorized(INVALID_LOGIN));
    }

    Ok(Json(token_response(&state, &school)?))
}

async fn me(CurrentSchool(school): CurrentSchool) -> Json<SchoolResponse> {
    Json(SchoolResponse::from_record(&school))
}

fn token_response(state: &AppState, school: &SchoolRecord) -> Result<TokenResponse, ApiError> {
    let token = security::create_access_token(&school.id, state.settings(), None)
        .map_err(|e| ApiError::internal(e, "Failed to create access token"))?;

    Ok(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
        school: SchoolResponse::from_record(school),
    })
}
