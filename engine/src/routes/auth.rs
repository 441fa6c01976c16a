use actix_identity::Identity;
use actix_web::{HttpMessage, HttpRequest, HttpResponse, get, post, web};
use sqlx::PgPool;

use crate::password::{
    AuthError, Credentials, NewUserDetails, create_user, validate_credentials,
};
use crate::store;
use crate::time::TimeSource;

use super::{APIError, get_user_id};

#[tracing::instrument(
    skip(new_user_details, pool, time_source),
    fields(username = tracing::field::Empty)
)]
#[post("/register")]
pub async fn register(
    request: HttpRequest,
    new_user_details: web::Json<NewUserDetails>,
    pool: web::Data<PgPool>,
    time_source: web::Data<TimeSource>,
) -> Result<HttpResponse, APIError> {
    tracing::Span::current()
        .record("username", tracing::field::display(&new_user_details.username));

    let user_id = create_user(new_user_details.0, &pool, &time_source).await?;
    let user = store::read_user(&pool, &user_id).await?;

    Identity::login(&request.extensions(), user_id.to_string())
        .map_err(|e| APIError::UnexpectedError(e.into()))?;

    let response = payloads::responses::AuthResponse { user: user.into() };
    Ok(HttpResponse::Ok().json(response))
}

#[tracing::instrument(
    skip(credentials, pool),
    fields(username = tracing::field::Empty, user_id = tracing::field::Empty),
)]
#[post("/login")]
pub async fn login(
    request: HttpRequest,
    credentials: web::Json<Credentials>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    tracing::Span::current()
        .record("username", tracing::field::display(&credentials.username));
    let user_id = match validate_credentials(credentials.0, &pool).await {
        Ok(user_id) => user_id,
        Err(e @ AuthError::InvalidCredentials(_)) => {
            return Err(APIError::AuthError(e.into()));
        }
        Err(e @ AuthError::UnexpectedError(_)) => {
            return Err(APIError::UnexpectedError(e.into()));
        }
    };
    tracing::Span::current().record("user_id", tracing::field::display(&user_id));

    Identity::login(&request.extensions(), user_id.to_string())
        .map_err(|e| APIError::UnexpectedError(e.into()))?;

    let user = store::read_user(&pool, &user_id).await?;
    let response = payloads::responses::AuthResponse { user: user.into() };
    Ok(HttpResponse::Ok().json(response))
}

#[tracing::instrument(skip(user))]
#[post("/logout")]
pub async fn logout(user: Identity) -> Result<HttpResponse, APIError> {
    let _ = get_user_id(&user); // records user_id in the span, if any
    user.logout();
    Ok(HttpResponse::Ok().finish())
}

#[tracing::instrument(skip(user, pool))]
#[get("/me")]
pub async fn me(
    user: Identity,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, APIError> {
    let user_id = get_user_id(&user)?;
    let user = store::read_user(&pool, &user_id).await?;
    Ok(HttpResponse::Ok().json(payloads::responses::UserProfile::from(user)))
}
