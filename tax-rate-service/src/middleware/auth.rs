use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{Permission, Role};
use crate::startup::AppState;

/// Require a valid bearer token on every request it wraps.
///
/// Verified claims are stored in the request extensions as an [`AuthUser`].
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
        })?;

    let claims = state.jwt.verify(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        e
    })?;

    // Add to tracing span for observability
    tracing::Span::current().record("user_id", tracing::field::display(claims.sub));

    req.extensions_mut().insert(AuthUser {
        id: claims.sub,
        role: claims.role,
        email: claims.email,
    });

    Ok(next.run(req).await)
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
    pub email: Option<String>,
}

impl AuthUser {
    pub fn require(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.permits(permission) {
            return Ok(());
        }
        tracing::warn!(
            user_id = %self.id,
            role = self.role.as_str(),
            permission = %permission,
            "Permission denied"
        );
        Err(AppError::Forbidden(anyhow::anyhow!(
            "Forbidden - Insufficient permissions"
        )))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().cloned().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth claims missing from request extensions"
            ))
        })
    }
}

/// An [`AuthUser`] holding `tax:write`.
///
/// Placed ahead of `Path` and `Json` so a caller without the permission is
/// refused before the request body is read.
#[derive(Debug, Clone)]
pub struct TaxWriter(pub AuthUser);

#[async_trait]
impl<S> FromRequestParts<S> for TaxWriter
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        user.require(Permission::TaxWrite)?;
        Ok(TaxWriter(user))
    }
}
