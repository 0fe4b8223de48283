//! JSON body extractor whose rejections use the service error envelope.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, OptionalFromRequest, Request};
use axum::Json;

use crate::errors::TelemetryError;

// ---

/// Like [`Json`], but a malformed body is a `VALIDATION_ERROR`.
pub struct ValidJson<T>(pub T);

impl From<JsonRejection> for TelemetryError {
    fn from(rejection: JsonRejection) -> Self {
        TelemetryError::Validation(rejection.body_text())
    }
}

impl<S, T> FromRequest<S> for ValidJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = TelemetryError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        // ---
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ValidJson(value))
    }
}

/// An absent body is `None`; a present but malformed one is still rejected.
impl<S, T> OptionalFromRequest<S> for ValidJson<T>
where
    Json<T>: OptionalFromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = TelemetryError;

    async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
        // ---
        let body = <Json<T> as OptionalFromRequest<S>>::from_request(req, state).await?;
        Ok(body.map(|Json(value)| ValidJson(value)))
    }
}
