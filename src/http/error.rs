//! The JSON error envelope every façade endpoint shares (`spec.md` §4.9):
//! `{code, hint?, detail?}` plus the matching HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// A small subset of the Taler error-code space actually returned by this
/// gateway's endpoints. `spec.md` names the codes by symbol but not by
/// number; the numeric values below are a local, internally-consistent
/// assignment (not a promise of byte-for-byte interop with any particular
/// upstream registry), recorded as an Open Question resolution in
/// `DESIGN.md`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TalerErrorCode {
    GenericParameterMissing,
    GenericHttpHeadersMalformed,
    GenericCurrencyMismatch,
    GenericJsonInvalid,
    GenericUnauthorized,
    GenericInternalInvariant,
    BankTransferRequestUidReused,
    BankDuplicateReservePub,
    BankUnallowedTargetType,
}

impl TalerErrorCode {
    pub fn code(self) -> i32 {
        match self {
            TalerErrorCode::GenericParameterMissing => 1082,
            TalerErrorCode::GenericHttpHeadersMalformed => 1083,
            TalerErrorCode::GenericCurrencyMismatch => 1102,
            TalerErrorCode::GenericJsonInvalid => 1080,
            TalerErrorCode::GenericUnauthorized => 1101,
            TalerErrorCode::GenericInternalInvariant => 1090,
            TalerErrorCode::BankTransferRequestUidReused => 5103,
            TalerErrorCode::BankDuplicateReservePub => 5104,
            TalerErrorCode::BankUnallowedTargetType => 5105,
        }
    }

    pub fn default_status(self) -> StatusCode {
        match self {
            TalerErrorCode::GenericParameterMissing => StatusCode::UNAUTHORIZED,
            TalerErrorCode::GenericHttpHeadersMalformed => StatusCode::BAD_REQUEST,
            TalerErrorCode::GenericCurrencyMismatch => StatusCode::BAD_REQUEST,
            TalerErrorCode::GenericJsonInvalid => StatusCode::BAD_REQUEST,
            TalerErrorCode::GenericUnauthorized => StatusCode::UNAUTHORIZED,
            TalerErrorCode::GenericInternalInvariant => StatusCode::INTERNAL_SERVER_ERROR,
            TalerErrorCode::BankTransferRequestUidReused => StatusCode::CONFLICT,
            TalerErrorCode::BankDuplicateReservePub => StatusCode::CONFLICT,
            TalerErrorCode::BankUnallowedTargetType => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// The façade's single error type: every handler returns `Result<T,
/// ApiError>`. `spec.md` §7: the client body that produced an error is
/// never logged at `info`, only `debug`.
#[derive(Debug)]
pub struct ApiError {
    pub code: TalerErrorCode,
    pub status: StatusCode,
    pub hint: Option<String>,
    pub detail: Option<String>,
}

impl ApiError {
    pub fn new(code: TalerErrorCode) -> ApiError {
        ApiError { code, status: code.default_status(), hint: None, detail: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> ApiError {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> ApiError {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> ApiError {
        self.status = status;
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::debug!(code = self.code.code(), hint = ?self.hint, detail = ?self.detail, "returning API error");
        (self.status, Json(ErrorEnvelope { code: self.code.code(), hint: self.hint, detail: self.detail })).into_response()
    }
}

impl From<crate::store::StoreError> for ApiError {
    fn from(err: crate::store::StoreError) -> ApiError {
        ApiError::new(TalerErrorCode::GenericInternalInvariant).with_detail(err.to_string())
    }
}
