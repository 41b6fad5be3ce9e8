//! Bearer-token auth (`spec.md` §4.9): compared constant-time against the
//! configured `nexus-httpd.auth_method`.

use axum::http::HeaderMap;

use crate::config::AuthMethod;

use super::error::{ApiError, TalerErrorCode};

/// `spec.md` §4.9: `none` allows any request; otherwise a missing header is
/// `401 GENERIC_PARAMETER_MISSING`, a header that doesn't parse as `Bearer
/// <token>` is `400 GENERIC_HTTP_HEADERS_MALFORMED`, and a wrong token is
/// `401` (unauthorized).
pub fn check(headers: &HeaderMap, auth: &AuthMethod) -> Result<(), ApiError> {
    let expected = match auth {
        AuthMethod::None => return Ok(()),
        AuthMethod::BearerToken(token) => token,
    };

    let raw = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| ApiError::new(TalerErrorCode::GenericParameterMissing).with_hint("missing Authorization header"))?;

    let raw_str = raw
        .to_str()
        .map_err(|_| ApiError::new(TalerErrorCode::GenericHttpHeadersMalformed).with_hint("Authorization header is not valid UTF-8"))?;

    let token = raw_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::new(TalerErrorCode::GenericHttpHeadersMalformed).with_hint("Authorization header is not of the form 'Bearer <token>'"))?;

    if constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(ApiError::new(TalerErrorCode::GenericUnauthorized).with_hint("bearer token does not match"))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_bearer(token: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
        h
    }

    #[test]
    fn none_mode_allows_missing_header() {
        assert!(check(&HeaderMap::new(), &AuthMethod::None).is_ok());
    }

    #[test]
    fn missing_header_is_401_parameter_missing() {
        let err = check(&HeaderMap::new(), &AuthMethod::BearerToken("secret".to_string())).unwrap_err();
        assert_eq!(err.code, TalerErrorCode::GenericParameterMissing);
    }

    #[test]
    fn malformed_scheme_is_400() {
        let mut h = HeaderMap::new();
        h.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        let err = check(&h, &AuthMethod::BearerToken("secret".to_string())).unwrap_err();
        assert_eq!(err.code, TalerErrorCode::GenericHttpHeadersMalformed);
    }

    #[test]
    fn wrong_token_is_401_unauthorized() {
        let h = headers_with_bearer("wrong");
        let err = check(&h, &AuthMethod::BearerToken("secret".to_string())).unwrap_err();
        assert_eq!(err.code, TalerErrorCode::GenericUnauthorized);
    }

    #[test]
    fn correct_token_is_ok() {
        let h = headers_with_bearer("secret");
        assert!(check(&h, &AuthMethod::BearerToken("secret".to_string())).is_ok());
    }
}
