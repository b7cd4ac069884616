use crate::error::ApiError;
use curator_client::Request;
use http::HeaderValue;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct KeyCipherError(pub String);

/// One-way credential wrapping, implemented by the embedding layer.
///
/// The contract of every client in this crate is that the raw key never
/// leaves the process: whatever travels on the wire is the wrapped form.
pub trait KeyCipher: Send + Sync {
    fn wrap(&self, raw_key: &str) -> Result<String, KeyCipherError>;
}

/// Credential material for one streaming call.
#[derive(Clone, Copy)]
pub struct StreamAuth<'a> {
    pub cipher: &'a dyn KeyCipher,
    pub api_key: &'a str,
}

impl StreamAuth<'_> {
    pub(crate) fn wrapped(&self) -> Result<String, ApiError> {
        if self.api_key.is_empty() {
            return Err(ApiError::MissingApiKey);
        }
        self.cipher
            .wrap(self.api_key)
            .map_err(|err| ApiError::KeyCipher(err.to_string()))
    }
}

pub(crate) fn add_auth_header(req: &mut Request, wrapped_key: &str) -> Result<(), ApiError> {
    let value = HeaderValue::from_str(&format!("Bearer {wrapped_key}"))
        .map_err(|err| ApiError::KeyCipher(format!("wrapped key is not header-safe: {err}")))?;
    req.headers.insert(http::header::AUTHORIZATION, value);
    Ok(())
}
