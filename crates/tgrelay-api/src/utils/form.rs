//! Form extraction shared by the small POST endpoints
//!
//! Browsers post `multipart/form-data`; scripts often send
//! `application/x-www-form-urlencoded`. Both land in the same field map.

use crate::error::HttpAppError;
use axum::{
    extract::{FromRequest, Multipart, Request},
    http::header,
    Form,
};
use bytes::Bytes;
use std::collections::HashMap;
use tgrelay_core::AppError;

/// Buffered form fields keyed by name. Later duplicates replace earlier ones.
#[derive(Debug, Default)]
pub struct FormFields {
    fields: HashMap<String, Bytes>,
}

impl FormFields {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|value| std::str::from_utf8(value).ok())
    }

    /// Non-empty text field, or `InvalidInput` naming the missing field.
    pub fn require_text(&self, name: &str) -> Result<&str, AppError> {
        self.text(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::InvalidInput(format!("Missing {} parameter", name)))
    }

    pub fn require_usize(&self, name: &str) -> Result<usize, AppError> {
        self.require_text(name)?
            .parse::<usize>()
            .map_err(|_| AppError::InvalidInput(format!("{} must be a non-negative integer", name)))
    }

    pub fn take_bytes(&mut self, name: &str) -> Option<Bytes> {
        self.fields.remove(name)
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self, HttpAppError> {
        let mut fields = HashMap::new();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_string).unwrap_or_default();
            let value = field.bytes().await?;
            fields.insert(name, value);
        }
        Ok(Self { fields })
    }
}

impl<S> FromRequest<S> for FormFields
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state).await.map_err(|e| {
                HttpAppError(AppError::BadRequest(format!(
                    "Invalid multipart form: {}",
                    e.body_text()
                )))
            })?;
            return Self::from_multipart(multipart).await;
        }

        let Form(values) = Form::<HashMap<String, String>>::from_request(req, state)
            .await
            .map_err(|e| {
                HttpAppError(AppError::BadRequest(format!("Invalid form: {}", e.body_text())))
            })?;

        Ok(Self {
            fields: values
                .into_iter()
                .map(|(name, value)| (name, Bytes::from(value)))
                .collect(),
        })
    }
}
