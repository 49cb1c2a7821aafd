use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Transport failure or non-success HTTP status.
    #[error("network error: {0}")]
    Network(String),

    /// The token endpoint answered without a usable token.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A per-device operation was attempted without a device serial number.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The response lacks a field the client relies on.
    #[error("unexpected response shape: {0}")]
    DataShape(String),

    /// The service answered with `success: false`.
    #[error("service rejected request ({code}): {message}")]
    Remote { code: String, message: String },

    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("unable to format output")]
    Format,
}

impl Error {
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    fn status(&self) -> Status {
        match self {
            Error::Authentication(_) => Status::Forbidden,
            Error::Precondition(_) => Status::Conflict,
            Error::Validation { .. } => Status::UnprocessableEntity,
            Error::Network(_) | Error::DataShape(_) | Error::Remote { .. } => Status::BadGateway,
            Error::Format => Status::InternalServerError,
        }
    }
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        let error = format!(
            "<html><body><h3>{}</h3><code>{}</code></body></html>",
            status, self
        );
        Response::build()
            .status(status)
            .sized_body(error.len(), Cursor::new(error))
            .header(ContentType::new("text", "html"))
            .ok()
    }
}
