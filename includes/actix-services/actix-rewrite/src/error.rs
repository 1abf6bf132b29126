//! Error and Result module

use actix_web::ResponseError;
use derive_more::{Display, Error, From};

/// Errors which occur when rewriting Requests
#[derive(Debug, Display, From, Error)]
#[non_exhaustive]
pub enum Error {
    #[display("Internal Io Error")]
    IoError(std::io::Error),

    #[display("Invalid rewrite configuration")]
    ParseError(url_rewrite::error::ParseError),

    #[display("Rewrite engine encountered an error")]
    RewriteError(url_rewrite::error::EngineError),

    #[display("Rewrite returned invalid status code")]
    InvalidStatus(actix_http::error::InvalidStatusCode),

    #[display("Rewrite generated an invalid uri")]
    InvalidUri(actix_http::uri::InvalidUri),

    #[display("Rewrite generated invalid uri parts")]
    InvalidUriParts(actix_http::uri::InvalidUriParts),
}

impl ResponseError for Error {
    /// Returns `500 Internal Server Error`.
    fn status_code(&self) -> actix_web::http::StatusCode {
        actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
    }
}
