//! HTTP client utilities for sdtrainer.

pub mod client;
pub mod response;

pub use client::{build_client, HttpClient, HttpConfig, HttpError};
pub use response::parse_json;

pub use reqwest::{multipart, Response};
pub use url::Url;
