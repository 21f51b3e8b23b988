//! Minimal HTTP client abstraction shared across crates.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use crate::error::{HttpError, TransportError};

/// HTTP client trait for sending raw HTTP requests.
#[trait_variant::make(Send)]
pub trait HttpClient {
    /// Error type returned by the HTTP client
    type Error: std::error::Error + Display + Send + Sync + 'static;

    /// Send an HTTP request and return the response.
    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>>;
}

#[cfg(feature = "reqwest-client")]
impl HttpClient for reqwest::Client {
    type Error = reqwest::Error;

    async fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> core::result::Result<http::Response<Vec<u8>>, Self::Error> {
        // Convert http::Request to reqwest::Request
        let (parts, body) = request.into_parts();

        let mut req = self.request(parts.method, parts.uri.to_string()).body(body);

        for (name, value) in parts.headers.iter() {
            req = req.header(name.as_str(), value.as_bytes());
        }

        let resp = req.send().await?;

        let mut response = http::Response::new(Vec::new());
        *response.status_mut() = resp.status();
        *response.headers_mut() = resp.headers().clone();
        *response.body_mut() = resp.bytes().await?.to_vec();

        Ok(response)
    }
}

impl<T: HttpClient + Sync> HttpClient for Arc<T> {
    type Error = T::Error;

    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>> + Send
    {
        self.as_ref().send_http(request)
    }
}

impl From<std::convert::Infallible> for TransportError {
    fn from(e: std::convert::Infallible) -> Self {
        match e {}
    }
}

/// Send `request` and turn any non-2xx response into [`TransportError::Http`].
///
/// Returns the response body on success.
pub async fn send_checked<H>(
    client: &H,
    request: http::Request<Vec<u8>>,
) -> Result<bytes::Bytes, TransportError>
where
    H: HttpClient + Sync,
    TransportError: From<H::Error>,
{
    let response = client.send_http(request).await?;
    let status = response.status();
    let body = bytes::Bytes::from(response.into_body());
    if status.is_success() {
        Ok(body)
    } else {
        Err(HttpError {
            status,
            body: (!body.is_empty()).then_some(body),
        }
        .into())
    }
}
