//! HTML response type

use crate::context::to_locals;
use crate::error::ViewError;
use crate::templates::Templates;
use crate::tracing_macros::trace_error;
use bytes::Bytes;
use http::{header, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use serde::Serialize;

const ERROR_PAGE: &str = "<!DOCTYPE html><html><head><title>Error</title></head>\
    <body><h1>500 Internal Server Error</h1>\
    <p>Template rendering failed</p></body></html>";

/// A rendered view, ready to become an HTML response
///
/// # Example
///
/// ```rust,ignore
/// use mustache_view::{Rendered, Templates};
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct HomeContext {
///     title: String,
/// }
///
/// async fn home(templates: &Templates) -> http::Response<Full<Bytes>> {
///     Rendered::render(templates, "home", &HomeContext {
///         title: "Home".to_string(),
///     })
///     .await
///     .into_response()
/// }
/// ```
#[derive(Debug)]
pub struct Rendered {
    content: Result<String, ViewError>,
    status: StatusCode,
}

impl Rendered {
    /// Render the view `name` with a serializable context
    pub async fn render<T: Serialize + ?Sized>(templates: &Templates, name: &str, data: &T) -> Self {
        let content = match to_locals(data) {
            Ok(locals) => templates.render(name, locals).await,
            Err(err) => Err(err),
        };
        Self::from_result(content)
    }

    /// Wrap the outcome of a render
    pub fn from_result(content: Result<String, ViewError>) -> Self {
        let status = if content.is_ok() {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self { content, status }
    }

    /// Create a response from pre-rendered HTML
    pub fn from_html(html: impl Into<String>) -> Self {
        Self::from_result(Ok(html.into()))
    }

    /// Set the status code used when rendering succeeded
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// The rendered HTML or the render error
    pub fn content(&self) -> Result<&str, &ViewError> {
        self.content.as_deref()
    }

    /// Convert into an HTTP response
    ///
    /// A failed render becomes a generic 500 page; the error is logged, not
    /// sent to the client.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let (status, body) = match self.content {
            Ok(html) => (self.status, html),
            Err(err) => {
                trace_error!(error = %err, "template rendering failed");
                (StatusCode::INTERNAL_SERVER_ERROR, ERROR_PAGE.to_string())
            }
        };

        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        response
    }
}

impl From<Rendered> for Response<Full<Bytes>> {
    fn from(rendered: Rendered) -> Self {
        rendered.into_response()
    }
}
