//! Response construction.
//!
//! # Responsibilities
//! - Plain-text status responses
//! - Permanent redirects to the HTTPS listener
//! - Streamed static file responses with a guessed content type
//! - Turning parsed CGI output into an HTTP response

use std::path::Path;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::fastcgi::CgiResponse;

pub fn text(status: StatusCode, body: impl Into<String>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body.into(),
    )
        .into_response()
}

/// `https://{domain}[:{port}]{path_and_query}`; the port is omitted when 443.
pub fn https_location(domain: &str, https_port: u16, path_and_query: &str) -> String {
    if https_port == 443 {
        format!("https://{domain}{path_and_query}")
    } else {
        format!("https://{domain}:{https_port}{path_and_query}")
    }
}

pub fn permanent_redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
            response.headers_mut().insert(header::LOCATION, value);
            response
        }
        Err(_) => text(StatusCode::BAD_REQUEST, "Bad Request"),
    }
}

/// Stream `file` as the body; `len` becomes `Content-Length`.
pub fn static_file(path: &Path, file: File, len: u64) -> Response {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    response
}

pub fn from_cgi(cgi: CgiResponse) -> Response {
    let mut response = Response::new(Body::from(cgi.body));
    *response.status_mut() = cgi.status;
    let headers = response.headers_mut();
    for (name, value) in cgi.headers {
        headers.append(name, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fastcgi::parse_response;

    #[test]
    fn location_omits_default_port() {
        assert_eq!(https_location("a.test", 443, "/x?y=1"), "https://a.test/x?y=1");
        assert_eq!(https_location("a.test", 3453, "/"), "https://a.test:3453/");
    }

    #[test]
    fn redirect_is_permanent() {
        let response = permanent_redirect("https://a.test/");
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "https://a.test/");
    }

    async fn open(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> (std::path::PathBuf, File) {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        let file = File::open(&path).await.unwrap();
        (path, file)
    }

    #[tokio::test]
    async fn static_content_type_is_guessed() {
        let dir = tempfile::TempDir::new().unwrap();
        let (path, file) = open(&dir, "style.css", b"body{}").await;
        let css = static_file(&path, file, 6);
        assert_eq!(css.headers()[header::CONTENT_TYPE], "text/css");

        let (path, file) = open(&dir, "blob.zzzunknown", b"").await;
        let unknown = static_file(&path, file, 0);
        assert_eq!(unknown.headers()[header::CONTENT_TYPE], "application/octet-stream");
    }

    #[tokio::test]
    async fn static_body_is_streamed_with_length() {
        let dir = tempfile::TempDir::new().unwrap();
        let contents = vec![b'z'; 200_000];
        let (path, file) = open(&dir, "big.bin", &contents).await;

        let response = static_file(&path, file, contents.len() as u64);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "200000");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.len(), contents.len());
    }

    #[test]
    fn cgi_headers_are_appended() {
        let response = from_cgi(parse_response(
            b"Status: 201 Created\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2\r\n\r\n{}",
        ));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get_all(header::SET_COOKIE).iter().count(), 2);
    }
}
