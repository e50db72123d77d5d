//! CGI/1.1 mapping: HTTP request → parameters, script stdout → HTTP response parts.

use std::net::SocketAddr;
use std::path::Path;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Version};

use crate::fastcgi::params::CgiParams;

pub const SERVER_SOFTWARE: &str = concat!("TechWebServer/", env!("CARGO_PKG_VERSION"));
const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

/// Request facts needed to build the CGI environment.
#[derive(Debug)]
pub struct ScriptRequest<'a> {
    pub method: &'a Method,
    pub version: Version,
    pub headers: &'a HeaderMap,
    /// Original request target (path and query) as received.
    pub request_uri: &'a str,
    /// Post-rewrite query string.
    pub query_string: &'a str,
    pub script_filename: &'a Path,
    /// Post-rewrite path of the script as seen from the URL space.
    pub script_name: &'a str,
    /// Canonical document root.
    pub document_root: &'a Path,
    pub server_name: &'a str,
    pub server_port: u16,
    /// Resolved client address; the port is the transport peer's.
    pub remote: SocketAddr,
    pub secure: bool,
    pub content_length: usize,
}

/// Derive `SCRIPT_NAME` from the rewritten path and the chosen index file.
pub fn script_name(rewritten_path: &str, index_file: Option<&str>) -> String {
    let mut name = if rewritten_path.starts_with('/') {
        rewritten_path.to_string()
    } else {
        format!("/{rewritten_path}")
    };
    if let Some(index) = index_file {
        if !name.ends_with('/') {
            name.push('/');
        }
        name.push_str(index);
    }
    name
}

/// Build the parameter block for a responder request.
pub fn build_params(request: &ScriptRequest<'_>) -> CgiParams {
    let mut params = CgiParams::new();

    // `keys()` yields each name once; repeated values are joined
    for name in request.headers.keys() {
        // httpoxy
        if name.as_str() == "proxy" {
            continue;
        }
        let joined = request
            .headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        let cgi_name = format!("HTTP_{}", name.as_str().to_ascii_uppercase().replace('-', "_"));
        params.push(cgi_name, joined);
    }

    let content_type = request
        .headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    params.set("GATEWAY_INTERFACE", "CGI/1.1");
    params.set("SERVER_SOFTWARE", SERVER_SOFTWARE);
    params.set("SERVER_PROTOCOL", protocol_name(request.version));
    params.set("SERVER_NAME", request.server_name);
    params.set("SERVER_PORT", request.server_port.to_string());
    params.set("REQUEST_METHOD", request.method.as_str());
    params.set("REQUEST_URI", request.request_uri);
    params.set("REQUEST_SCHEME", if request.secure { "https" } else { "http" });
    params.set("QUERY_STRING", request.query_string);
    params.set("SCRIPT_FILENAME", request.script_filename.to_string_lossy());
    params.set("SCRIPT_NAME", request.script_name);
    params.set("PHP_SELF", request.script_name);
    params.set("DOCUMENT_ROOT", request.document_root.to_string_lossy());
    params.set("REMOTE_ADDR", request.remote.ip().to_string());
    params.set("REMOTE_PORT", request.remote.port().to_string());
    params.set("CONTENT_TYPE", content_type);
    params.set("CONTENT_LENGTH", request.content_length.to_string());
    params.set("REDIRECT_STATUS", "200");
    if request.secure {
        params.set("HTTPS", "on");
    }
    params
}

pub fn protocol_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

/// A script's output split into HTTP response parts.
#[derive(Debug, Clone)]
pub struct CgiResponse {
    pub status: StatusCode,
    /// Headers in emission order, `Status` removed, repeats kept.
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: Vec<u8>,
}

/// Split stdout at the first blank line (CRLF CRLF or LF LF).
pub fn parse_response(stdout: &[u8]) -> CgiResponse {
    let (head, body) = match split_head(stdout) {
        Some((head, body)) => (head, body),
        None => (&[][..], stdout),
    };

    let mut status = StatusCode::OK;
    let mut headers = Vec::new();

    for line in String::from_utf8_lossy(head).lines() {
        let line = line.trim_end_matches('\r');
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());

        if name.eq_ignore_ascii_case("status") {
            status = value
                .split_whitespace()
                .next()
                .and_then(|code| code.parse::<u16>().ok())
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::OK);
            continue;
        }

        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => headers.push((name, value)),
            _ => tracing::debug!(line = %line, "Dropping invalid CGI header"),
        }
    }

    if !headers.iter().any(|(name, _)| *name == axum::http::header::CONTENT_TYPE) {
        headers.push((
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static(DEFAULT_CONTENT_TYPE),
        ));
    }

    CgiResponse {
        status,
        headers,
        body: body.to_vec(),
    }
}

fn split_head(stdout: &[u8]) -> Option<(&[u8], &[u8])> {
    let crlf = find(stdout, b"\r\n\r\n").map(|i| (i, 4));
    let lf = find(stdout, b"\n\n").map(|i| (i, 2));
    let (index, sep) = match (crlf, lf) {
        (Some(a), Some(b)) => if a.0 <= b.0 { a } else { b },
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((&stdout[..index], &stdout[index + sep..]))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
