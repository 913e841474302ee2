//! FastCGI name-value pairs and their mapping onto an HTTP request.
//!
//! # Responsibilities
//! - Decode the PARAMS stream (1- or 4-byte length prefixes)
//! - Build an `http::Request` from CGI-style variables
//! - Derive the remote endpoint from `REMOTE_ADDR`/`REMOTE_PORT`

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Method, Request, Uri, Version};
use bytes::{BufMut, BytesMut};

use crate::gateway::GatewayError;
use crate::http::request::RemoteEndpoint;

/// Append one name-value pair in FastCGI encoding.
pub fn encode_pair(dst: &mut BytesMut, name: &[u8], value: &[u8]) {
    put_length(dst, name.len());
    put_length(dst, value.len());
    dst.extend_from_slice(name);
    dst.extend_from_slice(value);
}

fn put_length(dst: &mut BytesMut, len: usize) {
    if len < 0x80 {
        dst.put_u8(len as u8);
    } else {
        dst.put_u32(len as u32 | 0x8000_0000);
    }
}

fn take_length(buf: &mut &[u8]) -> Result<usize, GatewayError> {
    let first = *buf
        .first()
        .ok_or_else(|| GatewayError::Protocol("truncated name-value length".into()))?;
    if first & 0x80 == 0 {
        *buf = &buf[1..];
        return Ok(first as usize);
    }
    if buf.len() < 4 {
        return Err(GatewayError::Protocol("truncated name-value length".into()));
    }
    let len = u32::from_be_bytes([buf[0] & 0x7f, buf[1], buf[2], buf[3]]) as usize;
    *buf = &buf[4..];
    Ok(len)
}

fn take_bytes<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8], GatewayError> {
    if buf.len() < len {
        return Err(GatewayError::Protocol("truncated name-value data".into()));
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

/// Decode a complete PARAMS (or GET_VALUES) stream.
pub fn decode_pairs(mut buf: &[u8]) -> Result<Vec<(String, String)>, GatewayError> {
    let mut pairs = Vec::new();
    while !buf.is_empty() {
        let name_len = take_length(&mut buf)?;
        let value_len = take_length(&mut buf)?;
        let name = take_bytes(&mut buf, name_len)?;
        let value = take_bytes(&mut buf, value_len)?;
        pairs.push((
            String::from_utf8_lossy(name).into_owned(),
            String::from_utf8_lossy(value).into_owned(),
        ));
    }
    Ok(pairs)
}

/// CGI variables of one gateway request.
#[derive(Debug, Clone, Default)]
pub struct GatewayParams {
    vars: HashMap<String, String>,
}

impl GatewayParams {
    pub fn decode(buf: &[u8]) -> Result<Self, GatewayError> {
        Ok(Self {
            vars: decode_pairs(buf)?.into_iter().collect(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// `REMOTE_ADDR:REMOTE_PORT`, bracketing IPv6 literals; the address alone
    /// if the port is missing or not numeric.
    pub fn remote_endpoint(&self) -> RemoteEndpoint {
        let addr = self.get("REMOTE_ADDR").unwrap_or_default();
        match self.get("REMOTE_PORT").and_then(|p| p.parse::<u16>().ok()) {
            Some(port) if addr.contains(':') => RemoteEndpoint::new(format!("[{}]:{}", addr, port)),
            Some(port) => RemoteEndpoint::new(format!("{}:{}", addr, port)),
            None => RemoteEndpoint::new(addr),
        }
    }

    /// Request target: `REQUEST_URI`, or the script name, path info and
    /// query string glued together.
    fn request_target(&self) -> String {
        if let Some(uri) = self.get("REQUEST_URI").filter(|u| !u.is_empty()) {
            return uri.to_string();
        }
        let mut target = format!(
            "{}{}",
            self.get("SCRIPT_NAME").unwrap_or_default(),
            self.get("PATH_INFO").unwrap_or_default()
        );
        if target.is_empty() {
            target.push('/');
        }
        if let Some(query) = self.get("QUERY_STRING").filter(|q| !q.is_empty()) {
            target.push('?');
            target.push_str(query);
        }
        target
    }

    fn version(&self) -> Version {
        match self.get("SERVER_PROTOCOL").unwrap_or_default() {
            "HTTP/0.9" => Version::HTTP_09,
            "HTTP/1.0" => Version::HTTP_10,
            "HTTP/2" | "HTTP/2.0" => Version::HTTP_2,
            "HTTP/3" | "HTTP/3.0" => Version::HTTP_3,
            _ => Version::HTTP_11,
        }
    }

    /// Build the request the router sees, with the remote endpoint attached.
    pub fn into_request(self, body: Body) -> Result<Request<Body>, GatewayError> {
        let method = self
            .get("REQUEST_METHOD")
            .ok_or_else(|| GatewayError::Protocol("missing REQUEST_METHOD".into()))?;
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| GatewayError::Protocol(format!("bad REQUEST_METHOD: {e}")))?;

        let uri: Uri = self
            .request_target()
            .parse()
            .map_err(|e| GatewayError::Protocol(format!("bad request target: {e}")))?;

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .version(self.version())
            .extension(self.remote_endpoint());

        for (name, value) in &self.vars {
            let header = match name.as_str() {
                "CONTENT_TYPE" => "content-type".to_string(),
                "CONTENT_LENGTH" => "content-length".to_string(),
                other => match other.strip_prefix("HTTP_") {
                    Some(rest) => rest.to_ascii_lowercase().replace('_', "-"),
                    None => continue,
                },
            };
            if value.is_empty() && header.starts_with("content-") {
                continue;
            }
            let (Ok(header), Ok(value)) = (
                HeaderName::from_bytes(header.as_bytes()),
                HeaderValue::from_str(value),
            ) else {
                tracing::debug!(param = %name, "Skipping unrepresentable header");
                continue;
            };
            builder = builder.header(header, value);
        }

        builder
            .body(body)
            .map_err(|e| GatewayError::Protocol(format!("bad request: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> GatewayParams {
        let mut buf = BytesMut::new();
        for (name, value) in pairs {
            encode_pair(&mut buf, name.as_bytes(), value.as_bytes());
        }
        GatewayParams::decode(&buf).unwrap()
    }

    #[test]
    fn long_values_use_four_byte_lengths() {
        let long = "v".repeat(300);
        let mut buf = BytesMut::new();
        encode_pair(&mut buf, b"SHORT", b"x");
        encode_pair(&mut buf, b"LONG", long.as_bytes());

        assert_eq!(buf[0], 5);
        let pairs = decode_pairs(&buf).unwrap();
        assert_eq!(pairs[0], ("SHORT".to_string(), "x".to_string()));
        assert_eq!(pairs[1].1.len(), 300);
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let mut buf = BytesMut::new();
        encode_pair(&mut buf, b"NAME", b"value");
        assert!(decode_pairs(&buf[..buf.len() - 1]).is_err());
        assert!(decode_pairs(&[0x80, 0]).is_err());
    }

    #[test]
    fn remote_endpoint_forms() {
        let v4 = params(&[("REMOTE_ADDR", "192.0.2.7"), ("REMOTE_PORT", "4000")]);
        assert_eq!(v4.remote_endpoint().as_str(), "192.0.2.7:4000");

        let v6 = params(&[("REMOTE_ADDR", "2001:db8::1"), ("REMOTE_PORT", "443")]);
        assert_eq!(v6.remote_endpoint().as_str(), "[2001:db8::1]:443");

        let no_port = params(&[("REMOTE_ADDR", "192.0.2.7"), ("REMOTE_PORT", "x")]);
        assert_eq!(no_port.remote_endpoint().as_str(), "192.0.2.7");
    }

    #[test]
    fn request_is_built_from_cgi_variables() {
        let p = params(&[
            ("REQUEST_METHOD", "POST"),
            ("REQUEST_URI", "/up/load?x=1"),
            ("SERVER_PROTOCOL", "HTTP/1.0"),
            ("HTTP_HOST", "ingest.example"),
            ("HTTP_USER_AGENT", "curl/8.0"),
            ("HTTP_X_FORWARDED_FOR", "198.51.100.1"),
            ("CONTENT_LENGTH", "5"),
            ("CONTENT_TYPE", ""),
            ("REMOTE_ADDR", "192.0.2.7"),
            ("REMOTE_PORT", "4000"),
        ]);
        let request = p.into_request(Body::empty()).unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.uri().path(), "/up/load");
        assert_eq!(request.uri().query(), Some("x=1"));
        assert_eq!(request.version(), Version::HTTP_10);
        assert_eq!(request.headers()["host"], "ingest.example");
        assert_eq!(request.headers()["user-agent"], "curl/8.0");
        assert_eq!(request.headers()["x-forwarded-for"], "198.51.100.1");
        assert_eq!(request.headers()["content-length"], "5");
        assert!(request.headers().get("content-type").is_none());
        assert_eq!(
            request.extensions().get::<RemoteEndpoint>().unwrap().as_str(),
            "192.0.2.7:4000"
        );
    }

    #[test]
    fn target_falls_back_to_script_and_path_info() {
        let p = params(&[
            ("REQUEST_METHOD", "GET"),
            ("SCRIPT_NAME", "/app"),
            ("PATH_INFO", "/a/b"),
            ("QUERY_STRING", "q=2"),
        ]);
        let request = p.into_request(Body::empty()).unwrap();
        assert_eq!(request.uri().path(), "/app/a/b");
        assert_eq!(request.uri().query(), Some("q=2"));
    }

    #[test]
    fn missing_method_is_rejected() {
        let p = params(&[("REQUEST_URI", "/x")]);
        assert!(p.into_request(Body::empty()).is_err());
    }
}
