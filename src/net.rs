//! HTTP plumbing: the request/response shapes the mapping works with, the
//! blocking hyper client and server, and the client-side transport.

pub mod client;
pub mod server;
pub mod transport;

use std::{io, net::SocketAddr, time::Duration};
use thiserror::Error;

/// Content type of the empty bodies that accompany HTTP-level rejections.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// An incoming HTTP request, detached from the server that read it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    /// The `content-length` header as sent, if any.
    pub content_length: Option<usize>,
    pub headers: Vec<(String, String)>,
    pub remote_addr: Option<SocketAddr>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// A well-formed POST, as a client of this crate would send it.
    pub fn post(path: impl Into<String>, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        Self {
            method: String::from("POST"),
            path: path.into(),
            content_type: Some(content_type.to_owned()),
            content_length: Some(body.len()),
            headers: vec![(String::from("content-type"), content_type.to_owned())],
            remote_addr: None,
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: HTML_CONTENT_TYPE.to_owned(),
            body: Vec::new(),
        }
    }
}

/// The request never produced an HTTP reply.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connecting to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("HTTP exchange failed: {0}")]
    Http(#[from] hyper::Error),

    #[error("building HTTP request: {0}")]
    Request(#[from] http::Error),

    #[error("starting I/O runtime: {0}")]
    Runtime(#[source] io::Error),
}
