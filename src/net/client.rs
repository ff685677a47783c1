use super::NetworkError;
use crate::config::TransportConfig;
use http_body_util::{BodyExt, Full};
use hyper::{body::Bytes, client::conn::http1, header, Request, Uri};
use hyper_util::rt::TokioIo;
use std::{fmt, time::Duration};
use tokio::{
    net::TcpStream,
    runtime::{self, Runtime},
};
use tracing::debug;

/// Posts one body to one URL and hands back whatever came back.
///
/// This is the seam tests use to stand in for the network.
pub trait Fetch: Send + Sync {
    fn post(&self, url: &str, content_type: &str, body: Vec<u8>)
        -> Result<FetchReply, NetworkError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Blocking HTTP/1.1 client over a private current-thread runtime.
///
/// Opens a fresh connection per request. Must not be used from inside
/// another tokio runtime.
pub struct HyperFetch {
    runtime: Runtime,
    timeout: Duration,
}

impl HyperFetch {
    pub fn new(config: &TransportConfig) -> Result<Self, NetworkError> {
        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(NetworkError::Runtime)?;
        Ok(Self {
            runtime,
            timeout: config.timeout(),
        })
    }
}

impl fmt::Debug for HyperFetch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HyperFetch")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Fetch for HyperFetch {
    fn post(
        &self,
        url: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<FetchReply, NetworkError> {
        let target = Target::parse(url)?;
        let timeout = self.timeout;
        let reply = self.runtime.block_on(async {
            tokio::time::timeout(timeout, exchange(&target, content_type, body))
                .await
                .map_err(|_| NetworkError::Timeout(timeout))?
        })?;
        debug!(url, status = reply.status, "fetched");
        Ok(reply)
    }
}

/// Where an `http://` URL points: the socket address to dial, the `Host`
/// header and the request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Target {
    pub(crate) address: String,
    pub(crate) host: String,
    pub(crate) path: String,
}

impl Target {
    pub(crate) fn parse(url: &str) -> Result<Self, NetworkError> {
        let invalid = |reason: String| NetworkError::InvalidUrl {
            url: url.to_owned(),
            reason,
        };
        let uri: Uri = url.parse().map_err(|err: http::uri::InvalidUri| invalid(err.to_string()))?;
        if uri.scheme_str() != Some("http") {
            return Err(invalid(String::from("only http URLs are supported")));
        }
        let authority = uri
            .authority()
            .ok_or_else(|| invalid(String::from("missing host")))?;
        Ok(Self {
            address: format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80)),
            host: authority.as_str().to_owned(),
            path: uri
                .path_and_query()
                .map_or_else(|| String::from("/"), |path| path.as_str().to_owned()),
        })
    }
}

async fn exchange(
    target: &Target,
    content_type: &str,
    body: Vec<u8>,
) -> Result<FetchReply, NetworkError> {
    let stream = TcpStream::connect(&target.address)
        .await
        .map_err(|source| NetworkError::Connect {
            address: target.address.clone(),
            source,
        })?;
    let (mut sender, connection) = http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            debug!("client connection ended with error: {err}");
        }
    });

    let request = Request::post(target.path.as_str())
        .header(header::HOST, target.host.as_str())
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, body.len())
        .body(Full::new(Bytes::from(body)))?;
    let response = sender.send_request(request).await?;

    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = response.into_body().collect().await?.to_bytes().to_vec();
    Ok(FetchReply {
        status,
        content_type,
        body,
    })
}
