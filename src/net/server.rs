use super::{HttpRequest, HttpResponse};
use crate::{config::ServerConfig, mapping::ServiceMapping, thread::ServerThread};
use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Bytes, Incoming},
    header::{self, HeaderName, HeaderValue},
    server::conn::http1,
    service::service_fn,
    Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use std::{io, net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::{
    net::TcpListener,
    runtime::{self, Runtime},
};
use tracing::{debug, info};

/// A server that can be told to serve exactly one incoming request.
pub trait HandleRequest: Send + 'static {
    /// Blocks until a connection arrives, serves it, and returns.
    fn handle_request(&mut self) -> Result<(), ServerError>;
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("starting I/O runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("binding {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("reading local address: {0}")]
    LocalAddr(#[source] io::Error),

    #[error("accepting connection: {0}")]
    Accept(#[source] io::Error),

    #[error("serving connection: {0}")]
    Http(#[from] hyper::Error),
}

/// Blocking HTTP/1.1 front end for a [`ServiceMapping`].
///
/// Connections are served one at a time and closed after a single
/// request, on the calling thread.
pub struct HttpServer {
    runtime: Runtime,
    listener: TcpListener,
    local_addr: SocketAddr,
    mapping: Arc<ServiceMapping>,
    thread_name: String,
}

impl HttpServer {
    pub fn bind(config: &ServerConfig, mapping: ServiceMapping) -> Result<Self, ServerError> {
        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ServerError::Runtime)?;
        let addr = config.bind_addr;
        let listener = runtime
            .block_on(TcpListener::bind(addr))
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
        info!("HTTP server listening on {local_addr}");
        Ok(Self {
            runtime,
            listener,
            local_addr,
            mapping: Arc::new(mapping),
            thread_name: config.thread_name.clone(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `http://<local addr><path>`
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.local_addr)
    }

    pub fn mapping(&self) -> &ServiceMapping {
        &self.mapping
    }

    /// Hands the server to a not yet started [`ServerThread`] named after
    /// the configured thread name.
    pub fn into_thread(self) -> ServerThread<Self> {
        let name = self.thread_name.clone();
        ServerThread::with_name(self, name)
    }
}

impl HandleRequest for HttpServer {
    fn handle_request(&mut self) -> Result<(), ServerError> {
        let mapping = Arc::clone(&self.mapping);
        let listener = &self.listener;
        self.runtime.block_on(async {
            let (stream, remote_addr) = listener.accept().await.map_err(ServerError::Accept)?;
            debug!(%remote_addr, "accepted connection");

            let service = service_fn(move |request| respond(Arc::clone(&mapping), remote_addr, request));
            let mut builder = http1::Builder::new();
            builder.keep_alive(false);
            builder
                .serve_connection(TokioIo::new(stream), service)
                .await?;
            Ok::<_, ServerError>(())
        })
    }
}

async fn respond(
    mapping: Arc<ServiceMapping>,
    remote_addr: SocketAddr,
    request: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let (parts, body) = request.into_parts();
    let body = body.collect().await?.to_bytes().to_vec();

    let header_value = |name: HeaderName| {
        parts
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    };
    let request = HttpRequest {
        method: parts.method.as_str().to_owned(),
        path: parts.uri.path().to_owned(),
        content_type: header_value(header::CONTENT_TYPE).map(str::to_owned),
        content_length: header_value(header::CONTENT_LENGTH).and_then(|value| value.trim().parse().ok()),
        headers: parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                Some((name.as_str().to_owned(), value.to_str().ok()?.to_owned()))
            })
            .collect(),
        remote_addr: Some(remote_addr),
        body,
    };

    let reply = mapping.handle(&request);
    Ok(into_hyper_response(reply))
}

fn into_hyper_response(reply: HttpResponse) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(reply.body)));
    *response.status_mut() =
        StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if let Ok(content_type) = HeaderValue::from_str(&reply.content_type) {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    response
}
