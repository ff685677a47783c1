use super::{
    client::{Fetch, FetchReply, HyperFetch, Target},
    NetworkError,
};
use crate::{
    codec::{Codec, JsonCodec},
    config::TransportConfig,
    error::RpcError,
    protocol::normalize_content_type,
    status::RpcStatus,
};
use hyper::StatusCode;
use std::{fmt, sync::Arc};
use tracing::{debug, warn};

/// Carries encoded requests to a remote service and brings back encoded
/// responses or classified errors.
pub trait Transport: Send + Sync {
    /// The codec requests must be encoded with.
    fn codec(&self) -> &dyn Codec;

    fn send(&self, method_name: &str, encoded_request: Vec<u8>) -> Result<Vec<u8>, RpcError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn codec(&self) -> &dyn Codec {
        (**self).codec()
    }

    fn send(&self, method_name: &str, encoded_request: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        (**self).send(method_name, encoded_request)
    }
}

/// POSTs each request to `<service_url>.<method>`.
pub struct HttpTransport {
    service_url: String,
    codec: Arc<dyn Codec>,
    fetch: Box<dyn Fetch>,
}

impl HttpTransport {
    pub fn new(
        service_url: &str,
        codec: Arc<dyn Codec>,
        config: &TransportConfig,
    ) -> Result<Self, NetworkError> {
        let fetch = HyperFetch::new(config)?;
        Self::with_fetch(service_url, codec, Box::new(fetch))
    }

    /// JSON over HTTP with the default configuration.
    pub fn json(service_url: &str) -> Result<Self, NetworkError> {
        Self::new(service_url, Arc::new(JsonCodec), &TransportConfig::default())
    }

    /// Fails with [`NetworkError::InvalidUrl`] unless `service_url` is an
    /// `http://` URL with a host.
    pub fn with_fetch(
        service_url: &str,
        codec: Arc<dyn Codec>,
        fetch: Box<dyn Fetch>,
    ) -> Result<Self, NetworkError> {
        let service_url = service_url.trim_end_matches('/');
        Target::parse(service_url)?;
        Ok(Self {
            service_url: service_url.to_owned(),
            codec,
            fetch,
        })
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    pub fn method_url(&self, method_name: &str) -> String {
        format!("{}.{method_name}", self.service_url)
    }

    /// Error replies in our own content type carry an [`RpcStatus`]; anything
    /// else is reported by its HTTP status alone.
    fn classify(&self, reply: FetchReply) -> RpcError {
        let own_content_type = normalize_content_type(self.codec.content_type());
        let speaks_codec = reply
            .content_type
            .as_deref()
            .is_some_and(|content_type| normalize_content_type(content_type) == own_content_type);
        if speaks_codec {
            let status = self
                .codec
                .decode(&reply.body, &RpcStatus::message_type())
                .ok()
                .and_then(|message| RpcStatus::from_message(&message).ok());
            if let Some(status) = status {
                return status.into_error();
            }
        }
        let reason = StatusCode::from_u16(reply.status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("Unknown");
        RpcError::Server(format!("HTTP Error {}: {reason}", reply.status))
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("service_url", &self.service_url)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl Transport for HttpTransport {
    fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    fn send(&self, method_name: &str, encoded_request: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        let url = self.method_url(method_name);
        let reply = self
            .fetch
            .post(&url, self.codec.content_type(), encoded_request)
            .map_err(|err| {
                warn!(url = %url, "request failed: {err}");
                err
            })?;
        if reply.status == 200 {
            return Ok(reply.body);
        }
        debug!(url = %url, status = reply.status, "error reply");
        Err(self.classify(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ApplicationError, status::RpcState};
    use rstest::rstest;
    use std::{sync::Mutex, time::Duration};

    /// Answers every post with the same reply and remembers what was sent.
    struct CannedFetch {
        reply: Result<FetchReply, fn() -> NetworkError>,
        sent: Arc<Mutex<Vec<(String, String, Vec<u8>)>>>,
    }

    impl Fetch for CannedFetch {
        fn post(
            &self,
            url: &str,
            content_type: &str,
            body: Vec<u8>,
        ) -> Result<FetchReply, NetworkError> {
            self.sent
                .lock()
                .unwrap()
                .push((url.to_owned(), content_type.to_owned(), body));
            self.reply.clone().map_err(|make_error| make_error())
        }
    }

    fn transport(reply: FetchReply) -> (HttpTransport, Arc<Mutex<Vec<(String, String, Vec<u8>)>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let fetch = CannedFetch {
            reply: Ok(reply),
            sent: Arc::clone(&sent),
        };
        let transport = HttpTransport::with_fetch(
            "http://localhost:8080/my/service/",
            Arc::new(JsonCodec),
            Box::new(fetch),
        )
        .unwrap();
        (transport, sent)
    }

    fn json_reply(status: u16, body: &str) -> FetchReply {
        FetchReply {
            status,
            content_type: Some("application/json".into()),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn posts_to_the_method_url() {
        let (transport, sent) = transport(json_reply(200, r#"{"a": 1}"#));
        let response = transport.send("my_method", b"{}".to_vec()).unwrap();
        assert_eq!(response, br#"{"a": 1}"#);
        assert_eq!(
            *sent.lock().unwrap(),
            vec![(
                "http://localhost:8080/my/service.my_method".to_owned(),
                "application/json".to_owned(),
                b"{}".to_vec()
            )]
        );
    }

    #[rstest]
    #[case::request(400, RpcState::RequestError)]
    #[case::not_found(400, RpcState::MethodNotFoundError)]
    #[case::server(500, RpcState::ServerError)]
    #[case::bad_response(500, RpcState::BadResponseError)]
    fn error_envelopes_are_classified(#[case] status: u16, #[case] state: RpcState) {
        let body = format!(r#"{{"state": "{state}", "error_message": "an error"}}"#);
        let (transport, _) = transport(json_reply(status, &body));
        let err = transport.send("my_method", Vec::new()).unwrap_err();
        let message = match (state, err) {
            (RpcState::RequestError, RpcError::Request(message))
            | (RpcState::MethodNotFoundError, RpcError::MethodNotFound(message))
            | (RpcState::ServerError, RpcError::Server(message))
            | (RpcState::BadResponseError, RpcError::BadResponse(message)) => message,
            (state, err) => panic!("{state} classified as {err:?}"),
        };
        assert_eq!(message, "an error");
    }

    #[test]
    fn application_errors_keep_their_name() {
        let (transport, _) = transport(json_reply(
            400,
            r#"{"state": "APPLICATION_ERROR", "error_message": "an error", "error_name": "blam"}"#,
        ));
        match transport.send("my_method", Vec::new()).unwrap_err() {
            RpcError::Application(err) => {
                assert_eq!(err, ApplicationError::named("an error", "blam"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[rstest]
    #[case::html_body(FetchReply {
        status: 500,
        content_type: Some("text/html".into()),
        body: b"<html>oops</html>".to_vec(),
    })]
    #[case::unparsable_json(json_reply(500, "a fatal error occurred"))]
    #[case::not_a_status(json_reply(500, r#"{"state": "NOT_A_STATE"}"#))]
    #[case::no_content_type(FetchReply { status: 500, content_type: None, body: Vec::new() })]
    fn unreadable_errors_report_the_http_status(#[case] reply: FetchReply) {
        let (transport, _) = transport(reply);
        let err = transport.send("my_method", Vec::new()).unwrap_err();
        assert!(
            matches!(err, RpcError::Server(ref message) if message == "HTTP Error 500: Internal Server Error"),
            "{err:?}"
        );
    }

    #[test]
    fn fetch_failures_are_network_errors() {
        let fetch = CannedFetch {
            reply: Err(|| NetworkError::Timeout(Duration::from_millis(5))),
            sent: Arc::default(),
        };
        let transport =
            HttpTransport::with_fetch("http://localhost:1/s", Arc::new(JsonCodec), Box::new(fetch))
                .unwrap();
        assert!(matches!(
            transport.send("m", Vec::new()),
            Err(RpcError::Network(NetworkError::Timeout(_)))
        ));
    }

    #[rstest]
    #[case::not_a_url("not a url")]
    #[case::https("https://localhost/my/service")]
    #[case::no_host("/my/service")]
    fn service_urls_are_checked_up_front(#[case] url: &str) {
        let sent = Arc::default();
        let fetch = CannedFetch {
            reply: Ok(json_reply(200, "{}")),
            sent: Arc::clone(&sent),
        };
        let err = HttpTransport::with_fetch(url, Arc::new(JsonCodec), Box::new(fetch)).unwrap_err();
        assert!(matches!(err, NetworkError::InvalidUrl { .. }), "{err}");
        assert!(matches!(
            HttpTransport::json(url),
            Err(NetworkError::InvalidUrl { .. })
        ));
        assert!(sent.lock().unwrap().is_empty());
    }
}
