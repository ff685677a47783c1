//! Routing HTTP requests to services.
//!
//! A request for `<path>.<method>` goes to the service registered at
//! `<path>`; everything that is not a well-formed RPC POST is turned away
//! with a bare HTTP status before any service code runs.

use crate::{
    dispatcher::{BoundService, Dispatcher, Endpoint},
    error::ConfigurationError,
    net::{HttpRequest, HttpResponse},
    protocol::Protocols,
    service::{MethodInfo, RequestState, Service, ServiceFactory},
};
use std::{fmt, sync::Arc};
use tracing::{debug, warn};

pub struct ServiceMapping {
    services: Vec<(String, Arc<dyn Endpoint>)>,
    protocols: Protocols,
}

impl ServiceMapping {
    /// An empty mapping speaking the default JSON protocols.
    pub fn new() -> Self {
        Self::with_protocols(Protocols::json())
    }

    pub fn with_protocols(protocols: Protocols) -> Self {
        Self {
            services: Vec::new(),
            protocols,
        }
    }

    pub fn protocols(&self) -> &Protocols {
        &self.protocols
    }

    /// Binds `S` at `path`; every request builds its instance with `factory`.
    ///
    /// The same service type may be registered at several paths.
    pub fn register<S: Service>(
        &mut self,
        path: &str,
        factory: ServiceFactory<S>,
    ) -> Result<&mut Self, ConfigurationError> {
        if !is_valid_path(path) {
            return Err(ConfigurationError::InvalidPath(path.to_owned()));
        }
        if self.services.iter().any(|(existing, _)| existing == path) {
            return Err(ConfigurationError::DuplicatePath(path.to_owned()));
        }
        let endpoint: Arc<dyn Endpoint> =
            Arc::new(BoundService::new(Dispatcher::<S>::new()?, factory));
        debug!(path, service = endpoint.service_name(), "service registered");
        self.services.push((path.to_owned(), endpoint));
        Ok(self)
    }

    pub fn register_default<S: Service + Default>(
        &mut self,
        path: &str,
    ) -> Result<&mut Self, ConfigurationError> {
        self.register(path, ServiceFactory::<S>::default())
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|(path, _)| path.as_str())
    }

    /// Methods of the service bound at `path`.
    pub fn methods(&self, path: &str) -> Option<Vec<MethodInfo>> {
        self.services
            .iter()
            .find(|(existing, _)| existing == path)
            .map(|(_, endpoint)| endpoint.methods())
    }

    pub fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let Some((service_path, method_name, endpoint)) = self.route(&request.path) else {
            debug!(path = %request.path, "no service at path");
            return HttpResponse::empty(404);
        };
        if !request.method.eq_ignore_ascii_case("POST") {
            debug!(method = %request.method, "only POST is accepted");
            return HttpResponse::empty(405);
        }
        let Some(content_type) = request.content_type.as_deref() else {
            debug!("request has no content type");
            return HttpResponse::empty(400);
        };
        let Some(protocol) = self.protocols.lookup_by_content_type(content_type) else {
            debug!(content_type, "unsupported content type");
            return HttpResponse::empty(415);
        };
        if request
            .content_length
            .is_some_and(|length| length != request.body.len())
        {
            warn!(
                declared = ?request.content_length,
                actual = request.body.len(),
                "content length does not match body"
            );
            return HttpResponse::empty(400);
        }

        let state = RequestState {
            http_method: request.method.clone(),
            service_path: service_path.to_owned(),
            remote_addr: request.remote_addr,
            headers: request.headers.clone(),
        };
        let reply = endpoint.handle(method_name, protocol.codec().as_ref(), &request.body, &state);
        HttpResponse {
            status: reply.http_status(),
            content_type: protocol.default_content_type().to_owned(),
            body: reply.body,
        }
    }

    /// Splits `<path>.<method>` at the last dot and finds the service.
    fn route<'a>(&'a self, request_path: &'a str) -> Option<(&'a str, &'a str, &'a dyn Endpoint)> {
        let (service_path, method_name) = request_path.rsplit_once('.')?;
        let (_, endpoint) = self
            .services
            .iter()
            .find(|(path, _)| path == service_path)?;
        Some((service_path, method_name, endpoint.as_ref()))
    }
}

impl Default for ServiceMapping {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceMapping {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ServiceMapping")
            .field(
                "services",
                &self
                    .services
                    .iter()
                    .map(|(path, endpoint)| (path, endpoint.service_name()))
                    .collect::<Vec<_>>(),
            )
            .field("protocols", &self.protocols)
            .finish()
    }
}

fn is_valid_path(path: &str) -> bool {
    path.starts_with('/')
        && path.len() > 1
        && !path.ends_with('/')
        && !path
            .chars()
            .any(|c| c == '.' || c == '?' || c == '#' || c.is_whitespace())
}
