//! Declaring services and their remote methods.
//!
//! A service is a plain Rust type plus a [`ServiceDefinition`] table that
//! maps method names to handlers. The table is built once, validated, and
//! shared by every dispatcher and stub that needs it:
//!
//! ```
//! use remotecall::{Message, MessageType, RemoteMethod, Service, ServiceDefinition, DefinitionError};
//!
//! struct Echo;
//!
//! impl Service for Echo {
//!     fn definition() -> Result<ServiceDefinition<Self>, DefinitionError> {
//!         ServiceDefinition::builder("Echo")
//!             .method(RemoteMethod::builder("ping", |_: &Echo, request: Message| Ok(request)))
//!             .build()
//!     }
//! }
//!
//! let definition = Echo::definition().unwrap();
//! let ping = definition.resolve("ping").unwrap();
//! assert_eq!(*ping.request_type(), MessageType::void());
//! ```

use crate::message::{is_identifier, Message, MessageType, SchemaError};
use serde::Serialize;
use std::{collections::BTreeMap, fmt, net::SocketAddr, sync::Arc};
use thiserror::Error;

pub type Handler<S> = Arc<dyn Fn(&S, Message) -> anyhow::Result<Message> + Send + Sync>;

pub trait Service: Sized + Send + Sync + 'static {
    fn definition() -> Result<ServiceDefinition<Self>, DefinitionError>;

    /// Called on every fresh instance before it handles a request.
    fn initialize_request_state(&mut self, _state: &RequestState) {}
}

/// One named entry of a [`ServiceDefinition`].
pub struct RemoteMethod<S> {
    name: String,
    request_type: Arc<MessageType>,
    response_type: Arc<MessageType>,
    handler: Handler<S>,
}

impl<S> RemoteMethod<S> {
    /// Without further configuration the method takes a `VoidMessage` and
    /// responds with its request type.
    pub fn builder<F>(name: impl Into<String>, handler: F) -> MethodBuilder<S>
    where
        F: Fn(&S, Message) -> anyhow::Result<Message> + Send + Sync + 'static,
    {
        MethodBuilder {
            name: name.into(),
            request_type: None,
            response_type: None,
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request_type(&self) -> &Arc<MessageType> {
        &self.request_type
    }

    pub fn response_type(&self) -> &Arc<MessageType> {
        &self.response_type
    }

    pub fn handler(&self) -> &Handler<S> {
        &self.handler
    }

    pub fn info(&self) -> MethodInfo {
        MethodInfo {
            name: self.name.clone(),
            request_type: Arc::clone(&self.request_type),
            response_type: Arc::clone(&self.response_type),
        }
    }
}

impl<S> Clone for RemoteMethod<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            request_type: Arc::clone(&self.request_type),
            response_type: Arc::clone(&self.response_type),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<S> fmt::Debug for RemoteMethod<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RemoteMethod")
            .field("name", &self.name)
            .field("request_type", &self.request_type.name())
            .field("response_type", &self.response_type.name())
            .finish_non_exhaustive()
    }
}

pub struct MethodBuilder<S> {
    name: String,
    request_type: Option<Arc<MessageType>>,
    response_type: Option<Arc<MessageType>>,
    handler: Handler<S>,
}

impl<S> MethodBuilder<S> {
    pub fn request_type(mut self, request_type: &Arc<MessageType>) -> Self {
        self.request_type = Some(Arc::clone(request_type));
        self
    }

    pub fn response_type(mut self, response_type: &Arc<MessageType>) -> Self {
        self.response_type = Some(Arc::clone(response_type));
        self
    }

    fn build(self) -> RemoteMethod<S> {
        let request_type = self.request_type.unwrap_or_else(MessageType::void);
        let response_type = self
            .response_type
            .unwrap_or_else(|| Arc::clone(&request_type));
        RemoteMethod {
            name: self.name,
            request_type,
            response_type,
            handler: self.handler,
        }
    }
}

/// Name and signature of a remote method, as published to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodInfo {
    pub name: String,
    pub request_type: Arc<MessageType>,
    pub response_type: Arc<MessageType>,
}

/// The validated method table of service `S`.
pub struct ServiceDefinition<S> {
    name: String,
    methods: BTreeMap<String, RemoteMethod<S>>,
}

impl<S> ServiceDefinition<S> {
    pub fn builder(name: impl Into<String>) -> ServiceDefinitionBuilder<S> {
        ServiceDefinitionBuilder {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolve(&self, method_name: &str) -> Result<&RemoteMethod<S>, MethodNotFound> {
        self.methods
            .get(method_name)
            .ok_or_else(|| MethodNotFound(method_name.to_owned()))
    }

    /// Every method, sorted by name.
    pub fn methods(&self) -> Vec<MethodInfo> {
        self.methods.values().map(RemoteMethod::info).collect()
    }
}

impl<S> fmt::Debug for ServiceDefinition<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("name", &self.name)
            .field("methods", &self.methods.values().collect::<Vec<_>>())
            .finish()
    }
}

pub struct ServiceDefinitionBuilder<S> {
    name: String,
    methods: Vec<MethodBuilder<S>>,
}

impl<S> ServiceDefinitionBuilder<S> {
    pub fn method(mut self, method: MethodBuilder<S>) -> Self {
        self.methods.push(method);
        self
    }

    pub fn build(self) -> Result<ServiceDefinition<S>, DefinitionError> {
        let Self { name, methods } = self;
        if !name.split('.').all(is_identifier) {
            return Err(DefinitionError::InvalidServiceName(name));
        }
        let mut table = BTreeMap::new();
        for method in methods {
            let method = method.build();
            if !is_identifier(&method.name) {
                return Err(DefinitionError::InvalidMethodName {
                    service: name,
                    method: method.name,
                });
            }
            if table.contains_key(&method.name) {
                return Err(DefinitionError::DuplicateMethod {
                    service: name,
                    method: method.name,
                });
            }
            table.insert(method.name.clone(), method);
        }
        Ok(ServiceDefinition {
            name,
            methods: table,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized RPC method: {0}")]
pub struct MethodNotFound(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("invalid service name {0:?}")]
    InvalidServiceName(String),

    #[error("service {service}: invalid method name {method:?}")]
    InvalidMethodName { service: String, method: String },

    #[error("service {service}: method {method:?} is defined more than once")]
    DuplicateMethod { service: String, method: String },

    #[error("service {service} declares no method {method:?}")]
    UndeclaredMethod { service: String, method: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Builds a fresh service instance for every request.
pub struct ServiceFactory<S>(Arc<dyn Fn() -> S + Send + Sync>);

impl<S> ServiceFactory<S> {
    pub fn new<F>(constructor: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self(Arc::new(constructor))
    }

    pub fn create(&self) -> S {
        (self.0)()
    }
}

impl<S> Clone for ServiceFactory<S> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<S: Default + 'static> Default for ServiceFactory<S> {
    fn default() -> Self {
        Self::new(S::default)
    }
}

impl<S> fmt::Debug for ServiceFactory<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("ServiceFactory")
    }
}

/// What a service instance may learn about the request it is serving.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestState {
    pub http_method: String,
    pub service_path: String,
    pub remote_addr: Option<SocketAddr>,
    pub headers: Vec<(String, String)>,
}

impl RequestState {
    /// First header with the given name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
