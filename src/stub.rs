use crate::{
    error::RpcError,
    message::Message,
    net::transport::Transport,
    service::{DefinitionError, MethodInfo, Service},
    types::Value,
};
use std::{collections::BTreeMap, fmt, marker::PhantomData, sync::Arc};
use tracing::debug;

/// Client-side proxy for service `S`.
///
/// The stub only knows the signatures of `S`, never its handlers; calls are
/// checked against those signatures before anything is sent.
pub struct Stub<S> {
    service_name: String,
    methods: BTreeMap<String, MethodInfo>,
    transport: Arc<dyn Transport>,
    service: PhantomData<fn() -> S>,
}

impl<S: Service> Stub<S> {
    pub fn new<T: Transport + 'static>(transport: T) -> Result<Self, DefinitionError> {
        Self::with_shared(Arc::new(transport))
    }

    /// Lets several stubs share one transport.
    pub fn with_shared(transport: Arc<dyn Transport>) -> Result<Self, DefinitionError> {
        let definition = S::definition()?;
        let methods = definition
            .methods()
            .into_iter()
            .map(|info| (info.name.clone(), info))
            .collect();
        Ok(Self {
            service_name: definition.name().to_owned(),
            methods,
            transport,
            service: PhantomData,
        })
    }
}

impl<S> Stub<S> {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn declares(&self, method_name: &str) -> bool {
        self.methods.contains_key(method_name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodInfo> {
        self.methods.values()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn method(&self, method_name: &str) -> Result<&MethodInfo, RpcError> {
        self.methods
            .get(method_name)
            .ok_or_else(|| RpcError::MethodNotFound(method_name.to_owned()))
    }

    /// An empty request of the type `method_name` expects.
    pub fn new_request(&self, method_name: &str) -> Result<Message, RpcError> {
        Ok(Message::new(&self.method(method_name)?.request_type))
    }

    pub fn call(&self, method_name: &str, request: Message) -> Result<Message, RpcError> {
        let method = self.method(method_name)?;
        if *request.message_type() != method.request_type {
            return Err(RpcError::WrongRequestType {
                method: method_name.to_owned(),
                expected: method.request_type.name().to_owned(),
                actual: request.message_type().name().to_owned(),
            });
        }

        let codec = self.transport.codec();
        let encoded = codec.encode(&request)?;
        debug!(method = method_name, "calling remote method");
        let response = self.transport.send(method_name, encoded)?;
        Ok(codec.decode(&response, &method.response_type)?)
    }

    /// Builds the request from `(field, value)` pairs, then [`call`](Self::call)s.
    pub fn call_with<I, V>(&self, method_name: &str, fields: I) -> Result<Message, RpcError>
    where
        I: IntoIterator<Item = (&'static str, V)>,
        V: Into<Value>,
    {
        let mut request = self.new_request(method_name)?;
        for (field, value) in fields {
            request.set(field, value)?;
        }
        self.call(method_name, request)
    }
}

impl<S> fmt::Debug for Stub<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Stub")
            .field("service_name", &self.service_name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
