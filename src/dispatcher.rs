use crate::{
    codec::{Codec, DecodeError},
    error::ApplicationError,
    service::{
        DefinitionError, MethodInfo, MethodNotFound, RequestState, Service, ServiceDefinition,
        ServiceFactory,
    },
    status::{RpcState, RpcStatus},
};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, error};

/// What the caller sees in place of the real error when a method fails
/// unexpectedly.
pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";

/// Runs the decode → invoke → check → encode cycle for the methods of `S`.
pub struct Dispatcher<S> {
    definition: Arc<ServiceDefinition<S>>,
}

impl<S: Service> Dispatcher<S> {
    pub fn new() -> Result<Self, DefinitionError> {
        Ok(Self::with_definition(Arc::new(S::definition()?)))
    }

    pub fn with_definition(definition: Arc<ServiceDefinition<S>>) -> Self {
        Self { definition }
    }

    pub fn definition(&self) -> &Arc<ServiceDefinition<S>> {
        &self.definition
    }

    /// Calls `method_name` on `instance` with the encoded request `body` and
    /// returns the encoded response.
    ///
    /// Handler errors that downcast to [`ApplicationError`] are passed on as
    /// such; every other error, panics included, is
    /// [`DispatchError::Unexpected`]. A response of the wrong type or with
    /// unset required fields is [`DispatchError::BadResponse`].
    pub fn invoke(
        &self,
        instance: &S,
        method_name: &str,
        codec: &dyn Codec,
        body: &[u8],
    ) -> Result<Vec<u8>, DispatchError> {
        let method = self.definition.resolve(method_name)?;
        let request = codec
            .decode(body, method.request_type())
            .map_err(DispatchError::BadRequest)?;

        let handler = method.handler();
        let response = match panic::catch_unwind(AssertUnwindSafe(|| handler(instance, request))) {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                return Err(match err.downcast::<ApplicationError>() {
                    Ok(application_error) => DispatchError::Application(application_error),
                    Err(err) => DispatchError::Unexpected(err),
                })
            }
            Err(payload) => {
                return Err(DispatchError::Unexpected(anyhow::anyhow!(
                    "method {method_name} panicked: {}",
                    panic_message(payload.as_ref())
                )))
            }
        };

        if response.message_type() != method.response_type() {
            return Err(DispatchError::BadResponse(format!(
                "method {method_name} returned a {} instead of a {}",
                response.message_type().name(),
                method.response_type().name()
            )));
        }
        response.check_initialized().map_err(|err| {
            DispatchError::BadResponse(format!("method {method_name} returned an invalid response: {err}"))
        })?;
        codec.encode(&response).map_err(|err| {
            DispatchError::BadResponse(format!("method {method_name} returned an unencodable response: {err}"))
        })
    }

    /// Like [`invoke`](Self::invoke), but never fails: errors are encoded as
    /// [`RpcStatus`] envelopes with the same codec.
    pub fn dispatch(
        &self,
        instance: &S,
        method_name: &str,
        codec: &dyn Codec,
        body: &[u8],
    ) -> Reply {
        let service = self.definition.name();
        match self.invoke(instance, method_name, codec, body) {
            Ok(body) => {
                debug!(service, method = method_name, "request served");
                Reply {
                    state: RpcState::Ok,
                    body,
                }
            }
            Err(err) => {
                match &err {
                    DispatchError::Unexpected(cause) => {
                        error!(service, method = method_name, "unexpected error: {cause:#}")
                    }
                    DispatchError::BadResponse(reason) => {
                        error!(service, method = method_name, "(BUG in remote method) {reason}")
                    }
                    _ => debug!(service, method = method_name, "request failed: {err}"),
                }
                Reply::error(codec, &err.to_status())
            }
        }
    }
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            definition: Arc::clone(&self.definition),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// The outcome of a dispatch, ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub state: RpcState,
    pub body: Vec<u8>,
}

impl Reply {
    pub(crate) fn error(codec: &dyn Codec, status: &RpcStatus) -> Self {
        let body = codec.encode(&status.to_message()).unwrap_or_else(|err| {
            error!("encoding {} status: {err}", status.state);
            Vec::new()
        });
        Self {
            state: status.state,
            body,
        }
    }

    pub fn http_status(&self) -> u16 {
        self.state.http_status()
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    MethodNotFound(#[from] MethodNotFound),

    #[error("error parsing request: {0}")]
    BadRequest(DecodeError),

    #[error(transparent)]
    Application(ApplicationError),

    #[error("unexpected error: {0:#}")]
    Unexpected(anyhow::Error),

    #[error("(BUG in remote method) bad response: {0}")]
    BadResponse(String),
}

impl DispatchError {
    pub fn state(&self) -> RpcState {
        match self {
            DispatchError::MethodNotFound(_) => RpcState::MethodNotFoundError,
            DispatchError::BadRequest(_) => RpcState::RequestError,
            DispatchError::Application(_) => RpcState::ApplicationError,
            DispatchError::Unexpected(_) => RpcState::ServerError,
            DispatchError::BadResponse(_) => RpcState::BadResponseError,
        }
    }

    /// The envelope sent to the caller. Unexpected errors are reduced to
    /// [`INTERNAL_SERVER_ERROR`].
    pub fn to_status(&self) -> RpcStatus {
        let state = self.state();
        match self {
            DispatchError::Application(err) => RpcStatus {
                state,
                error_message: Some(err.message().to_owned()),
                error_name: err.error_name().map(str::to_owned),
            },
            DispatchError::Unexpected(_) => RpcStatus::new(state, INTERNAL_SERVER_ERROR),
            DispatchError::BadResponse(reason) => RpcStatus::new(state, reason.as_str()),
            _ => RpcStatus::new(state, self.to_string()),
        }
    }
}

/// A service bound to a path: builds an instance per request and dispatches
/// to it.
pub(crate) trait Endpoint: Send + Sync {
    fn service_name(&self) -> &str;

    fn methods(&self) -> Vec<MethodInfo>;

    fn handle(
        &self,
        method_name: &str,
        codec: &dyn Codec,
        body: &[u8],
        state: &RequestState,
    ) -> Reply;
}

pub(crate) struct BoundService<S> {
    dispatcher: Dispatcher<S>,
    factory: ServiceFactory<S>,
}

impl<S: Service> BoundService<S> {
    pub(crate) fn new(dispatcher: Dispatcher<S>, factory: ServiceFactory<S>) -> Self {
        Self {
            dispatcher,
            factory,
        }
    }
}

impl<S: Service> Endpoint for BoundService<S> {
    fn service_name(&self) -> &str {
        self.dispatcher.definition().name()
    }

    fn methods(&self) -> Vec<MethodInfo> {
        self.dispatcher.definition().methods()
    }

    fn handle(
        &self,
        method_name: &str,
        codec: &dyn Codec,
        body: &[u8],
        state: &RequestState,
    ) -> Reply {
        let mut instance = self.factory.create();
        instance.initialize_request_state(state);
        self.dispatcher.dispatch(&instance, method_name, codec, body)
    }
}
