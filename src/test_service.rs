//! A small service shared by the unit tests.

use crate::{
    error::ApplicationError,
    message::{Message, MessageType},
    service::{DefinitionError, RemoteMethod, RequestState, Service, ServiceDefinition},
    types::FieldType,
};
use std::sync::{Arc, Mutex, OnceLock};

pub(crate) fn optional_message_type() -> Arc<MessageType> {
    static TYPE: OnceLock<Arc<MessageType>> = OnceLock::new();
    Arc::clone(TYPE.get_or_init(|| {
        MessageType::builder("OptionalMessage")
            .optional("string_value", FieldType::String)
            .optional("integer_value", FieldType::Integer)
            .optional("float_value", FieldType::Float)
            .optional("boolean_value", FieldType::Boolean)
            .build()
            .unwrap()
    }))
}

pub(crate) fn nested_message_type() -> Arc<MessageType> {
    static TYPE: OnceLock<Arc<MessageType>> = OnceLock::new();
    Arc::clone(TYPE.get_or_init(|| {
        MessageType::builder("NestedMessage")
            .required("a_value", FieldType::String)
            .build()
            .unwrap()
    }))
}

pub(crate) struct TestService {
    message: String,
    seen: Arc<Mutex<Vec<RequestState>>>,
}

impl TestService {
    pub(crate) fn new(message: &str) -> Self {
        Self::recording(message, Arc::default())
    }

    /// Pushes the state of every request it serves into `seen`.
    pub(crate) fn recording(message: &str, seen: Arc<Mutex<Vec<RequestState>>>) -> Self {
        Self {
            message: message.to_owned(),
            seen,
        }
    }

    pub(crate) fn message(&self) -> &str {
        &self.message
    }

    fn optional_message(&self, mut request: Message) -> anyhow::Result<Message> {
        if let Some(value) = request.get_as::<String>("string_value")? {
            request.set("string_value", format!("+{value}"))?;
        }
        Ok(request)
    }

    fn init_parameter(&self, _request: Message) -> anyhow::Result<Message> {
        Ok(Message::new(&optional_message_type()).with("string_value", self.message.as_str())?)
    }

    fn nested_message(&self, mut request: Message) -> anyhow::Result<Message> {
        let value = request.get_as::<String>("a_value")?.unwrap_or_default();
        request.set("a_value", format!("+{value}"))?;
        Ok(request)
    }
}

impl Default for TestService {
    fn default() -> Self {
        Self::new("uninitialized")
    }
}

impl Service for TestService {
    fn definition() -> Result<ServiceDefinition<Self>, DefinitionError> {
        let optional = optional_message_type();
        let nested = nested_message_type();
        ServiceDefinition::builder("TestService")
            .method(
                RemoteMethod::builder("optional_message", Self::optional_message)
                    .request_type(&optional),
            )
            .method(
                RemoteMethod::builder("init_parameter", Self::init_parameter)
                    .response_type(&optional),
            )
            .method(
                RemoteMethod::builder("nested_message", Self::nested_message)
                    .request_type(&nested),
            )
            .method(RemoteMethod::builder("raise_application_error", |_, _| {
                Err(ApplicationError::named("This is an application error", "ERROR_NAME").into())
            }))
            .method(RemoteMethod::builder("raise_unexpected_error", |_, _| {
                Err(anyhow::anyhow!("Unexpected error"))
            }))
            .method(RemoteMethod::builder("raise_rpc_error", |_, _| {
                panic!("Uncaught network error")
            }))
            .method(
                RemoteMethod::builder("return_bad_message", |_, _| {
                    Ok(Message::new(&nested_message_type()))
                })
                .response_type(&nested),
            )
            .build()
    }

    fn initialize_request_state(&mut self, state: &RequestState) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(state.clone());
        }
    }
}
