//! The status envelope carried in every error reply.

use crate::{
    error::{ApplicationError, RpcError},
    message::{FieldDescriptor, FieldKind, Message, MessageType},
    types::{FieldType, Value},
};
use std::{
    fmt,
    str::FromStr,
    sync::{Arc, OnceLock},
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcState {
    Ok,
    RequestError,
    MethodNotFoundError,
    ApplicationError,
    ServerError,
    BadResponseError,
    NetworkError,
}

impl RpcState {
    const ALL: [RpcState; 7] = [
        RpcState::Ok,
        RpcState::RequestError,
        RpcState::MethodNotFoundError,
        RpcState::ApplicationError,
        RpcState::ServerError,
        RpcState::BadResponseError,
        RpcState::NetworkError,
    ];

    pub fn as_str(self) -> &'static str {
        use RpcState::*;
        match self {
            Ok => "OK",
            RequestError => "REQUEST_ERROR",
            MethodNotFoundError => "METHOD_NOT_FOUND_ERROR",
            ApplicationError => "APPLICATION_ERROR",
            ServerError => "SERVER_ERROR",
            BadResponseError => "BAD_RESPONSE_ERROR",
            NetworkError => "NETWORK_ERROR",
        }
    }

    /// Client-caused failures are 400s, server-side failures 500s.
    pub fn http_status(self) -> u16 {
        use RpcState::*;
        match self {
            Ok => 200,
            RequestError | MethodNotFoundError | ApplicationError => 400,
            ServerError | BadResponseError | NetworkError => 500,
        }
    }
}

impl fmt::Display for RpcState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RpcState {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| InvalidStatus::UnknownState(s.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidStatus {
    #[error("status message has no state")]
    MissingState,

    #[error("unknown RPC state {0:?}")]
    UnknownState(String),

    #[error("status message is not an RpcStatus")]
    WrongType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcStatus {
    pub state: RpcState,
    pub error_message: Option<String>,
    pub error_name: Option<String>,
}

impl RpcStatus {
    pub fn new(state: RpcState, error_message: impl Into<String>) -> Self {
        Self {
            state,
            error_message: Some(error_message.into()),
            error_name: None,
        }
    }

    pub fn message_type() -> Arc<MessageType> {
        static STATUS_TYPE: OnceLock<Arc<MessageType>> = OnceLock::new();
        let status_type = STATUS_TYPE.get_or_init(|| {
            MessageType::from_parts(
                "RpcStatus",
                vec![
                    FieldDescriptor::new("state", 1, FieldType::String, FieldKind::Required),
                    FieldDescriptor::new("error_message", 2, FieldType::String, FieldKind::Optional),
                    FieldDescriptor::new("error_name", 3, FieldType::String, FieldKind::Optional),
                ],
            )
        });
        Arc::clone(status_type)
    }

    pub fn to_message(&self) -> Message {
        let mut message = Message::new(&Self::message_type());
        message.insert_unchecked("state", Value::from(self.state.as_str()));
        if let Some(error_message) = &self.error_message {
            message.insert_unchecked("error_message", Value::String(error_message.clone()));
        }
        if let Some(error_name) = &self.error_name {
            message.insert_unchecked("error_name", Value::String(error_name.clone()));
        }
        message
    }

    pub fn from_message(message: &Message) -> Result<Self, InvalidStatus> {
        if *message.message_type() != Self::message_type() {
            return Err(InvalidStatus::WrongType);
        }
        let text = |field| message.get_as::<String>(field).map_err(|_| InvalidStatus::WrongType);
        let state = text("state")?.ok_or(InvalidStatus::MissingState)?.parse()?;
        Ok(Self {
            state,
            error_message: text("error_message")?,
            error_name: text("error_name")?,
        })
    }

    /// The client-side error this status stands for.
    pub fn into_error(self) -> RpcError {
        let message = self.error_message.unwrap_or_default();
        match self.state {
            RpcState::RequestError => RpcError::Request(message),
            RpcState::MethodNotFoundError => RpcError::MethodNotFound(message),
            RpcState::ApplicationError => RpcError::Application(match self.error_name {
                Some(name) => ApplicationError::named(message, name),
                None => ApplicationError::new(message),
            }),
            RpcState::BadResponseError => RpcError::BadResponse(message),
            RpcState::ServerError | RpcState::NetworkError => RpcError::Server(message),
            RpcState::Ok => RpcError::Server("error reply carried an OK status".to_owned()),
        }
    }
}
