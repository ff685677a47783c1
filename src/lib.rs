//! Remote procedure calls over HTTP.
//!
//! Services declare typed remote methods ([`ServiceDefinition`]), a
//! [`ServiceMapping`] binds them to URL paths, and clients reach them through
//! a [`Stub`] over a [`Transport`]. Every call ends in either a response
//! message or a classified [`RpcError`].

mod macros;

pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod mapping;
pub mod message;
pub mod net;
pub mod protocol;
pub mod service;
pub mod status;
pub mod stub;
pub mod thread;
pub mod types;

#[cfg(test)]
mod test_service;

pub use codec::{Codec, DecodeError, EncodeError, JsonCodec};
pub use config::{ServerConfig, TransportConfig};
pub use dispatcher::{DispatchError, Dispatcher, Reply};
pub use error::{ApplicationError, ConfigurationError, RpcError};
pub use mapping::ServiceMapping;
pub use message::{FieldKind, Message, MessageType, SchemaError, ValidationError};
pub use net::{
    client::{Fetch, FetchReply, HyperFetch},
    server::{HandleRequest, HttpServer, ServerError},
    transport::{HttpTransport, Transport},
    HttpRequest, HttpResponse, NetworkError,
};
pub use protocol::{ProtocolConfig, Protocols};
pub use service::{
    DefinitionError, MethodInfo, MethodNotFound, RemoteMethod, RequestState, Service,
    ServiceDefinition, ServiceFactory,
};
pub use status::{RpcState, RpcStatus};
pub use stub::Stub;
pub use thread::{ControllerError, NotifyingTransport, ServerControl, ServerState, ServerThread};
pub use types::{
    Decode, Encode, EnumType, EnumTypeBuilder, EnumValue, FieldType, TypeMismatch, Typed, Value,
};
