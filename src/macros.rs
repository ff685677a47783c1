/// Declares a named client proxy with one method per remote method.
///
/// ```
/// # use remotecall::*;
/// # struct Greeter;
/// # impl Service for Greeter {
/// #     fn definition() -> Result<ServiceDefinition<Self>, DefinitionError> {
/// #         ServiceDefinition::builder("Greeter")
/// #             .method(RemoteMethod::builder("hello", |_: &Greeter, m: Message| Ok(m)))
/// #             .build()
/// #     }
/// # }
/// remote_stub! {
///     /// Talks to a remote `Greeter`.
///     pub struct GreeterStub for Greeter { hello }
/// }
///
/// let transport = HttpTransport::json("http://localhost:8080/greeter").unwrap();
/// let greeter = GreeterStub::new(transport).unwrap();
/// assert!(greeter.stub().declares("hello"));
/// ```
///
/// Construction fails with [`DefinitionError::UndeclaredMethod`] when a
/// listed method is not part of the service.
///
/// [`DefinitionError::UndeclaredMethod`]: crate::DefinitionError::UndeclaredMethod
#[macro_export]
macro_rules! remote_stub {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident for $service:ty { $($method:ident),* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug)]
        $vis struct $name($crate::Stub<$service>);

        impl $name {
            pub fn new<T>(transport: T) -> ::std::result::Result<Self, $crate::DefinitionError>
            where
                T: $crate::Transport + 'static,
            {
                Self::from_stub($crate::Stub::new(transport)?)
            }

            pub fn with_shared(
                transport: ::std::sync::Arc<dyn $crate::Transport>,
            ) -> ::std::result::Result<Self, $crate::DefinitionError> {
                Self::from_stub($crate::Stub::with_shared(transport)?)
            }

            fn from_stub(
                stub: $crate::Stub<$service>,
            ) -> ::std::result::Result<Self, $crate::DefinitionError> {
                $(
                    if !stub.declares(::std::stringify!($method)) {
                        return ::std::result::Result::Err($crate::DefinitionError::UndeclaredMethod {
                            service: stub.service_name().to_owned(),
                            method: ::std::stringify!($method).to_owned(),
                        });
                    }
                )*
                ::std::result::Result::Ok(Self(stub))
            }

            pub fn stub(&self) -> &$crate::Stub<$service> {
                &self.0
            }

            $(
                pub fn $method(
                    &self,
                    request: $crate::Message,
                ) -> ::std::result::Result<$crate::Message, $crate::RpcError> {
                    self.0.call(::std::stringify!($method), request)
                }
            )*
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::{
        net::transport::Transport,
        service::{DefinitionError, Service},
        test_service::{optional_message_type, TestService},
        Codec, JsonCodec, RpcError,
    };

    /// Answers every request with an empty object.
    struct Blank;

    impl Transport for Blank {
        fn codec(&self) -> &dyn Codec {
            &JsonCodec
        }

        fn send(&self, _method_name: &str, _encoded_request: Vec<u8>) -> Result<Vec<u8>, RpcError> {
            Ok(b"{}".to_vec())
        }
    }

    remote_stub! {
        struct TestStub for TestService { optional_message, init_parameter }
    }

    remote_stub! {
        struct BrokenStub for TestService { does_not_exist }
    }

    #[test]
    fn generated_methods_call_through_the_stub() {
        let stub = TestStub::new(Blank).unwrap();
        let response = stub
            .optional_message(stub.stub().new_request("optional_message").unwrap())
            .unwrap();
        assert_eq!(*response.message_type(), optional_message_type());
        assert!(stub.init_parameter(stub.stub().new_request("init_parameter").unwrap()).is_ok());
    }

    #[test]
    fn proxies_print_their_stub() {
        let stub = TestStub::new(Blank).unwrap();
        let printed = format!("{stub:?}");
        assert!(printed.starts_with("TestStub(Stub {"), "{printed}");
        assert!(printed.contains("optional_message"), "{printed}");
    }

    #[test]
    fn listed_methods_must_exist() {
        let err = BrokenStub::new(Blank).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::UndeclaredMethod {
                service: TestService::definition().unwrap().name().to_owned(),
                method: "does_not_exist".into(),
            }
        );
    }
}
