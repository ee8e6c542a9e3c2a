//! Handler builders and associated traits.
//!
//! Each builder validates user input, turns it into the matching config
//! struct, and implements [`HandlerBuilderTrait`] so callers can obtain a
//! boxed [`EventHandler`] without naming the concrete type.

use std::io;

use thiserror::Error;

use crate::handler::EventHandler;

mod builder_macros;
pub mod http_builder;
pub mod tcp_builder;
pub mod udp_builder;

pub use http_builder::HttpSenderBuilder;
pub use tcp_builder::TcpHandlerBuilder;
pub use udp_builder::UdpHandlerBuilder;

/// Errors that may occur while building a handler.
#[derive(Debug, Error)]
pub enum HandlerBuildError {
    /// Invalid user supplied configuration.
    #[error("invalid handler configuration: {0}")]
    InvalidConfig(String),
    /// Underlying I/O error whilst creating the handler.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Trait implemented by all handler builders.
pub trait HandlerBuilderTrait {
    type Handler: EventHandler + 'static;

    /// Build the concrete handler.
    fn build_inner(&self) -> Result<Self::Handler, HandlerBuildError>;

    /// Build the handler behind the adapter-facing trait object.
    fn build(&self) -> Result<Box<dyn EventHandler>, HandlerBuildError> {
        Ok(Box::new(self.build_inner()?))
    }
}
