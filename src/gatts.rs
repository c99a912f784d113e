//! GATT server registration and attribute dispatch.
//!
//! [`GattServer`] turns a scripting runtime's service description into the
//! vendor stack's attribute table. Registration is a walk over services,
//! characteristics, and descriptors in which every step is an asynchronous
//! stack call whose completion event issues the next step. Once registered,
//! peer reads and writes are routed by attribute handle back to stored values
//! and user callbacks.

pub use {consts::*, driver::Phase, handle::*, server::*, stack::*, tables::*};

use gattsbridge_const::{Uuid, UuidError};

mod bridge;
mod consts;
mod dispatch;
mod driver;
mod handle;
mod server;
mod stack;
mod tables;

#[cfg(test)]
mod mock;

/// Malformed service description.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid {what} UUID {key:?}: {source}")]
    InvalidUuid {
        what: &'static str,
        key: String,
        #[source]
        source: UuidError,
    },
    #[error("{what} {key:?} must be an object")]
    NotObject { what: &'static str, key: String },
    #[error("service description must be an object")]
    InvalidDescription,
    #[error("too many services")]
    TooManyServices,
    #[error("service {0} has too many characteristics")]
    TooManyCharacteristics(Uuid),
}

/// Error type returned by the GATT server.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error("no service registered with {0}")]
    UnknownInterface(GattIf),
}

/// Common GATT server result type.
pub type Result<T> = std::result::Result<T, Error>;
