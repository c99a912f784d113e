//! GATT server bridge for scripting runtimes.
//!
//! Registers a declarative service description with an event-driven vendor
//! BLE stack, such as ESP32 Bluedroid, and routes peer attribute reads and
//! writes back to script values and callbacks. The vendor stack is reached
//! through the [`gatts::Stack`] trait and the runtime through
//! [`script::EventTarget`] and [`script::Value`].

pub use gatts::{GattServer, SharedServer};

/// Returns the name of a type as a string literal.
macro_rules! name_of {
    ($t:ty) => {{
        type _T = $t; // Allows $t to be recognized as a type for refactoring
        stringify!($t)
    }};
}
pub(crate) use name_of;

pub mod gatts;
pub mod le;
pub mod script;
