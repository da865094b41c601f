//! Embedded JavaScript engine

pub mod runtime;

pub use runtime::JsRuntime;
