//! Tool lookup and argument handling.

pub mod coerce;
pub mod registry;

pub use coerce::coerce_args;
pub use registry::ToolRegistry;
