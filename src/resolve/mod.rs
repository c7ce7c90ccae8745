//! Argument marshalling and reference resolution.
//!
//! [`Value`] and [`Out`] describe call arguments as the intercepting layer sees them;
//! [`Resolver`] rewrites wrapper addresses to real references on the way into the driver and
//! wraps new references on the way out.

mod resolver;
mod value;

pub use resolver::Resolver;
pub use value::{Array, ObjectRef, Out, Struct, Value};
