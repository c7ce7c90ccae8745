//! Object identity and wrapping.
//!
//! Every object the application obtains from the driver is replaced by a [`Wrapper`] whose
//! address the application holds instead of the real one. This module owns the machinery that
//! keeps that substitution consistent across calls and threads:
//!
//! - [`ObjectPtr`] / [`CaptureId`] - boundary addresses and the stable identities written to a
//!   trace in their place
//! - [`InterfaceKind`] - the wrappable interface types, their identifiers, inheritance and
//!   [`Capabilities`]
//! - [`Wrapper`] - per-view record with its own application reference count
//! - [`ObjectRegistry`] - the sharded identity maps, plus the [`HandleTable`] used for
//!   pool-relative handles
//!
//! # Identity Rules
//!
//! | Situation | Result |
//! |-----------|--------|
//! | same real object, same kind | same wrapper, same id |
//! | same real object, different kind | different wrappers, same id |
//! | unknown interface identifier | no wrapper, raw reference passes through |
//! | wrapper destroyed | entry removed immediately, id value never reused |

mod handles;
mod id;
mod interface;
mod registry;
mod wrapper;

pub use handles::{Handle, HandlePool, HandleRange, HandleTable, ResolvedHandle};
pub use id::{CaptureId, CaptureIdAllocator, ObjectPtr};
pub use interface::{Capabilities, InterfaceId, InterfaceKind};
pub use registry::{ObjectRegistry, RegistryStats, WrapOutcome};
pub use wrapper::{DestroyCallback, Wrapper, WrapperRecord};
