// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
// - 'format/reader.rs' uses mmap to map a trace file into memory

//! # capscope
//!
//! A capture layer for object-oriented graphics device APIs. Every object the application
//! obtains from the driver is replaced by a wrapper that forwards each call to the real
//! implementation and records it, with its arguments, result and newly created objects, into
//! a binary trace.
//!
//! ## Features
//!
//! - **Stable object identity** - every real object gets a process-unique capture id, shared by
//!   all interface views of it and never reused
//! - **Reentrancy-safe interception** - only the outermost call on a thread is resolved,
//!   hooked and encoded; driver callbacks pass straight through
//! - **Reference resolution** - wrapped references inside arrays and nested structures are
//!   rewritten on scratch copies, never in caller memory; pool handles resolve by value
//! - **Lossless trace format** - address-free, length-prefixed records with a reader for
//!   verification and tooling
//! - **Fails soft** - unsupported interfaces pass through raw and sink failures disable
//!   capture; the application only ever sees the driver's own results
//!
//! ## Architecture
//!
//! | Module | Role |
//! |--------|------|
//! | [`object`] | capture ids, interface kinds, wrappers, the sharded identity registry |
//! | [`resolve`] | marshalled arguments and the unwrap/wrap resolver |
//! | [`capture`] | call scopes, scratch memory, dispatch table, hooks, the capture manager |
//! | [`format`] | call ids, encoder, sinks and reader of the binary trace |
//! | [`api`] | typed wrapper facades built from capability traits |
//! | [`settings`] | settings file discovery and parsing |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use capscope::prelude::*;
//!
//! # fn driver() -> DispatchTable { DispatchTable::builder().build() }
//! let manager = CaptureManager::from_settings(CaptureSettings::load()?, driver())?;
//!
//! let device = create_device(&manager, ObjectPtr::NULL, InterfaceKind::Device.iid())
//!     .into_facade::<Device>(&manager)
//!     .into_object();
//! if let Some(device) = device {
//!     device.set_name("main device");
//! }
//!
//! manager.finalize()?;
//! # Ok::<(), capscope::Error>(())
//! ```
//!
//! Reading a trace back:
//!
//! ```rust,no_run
//! use capscope::format::TraceReader;
//!
//! let reader = TraceReader::open("capture.cpsc")?;
//! for record in reader.records() {
//!     println!("{} on #{} -> {}", record.call.name(), record.object, record.status);
//! }
//! # Ok::<(), capscope::Error>(())
//! ```

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// ```rust,no_run
/// use capscope::prelude::*;
///
/// let registry = ObjectRegistry::new();
/// let wrapper = registry
///     .wrap(ObjectPtr::new(0x1000), &InterfaceKind::Fence.iid())?
///     .wrapper;
/// assert_eq!(registry.unwrap_ptr(wrapper.ptr()), ObjectPtr::new(0x1000));
/// # Ok::<(), capscope::Error>(())
/// ```
pub mod prelude;

/// Typed wrapper facades and capability traits.
pub mod api;

/// Call interception: the capture manager, call scopes, dispatch and hooks.
pub mod capture;

/// The binary trace format: call ids, encoder, sinks and reader.
pub mod format;

/// Object identity: capture ids, interface kinds, wrappers and the registry.
pub mod object;

/// Argument values and the reference resolver.
pub mod resolve;

/// Settings file discovery and capture settings.
pub mod settings;

/// `capscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `capscope` Error type
///
/// Errors of capture-side operations. They never reach the intercepted application.
///
/// ```rust,no_run
/// use capscope::{settings::CaptureSettings, Error};
///
/// match CaptureSettings::load() {
///     Ok(settings) => println!("capture enabled: {}", settings.capture_enabled),
///     Err(Error::Settings(message)) => eprintln!("bad setting: {message}"),
///     Err(e) => eprintln!("Error: {e}"),
/// }
/// ```
pub use error::Error;
