#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Lazily constructed shared instances that are created at most once, no matter how many
//! threads ask for them at the same time.
//!
//! The package is built in two layers:
//!
//! * [`OnceSlot<T>`] is an owned container that runs an initializer at most once and hands out
//!   `&T` to every caller afterwards. It uses double-checked locking: an atomic `Acquire` load
//!   on the fast path and a guard mutex only while the value does not exist yet.
//! * [`SharedInstanceAccessor<T>`] pairs a slot with its initializer so that access needs no
//!   inputs. Declare one with the [`shared!`] macro to get a `static` single instance.
//!
//! On top of these, [`get_instance()`] exposes the process-wide [`Instance`].
//!
//! # Example
//!
//! ```
//! use lone_instance::{Outcome, get_instance, get_instance_with_outcome};
//!
//! let instance = get_instance();
//! assert_eq!(instance.do_something(), "Doing something.");
//!
//! // The instance already exists, so this call constructs nothing.
//! let (same, outcome) = get_instance_with_outcome();
//! assert_eq!(outcome, Outcome::AlreadyExisted);
//! assert!(std::ptr::eq(instance, same));
//! ```
//!
//! # Custom shared instances
//!
//! ```
//! use std::time::Duration;
//!
//! struct Settings {
//!     timeout: Duration,
//! }
//!
//! lone_instance::shared!(static SETTINGS: Settings = Settings {
//!     timeout: Duration::from_secs(30),
//! });
//!
//! assert_eq!(SETTINGS.get_instance().timeout, Duration::from_secs(30));
//! ```
//!
//! # Logging
//!
//! Construction is reported as an `INFO` event through [`tracing`]. Accesses that find an
//! existing value emit `TRACE` (fast path) or `DEBUG` (lost a race on the slow path) events.
//! These events are diagnostic output, not part of the API contract.

mod instance;
mod once_slot;
mod outcome;
mod shared_instance_accessor;

pub use instance::{Instance, get_instance, get_instance_with_outcome};
pub use once_slot::OnceSlot;
pub use outcome::Outcome;
pub use shared_instance_accessor::SharedInstanceAccessor;
