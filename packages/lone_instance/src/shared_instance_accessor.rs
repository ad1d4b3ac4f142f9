use std::fmt;

use crate::{OnceSlot, Outcome};

/// Lazily constructs a single instance of `T` on first access and returns that same instance
/// to every caller afterwards, from any thread.
///
/// The accessor stores its own initializer, so [`get_instance()`][Self::get_instance] takes no
/// inputs. This makes it suitable for `static` items, which is how it is normally used (see
/// [`shared!`][crate::shared]).
///
/// # Example
///
/// ```
/// use lone_instance::SharedInstanceAccessor;
///
/// struct Registry {
///     name: &'static str,
/// }
///
/// static REGISTRY: SharedInstanceAccessor<Registry> =
///     SharedInstanceAccessor::new(|| Registry { name: "primary" });
///
/// let registry = REGISTRY.get_instance();
/// assert_eq!(registry.name, "primary");
///
/// // Every access returns the same instance.
/// assert!(std::ptr::eq(registry, REGISTRY.get_instance()));
/// ```
pub struct SharedInstanceAccessor<T, F = fn() -> T> {
    slot: OnceSlot<T>,
    init: F,
}

impl<T, F> SharedInstanceAccessor<T, F> {
    /// Creates an accessor that will call `init` (at most once) on first access.
    #[must_use]
    pub const fn new(init: F) -> Self {
        Self {
            slot: OnceSlot::new(),
            init,
        }
    }

    /// Returns the instance if it has already been constructed. Never constructs it.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.slot.get()
    }

    /// Whether the instance has already been constructed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.slot.is_initialized()
    }
}

impl<T, F> SharedInstanceAccessor<T, F>
where
    F: Fn() -> T,
{
    /// Returns the shared instance, constructing it if this is the first access.
    ///
    /// This never fails. Concurrent first accesses block until one of them has constructed the
    /// instance, after which all of them return it. Later accesses do not take any lock.
    pub fn get_instance(&self) -> &T {
        self.slot.get_or_init(&self.init)
    }

    /// Same as [`get_instance()`][Self::get_instance] but also reports whether this call is
    /// the one that constructed the instance.
    pub fn get_instance_with_outcome(&self) -> (&T, Outcome) {
        self.slot.get_or_init_with_outcome(&self.init)
    }
}

impl<T, F> fmt::Debug for SharedInstanceAccessor<T, F>
where
    T: fmt::Debug,
{
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedInstanceAccessor")
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

/// Declares `static` variables that each hold one lazily constructed shared instance.
///
/// The expression is evaluated on first access to the variable (not at compile time), and at
/// most once for the life of the process.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
///
/// lone_instance::shared! {
///     static DEFAULTS: HashMap<&'static str, u32> = HashMap::from([("retries", 3)]);
///     pub(crate) static GREETING: String = format!("hello from {}", "lone_instance");
/// }
///
/// assert_eq!(DEFAULTS.get_instance()["retries"], 3);
/// assert_eq!(GREETING.get_instance(), "hello from lone_instance");
/// ```
#[macro_export]
macro_rules! shared {
    () => {};

    ($(#[$attr:meta])* $vis:vis static $NAME:ident: $t:ty = $e:expr; $($rest:tt)*) => (
        $crate::shared!($(#[$attr])* $vis static $NAME: $t = $e);
        $crate::shared!($($rest)*);
    );

    ($(#[$attr:meta])* $vis:vis static $NAME:ident: $t:ty = $e:expr) => {
        $(#[$attr])* $vis static $NAME: $crate::SharedInstanceAccessor<$t> =
            $crate::SharedInstanceAccessor::new(|| $e);
    };
}
