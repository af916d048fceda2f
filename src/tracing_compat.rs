//! Logging facade.
//!
//! The crate logs through these re-exports. With the `tracing` feature
//! (default) they forward to the [`tracing`] macros; without it they
//! compile to nothing, keeping call sites unchanged.

#[cfg(feature = "tracing")]
pub use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing"))]
#[macro_export]
#[doc(hidden)]
macro_rules! __tracing_disabled {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub use crate::__tracing_disabled as trace;

#[cfg(not(feature = "tracing"))]
pub use crate::__tracing_disabled as debug;

#[cfg(not(feature = "tracing"))]
pub use crate::__tracing_disabled as info;

#[cfg(not(feature = "tracing"))]
pub use crate::__tracing_disabled as warn;

#[cfg(not(feature = "tracing"))]
pub use crate::__tracing_disabled as error;
