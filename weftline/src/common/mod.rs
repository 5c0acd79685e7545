//! Generic, protocol-agnostic building blocks shared by the connection
//! layer: cancellation, timeouts, and panic catching.
pub mod cancel;
mod panic;
mod timeout;

pub use cancel::{Canceller, CancellerDropper, Waiter};
pub use panic::{CatchPanicError, CatchPanicService};
pub use timeout::{Timeout, TimeoutError, TimeoutService};
