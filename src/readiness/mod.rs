//! Readiness of upstream dependencies.
//!
//! A stream destination must be active before a subscription can address
//! it. The waiter polls its status at a fixed interval, stops on the first
//! state it does not recognize, and gives up after a timeout.

mod waiter;

pub use waiter::ReadinessWaiter;
