//! The rotation engine: binding model, per-cycle fan-out dispatcher, and
//! the interval scheduler that drives them.

pub mod binding;
pub mod dispatcher;
pub mod scheduler;

pub use binding::{Binding, Platform};
pub use dispatcher::{BindingRoute, Dispatcher, BROKER_ADDRESS_VARIABLE};
pub use scheduler::Scheduler;
