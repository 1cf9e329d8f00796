//! `permsync-events` — service-registry notifications and their transport.
//!
//! The registry feed pushes one [`InstanceEvent`] per (service, version,
//! instance) that comes up; workers subscribe through an [`EventBus`].

pub mod bus;
pub mod in_memory_bus;
pub mod instance;

pub use bus::{EventBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use instance::{InstanceEvent, ServiceScoped};
