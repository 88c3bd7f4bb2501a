pub mod bus;
pub mod bus_builder;
pub mod event;
pub mod item_events;

pub use bus::*;
pub use bus_builder::*;
pub use event::*;
pub use item_events::*;
