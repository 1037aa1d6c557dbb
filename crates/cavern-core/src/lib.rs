pub mod events;
pub mod protocol;
pub mod room;
pub mod time;
