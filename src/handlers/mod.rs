pub mod config;
pub mod events;
pub mod users;

pub use self::config::*;
pub use self::events::*;
pub use self::users::*;
