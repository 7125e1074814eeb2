pub mod extract;
pub mod info;
pub mod list;
pub mod validate;

pub use extract::run as extract;
pub use info::run as info;
pub use list::run as list;
pub use validate::run as validate;
