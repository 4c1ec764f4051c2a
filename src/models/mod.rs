pub mod enums;
pub mod notification;
pub mod patient;
pub mod prescription;
pub mod user;

pub use enums::*;
pub use notification::*;
pub use patient::*;
pub use prescription::*;
pub use user::*;
