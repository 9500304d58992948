pub mod api;
pub mod config;
pub mod gc;
pub mod maps;
pub mod ranks;
pub mod session;
pub mod storage;
pub mod submission;
pub mod suggestions;
pub mod validation;
pub mod xp;

mod identity;
pub use identity::{UserIdentity, STEAM_ID_HEADER, USER_ID_HEADER};
