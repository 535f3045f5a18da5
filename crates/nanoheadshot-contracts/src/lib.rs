pub mod dataurl;
pub mod events;
pub mod session;
pub mod styles;
