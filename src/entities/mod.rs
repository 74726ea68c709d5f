pub mod movie;
pub mod session;
pub mod theater;
pub mod user;
pub mod watchlog;
