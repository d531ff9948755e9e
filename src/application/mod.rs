pub mod auth;
pub mod controller;
pub mod recorder;
pub mod sync;
