pub mod events;
pub mod models;
pub mod requests;
pub mod runs;
pub mod styles;
