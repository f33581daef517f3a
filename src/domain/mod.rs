pub mod entity;
pub mod models;
pub mod mower_state;
pub mod status;
