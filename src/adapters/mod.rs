pub mod api;
pub mod debug_file;
pub mod husqvarna;
