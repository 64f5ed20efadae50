pub mod constants;
pub mod lobby;
pub mod types;
pub mod weapons;
