pub mod health;
pub mod play;
pub mod portals;
pub mod status;
