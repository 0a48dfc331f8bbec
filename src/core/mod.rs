pub mod analysis;
pub mod assistant;
pub mod backend;
pub mod camera;
pub mod config;
pub mod errors;
pub mod models;
pub mod overlay;
pub mod products;
pub mod progress;
pub mod session;
pub mod text;
