pub mod ask;
pub mod health;
pub mod products;
pub mod sessions;
pub mod ws;
