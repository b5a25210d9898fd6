pub mod bot;
pub mod config;
pub mod models;
pub mod registry;
pub mod sessions;

#[cfg(test)]
pub mod testing;
