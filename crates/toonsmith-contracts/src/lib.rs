pub mod backends;
pub mod commands;
pub mod credentials;
pub mod events;
pub mod models;
pub mod plan;
pub mod receipts;
pub mod results;
pub mod styles;
