pub mod alerts;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod explorer;
pub mod listener;
pub mod registry;
