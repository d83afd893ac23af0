pub mod auth;
pub mod bootstrap;
pub mod commands;
pub mod focus_flow;
pub mod metrics;
pub mod timer;
