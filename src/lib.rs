pub mod config;
pub mod drivetrain;
pub mod hardware;
pub mod messages;
pub mod runtime;
