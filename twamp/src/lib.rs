pub mod cli;
pub mod config;
pub mod control;
pub mod dscp;
pub mod message;
pub mod padding;
pub mod reflector;
pub mod sender;
pub mod session;
pub mod signal;
