//! Deployment module

pub mod args;
pub mod executor;
pub mod fsm;
pub mod health;
pub mod scheduler;
