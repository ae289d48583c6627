pub mod account;
pub mod app;
pub mod auth;
pub mod metrics;
pub mod post;
pub mod schedule;
