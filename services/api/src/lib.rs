pub mod adapters;
pub mod config;
pub mod error;
pub mod guard;
pub mod stores;
pub mod web;
