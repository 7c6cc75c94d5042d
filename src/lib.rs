mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod memory;
    pub mod postgres;
    pub mod reconcile;
    pub mod schema;
    pub mod store;
}
mod authentication {
    pub mod accounts;
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
}
mod api {
    pub mod attributes;
    pub mod context;
    pub mod recipes;
    pub mod rejection;
    pub mod routes;
    pub mod users;
    pub mod views;
}
mod config;
mod constants;
mod media;

pub use api::*;
pub use authentication::*;
pub use config::*;
pub use constants::*;
pub use database::*;
pub use media::*;
