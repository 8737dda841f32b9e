/// Key resolver: maps address, routing and organisation hashes to public keys
/// and routing information, and authorises every change to those records.
pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod context;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod hash;
pub mod invite;
pub mod metrics;
pub mod pow;
pub mod redirect;
pub mod repository;
pub mod reservation;
pub mod server;
