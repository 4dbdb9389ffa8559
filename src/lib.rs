pub mod candidate;
pub mod config;
pub mod db;
pub mod environment;
pub mod errors;
pub mod io;
pub mod media;
pub mod normalization;
pub mod orphans;
pub mod routes;
pub mod store;
pub mod urls;
