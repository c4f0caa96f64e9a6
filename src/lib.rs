//! Storage drive registry: drives and folders on local disk, S3, Egnyte and
//! OneDrive, the program/study/assay folder links, and the provider services
//! that list, create and upload into them.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod paths;
pub mod providers;
pub mod routes;
pub mod services;
pub mod staging;
