#![forbid(unsafe_code)]

pub mod acl;
pub mod api;
pub mod app;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod config_store;
pub mod constants;
pub mod credential;
pub mod error;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod rbac;
pub mod repository;
pub mod runtime;
pub mod upstream;
