//! Tax Rate Service - effective-dated sales tax rates as a microservice.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
