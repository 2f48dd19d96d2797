// src/services/mod.rs

pub mod exam;
pub mod generator;
pub mod payment;
pub mod payment_gateway;
pub mod plan;
