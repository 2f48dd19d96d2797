// src/handlers/mod.rs

pub mod exam;
pub mod health;
pub mod payment;
pub mod plan;
