// src/models/mod.rs

use serde::Deserialize;

pub mod answer_key;
pub mod exam;
pub mod payment;
pub mod plan;
pub mod question;

/// Skip/limit pagination for listings that default to a bounded page.
#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_page_limit")]
    pub limit: u32,
}

fn default_page_limit() -> u32 {
    100
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: default_page_limit(),
        }
    }
}
