use serde::{Deserialize, Serialize};

use crate::db::models::Sample;

#[derive(Deserialize, Debug, Default)]
pub struct ListSamplesQuery {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Serialize, Debug)]
pub struct PaginatedSamplesResponse {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<Sample>,
}
