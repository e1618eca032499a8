use serde::Deserialize;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Default, Deserialize)]
pub struct RequestLogQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
