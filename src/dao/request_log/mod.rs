mod request_log;

pub use request_log::{
    RequestLogEntry,
    RequestLogSummary,
    create_request_log,
    get_request_log_summary,
    list_request_logs_paginated,
};
