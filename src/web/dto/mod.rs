pub mod api_key_dto;
pub mod health_dto;
pub mod rate_limit_dto;
pub mod request_log_dto;
