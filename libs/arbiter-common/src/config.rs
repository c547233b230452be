// Environment-driven settings shared by every Arbiter binary

use std::str::FromStr;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_EXECUTOR_URL: &str = "http://127.0.0.1:8000";

/// Read a string variable, falling back to `default` when unset
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read and parse a variable. Unset or unparsable values fall back to `default`.
pub fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub fn redis_url() -> String {
    env_or("REDIS_URL", DEFAULT_REDIS_URL)
}

pub fn executor_url() -> String {
    env_or("EXECUTOR_URL", DEFAULT_EXECUTOR_URL)
        .trim_end_matches('/')
        .to_string()
}

/// `LOG_FORMAT=json` switches every binary to structured JSON logs
pub fn json_logs() -> bool {
    env_or("LOG_FORMAT", "text").eq_ignore_ascii_case("json")
}
