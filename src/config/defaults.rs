use std::path::PathBuf;

pub fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

pub fn default_concurrency() -> usize {
    4
}

pub fn default_label_batch_size() -> usize {
    15
}

pub fn default_request_timeout_sec() -> u64 {
    45
}

pub fn default_run_timeout_sec() -> u64 {
    900
}

pub fn default_secrets_file() -> PathBuf {
    PathBuf::from(".streamlit/secrets.toml")
}

pub fn default_max_attempts() -> u32 {
    3
}

pub fn default_backoff_base_ms() -> u64 {
    1000
}

pub fn default_reddit_auth_url() -> String {
    "https://www.reddit.com/api/v1/access_token".to_string()
}

pub fn default_reddit_api_base_url() -> String {
    "https://oauth.reddit.com".to_string()
}

pub fn default_page_size() -> u32 {
    100
}

pub fn default_min_request_interval_ms() -> u64 {
    1000
}

pub fn default_model() -> String {
    "claude-opus-4-5".to_string()
}

pub fn default_temperature() -> f32 {
    0.2
}

pub fn default_decompose_max_tokens() -> u32 {
    1024
}

pub fn default_label_max_tokens() -> u32 {
    4096
}

pub fn default_synthesize_max_tokens() -> u32 {
    8192
}

pub fn default_snippet_chars() -> usize {
    800
}
