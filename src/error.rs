use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Pipeline stage, used to tag failures surfaced to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validate,
    Decompose,
    Fetch,
    Label,
    Synthesize,
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Validate => write!(f, "validate"),
            Stage::Decompose => write!(f, "decompose"),
            Stage::Fetch => write!(f, "fetch"),
            Stage::Label => write!(f, "label"),
            Stage::Synthesize => write!(f, "synthesize"),
            Stage::Persist => write!(f, "persist"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] InvalidRequestError),

    #[error("Decompose stage failed: {0}")]
    Decomposition(#[from] DecompositionError),

    #[error("Fetch stage failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Persist stage failed: {0}")]
    Persist(#[from] PersistError),

    #[error("Failed to initialise client: {0}")]
    ClientInit(String),

    #[error("Run cancelled during {stage} stage")]
    Cancelled { stage: Stage },

    #[error("Run timed out after {after:?} during {stage} stage")]
    TimedOut { stage: Stage, after: Duration },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::InvalidRequest(_) | PipelineError::ClientInit(_) => Stage::Validate,
            PipelineError::Decomposition(_) => Stage::Decompose,
            PipelineError::Fetch(_) => Stage::Fetch,
            PipelineError::Persist(_) => Stage::Persist,
            PipelineError::Cancelled { stage } | PipelineError::TimedOut { stage, .. } => *stage,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InvalidRequestError {
    #[error("research question must not be empty")]
    EmptyQuestion,

    #[error("limit {0} is outside the allowed range [{min}, {max}]", min = crate::request::LIMIT_MIN, max = crate::request::LIMIT_MAX)]
    LimitOutOfRange(u32),

    #[error("task_count {0} is outside the allowed range [{min}, {max}]", min = crate::request::TASK_COUNT_MIN, max = crate::request::TASK_COUNT_MAX)]
    TaskCountOutOfRange(u32),

    #[error("invalid subreddit '{0}'")]
    InvalidSubreddit(String),

    #[error("model name must not be empty")]
    EmptyModel,

    #[error("unknown sort '{0}' (expected one of new, relevance, hot, top, comments)")]
    UnknownSort(String),

    #[error("unknown time filter '{0}' (expected one of year, month, week, day, hour, all)")]
    UnknownTimeFilter(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Missing credentials: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("Failed to read secrets file '{path}': {source}")]
    ReadSecrets {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse secrets file '{path}': {source}")]
    ParseSecrets {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("Access passcode required")]
    PasscodeRequired,

    #[error("Access passcode rejected")]
    PasscodeRejected,
}

/// Failure talking to the LLM completion API
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("LLM API error ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM network error: {0}")]
    Network(String),

    #[error("Failed to decode LLM response: {0}")]
    Decode(String),

    #[error("LLM returned no text content")]
    EmptyResponse,

    #[error("Invalid LLM request header: {0}")]
    InvalidHeader(String),
}

/// Failure talking to the content platform
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Rate limited by upstream")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to parse listing: {0}")]
    Parse(String),

    #[error("No items matched the search")]
    NoResults,
}

#[derive(Error, Debug)]
pub enum DecompositionError {
    #[error("LLM call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Could not parse any sub-tasks from model output after repair attempt")]
    Unparseable,
}

/// Per-batch labeling failure; isolated to the batch, never aborts a run
#[derive(Error, Debug)]
pub enum LabelingError {
    #[error("LLM call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Could not parse labels from model output: {0}")]
    ParseOutput(String),
}

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("LLM call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Narrative cited none of the supplied items")]
    Ungrounded,
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to create output directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write report '{path}': {source}")]
    WriteReport {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}
