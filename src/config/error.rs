#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("config value at `{path}` is not representable: {reason}")]
    Unrepresentable { path: String, reason: String },
    #[error("expected a mapping at `{path}`, found {found}")]
    NotAMapping { path: String, found: &'static str },
    #[error("agent `{agent}` references unknown provider `{provider}`")]
    UnknownProvider { agent: String, provider: String },
    #[error("agent `{agent}` is missing required parameter `{parameter}` and no default applies")]
    MissingParameter { agent: String, parameter: String },
    #[error("agent `{agent}` has no prompt template `{prompt}`")]
    MissingPrompt { agent: String, prompt: String },
    #[error("unknown agent kind `{0}`")]
    UnknownAgentKind(String),
    #[error("entry team `{0}` is not defined")]
    UnknownEntryTeam(String),
    #[error("provider `{provider}` secret variable `{variable}` is not set in the environment")]
    MissingSecret { provider: String, variable: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
