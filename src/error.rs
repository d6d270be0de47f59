use thiserror::Error;

/// Errors raised while building or running a crew.
#[derive(Debug, Error)]
pub enum CrewError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("backend '{backend}' failed: {reason}")]
    BackendFailure {
        backend: String,
        reason: String,
        transient: bool,
    },

    #[error("task '{task}' references '{dependency}', which is not declared before it")]
    CyclicOrForwardReference { task: String, dependency: String },

    #[error("failed to write '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CrewError {
    pub fn config(message: impl Into<String>) -> Self {
        CrewError::InvalidConfiguration(message.into())
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        CrewError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn backend(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        CrewError::BackendFailure {
            backend: backend.into(),
            reason: reason.into(),
            transient: false,
        }
    }

    pub fn transient_backend(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        CrewError::BackendFailure {
            backend: backend.into(),
            reason: reason.into(),
            transient: true,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CrewError::BackendFailure {
                transient: true,
                ..
            }
        )
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            CrewError::InvalidConfiguration(_) => ErrorCategory::Config,
            CrewError::NotFound { .. } => ErrorCategory::NotFound,
            CrewError::BackendFailure { .. } => ErrorCategory::Backend,
            CrewError::CyclicOrForwardReference { .. } => ErrorCategory::Graph,
            CrewError::Io { .. } => ErrorCategory::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    NotFound,
    Backend,
    Graph,
    Internal,
}

impl ErrorCategory {
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::Config => "CONFIG",
            ErrorCategory::NotFound => "NOT_FOUND",
            ErrorCategory::Backend => "BACKEND",
            ErrorCategory::Graph => "GRAPH",
            ErrorCategory::Internal => "INTERNAL",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            ErrorCategory::Config => {
                "Set OPENAI_API_KEY (or SERPER_API_KEY for web_search agents) in .env, \
                 or run with --provider ollama."
            }
            ErrorCategory::NotFound => {
                "Run crewline crews list / crewline agents list <crew> to see what is declared."
            }
            ErrorCategory::Backend => {
                "Check backend reachability and quota; raise --retry-attempts or \
                 --request-timeout-secs for flaky endpoints."
            }
            ErrorCategory::Graph => {
                "Task context may only name tasks declared earlier in the crew. Run crewline check <crew>."
            }
            ErrorCategory::Internal => {
                "Retry with RUST_LOG=debug. If it persists, capture logs and open an issue."
            }
        }
    }
}

/// Finds the category of an error, preferring a `CrewError` anywhere in the chain.
pub fn categorize_error(err: &anyhow::Error) -> ErrorCategory {
    if let Some(crew_err) = err.chain().find_map(|e| e.downcast_ref::<CrewError>()) {
        return crew_err.category();
    }

    let msg = format!("{err:#}").to_ascii_lowercase();
    if msg.contains("api_key") || msg.contains("profile") || msg.contains("invalid value") {
        return ErrorCategory::Config;
    }
    if msg.contains("not found") {
        return ErrorCategory::NotFound;
    }
    ErrorCategory::Internal
}

pub fn format_cli_error(err: &anyhow::Error) -> String {
    let category = categorize_error(err);
    format!(
        "[{}] {}\nHint: {}",
        category.code(),
        redact_sensitive_text(&format!("{err:#}")),
        category.hint()
    )
}

/// Masks anything that looks like an OpenAI-style secret key.
pub fn redact_sensitive_text(text: &str) -> String {
    const KEY_PREFIX: &str = "sk-";
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;

    while let Some(offset) = text[cursor..].find(KEY_PREFIX) {
        let start = cursor + offset;
        out.push_str(&text[cursor..start]);

        let remainder = &text[start..];
        let end = remainder
            .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'))
            .unwrap_or(remainder.len());
        let at_boundary = text[..start]
            .chars()
            .next_back()
            .is_none_or(|ch| !ch.is_ascii_alphanumeric());
        // "task-1" and "risk-free" are words, not keys
        if at_boundary && end >= KEY_PREFIX.len() + 8 {
            out.push_str("sk-[REDACTED]");
        } else {
            out.push_str(&remainder[..end]);
        }
        cursor = start + end.max(KEY_PREFIX.len());
    }

    out.push_str(&text[cursor..]);
    out
}
