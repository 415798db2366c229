/// Request-time failure raised by any pipeline stage.
///
/// Every variant funnels into the single terminal error stage. The `Display`
/// output is the bare message so it reaches the client unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// The request body failed schema validation.
    #[error("{message}")]
    Validation {
        message: String,
        http_error: Option<u16>,
    },

    /// The caller is not authorized; handled by redirecting to sign-in.
    #[error("{0}")]
    Unauthorized(String),

    /// Any other failure returned by a handler or parameter-setup step.
    #[error("{message}")]
    Handler {
        message: String,
        http_error: Option<u16>,
    },

    /// The template renderer failed.
    #[error("{0}")]
    Render(String),
}

impl RouteError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            http_error: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
            http_error: None,
        }
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    /// Attach an explicit HTTP status. Ignored for `Unauthorized` and `Render`.
    pub fn with_status(self, status: u16) -> Self {
        match self {
            Self::Validation { message, .. } => Self::Validation {
                message,
                http_error: Some(status),
            },
            Self::Handler { message, .. } => Self::Handler {
                message,
                http_error: Some(status),
            },
            other => other,
        }
    }

    /// The explicitly attached status, if any.
    pub fn http_error(&self) -> Option<u16> {
        match self {
            Self::Validation { http_error, .. } | Self::Handler { http_error, .. } => *http_error,
            Self::Unauthorized(_) | Self::Render(_) => None,
        }
    }

    /// Status reported to the client: the explicit one, else the kind default.
    pub fn status_code(&self) -> u16 {
        self.http_error().unwrap_or(match self {
            Self::Validation { .. } => 400,
            Self::Unauthorized(_) => 401,
            Self::Handler { .. } | Self::Render(_) => 500,
        })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Machine-readable code used in the JSON error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Handler { .. } => "HANDLER_ERROR",
            Self::Render(_) => "RENDER_ERROR",
        }
    }
}

impl From<serde_json::Error> for RouteError {
    fn from(err: serde_json::Error) -> Self {
        Self::handler(err.to_string())
    }
}

/// Startup failure while discovering, resolving or registering routes.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("missing `{field}` in route definition ({origin})")]
    MissingField { field: &'static str, origin: String },

    #[error("invalid path `{path}` in route definition ({origin}): {reason}")]
    InvalidPath {
        path: String,
        origin: String,
        reason: String,
    },

    #[error("invalid cors options in route definition ({origin}): {reason}")]
    InvalidCors { origin: String, reason: String },

    #[error("route discovery failed under {root}: {message}")]
    Discovery { root: String, message: String },

    #[error("invalid route configuration: {0}")]
    Config(String),
}
