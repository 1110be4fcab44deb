use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidYaml,
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,

    PipelineNotFound,
    ImageNotFound,
    DeploymentNotFound,
    DevNotFound,
    DependencyNotFound,

    DevAlreadyRunning,
    DevNotRunning,

    CommandNotFound,
    CommandFailed,
    BuildFailed,
    DeployFailed,
    DownloadFailed,

    RunCancelled,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidYaml => "config.invalid_yaml",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::PipelineNotFound => "pipeline.not_found",
            ErrorCode::ImageNotFound => "image.not_found",
            ErrorCode::DeploymentNotFound => "deployment.not_found",
            ErrorCode::DevNotFound => "dev.not_found",
            ErrorCode::DependencyNotFound => "dependency.not_found",

            ErrorCode::DevAlreadyRunning => "dev.already_running",
            ErrorCode::DevNotRunning => "dev.not_running",

            ErrorCode::CommandNotFound => "command.not_found",
            ErrorCode::CommandFailed => "command.failed",
            ErrorCode::BuildFailed => "build.failed",
            ErrorCode::DeployFailed => "deploy.failed",
            ErrorCode::DownloadFailed => "download.failed",

            ErrorCode::RunCancelled => "run.cancelled",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidYamlDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDetails {
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    /// Prefix the message, keeping code and details. Used to attribute a
    /// failure to the command that produced it.
    pub fn prefixed(mut self, prefix: &str) -> Self {
        self.message = format!("{}: {}", prefix, self.message);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::RunCancelled
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        let details = to_details(MissingArgumentDetails { args: args.clone() });
        Self::new(
            ErrorCode::ValidationMissingArgument,
            format!("Missing required argument: {}", args.join(", ")),
            details,
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.clone(),
            id,
            tried,
        });

        Self::new(ErrorCode::ValidationInvalidArgument, problem, details)
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let key = key.into();
        let details = to_details(ConfigMissingKeyDetails {
            key: key.clone(),
            path,
        });

        Self::new(
            ErrorCode::ConfigMissingKey,
            format!("Missing required configuration key '{}'", key),
            details,
        )
    }

    pub fn config_invalid_yaml(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        let path = path.into();
        let details = to_details(ConfigInvalidYamlDetails {
            path: path.clone(),
            error: err.to_string(),
        });

        Self::new(
            ErrorCode::ConfigInvalidYaml,
            format!("Invalid configuration in {}: {}", path, err),
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.clone(),
        });

        Self::new(ErrorCode::ConfigInvalidValue, problem, details)
    }

    pub fn pipeline_not_found(name: impl Into<String>) -> Self {
        Self::not_found(ErrorCode::PipelineNotFound, "pipeline", name)
            .with_hint("Check the 'pipelines' section of stevedore.yaml")
    }

    pub fn image_not_found(name: impl Into<String>) -> Self {
        Self::not_found(ErrorCode::ImageNotFound, "image", name)
            .with_hint("Check the 'images' section of stevedore.yaml")
    }

    pub fn deployment_not_found(name: impl Into<String>) -> Self {
        Self::not_found(ErrorCode::DeploymentNotFound, "deployment", name)
            .with_hint("Check the 'deployments' section of stevedore.yaml")
    }

    pub fn dev_not_found(name: impl Into<String>) -> Self {
        Self::not_found(ErrorCode::DevNotFound, "dev configuration", name)
            .with_hint("Check the 'dev' section of stevedore.yaml")
    }

    pub fn dependency_not_found(name: impl Into<String>) -> Self {
        Self::not_found(ErrorCode::DependencyNotFound, "dependency", name)
            .with_hint("Check the 'dependencies' section of stevedore.yaml")
    }

    fn not_found(code: ErrorCode, kind: &str, id: impl Into<String>) -> Self {
        let id = id.into();
        let message = format!("couldn't find {} '{}'", kind, id);
        Self::new(code, message, to_details(NotFoundDetails { id }))
    }

    pub fn dev_already_running(name: impl Into<String>) -> Self {
        let id = name.into();
        Self::new(
            ErrorCode::DevAlreadyRunning,
            format!("dev session '{}' is already running", id),
            to_details(NotFoundDetails { id }),
        )
        .with_hint("Run 'stop_dev <name>' first to restart a session")
    }

    pub fn dev_not_running(name: impl Into<String>) -> Self {
        let id = name.into();
        Self::new(
            ErrorCode::DevNotRunning,
            format!("dev session '{}' is not running", id),
            to_details(NotFoundDetails { id }),
        )
    }

    pub fn command_not_found(command: impl Into<String>) -> Self {
        let id = command.into();
        Self::new(
            ErrorCode::CommandNotFound,
            format!("{}: command not found", id),
            to_details(NotFoundDetails { id }),
        )
    }

    pub fn command_failed(command: impl Into<String>, exit_code: i32, stderr: String) -> Self {
        let command = command.into();
        let message = format!("command '{}' exited with status {}", command, exit_code);
        Self::new(
            ErrorCode::CommandFailed,
            message,
            to_details(CommandFailedDetails {
                command,
                exit_code,
                stderr,
            }),
        )
    }

    pub fn pipeline_failed(pipeline: impl Into<String>, exit_code: i32) -> Self {
        let pipeline = pipeline.into();
        Self::new(
            ErrorCode::CommandFailed,
            format!("pipeline {} failed: exit status {}", pipeline, exit_code),
            to_details(CommandFailedDetails {
                command: pipeline,
                exit_code,
                stderr: String::new(),
            }),
        )
    }

    pub fn build_failed(image: impl Into<String>, reason: impl Into<String>) -> Self {
        let image = image.into();
        Self::new(
            ErrorCode::BuildFailed,
            format!("error building image {}: {}", image, reason.into()),
            to_details(NotFoundDetails { id: image }),
        )
    }

    pub fn deploy_failed(deployment: impl Into<String>, reason: impl Into<String>) -> Self {
        let deployment = deployment.into();
        Self::new(
            ErrorCode::DeployFailed,
            format!("error deploying {}: {}", deployment, reason.into()),
            to_details(NotFoundDetails { id: deployment }),
        )
    }

    pub fn download_failed(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        let tool = tool.into();
        Self::new(
            ErrorCode::DownloadFailed,
            format!("error downloading {}: {}", tool, reason.into()),
            to_details(NotFoundDetails { id: tool }),
        )
        .with_retryable(true)
    }

    pub fn cancelled() -> Self {
        Self::new(
            ErrorCode::RunCancelled,
            "context canceled",
            Value::Object(serde_json::Map::new()),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let error = error.into();
        let details = to_details(InternalIoErrorDetails {
            error: error.clone(),
            context,
        });
        Self::new(ErrorCode::InternalIoError, error, details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let error = error.into();
        let details = serde_json::json!({
            "error": error,
            "context": context,
        });
        Self::new(ErrorCode::InternalJsonError, error, details)
    }

    pub fn internal_unexpected(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            message,
            Value::Object(serde_json::Map::new()),
        )
    }
}
