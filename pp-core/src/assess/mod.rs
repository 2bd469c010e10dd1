mod events;
mod exec;
mod jobs;
mod logs;

pub use events::*;
pub use exec::*;
pub use jobs::*;
pub use logs::*;

use crate::errors::*;
use crate::prelude::*;

err_impl! {AssessError,
    #[error("invalid time data: {0}")]
    InvalidTimeData(String),

    #[error("pod {0} is not running")]
    PodNotRunning(String),

    #[error("pod {0} did not log anything")]
    EmptyLog(String),

    #[error("no image pull of {0} found in cloud-api-adaptor logs")]
    ImagePullNotFound(String),

    #[error("pod log does not contain expected string: {0}")]
    UnexpectedLog(String),

    #[error("failed to create PodVM for {0}")]
    PodVmCreateFailed(String),

    #[error("PodVM start error for pod {0}")]
    PodVmStartError(String),

    #[error("no warning events found for pod {0}")]
    NoWarningEvents(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("invalid image name: {0}")]
    InvalidImageName(String),

    #[error("invalid auth-json-secret: {0}")]
    InvalidAuthJsonSecret(String),

    #[error("no cloud-api-adaptor pod found in {0}")]
    CaaPodNotFound(String),

    #[error("exec stream unavailable: {0}")]
    ExecStreamMissing(String),
}

#[cfg(test)]
mod tests;
