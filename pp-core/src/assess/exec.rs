use kube::api::AttachParams;
use tokio::io::AsyncReadExt;
use tracing::*;

use super::*;
use crate::k8s::namespaced_api;

const STATUS_FAILURE: &str = "Failure";
const EXIT_CODE_CAUSE: &str = "ExitCode";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,

    // What the apiserver reported once the command finished; None if the stream closed without one
    pub status: Option<metav1::Status>,
}

impl ExecOutput {
    pub fn succeeded(&self) -> bool {
        self.status.as_ref().is_none_or(|s| s.status.as_deref() != Some(STATUS_FAILURE))
    }

    // A non-zero exit comes back as a failure status with an "ExitCode" cause holding the code
    pub fn exit_code(&self) -> Option<i32> {
        let status = self.status.as_ref()?;
        if self.succeeded() {
            return Some(0);
        }

        status
            .details
            .as_ref()?
            .causes
            .as_ref()?
            .iter()
            .find(|c| c.reason.as_deref() == Some(EXIT_CODE_CAUSE))?
            .message
            .as_ref()?
            .parse()
            .ok()
    }
}

// Runs a command through the pods/exec subresource; with no container given, the pod's first
// container is used
pub async fn exec_in_pod(
    client: kube::Client,
    pod: &corev1::Pod,
    container: Option<&str>,
    command: &[String],
) -> anyhow::Result<ExecOutput> {
    let api = namespaced_api(client, pod)?;
    let container = match container {
        Some(c) => c.to_string(),
        None => pod.first_container()?.name.clone(),
    };
    info!("running {command:?} in {}/{container}", pod.namespaced_name());

    let params = AttachParams::default().container(container).stdout(true).stderr(true);
    let mut attached = api.exec(&pod.name_any(), command.to_vec(), &params).await?;

    let Some(mut stdout_reader) = attached.stdout() else {
        bail!(AssessError::exec_stream_missing("stdout"));
    };
    let Some(mut stderr_reader) = attached.stderr() else {
        bail!(AssessError::exec_stream_missing("stderr"));
    };

    let status = attached.take_status();

    let mut output = ExecOutput::default();
    let (stdout_res, stderr_res) = tokio::join!(
        stdout_reader.read_to_string(&mut output.stdout),
        stderr_reader.read_to_string(&mut output.stderr),
    );
    stdout_res?;
    stderr_res?;
    if let Some(status) = status {
        output.status = status.await;
    }
    attached.join().await?;

    debug!("stdout: {}, stderr: {}, exit code: {:?}", output.stdout, output.stderr, output.exit_code());
    Ok(output)
}
