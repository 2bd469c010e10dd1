use std::sync::Arc;
use std::sync::atomic::{
    AtomicBool,
    Ordering,
};
use std::time::Duration;

use kube::api::{
    DeleteParams,
    PropagationPolicy,
};
use pp_core::assess::*;
use pp_core::cloud::CloudAssertError;
use pp_core::errors::*;
use pp_core::feature::{
    Feature,
    skip_test_on_ci,
};
use pp_core::k8s::*;
use pp_core::prelude::*;
use pp_core::wait::*;
use tracing::*;

err_impl! {TestCaseError,
    #[error("test case has nothing to create a namespace for: {0}")]
    NoObjects(String),

    #[error("test case has no pod: {0}")]
    NoPod(String),

    #[error("job {0} has no successful pods")]
    JobFailed(String),

    #[error("command check failed: {0}")]
    CommandCheckFailed(String),

    #[error("expected pod event error not found: {0}")]
    EventMismatch(String),

    #[error("unexpected instance type: {0}")]
    InstanceTypeMismatch(String),
}

pub type OutputCheck = Arc<dyn Fn(&str) -> bool + Send + Sync>;

// A command to run inside the test pod once it's up; a check that's absent always passes
#[derive(Clone)]
pub struct TestCommand {
    pub command: Vec<String>,
    pub container_name: Option<String>,
    pub stdout_check: Option<OutputCheck>,
    pub stderr_check: Option<OutputCheck>,
}

impl TestCommand {
    pub fn new(command: &[&str]) -> TestCommand {
        TestCommand {
            command: command.iter().map(|s| s.to_string()).collect(),
            container_name: None,
            stdout_check: None,
            stderr_check: None,
        }
    }

    pub fn in_container(mut self, name: &str) -> TestCommand {
        self.container_name = Some(name.into());
        self
    }

    pub fn check_stdout<F: Fn(&str) -> bool + Send + Sync + 'static>(mut self, f: F) -> TestCommand {
        self.stdout_check = Some(Arc::new(f));
        self
    }

    pub fn check_stderr<F: Fn(&str) -> bool + Send + Sync + 'static>(mut self, f: F) -> TestCommand {
        self.stderr_check = Some(Arc::new(f));
        self
    }

    pub fn check(&self, output: &ExecOutput) -> bool {
        output.succeeded()
            && self.stdout_check.as_ref().is_none_or(|f| f(&output.stdout))
            && self.stderr_check.as_ref().is_none_or(|f| f(&output.stderr))
    }
}

pub struct TestCase {
    name: String,
    assert: Arc<dyn CloudAssert>,
    assess_message: String,

    pod: Option<corev1::Pod>,
    job: Option<batchv1::Job>,
    config_map: Option<corev1::ConfigMap>,
    secret: Option<corev1::Secret>,
    pvc: Option<corev1::PersistentVolumeClaim>,

    expected_pod_logs: Option<String>,
    pod_state: String,
    image_pull_timer: bool,
    auth_image_status: Option<String>,
    test_commands: Vec<TestCommand>,
    expected_pod_event_error: Option<String>,
    expected_instance_type: Option<String>,
    delete_assertion: bool,
    skip_on_ci: bool,

    created_namespace: AtomicBool,
}

impl TestCase {
    pub fn new(name: &str, assert: Arc<dyn CloudAssert>, assess_message: &str) -> TestCase {
        TestCase {
            name: name.into(),
            assert,
            assess_message: assess_message.into(),
            pod: None,
            job: None,
            config_map: None,
            secret: None,
            pvc: None,
            expected_pod_logs: None,
            pod_state: POD_RUNNING.into(),
            image_pull_timer: false,
            auth_image_status: None,
            test_commands: vec![],
            expected_pod_event_error: None,
            expected_instance_type: None,
            delete_assertion: false,
            skip_on_ci: false,
            created_namespace: AtomicBool::new(false),
        }
    }

    pub fn with_pod(mut self, pod: corev1::Pod) -> Self {
        self.pod = Some(pod);
        self
    }

    pub fn with_job(mut self, job: batchv1::Job) -> Self {
        self.job = Some(job);
        self
    }

    pub fn with_config_map(mut self, cm: corev1::ConfigMap) -> Self {
        self.config_map = Some(cm);
        self
    }

    pub fn with_secret(mut self, secret: corev1::Secret) -> Self {
        self.secret = Some(secret);
        self
    }

    pub fn with_pvc(mut self, pvc: corev1::PersistentVolumeClaim) -> Self {
        self.pvc = Some(pvc);
        self
    }

    pub fn with_expected_pod_logs(mut self, expected: &str) -> Self {
        self.expected_pod_logs = Some(expected.into());
        self
    }

    pub fn with_pod_state(mut self, phase: &str) -> Self {
        self.pod_state = phase.into();
        self
    }

    pub fn with_image_pull_timer(mut self) -> Self {
        self.image_pull_timer = true;
        self
    }

    pub fn with_auth_image_status(mut self, status: &str) -> Self {
        self.auth_image_status = Some(status.into());
        self
    }

    pub fn with_test_commands(mut self, commands: Vec<TestCommand>) -> Self {
        self.test_commands = commands;
        self
    }

    pub fn with_expected_pod_event_error(mut self, expected: &str) -> Self {
        self.expected_pod_event_error = Some(expected.into());
        self
    }

    pub fn with_expected_instance_type(mut self, instance_type: &str) -> Self {
        self.expected_instance_type = Some(instance_type.into());
        self
    }

    pub fn with_delete_assertion(mut self) -> Self {
        self.delete_assertion = true;
        self
    }

    pub fn with_skip_on_ci(mut self) -> Self {
        self.skip_on_ci = true;
        self
    }

    fn namespace(&self) -> Option<String> {
        self.pod
            .as_ref()
            .and_then(|p| p.namespace())
            .or_else(|| self.job.as_ref().and_then(|j| j.namespace()))
    }

    // Pods that are expected to fail to start never reach a phase worth waiting on
    fn waits_for_pod(&self) -> bool {
        self.expected_pod_event_error.is_none()
    }

    fn expects_pod_vm(&self) -> bool {
        self.pod.is_some()
            && self.pod_state == POD_RUNNING
            && self.expected_pod_event_error.is_none()
            && self.auth_image_status.as_deref().is_none_or(|s| s == AUTH_STATUS_COMPLETED)
    }

    fn pod_timeout(&self) -> Duration {
        if self.image_pull_timer {
            Duration::from_secs(WAIT_LARGE_IMAGE_POD_RUNNING_TIMEOUT_SECONDS)
        } else {
            Duration::from_secs(WAIT_POD_RUNNING_TIMEOUT_SECONDS)
        }
    }

    pub fn into_feature(self) -> Feature {
        let tc = Arc::new(self);
        let mut feature = Feature::new(&tc.name);

        if tc.skip_on_ci {
            feature = feature.with_setup("check CI", |_| async { skip_test_on_ci() });
        }

        let t = tc.clone();
        feature = feature.with_setup("create test objects", move |client| async move { t.setup(client).await });

        if tc.expects_pod_vm() {
            let t = tc.clone();
            feature = feature.assess(&tc.assess_message, move |_| async move { t.assert_pod_vm().await });
        }
        if tc.expected_pod_logs.is_some() {
            let t = tc.clone();
            feature = feature.assess("pod logs match", move |client| async move { t.assert_logs(client).await });
        }
        if tc.image_pull_timer {
            let t = tc.clone();
            feature = feature.assess("image pull time", move |client| async move { t.assert_pull_time(client).await });
        }
        if tc.auth_image_status.is_some() {
            let t = tc.clone();
            feature = feature.assess("authenticated image status", move |client| async move {
                t.assert_auth_status(client).await
            });
        }
        if !tc.test_commands.is_empty() {
            let t = tc.clone();
            feature = feature.assess("test commands", move |client| async move { t.run_commands(client).await });
        }
        if tc.expected_pod_event_error.is_some() {
            let t = tc.clone();
            feature = feature.assess("pod event error", move |client| async move { t.assert_event_error(client).await });
        }
        if tc.expected_instance_type.is_some() {
            let t = tc.clone();
            feature = feature.assess("PodVM instance type", move |_| async move { t.assert_instance_type().await });
        }
        if tc.delete_assertion {
            let t = tc.clone();
            feature = feature.assess("PodVM is deleted", move |client| async move { t.assert_deleted(client).await });
        }

        feature.teardown(move |client| async move { tc.teardown(client).await })
    }

    async fn setup(&self, client: kube::Client) -> EmptyResult {
        let ns = self.namespace().ok_or_else(|| TestCaseError::no_objects(&self.name))?;
        if ensure_namespace(client.clone(), &ns).await? {
            self.created_namespace.store(true, Ordering::SeqCst);
        }

        if let Some(cm) = &self.config_map {
            create_obj(client.clone(), cm).await?;
        }
        if let Some(secret) = &self.secret {
            create_obj(client.clone(), secret).await?;
        }
        if let Some(pvc) = &self.pvc {
            create_obj(client.clone(), pvc).await?;
        }
        if let Some(job) = &self.job {
            create_obj(client.clone(), job).await?;
            wait_for_job_finished(client.clone(), job, Duration::from_secs(WAIT_JOB_FINISHED_TIMEOUT_SECONDS)).await?;
        }
        if let Some(pod) = &self.pod {
            create_obj(client.clone(), pod).await?;
            if self.waits_for_pod() {
                wait_for_pod_phase(client, pod, &self.pod_state, self.pod_timeout()).await?;
            }
        }
        Ok(())
    }

    fn pod(&self) -> anyhow::Result<&corev1::Pod> {
        self.pod.as_ref().ok_or_else(|| TestCaseError::no_pod(&self.name))
    }

    async fn assert_pod_vm(&self) -> EmptyResult {
        self.assert.has_pod_vm(&self.pod()?.name_any()).await
    }

    async fn assert_logs(&self, client: kube::Client) -> EmptyResult {
        let expected = self.expected_pod_logs.as_deref().unwrap_or_default();
        if let Some(job) = &self.job {
            let (successful, errored, log) = get_successful_and_errored_pods(client, job).await?;
            info!("job {}: {successful} successful pods, {errored} errored pods", job.name_any());
            if successful == 0 {
                bail!(TestCaseError::job_failed(&job.name_any()));
            }
            if !log.contains(expected) {
                bail!(AssessError::unexpected_log(&format!("{expected} (got {log})")));
            }
            return Ok(());
        }

        let (log, res) = compare_pod_log_string(client, self.pod()?, expected).await;
        info!("pod log: {log}");
        res
    }

    async fn assert_pull_time(&self, client: kube::Client) -> EmptyResult {
        let pod = self.pod()?;
        // the node name is only known once the pod has been scheduled
        let pod = namespaced_api(client.clone(), pod)?.get(&pod.name_any()).await?;
        let caa_pod = find_caa_pod(client.clone(), &pod).await?;
        let pull_time = watch_image_pull_time(client, &caa_pod, &pod).await?;
        info!("time taken to pull image for {}: {pull_time}", pod.name_any());
        Ok(())
    }

    async fn assert_auth_status(&self, client: kube::Client) -> EmptyResult {
        let expected = self.auth_image_status.as_deref().unwrap_or(AUTH_STATUS_COMPLETED);
        get_authenticated_image_status(client, expected, self.pod()?, Duration::from_secs(WAIT_EVENT_TIMEOUT_SECONDS))
            .await
    }

    async fn run_commands(&self, client: kube::Client) -> EmptyResult {
        let pod = self.pod()?;
        for cmd in &self.test_commands {
            let output = exec_in_pod(client.clone(), pod, cmd.container_name.as_deref(), &cmd.command).await?;
            debug!("stdout: {}", output.stdout);
            debug!("stderr: {}", output.stderr);
            if !output.succeeded() {
                warn!("{:?} exited with code {:?}", cmd.command, output.exit_code());
            }
            if !cmd.check(&output) {
                bail!(TestCaseError::command_check_failed(&cmd.command.join(" ")));
            }
        }
        Ok(())
    }

    async fn assert_event_error(&self, client: kube::Client) -> EmptyResult {
        let expected = self.expected_pod_event_error.as_deref().unwrap_or_default();
        let evt = pod_event_extractor(client, self.pod()?, Duration::from_secs(WAIT_EVENT_TIMEOUT_SECONDS)).await?;
        info!("{}: {}", evt.event_reason, evt.event_description);
        if !evt.event_description.contains(expected) {
            bail!(TestCaseError::event_mismatch(expected));
        }
        Ok(())
    }

    async fn assert_instance_type(&self) -> EmptyResult {
        let expected = self.expected_instance_type.as_deref().unwrap_or_default();
        let actual = self.assert.get_instance_type(&self.pod()?.name_any()).await?;
        info!("PodVM instance type: {actual}");
        if actual != expected {
            bail!(TestCaseError::instance_type_mismatch(&format!("expected {expected}, got {actual}")));
        }
        Ok(())
    }

    async fn assert_deleted(&self, client: kube::Client) -> EmptyResult {
        let pod = self.pod()?;
        let api = namespaced_api(client.clone(), pod)?;
        delete_obj(client, pod, &DeleteParams::default()).await?;
        wait_for_deleted(&api, &pod.name_any(), Duration::from_secs(WAIT_POD_DELETED_TIMEOUT_SECONDS)).await?;

        let name = &pod.name_any();
        let cloud = &self.assert;
        let what = format!("PodVM for {name} to be deleted");
        wait_for(&what, Duration::from_secs(WAIT_POD_DELETED_TIMEOUT_SECONDS), default_interval(), move || async move {
            match cloud.has_pod_vm(name).await {
                Ok(()) => Ok(false),
                Err(err) if err.downcast_ref::<CloudAssertError>().is_some() => Ok(true),
                Err(err) => Err(err),
            }
        })
        .await
    }

    // Cleans up everything that got created; keeps going past failures so one stuck object
    // doesn't leak the rest, and reports all of them together
    async fn teardown(&self, client: kube::Client) -> EmptyResult {
        let mut results = vec![];
        if let Some(pod) = &self.pod {
            results.push(delete_obj(client.clone(), pod, &DeleteParams::default()).await);
        }
        if let Some(job) = &self.job {
            let params = DeleteParams {
                propagation_policy: Some(PropagationPolicy::Background),
                ..Default::default()
            };
            results.push(delete_obj(client.clone(), job, &params).await);
        }
        if let Some(pvc) = &self.pvc {
            results.push(delete_obj(client.clone(), pvc, &DeleteParams::default()).await);
        }
        if let Some(secret) = &self.secret {
            results.push(delete_obj(client.clone(), secret, &DeleteParams::default()).await);
        }
        if let Some(cm) = &self.config_map {
            results.push(delete_obj(client.clone(), cm, &DeleteParams::default()).await);
        }
        if self.created_namespace.load(Ordering::SeqCst)
            && let Some(ns) = self.namespace()
        {
            results.push(delete_namespace(client, &ns).await);
        }

        join_errors(results)
    }
}
