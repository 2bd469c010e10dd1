use std::fmt;
use std::future::Future;
use std::time::{
    Duration,
    Instant,
};

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::*;

use crate::errors::*;
use crate::prelude::*;

err_impl! {FeatureError,
    #[error("skipped: {0}")]
    Skipped(String),
}

pub type StepFuture = BoxFuture<'static, EmptyResult>;
type StepFn = Box<dyn FnOnce(kube::Client) -> StepFuture + Send>;

struct Step {
    description: String,
    run: StepFn,
}

impl Step {
    fn new<F, Fut>(description: &str, f: F) -> Step
    where
        F: FnOnce(kube::Client) -> Fut + Send + 'static,
        Fut: Future<Output = EmptyResult> + Send + 'static,
    {
        Step {
            description: description.into(),
            run: Box::new(move |client| f(client).boxed()),
        }
    }
}

// A Feature is a named test made of three stages: setup steps run in order and stop at the first
// failure; every assessment runs (independently of the others) as long as setup succeeded; and
// teardown steps always run, so that whatever setup managed to create gets cleaned up.
pub struct Feature {
    name: String,
    setups: Vec<Step>,
    assessments: Vec<Step>,
    teardowns: Vec<Step>,
}

impl Feature {
    pub fn new(name: &str) -> Feature {
        Feature {
            name: name.into(),
            setups: vec![],
            assessments: vec![],
            teardowns: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_setup<F, Fut>(mut self, description: &str, f: F) -> Feature
    where
        F: FnOnce(kube::Client) -> Fut + Send + 'static,
        Fut: Future<Output = EmptyResult> + Send + 'static,
    {
        self.setups.push(Step::new(description, f));
        self
    }

    pub fn assess<F, Fut>(mut self, description: &str, f: F) -> Feature
    where
        F: FnOnce(kube::Client) -> Fut + Send + 'static,
        Fut: Future<Output = EmptyResult> + Send + 'static,
    {
        self.assessments.push(Step::new(description, f));
        self
    }

    pub fn teardown<F, Fut>(mut self, f: F) -> Feature
    where
        F: FnOnce(kube::Client) -> Fut + Send + 'static,
        Fut: Future<Output = EmptyResult> + Send + 'static,
    {
        self.teardowns.push(Step::new("teardown", f));
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Passed,
    Failed(Vec<String>),
    Skipped(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Passed => write!(f, "PASS"),
            Outcome::Failed(_) => write!(f, "FAIL"),
            Outcome::Skipped(_) => write!(f, "SKIP"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FeatureResult {
    pub name: String,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Summary {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

pub fn skip(reason: &str) -> anyhow::Error {
    FeatureError::skipped(reason)
}

pub fn is_skip(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<FeatureError>(), Some(FeatureError::Skipped(_)))
}

// Some tests are known not to work on shared CI runners
pub fn skip_test_on_ci() -> EmptyResult {
    if std::env::var(CI_ENV_VAR).is_ok_and(|v| v == "true") {
        bail!(skip("failing on CI"));
    }
    Ok(())
}

pub struct TestEnv {
    client: kube::Client,
    results: Vec<FeatureResult>,
}

impl TestEnv {
    pub fn new(client: kube::Client) -> TestEnv {
        TestEnv { client, results: vec![] }
    }

    pub fn results(&self) -> &[FeatureResult] {
        &self.results
    }

    pub fn record_skip(&mut self, name: &str, reason: &str) {
        info!("skipping {name}: {reason}");
        self.results.push(FeatureResult {
            name: name.into(),
            outcome: Outcome::Skipped(reason.into()),
            elapsed: Duration::ZERO,
        });
    }

    #[instrument(skip_all, fields(feature = feature.name))]
    pub async fn test(&mut self, feature: Feature) -> FeatureResult {
        let start = Instant::now();
        let mut failures = vec![];
        let mut skip_reason = None;

        for step in feature.setups {
            info!("setup: {}", step.description);
            if let Err(err) = (step.run)(self.client.clone()).await {
                record_step_error(&step.description, err, &mut failures, &mut skip_reason);
                break;
            }
        }

        if failures.is_empty() && skip_reason.is_none() {
            for step in feature.assessments {
                info!("assess: {}", step.description);
                if let Err(err) = (step.run)(self.client.clone()).await {
                    record_step_error(&step.description, err, &mut failures, &mut skip_reason);
                }
            }
        }

        for step in feature.teardowns {
            if let Err(err) = (step.run)(self.client.clone()).await {
                record_step_error(&step.description, err, &mut failures, &mut skip_reason);
            }
        }

        let outcome = match (failures.is_empty(), skip_reason) {
            (false, _) => Outcome::Failed(failures),
            (true, Some(reason)) => Outcome::Skipped(reason),
            (true, None) => Outcome::Passed,
        };
        info!("{} {}", outcome, feature.name);

        let res = FeatureResult { name: feature.name, outcome, elapsed: start.elapsed() };
        self.results.push(res.clone());
        res
    }

    pub fn summary(&self) -> Summary {
        self.results.iter().fold(Summary::default(), |mut acc, r| {
            match r.outcome {
                Outcome::Passed => acc.passed += 1,
                Outcome::Failed(_) => acc.failed += 1,
                Outcome::Skipped(_) => acc.skipped += 1,
            }
            acc
        })
    }
}

fn record_step_error(description: &str, err: anyhow::Error, failures: &mut Vec<String>, skip_reason: &mut Option<String>) {
    if let Some(FeatureError::Skipped(reason)) = err.downcast_ref::<FeatureError>() {
        *skip_reason = Some(reason.clone());
        return;
    }

    error!("{description} failed: {err:#}");
    failures.push(format!("{description}: {err:#}"));
}
