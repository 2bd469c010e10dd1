use std::sync::Arc;
use std::time::Duration;

use pp_core::errors::*;
use pp_core::feature::{
    FeatureError,
    Outcome,
    TestEnv,
};
use pp_core::prelude::*;
use pp_ibmcloud::{
    IbmCloudAssert,
    IbmCloudProps,
    IbmRollingUpdateAssert,
    VpcClient,
};
use tracing::*;

use crate::ibmcloud::{
    IbmCloudSuite,
    SuiteOptions,
    plan,
};

const ENABLED: &str = "yes";

err_impl! {RunError,
    #[error("{0} test(s) failed")]
    TestsFailed(usize),
}

#[derive(clap::Args, Clone, Debug)]
pub struct Args {
    #[arg(
        short = 'p',
        long,
        long_help = "IBM Cloud properties file (YAML); every property can also be set from the environment",
        env = "IBMCLOUD_PROPERTIES"
    )]
    pub properties: Option<String>,

    #[arg(short, long, long_help = "only run tests whose registry name matches this regex")]
    pub filter: Option<String>,

    #[arg(long, long_help = "stop after the first failing test")]
    pub fail_fast: bool,

    #[arg(
        long,
        long_help = "run the CAA daemonset rolling update test (\"yes\" to enable)",
        env = TEST_CAA_ROLLING_UPDATE_ENV_VAR,
        default_value = "no",
        help_heading = "Optional tests"
    )]
    pub test_caa_rolling_update: String,

    #[arg(
        long,
        long_help = "run the CSI wrapper PVC test (\"yes\" to enable)",
        env = TEST_CSI_WRAPPER_ENV_VAR,
        default_value = "no",
        help_heading = "Optional tests"
    )]
    pub test_csi_wrapper: String,

    #[arg(
        long,
        long_help = "base64-encoded user:password for the authenticated registry",
        env = REGISTRY_CREDENTIAL_ENCODED_ENV_VAR,
        hide_env_values = true,
        help_heading = "Optional tests"
    )]
    pub registry_credential_encoded: Option<String>,

    #[arg(
        long,
        long_help = "image in an authenticated registry",
        env = AUTHENTICATED_REGISTRY_IMAGE_ENV_VAR,
        help_heading = "Optional tests"
    )]
    pub authenticated_registry_image: Option<String>,
}

impl From<&Args> for SuiteOptions {
    fn from(args: &Args) -> SuiteOptions {
        SuiteOptions {
            rolling_update: args.test_caa_rolling_update == ENABLED,
            csi_wrapper: args.test_csi_wrapper == ENABLED,
            registry_credential: args.registry_credential_encoded.clone(),
            registry_image: args.authenticated_registry_image.clone(),
        }
    }
}

pub async fn cmd(args: &Args, client: kube::Client) -> EmptyResult {
    let props = IbmCloudProps::load(args.properties.as_deref())?;
    let vpc = Arc::new(VpcClient::new(&props)?);
    let cloud = Arc::new(IbmCloudAssert::new(vpc.clone()));
    let rolling = Arc::new(IbmRollingUpdateAssert::new(vpc, &props.vpc_id));
    let suite = IbmCloudSuite::new(props, args.into(), cloud, rolling);

    let filter = args.filter.as_deref().map(Regex::new).transpose()?;
    let mut env = TestEnv::new(client);
    run_plan(&mut env, &suite, filter.as_ref(), args.fail_fast).await?;

    print_summary(&env);
    let summary = env.summary();
    if !summary.success() {
        bail!(RunError::TestsFailed(summary.failed));
    }
    Ok(())
}

pub async fn run_plan(env: &mut TestEnv, suite: &IbmCloudSuite, filter: Option<&Regex>, fail_fast: bool) -> EmptyResult {
    for (name, feature) in plan(suite, filter) {
        let feature = match feature {
            Ok(f) => f,
            Err(err) => match err.downcast_ref::<FeatureError>() {
                Some(FeatureError::Skipped(reason)) => {
                    env.record_skip(name, reason);
                    continue;
                },
                None => return Err(err),
            },
        };

        info!("=== RUN {name}");
        let res = env.test(feature).await;
        if fail_fast && matches!(res.outcome, Outcome::Failed(_)) {
            warn!("stopping after first failure");
            break;
        }
    }
    Ok(())
}

fn print_summary(env: &TestEnv) {
    println!();
    for res in env.results() {
        let elapsed = humantime::format_duration(Duration::from_secs(res.elapsed.as_secs()));
        println!("--- {} {} ({elapsed})", res.outcome, res.name);
        match &res.outcome {
            Outcome::Failed(msgs) => msgs.iter().for_each(|m| println!("    {m}")),
            Outcome::Skipped(reason) => println!("    {reason}"),
            Outcome::Passed => (),
        }
    }

    let summary = env.summary();
    println!("\npassed: {}, failed: {}, skipped: {}", summary.passed, summary.failed, summary.skipped);
}
