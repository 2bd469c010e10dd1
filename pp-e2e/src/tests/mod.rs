mod test_case_test;

use std::sync::Arc;

use assertables::*;
use pp_core::cloud::{
    MockCloudAssert,
    MockRollingUpdateAssert,
};
use pp_core::feature::{
    Outcome,
    TestEnv,
};
use pp_core::prelude::*;
use pp_ibmcloud::IbmCloudProps;
use pp_testutils::*;
use rstest::*;
use tracing_test::traced_test;

use crate::ibmcloud::{
    IbmCloudSuite,
    SuiteOptions,
};

fn props(profile: &str, arch: &str) -> IbmCloudProps {
    IbmCloudProps {
        api_key: TEST_API_KEY.into(),
        region: "us-south".into(),
        vpc_id: TEST_VPC_ID.into(),
        instance_profile: profile.into(),
        podvm_image_arch: arch.into(),
        ..Default::default()
    }
}

// Neither mock has expectations, so building a plan must not touch the cloud
fn suite_with(profile: &str, opts: SuiteOptions) -> IbmCloudSuite {
    IbmCloudSuite::new(
        props(profile, "amd64"),
        opts,
        Arc::new(MockCloudAssert::new()),
        Arc::new(MockRollingUpdateAssert::new()),
    )
}

#[fixture]
fn suite() -> IbmCloudSuite {
    suite_with("bx2-2x8", SuiteOptions::default())
}
