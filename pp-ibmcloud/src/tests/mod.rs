
use std::sync::Arc;

use httpmock::Method::*;
use pp_testutils::*;
use rstest::*;
use serde_json::json;
use tracing_test::traced_test;

use super::*;

const TEST_TOKEN: &str = "test-iam-token";

fn props_for(server: &MockServerBuilder) -> IbmCloudProps {
    IbmCloudProps {
        api_key: TEST_API_KEY.into(),
        iam_endpoint: Some(server.base_url()),
        vpc_endpoint: Some(server.base_url()),
        region: "us-south".into(),
        vpc_id: TEST_VPC_ID.into(),
        ..Default::default()
    }
}

fn client_for(server: &MockServerBuilder) -> Arc<VpcClient> {
    Arc::new(VpcClient::new(&props_for(server)).unwrap())
}

fn handle_token(server: &mut MockServerBuilder) -> &mut MockServerBuilder {
    server.handle(|when, then| {
        when.method(POST)
            .path("/identity/token")
            .header("content-type", "application/x-www-form-urlencoded");
        then.json_body(json!({
            "access_token": TEST_TOKEN,
            "token_type": "Bearer",
            "expires_in": 3600,
        }));
    })
}

fn instance_json(id: &str, name: &str, profile: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "profile": {"name": profile},
        "status": "running",
    })
}
