use std::fs::File;

use pp_core::errors::*;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::*;

const DEFAULT_IAM_ENDPOINT: &str = "https://iam.cloud.ibm.com";
const S390X_ARCH: &str = "s390x";

// Each property can be overridden from the environment, which is how CI passes the secrets in
const API_KEY_ENV_VAR: &str = "IBMCLOUD_API_KEY";
const IAM_ENDPOINT_ENV_VAR: &str = "IAM_SERVICE_URL";
const VPC_ENDPOINT_ENV_VAR: &str = "VPC_SERVICE_URL";
const REGION_ENV_VAR: &str = "REGION";
const VPC_ID_ENV_VAR: &str = "VPC_ID";
const INSTANCE_PROFILE_ENV_VAR: &str = "INSTANCE_PROFILE_NAME";
const PODVM_IMAGE_ARCH_ENV_VAR: &str = "PODVM_IMAGE_ARCH";

err_impl! {IbmCloudPropsError,
    #[error("missing required IBM Cloud property: {0}")]
    MissingProperty(String),
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IbmCloudProps {
    #[serde(default)]
    pub api_key: String,

    pub iam_endpoint: Option<String>,
    pub vpc_endpoint: Option<String>,

    #[serde(default)]
    pub region: String,

    #[serde(default)]
    pub vpc_id: String,

    #[serde(default)]
    pub instance_profile: String,

    #[serde(default)]
    pub podvm_image_arch: String,
}

impl IbmCloudProps {
    pub fn load(filename: Option<&str>) -> anyhow::Result<IbmCloudProps> {
        let mut props: IbmCloudProps = match filename {
            Some(f) => {
                info!("loading IBM Cloud properties from {f}");
                serde_yaml::from_reader(File::open(f)?)?
            },
            None => Default::default(),
        };
        props.apply_overrides(|key| std::env::var(key).ok());
        props.validate()?;
        Ok(props)
    }

    pub fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        let nonempty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = nonempty(API_KEY_ENV_VAR) {
            self.api_key = v;
        }
        if let Some(v) = nonempty(IAM_ENDPOINT_ENV_VAR) {
            self.iam_endpoint = Some(v);
        }
        if let Some(v) = nonempty(VPC_ENDPOINT_ENV_VAR) {
            self.vpc_endpoint = Some(v);
        }
        if let Some(v) = nonempty(REGION_ENV_VAR) {
            self.region = v;
        }
        if let Some(v) = nonempty(VPC_ID_ENV_VAR) {
            self.vpc_id = v;
        }
        if let Some(v) = nonempty(INSTANCE_PROFILE_ENV_VAR) {
            self.instance_profile = v;
        }
        if let Some(v) = nonempty(PODVM_IMAGE_ARCH_ENV_VAR) {
            self.podvm_image_arch = v;
        }
    }

    pub fn validate(&self) -> EmptyResult {
        if self.api_key.is_empty() {
            bail!(IbmCloudPropsError::missing_property("apiKey"));
        }
        if self.vpc_endpoint.is_none() && self.region.is_empty() {
            bail!(IbmCloudPropsError::missing_property("region (or vpcEndpoint)"));
        }
        Ok(())
    }

    pub fn iam_endpoint(&self) -> String {
        self.iam_endpoint.clone().unwrap_or_else(|| DEFAULT_IAM_ENDPOINT.into())
    }

    pub fn vpc_endpoint(&self) -> String {
        self.vpc_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}.iaas.cloud.ibm.com", self.region))
    }

    pub fn is_s390x(&self) -> bool {
        self.podvm_image_arch.eq_ignore_ascii_case(S390X_ARCH)
    }
}

// Builds the name of the instance profile a PodVM is expected to get, e.g. bx2-2x8 on x86 or
// bz2e-2x8 on a secure-execution capable s390x profile
pub fn get_profile_type(prefix: &str, config: &str, props: &IbmCloudProps) -> String {
    if props.is_s390x() {
        if props.instance_profile.contains("e-") {
            return format!("{prefix}z2e-{config}");
        }
        return format!("{prefix}z2-{config}");
    }
    format!("{prefix}x2-{config}")
}
