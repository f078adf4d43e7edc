//! Cloud providers and their per-provider capabilities.
//!
//! A [`Provider`] names a cloud. The things the config builder and the
//! gateway need to know about a cloud live behind the [`ProviderProfile`]
//! trait; [`profile`] resolves one, failing with
//! [`ClusterError::UnsupportedProvider`] for clouds that have no profile.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, ClusterResult};

/// Cloud providers a cluster can be requested on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Amazon Web Services.
    Aws,
    /// Google Cloud Platform.
    Gcp,
    /// Microsoft Azure.
    Azure,
}

impl Provider {
    /// Provider name as written into `provider.type` of the cluster config.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Gcp => "gcp",
            Self::Azure => "azure",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aws" => Ok(Self::Aws),
            "gcp" => Ok(Self::Gcp),
            "azure" => Ok(Self::Azure),
            _ => Err(ClusterError::unsupported_provider(s)),
        }
    }
}

/// What stratus needs to know about a provider.
pub trait ProviderProfile: Send + Sync + fmt::Debug {
    /// Key under `head_node`/`worker_nodes` holding the instance type.
    fn instance_type_key(&self) -> &'static str;

    /// Environment variable the provisioning tool reads the credentials file from.
    fn credentials_env(&self) -> &'static str;

    /// Map optional region/zone onto `provider.*` config fields.
    fn region_zone_fields(
        &self,
        region: Option<&str>,
        zone: Option<&str>,
    ) -> Vec<(&'static str, String)>;
}

/// Amazon Web Services profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct AwsProfile;

impl ProviderProfile for AwsProfile {
    fn instance_type_key(&self) -> &'static str {
        "InstanceType"
    }

    fn credentials_env(&self) -> &'static str {
        "AWS_CONFIG_FILE"
    }

    fn region_zone_fields(
        &self,
        region: Option<&str>,
        zone: Option<&str>,
    ) -> Vec<(&'static str, String)> {
        let mut fields = Vec::with_capacity(2);
        if let Some(region) = region.filter(|r| !r.is_empty()) {
            fields.push(("region", region.to_owned()));
        }
        if let Some(zone) = zone.filter(|z| !z.is_empty()) {
            fields.push(("zone", zone.to_owned()));
        }
        fields
    }
}

static AWS: AwsProfile = AwsProfile;

/// Resolve the profile for a provider.
///
/// Every lookup for a provider without a profile fails the same way.
pub fn profile(provider: Provider) -> ClusterResult<&'static dyn ProviderProfile> {
    match provider {
        Provider::Aws => Ok(&AWS),
        Provider::Gcp | Provider::Azure => Err(ClusterError::unsupported_provider(provider)),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("aws", Provider::Aws)]
    #[case("AWS", Provider::Aws)]
    #[case("Gcp", Provider::Gcp)]
    #[case("azure", Provider::Azure)]
    fn parses_provider_names(#[case] input: &str, #[case] expected: Provider) {
        assert_eq!(input.parse::<Provider>().unwrap(), expected);
    }

    #[test]
    fn unknown_provider_name_is_unsupported() {
        let err = "openstack".parse::<Provider>().unwrap_err();
        assert!(matches!(
            err,
            ClusterError::UnsupportedProvider { ref provider } if provider == "openstack"
        ));
    }

    #[test]
    fn aws_profile_keys() {
        let aws = profile(Provider::Aws).unwrap();
        assert_eq!(aws.instance_type_key(), "InstanceType");
        assert_eq!(aws.credentials_env(), "AWS_CONFIG_FILE");
    }

    #[rstest]
    #[case(Provider::Gcp)]
    #[case(Provider::Azure)]
    fn providers_without_profile_fail_every_time(#[case] provider: Provider) {
        for _ in 0..2 {
            let err = profile(provider).unwrap_err();
            assert_eq!(err.to_string(), format!("unsupported provider: {provider}"));
        }
    }

    #[test]
    fn region_and_zone_are_optional() {
        let aws = profile(Provider::Aws).unwrap();
        assert!(aws.region_zone_fields(None, None).is_empty());
        assert_eq!(
            aws.region_zone_fields(Some("us-west-2"), None),
            vec![("region", "us-west-2".to_owned())]
        );
        assert_eq!(
            aws.region_zone_fields(Some("us-west-2"), Some("us-west-2a")).len(),
            2
        );
    }
}
