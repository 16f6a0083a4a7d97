//! Post-install bootstrap: API token, control endpoint, CLI configuration.

use anyhow::{Context, Result};
use base64::Engine;
use serde_json::Value;
use tracing::info;

use crate::client_config::ClientConfigurator;
use crate::cluster::ClusterControl;
use crate::config::InstallerConfig;
use crate::credentials::CredentialRecord;
use crate::error::{classify, InstallError};
use crate::retry::{poll_until, CancelFlag, Poll, RetryPolicy};

pub const KEPTN_NAMESPACE: &str = "keptn";
pub const API_TOKEN_SECRET: &str = "keptn-api-token";
pub const CONTROL_SERVICE: &str = "control";

/// Extract and decode `data["keptn-api-token"]` from a secret object.
pub fn decode_api_token(secret_json: &str) -> Result<String> {
    let secret: Value = serde_json::from_str(secret_json).context("parsing secret JSON")?;
    let encoded = secret
        .get("data")
        .and_then(|data| data.get(API_TOKEN_SECRET))
        .and_then(Value::as_str)
        .with_context(|| format!("secret has no data entry '{API_TOKEN_SECRET}'"))?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .context("decoding API token")?;
    String::from_utf8(decoded).context("API token is not valid UTF-8")
}

pub fn retrieve_api_token(cluster: &dyn ClusterControl) -> Result<String> {
    cluster
        .secret_json(KEPTN_NAMESPACE, API_TOKEN_SECRET)
        .and_then(|json| decode_api_token(&json))
        .map_err(|err| InstallError::bootstrap(format!("Could not retrieve keptn API token: {err:#}")).into())
}

/// A domain is routable when it equals one of `suffixes` or ends in `.<suffix>`.
pub fn endpoint_accepted(domain: &str, suffixes: &[String]) -> bool {
    !domain.is_empty()
        && suffixes.iter().any(|suffix| {
            domain == suffix
                || domain
                    .strip_suffix(suffix.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        })
}

/// Poll the control service until it reports a routable domain.
///
/// `notify` receives the "not yet available" notice after every
/// `notice_every` consecutive failures.
pub fn wait_for_endpoint(
    cluster: &dyn ClusterControl,
    suffixes: &[String],
    policy: &RetryPolicy,
    notice_every: u32,
    cancel: &CancelFlag,
    mut notify: impl FnMut(&str),
) -> Result<String> {
    let notice = format!(
        "API endpoint not yet available... trying again in {}s",
        policy.interval.as_secs()
    );
    let every = notice_every.max(1);
    let result = poll_until("keptn API endpoint", policy, cancel, |attempt| {
        let domain = cluster
            .service_domain(KEPTN_NAMESPACE, CONTROL_SERVICE)
            .map(|d| d.trim().to_string())
            .unwrap_or_default();
        if endpoint_accepted(&domain, suffixes) {
            return Poll::Ready(domain);
        }
        if attempt % every == 0 {
            notify(&notice);
        }
        Poll::Pending
    });

    match result {
        Ok(domain) => Ok(format!("https://{domain}")),
        Err(err) if matches!(classify(&err), Some(InstallError::Convergence { .. })) => {
            Err(InstallError::bootstrap(format!("Could not retrieve keptn API endpoint: {err}")).into())
        }
        Err(err) => Err(err),
    }
}

/// Authenticate the CLI at `endpoint` and store the source-control identity.
pub fn configure_client(
    configurator: &dyn ClientConfigurator,
    endpoint: &str,
    api_token: &str,
    record: &CredentialRecord,
) -> Result<()> {
    configurator
        .authenticate(endpoint, api_token)
        .map_err(|err| -> anyhow::Error {
            InstallError::bootstrap(format!("Authentication at keptn failed: {err:#}")).into()
        })?;
    configurator
        .configure(
            &record.github_org,
            &record.github_user_name,
            &record.github_personal_access_token,
        )
        .map_err(|err| -> anyhow::Error {
            InstallError::bootstrap(format!("Configuration failed: {err:#}")).into()
        })?;
    info!("Your CLI is now successfully configured.");
    Ok(())
}

/// The whole post-install stage.
pub fn bootstrap_client(
    cluster: &dyn ClusterControl,
    configurator: &dyn ClientConfigurator,
    config: &InstallerConfig,
    record: &CredentialRecord,
    cancel: &CancelFlag,
) -> Result<String> {
    info!("Configuring the keptn CLI");
    let api_token = retrieve_api_token(cluster)?;
    let endpoint = wait_for_endpoint(
        cluster,
        &config.routable_suffixes,
        &config.endpoint,
        config.notice_every,
        cancel,
        |notice| info!("{notice}"),
    )?;
    info!(endpoint = %endpoint, "keptn API endpoint available");
    configure_client(configurator, &endpoint, &api_token, record)?;
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::complete_record;
    use crate::testing::{FakeCluster, FakeConfigurator, FAKE_API_TOKEN, FAKE_DOMAIN};
    use std::time::Duration;

    fn xip() -> Vec<String> {
        vec!["xip.io".to_string()]
    }

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(Duration::ZERO, max_attempts)
    }

    #[test]
    fn token_is_base64_decoded() {
        let json = r#"{"data":{"keptn-api-token":"czNjcjN0"}}"#;
        assert_eq!(decode_api_token(json).unwrap(), "s3cr3t");
        assert!(decode_api_token(r#"{"data":{}}"#).is_err());
        assert!(decode_api_token(r#"{"data":{"keptn-api-token":"%%%"}}"#).is_err());
    }

    #[test]
    fn missing_secret_is_a_bootstrap_error() {
        let cluster = FakeCluster::default();
        cluster.set_secret(None);
        let err = retrieve_api_token(&cluster).unwrap_err();
        assert!(matches!(classify(&err), Some(InstallError::Bootstrap(_))));
        assert!(err.to_string().contains("Could not retrieve keptn API token"));
        assert!(err.to_string().contains("keptn.sh/docs"));
    }

    #[test]
    fn suffix_must_match_on_a_label_boundary() {
        assert!(endpoint_accepted("control.keptn.35.1.2.3.xip.io", &xip()));
        assert!(endpoint_accepted("xip.io", &xip()));
        assert!(!endpoint_accepted("x.notxip.test", &xip()));
        assert!(!endpoint_accepted("evilxip.io", &xip()));
        assert!(!endpoint_accepted("", &xip()));
    }

    #[test]
    fn unroutable_domain_is_never_accepted() {
        let cluster = FakeCluster::default();
        cluster.set_fallback_domain("x.notxip.test");
        let mut notices = 0;

        let err = wait_for_endpoint(&cluster, &xip(), &instant(29), 15, &CancelFlag::new(), |_| {
            notices += 1
        })
        .unwrap_err();
        assert_eq!(notices, 1);
        assert_eq!(cluster.calls_matching("get-ksvc keptn/control"), 29);
        assert!(matches!(classify(&err), Some(InstallError::Bootstrap(_))));
    }

    #[test]
    fn notices_repeat_every_fifteen_failures() {
        let cluster = FakeCluster::default();
        for _ in 0..30 {
            cluster.push_domain("x.notxip.test");
        }
        let mut notices = Vec::new();
        let endpoint = wait_for_endpoint(&cluster, &xip(), &instant(100), 15, &CancelFlag::new(), |n| {
            notices.push(n.to_string())
        })
        .unwrap();
        assert_eq!(endpoint, format!("https://{FAKE_DOMAIN}"));
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0], "API endpoint not yet available... trying again in 0s");
    }

    #[test]
    fn blank_domain_is_retried() {
        let cluster = FakeCluster::default();
        cluster.push_domain("");
        cluster.push_domain("  \n");
        let endpoint =
            wait_for_endpoint(&cluster, &xip(), &instant(5), 15, &CancelFlag::new(), |_| {}).unwrap();
        assert_eq!(endpoint, format!("https://{FAKE_DOMAIN}"));
        assert_eq!(cluster.calls_matching("get-ksvc"), 3);
    }

    #[test]
    fn client_is_authenticated_then_configured() {
        let configurator = FakeConfigurator::default();
        configure_client(&configurator, "https://e.xip.io", "api", &complete_record()).unwrap();
        assert_eq!(
            configurator.calls(),
            vec![
                "auth https://e.xip.io api".to_string(),
                "configure sockshop-org ops-bot 0123456789abcdef0123456789abcdef01234567".to_string(),
            ]
        );
    }

    #[test]
    fn failed_authentication_skips_configure() {
        let configurator = FakeConfigurator::rejecting_auth();
        let err = configure_client(&configurator, "https://e.xip.io", "api", &complete_record())
            .unwrap_err();
        assert!(err.to_string().starts_with("Authentication at keptn failed: 401 Unauthorized"));
        assert_eq!(configurator.calls().len(), 1);
    }

    #[test]
    fn failed_configuration_is_reported() {
        let configurator = FakeConfigurator::rejecting_configure();
        let err = configure_client(&configurator, "https://e.xip.io", "api", &complete_record())
            .unwrap_err();
        assert!(err.to_string().starts_with("Configuration failed:"));
    }

    #[test]
    fn full_bootstrap_uses_secret_token() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = InstallerConfig::with_keptn_dir(tmp.path().to_path_buf());
        config.endpoint = instant(3);
        let cluster = FakeCluster::default();
        let configurator = FakeConfigurator::default();

        let endpoint =
            bootstrap_client(&cluster, &configurator, &config, &complete_record(), &CancelFlag::new())
                .unwrap();
        assert_eq!(endpoint, format!("https://{FAKE_DOMAIN}"));
        assert_eq!(
            configurator.calls()[0],
            format!("auth https://{FAKE_DOMAIN} {FAKE_API_TOKEN}")
        );
    }
}
