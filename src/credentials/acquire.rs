//! Producing a complete, validated [`CredentialRecord`].

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::prompt::Prompter;
use super::store::CredentialStore;
use super::{read_credential_file, CredentialRecord, Field};
use crate::cluster::connect::{authenticate, connect_interactive};
use crate::cluster::ClusterControl;
use crate::error::InstallError;
use crate::identity::IdentityProvider;

const SCOPE_REJECTED: &str = "GitHub Personal Access Token requires at least a 'repo'-scope";

/// Load and verify a credential file.
///
/// Every check is fatal here: there is nobody to re-prompt.
pub fn acquire_from_file(
    path: &Path,
    cluster: &dyn ClusterControl,
    identity: &dyn IdentityProvider,
) -> Result<CredentialRecord> {
    let record = read_credential_file(path)?;
    record.validate(&path.display().to_string())?;

    if !authenticate(cluster, &record) {
        return Err(InstallError::Connectivity(format!(
            "Cannot authenticate at cluster {}",
            record.cluster_name
        ))
        .into());
    }
    if !identity
        .token_has_repo_scope(&record.github_personal_access_token)
        .context("checking personal access token scope")?
    {
        return Err(InstallError::validation(
            "Personal access token requires at least a 'repo'-scope",
        )
        .into());
    }
    if !identity
        .organization_exists(&record.github_personal_access_token, &record.github_org)
        .context("checking GitHub organization")?
    {
        return Err(InstallError::validation(format!(
            "Provided organization {} does not exist.",
            record.github_org
        ))
        .into());
    }
    info!(path = %path.display(), "credential file verified");
    Ok(record)
}

/// Interactive acquisition, seeded from the cache and saved back on confirmation.
pub fn acquire_interactive<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    store: &CredentialStore,
    cluster: &dyn ClusterControl,
    identity: &dyn IdentityProvider,
) -> Result<CredentialRecord> {
    let mut record = store.load_or_default();
    prompter.say("Please enter the following information or press enter to keep the old value:")?;

    loop {
        record = connect_interactive(cluster, prompter, record)?;
        record = prompter.read_field(record, Field::GithubUserName)?;
        record = prompter.read_field(record, Field::GithubUserEmail)?;
        record = read_scoped_token(prompter, identity, record)?;
        record = read_existing_org(prompter, identity, record)?;

        prompter.say("")?;
        prompter.say("Please confirm that the provided information is correct: ")?;
        prompter.say(&record.summary())?;
        prompter.say("")?;
        if prompter.confirm("Is this all correct? (y/n)")? {
            break;
        }
    }

    store.save(&record)?;
    info!(path = %store.path().display(), "credentials saved for the next run");
    Ok(record)
}

fn read_scoped_token<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    identity: &dyn IdentityProvider,
    mut record: CredentialRecord,
) -> Result<CredentialRecord> {
    loop {
        record = prompter.read_field(record, Field::GithubPersonalAccessToken)?;
        if identity
            .token_has_repo_scope(&record.github_personal_access_token)
            .context("checking personal access token scope")?
        {
            return Ok(record);
        }
        warn!("personal access token rejected: missing repo scope");
        prompter.say(SCOPE_REJECTED)?;
        record = record.with(Field::GithubPersonalAccessToken, "");
    }
}

fn read_existing_org<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    identity: &dyn IdentityProvider,
    mut record: CredentialRecord,
) -> Result<CredentialRecord> {
    loop {
        record = prompter.read_field(record, Field::GithubOrg)?;
        if identity
            .organization_exists(&record.github_personal_access_token, &record.github_org)
            .context("checking GitHub organization")?
        {
            return Ok(record);
        }
        warn!(org = %record.github_org, "organization not found");
        prompter.say(&format!(
            "Provided GitHub Organization {} does not exist.",
            record.github_org
        ))?;
        record = record.with(Field::GithubOrg, "");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::complete_record;
    use crate::error::classify;
    use crate::testing::{FakeCluster, FakeIdentity};
    use std::io::Cursor;
    use tempfile::TempDir;

    const TOKEN_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const TOKEN_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn write_creds(dir: &Path, record: &CredentialRecord) -> std::path::PathBuf {
        let path = dir.join("creds.json");
        std::fs::write(&path, serde_json::to_string(record).unwrap()).unwrap();
        path
    }

    #[test]
    fn file_missing_org_fails_before_any_cluster_call() {
        let tmp = TempDir::new().unwrap();
        let path = write_creds(tmp.path(), &complete_record().with(Field::GithubOrg, ""));
        let cluster = FakeCluster::default();

        let err = acquire_from_file(&path, &cluster, &FakeIdentity::accepting()).unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(InstallError::Validation(msg)) if msg.contains("GitHub Organization")
        ));
        assert!(cluster.calls().is_empty());
    }

    #[test]
    fn file_with_unreachable_cluster_is_a_connectivity_error() {
        let tmp = TempDir::new().unwrap();
        let path = write_creds(tmp.path(), &complete_record());
        let cluster = FakeCluster::default();
        cluster.reject_credentials_for("keptn-cluster");

        let err = acquire_from_file(&path, &cluster, &FakeIdentity::accepting()).unwrap_err();
        assert!(matches!(classify(&err), Some(InstallError::Connectivity(_))));
    }

    #[test]
    fn file_with_unknown_org_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_creds(tmp.path(), &complete_record());
        let identity = FakeIdentity::accepting().without_org("sockshop-org");

        let err = acquire_from_file(&path, &FakeCluster::default(), &identity).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn file_with_valid_record_passes() {
        let tmp = TempDir::new().unwrap();
        let path = write_creds(tmp.path(), &complete_record());
        let record =
            acquire_from_file(&path, &FakeCluster::default(), &FakeIdentity::accepting()).unwrap();
        assert_eq!(record, complete_record());
    }

    #[test]
    fn interactive_clears_only_rejected_fields() {
        let tmp = TempDir::new().unwrap();
        let store = CredentialStore::new(tmp.path().join(".install-creds"));
        let cluster = FakeCluster::default();
        let identity = FakeIdentity::accepting()
            .without_repo_scope(TOKEN_A)
            .without_org("ghost-org");

        let script = [
            "c1", "zone-1", "proj-1", // cluster
            "ops-bot", "ops@example.com", // user + email
            TOKEN_A, TOKEN_B, // first token lacks scope
            "ghost-org", "real-org", // first org missing
            "y",
        ]
        .join("\n")
            + "\n";
        let mut prompter = Prompter::new(Cursor::new(script.into_bytes()), Vec::new());

        let record = acquire_interactive(&mut prompter, &store, &cluster, &identity).unwrap();
        assert_eq!(record.github_personal_access_token, TOKEN_B);
        assert_eq!(record.github_org, "real-org");
        assert_eq!(record.github_user_name, "ops-bot");
        assert_eq!(store.load_or_default(), record);

        let transcript = String::from_utf8(prompter.into_output()).unwrap();
        assert!(transcript.contains(SCOPE_REJECTED));
        assert!(transcript.contains("GitHub Personal Access Token []: "));
        assert!(transcript.contains("Provided GitHub Organization ghost-org does not exist."));
        assert!(transcript.contains("GitHub Organization: real-org"));
    }

    #[test]
    fn declining_confirmation_restarts_from_cluster_connection() {
        let tmp = TempDir::new().unwrap();
        let store = CredentialStore::new(tmp.path().join(".install-creds"));
        store.save(&complete_record()).unwrap();
        let cluster = FakeCluster::default();

        // First pass keeps every cached value, then the operator says no and
        // changes only the user name on the second pass.
        let script = "\n\n\n\n\n\n\nn\n\n\n\nnew-user\n\n\n\nyes\n";
        let mut prompter = Prompter::new(Cursor::new(script.as_bytes().to_vec()), Vec::new());

        let record =
            acquire_interactive(&mut prompter, &store, &cluster, &FakeIdentity::accepting()).unwrap();
        assert_eq!(record.github_user_name, "new-user");
        assert_eq!(record.cluster_name, "keptn-cluster");
        assert_eq!(cluster.calls_matching("get-credentials"), 2);
        assert_eq!(store.load_or_default().github_user_name, "new-user");
    }

    #[test]
    fn identity_outage_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let store = CredentialStore::new(tmp.path().join(".install-creds"));
        store.save(&complete_record()).unwrap();
        let script = "\n\n\n\n\n\n";
        let mut prompter = Prompter::new(Cursor::new(script.as_bytes().to_vec()), Vec::new());

        let err = acquire_interactive(
            &mut prompter,
            &store,
            &FakeCluster::default(),
            &FakeIdentity::unreachable(),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("token scope"));
    }
}
