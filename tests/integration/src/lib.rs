//! Integration tests for Concord.
//!
//! These tests run the full claims workflow against the SQLite repository,
//! through the login flow and through the `concord` binary.

// Allow unwrap() in tests - panics are acceptable for test assertions
#![allow(clippy::disallowed_methods)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tempfile::TempDir;

use concord_claims::ClaimsProcessor;
use concord_storage_sqlite::SqliteRepository;

// ============================================================================
// Test Store
// ============================================================================

/// A SQLite membership store in its own temporary directory.
pub struct TestStore {
    pub repository: SqliteRepository,
    pub tenant: String,
    data_dir: TempDir,
}

impl TestStore {
    /// Opens a fresh store.
    pub async fn open() -> Result<Self> {
        let data_dir = TempDir::new().context("Failed to create temp dir")?;
        let tenant = "integration".to_string();
        let repository = SqliteRepository::open(data_dir.path(), &tenant).await?;

        Ok(Self {
            repository,
            tenant,
            data_dir,
        })
    }

    /// Directory holding the tenant database.
    pub fn data_dir(&self) -> &Path {
        self.data_dir.path()
    }

    /// A claims processor over this store.
    pub fn processor(&self) -> ClaimsProcessor {
        ClaimsProcessor::new(Arc::new(self.repository.clone()))
    }
}

// ============================================================================
// CLI Harness
// ============================================================================

/// Find the CLI binary in the target directory.
pub fn find_cli_binary() -> Result<PathBuf> {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());

    // Try debug build first, then release
    let candidates = [
        Path::new(&manifest_dir).join("../../target/debug/concord"),
        Path::new(&manifest_dir).join("../../target/debug/concord.exe"),
        Path::new(&manifest_dir).join("../../target/release/concord"),
        Path::new(&manifest_dir).join("../../target/release/concord.exe"),
    ];

    for candidate in &candidates {
        if candidate.exists() {
            return Ok(candidate.canonicalize()?);
        }
    }

    bail!(
        "Could not find concord binary. Run 'cargo build -p concord-cli' first. Searched in: {:?}",
        candidates
    )
}

/// Runs the CLI against `store` with the given arguments.
pub fn run_cli(binary: &Path, store: &TestStore, args: &[&str]) -> Result<Output> {
    Command::new(binary)
        .arg("--config")
        .arg(store.data_dir().join("missing.toml"))
        .arg("--data-dir")
        .arg(store.data_dir())
        .arg("--tenant")
        .arg(&store.tenant)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .with_context(|| format!("Failed to run {:?}", binary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use concord_auth::{AuthError, Credential, LoginFlow, OidcConfiguration, OidcPlugin};
    use concord_claims::{ClaimsError, ClaimsPayload};
    use concord_storage::{MembershipRepository, MembershipTarget, UserId};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "integration-secret-minimum-32-chars";

    fn galaxy_claims() -> ClaimsPayload {
        ClaimsPayload::from_json(
            r#"{
                "organization_membership": {"Galaxy": ["member"]},
                "team_membership": {"Maintainers": ["member"]},
                "team_organization": {"Maintainers": "Galaxy"}
            }"#,
        )
        .unwrap()
    }

    fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[tokio::test]
    async fn test_galaxy_scenario_on_sqlite() {
        let store = TestStore::open().await.unwrap();
        let user = UserId::new("alice");

        store
            .processor()
            .process_organization_and_team_memberships(&galaxy_claims(), &user)
            .await
            .unwrap();

        let galaxy = store.repository.organization("Galaxy").await.unwrap().unwrap();
        let teams = store.repository.teams_of(galaxy.id).await.unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].name, "Maintainers");

        let grants = store.repository.grants_of(&user).await.unwrap();
        let targets: BTreeSet<_> = grants.iter().map(|g| (g.target, g.role.as_str())).collect();
        assert_eq!(
            targets,
            BTreeSet::from([
                (MembershipTarget::Organization(galaxy.id), "member"),
                (MembershipTarget::Team(teams[0].id), "member"),
            ])
        );
    }

    #[tokio::test]
    async fn test_repeated_processing_on_sqlite() {
        let store = TestStore::open().await.unwrap();
        let user = UserId::new("alice");
        let processor = store.processor();

        for _ in 0..3 {
            processor
                .process_organization_and_team_memberships(&galaxy_claims(), &user)
                .await
                .unwrap();
        }

        let orgs = store.repository.organizations().await.unwrap();
        assert_eq!(orgs.len(), 1);
        assert_eq!(store.repository.teams_of(orgs[0].id).await.unwrap().len(), 1);
        assert_eq!(store.repository.grants_of(&user).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_orphan_team_on_sqlite() {
        let store = TestStore::open().await.unwrap();
        let claims = ClaimsPayload::from_json(
            r#"{"organization_membership": {"Galaxy": ["member"]}, "team_membership": {"Orphan": ["member"]}}"#,
        )
        .unwrap();

        let result = store
            .processor()
            .process_organization_and_team_memberships(&claims, &UserId::new("alice"))
            .await;

        assert!(matches!(result, Err(ClaimsError::MalformedClaims(_))));
        assert!(store.repository.organizations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_team_name_under_two_organizations() {
        let store = TestStore::open().await.unwrap();
        let processor = store.processor();

        processor
            .process_organization_and_team_memberships(
                &ClaimsPayload::new().with_team("Maintainers", "Galaxy", ["member"]),
                &UserId::new("alice"),
            )
            .await
            .unwrap();
        processor
            .process_organization_and_team_memberships(
                &ClaimsPayload::new().with_team("Maintainers", "Nebula", ["admin"]),
                &UserId::new("bob"),
            )
            .await
            .unwrap();

        let galaxy = store.repository.organization("Galaxy").await.unwrap().unwrap();
        let nebula = store.repository.organization("Nebula").await.unwrap().unwrap();
        let galaxy_teams = store.repository.teams_of(galaxy.id).await.unwrap();
        let nebula_teams = store.repository.teams_of(nebula.id).await.unwrap();

        assert_eq!(galaxy_teams.len(), 1);
        assert_eq!(nebula_teams.len(), 1);
        assert_ne!(galaxy_teams[0].id, nebula_teams[0].id);

        let bob = store.repository.grants_of(&UserId::new("bob")).await.unwrap();
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].target, MembershipTarget::Team(nebula_teams[0].id));
        assert_eq!(bob[0].role, "admin");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_logins_on_sqlite() {
        let store = TestStore::open().await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let processor = store.processor();
                tokio::spawn(async move {
                    processor
                        .process_organization_and_team_memberships(
                            &galaxy_claims(),
                            &UserId::new(format!("user-{i}")),
                        )
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let orgs = store.repository.organizations().await.unwrap();
        assert_eq!(orgs.len(), 1);
        assert_eq!(store.repository.teams_of(orgs[0].id).await.unwrap().len(), 1);
        for i in 0..8 {
            let grants = store
                .repository
                .grants_of(&UserId::new(format!("user-{i}")))
                .await
                .unwrap();
            assert_eq!(grants.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_oidc_login_flow() {
        let store = TestStore::open().await.unwrap();

        let mut config = OidcConfiguration::new("https://idp.example.com", "concord");
        config.algorithm = "HS256".into();
        config.secret = Some(SECRET.into());
        let plugin = Arc::new(OidcPlugin::new(config).unwrap());
        let flow = LoginFlow::new(plugin, store.processor());

        let token = encode(
            &Header::default(),
            &json!({
                "sub": "jdoe",
                "aud": "concord",
                "iat": now(),
                "exp": now() + 300,
                "organization_membership": {"Galaxy": ["member", "admin"]},
                "team_membership": {"Maintainers": ["member"]},
                "team_organization": {"Maintainers": "Galaxy"}
            }),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let ctx = flow.login(&Credential::IdToken(token)).await.unwrap();

        assert_eq!(ctx.user_id, UserId::new("jdoe"));
        assert_eq!(store.repository.grants_of(&ctx.user_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_oidc_login_with_malformed_claims_fails() {
        let store = TestStore::open().await.unwrap();

        let mut config = OidcConfiguration::new("https://idp.example.com", "concord");
        config.algorithm = "HS256".into();
        config.secret = Some(SECRET.into());
        let flow = LoginFlow::new(Arc::new(OidcPlugin::new(config).unwrap()), store.processor());

        let token = encode(
            &Header::default(),
            &json!({
                "sub": "jdoe",
                "aud": "concord",
                "iat": now(),
                "exp": now() + 300,
                "team_membership": {"Orphan": ["member"]}
            }),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let result = flow.login(&Credential::IdToken(token)).await;

        assert!(matches!(
            result,
            Err(AuthError::Claims(ClaimsError::MalformedClaims(_)))
        ));
        assert!(store.repository.organizations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cli_reconcile() {
        let binary = match find_cli_binary() {
            Ok(binary) => binary,
            Err(e) => {
                eprintln!("skipping CLI test: {e}");
                return;
            },
        };

        let store = TestStore::open().await.unwrap();
        let claims_path = store.data_dir().join("claims.json");
        std::fs::write(
            &claims_path,
            serde_json::to_string(&galaxy_claims()).unwrap(),
        )
        .unwrap();
        let claims_arg = claims_path.to_str().unwrap();

        for _ in 0..2 {
            let output = run_cli(
                &binary,
                &store,
                &["reconcile", "--user", "alice", "--claims", claims_arg],
            )
            .unwrap();
            assert!(
                output.status.success(),
                "reconcile failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let orgs = store.repository.organizations().await.unwrap();
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].name, "Galaxy");
        assert_eq!(
            store
                .repository
                .grants_of(&UserId::new("alice"))
                .await
                .unwrap()
                .len(),
            2
        );

        let output = run_cli(&binary, &store, &["show", "--user", "alice"]).unwrap();
        assert!(output.status.success());
        let grants: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(grants.as_array().unwrap().len(), 2);
    }
}
