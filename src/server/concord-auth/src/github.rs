//! GitHub authentication plugin.
//!
//! Consumes the profile document assembled after the OAuth2 exchange (user,
//! organizations and teams) and maps GitHub organizations and teams onto
//! Concord membership claims.
//!
//! GitHub team names are only unique within an organization. A profile with
//! two same-named teams in different organizations produces claims that
//! resolution rejects, so the login fails instead of dropping a membership.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use concord_claims::ClaimsPayload;
use concord_storage::UserId;

use crate::{
    AuthContext, AuthError, AuthMethod, AuthOutcome, AuthenticationPlugin, ConfigField, Credential,
    FieldKind,
};

fn default_callback_url() -> String {
    "/api/gateway/complete/github/".into()
}

fn default_member_role() -> String {
    "member".into()
}

/// Configuration for the GitHub plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfiguration {
    /// OAuth2 client id.
    pub key: String,
    /// OAuth2 client secret.
    pub secret: String,
    /// Callback URL registered with the GitHub application.
    #[serde(default = "default_callback_url")]
    pub callback_url: String,
    /// Restricts logins to members of this organization.
    #[serde(default)]
    pub organization: Option<String>,
    /// Role granted for every organization and team the user belongs to.
    #[serde(default = "default_member_role")]
    pub member_role: String,
}

impl GithubConfiguration {
    /// Creates a configuration with defaults for every optional field.
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
            callback_url: default_callback_url(),
            organization: None,
            member_role: default_member_role(),
        }
    }

    /// Field descriptions for operators.
    pub fn schema() -> Vec<ConfigField> {
        vec![
            ConfigField::optional(
                "callback_url",
                "Callback URL",
                FieldKind::Url,
                json!(default_callback_url()),
                "Provide this URL as the callback URL for your application as part of your registration process.",
            ),
            ConfigField::required(
                "key",
                "GitHub OAuth2 Key",
                FieldKind::String,
                "The OAuth2 key (Client ID) from your GitHub developer application.",
            ),
            ConfigField::required(
                "secret",
                "GitHub OAuth2 Secret",
                FieldKind::String,
                "The OAuth2 secret (Client Secret) from your GitHub developer application.",
            )
            .secret(),
            ConfigField::optional(
                "organization",
                "GitHub Organization",
                FieldKind::String,
                serde_json::Value::Null,
                "Only allow members of this GitHub organization to log in.",
            ),
            ConfigField::optional(
                "member_role",
                "Member Role",
                FieldKind::String,
                json!(default_member_role()),
                "Role granted on every organization and team the user belongs to.",
            ),
        ]
    }
}

/// A team membership in a GitHub profile.
#[derive(Debug, Clone, Deserialize)]
struct GithubTeam {
    name: String,
    organization: String,
}

/// Profile document handed over after the OAuth2 exchange.
#[derive(Debug, Clone, Deserialize)]
struct GithubProfile {
    id: serde_json::Value,
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    organizations: Vec<String>,
    #[serde(default)]
    teams: Vec<GithubTeam>,
}

/// Authentication plugin for GitHub profiles.
pub struct GithubPlugin {
    config: GithubConfiguration,
}

impl GithubPlugin {
    /// Creates a new GitHub plugin.
    pub fn new(config: GithubConfiguration) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AuthenticationPlugin for GithubPlugin {
    async fn authenticate(&self, credential: &Credential) -> Result<AuthOutcome, AuthError> {
        let Credential::Profile(profile) = credential else {
            return Err(AuthError::UnsupportedCredential(self.plugin_type()));
        };

        let profile: GithubProfile = serde_json::from_value(profile.clone())
            .map_err(|e| AuthError::MissingClaim(e.to_string()))?;

        if let Some(required) = &self.config.organization {
            if !profile.organizations.contains(required) {
                warn!(login = %profile.login, organization = %required, "User is not a member of the required organization");
                return Err(AuthError::PermissionDenied(format!(
                    "not a member of {required}"
                )));
            }
        }

        let user_id = match &profile.id {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return Err(AuthError::MissingClaim("id".into())),
        };

        let role = [self.config.member_role.as_str()];
        let claims = profile
            .organizations
            .iter()
            .fold(ClaimsPayload::new(), |claims, org| {
                claims.with_organization(org.as_str(), role)
            });
        let claims = profile.teams.iter().fold(claims, |claims, team| {
            claims.with_team(team.name.as_str(), team.organization.as_str(), role)
        });
        for (team, organizations) in claims.conflicting_teams() {
            warn!(login = %profile.login, %team, ?organizations, "Team name is shared by several organizations");
        }

        debug!(
            login = %profile.login,
            organizations = profile.organizations.len(),
            teams = profile.teams.len(),
            "GitHub profile accepted"
        );

        Ok(AuthOutcome {
            context: AuthContext {
                user_id: UserId::new(user_id),
                username: Some(profile.login),
                email: profile.email,
                display_name: profile.name,
                auth_method: AuthMethod::Github,
                expires_at: None,
            },
            claims,
        })
    }

    fn configuration_schema(&self) -> Vec<ConfigField> {
        GithubConfiguration::schema()
    }

    fn plugin_type(&self) -> &'static str {
        "github"
    }
}
