//! OpenID Connect authentication plugin.
//!
//! Validates an ID token and reads the user identity and membership claims
//! from it. The OAuth2 code exchange that produced the token happens
//! upstream.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use concord_claims::ClaimsPayload;
use concord_storage::UserId;

use crate::{
    AuthContext, AuthError, AuthMethod, AuthOutcome, AuthenticationPlugin, ConfigField, Credential,
    FieldKind,
};

fn default_true() -> bool {
    true
}

fn default_scope() -> Vec<String> {
    vec!["openid".into(), "profile".into(), "email".into()]
}

fn default_algorithm() -> String {
    "RS256".into()
}

fn default_max_age() -> u64 {
    600
}

fn default_id_key() -> String {
    "sub".into()
}

fn default_username_key() -> String {
    "preferred_username".into()
}

fn default_organization_claim() -> String {
    "organization_membership".into()
}

fn default_team_claim() -> String {
    "team_membership".into()
}

fn default_team_organization_claim() -> String {
    "team_organization".into()
}

/// Configuration for the OIDC plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfiguration {
    /// Provider URL up to `/.well-known/openid-configuration`.
    pub endpoint: String,
    /// Client ID. Also the expected token audience.
    pub key: String,
    /// Client secret. Used as the HMAC key for `HS*` algorithms.
    #[serde(default)]
    pub secret: Option<String>,
    /// Verify the provider TLS certificate.
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    /// Requested scopes.
    #[serde(default = "default_scope")]
    pub scope: Vec<String>,
    /// PEM public key for `RS*`/`ES*` algorithms.
    #[serde(default)]
    pub public_key: String,
    /// JWT algorithm.
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Maximum ID token age in seconds, measured from `iat`.
    #[serde(default = "default_max_age")]
    pub id_token_max_age: u64,
    /// Claim holding the user id.
    #[serde(default = "default_id_key")]
    pub id_key: String,
    /// Claim holding the username.
    #[serde(default = "default_username_key")]
    pub username_key: String,
    /// Expected issuer. Empty disables the check.
    #[serde(default)]
    pub id_token_issuer: String,
    /// Claim holding organization membership.
    #[serde(default = "default_organization_claim")]
    pub organization_membership_claim: String,
    /// Claim holding team membership.
    #[serde(default = "default_team_claim")]
    pub team_membership_claim: String,
    /// Claim pairing each team with its owning organization.
    #[serde(default = "default_team_organization_claim")]
    pub team_organization_claim: String,
}

impl OidcConfiguration {
    /// Creates a configuration with defaults for every optional field.
    pub fn new(endpoint: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            key: key.into(),
            secret: None,
            verify_ssl: true,
            scope: default_scope(),
            public_key: String::new(),
            algorithm: default_algorithm(),
            id_token_max_age: default_max_age(),
            id_key: default_id_key(),
            username_key: default_username_key(),
            id_token_issuer: String::new(),
            organization_membership_claim: default_organization_claim(),
            team_membership_claim: default_team_claim(),
            team_organization_claim: default_team_organization_claim(),
        }
    }

    /// Field descriptions for operators.
    pub fn schema() -> Vec<ConfigField> {
        vec![
            ConfigField::required(
                "endpoint",
                "OIDC Provider URL",
                FieldKind::Url,
                "The URL for your OIDC provider including the path up to /.well-known/openid-configuration",
            ),
            ConfigField::optional(
                "verify_ssl",
                "Verify OIDC Provider Certificate",
                FieldKind::Boolean,
                json!(true),
                "Verify the OIDC provider ssl certificate.",
            ),
            ConfigField::required(
                "key",
                "OIDC Key",
                FieldKind::String,
                "The OIDC key (Client ID) from your IDP. Also used as the token audience.",
            ),
            ConfigField::optional(
                "secret",
                "OIDC Secret",
                FieldKind::String,
                Value::Null,
                "The OIDC secret (Client Secret) from your IDP.",
            )
            .secret(),
            ConfigField::optional(
                "scope",
                "OIDC Scope",
                FieldKind::List,
                json!(default_scope()),
                "The authorization scope for users.",
            ),
            ConfigField::optional(
                "public_key",
                "OIDC Public Key",
                FieldKind::String,
                json!(""),
                "The public key from your IDP used to verify ID tokens.",
            ),
            ConfigField::optional(
                "algorithm",
                "OIDC JWT Algorithm",
                FieldKind::String,
                json!(default_algorithm()),
                "The algorithm for decoding JWT responses from the IDP.",
            ),
            ConfigField::optional(
                "id_token_max_age",
                "OIDC Token Max Age",
                FieldKind::Integer,
                json!(default_max_age()),
                "The maximum allowed age (in seconds) of the ID token.",
            ),
            ConfigField::optional(
                "id_key",
                "ID Key",
                FieldKind::String,
                json!(default_id_key()),
                "The JSON key used to extract the user's ID from the ID token.",
            ),
            ConfigField::optional(
                "username_key",
                "Username Key",
                FieldKind::String,
                json!(default_username_key()),
                "The JSON key used to extract the user's username from the ID token.",
            ),
            ConfigField::optional(
                "id_token_issuer",
                "ID Token Issuer",
                FieldKind::String,
                json!(""),
                "Expected issuer ('iss') of the ID token. Empty disables the check.",
            ),
            ConfigField::optional(
                "organization_membership_claim",
                "Organization Membership Claim",
                FieldKind::String,
                json!(default_organization_claim()),
                "Claim mapping organization names to role lists.",
            ),
            ConfigField::optional(
                "team_membership_claim",
                "Team Membership Claim",
                FieldKind::String,
                json!(default_team_claim()),
                "Claim mapping team names to role lists.",
            ),
            ConfigField::optional(
                "team_organization_claim",
                "Team Organization Claim",
                FieldKind::String,
                json!(default_team_organization_claim()),
                "Claim mapping team names to their owning organization.",
            ),
        ]
    }
}

/// Authentication plugin for OIDC ID tokens.
pub struct OidcPlugin {
    config: OidcConfiguration,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl OidcPlugin {
    /// Creates a new OIDC plugin.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the algorithm is unknown or
    /// the key material does not match it.
    pub fn new(config: OidcConfiguration) -> Result<Self, AuthError> {
        let algorithm = Algorithm::from_str(&config.algorithm).map_err(|_| {
            AuthError::Configuration(format!("unknown algorithm: {}", config.algorithm))
        })?;

        let decoding_key = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                let secret = config.secret.as_deref().unwrap_or_default();
                if secret.is_empty() {
                    return Err(AuthError::Configuration(
                        "secret is required for HMAC algorithms".into(),
                    ));
                }
                DecodingKey::from_secret(secret.as_bytes())
            },
            Algorithm::ES256 | Algorithm::ES384 => {
                DecodingKey::from_ec_pem(config.public_key.as_bytes())
                    .map_err(|e| AuthError::Configuration(format!("invalid public key: {e}")))?
            },
            Algorithm::EdDSA => DecodingKey::from_ed_pem(config.public_key.as_bytes())
                .map_err(|e| AuthError::Configuration(format!("invalid public key: {e}")))?,
            _ => DecodingKey::from_rsa_pem(config.public_key.as_bytes())
                .map_err(|e| AuthError::Configuration(format!("invalid public key: {e}")))?,
        };

        let mut validation = Validation::new(algorithm);
        validation.set_audience(&[&config.key]);
        if !config.id_token_issuer.is_empty() {
            validation.set_issuer(&[&config.id_token_issuer]);
        }
        validation.validate_exp = true;
        validation.validate_nbf = false;

        Ok(Self {
            config,
            decoding_key,
            validation,
        })
    }

    /// Returns the current Unix timestamp.
    fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }

    /// Reads an optional string claim.
    fn string_claim(claims: &HashMap<String, Value>, key: &str) -> Option<String> {
        match claims.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Builds the membership payload from the configured claims.
    fn membership_claims(&self, claims: &HashMap<String, Value>) -> Result<ClaimsPayload, AuthError> {
        let field = |key: &str| claims.get(key).cloned().unwrap_or_else(|| json!({}));
        let payload = json!({
            "organization_membership": field(&self.config.organization_membership_claim),
            "team_membership": field(&self.config.team_membership_claim),
            "team_organization": field(&self.config.team_organization_claim),
        });

        serde_json::from_value(payload).map_err(|e| {
            AuthError::Claims(concord_claims::ClaimsError::MalformedClaims(e.to_string()))
        })
    }
}

#[async_trait]
impl AuthenticationPlugin for OidcPlugin {
    async fn authenticate(&self, credential: &Credential) -> Result<AuthOutcome, AuthError> {
        let Credential::IdToken(token) = credential else {
            return Err(AuthError::UnsupportedCredential(self.plugin_type()));
        };

        let token_data =
            decode::<HashMap<String, Value>>(token, &self.decoding_key, &self.validation).map_err(
                |e| match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    _ => AuthError::InvalidCredentials,
                },
            )?;

        let claims = token_data.claims;

        let issued_at = claims
            .get("iat")
            .and_then(Value::as_u64)
            .ok_or_else(|| AuthError::MissingClaim("iat".into()))?;
        if issued_at.saturating_add(self.config.id_token_max_age) < Self::now() {
            return Err(AuthError::TokenExpired);
        }

        let user_id = Self::string_claim(&claims, &self.config.id_key)
            .ok_or_else(|| AuthError::MissingClaim(self.config.id_key.clone()))?;

        let display_name = Self::string_claim(&claims, "name").or_else(|| {
            match (
                Self::string_claim(&claims, "given_name"),
                Self::string_claim(&claims, "family_name"),
            ) {
                (Some(first), Some(last)) => Some(format!("{first} {last}")),
                (Some(first), None) => Some(first),
                (None, Some(last)) => Some(last),
                (None, None) => None,
            }
        });

        let membership = self.membership_claims(&claims)?;

        debug!(user = %user_id, "ID token accepted");

        Ok(AuthOutcome {
            context: AuthContext {
                user_id: UserId::new(user_id),
                username: Self::string_claim(&claims, &self.config.username_key),
                email: Self::string_claim(&claims, "email"),
                display_name,
                auth_method: AuthMethod::OpenIdConnect,
                expires_at: claims.get("exp").and_then(Value::as_u64),
            },
            claims: membership,
        })
    }

    fn configuration_schema(&self) -> Vec<ConfigField> {
        OidcConfiguration::schema()
    }

    fn plugin_type(&self) -> &'static str {
        "open_id_connect"
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-key-minimum-32-chars!";

    fn create_test_config() -> OidcConfiguration {
        let mut config = OidcConfiguration::new("https://idp.example.com", "concord");
        config.algorithm = "HS256".into();
        config.secret = Some(SECRET.into());
        config.id_token_issuer = "https://idp.example.com".into();
        config
    }

    fn now() -> u64 {
        OidcPlugin::now()
    }

    fn sign(claims: &Value, secret: &str) -> String {
        let key = EncodingKey::from_secret(secret.as_bytes());
        encode(&Header::default(), claims, &key).expect("failed to encode JWT")
    }

    fn valid_claims() -> Value {
        json!({
            "sub": "account-12345",
            "preferred_username": "jdoe",
            "email": "test@example.com",
            "given_name": "John",
            "family_name": "Doe",
            "iat": now(),
            "exp": now() + 3600,
            "iss": "https://idp.example.com",
            "aud": "concord",
            "organization_membership": {"Galaxy": ["member"]},
            "team_membership": {"Maintainers": ["member"]},
            "team_organization": {"Maintainers": "Galaxy"}
        })
    }

    #[tokio::test]
    async fn test_valid_token() {
        let plugin = OidcPlugin::new(create_test_config()).unwrap();
        let token = sign(&valid_claims(), SECRET);

        let outcome = plugin
            .authenticate(&Credential::IdToken(token))
            .await
            .expect("validation failed");

        assert_eq!(outcome.context.user_id, UserId::new("account-12345"));
        assert_eq!(outcome.context.username.as_deref(), Some("jdoe"));
        assert_eq!(outcome.context.display_name.as_deref(), Some("John Doe"));
        assert_eq!(outcome.context.auth_method, AuthMethod::OpenIdConnect);
        assert_eq!(outcome.claims.organization_membership.len(), 1);
        assert_eq!(outcome.claims.team_organization["Maintainers"], "Galaxy");
    }

    #[tokio::test]
    async fn test_token_without_membership_claims() {
        let plugin = OidcPlugin::new(create_test_config()).unwrap();
        let mut claims = valid_claims();
        let object = claims.as_object_mut().unwrap();
        object.remove("organization_membership");
        object.remove("team_membership");
        object.remove("team_organization");

        let outcome = plugin
            .authenticate(&Credential::IdToken(sign(&claims, SECRET)))
            .await
            .unwrap();

        assert!(outcome.claims.is_empty());
    }

    #[tokio::test]
    async fn test_custom_claim_names() {
        let mut config = create_test_config();
        config.organization_membership_claim = "orgs".into();
        let plugin = OidcPlugin::new(config).unwrap();

        let mut claims = valid_claims();
        claims["orgs"] = json!({"Nebula": ["admin"]});

        let outcome = plugin
            .authenticate(&Credential::IdToken(sign(&claims, SECRET)))
            .await
            .unwrap();

        let (name, roles) = outcome.claims.organization_membership.iter().next().unwrap();
        assert_eq!(name, "Nebula");
        assert_eq!(roles, ["admin".to_string()]);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let plugin = OidcPlugin::new(create_test_config()).unwrap();
        let mut claims = valid_claims();
        claims["iat"] = json!(now() - 7200);
        claims["exp"] = json!(now() - 3600);

        let result = plugin
            .authenticate(&Credential::IdToken(sign(&claims, SECRET)))
            .await;
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[tokio::test]
    async fn test_token_older_than_max_age() {
        let plugin = OidcPlugin::new(create_test_config()).unwrap();
        let mut claims = valid_claims();
        claims["iat"] = json!(now() - 601);

        let result = plugin
            .authenticate(&Credential::IdToken(sign(&claims, SECRET)))
            .await;
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[tokio::test]
    async fn test_invalid_signature() {
        let plugin = OidcPlugin::new(create_test_config()).unwrap();
        let token = sign(&valid_claims(), "different-secret-key-minimum-32!");

        let result = plugin.authenticate(&Credential::IdToken(token)).await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_invalid_issuer() {
        let plugin = OidcPlugin::new(create_test_config()).unwrap();
        let mut claims = valid_claims();
        claims["iss"] = json!("https://malicious.com");

        let result = plugin
            .authenticate(&Credential::IdToken(sign(&claims, SECRET)))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_missing_id_claim() {
        let plugin = OidcPlugin::new(create_test_config()).unwrap();
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("sub");

        let result = plugin
            .authenticate(&Credential::IdToken(sign(&claims, SECRET)))
            .await;
        assert!(matches!(result, Err(AuthError::MissingClaim(_))));
    }

    #[tokio::test]
    async fn test_rejects_profile_credential() {
        let plugin = OidcPlugin::new(create_test_config()).unwrap();

        let result = plugin.authenticate(&Credential::Profile(json!({}))).await;
        assert!(matches!(result, Err(AuthError::UnsupportedCredential(_))));
    }

    #[test]
    fn test_hmac_requires_secret() {
        let mut config = create_test_config();
        config.secret = None;

        assert!(matches!(
            OidcPlugin::new(config),
            Err(AuthError::Configuration(_))
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config: OidcConfiguration =
            serde_json::from_value(json!({"endpoint": "https://idp", "key": "concord"})).unwrap();

        assert!(config.verify_ssl);
        assert_eq!(config.algorithm, "RS256");
        assert_eq!(config.id_token_max_age, 600);
        assert_eq!(config.id_key, "sub");
        assert_eq!(config.username_key, "preferred_username");
        assert_eq!(config.scope, vec!["openid", "profile", "email"]);
    }
}
