//! # Concord Storage - SQLite Backend
//!
//! SQLite implementation of the membership repository with tenant isolation.
//! Each tenant gets its own database file.
//!
//! Get-or-create relies on unique indexes: an insert that loses a race is
//! discarded by `ON CONFLICT DO NOTHING` and the follow-up select returns the
//! winner's row.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use concord_storage::{
    Ensured, Grant, MembershipRepository, MembershipTarget, Organization, OrganizationId, RepositoryError,
    Team, TeamId, UserId,
};

/// SQLite membership repository.
///
/// Each tenant gets its own database file at `{base_path}/{tenant}.db`.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
    actor: Option<String>,
    db_path: PathBuf,
}

impl SqliteRepository {
    /// Opens or creates a SQLite database for a tenant.
    ///
    /// # Arguments
    ///
    /// * `base_path` - Directory where tenant databases are stored
    /// * `tenant` - Tenant identifier (must match `[a-z0-9_-]+`)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Tenant name is invalid
    /// - Directory cannot be created
    /// - Database connection fails
    pub async fn open(base_path: impl AsRef<Path>, tenant: &str) -> Result<Self, RepositoryError> {
        Self::validate_tenant(tenant)?;

        let base = base_path.as_ref();
        std::fs::create_dir_all(base).map_err(|e| {
            RepositoryError::ConnectionFailed(format!("failed to create directory: {e}"))
        })?;

        let db_path = base.join(format!("{tenant}.db"));
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        debug!(tenant = %tenant, path = %db_path.display(), "Opening SQLite database");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(|e| RepositoryError::ConnectionFailed(e.to_string()))?;

        let repository = Self {
            pool,
            actor: None,
            db_path,
        };

        repository.migrate().await?;

        info!(tenant = %tenant, "SQLite repository ready");

        Ok(repository)
    }

    /// Sets the actor recorded on created entities and grants.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Path of the tenant database file.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Validates that a tenant name is safe.
    ///
    /// Only allows: lowercase letters, digits, underscore, hyphen.
    fn validate_tenant(tenant: &str) -> Result<(), RepositoryError> {
        if tenant.is_empty() {
            return Err(RepositoryError::InvalidInput("tenant cannot be empty".into()));
        }

        if tenant.len() > 64 {
            return Err(RepositoryError::InvalidInput("tenant name too long".into()));
        }

        let valid = tenant
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

        if !valid {
            return Err(RepositoryError::InvalidInput(
                "tenant must match [a-z0-9_-]+".into(),
            ));
        }

        Ok(())
    }

    /// Runs database migrations.
    async fn migrate(&self) -> Result<(), RepositoryError> {
        debug!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS organizations (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                name       TEXT NOT NULL UNIQUE,
                created_by TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::ConnectionFailed(format!("migration failed: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS teams (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL,
                organization_id INTEGER NOT NULL REFERENCES organizations (id),
                created_by      TEXT,
                created_at      INTEGER NOT NULL,
                UNIQUE (organization_id, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::ConnectionFailed(format!("migration failed: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memberships (
                user_id     TEXT NOT NULL,
                target_kind TEXT NOT NULL,
                target_id   INTEGER NOT NULL,
                role        TEXT NOT NULL,
                granted_by  TEXT,
                granted_at  INTEGER NOT NULL,
                PRIMARY KEY (user_id, target_kind, target_id, role)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::ConnectionFailed(format!("migration failed: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_teams_name ON teams (name)")
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::ConnectionFailed(format!("migration failed: {e}")))?;

        debug!("Migrations complete");

        Ok(())
    }

    /// Returns the current Unix timestamp.
    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }

    /// Builds `?, ?, ?` for an `IN` clause.
    fn placeholders(count: usize) -> String {
        vec!["?"; count].join(", ")
    }

    /// Looks up a single organization by name.
    pub async fn organization(&self, name: &str) -> Result<Option<Organization>, RepositoryError> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM organizations WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        Ok(row.map(|(id, name)| Organization {
            id: OrganizationId(id),
            name,
        }))
    }

    /// Lists every organization, ordered by id.
    pub async fn organizations(&self) -> Result<Vec<Organization>, RepositoryError> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM organizations ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| Organization {
                id: OrganizationId(id),
                name,
            })
            .collect())
    }

    /// Lists the teams owned by an organization, ordered by id.
    pub async fn teams_of(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Team>, RepositoryError> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT id, name FROM teams WHERE organization_id = ? ORDER BY id",
        )
        .bind(organization_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| Team {
                id: TeamId(id),
                name,
                organization_id,
            })
            .collect())
    }
}

#[async_trait]
impl MembershipRepository for SqliteRepository {
    async fn find_organizations(
        &self,
        names: &BTreeSet<String>,
    ) -> Result<HashMap<String, OrganizationId>, RepositoryError> {
        if names.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT name, id FROM organizations WHERE name IN ({})",
            Self::placeholders(names.len())
        );
        let mut query = sqlx::query_as::<_, (String, i64)>(&sql);
        for name in names {
            query = query.bind(name.as_str());
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(name, id)| (name, OrganizationId(id)))
            .collect())
    }

    async fn find_teams(
        &self,
        organization_id: OrganizationId,
        names: &BTreeSet<String>,
    ) -> Result<HashMap<String, TeamId>, RepositoryError> {
        if names.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT name, id FROM teams WHERE organization_id = ? AND name IN ({})",
            Self::placeholders(names.len())
        );
        let mut query = sqlx::query_as::<_, (String, i64)>(&sql).bind(organization_id.0);
        for name in names {
            query = query.bind(name.as_str());
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(name, id)| (name, TeamId(id)))
            .collect())
    }

    async fn create_organization(
        &self,
        name: &str,
    ) -> Result<Ensured<OrganizationId>, RepositoryError> {
        if name.is_empty() {
            return Err(RepositoryError::InvalidInput(
                "organization name cannot be empty".into(),
            ));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO organizations (name, created_by, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(self.actor.as_deref())
        .bind(Self::now())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?
        .rows_affected();

        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM organizations WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        let (id,) = row.ok_or_else(|| RepositoryError::NotFound(format!("organization {name}")))?;

        let id = OrganizationId(id);
        if inserted > 0 {
            debug!(organization = %name, %id, "Organization inserted");
            Ok(Ensured::created(id))
        } else {
            Ok(Ensured::existing(id))
        }
    }

    async fn create_team(
        &self,
        name: &str,
        organization_id: OrganizationId,
    ) -> Result<Ensured<TeamId>, RepositoryError> {
        if name.is_empty() {
            return Err(RepositoryError::InvalidInput(
                "team name cannot be empty".into(),
            ));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO teams (name, organization_id, created_by, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(organization_id, name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(organization_id.0)
        .bind(self.actor.as_deref())
        .bind(Self::now())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?
        .rows_affected();

        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM teams WHERE organization_id = ? AND name = ?")
                .bind(organization_id.0)
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        let (id,) = row.ok_or_else(|| RepositoryError::NotFound(format!("team {name}")))?;

        let id = TeamId(id);
        if inserted > 0 {
            debug!(team = %name, %id, %organization_id, "Team inserted");
            Ok(Ensured::created(id))
        } else {
            Ok(Ensured::existing(id))
        }
    }

    async fn grant_membership(
        &self,
        user: &UserId,
        target: MembershipTarget,
        role: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO memberships (user_id, target_kind, target_id, role, granted_by, granted_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, target_kind, target_id, role) DO NOTHING
            "#,
        )
        .bind(user.as_str())
        .bind(target.kind())
        .bind(target.raw_id())
        .bind(role)
        .bind(self.actor.as_deref())
        .bind(Self::now())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    async fn grants_of(&self, user: &UserId) -> Result<Vec<Grant>, RepositoryError> {
        let rows: Vec<(String, i64, String)> = sqlx::query_as(
            r#"
            SELECT target_kind, target_id, role FROM memberships
            WHERE user_id = ?
            ORDER BY target_kind, target_id, role
            "#,
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        rows.into_iter()
            .map(|(kind, id, role)| {
                let target = match kind.as_str() {
                    "organization" => MembershipTarget::Organization(OrganizationId(id)),
                    "team" => MembershipTarget::Team(TeamId(id)),
                    other => {
                        return Err(RepositoryError::QueryFailed(format!(
                            "unknown membership target kind: {other}"
                        )))
                    },
                };
                Ok(Grant {
                    user: user.clone(),
                    target,
                    role,
                })
            })
            .collect()
    }
}
