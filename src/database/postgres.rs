//! PostgreSQL prober and user manager.
//!
//! Every operation opens its own short-lived connection, bounded by the
//! configured connect timeout and the run's cancellation token, and closes it
//! before returning. Administrative sessions log in as the configured admin
//! user with the password stored under the instance's admin secret id.
//!
//! User-management statements are DDL and cannot take bind parameters, so
//! identifiers and the password literal are quoted with [`quote_identifier`]
//! and [`quote_literal`]. Statement logging is disabled on every connection.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::{ConnectOptions, Connection};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::error::{DatabaseError, Result};
use super::{CredentialProber, ProbeOutcome, UserManager};
use crate::config::DatabaseConfig;
use crate::credentials::{password_from_payload, Credential, SecretId};
use crate::inventory::InstanceRecord;
use crate::secrets::{SecretString, SecretSynchronizer, SecretsError};
use crate::utils::{bounded, duration_ms, Bounded};

const INVALID_PASSWORD: &str = "28P01";
const INVALID_AUTHORIZATION: &str = "28000";
const INSUFFICIENT_PRIVILEGE: &str = "42501";

/// Quote an SQL identifier, doubling embedded double quotes.
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote an SQL string literal. Backslashes switch to the `E''` form.
pub fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\'', "''");
    if escaped.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{}'", escaped)
    }
}

fn check_embeddable(what: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(DatabaseError::invalid_input(what, "cannot be empty"));
    }
    if value.contains('\0') {
        return Err(DatabaseError::invalid_input(what, "contains a NUL byte"));
    }
    Ok(())
}

fn create_user_statement(username: &str, password: &SecretString) -> Result<SecretString> {
    check_embeddable("username", username)?;
    check_embeddable("password", password.expose_secret())?;
    Ok(SecretString::new(format!(
        "CREATE USER {} WITH LOGIN PASSWORD {}",
        quote_identifier(username),
        quote_literal(password.expose_secret())
    )))
}

fn alter_password_statement(username: &str, password: &SecretString) -> Result<SecretString> {
    check_embeddable("username", username)?;
    check_embeddable("password", password.expose_secret())?;
    Ok(SecretString::new(format!(
        "ALTER USER {} WITH PASSWORD {}",
        quote_identifier(username),
        quote_literal(password.expose_secret())
    )))
}

fn grant_statement(database: &str, username: &str) -> Result<String> {
    check_embeddable("database", database)?;
    Ok(format!(
        "GRANT ALL PRIVILEGES ON DATABASE {} TO {}",
        quote_identifier(database),
        quote_identifier(username)
    ))
}

/// Why a login attempt did not produce a session.
#[derive(Debug)]
enum LoginFailure {
    Rejected,
    /// Authenticated, but not allowed to connect to the database
    NoAccess,
    RoleMissing,
    Unreachable(String),
    TimedOut,
    Cancelled,
}

fn classify_login_error(err: &sqlx::Error) -> LoginFailure {
    if let sqlx::Error::Database(db) = err {
        match db.code().as_deref() {
            Some(INVALID_PASSWORD) => return LoginFailure::Rejected,
            Some(INVALID_AUTHORIZATION) if db.message().contains("does not exist") => {
                return LoginFailure::RoleMissing
            }
            Some(INVALID_AUTHORIZATION) => return LoginFailure::Rejected,
            Some(INSUFFICIENT_PRIVILEGE) => return LoginFailure::NoAccess,
            _ => {}
        }
    }
    LoginFailure::Unreachable(err.to_string())
}

/// Administrative access to PostgreSQL instances.
#[derive(Clone)]
pub struct PostgresAdmin {
    secrets: SecretSynchronizer,
    admin_username: String,
    admin_secret_template: String,
    default_database: String,
    ssl_mode: PgSslMode,
    timeout: Duration,
    grant_database_privileges: bool,
}

impl PostgresAdmin {
    /// `secrets` is used to read admin passwords only.
    pub fn new(config: &DatabaseConfig, grant_database_privileges: bool, secrets: SecretSynchronizer) -> Self {
        Self {
            secrets,
            admin_username: config.admin_username.clone(),
            admin_secret_template: config.admin_secret_template.clone(),
            default_database: config.default_database.clone(),
            ssl_mode: if config.require_tls { PgSslMode::Require } else { PgSslMode::Prefer },
            timeout: config.connect_timeout(),
            grant_database_privileges,
        }
    }

    fn database<'a>(&'a self, instance: &'a InstanceRecord) -> &'a str {
        instance.database_name.as_deref().unwrap_or(&self.default_database)
    }

    fn connect_options(&self, instance: &InstanceRecord, username: &str, password: &str) -> PgConnectOptions {
        PgConnectOptions::new_without_pgpass()
            .host(&instance.endpoint.host)
            .port(instance.endpoint.port)
            .username(username)
            .password(password)
            .database(self.database(instance))
            .ssl_mode(self.ssl_mode)
            .application_name("credplane")
            .disable_statement_logging()
    }

    async fn login(
        &self,
        instance: &InstanceRecord,
        username: &str,
        password: &SecretString,
        cancel: &CancellationToken,
    ) -> std::result::Result<PgConnection, LoginFailure> {
        let options = self.connect_options(instance, username, password.expose_secret());
        match bounded(PgConnection::connect_with(&options), self.timeout, cancel).await {
            Bounded::Completed(Ok(conn)) => Ok(conn),
            Bounded::Completed(Err(e)) => Err(classify_login_error(&e)),
            Bounded::TimedOut => Err(LoginFailure::TimedOut),
            Bounded::Cancelled => Err(LoginFailure::Cancelled),
        }
    }

    async fn close(&self, instance: &InstanceRecord, conn: PgConnection) {
        match tokio::time::timeout(self.timeout, conn.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(instance = %instance.identifier, error = %e, "Connection close failed"),
            Err(_) => tracing::debug!(instance = %instance.identifier, "Connection close timed out, dropped"),
        }
    }

    async fn admin_password(&self, instance: &InstanceRecord, cancel: &CancellationToken) -> Result<SecretString> {
        let id = SecretId::derive(&self.admin_secret_template, &instance.identifier, &self.admin_username);
        match self.secrets.current(&id, cancel).await {
            Ok(Some(stored)) => password_from_payload(&stored.value).ok_or_else(|| {
                DatabaseError::connection(&instance.identifier, format!("admin secret '{}' holds no password", id))
            }),
            Ok(None) => Err(DatabaseError::connection(
                &instance.identifier,
                format!("admin secret '{}' not found", id),
            )),
            Err(SecretsError::Cancelled { .. }) => {
                Err(DatabaseError::Cancelled { instance: instance.identifier.clone(), operation: "connect" })
            }
            Err(e) => Err(DatabaseError::connection(
                &instance.identifier,
                format!("cannot read admin secret '{}': {}", id, e),
            )),
        }
    }

    async fn admin_session(&self, instance: &InstanceRecord, cancel: &CancellationToken) -> Result<PgConnection> {
        let password = self.admin_password(instance, cancel).await?;
        let instance_id = instance.identifier.clone();
        self.login(instance, &self.admin_username, &password, cancel).await.map_err(|failure| match failure {
            LoginFailure::Rejected | LoginFailure::RoleMissing => {
                DatabaseError::connection(instance_id, "admin login rejected")
            }
            LoginFailure::NoAccess => DatabaseError::connection(instance_id, "admin cannot access database"),
            LoginFailure::Unreachable(message) => DatabaseError::connection(instance_id, message),
            LoginFailure::TimedOut => DatabaseError::Timeout {
                instance: instance_id,
                operation: "connect",
                duration_ms: duration_ms(self.timeout),
            },
            LoginFailure::Cancelled => DatabaseError::Cancelled { instance: instance_id, operation: "connect" },
        })
    }

    async fn execute(
        &self,
        conn: &mut PgConnection,
        instance: &InstanceRecord,
        label: &'static str,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match bounded(sqlx::Executor::execute(&mut *conn, sql), self.timeout, cancel).await {
            Bounded::Completed(Ok(_)) => Ok(()),
            Bounded::Completed(Err(e)) => Err(DatabaseError::statement(&instance.identifier, label, e)),
            Bounded::TimedOut => Err(DatabaseError::Timeout {
                instance: instance.identifier.clone(),
                operation: label,
                duration_ms: duration_ms(self.timeout),
            }),
            Bounded::Cancelled => {
                Err(DatabaseError::Cancelled { instance: instance.identifier.clone(), operation: label })
            }
        }
    }

    async fn role_exists(
        &self,
        conn: &mut PgConnection,
        username: &str,
        cancel: &CancellationToken,
    ) -> Bounded<std::result::Result<bool, sqlx::Error>> {
        let lookup = sqlx::query_scalar::<_, i32>("SELECT 1 FROM pg_roles WHERE rolname = $1")
            .bind(username)
            .fetch_optional(&mut *conn);
        match bounded(lookup, self.timeout, cancel).await {
            Bounded::Completed(res) => Bounded::Completed(res.map(|row| row.is_some())),
            Bounded::TimedOut => Bounded::TimedOut,
            Bounded::Cancelled => Bounded::Cancelled,
        }
    }

    /// Run `statement`, then the optional grant, in one admin session.
    async fn change_user(
        &self,
        instance: &InstanceRecord,
        credential: &Credential,
        label: &'static str,
        statement: &SecretString,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let grant = match (self.grant_database_privileges, &instance.database_name) {
            (true, Some(db)) => Some(grant_statement(db, credential.username())?),
            _ => None,
        };

        let mut conn = self.admin_session(instance, cancel).await?;
        let mut result = self.execute(&mut conn, instance, label, statement.expose_secret(), cancel).await;
        if let (Ok(()), Some(grant)) = (&result, grant) {
            result = self.execute(&mut conn, instance, "GRANT", &grant, cancel).await;
        }
        self.close(instance, conn).await;
        result
    }
}

fn missing_password(credential: &Credential) -> DatabaseError {
    DatabaseError::invalid_input("password", format!("no password for {}", credential.username()))
}

#[async_trait]
impl CredentialProber for PostgresAdmin {
    async fn probe(
        &self,
        instance: &InstanceRecord,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> ProbeOutcome {
        let mut admin = match self.admin_session(instance, cancel).await {
            Ok(conn) => conn,
            Err(e) => return ProbeOutcome::connection_error(e.to_string()),
        };
        let exists = self.role_exists(&mut admin, credential.username(), cancel).await;
        self.close(instance, admin).await;

        match exists {
            Bounded::Completed(Ok(true)) => {}
            Bounded::Completed(Ok(false)) => return ProbeOutcome::UserMissing,
            Bounded::Completed(Err(e)) => {
                return ProbeOutcome::connection_error(format!("role lookup failed: {}", e))
            }
            Bounded::TimedOut => return ProbeOutcome::connection_error("role lookup timed out"),
            Bounded::Cancelled => return ProbeOutcome::connection_error("cancelled"),
        }

        let Some(password) = credential.password() else {
            return ProbeOutcome::AuthenticationFailed;
        };

        match self.login(instance, credential.username(), password, cancel).await {
            Ok(conn) => {
                self.close(instance, conn).await;
                ProbeOutcome::Authenticated
            }
            Err(LoginFailure::Rejected) => ProbeOutcome::AuthenticationFailed,
            Err(LoginFailure::RoleMissing) => ProbeOutcome::UserMissing,
            Err(LoginFailure::NoAccess) => ProbeOutcome::Authenticated,
            Err(LoginFailure::Unreachable(message)) => ProbeOutcome::connection_error(message),
            Err(LoginFailure::TimedOut) => ProbeOutcome::connection_error(format!(
                "login timed out after {}ms",
                duration_ms(self.timeout)
            )),
            Err(LoginFailure::Cancelled) => ProbeOutcome::connection_error("cancelled"),
        }
    }
}

#[async_trait]
impl UserManager for PostgresAdmin {
    async fn create_user(
        &self,
        instance: &InstanceRecord,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let password = credential.password().ok_or_else(|| missing_password(credential))?;
        let statement = create_user_statement(credential.username(), password)?;
        self.change_user(instance, credential, "CREATE USER", &statement, cancel).await
    }

    async fn alter_user_password(
        &self,
        instance: &InstanceRecord,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let password = credential.password().ok_or_else(|| missing_password(credential))?;
        let statement = alter_password_statement(credential.username(), password)?;
        self.change_user(instance, credential, "ALTER USER", &statement, cancel).await
    }
}
