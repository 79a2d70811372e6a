//! Managed credentials: the user/password pair, where it lives in the secret
//! store, and the JSON payload written there.

pub mod password;

pub use password::{PasswordGenerator, PasswordPolicy, MIN_PASSWORD_LENGTH, POSTGRES_SYMBOLS};

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::inventory::InstanceRecord;
use crate::secrets::{SecretString, SecretsError};

pub const INSTANCE_PLACEHOLDER: &str = "{instance}";
pub const USERNAME_PLACEHOLDER: &str = "{username}";

/// Payload keys that hold the password, newest first. `DB_PASSWORD` is the
/// key older tooling wrote.
const PASSWORD_KEYS: [&str; 2] = ["password", "DB_PASSWORD"];

/// Stable secret store key for one instance's managed credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SecretId(String);

impl SecretId {
    /// Expand `template` for an instance and username.
    ///
    /// `{instance}` and `{username}` are substituted; everything else is kept
    /// verbatim, so the result is deterministic for a given pair.
    pub fn derive(template: &str, instance_id: &str, username: &str) -> Self {
        Self(
            template
                .replace(INSTANCE_PLACEHOLDER, instance_id)
                .replace(USERNAME_PLACEHOLDER, username),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A managed user's credential for one instance.
///
/// The password is `None` for a candidate built from an empty secret store
/// entry; a credential about to be applied always carries one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    username: String,
    password: Option<SecretString>,
    secret_id: SecretId,
}

impl Credential {
    pub fn new(username: impl Into<String>, secret_id: SecretId) -> Self {
        Self { username: username.into(), password: None, secret_id }
    }

    pub fn with_password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    pub fn secret_id(&self) -> &SecretId {
        &self.secret_id
    }
}

/// Extract the managed password from a stored payload.
///
/// Accepts a JSON object with a `password` (or legacy `DB_PASSWORD`) key, or a
/// bare non-JSON string holding just the password.
pub fn password_from_payload(raw: &SecretString) -> Option<SecretString> {
    match serde_json::from_str::<Value>(raw.expose_secret()) {
        Ok(Value::Object(map)) => PASSWORD_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(SecretString::new),
        Ok(_) => None,
        Err(_) if !raw.is_empty() => Some(raw.clone()),
        Err(_) => None,
    }
}

/// Render the JSON payload stored for `credential`.
///
/// When `existing` is a JSON object its unrelated keys are carried over and
/// the managed keys replaced. A legacy `DB_PASSWORD` key is kept in step with
/// `password` so older consumers keep working.
pub fn render_payload(
    existing: Option<&SecretString>,
    credential: &Credential,
    instance: &InstanceRecord,
) -> Result<SecretString, SecretsError> {
    let password = credential.password().ok_or_else(|| {
        SecretsError::invalid_value(credential.secret_id().as_str(), "credential has no password")
    })?;

    let mut map = existing
        .and_then(|raw| match serde_json::from_str::<Value>(raw.expose_secret()) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        })
        .unwrap_or_else(Map::new);

    let password = Value::String(password.expose_secret().to_string());
    if map.contains_key("DB_PASSWORD") {
        map.insert("DB_PASSWORD".into(), password.clone());
    }
    map.insert("username".into(), Value::String(credential.username().to_string()));
    map.insert("password".into(), password);
    map.insert("host".into(), Value::String(instance.endpoint.host.clone()));
    map.insert("port".into(), Value::from(instance.endpoint.port));
    map.insert("engine".into(), Value::String(instance.engine.clone()));
    match &instance.database_name {
        Some(db) => map.insert("dbname".into(), Value::String(db.clone())),
        None => map.remove("dbname"),
    };

    Ok(SecretString::new(serde_json::to_string(&Value::Object(map))?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Endpoint;

    fn instance() -> InstanceRecord {
        InstanceRecord {
            identifier: "prod-orders-db".into(),
            endpoint: Endpoint { host: "orders.abc.rds.amazonaws.com".into(), port: 5432 },
            engine: "postgres".into(),
            database_name: Some("orders".into()),
            source_instance: None,
        }
    }

    #[test]
    fn test_secret_id_derivation() {
        let id = SecretId::derive("secret/{instance}", "P1", "app");
        assert_eq!(id.as_str(), "secret/P1");

        let id = SecretId::derive("{instance}/{username}", "prod-orders-db", "service.orders");
        assert_eq!(id.as_str(), "prod-orders-db/service.orders");
        assert_eq!(id, SecretId::derive("{instance}/{username}", "prod-orders-db", "service.orders"));
    }

    #[test]
    fn test_render_payload_requires_password() {
        let credential = Credential::new("app", SecretId::derive("secret/{instance}", "P1", "app"));
        assert!(render_payload(None, &credential, &instance()).is_err());
    }

    #[test]
    fn test_render_payload_fresh() {
        let credential = Credential::new("app", SecretId::derive("secret/{instance}", "P1", "app"))
            .with_password("Pw-123456789abcdef".into());
        let payload = render_payload(None, &credential, &instance()).unwrap();
        let value: Value = serde_json::from_str(payload.expose_secret()).unwrap();
        assert_eq!(value["username"], "app");
        assert_eq!(value["password"], "Pw-123456789abcdef");
        assert_eq!(value["port"], 5432);
        assert_eq!(value["dbname"], "orders");
    }

    #[test]
    fn test_render_payload_preserves_unrelated_keys() {
        let existing = SecretString::new(r#"{"DB_PASSWORD":"old","API_KEY":"keep-me"}"#);
        let credential = Credential::new("app", SecretId::derive("secret/{instance}", "P1", "app"))
            .with_password("Pw-123456789abcdef".into());
        let payload = render_payload(Some(&existing), &credential, &instance()).unwrap();
        let value: Value = serde_json::from_str(payload.expose_secret()).unwrap();
        assert_eq!(value["API_KEY"], "keep-me");
        assert_eq!(value["DB_PASSWORD"], "Pw-123456789abcdef");
        assert_eq!(value["password"], "Pw-123456789abcdef");
    }

    #[test]
    fn test_render_payload_adds_no_legacy_key() {
        let existing = SecretString::new(r#"{"password":"old"}"#);
        let credential = Credential::new("app", SecretId::derive("secret/{instance}", "P1", "app"))
            .with_password("Pw-123456789abcdef".into());
        let payload = render_payload(Some(&existing), &credential, &instance()).unwrap();
        let value: Value = serde_json::from_str(payload.expose_secret()).unwrap();
        assert!(value.get("DB_PASSWORD").is_none());
        assert_eq!(password_from_payload(&payload).unwrap().expose_secret(), "Pw-123456789abcdef");
    }

    #[test]
    fn test_password_from_payload_variants() {
        let json = SecretString::new(r#"{"username":"app","password":"p1"}"#);
        assert_eq!(password_from_payload(&json).unwrap().expose_secret(), "p1");

        let legacy = SecretString::new(r#"{"DB_PASSWORD":"p2"}"#);
        assert_eq!(password_from_payload(&legacy).unwrap().expose_secret(), "p2");

        let bare = SecretString::new("p3-not-json");
        assert_eq!(password_from_payload(&bare).unwrap().expose_secret(), "p3-not-json");

        let no_password = SecretString::new(r#"{"username":"app"}"#);
        assert!(password_from_payload(&no_password).is_none());
    }
}
