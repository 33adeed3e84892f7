//! The syncable aggregate: one profile per authenticated identity.

use crate::{Error, IdentityId, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What kind of account a profile belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Person,
    Restaurant,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Person => "person",
            Role::Restaurant => "restaurant",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "person" => Some(Role::Person),
            "restaurant" => Some(Role::Restaurant),
            _ => None,
        }
    }
}

/// The profile synchronized between this device and the remote document.
///
/// There is no version field: concurrent edits resolve as last write wins.
/// Equality is field-by-field and is what every "did anything change" check
/// in the sync layer relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub photo_url: String,
    pub handle: String,
    pub display_name: String,
    pub bio: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_link: Option<String>,
}

impl Profile {
    /// Create a profile with the required fields; optional fields start empty.
    pub fn new(
        handle: impl Into<String>,
        display_name: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            handle: handle.into(),
            display_name: display_name.into(),
            role,
            ..Self::default()
        }
    }

    /// Minimal profile used to create the remote document for a new identity.
    pub fn seed_for(identity: &Identity) -> Self {
        Self {
            photo_url: identity.photo_url.clone().unwrap_or_default(),
            display_name: identity.display_name.clone().unwrap_or_default(),
            ..Self::default()
        }
    }

    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = bio.into();
        self
    }

    pub fn with_photo_url(mut self, url: impl Into<String>) -> Self {
        self.photo_url = url.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location_text = Some(location.into());
        self
    }

    pub fn with_menu_link(mut self, link: impl Into<String>) -> Self {
        self.menu_link = Some(link.into());
        self
    }

    /// Convert the remote document representation into a profile.
    ///
    /// Missing string fields default to empty, missing or null optional
    /// fields become `None`. A role the engine does not know is rejected
    /// rather than silently downgraded.
    pub fn from_document(doc: &Value) -> Result<Self> {
        let fields = doc
            .as_object()
            .ok_or_else(|| Error::InvalidDocument("expected an object".into()))?;

        let role = match fields.get("role") {
            None | Some(Value::Null) => Role::default(),
            Some(Value::String(raw)) => Role::parse(raw)
                .ok_or_else(|| Error::InvalidDocument(format!("unknown role '{}'", raw)))?,
            Some(other) => {
                return Err(Error::InvalidDocument(format!(
                    "role must be a string, got {}",
                    other
                )))
            }
        };

        Ok(Self {
            photo_url: required_text(fields, "photoUrl")?,
            handle: required_text(fields, "handle")?,
            display_name: required_text(fields, "displayName")?,
            bio: required_text(fields, "bio")?,
            role,
            location_text: optional_text(fields, "locationText")?,
            menu_link: optional_text(fields, "menuLink")?,
        })
    }

    /// Convert into the remote document representation.
    pub fn to_document(&self) -> Value {
        // Serializing a struct of strings cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn required_text(fields: &Map<String, Value>, key: &str) -> Result<String> {
    Ok(optional_text(fields, key)?.unwrap_or_default())
}

fn optional_text(fields: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(Error::InvalidDocument(format!(
            "field '{}' must be a string, got {}",
            key, other
        ))),
    }
}

/// An authenticated identity as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Opaque id; keys the remote document.
    pub id: IdentityId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<IdentityId>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            photo_url: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_photo_url(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn taqueria() -> Profile {
        Profile::new("taqueria", "La Taqueria", Role::Restaurant)
            .with_bio("Great tacos")
            .with_location("Mission St")
            .with_menu_link("https://example.com/menu")
    }

    #[test]
    fn serialization_format() {
        let json = serde_json::to_string(&taqueria()).unwrap();
        assert!(json.contains("displayName")); // camelCase
        assert!(json.contains("\"role\":\"restaurant\""));
        assert!(json.contains("locationText"));
    }

    #[test]
    fn optional_fields_are_omitted_when_empty() {
        let profile = Profile::new("ana", "Ana", Role::Person);
        let doc = profile.to_document();
        assert!(doc.get("locationText").is_none());
        assert!(doc.get("menuLink").is_none());
    }

    #[test]
    fn document_conversion_preserves_every_field() {
        let profile = taqueria();
        let parsed = Profile::from_document(&profile.to_document()).unwrap();
        assert_eq!(parsed, profile);
    }

    #[test]
    fn from_document_is_lenient_about_missing_fields() {
        let parsed = Profile::from_document(&json!({"handle": "ana"})).unwrap();
        assert_eq!(parsed.handle, "ana");
        assert_eq!(parsed.bio, "");
        assert_eq!(parsed.role, Role::Person);
        assert_eq!(parsed.location_text, None);
    }

    #[test]
    fn from_document_rejects_unknown_role() {
        let err = Profile::from_document(&json!({"role": "admin"})).unwrap_err();
        assert!(matches!(err, Error::InvalidDocument(_)));
    }

    #[test]
    fn from_document_rejects_non_objects() {
        assert!(Profile::from_document(&json!("profile")).is_err());
        assert!(Profile::from_document(&json!({"bio": 42})).is_err());
    }

    #[test]
    fn seed_uses_identity_attributes() {
        let identity = Identity::new("u1")
            .with_display_name("Ana")
            .with_photo_url("https://example.com/ana.png");
        let seed = Profile::seed_for(&identity);
        assert_eq!(seed.display_name, "Ana");
        assert_eq!(seed.photo_url, "https://example.com/ana.png");
        assert_eq!(seed.handle, "");
        assert_eq!(seed.role, Role::Person);
    }

    #[test]
    fn equality_is_field_by_field() {
        let a = taqueria();
        let mut b = taqueria();
        assert_eq!(a, b);
        b.menu_link = None;
        assert_ne!(a, b);
    }
}
