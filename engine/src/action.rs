//! Actions: typed descriptions of intended state changes.
//!
//! Every state change goes through the [`Dispatcher`](crate::Dispatcher) as an
//! [`Action`]. The profile store recognizes a closed set of variants; anything
//! else travels as [`Action::Extension`] so unrelated stores can share the
//! same dispatcher.

use crate::{Error, Profile, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire names of the actions the profile store reduces.
pub mod kind {
    pub const LOAD_PROFILE: &str = "LOAD_PROFILE";
    pub const UPDATE_PROFILE: &str = "UPDATE_PROFILE";
    pub const SET_LOADING: &str = "SET_LOADING";
    pub const SET_ERROR: &str = "SET_ERROR";
    pub const CLEAR_PROFILE: &str = "CLEAR_PROFILE";
    pub const SYNC_FROM_REMOTE: &str = "SYNC_FROM_REMOTE";
    pub const SET_SYNCING: &str = "SET_SYNCING";
}

/// An intended state change.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Warm-start from the local cache.
    LoadProfile,
    /// A local edit landed.
    UpdateProfile(Profile),
    SetLoading(bool),
    SetError(Option<String>),
    /// Reset to the empty state and purge the cache (sign-out).
    ClearProfile,
    /// A remote edit arrived. Reduced like [`Action::UpdateProfile`].
    SyncFromRemote(Profile),
    SetSyncing(bool),
    /// An action type this crate does not own.
    Extension {
        kind: String,
        payload: Option<Value>,
    },
}

/// Loose `{ type, payload }` shape used at the boundary with UI code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Action {
    /// The wire name of this action.
    pub fn kind(&self) -> &str {
        match self {
            Action::LoadProfile => kind::LOAD_PROFILE,
            Action::UpdateProfile(_) => kind::UPDATE_PROFILE,
            Action::SetLoading(_) => kind::SET_LOADING,
            Action::SetError(_) => kind::SET_ERROR,
            Action::ClearProfile => kind::CLEAR_PROFILE,
            Action::SyncFromRemote(_) => kind::SYNC_FROM_REMOTE,
            Action::SetSyncing(_) => kind::SET_SYNCING,
            Action::Extension { kind, .. } => kind,
        }
    }

    /// Decode the wire shape into a typed action.
    ///
    /// Unknown types decode to [`Action::Extension`]. A known type with a
    /// payload of the wrong shape is an error.
    pub fn from_wire(wire: WireAction) -> Result<Self> {
        let WireAction { kind, payload } = wire;
        let action = match kind.as_str() {
            kind::LOAD_PROFILE => Action::LoadProfile,
            kind::CLEAR_PROFILE => Action::ClearProfile,
            kind::UPDATE_PROFILE => Action::UpdateProfile(decode(&kind, payload)?),
            kind::SYNC_FROM_REMOTE => Action::SyncFromRemote(decode(&kind, payload)?),
            kind::SET_LOADING => Action::SetLoading(decode(&kind, payload)?),
            kind::SET_SYNCING => Action::SetSyncing(decode(&kind, payload)?),
            kind::SET_ERROR => Action::SetError(match payload {
                None => None,
                Some(value) => decode(&kind, Some(value))?,
            }),
            _ => Action::Extension { kind, payload },
        };
        Ok(action)
    }

    /// Encode into the wire shape.
    pub fn to_wire(&self) -> WireAction {
        let payload = match self {
            Action::LoadProfile | Action::ClearProfile => None,
            Action::UpdateProfile(p) | Action::SyncFromRemote(p) => Some(p.to_document()),
            Action::SetLoading(flag) | Action::SetSyncing(flag) => Some(Value::Bool(*flag)),
            Action::SetError(err) => err.clone().map(Value::String),
            Action::Extension { payload, .. } => payload.clone(),
        };
        WireAction {
            kind: self.kind().to_string(),
            payload,
        }
    }
}

impl TryFrom<WireAction> for Action {
    type Error = Error;

    fn try_from(wire: WireAction) -> Result<Self> {
        Action::from_wire(wire)
    }
}

fn decode<T: serde::de::DeserializeOwned>(kind: &str, payload: Option<Value>) -> Result<T> {
    let value = payload.ok_or_else(|| Error::InvalidPayload {
        action: kind.to_string(),
        reason: "missing payload".into(),
    })?;
    serde_json::from_value(value).map_err(|e| Error::InvalidPayload {
        action: kind.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use serde_json::json;

    #[test]
    fn decode_update_profile() {
        let wire: WireAction = serde_json::from_value(json!({
            "type": "UPDATE_PROFILE",
            "payload": {
                "photoUrl": "",
                "handle": "ana",
                "displayName": "Ana",
                "bio": "hi",
                "role": "person"
            }
        }))
        .unwrap();

        match Action::from_wire(wire).unwrap() {
            Action::UpdateProfile(profile) => {
                assert_eq!(profile.handle, "ana");
                assert_eq!(profile.role, Role::Person);
            }
            other => panic!("Expected UpdateProfile, got {:?}", other),
        }
    }

    #[test]
    fn decode_unit_and_flag_actions() {
        let wire = WireAction {
            kind: "CLEAR_PROFILE".into(),
            payload: None,
        };
        assert_eq!(Action::from_wire(wire).unwrap(), Action::ClearProfile);

        let wire = WireAction {
            kind: "SET_SYNCING".into(),
            payload: Some(json!(true)),
        };
        assert_eq!(Action::from_wire(wire).unwrap(), Action::SetSyncing(true));

        let wire = WireAction {
            kind: "SET_ERROR".into(),
            payload: None,
        };
        assert_eq!(Action::from_wire(wire).unwrap(), Action::SetError(None));
    }

    #[test]
    fn unknown_types_become_extensions() {
        let wire = WireAction {
            kind: "OPEN_POPUP".into(),
            payload: Some(json!({"id": "settings"})),
        };
        let action = Action::from_wire(wire).unwrap();
        assert_eq!(action.kind(), "OPEN_POPUP");
        assert!(matches!(action, Action::Extension { .. }));
    }

    #[test]
    fn wrong_payload_shape_is_rejected() {
        let wire = WireAction {
            kind: "SET_LOADING".into(),
            payload: Some(json!("yes")),
        };
        let err = Action::from_wire(wire).unwrap_err();
        assert!(matches!(err, Error::InvalidPayload { .. }));

        let wire = WireAction {
            kind: "SYNC_FROM_REMOTE".into(),
            payload: None,
        };
        assert!(Action::from_wire(wire).is_err());
    }

    #[test]
    fn wire_shape_serialization() {
        let json = serde_json::to_string(&Action::LoadProfile.to_wire()).unwrap();
        assert_eq!(json, r#"{"type":"LOAD_PROFILE"}"#);

        let action = Action::SetError(Some("offline".into()));
        let back = Action::from_wire(action.to_wire()).unwrap();
        assert_eq!(back, action);
    }
}
