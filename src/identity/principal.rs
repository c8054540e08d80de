use serde::{Deserialize, Serialize};

/// Scoping attributes carried as custom claims on a verified credential.
/// All fields are optional on the wire; the resolver decides whether the
/// present subset is sufficient for the claimed role.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopeClaims {
    #[serde(default)]
    pub hostel_id: Option<String>,
    #[serde(default)]
    pub floor_ids: Option<Vec<String>>,
    #[serde(default)]
    pub room_id: Option<String>,
}

/// Identity decoded from a provider-verified credential. Read-only to this
/// service; the provider owns subject ids and claim contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub embedded_role: Option<String>,
    #[serde(default)]
    pub embedded_scope: ScopeClaims,
}

/// Closed role set. Stored role strings are mapped through [`Role::parse`]
/// exactly once, at the resolver boundary; unrecognized values never pass
/// further into the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    SuperAdmin,
    Admin,
    CoAdmin,
    Student,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "superAdmin" => Some(Role::SuperAdmin),
            "admin" => Some(Role::Admin),
            "coAdmin" => Some(Role::CoAdmin),
            "student" => Some(Role::Student),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "superAdmin",
            Role::Admin => "admin",
            Role::CoAdmin => "coAdmin",
            Role::Student => "student",
        }
    }
}

/// The portion of the hostel/floor/room hierarchy a principal may act on.
/// Each variant pairs with exactly one role; the gate refuses mismatched
/// combinations instead of guessing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopeBinding {
    /// superAdmin. No scoping attributes required or consulted.
    Unrestricted,
    /// admin over one hostel.
    Hostel { hostel_id: String },
    /// coAdmin over one or more floors within one hostel.
    Floors {
        hostel_id: String,
        floor_ids: Vec<String>,
    },
    /// student bound to a single room. `occupant_id` is the student's own
    /// subject id, used for own-profile checks.
    Room {
        hostel_id: String,
        room_id: String,
        occupant_id: String,
    },
}

/// A fully resolved caller: verified identity plus role and scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub identity: VerifiedIdentity,
    pub role: Role,
    pub scope: ScopeBinding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_known_values() {
        assert_eq!(Role::parse("superAdmin"), Some(Role::SuperAdmin));
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("coAdmin"), Some(Role::CoAdmin));
        assert_eq!(Role::parse("student"), Some(Role::Student));
    }

    #[test]
    fn role_parse_rejects_unknown_and_case_variants() {
        assert_eq!(Role::parse(""), None);
        assert_eq!(Role::parse("Admin"), None);
        assert_eq!(Role::parse("coadmin"), None);
        assert_eq!(Role::parse("root"), None);
    }

    #[test]
    fn role_round_trips_through_as_str() {
        for r in [Role::SuperAdmin, Role::Admin, Role::CoAdmin, Role::Student] {
            assert_eq!(Role::parse(r.as_str()), Some(r));
        }
    }
}
