//! Pure policy decisions over (role, scope, request) tuples.
//!
//! The gate performs no I/O and never fails: every input tuple maps to an
//! allow or a deny. Handlers resolve the target's placement in the hostel
//! hierarchy before calling in, then translate a deny into a forbidden
//! response. Identical inputs always produce identical decisions.

use serde::{Deserialize, Serialize};

use super::principal::{Role, ScopeBinding};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    StudentProfile,
    Room,
    RoomImage,
    Issue,
    Floor,
    Hostel,
}

impl ResourceKind {
    /// Structural resources define the hostel hierarchy itself and who lives
    /// where. Operational resources (issues, images) merely attach to it.
    fn is_structural(&self) -> bool {
        matches!(
            self,
            ResourceKind::Hostel
                | ResourceKind::Floor
                | ResourceKind::Room
                | ResourceKind::StudentProfile
        )
    }
}

/// Where a resource sits in the hostel > floor > room hierarchy, plus the
/// owning subject for profiles and issues. Fields a caller could not resolve
/// stay `None` and count against the caller, never for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placement {
    pub hostel_id: Option<String>,
    pub floor_id: Option<String>,
    pub room_id: Option<String>,
    pub owner_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: String,
    pub placement: Placement,
}

/// One requested operation, as seen by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub action: Action,
    pub resource: ResourceRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The role never permits this action on this resource kind.
    NotPermitted,
    /// The action would be permitted, but the target lies outside the
    /// caller's scope binding.
    OutsideScope,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::NotPermitted => "not_permitted",
            DenialReason::OutsideScope => "outside_scope",
        }
    }
}

/// Decision output. Ephemeral, computed per request, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthDecision {
    pub allowed: bool,
    pub reason: Option<DenialReason>,
}

impl AuthDecision {
    fn allow() -> Self {
        AuthDecision { allowed: true, reason: None }
    }

    fn deny(reason: DenialReason) -> Self {
        AuthDecision { allowed: false, reason: Some(reason) }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }
}

/// Fixed policy table, first match wins:
/// 1. superAdmin: everything, scope ignored.
/// 2. admin: any action inside the scope hostel.
/// 3. coAdmin: read/update inside the scope floors; create/delete only for
///    operational room-level resources on those floors.
/// 4. student: read own profile and own room's roster/images, update own
///    profile. Nothing else.
/// 5. default deny.
///
/// A role presented with a scope shape that does not belong to it falls
/// through to the default deny rather than being reinterpreted.
pub fn authorize(role: Role, scope: &ScopeBinding, request: &AccessRequest) -> AuthDecision {
    let placement = &request.resource.placement;
    match (role, scope) {
        (Role::SuperAdmin, _) => AuthDecision::allow(),

        (Role::Admin, ScopeBinding::Hostel { hostel_id }) => {
            // An unplaced target cannot be proven in-scope, so it is not.
            match placement.hostel_id.as_deref() {
                Some(h) if h == hostel_id => AuthDecision::allow(),
                _ => AuthDecision::deny(DenialReason::OutsideScope),
            }
        }

        (Role::CoAdmin, ScopeBinding::Floors { hostel_id, floor_ids }) => {
            let hostel_ok = placement.hostel_id.as_deref() == Some(hostel_id.as_str());
            let floor_ok = placement
                .floor_id
                .as_deref()
                .map(|f| floor_ids.iter().any(|known| known == f))
                .unwrap_or(false);
            if !hostel_ok || !floor_ok {
                return AuthDecision::deny(DenialReason::OutsideScope);
            }
            match request.action {
                Action::Read | Action::Update => AuthDecision::allow(),
                Action::Create | Action::Delete => {
                    if request.resource.kind.is_structural() {
                        AuthDecision::deny(DenialReason::NotPermitted)
                    } else {
                        AuthDecision::allow()
                    }
                }
            }
        }

        (Role::Student, ScopeBinding::Room { room_id, occupant_id, .. }) => {
            let own_room = placement.room_id.as_deref() == Some(room_id.as_str());
            let own_record = placement.owner_id.as_deref() == Some(occupant_id.as_str());
            let allowed = match (request.action, request.resource.kind) {
                (Action::Read, ResourceKind::StudentProfile) => own_record,
                (Action::Update, ResourceKind::StudentProfile) => own_record,
                (Action::Read, ResourceKind::Room) => own_room,
                (Action::Read, ResourceKind::RoomImage) => own_room,
                _ => false,
            };
            if allowed {
                AuthDecision::allow()
            } else {
                AuthDecision::deny(DenialReason::NotPermitted)
            }
        }

        // Role and scope shape disagree. Resolution should never produce
        // this; deny instead of guessing which side to trust.
        _ => AuthDecision::deny(DenialReason::NotPermitted),
    }
}
