//! Access-control roles and the actions they unlock

use std::sync::OnceLock;

use alloy_primitives::{keccak256, B256};
use evm_rpc_client::{queries, CacheKey, RpcClient};
use r2r_core::{EvmAddress, ProtocolError};
use serde::{Deserialize, Serialize};

use crate::abi::IRent2Repay;
use crate::constants::roles;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Operator,
    Emergency,
}

impl Role {
    /// On-chain role name, the keccak256 preimage
    pub fn name(&self) -> &'static str {
        match self {
            Self::Admin => roles::ADMIN_ROLE,
            Self::Operator => roles::OPERATOR_ROLE,
            Self::Emergency => roles::EMERGENCY_ROLE,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Operator => "Operator",
            Self::Emergency => "Emergency",
        }
    }

    /// `keccak256(name)`
    pub fn hash(&self) -> B256 {
        static HASHES: OnceLock<[B256; 3]> = OnceLock::new();
        let hashes = HASHES.get_or_init(|| {
            [
                keccak256(roles::ADMIN_ROLE.as_bytes()),
                keccak256(roles::OPERATOR_ROLE.as_bytes()),
                keccak256(roles::EMERGENCY_ROLE.as_bytes()),
            ]
        });
        match self {
            Self::Admin => hashes[0],
            Self::Operator => hashes[1],
            Self::Emergency => hashes[2],
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Operator maintenance writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MaintenanceAction {
    BatchRent2Repay,
    AuthorizeTokenPair,
    UnauthorizeToken,
    RemoveUser,
    Pause,
    Unpause,
}

impl MaintenanceAction {
    pub const ALL: [MaintenanceAction; 6] = [
        Self::BatchRent2Repay,
        Self::AuthorizeTokenPair,
        Self::UnauthorizeToken,
        Self::RemoveUser,
        Self::Pause,
        Self::Unpause,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BatchRent2Repay => "batchRent2Repay",
            Self::AuthorizeTokenPair => "authorizeTokenPair",
            Self::UnauthorizeToken => "unauthorizeToken",
            Self::RemoveUser => "removeUser",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
        }
    }

    /// Role gating the action; `None` means any role will do
    pub fn required_role(&self) -> Option<Role> {
        match self {
            Self::BatchRent2Repay | Self::AuthorizeTokenPair | Self::UnauthorizeToken => None,
            Self::RemoveUser => Some(Role::Operator),
            Self::Pause => Some(Role::Emergency),
            Self::Unpause => Some(Role::Admin),
        }
    }
}

/// Roles held by one account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub has_admin: bool,
    pub has_operator: bool,
    pub has_emergency: bool,
}

impl Capabilities {
    pub fn has(&self, role: Role) -> bool {
        match role {
            Role::Admin => self.has_admin,
            Role::Operator => self.has_operator,
            Role::Emergency => self.has_emergency,
        }
    }

    pub fn has_any(&self) -> bool {
        self.has_admin || self.has_operator || self.has_emergency
    }

    /// Highest-priority role: ADMIN, then EMERGENCY, then OPERATOR
    pub fn primary_role(&self) -> Option<Role> {
        [Role::Admin, Role::Emergency, Role::Operator]
            .into_iter()
            .find(|r| self.has(*r))
    }

    pub fn can(&self, action: MaintenanceAction) -> bool {
        match action.required_role() {
            Some(role) => self.has(role),
            None => self.has_any(),
        }
    }

    pub fn allowed_actions(&self) -> Vec<MaintenanceAction> {
        MaintenanceAction::ALL
            .into_iter()
            .filter(|a| self.can(*a))
            .collect()
    }

    pub fn require(&self, action: MaintenanceAction) -> Result<(), ProtocolError> {
        if self.can(action) {
            return Ok(());
        }
        let required = action
            .required_role()
            .map(|r| r.name().to_string())
            .unwrap_or_else(|| "any role".to_string());
        Err(ProtocolError::PermissionDenied {
            action: action.as_str().to_string(),
            required,
        })
    }
}

/// Resolve the roles `account` holds on `contract`.
///
/// The three `hasRole` reads run concurrently and share the account's
/// cache partition.
pub async fn resolve_capabilities(
    client: &RpcClient,
    contract: EvmAddress,
    account: EvmAddress,
) -> r2r_core::Result<Capabilities> {
    let key = CacheKey::account(contract, account);
    let call = |role: Role| IRent2Repay::hasRoleCall {
        role: role.hash(),
        account: account.as_address(),
    };

    let (admin_call, operator_call, emergency_call) =
        (call(Role::Admin), call(Role::Operator), call(Role::Emergency));
    let (admin, operator, emergency) = tokio::join!(
        queries::read(client, key, &admin_call),
        queries::read(client, key, &operator_call),
        queries::read(client, key, &emergency_call),
    );

    let caps = Capabilities {
        has_admin: admin?.granted,
        has_operator: operator?.granted,
        has_emergency: emergency?.granted,
    };
    tracing::debug!(
        account = %account,
        admin = caps.has_admin,
        operator = caps.has_operator,
        emergency = caps.has_emergency,
        "Resolved roles"
    );
    Ok(caps)
}
