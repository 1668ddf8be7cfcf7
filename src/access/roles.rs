//! Role-based capability checks.
//!
//! Components never issue capabilities themselves. They ask an injected
//! [`Authorizer`] whether the caller holds a [`Role`] at the top of every
//! gated operation. [`RoleRegistry`] is the in-memory authorizer shipped with
//! the crate.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::{Error, Result};
use crate::utils::crypto::Address;
use crate::utils::validation::validate_address;

// ═══════════════════════════════════════════════════════════════════════════════
// ROLES
// ═══════════════════════════════════════════════════════════════════════════════

/// Named capabilities recognised by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Configuration changes, unpausing, role management
    Admin,
    /// Day-to-day engine operations
    Operator,
    /// Pausing, circuit breakers, depeg interventions
    Emergency,
    /// Treasury deposits, withdrawals and rebalancing
    Manager,
    /// Deployment migrations (no in-core operation)
    Upgrader,
    /// Executes governance decisions on the treasury
    Governor,
    /// May mint and burn the stable unit
    Minter,
}

impl Role {
    /// All roles
    pub const ALL: [Role; 7] = [
        Role::Admin,
        Role::Operator,
        Role::Emergency,
        Role::Manager,
        Role::Upgrader,
        Role::Governor,
        Role::Minter,
    ];

    /// Stable name for logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Operator => "OPERATOR",
            Role::Emergency => "EMERGENCY",
            Role::Manager => "MANAGER",
            Role::Upgrader => "UPGRADER",
            Role::Governor => "GOVERNOR",
            Role::Minter => "MINTER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUTHORIZER
// ═══════════════════════════════════════════════════════════════════════════════

/// Answers "does this account hold this capability"
pub trait Authorizer {
    /// Check a single role
    fn has_role(&self, role: Role, account: &Address) -> bool;
}

/// Reject unless `account` holds `role`
pub fn require_role(auth: &dyn Authorizer, role: Role, account: &Address) -> Result<()> {
    if auth.has_role(role, account) {
        return Ok(());
    }
    Err(Error::Unauthorized {
        role: role.name().into(),
        account: account.to_hex(),
    })
}

/// Reject unless `account` holds at least one of `roles`
pub fn require_any_role(auth: &dyn Authorizer, roles: &[Role], account: &Address) -> Result<()> {
    if roles.iter().any(|role| auth.has_role(*role, account)) {
        return Ok(());
    }
    let names: Vec<&str> = roles.iter().map(Role::name).collect();
    Err(Error::Unauthorized {
        role: names.join("|"),
        account: account.to_hex(),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROLE REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory role assignments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleRegistry {
    members: HashMap<Role, BTreeSet<Address>>,
}

impl RoleRegistry {
    /// Registry with `admin` holding every role, mirroring a fresh deployment
    pub fn with_admin(admin: Address) -> Self {
        let mut registry = Self::default();
        for role in Role::ALL {
            registry.members.entry(role).or_default().insert(admin);
        }
        registry
    }

    /// Grant `role` to `account`; caller must be an admin
    pub fn grant_role(&mut self, caller: &Address, role: Role, account: Address) -> Result<()> {
        require_role(self, Role::Admin, caller)?;
        validate_address(&account, "account")?;

        if self.members.entry(role).or_default().insert(account) {
            tracing::info!(%role, account = %account.short(), "role granted");
        }
        Ok(())
    }

    /// Revoke `role` from `account`; the last admin cannot be removed
    pub fn revoke_role(&mut self, caller: &Address, role: Role, account: &Address) -> Result<()> {
        require_role(self, Role::Admin, caller)?;

        if role == Role::Admin && self.has_role(Role::Admin, account) && self.member_count(Role::Admin) <= 1 {
            return Err(Error::InvalidParameter {
                name: "role".into(),
                reason: "cannot revoke the last admin".into(),
            });
        }

        if let Some(set) = self.members.get_mut(&role) {
            if set.remove(account) {
                tracing::info!(%role, account = %account.short(), "role revoked");
            }
        }
        Ok(())
    }

    /// Number of accounts holding `role`
    pub fn member_count(&self, role: Role) -> usize {
        self.members.get(&role).map(BTreeSet::len).unwrap_or(0)
    }
}

impl Authorizer for RoleRegistry {
    fn has_role(&self, role: Role, account: &Address) -> bool {
        self.members
            .get(&role)
            .map(|set| set.contains(account))
            .unwrap_or(false)
    }
}
