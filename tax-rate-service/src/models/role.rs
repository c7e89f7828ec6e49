use serde::{Deserialize, Serialize};

/// Role carried in the caller's access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Vendor,
    Readonly,
}

/// Capabilities checked by the tax rate endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    TaxRead,
    TaxWrite,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::TaxRead => "tax:read",
            Permission::TaxWrite => "tax:write",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Role {
    /// Admins hold every permission; other roles may only read rates.
    pub fn permits(&self, permission: Permission) -> bool {
        match self {
            Role::Admin => true,
            Role::Vendor | Role::Readonly => matches!(permission, Permission::TaxRead),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Vendor => "vendor",
            Role::Readonly => "readonly",
        }
    }
}
