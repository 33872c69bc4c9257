//! JWT claims and user roles.

use serde::{Deserialize, Serialize};

/// User role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular account; may only act on its own sessions.
    #[default]
    User,
    /// May act on any session.
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// JWT claims.
///
/// CRM-issued tokens carry the account id as `userId`; standard tokens use
/// `sub`. Both land in `sub`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (account id).
    #[serde(alias = "userId")]
    pub sub: String,

    /// Expiration time (as Unix timestamp).
    pub exp: i64,

    /// Issued at (as Unix timestamp).
    #[serde(default)]
    pub iat: Option<i64>,

    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,

    /// User's email.
    #[serde(default)]
    pub email: Option<String>,

    /// User's name.
    #[serde(default)]
    pub name: Option<String>,

    /// Role claim.
    #[serde(default)]
    pub role: Option<String>,

    /// Alternative roles array.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claims {
    /// Get the effective role for the user.
    pub fn effective_role(&self) -> Role {
        let is_admin = self
            .role
            .iter()
            .chain(self.roles.iter())
            .any(|r| r.eq_ignore_ascii_case("admin"));
        if is_admin { Role::Admin } else { Role::User }
    }

    pub fn is_admin(&self) -> bool {
        self.effective_role() == Role::Admin
    }

    /// Get the display name for the user.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str) -> Claims {
        Claims {
            sub: sub.to_string(),
            exp: 0,
            iat: None,
            iss: None,
            email: None,
            name: None,
            role: None,
            roles: vec![],
        }
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_claims_effective_role() {
        assert_eq!(claims("u1").effective_role(), Role::User);

        let admin = Claims {
            role: Some("ADMIN".to_string()),
            ..claims("u1")
        };
        assert!(admin.is_admin());

        let admin_from_roles = Claims {
            roles: vec!["user".to_string(), "admin".to_string()],
            ..claims("u1")
        };
        assert_eq!(admin_from_roles.effective_role(), Role::Admin);
    }

    #[test]
    fn test_user_id_alias() {
        let claims: Claims =
            serde_json::from_str(r#"{"userId":"acct-7","exp":1999999999}"#).unwrap();
        assert_eq!(claims.sub, "acct-7");
        assert_eq!(claims.display_name(), "acct-7");
    }
}
