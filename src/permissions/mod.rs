//! Role based access table.
//!
//! Authorization is a lookup of (module, role, action) in an immutable table.
//! The table is built once (built-in defaults or a YAML policy file) and handed
//! to the router state; nothing in here is global.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
pub enum Role {
    Admin,
    SalesManager,
    SalesExecutive,
    Marketing,
    Viewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    PreLeads,
    Leads,
    Customers,
    Contacts,
    Activities,
    SalesTargets,
    CustomerRequirements,
    Webhooks,
    Reports,
    Users,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Create,
    Update,
    Delete,
    Validate,
    Convert,
    Discard,
    Assign,
    Export,
}

macro_rules! named_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = UnknownName;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(UnknownName(other.to_string())),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

named_enum!(Role {
    Admin => "admin",
    SalesManager => "sales_manager",
    SalesExecutive => "sales_executive",
    Marketing => "marketing",
    Viewer => "viewer",
});

named_enum!(Module {
    PreLeads => "pre_leads",
    Leads => "leads",
    Customers => "customers",
    Contacts => "contacts",
    Activities => "activities",
    SalesTargets => "sales_targets",
    CustomerRequirements => "customer_requirements",
    Webhooks => "webhooks",
    Reports => "reports",
    Users => "users",
});

named_enum!(Action {
    View => "view",
    Create => "create",
    Update => "update",
    Delete => "delete",
    Validate => "validate",
    Convert => "convert",
    Discard => "discard",
    Assign => "assign",
    Export => "export",
});

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown name: {0}")]
pub struct UnknownName(pub String);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("role '{role}' may not {action} {module}")]
pub struct PermissionDenied {
    pub role: Role,
    pub module: Module,
    pub action: Action,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read permission policy {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid permission policy: {0}")]
    Parse(#[from] serde_yaml::Error),
}

type Grants = HashMap<Module, HashMap<Role, HashSet<Action>>>;

/// Immutable (module -> role -> actions) table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionMatrix {
    grants: Grants,
}

use self::Action::*;

const CRUD: &[Action] = &[View, Create, Update, Delete];

/// Built-in policy, one row per (module, role)
const BUILTIN: &[(Module, Role, &[Action])] = &[
    (Module::PreLeads, Role::Admin, &[View, Create, Update, Delete, Validate, Discard, Assign, Export]),
    (Module::PreLeads, Role::SalesManager, &[View, Create, Update, Delete, Validate, Discard, Assign, Export]),
    (Module::PreLeads, Role::SalesExecutive, &[View, Create, Update, Validate, Discard]),
    (Module::PreLeads, Role::Marketing, &[View, Create, Update, Export]),
    (Module::PreLeads, Role::Viewer, &[View]),
    (Module::Leads, Role::Admin, &[View, Create, Update, Delete, Convert, Discard, Assign, Export]),
    (Module::Leads, Role::SalesManager, &[View, Create, Update, Delete, Convert, Discard, Assign, Export]),
    (Module::Leads, Role::SalesExecutive, &[View, Create, Update, Convert, Discard]),
    (Module::Leads, Role::Marketing, &[View]),
    (Module::Leads, Role::Viewer, &[View]),
    (Module::Customers, Role::Admin, &[View, Create, Update, Delete, Assign, Export]),
    (Module::Customers, Role::SalesManager, &[View, Update, Assign, Export]),
    (Module::Customers, Role::SalesExecutive, &[View, Update]),
    (Module::Customers, Role::Marketing, &[View, Export]),
    (Module::Customers, Role::Viewer, &[View]),
    (Module::Contacts, Role::Admin, CRUD),
    (Module::Contacts, Role::SalesManager, CRUD),
    (Module::Contacts, Role::SalesExecutive, &[View, Create, Update]),
    (Module::Contacts, Role::Marketing, &[View]),
    (Module::Contacts, Role::Viewer, &[View]),
    (Module::Activities, Role::Admin, CRUD),
    (Module::Activities, Role::SalesManager, CRUD),
    (Module::Activities, Role::SalesExecutive, &[View, Create, Update]),
    (Module::Activities, Role::Viewer, &[View]),
    (Module::SalesTargets, Role::Admin, CRUD),
    (Module::SalesTargets, Role::SalesManager, &[View, Create, Update]),
    (Module::SalesTargets, Role::SalesExecutive, &[View]),
    (Module::CustomerRequirements, Role::Admin, CRUD),
    (Module::CustomerRequirements, Role::SalesManager, CRUD),
    (Module::CustomerRequirements, Role::SalesExecutive, &[View, Create, Update]),
    (Module::CustomerRequirements, Role::Viewer, &[View]),
    (Module::Webhooks, Role::Admin, CRUD),
    (Module::Reports, Role::Admin, &[View, Export]),
    (Module::Reports, Role::SalesManager, &[View, Export]),
    (Module::Reports, Role::Marketing, &[View]),
    (Module::Reports, Role::Viewer, &[View]),
    (Module::Users, Role::Admin, &[View, Create, Update, Delete, Assign]),
    (Module::Users, Role::SalesManager, &[View]),
];

impl PermissionMatrix {
    pub fn builtin() -> Self {
        let mut grants: Grants = HashMap::new();
        for (module, role, actions) in BUILTIN {
            grants
                .entry(*module)
                .or_default()
                .entry(*role)
                .or_default()
                .extend(actions.iter().copied());
        }
        Self { grants }
    }

    /// Parse a policy of the shape `module: { role: [action, ...] }`.
    /// Unknown module, role or action names are rejected.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PolicyError> {
        let grants: Grants = serde_yaml::from_str(yaml)?;
        Ok(Self { grants })
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Built-in policy unless a policy file is configured
    pub fn load(path: Option<&Path>) -> Result<Self, PolicyError> {
        match path {
            Some(path) => Self::from_yaml_file(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn check(&self, role: Role, module: Module, action: Action) -> bool {
        self.grants
            .get(&module)
            .and_then(|roles| roles.get(&role))
            .map(|actions| actions.contains(&action))
            .unwrap_or(false)
    }

    /// String form of `check`; any unknown name is a denial.
    pub fn check_named(&self, role: &str, module: &str, action: &str) -> bool {
        match (role.parse::<Role>(), module.parse::<Module>(), action.parse::<Action>()) {
            (Ok(role), Ok(module), Ok(action)) => self.check(role, module, action),
            _ => false,
        }
    }

    pub fn require(&self, role: Role, module: Module, action: Action) -> Result<(), PermissionDenied> {
        if self.check(role, module, action) {
            Ok(())
        } else {
            Err(PermissionDenied { role, module, action })
        }
    }

    /// Everything a role may do, ordered for display
    pub fn allowed_actions(&self, role: Role) -> BTreeMap<Module, BTreeSet<Action>> {
        self.grants
            .iter()
            .filter_map(|(module, roles)| {
                roles
                    .get(&role)
                    .filter(|actions| !actions.is_empty())
                    .map(|actions| (*module, actions.iter().copied().collect()))
            })
            .collect()
    }

    pub fn to_yaml(&self) -> Result<String, PolicyError> {
        let ordered: BTreeMap<Module, BTreeMap<Role, BTreeSet<Action>>> = self
            .grants
            .iter()
            .map(|(module, roles)| {
                let roles = roles
                    .iter()
                    .map(|(role, actions)| (*role, actions.iter().copied().collect()))
                    .collect();
                (*module, roles)
            })
            .collect();
        Ok(serde_yaml::to_string(&ordered)?)
    }
}

impl Default for PermissionMatrix {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_grants_conversion_to_sales_roles_only() {
        let matrix = PermissionMatrix::builtin();
        assert!(matrix.check(Role::Admin, Module::Leads, Action::Convert));
        assert!(matrix.check(Role::SalesExecutive, Module::Leads, Action::Convert));
        assert!(!matrix.check(Role::Marketing, Module::Leads, Action::Convert));
        assert!(!matrix.check(Role::Viewer, Module::Leads, Action::Convert));
        assert!(matrix.check(Role::Viewer, Module::Leads, Action::View));
    }

    #[test]
    fn check_named_fails_closed_on_unknown_names() {
        let matrix = PermissionMatrix::builtin();
        assert!(matrix.check_named("admin", "pre_leads", "validate"));
        assert!(!matrix.check_named("superuser", "pre_leads", "validate"));
        assert!(!matrix.check_named("admin", "invoices", "view"));
        assert!(!matrix.check_named("admin", "pre_leads", "launch"));
    }

    #[test]
    fn modules_without_role_entry_deny() {
        let matrix = PermissionMatrix::builtin();
        assert!(!matrix.check(Role::Marketing, Module::Webhooks, Action::View));
        assert!(matrix.require(Role::Viewer, Module::Users, Action::View).is_err());
    }

    #[test]
    fn yaml_policy_replaces_builtin() {
        let yaml = r#"
leads:
  viewer: [view, convert]
pre_leads:
  marketing: [view]
"#;
        let matrix = PermissionMatrix::from_yaml_str(yaml).unwrap();
        assert!(matrix.check(Role::Viewer, Module::Leads, Action::Convert));
        assert!(!matrix.check(Role::Admin, Module::Leads, Action::View));
        assert!(matrix.check(Role::Marketing, Module::PreLeads, Action::View));
    }

    #[test]
    fn yaml_policy_rejects_unknown_action() {
        let yaml = "leads:\n  admin: [obliterate]\n";
        assert!(PermissionMatrix::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn yaml_round_trip_of_builtin() {
        let builtin = PermissionMatrix::builtin();
        let yaml = builtin.to_yaml().unwrap();
        assert_eq!(PermissionMatrix::from_yaml_str(&yaml).unwrap(), builtin);
    }

    #[test]
    fn allowed_actions_lists_only_granted_modules() {
        let matrix = PermissionMatrix::builtin();
        let actions = matrix.allowed_actions(Role::Marketing);
        assert!(actions.contains_key(&Module::PreLeads));
        assert!(!actions.contains_key(&Module::Webhooks));
        assert!(actions[&Module::PreLeads].contains(&Action::Export));
    }
}
