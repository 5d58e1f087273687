use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::roles::Role;

/// Matches any object or action.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
        }
    }
}

/// `(subject-or-role, object, action, effect)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyRule {
    pub subject: String,
    pub object: String,
    pub action: String,
    pub effect: Effect,
}

impl PolicyRule {
    pub fn allow(subject: impl Into<String>, object: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            object: object.into(),
            action: action.into(),
            effect: Effect::Allow,
        }
    }

    pub fn deny(subject: impl Into<String>, object: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            effect: Effect::Deny,
            ..Self::allow(subject, object, action)
        }
    }

    fn matches(&self, object: &str, action: &str) -> bool {
        (self.object == WILDCARD || self.object == object)
            && (self.action == WILDCARD || self.action == action)
    }
}

/// `subject` belongs to `role`. Roles may themselves be grouped into roles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grouping {
    pub subject: String,
    pub role: Role,
}

impl Grouping {
    pub fn new(subject: impl Into<String>, role: Role) -> Self {
        Self {
            subject: subject.into(),
            role,
        }
    }
}

/// Everything a store returns on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub rules: Vec<PolicyRule>,
    pub groupings: Vec<Grouping>,
}

/// In-memory RBAC model.
///
/// Decision: some applicable rule allows and no applicable rule denies.
/// A rule applies when its subject is the request subject or any role the
/// subject reaches through groupings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyModel {
    rules: HashSet<PolicyRule>,
    groupings: BTreeMap<String, BTreeSet<Role>>,
}

impl PolicyModel {
    pub fn from_snapshot(snapshot: PolicySnapshot) -> Self {
        let mut model = Self::default();
        for rule in snapshot.rules {
            model.rules.insert(rule);
        }
        for g in snapshot.groupings {
            model.add_grouping(&g.subject, g.role);
        }
        model
    }

    pub fn enforce(&self, subject: &str, object: &str, action: &str) -> bool {
        let mut subjects = self.implicit_roles(subject)
            .into_iter()
            .map(|r| r.as_str().to_owned())
            .collect::<HashSet<_>>();
        subjects.insert(subject.to_owned());

        let mut allowed = false;
        for rule in self.rules.iter().filter(|r| subjects.contains(&r.subject)) {
            if !rule.matches(object, action) {
                continue;
            }
            match rule.effect {
                Effect::Deny => return false,
                Effect::Allow => allowed = true,
            }
        }
        allowed
    }

    /// Direct roles, sorted.
    pub fn roles_for(&self, subject: &str) -> Vec<Role> {
        self.groupings
            .get(subject)
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct and inherited roles. Cycles in the grouping graph terminate.
    pub fn implicit_roles(&self, subject: &str) -> BTreeSet<Role> {
        let mut seen = BTreeSet::new();
        let mut frontier = vec![subject.to_owned()];
        while let Some(current) = frontier.pop() {
            let Some(roles) = self.groupings.get(&current) else {
                continue;
            };
            for role in roles {
                if seen.insert(role.clone()) {
                    frontier.push(role.as_str().to_owned());
                }
            }
        }
        seen
    }

    pub fn add_rule(&mut self, rule: PolicyRule) -> bool {
        self.rules.insert(rule)
    }

    pub fn remove_rule(&mut self, rule: &PolicyRule) -> bool {
        self.rules.remove(rule)
    }

    pub fn add_grouping(&mut self, subject: &str, role: Role) -> bool {
        self.groupings.entry(subject.to_owned()).or_default().insert(role)
    }

    pub fn remove_grouping(&mut self, subject: &str, role: &Role) -> bool {
        let Some(roles) = self.groupings.get_mut(subject) else {
            return false;
        };
        let removed = roles.remove(role);
        if roles.is_empty() {
            self.groupings.remove(subject);
        }
        removed
    }

    /// Swap the subject's whole role set in one step.
    pub fn replace_roles(&mut self, subject: &str, roles: impl IntoIterator<Item = Role>) {
        let roles: BTreeSet<Role> = roles.into_iter().collect();
        if roles.is_empty() {
            self.groupings.remove(subject);
        } else {
            self.groupings.insert(subject.to_owned(), roles);
        }
    }
}
