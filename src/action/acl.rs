//! ACL actions.
//!
//! The ACL store does not enforce unique names, so both actions act on every
//! entry whose name matches, not only the first one.
use super::{require, Action, Context, Outcome, ValidationError};
use crate::cluster::{null_as_default, AclEntry, AclType, ClusterError, Consistency};
use crate::registry::{Factories, FactoryError};
use serde::{Deserialize, Serialize};
use std::fmt;

pub fn register(factories: &mut Factories) {
    factories.register(factory);
}

fn factory(id: &str) -> Result<Box<dyn Action>, FactoryError> {
    match id {
        "ACLDelete" => Ok(Box::<AclDelete>::default()),
        "ACLSet" => Ok(Box::<AclSet>::default()),
        _ => Err(FactoryError::unknown(id)),
    }
}

/// Delete every ACL entry named `name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AclDelete {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
}

/// Set the rules of every ACL entry named `name`, creating one client entry
/// when none exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AclSet {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub rules: String,
}

fn matching(ctx: &mut Context<'_>, name: &str) -> Result<Vec<AclEntry>, ClusterError> {
    let entries = ctx.cluster.acl_list(Consistency::Consistent)?;
    Ok(entries
        .into_iter()
        .filter(|entry| entry.name == name)
        .collect())
}

impl Action for AclDelete {
    fn kind(&self) -> &'static str {
        "ACLDelete"
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.name, "Name")
    }

    fn apply(&self, ctx: &mut Context<'_>) -> Result<Outcome, ClusterError> {
        let entries = matching(ctx, &self.name)?;
        if entries.is_empty() {
            return Ok(Outcome::Skipped("no ACL with that name".to_string()));
        }
        for entry in &entries {
            ctx.cluster.acl_destroy(&entry.id)?;
        }
        tracing::info!(name = %self.name, count = entries.len(), "destroyed ACL entries");
        Ok(Outcome::Applied)
    }
}

impl fmt::Display for AclDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ACL Delete {:?}", self.name)
    }
}

impl Action for AclSet {
    fn kind(&self) -> &'static str {
        "ACLSet"
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.name, "Name")
    }

    fn apply(&self, ctx: &mut Context<'_>) -> Result<Outcome, ClusterError> {
        let entries = matching(ctx, &self.name)?;
        for entry in &entries {
            ctx.cluster.acl_update(&AclEntry {
                id: entry.id.clone(),
                name: entry.name.clone(),
                acl_type: AclType::Client,
                rules: self.rules.clone(),
            })?;
        }
        if entries.is_empty() {
            let id = ctx.cluster.acl_create(&AclEntry {
                id: String::new(),
                name: self.name.clone(),
                acl_type: AclType::Client,
                rules: self.rules.clone(),
            })?;
            tracing::info!(name = %self.name, %id, "created ACL entry");
        } else {
            tracing::info!(name = %self.name, count = entries.len(), "updated ACL entries");
        }
        Ok(Outcome::Applied)
    }
}

impl fmt::Display for AclSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ACL Set {:?} {:?}", self.name, self.rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::memory::MemoryCluster;

    #[test]
    fn set_updates_every_entry_sharing_the_name() {
        let mut cluster = MemoryCluster::new();
        cluster.insert_acl("svc-a", AclType::Client, "old");
        cluster.insert_acl("svc-a", AclType::Client, "older");
        cluster.insert_acl("svc-b", AclType::Client, "keep");
        let action = AclSet {
            name: "svc-a".to_string(),
            rules: "key \"\" { policy = \"read\" }".to_string(),
        };
        let outcome = action
            .apply(&mut Context::new(&mut cluster))
            .expect("apply");
        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(cluster.calls()[0], "acl_list consistent");
        let rules: Vec<&str> = cluster
            .acls()
            .iter()
            .map(|entry| entry.rules.as_str())
            .collect();
        assert_eq!(rules, vec![action.rules.as_str(), action.rules.as_str(), "keep"]);
    }

    #[test]
    fn set_creates_client_entry_when_name_is_new() {
        let mut cluster = MemoryCluster::new();
        let action = AclSet {
            name: "fresh".to_string(),
            rules: String::new(),
        };
        action
            .apply(&mut Context::new(&mut cluster))
            .expect("apply");
        assert_eq!(cluster.acls().len(), 1);
        assert_eq!(cluster.acls()[0].acl_type, AclType::Client);
        assert!(!cluster.acls()[0].id.is_empty());
    }

    #[test]
    fn delete_removes_all_matches_and_skips_when_absent() {
        let mut cluster = MemoryCluster::new();
        cluster.insert_acl("dup", AclType::Client, "");
        cluster.insert_acl("dup", AclType::Client, "");
        cluster.insert_acl("other", AclType::Client, "");
        let action = AclDelete {
            name: "dup".to_string(),
        };
        assert_eq!(
            action.apply(&mut Context::new(&mut cluster)).expect("apply"),
            Outcome::Applied
        );
        assert_eq!(cluster.acls().len(), 1);
        assert!(matches!(
            action.apply(&mut Context::new(&mut cluster)).expect("reapply"),
            Outcome::Skipped(_)
        ));
        let listings: Vec<&str> = cluster
            .calls()
            .iter()
            .filter(|call| call.starts_with("acl_list"))
            .map(String::as_str)
            .collect();
        assert_eq!(listings, vec!["acl_list consistent", "acl_list consistent"]);
    }

    #[test]
    fn name_is_required() {
        assert!(AclDelete::default().validate().is_err());
        assert!(AclSet::default().validate().is_err());
        let set = AclSet {
            name: "n".to_string(),
            rules: String::new(),
        };
        assert!(set.validate().is_ok());
    }

    #[test]
    fn describes_with_quoted_fields() {
        let set = AclSet {
            name: "svc-a".to_string(),
            rules: "r".to_string(),
        };
        assert_eq!(set.to_string(), r#"ACL Set "svc-a" "r""#);
    }
}
