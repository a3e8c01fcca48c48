//! Rebuild an action list from live cluster state.
//!
//! Categories are independent and always appended in the same order: ACLs,
//! external nodes, then keys. Any query error aborts the whole export.
use crate::action::acl::AclSet;
use crate::action::external_node::{ExternalNodeRegister, ExternalNodeService};
use crate::action::kv::KvSet;
use crate::action::Actions;
use crate::cluster::{AclType, Cluster, ClusterError, Consistency};

/// Service id the agent registers for itself; a node carrying it is managed
/// by the cluster and never exported as external.
pub const AGENT_SERVICE_ID: &str = "consul";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub acl: bool,
    pub external_node: bool,
    pub kv: bool,
}

impl ExportOptions {
    pub fn all() -> Self {
        Self {
            acl: true,
            external_node: true,
            kv: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.acl || self.external_node || self.kv)
    }
}

pub fn export_actions(
    cluster: &mut dyn Cluster,
    options: ExportOptions,
) -> Result<Actions, ClusterError> {
    let mut actions = Actions::new();
    if options.acl {
        export_acl(cluster, &mut actions)?;
    }
    if options.external_node {
        export_external_nodes(cluster, &mut actions)?;
    }
    if options.kv {
        export_kv(cluster, &mut actions)?;
    }
    tracing::info!(count = actions.len(), "exported actions");
    Ok(actions)
}

/// One `ACLSet` per entry, leaving out management tokens.
pub fn export_acl(cluster: &mut dyn Cluster, actions: &mut Actions) -> Result<(), ClusterError> {
    for entry in cluster.acl_list(Consistency::Consistent)? {
        if entry.acl_type == AclType::Management {
            tracing::debug!(name = %entry.name, "skipping management ACL");
            continue;
        }
        actions.push(Box::new(AclSet {
            name: entry.name,
            rules: entry.rules,
        }));
    }
    Ok(())
}

/// One `ExternalNodeRegister` per node that does not run an agent.
pub fn export_external_nodes(
    cluster: &mut dyn Cluster,
    actions: &mut Actions,
) -> Result<(), ClusterError> {
    for listed in cluster.catalog_nodes(Consistency::Consistent)? {
        let Some(detail) = cluster.catalog_node(&listed.node, Consistency::Consistent)? else {
            tracing::debug!(node = %listed.node, "node vanished during export");
            continue;
        };
        if detail
            .services
            .iter()
            .any(|service| service.id == AGENT_SERVICE_ID)
        {
            tracing::debug!(node = %listed.node, "skipping agent node");
            continue;
        }
        actions.push(Box::new(ExternalNodeRegister {
            node: detail.node.node,
            address: detail.node.address,
            services: detail
                .services
                .into_iter()
                .map(ExternalNodeService::from)
                .collect(),
        }));
    }
    Ok(())
}

/// One `KVSet` per stored key, bytes kept verbatim.
pub fn export_kv(cluster: &mut dyn Cluster, actions: &mut Actions) -> Result<(), ClusterError> {
    for pair in cluster.kv_list("")? {
        actions.push(Box::new(KvSet::from_bytes(pair.key, pair.flags, &pair.value)));
    }
    Ok(())
}
