//! In-process cluster used for tests and local rehearsal of a source file.
use super::{
    AclEntry, AclType, AgentService, CatalogDeregistration, CatalogNode, CatalogRegistration,
    Cluster, ClusterError, Consistency, KvPair, NodeDetail,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
struct StoredNode {
    address: String,
    services: Vec<AgentService>,
}

/// Holds ACLs, keys and catalog nodes in memory with the same semantics the
/// HTTP client relies on. ACL and node listings keep insertion order; keys
/// list in lexical order like the real store.
#[derive(Debug, Default)]
pub struct MemoryCluster {
    acls: Vec<AclEntry>,
    kv: BTreeMap<String, KvPair>,
    nodes: Vec<(String, StoredNode)>,
    next_id: u64,
    index: u64,
    calls: Vec<String>,
    fail_mutation: Option<usize>,
    mutations: usize,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`-th mutating call (1-based) fail with a rejection.
    pub fn fail_on_mutation(mut self, n: usize) -> Self {
        self.fail_mutation = Some(n);
        self
    }

    /// Every call made so far, as `operation target`. Listings log the
    /// requested consistency as their target.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    pub fn acls(&self) -> &[AclEntry] {
        &self.acls
    }

    /// Seed an ACL entry directly, bypassing the call log.
    pub fn insert_acl(&mut self, name: &str, acl_type: AclType, rules: &str) -> String {
        let id = self.allocate_id();
        self.acls.push(AclEntry {
            id: id.clone(),
            name: name.to_string(),
            acl_type,
            rules: rules.to_string(),
        });
        id
    }

    /// Stored bytes for a key, bypassing the call log.
    pub fn value(&self, key: &str) -> Option<&[u8]> {
        self.kv.get(key).map(|pair| pair.value.as_slice())
    }

    pub fn node_services(&self, node: &str) -> Option<&[AgentService]> {
        self.find_node(node).map(|stored| stored.services.as_slice())
    }

    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("acl-{:04}", self.next_id)
    }

    fn record(&mut self, operation: &str, target: &str) {
        self.calls.push(format!("{operation} {target}"));
    }

    fn mutate(&mut self, operation: &str, target: &str) -> Result<(), ClusterError> {
        self.record(operation, target);
        self.mutations += 1;
        if self.fail_mutation == Some(self.mutations) {
            return Err(ClusterError::Rejected {
                operation: format!("{operation} {target}"),
                message: "injected failure".to_string(),
            });
        }
        self.index += 1;
        Ok(())
    }

    fn find_node(&self, node: &str) -> Option<&StoredNode> {
        self.nodes
            .iter()
            .find(|(name, _)| name == node)
            .map(|(_, stored)| stored)
    }
}

impl Cluster for MemoryCluster {
    fn acl_list(&mut self, consistency: Consistency) -> Result<Vec<AclEntry>, ClusterError> {
        self.record("acl_list", consistency.as_str());
        Ok(self.acls.clone())
    }

    fn acl_create(&mut self, entry: &AclEntry) -> Result<String, ClusterError> {
        self.mutate("acl_create", &entry.name)?;
        let id = self.allocate_id();
        self.acls.push(AclEntry {
            id: id.clone(),
            ..entry.clone()
        });
        Ok(id)
    }

    fn acl_update(&mut self, entry: &AclEntry) -> Result<(), ClusterError> {
        self.mutate("acl_update", &entry.id)?;
        match self.acls.iter_mut().find(|stored| stored.id == entry.id) {
            Some(stored) => {
                *stored = entry.clone();
                Ok(())
            }
            None => Err(ClusterError::Rejected {
                operation: format!("acl_update {}", entry.id),
                message: "ACL not found".to_string(),
            }),
        }
    }

    fn acl_destroy(&mut self, id: &str) -> Result<(), ClusterError> {
        self.mutate("acl_destroy", id)?;
        self.acls.retain(|stored| stored.id != id);
        Ok(())
    }

    fn kv_get(&mut self, key: &str) -> Result<Option<KvPair>, ClusterError> {
        self.record("kv_get", key);
        Ok(self.kv.get(key).cloned())
    }

    fn kv_list(&mut self, prefix: &str) -> Result<Vec<KvPair>, ClusterError> {
        self.record("kv_list", prefix);
        Ok(self
            .kv
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, pair)| pair.clone())
            .collect())
    }

    fn kv_put(&mut self, pair: &KvPair) -> Result<(), ClusterError> {
        self.mutate("kv_put", &pair.key)?;
        let modify_index = self.index;
        self.kv.insert(
            pair.key.clone(),
            KvPair {
                modify_index,
                ..pair.clone()
            },
        );
        Ok(())
    }

    fn kv_cas(&mut self, pair: &KvPair) -> Result<bool, ClusterError> {
        self.mutate("kv_cas", &pair.key)?;
        let current = self.kv.get(&pair.key).map(|stored| stored.modify_index);
        let matches = match current {
            None => pair.modify_index == 0,
            Some(index) => pair.modify_index == index,
        };
        if !matches {
            return Ok(false);
        }
        let modify_index = self.index;
        self.kv.insert(
            pair.key.clone(),
            KvPair {
                modify_index,
                ..pair.clone()
            },
        );
        Ok(true)
    }

    fn kv_delete(&mut self, key: &str) -> Result<(), ClusterError> {
        self.mutate("kv_delete", key)?;
        self.kv.remove(key);
        Ok(())
    }

    fn kv_delete_tree(&mut self, prefix: &str) -> Result<(), ClusterError> {
        self.mutate("kv_delete_tree", prefix)?;
        self.kv.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }

    fn catalog_register(
        &mut self,
        registration: &CatalogRegistration,
    ) -> Result<(), ClusterError> {
        self.mutate("catalog_register", &registration.node)?;
        let position = self
            .nodes
            .iter()
            .position(|(name, _)| *name == registration.node);
        let index = match position {
            Some(index) => index,
            None => {
                self.nodes
                    .push((registration.node.clone(), StoredNode::default()));
                self.nodes.len() - 1
            }
        };
        let stored = &mut self.nodes[index].1;
        stored.address = registration.address.clone();
        if let Some(service) = &registration.service {
            match stored.services.iter_mut().find(|s| s.id == service.id) {
                Some(existing) => *existing = service.clone(),
                None => stored.services.push(service.clone()),
            }
        }
        Ok(())
    }

    fn catalog_deregister(
        &mut self,
        deregistration: &CatalogDeregistration,
    ) -> Result<(), ClusterError> {
        self.mutate("catalog_deregister", &deregistration.node)?;
        match &deregistration.service_id {
            None => self.nodes.retain(|(name, _)| *name != deregistration.node),
            Some(service_id) => {
                if let Some((_, stored)) = self
                    .nodes
                    .iter_mut()
                    .find(|(name, _)| *name == deregistration.node)
                {
                    stored.services.retain(|service| service.id != *service_id);
                }
            }
        }
        Ok(())
    }

    fn catalog_nodes(
        &mut self,
        consistency: Consistency,
    ) -> Result<Vec<CatalogNode>, ClusterError> {
        self.record("catalog_nodes", consistency.as_str());
        Ok(self
            .nodes
            .iter()
            .map(|(name, stored)| CatalogNode {
                node: name.clone(),
                address: stored.address.clone(),
            })
            .collect())
    }

    fn catalog_node(
        &mut self,
        node: &str,
        consistency: Consistency,
    ) -> Result<Option<NodeDetail>, ClusterError> {
        self.record("catalog_node", &format!("{node} {}", consistency.as_str()));
        Ok(self.find_node(node).map(|stored| NodeDetail {
            node: CatalogNode {
                node: node.to_string(),
                address: stored.address.clone(),
            },
            services: stored.services.clone(),
        }))
    }
}
