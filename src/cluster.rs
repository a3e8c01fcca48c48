//! The cluster collaborator seam.
//!
//! Actions and the export path only ever talk to the coordination service
//! through the [`Cluster`] trait. The real client speaks the Consul v1 HTTP
//! API ([`http::HttpCluster`]); tests use the in-process [`memory::MemoryCluster`].
use serde::{Deserialize, Serialize};

pub mod http;
pub mod memory;

/// Read consistency requested from the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Consistency {
    #[default]
    Default,
    /// Linearizable read through the leader.
    Consistent,
    /// Any server may answer, possibly with lagging data.
    Stale,
}

impl Consistency {
    /// Query parameter that selects this mode, if any.
    pub fn query_flag(self) -> Option<&'static str> {
        match self {
            Consistency::Default => None,
            Consistency::Consistent => Some("consistent"),
            Consistency::Stale => Some("stale"),
        }
    }

    pub fn as_str(self) -> &'static str {
        self.query_flag().unwrap_or("default")
    }
}

/// ACL token type as stored by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclType {
    #[default]
    Client,
    Management,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AclEntry {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "Type", default)]
    pub acl_type: AclType,
    #[serde(default)]
    pub rules: String,
}

/// A stored key with its raw payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KvPair {
    pub key: String,
    pub flags: u64,
    pub value: Vec<u8>,
    pub modify_index: u64,
}

/// Node entry as returned by the node listing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogNode {
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub address: String,
}

/// Service attached to a catalog node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentService {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub service: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub port: u16,
}

/// A node plus its attached services, in the order the cluster returned them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeDetail {
    pub node: CatalogNode,
    pub services: Vec<AgentService>,
}

/// Catalog registration body. Without a service it registers the node alone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogRegistration {
    pub node: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<AgentService>,
}

/// Catalog deregistration body. Without a service id the whole node goes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogDeregistration {
    pub node: String,
    #[serde(rename = "ServiceID", skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("cluster request {method} {path} failed: {message}")]
    Transport {
        method: &'static str,
        path: String,
        message: String,
    },

    #[error("cluster request {method} {path} returned status {status}: {body}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
        body: String,
    },

    #[error("decode cluster response for {path}: {message}")]
    Decode { path: String, message: String },

    /// Refusal reported by a non-HTTP implementation.
    #[error("cluster rejected {operation}: {message}")]
    Rejected { operation: String, message: String },
}

/// Operations the core consumes from the coordination service.
///
/// Calls block until the service answers; timeouts and cancellation belong
/// to the implementation.
pub trait Cluster {
    fn acl_list(&mut self, consistency: Consistency) -> Result<Vec<AclEntry>, ClusterError>;
    /// Creates an entry and returns the id the cluster assigned.
    fn acl_create(&mut self, entry: &AclEntry) -> Result<String, ClusterError>;
    fn acl_update(&mut self, entry: &AclEntry) -> Result<(), ClusterError>;
    fn acl_destroy(&mut self, id: &str) -> Result<(), ClusterError>;

    fn kv_get(&mut self, key: &str) -> Result<Option<KvPair>, ClusterError>;
    fn kv_list(&mut self, prefix: &str) -> Result<Vec<KvPair>, ClusterError>;
    fn kv_put(&mut self, pair: &KvPair) -> Result<(), ClusterError>;
    /// Check-and-set against `pair.modify_index`; an index of 0 only
    /// succeeds when the key is absent. Returns whether the write happened.
    fn kv_cas(&mut self, pair: &KvPair) -> Result<bool, ClusterError>;
    fn kv_delete(&mut self, key: &str) -> Result<(), ClusterError>;
    fn kv_delete_tree(&mut self, prefix: &str) -> Result<(), ClusterError>;

    fn catalog_register(&mut self, registration: &CatalogRegistration)
        -> Result<(), ClusterError>;
    fn catalog_deregister(
        &mut self,
        deregistration: &CatalogDeregistration,
    ) -> Result<(), ClusterError>;
    fn catalog_nodes(&mut self, consistency: Consistency)
        -> Result<Vec<CatalogNode>, ClusterError>;
    fn catalog_node(
        &mut self,
        node: &str,
        consistency: Consistency,
    ) -> Result<Option<NodeDetail>, ClusterError>;
}

/// Decode an explicit `null` as the type's empty value.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acl_entry_reads_consul_field_names() {
        let entry: AclEntry = serde_json::from_str(
            r#"{"ID":"abc","Name":"svc","Type":"management","Rules":"","CreateIndex":3}"#,
        )
        .expect("parse acl entry");
        assert_eq!(entry.id, "abc");
        assert_eq!(entry.acl_type, AclType::Management);
    }

    #[test]
    fn agent_service_accepts_null_tags() {
        let service: AgentService =
            serde_json::from_str(r#"{"ID":"web1","Service":"web","Tags":null,"Port":80}"#)
                .expect("parse service");
        assert!(service.tags.is_empty());
        assert_eq!(service.port, 80);
    }

    #[test]
    fn deregistration_omits_service_id_for_whole_node() {
        let body = serde_json::to_value(CatalogDeregistration {
            node: "n1".to_string(),
            service_id: None,
        })
        .expect("serialize");
        assert_eq!(body, serde_json::json!({"Node": "n1"}));
    }
}
