//! Blocking client for the Consul v1 HTTP API.
//!
//! Only the endpoints the actions and the export path need are covered:
//! legacy ACLs, KV and the catalog.
use super::{
    AclEntry, AgentService, CatalogDeregistration, CatalogNode, CatalogRegistration, Cluster,
    ClusterError, Consistency, KvPair, NodeDetail,
};
use crate::config::ClusterConfig;
use base64::Engine as _;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use ureq::http::Response;
use ureq::{Agent, Body, RequestBuilder};
use url::Url;

const TOKEN_HEADER: &str = "X-Consul-Token";

/// Everything outside the RFC 3986 unreserved set is escaped, `%` included.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub struct HttpCluster {
    agent: Agent,
    base: Url,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireKvPair {
    key: String,
    #[serde(default)]
    flags: u64,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    modify_index: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireNodeDetail {
    node: Option<CatalogNode>,
    #[serde(default)]
    services: Option<BTreeMap<String, AgentService>>,
}

#[derive(Debug, Deserialize)]
struct WireCreated {
    #[serde(rename = "ID")]
    id: String,
}

impl HttpCluster {
    pub fn new(config: &ClusterConfig) -> Result<Self, crate::config::ConfigError> {
        let mut base = config.server_url()?;
        base.set_query(None);
        base.set_fragment(None);
        // Status codes are inspected here so error bodies can be reported.
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Ok(Self {
            agent,
            base,
            token: config.token().map(str::to_string),
        })
    }

    /// `path` must already be escaped. It is appended as-is so no dot
    /// segment or escape in a key is reinterpreted on the way out.
    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base.as_str().trim_end_matches('/'))
    }

    fn prepare<B>(&self, request: RequestBuilder<B>) -> RequestBuilder<B> {
        match &self.token {
            Some(token) => request.header(TOKEN_HEADER, token.as_str()),
            None => request,
        }
    }

    fn with_consistency<B>(
        request: RequestBuilder<B>,
        consistency: Consistency,
    ) -> RequestBuilder<B> {
        match consistency.query_flag() {
            Some(flag) => request.query(flag, ""),
            None => request,
        }
    }

    fn check(
        method: &'static str,
        path: &str,
        result: Result<Response<Body>, ureq::Error>,
    ) -> Result<Response<Body>, ClusterError> {
        let mut response = result.map_err(|err| ClusterError::Transport {
            method,
            path: path.to_string(),
            message: err.to_string(),
        })?;
        let status = response.status();
        tracing::debug!(method, path, status = status.as_u16(), "cluster request");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.body_mut().read_to_string();
        Err(status_error(method, path, status.as_u16(), body))
    }

    fn read_json<T: DeserializeOwned>(
        path: &str,
        mut response: Response<Body>,
    ) -> Result<T, ClusterError> {
        response
            .body_mut()
            .read_json::<T>()
            .map_err(|err| ClusterError::Decode {
                path: path.to_string(),
                message: err.to_string(),
            })
    }

    fn read_text(path: &str, mut response: Response<Body>) -> Result<String, ClusterError> {
        response
            .body_mut()
            .read_to_string()
            .map_err(|err| ClusterError::Decode {
                path: path.to_string(),
                message: err.to_string(),
            })
    }

    fn get(
        &self,
        path: &str,
        consistency: Consistency,
        recurse: bool,
    ) -> Result<Option<Response<Body>>, ClusterError> {
        let mut request = self.prepare(self.agent.get(&self.endpoint(path)));
        request = Self::with_consistency(request, consistency);
        if recurse {
            request = request.query("recurse", "");
        }
        match Self::check("GET", path, request.call()) {
            Ok(response) => Ok(Some(response)),
            Err(ClusterError::Status { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn put_json<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response<Body>, ClusterError> {
        let request = self.prepare(self.agent.put(&self.endpoint(path)));
        Self::check("PUT", path, request.send_json(body))
    }

    fn put_value(&self, pair: &KvPair, cas: Option<u64>) -> Result<bool, ClusterError> {
        let path = kv_path(&pair.key);
        let mut request = self
            .prepare(self.agent.put(&self.endpoint(&path)))
            .query("flags", pair.flags.to_string());
        if let Some(index) = cas {
            request = request.query("cas", index.to_string());
        }
        let response = Self::check("PUT", &path, request.send(&pair.value[..]))?;
        let text = Self::read_text(&path, response)?;
        Ok(text.trim() == "true")
    }

    fn delete(&self, path: &str, recurse: bool) -> Result<(), ClusterError> {
        let mut request = self.prepare(self.agent.delete(&self.endpoint(path)));
        if recurse {
            request = request.query("recurse", "");
        }
        Self::check("DELETE", path, request.call())?;
        Ok(())
    }

    fn decode_pairs(path: &str, wire: Vec<WireKvPair>) -> Result<Vec<KvPair>, ClusterError> {
        wire.into_iter()
            .map(|pair| {
                let value = match pair.value {
                    Some(encoded) => base64::engine::general_purpose::STANDARD
                        .decode(encoded.as_bytes())
                        .map_err(|err| ClusterError::Decode {
                            path: path.to_string(),
                            message: format!("value of {}: {err}", pair.key),
                        })?,
                    None => Vec::new(),
                };
                Ok(KvPair {
                    key: pair.key,
                    flags: pair.flags,
                    value,
                    modify_index: pair.modify_index,
                })
            })
            .collect()
    }
}

fn escape_segment(segment: &str) -> String {
    match segment {
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => utf8_percent_encode(segment, SEGMENT).to_string(),
    }
}

/// KV endpoint for `key`. Slashes stay literal since they separate levels
/// of the key hierarchy; every segment is escaped on its own.
fn kv_path(key: &str) -> String {
    let escaped: Vec<String> = key.split('/').map(escape_segment).collect();
    format!("kv/{}", escaped.join("/"))
}

fn status_error<E: std::fmt::Display>(
    method: &'static str,
    path: &str,
    status: u16,
    body: Result<String, E>,
) -> ClusterError {
    let body = match body {
        Ok(text) => text.trim().to_string(),
        Err(err) => {
            tracing::debug!(method, path, error = %err, "read error body");
            "<unreadable body>".to_string()
        }
    };
    ClusterError::Status {
        method,
        path: path.to_string(),
        status,
        body,
    }
}

impl Cluster for HttpCluster {
    fn acl_list(&mut self, consistency: Consistency) -> Result<Vec<AclEntry>, ClusterError> {
        let path = "acl/list";
        match self.get(path, consistency, false)? {
            Some(response) => {
                let entries: Option<Vec<AclEntry>> = Self::read_json(path, response)?;
                Ok(entries.unwrap_or_default())
            }
            None => Ok(Vec::new()),
        }
    }

    fn acl_create(&mut self, entry: &AclEntry) -> Result<String, ClusterError> {
        let path = "acl/create";
        let response = self.put_json(path, entry)?;
        let created: WireCreated = Self::read_json(path, response)?;
        Ok(created.id)
    }

    fn acl_update(&mut self, entry: &AclEntry) -> Result<(), ClusterError> {
        self.put_json("acl/update", entry)?;
        Ok(())
    }

    fn acl_destroy(&mut self, id: &str) -> Result<(), ClusterError> {
        let path = format!("acl/destroy/{}", escape_segment(id));
        let request = self.prepare(self.agent.put(&self.endpoint(&path)));
        Self::check("PUT", &path, request.send_empty())?;
        Ok(())
    }

    fn kv_get(&mut self, key: &str) -> Result<Option<KvPair>, ClusterError> {
        let path = kv_path(key);
        let Some(response) = self.get(&path, Consistency::Default, false)? else {
            return Ok(None);
        };
        let wire: Vec<WireKvPair> = Self::read_json(&path, response)?;
        Ok(Self::decode_pairs(&path, wire)?.into_iter().next())
    }

    fn kv_list(&mut self, prefix: &str) -> Result<Vec<KvPair>, ClusterError> {
        let path = kv_path(prefix);
        let Some(response) = self.get(&path, Consistency::Default, true)? else {
            return Ok(Vec::new());
        };
        let wire: Vec<WireKvPair> = Self::read_json(&path, response)?;
        Self::decode_pairs(&path, wire)
    }

    fn kv_put(&mut self, pair: &KvPair) -> Result<(), ClusterError> {
        self.put_value(pair, None)?;
        Ok(())
    }

    fn kv_cas(&mut self, pair: &KvPair) -> Result<bool, ClusterError> {
        self.put_value(pair, Some(pair.modify_index))
    }

    fn kv_delete(&mut self, key: &str) -> Result<(), ClusterError> {
        self.delete(&kv_path(key), false)
    }

    fn kv_delete_tree(&mut self, prefix: &str) -> Result<(), ClusterError> {
        self.delete(&kv_path(prefix), true)
    }

    fn catalog_register(
        &mut self,
        registration: &CatalogRegistration,
    ) -> Result<(), ClusterError> {
        self.put_json("catalog/register", registration)?;
        Ok(())
    }

    fn catalog_deregister(
        &mut self,
        deregistration: &CatalogDeregistration,
    ) -> Result<(), ClusterError> {
        self.put_json("catalog/deregister", deregistration)?;
        Ok(())
    }

    fn catalog_nodes(
        &mut self,
        consistency: Consistency,
    ) -> Result<Vec<CatalogNode>, ClusterError> {
        let path = "catalog/nodes";
        match self.get(path, consistency, false)? {
            Some(response) => {
                let nodes: Option<Vec<CatalogNode>> = Self::read_json(path, response)?;
                Ok(nodes.unwrap_or_default())
            }
            None => Ok(Vec::new()),
        }
    }

    fn catalog_node(
        &mut self,
        node: &str,
        consistency: Consistency,
    ) -> Result<Option<NodeDetail>, ClusterError> {
        let path = format!("catalog/node/{}", escape_segment(node));
        let Some(response) = self.get(&path, consistency, false)? else {
            return Ok(None);
        };
        let wire: Option<WireNodeDetail> = Self::read_json(&path, response)?;
        Ok(wire.and_then(|detail| {
            detail.node.map(|node| NodeDetail {
                node,
                services: detail
                    .services
                    .unwrap_or_default()
                    .into_values()
                    .collect(),
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(server: &str) -> HttpCluster {
        let config = ClusterConfig {
            server: Some(server.to_string()),
            token: Some("secret".to_string()),
        };
        HttpCluster::new(&config).expect("build client")
    }

    #[test]
    fn endpoint_keeps_proxy_prefix_and_escapes_key() {
        let client = cluster("https://consul.internal:8501/proxy/");
        assert_eq!(
            client.endpoint(&kv_path("app/my key")),
            "https://consul.internal:8501/proxy/v1/kv/app/my%20key"
        );
    }

    #[test]
    fn dot_segments_in_keys_are_not_collapsed() {
        let client = cluster("http://h:8500");
        assert_eq!(
            client.endpoint(&kv_path("x/../")),
            "http://h:8500/v1/kv/x/%2E%2E/"
        );
        assert_eq!(
            client.endpoint(&kv_path("app/../secret")),
            "http://h:8500/v1/kv/app/%2E%2E/secret"
        );
        assert_eq!(
            client.endpoint(&kv_path("a/./b")),
            "http://h:8500/v1/kv/a/%2E/b"
        );
    }

    #[test]
    fn percent_in_keys_is_sent_literally() {
        assert_eq!(kv_path("100%"), "kv/100%25");
        assert_eq!(kv_path("a%2Fb"), "kv/a%252Fb");
        assert_eq!(kv_path("v1.2/name_x-y~z"), "kv/v1.2/name_x-y~z");
        assert_eq!(kv_path(""), "kv/");
    }

    #[test]
    fn catalog_node_name_is_one_segment() {
        let client = cluster("http://h:8500");
        let path = format!("catalog/node/{}", escape_segment("db/1"));
        assert_eq!(client.endpoint(&path), "http://h:8500/v1/catalog/node/db%2F1");
    }

    #[test]
    fn unreadable_error_body_is_marked() {
        let err = status_error(
            "GET",
            "kv/a",
            500,
            Err::<String, _>(std::io::Error::other("connection reset")),
        );
        assert_eq!(
            err.to_string(),
            "cluster request GET kv/a returned status 500: <unreadable body>"
        );
        let err = status_error(
            "PUT",
            "acl/create",
            403,
            Ok::<_, std::io::Error>(" denied\n".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "cluster request PUT acl/create returned status 403: denied"
        );
    }

    #[test]
    fn endpoint_defaults_scheme_to_http() {
        let client = cluster("127.0.0.1:8500");
        assert_eq!(
            client.endpoint("catalog/nodes"),
            "http://127.0.0.1:8500/v1/catalog/nodes"
        );
    }

    #[test]
    fn kv_values_are_base64_decoded() {
        let wire = vec![
            WireKvPair {
                key: "app/flag".to_string(),
                flags: 7,
                value: Some("b24=".to_string()),
                modify_index: 12,
            },
            WireKvPair {
                key: "app/".to_string(),
                flags: 0,
                value: None,
                modify_index: 3,
            },
        ];
        let pairs = HttpCluster::decode_pairs("kv/", wire).expect("decode");
        assert_eq!(pairs[0].value, b"on".to_vec());
        assert_eq!(pairs[0].flags, 7);
        assert!(pairs[1].value.is_empty());
    }

    #[test]
    fn invalid_base64_is_a_decode_error() {
        let wire = vec![WireKvPair {
            key: "bad".to_string(),
            flags: 0,
            value: Some("***".to_string()),
            modify_index: 1,
        }];
        let err = HttpCluster::decode_pairs("kv/", wire).expect_err("reject");
        assert!(matches!(err, ClusterError::Decode { .. }));
    }
}
