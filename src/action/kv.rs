//! Key-value actions.
use super::{require, Action, Context, Outcome, ValidationError};
use crate::cluster::{null_as_default, ClusterError, KvPair};
use crate::registry::{Factories, FactoryError};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;

pub fn register(factories: &mut Factories) {
    factories.register(factory);
}

fn factory(id: &str) -> Result<Box<dyn Action>, FactoryError> {
    match id {
        "KVDelete" => Ok(Box::<KvDelete>::default()),
        "KVDeleteTree" => Ok(Box::<KvDeleteTree>::default()),
        "KVSet" => Ok(Box::<KvSet>::default()),
        "KVSetIfNotExist" => Ok(Box::<KvSetIfNotExist>::default()),
        _ => Err(FactoryError::unknown(id)),
    }
}

/// How the `Value` string maps to stored bytes. Absent means UTF-8 text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueEncoding {
    Base64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct KvDelete {
    #[serde(deserialize_with = "null_as_default")]
    pub key: String,
}

/// Delete every key starting with `prefix`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct KvDeleteTree {
    #[serde(deserialize_with = "null_as_default")]
    pub prefix: String,
}

/// Write a key unconditionally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct KvSet {
    #[serde(deserialize_with = "null_as_default")]
    pub key: String,
    #[serde(deserialize_with = "null_as_default")]
    pub flags: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<ValueEncoding>,
}

/// Write a key only when it does not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct KvSetIfNotExist {
    #[serde(deserialize_with = "null_as_default")]
    pub key: String,
    #[serde(deserialize_with = "null_as_default")]
    pub flags: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<ValueEncoding>,
}

fn decode_value(value: &str, encoding: Option<ValueEncoding>) -> Result<Vec<u8>, ValidationError> {
    match encoding {
        None => Ok(value.as_bytes().to_vec()),
        Some(ValueEncoding::Base64) => base64::engine::general_purpose::STANDARD
            .decode(value.as_bytes())
            .map_err(|err| ValidationError::new("Value", format!("is not valid base64: {err}"))),
    }
}

/// Text when the bytes are UTF-8, base64 otherwise.
fn encode_value(bytes: &[u8]) -> (String, Option<ValueEncoding>) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), None),
        Err(_) => (
            base64::engine::general_purpose::STANDARD.encode(bytes),
            Some(ValueEncoding::Base64),
        ),
    }
}

fn describe_value(value: &str, encoding: Option<ValueEncoding>) -> String {
    match encoding {
        None => format!("{value:?}"),
        Some(ValueEncoding::Base64) => format!("{value:?} (base64)"),
    }
}

impl KvSet {
    /// Build from stored bytes, choosing the encoding that keeps them intact.
    pub fn from_bytes(key: impl Into<String>, flags: u64, bytes: &[u8]) -> Self {
        let (value, encoding) = encode_value(bytes);
        Self {
            key: key.into(),
            flags,
            value,
            encoding,
        }
    }

    pub fn bytes(&self) -> Result<Vec<u8>, ValidationError> {
        decode_value(&self.value, self.encoding)
    }
}

impl KvSetIfNotExist {
    pub fn bytes(&self) -> Result<Vec<u8>, ValidationError> {
        decode_value(&self.value, self.encoding)
    }
}

fn invalid_payload(key: &str, err: ValidationError) -> ClusterError {
    ClusterError::Rejected {
        operation: format!("write {key}"),
        message: err.to_string(),
    }
}

impl Action for KvDelete {
    fn kind(&self) -> &'static str {
        "KVDelete"
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.key, "Key")
    }

    fn apply(&self, ctx: &mut Context<'_>) -> Result<Outcome, ClusterError> {
        ctx.cluster.kv_delete(&self.key)?;
        Ok(Outcome::Applied)
    }
}

impl fmt::Display for KvDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KV Delete {:?}", self.key)
    }
}

impl Action for KvDeleteTree {
    fn kind(&self) -> &'static str {
        "KVDeleteTree"
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.prefix, "Prefix")
    }

    fn apply(&self, ctx: &mut Context<'_>) -> Result<Outcome, ClusterError> {
        ctx.cluster.kv_delete_tree(&self.prefix)?;
        Ok(Outcome::Applied)
    }
}

impl fmt::Display for KvDeleteTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KV Delete Tree {:?}", self.prefix)
    }
}

impl Action for KvSet {
    fn kind(&self) -> &'static str {
        "KVSet"
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.key, "Key")?;
        self.bytes().map(|_| ())
    }

    fn apply(&self, ctx: &mut Context<'_>) -> Result<Outcome, ClusterError> {
        let value = self
            .bytes()
            .map_err(|err| invalid_payload(&self.key, err))?;
        ctx.cluster.kv_put(&KvPair {
            key: self.key.clone(),
            flags: self.flags,
            value,
            modify_index: 0,
        })?;
        Ok(Outcome::Applied)
    }
}

impl fmt::Display for KvSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KV Set {:?} {} {}",
            self.key,
            self.flags,
            describe_value(&self.value, self.encoding)
        )
    }
}

impl Action for KvSetIfNotExist {
    fn kind(&self) -> &'static str {
        "KVSetIfNotExist"
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.key, "Key")?;
        self.bytes().map(|_| ())
    }

    /// A key that already exists is left untouched and reported as skipped.
    fn apply(&self, ctx: &mut Context<'_>) -> Result<Outcome, ClusterError> {
        let value = self
            .bytes()
            .map_err(|err| invalid_payload(&self.key, err))?;
        let written = ctx.cluster.kv_cas(&KvPair {
            key: self.key.clone(),
            flags: self.flags,
            value,
            modify_index: 0,
        })?;
        if written {
            return Ok(Outcome::Applied);
        }
        tracing::warn!(key = %self.key, "key exists, conditional write skipped");
        Ok(Outcome::Skipped("key exists".to_string()))
    }
}

impl fmt::Display for KvSetIfNotExist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KV Set If Not Exist {:?} {} {}",
            self.key,
            self.flags,
            describe_value(&self.value, self.encoding)
        )
    }
}
