//! Declarative source and sink.
//!
//! A document is a JSON array of `{"Action": "<type>", "Config": {...}}`
//! records. Loading turns records into actions in document order; encoding
//! does the reverse, so an export can be fed straight back to `apply`.
use crate::action::{Action, Actions};
use crate::registry::{Factories, FactoryError};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Action")]
    pub action: String,
    #[serde(rename = "Config", default)]
    pub config: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse action list: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("action #{index}, {action}: {source}")]
    Factory {
        index: usize,
        action: String,
        #[source]
        source: FactoryError,
    },

    #[error("action #{index}, {action}: invalid config: {source}")]
    Config {
        index: usize,
        action: String,
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    /// 1-based position of the offending record, when one is known.
    pub fn index(&self) -> Option<usize> {
        match self {
            LoadError::Factory { index, .. } | LoadError::Config { index, .. } => Some(*index),
            LoadError::Read { .. } | LoadError::Parse(_) => None,
        }
    }
}

/// Build actions from records, stopping at the first record that cannot be
/// resolved or decoded. Nothing is validated here.
pub fn load_records(factories: &Factories, records: Vec<Record>) -> Result<Actions, LoadError> {
    let mut actions = Actions::with_capacity(records.len());
    for (offset, record) in records.into_iter().enumerate() {
        let index = offset + 1;
        let mut action =
            factories
                .new_action(&record.action)
                .map_err(|source| LoadError::Factory {
                    index,
                    action: record.action.clone(),
                    source,
                })?;
        let config = match record.config {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            config => config,
        };
        action
            .as_mut()
            .decode_config(config)
            .map_err(|source| LoadError::Config {
                index,
                action: record.action.clone(),
                source,
            })?;
        actions.push(action);
    }
    Ok(actions)
}

pub fn load_actions<R: Read>(factories: &Factories, reader: R) -> Result<Actions, LoadError> {
    let records: Vec<Record> = serde_json::from_reader(reader).map_err(LoadError::Parse)?;
    load_records(factories, records)
}

pub fn load_actions_str(factories: &Factories, text: &str) -> Result<Actions, LoadError> {
    load_actions(factories, text.as_bytes())
}

pub fn load_actions_file(factories: &Factories, path: &Path) -> Result<Actions, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Read {
        path: path.display().to_string(),
        source,
    })?;
    load_actions(factories, std::io::BufReader::new(file))
}

pub fn encode_action(action: &dyn Action) -> serde_json::Result<Record> {
    Ok(Record {
        action: action.kind().to_string(),
        config: action.encode_config()?,
    })
}

pub fn encode_actions(actions: &[Box<dyn Action>]) -> serde_json::Result<Vec<Record>> {
    actions
        .iter()
        .map(|action| encode_action(action.as_ref()))
        .collect()
}

/// Write actions as an indented JSON array followed by a newline.
pub fn write_actions<W: Write>(mut writer: W, actions: &[Box<dyn Action>]) -> anyhow::Result<()> {
    let records = encode_actions(actions)?;
    serde_json::to_writer_pretty(&mut writer, &records)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::kv::KvSet;
    use serde_json::json;

    const SOURCE: &str = r#"[
        {"Action": "ACLSet", "Config": {"Name": "svc-a", "Rules": "key \"\" { policy = \"read\" }"}},
        {"Action": "KVSet", "Config": {"Key": "app/flag", "Flags": 4, "Value": "on"}},
        {"Action": "KVSetIfNotExist", "Config": {"Key": "app/once", "Flags": 0, "Value": "x"}},
        {"Action": "KVDelete", "Config": {"Key": "app/old"}},
        {"Action": "KVDeleteTree", "Config": {"Prefix": "tmp/"}},
        {"Action": "ExternalNodeRegister", "Config": {"Node": "db1", "Address": "10.0.0.5",
            "Services": [{"ID": "pg", "Service": "postgres", "Tags": ["primary"], "Port": 5432}]}},
        {"Action": "ExternalNodeDeregister", "Config": {"Node": "db0", "Services": ["pg"]}},
        {"Action": "ACLDelete", "Config": {"Name": "retired"}}
    ]"#;

    #[test]
    fn load_keeps_document_order() {
        let actions = load_actions_str(&Factories::with_defaults(), SOURCE).expect("load");
        let kinds: Vec<&str> = actions.iter().map(|action| action.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "ACLSet",
                "KVSet",
                "KVSetIfNotExist",
                "KVDelete",
                "KVDeleteTree",
                "ExternalNodeRegister",
                "ExternalNodeDeregister",
                "ACLDelete",
            ]
        );
    }

    #[test]
    fn load_then_encode_is_field_equal() {
        let original: serde_json::Value = serde_json::from_str(SOURCE).expect("parse");
        let actions = load_actions_str(&Factories::with_defaults(), SOURCE).expect("load");
        let encoded = serde_json::to_value(encode_actions(&actions).expect("encode"))
            .expect("to value");
        assert_eq!(encoded, original);
    }

    #[test]
    fn unknown_type_names_index_and_tag() {
        let err = load_actions_str(
            &Factories::with_defaults(),
            r#"[{"Action": "Bogus", "Config": {}}]"#,
        )
        .expect_err("unknown type");
        assert_eq!(err.index(), Some(1));
        assert_eq!(err.to_string(), "action #1, Bogus: unknown action \"Bogus\"");
    }

    #[test]
    fn malformed_config_names_index() {
        let err = load_actions_str(
            &Factories::with_defaults(),
            r#"[{"Action": "KVDelete", "Config": {"Key": "a"}},
                {"Action": "KVSet", "Config": {"Key": "b", "Flags": "high"}}]"#,
        )
        .expect_err("bad flags");
        assert!(matches!(err, LoadError::Config { index: 2, .. }));
        assert!(err.to_string().starts_with("action #2, KVSet: invalid config"));
    }

    #[test]
    fn missing_fields_decode_empty_and_unknown_fields_are_ignored() {
        let actions = load_actions_str(
            &Factories::with_defaults(),
            r#"[{"Action": "KVSet", "Config": {"Comment": "no key"}},
                {"Action": "KVDelete"}]"#,
        )
        .expect("load");
        assert!(actions[0].validate().is_err());
        assert!(actions[1].validate().is_err());
    }

    #[test]
    fn null_fields_load_as_empty() {
        let actions = load_actions_str(
            &Factories::with_defaults(),
            r#"[{"Action": "ExternalNodeRegister", "Config": {"Node": "db1", "Address": "10.0.0.5",
                    "Services": [{"ID": "pg", "Service": "postgres", "Tags": null, "Port": 5432}]}},
                {"Action": "ExternalNodeRegister", "Config": {"Node": "bare", "Address": "10.0.0.6",
                    "Services": null}},
                {"Action": "ExternalNodeDeregister", "Config": {"Node": "db0", "Services": null}},
                {"Action": "KVSet", "Config": {"Key": null, "Flags": null, "Value": null}},
                {"Action": "ACLSet", "Config": {"Name": "svc", "Rules": null}}]"#,
        )
        .expect("load");
        assert_eq!(
            actions[0].encode_config().expect("encode")["Services"][0]["Tags"],
            json!([])
        );
        assert_eq!(actions[1].to_string(), r#"External Node Register "bare" "10.0.0.6""#);
        assert!(actions[0].validate().is_ok());
        assert!(actions[1].validate().is_ok());
        assert!(actions[2].validate().is_ok());
        assert_eq!(actions[2].to_string(), r#"External Node Deregister "db0""#);
        let err = actions[3].validate().expect_err("key is required");
        assert_eq!(err.field, "Key");
        assert!(actions[4].validate().is_ok());
    }

    #[test]
    fn top_level_must_be_a_list() {
        let err = load_actions_str(&Factories::with_defaults(), r#"{"Action": "KVSet"}"#)
            .expect_err("object is not a list");
        assert!(matches!(err, LoadError::Parse(_)));
        assert_eq!(err.index(), None);
    }

    #[test]
    fn write_actions_emits_pretty_array() {
        let actions: Actions = vec![Box::new(KvSet {
            key: "k".to_string(),
            flags: 0,
            value: "v".to_string(),
            encoding: None,
        })];
        let mut out = Vec::new();
        write_actions(&mut out, &actions).expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.ends_with("]\n"));
        let parsed: serde_json::Value = serde_json::from_str(&text).expect("parse back");
        assert_eq!(
            parsed,
            json!([{"Action": "KVSet", "Config": {"Key": "k", "Flags": 0, "Value": "v"}}])
        );
    }
}
