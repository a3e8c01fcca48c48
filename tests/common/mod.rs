//! Shared test infrastructure for integration tests.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Write a JSON action list into `dir` and return its path.
pub fn write_source(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents.as_bytes()).expect("write action list");
    path
}

/// Run the built binary with `args`, isolated from the caller's Consul env.
#[allow(dead_code)]
pub fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_consul-register"))
        .args(args)
        .env_remove("CONSUL_HTTP_ADDR")
        .env_remove("CONSUL_HTTP_TOKEN")
        .env_remove("RUST_LOG")
        .output()
        .expect("run consul-register")
}

/// A source exercising every action kind, in a deliberate order.
#[allow(dead_code)]
pub const EVERY_KIND: &str = r#"[
  {"Action": "ExternalNodeRegister", "Config": {"Node": "db1", "Address": "10.0.0.5",
    "Services": [
      {"ID": "pg", "Service": "postgres", "Tags": ["primary"], "Port": 5432},
      {"ID": "pg-exporter", "Service": "metrics", "Tags": [], "Port": 9187}
    ]}},
  {"Action": "ACLSet", "Config": {"Name": "svc-a", "Rules": "key \"app/\" { policy = \"read\" }"}},
  {"Action": "KVSet", "Config": {"Key": "app/flag", "Flags": 0, "Value": "on"}},
  {"Action": "KVSetIfNotExist", "Config": {"Key": "app/seed", "Flags": 1, "Value": "first"}},
  {"Action": "KVSet", "Config": {"Key": "tmp/a", "Flags": 0, "Value": "1"}},
  {"Action": "KVDeleteTree", "Config": {"Prefix": "tmp/"}},
  {"Action": "ExternalNodeDeregister", "Config": {"Node": "db1", "Services": ["pg-exporter"]}}
]"#;
