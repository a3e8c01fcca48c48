//! CLI argument parsing.
//!
//! The CLI only gathers paths, flags and cluster settings; loading, applying
//! and exporting live in the library modules.
use crate::config::ClusterConfig;
use crate::export::ExportOptions;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "consul-register",
    version,
    about = "Apply and export declarative Consul ACL, KV and external node state",
    after_help = "Examples:\n  consul-register check actions.json\n  consul-register apply --dry actions.json\n  consul-register apply --server https://consul:8501 --token $TOKEN actions.json\n  consul-register export --acl --external-node --kv > actions.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Log debug detail to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Apply(ApplyArgs),
    Export(ExportArgs),
    Check(CheckArgs),
}

/// Connection settings shared by commands that talk to the cluster.
#[derive(Args, Debug, Default)]
pub struct ClusterArgs {
    /// Cluster HTTP address [env: CONSUL_HTTP_ADDR] [default: http://127.0.0.1:8500]
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    /// ACL token sent with every request [env: CONSUL_HTTP_TOKEN]
    #[arg(long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// JSON file with `server` and `token` used when neither flag nor env is set
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl ClusterArgs {
    pub fn flags(&self) -> ClusterConfig {
        ClusterConfig {
            server: self.server.clone(),
            token: self.token.clone(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(about = "Apply a list of actions to the cluster, in order")]
pub struct ApplyArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Print the plan without changing anything
    #[arg(long)]
    pub dry: bool,

    /// JSON action list
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
#[command(about = "Export cluster state as a JSON action list on stdout")]
pub struct ExportArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Include ACLs (management tokens are never exported)
    #[arg(long)]
    pub acl: bool,

    /// Include nodes registered without an agent
    #[arg(long, alias = "externalNode")]
    pub external_node: bool,

    /// Include every KV entry
    #[arg(long)]
    pub kv: bool,
}

impl ExportArgs {
    pub fn options(&self) -> ExportOptions {
        ExportOptions {
            acl: self.acl,
            external_node: self.external_node,
            kv: self.kv,
        }
    }
}

#[derive(Parser, Debug)]
#[command(about = "Load and validate an action list without contacting the cluster")]
pub struct CheckArgs {
    /// JSON action list
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        RootArgs::command().debug_assert();
    }

    #[test]
    fn export_accepts_camel_case_alias() {
        let args = RootArgs::try_parse_from(["consul-register", "export", "--externalNode", "--kv"])
            .expect("parse");
        let Command::Export(export) = args.command else {
            panic!("expected export");
        };
        assert_eq!(
            export.options(),
            ExportOptions {
                acl: false,
                external_node: true,
                kv: true,
            }
        );
    }

    #[test]
    fn apply_takes_file_and_dry_flag() {
        let args = RootArgs::try_parse_from([
            "consul-register",
            "apply",
            "--dry",
            "--server",
            "consul:8500",
            "plan.json",
        ])
        .expect("parse");
        let Command::Apply(apply) = args.command else {
            panic!("expected apply");
        };
        assert!(apply.dry);
        assert_eq!(apply.file, PathBuf::from("plan.json"));
        assert_eq!(apply.cluster.flags().server.as_deref(), Some("consul:8500"));
    }
}
