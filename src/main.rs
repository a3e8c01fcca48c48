use anyhow::{Context, Result};
use clap::Parser;
use consul_register::apply::{apply_actions, validate_actions, Mode};
use consul_register::cli::{ApplyArgs, CheckArgs, ClusterArgs, Command, ExportArgs, RootArgs};
use consul_register::cluster::http::HttpCluster;
use consul_register::config::resolve_config;
use consul_register::document::{load_actions_file, write_actions};
use consul_register::export::export_actions;
use consul_register::registry::Factories;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    let factories = Factories::with_defaults();
    match args.command {
        Command::Apply(args) => run_apply(&factories, args),
        Command::Export(args) => run_export(args),
        Command::Check(args) => run_check(&factories, args),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn connect(args: &ClusterArgs) -> Result<HttpCluster> {
    let config = resolve_config(args.flags(), args.config.as_deref())?;
    tracing::debug!(server = config.server(), "connecting");
    HttpCluster::new(&config).context("configure cluster client")
}

fn run_apply(factories: &Factories, args: ApplyArgs) -> Result<()> {
    let actions = load_actions_file(factories, &args.file)
        .with_context(|| format!("load actions from {}", args.file.display()))?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let report = if args.dry {
        apply_actions(Mode::DryRun, &actions, &mut out).context("dry run")?
    } else {
        let mut cluster = connect(&args.cluster)?;
        apply_actions(Mode::Live(&mut cluster), &actions, &mut out).context("apply")?
    };
    if args.dry {
        eprintln!("dry run: {} action(s), nothing changed", report.total);
    } else {
        eprintln!(
            "applied {} of {} action(s), {} skipped",
            report.applied, report.total, report.skipped
        );
    }
    Ok(())
}

fn run_export(args: ExportArgs) -> Result<()> {
    let options = args.options();
    if options.is_empty() {
        tracing::warn!("no category selected; pass --acl, --external-node or --kv");
    }
    let mut cluster = connect(&args.cluster)?;
    let actions = export_actions(&mut cluster, options).context("export")?;
    write_actions(std::io::stdout().lock(), &actions).context("write exported actions")?;
    Ok(())
}

fn run_check(factories: &Factories, args: CheckArgs) -> Result<()> {
    let actions = load_actions_file(factories, &args.file)
        .with_context(|| format!("load actions from {}", args.file.display()))?;
    validate_actions(&actions).context("validate")?;
    println!("{}: {} valid action(s)", args.file.display(), actions.len());
    Ok(())
}
