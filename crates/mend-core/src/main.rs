use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use mend_analysis::{FastAnalyzer, ImpactAnalyzer, PreciseAnalyzer, Strategy};
use mend_core::config::MendConfig;
use mend_core::tasks::{parse_plan, PlanDefaults};
use mend_core::telemetry;
use mend_graph::{normalize_file_id, DependencyGraph};
use std::path::PathBuf;

fn cli() -> Command {
    Command::new("mend")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Impact-driven change workflow engine")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Path to a mend TOML config file"),
        )
        .arg(
            Arg::new("root")
                .long("root")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Workspace root (overrides config)"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print results as JSON"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("analyze")
                .about("List files impacted by a change")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .required(true)
                        .help("Changed file, relative to the root"),
                )
                .arg(Arg::new("symbol").long("symbol").help("Changed symbol"))
                .arg(
                    Arg::new("mode")
                        .long("mode")
                        .value_parser(["fast", "precise"])
                        .help("Analysis strategy (default from config)"),
                ),
        )
        .subcommand(
            Command::new("graph")
                .about("Build the workspace import graph and print it")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .help("Only show direct imports and importers of this file"),
                ),
        )
        .subcommand(
            Command::new("plan")
                .about("Parse a task plan and print the resulting tasks")
                .arg(
                    Arg::new("path")
                        .long("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("File containing TASK lines"),
                )
                .arg(
                    Arg::new("changed")
                        .long("changed")
                        .default_value("main.py")
                        .help("File analysis tasks default to"),
                ),
        )
        .subcommand(Command::new("config").about("Print the effective configuration"))
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<MendConfig> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => MendConfig::load(path)?,
        None => MendConfig::default(),
    };
    let mut config = config.apply_env()?;
    if let Some(root) = matches.get_one::<PathBuf>("root") {
        config = config.with_workspace_root(root.clone());
    }
    Ok(config)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn analyze(config: &MendConfig, args: &ArgMatches, json: bool) -> anyhow::Result<()> {
    let file = args
        .get_one::<String>("file")
        .context("--file is required")?;
    let symbol = args.get_one::<String>("symbol").map(String::as_str);
    let mode = match args.get_one::<String>("mode") {
        Some(mode) => mode.parse::<Strategy>()?,
        None => config.workflow.mode,
    };
    let root = &config.analysis.workspace_root;

    let fast = FastAnalyzer::new(root).with_options(config.graph_options());
    let mut result = match mode {
        Strategy::Fast => fast.analyze(file, symbol).await,
        Strategy::Precise => PreciseAnalyzer::new(root).analyze(file, symbol).await,
    };
    if result.should_fallback() {
        tracing::warn!("PRECISE analysis failed, falling back to FAST");
        result = fast.analyze(file, symbol).await;
    }

    if json {
        return print_json(&result);
    }
    for warning in result.warnings() {
        eprintln!("warning: {warning}");
    }
    if let Some(message) = result.error_message() {
        anyhow::bail!("analysis failed: {message}");
    }
    println!(
        "{} impacted files ({}, {:?}):",
        result.impacted_files().len(),
        result.strategy_used(),
        result.elapsed()
    );
    for path in result.impacted_files() {
        println!("  {path}");
    }
    Ok(())
}

async fn graph(config: &MendConfig, args: &ArgMatches, json: bool) -> anyhow::Result<()> {
    let root = config.analysis.workspace_root.clone();
    let options = config.graph_options();
    let graph = tokio::task::spawn_blocking(move || DependencyGraph::build(&root, &options))
        .await
        .context("graph build task failed")??;

    if let Some(file) = args.get_one::<String>("file") {
        let id = normalize_file_id(graph.root(), file);
        let imports = graph.dependencies_of(&id);
        let importers = graph.dependents_of(&id);
        if json {
            return print_json(&serde_json::json!({
                "file": id,
                "imports": imports,
                "imported_by": importers,
            }));
        }
        println!("{id}");
        println!("  imports: {}", imports.join(", "));
        println!("  imported by: {}", importers.join(", "));
        return Ok(());
    }

    let stats = graph.build_stats();
    let edges: Vec<(String, Vec<String>)> = graph
        .files()
        .into_iter()
        .map(|f| (f.to_string(), graph.dependents_of(f)))
        .collect();
    if json {
        return print_json(&serde_json::json!({
            "files": stats.files,
            "edges": stats.edges,
            "skipped": stats.skipped.len(),
            "imported_by": edges.into_iter().collect::<std::collections::BTreeMap<_, _>>(),
        }));
    }
    println!(
        "{} files, {} edges, {} skipped",
        stats.files,
        stats.edges,
        stats.skipped.len()
    );
    for (file, importers) in edges {
        if !importers.is_empty() {
            println!("{file} <- {}", importers.join(", "));
        }
    }
    Ok(())
}

fn plan(config: &MendConfig, args: &ArgMatches, json: bool) -> anyhow::Result<()> {
    let path = args
        .get_one::<PathBuf>("path")
        .context("--path is required")?;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read plan {}", path.display()))?;
    let defaults = PlanDefaults {
        changed_file: args
            .get_one::<String>("changed")
            .cloned()
            .unwrap_or_default(),
        mode: config.workflow.mode,
    };
    let tasks = parse_plan(&text, &defaults);

    if json {
        return print_json(&tasks);
    }
    for task in &tasks {
        println!("{:>4} [{}] {}", task.id, task.kind.role(), task.description);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    telemetry::init_tracing(matches.get_flag("log-json"))?;

    let config = load_config(&matches)?;
    let json = matches.get_flag("json");

    match matches.subcommand() {
        Some(("analyze", args)) => analyze(&config, args, json).await,
        Some(("graph", args)) => graph(&config, args, json).await,
        Some(("plan", args)) => plan(&config, args, json),
        Some(("config", _)) => {
            if json {
                print_json(&config)
            } else {
                print!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            }
        }
        _ => {
            cli().print_help()?;
            Ok(())
        }
    }
}
