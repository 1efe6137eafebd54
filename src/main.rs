use clap::{Parser, ValueEnum};
use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use env_logger::Env;
use log::{error, info, warn};
use std::path::{Path, PathBuf};

use netsweep::config::ToolConfig;
use netsweep::config_loader::{self, DocumentSource, Section, YamlSource};
use netsweep::network::{NetnsSubstrate, ProcessBehavior, SimSubstrate, Substrate};
use netsweep::orchestrator::Runner;
use netsweep::results::{self, CommandAnalyzer, NoopAnalyzer, ResultsAnalyzer};

/// Parameter-sweep test orchestration for emulated networks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the suite YAML file
    #[arg(short, long)]
    config: PathBuf,

    /// Test case to run (all test cases when omitted)
    #[arg(short, long)]
    test: Option<String>,

    /// Restrict the test case to one of its tools
    #[arg(long, requires = "test")]
    tool: Option<String>,

    /// Workspace directory; overrides general.workspace
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Emulation backend
    #[arg(long, value_enum, default_value_t = SubstrateKind::Sim)]
    substrate: SubstrateKind,

    /// Prefix netns commands with sudo
    #[arg(long)]
    sudo: bool,

    /// List test cases and their variant counts, then exit
    #[arg(long)]
    list: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum SubstrateKind {
    /// In-memory dry run, no processes are started
    Sim,
    /// Linux network namespaces shaped with tc netem
    Netns,
}

const DEFAULT_WORKSPACE: &str = "workspace";

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    // Initialize logging with default filter level of "info"
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    info!("Suite file: {:?}", args.config);

    let source = YamlSource::from_path(&args.config)
        .wrap_err_with(|| format!("Failed to load suite '{}'", args.config.display()));
    let workspace = match &source {
        Ok(source) => resolve_workspace(args.workspace.as_deref(), declared_workspace(source), source.root()),
        Err(_) => resolve_workspace(args.workspace.as_deref(), None, Path::new(".")),
    };
    info!("Workspace: {:?}", workspace);
    let results_root = workspace.join(results::RESULTS_DIR);

    // exactly one marker after every invocation except a successful listing
    match source.and_then(|source| execute(&args, source, workspace)) {
        Ok(None) => Ok(()),
        Ok(Some(success)) => {
            let marker = results::write_verdict_markers(&results_root, success)?;
            if !success {
                error!("At least one run failed, see {}", marker.display());
                std::process::exit(1);
            }
            info!("All test cases passed");
            Ok(())
        }
        Err(e) => {
            if let Err(marker_error) = results::write_verdict_markers(&results_root, false) {
                warn!("Could not write failure marker under {}: {}", results_root.display(), marker_error);
            }
            Err(e)
        }
    }
}

/// Run the selected test cases; `None` when only listing
fn execute(args: &Args, source: YamlSource, workspace: PathBuf) -> Result<Option<bool>> {
    let general = config_loader::load_general(&source)?;

    let substrate: Box<dyn Substrate> = match args.substrate {
        SubstrateKind::Sim => Box::new(dry_run_substrate(&source)?),
        SubstrateKind::Netns => Box::new(NetnsSubstrate::new().with_sudo(args.sudo)),
    };
    let analyzer: Box<dyn ResultsAnalyzer> = match &general.analyzer {
        Some(command) => Box::new(CommandAnalyzer::new(command.clone(), &workspace)),
        None => Box::new(NoopAnalyzer),
    };
    let runner = Runner::new(Box::new(source), substrate, analyzer, workspace)?;

    if args.list {
        for name in runner.test_names() {
            match runner.plan(&name, None) {
                Ok(plan) => println!(
                    "{}: {} variant(s), {} run(s) per variant, {:?}",
                    name,
                    plan.variant_count(),
                    plan.runs_per_variant(),
                    plan.mode
                ),
                Err(e) => println!("{}: invalid ({})", name, e),
            }
        }
        return Ok(None);
    }

    let tests = match &args.test {
        Some(test) => vec![test.clone()],
        None => runner.test_names(),
    };
    if tests.is_empty() {
        bail!("No test cases defined in {}", args.config.display());
    }

    let mut success = true;
    for test in &tests {
        match runner.run(test, args.tool.as_deref()) {
            Ok(report) => {
                results::report::print_summary(&report.report);
                success &= report.success;
            }
            Err(e) => {
                error!("Test case '{}' could not run: {}", test, e);
                return Err(e).wrap_err_with(|| format!("Test case '{}' aborted", test));
            }
        }
    }
    Ok(Some(success))
}

/// `general.workspace` read straight from the document, so it is known even
/// when the rest of `general` fails validation
fn declared_workspace(source: &dyn DocumentSource) -> Option<PathBuf> {
    let general = source.resolve("general", Section::General).ok()?;
    general.get("workspace")?.as_str().map(PathBuf::from)
}

/// CLI flag, then `general.workspace` relative to the suite, then `./workspace`
fn resolve_workspace(flag: Option<&Path>, declared: Option<PathBuf>, suite_root: &Path) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    match declared {
        Some(path) if path.is_absolute() => path,
        Some(path) => suite_root.join(path),
        None => PathBuf::from(DEFAULT_WORKSPACE),
    }
}

/// Sim substrate where every tool client exits successfully after its duration
fn dry_run_substrate(source: &dyn DocumentSource) -> Result<SimSubstrate> {
    let mut substrate = SimSubstrate::new();
    for name in source.names(Section::Tool) {
        let tool: ToolConfig = config_loader::load(source, &name, Section::Tool)?;
        let program = Path::new(&tool.client.program)
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or(tool.client.program);
        substrate = substrate.with_behavior(
            program,
            ProcessBehavior::Exit {
                after: tool.duration,
                code: 0,
            },
        );
    }
    Ok(substrate)
}
