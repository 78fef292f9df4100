use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use weft::bitmap::Bitmap;
use weft::checkout::{CheckoutEngine, CheckoutProps, CheckoutResult, CheckoutTarget};
use weft::host::LocalHost;
use weft::merge::MergeStrategy;
use weft::model::{ComponentId, Lane, Ref};
use weft::store::ObjectStore;
use weft::{BITMAP_FILE, OBJECTS_DIR, WEFT_DIR};

/// Component-oriented version control: content-addressed history, lanes,
/// and checkout.
#[derive(Parser)]
#[command(name = "weft")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile workspace components with a chosen version.
    ///
    /// TARGET is `head`, `latest`, `reset`, or a literal version (a semver
    /// tag or a 40-hex snap ref).
    Checkout {
        /// What to check out: head | latest | reset | VERSION.
        target: String,

        /// Component ids (`scope/name`). Mutually exclusive with --all.
        ids: Vec<String>,

        /// Operate on every tracked component.
        #[arg(long)]
        all: bool,

        /// On conflicts, keep diff3 markers for manual resolution.
        #[arg(long, conflicts_with_all = ["ours", "theirs"])]
        manual: bool,

        /// On conflicts, keep the workspace side.
        #[arg(long, conflicts_with = "theirs")]
        ours: bool,

        /// On conflicts, take the incoming side.
        #[arg(long)]
        theirs: bool,

        /// Skip dependency installation after write-back.
        #[arg(long)]
        skip_install: bool,

        /// Only adjust workspace state; never hydrate new components.
        #[arg(long)]
        workspace_only: bool,

        /// Restore model content for the current version (same as the
        /// `reset` target).
        #[arg(long)]
        reset: bool,

        /// Verbose reporting.
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Commands::Checkout {
            target,
            ids,
            all,
            manual,
            ours,
            theirs,
            skip_install,
            workspace_only,
            reset,
            verbose,
        } => {
            init_tracing(verbose);

            let parsed_target = if reset {
                CheckoutTarget::Reset
            } else {
                match target.as_str() {
                    "head" => CheckoutTarget::Head,
                    "latest" => CheckoutTarget::Latest,
                    "reset" => CheckoutTarget::Reset,
                    version => CheckoutTarget::Version(version.to_owned()),
                }
            };

            let merge_strategy = if manual {
                Some(MergeStrategy::Manual)
            } else if ours {
                Some(MergeStrategy::Ours)
            } else if theirs {
                Some(MergeStrategy::Theirs)
            } else {
                None
            };

            let parsed_ids: Result<Vec<ComponentId>> = ids
                .iter()
                .map(|raw| {
                    ComponentId::parse(raw)
                        .with_context(|| format!("invalid component id '{raw}'"))
                })
                .collect();
            let parsed_ids = match parsed_ids {
                Ok(ids) => ids,
                Err(e) => {
                    eprintln!("{e:#}");
                    return ExitCode::from(2);
                }
            };

            let mut props = CheckoutProps::new(parsed_target);
            props.ids = parsed_ids;
            props.all = all;
            props.merge_strategy = merge_strategy;
            props.skip_dependency_installation = skip_install;
            props.workspace_only = workspace_only;
            props.verbose = verbose;

            match run_checkout(&props) {
                Ok(result) => {
                    report(&result);
                    match u8::try_from(result.exit_code()) {
                        Ok(code) => ExitCode::from(code),
                        Err(_) => ExitCode::FAILURE,
                    }
                }
                Err(e) => {
                    eprintln!("{e:#}");
                    let code = e
                        .downcast_ref::<weft::WeftError>()
                        .map_or(1, weft::WeftError::exit_code);
                    ExitCode::from(u8::try_from(code).unwrap_or(1))
                }
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "weft=debug" } else { "weft=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_checkout(props: &CheckoutProps) -> Result<CheckoutResult> {
    let workspace_dir = find_workspace_root()?;
    let weft_dir = workspace_dir.join(WEFT_DIR);
    let store = ObjectStore::new(weft_dir.join(OBJECTS_DIR));
    let mut bitmap = Bitmap::load(weft_dir.join(BITMAP_FILE))?;
    let lane = active_lane(&weft_dir, &store, &bitmap)?;

    let mut host = LocalHost::new(store.clone(), &workspace_dir);
    if let Ok(remote) = std::env::var("WEFT_REMOTE") {
        host = host.with_remote(ObjectStore::new(remote));
    }

    let mut engine = CheckoutEngine::new(
        &store,
        &mut bitmap,
        lane.as_ref(),
        &workspace_dir,
        &weft_dir,
        &mut host,
    );
    Ok(engine.checkout(props)?)
}

/// Walk up from the current directory to the nearest `.weft` workspace.
fn find_workspace_root() -> Result<PathBuf> {
    let start = std::env::current_dir().context("cannot determine current directory")?;
    let mut dir: &Path = &start;
    loop {
        if dir.join(WEFT_DIR).is_dir() {
            return Ok(dir.to_path_buf());
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => anyhow::bail!(
                "not inside a weft workspace (no {WEFT_DIR} directory found from '{}' upward)",
                start.display()
            ),
        }
    }
}

/// Resolve the active lane, when the bitmap points at one.
///
/// Lane records are addressed by their opaque hash; the workspace keeps a
/// small `lanes.json` name → hash index next to the bitmap.
fn active_lane(weft_dir: &Path, store: &ObjectStore, bitmap: &Bitmap) -> Result<Option<Lane>> {
    let Some(lane_id) = &bitmap.lane else {
        return Ok(None);
    };
    let index_path = weft_dir.join("lanes.json");
    let index: BTreeMap<String, Ref> = match std::fs::read(&index_path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .with_context(|| format!("unparseable lane index '{}'", index_path.display()))?,
        Err(_) => BTreeMap::new(),
    };
    let key = format!("{lane_id}");
    let Some(hash) = index.get(&key) else {
        tracing::warn!(lane = %key, "active lane is not in the lane index; continuing without it");
        return Ok(None);
    };
    Ok(store.get_lane(hash)?)
}

fn report(result: &CheckoutResult) {
    for id in &result.applied {
        println!("applied: {id}");
    }
    for id in &result.removed {
        println!("removed: {id}");
    }
    for id in &result.new_from_lane {
        let note = if result.new_from_lane_added {
            "added from lane"
        } else {
            "on lane, not in workspace"
        };
        println!("{note}: {id}");
    }
    for failure in &result.failed {
        let prefix = if failure.unchanged_legitimately {
            "skipped"
        } else {
            "failed"
        };
        println!("{prefix}: {} ({})", failure.id, failure.reason);
    }
    if result.left_unresolved_conflicts {
        println!("left unresolved conflicts in the workspace; resolve the markers and re-run");
    }
    if let Some(e) = &result.installation_error {
        println!("dependency installation failed: {e}");
    }
    if let Some(e) = &result.compilation_error {
        println!("compilation failed: {e}");
    }
}
