use std::{
    fs,
    path::{Path, PathBuf},
    process,
};

use anyhow::{bail, Context, Result};
use drift_gate::{
    api::stage::Stage,
    backend::{
        fs::{FileVariables, LocalStore},
        rest::Server,
    },
    monitor::{
        psi::{PsiConfig, DEFAULT_BINS},
        report::summarize_files,
    },
    pipeline::{trainer::CommandJob, RetrainingGate},
    ObjectStore, Settings,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
usage:
  drift-gate run [--run-id ID]
  drift-gate psi --reference PATH --current PATH [--features PATH] [--bins N] [--out PATH]";

enum Command {
    Run {
        run_id: Option<String>,
    },
    Psi {
        reference: PathBuf,
        current: PathBuf,
        features: Option<PathBuf>,
        bins: usize,
        out: PathBuf,
    },
}

impl Command {
    fn from_env() -> Result<Self> {
        let mut args = pico_args::Arguments::from_env();
        match args.subcommand()?.as_deref() {
            Some("run") => Ok(Command::Run {
                run_id: args.opt_value_from_str("--run-id")?,
            }),
            Some("psi") => Ok(Command::Psi {
                reference: args.value_from_str(["-r", "--reference"])?,
                current: args.value_from_str(["-c", "--current"])?,
                features: args.opt_value_from_str(["-f", "--features"])?,
                bins: args.opt_value_from_str(["-b", "--bins"])?.unwrap_or(DEFAULT_BINS),
                out: args
                    .opt_value_from_str(["-o", "--out"])?
                    .unwrap_or_else(|| PathBuf::from("reports/psi.json")),
            }),
            _ => bail!("{}", USAGE),
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn default_run_id() -> String {
    format!("manual__{}", drift_gate::timestamp().to_rfc3339())
}

fn run(run_id: Option<String>) -> Result<Stage> {
    let settings = Settings::from_env()?;
    let run_id = run_id.unwrap_or_else(default_run_id);

    let mut store: Box<dyn ObjectStore> = match &settings.store_url {
        Some(url) => {
            info!(url = %url, "using HTTP object store");
            let server = Server::new(url.as_str());
            match &settings.store_token {
                Some(token) => Box::new(server.with_token(token.as_str())),
                None => Box::new(server),
            }
        }
        None => {
            info!(root = %settings.store_root.display(), "using local object store");
            Box::new(LocalStore::new(&settings.store_root))
        }
    };
    let mut variables = FileVariables::new(&settings.state_file);
    let mut trainer = CommandJob::new(&settings.trainer_command)?.env("BUCKET", settings.bucket.as_str());

    let gate = RetrainingGate::from_settings(&settings);
    match gate.run(&run_id, store.as_mut(), &mut variables, &mut trainer) {
        Ok(outcome) => {
            info!(
                run_id = %run_id,
                trail = ?outcome.trail.iter().map(Stage::as_str).collect::<Vec<_>>(),
                drift_score = outcome.drift.decision.score,
                report = %outcome.drift.decision.report_location,
                "run finished"
            );
            Ok(outcome.final_stage())
        }
        Err(err) => {
            error!(run_id = %run_id, error = %err, "run failed");
            Ok(Stage::Failed)
        }
    }
}

fn psi(reference: &Path, current: &Path, features: Option<&Path>, bins: usize, out: &Path) -> Result<()> {
    if bins < 2 {
        bail!("--bins must be at least 2, got {}", bins);
    }
    let config = PsiConfig {
        bins,
        ..PsiConfig::default()
    };
    let summary = summarize_files(reference, current, features, config)?;

    if let Some(parent) = out.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&summary)?;
    fs::write(out, json).with_context(|| format!("writing {}", out.display()))?;
    info!(
        out = %out.display(),
        avg_psi = summary.avg_psi,
        n_features = summary.n_features,
        "wrote PSI summary"
    );
    println!("{}", out.display());
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    match Command::from_env()? {
        Command::Run { run_id } => {
            let stage = run(run_id)?;
            println!("{}", stage);
            if stage == Stage::Failed {
                process::exit(1);
            }
            Ok(())
        }
        Command::Psi {
            reference,
            current,
            features,
            bins,
            out,
        } => psi(&reference, &current, features.as_deref(), bins, &out),
    }
}
