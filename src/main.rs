use cargo_monorelease::{
    cli::{self, Cli, Command},
    commands, git, logging,
    errors::ReleaseError,
    ReleaseApp,
};
use tracing::info;

#[tokio::main]
async fn main() {
    logging::init_logging();

    match run().await {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("cargo-monorelease error: {}", error.message);
            std::process::exit(error.exit_code());
        }
    }
}

async fn run() -> Result<i32, ReleaseError> {
    let cli = cli::parse_from_env();
    commands::log_invocation(&cli.command, cli.output);
    run_preflight_checks(&cli)?;

    let app = ReleaseApp::new(&std::env::current_dir()?)?;
    commands::execute(cli, &app).await
}

fn run_preflight_checks(cli: &Cli) -> Result<(), ReleaseError> {
    match &cli.command {
        Command::Release(args) => {
            ensure_clean_working_tree_preflight("cargo-monorelease.release", args.allow_dirty)
        }
        Command::List | Command::Changed(_) | Command::ChangelogPreview(_) => Ok(()),
    }
}

fn ensure_clean_working_tree_preflight(
    command_path: &'static str,
    allow_dirty: bool,
) -> Result<(), ReleaseError> {
    info!(
        command_path,
        action = "preflight-clean-working-tree",
        outcome = "started",
        allow_dirty,
        "Running clean working tree preflight"
    );

    match git::ensure_clean_working_tree(allow_dirty) {
        Ok(()) => {
            info!(
                command_path,
                action = "preflight-clean-working-tree",
                outcome = "passed",
                allow_dirty,
                "Clean working tree preflight passed"
            );
            Ok(())
        }
        Err(error) => {
            info!(
                command_path,
                action = "preflight-clean-working-tree",
                outcome = "failed",
                allow_dirty,
                "Clean working tree preflight failed"
            );
            Err(error)
        }
    }
}
