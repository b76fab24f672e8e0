//! `dx-verify-file` entry point (spec §4.8): takes alternating
//! local-path/remote-file-id pairs, re-reads each local file against its
//! closed remote file's part manifest, and reports `identical` or
//! `mismatch` per pair. Exits nonzero on any mismatch, matching the
//! `ua` manifest-style stdout contract but per-pair instead of per-index.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use dx_upload_agent::api::ApiClient;
use dx_upload_agent::cli::VerifyArgs;
use dx_upload_agent::config::Config;
use dx_upload_agent::verify::verify_file;

fn main() -> ExitCode {
    let args = VerifyArgs::parse();
    init_tracing(args.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: VerifyArgs) -> anyhow::Result<ExitCode> {
    let pairs = args.file_id_pairs()?;

    let config = Config::load(args.cli_overrides());
    let api = Arc::new(ApiClient::new(config)?);
    let cancel = CancellationToken::new();

    let mut any_mismatch = false;
    for (local_path, file_id) in &pairs {
        match verify_file(&api, local_path, file_id, args.read_threads, args.md5_threads, &cancel).await {
            Ok(outcome) => {
                if outcome.is_match() {
                    println!("{}: identical", file_id);
                } else {
                    any_mismatch = true;
                    println!("{}: mismatch", file_id);
                    for m in &outcome.mismatches {
                        tracing::warn!(
                            file = %file_id,
                            part = m.part_index,
                            expected = %m.expected_md5,
                            actual = %m.actual_md5,
                            "part mismatch"
                        );
                    }
                }
            }
            Err(e) => {
                any_mismatch = true;
                tracing::error!(file = %file_id, path = %local_path.display(), error = %e, "verify failed");
                println!("{}: mismatch", file_id);
            }
        }
    }

    Ok(if any_mismatch { ExitCode::from(1) } else { ExitCode::SUCCESS })
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
