//! `ua` entry point: parses CLI flags, loads config, resolves the
//! destination project/folder once per batch, checks resume status per
//! file, drives each file through the chunk pipeline and the completion
//! repair/close pass, then prints the stdout manifest spec §6 describes
//! (one remote file ID per line, or the literal `failed`).

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use dx_upload_agent::api::ApiClient;
use dx_upload_agent::cli::{parse_size_with_suffix, UaArgs};
use dx_upload_agent::completion::complete_and_close;
use dx_upload_agent::config::Config;
use dx_upload_agent::constant::{DEFAULT_TRIES, MIN_CHUNK_SIZE, MIN_THROTTLE_BYTES_PER_SEC};
use dx_upload_agent::error::{ConfigError, Result, UploadAgentError};
use dx_upload_agent::memory::MemoryGovernor;
use dx_upload_agent::model::{chunk_range, Chunk, LocalSource, UploadFile};
use dx_upload_agent::pipeline::{self, PipelineConfig};
use dx_upload_agent::resolver::Resolver;
use dx_upload_agent::resume::{self, ResumeOutcome};

fn main() -> ExitCode {
    let args = UaArgs::parse();
    init_tracing(args.verbose);
    ignore_sigpipe();

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

async fn run(args: UaArgs) -> anyhow::Result<ExitCode> {
    let inputs = expand_inputs(&args.files)?;
    args.validate(inputs.len()).map_err(UploadAgentError::Config)?;

    let chunk_size = match &args.chunk_size {
        Some(s) => parse_size_with_suffix(s).map_err(UploadAgentError::Config)?,
        None => MIN_CHUNK_SIZE,
    };
    dx_upload_agent::model::validate_chunk_size(chunk_size).map_err(|e| anyhow::anyhow!(e))?;

    let throttle_bytes_per_sec = match &args.throttle {
        Some(s) => {
            let v = parse_size_with_suffix(s).map_err(UploadAgentError::Config)?;
            if v < MIN_THROTTLE_BYTES_PER_SEC {
                return Err(UploadAgentError::Config(ConfigError::ThrottleTooLow(v)).into());
            }
            Some(v)
        }
        None => None,
    };

    let config = Config::load(args.cli_overrides());
    let api = Arc::new(ApiClient::new(config.clone())?);
    let cancel = CancellationToken::new();

    let greet = api.greet("ua", dx_upload_agent::VERSION, std::env::consts::OS, &cancel).await.unwrap_or_default();
    let mut exit_override = None;
    if let Some(update) = &greet.update {
        tracing::warn!(version = %update.version, message = ?update.message, "a required client update is available");
        exit_override = Some(3u8);
    }

    let resolver = Resolver::new(api.clone());
    let memory = Arc::new(MemoryGovernor::new());

    let mut files = Vec::with_capacity(inputs.len());
    let mut fingerprints_seen = HashSet::new();
    for (index, path) in inputs.iter().enumerate() {
        let project_spec = args.project.first().cloned().unwrap_or_default();
        if project_spec.is_empty() {
            return Err(UploadAgentError::Config(ConfigError::MissingApiBase).into());
        }
        let project_id = resolver.resolve_project(pick_or(&args.project, index, &project_spec), &cancel).await?;

        let source = LocalSource::from_path(path)?;
        let local_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("upload").to_string();
        let destination = args.destination_for(index, project_id.clone(), &local_name);
        if destination.folder != "/" {
            resolver.create_folder(&project_id, &destination.folder, &cancel).await?;
        }
        let file = Arc::new(UploadFile::new(index, source, destination, chunk_size, args.wait_on_close, args.do_not_compress));
        let fingerprint = file.fingerprint();
        if !fingerprints_seen.insert((project_id.clone(), fingerprint.clone())) {
            return Err(UploadAgentError::DuplicateFingerprint(fingerprint).into());
        }
        files.push((file, project_id));
    }

    let pipeline_config = PipelineConfig {
        read_threads: args.read_threads.max(1) as usize,
        compress_threads: args.compress_threads_or_default(),
        upload_threads: args.upload_threads.max(1) as usize,
        compress_queue_capacity: 32,
        upload_queue_capacity: 32,
        tries: if args.tries == 0 { DEFAULT_TRIES } else { args.tries },
        throttle_bytes_per_sec,
    };

    let progress_handle = if args.progress {
        let progress_cancel = CancellationToken::new();
        let progress_files = Arc::new(files.iter().map(|(f, _)| f.clone()).collect::<Vec<_>>());
        let handle = tokio::spawn(pipeline::progress::run(progress_files, progress_cancel.clone()));
        Some((handle, progress_cancel))
    } else {
        None
    };

    let mut results = Vec::with_capacity(files.len());
    for (file, project_id) in &files {
        let outcome = upload_one_file(&api, &memory, file, project_id, chunk_size, &args, &pipeline_config, &cancel).await;
        results.push(outcome);
    }

    if let Some((handle, progress_cancel)) = progress_handle {
        progress_cancel.cancel();
        handle.await.ok();
    }

    let any_failed = results.iter().any(|r| r.is_none());
    for id in &results {
        match id {
            Some(file_id) => println!("{file_id}"),
            None => println!("failed"),
        }
    }

    if any_failed {
        Ok(ExitCode::from(1))
    } else if let Some(code) = exit_override {
        Ok(ExitCode::from(code))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[allow(clippy::too_many_arguments)]
async fn upload_one_file(
    api: &Arc<ApiClient>,
    memory: &Arc<MemoryGovernor>,
    file: &Arc<UploadFile>,
    project_id: &str,
    chunk_size: u64,
    args: &UaArgs,
    pipeline_config: &PipelineConfig,
    cancel: &CancellationToken,
) -> Option<String> {
    // Each file gets its own child token: `pipeline::run_chunks` and
    // `complete_and_close` cancel whatever token they're handed once
    // their own work is done, and that must not reach across files.
    let file_cancel = cancel.child_token();
    match upload_one_file_inner(api, memory, file, project_id, chunk_size, args, pipeline_config, &file_cancel).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::error!(file = %file.source.path.display(), error = %e, "upload failed");
            file.mark_failed();
            None
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn upload_one_file_inner(
    api: &Arc<ApiClient>,
    memory: &Arc<MemoryGovernor>,
    file: &Arc<UploadFile>,
    project_id: &str,
    chunk_size: u64,
    args: &UaArgs,
    pipeline_config: &PipelineConfig,
    cancel: &CancellationToken,
) -> Result<String> {
    let fingerprint = file.fingerprint();
    let outcome = if args.do_not_resume {
        ResumeOutcome::New
    } else {
        resume::find_target(api, project_id, &fingerprint, cancel).await?
    };

    let (file_id, repair_chunks): (String, Vec<Chunk>) = match outcome {
        ResumeOutcome::AlreadyComplete { file_id } => (file_id, Vec::new()),
        ResumeOutcome::Ambiguous { file_ids } => {
            return Err(UploadAgentError::ResumeAmbiguous(file_ids.len()));
        }
        ResumeOutcome::Resume { file_id, manifest } => {
            file.state.lock().unwrap().remote_file_id = Some(file_id.clone());
            let already_uploaded: u64 = manifest
                .values()
                .filter(|entry| entry.state.is_complete())
                .map(|entry| entry.size)
                .sum();
            file.credit_bytes(already_uploaded);
            let pending: Vec<Chunk> = manifest
                .iter()
                .filter(|(_, entry)| !entry.state.is_complete())
                .filter_map(|(index, _)| index.parse::<u64>().ok())
                .map(|part_index| {
                    let (start, end, last_chunk) = chunk_range(file.source.size, chunk_size, part_index);
                    Chunk::new(file.index, part_index, start, end, last_chunk, pipeline_config.tries)
                })
                .collect();
            (file_id, pending)
        }
        ResumeOutcome::New => {
            let req = dx_upload_agent::api::model::FileNewRequest {
                project: project_id,
                folder: &file.destination.folder,
                name: &file.remote_name(),
                media: None,
                properties: {
                    let mut p = std::collections::HashMap::new();
                    p.insert(
                        dx_upload_agent::constant::FINGERPRINT_PROPERTY.to_string(),
                        fingerprint.clone(),
                    );
                    p
                },
                r#type: None,
                tags: Vec::new(),
                details: None,
                hidden: None,
            };
            let resp = api.file_new(&req, cancel).await?;
            file.state.lock().unwrap().remote_file_id = Some(resp.id.clone());
            (resp.id, file_chunks(file, chunk_size, pipeline_config.tries))
        }
    };

    if !repair_chunks.is_empty() {
        let outcome = pipeline::run_chunks(
            vec![file.clone()],
            repair_chunks,
            api.clone(),
            memory.clone(),
            PipelineConfig {
                read_threads: pipeline_config.read_threads,
                compress_threads: pipeline_config.compress_threads,
                upload_threads: pipeline_config.upload_threads,
                compress_queue_capacity: pipeline_config.compress_queue_capacity,
                upload_queue_capacity: pipeline_config.upload_queue_capacity,
                tries: pipeline_config.tries,
                throttle_bytes_per_sec: pipeline_config.throttle_bytes_per_sec,
            },
            cancel.clone(),
        )
        .await?;
        if !outcome.permanently_failed.is_empty() {
            file.mark_failed();
        }
    }

    if file.is_failed() {
        return Err(UploadAgentError::ChunkUpload {
            file_index: file.index,
            part_index: 0,
            last_response: "one or more parts failed permanently".to_string(),
        });
    }

    let completion = complete_and_close(api, memory, file.clone(), file_id, pipeline_config, cancel).await?;
    if !completion.permanently_failed.is_empty() {
        return Err(UploadAgentError::ChunkUpload {
            file_index: file.index,
            part_index: 0,
            last_response: "completion repair could not finish every part".to_string(),
        });
    }
    Ok(completion.closed_file_ids.into_iter().next().unwrap_or_default())
}

fn file_chunks(file: &UploadFile, chunk_size: u64, tries: u32) -> Vec<Chunk> {
    dx_upload_agent::model::enumerate_chunks(file.index, file.source.size, chunk_size, tries)
}

fn pick_or<'a>(values: &'a [String], index: usize, fallback: &'a str) -> &'a str {
    if values.len() > 1 {
        values.get(index).map(|s| s.as_str()).unwrap_or(fallback)
    } else {
        fallback
    }
}

/// Expands any directory argument into its immediate file children (not
/// recursive); a bare file argument passes through unchanged.
fn expand_inputs(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect();
            entries.sort();
            out.extend(entries);
        } else {
            out.push(path.clone());
        }
    }
    Ok(out)
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(unix)]
fn ignore_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
fn ignore_sigpipe() {}
