//! Shared CLI argument parsing for both binaries (spec §6). `ua`'s
//! surface is the bulk of this module; `dx-verify-file`'s is a much
//! smaller subset defined inline in its own `main`.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{ApiProtocol, CliOverrides};
use crate::error::ConfigError;
use crate::model::Destination;

#[derive(Debug, Parser)]
#[command(name = "ua", about = "Upload local files to the platform")]
pub struct UaArgs {
    /// One or more local files (or directories, expanded non-recursively)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[arg(long)]
    pub auth_token: Option<String>,

    /// Destination project, by ID or name. One value applies to every
    /// file; otherwise supply exactly one per file.
    #[arg(long)]
    pub project: Vec<String>,

    #[arg(long)]
    pub folder: Vec<String>,

    /// Remote name. Defaults to the local file's own name when omitted.
    #[arg(long)]
    pub name: Vec<String>,

    #[arg(long, default_value_t = 2)]
    pub read_threads: i64,

    #[arg(long)]
    pub compress_threads: Option<i64>,

    #[arg(long, default_value_t = 8)]
    pub upload_threads: i64,

    /// Accepts a `B`/`K`/`M`/`G` suffix, e.g. `75M`.
    #[arg(long)]
    pub chunk_size: Option<String>,

    /// Accepts the same suffix grammar as `--chunk-size`.
    #[arg(long)]
    pub throttle: Option<String>,

    #[arg(long, default_value_t = 3)]
    pub tries: u32,

    #[arg(long)]
    pub do_not_compress: bool,

    #[arg(long)]
    pub progress: bool,

    #[arg(long, short = 'v')]
    pub verbose: bool,

    #[arg(long)]
    pub wait_on_close: bool,

    #[arg(long)]
    pub do_not_resume: bool,

    #[arg(long)]
    pub apiserver_protocol: Option<ApiProtocol>,

    #[arg(long)]
    pub apiserver_host: Option<String>,

    #[arg(long)]
    pub apiserver_port: Option<u16>,

    #[arg(long)]
    pub certificate_file: Option<String>,

    #[arg(long)]
    pub ref_genome: Option<String>,

    #[arg(long, group = "import")]
    pub reads: bool,
    #[arg(long, group = "import")]
    pub paired_reads: bool,
    #[arg(long, group = "import")]
    pub mappings: bool,
    #[arg(long, group = "import")]
    pub variants: bool,
}

impl UaArgs {
    pub fn cli_overrides(&self) -> CliOverrides {
        CliOverrides {
            auth_token: self.auth_token.clone(),
            api_protocol: self.apiserver_protocol,
            api_host: self.apiserver_host.clone(),
            api_port: self.apiserver_port,
            project: self.project.first().cloned(),
            certificate_file: self.certificate_file.clone(),
            user_agent_suffix: None,
            libcurl_verbose: self.verbose,
        }
    }

    pub fn has_import_flag(&self) -> bool {
        self.reads || self.paired_reads || self.mappings || self.variants
    }

    /// Validates spec §7's `ConfigError` surface that depends on more than
    /// one flag at once (everything a single `clap` attribute can't
    /// express): per-field count vs. file count, the `--ref-genome` /
    /// import-flag pairing, `--paired-reads` parity, and non-positive
    /// thread counts.
    pub fn validate(&self, file_count: usize) -> Result<(), ConfigError> {
        let n = file_count;
        check_count("project", self.project.len(), n)?;
        check_count("folder", self.folder.len(), n)?;
        check_count("name", self.name.len(), n)?;

        if self.read_threads <= 0 {
            return Err(ConfigError::NonPositiveThreadCount { stage: "read", value: self.read_threads });
        }
        if self.upload_threads <= 0 {
            return Err(ConfigError::NonPositiveThreadCount { stage: "upload", value: self.upload_threads });
        }
        if let Some(c) = self.compress_threads {
            if c <= 0 {
                return Err(ConfigError::NonPositiveThreadCount { stage: "compress", value: c });
            }
        }

        if self.ref_genome.is_some() && !self.has_import_flag() {
            return Err(ConfigError::RefGenomeWithoutImport);
        }
        if self.has_import_flag() && self.ref_genome.is_none() {
            return Err(ConfigError::ImportWithoutRefGenome);
        }
        if self.paired_reads && n % 2 != 0 {
            return Err(ConfigError::OddPairedReadsCount(n));
        }

        Ok(())
    }

    pub fn compress_threads_or_default(&self) -> usize {
        self.compress_threads
            .map(|c| c as usize)
            .unwrap_or_else(|| (num_cpus::get().saturating_sub(1)).clamp(1, 8))
    }

    /// Builds the per-file `Destination`, applying a single shared value
    /// across the whole batch or the matching per-file value.
    pub fn destination_for(&self, index: usize, project_id: String, local_name: &str) -> Destination {
        let pick = |values: &[String]| -> Option<String> {
            if values.len() == 1 {
                values.first().cloned()
            } else {
                values.get(index).cloned()
            }
        };
        let folder = pick(&self.folder).unwrap_or_else(|| "/".to_string());
        let name = pick(&self.name).unwrap_or_else(|| local_name.to_string());
        Destination {
            project: project_id,
            folder,
            name,
            ..Destination::default()
        }
    }
}

fn check_count(field: &'static str, count: usize, files: usize) -> Result<(), ConfigError> {
    if count == 0 || count == 1 || count == files {
        Ok(())
    } else {
        Err(ConfigError::MismatchedDestinationCounts {
            projects: if field == "project" { count } else { 0 },
            folders: if field == "folder" { count } else { 0 },
            names: if field == "name" { count } else { 0 },
            files,
        })
    }
}

/// Parses a size with an optional `B`/`K`/`M`/`G` suffix (case-insensitive,
/// binary multiples) into a byte count.
pub fn parse_size_with_suffix(s: &str) -> Result<u64, ConfigError> {
    let s = s.trim();
    let (digits, multiplier) = match s.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => {
            let mult = match c.to_ascii_uppercase() {
                'B' => 1u64,
                'K' => 1 << 10,
                'M' => 1 << 20,
                'G' => 1 << 30,
                _ => {
                    return Err(ConfigError::ParseFailure {
                        path: s.to_string(),
                        reason: format!("unrecognized size suffix {c:?}"),
                    })
                }
            };
            (&s[..s.len() - 1], mult)
        }
        _ => (s, 1),
    };
    let value: u64 = digits.trim().parse().map_err(|_| ConfigError::ParseFailure {
        path: s.to_string(),
        reason: "not a valid integer size".to_string(),
    })?;
    Ok(value * multiplier)
}

#[derive(Debug, Parser)]
#[command(name = "dx-verify-file", about = "Verify a closed remote file against its local source")]
pub struct VerifyArgs {
    /// Alternating local path / remote file ID pairs.
    #[arg(required = true, num_args = 2..)]
    pub pairs: Vec<String>,

    #[arg(long)]
    pub auth_token: Option<String>,

    #[arg(long)]
    pub apiserver_protocol: Option<ApiProtocol>,

    #[arg(long)]
    pub apiserver_host: Option<String>,

    #[arg(long)]
    pub apiserver_port: Option<u16>,

    #[arg(long)]
    pub certificate_file: Option<String>,

    #[arg(long, default_value_t = 2)]
    pub read_threads: usize,

    #[arg(long, default_value_t = 2)]
    pub md5_threads: usize,

    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl VerifyArgs {
    pub fn cli_overrides(&self) -> CliOverrides {
        CliOverrides {
            auth_token: self.auth_token.clone(),
            api_protocol: self.apiserver_protocol,
            api_host: self.apiserver_host.clone(),
            api_port: self.apiserver_port,
            project: None,
            certificate_file: self.certificate_file.clone(),
            user_agent_suffix: None,
            libcurl_verbose: self.verbose,
        }
    }

    pub fn file_id_pairs(&self) -> Result<Vec<(PathBuf, String)>, ConfigError> {
        if self.pairs.len() % 2 != 0 {
            return Err(ConfigError::ParseFailure {
                path: "<args>".to_string(),
                reason: "expected alternating local-path/file-id pairs".to_string(),
            });
        }
        Ok(self.pairs.chunks(2).map(|pair| (PathBuf::from(&pair[0]), pair[1].clone())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_suffix_parses_binary_multiples() {
        assert_eq!(parse_size_with_suffix("75M").unwrap(), 75 * (1 << 20));
        assert_eq!(parse_size_with_suffix("4K").unwrap(), 4 * (1 << 10));
        assert_eq!(parse_size_with_suffix("10").unwrap(), 10);
        assert_eq!(parse_size_with_suffix("2G").unwrap(), 2 * (1 << 30));
    }

    #[test]
    fn mismatched_project_count_is_rejected() {
        assert!(check_count("project", 2, 3).is_err());
        assert!(check_count("project", 1, 3).is_ok());
        assert!(check_count("project", 3, 3).is_ok());
        assert!(check_count("project", 0, 3).is_ok());
    }
}
