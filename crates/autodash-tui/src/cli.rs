// Command-line subcommands. With no arguments the dashboard runs instead.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::info;

use autodash_app::reviewer::{self, TRUNCATION_NOTE};
use autodash_app::self_update::{LlmEnhancer, SelfUpdater};
use autodash_core::config::Config;
use autodash_core::db::Database;
use autodash_core::listings::{self, ListingGenerator};
use autodash_core::manifest::{self, ManifestError};
use autodash_core::protocol::LlmEvent;
use autodash_core::vin::{VinDecode, VinDecoder, VinQuery};
use autodash_llm::LlmClient;

pub const HELP: &str = include_str!("cli_help.txt");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tui,
    Help,
    Generate { count: usize, csv: Option<PathBuf> },
    DecodeVin { vin: String, year: Option<u16> },
    Review { file: PathBuf },
    SelfUpdate { target: Option<PathBuf>, prompt: Option<String> },
    CheckManifest { path: PathBuf },
}

impl Command {
    /// Whether the command reads `config/`.
    pub fn needs_config(&self) -> bool {
        !matches!(self, Command::Help | Command::CheckManifest { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CliError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("unknown argument for {command}: {arg}")]
    UnknownArg { command: &'static str, arg: String },

    #[error("missing {what} for {command}")]
    Missing {
        command: &'static str,
        what: &'static str,
    },

    #[error("invalid {what}: {value}")]
    Invalid { what: &'static str, value: String },
}

/// Parse arguments (without the program name).
pub fn parse_args<I>(args: I) -> Result<Command, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(first) = args.next() else {
        return Ok(Command::Tui);
    };

    match first.as_str() {
        "-h" | "--help" | "help" => Ok(Command::Help),
        "generate" => {
            let mut count = None;
            let mut csv = None;
            while let Some(a) = args.next() {
                match a.as_str() {
                    "--csv" => {
                        let v = args.next().ok_or(CliError::Missing {
                            command: "generate",
                            what: "value for --csv",
                        })?;
                        csv = Some(PathBuf::from(v));
                    }
                    _ if count.is_none() && !a.starts_with('-') => {
                        count = Some(a.parse::<usize>().map_err(|_| CliError::Invalid {
                            what: "listing count",
                            value: a.clone(),
                        })?);
                    }
                    _ => {
                        return Err(CliError::UnknownArg {
                            command: "generate",
                            arg: a,
                        })
                    }
                }
            }
            let count = count.ok_or(CliError::Missing {
                command: "generate",
                what: "listing count",
            })?;
            Ok(Command::Generate { count, csv })
        }
        "decode-vin" => {
            let mut vin = None;
            let mut year = None;
            while let Some(a) = args.next() {
                match a.as_str() {
                    "--year" | "-y" => {
                        let v = args.next().ok_or(CliError::Missing {
                            command: "decode-vin",
                            what: "value for --year",
                        })?;
                        year = Some(v.parse::<u16>().map_err(|_| CliError::Invalid {
                            what: "model year",
                            value: v.clone(),
                        })?);
                    }
                    _ if vin.is_none() && !a.starts_with('-') => vin = Some(a),
                    _ => {
                        return Err(CliError::UnknownArg {
                            command: "decode-vin",
                            arg: a,
                        })
                    }
                }
            }
            let vin = vin.ok_or(CliError::Missing {
                command: "decode-vin",
                what: "VIN",
            })?;
            Ok(Command::DecodeVin { vin, year })
        }
        "review" => {
            let file = single_path(&mut args, "review", "file to review")?;
            Ok(Command::Review { file })
        }
        "self-update" => {
            let mut target = None;
            let mut prompt = None;
            while let Some(a) = args.next() {
                match a.as_str() {
                    "--target" => {
                        target = Some(PathBuf::from(args.next().ok_or(CliError::Missing {
                            command: "self-update",
                            what: "value for --target",
                        })?));
                    }
                    "--prompt" => {
                        prompt = Some(args.next().ok_or(CliError::Missing {
                            command: "self-update",
                            what: "value for --prompt",
                        })?);
                    }
                    _ => {
                        return Err(CliError::UnknownArg {
                            command: "self-update",
                            arg: a,
                        })
                    }
                }
            }
            Ok(Command::SelfUpdate { target, prompt })
        }
        "check-manifest" => {
            let path = single_path(&mut args, "check-manifest", "manifest path")?;
            Ok(Command::CheckManifest { path })
        }
        other => Err(CliError::UnknownCommand(other.to_string())),
    }
}

fn single_path<I>(args: &mut I, command: &'static str, what: &'static str) -> Result<PathBuf, CliError>
where
    I: Iterator<Item = String>,
{
    let path = args.next().ok_or(CliError::Missing { command, what })?;
    if let Some(extra) = args.next() {
        return Err(CliError::UnknownArg {
            command,
            arg: extra,
        });
    }
    Ok(PathBuf::from(path))
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

/// Generate `count` listings, record them, and write CSV to `csv` or `out`.
pub fn generate<R: Rng, W: Write>(
    config: &Config,
    db: &Database,
    count: usize,
    csv: Option<&Path>,
    rng: &mut R,
    out: &mut W,
) -> anyhow::Result<()> {
    let max = config.dashboard.listings.max_count;
    if !(1..=max).contains(&count) {
        anyhow::bail!("count must be between 1 and {max}, got {count}");
    }

    let generator = ListingGenerator::new(&config.dashboard)?;
    let batch = generator.generate_listings(count, rng)?;
    db.record_listings(&batch)?;

    match csv {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            listings::write_csv(&batch, file)?;
            writeln!(out, "Wrote {} listings to {}", batch.len(), path.display())?;
        }
        None => listings::write_csv(&batch, &mut *out)?,
    }
    Ok(())
}

/// Decode a VIN, using the local cache when possible, and print its fields.
pub async fn decode_vin<W: Write>(
    config: &Config,
    db: &Database,
    vin: &str,
    year: Option<u16>,
    out: &mut W,
) -> anyhow::Result<()> {
    let ranges = &config.dashboard.listings;
    let query = VinQuery::bounded(vin, year, ranges.min_year, ranges.max_year)?;

    let decode = match db.cached_vin(&query)? {
        Some(raw) => VinDecode::from_response(query, raw, true),
        None => {
            let decoder = VinDecoder::new(&config.nhtsa)?;
            let raw = decoder
                .decode(&query)
                .await
                .context("Error decoding VIN")?;
            db.cache_vin(&query, &raw)?;
            VinDecode::from_response(query, raw, false)
        }
    };

    let source = if decode.cached { " (cached)" } else { "" };
    writeln!(out, "VIN {}{}", decode.query.vin, source)?;
    for (name, value) in &decode.fields {
        writeln!(out, "  {name:<28} {value}")?;
    }
    if let Some(warning) = &decode.warning {
        writeln!(out, "Warning: {warning}")?;
    }
    Ok(())
}

/// Stream a review of `file` to `out`.
pub async fn review<W: Write>(
    config: &Config,
    client: &LlmClient,
    file: &Path,
    out: &mut W,
) -> anyhow::Result<()> {
    let code = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let prompt = reviewer::prepare_review(&code)?;
    let messages = reviewer::review_messages(prompt);

    let (tx, mut rx) = mpsc::channel(256);
    let stream = client.stream_chat(&messages, config.openai.review_max_tokens, tx, 0);
    let print = async {
        let mut failure = None;
        while let Some(event) = rx.recv().await {
            match event {
                LlmEvent::Token { text, .. } => {
                    write!(out, "{text}")?;
                    out.flush()?;
                }
                LlmEvent::Complete { finish_reason, .. } => {
                    if finish_reason.as_deref() == Some("length") {
                        write!(out, "\n\n{TRUNCATION_NOTE}")?;
                    }
                    writeln!(out)?;
                }
                LlmEvent::Error { message, .. } => failure = Some(message),
            }
        }
        anyhow::Ok(failure)
    };

    let (streamed, printed) = tokio::join!(stream, print);
    streamed?;
    if let Some(message) = printed? {
        return Err(reviewer::ReviewError::Llm(autodash_llm::LlmError::Request(message)).into());
    }
    Ok(())
}

/// Run one self-update cycle.
pub async fn self_update<W: Write>(
    config: &Config,
    client: &LlmClient,
    target: Option<PathBuf>,
    prompt: Option<String>,
    out: &mut W,
) -> anyhow::Result<()> {
    let mut updater = match target {
        Some(target) => SelfUpdater::new(target, config.self_update.backup_dir.clone()),
        None => SelfUpdater::from_config(&config.self_update),
    };
    if let Some(prompt) = prompt {
        updater = updater.with_instruction(prompt);
    }

    let enhancer = LlmEnhancer::new(client, &config.openai);
    let outcome = updater.run(&enhancer).await?;
    writeln!(
        out,
        "Updated {} ({} bytes); backup at {}",
        updater.target().display(),
        outcome.bytes_written,
        outcome.backup_path.display()
    )?;
    Ok(())
}

/// Check a manifest. Returns `false` (after printing one issue per line)
/// when it has problems.
pub fn check_manifest<W: Write>(path: &Path, out: &mut W) -> anyhow::Result<bool> {
    match manifest::load_manifest(path) {
        Ok(manifest) => {
            info!("Manifest {} is valid", path.display());
            writeln!(
                out,
                "{}: {} pinned requirements, all valid",
                path.display(),
                manifest.len()
            )?;
            Ok(true)
        }
        Err(ManifestError::Invalid { report, .. }) => {
            for issue in &report.issues {
                writeln!(out, "{}: {}", path.display(), issue)?;
            }
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
