// Self-update: back up a source file, ask the model for an enhanced version,
// write it back, and restore the backup if anything goes wrong.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use autodash_core::config::{OpenAiConfig, SelfUpdateConfig};
use autodash_llm::prompt;
use autodash_llm::LlmClient;
use tracing::{error, info, warn};

/// Produces an enhanced version of `code` following `instruction`.
#[async_trait]
pub trait Enhancer: Send + Sync {
    async fn enhance(&self, instruction: &str, code: &str) -> anyhow::Result<String>;
}

/// [`Enhancer`] backed by the chat completions client.
pub struct LlmEnhancer<'a> {
    client: &'a LlmClient,
    max_tokens: u32,
    temperature: f32,
}

impl<'a> LlmEnhancer<'a> {
    pub fn new(client: &'a LlmClient, openai: &OpenAiConfig) -> Self {
        Self {
            client,
            max_tokens: openai.enhance_max_tokens,
            temperature: openai.enhance_temperature,
        }
    }
}

#[async_trait]
impl Enhancer for LlmEnhancer<'_> {
    async fn enhance(&self, instruction: &str, code: &str) -> anyhow::Result<String> {
        let messages = prompt::enhance_messages(instruction, code);
        let reply = self
            .client
            .complete(&messages, self.max_tokens, self.temperature)
            .await?;
        Ok(reply)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SelfUpdateError {
    /// Nothing was changed.
    #[error("failed to back up {path}: {source}")]
    Backup {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("enhancement failed: {message}")]
    Failed { message: String, rolled_back: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfUpdateOutcome {
    pub backup_path: PathBuf,
    pub bytes_written: usize,
}

#[derive(Debug, Clone)]
pub struct SelfUpdater {
    target: PathBuf,
    backup_dir: PathBuf,
    instruction: String,
}

impl SelfUpdater {
    pub fn new(target: PathBuf, backup_dir: PathBuf) -> Self {
        Self {
            target,
            backup_dir,
            instruction: prompt::DEFAULT_ENHANCE_INSTRUCTION.to_string(),
        }
    }

    pub fn from_config(config: &SelfUpdateConfig) -> Self {
        Self::new(config.target.clone(), config.backup_dir.clone())
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// `{backup_dir}/{file_name}.{YYYYmmdd_HHMMSS}.bak`
    pub fn backup_path_at(&self, now: chrono::NaiveDateTime) -> PathBuf {
        let file_name = self
            .target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "target".to_string());
        self.backup_dir
            .join(format!("{file_name}.{}.bak", now.format("%Y%m%d_%H%M%S")))
    }

    /// Run one enhancement cycle against `enhancer`.
    pub async fn run<E: Enhancer + ?Sized>(
        &self,
        enhancer: &E,
    ) -> Result<SelfUpdateOutcome, SelfUpdateError> {
        info!("Starting self-enhancement of {}", self.target.display());

        let backup_path = self.backup()?;
        info!("Backup created at {}", backup_path.display());

        match self.enhance_in_place(enhancer).await {
            Ok(bytes_written) => {
                info!(
                    "Enhanced code written to {} ({} bytes)",
                    self.target.display(),
                    bytes_written
                );
                Ok(SelfUpdateOutcome {
                    backup_path,
                    bytes_written,
                })
            }
            Err(e) => {
                error!("Enhancement failed, rolling back: {:#}", e);
                match std::fs::copy(&backup_path, &self.target) {
                    Ok(_) => {
                        info!("Rolled back {} from backup", self.target.display());
                        Err(SelfUpdateError::Failed {
                            message: format!("{e:#}"),
                            rolled_back: true,
                        })
                    }
                    Err(restore_err) => {
                        warn!("Rollback failed: {}", restore_err);
                        Err(SelfUpdateError::Failed {
                            message: format!("{e:#}; rollback also failed: {restore_err}"),
                            rolled_back: false,
                        })
                    }
                }
            }
        }
    }

    fn backup(&self) -> Result<PathBuf, SelfUpdateError> {
        let backup_path = self.backup_path_at(chrono::Local::now().naive_local());
        std::fs::create_dir_all(&self.backup_dir).map_err(|source| SelfUpdateError::Backup {
            path: self.backup_dir.clone(),
            source,
        })?;
        std::fs::copy(&self.target, &backup_path).map_err(|source| SelfUpdateError::Backup {
            path: self.target.clone(),
            source,
        })?;
        Ok(backup_path)
    }

    async fn enhance_in_place<E: Enhancer + ?Sized>(&self, enhancer: &E) -> anyhow::Result<usize> {
        let original = std::fs::read_to_string(&self.target)?;
        info!("Sending {} bytes to the model for enhancement", original.len());

        let reply = enhancer.enhance(&self.instruction, &original).await?;
        let enhanced = prompt::strip_code_fence(&reply);
        if enhanced.is_empty() {
            anyhow::bail!("model returned no code");
        }

        let mut content = enhanced;
        content.push('\n');
        std::fs::write(&self.target, &content)?;
        Ok(content.len())
    }
}
