use crate::config::SynthesisConfig;
use crate::error::{status_error, Upstream, VoiceError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Maximum text input size for synthesis (5000 bytes, the provider's
/// per-request character limit rounded down).
const MAX_SYNTHESIS_INPUT_BYTES: usize = 5_000;

/// Maximum length of a sanitized file stem.
const MAX_STEM_LEN: usize = 64;

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// A synthesized audio file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    /// Bare file name, safe to embed in a URL path segment.
    pub file_name: String,
    pub path: PathBuf,
    pub bytes: usize,
}

/// Converts reply text to MP3 audio and persists it under `audio_dir`.
///
/// Every artifact gets a fresh file name, so concurrent turns on different
/// calls never overwrite each other's audio.
#[derive(Debug, Clone)]
pub struct SpeechSynthesizer {
    client: reqwest::Client,
    config: SynthesisConfig,
    sequence: Arc<AtomicU64>,
}

impl SpeechSynthesizer {
    /// # Errors
    ///
    /// Returns `VoiceError::Config` if the voice id is blank or the HTTP
    /// client cannot be built.
    pub fn new(config: SynthesisConfig) -> Result<Self, VoiceError> {
        if config.voice_id.trim().is_empty() {
            return Err(VoiceError::Config(
                "synthesis.voice_id must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&config.stability) || !(0.0..=1.0).contains(&config.similarity_boost)
        {
            return Err(VoiceError::Config(
                "voice settings must be between 0.0 and 1.0".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build synthesis client: {}", e)))?;
        Ok(Self {
            client,
            config,
            sequence: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn audio_dir(&self) -> &Path {
        &self.config.audio_dir
    }

    /// Synthesizes `text` and writes the audio to a new file.
    ///
    /// The file is written to a temporary name and renamed into place, so a
    /// concurrent static-file read never sees a partial artifact.
    ///
    /// # Errors
    ///
    /// Returns `VoiceError::InvalidInput` for empty or oversized text, an
    /// upstream-class error when the provider fails, and
    /// `VoiceError::Storage` when the file cannot be written.
    pub async fn synthesize(&self, api_key: &str, text: &str) -> Result<AudioArtifact, VoiceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VoiceError::InvalidInput("text is empty".to_string()));
        }
        if text.len() > MAX_SYNTHESIS_INPUT_BYTES {
            return Err(VoiceError::InvalidInput(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_SYNTHESIS_INPUT_BYTES
            )));
        }

        let audio = self.fetch_audio(api_key, text).await?;
        let file_name = self.next_file_name("response");
        let path = self.write_atomically(&file_name, &audio).await?;

        tracing::debug!(file = %file_name, bytes = audio.len(), "audio synthesized");
        Ok(AudioArtifact {
            file_name,
            path,
            bytes: audio.len(),
        })
    }

    async fn fetch_audio(&self, api_key: &str, text: &str) -> Result<Vec<u8>, VoiceError> {
        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.voice_id
        );
        let request = SynthesisRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: VoiceSettings {
                stability: self.config.stability,
                similarity_boost: self.config.similarity_boost,
            },
        };
        let service = Upstream::Synthesis;
        let timeout_ms = self.config.timeout_ms;

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .header("xi-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| VoiceError::from_reqwest(service, timeout_ms, e))?;

        if !response.status().is_success() {
            return Err(status_error(service, response).await);
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| VoiceError::from_reqwest(service, timeout_ms, e))?;
        if audio.is_empty() {
            return Err(VoiceError::InvalidResponse {
                service,
                reason: "empty audio body".to_string(),
            });
        }
        Ok(audio.to_vec())
    }

    fn next_file_name(&self, stem: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let micros = chrono::Utc::now().timestamp_micros();
        format!("{}_{}_{}.mp3", sanitize_file_stem(stem), micros, seq)
    }

    async fn write_atomically(&self, file_name: &str, audio: &[u8]) -> Result<PathBuf, VoiceError> {
        tokio::fs::create_dir_all(&self.config.audio_dir).await?;
        let final_path = self.config.audio_dir.join(file_name);
        let tmp_path = self.config.audio_dir.join(format!(".{}.part", file_name));

        let mut file = tokio::fs::File::create(&tmp_path).await?;
        if let Err(e) = write_all_and_sync(&mut file, audio).await {
            drop(file);
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        drop(file);
        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(final_path)
    }
}

async fn write_all_and_sync(file: &mut tokio::fs::File, audio: &[u8]) -> std::io::Result<()> {
    file.write_all(audio).await?;
    file.sync_all().await
}

/// Reduces `stem` to `[A-Za-z0-9_-]`, replacing everything else with `_`.
///
/// The result is never empty and never longer than 64 characters, so it
/// cannot traverse directories or break a URL path segment.
pub fn sanitize_file_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .take(MAX_STEM_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "audio".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_path_components() {
        assert_eq!(sanitize_file_stem("../../etc/passwd"), "______etc_passwd");
        assert_eq!(sanitize_file_stem("response"), "response");
        assert_eq!(sanitize_file_stem(""), "audio");
        assert_eq!(sanitize_file_stem(&"x".repeat(100)).len(), MAX_STEM_LEN);
    }

    #[test]
    fn file_names_do_not_repeat() {
        let synth = SpeechSynthesizer::new(SynthesisConfig::default()).unwrap();
        let a = synth.next_file_name("response");
        let b = synth.next_file_name("response");
        assert_ne!(a, b);
        assert!(a.starts_with("response_") && a.ends_with(".mp3"));
    }

    #[test]
    fn blank_voice_id_is_rejected() {
        let config = SynthesisConfig {
            voice_id: "  ".to_string(),
            ..SynthesisConfig::default()
        };
        assert!(matches!(
            SpeechSynthesizer::new(config),
            Err(VoiceError::Config(_))
        ));
    }
}
