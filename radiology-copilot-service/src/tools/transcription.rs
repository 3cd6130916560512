//! Dictation to text: crop the recording, upload it, return the transcript.

use hound::{SampleFormat, WavReader, WavWriter};
use reqwest::multipart::{Form, Part};
use std::io::Cursor;
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, warn};

pub const TRANSCRIPTION_MODEL: &str = "whisper-1";

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("OPENAI_API_KEY not set")]
    MissingApiKey,

    #[error("Invalid audio: {0}")]
    InvalidAudio(#[from] hound::Error),

    #[error("Temporary audio file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request to transcription service failed: {0}")]
    Transport(String),

    #[error("Transcription service answered with status {status}: {body}")]
    HttpStatus { status: u16, body: String },
}

pub struct Transcriber {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    max_duration: Duration,
}

impl Transcriber {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: Option<String>,
        max_duration: Duration,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            api_key,
            max_duration,
        }
    }

    /// Transcribe a WAV recording. The cropped copy is deleted before this returns.
    pub async fn transcribe(&self, wav: &[u8]) -> Result<String, TranscriptionError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(TranscriptionError::MissingApiKey)?;

        let audio = cropped_audio(wav.to_vec(), self.max_duration).await?;

        let file = Part::bytes(audio)
            .file_name("dictation.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscriptionError::Transport(e.to_string()))?;
        let form = Form::new()
            .text("model", TRANSCRIPTION_MODEL)
            .text("response_format", "text")
            .part("file", file);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptionError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TranscriptionError::Transport(e.to_string()))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Transcription rejected");
            return Err(TranscriptionError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let text = body.trim().to_string();
        info!(chars = text.len(), "Dictation transcribed");
        Ok(text)
    }
}

/// Crop on the blocking pool and read the result back. The temporary file is
/// gone by the time the bytes are returned.
async fn cropped_audio(wav: Vec<u8>, max: Duration) -> Result<Vec<u8>, TranscriptionError> {
    tokio::task::spawn_blocking(move || -> Result<Vec<u8>, TranscriptionError> {
        let cropped = crop_wav(&wav, max)?;
        Ok(std::fs::read(cropped.path())?)
    })
    .await
    .map_err(|e| TranscriptionError::Io(std::io::Error::other(e)))?
}

/// Copy at most `max` of the recording into a temporary WAV file.
pub fn crop_wav(wav: &[u8], max: Duration) -> Result<NamedTempFile, TranscriptionError> {
    let mut reader = WavReader::new(Cursor::new(wav))?;
    let spec = reader.spec();
    let max_frames = (max.as_secs_f64() * f64::from(spec.sample_rate)) as u64;
    let max_samples = (max_frames * u64::from(spec.channels)) as usize;

    let file = tempfile::Builder::new()
        .prefix("dictation-")
        .suffix(".wav")
        .tempfile()?;
    let mut writer = WavWriter::create(file.path(), spec)?;
    match spec.sample_format {
        SampleFormat::Int => {
            for sample in reader.samples::<i32>().take(max_samples) {
                writer.write_sample(sample?)?;
            }
        }
        SampleFormat::Float => {
            for sample in reader.samples::<f32>().take(max_samples) {
                writer.write_sample(sample?)?;
            }
        }
    }
    writer.finalize()?;

    info!(
        original_frames = reader.duration(),
        kept_frames = max_frames.min(u64::from(reader.duration())),
        "Dictation cropped"
    );
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavSpec;
    use std::path::PathBuf;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RATE: u32 = 8_000;

    fn tone(seconds: u32) -> Vec<u8> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: RATE,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..(RATE * seconds) {
                writer.write_sample((i % 128) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_long_dictation_is_cropped() {
        let cropped = crop_wav(&tone(15), Duration::from_secs(10)).unwrap();
        let reader = WavReader::open(cropped.path()).unwrap();
        assert_eq!(reader.duration(), RATE * 10);
        assert_eq!(reader.spec().sample_rate, RATE);
    }

    #[test]
    fn test_short_dictation_is_kept_whole() {
        let cropped = crop_wav(&tone(3), Duration::from_secs(10)).unwrap();
        assert_eq!(WavReader::open(cropped.path()).unwrap().duration(), RATE * 3);
    }

    #[test]
    fn test_temp_file_removed_on_drop() {
        let cropped = crop_wav(&tone(1), Duration::from_secs(10)).unwrap();
        let path: PathBuf = cropped.path().to_path_buf();
        assert!(path.exists());
        drop(cropped);
        assert!(!path.exists());
    }

    #[test]
    fn test_garbage_is_invalid_audio() {
        let err = crop_wav(b"definitely not a wav", Duration::from_secs(10)).unwrap_err();
        assert!(matches!(err, TranscriptionError::InvalidAudio(_)));
    }

    #[tokio::test]
    async fn test_upload_returns_trimmed_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Load case 102.\n"))
            .expect(1)
            .mount(&server)
            .await;

        let transcriber = Transcriber::new(
            reqwest::Client::new(),
            server.uri(),
            Some("sk-test".into()),
            Duration::from_secs(10),
        );
        let text = transcriber.transcribe(&tone(2)).await.unwrap();
        assert_eq!(text, "Load case 102.");

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("whisper-1"));
        assert!(body.contains("name=\"response_format\""));
    }

    #[tokio::test]
    async fn test_cropped_audio_is_a_shorter_wav() {
        let audio = cropped_audio(tone(15), Duration::from_secs(10)).await.unwrap();
        let reader = WavReader::new(Cursor::new(audio)).unwrap();
        assert_eq!(reader.duration(), RATE * 10);
    }

    #[tokio::test]
    async fn test_garbage_upload_never_reaches_the_service() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let transcriber = Transcriber::new(
            reqwest::Client::new(),
            server.uri(),
            Some("sk-test".into()),
            Duration::from_secs(10),
        );
        let err = transcriber.transcribe(b"not a wav").await.unwrap_err();
        assert!(matches!(err, TranscriptionError::InvalidAudio(_)));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let transcriber =
            Transcriber::new(reqwest::Client::new(), "http://unused", None, Duration::from_secs(10));
        let err = transcriber.transcribe(&tone(1)).await.unwrap_err();
        assert!(matches!(err, TranscriptionError::MissingApiKey));
    }
}
