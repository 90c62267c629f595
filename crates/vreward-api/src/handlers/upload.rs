//! Video upload handler.
//!
//! Multipart form: `episode_number` (required), `attempt_number` (default 1),
//! `file_size` (default 0) and `file`. Fields may arrive in any order; the
//! file is streamed to disk as soon as it is reached, so limits known at that
//! point are applied up front and the rest once the form is complete.

use std::time::Instant;

use axum::extract::{Multipart, State};
use axum::Json;
use tracing::info;
use vreward_models::{EpisodeKey, UploadResponse};
use vreward_worker::{precheck, UploadArtifact, UploadRequest};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Text fields of the upload form.
#[derive(Debug, Default, Clone, PartialEq)]
struct UploadForm {
    episode_number: Option<i64>,
    attempt_number: Option<u32>,
    file_size: Option<u64>,
}

impl UploadForm {
    fn set(&mut self, name: &str, value: &str) -> ApiResult<()> {
        let value = value.trim();
        match name {
            "episode_number" => self.episode_number = Some(parse_field(name, value)?),
            "attempt_number" => self.attempt_number = Some(parse_field(name, value)?),
            "file_size" => self.file_size = Some(parse_field(name, value)?),
            _ => {}
        }
        Ok(())
    }

    /// Episode key as far as known; the episode is 0 until its field arrives.
    fn provisional_key(&self) -> EpisodeKey {
        EpisodeKey::new(self.episode_number.unwrap_or(0), self.attempt_number.unwrap_or(1))
    }

    fn episode_key(&self) -> ApiResult<EpisodeKey> {
        let episode_number = self
            .episode_number
            .ok_or_else(|| ApiError::bad_request("Field required: episode_number"))?;
        Ok(EpisodeKey::new(episode_number, self.attempt_number.unwrap_or(1)))
    }

    fn request(&self, content_type: Option<String>, filename: Option<String>) -> UploadRequest {
        UploadRequest {
            episode: self.provisional_key(),
            declared_size: self.file_size.unwrap_or(0),
            content_type,
            filename,
        }
    }
}

fn parse_field<T: std::str::FromStr>(name: &str, value: &str) -> ApiResult<T> {
    value
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid value for {}: {:?}", name, value)))
}

/// Receive a clip, score it and return the reward.
pub async fn upload_video(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Json<UploadResponse>> {
    let production = state.config.is_production();
    receive_and_score(state, multipart)
        .await
        .map_err(|e| e.redact(production))
}

async fn receive_and_score(state: AppState, mut multipart: Multipart) -> ApiResult<Json<UploadResponse>> {
    let start = Instant::now();
    let mut form = UploadForm::default();
    let mut upload: Option<UploadArtifact> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                if upload.is_some() {
                    return Err(ApiError::bad_request("Only one file may be uploaded"));
                }
                let request = form.request(
                    field.content_type().map(str::to_string),
                    field.file_name().map(str::to_string),
                );
                info!(
                    episode = request.episode.episode_number,
                    attempt = request.episode.attempt_number,
                    size = request.declared_size,
                    "Receiving upload"
                );
                upload = Some(state.processor.ingest(&request, field).await?);
            }
            Some(name) => {
                let name = name.to_string();
                let value = field.text().await?;
                form.set(&name, &value)?;
            }
            None => {}
        }
    }

    let episode = form.episode_key()?;
    let mut upload = upload.ok_or_else(|| ApiError::bad_request("Field required: file"))?;

    // Fields sent after the file are only checked now.
    precheck(
        &UploadRequest::new(episode).with_declared_size(form.file_size.unwrap_or(0)),
        state.processor.limits(),
    )?;
    upload.episode = episode;

    state
        .score_log
        .record_received(episode, upload.size, upload.filename.as_deref())
        .await;

    let outcome = state.processor.score(upload).await;
    state.score_log.record_score(&outcome).await;

    info!(
        episode = episode.episode_number,
        attempt = episode.attempt_number,
        target = %outcome.target,
        score = outcome.reward,
        analysis_secs = outcome.analysis_time,
        "Upload processed successfully in {:.2}s",
        start.elapsed().as_secs_f64()
    );

    Ok(Json(UploadResponse::from(&outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_defaults() {
        let mut form = UploadForm::default();
        assert!(form.episode_key().is_err());

        form.set("episode_number", " 42 ").unwrap();
        form.set("unrelated", "x").unwrap();
        assert_eq!(form.episode_key().unwrap(), EpisodeKey::new(42, 1));

        let request = form.request(Some("video/mp4".into()), None);
        assert_eq!(request.declared_size, 0);
    }

    #[test]
    fn test_invalid_number_rejected() {
        let mut form = UploadForm::default();
        let err = form.set("attempt_number", "two").unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
