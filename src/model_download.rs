use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

const MODEL_DIR: &str = "models";
const MODEL_BASE_URL: &str =
    "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models";

/// The two ONNX models fingertip tracking needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    PalmDetector,
    Handpose,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::PalmDetector, ModelKind::Handpose];

    fn filename(self) -> &'static str {
        match self {
            ModelKind::PalmDetector => "palm_detection_mediapipe_2023feb.onnx",
            ModelKind::Handpose => "handpose_estimation_mediapipe_2023feb.onnx",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ModelKind::PalmDetector => "palm detector",
            ModelKind::Handpose => "handpose",
        }
    }

    fn url(self) -> String {
        format!("{MODEL_BASE_URL}/{}", self.filename())
    }
}

pub fn default_model_path(model: ModelKind) -> PathBuf {
    PathBuf::from(MODEL_DIR).join(model.filename())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadEvent {
    AlreadyPresent { model: ModelKind },
    Started { model: ModelKind, total: Option<u64> },
    Progress { model: ModelKind, downloaded: u64, total: Option<u64> },
    Finished { model: ModelKind },
}

/// Makes sure `model` exists at `model_path`, downloading it when missing.
/// Progress goes to `on_event` and to a terminal progress bar.
pub fn ensure_model_ready<F>(model: ModelKind, model_path: &Path, mut on_event: F) -> anyhow::Result<()>
where
    F: FnMut(DownloadEvent),
{
    if model_path.exists() {
        on_event(DownloadEvent::AlreadyPresent { model });
        on_event(DownloadEvent::Finished { model });
        return Ok(());
    }

    if let Some(parent) = model_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create model directory {}", parent.display()))?;
    }

    let mut progress: Option<ProgressBar> = None;
    download_to_path(model, &model.url(), model_path, &mut |event| {
        match &event {
            DownloadEvent::Started { total, .. } => progress = Some(create_progress_bar(*total)),
            DownloadEvent::Progress { downloaded, .. } => {
                if let Some(pb) = progress.as_ref() {
                    pb.set_position(*downloaded);
                }
            }
            DownloadEvent::Finished { .. } => {
                if let Some(pb) = progress.take() {
                    pb.finish_with_message(format!("{} model ready", model.label()));
                }
            }
            DownloadEvent::AlreadyPresent { .. } => {}
        }
        on_event(event);
    })
    .with_context(|| {
        format!(
            "failed to download {} model to {}",
            model.label(),
            model_path.display()
        )
    })
}

fn download_to_path<F>(model: ModelKind, url: &str, dest: &Path, on_event: &mut F) -> anyhow::Result<()>
where
    F: FnMut(DownloadEvent),
{
    log::info!(
        "downloading {} model from {url} to {}",
        model.label(),
        dest.display()
    );

    let mut response = Client::new()
        .get(url)
        .send()
        .context("failed to start model download")?
        .error_for_status()
        .context("model download returned error status")?;

    let total = response.content_length();
    on_event(DownloadEvent::Started { model, total });

    // Write next to the target and rename, so a killed download never leaves
    // a truncated model behind.
    let tmp_path = dest.with_extension("download");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let bytes_read = response
            .read(&mut buffer)
            .context("failed while reading model bytes")?;
        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .context("failed while writing model to disk")?;
        downloaded += bytes_read as u64;
        on_event(DownloadEvent::Progress {
            model,
            downloaded,
            total,
        });
    }

    file.sync_all()
        .context("failed to flush downloaded model to disk")?;
    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to move temp model {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    on_event(DownloadEvent::Finished { model });
    Ok(())
}

fn create_progress_bar(total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} downloading model") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_model_skips_download() {
        let dir = std::env::temp_dir().join(format!("air-canvas-model-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let model = dir.join("model.onnx");
        fs::write(&model, b"onnx").unwrap();

        let mut events = Vec::new();
        ensure_model_ready(ModelKind::PalmDetector, &model, |event| events.push(event)).unwrap();

        let model = ModelKind::PalmDetector;
        assert_eq!(
            events,
            vec![
                DownloadEvent::AlreadyPresent { model },
                DownloadEvent::Finished { model }
            ]
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn models_resolve_to_distinct_files() {
        let palm = default_model_path(ModelKind::PalmDetector);
        let handpose = default_model_path(ModelKind::Handpose);

        assert_ne!(palm, handpose);
        assert!(palm.starts_with(MODEL_DIR));
        assert!(ModelKind::Handpose.url().ends_with("handpose_estimation_mediapipe_2023feb.onnx"));
    }
}
