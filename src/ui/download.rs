use super::{
    ActiveTheme, AnyElement, AppView, Context, DetectorBackend, DownloadEvent, DownloadMessage,
    DownloadState, IntoElement, ParentElement, Sender, Styled, StyledExt, Tag, div,
    ModelKind, ensure_model_ready, h_flex, thread, v_flex,
};

impl AppView {
    pub(super) fn poll_download_events(&mut self, state: &mut DownloadState) {
        while let Ok(msg) = self.download_rx.try_recv() {
            match msg {
                DownloadMessage::Event(DownloadEvent::AlreadyPresent { model }) => {
                    state.message = format!("The {} model is already present", model.label());
                }
                DownloadMessage::Event(DownloadEvent::Started { model, total }) => {
                    state.downloaded = 0;
                    state.total = total;
                    state.message = format!("Downloading {} model...", model.label());
                }
                DownloadMessage::Event(DownloadEvent::Progress {
                    downloaded, total, ..
                }) => {
                    state.downloaded = downloaded;
                    state.total = total;
                }
                DownloadMessage::Event(DownloadEvent::Finished { .. }) => {
                    state.models_ready += 1;
                    if state.models_ready >= ModelKind::ALL.len() {
                        state.finished = true;
                        state.message = "Models ready, starting canvas...".to_string();
                    }
                }
                DownloadMessage::Error(err) => {
                    state.error = Some(err);
                    state.finished = false;
                    state.message = "Model download failed".to_string();
                }
            }
        }
    }

    pub(super) fn render_download_view(
        &self,
        state: &DownloadState,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let theme = cx.theme();
        let bar = progress_bar_string(state.downloaded, state.total);
        let detail = match (state.total, state.finished) {
            (_, true) => "Done".to_string(),
            (Some(total), false) if total > 0 => {
                let percent = (state.downloaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
                format!("{percent:.1}%")
            }
            _ => format!("Downloaded {} KB", state.downloaded / 1024),
        };

        let (status_text, status_color) = if state.finished && state.error.is_none() {
            ("✓ Models ready", theme.success)
        } else if state.error.is_some() {
            ("✗ Download failed", theme.accent)
        } else {
            ("⟳ Downloading", theme.foreground)
        };

        let mut container = v_flex()
            .gap_3()
            .p_6()
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .child(
                        div()
                            .text_color(status_color)
                            .font_semibold()
                            .child(status_text),
                    )
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.muted_foreground)
                            .child("Preparing fingertip tracking"),
                    ),
            )
            .child(
                div()
                    .px_3()
                    .py_2()
                    .rounded_md()
                    .border_1()
                    .border_color(theme.border)
                    .bg(theme.muted)
                    .font_family(theme.mono_font_family.clone())
                    .text_color(theme.foreground)
                    .child(bar),
            )
            .child(div().text_sm().text_color(theme.muted_foreground).child(detail))
            .child(div().text_color(theme.foreground).child(state.message.clone()));

        if let Some(err) = &state.error {
            container = container.child(Tag::danger().rounded_full().child(format!("Error: {err}")));
        }

        v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .bg(theme.background)
            .child(container)
            .into_any_element()
    }
}

pub(super) fn spawn_model_download(
    backend: DetectorBackend,
    tx: Sender<DownloadMessage>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for model in ModelKind::ALL {
            let result = ensure_model_ready(model, &backend.model_path(model), |event| {
                let _ = tx.send(DownloadMessage::Event(event));
            });

            if let Err(err) = result {
                log::error!("failed to download {} model: {err:?}", model.label());
                let _ = tx.send(DownloadMessage::Error(format!("{err:#}")));
                return;
            }
        }
    })
}

fn progress_bar_string(downloaded: u64, total: Option<u64>) -> String {
    const BAR_LEN: usize = 30;
    match total {
        Some(total) if total > 0 => {
            let pct = (downloaded as f64 / total as f64).clamp(0.0, 1.0);
            let filled = ((pct * BAR_LEN as f64).round() as usize).min(BAR_LEN);
            format!(
                "[{}{}] {:>5.1}%",
                "=".repeat(filled),
                " ".repeat(BAR_LEN - filled),
                pct * 100.0
            )
        }
        _ => {
            let spinner_width = ((downloaded / 64) as usize % BAR_LEN) + 1;
            format!("[{:-<width$}] unknown size", ">", width = spinner_width)
        }
    }
}
