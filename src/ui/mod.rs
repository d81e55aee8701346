use std::{mem, sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender, unbounded};
use gpui::prelude::FluentBuilder;
use gpui::{
    AnyElement, App, AppContext, Context, Hsla, InteractiveElement, IntoElement, ObjectFit,
    ParentElement, Render, RenderImage, SharedString, Styled, StyledImage, TitlebarOptions,
    Window, WindowControlArea, WindowDecorations, WindowOptions, div, img, px,
};
use gpui_component::{
    ActiveTheme, Root, Selectable, StyledExt,
    button::{Button, ButtonVariants},
    h_flex,
    tag::Tag,
    v_flex,
};
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use crate::{
    gateway::DrawingGateway,
    model_download::{DownloadEvent, ModelKind, ensure_model_ready},
    pipeline::{
        CameraDevice, CameraStream, CaptureOptions, DetectorBackend, DetectorMessage, camera,
        start_detector,
    },
    session::DrawingSession,
    settings::Settings,
    types::Frame,
};

mod camera_view;
mod download;
mod gallery;
mod main_view;
mod render_util;
mod titlebar;

use gallery::{GalleryMessage, GalleryState};

const TITLEBAR_HEIGHT: f32 = 32.0;
const TOOLBAR_WIDTH: f32 = 260.0;
const CONTENT_PADDING: f32 = 16.0;
const CURSOR_RADIUS: f32 = 6.0;

/// Channels between the capture thread, the detector worker and the UI.
pub struct PipelineChannels {
    pub preview_rx: Receiver<Frame>,
    pub preview_tx: Sender<Frame>,
    pub detector_frame_rx: Receiver<Frame>,
    pub detector_frame_tx: Sender<Frame>,
    pub detector_rx: Receiver<DetectorMessage>,
    pub detector_tx: Sender<DetectorMessage>,
}

pub fn launch_ui(
    app: &mut App,
    settings: Settings,
    gateway: Arc<dyn DrawingGateway>,
    channels: PipelineChannels,
) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("Air Canvas".into()),
            appears_transparent: true,
            traffic_light_position: None,
        }),
        window_decorations: Some(WindowDecorations::Client),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|_| AppView::new(settings, gateway, channels));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

struct AppView {
    screen: Screen,
    settings: Settings,
    session: DrawingSession,
    preview_rx: Receiver<Frame>,
    preview_tx: Sender<Frame>,
    detector_frame_tx: Sender<Frame>,
    detector_frame_rx: Option<Receiver<Frame>>,
    detector_rx: Receiver<DetectorMessage>,
    detector_tx: Option<Sender<DetectorMessage>>,
    detector_backend: DetectorBackend,
    detector_handle: Option<thread::JoinHandle<()>>,
    detector_ready: bool,
    detector_error: Option<String>,
    camera_stream: Option<CameraStream>,
    available_cameras: Vec<CameraDevice>,
    selected_camera_idx: Option<usize>,
    camera_error: Option<String>,
    camera_picker_open: bool,
    latest_frame: Option<Frame>,
    latest_image: Option<Arc<RenderImage>>,
    canvas_dirty: bool,
    download_rx: Receiver<DownloadMessage>,
    _download_handle: thread::JoinHandle<()>,
    gallery_rx: Receiver<GalleryMessage>,
    gallery_tx: Sender<GalleryMessage>,
    gallery_requested: bool,
}

enum Screen {
    Camera(CameraState),
    Download(DownloadState),
    Main,
    Gallery(GalleryState),
}

enum CameraState {
    Unavailable {
        message: String,
    },
    Selection {
        options: Vec<CameraDevice>,
        selected: usize,
        start_error: Option<String>,
    },
    Ready,
}

struct DownloadState {
    downloaded: u64,
    total: Option<u64>,
    models_ready: usize,
    message: String,
    error: Option<String>,
    finished: bool,
}

impl DownloadState {
    fn new() -> Self {
        Self {
            downloaded: 0,
            total: None,
            models_ready: 0,
            message: "Preparing tracking models...".to_string(),
            error: None,
            finished: false,
        }
    }
}

enum DownloadMessage {
    Event(DownloadEvent),
    Error(String),
}

impl AppView {
    fn new(settings: Settings, gateway: Arc<dyn DrawingGateway>, channels: PipelineChannels) -> Self {
        let detector_backend = DetectorBackend::new(
            settings.palm_model_path.clone(),
            settings.handpose_model_path.clone(),
            settings.min_confidence,
        );
        let (download_tx, download_rx) = unbounded();
        let download_handle = download::spawn_model_download(detector_backend.clone(), download_tx);
        let (gallery_tx, gallery_rx) = unbounded();
        let (initial_camera_state, available_cameras) = Self::initial_camera_state();
        let selected_camera_idx = if available_cameras.is_empty() {
            None
        } else {
            Some(0)
        };

        let session = DrawingSession::new(
            gateway,
            settings.fit_policy,
            settings.mirror,
            settings.color,
            settings.stroke_width,
        );

        Self {
            screen: Screen::Camera(initial_camera_state),
            settings,
            session,
            preview_rx: channels.preview_rx,
            preview_tx: channels.preview_tx,
            detector_frame_tx: channels.detector_frame_tx,
            detector_frame_rx: Some(channels.detector_frame_rx),
            detector_rx: channels.detector_rx,
            detector_tx: Some(channels.detector_tx),
            detector_backend,
            detector_handle: None,
            detector_ready: false,
            detector_error: None,
            camera_stream: None,
            available_cameras,
            selected_camera_idx,
            camera_error: None,
            camera_picker_open: false,
            latest_frame: None,
            latest_image: None,
            canvas_dirty: false,
            download_rx,
            _download_handle: download_handle,
            gallery_rx,
            gallery_tx,
            gallery_requested: false,
        }
    }

    fn start_detector_if_needed(&mut self) {
        if self.detector_handle.is_some() {
            return;
        }

        let Some(frame_rx) = self.detector_frame_rx.take() else {
            log::warn!("missing frame receiver for detector");
            return;
        };
        let Some(result_tx) = self.detector_tx.take() else {
            log::warn!("missing result sender for detector");
            return;
        };

        let handle = start_detector(self.detector_backend.clone(), frame_rx, result_tx);
        self.detector_handle = Some(handle);
    }

    fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            rotation_degrees: self.settings.camera_rotation,
        }
    }

    fn persist_settings(&mut self) {
        self.settings.color = self.session.color();
        self.settings.stroke_width = self.session.stroke_width();
        self.settings.mirror = self.session.mapper().mirror;
        if let Err(err) = self.settings.save() {
            log::warn!("failed to save settings: {err:#}");
        }
    }
}

impl Render for AppView {
    fn render(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> impl gpui::IntoElement {
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        let mut screen = mem::replace(&mut self.screen, Screen::Main);
        let view = match screen {
            Screen::Camera(mut state) => {
                let view = self.render_camera_view(&mut state, cx);
                match state {
                    CameraState::Ready => {
                        screen = Screen::Download(DownloadState::new());
                    }
                    _ => {
                        screen = Screen::Camera(state);
                    }
                }
                view
            }
            Screen::Download(mut state) => {
                self.poll_download_events(&mut state);
                let should_switch = state.finished && state.error.is_none();
                let view = self.render_download_view(&state, cx);
                if should_switch {
                    self.start_detector_if_needed();
                    if let Err(err) = self.session.start() {
                        log::warn!("{err}");
                    }
                    screen = Screen::Main;
                } else {
                    screen = Screen::Download(state);
                }
                view
            }
            Screen::Main => {
                let view = self.render_main(window, cx);
                screen = match self.take_pending_gallery() {
                    Some(gallery) => Screen::Gallery(gallery),
                    None => Screen::Main,
                };
                view
            }
            Screen::Gallery(mut state) => {
                self.drain_pipeline();
                self.poll_gallery(&mut state, window, cx);
                let view = self.render_gallery(&mut state, window, cx);
                if state.closed {
                    self.close_gallery(state, window, cx);
                    screen = Screen::Main;
                } else {
                    screen = Screen::Gallery(state);
                }
                view
            }
        };
        self.screen = screen;
        view
    }
}
