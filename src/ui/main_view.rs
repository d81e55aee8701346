use super::camera_view::error_banner;
use super::render_util::rgba_to_image;
use super::titlebar::StatusBadge;
use super::{
    AnyElement, AppView, Button, ButtonVariants, CONTENT_PADDING, CURSOR_RADIUS, CameraStream, Context,
    DetectorMessage, FluentBuilder, InteractiveElement, IntoElement, ObjectFit, ParentElement,
    RenderImage, Selectable, SharedString, Styled, StyledExt, StyledImage, TITLEBAR_HEIGHT,
    TOOLBAR_WIDTH, Window, div, h_flex, img, px, v_flex,
};
use crate::{
    canvas::{draw_cursor, render_drawing},
    pipeline::rgba_converter,
    session::{SessionEvent, SessionState},
    types::{DrawColor, StrokeWidth},
};
use gpui::StatefulInteractiveElement;
use gpui_component::ActiveTheme;
use std::sync::Arc;

const STROKE_STEP: f32 = 2.0;

impl AppView {
    pub(super) fn render_main(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) -> AnyElement {
        self.drain_pipeline();

        match self.session.poll_save() {
            Some(SessionEvent::Saved { .. }) => {
                self.gallery_requested = true;
                self.canvas_dirty = true;
            }
            Some(SessionEvent::SaveFailed { .. }) => self.canvas_dirty = true,
            None => {}
        }

        let (canvas_w, canvas_h) = canvas_size(window);
        let mapper = self.session.mapper();
        if mapper.canvas_width != canvas_w || mapper.canvas_height != canvas_h {
            self.session.set_canvas_size(canvas_w, canvas_h);
            self.canvas_dirty = true;
        }
        if self.canvas_dirty {
            self.refresh_canvas(window, cx);
        }

        let canvas_view: AnyElement = match &self.latest_image {
            Some(image) => img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Fill)
                .into_any_element(),
            None => div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(gpui::rgb(0x8b95a5))
                .child("Waiting for camera...")
                .into_any_element(),
        };

        let mut canvas = div()
            .relative()
            .w(px(canvas_w))
            .h(px(canvas_h))
            .overflow_hidden()
            .rounded_lg()
            .bg(gpui::rgb(0x000000))
            .child(canvas_view);

        if self.camera_picker_open && !self.available_cameras.is_empty() {
            canvas = canvas.child(
                div()
                    .absolute()
                    .top(px(16.0))
                    .left(px(16.0))
                    .w(px((canvas_w * 0.5).clamp(240.0, 400.0)))
                    .child(self.render_camera_picker_main(cx)),
            );
        }

        let toolbar = self.render_toolbar(cx);
        let badges = self.status_badges(cx);
        let titlebar = self.render_titlebar(badges, window, cx);

        v_flex()
            .size_full()
            .bg(gpui::rgb(0x1a2332))
            .child(titlebar)
            .child(
                h_flex()
                    .flex_1()
                    .gap(px(CONTENT_PADDING))
                    .p(px(CONTENT_PADDING))
                    .items_start()
                    .child(canvas)
                    .child(toolbar),
            )
            .into_any_element()
    }

    /// Pulls every pending preview frame and detector message.
    pub(super) fn drain_pipeline(&mut self) {
        if let Some(err) = self.camera_stream.as_ref().and_then(CameraStream::take_failure) {
            self.camera_stream = None;
            self.latest_frame = None;
            self.camera_error = Some(format!("Camera stopped: {err}. Pick a camera to retry."));
            self.canvas_dirty = true;
        }

        while let Ok(frame) = self.preview_rx.try_recv() {
            self.latest_frame = Some(frame);
            self.canvas_dirty = true;
        }

        while let Ok(message) = self.detector_rx.try_recv() {
            match message {
                DetectorMessage::Ready => {
                    log::info!("landmark detector ready");
                    self.detector_ready = true;
                    self.detector_error = None;
                }
                DetectorMessage::Result(result) => {
                    log::trace!("detection latency {:?}", result.timestamp.elapsed());
                    self.session.apply_detection(&result);
                    self.canvas_dirty = true;
                }
                DetectorMessage::Failed(err) => {
                    log::error!("landmark detector failed: {err}");
                    self.detector_ready = false;
                    self.detector_error = Some(err);
                }
            }
        }
    }

    fn refresh_canvas(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        self.canvas_dirty = false;
        let Some(frame) = self.latest_frame.as_ref() else {
            return;
        };

        let mapper = self.session.mapper();
        let (width, height) = (
            mapper.canvas_width.round() as u32,
            mapper.canvas_height.round() as u32,
        );
        let frame = rgba_converter::upright(frame);
        let mut rgba = render_drawing(
            Some(&*frame),
            width,
            height,
            mapper.policy,
            mapper.mirror,
            &self.session.points(),
            self.session.color(),
            self.session.stroke_width(),
        );
        if let Some(tip) = self.session.last_fingertip() {
            draw_cursor(&mut rgba, width, height, tip, CURSOR_RADIUS);
        }

        if let Some(image) = rgba_to_image(rgba, width, height) {
            self.replace_latest_image(image, window, cx);
        }
    }

    fn status_badges(&self, cx: &Context<'_, Self>) -> Vec<StatusBadge> {
        let theme = cx.theme();

        let detector = if let Some(err) = &self.detector_error {
            StatusBadge {
                color: theme.danger,
                text: format!("● Tracking failed: {err}"),
            }
        } else if self.detector_ready {
            StatusBadge {
                color: theme.success,
                text: "● Tracking".to_string(),
            }
        } else {
            StatusBadge {
                color: theme.muted_foreground,
                text: "○ Loading tracker".to_string(),
            }
        };

        let camera = match &self.latest_frame {
            Some(frame) => StatusBadge {
                color: theme.success,
                text: format!("● Camera {}x{}", frame.width, frame.height),
            },
            None => StatusBadge {
                color: theme.muted_foreground,
                text: "○ Waiting for camera".to_string(),
            },
        };

        let session = StatusBadge {
            color: theme.foreground,
            text: format!(
                "Session: {} · {} points",
                self.session.state().name(),
                self.session.stroke_len()
            ),
        };

        vec![detector, camera, session]
    }

    fn render_toolbar(&mut self, cx: &mut Context<'_, Self>) -> AnyElement {
        let state = self.session.state().clone();
        let capturing = state == SessionState::Capturing;

        let mut actions = v_flex().gap_2();
        match state {
            SessionState::Idle | SessionState::Saved { .. } => {
                actions = actions.child(
                    Button::new(SharedString::from("session-start"))
                        .primary()
                        .label("New drawing")
                        .w_full()
                        .on_click(cx.listener(|this, _, _, cx| {
                            if let Err(err) = this.session.start() {
                                log::warn!("{err}");
                            }
                            this.canvas_dirty = true;
                            cx.notify();
                        })),
                );
            }
            SessionState::Saving => {
                actions = actions.child(
                    div()
                        .text_sm()
                        .text_color(gpui::rgb(0xa5b4fc))
                        .child("Saving drawing..."),
                );
            }
            SessionState::Capturing | SessionState::SaveFailed { .. } => {}
        }

        if capturing {
            actions = actions
                .child(
                    Button::new(SharedString::from("session-save"))
                        .primary()
                        .label("Save")
                        .w_full()
                        .on_click(cx.listener(|this, _, _, cx| {
                            this.save_drawing();
                            cx.notify();
                        })),
                )
                .when(self.session.has_stroke(), |this| {
                    this.child(
                        Button::new(SharedString::from("session-clear"))
                            .outline()
                            .label("Clear")
                            .w_full()
                            .on_click(cx.listener(|this, _, _, cx| {
                                if let Err(err) = this.session.clear() {
                                    log::warn!("{err}");
                                }
                                this.canvas_dirty = true;
                                cx.notify();
                            })),
                    )
                });
        }

        let mirror = self.session.mapper().mirror;
        let mut camera_section = v_flex().gap_2().child(
            Button::new(SharedString::from("toggle-mirror"))
                .outline()
                .selected(mirror)
                .label(if mirror { "Mirrored (front camera)" } else { "Not mirrored (rear camera)" })
                .w_full()
                .on_click(cx.listener(|this, _, _, cx| {
                    let mirror = this.session.toggle_mirror();
                    log::info!("mirror {}", if mirror { "on" } else { "off" });
                    this.persist_settings();
                    this.canvas_dirty = true;
                    cx.notify();
                })),
        );
        if self.available_cameras.len() > 1 {
            camera_section = camera_section.child(
                Button::new(SharedString::from("camera-picker-toggle"))
                    .outline()
                    .label(if self.camera_picker_open { "Close camera list" } else { "Switch camera" })
                    .w_full()
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.camera_picker_open = !this.camera_picker_open;
                        cx.notify();
                    })),
            );
        }
        camera_section = camera_section.child(
            Button::new(SharedString::from("open-gallery"))
                .ghost()
                .label("Gallery")
                .w_full()
                .on_click(cx.listener(|this, _, _, cx| {
                    this.gallery_requested = true;
                    cx.notify();
                })),
        );

        let width = self.session.stroke_width();
        let stroke_section = h_flex()
            .gap_2()
            .items_center()
            .child(
                Button::new(SharedString::from("stroke-thinner"))
                    .outline()
                    .label("−")
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.change_stroke_width(-STROKE_STEP);
                        cx.notify();
                    })),
            )
            .child(
                div()
                    .flex_1()
                    .text_center()
                    .text_sm()
                    .text_color(gpui::rgb(0xe2e8f0))
                    .child(format!("{:.0} px", width.get())),
            )
            .child(
                Button::new(SharedString::from("stroke-thicker"))
                    .outline()
                    .label("+")
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.change_stroke_width(STROKE_STEP);
                        cx.notify();
                    })),
            );

        let errors: Vec<String> = [
            self.session.last_error().map(str::to_string),
            self.detector_error
                .as_ref()
                .map(|err| format!("Fingertip tracking stopped: {err}")),
            self.camera_error.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();

        v_flex()
            .w(px(TOOLBAR_WIDTH))
            .gap_4()
            .p_3()
            .rounded_lg()
            .bg(gpui::rgb(0x0f1419))
            .child(section_title("Drawing"))
            .child(actions)
            .child(section_title("Color"))
            .child(self.render_palette(cx))
            .child(section_title("Stroke width"))
            .child(stroke_section)
            .child(section_title("Camera"))
            .child(camera_section)
            .children(errors.into_iter().map(error_banner))
            .into_any_element()
    }

    fn render_palette(&mut self, cx: &mut Context<'_, Self>) -> AnyElement {
        let current = self.session.color();
        let swatches = DrawColor::PALETTE.into_iter().map(|color| {
            let is_selected = color == current;
            div()
                .id(SharedString::from(format!("color-{}", color.name())))
                .size(px(36.0))
                .rounded_full()
                .cursor_pointer()
                .bg(gpui::rgb(color.hex()))
                .border_2()
                .border_color(if is_selected {
                    gpui::rgba(0xffffffff)
                } else {
                    gpui::rgba(0x00000000)
                })
                .hover(|this| this.border_color(gpui::rgba(0xcbd5e1ff)))
                .on_click(cx.listener(move |this, _, _, cx| {
                    this.session.set_color(color);
                    this.persist_settings();
                    this.canvas_dirty = true;
                    cx.notify();
                }))
        });

        h_flex().flex_wrap().gap_2().children(swatches).into_any_element()
    }

    fn save_drawing(&mut self) {
        let frame = self.latest_frame.as_ref().map(rgba_converter::upright);
        if let Err(err) = self.session.begin_save(frame.as_deref()) {
            log::warn!("{err}");
        }
    }

    fn change_stroke_width(&mut self, delta: f32) {
        let width: StrokeWidth = self.session.stroke_width().step(delta);
        self.session.set_stroke_width(width);
        self.persist_settings();
        self.canvas_dirty = true;
    }

    pub(super) fn take_pending_gallery(&mut self) -> Option<super::GalleryState> {
        if !std::mem::take(&mut self.gallery_requested) {
            return None;
        }
        self.camera_picker_open = false;
        self.session.pause();
        self.request_gallery_list();
        Some(super::GalleryState::loading(self.session.gateway().current_user()))
    }

    pub(super) fn replace_latest_image(
        &mut self,
        new_image: Arc<RenderImage>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if let Some(old_image) = self.latest_image.replace(new_image) {
            // Explicitly drop the previous GPU texture; otherwise the sprite atlas keeps
            // every frame and memory will climb rapidly while the camera is running.
            cx.drop_image(old_image, Some(window));
        }
    }
}

/// Canvas area left over after the titlebar and toolbar, in logical pixels.
fn canvas_size(window: &Window) -> (f32, f32) {
    let viewport = window.viewport_size();
    let width = f32::from(viewport.width) - TOOLBAR_WIDTH - CONTENT_PADDING * 3.0;
    let height = f32::from(viewport.height) - TITLEBAR_HEIGHT - CONTENT_PADDING * 2.0;
    (width.max(1.0).round(), height.max(1.0).round())
}

fn section_title(title: &str) -> AnyElement {
    div()
        .text_xs()
        .font_semibold()
        .text_color(gpui::rgb(0x8b95a5))
        .child(title.to_string())
        .into_any_element()
}
