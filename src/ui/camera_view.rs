use super::{
    ActiveTheme, AnyElement, AppView, Button, ButtonVariants, CameraDevice, CameraState, Context,
    DownloadState, FluentBuilder, InteractiveElement, IntoElement, ParentElement, Screen,
    SharedString, Styled, StyledExt, camera, div, h_flex, px, v_flex,
};

impl AppView {
    /// Device rows shared by the startup picker and the in-app switcher.
    fn render_device_list(
        &self,
        cameras: &[CameraDevice],
        selected: Option<usize>,
        on_pick: fn(&mut Self, usize),
        cx: &mut Context<'_, Self>,
    ) -> Vec<AnyElement> {
        cameras
            .iter()
            .enumerate()
            .map(|(idx, device)| {
                let is_selected = selected == Some(idx);
                h_flex()
                    .w_full()
                    .gap_3()
                    .items_center()
                    .p_3()
                    .rounded_lg()
                    .cursor_pointer()
                    .bg(if is_selected {
                        gpui::rgba(0x2d374855)
                    } else {
                        gpui::rgba(0x1e293b00)
                    })
                    .border_1()
                    .border_color(if is_selected {
                        gpui::rgba(0x64748bff)
                    } else {
                        gpui::rgba(0x33415500)
                    })
                    .hover(|this| {
                        this.bg(gpui::rgba(0x2d374844))
                            .border_color(gpui::rgba(0x475569ff))
                    })
                    .on_mouse_down(
                        gpui::MouseButton::Left,
                        cx.listener(move |this, _, _, cx| {
                            on_pick(this, idx);
                            cx.notify();
                        }),
                    )
                    .child(
                        div()
                            .flex_1()
                            .text_sm()
                            .text_color(if is_selected {
                                gpui::rgb(0xe2e8f0)
                            } else {
                                gpui::rgb(0xcbd5e1)
                            })
                            .overflow_hidden()
                            .text_ellipsis()
                            .whitespace_nowrap()
                            .child(device.label.clone()),
                    )
                    .when(is_selected, |this| {
                        this.child(
                            div()
                                .text_sm()
                                .flex_shrink_0()
                                .text_color(gpui::rgb(0xa5b4fc))
                                .child("✓"),
                        )
                    })
                    .into_any_element()
            })
            .collect()
    }

    fn render_picker_shell(&self, title: &str) -> gpui::Div {
        v_flex()
            .gap_2()
            .p_4()
            .rounded_xl()
            .bg(gpui::rgba(0x0f1419f5))
            .border_1()
            .border_color(gpui::rgba(0x2d3748ff))
            .shadow_lg()
            .child(
                div()
                    .mb_2()
                    .text_sm()
                    .font_semibold()
                    .text_color(gpui::rgb(0xe2e8f0))
                    .child(title.to_string()),
            )
    }

    pub(super) fn render_camera_picker_main(&mut self, cx: &mut Context<'_, Self>) -> AnyElement {
        let rows = self.render_device_list(
            &self.available_cameras.clone(),
            self.selected_camera_idx,
            Self::switch_camera,
            cx,
        );

        self.render_picker_shell("Switch camera")
            .children(rows)
            .when_some(self.camera_error.clone(), |this, err| {
                this.child(error_banner(err))
            })
            .child(
                Button::new(SharedString::from("camera-picker-close"))
                    .ghost()
                    .label("Close")
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.camera_picker_open = false;
                        cx.notify();
                    })),
            )
            .into_any_element()
    }

    pub(super) fn initial_camera_state() -> (CameraState, Vec<CameraDevice>) {
        match camera::available_cameras() {
            Ok(cameras) if cameras.is_empty() => (
                CameraState::Unavailable {
                    message: "No camera was found on this machine.".to_string(),
                },
                Vec::new(),
            ),
            Ok(cameras) => (
                CameraState::Selection {
                    options: cameras.clone(),
                    selected: 0,
                    start_error: None,
                },
                cameras,
            ),
            Err(err) => {
                log::error!("failed to enumerate cameras: {err:?}");
                (
                    CameraState::Unavailable {
                        message: format!("Could not list cameras: {err:#}"),
                    },
                    Vec::new(),
                )
            }
        }
    }

    pub(super) fn render_camera_view(
        &mut self,
        state: &mut CameraState,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        match state {
            CameraState::Unavailable { message } => {
                let theme = cx.theme();
                v_flex()
                    .size_full()
                    .items_center()
                    .justify_center()
                    .child(
                        v_flex()
                            .gap_2()
                            .p_4()
                            .rounded_lg()
                            .border_1()
                            .border_color(theme.border)
                            .bg(theme.group_box)
                            .child(
                                div()
                                    .text_sm()
                                    .text_color(theme.accent)
                                    .font_semibold()
                                    .child("No camera available"),
                            )
                            .child(
                                div()
                                    .text_xs()
                                    .text_color(theme.muted_foreground)
                                    .child("Check the connection and camera permissions."),
                            )
                            .child(div().text_color(theme.foreground).child(message.clone())),
                    )
                    .into_any_element()
            }
            CameraState::Selection {
                options,
                selected,
                start_error,
            } => {
                if options.len() == 1 && self.camera_stream.is_none() && start_error.is_none() {
                    match self.start_camera_for_device(&options[0]) {
                        Ok(()) => {
                            *state = CameraState::Ready;
                            return div().child("Starting camera...").into_any_element();
                        }
                        Err(err) => {
                            *start_error = Some(format!("Could not start camera: {err}"));
                        }
                    }
                }

                let rows = self.render_device_list(options, Some(*selected), Self::select_camera, cx);
                let picker = self
                    .render_picker_shell("Choose a camera")
                    .children(rows)
                    .when_some(start_error.clone(), |this, err| this.child(error_banner(err)))
                    .child(
                        Button::new(SharedString::from("camera-confirm"))
                            .primary()
                            .label("Use this camera")
                            .w_full()
                            .mt_2()
                            .on_click(cx.listener(|this, _, _, cx| {
                                this.start_selected_camera();
                                cx.notify();
                            })),
                    );

                div()
                    .size_full()
                    .flex()
                    .items_center()
                    .justify_center()
                    .bg(gpui::rgba(0x1a233288))
                    .child(div().w(px(450.0)).child(picker))
                    .into_any_element()
            }
            CameraState::Ready => div()
                .p_4()
                .text_sm()
                .child("Starting camera...")
                .into_any_element(),
        }
    }

    pub(super) fn switch_camera(&mut self, idx: usize) {
        let Some(device) = self.available_cameras.get(idx).cloned() else {
            self.camera_error = Some("The selected camera is gone.".to_string());
            return;
        };

        match self.start_camera_for_device(&device) {
            Ok(()) => {
                self.selected_camera_idx = Some(idx);
                self.camera_error = None;
                self.camera_picker_open = false;
            }
            Err(err) => {
                self.camera_error = Some(format!("Could not start camera: {err}"));
            }
        }
    }

    fn select_camera(&mut self, selected: usize) {
        if let Screen::Camera(CameraState::Selection {
            options,
            selected: current,
            start_error,
        }) = &mut self.screen
        {
            if selected < options.len() {
                *current = selected;
                *start_error = None;
                self.selected_camera_idx = Some(selected);
                self.available_cameras = options.clone();
            }
        }
    }

    fn stop_camera_stream(&mut self) {
        if let Some(stream) = self.camera_stream.take() {
            stream.stop();
        }
    }

    fn start_camera_for_device(&mut self, device: &CameraDevice) -> Result<(), String> {
        self.stop_camera_stream();

        camera::start_camera_stream(
            device.index.clone(),
            self.capture_options(),
            self.preview_tx.clone(),
            self.detector_frame_tx.clone(),
        )
        .map(|stream| {
            log::info!("using camera {}", device.label);
            self.camera_stream = Some(stream);
            self.latest_frame = None;
            self.camera_error = None;
            self.canvas_dirty = true;
        })
        .map_err(|err| format!("{err:#}"))
    }

    fn start_selected_camera(&mut self) {
        let selected_device = match &self.screen {
            Screen::Camera(CameraState::Selection {
                options, selected, ..
            }) => {
                self.available_cameras = options.clone();
                options
                    .get(*selected)
                    .cloned()
                    .map(|device| (*selected, device))
            }
            _ => None,
        };

        let Some((selected_idx, device)) = selected_device else {
            if let Screen::Camera(CameraState::Selection { start_error, .. }) = &mut self.screen {
                *start_error = Some("The selected camera is gone.".to_string());
            }
            return;
        };

        match self.start_camera_for_device(&device) {
            Ok(()) => {
                self.selected_camera_idx = Some(selected_idx);
                self.camera_picker_open = false;
                self.screen = Screen::Download(DownloadState::new());
            }
            Err(err) => {
                if let Screen::Camera(CameraState::Selection { start_error, .. }) = &mut self.screen
                {
                    *start_error = Some(format!("Could not start camera: {err}"));
                }
            }
        }
    }
}

pub(super) fn error_banner(message: String) -> AnyElement {
    h_flex()
        .gap_2()
        .items_start()
        .mt_2()
        .p_3()
        .rounded_lg()
        .bg(gpui::rgba(0x7f1d1d33))
        .border_1()
        .border_color(gpui::rgba(0xef4444aa))
        .child(
            div()
                .text_sm()
                .flex_shrink_0()
                .text_color(gpui::rgb(0xfca5a5))
                .child("!"),
        )
        .child(
            div()
                .flex_1()
                .text_xs()
                .text_color(gpui::rgb(0xfca5a5))
                .overflow_hidden()
                .child(message),
        )
        .into_any_element()
}
