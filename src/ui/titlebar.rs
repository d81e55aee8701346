use super::{
    AnyElement, AppView, Context, Hsla, InteractiveElement, IntoElement, ParentElement, Styled,
    TITLEBAR_HEIGHT, Window, WindowControlArea, div, h_flex, px,
};

#[cfg(target_os = "windows")]
use super::SharedString;

/// One status pill in the titlebar.
pub(super) struct StatusBadge {
    pub color: Hsla,
    pub text: String,
}

impl AppView {
    pub(super) fn render_titlebar(
        &self,
        badges: Vec<StatusBadge>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        #[cfg(target_os = "windows")]
        let controls = self.render_windows_controls(window, cx);

        #[cfg(target_os = "macos")]
        let controls = self.render_macos_controls(window, cx);

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let controls = self.render_linux_controls(window, cx);

        let pills = badges.into_iter().map(|badge| {
            div()
                .px_2()
                .py_0p5()
                .rounded_md()
                .bg(gpui::rgba(0x00000033))
                .text_xs()
                .text_color(badge.color)
                .child(badge.text)
        });

        h_flex()
            .window_control_area(WindowControlArea::Drag)
            .h(px(TITLEBAR_HEIGHT))
            .w_full()
            .items_center()
            .justify_between()
            .bg(gpui::rgb(0x1a2332))
            .child(
                h_flex()
                    .gap_3()
                    .pl(px(80.0))
                    .pr_3()
                    .h_full()
                    .items_center()
                    .child(
                        div()
                            .text_sm()
                            .text_color(gpui::rgb(0xe2e8f0))
                            .child("Air Canvas"),
                    )
                    .children(pills),
            )
            .child(controls)
            .into_any_element()
    }

    #[cfg(target_os = "windows")]
    fn render_windows_controls(
        &self,
        window: &mut Window,
        _cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let button_height = px(TITLEBAR_HEIGHT);
        let close_hover = gpui::rgb(0xe81120);
        let hover = gpui::rgb(0x404040);
        let font_family: SharedString = "Segoe Fluent Icons".into();

        let control = |id: &'static str, area: WindowControlArea, glyph: &'static str, bg: gpui::Rgba| {
            div()
                .id(id)
                .flex()
                .items_center()
                .justify_center()
                .occlude()
                .w(px(46.0))
                .h_full()
                .text_size(px(10.0))
                .hover(move |s| s.bg(bg))
                .window_control_area(area)
                .child(glyph)
        };

        let max_glyph = if window.is_maximized() {
            "\u{e923}"
        } else {
            "\u{e922}"
        };

        div()
            .id("windows-window-controls")
            .font_family(font_family)
            .flex()
            .flex_row()
            .max_h(button_height)
            .min_h(button_height)
            .child(control("minimize", WindowControlArea::Min, "\u{e921}", hover))
            .child(control("maximize-or-restore", WindowControlArea::Max, max_glyph, hover))
            .child(control("close", WindowControlArea::Close, "\u{e8bb}", close_hover))
            .into_any_element()
    }

    #[cfg(target_os = "macos")]
    fn render_macos_controls(
        &self,
        _window: &mut Window,
        _cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        div().into_any_element()
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    fn render_linux_controls(
        &self,
        _window: &mut Window,
        _cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let button_size = px(28.0);
        let icon_size = px(16.0);
        let icon_color = gpui::rgb(0xc9d1d9);

        let control = |id: &'static str, area: WindowControlArea, path: &'static str, hover: u32| {
            div()
                .id(id)
                .size(button_size)
                .flex()
                .items_center()
                .justify_center()
                .rounded_md()
                .cursor_pointer()
                .window_control_area(area)
                .hover(move |s| s.bg(gpui::rgb(hover)))
                .child(gpui::svg().size(icon_size).path(path).text_color(icon_color))
        };

        h_flex()
            .gap_1()
            .px_2()
            .child(control("linux-minimize", WindowControlArea::Min, "M 4,8 H 12", 0x1f2428))
            .child(control(
                "linux-maximize",
                WindowControlArea::Max,
                "M 4,4 H 12 V 12 H 4 Z",
                0x1f2428,
            ))
            .child(control(
                "linux-close",
                WindowControlArea::Close,
                "M 4,4 L 12,12 M 12,4 L 4,12",
                0xe81123,
            ))
            .into_any_element()
    }
}
