use std::path::PathBuf;

use chrono::Local;
use image::imageops;

use super::camera_view::error_banner;
use super::render_util::rgba_to_image;
use super::titlebar::StatusBadge;
use super::{
    ActiveTheme, AnyElement, AppView, Arc, Button, ButtonVariants, Context, DrawingGateway,
    IntoElement, ObjectFit, ParentElement, RenderImage, Screen, SharedString, Styled, StyledExt,
    StyledImage, Window, div, h_flex, img, px, thread, v_flex,
};
use crate::{gateway::{DrawingRecord, UserAccount}, session::SessionState};

const THUMBNAIL_SIZE: u32 = 200;

pub(super) struct GalleryItem {
    record: DrawingRecord,
    thumbnail: Option<Arc<RenderImage>>,
}

pub(super) struct GalleryState {
    owner: Option<UserAccount>,
    items: Vec<GalleryItem>,
    loading: bool,
    error: Option<String>,
    pub(super) closed: bool,
}

impl GalleryState {
    pub(super) fn loading(owner: Option<UserAccount>) -> Self {
        Self {
            owner,
            items: Vec::new(),
            loading: true,
            error: None,
            closed: false,
        }
    }
}

/// Decoded drawing, produced off the UI thread.
pub(super) struct LoadedDrawing {
    record: DrawingRecord,
    thumbnail: Option<(Vec<u8>, u32, u32)>,
}

pub(super) enum GalleryMessage {
    Loaded(Result<Vec<LoadedDrawing>, String>),
    Deleted(Result<String, String>),
}

impl AppView {
    pub(super) fn request_gallery_list(&self) {
        let gateway = self.session.gateway().clone();
        let tx = self.gallery_tx.clone();
        thread::spawn(move || {
            let result = match gateway.current_user() {
                Some(user) => gateway
                    .list(&user.uid)
                    .map(|records| {
                        records
                            .into_iter()
                            .map(|record| LoadedDrawing {
                                thumbnail: load_thumbnail(&record.image_url),
                                record,
                            })
                            .collect()
                    })
                    .map_err(|err| format!("Could not load drawings: {err}")),
                None => Err("Sign in to see your drawings.".to_string()),
            };
            let _ = tx.send(GalleryMessage::Loaded(result));
        });
    }

    fn request_delete(&self, id: String) {
        let gateway = self.session.gateway().clone();
        let tx = self.gallery_tx.clone();
        thread::spawn(move || {
            let result = gateway
                .delete(&id)
                .map(|()| id)
                .map_err(|err| format!("Could not delete drawing: {err}"));
            let _ = tx.send(GalleryMessage::Deleted(result));
        });
    }

    pub(super) fn poll_gallery(
        &mut self,
        state: &mut GalleryState,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        while let Ok(message) = self.gallery_rx.try_recv() {
            match message {
                GalleryMessage::Loaded(Ok(drawings)) => {
                    release_thumbnails(std::mem::take(&mut state.items), window, cx);
                    state.items = drawings
                        .into_iter()
                        .map(|drawing| GalleryItem {
                            thumbnail: drawing
                                .thumbnail
                                .and_then(|(rgba, w, h)| rgba_to_image(rgba, w, h)),
                            record: drawing.record,
                        })
                        .collect();
                    state.loading = false;
                    state.error = None;
                }
                GalleryMessage::Loaded(Err(err)) => {
                    log::warn!("{err}");
                    state.loading = false;
                    state.error = Some(err);
                }
                GalleryMessage::Deleted(Ok(id)) => {
                    if let Some(position) = state.items.iter().position(|item| item.record.id == id) {
                        let item = state.items.remove(position);
                        release_thumbnails(vec![item], window, cx);
                    }
                }
                GalleryMessage::Deleted(Err(err)) => {
                    log::warn!("{err}");
                    state.error = Some(err);
                }
            }
        }
    }

    pub(super) fn render_gallery(
        &mut self,
        state: &mut GalleryState,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let theme = cx.theme();
        let owner = state
            .owner
            .as_ref()
            .map(|user| user.email.clone())
            .unwrap_or_else(|| "signed out".to_string());
        let badges = vec![StatusBadge {
            color: theme.muted_foreground,
            text: format!("Gallery · {owner}"),
        }];

        let header = h_flex()
            .gap_2()
            .items_center()
            .child(
                Button::new(SharedString::from("gallery-back"))
                    .primary()
                    .label("Back to canvas")
                    .on_click(cx.listener(|this, _, _, cx| {
                        if let Screen::Gallery(state) = &mut this.screen {
                            state.closed = true;
                        }
                        cx.notify();
                    })),
            )
            .child(
                Button::new(SharedString::from("gallery-refresh"))
                    .outline()
                    .label("Refresh")
                    .on_click(cx.listener(|this, _, _, cx| {
                        if let Screen::Gallery(state) = &mut this.screen {
                            state.loading = true;
                        }
                        this.request_gallery_list();
                        cx.notify();
                    })),
            )
            .child(
                div()
                    .text_sm()
                    .text_color(gpui::rgb(0x8b95a5))
                    .child(if state.loading {
                        "Loading...".to_string()
                    } else {
                        format!("{} drawing(s)", state.items.len())
                    }),
            );

        let body: AnyElement = if !state.loading && state.items.is_empty() && state.error.is_none() {
            div()
                .p_6()
                .text_sm()
                .text_color(gpui::rgb(0x8b95a5))
                .child("No drawings yet. Save one from the canvas.")
                .into_any_element()
        } else {
            let cards: Vec<AnyElement> = state
                .items
                .iter()
                .map(|item| self.render_gallery_card(item, cx))
                .collect();
            h_flex()
                .flex_wrap()
                .gap_3()
                .items_start()
                .children(cards)
                .into_any_element()
        };

        let titlebar = self.render_titlebar(badges, window, cx);
        v_flex()
            .size_full()
            .bg(gpui::rgb(0x1a2332))
            .child(titlebar)
            .child(
                v_flex()
                    .flex_1()
                    .gap_4()
                    .p_4()
                    .child(header)
                    .children(state.error.clone().map(error_banner))
                    .child(body),
            )
            .into_any_element()
    }

    fn render_gallery_card(&self, item: &GalleryItem, cx: &mut Context<'_, Self>) -> AnyElement {
        let preview: AnyElement = match &item.thumbnail {
            Some(image) => img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .into_any_element(),
            None => div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_xs()
                .text_color(gpui::rgb(0x8b95a5))
                .child("Image unavailable")
                .into_any_element(),
        };

        let id = item.record.id.clone();
        v_flex()
            .w(px(THUMBNAIL_SIZE as f32 + 24.0))
            .gap_2()
            .p_3()
            .rounded_lg()
            .bg(gpui::rgb(0x0f1419))
            .child(
                div()
                    .w_full()
                    .h(px(THUMBNAIL_SIZE as f32 * 0.75))
                    .rounded_md()
                    .overflow_hidden()
                    .bg(gpui::rgb(0x000000))
                    .child(preview),
            )
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .child(
                        div()
                            .size(px(12.0))
                            .rounded_full()
                            .bg(gpui::rgb(item.record.color.hex())),
                    )
                    .child(
                        div()
                            .text_xs()
                            .font_semibold()
                            .text_color(gpui::rgb(0xe2e8f0))
                            .child(describe(&item.record)),
                    ),
            )
            .child(
                Button::new(SharedString::from(format!("delete-{id}")))
                    .ghost()
                    .label("Delete")
                    .on_click(cx.listener(move |this, _, _, cx| {
                        this.request_delete(id.clone());
                        cx.notify();
                    })),
            )
            .into_any_element()
    }

    pub(super) fn close_gallery(
        &mut self,
        state: GalleryState,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        release_thumbnails(state.items, window, cx);
        self.session.resume();
        if matches!(self.session.state(), SessionState::Saved { .. }) {
            if let Err(err) = self.session.start() {
                log::warn!("{err}");
            }
        }
        self.canvas_dirty = true;
    }
}

fn release_thumbnails(items: Vec<GalleryItem>, window: &mut Window, cx: &mut Context<'_, AppView>) {
    for image in items.into_iter().filter_map(|item| item.thumbnail) {
        cx.drop_image(image, Some(window));
    }
}

fn describe(record: &DrawingRecord) -> String {
    format!(
        "{} · {} · {:.0} px",
        record.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        record.color.name(),
        record.stroke_width.get()
    )
}

fn image_path(url: &str) -> Option<PathBuf> {
    url.strip_prefix("file://").map(PathBuf::from)
}

fn load_thumbnail(url: &str) -> Option<(Vec<u8>, u32, u32)> {
    let path = image_path(url)?;
    let decoded = match image::open(&path) {
        Ok(decoded) => decoded.to_rgba8(),
        Err(err) => {
            log::warn!("failed to read drawing {}: {err}", path.display());
            return None;
        }
    };

    let (width, height) = decoded.dimensions();
    let scale = (THUMBNAIL_SIZE as f32 / width.max(height).max(1) as f32).min(1.0);
    let (tw, th) = (
        ((width as f32 * scale).round() as u32).max(1),
        ((height as f32 * scale).round() as u32).max(1),
    );
    let thumbnail = imageops::thumbnail(&decoded, tw, th);
    Some((thumbnail.into_raw(), tw, th))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::{DrawColor, StrokeWidth};

    #[test]
    fn only_file_urls_have_local_paths() {
        assert_eq!(
            image_path("file:///tmp/drawings/a.png"),
            Some(PathBuf::from("/tmp/drawings/a.png"))
        );
        assert_eq!(image_path("memory://abc"), None);
    }

    #[test]
    fn description_names_color_and_width() {
        let record = DrawingRecord {
            id: "a".to_string(),
            owner_id: "u".to_string(),
            image_url: String::new(),
            color: DrawColor::Green,
            stroke_width: StrokeWidth::new(12.0),
            created_at: Utc::now(),
        };
        let text = describe(&record);
        assert!(text.contains(DrawColor::Green.name()));
        assert!(text.ends_with("12 px"));
    }

    #[test]
    fn thumbnail_keeps_aspect_ratio() {
        let dir = std::env::temp_dir().join(format!("air-canvas-thumb-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("wide.png");
        image::RgbaImage::from_pixel(400, 100, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let (rgba, w, h) = load_thumbnail(&format!("file://{}", path.display())).unwrap();
        assert_eq!((w, h), (THUMBNAIL_SIZE, 50));
        assert_eq!(rgba.len(), (w * h * 4) as usize);
        assert_eq!(&rgba[..4], &[10, 20, 30, 255]);

        assert!(load_thumbnail("file:///definitely/not/here.png").is_none());
        let _ = std::fs::remove_dir_all(dir);
    }
}
