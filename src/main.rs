#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod canvas;
mod gateway;
mod model_download;
mod pipeline;
mod session;
mod settings;
mod types;
mod ui;

use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::bounded;
use gateway::{DrawingGateway, GatewayError, LocalGateway, UserAccount};
use gpui::Application;
use settings::Settings;

/// Local profiles are not password protected; this only satisfies the
/// gateway's credential rules.
const LOCAL_PROFILE_PASSPHRASE: &str = "air-canvas-local";

fn main() -> Result<()> {
    env_logger::init();

    let settings = Settings::load();
    let gateway = LocalGateway::open(&settings.data_dir)
        .with_context(|| format!("failed to open drawing store {}", settings.data_dir.display()))?;
    let account = sign_in_profile(&gateway, &settings.profile_email)?;
    log::info!("drawing as {}", account.email);
    let gateway: Arc<dyn DrawingGateway> = Arc::new(gateway);

    let (preview_tx, preview_rx) = bounded(2);
    let (detector_frame_tx, detector_frame_rx) = bounded(1);
    let (detector_tx, detector_rx) = bounded(16);
    let channels = ui::PipelineChannels {
        preview_rx,
        preview_tx,
        detector_frame_rx,
        detector_frame_tx,
        detector_rx,
        detector_tx,
    };

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, settings, gateway, channels) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}

/// Signs into the configured local profile, creating it on first run.
fn sign_in_profile(gateway: &dyn DrawingGateway, email: &str) -> Result<UserAccount> {
    match gateway.sign_in(email, LOCAL_PROFILE_PASSPHRASE) {
        Ok(account) => Ok(account),
        Err(GatewayError::InvalidCredentials) => gateway
            .sign_up(email, LOCAL_PROFILE_PASSPHRASE)
            .with_context(|| format!("failed to create local profile {email}")),
        Err(err) => Err(err).with_context(|| format!("failed to sign in as {email}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::MemoryGateway;

    #[test]
    fn first_run_creates_the_profile_then_reuses_it() {
        let gateway = MemoryGateway::default();
        let created = sign_in_profile(&gateway, "me@example.com").unwrap();

        gateway.sign_out();
        let again = sign_in_profile(&gateway, "me@example.com").unwrap();
        assert_eq!(again, created);
    }

    #[test]
    fn malformed_profile_email_is_rejected() {
        let gateway = MemoryGateway::default();
        assert!(sign_in_profile(&gateway, "not-an-email").is_err());
    }
}
