use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use chrono::Utc;
use image::{ImageFormat, RgbaImage};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use super::{
    DrawingGateway, DrawingImage, DrawingRecord, GatewayError, GatewayResult, UserAccount,
    sort_newest_first, validate_credentials,
};
use crate::types::{DrawColor, StrokeWidth};

const ACCOUNTS_FILE: &str = "accounts.json";
const RECORDS_FILE: &str = "drawings.json";
const IMAGES_DIR: &str = "drawings";

/// Keeps drawings on disk under `root`:
///
/// ```text
/// root/accounts.json            known local profiles
/// root/drawings.json            drawing metadata
/// root/drawings/<uid>/<id>.png  drawing images
/// ```
///
/// Profiles belong to whoever owns the OS account, so passwords are only
/// checked for shape and never stored.
pub struct LocalGateway {
    root: PathBuf,
    state: Mutex<Option<UserAccount>>,
}

impl LocalGateway {
    pub fn open(root: impl Into<PathBuf>) -> GatewayResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(IMAGES_DIR))?;
        log::info!("local drawing store at {}", root.display());

        Ok(Self {
            root,
            state: Mutex::new(None),
        })
    }

    fn session(&self) -> MutexGuard<'_, Option<UserAccount>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn require_user(&self) -> GatewayResult<UserAccount> {
        self.session().clone().ok_or(GatewayError::NotAuthenticated)
    }

    fn image_path(&self, owner: &str, id: &str) -> PathBuf {
        self.root.join(IMAGES_DIR).join(owner).join(format!("{id}.png"))
    }

    fn accounts(&self) -> GatewayResult<Vec<UserAccount>> {
        read_json(&self.root.join(ACCOUNTS_FILE))
    }

    fn records(&self) -> GatewayResult<Vec<DrawingRecord>> {
        read_json(&self.root.join(RECORDS_FILE))
    }
}

impl DrawingGateway for LocalGateway {
    fn sign_in(&self, email: &str, password: &str) -> GatewayResult<UserAccount> {
        validate_credentials(email, password)?;
        let mut session = self.session();
        let account = self
            .accounts()?
            .into_iter()
            .find(|account| account.email.eq_ignore_ascii_case(email.trim()))
            .ok_or(GatewayError::InvalidCredentials)?;

        log::info!("signed in as {}", account.email);
        *session = Some(account.clone());
        Ok(account)
    }

    fn sign_up(&self, email: &str, password: &str) -> GatewayResult<UserAccount> {
        validate_credentials(email, password)?;
        let mut session = self.session();
        let mut accounts = self.accounts()?;
        let email = email.trim();
        if accounts.iter().any(|a| a.email.eq_ignore_ascii_case(email)) {
            return Err(GatewayError::AccountExists(email.to_string()));
        }

        let account = UserAccount {
            uid: Uuid::new_v4().to_string(),
            email: email.to_string(),
        };
        accounts.push(account.clone());
        write_json(&self.root.join(ACCOUNTS_FILE), &accounts)?;

        log::info!("created local profile {}", account.email);
        *session = Some(account.clone());
        Ok(account)
    }

    fn sign_out(&self) {
        *self.session() = None;
    }

    fn current_user(&self) -> Option<UserAccount> {
        self.session().clone()
    }

    fn save(
        &self,
        image: &DrawingImage,
        color: DrawColor,
        stroke_width: StrokeWidth,
    ) -> GatewayResult<String> {
        // Hold the session lock so concurrent saves don't lose each other's records.
        let session = self.session();
        let user = session.clone().ok_or(GatewayError::NotAuthenticated)?;
        let buffer = RgbaImage::from_raw(image.width, image.height, image.rgba.clone())
            .ok_or_else(|| {
                GatewayError::Storage(format!(
                    "image buffer does not match {}x{}",
                    image.width, image.height
                ))
            })?;
        // Read metadata before touching the image directory, so a bad
        // metadata file leaves nothing behind.
        let mut records = self.records()?;

        let id = Uuid::new_v4().to_string();
        let path = self.image_path(&user.uid, &id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        records.push(DrawingRecord {
            id: id.clone(),
            owner_id: user.uid,
            image_url: format!("file://{}", path.display()),
            color,
            stroke_width,
            created_at: Utc::now(),
        });

        let written = buffer
            .save_with_format(&path, ImageFormat::Png)
            .map_err(GatewayError::from)
            .and_then(|()| write_json(&self.root.join(RECORDS_FILE), &records));
        if let Err(err) = written {
            let _ = fs::remove_file(&path);
            return Err(err);
        }
        drop(session);

        log::info!("saved drawing {id} to {}", path.display());
        Ok(id)
    }

    fn list(&self, owner: &str) -> GatewayResult<Vec<DrawingRecord>> {
        let mut records: Vec<_> = self
            .records()?
            .into_iter()
            .filter(|record| record.owner_id == owner)
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    fn delete(&self, id: &str) -> GatewayResult<()> {
        let user = self.require_user()?;
        let _guard = self.session();
        let mut records = self.records()?;
        let position = records
            .iter()
            .position(|record| record.id == id && record.owner_id == user.uid)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;

        match fs::remove_file(self.image_path(&user.uid, id)) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("image for drawing {id} already missing");
            }
            Err(err) => return Err(err.into()),
        }

        records.remove(position);
        write_json(&self.root.join(RECORDS_FILE), &records)?;
        log::info!("deleted drawing {id}");
        Ok(())
    }
}

fn read_json<T: DeserializeOwned + Default>(path: &Path) -> GatewayResult<T> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(err) => Err(err.into()),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> GatewayResult<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    struct TempStore {
        root: PathBuf,
    }

    impl TempStore {
        fn new() -> Self {
            let root = std::env::temp_dir().join(format!("air-canvas-store-{}", Uuid::new_v4()));
            Self { root }
        }
    }

    impl Drop for TempStore {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    fn image() -> DrawingImage {
        DrawingImage {
            rgba: vec![255; 4 * 4 * 4],
            width: 4,
            height: 4,
        }
    }

    #[test]
    fn save_requires_sign_in() {
        let store = TempStore::new();
        let gateway = LocalGateway::open(&store.root).unwrap();

        let err = gateway
            .save(&image(), DrawColor::Red, StrokeWidth::default())
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotAuthenticated));
    }

    #[test]
    fn corrupt_metadata_leaves_no_image() {
        let store = TempStore::new();
        let gateway = LocalGateway::open(&store.root).unwrap();
        let user = gateway.sign_up("me@example.com", "hunter22").unwrap();
        fs::write(store.root.join(RECORDS_FILE), "{not json").unwrap();

        let err = gateway
            .save(&image(), DrawColor::Red, StrokeWidth::default())
            .unwrap_err();
        assert!(matches!(err, GatewayError::Serialization(_)));

        let owner_dir = store.root.join(IMAGES_DIR).join(&user.uid);
        let leftovers = fs::read_dir(&owner_dir)
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn sign_up_then_sign_in_across_instances() {
        let store = TempStore::new();
        let gateway = LocalGateway::open(&store.root).unwrap();
        let created = gateway.sign_up("me@example.com", "hunter22").unwrap();
        assert!(matches!(
            gateway.sign_up("ME@example.com", "hunter22"),
            Err(GatewayError::AccountExists(_))
        ));

        let reopened = LocalGateway::open(&store.root).unwrap();
        assert!(reopened.current_user().is_none());
        let signed_in = reopened.sign_in("me@example.com", "hunter22").unwrap();
        assert_eq!(signed_in, created);

        reopened.sign_out();
        assert!(reopened.current_user().is_none());
        assert!(matches!(
            reopened.sign_in("stranger@example.com", "hunter22"),
            Err(GatewayError::InvalidCredentials)
        ));
    }

    #[test]
    fn list_is_newest_first_and_scoped_to_owner() {
        let store = TempStore::new();
        let gateway = LocalGateway::open(&store.root).unwrap();
        let other = gateway.sign_up("other@example.com", "password").unwrap();
        gateway
            .save(&image(), DrawColor::Blue, StrokeWidth::default())
            .unwrap();

        let me = gateway.sign_up("me@example.com", "password").unwrap();
        let first = gateway
            .save(&image(), DrawColor::Red, StrokeWidth::new(4.0))
            .unwrap();
        thread::sleep(Duration::from_millis(5));
        let second = gateway
            .save(&image(), DrawColor::Green, StrokeWidth::new(12.0))
            .unwrap();

        let mine = gateway.list(&me.uid).unwrap();
        let ids: Vec<_> = mine.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![second, first]);
        assert_eq!(mine[0].color, DrawColor::Green);
        assert_eq!(mine[0].stroke_width.get(), 12.0);
        assert!(mine[0].image_url.starts_with("file://"));

        assert_eq!(gateway.list(&other.uid).unwrap().len(), 1);
    }

    #[test]
    fn delete_removes_image_and_metadata() {
        let store = TempStore::new();
        let gateway = LocalGateway::open(&store.root).unwrap();
        let me = gateway.sign_up("me@example.com", "password").unwrap();
        let id = gateway
            .save(&image(), DrawColor::Yellow, StrokeWidth::default())
            .unwrap();
        let path = gateway.image_path(&me.uid, &id);
        assert!(path.exists());

        gateway.delete(&id).unwrap();
        assert!(!path.exists());
        assert!(gateway.list(&me.uid).unwrap().is_empty());
        assert!(matches!(gateway.delete(&id), Err(GatewayError::NotFound(_))));
    }

    #[test]
    fn mismatched_buffer_is_a_storage_error() {
        let store = TempStore::new();
        let gateway = LocalGateway::open(&store.root).unwrap();
        gateway.sign_up("me@example.com", "password").unwrap();

        let bad = DrawingImage {
            rgba: vec![0; 3],
            width: 4,
            height: 4,
        };
        assert!(matches!(
            gateway.save(&bad, DrawColor::Red, StrokeWidth::default()),
            Err(GatewayError::Storage(_))
        ));
    }
}
