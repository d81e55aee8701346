use std::sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
};

use chrono::Utc;
use uuid::Uuid;

use super::{
    DrawingGateway, DrawingImage, DrawingRecord, GatewayError, GatewayResult, UserAccount,
    sort_newest_first, validate_credentials,
};
use crate::types::{DrawColor, StrokeWidth};

/// In-process gateway for tests. `fail_saves` simulates an unreachable backend.
#[derive(Default)]
pub struct MemoryGateway {
    accounts: Mutex<Vec<UserAccount>>,
    current: Mutex<Option<UserAccount>>,
    records: Mutex<Vec<DrawingRecord>>,
    pub fail_saves: AtomicBool,
}

impl MemoryGateway {
    pub fn signed_in() -> Self {
        let gateway = Self::default();
        let _ = gateway.sign_up("tester@example.com", "password");
        gateway
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl DrawingGateway for MemoryGateway {
    fn sign_in(&self, email: &str, password: &str) -> GatewayResult<UserAccount> {
        validate_credentials(email, password)?;
        let account = self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.email == email)
            .cloned()
            .ok_or(GatewayError::InvalidCredentials)?;
        *self.current.lock().unwrap() = Some(account.clone());
        Ok(account)
    }

    fn sign_up(&self, email: &str, password: &str) -> GatewayResult<UserAccount> {
        validate_credentials(email, password)?;
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.iter().any(|a| a.email == email) {
            return Err(GatewayError::AccountExists(email.to_string()));
        }
        let account = UserAccount {
            uid: Uuid::new_v4().to_string(),
            email: email.to_string(),
        };
        accounts.push(account.clone());
        *self.current.lock().unwrap() = Some(account.clone());
        Ok(account)
    }

    fn sign_out(&self) {
        *self.current.lock().unwrap() = None;
    }

    fn current_user(&self) -> Option<UserAccount> {
        self.current.lock().unwrap().clone()
    }

    fn save(
        &self,
        _image: &DrawingImage,
        color: DrawColor,
        stroke_width: StrokeWidth,
    ) -> GatewayResult<String> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(GatewayError::Storage("simulated network error".to_string()));
        }
        let user = self.current_user().ok_or(GatewayError::NotAuthenticated)?;
        let id = Uuid::new_v4().to_string();
        self.records.lock().unwrap().push(DrawingRecord {
            id: id.clone(),
            owner_id: user.uid,
            image_url: format!("memory://{id}"),
            color,
            stroke_width,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    fn list(&self, owner: &str) -> GatewayResult<Vec<DrawingRecord>> {
        let mut records: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.owner_id == owner)
            .cloned()
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    fn delete(&self, id: &str) -> GatewayResult<()> {
        let mut records = self.records.lock().unwrap();
        let position = records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        records.remove(position);
        Ok(())
    }
}
