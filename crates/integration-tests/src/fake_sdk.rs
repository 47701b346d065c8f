//! Scriptable stand-in for the browser-side LIFF SDK.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use bakery_points_storefront::liff::{LiffError, LiffInitConfig, LiffSdk, LineMessage};
use bakery_points_storefront::models::LineProfile;

use crate::line_user;

/// A LIFF SDK whose behaviour is fixed at construction and whose calls are counted.
pub struct FakeSdk {
    profile: LineProfile,
    logged_in: bool,
    in_client: bool,
    fail_init: bool,
    fail_send: bool,
    ready: AtomicBool,
    init_calls: AtomicUsize,
    sends: AtomicUsize,
    closes: AtomicUsize,
}

impl FakeSdk {
    fn new(user_id: &str, logged_in: bool) -> Self {
        Self {
            profile: LineProfile {
                user_id: line_user(user_id),
                display_name: "小明".to_string(),
                picture_url: None,
                status_message: None,
                email: None,
            },
            logged_in,
            in_client: false,
            fail_init: false,
            fail_send: false,
            ready: AtomicBool::new(false),
            init_calls: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    /// An SDK that logs `user_id` in on `init`.
    #[must_use]
    pub fn logged_in(user_id: &str) -> Self {
        Self::new(user_id, true)
    }

    /// An SDK with nobody logged in.
    #[must_use]
    pub fn logged_out() -> Self {
        Self::new("U0", false)
    }

    /// Pretend to run inside the LINE in-app browser.
    #[must_use]
    pub const fn in_client(mut self) -> Self {
        self.in_client = true;
        self
    }

    /// Make `init` reject.
    #[must_use]
    pub const fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Make `send_messages` reject.
    #[must_use]
    pub const fn failing_send(mut self) -> Self {
        self.fail_send = true;
        self
    }

    /// Report ready before anyone calls `init`.
    #[must_use]
    pub fn already_ready(self) -> Self {
        self.ready.store(true, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiffSdk for FakeSdk {
    async fn init(&self, _config: &LiffInitConfig) -> Result<(), LiffError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        // Let a concurrent bootstrap attempt run into the guard.
        tokio::task::yield_now().await;
        if self.fail_init {
            return Err(LiffError::Init("sdk.js failed to load".to_string()));
        }
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn is_logged_in(&self) -> bool {
        self.is_ready() && self.logged_in
    }

    fn is_in_client(&self) -> bool {
        self.in_client
    }

    async fn login(&self) -> Result<(), LiffError> {
        Ok(())
    }

    async fn logout(&self) -> Result<(), LiffError> {
        Ok(())
    }

    async fn get_profile(&self) -> Result<LineProfile, LiffError> {
        if self.is_logged_in() {
            Ok(self.profile.clone())
        } else {
            Err(LiffError::NotLoggedIn)
        }
    }

    async fn send_messages(&self, _messages: &[LineMessage]) -> Result<(), LiffError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.fail_send {
            return Err(LiffError::Api {
                status: 400,
                message: "The request was not sent from the LINE chat".to_string(),
            });
        }
        Ok(())
    }

    async fn close_window(&self) -> Result<(), LiffError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
