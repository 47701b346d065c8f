//! Points / virtual card purchase flow.
//!
//! A purchase runs strictly in order: in-flight check, confirmation, identity
//! resolution, submission, then balance and history refresh. The balance shown
//! afterwards is always the one the backend returns; it is never computed
//! locally.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{info, instrument, warn};

use bakery_points_core::{LineUserId, PaymentMethod, Price, UserId, VirtualCardProductId};

use super::confirmation::{ConfirmationKind, ConfirmationParams};
use super::session::{IdentityError, ResolvedIdentity, SessionContext};
use crate::backend::{BackendApi, BackendError, PurchaseSubmission};
use crate::liff::PurchaseReceipt;
use crate::models::{
    Cart, PointsBalance, PointsTransaction, PurchaseRecord, VirtualCardProduct,
};

/// Shown when a product is missing from the catalog or no longer sold.
pub const UNAVAILABLE_MESSAGE: &str = "此商品目前無法購買";

/// Shown when a checkout is attempted with an empty cart.
pub const EMPTY_CART_MESSAGE: &str = "購物車是空的";

const CHECKOUT_NOTE: &str = "購物車結帳";

/// What is currently being purchased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "productId", rename_all = "camelCase")]
pub enum PurchaseMarker {
    Card(VirtualCardProductId),
    Checkout,
}

/// A single virtual card purchase.
#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    pub product_id: VirtualCardProductId,
    pub payment_method: PaymentMethod,
    /// The user explicitly confirmed the real-money charge.
    pub confirmed: bool,
    pub user_agent: String,
    pub notes: String,
}

/// Terminal result of [`PurchaseFlow::purchase`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum PurchaseOutcome {
    #[serde(rename_all = "camelCase")]
    Completed {
        message: Option<String>,
        order_number: Option<String>,
        /// Fresh balance, `None` if the refresh failed.
        balance: Option<PointsBalance>,
        history: Vec<PurchaseRecord>,
        /// Set when the post-purchase refresh failed.
        refresh_error: Option<String>,
        #[serde(skip)]
        receipt: Option<PurchaseReceipt>,
    },
    #[serde(rename_all = "camelCase")]
    Busy { in_flight: PurchaseMarker },
    NotConfirmed,
    LoginRequired { message: String },
    Rejected { message: String },
}

impl PurchaseOutcome {
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Terminal result of [`PurchaseFlow::checkout`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum CheckoutOutcome {
    #[serde(rename_all = "camelCase")]
    Completed {
        confirmation: ConfirmationParams,
        redirect: String,
    },
    /// The backend accepted some units, then rejected one.
    ///
    /// The accepted units are charged; `purchased` lists them so they can be
    /// taken out of the cart and never submitted again.
    #[serde(rename_all = "camelCase")]
    PartiallyCompleted {
        confirmation: ConfirmationParams,
        redirect: String,
        purchased: Vec<PurchasedLine>,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Busy { in_flight: PurchaseMarker },
    LoginRequired { message: String },
    Rejected { message: String },
}

/// Units of one product the backend accepted during a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasedLine {
    pub product_id: VirtualCardProductId,
    pub quantity: u32,
}

/// Running totals of a checkout.
#[derive(Debug)]
struct CheckoutTally {
    payment_method: PaymentMethod,
    total_amount: Price,
    total_points: i64,
    item_count: u32,
    order_number: Option<String>,
    purchased: Vec<PurchasedLine>,
}

impl CheckoutTally {
    const fn new(payment_method: PaymentMethod) -> Self {
        Self {
            payment_method,
            total_amount: Price::ZERO,
            total_points: 0,
            item_count: 0,
            order_number: None,
            purchased: Vec::new(),
        }
    }

    fn accept(&mut self, card: &VirtualCardProduct, order_number: Option<String>) {
        if order_number.is_some() {
            self.order_number = order_number;
        }
        self.total_amount = self.total_amount + card.price;
        self.total_points += card.points_value;
        self.item_count += 1;
        match self.purchased.iter_mut().find(|line| line.product_id == card.id) {
            Some(line) => line.quantity += 1,
            None => self.purchased.push(PurchasedLine {
                product_id: card.id,
                quantity: 1,
            }),
        }
    }

    fn confirmation(&self) -> ConfirmationParams {
        ConfirmationParams {
            kind: ConfirmationKind::VirtualCard,
            total_amount: self.total_amount,
            total_points: self.total_points,
            item_count: self.item_count,
            payment_method: Some(self.payment_method),
            order_number: self.order_number.clone(),
        }
    }
}

/// Releases the in-flight marker when dropped.
struct InFlight<'a> {
    slot: &'a Mutex<Option<PurchaseMarker>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Purchase flow for one user.
///
/// Holds the single in-flight marker: while any purchase or checkout is
/// outstanding, every other purchase attempt returns `Busy` without a network
/// call.
pub struct PurchaseFlow {
    backend: Arc<dyn BackendApi>,
    history_limit: u32,
    in_flight: Mutex<Option<PurchaseMarker>>,
}

impl std::fmt::Debug for PurchaseFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurchaseFlow")
            .field("history_limit", &self.history_limit)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl PurchaseFlow {
    #[must_use]
    pub fn new(backend: Arc<dyn BackendApi>, history_limit: u32) -> Self {
        Self {
            backend,
            history_limit,
            in_flight: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<PurchaseMarker>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The purchase currently outstanding, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<PurchaseMarker> {
        *self.slot()
    }

    fn try_begin(&self, marker: PurchaseMarker) -> Result<InFlight<'_>, PurchaseMarker> {
        let mut slot = self.slot();
        if let Some(current) = *slot {
            return Err(current);
        }
        *slot = Some(marker);
        Ok(InFlight {
            slot: &self.in_flight,
        })
    }

    /// Virtual card catalog. Does not require login.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn load_catalog(&self) -> Result<Vec<VirtualCardProduct>, BackendError> {
        self.backend.virtual_cards().await
    }

    /// Fresh balance from the backend.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn refresh_balance(&self, user_id: UserId) -> Result<PointsBalance, BackendError> {
        self.backend.points_balance(user_id).await
    }

    /// Most recent purchases.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn purchase_history(
        &self,
        user_id: UserId,
        limit: Option<u32>,
    ) -> Result<Vec<PurchaseRecord>, BackendError> {
        self.backend
            .purchase_history(user_id, limit.unwrap_or(self.history_limit))
            .await
    }

    /// Most recent points ledger entries.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn transactions(
        &self,
        line_user_id: &LineUserId,
        limit: Option<u32>,
    ) -> Result<Vec<PointsTransaction>, BackendError> {
        self.backend
            .transactions(line_user_id, limit.unwrap_or(self.history_limit))
            .await
    }

    /// Buy one virtual card.
    #[instrument(
        skip(self, session, request),
        fields(product_id = %request.product_id, payment_method = %request.payment_method)
    )]
    pub async fn purchase(
        &self,
        session: &SessionContext,
        request: PurchaseRequest,
    ) -> PurchaseOutcome {
        let _in_flight = match self.try_begin(PurchaseMarker::Card(request.product_id)) {
            Ok(guard) => guard,
            Err(in_flight) => {
                info!(?in_flight, "Purchase already in flight");
                return PurchaseOutcome::Busy { in_flight };
            }
        };

        if !request.confirmed {
            return PurchaseOutcome::NotConfirmed;
        }

        let identity = match session.resolve_identity().await {
            Ok(identity) => identity,
            Err(e) => return identity_outcome(&e),
        };

        let submission = PurchaseSubmission {
            line_user_id: identity.line_user_id.clone(),
            virtual_card_product_id: request.product_id,
            payment_method: request.payment_method,
            user_agent: request.user_agent,
            notes: request.notes,
        };
        let ack = match self.backend.purchase_virtual_card(&submission).await {
            Ok(ack) => ack,
            Err(e) => {
                warn!(error = %e, "Purchase rejected");
                return PurchaseOutcome::Rejected {
                    message: e.user_message(),
                };
            }
        };
        info!(order_number = ?ack.order_number, "Purchase completed");

        let (balance, history, catalog) = tokio::join!(
            self.refresh_balance(identity.user_id),
            self.purchase_history(identity.user_id, None),
            self.load_catalog(),
        );

        let mut refresh_error = None;
        let balance = balance
            .inspect_err(|e| {
                warn!(error = %e, "Balance refresh failed after purchase");
                refresh_error = Some(e.user_message());
            })
            .ok();
        let history = history
            .inspect_err(|e| warn!(error = %e, "History refresh failed after purchase"))
            .unwrap_or_default();

        let receipt = match catalog {
            Ok(catalog) => catalog
                .into_iter()
                .find(|card| card.id == request.product_id)
                .map(|card| PurchaseReceipt {
                    product_name: card.name,
                    amount: card.price,
                    points_added: card.points_value,
                    balance: balance.map(|b| b.available_points),
                    payment_method: request.payment_method,
                    order_number: ack.order_number.clone(),
                }),
            Err(e) => {
                warn!(error = %e, "Catalog refresh failed after purchase");
                None
            }
        };
        if receipt.is_none() {
            warn!("No receipt for purchase, LINE notification will be skipped");
        }

        PurchaseOutcome::Completed {
            message: ack.message,
            order_number: ack.order_number,
            balance,
            history,
            refresh_error,
            receipt,
        }
    }

    /// Buy every line of a cart and return the confirmation totals.
    ///
    /// Prices are re-read from the catalog; the cart's own prices are only
    /// a hint. Lines are submitted one unit at a time and the first rejection
    /// stops the checkout; units accepted before it are reported as
    /// `PartiallyCompleted`.
    #[instrument(skip(self, session, cart, user_agent), fields(lines = cart.items.len()))]
    pub async fn checkout(
        &self,
        session: &SessionContext,
        cart: &Cart,
        payment_method: PaymentMethod,
        user_agent: &str,
    ) -> CheckoutOutcome {
        let _in_flight = match self.try_begin(PurchaseMarker::Checkout) {
            Ok(guard) => guard,
            Err(in_flight) => return CheckoutOutcome::Busy { in_flight },
        };

        if cart.is_empty() {
            return CheckoutOutcome::Rejected {
                message: EMPTY_CART_MESSAGE.to_string(),
            };
        }

        let (catalog, identity) = tokio::join!(self.load_catalog(), session.resolve_identity());
        let identity: ResolvedIdentity = match identity {
            Ok(identity) => identity,
            Err(e @ (IdentityError::NotLoggedIn | IdentityError::CustomerNotFound(_))) => {
                return CheckoutOutcome::LoginRequired {
                    message: e.user_message(),
                };
            }
            Err(e) => {
                return CheckoutOutcome::Rejected {
                    message: e.user_message(),
                };
            }
        };
        let catalog = match catalog {
            Ok(catalog) => catalog,
            Err(e) => {
                return CheckoutOutcome::Rejected {
                    message: e.user_message(),
                };
            }
        };

        let mut lines = Vec::with_capacity(cart.items.len());
        for item in &cart.items {
            match catalog.iter().find(|card| card.id == item.product_id) {
                Some(card) if card.is_purchasable() => lines.push((card, item.quantity)),
                _ => {
                    warn!(product_id = %item.product_id, "Cart item no longer sold");
                    return CheckoutOutcome::Rejected {
                        message: format!("{UNAVAILABLE_MESSAGE}：{}", item.name),
                    };
                }
            }
        }

        let mut tally = CheckoutTally::new(payment_method);
        for (card, quantity) in lines {
            for _ in 0..quantity {
                let submission = PurchaseSubmission {
                    line_user_id: identity.line_user_id.clone(),
                    virtual_card_product_id: card.id,
                    payment_method,
                    user_agent: user_agent.to_string(),
                    notes: CHECKOUT_NOTE.to_string(),
                };
                match self.backend.purchase_virtual_card(&submission).await {
                    Ok(ack) => tally.accept(card, ack.order_number),
                    Err(e) if tally.item_count == 0 => {
                        warn!(error = %e, "Checkout rejected by backend");
                        return CheckoutOutcome::Rejected {
                            message: e.user_message(),
                        };
                    }
                    Err(e) => {
                        warn!(
                            error = %e,
                            item_count = tally.item_count,
                            "Checkout stopped after accepted units"
                        );
                        let confirmation = tally.confirmation();
                        return CheckoutOutcome::PartiallyCompleted {
                            redirect: confirmation.redirect_path(),
                            confirmation,
                            purchased: tally.purchased,
                            message: e.user_message(),
                        };
                    }
                }
            }
        }

        let confirmation = tally.confirmation();
        info!(
            item_count = confirmation.item_count,
            total_points = confirmation.total_points,
            "Checkout completed"
        );
        CheckoutOutcome::Completed {
            redirect: confirmation.redirect_path(),
            confirmation,
        }
    }
}

fn identity_outcome(error: &IdentityError) -> PurchaseOutcome {
    match error {
        IdentityError::NotLoggedIn | IdentityError::CustomerNotFound(_) => {
            PurchaseOutcome::LoginRequired {
                message: error.user_message(),
            }
        }
        IdentityError::Backend(_) => PurchaseOutcome::Rejected {
            message: error.user_message(),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::backend::{CustomerLookup, PurchaseAck};
    use crate::liff::LiffInitConfig;
    use crate::models::CustomerRecord;
    use crate::services::session::tests::{StubSdk, customer};
    use crate::storage::MemoryStore;
    use bakery_points_core::VirtualCardStatus;

    /// Backend whose purchase call can be held open.
    struct PointsBackend {
        balance: i64,
        reject: Option<String>,
        /// Accept this many purchases, then reject the rest.
        accept_limit: Option<usize>,
        fail_balance: bool,
        purchases: AtomicUsize,
        balance_calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
        entered: Arc<Notify>,
    }

    impl PointsBackend {
        fn new(balance: i64) -> Self {
            Self {
                balance,
                reject: None,
                accept_limit: None,
                fail_balance: false,
                purchases: AtomicUsize::new(0),
                balance_calls: AtomicUsize::new(0),
                gate: None,
                entered: Arc::new(Notify::new()),
            }
        }
    }

    fn card(id: i64, status: VirtualCardStatus) -> VirtualCardProduct {
        VirtualCardProduct {
            id: VirtualCardProductId::new(id),
            name: format!("點數卡 {id}"),
            description: None,
            price: Price::from_dollars(1000),
            points_value: 1100,
            image_url: None,
            status,
        }
    }

    #[async_trait]
    impl BackendApi for PointsBackend {
        async fn resolve_customer(
            &self,
            _lookup: &CustomerLookup,
        ) -> Result<Option<CustomerRecord>, BackendError> {
            Ok(Some(customer(42)))
        }
        async fn points_balance(&self, _user_id: UserId) -> Result<PointsBalance, BackendError> {
            self.balance_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_balance {
                return Err(BackendError::Api {
                    status: 503,
                    message: None,
                });
            }
            Ok(PointsBalance {
                available_points: self.balance,
                total_earned: None,
                total_spent: None,
            })
        }
        async fn virtual_cards(&self) -> Result<Vec<VirtualCardProduct>, BackendError> {
            Ok(vec![
                card(7, VirtualCardStatus::Active),
                card(8, VirtualCardStatus::Inactive),
            ])
        }
        async fn purchase_virtual_card(
            &self,
            _submission: &PurchaseSubmission,
        ) -> Result<PurchaseAck, BackendError> {
            let accepted = self.purchases.fetch_add(1, Ordering::SeqCst);
            if self.accept_limit.is_some_and(|limit| accepted >= limit) {
                return Err(BackendError::Rejected(Some("餘額不足".to_string())));
            }
            if let Some(gate) = &self.gate {
                self.entered.notify_one();
                gate.notified().await;
            }
            match &self.reject {
                Some(message) => Err(BackendError::Rejected(Some(message.clone()))),
                None => Ok(PurchaseAck {
                    message: Some("購買成功".to_string()),
                    order_number: Some("VC-0001".to_string()),
                }),
            }
        }
        async fn purchase_history(
            &self,
            _user_id: UserId,
            _limit: u32,
        ) -> Result<Vec<PurchaseRecord>, BackendError> {
            Ok(Vec::new())
        }
        async fn transactions(
            &self,
            _line_user_id: &LineUserId,
            _limit: u32,
        ) -> Result<Vec<PointsTransaction>, BackendError> {
            Ok(Vec::new())
        }
    }

    async fn logged_in_session(backend: Arc<PointsBackend>) -> SessionContext {
        let session = SessionContext::new(
            LiffInitConfig {
                liff_id: "1657000000-AbCdEf12".to_string(),
                with_login_on_external_browser: true,
            },
            backend,
            Arc::new(MemoryStore::new()),
        );
        session.start(Some(Arc::new(StubSdk::logged_in()))).await;
        session
    }

    fn request(product_id: i64) -> PurchaseRequest {
        PurchaseRequest {
            product_id: VirtualCardProductId::new(product_id),
            payment_method: PaymentMethod::LinePay,
            confirmed: true,
            user_agent: "test-agent".to_string(),
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn test_purchase_refetches_balance() {
        let backend = Arc::new(PointsBackend::new(2450));
        let session = logged_in_session(Arc::clone(&backend)).await;
        let flow = PurchaseFlow::new(backend.clone(), 10);

        let outcome = flow.purchase(&session, request(7)).await;
        let PurchaseOutcome::Completed {
            balance, receipt, ..
        } = outcome
        else {
            panic!("expected completed purchase, got {outcome:?}");
        };
        assert_eq!(balance.unwrap().available_points, 2450);
        assert_eq!(receipt.unwrap().points_added, 1100);
        assert_eq!(backend.balance_calls.load(Ordering::SeqCst), 1);
        assert_eq!(flow.in_flight(), None);
    }

    #[tokio::test]
    async fn test_unconfirmed_purchase_is_not_sent() {
        let backend = Arc::new(PointsBackend::new(0));
        let session = logged_in_session(Arc::clone(&backend)).await;
        let flow = PurchaseFlow::new(backend.clone(), 10);

        let outcome = flow
            .purchase(
                &session,
                PurchaseRequest {
                    confirmed: false,
                    ..request(7)
                },
            )
            .await;
        assert!(matches!(outcome, PurchaseOutcome::NotConfirmed));
        assert_eq!(backend.purchases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejection_message_is_verbatim() {
        let backend = Arc::new(PointsBackend {
            reject: Some("信用卡授權失敗".to_string()),
            ..PointsBackend::new(0)
        });
        let session = logged_in_session(Arc::clone(&backend)).await;
        let flow = PurchaseFlow::new(backend.clone(), 10);

        let outcome = flow.purchase(&session, request(7)).await;
        assert!(
            matches!(outcome, PurchaseOutcome::Rejected { ref message } if message == "信用卡授權失敗")
        );
        assert_eq!(backend.balance_calls.load(Ordering::SeqCst), 0);
        assert_eq!(flow.in_flight(), None);
    }

    #[tokio::test]
    async fn test_second_purchase_is_busy_while_first_in_flight() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(PointsBackend {
            gate: Some(Arc::clone(&gate)),
            ..PointsBackend::new(100)
        });
        let session = Arc::new(logged_in_session(Arc::clone(&backend)).await);
        let flow = Arc::new(PurchaseFlow::new(backend.clone(), 10));

        let first = {
            let (flow, session) = (Arc::clone(&flow), Arc::clone(&session));
            tokio::spawn(async move { flow.purchase(&session, request(7)).await })
        };
        backend.entered.notified().await;

        let same = flow.purchase(&session, request(7)).await;
        let other = flow.purchase(&session, request(9)).await;
        assert!(matches!(same, PurchaseOutcome::Busy { .. }));
        assert!(matches!(
            other,
            PurchaseOutcome::Busy {
                in_flight: PurchaseMarker::Card(id)
            } if id == VirtualCardProductId::new(7)
        ));

        gate.notify_one();
        assert!(first.await.unwrap().is_completed());
        assert_eq!(backend.purchases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_checkout_uses_catalog_prices() {
        let backend = Arc::new(PointsBackend::new(0));
        let session = logged_in_session(Arc::clone(&backend)).await;
        let flow = PurchaseFlow::new(backend.clone(), 10);

        let mut cart = Cart::default();
        let mut stale = card(7, VirtualCardStatus::Active);
        stale.price = Price::from_dollars(1);
        cart.add(&stale, 2).unwrap();

        let outcome = flow
            .checkout(&session, &cart, PaymentMethod::LinePay, "test-agent")
            .await;
        let CheckoutOutcome::Completed { confirmation, redirect } = outcome else {
            panic!("expected completed checkout, got {outcome:?}");
        };
        assert_eq!(confirmation.total_amount, Price::from_dollars(2000));
        assert_eq!(confirmation.total_points, 2200);
        assert_eq!(confirmation.item_count, 2);
        assert!(redirect.contains("totalAmount=2000"));
        assert_eq!(backend.purchases.load(Ordering::SeqCst), 2);
        assert_eq!(backend.balance_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_checkout_rejects_unavailable_item() {
        let backend = Arc::new(PointsBackend::new(0));
        let session = logged_in_session(Arc::clone(&backend)).await;
        let flow = PurchaseFlow::new(backend.clone(), 10);

        let cart = Cart {
            items: vec![crate::models::CartItem {
                product_id: VirtualCardProductId::new(8),
                name: "點數卡 8".to_string(),
                unit_price: Price::from_dollars(1000),
                points_value: 1100,
                quantity: 1,
            }],
        };
        let outcome = flow
            .checkout(&session, &cart, PaymentMethod::LinePay, "test-agent")
            .await;
        assert!(matches!(outcome, CheckoutOutcome::Rejected { .. }));
        assert_eq!(backend.purchases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_receipt_survives_failed_balance_refresh() {
        let backend = Arc::new(PointsBackend {
            fail_balance: true,
            ..PointsBackend::new(0)
        });
        let session = logged_in_session(Arc::clone(&backend)).await;
        let flow = PurchaseFlow::new(backend.clone(), 10);

        let outcome = flow.purchase(&session, request(7)).await;
        let PurchaseOutcome::Completed {
            balance,
            refresh_error,
            receipt,
            ..
        } = outcome
        else {
            panic!("expected completed purchase, got {outcome:?}");
        };
        assert!(balance.is_none());
        assert!(refresh_error.is_some());
        let receipt = receipt.unwrap();
        assert_eq!(receipt.points_added, 1100);
        assert_eq!(receipt.balance, None);
    }

    #[tokio::test]
    async fn test_checkout_rejected_midway_reports_accepted_units() {
        let backend = Arc::new(PointsBackend {
            accept_limit: Some(1),
            ..PointsBackend::new(0)
        });
        let session = logged_in_session(Arc::clone(&backend)).await;
        let flow = PurchaseFlow::new(backend.clone(), 10);

        let mut cart = Cart::default();
        cart.add(&card(7, VirtualCardStatus::Active), 2).unwrap();

        let outcome = flow
            .checkout(&session, &cart, PaymentMethod::LinePay, "test-agent")
            .await;
        let CheckoutOutcome::PartiallyCompleted {
            confirmation,
            purchased,
            message,
            ..
        } = outcome
        else {
            panic!("expected partially completed checkout, got {outcome:?}");
        };
        assert_eq!(message, "餘額不足");
        assert_eq!(confirmation.item_count, 1);
        assert_eq!(confirmation.total_amount, Price::from_dollars(1000));
        assert_eq!(confirmation.order_number.as_deref(), Some("VC-0001"));
        assert_eq!(
            purchased,
            vec![PurchasedLine {
                product_id: VirtualCardProductId::new(7),
                quantity: 1,
            }]
        );
        assert_eq!(backend.purchases.load(Ordering::SeqCst), 2);
        assert_eq!(flow.in_flight(), None);
    }

    #[tokio::test]
    async fn test_checkout_rejected_on_first_unit_charges_nothing() {
        let backend = Arc::new(PointsBackend {
            accept_limit: Some(0),
            ..PointsBackend::new(0)
        });
        let session = logged_in_session(Arc::clone(&backend)).await;
        let flow = PurchaseFlow::new(backend.clone(), 10);

        let mut cart = Cart::default();
        cart.add(&card(7, VirtualCardStatus::Active), 2).unwrap();

        let outcome = flow
            .checkout(&session, &cart, PaymentMethod::LinePay, "test-agent")
            .await;
        assert!(
            matches!(outcome, CheckoutOutcome::Rejected { ref message } if message == "餘額不足")
        );
        assert_eq!(backend.purchases.load(Ordering::SeqCst), 1);
    }
}
