use crate::calc::{compute_totals, FiscalRules, PldAlerts};
use crate::db::Repository;
use crate::domain::{
    new_id, Actor, AddOnCosts, AuditKind, AuditRecord, ComplianceStatus, Notification,
    NotificationKind, PartyIdentity, RiskLevel, TimeMs, Transaction, TransactionStatus, Verdict,
};
use crate::notify::Outbox;
use crate::orchestration::error::GatewayError;
use crate::orchestration::model::{
    FundingReceipt, FundingReference, GlobalStats, HandoverReceipt, NewTransaction,
    TransactionView,
};
use crate::screening::{RiskScreeningService, ScreeningContext};
use crate::settlement::SettlementService;
use crate::theft::{sha256_hex, TheftVerificationService};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Log target for administrative overrides, kept apart from system
/// transitions.
pub const OVERRIDE_LOG_TARGET: &str = "escrow_gateway::override";

/// Drives a deal from creation to release, gating each step on compliance.
#[derive(Clone)]
pub struct TransactionOrchestrator {
    repo: Arc<Repository>,
    screening: RiskScreeningService,
    theft: TheftVerificationService,
    settlement: SettlementService,
    outbox: Outbox,
    rules: FiscalRules,
}

impl TransactionOrchestrator {
    pub fn new(
        repo: Arc<Repository>,
        screening: RiskScreeningService,
        theft: TheftVerificationService,
        settlement: SettlementService,
        outbox: Outbox,
        rules: FiscalRules,
    ) -> Self {
        Self {
            repo,
            screening,
            theft,
            settlement,
            outbox,
            rules,
        }
    }

    pub fn rules(&self) -> &FiscalRules {
        &self.rules
    }

    /// Open a transaction after screening the seller.
    ///
    /// Screening completes before anything is written; a blocked seller
    /// never gets a transaction row.
    pub async fn create_transaction(
        &self,
        new: NewTransaction,
    ) -> Result<Transaction, GatewayError> {
        validate_new_transaction(&new)?;

        let verdict = self
            .screening
            .screen(&new.seller, ScreeningContext::TransactionCreation)
            .await?;

        if verdict.is_blocked() {
            self.record_blocked_attempt(&new.seller, &verdict, None)
                .await?;
            return Err(GatewayError::ComplianceBlocked(format!(
                "seller matched {}",
                verdict.flags().join(", ")
            )));
        }

        let alerts = PldAlerts::evaluate(new.price, &self.rules.thresholds);
        if alerts.identification_required {
            let verified = self
                .screening
                .profile(&new.seller.id)
                .await?
                .map(|p| p.is_kyc_verified())
                .unwrap_or(false);
            if !verified {
                info!(
                    "KYC required for seller={} price={}",
                    new.seller.id, new.price
                );
                return Err(GatewayError::KycRequired {
                    threshold: self.rules.thresholds.identification_amount(),
                });
            }
        }

        let compliance_status = match verdict.risk_level {
            RiskLevel::Clean => ComplianceStatus::Approved,
            RiskLevel::Warning => ComplianceStatus::PendingReview,
            RiskLevel::Blocked => ComplianceStatus::BlockedRisk,
        };

        let now = TimeMs::now();
        let transaction = Transaction {
            id: new_id(),
            vehicle_id: new.vehicle_id,
            vehicle_vin: new.vehicle_vin.trim().to_string(),
            buyer_id: new.buyer_id,
            seller_id: new.seller.id.clone(),
            seller_tax_regime: new.seller_tax_regime,
            price: new.price,
            add_ons: new.add_ons,
            status: TransactionStatus::Pending,
            compliance_status,
            requires_regulatory_notice: alerts.notice_required,
            risk_snapshot: verdict,
            checkout_session_id: None,
            handover_token_digest: None,
            handover_consumed_at: None,
            created_at: now,
            updated_at: now,
        };

        let audit = AuditRecord::new(
            AuditKind::TransactionCreated,
            transaction.id.as_str(),
            transaction.buyer_id.as_str(),
            json!({
                "sellerId": transaction.seller_id,
                "price": transaction.price,
                "riskLevel": transaction.risk_snapshot.risk_level.as_str(),
                "complianceStatus": transaction.compliance_status.as_str(),
                "requiresRegulatoryNotice": transaction.requires_regulatory_notice,
            }),
        );
        self.repo.insert_transaction(&transaction, &audit).await?;

        info!(
            "Created transaction={} seller={} price={} compliance={}",
            transaction.id, transaction.seller_id, transaction.price, transaction.compliance_status
        );
        self.outbox
            .enqueue(
                Notification::new(
                    &transaction.seller_id,
                    NotificationKind::Info,
                    "Nueva operación",
                    format!(
                        "Se abrió una operación por ${} para tu vehículo.",
                        transaction.price
                    ),
                )
                .with_link(transaction_link(&transaction.id)),
            )
            .await;

        Ok(transaction)
    }

    /// Overwrite the add-on costs while the deal is `PENDING`. Idempotent;
    /// the status never changes.
    pub async fn update_services(
        &self,
        id: &str,
        add_ons: AddOnCosts,
    ) -> Result<Transaction, GatewayError> {
        if add_ons.has_negative() {
            return Err(GatewayError::Validation(
                "add-on costs must not be negative".to_string(),
            ));
        }
        let transaction = self.load(id).await?;
        if transaction.status != TransactionStatus::Pending {
            return Err(GatewayError::InvalidTransition(format!(
                "services can only change while PENDING, transaction is {}",
                transaction.status
            )));
        }
        if !self.repo.update_add_ons(id, &add_ons, TimeMs::now()).await? {
            return Err(self.stale(id, "services cannot change").await);
        }
        self.load(id).await
    }

    pub async fn attach_checkout_session(
        &self,
        id: &str,
        session_id: &str,
    ) -> Result<Transaction, GatewayError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(GatewayError::Validation(
                "checkout session id is required".to_string(),
            ));
        }
        let transaction = self.load(id).await?;
        if transaction.status != TransactionStatus::Pending {
            return Err(GatewayError::InvalidTransition(format!(
                "checkout session requires PENDING, transaction is {}",
                transaction.status
            )));
        }
        match self
            .repo
            .set_checkout_session(id, session_id, TimeMs::now())
            .await
        {
            Ok(true) => self.load(id).await,
            Ok(false) => Err(self.stale(id, "checkout session not attached").await),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                GatewayError::Validation("checkout session already in use".to_string()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Confirm that the buyer paid and move the funds into the vault.
    ///
    /// Order matters: seller re-screen, compliance gate, theft check, and
    /// only then the deposit split, written together with the `IN_VAULT`
    /// transition.
    pub async fn confirm_funding(
        &self,
        reference: FundingReference,
    ) -> Result<FundingReceipt, GatewayError> {
        let transaction = match &reference {
            FundingReference::Transaction(id) => self.load(id).await?,
            FundingReference::CheckoutSession(session_id) => self
                .repo
                .find_by_checkout_session(session_id)
                .await?
                .ok_or_else(|| {
                    GatewayError::NotFound(format!("checkout session {}", session_id))
                })?,
        };
        let id = transaction.id.clone();

        if transaction.status != TransactionStatus::Pending {
            return Err(GatewayError::InvalidTransition(format!(
                "funding requires PENDING, transaction is {}",
                transaction.status
            )));
        }

        let seller = self.seller_identity(&transaction).await?;
        let verdict = self
            .screening
            .screen(&seller, ScreeningContext::Funding)
            .await?;
        if verdict.is_blocked() {
            self.record_blocked_attempt(&seller, &verdict, Some(&id))
                .await?;
            self.repo
                .set_compliance_status(&id, ComplianceStatus::BlockedRisk, TimeMs::now(), None)
                .await?;
            return Err(GatewayError::ComplianceBlocked(format!(
                "seller matched {}",
                verdict.flags().join(", ")
            )));
        }

        match transaction.compliance_status {
            ComplianceStatus::Approved => {}
            ComplianceStatus::PendingReview => {
                return Err(GatewayError::InvalidTransition(
                    "compliance review pending".to_string(),
                ))
            }
            ComplianceStatus::BlockedRisk => {
                return Err(GatewayError::ComplianceBlocked(
                    "transaction is blocked by risk review".to_string(),
                ))
            }
        }

        let report = self
            .theft
            .verify_theft_status(&transaction.vehicle_vin)
            .await?;
        let certificate = self.theft.generate_certificate(&id, &report).await?;

        if report.status.blocks_funding() {
            let audit = AuditRecord::new(
                AuditKind::FraudBlock,
                id.as_str(),
                Actor::system().id,
                json!({
                    "vin": report.vin,
                    "folio": report.folio,
                    "source": report.source,
                    "certificateDigest": certificate.digest,
                }),
            );
            self.repo
                .set_compliance_status(
                    &id,
                    ComplianceStatus::BlockedRisk,
                    TimeMs::now(),
                    Some(&audit),
                )
                .await?;
            warn!(
                "Fraud block on transaction={} vin={} folio={}",
                id, report.vin, report.folio
            );
            for user in [&transaction.buyer_id, &transaction.seller_id] {
                self.outbox
                    .enqueue(
                        Notification::new(
                            user,
                            NotificationKind::Alert,
                            "Operación bloqueada",
                            "El vehículo tiene reporte de robo vigente. Los fondos no se liberarán.",
                        )
                        .with_link(transaction_link(&id)),
                    )
                    .await;
            }
            return Err(GatewayError::FraudDetected {
                folio: report.folio,
                source_name: report.source,
            });
        }

        let settlement = match self
            .settlement
            .simulate_incoming_deposit(&transaction)
            .await?
        {
            Some(settlement) => settlement,
            None => return Err(self.stale(&id, "funds cannot enter the vault").await),
        };
        info!(
            "Transaction={} IN_VAULT via {} amount={}",
            id,
            reference.as_str(),
            settlement.amount
        );

        self.notify_parties(
            &transaction,
            NotificationKind::Success,
            "Fondos en resguardo",
            format!("Recibimos ${} y están resguardados.", settlement.amount),
        )
        .await;

        Ok(FundingReceipt {
            transaction: self.load(&id).await?,
            settlement,
            certificate,
        })
    }

    /// Issue a fresh single-use handover token, replacing any earlier one.
    ///
    /// Only the digest is stored; the returned token cannot be recovered.
    pub async fn generate_handover_token(&self, id: &str) -> Result<String, GatewayError> {
        let transaction = self.load(id).await?;
        if transaction.status != TransactionStatus::InVault {
            return Err(GatewayError::InvalidTransition(format!(
                "handover token requires IN_VAULT, transaction is {}",
                transaction.status
            )));
        }

        let token = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        if !self
            .repo
            .set_handover_token(id, &sha256_hex(&token), TimeMs::now())
            .await?
        {
            return Err(self.stale(id, "handover token not issued").await);
        }
        info!("Issued handover token for transaction={}", id);
        Ok(token)
    }

    /// Consume the handover token and release the escrow.
    pub async fn confirm_handover(
        &self,
        id: &str,
        token: &str,
    ) -> Result<HandoverReceipt, GatewayError> {
        let transaction = self.load(id).await?;
        match transaction.status {
            TransactionStatus::InVault => {}
            TransactionStatus::Released => return Err(GatewayError::InvalidToken),
            other => {
                return Err(GatewayError::InvalidTransition(format!(
                    "handover requires IN_VAULT, transaction is {}",
                    other
                )))
            }
        }

        let settlement = self.settlement.get(id).await?;
        let seller_payout = settlement
            .as_ref()
            .map(|s| s.seller_payout)
            .unwrap_or(transaction.price);

        let audit = AuditRecord::new(
            AuditKind::FundsReleased,
            id,
            transaction.buyer_id.as_str(),
            json!({
                "sellerId": transaction.seller_id,
                "sellerPayout": seller_payout,
                "platformFee": settlement.as_ref().map(|s| s.platform_fee),
                "trackingKey": settlement.as_ref().map(|s| s.tracking_key.clone()),
            }),
        );
        let digest = sha256_hex(token.trim());
        if !self
            .repo
            .release_with_token(id, &digest, TimeMs::now(), &audit)
            .await?
        {
            warn!("Rejected handover token for transaction={}", id);
            return Err(GatewayError::InvalidToken);
        }

        info!(
            "Transaction={} RELEASED payout={} to seller={}",
            id, seller_payout, transaction.seller_id
        );
        self.notify_parties(
            &transaction,
            NotificationKind::Success,
            "Entrega confirmada",
            format!(
                "La entrega se confirmó. Pago al vendedor: ${}.",
                seller_payout
            ),
        )
        .await;

        Ok(HandoverReceipt {
            transaction: self.load(id).await?,
            seller_payout,
        })
    }

    /// Cancel a deal that has not been released; a held deposit is refunded.
    pub async fn cancel_transaction(
        &self,
        actor: &Actor,
        id: &str,
        reason: Option<String>,
    ) -> Result<Transaction, GatewayError> {
        let transaction = self.load(id).await?;
        if !actor.is_admin() && !transaction.is_party(&actor.id) {
            return Err(GatewayError::Forbidden(
                "only a party to the deal or an admin may cancel".to_string(),
            ));
        }
        if !transaction
            .status
            .can_transition_to(TransactionStatus::Cancelled)
        {
            return Err(GatewayError::InvalidTransition(format!(
                "cannot cancel a {} transaction",
                transaction.status
            )));
        }

        let audit = AuditRecord::new(
            AuditKind::TransactionCancelled,
            id,
            actor.id.as_str(),
            json!({
                "from": transaction.status.as_str(),
                "reason": reason,
                "role": actor.role.as_str(),
            }),
        );
        if !self
            .repo
            .cancel_transaction(id, TimeMs::now(), &audit)
            .await?
        {
            return Err(self.stale(id, "cannot cancel").await);
        }

        info!("Transaction={} CANCELLED by actor={}", id, actor.id);
        self.notify_parties(
            &transaction,
            NotificationKind::Warning,
            "Operación cancelada",
            reason.unwrap_or_else(|| "La operación fue cancelada.".to_string()),
        )
        .await;
        self.load(id).await
    }

    /// Resolve an enhanced-diligence review.
    pub async fn review_compliance(
        &self,
        actor: &Actor,
        id: &str,
        approve: bool,
        note: Option<String>,
    ) -> Result<Transaction, GatewayError> {
        if !actor.is_admin() {
            return Err(GatewayError::Forbidden(
                "compliance review requires the admin role".to_string(),
            ));
        }
        let transaction = self.load(id).await?;
        if transaction.compliance_status != ComplianceStatus::PendingReview
            || transaction.status.is_terminal()
        {
            return Err(GatewayError::InvalidTransition(format!(
                "no review pending (compliance {}, status {})",
                transaction.compliance_status, transaction.status
            )));
        }

        let outcome = if approve {
            ComplianceStatus::Approved
        } else {
            ComplianceStatus::BlockedRisk
        };
        let audit = AuditRecord::new(
            AuditKind::ComplianceReview,
            id,
            actor.id.as_str(),
            json!({ "outcome": outcome.as_str(), "note": note }),
        );
        self.repo
            .set_compliance_status(id, outcome, TimeMs::now(), Some(&audit))
            .await?;
        info!(
            "Compliance review of transaction={} by actor={}: {}",
            id, actor.id, outcome
        );

        self.outbox
            .enqueue(
                Notification::new(
                    &transaction.seller_id,
                    if approve {
                        NotificationKind::Success
                    } else {
                        NotificationKind::Alert
                    },
                    "Revisión de cumplimiento",
                    format!("Resultado de la revisión: {}.", outcome),
                )
                .with_link(transaction_link(id)),
            )
            .await;
        self.load(id).await
    }

    /// Administrative escape hatch: set any status, bypassing every guard.
    pub async fn override_status(
        &self,
        actor: &Actor,
        id: &str,
        status: TransactionStatus,
        reason: Option<String>,
    ) -> Result<Transaction, GatewayError> {
        if !actor.is_admin() {
            warn!(
                target: OVERRIDE_LOG_TARGET,
                "Denied status override of transaction={} by actor={} role={}",
                id,
                actor.id,
                actor.role
            );
            return Err(GatewayError::Forbidden(
                "status override requires the admin role".to_string(),
            ));
        }
        let transaction = self.load(id).await?;

        let audit = AuditRecord::new(
            AuditKind::ManualOverride,
            id,
            actor.id.as_str(),
            json!({
                "from": transaction.status.as_str(),
                "to": status.as_str(),
                "reason": reason,
            }),
        );
        if !self
            .repo
            .override_status(id, status, TimeMs::now(), &audit)
            .await?
        {
            return Err(GatewayError::NotFound(format!("transaction {}", id)));
        }

        warn!(
            target: OVERRIDE_LOG_TARGET,
            "MANUAL OVERRIDE transaction={} {} -> {} by actor={} reason={:?}",
            id,
            transaction.status,
            status,
            actor.id,
            reason
        );
        self.notify_parties(
            &transaction,
            NotificationKind::Warning,
            "Cambio manual de estado",
            format!(
                "Un administrador cambió el estado de {} a {}.",
                transaction.status, status
            ),
        )
        .await;
        self.load(id).await
    }

    pub async fn get_transaction(&self, id: &str) -> Result<TransactionView, GatewayError> {
        let transaction = self.load(id).await?;
        let totals = compute_totals(&transaction, &self.rules);
        let add_on_orders = self.repo.list_add_on_orders(id).await?;
        let settlement = self.settlement.get(id).await?;
        Ok(TransactionView {
            transaction,
            totals,
            add_on_orders,
            settlement,
        })
    }

    pub async fn global_stats(&self) -> Result<GlobalStats, GatewayError> {
        let rows = self.repo.query_stats_rows().await?;
        Ok(GlobalStats::from_rows(
            rows.into_iter().map(|r| (r.status, r.price)),
            self.rules.platform_fee_rate,
        ))
    }

    async fn load(&self, id: &str) -> Result<Transaction, GatewayError> {
        self.repo
            .get_transaction(id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("transaction {}", id)))
    }

    /// Error for a guarded update that matched no row.
    async fn stale(&self, id: &str, what: &str) -> GatewayError {
        match self.repo.get_transaction(id).await {
            Ok(Some(t)) => GatewayError::InvalidTransition(format!(
                "{}: transaction is {} with compliance {}",
                what, t.status, t.compliance_status
            )),
            Ok(None) => GatewayError::NotFound(format!("transaction {}", id)),
            Err(e) => GatewayError::Storage(e),
        }
    }

    async fn seller_identity(
        &self,
        transaction: &Transaction,
    ) -> Result<PartyIdentity, GatewayError> {
        let profile = self.screening.profile(&transaction.seller_id).await?;
        Ok(match profile {
            Some(p) => PartyIdentity::new(p.person_id, p.name, p.tax_id),
            None => PartyIdentity::new(
                transaction.seller_id.as_str(),
                transaction.seller_id.as_str(),
                None,
            ),
        })
    }

    async fn record_blocked_attempt(
        &self,
        seller: &PartyIdentity,
        verdict: &Verdict,
        transaction_id: Option<&str>,
    ) -> Result<(), GatewayError> {
        let audit = AuditRecord::new(
            AuditKind::BlockedAttempt,
            seller.id.as_str(),
            Actor::system().id,
            json!({
                "transactionId": transaction_id,
                "riskLevel": verdict.risk_level.as_str(),
                "flags": verdict.flags(),
            }),
        );
        self.repo.insert_audit(&audit).await?;
        warn!(
            "Compliance block for seller={} flags={:?}",
            seller.id,
            verdict.flags()
        );
        Ok(())
    }

    async fn notify_parties(
        &self,
        transaction: &Transaction,
        kind: NotificationKind,
        title: &str,
        message: String,
    ) {
        for user in [&transaction.buyer_id, &transaction.seller_id] {
            self.outbox
                .enqueue(
                    Notification::new(user, kind, title, message.as_str())
                        .with_link(transaction_link(&transaction.id)),
                )
                .await;
        }
    }
}

fn transaction_link(id: &str) -> String {
    format!("/transactions/{}", id)
}

fn validate_new_transaction(new: &NewTransaction) -> Result<(), GatewayError> {
    if !new.price.is_positive() {
        return Err(GatewayError::Validation(
            "price must be greater than zero".to_string(),
        ));
    }
    if new.add_ons.has_negative() {
        return Err(GatewayError::Validation(
            "add-on costs must not be negative".to_string(),
        ));
    }
    if new.vehicle_vin.trim().is_empty() || new.vehicle_id.trim().is_empty() {
        return Err(GatewayError::Validation(
            "vehicle id and identifier are required".to_string(),
        ));
    }
    if new.seller.id.trim().is_empty() || new.seller.name.trim().is_empty() {
        return Err(GatewayError::Validation(
            "seller id and name are required".to_string(),
        ));
    }
    if new.buyer_id == new.seller.id {
        return Err(GatewayError::Validation(
            "buyer and seller must differ".to_string(),
        ));
    }
    Ok(())
}
