//! Delegation lifecycle: registration, current pool, pending switch.
//!
//! On-chain certificates are authoritative and always apply. The pending flag
//! is local: set when the wallet submits a delegation transaction, cleared on
//! confirmed inclusion or explicit cancellation.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Hex pool hash.
pub type PoolId = String;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DelegationError {
    #[error("a delegation change is already pending")]
    AlreadyPending,
    #[error("staking key is not registered")]
    NotRegistered,
    #[error("already delegated to pool {0}")]
    AlreadyDelegatedTo(PoolId),
    #[error("no delegation change is pending")]
    NothingPending,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pool", rename_all = "snake_case")]
pub enum PendingTarget {
    Pool(PoolId),
    Deregister,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DelegationStatus {
    Unregistered,
    Registered,
    Delegated {
        pool: PoolId,
    },
    PendingConfirmation {
        previous: Box<DelegationStatus>,
        target: PendingTarget,
    },
    Deregistered,
}

impl DelegationStatus {
    /// State ignoring any pending change.
    pub fn settled(&self) -> &DelegationStatus {
        match self {
            DelegationStatus::PendingConfirmation { previous, .. } => previous.settled(),
            other => other,
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(
            self.settled(),
            DelegationStatus::Registered | DelegationStatus::Delegated { .. }
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pool", rename_all = "snake_case")]
pub enum Certificate {
    Registration,
    Delegation(PoolId),
    Deregistration,
}

impl Certificate {
    fn satisfies(&self, target: &PendingTarget) -> bool {
        match (self, target) {
            (Certificate::Delegation(p), PendingTarget::Pool(t)) => p == t,
            (Certificate::Deregistration, PendingTarget::Deregister) => true,
            _ => false,
        }
    }

    fn apply_to(&self, settled: &DelegationStatus) -> DelegationStatus {
        match self {
            Certificate::Registration => match settled {
                DelegationStatus::Unregistered | DelegationStatus::Deregistered => {
                    DelegationStatus::Registered
                }
                already => already.clone(),
            },
            Certificate::Delegation(pool) => DelegationStatus::Delegated { pool: pool.clone() },
            Certificate::Deregistration => DelegationStatus::Deregistered,
        }
    }
}

/// Certificate with its on-chain position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedCertificate {
    pub slot: u64,
    pub cert_index: u32,
    pub certificate: Certificate,
}

/// Per-wallet delegation state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationTracker {
    status: DelegationStatus,
    last_observed: Option<(u64, u32)>,
}

impl Default for DelegationTracker {
    fn default() -> Self {
        Self {
            status: DelegationStatus::Unregistered,
            last_observed: None,
        }
    }
}

impl DelegationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a settled status taken from an account snapshot.
    pub fn from_status(status: DelegationStatus) -> Self {
        Self {
            status: status.settled().clone(),
            last_observed: None,
        }
    }

    /// Build from certificate history in any order.
    pub fn replay(certs: &[ObservedCertificate]) -> Self {
        let mut sorted: Vec<&ObservedCertificate> = certs.iter().collect();
        sorted.sort_by_key(|c| (c.slot, c.cert_index));
        let mut tracker = Self::new();
        for c in sorted {
            tracker.observe(c);
        }
        tracker
    }

    pub fn status(&self) -> &DelegationStatus {
        &self.status
    }

    /// Apply an on-chain certificate. Certificates at or before the last
    /// observed position are ignored so re-polling is harmless.
    pub fn observe(&mut self, cert: &ObservedCertificate) {
        let pos = (cert.slot, cert.cert_index);
        if self.last_observed.is_some_and(|last| pos <= last) {
            debug!(slot = cert.slot, "ignoring already observed certificate");
            return;
        }
        self.last_observed = Some(pos);
        self.apply(&cert.certificate);
    }

    fn apply(&mut self, cert: &Certificate) {
        let next = match &self.status {
            DelegationStatus::PendingConfirmation { previous, target } => {
                let settled = cert.apply_to(previous);
                if cert.satisfies(target) {
                    settled
                } else {
                    DelegationStatus::PendingConfirmation {
                        previous: Box::new(settled),
                        target: target.clone(),
                    }
                }
            }
            other => cert.apply_to(other),
        };
        info!(from = ?self.status, to = ?next, "delegation status change");
        self.status = next;
    }

    pub fn begin_pending(&mut self, target: PendingTarget) -> Result<(), DelegationError> {
        if self.is_pending() {
            return Err(DelegationError::AlreadyPending);
        }
        match (&target, &self.status) {
            (PendingTarget::Deregister, s) if !s.is_registered() => {
                return Err(DelegationError::NotRegistered)
            }
            (PendingTarget::Pool(p), DelegationStatus::Delegated { pool }) if p == pool => {
                return Err(DelegationError::AlreadyDelegatedTo(p.clone()))
            }
            _ => {}
        }
        self.status = DelegationStatus::PendingConfirmation {
            previous: Box::new(self.status.clone()),
            target,
        };
        Ok(())
    }

    pub fn cancel_pending(&mut self) -> Result<(), DelegationError> {
        match &self.status {
            DelegationStatus::PendingConfirmation { previous, .. } => {
                self.status = (**previous).clone();
                Ok(())
            }
            _ => Err(DelegationError::NothingPending),
        }
    }

    /// The pending transaction was included; apply its effect.
    pub fn confirm_pending(&mut self) -> Result<(), DelegationError> {
        let cert = match &self.status {
            DelegationStatus::PendingConfirmation { target, .. } => match target {
                PendingTarget::Pool(p) => Certificate::Delegation(p.clone()),
                PendingTarget::Deregister => Certificate::Deregistration,
            },
            _ => return Err(DelegationError::NothingPending),
        };
        self.apply(&cert);
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, DelegationStatus::PendingConfirmation { .. })
    }

    pub fn is_registered(&self) -> bool {
        self.status.is_registered()
    }

    pub fn current_pool(&self) -> Option<&PoolId> {
        match self.status.settled() {
            DelegationStatus::Delegated { pool } => Some(pool),
            _ => None,
        }
    }

    pub fn pending_pool(&self) -> Option<&PoolId> {
        match &self.status {
            DelegationStatus::PendingConfirmation {
                target: PendingTarget::Pool(p),
                ..
            } => Some(p),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(slot: u64, certificate: Certificate) -> ObservedCertificate {
        ObservedCertificate {
            slot,
            cert_index: 0,
            certificate,
        }
    }

    #[test]
    fn lifecycle_from_history() {
        let t = DelegationTracker::replay(&[
            at(30, Certificate::Delegation("p2".into())),
            at(10, Certificate::Registration),
            at(20, Certificate::Delegation("p1".into())),
        ]);
        assert_eq!(t.current_pool(), Some(&"p2".to_string()));
        assert!(t.is_registered());
        assert!(!t.is_pending());
    }

    #[test]
    fn pending_switch_confirmed_by_chain() {
        let mut t = DelegationTracker::replay(&[
            at(1, Certificate::Registration),
            at(2, Certificate::Delegation("p1".into())),
        ]);
        t.begin_pending(PendingTarget::Pool("p2".into())).unwrap();
        assert_eq!(t.current_pool(), Some(&"p1".to_string()));
        assert_eq!(t.pending_pool(), Some(&"p2".to_string()));
        t.observe(&at(5, Certificate::Delegation("p2".into())));
        assert!(!t.is_pending());
        assert_eq!(t.current_pool(), Some(&"p2".to_string()));
    }

    #[test]
    fn unrelated_certificate_keeps_pending() {
        let mut t = DelegationTracker::replay(&[at(1, Certificate::Registration)]);
        t.begin_pending(PendingTarget::Pool("p9".into())).unwrap();
        t.observe(&at(3, Certificate::Delegation("p1".into())));
        assert!(t.is_pending());
        assert_eq!(t.current_pool(), Some(&"p1".to_string()));
        t.cancel_pending().unwrap();
        assert_eq!(
            t.status(),
            &DelegationStatus::Delegated { pool: "p1".into() }
        );
    }

    #[test]
    fn deregistration_flow() {
        let mut t = DelegationTracker::replay(&[
            at(1, Certificate::Registration),
            at(2, Certificate::Delegation("p1".into())),
        ]);
        t.begin_pending(PendingTarget::Deregister).unwrap();
        t.confirm_pending().unwrap();
        assert_eq!(t.status(), &DelegationStatus::Deregistered);
        assert!(!t.is_registered());
        assert_eq!(t.current_pool(), None);
    }

    #[test]
    fn invalid_local_transitions() {
        let mut t = DelegationTracker::new();
        assert_eq!(
            t.begin_pending(PendingTarget::Deregister),
            Err(DelegationError::NotRegistered)
        );
        assert_eq!(t.cancel_pending(), Err(DelegationError::NothingPending));
        t.begin_pending(PendingTarget::Pool("p1".into())).unwrap();
        assert_eq!(
            t.begin_pending(PendingTarget::Pool("p2".into())),
            Err(DelegationError::AlreadyPending)
        );
        t.confirm_pending().unwrap();
        assert_eq!(
            t.begin_pending(PendingTarget::Pool("p1".into())),
            Err(DelegationError::AlreadyDelegatedTo("p1".into()))
        );
    }

    #[test]
    fn cancel_restores_unregistered() {
        let mut t = DelegationTracker::new();
        t.begin_pending(PendingTarget::Pool("p1".into())).unwrap();
        t.cancel_pending().unwrap();
        assert_eq!(t.status(), &DelegationStatus::Unregistered);
    }

    #[test]
    fn snapshot_then_certificates() {
        let mut t = DelegationTracker::from_status(DelegationStatus::Delegated { pool: "p1".into() });
        assert!(t.is_registered());
        t.observe(&at(4, Certificate::Delegation("p2".into())));
        assert_eq!(t.current_pool(), Some(&"p2".to_string()));
    }

    #[test]
    fn reobserving_is_harmless() {
        let c = at(7, Certificate::Deregistration);
        let mut t = DelegationTracker::replay(&[
            at(1, Certificate::Registration),
            c.clone(),
            at(9, Certificate::Registration),
        ]);
        t.observe(&c);
        assert_eq!(t.status(), &DelegationStatus::Registered);
    }
}
