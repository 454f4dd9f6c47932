//! Reproducibility hashing and offline verification of reward evidence.

mod bundle;

pub use bundle::normalize_for_hash;
pub use bundle::{
    reproducibility_hash, verify_bundle, EvidenceBundle, VerificationResult, VerifyError,
    BUNDLE_VERSION,
};
