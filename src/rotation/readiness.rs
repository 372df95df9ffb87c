//! Gate in front of the destructive half of a rotation.

use crate::clients::CertificateManager;
use crate::errors::Result;
use tracing::{info, instrument};

/// True iff every named certificate is `ACTIVE`.
///
/// A certificate that does not exist counts as not ready. Any other remote error is
/// returned to the caller.
#[instrument(skip(certificates, names), fields(certificates = names.len()))]
pub async fn all_new_certificates_active(
    certificates: &dyn CertificateManager,
    names: &[String],
) -> Result<bool> {
    let mut ready = true;

    for name in names {
        let state = match certificates.get_certificate_state(name).await {
            Ok(state) => Some(state),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        match state {
            Some(state) if state.is_active() => {}
            Some(state) => {
                info!(certificate = %name, state = %state, "Certificate not active yet");
                ready = false;
            }
            None => {
                info!(certificate = %name, "Certificate does not exist");
                ready = false;
            }
        }
    }

    Ok(ready)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CertificateState;
    use crate::memory::{Fault, InMemoryCertificateManager, Operation};

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_all_active() {
        let manager = InMemoryCertificateManager::new();
        manager.insert_certificate("cert-0", &["a.example.com"], CertificateState::Active);
        manager.insert_certificate("cert-1", &["b.example.com"], CertificateState::Active);

        assert!(all_new_certificates_active(&manager, &names(&["cert-0", "cert-1"])).await.unwrap());
    }

    #[tokio::test]
    async fn test_one_provisioning_blocks() {
        let manager = InMemoryCertificateManager::new();
        manager.insert_certificate("cert-0", &["a.example.com"], CertificateState::Active);
        manager.insert_certificate("cert-1", &["b.example.com"], CertificateState::Provisioning);

        assert!(!all_new_certificates_active(&manager, &names(&["cert-0", "cert-1"])).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_and_missing_are_not_ready() {
        let manager = InMemoryCertificateManager::new();
        manager.insert_certificate("cert-0", &["a.example.com"], CertificateState::Failed);

        assert!(!all_new_certificates_active(&manager, &names(&["cert-0"])).await.unwrap());
        assert!(!all_new_certificates_active(&manager, &names(&["cert-9"])).await.unwrap());
    }

    #[tokio::test]
    async fn test_remote_error_propagates() {
        let manager = InMemoryCertificateManager::new();
        manager.insert_certificate("cert-0", &["a.example.com"], CertificateState::Active);
        manager.fail(Operation::GetCertificate, "cert-0", Fault::Transient);

        assert!(all_new_certificates_active(&manager, &names(&["cert-0"])).await.is_err());
    }
}
