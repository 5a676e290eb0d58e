//! Certificate signing request intake.
//!
//! A request body is accepted only if its first PEM block is a
//! `CERTIFICATE REQUEST` that parses as PKCS#10 and carries a valid
//! self-signature. The request's identity is the fingerprint of its
//! subject public key.

use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::prelude::FromDer;

use corral_crypto::fingerprint::fingerprint_spki;

use crate::error::EnrollError;

pub const CSR_PEM_TAG: &str = "CERTIFICATE REQUEST";

/// A validated CSR together with its public-key fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pem: String,
    fingerprint: String,
}

impl CertificateRequest {
    pub fn parse(body: &[u8]) -> Result<Self, EnrollError> {
        let block = pem::parse(body)
            .map_err(|e| EnrollError::InvalidCsr(format!("body is not PEM: {e}")))?;
        if block.tag() != CSR_PEM_TAG {
            return Err(EnrollError::InvalidCsr(format!(
                "expected a {CSR_PEM_TAG} block, found {}",
                block.tag()
            )));
        }

        let (_, csr) = X509CertificationRequest::from_der(block.contents())
            .map_err(|e| EnrollError::InvalidCsr(format!("malformed PKCS#10: {e}")))?;
        csr.verify_signature()
            .map_err(|e| EnrollError::InvalidCsr(format!("signature check failed: {e}")))?;

        let fingerprint = fingerprint_spki(csr.certification_request_info.subject_pki.raw);
        Ok(Self {
            pem: crate::ca::encode_pem(&block),
            fingerprint,
        })
    }

    /// The request re-encoded as a single PEM block.
    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::{generate_csr, CertTemplate};

    fn sample_csr() -> String {
        generate_csr(&CertTemplate::for_host("node1", None))
            .unwrap()
            .csr_pem
    }

    #[test]
    fn parses_generated_csr() {
        let pem = sample_csr();
        let parsed = CertificateRequest::parse(pem.as_bytes()).unwrap();
        assert_eq!(parsed.fingerprint().len(), 64);
        assert!(parsed
            .fingerprint()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(parsed.pem().starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
    }

    #[test]
    fn same_key_gives_same_fingerprint() {
        let pem = sample_csr();
        let a = CertificateRequest::parse(pem.as_bytes()).unwrap();
        let b = CertificateRequest::parse(a.pem().as_bytes()).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn distinct_keys_give_distinct_fingerprints() {
        let a = CertificateRequest::parse(sample_csr().as_bytes()).unwrap();
        let b = CertificateRequest::parse(sample_csr().as_bytes()).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn rejects_non_pem_body() {
        let err = CertificateRequest::parse(b"definitely not a csr").unwrap_err();
        assert!(matches!(err, EnrollError::InvalidCsr(_)));
    }

    #[test]
    fn rejects_wrong_block_type() {
        let block = pem::Pem::new("CERTIFICATE", vec![1, 2, 3]);
        let err = CertificateRequest::parse(pem::encode(&block).as_bytes()).unwrap_err();
        assert!(err.to_string().contains("CERTIFICATE REQUEST"));
    }

    #[test]
    fn rejects_garbage_der() {
        let block = pem::Pem::new(CSR_PEM_TAG, vec![0x30, 0x03, 0x01, 0x01, 0xff]);
        let err = CertificateRequest::parse(pem::encode(&block).as_bytes()).unwrap_err();
        assert!(matches!(err, EnrollError::InvalidCsr(_)));
    }

    #[test]
    fn rejects_tampered_signature() {
        let pem = sample_csr();
        let block = pem::parse(&pem).unwrap();
        let mut der = block.contents().to_vec();
        let last = der.len() - 1;
        der[last] ^= 0x01;
        let tampered = pem::encode(&pem::Pem::new(CSR_PEM_TAG, der));
        assert!(CertificateRequest::parse(tampered.as_bytes()).is_err());
    }
}
