//! Signing request registry.
//!
//! In-memory table of enrollment requests keyed by public-key fingerprint.
//! It lives as long as the coordinator process and is never written to
//! disk. Callers serialize access (see `EnrollState::registry`).

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::csr::CertificateRequest;
use crate::role::Role;

#[derive(Debug, Clone)]
pub struct SigningRequest {
    role: Role,
    csr: String,
    approved: bool,
    submitted_at: DateTime<Utc>,
}

impl SigningRequest {
    /// Only validated CSRs can be recorded, so a stored request always
    /// carries signable material.
    pub fn new(role: Role, csr: &CertificateRequest, approved: bool) -> Self {
        Self {
            role,
            csr: csr.pem().to_string(),
            approved,
            submitted_at: Utc::now(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn csr_pem(&self) -> &str {
        &self.csr
    }

    pub fn approved(&self) -> bool {
        self.approved
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

#[derive(Debug, Default)]
pub struct SigningRegistry {
    requests: HashMap<String, SigningRequest>,
}

impl SigningRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `request` under `fingerprint`, replacing any previous entry.
    ///
    /// A fingerprint that was already approved stays approved: the
    /// replacement inherits approval even when `request` is unapproved.
    pub fn submit(&mut self, fingerprint: &str, mut request: SigningRequest) -> &SigningRequest {
        if self.requests.get(fingerprint).is_some_and(|prior| prior.approved) {
            request.approved = true;
        }
        match self.requests.entry(fingerprint.to_string()) {
            Entry::Occupied(mut slot) => {
                slot.insert(request);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(request),
        }
    }

    pub fn get(&self, fingerprint: &str) -> Option<&SigningRequest> {
        self.requests.get(fingerprint)
    }

    /// Mark a request approved. Returns `false` for unknown fingerprints.
    pub fn approve(&mut self, fingerprint: &str) -> bool {
        match self.requests.get_mut(fingerprint) {
            Some(request) => {
                request.approved = true;
                true
            }
            None => false,
        }
    }

    /// All requests, oldest submission first.
    pub fn list(&self) -> Vec<(&str, &SigningRequest)> {
        let mut entries: Vec<_> = self
            .requests
            .iter()
            .map(|(fp, req)| (fp.as_str(), req))
            .collect();
        entries.sort_by(|a, b| a.1.submitted_at.cmp(&b.1.submitted_at).then(a.0.cmp(b.0)));
        entries
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
