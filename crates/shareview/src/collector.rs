//! Per-session request bookkeeping and result evaluation.
//!
//! `RequestLog::observe` is what runs for every outgoing request of the
//! page: dedup by exact URL, apply the shape predicate, parse and record.
//! Once the browser is gone, `RequestLog::evaluate` filters the recorded
//! candidates against the target and picks one.

use std::collections::HashSet;

use tracing::debug;

use crate::candidate::{is_data_request, preference_rank, Candidate};
use crate::error::{DiscoveryError, Result};
use crate::types::{DiscoveryResult, Target};

/// Ordered, deduplicated record of shape-matching request URLs.
#[derive(Debug, Clone)]
pub struct RequestLog {
    data_host: String,
    seen: HashSet<String>,
    found: Vec<Candidate>,
}

impl RequestLog {
    pub fn new(data_host: impl Into<String>) -> Self {
        Self {
            data_host: data_host.into(),
            seen: HashSet::new(),
            found: Vec::new(),
        }
    }

    /// Handle one observed request URL. Returns `true` when it was recorded
    /// as a new candidate.
    pub fn observe(&mut self, url: &str) -> bool {
        if !self.seen.insert(url.to_string()) {
            return false;
        }
        if !is_data_request(url, &self.data_host) {
            return false;
        }

        let candidate = Candidate::parse(url);
        debug!(
            view_id = candidate.view_id.as_deref().unwrap_or("?"),
            share_id = candidate.share_id.as_deref().unwrap_or("?"),
            expires = ?candidate.expiry,
            %url,
            "found readSharedViewData"
        );
        self.found.push(candidate);
        true
    }

    /// Candidates in first-seen order.
    pub fn candidates(&self) -> &[Candidate] {
        &self.found
    }

    pub fn len(&self) -> usize {
        self.found.len()
    }

    pub fn is_empty(&self) -> bool {
        self.found.is_empty()
    }

    /// Filter against `target` and select the preferred URL.
    pub fn evaluate(&self, target: &Target) -> Result<DiscoveryResult> {
        evaluate(&self.found, target)
    }
}

/// Turn the recorded candidates into a `DiscoveryResult`.
pub fn evaluate(found: &[Candidate], target: &Target) -> Result<DiscoveryResult> {
    if found.is_empty() {
        return Err(DiscoveryError::NoCandidatesObserved);
    }

    let matching: Vec<&Candidate> = found
        .iter()
        .filter(|c| target.matches(c.view_id.as_deref(), c.share_id.as_deref()))
        .collect();

    let Some(picked) = select(&matching) else {
        return Err(DiscoveryError::NoMatchingCandidate {
            total: found.len(),
            view_id: target.view_id().to_string(),
            share_id: target.share_id().to_string(),
        });
    };

    Ok(DiscoveryResult {
        picked: picked.url.clone(),
        found: found.iter().map(|c| c.url.clone()).collect(),
        matching: matching.iter().map(|c| c.url.clone()).collect(),
        picked_expiry: picked.expiry,
    })
}

/// Lowest `(preference rank, URL length)` wins; equal keys keep the earliest
/// entry, same as taking the head of a stable sort.
pub fn select<'a>(matching: &[&'a Candidate]) -> Option<&'a Candidate> {
    matching
        .iter()
        .copied()
        .min_by_key(|c| (preference_rank(&c.url), c.url.len()))
}
