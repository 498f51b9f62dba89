use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use shared_database::{ChangeEvent, ChangeKind};
use shared_models::auth::Role;

use crate::models::{AccessBadge, AccessRequest, AccessStatus, LiveSnapshot, ACCESS_REQUESTS_TABLE};

/// In-memory copy of access requests, kept current by applying change
/// events one at a time. Rows are held in arrival order so that equal
/// timestamps resolve to the later insertion.
#[derive(Debug, Default, Clone)]
pub struct AccessRequestView {
    requests: Vec<AccessRequest>,
}

impl AccessRequestView {
    pub fn from_requests(requests: Vec<AccessRequest>) -> Self {
        Self { requests }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.requests.iter().any(|r| r.id == request_id)
    }

    /// Applies one change event. Returns whether the view changed.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        if event.table != ACCESS_REQUESTS_TABLE {
            return false;
        }

        match event.kind {
            ChangeKind::Delete => {
                let before = self.requests.len();
                self.requests.retain(|r| r.id != event.row_id);
                before != self.requests.len()
            }
            ChangeKind::Insert | ChangeKind::Update => {
                let Some(row) = event.row.as_ref() else {
                    return false;
                };
                let request: AccessRequest = match serde_json::from_value(row.clone()) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!("Ignoring malformed access request {}: {}", event.row_id, e);
                        return false;
                    }
                };
                match self.requests.iter_mut().find(|r| r.id == request.id) {
                    Some(existing) => *existing = request,
                    None => self.requests.push(request),
                }
                debug!("Access view applied {:?} for {}", event.kind, event.row_id);
                true
            }
        }
    }

    /// The request that governs a pair: latest `created_at`, later arrival
    /// on ties.
    pub fn current_for(&self, doctor_id: &str, patient_id: &str) -> Option<&AccessRequest> {
        latest(self.requests.iter().filter(|r| r.is_for_pair(doctor_id, patient_id)))
    }

    /// Current pending requests addressed to a patient, newest first.
    pub fn pending_for(&self, patient_id: &str) -> Vec<&AccessRequest> {
        let doctors: HashSet<&str> = self
            .requests
            .iter()
            .filter(|r| r.patient_id == patient_id)
            .map(|r| r.doctor_id.as_str())
            .collect();

        let mut pending: Vec<&AccessRequest> = doctors
            .into_iter()
            .filter_map(|doctor_id| self.current_for(doctor_id, patient_id))
            .filter(|r| r.status == AccessStatus::Pending)
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        pending
    }

    pub fn badge_for(&self, doctor_id: &str, patient_id: &str) -> AccessBadge {
        match self.current_for(doctor_id, patient_id).map(|r| r.status) {
            Some(AccessStatus::Pending) => AccessBadge::Pending,
            Some(AccessStatus::Approved) => AccessBadge::ViewRecords,
            Some(AccessStatus::Rejected) | None => AccessBadge::RequestAccess,
        }
    }

    /// Doctors get a badge per patient they have asked about; patients get
    /// their current pending requests.
    pub fn snapshot_for(&self, user_id: &str, role: Role) -> LiveSnapshot {
        match role {
            Role::Doctor => {
                let badges = self
                    .requests
                    .iter()
                    .filter(|r| r.doctor_id == user_id)
                    .map(|r| (r.patient_id.clone(), self.badge_for(user_id, &r.patient_id)))
                    .collect::<BTreeMap<_, _>>();
                LiveSnapshot::Doctor { badges }
            }
            Role::Patient => LiveSnapshot::Patient {
                pending: self.pending_for(user_id).into_iter().cloned().collect(),
            },
        }
    }
}

/// `max_by_key` keeps the last of equal maxima, so ties go to the later row.
pub(crate) fn latest<'a>(requests: impl Iterator<Item = &'a AccessRequest>) -> Option<&'a AccessRequest> {
    requests.max_by_key(|r| r.created_at)
}
