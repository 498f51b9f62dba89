use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use profile_cell::ProfileService;
use records_cell::{Entity, Report};
use shared_database::{Order, Query, RecordStore, StoreError};
use shared_models::auth::Role;
use shared_utils::extractor::Actor;

use crate::models::{
    AccessBadge, AccessError, AccessRequest, AccessScope, AccessStatus, PatientCard,
    PatientRecords, PendingRequest, ResourceClass, ACCESS_REQUESTS_TABLE, UNKNOWN_DOCTOR,
};
use crate::services::views::{latest, AccessRequestView};

const RECENT_REPORTS: usize = 2;

/// Doctor/patient access requests: request, decide, and the visibility
/// checks that follow from them.
pub struct AccessControlService {
    store: Arc<dyn RecordStore>,
    profiles: ProfileService,
}

impl AccessControlService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            profiles: ProfileService::new(store.clone()),
            store,
        }
    }

    #[instrument(skip(self, actor), fields(doctor_id = %actor.id()))]
    pub async fn request_access(
        &self,
        actor: &Actor,
        patient_id: &str,
        scope: AccessScope,
    ) -> Result<AccessRequest, AccessError> {
        if actor.role != Role::Doctor {
            return Err(AccessError::Forbidden("Only doctors can request access".to_string()));
        }
        let patient_id = patient_id.trim();
        if patient_id.is_empty() {
            return Err(AccessError::MalformedInput("Patient is required".to_string()));
        }

        let token = Some(actor.token.as_str());
        let history = self.pair_history(actor.id(), patient_id, token).await?;
        match latest(history.iter()).map(|r| r.status) {
            Some(AccessStatus::Pending) => return Err(AccessError::DuplicatePendingRequest),
            Some(AccessStatus::Approved) => {
                return Err(AccessError::InvalidState(
                    "Access to this patient is already approved".to_string(),
                ))
            }
            Some(AccessStatus::Rejected) | None => {}
        }

        let row = json!({
            "id": Uuid::new_v4().to_string(),
            "doctor_id": actor.id(),
            "patient_id": patient_id,
            "request_type": scope,
            "status": AccessStatus::Pending,
            "created_at": Utc::now().to_rfc3339(),
        });
        let created: AccessRequest =
            serde_json::from_value(self.store.insert(ACCESS_REQUESTS_TABLE, row, token).await?)?;

        info!("Access request {} opened for patient {}", created.id, patient_id);
        Ok(created)
    }

    pub async fn approve(&self, actor: &Actor, request_id: &str) -> Result<AccessRequest, AccessError> {
        self.decide(actor, request_id, AccessStatus::Approved).await
    }

    pub async fn reject(&self, actor: &Actor, request_id: &str) -> Result<AccessRequest, AccessError> {
        self.decide(actor, request_id, AccessStatus::Rejected).await
    }

    #[instrument(skip(self, actor), fields(patient_id = %actor.id()))]
    async fn decide(
        &self,
        actor: &Actor,
        request_id: &str,
        decision: AccessStatus,
    ) -> Result<AccessRequest, AccessError> {
        if actor.role != Role::Patient {
            return Err(AccessError::Forbidden("Only the patient can decide on a request".to_string()));
        }
        let token = Some(actor.token.as_str());

        let rows = self
            .store
            .select(ACCESS_REQUESTS_TABLE, &Query::new().eq("id", request_id).limit(1), token)
            .await?;
        let request: AccessRequest = match rows.into_iter().next() {
            Some(row) => serde_json::from_value(row)?,
            None => return Err(AccessError::NotFound),
        };

        if request.patient_id != actor.id() {
            return Err(AccessError::Forbidden("This request is addressed to another patient".to_string()));
        }
        if request.status != AccessStatus::Pending {
            return Err(AccessError::InvalidState(format!(
                "Request is already {}",
                request.status.as_str()
            )));
        }

        // Two concurrent requests can both insert; only the pair's current
        // row may be decided.
        let history = self
            .pair_history(&request.doctor_id, &request.patient_id, token)
            .await?;
        if latest(history.iter()).is_some_and(|current| current.id != request.id) {
            return Err(AccessError::InvalidState(
                "Request has been superseded by a newer one".to_string(),
            ));
        }

        let guard = Query::new()
            .eq("id", request_id)
            .eq("status", AccessStatus::Pending.as_str());
        let updated = self
            .store
            .update(ACCESS_REQUESTS_TABLE, &guard, json!({ "status": decision }), token)
            .await?;

        match updated.into_iter().next() {
            Some(row) => {
                info!("Access request {} {}", request_id, decision.as_str());
                Ok(serde_json::from_value(row)?)
            }
            None => Err(AccessError::InvalidState("Request was decided concurrently".to_string())),
        }
    }

    /// True iff the pair's current request is approved with a scope covering
    /// `class`. Store errors deny.
    #[instrument(skip(self, auth_token))]
    pub async fn check_visibility(
        &self,
        doctor_id: &str,
        patient_id: &str,
        class: ResourceClass,
        auth_token: Option<&str>,
    ) -> bool {
        match self.pair_history(doctor_id, patient_id, auth_token).await {
            Ok(history) => latest(history.iter()).is_some_and(|r| r.grants(class)),
            Err(e) => {
                warn!("Visibility check failed closed for {} -> {}: {}", doctor_id, patient_id, e);
                false
            }
        }
    }

    #[instrument(skip(self, auth_token))]
    pub async fn pending_for_patient(
        &self,
        patient_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Vec<PendingRequest>, AccessError> {
        let view = self.view_where("patient_id", patient_id, auth_token).await?;

        let mut pending = Vec::new();
        for request in view.pending_for(patient_id) {
            let doctor_name = self
                .profiles
                .doctor_display_name(&request.doctor_id, auth_token)
                .await
                .unwrap_or_else(|| UNKNOWN_DOCTOR.to_string());
            pending.push(PendingRequest {
                id: request.id.clone(),
                doctor_id: request.doctor_id.clone(),
                doctor_name,
                request_type: request.request_type,
                created_at: request.created_at,
            });
        }
        Ok(pending)
    }

    /// Every registered patient with the doctor's badge. Approved report
    /// access adds the report count and the latest titles.
    #[instrument(skip(self, auth_token))]
    pub async fn doctor_board(
        &self,
        doctor_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Vec<PatientCard>, AccessError> {
        let patients = self.profiles.list_patients(auth_token).await.map_err(store_error)?;
        let view = self.view_where("doctor_id", doctor_id, auth_token).await?;

        let mut board = Vec::with_capacity(patients.len());
        for patient in patients {
            let current = view.current_for(doctor_id, &patient.user_id);
            let badge = view.badge_for(doctor_id, &patient.user_id);
            let mut card = PatientCard {
                patient_id: patient.user_id.clone(),
                name: patient.name,
                condition: patient.condition,
                badge,
                scope: current.map(|r| r.request_type),
                report_count: None,
                recent_reports: Vec::new(),
            };

            if badge == AccessBadge::ViewRecords
                && current.is_some_and(|r| r.grants(ResourceClass::Reports))
            {
                match self.reports_of(&patient.user_id, auth_token).await {
                    Ok(reports) => {
                        card.report_count = Some(reports.len());
                        card.recent_reports = reports
                            .into_iter()
                            .take(RECENT_REPORTS)
                            .map(|r| r.title)
                            .collect();
                    }
                    Err(e) => warn!("Reports unavailable for {}: {}", patient.user_id, e),
                }
            }
            board.push(card);
        }

        debug!("Board for doctor {} has {} patients", doctor_id, board.len());
        Ok(board)
    }

    #[instrument(skip(self, auth_token))]
    pub async fn patient_records(
        &self,
        doctor_id: &str,
        patient_id: &str,
        auth_token: Option<&str>,
    ) -> Result<PatientRecords, AccessError> {
        let history = self.pair_history(doctor_id, patient_id, auth_token).await?;
        let current = latest(history.iter())
            .filter(|r| r.status == AccessStatus::Approved)
            .ok_or_else(|| AccessError::Forbidden("Access to this patient has not been approved".to_string()))?;
        let scope = current.request_type;

        let profile = if scope.covers(ResourceClass::Profile) {
            self.profiles
                .patient_profile(patient_id, auth_token)
                .await
                .map_err(store_error)?
        } else {
            None
        };
        let reports = if scope.covers(ResourceClass::Reports) {
            Some(self.reports_of(patient_id, auth_token).await?)
        } else {
            None
        };

        Ok(PatientRecords {
            patient_id: patient_id.to_string(),
            scope,
            profile,
            reports,
        })
    }

    /// The caller's side of the request table, to be kept current with
    /// change events.
    pub async fn live_view(&self, actor: &Actor) -> Result<AccessRequestView, AccessError> {
        let column = match actor.role {
            Role::Doctor => "doctor_id",
            Role::Patient => "patient_id",
        };
        Ok(self.view_where(column, actor.id(), Some(&actor.token)).await?)
    }

    /// All rows for a pair, oldest first.
    async fn pair_history(
        &self,
        doctor_id: &str,
        patient_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Vec<AccessRequest>, StoreError> {
        let query = Query::new()
            .eq("doctor_id", doctor_id)
            .eq("patient_id", patient_id)
            .order(Order::asc("created_at"));
        let rows = self.store.select(ACCESS_REQUESTS_TABLE, &query, auth_token).await?;
        Ok(decode(rows))
    }

    async fn view_where(
        &self,
        column: &str,
        value: &str,
        auth_token: Option<&str>,
    ) -> Result<AccessRequestView, StoreError> {
        let query = Query::new().eq(column, value).order(Order::asc("created_at"));
        let rows = self.store.select(ACCESS_REQUESTS_TABLE, &query, auth_token).await?;
        Ok(AccessRequestView::from_requests(decode(rows)))
    }

    async fn reports_of(
        &self,
        patient_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Vec<Report>, StoreError> {
        let query = Query::new()
            .eq(Report::OWNER_COLUMN, patient_id)
            .order(Report::natural_order());
        let rows = self.store.select(Report::TABLE, &query, auth_token).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect())
    }
}

fn decode(rows: Vec<serde_json::Value>) -> Vec<AccessRequest> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(request) => Some(request),
            Err(e) => {
                warn!("Skipping malformed access request: {}", e);
                None
            }
        })
        .collect()
}

fn store_error(e: anyhow::Error) -> AccessError {
    match e.downcast::<StoreError>() {
        Ok(store) => AccessError::Store(store),
        Err(other) => AccessError::Store(StoreError::Request(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use shared_database::InMemoryRecordStore;
    use shared_utils::test_utils::{MockSupabaseResponses, TestUser};

    struct Fixture {
        service: AccessControlService,
        store: Arc<InMemoryRecordStore>,
        doctor: Actor,
        patient: Actor,
    }

    fn actor(user: TestUser) -> Actor {
        let role = user.portal_role().unwrap();
        Actor {
            user: user.to_user(),
            role,
            token: "test-token".to_string(),
        }
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryRecordStore::default());
        let doctor = actor(TestUser::doctor("grey@example.com"));
        let patient = actor(TestUser::patient("pat@example.com"));

        store
            .insert("patients", MockSupabaseResponses::patient_row(patient.id(), "Pat Jones"), None)
            .await
            .unwrap();
        store
            .insert("doctors", MockSupabaseResponses::doctor_row(doctor.id(), "Dr. Grey"), None)
            .await
            .unwrap();

        Fixture {
            service: AccessControlService::new(store.clone()),
            store,
            doctor,
            patient,
        }
    }

    #[tokio::test]
    async fn test_no_requests_means_no_visibility() {
        let f = fixture().await;
        for class in [ResourceClass::Profile, ResourceClass::Reports] {
            assert!(!f.service.check_visibility(f.doctor.id(), f.patient.id(), class, None).await);
        }
        let board = f.service.doctor_board(f.doctor.id(), None).await.unwrap();
        assert_eq!(board[0].badge, AccessBadge::RequestAccess);
    }

    #[tokio::test]
    async fn test_request_then_approve_grants_covered_class() {
        let f = fixture().await;
        let request = f
            .service
            .request_access(&f.doctor, f.patient.id(), AccessScope::Reports)
            .await
            .unwrap();
        assert_eq!(request.status, AccessStatus::Pending);

        let approved = f.service.approve(&f.patient, &request.id).await.unwrap();
        assert_eq!(approved.status, AccessStatus::Approved);

        assert!(f.service.check_visibility(f.doctor.id(), f.patient.id(), ResourceClass::Reports, None).await);
        assert!(!f.service.check_visibility(f.doctor.id(), f.patient.id(), ResourceClass::Profile, None).await);
    }

    #[tokio::test]
    async fn test_duplicate_request_creates_nothing() {
        let f = fixture().await;
        f.service.request_access(&f.doctor, f.patient.id(), AccessScope::All).await.unwrap();

        assert_matches!(
            f.service.request_access(&f.doctor, f.patient.id(), AccessScope::All).await,
            Err(AccessError::DuplicatePendingRequest)
        );
        assert_eq!(f.store.rows(ACCESS_REQUESTS_TABLE).await.len(), 1);
    }

    #[tokio::test]
    async fn test_request_after_approval_is_invalid_state() {
        let f = fixture().await;
        let request = f.service.request_access(&f.doctor, f.patient.id(), AccessScope::All).await.unwrap();
        f.service.approve(&f.patient, &request.id).await.unwrap();

        assert_matches!(
            f.service.request_access(&f.doctor, f.patient.id(), AccessScope::All).await,
            Err(AccessError::InvalidState(_))
        );
    }

    #[tokio::test]
    async fn test_rerequest_after_rejection_keeps_history() {
        let f = fixture().await;
        let first = f.service.request_access(&f.doctor, f.patient.id(), AccessScope::All).await.unwrap();
        f.service.reject(&f.patient, &first.id).await.unwrap();

        f.service.request_access(&f.doctor, f.patient.id(), AccessScope::Profile).await.unwrap();
        assert_eq!(f.store.rows(ACCESS_REQUESTS_TABLE).await.len(), 2);

        let pending = f.service.pending_for_patient(f.patient.id(), None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].doctor_name, "Dr. Grey");
        assert_eq!(pending[0].request_type, AccessScope::Profile);
    }

    #[tokio::test]
    async fn test_decisions_only_from_pending() {
        let f = fixture().await;
        let request = f.service.request_access(&f.doctor, f.patient.id(), AccessScope::All).await.unwrap();
        f.service.reject(&f.patient, &request.id).await.unwrap();

        assert_matches!(f.service.approve(&f.patient, &request.id).await, Err(AccessError::InvalidState(_)));
        assert_matches!(f.service.reject(&f.patient, &request.id).await, Err(AccessError::InvalidState(_)));
        assert_matches!(f.service.approve(&f.patient, "missing").await, Err(AccessError::NotFound));
    }

    #[tokio::test]
    async fn test_superseded_pending_row_cannot_be_decided() {
        let f = fixture().await;
        for (id, created_at) in [("older", "2024-03-01T10:00:00Z"), ("newer", "2024-03-01T10:00:01Z")] {
            f.store
                .insert(ACCESS_REQUESTS_TABLE, json!({
                    "id": id, "doctor_id": f.doctor.id(), "patient_id": f.patient.id(),
                    "request_type": "all", "status": "pending", "created_at": created_at
                }), None)
                .await
                .unwrap();
        }

        assert_matches!(f.service.approve(&f.patient, "older").await, Err(AccessError::InvalidState(_)));
        assert_matches!(f.service.reject(&f.patient, "older").await, Err(AccessError::InvalidState(_)));
        assert!(!f.service.check_visibility(f.doctor.id(), f.patient.id(), ResourceClass::Profile, None).await);

        f.service.approve(&f.patient, "newer").await.unwrap();
        assert!(f.service.check_visibility(f.doctor.id(), f.patient.id(), ResourceClass::Profile, None).await);
        assert_matches!(f.service.approve(&f.patient, "older").await, Err(AccessError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_concurrent_requests_leave_one_decidable_row() {
        let f = fixture().await;
        let (first, second) = tokio::join!(
            f.service.request_access(&f.doctor, f.patient.id(), AccessScope::All),
            f.service.request_access(&f.doctor, f.patient.id(), AccessScope::All),
        );
        assert!(first.is_ok() || second.is_ok());

        let mut approvals = 0;
        for row in f.store.rows(ACCESS_REQUESTS_TABLE).await {
            let id = row["id"].as_str().unwrap().to_string();
            match f.service.approve(&f.patient, &id).await {
                Ok(_) => approvals += 1,
                Err(e) => assert_matches!(e, AccessError::InvalidState(_)),
            }
        }

        assert_eq!(approvals, 1);
        assert!(f.service.check_visibility(f.doctor.id(), f.patient.id(), ResourceClass::Profile, None).await);
        let board = f.service.doctor_board(f.doctor.id(), None).await.unwrap();
        assert_eq!(board[0].badge, AccessBadge::ViewRecords);
    }

    #[tokio::test]
    async fn test_only_addressed_patient_decides() {
        let f = fixture().await;
        let request = f.service.request_access(&f.doctor, f.patient.id(), AccessScope::All).await.unwrap();
        let stranger = actor(TestUser::patient("other@example.com"));

        assert_matches!(f.service.approve(&stranger, &request.id).await, Err(AccessError::Forbidden(_)));
        assert_matches!(f.service.approve(&f.doctor, &request.id).await, Err(AccessError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_patient_cannot_request_and_empty_ref_is_malformed() {
        let f = fixture().await;
        assert_matches!(
            f.service.request_access(&f.patient, "someone", AccessScope::All).await,
            Err(AccessError::Forbidden(_))
        );
        assert_matches!(
            f.service.request_access(&f.doctor, "  ", AccessScope::All).await,
            Err(AccessError::MalformedInput(_))
        );
    }

    #[tokio::test]
    async fn test_visibility_fails_closed() {
        let f = fixture().await;
        let request = f.service.request_access(&f.doctor, f.patient.id(), AccessScope::All).await.unwrap();
        f.service.approve(&f.patient, &request.id).await.unwrap();

        f.store.set_available(false);
        assert!(!f.service.check_visibility(f.doctor.id(), f.patient.id(), ResourceClass::Profile, None).await);
    }

    #[tokio::test]
    async fn test_pending_lists_unknown_doctor() {
        let f = fixture().await;
        let stranger = actor(TestUser::doctor("nobody@example.com"));
        f.service.request_access(&stranger, f.patient.id(), AccessScope::All).await.unwrap();

        let pending = f.service.pending_for_patient(f.patient.id(), None).await.unwrap();
        assert_eq!(pending[0].doctor_name, UNKNOWN_DOCTOR);
    }

    #[tokio::test]
    async fn test_board_and_records_follow_scope() {
        let f = fixture().await;
        for (title, date) in [("Blood panel", "2024-01-10"), ("X-ray", "2024-02-01"), ("ECG", "2024-03-05")] {
            f.store
                .insert("reports", json!({
                    "id": title, "user_id": f.patient.id(), "title": title,
                    "doctor_name": "Dr. Grey", "date": date
                }), None)
                .await
                .unwrap();
        }

        let request = f.service.request_access(&f.doctor, f.patient.id(), AccessScope::Reports).await.unwrap();
        f.service.approve(&f.patient, &request.id).await.unwrap();

        let board = f.service.doctor_board(f.doctor.id(), None).await.unwrap();
        assert_eq!(board[0].badge, AccessBadge::ViewRecords);
        assert_eq!(board[0].report_count, Some(3));
        assert_eq!(board[0].recent_reports, vec!["ECG".to_string(), "X-ray".to_string()]);

        let records = f.service.patient_records(f.doctor.id(), f.patient.id(), None).await.unwrap();
        assert!(records.profile.is_none());
        assert_eq!(records.reports.map(|r| r.len()), Some(3));
    }

    #[tokio::test]
    async fn test_records_forbidden_while_pending() {
        let f = fixture().await;
        f.service.request_access(&f.doctor, f.patient.id(), AccessScope::All).await.unwrap();
        assert_matches!(
            f.service.patient_records(f.doctor.id(), f.patient.id(), None).await,
            Err(AccessError::Forbidden(_))
        );
    }
}
