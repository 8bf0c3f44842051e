//! Citizen existence check against the centralizer.
//!
//! Records a [`ValidationRecord`] per call and publishes nothing.

use docauth_types::{TraceId, ValidationRecord};
use tracing::{Span, error, info, instrument};

use crate::centralizer::{Centralizer, TransportFailure};
use crate::clock::Clock;
use crate::store::{StoreError, TraceStore};

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("citizen validation {trace_id} failed: {source}")]
    Centralizer {
        trace_id: TraceId,
        #[source]
        source: TransportFailure,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct CitizenValidator<C, S, K> {
    centralizer: C,
    records: S,
    clock: K,
}

impl<C, S, K> CitizenValidator<C, S, K>
where
    C: Centralizer,
    S: TraceStore<ValidationRecord>,
    K: Clock,
{
    pub fn new(centralizer: C, records: S, clock: K) -> Self {
        Self {
            centralizer,
            records,
            clock,
        }
    }

    /// Ask the centralizer whether it already knows `citizen_id`.
    ///
    /// The returned record is `ELIGIBLE` when it does not.
    #[instrument(
        name = "citizen.validate",
        skip(self),
        fields(trace_id = tracing::field::Empty)
    )]
    pub async fn validate(&self, citizen_id: i64) -> Result<ValidationRecord, ValidationError> {
        let id = TraceId::generate();
        Span::current().record("trace_id", tracing::field::display(&id));
        let requested_at = self.clock.now();

        match self.centralizer.validate_citizen(citizen_id).await {
            Ok(lookup) => {
                let record = ValidationRecord::answered(
                    id,
                    citizen_id,
                    lookup.exists,
                    lookup.status_code,
                    requested_at,
                );
                self.records.create(&record).await?;
                info!(status = ?record.status(), "Citizen validated");
                Ok(record)
            }
            Err(failure) => {
                error!(error = %failure, "Citizen validation failed");
                let record =
                    ValidationRecord::failed(id.clone(), citizen_id, &failure.to_string(), requested_at);
                if let Err(e) = self.records.create(&record).await {
                    error!(error = %e, "Failed to store validation ERROR record");
                }
                Err(ValidationError::Centralizer {
                    trace_id: id,
                    source: failure,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockCentralizer, MockClock};
    use crate::store::MemoryTraceStore;
    use docauth_types::ValidationStatus;

    fn setup() -> (
        CitizenValidator<MockCentralizer, MemoryTraceStore<ValidationRecord>, MockClock>,
        MockCentralizer,
        MemoryTraceStore<ValidationRecord>,
    ) {
        let centralizer = MockCentralizer::new();
        let records = MemoryTraceStore::new();
        let validator = CitizenValidator::new(centralizer.clone(), records.clone(), MockClock::new());
        (validator, centralizer, records)
    }

    #[tokio::test]
    async fn unknown_citizen_is_eligible() {
        let (validator, centralizer, records) = setup();
        centralizer.citizen_exists(false);

        let record = validator.validate(1128456232).await.unwrap();

        assert_eq!(record.status(), ValidationStatus::Eligible);
        assert_eq!(record.external_status_code(), Some(204));
        assert_eq!(centralizer.validate_calls(), vec![1128456232]);
        assert_eq!(records.list_by_subject(1128456232).await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn known_citizen_is_already_registered_and_data_is_not_kept() {
        let (validator, centralizer, records) = setup();
        centralizer.citizen_exists(true);

        let record = validator.validate(7).await.unwrap();

        assert_eq!(record.status(), ValidationStatus::AlreadyRegistered);
        let stored = serde_json::to_value(&records.all()[0]).unwrap();
        assert!(stored.get("data").is_none());
        assert!(!stored.to_string().contains("Ana"));
    }

    #[tokio::test]
    async fn transport_failure_is_recorded_and_returned() {
        let (validator, centralizer, records) = setup();
        centralizer.fail_lookup(TransportFailure::UnexpectedStatus {
            url: "http://centralizer.test/apis/validateCitizen/7".to_string(),
            status: 503,
        });

        let err = validator.validate(7).await.unwrap_err();

        assert!(matches!(err, ValidationError::Centralizer { .. }));
        let stored = records.all();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status(), ValidationStatus::Error);
        assert!(stored[0].error_message().contains("503"));
    }
}
