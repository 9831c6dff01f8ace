// baseline.rs — Load an optimizer-produced week into the Shift Store.

use crate::error::ChangeSetError;
use crate::external::{OptimizationStatus, OptimizeRequest, Optimizer};
use crate::shift_store::ShiftStore;

/// Ask the optimizer for a week and load the result as a new schedule version.
///
/// An infeasible result is reported as [`ChangeSetError::Infeasible`] and the
/// store is left untouched; a partial result is never loaded.
pub async fn generate_baseline(
    optimizer: &dyn Optimizer,
    store: &ShiftStore,
    request: &OptimizeRequest,
) -> Result<u64, ChangeSetError> {
    let response = optimizer.optimize(request).await?;
    for warning in &response.warnings {
        tracing::warn!(week_start = %request.week_start, "optimizer: {}", warning);
    }
    if response.optimization_status == OptimizationStatus::Infeasible {
        return Err(ChangeSetError::Infeasible {
            warnings: response.warnings,
        });
    }
    if let Some(outside) = response
        .shifts
        .iter()
        .find(|s| s.date < request.week_start || s.date > request.week_end)
    {
        return Err(ChangeSetError::Collaborator(format!(
            "optimizer returned a shift on {} outside {}..{}",
            outside.date, request.week_start, request.week_end
        )));
    }
    store.load(response.shifts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::OptimizeResponse;
    use crate::shift::{Shift, TimeSlot};
    use async_trait::async_trait;
    use chrono::NaiveDate;

    struct Fixed(OptimizeResponse);

    #[async_trait]
    impl Optimizer for Fixed {
        async fn optimize(&self, _request: &OptimizeRequest) -> Result<OptimizeResponse, ChangeSetError> {
            Ok(self.0.clone())
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn request() -> OptimizeRequest {
        OptimizeRequest {
            week_start: day("2024-06-03"),
            week_end: day("2024-06-09"),
            employee_ids: vec![1, 2],
            constraints: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn feasible_result_becomes_new_version() {
        let store = ShiftStore::new();
        let optimizer = Fixed(OptimizeResponse {
            shifts: vec![
                Shift::new(1, day("2024-06-03"), TimeSlot::Early),
                Shift::new(2, day("2024-06-03"), TimeSlot::Late),
            ],
            optimization_status: OptimizationStatus::Feasible,
            warnings: vec![],
        });
        let version = generate_baseline(&optimizer, &store, &request()).await.unwrap();
        assert_eq!(version, 1);
        assert_eq!(store.snapshot().unwrap().shifts.len(), 2);
    }

    #[tokio::test]
    async fn infeasible_result_is_reported_and_store_untouched() {
        let store = ShiftStore::new();
        let optimizer = Fixed(OptimizeResponse {
            shifts: vec![Shift::new(1, day("2024-06-03"), TimeSlot::Early)],
            optimization_status: OptimizationStatus::Infeasible,
            warnings: vec!["night coverage short on 2024-06-05".into()],
        });
        let err = generate_baseline(&optimizer, &store, &request()).await.unwrap_err();
        match err {
            ChangeSetError::Infeasible { warnings } => assert_eq!(warnings.len(), 1),
            other => panic!("expected infeasible, got {:?}", other),
        }
        assert_eq!(store.version().unwrap(), 0);
    }
}
