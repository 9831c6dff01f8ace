// ranker.rs — In-process fill-in ranking for vacated slots.
//
// Eligibility: not already working that day, and no back-to-back pairing
// across midnight (a late shift the day before a night slot, or a night shift
// the day after a late slot). Eligible employees are ordered by how many
// shifts they already hold that week, then by id.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Duration;
use rota_changeset::{
    week_range_containing, Candidate, ChangeSetError, EmployeeId, RankRequest, Shift,
    SuggestionRanker, TimeSlot,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadBalancingRanker;

impl LoadBalancingRanker {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous form of [`SuggestionRanker::rank`].
    pub fn rank_now(&self, request: &RankRequest, current: &[Shift]) -> Vec<Candidate> {
        let date = request.date;
        let slot = request.time_slot;
        let works = |employee_id: EmployeeId, day, wanted: Option<TimeSlot>| {
            current.iter().any(|s| {
                s.is_on(employee_id, day) && wanted.map_or(true, |w| s.slot() == Some(w))
            })
        };

        let (week_start, week_end) = week_range_containing(date);
        let mut weekly: HashMap<EmployeeId, usize> = HashMap::new();
        for shift in current
            .iter()
            .filter(|s| s.date >= week_start && s.date <= week_end)
        {
            *weekly.entry(shift.employee_id).or_default() += 1;
        }

        let mut eligible: Vec<(usize, EmployeeId, &str)> = request
            .roster
            .employees()
            .iter()
            .filter(|e| !works(e.id, date, None))
            .filter(|e| match slot {
                TimeSlot::Night => !works(e.id, date - Duration::days(1), Some(TimeSlot::Late)),
                TimeSlot::Late => !works(e.id, date + Duration::days(1), Some(TimeSlot::Night)),
                TimeSlot::Early => true,
            })
            .map(|e| (weekly.get(&e.id).copied().unwrap_or(0), e.id, e.name.as_str()))
            .collect();
        eligible.sort();

        eligible
            .into_iter()
            .zip(1u32..)
            .map(|((_, employee_id, name), rank)| Candidate {
                employee_id,
                name: name.to_string(),
                rank,
            })
            .collect()
    }
}

#[async_trait]
impl SuggestionRanker for LoadBalancingRanker {
    async fn rank(
        &self,
        request: &RankRequest,
        current: &[Shift],
    ) -> Result<Vec<Candidate>, ChangeSetError> {
        Ok(self.rank_now(request, current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rota_changeset::{Employee, Roster};

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn roster() -> Roster {
        Roster::new(vec![
            Employee::new(1, "Aoki"),
            Employee::new(2, "Baba"),
            Employee::new(3, "Chiba"),
            Employee::new(4, "Doi"),
        ])
    }

    fn ids(candidates: &[Candidate]) -> Vec<EmployeeId> {
        candidates.iter().map(|c| c.employee_id).collect()
    }

    #[test]
    fn busy_that_day_is_excluded_and_load_orders_the_rest() {
        let current = vec![
            Shift::new(1, day("2024-06-05"), TimeSlot::Late),
            Shift::new(2, day("2024-06-03"), TimeSlot::Early),
            Shift::new(2, day("2024-06-04"), TimeSlot::Early),
            Shift::new(3, day("2024-06-03"), TimeSlot::Early),
        ];
        let request = RankRequest {
            date: day("2024-06-05"),
            time_slot: TimeSlot::Early,
            roster: roster(),
        };
        let ranked = LoadBalancingRanker.rank_now(&request, &current);
        assert_eq!(ids(&ranked), vec![4, 3, 2]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[2].rank, 3);
    }

    #[test]
    fn late_before_night_is_excluded() {
        let current = vec![Shift::new(1, day("2024-06-04"), TimeSlot::Late)];
        let request = RankRequest {
            date: day("2024-06-05"),
            time_slot: TimeSlot::Night,
            roster: roster(),
        };
        let ranked = LoadBalancingRanker.rank_now(&request, &current);
        assert!(!ids(&ranked).contains(&1));
    }

    #[test]
    fn night_after_late_is_excluded_across_week_boundary() {
        // Sunday late slot; employee 2 works Monday night of the next week.
        let current = vec![Shift::new(2, day("2024-06-10"), TimeSlot::Night)];
        let request = RankRequest {
            date: day("2024-06-09"),
            time_slot: TimeSlot::Late,
            roster: roster(),
        };
        let ranked = LoadBalancingRanker.rank_now(&request, &current);
        assert_eq!(ids(&ranked), vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn trait_form_matches_sync_form() {
        let request = RankRequest {
            date: day("2024-06-05"),
            time_slot: TimeSlot::Early,
            roster: roster(),
        };
        let ranked = LoadBalancingRanker::new().rank(&request, &[]).await.unwrap();
        assert_eq!(ids(&ranked), vec![1, 2, 3, 4]);
    }
}
