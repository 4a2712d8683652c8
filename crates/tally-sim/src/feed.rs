//! Scheduled price source.
//!
//! Serves the latest [`FeedPoint`] whose `at` is not after the query time.
//! Each point is its own round: point `i` is round `i + 1`, and an
//! `incomplete` point reports its answer as computed in the previous round.

use tally_oracle::source::PriceSource;
use tally_oracle::SourceError;
use tally_types::price::RawFeedReading;

use crate::config::FeedPoint;

/// A feed replaying a fixed schedule of answers.
#[derive(Debug, Clone)]
pub struct ScheduledSource {
    name: String,
    points: Vec<FeedPoint>,
}

impl ScheduledSource {
    /// Create a source from `points` in any order.
    pub fn new(name: impl Into<String>, mut points: Vec<FeedPoint>) -> Self {
        points.sort_by_key(|p| p.at);
        Self {
            name: name.into(),
            points,
        }
    }

    /// Whether the schedule has any answers at all.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl PriceSource for ScheduledSource {
    fn read(&self, now: u64) -> Result<RawFeedReading, SourceError> {
        let index = self.points.partition_point(|p| p.at <= now);
        let Some(round) = index.checked_sub(1) else {
            return Err(SourceError::Unavailable(format!(
                "{} has no answer before {now}",
                self.name
            )));
        };
        let point = &self.points[round];
        if point.offline {
            return Err(SourceError::Unavailable(format!("{} is offline", self.name)));
        }
        let round_id = round as u64 + 1;
        Ok(RawFeedReading {
            price: point.price,
            updated_at: point.updated_at.unwrap_or(point.at),
            round_id,
            answered_in_round: if point.incomplete {
                round_id - 1
            } else {
                round_id
            },
            decimals: point.decimals,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
