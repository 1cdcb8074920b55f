use crate::errors::{Error, Result};
use crate::pipeline::{ApprovalPipeline, PipelineState};
use crate::tally::ReactionSource;

use chrono::{DateTime, Duration, LocalResult, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use db::LinkStore;
use humantime::format_duration;
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::watch;

/// Daily wall clock time, in a given zone, at which approvals are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishSchedule {
    at: NaiveTime,
    tz: Tz,
}

impl PublishSchedule {
    pub const fn new(at: NaiveTime, tz: Tz) -> PublishSchedule {
        PublishSchedule { at, tz }
    }

    /// Parses an `HH:MM` time and an IANA zone name.
    pub fn parse(time: &str, timezone: &str) -> Result<PublishSchedule> {
        let at = NaiveTime::parse_from_str(time.trim(), "%H:%M").map_err(|why| {
            Error::Configuration(format!("PUBLISH_TIME {time:?} is not HH:MM: {why}"))
        })?;
        let tz = timezone.trim().parse::<Tz>().map_err(|why| {
            Error::Configuration(format!("TIMEZONE {timezone:?} is not a known zone: {why}"))
        })?;
        Ok(PublishSchedule::new(at, tz))
    }

    /// First publish instant strictly after `now`.
    ///
    /// A local time skipped by a DST change has no run that day. When the
    /// local time happens twice the earlier instant is used.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut date = now.with_timezone(&self.tz).date_naive();
        // a day with a valid instant after `now` is at most two days ahead
        for _ in 0..3 {
            let candidate = match self.tz.from_local_datetime(&date.and_time(self.at)) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                    Some(dt.with_timezone(&Utc))
                }
                LocalResult::None => None,
            };
            if let Some(candidate) = candidate.filter(|c| *c > now) {
                return candidate;
            }
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        now + Duration::days(1)
    }
}

/// Publish instant following the run that fired at `previous`.
///
/// Always after `previous`, even when the monotonic sleep wakes a hair before
/// the wall clock reaches it.
fn following_run(
    schedule: &PublishSchedule,
    previous: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    schedule.next_after(previous.map_or(now, |previous| previous.max(now)))
}

/// Fires the pipeline at every publish instant until `shutdown` flips to true
/// or its sender goes away. Each run is spawned so a slow run cannot delay the
/// following trigger; overlapping runs are refused by the pipeline itself.
pub async fn run_daily<S, R>(
    pipeline: Arc<ApprovalPipeline<S, R>>,
    schedule: PublishSchedule,
    mut shutdown: watch::Receiver<bool>,
) where
    S: LinkStore + 'static,
    R: ReactionSource + 'static,
{
    let mut previous = None;
    loop {
        if *shutdown.borrow() {
            break;
        }

        let now = Utc::now();
        let next = following_run(&schedule, previous, now);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(
            "next approval run at {next} (in {})",
            format_duration(std::time::Duration::from_secs(wait.as_secs()))
        );

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        }

        previous = Some(next);
        let state = pipeline.state();
        if state != PipelineState::Idle {
            debug!("approval pipeline is still {state:?}");
        }
        let pipeline = pipeline.clone();
        let run_shutdown = shutdown.clone();
        tokio::spawn(async move { pipeline.tick(run_shutdown).await });
    }
    info!("scheduler stopped");
}
