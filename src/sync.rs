use futures::{stream, StreamExt};
use log::{info, warn};
use thiserror::Error;

use crate::{
    catalog::{Course, TimeBlock, TitleCodeIndex},
    fetch::FetchError,
    parse::{RemoteSection, SectionsResponse},
    rate::RateLimiter,
    schedule::{ScheduleService, SectionsRequest, Session},
};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no title code found for {course_name} ({curriculum_id})")]
    LookupMiss {
        course_name: String,
        curriculum_id: String,
    },
    #[error("could not fetch sections of {course_name}: {source}")]
    Fetch {
        course_name: String,
        #[source]
        source: FetchError,
    },
}

#[derive(Clone, Debug)]
pub struct SyncOptions {
    /// Requests allowed in flight at once; results are still applied in
    /// input order.
    pub concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
    pub sections_with_times: usize,
}

/// Fills in `times` on every section of every course that has a title code.
/// A course that cannot be fetched gets all of its sections nulled; it never
/// stops the rest of the batch.
pub async fn synchronize<S: ScheduleService>(
    courses: &mut [Course],
    index: &TitleCodeIndex,
    session: &Session,
    service: &S,
    limiter: &RateLimiter,
    options: &SyncOptions,
) -> SyncReport {
    let total = courses.len();
    let mut report = SyncReport::default();

    let mut pending = Vec::new();
    for (position, course) in courses.iter().enumerate() {
        match index.request_key(&course.curriculum_id) {
            Some(key) => pending.push((position, course.course_name.clone(), key)),
            None => {
                let miss = SyncError::LookupMiss {
                    course_name: course.course_name.clone(),
                    curriculum_id: course.curriculum_id.clone(),
                };
                warn!("{}", miss);
                report.skipped += 1;
            }
        }
    }

    let outcomes: Vec<_> = stream::iter(pending)
        .map(|(position, course_name, key)| async move {
            limiter.until_ready().await;
            info!("fetching {}/{}: {}", position + 1, total, course_name);

            let request = SectionsRequest {
                course_id: &key,
                session_id: &session.token,
                year_term: &session.term,
            };
            let outcome = service.sections(request).await;
            (position, course_name, outcome)
        })
        .buffered(options.concurrency.max(1))
        .collect()
        .await;

    for (position, course_name, outcome) in outcomes {
        let course = &mut courses[position];
        match outcome {
            Ok(response) => {
                merge_sections(course, &response);
                report.synced += 1;
            }
            Err(source) => {
                let kind = source.kind();
                let failure = SyncError::Fetch {
                    course_name,
                    source,
                };
                warn!("{} failure: {}", kind, failure);
                course.clear_times();
                report.failed += 1;
            }
        }
    }

    report.sections_with_times = courses
        .iter()
        .flat_map(|course| &course.sections)
        .filter(|section| section.times().is_some())
        .count();

    report
}

/// Matches local sections to remote ones by section number and replaces
/// their times. Sections without a usable remote counterpart end up null.
pub fn merge_sections(course: &mut Course, response: &SectionsResponse) {
    for section in &mut course.sections {
        let times = response
            .section(&section.section_number)
            .map(time_blocks)
            .unwrap_or_default();
        section.set_times(times);
    }
}

fn time_blocks(remote: &RemoteSection) -> Vec<TimeBlock> {
    remote
        .times
        .iter()
        .flatten()
        .filter_map(|time| match time.to_time_block() {
            Ok(block) => block,
            Err(error) => {
                warn!(
                    "dropping time of section {}: {}",
                    remote.section_number, error
                );
                None
            }
        })
        .collect()
}
