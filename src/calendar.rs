use std::{fs, io};

use chrono::{Days, NaiveDate, NaiveDateTime};
use icalendar::{
    Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, EventLike,
};
use log::{info, warn};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server answered {0}")]
    Status(StatusCode),
    #[error("could not read file: {0}")]
    Read(#[from] io::Error),
    #[error("not an iCalendar document: {0}")]
    Parse(String),
}

/// One line of the sources file: a course name followed by a feed URL or a
/// local path.
#[derive(Clone, Debug, PartialEq)]
pub struct CalendarSource {
    pub course: String,
    pub location: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CalendarEvent {
    pub assignment: String,
    pub due_date: Option<NaiveDate>,
    pub course: String,
}

#[derive(Debug, Serialize)]
pub struct Schedule {
    pub generated_at: NaiveDateTime,
    pub total_events: usize,
    pub courses: Vec<String>,
    pub events: Vec<CalendarEvent>,
}

const LOCATION_MARKERS: [&str; 3] = ["http://", "https://", "./"];

/// Lines without a recognizable location are skipped. A course listed twice
/// keeps its first position and its last location.
pub fn parse_sources(text: &str) -> Vec<CalendarSource> {
    let mut sources: Vec<CalendarSource> = Vec::new();

    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some(start) = LOCATION_MARKERS
            .iter()
            .find_map(|marker| line.find(*marker))
        else {
            warn!("no feed location in {:?}, skipping", line);
            continue;
        };

        let course = line[..start].trim().to_owned();
        let location = line[start..].trim().to_owned();
        match sources.iter_mut().find(|source| source.course == course) {
            Some(existing) => existing.location = location,
            None => sources.push(CalendarSource { course, location }),
        }
    }

    sources
}

/// Strips the `Canvas (...)` wrapper the LMS puts around course names.
pub fn course_label(name: &str) -> &str {
    name.strip_prefix("Canvas (")
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(name)
}

pub async fn load_source(client: &Client, location: &str) -> Result<String, CalendarError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let response = client.get(location).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CalendarError::Status(status));
        }
        Ok(response.text().await?)
    } else {
        Ok(fs::read_to_string(location)?)
    }
}

fn calendar_date(value: DatePerhapsTime) -> NaiveDate {
    match value {
        DatePerhapsTime::Date(date) => date,
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(date_time)) => date_time.date(),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(date_time)) => date_time.date_naive(),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, .. }) => {
            date_time.date()
        }
    }
}

/// Feeds mark an assignment due on a day by ending the event at the start
/// of the next one.
fn due_date(start: Option<DatePerhapsTime>, end: Option<DatePerhapsTime>) -> Option<NaiveDate> {
    match (start, end) {
        (_, Some(end)) => calendar_date(end).checked_sub_days(Days::new(1)),
        (Some(start), None) => Some(calendar_date(start)),
        (None, None) => None,
    }
}

pub fn events_from_ical(course: &str, content: &str) -> Result<Vec<CalendarEvent>, CalendarError> {
    let calendar: Calendar = content.parse().map_err(CalendarError::Parse)?;
    let course = course_label(course);

    let events = calendar
        .components
        .iter()
        .filter_map(|component| match component {
            CalendarComponent::Event(event) => Some(CalendarEvent {
                assignment: event.get_summary().unwrap_or_default().to_owned(),
                due_date: due_date(event.get_start(), event.get_end()),
                course: course.to_owned(),
            }),
            _ => None,
        })
        .collect();

    Ok(events)
}

/// Events of every source in file order. A source that cannot be loaded or
/// parsed contributes nothing.
pub async fn collect_events(client: &Client, sources: &[CalendarSource]) -> Vec<CalendarEvent> {
    let mut events = Vec::new();

    for source in sources {
        info!("processing {}", source.course);
        let loaded = match load_source(client, &source.location).await {
            Ok(content) => events_from_ical(&source.course, &content),
            Err(error) => Err(error),
        };

        match loaded {
            Ok(found) => {
                info!("found {} events", found.len());
                events.extend(found);
            }
            Err(error) => warn!("could not process {}: {}", source.course, error),
        }
    }

    events
}

/// Sorted by due date, keeping feed order among equal dates. Undated events
/// go last.
pub fn build_schedule(
    sources: &[CalendarSource],
    mut events: Vec<CalendarEvent>,
    generated_at: NaiveDateTime,
) -> Schedule {
    events.sort_by_key(|event| (event.due_date.is_none(), event.due_date));

    Schedule {
        generated_at,
        total_events: events.len(),
        courses: sources
            .iter()
            .map(|source| course_label(&source.course).to_owned())
            .collect(),
        events,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::fetch::{make_client, stub::serve_once};

    fn feed(events: &[&[&str]]) -> String {
        let mut lines = vec!["BEGIN:VCALENDAR", "VERSION:2.0", "PRODID:-//LMS//Feed//EN"];
        for event in events {
            lines.push("BEGIN:VEVENT");
            lines.extend_from_slice(event);
            lines.push("END:VEVENT");
        }
        lines.push("END:VCALENDAR");
        lines.join("\r\n") + "\r\n"
    }

    fn date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, month, day)
    }

    fn event(assignment: &str, due_date: Option<NaiveDate>) -> CalendarEvent {
        CalendarEvent {
            assignment: assignment.to_owned(),
            due_date,
            course: "WRTG 150".to_owned(),
        }
    }

    #[test]
    fn reads_source_lines() {
        let sources = parse_sources(
            "Canvas (CS 235) https://byu.instructure.com/feeds/calendars/user_1.ics\n\
             \n\
             just a note\n\
             WRTG 150 ./feeds/wrtg.ics\n\
             Old Course http://example.com/a.ics\n\
             Canvas (CS 235) https://byu.instructure.com/feeds/calendars/user_2.ics\n",
        );

        assert_eq!(
            sources,
            [
                CalendarSource {
                    course: "Canvas (CS 235)".to_owned(),
                    location: "https://byu.instructure.com/feeds/calendars/user_2.ics".to_owned(),
                },
                CalendarSource {
                    course: "WRTG 150".to_owned(),
                    location: "./feeds/wrtg.ics".to_owned(),
                },
                CalendarSource {
                    course: "Old Course".to_owned(),
                    location: "http://example.com/a.ics".to_owned(),
                },
            ]
        );
    }

    #[test]
    fn strips_the_canvas_wrapper() {
        assert_eq!(course_label("Canvas (CS 235)"), "CS 235");
        assert_eq!(course_label("CS 235"), "CS 235");
        assert_eq!(course_label("Canvas (CS 235"), "Canvas (CS 235");
    }

    #[test]
    fn due_dates_come_from_the_day_before_the_end() {
        let content = feed(&[
            &[
                "UID:1",
                "SUMMARY:Essay 1",
                "DTSTART;VALUE=DATE:20250115",
                "DTEND;VALUE=DATE:20250116",
            ],
            &["UID:2", "SUMMARY:Quiz", "DTSTART:20250110T235900Z"],
            &["UID:3", "DTSTART:20250120T090000", "DTEND:20250121T090000"],
            &["UID:4", "SUMMARY:Reading"],
        ]);

        let events = events_from_ical("Canvas (WRTG 150)", &content).unwrap();

        assert_eq!(
            events,
            [
                event("Essay 1", date(2025, 1, 15)),
                event("Quiz", date(2025, 1, 10)),
                event("", date(2025, 1, 20)),
                event("Reading", None),
            ]
        );
    }

    #[test]
    fn schedule_is_sorted_by_due_date() {
        let sources = parse_sources(
            "Canvas (WRTG 150) ./wrtg.ics\n\
             CS 235 ./cs.ics\n",
        );
        let events = vec![
            event("Late", date(2025, 3, 1)),
            event("Undated", None),
            event("Early", date(2025, 1, 5)),
            event("Also early", date(2025, 1, 5)),
        ];
        let generated_at = date(2025, 1, 1).unwrap().and_hms_opt(8, 30, 0).unwrap();

        let schedule = build_schedule(&sources, events, generated_at);

        assert_eq!(
            serde_json::to_value(&schedule).unwrap(),
            json!({
                "generated_at": "2025-01-01T08:30:00",
                "total_events": 4,
                "courses": ["WRTG 150", "CS 235"],
                "events": [
                    { "assignment": "Early", "due_date": "2025-01-05", "course": "WRTG 150" },
                    { "assignment": "Also early", "due_date": "2025-01-05", "course": "WRTG 150" },
                    { "assignment": "Late", "due_date": "2025-03-01", "course": "WRTG 150" },
                    { "assignment": "Undated", "due_date": null, "course": "WRTG 150" },
                ],
            })
        );
    }

    #[tokio::test]
    async fn broken_sources_do_not_stop_the_rest() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("cs.ics");
        fs::write(
            &local,
            feed(&[&["UID:1", "SUMMARY:Lab 1", "DTEND;VALUE=DATE:20250201"]]),
        )
        .unwrap();
        let (url, server) = serve_once("404 Not Found", "text/plain", "gone").await;

        let sources = vec![
            CalendarSource {
                course: "Expired".to_owned(),
                location: url,
            },
            CalendarSource {
                course: "Missing".to_owned(),
                location: dir.path().join("missing.ics").display().to_string(),
            },
            CalendarSource {
                course: "Canvas (CS 235)".to_owned(),
                location: local.display().to_string(),
            },
        ];

        let events = collect_events(&make_client().unwrap(), &sources).await;

        assert_eq!(
            events,
            [CalendarEvent {
                assignment: "Lab 1".to_owned(),
                due_date: date(2025, 1, 31),
                course: "CS 235".to_owned(),
            }]
        );
        assert!(server.await.unwrap().starts_with("GET / HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn reads_feeds_over_http() {
        let body = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//LMS//Feed//EN\r\n\
                    BEGIN:VEVENT\r\nUID:1\r\nSUMMARY:Midterm\r\nDTSTART;VALUE=DATE:20250304\r\n\
                    END:VEVENT\r\nEND:VCALENDAR\r\n";
        let (url, server) = serve_once("200 OK", "text/calendar", body).await;

        let content = load_source(&make_client().unwrap(), &url).await.unwrap();
        let events = events_from_ical("STAT 121", &content).unwrap();

        assert_eq!(events[0].assignment, "Midterm");
        assert_eq!(events[0].due_date, date(2025, 3, 4));
        server.await.unwrap();
    }
}
