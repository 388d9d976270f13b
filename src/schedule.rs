use std::{collections::HashMap, future::Future};

use reqwest::Client;

use crate::{
    fetch::{decode, make_client, FetchError},
    parse::SectionsResponse,
};

pub const SECTIONS_URL: &str =
    "https://commtech.byu.edu/noauth/classSchedule/ajax/getSections.php";

/// Credentials and term sent along with every sections request.
#[derive(Clone, Debug)]
pub struct Session {
    pub token: String,
    pub term: String,
}

#[derive(Clone, Copy, Debug)]
pub struct SectionsRequest<'a> {
    pub course_id: &'a str,
    pub session_id: &'a str,
    pub year_term: &'a str,
}

fn form_data(request: SectionsRequest<'_>) -> HashMap<&'static str, String> {
    let mut form = HashMap::new();
    form.insert("courseId", request.course_id.to_owned());
    form.insert("sessionId", request.session_id.to_owned());
    form.insert("yearterm", request.year_term.to_owned());
    form
}

pub trait ScheduleService {
    fn sections(
        &self,
        request: SectionsRequest<'_>,
    ) -> impl Future<Output = Result<SectionsResponse, FetchError>> + Send;
}

pub struct ClassSchedule {
    client: Client,
    url: String,
}

impl ClassSchedule {
    pub fn new(url: impl Into<String>) -> reqwest::Result<Self> {
        Ok(Self {
            client: make_client()?,
            url: url.into(),
        })
    }
}

impl ScheduleService for ClassSchedule {
    async fn sections(&self, request: SectionsRequest<'_>) -> Result<SectionsResponse, FetchError> {
        let response = self
            .client
            .post(&self.url)
            .form(&form_data(request))
            .send()
            .await?;

        decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::stub::serve_once;

    fn request() -> SectionsRequest<'static> {
        SectionsRequest {
            course_id: "01452-003",
            session_id: "TOKEN",
            year_term: "20261",
        }
    }

    #[test]
    fn form_carries_every_field() {
        let form = form_data(SectionsRequest {
            course_id: "01452-003",
            session_id: "TOKEN",
            year_term: "20261",
        });

        assert_eq!(form.len(), 3);
        assert_eq!(form["courseId"], "01452-003");
        assert_eq!(form["sessionId"], "TOKEN");
        assert_eq!(form["yearterm"], "20261");
    }

    #[tokio::test]
    async fn posts_the_form_and_reads_sections() {
        let (url, server) = serve_once(
            "200 OK",
            "application/json",
            r#"{"sections":[{"section_number":"001","times":[{"mon":true,"begin_time":"0900","end_time":"0950"}]}]}"#,
        )
        .await;

        let schedule = ClassSchedule::new(url).unwrap();
        let response = schedule.sections(request()).await.unwrap();

        let times = response.section("001").unwrap().times.as_deref().unwrap();
        assert_eq!(times[0].day_label(), "M");

        let wire = server.await.unwrap();
        assert!(wire.starts_with("POST / HTTP/1.1\r\n"));
        assert!(wire
            .to_lowercase()
            .contains("content-type: application/x-www-form-urlencoded"));
        let body = wire.split("\r\n\r\n").nth(1).unwrap();
        let mut fields: Vec<_> = body.split('&').collect();
        fields.sort();
        assert_eq!(
            fields,
            ["courseId=01452-003", "sessionId=TOKEN", "yearterm=20261"]
        );
    }

    #[tokio::test]
    async fn server_errors_are_status_failures() {
        let (url, server) =
            serve_once("500 Internal Server Error", "text/plain", "database down").await;

        let schedule = ClassSchedule::new(url).unwrap();
        let error = schedule.sections(request()).await.unwrap_err();

        assert!(matches!(
            error,
            FetchError::Status(status) if status == reqwest::StatusCode::INTERNAL_SERVER_ERROR
        ));
        assert_eq!(error.kind(), "transport");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn html_bodies_are_malformed() {
        let (url, server) = serve_once(
            "200 OK",
            "text/html",
            "<html><body>Session expired</body></html>",
        )
        .await;

        let schedule = ClassSchedule::new(url).unwrap();
        let error = schedule.sections(request()).await.unwrap_err();

        assert!(matches!(error, FetchError::Malformed(_)));
        assert_eq!(error.kind(), "malformed");
        server.await.unwrap();
    }
}
