use std::future::Future;

use itertools::Itertools;
use log::{info, warn};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    fetch::{decode, make_client, FetchError},
    rate::RateLimiter,
};

pub const GRAPHQL_URL: &str = "https://www.ratemyprofessors.com/graphql";
pub const BYU_SCHOOL_ID: &str = "U2Nob29sLTEzNQ==";

// the public site sends these credentials with its search requests
const AUTHORIZATION: &str = "Basic dGVzdDp0ZXN0";

const SEARCH_QUERY: &str = include_str!("../queries/teacher_search.graphql");
const RATINGS_QUERY: &str = include_str!("../queries/teacher_ratings.graphql");

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Professor {
    pub id: Option<String>,
    pub legacy_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub school: Option<String>,
    pub avg_rating: Option<f64>,
    pub avg_difficulty: Option<f64>,
    pub num_ratings: Option<u32>,
    pub would_take_again_percent: Option<f64>,
}

impl Professor {
    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .join(" ")
    }
}

#[derive(Debug, Deserialize)]
pub struct GraphqlResponse<T> {
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct SearchData {
    pub search: Search,
}

#[derive(Debug, Deserialize)]
pub struct Search {
    pub teachers: TeacherConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherConnection {
    #[serde(default)]
    pub edges: Vec<TeacherEdge>,
    #[serde(default)]
    pub page_info: PageInfo,
    #[serde(default)]
    pub result_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct TeacherEdge {
    pub node: TeacherNode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherNode {
    pub id: String,
    pub legacy_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub school: Option<SchoolRef>,
    pub avg_rating: Option<f64>,
    pub avg_difficulty: Option<f64>,
    pub num_ratings: Option<u32>,
    pub would_take_again_percent: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SchoolRef {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

impl From<TeacherNode> for Professor {
    fn from(node: TeacherNode) -> Self {
        Professor {
            id: Some(node.id),
            legacy_id: node.legacy_id,
            first_name: node.first_name,
            last_name: node.last_name,
            department: node.department,
            school: node.school.and_then(|school| school.name),
            avg_rating: node.avg_rating,
            avg_difficulty: node.avg_difficulty,
            num_ratings: node.num_ratings,
            would_take_again_percent: node.would_take_again_percent,
        }
    }
}

pub trait RatingsApi {
    fn search_page(
        &self,
        school_id: &str,
        cursor: Option<&str>,
        count: u32,
    ) -> impl Future<Output = Result<GraphqlResponse<SearchData>, FetchError>> + Send;

    /// The full ratings page of one professor, kept as the raw response.
    fn teacher(&self, id: &str) -> impl Future<Output = Result<Value, FetchError>> + Send;
}

pub struct RateMyProfessors {
    client: Client,
    url: String,
}

impl RateMyProfessors {
    pub fn new(url: impl Into<String>) -> reqwest::Result<Self> {
        Ok(Self {
            client: make_client()?,
            url: url.into(),
        })
    }

    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        payload: &Value,
        authorized: bool,
    ) -> Result<T, FetchError> {
        let mut request = self.client.post(&self.url).json(payload);
        if authorized {
            request = request.header(header::AUTHORIZATION, AUTHORIZATION);
        }
        let response = request.send().await?;

        decode(response).await
    }
}

impl RatingsApi for RateMyProfessors {
    async fn search_page(
        &self,
        school_id: &str,
        cursor: Option<&str>,
        count: u32,
    ) -> Result<GraphqlResponse<SearchData>, FetchError> {
        let payload = json!({
            "query": SEARCH_QUERY,
            "variables": {
                "count": count,
                "cursor": cursor,
                "query": { "text": "", "schoolID": school_id, "fallback": true },
            },
        });
        self.query(&payload, true).await
    }

    async fn teacher(&self, id: &str) -> Result<Value, FetchError> {
        let payload = json!({
            "query": RATINGS_QUERY,
            "variables": { "id": id },
        });
        self.query(&payload, false).await
    }
}

/// Follows the search cursor until the last page. A failed page ends the
/// scrape early; whatever was collected so far is returned.
pub async fn scrape_all<A: RatingsApi>(
    api: &A,
    school_id: &str,
    batch_size: u32,
    limiter: &RateLimiter,
) -> Vec<Professor> {
    let mut professors = Vec::new();
    let mut cursor: Option<String> = None;

    for page in 1usize.. {
        limiter.until_ready().await;
        info!("fetching page {} (cursor: {:?})", page, cursor);

        let teachers = match api.search_page(school_id, cursor.as_deref(), batch_size).await {
            Ok(GraphqlResponse { data: Some(data) }) => data.search.teachers,
            Ok(GraphqlResponse { data: None }) => {
                warn!("page {} carried no data, stopping", page);
                break;
            }
            Err(error) => {
                warn!("page {} failed, stopping: {}", page, error);
                break;
            }
        };

        let fetched = teachers.edges.len();
        professors.extend(teachers.edges.into_iter().map(|edge| Professor::from(edge.node)));
        info!(
            "fetched {} professors, {} / {} so far",
            fetched,
            professors.len(),
            teachers.result_count
        );

        if !teachers.page_info.has_next_page {
            info!("reached last page");
            break;
        }
        match teachers.page_info.end_cursor {
            Some(next) => cursor = Some(next),
            None => {
                warn!("no cursor after page {}, stopping", page);
                break;
            }
        }
    }

    info!("scraping complete: {} professors", professors.len());
    professors
}

/// One raw response per professor, in the same order. Failed requests and
/// records without an id leave a `null` in their slot.
pub async fn fetch_reviews<A: RatingsApi>(
    api: &A,
    professors: &[Professor],
    limiter: &RateLimiter,
) -> Vec<Value> {
    let mut responses = Vec::with_capacity(professors.len());

    for (position, professor) in professors.iter().enumerate() {
        let Some(id) = professor.id.as_deref() else {
            warn!("{}. {} has no id, skipping", position + 1, professor.full_name());
            responses.push(Value::Null);
            continue;
        };

        limiter.until_ready().await;
        info!("{}. {}", position + 1, professor.full_name());

        match api.teacher(id).await {
            Ok(response) => responses.push(response),
            Err(error) => {
                warn!("could not fetch ratings of {}: {}", id, error);
                responses.push(Value::Null);
            }
        }
    }

    responses
}

pub fn top_rated(professors: &[Professor], min_ratings: u32, count: usize) -> Vec<&Professor> {
    professors
        .iter()
        .filter(|professor| professor.num_ratings.unwrap_or(0) >= min_ratings)
        .sorted_by(|a, b| {
            let a = a.avg_rating.unwrap_or(0.);
            let b = b.avg_rating.unwrap_or(0.);
            b.total_cmp(&a)
        })
        .take(count)
        .collect()
}

/// Case-insensitive match on either first or last name.
pub fn search<'a>(professors: &'a [Professor], name: &str) -> Vec<&'a Professor> {
    let needle = name.to_lowercase();
    let matches = |field: &Option<String>| {
        field
            .as_deref()
            .is_some_and(|value| value.to_lowercase().contains(&needle))
    };

    professors
        .iter()
        .filter(|professor| matches(&professor.first_name) || matches(&professor.last_name))
        .collect()
}
