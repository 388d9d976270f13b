use std::collections::HashMap;

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::parse::{opt_text, text};

/// Credit hours are passed through exactly as the catalog states them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreditHours {
    Fixed(serde_json::Number),
    Label(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub course_name: String,
    #[serde(default)]
    pub full_title: Option<String>,
    #[serde(deserialize_with = "text")]
    pub curriculum_id: String,
    #[serde(default)]
    pub credit_hours: Option<CreditHours>,
    pub sections: Vec<Section>,
}

impl Course {
    pub fn clear_times(&mut self) {
        for section in &mut self.sections {
            section.clear_times();
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(deserialize_with = "text")]
    pub section_number: String,
    #[serde(default)]
    pub instructor_name: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_hours: Option<CreditHours>,
    // null or non-empty, never `[]`
    #[serde(default, deserialize_with = "non_empty_times")]
    times: Option<Vec<TimeBlock>>,
}

impl Section {
    pub fn new(section_number: impl Into<String>) -> Self {
        Self {
            section_number: section_number.into(),
            instructor_name: None,
            mode: None,
            credit_hours: None,
            times: None,
        }
    }

    pub fn times(&self) -> Option<&[TimeBlock]> {
        self.times.as_deref()
    }

    pub fn set_times(&mut self, times: Vec<TimeBlock>) {
        self.times = if times.is_empty() { None } else { Some(times) };
    }

    pub fn clear_times(&mut self) {
        self.times = None;
    }
}

fn non_empty_times<'de, D>(deserializer: D) -> Result<Option<Vec<TimeBlock>>, D::Error>
where
    D: Deserializer<'de>,
{
    let times = Option::<Vec<TimeBlock>>::deserialize(deserializer)?;
    Ok(times.filter(|times| !times.is_empty()))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBlock {
    pub days: String,
    pub start_time: String,
    pub end_time: String,
    pub building: String,
    pub room: String,
}

/// An entry of the raw catalog, keyed `"{curriculum_id}-{title_code}"` on disk.
#[derive(Debug, Deserialize)]
pub struct CatalogRecord {
    #[serde(deserialize_with = "text")]
    pub curriculum_id: String,
    #[serde(deserialize_with = "text")]
    pub title_code: String,
    pub dept_name: String,
    #[serde(deserialize_with = "text")]
    pub catalog_number: String,
    #[serde(default, deserialize_with = "opt_text")]
    pub catalog_suffix: Option<String>,
    #[serde(default)]
    pub full_title: Option<String>,
    #[serde(default)]
    pub sections: Vec<CatalogSection>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogSection {
    #[serde(deserialize_with = "text")]
    pub section_number: String,
    #[serde(default)]
    pub instructor_name: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub credit_hours: Option<CreditHours>,
}

impl CatalogRecord {
    pub fn course_name(&self) -> String {
        let suffix = self.catalog_suffix.as_deref().unwrap_or_default();
        format!("{} {}{}", self.dept_name, self.catalog_number, suffix)
            .trim()
            .to_owned()
    }
}

impl From<CatalogRecord> for Course {
    fn from(record: CatalogRecord) -> Self {
        let course_name = record.course_name();
        let credit_hours = record
            .sections
            .first()
            .and_then(|section| section.credit_hours.clone());

        let sections = record
            .sections
            .into_iter()
            .map(|section| Section {
                section_number: section.section_number,
                instructor_name: section.instructor_name,
                mode: section.mode,
                credit_hours: section.credit_hours,
                times: None,
            })
            .collect();

        Course {
            course_name,
            full_title: record.full_title,
            curriculum_id: record.curriculum_id,
            credit_hours,
            sections,
        }
    }
}

#[derive(Deserialize)]
struct TitleCodeRecord {
    #[serde(deserialize_with = "text")]
    curriculum_id: String,
    #[serde(deserialize_with = "text")]
    title_code: String,
}

fn entries<T: DeserializeOwned>(raw: &Map<String, Value>) -> impl Iterator<Item = T> + '_ {
    raw.iter().filter_map(|(key, value)| match T::deserialize(value) {
        Ok(record) => Some(record),
        Err(error) => {
            log::warn!("skipping catalog entry {}: {}", key, error);
            None
        }
    })
}

/// Reshapes the raw catalog into courses, in file order. Entries missing
/// required fields are skipped.
pub fn simplify(raw: &Map<String, Value>) -> Vec<Course> {
    entries::<CatalogRecord>(raw).map(Course::from).collect()
}

#[derive(Debug, Default)]
pub struct TitleCodeIndex(HashMap<String, String>);

impl TitleCodeIndex {
    pub fn from_catalog(raw: &Map<String, Value>) -> Self {
        entries::<TitleCodeRecord>(raw)
            .map(|record| (record.curriculum_id, record.title_code))
            .collect()
    }

    pub fn title_code(&self, curriculum_id: &str) -> Option<&str> {
        self.0.get(curriculum_id).map(String::as_str)
    }

    /// The course id the schedule service expects.
    pub fn request_key(&self, curriculum_id: &str) -> Option<String> {
        self.title_code(curriculum_id)
            .map(|title_code| format!("{}-{}", curriculum_id, title_code))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for TitleCodeIndex {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
