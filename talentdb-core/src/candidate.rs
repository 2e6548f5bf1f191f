/*!
Candidate domain model and the JSON-in-column collection boundary.

Nested collections (experience, skills, qualifications, achievements) are
stored as JSON text inside scalar columns of the `candidates` table. That is a
deliberate trade: derived-field search happens in memory anyway, and a whole
record travels as one row. The [`collections`] module is the single place
where that JSON is produced and parsed.
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, TalentError};

/// One position in a candidate's work history.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Experience {
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub employment_type: Option<String>,
    #[serde(default)]
    pub team_size: Option<String>,
    #[serde(default)]
    pub reporting_to: Option<String>,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub achievements: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
}

/// A named skill with a 1-5 proficiency rating.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Skill {
    // older exports used "skill" for this field
    #[serde(alias = "skill")]
    pub name: String,
    pub proficiency: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Qualification {
    #[serde(default)]
    pub qualification: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
}

/// The sole domain entity persisted in the local cache file.
///
/// `email` is the unique business key: inserts fail on collision, updates
/// target it and never change it.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub current_role: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notice_period: Option<String>,
    #[serde(default)]
    pub current_salary: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub desired_salary: Option<String>,
    #[serde(default)]
    pub highest_qualification: Option<String>,
    #[serde(default)]
    pub special_skills: Option<String>,
    #[serde(default)]
    pub experience: Vec<Experience>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub qualifications: Vec<Qualification>,
    #[serde(default)]
    pub achievements: Vec<String>,
    /// Server-assigned on insert
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Server-assigned on insert and every update
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Candidate {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Candidate {
            name: name.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TalentError::validation("candidate name cannot be empty"));
        }
        if self.email.trim().is_empty() {
            return Err(TalentError::validation("candidate email cannot be empty"));
        }
        for skill in &self.skills {
            if !(1..=5).contains(&skill.proficiency) {
                return Err(TalentError::validation(format!(
                    "skill '{}' has proficiency {} outside 1-5",
                    skill.name, skill.proficiency
                )));
            }
        }
        Ok(())
    }
}

/// The single (de)serialization boundary for collections stored as JSON text.
///
/// Lenient parsing lives here and nowhere else: readers that must render
/// something call [`parse_or_empty`], while stats code that must *skip*
/// unparseable rows calls [`parse`] and handles the error.
pub mod collections {
    use serde::de::DeserializeOwned;
    use serde::Serialize;

    use crate::Result;

    /// Serialize a collection for column storage.
    pub fn to_json<T: Serialize>(items: &[T]) -> Result<String> {
        Ok(serde_json::to_string(items)?)
    }

    /// Strict parse; `None`/empty input is an empty collection, malformed
    /// JSON is an error the caller decides about.
    pub fn parse<T: DeserializeOwned>(raw: Option<&str>) -> Result<Vec<T>> {
        match raw {
            None => Ok(Vec::new()),
            Some(text) if text.trim().is_empty() => Ok(Vec::new()),
            Some(text) => Ok(serde_json::from_str(text)?),
        }
    }

    /// Lenient parse; malformed or missing JSON degrades to an empty
    /// collection so one bad row never breaks a whole listing.
    pub fn parse_or_empty<T: DeserializeOwned>(raw: Option<&str>) -> Vec<T> {
        match parse(raw) {
            Ok(items) => items,
            Err(err) => {
                tracing::warn!("malformed collection column, degrading to empty: {err}");
                Vec::new()
            }
        }
    }
}
