use serde::{Deserialize, Serialize};

use crate::domain::{masterlist::MasterListOptions, roster::Roster};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// JSON form of a concatenation request; entries are base64 or data URLs.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConcatRequest {
    pub pdfs: Vec<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MasterListRequest {
    pub rosters: Vec<Roster>,
    pub options: MasterListOptions,
}
