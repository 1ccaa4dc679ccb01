//! Master list: many rosters flattened into one printable table.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::roster::Roster;

/// Element id the renderer waits for before capturing.
pub const MASTERLIST_TABLE_ID: &str = "masterlist-table";

const HEADERS: [&str; 6] = [
    "EventID",
    "EventTime",
    "Instructor",
    "ServiceName",
    "AttendeeName",
    "AttendeePhone",
];

const STYLESHEET: &str = r#"@page { size: Letter; margin: 0.35in; }
* { box-sizing: border-box; }
body { margin: 0; font-family: "Arial", sans-serif; color: #111; }
table { width: 100%; border-collapse: collapse; table-layout: fixed; }
thead { display: table-header-group; }
th, td { padding: 2px 4px; font-size: 9px; vertical-align: top; word-break: break-word; }
.with-borders th, .with-borders td { border: 1px solid #000; }
.no-borders th, .no-borders td { border: none; }
.header-row td { background: #f4f4f4; }
.header-row.bold td { font-weight: 700; }
.header-row.center td { text-align: center; }
tr { page-break-inside: avoid; }"#;

/// Formatting switches chosen by the requester.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterListOptions {
    pub time_headers: bool,
    pub instructor_headers: bool,
    pub course_headers: bool,
    pub borders: bool,
    pub center_time: bool,
    pub bold_time: bool,
    pub center_course: bool,
    pub bold_course: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MasterListError {
    #[error("no rosters to process")]
    NoRosters,
    #[error("no student rows to process")]
    NoStudentRows,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterListRow {
    TimeHeader(String),
    CourseHeader(String),
    Data([String; 6]),
}

/// Flatten rosters into header and data rows, in roster order.
pub fn build_rows(
    rosters: &[Roster],
    options: &MasterListOptions,
) -> Result<Vec<MasterListRow>, MasterListError> {
    if rosters.is_empty() {
        return Err(MasterListError::NoRosters);
    }

    let mut rows = Vec::new();
    let mut current_time = "";
    let mut data_rows = 0usize;

    for roster in rosters {
        let time = roster.time.trim();
        if options.time_headers && !time.is_empty() && time != current_time {
            rows.push(MasterListRow::TimeHeader(time.to_string()));
            current_time = time;
        }

        if options.course_headers
            && let Some(label) = course_label(roster, options)
        {
            rows.push(MasterListRow::CourseHeader(label));
        }

        let code = roster.code.trim();
        if code.is_empty() {
            continue;
        }

        for student in &roster.students {
            let name = student.name.trim();
            if name.is_empty() {
                continue;
            }

            let service_name = first_non_blank(&roster.service_name, &student.level);
            let instructor = first_non_blank(&roster.instructor, &student.instructor);

            rows.push(MasterListRow::Data([
                code.to_string(),
                time.to_string(),
                instructor.to_string(),
                service_name.to_string(),
                name.to_string(),
                student.phone.trim().to_string(),
            ]));
            data_rows += 1;
        }
    }

    if data_rows == 0 {
        return Err(MasterListError::NoStudentRows);
    }

    Ok(rows)
}

fn course_label(roster: &Roster, options: &MasterListOptions) -> Option<String> {
    let mut label = first_non_blank(&roster.service_name, &roster.code).to_string();

    if options.instructor_headers {
        let instructor = match roster.instructor.trim() {
            "" => roster
                .students
                .first()
                .map(|student| student.instructor.trim())
                .unwrap_or(""),
            value => value,
        };
        if !instructor.is_empty() {
            label = format!("{label} - {instructor}");
        }
    }

    (!label.is_empty()).then_some(label)
}

fn first_non_blank<'a>(preferred: &'a str, fallback: &'a str) -> &'a str {
    match preferred.trim() {
        "" => fallback.trim(),
        value => value,
    }
}

/// Column widths in percent, proportional to the longest cell per column.
pub fn column_widths(rows: &[MasterListRow]) -> [f64; 6] {
    let mut longest = HEADERS.map(|header| header.chars().count());

    for row in rows {
        if let MasterListRow::Data(cells) = row {
            for (slot, cell) in longest.iter_mut().zip(cells) {
                *slot = (*slot).max(cell.chars().count());
            }
        }
    }

    let longest = longest.map(|len| len.max(1));
    let total: usize = longest.iter().sum();
    longest.map(|len| len as f64 / total as f64 * 100.0)
}

/// Standalone HTML document for the master list.
pub fn build_markup(rows: &[MasterListRow], options: &MasterListOptions) -> String {
    let border_class = if options.borders {
        "with-borders"
    } else {
        "no-borders"
    };

    let mut html = String::with_capacity(4096 + rows.len() * 160);
    html.push_str("<!doctype html><html><head><meta charset=\"utf-8\"/>");
    html.push_str("<title>Masterlist</title><style>");
    html.push_str(STYLESHEET);
    html.push_str("</style></head><body>");
    let _ = write!(
        html,
        "<table id=\"{MASTERLIST_TABLE_ID}\" class=\"{border_class}\"><colgroup>"
    );
    for width in column_widths(rows) {
        let _ = write!(html, "<col style=\"width:{width:.2}%\"/>");
    }
    html.push_str("</colgroup><thead><tr>");
    for header in HEADERS {
        let _ = write!(html, "<th>{}</th>", ammonia::clean_text(header));
    }
    html.push_str("</tr></thead><tbody>");

    for row in rows {
        match row {
            MasterListRow::Data(cells) => {
                html.push_str("<tr>");
                for cell in cells {
                    let _ = write!(html, "<td>{}</td>", ammonia::clean_text(cell));
                }
                html.push_str("</tr>");
            }
            MasterListRow::TimeHeader(label) => {
                push_header_row(&mut html, label, options.bold_time, options.center_time);
            }
            MasterListRow::CourseHeader(label) => {
                push_header_row(&mut html, label, options.bold_course, options.center_course);
            }
        }
    }

    html.push_str("</tbody></table></body></html>");
    html
}

fn push_header_row(html: &mut String, label: &str, bold: bool, center: bool) {
    html.push_str("<tr class=\"header-row");
    if bold {
        html.push_str(" bold");
    }
    if center {
        html.push_str(" center");
    }
    let _ = write!(
        html,
        "\"><td colspan=\"{}\">{}</td></tr>",
        HEADERS.len(),
        ammonia::clean_text(label)
    );
}
