use log::{error, info, warn};

use crate::{
    form_tokens::{FormTokens, extract_form_tokens},
    marks_table::{ExamPeriod, Semester, SubjectRecord, is_placeholder_result, parse_marks_table},
    requests::SessionClient,
};

pub const MARKS_PATH: &str = "/STUDENTLOGIN/Frm_TestMarks.aspx";

const SEMESTER_FIELD: &str = "ctl00$Stud_cpBody$dSem";
const SUBJECT_TYPE_FIELD: &str = "ctl00$Stud_cpBody$dSubType";
const EXAM_CODE_FIELD: &str = "ctl00$Stud_cpBody$dexamcode";
const SEARCH_FIELD: &str = "ctl00$Stud_cpBody$btnSearch";

const SUBJECT_TYPE: &str = "Theory";
const SEARCH_VALUE: &str = "Show Data";

/// The postback selecting one semester and exam period on the marks page.
pub fn marks_form(
    tokens: FormTokens,
    semester: Semester,
    exam_period: ExamPeriod,
) -> Vec<(String, String)> {
    let mut form = tokens.into_form_fields();
    form.extend([
        (SEMESTER_FIELD.to_string(), semester.selector()),
        (SUBJECT_TYPE_FIELD.to_string(), SUBJECT_TYPE.to_string()),
        (EXAM_CODE_FIELD.to_string(), exam_period.selector().to_string()),
        (SEARCH_FIELD.to_string(), SEARCH_VALUE.to_string()),
    ]);
    form
}

async fn try_get_marks(
    client: &SessionClient,
    semester: Semester,
    exam_period: ExamPeriod,
) -> anyhow::Result<Vec<SubjectRecord>> {
    let form_page = client.get(MARKS_PATH).await?;
    let tokens = extract_form_tokens(&form_page.body);
    if !tokens.is_complete() {
        // The portal decides; without a grid the parser reports placeholders.
        warn!(
            "{} is missing hidden fields {:?} (semester {}, {})",
            MARKS_PATH,
            tokens.missing(),
            semester,
            exam_period
        );
    }
    let form = marks_form(tokens, semester, exam_period);
    let response = client.post_form(MARKS_PATH, &form).await?;
    Ok(parse_marks_table(&response.body))
}

/// Fetches the marks of one semester and exam period.
///
/// Never fails: a network error yields the single network-error
/// placeholder, a page without a result grid the parse-failed placeholders.
pub async fn get_marks(
    client: &SessionClient,
    semester: Semester,
    exam_period: ExamPeriod,
) -> Vec<SubjectRecord> {
    if !client.is_authenticated() {
        warn!(
            "fetching marks for semester {}, {} on a session that has not logged in",
            semester, exam_period
        );
    }

    match try_get_marks(client, semester, exam_period).await {
        Ok(records) => {
            if is_placeholder_result(&records) {
                warn!(
                    "{} rendered no result grid for semester {}, {}",
                    MARKS_PATH, semester, exam_period
                );
            } else {
                info!(
                    "fetched {} subjects for semester {}, {}",
                    records.len(),
                    semester,
                    exam_period
                );
            }
            records
        }
        Err(e) => {
            error!(
                "fetching marks from {} for semester {}, {} failed: {:#}",
                MARKS_PATH, semester, exam_period, e
            );
            SubjectRecord::network_error_placeholder()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_carries_tokens_and_selection() {
        let page = r#"<input id="__VIEWSTATE" value="vs" />
            <input id="__VIEWSTATEGENERATOR" value="gen" />
            <input id="__EVENTVALIDATION" value="ev" />"#;
        let semester = Semester::new(5).unwrap();
        let form = marks_form(extract_form_tokens(page), semester, ExamPeriod::Second);
        let pairs: Vec<(&str, &str)> = form
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("__VIEWSTATE", "vs"),
                ("__VIEWSTATEGENERATOR", "gen"),
                ("__EVENTVALIDATION", "ev"),
                ("ctl00$Stud_cpBody$dSem", "5"),
                ("ctl00$Stud_cpBody$dSubType", "Theory"),
                ("ctl00$Stud_cpBody$dexamcode", "2"),
                ("ctl00$Stud_cpBody$btnSearch", "Show Data"),
            ]
        );
    }
}
