//! Extraction of a [`ManuscriptStatus`] from the status page.
//!
//! The page is reduced to trimmed, non-empty text lines first. Each field is
//! then located by its label (Chinese page wording or the English
//! equivalent), with the value either on the same line or the next one.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::error::ParseError;
use crate::models::{ManuscriptStatus, ReviewCount, StatusField};

lazy_static! {
    static ref HTML_HINT_RE: Regex = Regex::new(
        r"(?i)<(?:!doctype|html|head|body|div|p|br|span|table|tr|td|li|h[1-6]|script|style)\b"
    ).unwrap();
    static ref SCRIPT_RE: Regex = Regex::new(r"(?is)<script\b.*?</script\s*>").unwrap();
    static ref STYLE_RE: Regex = Regex::new(r"(?is)<style\b.*?</style\s*>").unwrap();
    static ref COMMENT_RE: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();
    static ref BREAK_RE: Regex = Regex::new(
        r"(?i)<br\s*/?>|</(?:p|div|tr|td|th|li|dt|dd|h[1-6]|table|section|article|header|footer|label)\s*>"
    ).unwrap();
    static ref TAG_RE: Regex = Regex::new(r"<[^>]*>").unwrap();

    static ref TITLE_RE: Regex = line_label(TITLE_LABELS);
    static ref JOURNAL_RE: Regex = line_label(JOURNAL_LABELS);
    static ref PROGRESS_RE: Regex = label(PROGRESS_LABELS);
    static ref COMPLETED_RE: Regex = label(COMPLETED_LABELS);
    static ref ACCEPTED_RE: Regex = label(ACCEPTED_LABELS);
    static ref INVITED_RE: Regex = label(INVITED_LABELS);
    static ref NUMBER_RE: Regex = label(NUMBER_LABELS);
    static ref UPDATED_RE: Regex = label(UPDATED_LABELS);
    static ref SUBMITTED_RE: Regex = label(SUBMITTED_LABELS);

    /// A captured value that is really the next field's label
    static ref LABEL_VALUE_RE: Regex = Regex::new(&format!(
        r"^(?:{})\*?[ \t]*(?:[:：]|$)",
        [
            TITLE_LABELS,
            JOURNAL_LABELS,
            PROGRESS_LABELS,
            COMPLETED_LABELS,
            ACCEPTED_LABELS,
            INVITED_LABELS,
            NUMBER_LABELS,
            UPDATED_LABELS,
            SUBMITTED_LABELS,
        ]
        .join("|")
    )).unwrap();

    static ref PROGRESS_VALUE_RE: Regex = Regex::new(r"^[A-Za-z][A-Za-z \-]*").unwrap();
    static ref NUMBER_VALUE_RE: Regex =
        Regex::new(r"^[A-Za-z][A-Za-z0-9]*(?:-[A-Za-z0-9]+)+").unwrap();
    static ref NUMERIC_DATE_RE: Regex = Regex::new(
        r"^([0-9]{4})\s*(?:年|-|/|\.)\s*([0-9]{1,2})\s*(?:月|-|/|\.)\s*([0-9]{1,2})(?:[^0-9]|$)"
    ).unwrap();
}

const TITLE_LABELS: &str = "论文标题|Title";
const JOURNAL_LABELS: &str = "期刊|Journal";
const PROGRESS_LABELS: &str = "当前进度|Current Status";
const COMPLETED_LABELS: &str = "评审完成|Reviews Completed";
const ACCEPTED_LABELS: &str = "接受评审邀请|Review Invitations Accepted";
const INVITED_LABELS: &str = "发出评审邀请|Review Invitations Sent";
const NUMBER_LABELS: &str = r"稿件编号|Manuscript\s*Number";
const UPDATED_LABELS: &str = "更新时间|Last Updated";
const SUBMITTED_LABELS: &str = "提交日期|Submission Date";

/// Section headings that precede the title line on the result page
const HEADING_MARKERS: [&str; 3] = ["同行评审", "进度", "审稿"];

/// Minimum length, in characters, of a line picked as title by fallback
const MIN_TITLE_CHARS: usize = 20;

const ENGLISH_DATE_FORMATS: [&str; 4] = ["%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y"];

/// Label anywhere in the text, optional `*` and colon, value on the same
/// or the following line
fn label(labels: &str) -> Regex {
    Regex::new(&format!(
        r"(?:{})\*?[ \t]*[:：]?[ \t]*\n?([^\n]+)",
        labels
    ))
    .unwrap()
}

/// Label at the start of a line, followed by a colon or a line break.
/// Used for short labels that also occur inside ordinary text.
fn line_label(labels: &str) -> Regex {
    Regex::new(&format!(
        r"(?m)^(?:{})\*?[ \t]*(?:[:：][ \t]*\n?|\n)([^\n]+)",
        labels
    ))
    .unwrap()
}

/// Parse a status page (HTML or already extracted text)
pub fn parse(raw: &str) -> Result<ManuscriptStatus, ParseError> {
    let text = normalize_page(raw);
    if text.is_empty() {
        return Err(ParseError::EmptyPage);
    }

    let manuscript_number = parse_manuscript_number(&text)?;
    let progress_status = parse_progress(&text)?;
    let title = parse_title(&text).ok_or(ParseError::MissingField(StatusField::Title.key()))?;
    let journal = required(&JOURNAL_RE, &text, StatusField::Journal)?;

    let reviews_completed = match parse_count(&COMPLETED_RE, &text, StatusField::ReviewsCompleted)? {
        ReviewCount::Exact(n) => n,
        masked @ ReviewCount::AtLeast(_) => {
            return Err(ParseError::InvalidCount {
                field: StatusField::ReviewsCompleted.key(),
                value: masked.to_string(),
            })
        }
    };
    let reviews_accepted = parse_count(&ACCEPTED_RE, &text, StatusField::ReviewsAccepted)?;
    let reviews_invited = parse_count(&INVITED_RE, &text, StatusField::ReviewsInvited)?;

    let updated_date = parse_date_field(&UPDATED_RE, &text, StatusField::UpdatedDate)?;
    let submitted_date = parse_date_field(&SUBMITTED_RE, &text, StatusField::SubmittedDate)?;

    debug!(
        manuscript = %manuscript_number,
        progress = %progress_status,
        "Parsed status page"
    );

    Ok(ManuscriptStatus {
        title,
        progress_status,
        reviews_completed,
        reviews_accepted,
        reviews_invited,
        journal,
        manuscript_number,
        updated_date,
        submitted_date,
    })
}

/// Reduce a page to trimmed, non-empty lines joined by `\n`.
///
/// Markup is stripped only when the input looks like HTML, so plain text
/// containing `<` survives untouched.
pub fn normalize_page(raw: &str) -> String {
    let text = if HTML_HINT_RE.is_match(raw) {
        let s = SCRIPT_RE.replace_all(raw, "");
        let s = STYLE_RE.replace_all(&s, "");
        let s = COMMENT_RE.replace_all(&s, "");
        let s = BREAK_RE.replace_all(&s, "\n");
        let s = TAG_RE.replace_all(&s, "");
        decode_entities(&s)
    } else {
        raw.to_string()
    };

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty() && !LABEL_VALUE_RE.is_match(v))
}

fn required(re: &Regex, text: &str, field: StatusField) -> Result<String, ParseError> {
    capture(re, text).ok_or(ParseError::MissingField(field.key()))
}

fn parse_manuscript_number(text: &str) -> Result<String, ParseError> {
    let field = StatusField::ManuscriptNumber;
    let value = required(&NUMBER_RE, text, field)?;

    match NUMBER_VALUE_RE.find(&value) {
        Some(m) => Ok(m.as_str().to_string()),
        None => Err(ParseError::InvalidValue {
            field: field.key(),
            value,
        }),
    }
}

fn parse_progress(text: &str) -> Result<String, ParseError> {
    let value = required(&PROGRESS_RE, text, StatusField::ProgressStatus)?;

    // Latin status phrases are cut at the first non-letter, so trailing
    // labels glued onto the same line are dropped.
    let progress = match PROGRESS_VALUE_RE.find(&value) {
        Some(m) => m.as_str().trim().trim_end_matches('-').trim_end().to_string(),
        None => value,
    };

    if progress.is_empty() {
        return Err(ParseError::MissingField(StatusField::ProgressStatus.key()));
    }
    Ok(progress)
}

fn parse_title(text: &str) -> Option<String> {
    // An explicit but empty title label does not fall back to guessing
    if TITLE_RE.is_match(text) {
        return capture(&TITLE_RE, text);
    }

    let lines: Vec<&str> = text.lines().collect();
    if lines.len() >= 2 && HEADING_MARKERS.iter().any(|m| lines[0].contains(m)) {
        return Some(lines[1].to_string());
    }

    lines
        .iter()
        .take(10)
        .find(|line| line.chars().count() >= MIN_TITLE_CHARS)
        .map(|line| line.to_string())
}

fn parse_count(re: &Regex, text: &str, field: StatusField) -> Result<ReviewCount, ParseError> {
    let value = required(re, text, field)?;

    value
        .parse::<ReviewCount>()
        .map_err(|_| ParseError::InvalidCount {
            field: field.key(),
            value,
        })
}

fn parse_date_field(re: &Regex, text: &str, field: StatusField) -> Result<NaiveDate, ParseError> {
    let value = required(re, text, field)?;
    parse_date(&value).ok_or(ParseError::InvalidDate {
        field: field.key(),
        value,
    })
}

/// Parse a page date: `2024年3月5日`, `2024-03-05`, `2024/3/5`, `2024.03.05`,
/// `5 March 2024`, `March 5, 2024`. Trailing text (such as a time) is ignored.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();

    if let Some(caps) = NUMERIC_DATE_RE.captures(value) {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    ENGLISH_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_and_remainder(value, fmt).ok())
        .map(|(date, _rest)| date)
}
