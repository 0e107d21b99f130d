//! Incident-report XML (`PHARMACY_REPORT` elements) → [`IncidentReport`].
//!
//! Coded elements carry a `CODE` attribute resolved through the matching
//! [`CodeTable`]. For free-text axes the label is augmented, not replaced:
//! when the element also has literal text that differs from the label, the
//! result is `"<label> <text>"`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::debug;

use crate::codes::{self, CodeTable, present_code};
use crate::error::ParseError;
use crate::record::{IncidentReport, NO_DATA};
use crate::text::strip_code_annotation;

const REPORT: &str = "PHARMACY_REPORT";
const ERROR: &str = "Error";

/// How a resolved label combines with the element's literal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    /// The label stands alone.
    Replace,
    /// Literal text that differs from the label is appended.
    Augment,
}

/// A coded field: its element name, table, and merge rule.
struct CodedField {
    tag: &'static str,
    table: &'static CodeTable,
    merge: Merge,
}

static MONTH: CodedField = CodedField { tag: "DATMONTH", table: &codes::MONTH, merge: Merge::Replace };
static SUMMARY: CodedField = CodedField { tag: "DATSUMMARY", table: &codes::SUMMARY, merge: Merge::Replace };
static CONTENT: CodedField = CodedField { tag: "DATCONTENTTEXT", table: &codes::CONTENT, merge: Merge::Augment };
static FACTOR_TEXT: CodedField = CodedField { tag: "DATFACTORTEXT", table: &codes::FACTOR_TEXT, merge: Merge::Augment };
static FACTOR: CodedField = CodedField { tag: "DATFACTOR", table: &codes::FACTOR, merge: Merge::Augment };
static FACTOR_DOUBT: CodedField = CodedField { tag: "DATFACTORDOUBT", table: &codes::FACTOR_DOUBT, merge: Merge::Augment };

static CODED: [&CodedField; 6] = [&MONTH, &SUMMARY, &CONTENT, &FACTOR_TEXT, &FACTOR, &FACTOR_DOUBT];
const PLAIN: [&str; 4] = ["DATYEAR", "DATIMPROVEMENTTEXT", "DATESTIMATEDTEXT", "DATEFFORTTEXT"];

/// One element occurrence: its CODE attribute and text content.
#[derive(Debug, Default, Clone)]
struct Coded {
    code: Option<String>,
    text: String,
}

#[derive(Default)]
struct ReportBuilder {
    coded: Vec<(&'static str, Coded)>,
    plain: Vec<(&'static str, String)>,
}

impl ReportBuilder {
    fn accept(&mut self, tag: &str, code: Option<String>, text: String) {
        if let Some(field) = CODED.iter().find(|f| f.tag == tag) {
            self.coded.push((field.tag, Coded { code, text }));
        } else if let Some(name) = PLAIN.iter().find(|n| **n == tag) {
            self.plain.push((*name, text));
        }
    }

    /// First occurrence of a plain element, trimmed, or the sentinel.
    fn plain(&self, tag: &str) -> String {
        self.plain
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, text)| text.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| NO_DATA.to_string())
    }

    fn coded(&self, field: &CodedField) -> String {
        let items: Vec<&Coded> = self
            .coded
            .iter()
            .filter(|(t, _)| *t == field.tag)
            .map(|(_, c)| c)
            .collect();
        resolve_coded(field.table, field.merge, &items)
    }

    fn build(self) -> IncidentReport {
        IncidentReport {
            year: self.plain("DATYEAR"),
            month: self.coded(&MONTH),
            summary: self.coded(&SUMMARY),
            content: self.coded(&CONTENT),
            factor: self.coded(&FACTOR_TEXT),
            factors: self.coded(&FACTOR),
            factor_doubts: self.coded(&FACTOR_DOUBT),
            improvement: self.plain("DATIMPROVEMENTTEXT"),
            estimated_text: self.plain("DATESTIMATEDTEXT"),
            effort_text: self.plain("DATEFFORTTEXT"),
        }
    }
}

/// Resolve every occurrence of a coded element and join them one per line,
/// in source order. No occurrences yields [`NO_DATA`].
fn resolve_coded(table: &CodeTable, merge: Merge, items: &[&Coded]) -> String {
    let values: Vec<String> = items
        .iter()
        .map(|item| resolve_one(table, merge, item))
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        NO_DATA.to_string()
    } else {
        values.join("\n")
    }
}

fn resolve_one(table: &CodeTable, merge: Merge, item: &Coded) -> String {
    let cleaned = strip_code_annotation(&item.text);
    let literal = cleaned.trim();
    match present_code(item.code.as_deref()) {
        Some(code) => {
            let label = table.resolve(code);
            if merge == Merge::Augment && !literal.is_empty() && literal != label {
                format!("{label} {literal}")
            } else {
                label
            }
        }
        None => literal.to_string(),
    }
}

/// Open element on the parse stack.
struct Frame {
    tag: String,
    code: Option<String>,
    text: String,
}

fn open_frame(e: &BytesStart<'_>) -> Result<Frame, ParseError> {
    let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let code = e
        .try_get_attribute("CODE")
        .map_err(|err| ParseError::Malformed(err.to_string()))?
        .map(|attr| {
            attr.unescape_value()
                .map(|v| v.into_owned())
                .map_err(|err| ParseError::Malformed(err.to_string()))
        })
        .transpose()?;
    Ok(Frame { tag, code, text: String::new() })
}

/// Parse the incident service response.
///
/// Zero `PHARMACY_REPORT` elements is a valid empty result. An `<Error>`
/// element anywhere is reported as [`ParseError::Upstream`].
pub fn parse_incident_xml(xml: &str) -> Result<Vec<IncidentReport>, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut current: Option<ReportBuilder> = None;
    let mut reports = Vec::new();
    let mut saw_element = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|err| ParseError::Malformed(err.to_string()))?;
        match event {
            Event::Start(e) => {
                saw_element = true;
                let frame = open_frame(&e)?;
                if frame.tag == REPORT {
                    current = Some(ReportBuilder::default());
                }
                stack.push(frame);
            }
            Event::Empty(e) => {
                saw_element = true;
                let frame = open_frame(&e)?;
                if frame.tag == REPORT {
                    current = Some(ReportBuilder::default());
                }
                close_frame(frame, &mut current, &mut reports)?;
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|err| ParseError::Malformed(err.to_string()))?;
                // Text counts toward every enclosing element, like DOM textContent.
                for frame in stack.iter_mut() {
                    frame.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                for frame in stack.iter_mut() {
                    frame.text.push_str(&text);
                }
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| ParseError::Malformed("unbalanced end tag".into()))?;
                close_frame(frame, &mut current, &mut reports)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_element {
        return Err(ParseError::Empty);
    }
    if !stack.is_empty() {
        return Err(ParseError::Malformed("document ended inside an element".into()));
    }

    debug!(count = reports.len(), "parsed incident reports");
    Ok(reports)
}

fn close_frame(
    frame: Frame,
    current: &mut Option<ReportBuilder>,
    reports: &mut Vec<IncidentReport>,
) -> Result<(), ParseError> {
    if frame.tag == ERROR {
        return Err(ParseError::Upstream(frame.text.trim().to_string()));
    }
    if frame.tag == REPORT {
        if let Some(builder) = current.take() {
            reports.push(builder.build());
        }
        return Ok(());
    }
    if let Some(builder) = current.as_mut() {
        builder.accept(&frame.tag, frame.code, frame.text);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(reports: &str) -> String {
        format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?><PHARMACY_REPORTS>{reports}</PHARMACY_REPORTS>")
    }

    #[test]
    fn full_report_resolves_codes() {
        let xml = wrap(
            r#"<PHARMACY_REPORT>
                <DATYEAR>2024</DATYEAR>
                <DATMONTH CODE="03">3</DATMONTH>
                <DATSUMMARY CODE="01">調剤</DATSUMMARY>
                <DATCONTENTTEXT CODE="04">10錠のところ20錠渡した</DATCONTENTTEXT>
                <DATFACTORTEXT CODE="02"></DATFACTORTEXT>
                <LSTFACTOR>
                    <DATFACTOR CODE="110104"/>
                    <DATFACTOR CODE="130101">繁忙であった</DATFACTOR>
                </LSTFACTOR>
                <DATIMPROVEMENTTEXT>ダブルチェックを徹底</DATIMPROVEMENTTEXT>
            </PHARMACY_REPORT>"#,
        );
        let reports = parse_incident_xml(&xml).unwrap();
        assert_eq!(reports.len(), 1);
        let r = &reports[0];
        assert_eq!(r.year, "2024");
        assert_eq!(r.month, "3月");
        assert_eq!(r.summary, "調剤に関するヒヤリ・ハット事例");
        assert_eq!(r.content, "数量間違い 10錠のところ20錠渡した");
        assert_eq!(r.factor, "調剤方法の要因");
        assert_eq!(r.factors, "焦り・慌て\n繁忙であった");
        assert_eq!(r.factor_doubts, NO_DATA);
        assert_eq!(r.improvement, "ダブルチェックを徹底");
        assert_eq!(r.estimated_text, NO_DATA);
        assert!(!r.is_inquiry());
    }

    #[test]
    fn unmapped_factor_code_keeps_literal_text() {
        let xml = wrap(
            r#"<PHARMACY_REPORT><LSTFACTOR><DATFACTOR CODE="999999">legacy text</DATFACTOR></LSTFACTOR></PHARMACY_REPORT>"#,
        );
        let r = &parse_incident_xml(&xml).unwrap()[0];
        assert_eq!(r.factors, "不明な発生要因 legacy text");
    }

    #[test]
    fn self_closing_report_counts_as_empty_record() {
        let xml = wrap(
            r#"<PHARMACY_REPORT/><PHARMACY_REPORT><DATYEAR>2023</DATYEAR></PHARMACY_REPORT><PHARMACY_REPORT/>"#,
        );
        let reports = parse_incident_xml(&xml).unwrap();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].year, NO_DATA);
        assert_eq!(reports[0].summary, NO_DATA);
        assert_eq!(reports[1].year, "2023");
        assert_eq!(reports[2].factors, NO_DATA);
    }

    #[test]
    fn unknown_month_echoes_code() {
        let xml = wrap(r#"<PHARMACY_REPORT><DATMONTH CODE="13"/></PHARMACY_REPORT>"#);
        assert_eq!(parse_incident_xml(&xml).unwrap()[0].month, "不明な月 (13)");
    }

    #[test]
    fn null_code_uses_literal_text() {
        let xml = wrap(
            r#"<PHARMACY_REPORT><DATSUMMARY CODE="null">手入力の区分 (コード: 99)</DATSUMMARY></PHARMACY_REPORT>"#,
        );
        assert_eq!(parse_incident_xml(&xml).unwrap()[0].summary, "手入力の区分");
    }

    #[test]
    fn label_equal_to_text_is_not_repeated() {
        let xml = wrap(
            r#"<PHARMACY_REPORT><DATCONTENTTEXT CODE="09">その他</DATCONTENTTEXT></PHARMACY_REPORT>"#,
        );
        assert_eq!(parse_incident_xml(&xml).unwrap()[0].content, "その他");
    }

    #[test]
    fn inquiry_report_fields() {
        let xml = wrap(
            r#"<PHARMACY_REPORT>
                <DATSUMMARY CODE="02"/>
                <LSTFACTORDOUBT><DATFACTORDOUBT CODE="160104"/><DATFACTORDOUBT CODE="555"/></LSTFACTORDOUBT>
                <DATESTIMATEDTEXT>処方医の確認漏れ</DATESTIMATEDTEXT>
                <DATEFFORTTEXT>お薬手帳を確認</DATEFFORTTEXT>
            </PHARMACY_REPORT>"#,
        );
        let r = &parse_incident_xml(&xml).unwrap()[0];
        assert!(r.is_inquiry());
        assert_eq!(r.factor_doubts, "連携不足\n不明な発生要因(疑義照会)");
        assert_eq!(r.estimated_text, "処方医の確認漏れ");
        assert_eq!(r.effort_text, "お薬手帳を確認");
    }

    #[test]
    fn reports_keep_source_order() {
        let xml = wrap(
            "<PHARMACY_REPORT><DATYEAR>2021</DATYEAR></PHARMACY_REPORT>\
             <PHARMACY_REPORT><DATYEAR>2022</DATYEAR></PHARMACY_REPORT>\
             <PHARMACY_REPORT><DATYEAR>2023</DATYEAR></PHARMACY_REPORT>",
        );
        let years: Vec<String> = parse_incident_xml(&xml)
            .unwrap()
            .into_iter()
            .map(|r| r.year)
            .collect();
        assert_eq!(years, vec!["2021", "2022", "2023"]);
    }

    #[test]
    fn no_reports_is_empty_success() {
        let reports = parse_incident_xml(&wrap("")).unwrap();
        assert!(reports.is_empty());
    }

    #[test]
    fn error_element_is_upstream_error() {
        let xml = "<Response><Error>検索条件が不正です</Error></Response>";
        assert_eq!(
            parse_incident_xml(xml),
            Err(ParseError::Upstream("検索条件が不正です".into()))
        );
    }

    #[test]
    fn malformed_xml_is_rejected() {
        assert!(matches!(
            parse_incident_xml("<A><B></A>"),
            Err(ParseError::Malformed(_))
        ));
        assert!(matches!(
            parse_incident_xml("<A><B>"),
            Err(ParseError::Malformed(_))
        ));
        assert_eq!(parse_incident_xml(""), Err(ParseError::Empty));
    }

    #[test]
    fn escaped_entities_are_decoded() {
        let xml = wrap(
            "<PHARMACY_REPORT><DATIMPROVEMENTTEXT>A &amp; B &lt;確認&gt;</DATIMPROVEMENTTEXT></PHARMACY_REPORT>",
        );
        assert_eq!(parse_incident_xml(&xml).unwrap()[0].improvement, "A & B <確認>");
    }
}
