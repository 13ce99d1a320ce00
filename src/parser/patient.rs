use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use crate::state::{Gender, Patient};

/// Lead token of every case narrative.
pub const CASE_MARKER: &str = "患者";

/// A sentence template for "患者N,性别,年龄岁,住址,...,治疗".
///
/// Every pattern captures, in order: case number, gender, age, residence,
/// treatment. The patterns only differ in how they bound the residence and
/// treatment clauses.
pub struct CasePattern {
    pub name: &'static str,
    re: Regex,
}

struct CaseFields<'t> {
    number: &'t str,
    gender: &'t str,
    age: &'t str,
    residence: &'t str,
    treatment: &'t str,
}

impl CasePattern {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            re: Regex::new(pattern).unwrap(),
        }
    }

    fn fields<'t>(&self, text: &'t str) -> Option<CaseFields<'t>> {
        let caps = self.re.captures(text)?;
        let group = |i: usize| caps.get(i).map(|m| m.as_str());
        Some(CaseFields {
            number: group(1)?,
            gender: group(2)?,
            age: group(3)?,
            residence: group(4)?,
            treatment: group(5)?,
        })
    }
}

/// Tried in order; the first full match wins. Case numbers are capped at nine
/// digits so every synthesized id parses as a [`crate::case_id::CaseId`].
pub static CASCADE: LazyLock<Vec<CasePattern>> = LazyLock::new(|| {
    vec![
        // 患者4,男,63岁,现居西安市新城区,...目前在西安交通大学第二附属医院隔离治疗,病情平稳。
        CasePattern::new(
            "resides",
            r"^患者([0-9]{1,9}),(?:\s*)([^,。]+),(?:\s*)([0-9]+)岁,现居([^,。]+)(?:.*)目前([^,。]+)",
        ),
        // 患者3,男,22岁,西安市人。...21日在省传染病院（西安市八院）隔离治疗。
        CasePattern::new(
            "native-in",
            r"^患者([0-9]{1,9}),(?:\s*)([^,]+),(?:\s*)([0-9]+)岁,([^人,。]+)(?:.*)在([^(隔离治疗)]+)",
        ),
        // 患者9,男,27岁,咸阳市人,...目前病情平稳
        CasePattern::new(
            "native-currently",
            r"^患者([0-9]{1,9}),(?:\s*)([^,]+),(?:\s*)([0-9]+)岁,([^人,。]+)(?:.*)目前([^,。]+)",
        ),
    ]
});

fn parse_gender(token: &str) -> Gender {
    match token {
        "男" => Gender::Male,
        "女" => Gender::Female,
        _ => Gender::Unknown,
    }
}

/// Extract a case record from one normalized paragraph.
///
/// Returns `None` for paragraphs that do not start with [`CASE_MARKER`].
/// A case paragraph no pattern understands still yields a record carrying
/// only `detail`.
pub fn extract_patient(text: &str, date: NaiveDate) -> Option<Patient> {
    if !text.starts_with(CASE_MARKER) {
        return None;
    }

    let matched = CASCADE
        .iter()
        .find_map(|p| p.fields(text).map(|f| (p.name, f)));

    let Some((pattern, fields)) = matched else {
        debug!("Unparsed case paragraph: {}", text);
        return Some(Patient {
            detail: text.to_string(),
            ..Default::default()
        });
    };
    debug!("Case {} matched pattern {}", fields.number, pattern);

    Some(Patient {
        detail: text.to_string(),
        id: Some(format!("{}:{}", date, fields.number)),
        gender: parse_gender(fields.gender),
        age: fields.age.parse().ok(),
        live_address: fields.residence.to_string(),
        treatment: fields.treatment.to_string(),
    })
}

// ── Tests ──
