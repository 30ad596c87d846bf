use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use time::{Date, Month};

use crate::{CensusError, CensusResult, CitizenId};

pub const DEFAULT_MAX_IMPORT_CITIZENS: usize = 10_000;
pub const DEFAULT_MAX_TEXT_LEN: usize = 256;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// Calendar birth date exchanged with callers as `DD.MM.YYYY`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BirthDate(pub Date);

impl BirthDate {
    /// Parses `DD.MM.YYYY`; day and month may omit the leading zero.
    pub fn parse(value: &str) -> CensusResult<Self> {
        let invalid = || CensusError::validation(format!("birth_date '{value}' is not DD.MM.YYYY"));
        let mut parts = value.split('.');
        let (Some(day), Some(month), Some(year), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let digits = |part: &str, min: usize, max: usize| {
            (min..=max).contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit())
        };
        if !digits(day, 1, 2) || !digits(month, 1, 2) || !digits(year, 4, 4) {
            return Err(invalid());
        }
        let day: u8 = day.parse().map_err(|_| invalid())?;
        let month: u8 = month.parse().map_err(|_| invalid())?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month = Month::try_from(month).map_err(|_| invalid())?;
        let date = Date::from_calendar_date(year, month, day).map_err(|_| {
            CensusError::validation(format!("birth_date '{value}' is not a calendar date"))
        })?;
        Ok(Self(date))
    }

    pub fn date(self) -> Date {
        self.0
    }

    pub fn month(self) -> u8 {
        u8::from(self.0.month())
    }
}

impl From<Date> for BirthDate {
    fn from(value: Date) -> Self {
        Self(value)
    }
}

impl fmt::Display for BirthDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}.{:02}.{:04}",
            self.0.day(),
            self.month(),
            self.0.year()
        )
    }
}

impl Serialize for BirthDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BirthDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        BirthDate::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// Full citizen as submitted in an import and as returned by every read.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CitizenRecord {
    pub citizen_id: CitizenId,
    pub town: String,
    pub street: String,
    pub building: String,
    pub apartment: u32,
    pub name: String,
    pub birth_date: BirthDate,
    pub gender: Gender,
    pub relatives: Vec<CitizenId>,
}

/// Partial update of one citizen. `relatives: None` leaves the relatives untouched,
/// `relatives: Some(vec![])` removes all of them.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CitizenPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub town: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apartment: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<BirthDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relatives: Option<Vec<CitizenId>>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ValidationLimits {
    pub max_import_citizens: usize,
    pub max_text_len: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_import_citizens: DEFAULT_MAX_IMPORT_CITIZENS,
            max_text_len: DEFAULT_MAX_TEXT_LEN,
        }
    }
}

/// Structural validation of an import request `{ "citizens": [...] }`.
///
/// Checks shapes, types, enum values, dates, text limits and citizen_id uniqueness.
/// Relatives are only type-checked here; graph consistency is
/// [`crate::graph::validate_symmetry`]'s job.
pub fn parse_import_payload(
    payload: JsonValue,
    limits: &ValidationLimits,
    today: Date,
) -> CensusResult<Vec<CitizenRecord>> {
    let JsonValue::Object(mut object) = payload else {
        return Err(CensusError::validation("import payload must be a JSON object"));
    };
    let citizens = object
        .remove("citizens")
        .ok_or_else(|| CensusError::validation("missing field `citizens`"))?;
    if let Some(key) = object.keys().next() {
        return Err(CensusError::validation(format!("unknown field `{key}`")));
    }
    let JsonValue::Array(items) = citizens else {
        return Err(CensusError::validation("`citizens` must be an array"));
    };
    if items.len() > limits.max_import_citizens {
        return Err(CensusError::validation(format!(
            "import holds {} citizens, limit is {}",
            items.len(),
            limits.max_import_citizens
        )));
    }

    let mut seen = HashSet::with_capacity(items.len());
    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let record: CitizenRecord = serde_json::from_value(item)
            .map_err(|err| CensusError::validation(format!("citizens[{index}]: {err}")))?;
        validate_record(&record, limits, today).map_err(|err| {
            CensusError::validation(format!("citizens[{index}]: {}", err.message()))
        })?;
        if !seen.insert(record.citizen_id) {
            return Err(CensusError::validation(format!(
                "duplicate citizen_id {}",
                record.citizen_id
            )));
        }
        records.push(record);
    }
    Ok(records)
}

impl CitizenPatch {
    /// Structural validation of a patch body: a non-empty object holding only mutable
    /// fields, none of them `null`.
    pub fn parse(payload: JsonValue, limits: &ValidationLimits, today: Date) -> CensusResult<Self> {
        let JsonValue::Object(object) = payload else {
            return Err(CensusError::validation("patch payload must be a JSON object"));
        };
        check_patch_keys(&object)?;
        let patch: CitizenPatch = serde_json::from_value(JsonValue::Object(object))?;
        for (field, value) in patch.text_fields() {
            check_text(field, value, limits)?;
        }
        if let Some(birth_date) = patch.birth_date {
            check_not_future(birth_date, today)?;
        }
        Ok(patch)
    }

    pub fn is_empty(&self) -> bool {
        !self.has_field_updates() && self.relatives.is_none()
    }

    /// True when any scalar column changes.
    pub fn has_field_updates(&self) -> bool {
        self.town.is_some()
            || self.street.is_some()
            || self.building.is_some()
            || self.apartment.is_some()
            || self.name.is_some()
            || self.birth_date.is_some()
            || self.gender.is_some()
    }

    fn text_fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("town", self.town.as_deref()),
            ("street", self.street.as_deref()),
            ("building", self.building.as_deref()),
            ("name", self.name.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|value| (field, value)))
    }
}

fn check_patch_keys(object: &Map<String, JsonValue>) -> CensusResult<()> {
    if object.is_empty() {
        return Err(CensusError::validation(
            "patch must contain at least one field",
        ));
    }
    if object.contains_key("citizen_id") {
        return Err(CensusError::validation("citizen_id cannot be changed"));
    }
    if let Some((key, _)) = object.iter().find(|(_, value)| value.is_null()) {
        return Err(CensusError::validation(format!(
            "field `{key}` must not be null"
        )));
    }
    Ok(())
}

fn validate_record(
    record: &CitizenRecord,
    limits: &ValidationLimits,
    today: Date,
) -> CensusResult<()> {
    if record.citizen_id.get() < 0 {
        return Err(CensusError::validation("citizen_id must be non-negative"));
    }
    for (field, value) in [
        ("town", &record.town),
        ("street", &record.street),
        ("building", &record.building),
        ("name", &record.name),
    ] {
        check_text(field, value, limits)?;
    }
    check_not_future(record.birth_date, today)
}

fn check_text(field: &str, value: &str, limits: &ValidationLimits) -> CensusResult<()> {
    if value.trim().is_empty() {
        return Err(CensusError::validation(format!("`{field}` must not be empty")));
    }
    if value.chars().count() > limits.max_text_len {
        return Err(CensusError::validation(format!(
            "`{field}` is longer than {} characters",
            limits.max_text_len
        )));
    }
    Ok(())
}

fn check_not_future(birth_date: BirthDate, today: Date) -> CensusResult<()> {
    if birth_date.date() > today {
        return Err(CensusError::validation(format!(
            "birth_date {birth_date} is in the future"
        )));
    }
    Ok(())
}
