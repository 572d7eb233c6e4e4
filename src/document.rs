//! Core entity model: controlled documents, versions and training records
use super::error::ValidationError;
use chrono::{DateTime, Duration, TimeZone, Utc};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DocType {
    #[n(0)]
    QualityManual,
    #[n(1)]
    Policy,
    #[n(2)]
    QualityObjective,
    #[n(3)]
    Sop,
    #[n(4)]
    WorkInstruction,
    #[n(5)]
    Form,
    #[n(6)]
    Specification,
    #[n(7)]
    Drawing,
    #[n(8)]
    BillOfMaterials,
    #[n(9)]
    SoftwareDoc,
    #[n(10)]
    RiskManagement,
    #[n(11)]
    InstructionsForUse,
    #[n(12)]
    Labeling,
    #[n(13)]
    Plan,
    #[n(14)]
    Protocol,
    #[n(15)]
    Report,
    #[n(16)]
    ExternalStandard,
    #[n(17)]
    ControlledTemplate,
}

impl DocType {
    pub const ALL: [DocType; 18] = [
        DocType::QualityManual,
        DocType::Policy,
        DocType::QualityObjective,
        DocType::Sop,
        DocType::WorkInstruction,
        DocType::Form,
        DocType::Specification,
        DocType::Drawing,
        DocType::BillOfMaterials,
        DocType::SoftwareDoc,
        DocType::RiskManagement,
        DocType::InstructionsForUse,
        DocType::Labeling,
        DocType::Plan,
        DocType::Protocol,
        DocType::Report,
        DocType::ExternalStandard,
        DocType::ControlledTemplate,
    ];

    /// Short code used as the document number prefix
    pub fn code(&self) -> &'static str {
        match self {
            DocType::QualityManual => "QM",
            DocType::Policy => "POL",
            DocType::QualityObjective => "OBJ",
            DocType::Sop => "SOP",
            DocType::WorkInstruction => "WI",
            DocType::Form => "FORM",
            DocType::Specification => "SPEC",
            DocType::Drawing => "DWG",
            DocType::BillOfMaterials => "BOM",
            DocType::SoftwareDoc => "SW",
            DocType::RiskManagement => "RISK",
            DocType::InstructionsForUse => "IFU",
            DocType::Labeling => "LBL",
            DocType::Plan => "PLAN",
            DocType::Protocol => "PROT",
            DocType::Report => "REP",
            DocType::ExternalStandard => "EXT",
            DocType::ControlledTemplate => "TMP",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, ValidationError> {
        DocType::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or_else(|| ValidationError::UnknownType(code.to_string()))
    }
}

impl serde::Serialize for DocType {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.code())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum Status {
    #[n(0)]
    Draft,
    #[n(1)]
    InReview,
    #[n(2)]
    ApprovedPending,
    #[n(3)]
    Training,
    #[n(4)]
    Released,
    #[n(5)]
    Superseded,
    #[n(6)]
    Obsolete,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Draft => "DRAFT",
            Status::InReview => "IN_REVIEW",
            Status::ApprovedPending => "APPROVED_PENDING",
            Status::Training => "TRAINING",
            Status::Released => "RELEASED",
            Status::Superseded => "SUPERSEDED",
            Status::Obsolete => "OBSOLETE",
        }
    }
}

impl serde::Serialize for Status {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum TrainingStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Completed,
    #[n(2)]
    Failed,
}

impl TrainingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingStatus::Pending => "PENDING",
            TrainingStatus::Completed => "COMPLETED",
            TrainingStatus::Failed => "FAILED",
        }
    }
}

impl serde::Serialize for TrainingStatus {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

/// Dotted `major.minor` version label
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq, PartialOrd, Ord)]
pub struct VersionLabel {
    #[n(0)]
    pub major: u32,
    #[n(1)]
    pub minor: u32,
}

impl VersionLabel {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// The label every document starts its life at
    pub fn initial() -> Self {
        Self::new(0, 1)
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidLabel(s.to_string());
        let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
        if major.is_empty() || minor.is_empty() {
            return Err(invalid());
        }
        if !major.bytes().all(|b| b.is_ascii_digit()) || !minor.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        Ok(Self::new(
            major.parse().map_err(|_| invalid())?,
            minor.parse().map_err(|_| invalid())?,
        ))
    }

    /// Release bump: major += 1, minor resets to 0
    pub fn bump_major(&self) -> Self {
        Self::new(self.major + 1, 0)
    }

    /// Revision bump: minor += 1, major stays fixed
    pub fn bump_minor(&self) -> Self {
        Self::new(self.major, self.minor + 1)
    }
}

impl std::fmt::Display for VersionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl serde::Serialize for VersionLabel {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// derived Copy and Ord would bound the zone parameter itself, which Utc
// cannot meet; its DateTime satisfies both, so the impls stay concrete
impl Copy for TimeStamp<Utc> {}

impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
    pub fn plus_days(&self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl serde::Serialize for TimeStamp<Utc> {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_rfc3339())
    }
}

/// Header record of a controlled document. Created once, immutable thereafter.
#[derive(minicbor::Encode, minicbor::Decode, serde::Serialize, Debug, Clone, Eq, PartialEq)]
pub struct Document {
    #[n(0)]
    pub doc_id: u64,
    #[n(1)]
    #[serde(rename = "doc_num")]
    pub number: String,
    #[n(2)]
    pub title: String,
    #[n(3)]
    pub owner_id: u64,
    #[n(4)]
    #[serde(rename = "type")]
    pub doc_type: DocType,
}

impl Document {
    pub fn new(
        doc_id: u64,
        number: String,
        title: String,
        owner_id: u64,
        doc_type: DocType,
    ) -> Result<Self, ValidationError> {
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if !is_valid_doc_number(&number) {
            return Err(ValidationError::InvalidNumber(number));
        }
        let prefix = number.split('-').next().unwrap_or_default();
        if prefix != doc_type.code() {
            return Err(ValidationError::TypeMismatch {
                type_code: doc_type.code().to_string(),
                prefix: prefix.to_string(),
            });
        }
        Ok(Self {
            doc_id,
            number,
            title,
            owner_id,
            doc_type,
        })
    }
}

/// A single revision of a document's content, tracked through its lifecycle.
/// Never deleted; superseded versions are retained with an archived file path.
#[derive(minicbor::Encode, minicbor::Decode, serde::Serialize, Debug, Clone, PartialEq)]
pub struct Version {
    #[n(0)]
    pub version_id: u64,
    #[n(1)]
    #[serde(rename = "doc")]
    pub doc_id: u64,
    #[n(2)]
    #[serde(rename = "version")]
    pub label: VersionLabel,
    #[n(3)]
    pub status: Status,
    #[n(4)]
    pub file_path: String,
    #[n(5)]
    pub effective_date: Option<TimeStamp<Utc>>,
}

impl Version {
    pub fn new(
        version_id: u64,
        doc_id: u64,
        label: VersionLabel,
        status: Status,
        file_path: String,
        effective_date: Option<TimeStamp<Utc>>,
    ) -> Result<Self, ValidationError> {
        if file_path.is_empty() {
            return Err(ValidationError::EmptyFilePath);
        }
        if status == Status::Released && effective_date.is_none() {
            return Err(ValidationError::MissingEffectiveDate);
        }
        Ok(Self {
            version_id,
            doc_id,
            label,
            status,
            file_path,
            effective_date,
        })
    }
}

/// Per-user certification status against a specific trainable version
#[derive(minicbor::Encode, minicbor::Decode, serde::Serialize, Debug, Clone, PartialEq)]
pub struct Training {
    #[n(0)]
    pub training_id: u64,
    #[n(1)]
    pub user_id: u64,
    #[n(2)]
    pub version_id: u64,
    #[n(3)]
    pub status: TrainingStatus,
    #[n(4)]
    pub assigned_date: TimeStamp<Utc>,
    #[n(5)]
    pub due_date: TimeStamp<Utc>,
    #[n(6)]
    pub completion_date: Option<TimeStamp<Utc>>,
    #[n(7)]
    pub score: Option<u32>,
}

impl Training {
    pub fn assigned(
        training_id: u64,
        user_id: u64,
        version_id: u64,
        assigned_date: TimeStamp<Utc>,
        due_date: TimeStamp<Utc>,
    ) -> Self {
        Self {
            training_id,
            user_id,
            version_id,
            status: TrainingStatus::Pending,
            assigned_date,
            due_date,
            completion_date: None,
            score: None,
        }
    }
}

/// Pattern `^[A-Z]{2,4}-\d{3}$`
pub fn is_valid_doc_number(number: &str) -> bool {
    let Some((prefix, seq)) = number.split_once('-') else {
        return false;
    };
    (2..=4).contains(&prefix.len())
        && prefix.bytes().all(|b| b.is_ascii_uppercase())
        && seq.len() == 3
        && seq.bytes().all(|b| b.is_ascii_digit())
}

/// Next number in the per-type sequence. A malformed or absent predecessor
/// restarts the sequence at `TYPE-001`.
pub fn next_doc_number(doc_type: DocType, last_number: Option<&str>) -> String {
    let next_seq = last_number
        .and_then(|n| n.split_once('-'))
        .and_then(|(_, seq)| seq.parse::<u32>().ok())
        .map_or(1, |seq| seq + 1);
    format!("{}-{:03}", doc_type.code(), next_seq)
}
